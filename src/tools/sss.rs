use std::collections::BTreeMap;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    curve::{Point, Scalar},
    sessions::LocalError,
    tools::Secret,
};

/// The evaluation point of a party's Shamir share.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ShareId(Scalar);

impl ShareId {
    pub fn new(idx: u64) -> Self {
        Self(Scalar::from(idx))
    }
}

pub(crate) fn shamir_evaluation_points(num_shares: usize) -> Vec<ShareId> {
    // For now we are hardcoding the points to be 1, 2, ..., n.
    (1..=num_shares as u64).map(ShareId::new).collect()
}

#[derive(Debug)]
pub(crate) struct Polynomial(Vec<Secret<Scalar>>);

impl Polynomial {
    /// A random polynomial of the given degree with the given constant term.
    pub fn random(rng: &mut impl CryptoRngCore, coeff0: Secret<Scalar>, degree: usize) -> Self {
        let mut coeffs = Vec::with_capacity(degree + 1);
        coeffs.push(coeff0);
        for _ in 0..degree {
            coeffs.push(Secret::init_with(|| Scalar::random_nonzero(rng)));
        }
        Self(coeffs)
    }

    pub fn evaluate(&self, x: &ShareId) -> Secret<Scalar> {
        // Evaluate in reverse to save on multiplications.
        // Basically: a0 + a1 x + a2 x^2 + a3 x^3 == (((a3 x) + a2) x + a1) x + a0
        let value = self
            .0
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coeff| acc * x.0 + *coeff.expose_secret());
        Secret::init_with(|| value)
    }
}

pub(crate) fn shamir_split(
    rng: &mut impl CryptoRngCore,
    secret: Secret<Scalar>,
    threshold: usize,
    indices: &[ShareId],
) -> BTreeMap<ShareId, Secret<Scalar>> {
    let polynomial = Polynomial::random(rng, secret, threshold.saturating_sub(1));
    indices.iter().map(|idx| (*idx, polynomial.evaluate(idx))).collect()
}

/// Returns the Lagrange coefficient of `share_id` for interpolating at zero from `share_ids`.
pub(crate) fn interpolation_coeff<'a>(
    share_ids: impl Iterator<Item = &'a ShareId>,
    share_id: &ShareId,
) -> Result<Scalar, LocalError> {
    share_ids
        .filter(|id| *id != share_id)
        .map(|id| {
            Option::<Scalar>::from((id.0 - share_id.0).invert())
                .map(|inv| id.0 * inv)
                .ok_or_else(|| LocalError::new("Share IDs must be distinct"))
        })
        .product()
}

pub(crate) fn shamir_join_points(pairs: &BTreeMap<ShareId, Point>) -> Result<Point, LocalError> {
    pairs
        .iter()
        .map(|(share_id, val)| Ok(val * &interpolation_coeff(pairs.keys(), share_id)?))
        .sum()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand_core::OsRng;

    use super::{interpolation_coeff, shamir_evaluation_points, shamir_join_points, shamir_split, ShareId};
    use crate::{curve::Scalar, tools::Secret};

    #[test]
    fn split_and_join() {
        let threshold = 3;
        let num_shares = 5;
        let secret = Scalar::random(&mut OsRng);
        let points = shamir_evaluation_points(num_shares);
        let mut shares = shamir_split(&mut OsRng, Secret::init_with(|| secret), threshold, &points);

        shares.remove(&points[0]);
        shares.remove(&points[3]);

        let recovered: Scalar = shares
            .iter()
            .map(|(id, share)| *share.expose_secret() * interpolation_coeff(shares.keys(), id).unwrap())
            .sum();
        assert_eq!(recovered, secret);

        let public = shares
            .iter()
            .map(|(id, share)| (*id, share.expose_secret().mul_by_generator()))
            .collect::<BTreeMap<_, _>>();
        assert_eq!(shamir_join_points(&public).unwrap(), secret.mul_by_generator());
    }

    #[test]
    fn too_few_shares_do_not_recover() {
        let secret = Scalar::random(&mut OsRng);
        let points = shamir_evaluation_points(4);
        let shares = shamir_split(&mut OsRng, Secret::init_with(|| secret), 3, &points);
        let subset = shares
            .into_iter()
            .filter(|(id, _)| *id != ShareId::new(1) && *id != ShareId::new(2))
            .collect::<BTreeMap<_, _>>();
        let recovered: Scalar = subset
            .iter()
            .map(|(id, share)| *share.expose_secret() * interpolation_coeff(subset.keys(), id).unwrap())
            .sum();
        assert_ne!(recovered, secret);
    }
}
