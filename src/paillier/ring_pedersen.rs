use core::fmt::Debug;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::One;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::keys::SecretKeyPaillier;
use crate::{
    sessions::LocalError,
    uint::{is_invertible, pow_signed, random_bounded_bits_scaled, random_invertible},
};

/// The secret exponent `lambda` such that `s = t^lambda`.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct RPSecret {
    lambda: BigUint,
}

impl RPSecret {
    pub fn lambda(&self) -> &BigUint {
        &self.lambda
    }
}

impl Debug for RPSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RPSecret(...)")
    }
}

/// Public parameters of the ring-Pedersen commitment scheme: `(N, s, t)`.
///
/// Uses the Paillier modulus of the party the parameters belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RPParams {
    modulus: BigUint,
    /// `s`
    base_value: BigUint,
    /// `t`
    base_randomizer: BigUint,
}

impl RPParams {
    pub fn random_with_secret(
        rng: &mut impl CryptoRngCore,
        sk: &SecretKeyPaillier,
    ) -> Result<(Self, RPSecret), LocalError> {
        let modulus = sk.modulus().clone();
        let r = random_invertible(rng, &modulus)
            .ok_or_else(|| LocalError::new("Failed to sample a ring-Pedersen base"))?;
        let lambda = sk.random_field_elem(rng);

        // `t` is a random quadratic residue, and `s` is in the group generated by `t`.
        let base_randomizer = (&r * &r) % &modulus;
        let base_value = base_randomizer.modpow(&lambda, &modulus);

        Ok((
            Self {
                modulus,
                base_value,
                base_randomizer,
            },
            RPSecret { lambda },
        ))
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// `s`
    pub fn base_value(&self) -> &BigUint {
        &self.base_value
    }

    /// `t`
    pub fn base_randomizer(&self) -> &BigUint {
        &self.base_randomizer
    }

    /// Checks that the modulus is odd and both bases are non-trivial invertible elements.
    pub fn is_valid(&self) -> bool {
        self.modulus.is_odd()
            && self.modulus > BigUint::one()
            && is_invertible(&self.base_value, &self.modulus)
            && is_invertible(&self.base_randomizer, &self.modulus)
            && !self.base_randomizer.is_one()
    }

    /// Returns `s^value * t^randomizer mod N`.
    pub fn commit(&self, value: &BigInt, randomizer: &BigInt) -> RPCommitment {
        let s = pow_signed(&self.base_value, value, &self.modulus);
        let t = pow_signed(&self.base_randomizer, randomizer, &self.modulus);
        RPCommitment((s * t) % &self.modulus)
    }

    /// Samples a commitment randomizer in `[-2^bits * N, 2^bits * N]`.
    pub fn random_randomizer(&self, rng: &mut impl CryptoRngCore, bits: u32) -> BigInt {
        random_bounded_bits_scaled(rng, bits, &self.modulus)
    }
}

/// A ring-Pedersen commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RPCommitment(BigUint);

impl RPCommitment {
    /// Returns `self^exponent * other`.
    pub fn pow_mul(&self, exponent: &BigInt, other: &Self, params: &RPParams) -> Self {
        let powered = pow_signed(&self.0, exponent, params.modulus());
        Self((powered * &other.0) % params.modulus())
    }

    pub fn is_valid(&self, params: &RPParams) -> bool {
        is_invertible(&self.0, params.modulus())
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use rand_core::OsRng;

    use super::RPParams;
    use crate::{paillier::SecretKeyPaillier, params::PaillierTest, uint::random_bounded_bits};

    #[test]
    fn commitments_are_homomorphic() {
        let sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let (params, secret) = RPParams::random_with_secret(&mut OsRng, &sk).unwrap();
        assert!(params.is_valid());
        assert_eq!(
            params.base_randomizer().modpow(secret.lambda(), params.modulus()),
            *params.base_value()
        );

        let x1 = random_bounded_bits(&mut OsRng, 256);
        let r1 = params.random_randomizer(&mut OsRng, 256);
        let x2 = random_bounded_bits(&mut OsRng, 256);
        let r2 = params.random_randomizer(&mut OsRng, 256);
        let e = BigInt::from(-12345);

        // `C1^e * C2 == commit(x1 * e + x2, r1 * e + r2)`
        let c1 = params.commit(&x1, &r1);
        let c2 = params.commit(&x2, &r2);
        assert!(c1.is_valid(&params));
        assert_eq!(c1.pow_mul(&e, &c2, &params), params.commit(&(&x1 * &e + &x2), &(&r1 * &e + &r2)));
    }
}
