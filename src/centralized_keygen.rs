use core::marker::PhantomData;
use std::collections::{BTreeMap, BTreeSet};

use k256::ecdsa::SigningKey;
use rand_core::CryptoRngCore;
use tracing::debug;

use crate::{
    curve::Scalar,
    entities::{PartyId, PublicAuxInfo, SecretAuxInfo, ThresholdKeyShare, AUX_INFO_TAG},
    paillier::{RPParams, SecretKeyPaillier},
    params::SchemeParams,
    sessions::LocalError,
    sigma::{ModProof, PrmProof, ProofBlob},
    tools::{
        parallel::par_map_parties,
        sss::{shamir_evaluation_points, shamir_split},
        Secret,
    },
};

fn make_aux_info<P: SchemeParams>(
    rng: &mut impl CryptoRngCore,
    ids: &BTreeSet<PartyId>,
) -> Result<BTreeMap<PartyId, (SecretAuxInfo, PublicAuxInfo)>, LocalError> {
    par_map_parties(rng, ids, |rng, id| {
        let paillier_sk = SecretKeyPaillier::random::<P::Paillier>(rng)?;
        let (rp_params, rp_secret) = RPParams::random_with_secret(rng, &paillier_sk)?;

        let aux = (AUX_INFO_TAG, id);
        let mod_proof = ModProof::new::<P>(rng, &paillier_sk, &aux)?;
        let prm_proof = PrmProof::new::<P>(rng, &paillier_sk, &rp_secret, &rp_params, &aux);

        let public = PublicAuxInfo {
            paillier_pk: paillier_sk.public_key(),
            rp_params,
            mod_proof: ProofBlob::new(&mod_proof)?,
            prm_proof: ProofBlob::new(&prm_proof)?,
        };
        Ok((SecretAuxInfo { paillier_sk }, public))
    })
}

/// Returns a set of random self-consistent threshold key shares for the parties `ids`
/// (which in a decentralized case would be the output of KeyGen and AuxGen protocols).
///
/// If `signing_key` is given, it is used as the shared secret.
pub fn make_key_shares<P: SchemeParams>(
    rng: &mut impl CryptoRngCore,
    ids: &BTreeSet<PartyId>,
    threshold: usize,
    signing_key: Option<&SigningKey>,
) -> Result<BTreeMap<PartyId, ThresholdKeyShare<P>>, LocalError> {
    if threshold == 0 || threshold > ids.len() {
        return Err(LocalError::new(format!(
            "Invalid threshold ({threshold}). Must be between 1 and {}",
            ids.len()
        )));
    }

    let secret = Secret::init_with(|| match signing_key {
        None => Scalar::random_nonzero(rng),
        Some(sk) => Scalar::from_signing_key(sk),
    });

    let share_ids = shamir_evaluation_points(ids.len());
    let secret_shares = shamir_split(rng, secret, threshold, &share_ids);
    let share_ids = ids.iter().cloned().zip(share_ids).collect::<BTreeMap<_, _>>();

    let public_shares = share_ids
        .iter()
        .map(|(id, share_id)| {
            let secret_share = secret_shares
                .get(share_id)
                .ok_or_else(|| LocalError::new(format!("{share_id:?} is missing in the secret shares")))?;
            Ok((*id, secret_share.expose_secret().mul_by_generator()))
        })
        .collect::<Result<BTreeMap<_, _>, LocalError>>()?;

    debug!("Generating auxiliary info for {} parties", ids.len());
    let aux_infos = make_aux_info::<P>(rng, ids)?;
    let public_aux = aux_infos
        .iter()
        .map(|(id, (_, public))| (*id, public.clone()))
        .collect::<BTreeMap<_, _>>();

    aux_infos
        .into_iter()
        .map(|(id, (secret_aux, _))| {
            let share_id = share_ids
                .get(&id)
                .ok_or_else(|| LocalError::new(format!("{id} is missing in the share IDs")))?;
            let secret_share = secret_shares
                .get(share_id)
                .ok_or_else(|| LocalError::new(format!("{share_id:?} is missing in the secret shares")))?
                .clone();
            Ok((
                id,
                ThresholdKeyShare {
                    owner: id,
                    threshold: threshold as u32,
                    secret_share,
                    share_ids: share_ids.clone(),
                    public_shares: public_shares.clone(),
                    secret_aux,
                    public_aux: public_aux.clone(),
                    phantom: PhantomData,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand_core::OsRng;

    use super::make_key_shares;
    use crate::{entities::PartyId, params::TestParams};

    #[test]
    fn invalid_threshold() {
        let ids = (1..=3).map(PartyId::new).collect::<BTreeSet<_>>();
        assert!(make_key_shares::<TestParams>(&mut OsRng, &ids, 0, None).is_err());
        assert!(make_key_shares::<TestParams>(&mut OsRng, &ids, 4, None).is_err());
    }

    #[test]
    fn shares_are_consistent() {
        let ids = (1..=3).map(PartyId::new).collect::<BTreeSet<_>>();
        let shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 2, None).unwrap();
        assert_eq!(shares.keys().cloned().collect::<BTreeSet<_>>(), ids);

        let vkey = shares[&PartyId::new(1)].verifying_key().unwrap();
        for (id, share) in shares.iter() {
            assert_eq!(share.owner(), id);
            assert_eq!(share.threshold(), 2);
            assert_eq!(share.verifying_key().unwrap(), vkey);
            assert!(share.verify_aux_info(&ids).is_ok());
        }
    }
}
