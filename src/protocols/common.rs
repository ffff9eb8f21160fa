use std::collections::BTreeSet;

use crate::{
    curve::Point,
    entities::{KeyShare, PartyId, PublicAuxInfo},
    paillier::{PublicKeyPaillier, RPParams, SecretKeyPaillier},
    params::SchemeParams,
    sessions::{LocalError, SessionId},
};

/// Data shared by all the rounds of a session.
#[derive(Debug, Clone)]
pub(crate) struct Context<P: SchemeParams> {
    pub(crate) session_id: SessionId,
    pub(crate) my_id: PartyId,
    pub(crate) other_ids: BTreeSet<PartyId>,
    pub(crate) all_ids: BTreeSet<PartyId>,
    pub(crate) key_share: KeyShare<P>,
}

impl<P: SchemeParams> Context<P> {
    pub fn new(session_id: SessionId, key_share: KeyShare<P>) -> Self {
        let my_id = *key_share.owner();
        let all_ids = key_share.all_parties();
        let other_ids = all_ids.iter().filter(|id| **id != my_id).cloned().collect();
        Self {
            session_id,
            my_id,
            other_ids,
            all_ids,
            key_share,
        }
    }

    pub fn public_aux(&self, id: &PartyId) -> Result<&PublicAuxInfo, LocalError> {
        self.key_share.public_aux(id)
    }

    pub fn pk(&self, id: &PartyId) -> Result<&PublicKeyPaillier, LocalError> {
        Ok(&self.public_aux(id)?.paillier_pk)
    }

    pub fn my_pk(&self) -> Result<&PublicKeyPaillier, LocalError> {
        self.pk(&self.my_id)
    }

    pub fn sk(&self) -> &SecretKeyPaillier {
        self.key_share.paillier_sk()
    }

    /// The ring-Pedersen parameters the party `id` verifies proofs with.
    pub fn setup(&self, id: &PartyId) -> Result<&RPParams, LocalError> {
        Ok(&self.public_aux(id)?.rp_params)
    }

    pub fn my_setup(&self) -> Result<&RPParams, LocalError> {
        self.setup(&self.my_id)
    }

    pub fn public_share(&self, id: &PartyId) -> Result<&Point, LocalError> {
        self.key_share.public_share(id)
    }

    /// The Fiat-Shamir auxiliary data for proofs made by `prover`.
    pub fn proof_aux<'a>(&'a self, prover: &'a PartyId) -> (&'a SessionId, &'a PartyId) {
        (&self.session_id, prover)
    }
}
