//! Signing with a presignature, and the round identifying the culprits if the signature does not verify.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigInt;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{common::Context, Stage};
use crate::{
    curve::{RecoverableSignature, Scalar},
    entities::{pairwise_get, PartyId, PreSignature, PresignRecord},
    mta::{verify_affine_group, MtaKeys},
    paillier::{Ciphertext, PublicKeyPaillier},
    params::SchemeParams,
    rounds::{no_parties, FinalizeError, Outgoing, ReceiveError, Round},
    sessions::{AbortKind, Failure, LocalError, SessionOutput},
    sigma::{
        DecProof, DecPublicInputs, DecSecretInputs, MulStarProof, MulStarPublicInputs, MulStarSecretInputs, ProofBlob,
    },
    tools::parallel::par_map_parties,
    uint::scalar_to_bigint,
};

#[derive(Debug)]
pub(crate) struct SignRound1<P: SchemeParams> {
    context: Context<P>,
    presignature: PreSignature<P>,
    message: Scalar,
}

impl<P: SchemeParams> SignRound1<P> {
    pub fn new(context: Context<P>, presignature: PreSignature<P>, message: Scalar) -> Self {
        Self {
            context,
            presignature,
            message,
        }
    }
}

impl<P: SchemeParams> Round<P> for SignRound1<P> {
    const ROUND_NUM: u8 = 6;
    const NEXT_ROUND_NUMS: &'static [u8] = &[7];
    const EXPECTS_BROADCAST: bool = false;
    const EXPECTS_DIRECT: bool = false;

    type BroadcastMessage = ();
    type DirectMessage = ();
    type Payload = ();

    fn expecting_messages_from(&self) -> &BTreeSet<PartyId> {
        no_parties()
    }

    fn verify_message(
        &self,
        _from: &PartyId,
        _broadcast: Self::BroadcastMessage,
        _direct: Self::DirectMessage,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(())
    }

    fn finalize(
        self,
        _rng: &mut impl CryptoRngCore,
        _payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        let r = self.presignature.nonce.x_coordinate();
        let k = self.presignature.ephemeral_scalar_share.expose_secret();
        let chi = self.presignature.product_share.expose_secret();
        let sigma = *k * self.message + r * chi;

        debug!("{}: created a signature share", self.context.my_id);

        let outgoing = Outgoing::none().with_broadcast(&Round2Broadcast { sigma })?;
        let next = SignRound2 {
            context: self.context,
            presignature: self.presignature,
            message: self.message,
            r,
            sigma,
        };
        Ok((Stage::Sign2(next), outgoing))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Round2Broadcast {
    /// `\sigma_i`
    sigma: Scalar,
}

#[derive(Debug)]
pub(crate) struct SignRound2<P: SchemeParams> {
    context: Context<P>,
    presignature: PreSignature<P>,
    message: Scalar,
    /// The x-coordinate of the nonce.
    r: Scalar,
    sigma: Scalar,
}

impl<P: SchemeParams> Round<P> for SignRound2<P> {
    const ROUND_NUM: u8 = 7;
    const NEXT_ROUND_NUMS: &'static [u8] = &[8];
    const EXPECTS_BROADCAST: bool = true;
    const EXPECTS_DIRECT: bool = false;

    type BroadcastMessage = Round2Broadcast;
    type DirectMessage = ();
    type Payload = Scalar;

    fn expecting_messages_from(&self) -> &BTreeSet<PartyId> {
        &self.context.other_ids
    }

    fn verify_message(
        &self,
        _from: &PartyId,
        broadcast: Self::BroadcastMessage,
        _direct: Self::DirectMessage,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(broadcast.sigma)
    }

    fn finalize(
        self,
        rng: &mut impl CryptoRngCore,
        payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        let my_id = self.context.my_id;
        let s = payloads.values().sum::<Scalar>() + self.sigma;
        let vkey = self.context.key_share.verifying_key_as_point();

        if let Some(signature) = RecoverableSignature::from_scalars(&self.r, &s, &vkey, &self.message) {
            info!("{my_id}: signature created");
            return Ok((Stage::Success(SessionOutput::Signature(signature)), Outgoing::none()));
        }

        warn!("{my_id}: the assembled signature is invalid, proving own computations");

        let mut sigmas = payloads;
        sigmas.insert(my_id, self.sigma);

        let record = &self.presignature.record;
        let evidence = make_sigma_evidence(rng, &self.context, record, &self.r, &self.message, &self.sigma)?;
        let outgoing = Outgoing::none().with_broadcast(&evidence)?;
        let next = AbortRound2 {
            context: self.context,
            record: self.presignature.record,
            r: self.r,
            message: self.message,
            sigmas,
            own_evidence: evidence,
        };
        Ok((Stage::Abort2(next), outgoing))
    }
}

/// Evidence that a party computed its `sigma_i` honestly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AbortRound2Broadcast {
    /// `\hat{H}_i`, an encryption of `k_i * x_i`.
    hat_cap_h: Ciphertext,
    /// Binds `\hat{H}_i` to `K_i` and the public share `X_i`, indexed by verifier.
    mul_star_proofs: BTreeMap<PartyId, ProofBlob>,
    /// Chi MtA proofs, indexed as `[receiver][verifier]`.
    aff_g_proofs: BTreeMap<PartyId, BTreeMap<PartyId, ProofBlob>>,
    /// Proofs that `sigma_i` is the plaintext of the aggregated ciphertext, indexed by verifier.
    dec_proofs: BTreeMap<PartyId, ProofBlob>,
}

/// `(\hat{H}_i (+) sum_j \hat{D}_{j,i} (+) sum_j \hat{F}_{i,j}) (*) r (+) K_i (*) m`,
/// an encryption of `sigma_i` under `owner`'s key.
fn sigma_ciphertext(
    pk: &PublicKeyPaillier,
    hat_cap_h: &Ciphertext,
    record: &PresignRecord,
    owner: &PartyId,
    r: &Scalar,
    message: &Scalar,
) -> Result<Ciphertext, LocalError> {
    let mut parts = vec![hat_cap_h];
    for id in record.signers().iter().filter(|id| *id != owner) {
        parts.push(pairwise_get(&record.hat_cap_d, id, owner)?);
        parts.push(pairwise_get(&record.hat_cap_f, owner, id)?);
    }
    let chi = Ciphertext::product(pk, parts);
    let k_times_message = record.cap_k(owner)?.homomorphic_mul(pk, &scalar_to_bigint(message));
    Ok(chi
        .homomorphic_mul(pk, &scalar_to_bigint(r))
        .homomorphic_add(pk, &k_times_message))
}

fn make_sigma_evidence<P: SchemeParams>(
    rng: &mut impl CryptoRngCore,
    ctx: &Context<P>,
    record: &PresignRecord,
    r: &Scalar,
    message: &Scalar,
    sigma: &Scalar,
) -> Result<AbortRound2Broadcast, LocalError> {
    let my_id = ctx.my_id;
    let pk = ctx.my_pk()?;
    let aux = ctx.proof_aux(&my_id);

    let k = scalar_to_bigint(record.k.expose_secret());
    let x = scalar_to_bigint(ctx.key_share.secret_share.expose_secret());
    let cap_k = record.cap_k(&my_id)?;
    let cap_x = ctx.public_share(&my_id)?;

    let rho_h = pk.random_randomizer(rng)?;
    let hat_cap_h = cap_k.homomorphic_mul(pk, &x).mul_randomizer(pk, &rho_h);

    let mul_star_proofs = par_map_parties(rng, &ctx.all_ids, |rng, verifier| {
        let proof = MulStarProof::new::<P>(
            rng,
            MulStarSecretInputs { x: &x, rho: &rho_h },
            MulStarPublicInputs {
                pk0: pk,
                cap_c: cap_k,
                cap_d: &hat_cap_h,
                cap_x,
            },
            ctx.setup(verifier)?,
            &aux,
        )?;
        ProofBlob::new(&proof)
    })?;

    let aff_g_proofs = par_map_parties(rng, &ctx.other_ids, |rng, id| {
        let share = record
            .chi_mta
            .get(id)
            .ok_or_else(|| LocalError::new(format!("The Chi MtA share is missing for {id}")))?;
        let keys = MtaKeys {
            sender_pk: pk,
            receiver_pk: ctx.pk(id)?,
            cap_b: record.cap_k(id)?,
        };
        ctx.all_ids
            .iter()
            .map(|verifier| {
                let proof = share.prove_affine_group::<P>(rng, &x, cap_x, keys, ctx.setup(verifier)?, &aux)?;
                Ok((*verifier, proof))
            })
            .collect::<Result<BTreeMap<_, _>, LocalError>>()
    })?;

    let cap_c = sigma_ciphertext(pk, &hat_cap_h, record, &my_id, r, message)?;
    let hat_beta_sum = record.chi_mta.values().map(|share| &share.beta).sum::<BigInt>();
    let chi = &k * &x + &record.hat_alpha_sum + hat_beta_sum;
    let y = chi * scalar_to_bigint(r) + &k * scalar_to_bigint(message);
    let rho = cap_c.derive_randomizer(ctx.sk());

    let dec_proofs = par_map_parties(rng, &ctx.all_ids, |rng, verifier| {
        let proof = DecProof::new::<P>(
            rng,
            DecSecretInputs { y: &y, rho: &rho },
            DecPublicInputs {
                pk0: pk,
                x: sigma,
                cap_c: &cap_c,
            },
            ctx.setup(verifier)?,
            &aux,
        )?;
        ProofBlob::new(&proof)
    })?;

    Ok(AbortRound2Broadcast {
        hat_cap_h,
        mul_star_proofs,
        aff_g_proofs,
        dec_proofs,
    })
}

#[derive(Debug)]
pub(crate) struct AbortRound2<P: SchemeParams> {
    context: Context<P>,
    record: PresignRecord,
    r: Scalar,
    message: Scalar,
    /// The `sigma_j` every signer claimed.
    sigmas: BTreeMap<PartyId, Scalar>,
    own_evidence: AbortRound2Broadcast,
}

impl<P: SchemeParams> AbortRound2<P> {
    fn evidence_is_valid(&self, from: &PartyId, evidence: &AbortRound2Broadcast) -> Result<bool, LocalError> {
        let ctx = &self.context;
        let record = &self.record;
        let my_id = &ctx.my_id;

        let pk = ctx.pk(from)?;
        let setup = ctx.my_setup()?;
        let aux = ctx.proof_aux(from);
        let cap_k = record.cap_k(from)?;
        let cap_x = ctx.public_share(from)?;

        if !evidence.hat_cap_h.is_valid(pk) {
            debug!("{my_id}: invalid H from {from}");
            return Ok(false);
        }

        let mul_star_ok = evidence
            .mul_star_proofs
            .get(my_id)
            .and_then(|proof| proof.decode::<MulStarProof>())
            .is_some_and(|proof| {
                proof.verify::<P>(
                    MulStarPublicInputs {
                        pk0: pk,
                        cap_c: cap_k,
                        cap_d: &evidence.hat_cap_h,
                        cap_x,
                    },
                    setup,
                    &aux,
                )
            });
        if !mul_star_ok {
            debug!("{my_id}: failed to verify the mul* proof from {from}");
            return Ok(false);
        }

        for id in ctx.all_ids.iter().filter(|id| *id != from) {
            let Some(proof) = evidence.aff_g_proofs.get(id).and_then(|proofs| proofs.get(my_id)) else {
                return Ok(false);
            };
            let keys = MtaKeys {
                sender_pk: pk,
                receiver_pk: ctx.pk(id)?,
                cap_b: record.cap_k(id)?,
            };
            let cap_d = pairwise_get(&record.hat_cap_d, from, id)?;
            let cap_f = pairwise_get(&record.hat_cap_f, from, id)?;
            if !verify_affine_group::<P>(proof, keys, cap_d, cap_f, cap_x, setup, &aux) {
                debug!("{my_id}: failed to verify the Chi MtA proof from {from} for {id}");
                return Ok(false);
            }
        }

        let sigma = self
            .sigmas
            .get(from)
            .ok_or_else(|| LocalError::new(format!("sigma is missing for {from}")))?;
        let cap_c = sigma_ciphertext(pk, &evidence.hat_cap_h, record, from, &self.r, &self.message)?;
        let dec_ok = evidence
            .dec_proofs
            .get(my_id)
            .and_then(|proof| proof.decode::<DecProof>())
            .is_some_and(|proof| {
                proof.verify::<P>(
                    DecPublicInputs {
                        pk0: pk,
                        x: sigma,
                        cap_c: &cap_c,
                    },
                    setup,
                    &aux,
                )
            });
        if !dec_ok {
            debug!("{my_id}: failed to verify the dec proof from {from}");
        }
        Ok(dec_ok)
    }
}

impl<P: SchemeParams> Round<P> for AbortRound2<P> {
    const ROUND_NUM: u8 = 8;
    const NEXT_ROUND_NUMS: &'static [u8] = &[];
    const EXPECTS_BROADCAST: bool = true;
    const EXPECTS_DIRECT: bool = false;

    type BroadcastMessage = AbortRound2Broadcast;
    type DirectMessage = ();
    type Payload = bool;

    fn expecting_messages_from(&self) -> &BTreeSet<PartyId> {
        &self.context.other_ids
    }

    fn verify_message(
        &self,
        from: &PartyId,
        broadcast: Self::BroadcastMessage,
        _direct: Self::DirectMessage,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(self.evidence_is_valid(from, &broadcast)?)
    }

    fn finalize(
        self,
        _rng: &mut impl CryptoRngCore,
        payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        let my_id = self.context.my_id;
        let mut culprits = payloads
            .into_iter()
            .filter(|(_id, valid)| !valid)
            .map(|(id, _valid)| id)
            .collect::<BTreeSet<_>>();
        if !self.evidence_is_valid(&my_id, &self.own_evidence)? {
            culprits.insert(my_id);
        }

        warn!("{my_id}: signing aborted, culprits: {culprits:?}");
        let failure = Failure::new(AbortKind::Signing, culprits);
        Ok((Stage::Failure(failure), Outgoing::none()))
    }
}
