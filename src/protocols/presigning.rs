//! Presigning: four rounds producing a [`PreSignature`],
//! and a round that identifies the culprits if the result turns out to be inconsistent.

use core::marker::PhantomData;
use std::collections::{BTreeMap, BTreeSet};

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{common::Context, signing::SignRound1, Stage};
use crate::{
    curve::{Point, Scalar},
    entities::{pairwise_get, PairwiseCiphertexts, PartyId, PreSignature, PresignRecord},
    mta::{decrypt_share, verify_affine_group, verify_affine_paillier, MtaKeys, MtaShare},
    paillier::{Ciphertext, PublicKeyPaillier},
    params::SchemeParams,
    rounds::{no_parties, FinalizeError, Outgoing, ReceiveError, Round},
    sessions::{AbortKind, Failure, LocalError, SessionId, SessionOutput},
    sigma::{
        DecProof, DecPublicInputs, DecSecretInputs, EncProof, EncPublicInputs, EncSecretInputs, LogStarProof,
        LogStarPublicInputs, LogStarSecretInputs, MulProof, MulPublicInputs, MulSecretInputs, ProofBlob,
    },
    tools::{
        hashing::{Chain, HashOutput, Hasher},
        parallel::par_map_parties,
        Secret,
    },
    uint::{bigint_to_scalar, scalar_to_bigint},
};

const PRESIGNATURE_ID_TAG: &[u8] = b"presignature-id";

fn commit_to_id<P: SchemeParams>(
    session_id: &SessionId,
    owner: &PartyId,
    contribution: &[u8; 32],
    salt: &[u8; 32],
) -> HashOutput {
    Hasher::<P>::new_with_dst(PRESIGNATURE_ID_TAG)
        .chain(session_id)
        .chain(owner)
        .chain_bytes(contribution)
        .chain_bytes(salt)
        .finalize()
}

#[derive(Debug, Clone)]
struct SecretData {
    k: Secret<Scalar>,
    gamma: Secret<Scalar>,
    /// The randomizer of `K_i`.
    rho: BigUint,
    /// The randomizer of `G_i`.
    nu: BigUint,
}

/// This party's contribution to the presignature ID.
#[derive(Debug, Clone, Copy)]
struct IdContribution {
    value: [u8; 32],
    salt: [u8; 32],
}

#[derive(Debug)]
pub(crate) struct PresignRound1<P: SchemeParams> {
    context: Context<P>,
    message: Option<Scalar>,
    secret: SecretData,
    cap_k: Ciphertext,
    cap_g: Ciphertext,
    id: IdContribution,
}

impl<P: SchemeParams> PresignRound1<P> {
    /// If `message` is given, the presigning continues into signing it.
    pub fn new(
        rng: &mut impl CryptoRngCore,
        context: Context<P>,
        message: Option<Scalar>,
    ) -> Result<Self, LocalError> {
        let k = Secret::init_with(|| Scalar::random_nonzero(rng));
        let gamma = Secret::init_with(|| Scalar::random_nonzero(rng));

        let pk = context.my_pk()?;
        let (cap_k, rho) = Ciphertext::new(rng, pk, &scalar_to_bigint(k.expose_secret()))?;
        let (cap_g, nu) = Ciphertext::new(rng, pk, &scalar_to_bigint(gamma.expose_secret()))?;

        let mut value = [0u8; 32];
        rng.fill_bytes(&mut value);
        let mut salt = [0u8; 32];
        rng.fill_bytes(&mut salt);

        Ok(Self {
            context,
            message,
            secret: SecretData { k, gamma, rho, nu },
            cap_k,
            cap_g,
            id: IdContribution { value, salt },
        })
    }
}

impl<P: SchemeParams> Round<P> for PresignRound1<P> {
    const ROUND_NUM: u8 = 1;
    const NEXT_ROUND_NUMS: &'static [u8] = &[2];
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
        rng: &mut impl CryptoRngCore,
        _payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        let ctx = &self.context;
        let pk = ctx.my_pk()?;
        let aux = ctx.proof_aux(&ctx.my_id);
        let k = scalar_to_bigint(self.secret.k.expose_secret());

        let psi0 = par_map_parties(rng, &ctx.other_ids, |rng, id| {
            let proof = EncProof::new::<P>(
                rng,
                EncSecretInputs {
                    k: &k,
                    rho: &self.secret.rho,
                },
                EncPublicInputs {
                    pk0: pk,
                    cap_k: &self.cap_k,
                },
                ctx.setup(id)?,
                &aux,
            )?;
            ProofBlob::new(&proof)
        })?;

        let mut outgoing = Outgoing::none().with_broadcast(&Round2Broadcast {
            cap_k: self.cap_k.clone(),
            cap_g: self.cap_g.clone(),
            id_commitment: commit_to_id::<P>(&ctx.session_id, &ctx.my_id, &self.id.value, &self.id.salt),
        })?;
        for (id, psi0) in psi0 {
            outgoing = outgoing.with_direct(id, &Round2Direct { psi0 })?;
        }

        debug!("{}: starting presigning", ctx.my_id);

        let next = PresignRound2 {
            context: self.context,
            message: self.message,
            secret: self.secret,
            cap_k: self.cap_k,
            cap_g: self.cap_g,
            id: self.id,
        };
        Ok((Stage::Presign2(next), outgoing))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Round2Broadcast {
    cap_k: Ciphertext,
    cap_g: Ciphertext,
    id_commitment: HashOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Round2Direct {
    psi0: ProofBlob,
}

#[derive(Debug)]
pub(crate) struct PresignRound2<P: SchemeParams> {
    context: Context<P>,
    message: Option<Scalar>,
    secret: SecretData,
    cap_k: Ciphertext,
    cap_g: Ciphertext,
    id: IdContribution,
}

impl<P: SchemeParams> Round<P> for PresignRound2<P> {
    const ROUND_NUM: u8 = 2;
    const NEXT_ROUND_NUMS: &'static [u8] = &[3];
    const EXPECTS_BROADCAST: bool = true;
    const EXPECTS_DIRECT: bool = true;

    type BroadcastMessage = Round2Broadcast;
    type DirectMessage = Round2Direct;
    type Payload = Round2Broadcast;

    fn expecting_messages_from(&self) -> &BTreeSet<PartyId> {
        &self.context.other_ids
    }

    fn verify_message(
        &self,
        from: &PartyId,
        broadcast: Self::BroadcastMessage,
        direct: Self::DirectMessage,
    ) -> Result<Self::Payload, ReceiveError> {
        let pk = self.context.pk(from)?;
        if !broadcast.cap_k.is_valid(pk) || !broadcast.cap_g.is_valid(pk) {
            return Err(ReceiveError::invalid("Invalid K or G ciphertext"));
        }

        let setup = self.context.my_setup()?;
        let aux = self.context.proof_aux(from);
        let verified = direct.psi0.decode::<EncProof>().is_some_and(|proof| {
            proof.verify::<P>(
                EncPublicInputs {
                    pk0: pk,
                    cap_k: &broadcast.cap_k,
                },
                setup,
                &aux,
            )
        });
        if !verified {
            return Err(ReceiveError::invalid("Failed to verify the encryption proof for K"));
        }

        Ok(broadcast)
    }

    fn finalize(
        self,
        rng: &mut impl CryptoRngCore,
        payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        let ctx = &self.context;
        let my_id = ctx.my_id;

        let mut cap_k = BTreeMap::new();
        let mut cap_g = BTreeMap::new();
        let mut id_commitments = BTreeMap::new();
        for (id, payload) in payloads {
            cap_k.insert(id, payload.cap_k);
            cap_g.insert(id, payload.cap_g);
            id_commitments.insert(id, payload.id_commitment);
        }
        cap_k.insert(my_id, self.cap_k.clone());
        cap_g.insert(my_id, self.cap_g.clone());

        let gamma = scalar_to_bigint(self.secret.gamma.expose_secret());
        let x = scalar_to_bigint(ctx.key_share.secret_share.expose_secret());
        let cap_gamma = self.secret.gamma.expose_secret().mul_by_generator();

        let my_pk = ctx.my_pk()?;
        let my_public_share = ctx.public_share(&my_id)?;
        let aux = ctx.proof_aux(&my_id);

        let exchanges = par_map_parties(rng, &ctx.other_ids, |rng, id| {
            let setup = ctx.setup(id)?;
            let keys = MtaKeys {
                sender_pk: my_pk,
                receiver_pk: ctx.pk(id)?,
                cap_b: cap_k
                    .get(id)
                    .ok_or_else(|| LocalError::new(format!("K is missing for {id}")))?,
            };

            let delta = MtaShare::new::<P>(rng, &gamma, keys)?;
            let psi = delta.prove_affine_paillier::<P>(rng, &gamma, &self.secret.nu, &self.cap_g, keys, setup, &aux)?;

            let chi = MtaShare::new::<P>(rng, &x, keys)?;
            let hat_psi = chi.prove_affine_group::<P>(rng, &x, my_public_share, keys, setup, &aux)?;

            let psi_prime = LogStarProof::new::<P>(
                rng,
                LogStarSecretInputs {
                    x: &gamma,
                    rho: &self.secret.nu,
                },
                LogStarPublicInputs {
                    pk0: my_pk,
                    cap_c: &self.cap_g,
                    g: &Point::GENERATOR,
                    cap_x: &cap_gamma,
                },
                setup,
                &aux,
            )?;

            let direct = Round3Direct {
                cap_d: delta.cap_d.clone(),
                cap_f: delta.cap_f.clone(),
                hat_cap_d: chi.cap_d.clone(),
                hat_cap_f: chi.cap_f.clone(),
                psi,
                hat_psi,
                psi_prime: ProofBlob::new(&psi_prime)?,
            };
            Ok::<_, LocalError>((delta, chi, direct))
        })?;

        let mut broadcast = Round3Broadcast {
            cap_gamma,
            cap_d: BTreeMap::new(),
            cap_f: BTreeMap::new(),
            hat_cap_d: BTreeMap::new(),
            hat_cap_f: BTreeMap::new(),
        };
        let mut delta_mta = BTreeMap::new();
        let mut chi_mta = BTreeMap::new();
        let mut outgoing = Outgoing::none();
        for (id, (delta, chi, direct)) in exchanges {
            broadcast.cap_d.insert(id, delta.cap_d.clone());
            broadcast.cap_f.insert(id, delta.cap_f.clone());
            broadcast.hat_cap_d.insert(id, chi.cap_d.clone());
            broadcast.hat_cap_f.insert(id, chi.cap_f.clone());
            outgoing = outgoing.with_direct(id, &direct)?;
            delta_mta.insert(id, delta);
            chi_mta.insert(id, chi);
        }
        let outgoing = outgoing.with_broadcast(&broadcast)?;

        debug!("{my_id}: MtA ciphertexts produced");

        let next = PresignRound3 {
            context: self.context,
            message: self.message,
            secret: self.secret,
            cap_k,
            cap_g,
            cap_gamma,
            delta_mta,
            chi_mta,
            id: self.id,
            id_commitments,
        };
        Ok((Stage::Presign3(next), outgoing))
    }
}

/// The ciphertexts of both MtA instances from the sender to every other signer.
///
/// Broadcast so that every party holds the full set of pairwise ciphertexts
/// in case it has to check abort evidence later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Round3Broadcast {
    /// `\Gamma_i`
    cap_gamma: Point,
    cap_d: BTreeMap<PartyId, Ciphertext>,
    cap_f: BTreeMap<PartyId, Ciphertext>,
    hat_cap_d: BTreeMap<PartyId, Ciphertext>,
    hat_cap_f: BTreeMap<PartyId, Ciphertext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Round3Direct {
    cap_d: Ciphertext,
    cap_f: Ciphertext,
    hat_cap_d: Ciphertext,
    hat_cap_f: Ciphertext,
    psi: ProofBlob,
    hat_psi: ProofBlob,
    psi_prime: ProofBlob,
}

#[derive(Debug)]
pub(crate) struct PresignRound3<P: SchemeParams> {
    context: Context<P>,
    message: Option<Scalar>,
    secret: SecretData,
    cap_k: BTreeMap<PartyId, Ciphertext>,
    cap_g: BTreeMap<PartyId, Ciphertext>,
    cap_gamma: Point,
    delta_mta: BTreeMap<PartyId, MtaShare>,
    chi_mta: BTreeMap<PartyId, MtaShare>,
    id: IdContribution,
    id_commitments: BTreeMap<PartyId, HashOutput>,
}

impl<P: SchemeParams> PresignRound3<P> {
    fn get<'a>(map: &'a BTreeMap<PartyId, Ciphertext>, id: &PartyId) -> Result<&'a Ciphertext, LocalError> {
        map.get(id)
            .ok_or_else(|| LocalError::new(format!("A ciphertext is missing for {id}")))
    }
}

impl<P: SchemeParams> Round<P> for PresignRound3<P> {
    const ROUND_NUM: u8 = 3;
    const NEXT_ROUND_NUMS: &'static [u8] = &[4];
    const EXPECTS_BROADCAST: bool = true;
    const EXPECTS_DIRECT: bool = true;

    type BroadcastMessage = Round3Broadcast;
    type DirectMessage = Round3Direct;
    type Payload = Round3Broadcast;

    fn expecting_messages_from(&self) -> &BTreeSet<PartyId> {
        &self.context.other_ids
    }

    fn verify_message(
        &self,
        from: &PartyId,
        broadcast: Self::BroadcastMessage,
        direct: Self::DirectMessage,
    ) -> Result<Self::Payload, ReceiveError> {
        let ctx = &self.context;
        let my_id = &ctx.my_id;
        let from_pk = ctx.pk(from)?;

        let receivers = ctx.all_ids.iter().filter(|id| *id != from).collect::<Vec<_>>();
        for row in [
            &broadcast.cap_d,
            &broadcast.cap_f,
            &broadcast.hat_cap_d,
            &broadcast.hat_cap_f,
        ] {
            if !row.keys().eq(receivers.iter().cloned()) {
                return Err(ReceiveError::invalid("The MtA ciphertexts do not match the signers"));
            }
        }

        for id in receivers.iter() {
            let receiver_pk = ctx.pk(id)?;
            let valid = Self::get(&broadcast.cap_d, id)?.is_valid(receiver_pk)
                && Self::get(&broadcast.hat_cap_d, id)?.is_valid(receiver_pk)
                && Self::get(&broadcast.cap_f, id)?.is_valid(from_pk)
                && Self::get(&broadcast.hat_cap_f, id)?.is_valid(from_pk);
            if !valid {
                return Err(ReceiveError::invalid(format!("Invalid MtA ciphertexts for {id}")));
            }
        }

        if Self::get(&broadcast.cap_d, my_id)? != &direct.cap_d
            || Self::get(&broadcast.cap_f, my_id)? != &direct.cap_f
            || Self::get(&broadcast.hat_cap_d, my_id)? != &direct.hat_cap_d
            || Self::get(&broadcast.hat_cap_f, my_id)? != &direct.hat_cap_f
        {
            return Err(ReceiveError::invalid(
                "The direct MtA ciphertexts differ from the broadcasted ones",
            ));
        }

        let setup = ctx.my_setup()?;
        let aux = ctx.proof_aux(from);
        let cap_g = Self::get(&self.cap_g, from)?;
        let keys = MtaKeys {
            sender_pk: from_pk,
            receiver_pk: ctx.my_pk()?,
            cap_b: Self::get(&self.cap_k, my_id)?,
        };

        if !verify_affine_paillier::<P>(&direct.psi, keys, &direct.cap_d, &direct.cap_f, cap_g, setup, &aux) {
            return Err(ReceiveError::invalid("Failed to verify the Delta MtA proof"));
        }

        if !verify_affine_group::<P>(
            &direct.hat_psi,
            keys,
            &direct.hat_cap_d,
            &direct.hat_cap_f,
            ctx.public_share(from)?,
            setup,
            &aux,
        ) {
            return Err(ReceiveError::invalid("Failed to verify the Chi MtA proof"));
        }

        let verified = direct.psi_prime.decode::<LogStarProof>().is_some_and(|proof| {
            proof.verify::<P>(
                LogStarPublicInputs {
                    pk0: from_pk,
                    cap_c: cap_g,
                    g: &Point::GENERATOR,
                    cap_x: &broadcast.cap_gamma,
                },
                setup,
                &aux,
            )
        });
        if !verified {
            return Err(ReceiveError::invalid("Failed to verify the log* proof for Gamma"));
        }

        Ok(broadcast)
    }

    fn finalize(
        self,
        rng: &mut impl CryptoRngCore,
        payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        let ctx = &self.context;
        let my_id = ctx.my_id;
        let sk = ctx.sk();

        let mut alpha_sum = BigInt::zero();
        let mut hat_alpha_sum = BigInt::zero();
        let mut culprits = BTreeSet::new();
        for (id, payload) in payloads.iter() {
            let alpha = decrypt_share::<P>(sk, Self::get(&payload.cap_d, &my_id)?);
            let hat_alpha = decrypt_share::<P>(sk, Self::get(&payload.hat_cap_d, &my_id)?);
            match (alpha, hat_alpha) {
                (Some(alpha), Some(hat_alpha)) => {
                    alpha_sum += alpha;
                    hat_alpha_sum += hat_alpha;
                }
                _ => {
                    culprits.insert(*id);
                }
            }
        }

        if !culprits.is_empty() {
            warn!("{my_id}: MtA values from {culprits:?} are out of range");
            let failure = Failure::new(AbortKind::Decryption, culprits);
            return Ok((Stage::Failure(failure), Outgoing::none()));
        }

        let cap_gamma = payloads.values().map(|payload| payload.cap_gamma).sum::<Point>() + self.cap_gamma;
        let cap_delta = cap_gamma * self.secret.k.expose_secret();

        let k = scalar_to_bigint(self.secret.k.expose_secret());
        let gamma = scalar_to_bigint(self.secret.gamma.expose_secret());
        let x = scalar_to_bigint(ctx.key_share.secret_share.expose_secret());
        let beta_sum = self.delta_mta.values().map(|share| &share.beta).sum::<BigInt>();
        let hat_beta_sum = self.chi_mta.values().map(|share| &share.beta).sum::<BigInt>();

        let delta = bigint_to_scalar(&(&k * &gamma + &alpha_sum + beta_sum));
        let chi = Secret::init_with(|| bigint_to_scalar(&(&k * &x + &hat_alpha_sum + hat_beta_sum)));

        let my_pk = ctx.my_pk()?;
        let my_cap_k = Self::get(&self.cap_k, &my_id)?;
        let aux = ctx.proof_aux(&my_id);
        let psi_pprime = par_map_parties(rng, &ctx.other_ids, |rng, id| {
            let proof = LogStarProof::new::<P>(
                rng,
                LogStarSecretInputs {
                    x: &k,
                    rho: &self.secret.rho,
                },
                LogStarPublicInputs {
                    pk0: my_pk,
                    cap_c: my_cap_k,
                    g: &cap_gamma,
                    cap_x: &cap_delta,
                },
                ctx.setup(id)?,
                &aux,
            )?;
            ProofBlob::new(&proof)
        })?;

        let mut outgoing = Outgoing::none().with_broadcast(&Round4Broadcast {
            delta,
            cap_delta,
            id_contribution: self.id.value,
            id_salt: self.id.salt,
        })?;
        for (id, psi_pprime) in psi_pprime {
            outgoing = outgoing.with_direct(id, &Round4Direct { psi_pprime })?;
        }

        let mut cap_d = PairwiseCiphertexts::new();
        let mut cap_f = PairwiseCiphertexts::new();
        let mut hat_cap_d = PairwiseCiphertexts::new();
        let mut hat_cap_f = PairwiseCiphertexts::new();
        for (id, payload) in payloads {
            cap_d.insert(id, payload.cap_d);
            cap_f.insert(id, payload.cap_f);
            hat_cap_d.insert(id, payload.hat_cap_d);
            hat_cap_f.insert(id, payload.hat_cap_f);
        }
        let own_row = |mta: &BTreeMap<PartyId, MtaShare>, select: fn(&MtaShare) -> Ciphertext| {
            mta.iter().map(|(id, share)| (*id, select(share))).collect::<BTreeMap<_, _>>()
        };
        cap_d.insert(my_id, own_row(&self.delta_mta, |share| share.cap_d.clone()));
        cap_f.insert(my_id, own_row(&self.delta_mta, |share| share.cap_f.clone()));
        hat_cap_d.insert(my_id, own_row(&self.chi_mta, |share| share.cap_d.clone()));
        hat_cap_f.insert(my_id, own_row(&self.chi_mta, |share| share.cap_f.clone()));

        debug!("{my_id}: MtA values decrypted");

        let record = PresignRecord {
            owner: my_id,
            k: self.secret.k,
            gamma: self.secret.gamma,
            rho: self.secret.rho,
            nu: self.secret.nu,
            cap_k: self.cap_k,
            cap_g: self.cap_g,
            cap_d,
            cap_f,
            hat_cap_d,
            hat_cap_f,
            delta_mta: self.delta_mta,
            chi_mta: self.chi_mta,
            alpha_sum,
            hat_alpha_sum,
        };

        let next = PresignRound4 {
            context: self.context,
            message: self.message,
            record,
            cap_gamma,
            delta,
            cap_delta,
            chi,
            id: self.id,
            id_commitments: self.id_commitments,
        };
        Ok((Stage::Presign4(next), outgoing))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Round4Broadcast {
    /// `\delta_i`
    delta: Scalar,
    /// `\Delta_i`
    cap_delta: Point,
    id_contribution: [u8; 32],
    id_salt: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Round4Direct {
    psi_pprime: ProofBlob,
}

#[derive(Debug)]
pub(crate) struct PresignRound4<P: SchemeParams> {
    context: Context<P>,
    message: Option<Scalar>,
    record: PresignRecord,
    /// `\Gamma`, the sum of all the `\Gamma_j`.
    cap_gamma: Point,
    delta: Scalar,
    cap_delta: Point,
    chi: Secret<Scalar>,
    id: IdContribution,
    id_commitments: BTreeMap<PartyId, HashOutput>,
}

impl<P: SchemeParams> Round<P> for PresignRound4<P> {
    const ROUND_NUM: u8 = 4;
    // Either the abort round, or the second signing round if the message was given
    // (the first signing round does not receive any messages).
    const NEXT_ROUND_NUMS: &'static [u8] = &[5, 7];
    const EXPECTS_BROADCAST: bool = true;
    const EXPECTS_DIRECT: bool = true;

    type BroadcastMessage = Round4Broadcast;
    type DirectMessage = Round4Direct;
    type Payload = Round4Broadcast;

    fn expecting_messages_from(&self) -> &BTreeSet<PartyId> {
        &self.context.other_ids
    }

    fn verify_message(
        &self,
        from: &PartyId,
        broadcast: Self::BroadcastMessage,
        direct: Self::DirectMessage,
    ) -> Result<Self::Payload, ReceiveError> {
        let ctx = &self.context;
        let pk0 = ctx.pk(from)?;
        let cap_c = self.record.cap_k(from)?;
        let setup = ctx.my_setup()?;
        let aux = ctx.proof_aux(from);
        let verified = direct.psi_pprime.decode::<LogStarProof>().is_some_and(|proof| {
            proof.verify::<P>(
                LogStarPublicInputs {
                    pk0,
                    cap_c,
                    g: &self.cap_gamma,
                    cap_x: &broadcast.cap_delta,
                },
                setup,
                &aux,
            )
        });
        if !verified {
            return Err(ReceiveError::invalid("Failed to verify the log* proof for Delta"));
        }

        let commitment = self
            .id_commitments
            .get(from)
            .ok_or_else(|| LocalError::new(format!("The presignature ID commitment is missing for {from}")))?;
        let opened = commit_to_id::<P>(&ctx.session_id, from, &broadcast.id_contribution, &broadcast.id_salt);
        if &opened != commitment {
            return Err(ReceiveError::invalid("Invalid presignature ID opening"));
        }

        Ok(broadcast)
    }

    fn finalize(
        self,
        rng: &mut impl CryptoRngCore,
        payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        let my_id = self.context.my_id;

        let delta = payloads.values().map(|payload| payload.delta).sum::<Scalar>() + self.delta;
        let cap_delta = payloads.values().map(|payload| payload.cap_delta).sum::<Point>() + self.cap_delta;

        if delta.mul_by_generator() != cap_delta {
            warn!("{my_id}: presigning consistency check failed, proving own computations");

            let mut deltas = payloads
                .into_iter()
                .map(|(id, payload)| (id, payload.delta))
                .collect::<BTreeMap<_, _>>();
            deltas.insert(my_id, self.delta);

            let evidence = make_delta_evidence(rng, &self.context, &self.record, &self.delta)?;
            let outgoing = Outgoing::none().with_broadcast(&evidence)?;
            let next = AbortRound1 {
                context: self.context,
                record: self.record,
                deltas,
                own_evidence: evidence,
            };
            return Ok((Stage::Abort1(next), outgoing));
        }

        let delta_inv =
            Option::<Scalar>::from(delta.invert()).ok_or_else(|| LocalError::new("The combined delta is zero"))?;
        let nonce = self.cap_gamma * delta_inv;
        if nonce.is_identity() {
            return Err(LocalError::new("The presignature nonce is the identity").into());
        }
        if self.chi.expose_secret().is_zero() {
            return Err(LocalError::new("The product share is zero").into());
        }

        let mut id = self.id.value;
        for payload in payloads.values() {
            for (byte, other) in id.iter_mut().zip(payload.id_contribution.iter()) {
                *byte ^= other;
            }
        }

        info!("{my_id}: presignature created");

        let presignature = PreSignature {
            id,
            nonce,
            ephemeral_scalar_share: self.record.k.clone(),
            product_share: self.chi,
            record: self.record,
            phantom: PhantomData,
        };

        let next = match self.message {
            Some(message) => Stage::Sign1(SignRound1::new(self.context, presignature, message)),
            None => Stage::Success(SessionOutput::PreSignature(presignature)),
        };
        Ok((next, Outgoing::none()))
    }
}

#[cfg(test)]
impl<P: SchemeParams> PresignRound4<P> {
    /// Shifts `delta_i` by one after it was computed,
    /// returning the round 4 broadcast with the shifted value.
    pub(crate) fn shift_delta(&mut self, broadcast: &[u8]) -> Vec<u8> {
        self.delta = self.delta - Scalar::ONE;
        let mut message = bincode::deserialize::<Round4Broadcast>(broadcast).unwrap();
        message.delta = self.delta;
        bincode::serialize(&message).unwrap()
    }
}

/// Evidence that a party computed its `delta_i` honestly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AbortRound1Broadcast {
    /// `H_i`, an encryption of `k_i * gamma_i`.
    cap_h: Ciphertext,
    /// Binds `H_i` to `K_i` and `G_i`.
    mul_proof: ProofBlob,
    /// Delta MtA proofs, indexed as `[receiver][verifier]`.
    aff_p_proofs: BTreeMap<PartyId, BTreeMap<PartyId, ProofBlob>>,
    /// Proofs that `delta_i` is the plaintext of the aggregated ciphertext, indexed by verifier.
    dec_proofs: BTreeMap<PartyId, ProofBlob>,
}

/// `H_i (+) sum_j D_{j,i} (+) sum_j F_{i,j}`, an encryption of `delta_i` under `owner`'s key.
fn delta_ciphertext(
    pk: &PublicKeyPaillier,
    cap_h: &Ciphertext,
    record: &PresignRecord,
    owner: &PartyId,
) -> Result<Ciphertext, LocalError> {
    let mut parts = vec![cap_h];
    for id in record.signers().iter().filter(|id| *id != owner) {
        parts.push(pairwise_get(&record.cap_d, id, owner)?);
        parts.push(pairwise_get(&record.cap_f, owner, id)?);
    }
    Ok(Ciphertext::product(pk, parts))
}

fn make_delta_evidence<P: SchemeParams>(
    rng: &mut impl CryptoRngCore,
    ctx: &Context<P>,
    record: &PresignRecord,
    delta: &Scalar,
) -> Result<AbortRound1Broadcast, LocalError> {
    let my_id = ctx.my_id;
    let pk = ctx.my_pk()?;
    let aux = ctx.proof_aux(&my_id);

    let k = scalar_to_bigint(record.k.expose_secret());
    let gamma = scalar_to_bigint(record.gamma.expose_secret());
    let cap_k = record.cap_k(&my_id)?;
    let cap_g = record.cap_g(&my_id)?;

    let rho_h = pk.random_randomizer(rng)?;
    let cap_h = cap_k.homomorphic_mul(pk, &gamma).mul_randomizer(pk, &rho_h);
    let mul_proof = MulProof::new::<P>(
        rng,
        MulSecretInputs {
            x: &gamma,
            rho_x: &record.nu,
            rho: &rho_h,
        },
        MulPublicInputs {
            pk,
            cap_x: cap_g,
            cap_y: cap_k,
            cap_c: &cap_h,
        },
        &aux,
    )?;

    let aff_p_proofs = par_map_parties(rng, &ctx.other_ids, |rng, id| {
        let share = record
            .delta_mta
            .get(id)
            .ok_or_else(|| LocalError::new(format!("The Delta MtA share is missing for {id}")))?;
        let keys = MtaKeys {
            sender_pk: pk,
            receiver_pk: ctx.pk(id)?,
            cap_b: record.cap_k(id)?,
        };
        ctx.all_ids
            .iter()
            .map(|verifier| {
                let proof =
                    share.prove_affine_paillier::<P>(rng, &gamma, &record.nu, cap_g, keys, ctx.setup(verifier)?, &aux)?;
                Ok((*verifier, proof))
            })
            .collect::<Result<BTreeMap<_, _>, LocalError>>()
    })?;

    // The plaintext is assembled from the stored values since decrypting could lose the sign.
    let cap_c = delta_ciphertext(pk, &cap_h, record, &my_id)?;
    let beta_sum = record.delta_mta.values().map(|share| &share.beta).sum::<BigInt>();
    let y = &k * &gamma + &record.alpha_sum + beta_sum;
    let rho = cap_c.derive_randomizer(ctx.sk());

    let dec_proofs = par_map_parties(rng, &ctx.all_ids, |rng, verifier| {
        let proof = DecProof::new::<P>(
            rng,
            DecSecretInputs { y: &y, rho: &rho },
            DecPublicInputs {
                pk0: pk,
                x: delta,
                cap_c: &cap_c,
            },
            ctx.setup(verifier)?,
            &aux,
        )?;
        ProofBlob::new(&proof)
    })?;

    Ok(AbortRound1Broadcast {
        cap_h,
        mul_proof: ProofBlob::new(&mul_proof)?,
        aff_p_proofs,
        dec_proofs,
    })
}

#[derive(Debug)]
pub(crate) struct AbortRound1<P: SchemeParams> {
    context: Context<P>,
    record: PresignRecord,
    /// The `delta_j` every signer claimed.
    deltas: BTreeMap<PartyId, Scalar>,
    own_evidence: AbortRound1Broadcast,
}

impl<P: SchemeParams> AbortRound1<P> {
    fn evidence_is_valid(&self, from: &PartyId, evidence: &AbortRound1Broadcast) -> Result<bool, LocalError> {
        let ctx = &self.context;
        let record = &self.record;
        let my_id = &ctx.my_id;

        let pk = ctx.pk(from)?;
        let setup = ctx.my_setup()?;
        let aux = ctx.proof_aux(from);
        let cap_g = record.cap_g(from)?;

        if !evidence.cap_h.is_valid(pk) {
            debug!("{my_id}: invalid H from {from}");
            return Ok(false);
        }

        let public = MulPublicInputs {
            pk,
            cap_x: cap_g,
            cap_y: record.cap_k(from)?,
            cap_c: &evidence.cap_h,
        };
        let mul_ok = evidence
            .mul_proof
            .decode::<MulProof>()
            .is_some_and(|proof| proof.verify::<P>(public, &aux));
        if !mul_ok {
            debug!("{my_id}: failed to verify the mul proof from {from}");
            return Ok(false);
        }

        for id in ctx.all_ids.iter().filter(|id| *id != from) {
            let Some(proof) = evidence.aff_p_proofs.get(id).and_then(|proofs| proofs.get(my_id)) else {
                return Ok(false);
            };
            let keys = MtaKeys {
                sender_pk: pk,
                receiver_pk: ctx.pk(id)?,
                cap_b: record.cap_k(id)?,
            };
            let cap_d = pairwise_get(&record.cap_d, from, id)?;
            let cap_f = pairwise_get(&record.cap_f, from, id)?;
            if !verify_affine_paillier::<P>(proof, keys, cap_d, cap_f, cap_g, setup, &aux) {
                debug!("{my_id}: failed to verify the Delta MtA proof from {from} for {id}");
                return Ok(false);
            }
        }

        let delta = self
            .deltas
            .get(from)
            .ok_or_else(|| LocalError::new(format!("delta is missing for {from}")))?;
        let cap_c = delta_ciphertext(pk, &evidence.cap_h, record, from)?;
        let dec_ok = evidence
            .dec_proofs
            .get(my_id)
            .and_then(|proof| proof.decode::<DecProof>())
            .is_some_and(|proof| {
                proof.verify::<P>(
                    DecPublicInputs {
                        pk0: pk,
                        x: delta,
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

impl<P: SchemeParams> Round<P> for AbortRound1<P> {
    const ROUND_NUM: u8 = 5;
    const NEXT_ROUND_NUMS: &'static [u8] = &[];
    const EXPECTS_BROADCAST: bool = true;
    const EXPECTS_DIRECT: bool = false;

    type BroadcastMessage = AbortRound1Broadcast;
    type DirectMessage = ();
    /// Whether the evidence holds up.
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

        warn!("{my_id}: presigning aborted, culprits: {culprits:?}");
        let failure = Failure::new(AbortKind::Presigning, culprits);
        Ok((Stage::Failure(failure), Outgoing::none()))
    }
}
