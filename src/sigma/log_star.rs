//! Knowledge of Exponent vs Paillier Encryption ($\Pi^{log*}$, Section C.2, Fig. 25)

use num_bigint::{BigInt, BigUint};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::challenge;
use crate::{
    curve::Point,
    paillier::{Ciphertext, PublicKeyPaillier, RPCommitment, RPParams},
    params::SchemeParams,
    sessions::LocalError,
    tools::hashing::{Chain, Hashable, Hasher},
    uint::{bigint_to_scalar, in_range_bits, pow_signed, random_bounded_bits},
};

const HASH_TAG: &[u8] = b"P_log*";

pub(crate) struct LogStarSecretInputs<'a> {
    /// $x \in \pm 2^\ell$.
    pub x: &'a BigInt,
    /// $\rho$, a Paillier randomizer for the public key $N_0$.
    pub rho: &'a BigUint,
}

pub(crate) struct LogStarPublicInputs<'a> {
    /// Paillier public key $N_0$.
    pub pk0: &'a PublicKeyPaillier,
    /// Paillier ciphertext $C = enc_0(x, \rho)$.
    pub cap_c: &'a Ciphertext,
    /// Point base $g$.
    pub g: &'a Point,
    /// Point $X = g * x$.
    pub cap_x: &'a Point,
}

/// ZK proof: Knowledge of Exponent vs Paillier Encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LogStarProof {
    cap_s: RPCommitment,
    cap_a: Ciphertext,
    cap_y: Point,
    cap_d: RPCommitment,
    z1: BigInt,
    z2: BigUint,
    z3: BigInt,
}

impl LogStarProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        secret: LogStarSecretInputs<'_>,
        public: LogStarPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let pk0 = public.pk0;

        let alpha = random_bounded_bits(rng, P::L_BOUND + P::EPS_BOUND);
        let mu = setup.random_randomizer(rng, P::L_BOUND);
        let r = pk0.random_randomizer(rng)?;
        let gamma = setup.random_randomizer(rng, P::L_BOUND + P::EPS_BOUND);

        let cap_s = setup.commit(secret.x, &mu);
        let cap_a = Ciphertext::new_with_randomizer(pk0, &alpha, &r);
        let cap_y = *public.g * bigint_to_scalar(&alpha);
        let cap_d = setup.commit(&alpha, &gamma);

        let e = challenge(transcript::<P>(&public, setup, aux, (&cap_s, &cap_a, &cap_y, &cap_d)));

        let z1 = &alpha + &e * secret.x;
        let z2 = (r * pow_signed(secret.rho, &e, pk0.modulus())) % pk0.modulus();
        let z3 = gamma + &e * mu;

        Ok(Self {
            cap_s,
            cap_a,
            cap_y,
            cap_d,
            z1,
            z2,
            z3,
        })
    }

    pub fn verify<P: SchemeParams>(
        &self,
        public: LogStarPublicInputs<'_>,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> bool {
        let pk0 = public.pk0;

        if !self.cap_a.is_valid(pk0) || !self.cap_s.is_valid(setup) || !self.cap_d.is_valid(setup) {
            return false;
        }

        let e = challenge(transcript::<P>(
            &public,
            setup,
            aux,
            (&self.cap_s, &self.cap_a, &self.cap_y, &self.cap_d),
        ));

        // z_1 \in \pm 2^{\ell + \eps}
        if !in_range_bits(&self.z1, P::L_BOUND + P::EPS_BOUND) {
            return false;
        }

        // enc_0(z_1, z_2) == A (+) C (*) e
        let c = Ciphertext::new_with_randomizer(pk0, &self.z1, &self.z2);
        if c != self.cap_a.homomorphic_add(pk0, &public.cap_c.homomorphic_mul(pk0, &e)) {
            return false;
        }

        // g^{z_1} == Y X^e
        if *public.g * bigint_to_scalar(&self.z1) != self.cap_y + *public.cap_x * bigint_to_scalar(&e) {
            return false;
        }

        // s^{z_1} t^{z_3} == D S^e \mod \hat{N}
        if setup.commit(&self.z1, &self.z3) != self.cap_s.pow_mul(&e, &self.cap_d, setup) {
            return false;
        }

        true
    }
}

fn transcript<P: SchemeParams>(
    public: &LogStarPublicInputs<'_>,
    setup: &RPParams,
    aux: &impl Hashable,
    commitments: (&RPCommitment, &Ciphertext, &Point, &RPCommitment),
) -> Hasher<P> {
    Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(public.pk0)
        .chain(public.cap_c)
        .chain(public.g)
        .chain(public.cap_x)
        .chain(setup)
        .chain(aux)
        .chain(&commitments)
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::{LogStarProof, LogStarPublicInputs, LogStarSecretInputs};
    use crate::{
        curve::{Point, Scalar},
        paillier::{Ciphertext, RPParams, SecretKeyPaillier},
        params::{PaillierTest, TestParams},
        uint::{bigint_to_scalar, scalar_to_bigint},
    };

    #[test]
    fn prove_and_verify() {
        type Params = TestParams;

        let sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let pk = sk.public_key();

        let aux_sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let (setup, _) = RPParams::random_with_secret(&mut OsRng, &aux_sk).unwrap();

        let aux: &[u8] = b"abcde";

        let g = Point::GENERATOR * Scalar::random_nonzero(&mut OsRng);
        let x = scalar_to_bigint(&Scalar::random(&mut OsRng));
        let (cap_c, rho) = Ciphertext::new(&mut OsRng, &pk, &x).unwrap();
        let cap_x = g * bigint_to_scalar(&x);

        let public = || LogStarPublicInputs {
            pk0: &pk,
            cap_c: &cap_c,
            g: &g,
            cap_x: &cap_x,
        };

        let proof =
            LogStarProof::new::<Params>(&mut OsRng, LogStarSecretInputs { x: &x, rho: &rho }, public(), &setup, &aux)
                .unwrap();
        assert!(proof.verify::<Params>(public(), &setup, &aux));

        // A different base must not verify
        assert!(!proof.verify::<Params>(
            LogStarPublicInputs {
                g: &Point::GENERATOR,
                ..public()
            },
            &setup,
            &aux
        ));
    }
}
