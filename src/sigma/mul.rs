//! Paillier multiplication ($\Pi^{mul}$, Section C.6, Fig. 29)

use num_bigint::{BigInt, BigUint};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::challenge;
use crate::{
    paillier::{Ciphertext, PublicKeyPaillier},
    params::SchemeParams,
    sessions::LocalError,
    tools::hashing::{Chain, Hashable, Hasher},
    uint::{pow_signed, random_mod},
};

const HASH_TAG: &[u8] = b"P_mul";

pub(crate) struct MulSecretInputs<'a> {
    /// $x$.
    pub x: &'a BigInt,
    /// $\rho_x$, the randomizer of $X$.
    pub rho_x: &'a BigUint,
    /// $\rho$, the extra randomizer of $C$.
    pub rho: &'a BigUint,
}

pub(crate) struct MulPublicInputs<'a> {
    /// Paillier public key $N$.
    pub pk: &'a PublicKeyPaillier,
    /// Paillier ciphertext $X = enc(x, \rho_x)$.
    pub cap_x: &'a Ciphertext,
    /// Paillier ciphertext $Y$.
    pub cap_y: &'a Ciphertext,
    /// Paillier ciphertext $C = Y (*) x (+) enc(0, \rho)$.
    pub cap_c: &'a Ciphertext,
}

/// ZK proof: Paillier multiplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MulProof {
    cap_a: Ciphertext,
    cap_b: Ciphertext,
    z: BigInt,
    u: BigUint,
    v: BigUint,
}

impl MulProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        secret: MulSecretInputs<'_>,
        public: MulPublicInputs<'_>,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let pk = public.pk;

        let alpha = BigInt::from(random_mod(rng, pk.modulus()));
        let r = pk.random_randomizer(rng)?;
        let s = pk.random_randomizer(rng)?;

        let cap_a = public.cap_y.homomorphic_mul(pk, &alpha).mul_randomizer(pk, &r);
        let cap_b = Ciphertext::new_with_randomizer(pk, &alpha, &s);

        let e = challenge(transcript::<P>(&public, aux, &cap_a, &cap_b));

        let z = alpha + &e * secret.x;
        let u = (r * pow_signed(secret.rho, &e, pk.modulus())) % pk.modulus();
        let v = (s * pow_signed(secret.rho_x, &e, pk.modulus())) % pk.modulus();

        Ok(Self { cap_a, cap_b, z, u, v })
    }

    pub fn verify<P: SchemeParams>(&self, public: MulPublicInputs<'_>, aux: &impl Hashable) -> bool {
        let pk = public.pk;

        if !self.cap_a.is_valid(pk) || !self.cap_b.is_valid(pk) {
            return false;
        }

        let e = challenge(transcript::<P>(&public, aux, &self.cap_a, &self.cap_b));

        // Y^z u^N = A * C^e \mod N^2
        let lhs = public.cap_y.homomorphic_mul(pk, &self.z).mul_randomizer(pk, &self.u);
        let rhs = public.cap_c.homomorphic_mul(pk, &e).homomorphic_add(pk, &self.cap_a);
        if lhs != rhs {
            return false;
        }

        // enc(z, v) == B * X^e \mod N^2
        let lhs = Ciphertext::new_with_randomizer(pk, &self.z, &self.v);
        let rhs = public.cap_x.homomorphic_mul(pk, &e).homomorphic_add(pk, &self.cap_b);
        if lhs != rhs {
            return false;
        }

        true
    }
}

fn transcript<P: SchemeParams>(
    public: &MulPublicInputs<'_>,
    aux: &impl Hashable,
    cap_a: &Ciphertext,
    cap_b: &Ciphertext,
) -> Hasher<P> {
    Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(public.pk)
        .chain(public.cap_x)
        .chain(public.cap_y)
        .chain(public.cap_c)
        .chain(aux)
        .chain(cap_a)
        .chain(cap_b)
}
