//! Ring-Pedersen parameters ($\Pi^{prm}$, Section C.1, Fig. 17)
//!
//! Proves knowledge of $\lambda$ such that $s = t^\lambda \mod N$.

use digest::XofReader;
use num_bigint::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    paillier::{RPParams, RPSecret, SecretKeyPaillier},
    params::SchemeParams,
    tools::hashing::{Chain, Hashable, Hasher},
};

const HASH_TAG: &[u8] = b"P_prm";

/// `m` challenge bits derived from the transcript.
fn challenge_bits<P: SchemeParams>(setup: &RPParams, commitments: &[BigUint], aux: &impl Hashable) -> Vec<bool> {
    let mut reader = Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(setup)
        .chain(&commitments)
        .chain(aux)
        .finalize_to_reader();
    let mut bytes = vec![0u8; P::SECURITY_BITS.div_ceil(8)];
    reader.read(&mut bytes);
    (0..P::SECURITY_BITS)
        .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}

/// ZK proof: ring-Pedersen parameters are well-formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PrmProof {
    /// `A_i = t^{a_i}`
    commitments: Vec<BigUint>,
    /// `z_i = a_i + e_i \lambda \mod \phi(N)`
    responses: Vec<BigUint>,
}

impl PrmProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        sk: &SecretKeyPaillier,
        secret: &RPSecret,
        setup: &RPParams,
        aux: &impl Hashable,
    ) -> Self {
        let totient = sk.totient();
        let modulus = setup.modulus();

        let nonces = (0..P::SECURITY_BITS)
            .map(|_| sk.random_field_elem(rng))
            .collect::<Vec<_>>();
        let commitments = nonces
            .iter()
            .map(|a| setup.base_randomizer().modpow(a, modulus))
            .collect::<Vec<_>>();

        let bits = challenge_bits::<P>(setup, &commitments, aux);

        let responses = nonces
            .into_iter()
            .zip(bits)
            .map(|(a, e)| if e { (a + secret.lambda()) % totient } else { a })
            .collect();

        Self { commitments, responses }
    }

    pub fn verify<P: SchemeParams>(&self, setup: &RPParams, aux: &impl Hashable) -> bool {
        if !setup.is_valid()
            || self.commitments.len() != P::SECURITY_BITS
            || self.responses.len() != P::SECURITY_BITS
        {
            return false;
        }

        let modulus = setup.modulus();
        let bits = challenge_bits::<P>(setup, &self.commitments, aux);

        // t^{z_i} == A_i s^{e_i} \mod N
        self.commitments
            .iter()
            .zip(self.responses.iter())
            .zip(bits)
            .all(|((cap_a, z), e)| {
                let lhs = setup.base_randomizer().modpow(z, modulus);
                let rhs = if e {
                    (cap_a * setup.base_value()) % modulus
                } else {
                    cap_a % modulus
                };
                lhs == rhs
            })
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::PrmProof;
    use crate::{
        paillier::{RPParams, SecretKeyPaillier},
        params::{PaillierTest, TestParams},
    };

    #[test]
    fn prove_and_verify() {
        let sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let (setup, secret) = RPParams::random_with_secret(&mut OsRng, &sk).unwrap();

        let aux: &[u8] = b"abcde";

        let proof = PrmProof::new::<TestParams>(&mut OsRng, &sk, &secret, &setup, &aux);
        assert!(proof.verify::<TestParams>(&setup, &aux));

        let other_aux: &[u8] = b"fghij";
        assert!(!proof.verify::<TestParams>(&setup, &other_aux));

        // Parameters with a different `s` must not verify.
        let (other_setup, _) = RPParams::random_with_secret(&mut OsRng, &sk).unwrap();
        assert!(!proof.verify::<TestParams>(&other_setup, &aux));
    }
}
