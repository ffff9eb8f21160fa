//! Paillier-Blum modulus ($\Pi^{mod}$, Section C.1, Fig. 16)
//!
//! Proves that $N$ is a product of two primes both equal to 3 mod 4,
//! and that it is coprime to $\phi(N)$.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    paillier::{PublicKeyPaillier, SecretKeyPaillier},
    params::SchemeParams,
    sessions::LocalError,
    tools::hashing::{Chain, Hashable, Hasher},
    uint::{biguint_from_xof_reader, jacobi_symbol, random_mod, JacobiSymbol, SAMPLING_RETRY_MAX},
};

const HASH_TAG: &[u8] = b"P_mod";

/// The challenges `y_i`, derived from the transcript.
fn challenges<P: SchemeParams>(modulus: &BigUint, w: &BigUint, aux: &impl Hashable) -> Vec<BigUint> {
    let mut reader = Hasher::<P>::new_with_dst(HASH_TAG)
        .chain(modulus)
        .chain(w)
        .chain(aux)
        .finalize_to_reader();
    (0..P::SECURITY_BITS)
        .map(|_| biguint_from_xof_reader(&mut reader, modulus, P::SECURITY_BITS))
        .collect()
}

fn adjust(y: &BigUint, w: &BigUint, modulus: &BigUint, a: bool, b: bool) -> BigUint {
    let y = if b { (y * w) % modulus } else { y.clone() };
    if a {
        (modulus - y) % modulus
    } else {
        y
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModProofElem {
    /// `x_i` such that `x_i^4 = (-1)^{a_i} w^{b_i} y_i`
    x: BigUint,
    a: bool,
    b: bool,
    /// `z_i = y_i^{N^{-1} \mod \phi(N)}`
    z: BigUint,
}

/// ZK proof: the Paillier modulus is a Paillier-Blum modulus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModProof {
    w: BigUint,
    elements: Vec<ModProofElem>,
}

impl ModProof {
    pub fn new<P: SchemeParams>(
        rng: &mut impl CryptoRngCore,
        sk: &SecretKeyPaillier,
        aux: &impl Hashable,
    ) -> Result<Self, LocalError> {
        let modulus = sk.modulus();

        let w = (0..SAMPLING_RETRY_MAX)
            .map(|_| random_mod(rng, modulus))
            .find(|w| jacobi_symbol(w, modulus) == JacobiSymbol::MinusOne)
            .ok_or_else(|| LocalError::new("Failed to sample a non-residue with the Jacobi symbol -1"))?;

        let elements = challenges::<P>(modulus, &w, aux)
            .into_iter()
            .map(|y| {
                let (a, b, root) = [(false, false), (true, false), (false, true), (true, true)]
                    .into_iter()
                    .find_map(|(a, b)| {
                        sk.sqrt(&adjust(&y, &w, modulus, a, b))
                            .and_then(|root| sk.sqrt(&root))
                            .map(|root| (a, b, root))
                    })
                    .ok_or_else(|| LocalError::new("Failed to find a fourth root for a modulus proof challenge"))?;
                let z = y.modpow(sk.inv_modulus(), modulus);
                Ok(ModProofElem { x: root, a, b, z })
            })
            .collect::<Result<Vec<_>, LocalError>>()?;

        Ok(Self { w, elements })
    }

    pub fn verify<P: SchemeParams>(&self, pk: &PublicKeyPaillier, aux: &impl Hashable) -> bool {
        let modulus = pk.modulus();

        if modulus.is_even() || *modulus <= BigUint::one() || self.elements.len() != P::SECURITY_BITS {
            return false;
        }

        challenges::<P>(modulus, &self.w, aux)
            .iter()
            .zip(self.elements.iter())
            .all(|(y, elem)| {
                // z_i^N == y_i \mod N
                if elem.z.modpow(modulus, modulus) != *y {
                    return false;
                }
                // x_i^4 == (-1)^{a_i} w^{b_i} y_i \mod N
                elem.x.modpow(&BigUint::from(4u32), modulus) == adjust(y, &self.w, modulus, elem.a, elem.b)
            })
    }
}
