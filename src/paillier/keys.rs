use core::fmt::Debug;

use crypto_bigint::U1024;
use crypto_primes::RandomPrimeWithRng;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, ToPrimitive};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    params::PaillierParams,
    sessions::LocalError,
    uint::{mod_inverse, random_invertible, random_mod, SAMPLING_RETRY_MAX},
};

type PrimeUint = U1024;

fn random_blum_prime<P: PaillierParams>(rng: &mut impl CryptoRngCore) -> Result<BigUint, LocalError> {
    if P::PRIME_BITS > PrimeUint::BITS {
        return Err(LocalError::new(format!(
            "Paillier primes of {} bits are not supported",
            P::PRIME_BITS
        )));
    }

    // Safe primes are always 3 mod 4.
    if P::SAFE_PRIMES {
        let prime = PrimeUint::generate_safe_prime_with_rng(rng, P::PRIME_BITS);
        return Ok(BigUint::from_bytes_be(&prime.to_be_bytes()));
    }

    (0..SAMPLING_RETRY_MAX)
        .map(|_| PrimeUint::generate_prime_with_rng(rng, P::PRIME_BITS))
        .map(|prime| BigUint::from_bytes_be(&prime.to_be_bytes()))
        .find(|prime| (prime % 4u32).to_u32() == Some(3))
        .ok_or_else(|| LocalError::new("Failed to sample a Blum prime"))
}

#[derive(Serialize, Deserialize)]
struct SecretKeyPaillierPrimes {
    p: BigUint,
    q: BigUint,
}

/// A Paillier secret key: a pair of Blum primes.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "SecretKeyPaillierPrimes", into = "SecretKeyPaillierPrimes")]
pub(crate) struct SecretKeyPaillier {
    p: BigUint,
    q: BigUint,
    modulus: BigUint,
    totient: BigUint,
    /// `phi(N)^(-1) mod N`
    inv_totient: BigUint,
    /// `N^(-1) mod phi(N)`
    inv_modulus: BigUint,
}

impl TryFrom<SecretKeyPaillierPrimes> for SecretKeyPaillier {
    type Error = String;
    fn try_from(primes: SecretKeyPaillierPrimes) -> Result<Self, Self::Error> {
        Self::from_primes(primes.p, primes.q).map_err(|err| err.to_string())
    }
}

impl From<SecretKeyPaillier> for SecretKeyPaillierPrimes {
    fn from(sk: SecretKeyPaillier) -> Self {
        Self { p: sk.p, q: sk.q }
    }
}

impl Debug for SecretKeyPaillier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SecretKeyPaillier(...)")
    }
}

impl SecretKeyPaillier {
    /// Samples two distinct primes whose product has exactly `MODULUS_BITS` bits.
    pub fn random<P: PaillierParams>(rng: &mut impl CryptoRngCore) -> Result<Self, LocalError> {
        let mut p = random_blum_prime::<P>(rng)?;
        for _ in 0..SAMPLING_RETRY_MAX {
            let q = random_blum_prime::<P>(rng)?;
            if q == p {
                continue;
            }
            if (&p * &q).bits() == u64::from(P::MODULUS_BITS) {
                return Self::from_primes(p, q);
            }
            // Only the smaller prime is replaced on the next attempt.
            p = p.max(q);
        }
        Err(LocalError::new("Failed to sample a full-size Paillier modulus"))
    }

    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self, LocalError> {
        if p == q || p.is_even() || q.is_even() {
            return Err(LocalError::new("Paillier primes must be distinct and odd"));
        }
        let modulus = &p * &q;
        let totient = (&p - 1u32) * (&q - 1u32);
        let inv_totient =
            mod_inverse(&totient, &modulus).ok_or_else(|| LocalError::new("phi(N) is not invertible mod N"))?;
        let inv_modulus =
            mod_inverse(&modulus, &totient).ok_or_else(|| LocalError::new("N is not invertible mod phi(N)"))?;
        Ok(Self {
            p,
            q,
            modulus,
            totient,
            inv_totient,
            inv_modulus,
        })
    }

    pub fn public_key(&self) -> PublicKeyPaillier {
        PublicKeyPaillier::new(self.modulus.clone())
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Euler's totient function of `p * q` - the number of positive integers up to `p * q`
    /// that are relatively prime to it.
    pub fn totient(&self) -> &BigUint {
        &self.totient
    }

    pub fn inv_totient(&self) -> &BigUint {
        &self.inv_totient
    }

    pub fn inv_modulus(&self) -> &BigUint {
        &self.inv_modulus
    }

    /// A uniformly random element of `[0, phi(N))`.
    pub fn random_field_elem(&self, rng: &mut impl CryptoRngCore) -> BigUint {
        random_mod(rng, &self.totient)
    }

    /// Returns a square root of `y` modulo `N`, if `y` is a quadratic residue.
    ///
    /// Relies on both primes being 3 mod 4.
    pub fn sqrt(&self, y: &BigUint) -> Option<BigUint> {
        let root_p = sqrt_mod_blum_prime(y, &self.p)?;
        let root_q = sqrt_mod_blum_prime(y, &self.q)?;
        Some(self.crt_join(&root_p, &root_q))
    }

    /// Combines residues modulo `p` and `q` into a residue modulo `N` (Garner's formula).
    fn crt_join(&self, a_p: &BigUint, a_q: &BigUint) -> BigUint {
        // `p` and `q` are distinct primes, so the inverse exists.
        let p_inv_mod_q = mod_inverse(&(&self.p % &self.q), &self.q).unwrap_or_default();
        let diff = (a_q + &self.q - (a_p % &self.q)) % &self.q;
        let h = (diff * p_inv_mod_q) % &self.q;
        a_p + h * &self.p
    }
}

fn sqrt_mod_blum_prime(y: &BigUint, prime: &BigUint) -> Option<BigUint> {
    let y = y % prime;
    let exponent = (prime + 1u32) >> 2u32;
    let root = y.modpow(&exponent, prime);
    if (&root * &root) % prime == y {
        Some(root)
    } else {
        None
    }
}

/// A Paillier public key: an RSA modulus `N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BigUint", into = "BigUint")]
pub(crate) struct PublicKeyPaillier {
    modulus: BigUint,
    modulus_squared: BigUint,
}

impl TryFrom<BigUint> for PublicKeyPaillier {
    type Error = String;
    fn try_from(modulus: BigUint) -> Result<Self, Self::Error> {
        if modulus.is_even() || modulus <= BigUint::one() {
            return Err("Paillier modulus must be an odd integer greater than one".into());
        }
        Ok(Self::new(modulus))
    }
}

impl From<PublicKeyPaillier> for BigUint {
    fn from(pk: PublicKeyPaillier) -> Self {
        pk.modulus
    }
}

impl PublicKeyPaillier {
    fn new(modulus: BigUint) -> Self {
        let modulus_squared = &modulus * &modulus;
        Self {
            modulus,
            modulus_squared,
        }
    }

    /// `N`
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// `N^2`
    pub fn modulus_squared(&self) -> &BigUint {
        &self.modulus_squared
    }

    /// Samples an encryption randomizer, a uniform element of `Z^*_N`.
    pub fn random_randomizer(&self, rng: &mut impl CryptoRngCore) -> Result<BigUint, LocalError> {
        random_invertible(rng, &self.modulus).ok_or_else(|| LocalError::new("Failed to sample a Paillier randomizer"))
    }
}
