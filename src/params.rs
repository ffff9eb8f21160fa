use core::fmt::Debug;

use digest::{ExtendableOutput, Update};
use serde::{Deserialize, Serialize};
use sha3::Shake256;

use crate::curve::ORDER_BITS;

/// Parameters of the Paillier encryption.
pub trait PaillierParams: 'static + Debug + Clone + Copy + PartialEq + Eq + Send + Sync {
    /// The size of one of the pair of RSA primes.
    const PRIME_BITS: u32;
    /// The size of the RSA modulus (a product of two primes).
    const MODULUS_BITS: u32 = Self::PRIME_BITS * 2;
    /// Whether the primes are required to be safe primes (`p = 2p' + 1` for prime `p'`).
    ///
    /// If `false`, the primes are only required to be Blum primes (`p = 3 mod 4`),
    /// which is enough for all the proofs to go through but makes the key generation much faster.
    const SAFE_PRIMES: bool;
}

/// Paillier parameters **for testing purposes only**.
/// Security is weakened to allow for faster execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierTest;

impl PaillierParams for PaillierTest {
    const PRIME_BITS: u32 = 512;
    const SAFE_PRIMES: bool = false;
}

/// Paillier parameters for production use.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierProduction;

impl PaillierParams for PaillierProduction {
    const PRIME_BITS: u32 = 1024;
    const SAFE_PRIMES: bool = true;
}

/// Signing scheme parameters.
pub trait SchemeParams: 'static + Debug + Clone + Copy + PartialEq + Eq + Send + Sync {
    /// The number of bits of statistical security.
    ///
    /// Also sets the number of repetitions in the Paillier modulus and ring-Pedersen proofs.
    const SECURITY_BITS: usize; // $m$ in the paper
    /// The scheme's security parameter (the bit size of the Fiat-Shamir challenges).
    const SECURITY_PARAMETER: usize; // $\kappa$ in the paper
    /// The bound for secret values.
    const L_BOUND: u32; // $\ell$
    /// The bound for MtA masks.
    const LP_BOUND: u32; // $\ell^\prime$
    /// The slackness parameter of the range checks.
    const EPS_BOUND: u32; // $\eps$
    /// The parameters of the Paillier encryption.
    type Paillier: PaillierParams;
    /// The extendable output hash used for commitments and Fiat-Shamir challenges.
    type Digest: Default + Update + ExtendableOutput + Clone + Send + Sync;

    /// `true` if the parameters satisfy the inequalities that make the protocol complete and sound.
    const SELF_CONSISTENT: bool = Self::SECURITY_PARAMETER as u32 == ORDER_BITS
        && Self::L_BOUND >= Self::SECURITY_PARAMETER as u32
        && Self::EPS_BOUND >= Self::SECURITY_PARAMETER as u32 + Self::SECURITY_BITS as u32
        && Self::LP_BOUND >= Self::L_BOUND * 2 + Self::SECURITY_BITS as u32
        // Headroom for summing up to 256 MtA outputs without a wraparound.
        && Self::Paillier::MODULUS_BITS >= Self::LP_BOUND + Self::EPS_BOUND + 8
        && Self::Paillier::MODULUS_BITS >= Self::L_BOUND + Self::LP_BOUND + 16;

    /// The bit bound on an honestly generated MtA output `alpha`.
    ///
    /// A larger decrypted value means the sender of the ciphertext misbehaved.
    fn mta_output_bound_bits() -> u32 {
        let affine = Self::L_BOUND * 2 + Self::EPS_BOUND;
        let mask = Self::LP_BOUND + Self::EPS_BOUND;
        affine.max(mask) + 1
    }
}

/// Scheme parameters **for testing purposes only**.
/// Security is weakened to allow for faster execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestParams;

impl SchemeParams for TestParams {
    const SECURITY_BITS: usize = 16;
    const SECURITY_PARAMETER: usize = 256;
    const L_BOUND: u32 = 256;
    const LP_BOUND: u32 = 576;
    const EPS_BOUND: u32 = 320;
    type Paillier = PaillierTest;
    type Digest = Shake256;
}

static_assertions::const_assert!(TestParams::SELF_CONSISTENT);

/// Production strength parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionParams;

impl SchemeParams for ProductionParams {
    const SECURITY_BITS: usize = 80;
    const SECURITY_PARAMETER: usize = 256;
    const L_BOUND: u32 = 256;
    const LP_BOUND: u32 = 1280;
    const EPS_BOUND: u32 = 512;
    type Paillier = PaillierProduction;
    type Digest = Shake256;
}

static_assertions::const_assert!(ProductionParams::SELF_CONSISTENT);

#[cfg(test)]
mod tests {
    use super::{ProductionParams, SchemeParams, TestParams};

    #[test]
    fn mta_bound_fits_into_modulus() {
        assert_eq!(TestParams::mta_output_bound_bits(), 897);
        assert_eq!(ProductionParams::mta_output_bound_bits(), 1793);
    }
}
