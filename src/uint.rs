//! Helpers for arbitrary-precision integer arithmetic.
//!
//! Paillier and ring-Pedersen moduli are handled as [`BigUint`],
//! and all the values that can be negative (plaintexts, proof responses) as [`BigInt`].

mod jacobi;

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand_core::CryptoRngCore;
use sha3::digest::XofReader;

use crate::curve::Scalar;

pub(crate) use jacobi::{jacobi_symbol, JacobiSymbol};

/// The maximum number of attempts for rejection sampling.
pub(crate) const SAMPLING_RETRY_MAX: usize = 500;

/// Returns the order of the secp256k1 group.
pub(crate) fn curve_order() -> BigUint {
    BigUint::from_bytes_be(&(-Scalar::ONE).to_bytes()) + 1u32
}

/// Converts a scalar to an integer in `[0, q)`.
pub(crate) fn scalar_to_bigint(scalar: &Scalar) -> BigInt {
    BigInt::from(BigUint::from_bytes_be(&scalar.to_bytes()))
}

/// Reduces an integer modulo the curve order.
pub(crate) fn bigint_to_scalar(value: &BigInt) -> Scalar {
    let reduced = value.mod_floor(&BigInt::from(curve_order()));
    // `reduced` is in `[0, q)` so the magnitude fits into 32 bytes.
    let (_sign, bytes) = reduced.to_bytes_be();
    let mut padded = [0u8; 32];
    let offset = padded.len().saturating_sub(bytes.len());
    padded
        .iter_mut()
        .skip(offset)
        .zip(bytes.iter())
        .for_each(|(dst, src)| *dst = *src);
    Scalar::from_reduced_bytes(&padded)
}

/// Returns `2^bits` as a signed integer.
pub(crate) fn pow2(bits: u32) -> BigInt {
    BigInt::one() << bits
}

/// Samples a uniform integer in `[-2^bits, 2^bits]`.
pub(crate) fn random_bounded_bits(rng: &mut impl CryptoRngCore, bits: u32) -> BigInt {
    let bound = pow2(bits);
    rng.gen_bigint_range(&-&bound, &(bound + 1))
}

/// Samples a uniform integer in `[-2^bits * scale, 2^bits * scale]`.
pub(crate) fn random_bounded_bits_scaled(rng: &mut impl CryptoRngCore, bits: u32, scale: &BigUint) -> BigInt {
    let bound = pow2(bits) * BigInt::from(scale.clone());
    rng.gen_bigint_range(&-&bound, &(bound + 1))
}

/// Returns `true` if `|value| <= 2^bits`.
pub(crate) fn in_range_bits(value: &BigInt, bits: u32) -> bool {
    value.magnitude() <= pow2(bits).magnitude()
}

/// Samples a uniform integer in `[0, modulus)`.
pub(crate) fn random_mod(rng: &mut impl CryptoRngCore, modulus: &BigUint) -> BigUint {
    rng.gen_biguint_below(modulus)
}

/// Samples a uniform element of `Z^*_modulus`.
///
/// Returns `None` if no invertible element was found in [`SAMPLING_RETRY_MAX`] attempts.
pub(crate) fn random_invertible(rng: &mut impl CryptoRngCore, modulus: &BigUint) -> Option<BigUint> {
    (0..SAMPLING_RETRY_MAX)
        .map(|_| rng.gen_biguint_below(modulus))
        .find(|candidate| is_invertible(candidate, modulus))
}

/// Returns `true` if `value` is in `[1, modulus)` and coprime to `modulus`.
pub(crate) fn is_invertible(value: &BigUint, modulus: &BigUint) -> bool {
    !value.is_zero() && value < modulus && value.gcd(modulus).is_one()
}

/// Returns the inverse of `value` modulo `modulus`, if it exists.
pub(crate) fn mod_inverse(value: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let modulus_int = BigInt::from(modulus.clone());
    let egcd = BigInt::from(value.clone()).extended_gcd(&modulus_int);
    if !egcd.gcd.is_one() {
        return None;
    }
    egcd.x.mod_floor(&modulus_int).to_biguint()
}

/// Raises `base` to a signed power modulo `modulus`.
///
/// Negative exponents use the modular inverse of `base`; if it does not exist, the result is zero.
/// Zero is never a valid group element, so any subsequent equality check against one fails.
pub(crate) fn pow_signed(base: &BigUint, exponent: &BigInt, modulus: &BigUint) -> BigUint {
    match exponent.sign() {
        Sign::Minus => match mod_inverse(base, modulus) {
            Some(inverse) => inverse.modpow(exponent.magnitude(), modulus),
            None => BigUint::zero(),
        },
        _ => base.modpow(exponent.magnitude(), modulus),
    }
}

/// Reduces a signed integer to `[0, modulus)`.
pub(crate) fn reduce_signed(value: &BigInt, modulus: &BigUint) -> BigUint {
    let modulus = BigInt::from(modulus.clone());
    let (_sign, magnitude) = value.mod_floor(&modulus).into_parts();
    magnitude
}

/// Lifts `value` in `[0, modulus)` to the symmetric range `(-modulus/2, modulus/2]`.
pub(crate) fn center(value: &BigUint, modulus: &BigUint) -> BigInt {
    let half: BigUint = modulus >> 1u32;
    if value > &half {
        BigInt::from(value.clone()) - BigInt::from(modulus.clone())
    } else {
        BigInt::from(value.clone())
    }
}

/// Reads enough bytes from the XOF to produce a value modulo `modulus` with a bias
/// of at most `2^(-security_bits)`.
pub(crate) fn biguint_from_xof_reader(
    reader: &mut impl XofReader,
    modulus: &BigUint,
    security_bits: usize,
) -> BigUint {
    let len = (modulus.bits() as usize + security_bits).div_ceil(8);
    let mut bytes = vec![0u8; len];
    reader.read(&mut bytes);
    BigUint::from_bytes_be(&bytes) % modulus
}

#[cfg(test)]
mod tests {
    use num_bigint::{BigInt, BigUint};
    use num_traits::{One, Zero};
    use rand_core::OsRng;

    use super::{
        bigint_to_scalar, center, in_range_bits, mod_inverse, pow2, pow_signed, random_bounded_bits,
        reduce_signed, scalar_to_bigint,
    };
    use crate::curve::Scalar;

    #[test]
    fn scalar_conversion() {
        let x = Scalar::random(&mut OsRng);
        let x_int = scalar_to_bigint(&x);
        assert_eq!(bigint_to_scalar(&x_int), x);
        assert_eq!(bigint_to_scalar(&-x_int), -x);
        assert_eq!(bigint_to_scalar(&BigInt::zero()), Scalar::ZERO);
    }

    #[test]
    fn signed_exponentiation() {
        let modulus = BigUint::from(101u32);
        let base = BigUint::from(7u32);
        let positive = pow_signed(&base, &BigInt::from(5), &modulus);
        let negative = pow_signed(&base, &BigInt::from(-5), &modulus);
        assert!((positive * negative % &modulus).is_one());

        // Not invertible
        let modulus = BigUint::from(100u32);
        assert!(mod_inverse(&BigUint::from(10u32), &modulus).is_none());
        assert!(pow_signed(&BigUint::from(10u32), &BigInt::from(-1), &modulus).is_zero());
    }

    #[test]
    fn centering() {
        let modulus = BigUint::from(11u32);
        assert_eq!(center(&BigUint::from(5u32), &modulus), BigInt::from(5));
        assert_eq!(center(&BigUint::from(6u32), &modulus), BigInt::from(-5));
        assert_eq!(reduce_signed(&BigInt::from(-5), &modulus), BigUint::from(6u32));
    }

    #[test]
    fn bounded_sampling() {
        for _ in 0..100 {
            let x = random_bounded_bits(&mut OsRng, 10);
            assert!(in_range_bits(&x, 10));
        }
        assert!(!in_range_bits(&(pow2(10) + 1), 10));
        assert!(in_range_bits(&-pow2(10), 10));
    }
}
