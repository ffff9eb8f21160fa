//! Jacobi symbol calculation.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum JacobiSymbol {
    Zero,
    One,
    MinusOne,
}

impl core::ops::Neg for JacobiSymbol {
    type Output = Self;
    fn neg(self) -> Self {
        match self {
            Self::Zero => Self::Zero,
            Self::One => Self::MinusOne,
            Self::MinusOne => Self::One,
        }
    }
}

fn low_bits(value: &BigUint, mask: u32) -> u32 {
    (value & BigUint::from(mask)).to_u32().unwrap_or(0)
}

/// Computes the Jacobi symbol `(a/p)`.
///
/// `p` must be odd; for an even `p` the symbol is undefined and [`JacobiSymbol::Zero`] is returned.
pub(crate) fn jacobi_symbol(a: &BigUint, p: &BigUint) -> JacobiSymbol {
    if p.is_even() {
        return JacobiSymbol::Zero;
    }

    // Keep track of all the sign flips here.
    let mut result = JacobiSymbol::One;
    let mut a = a % p;
    let mut p = p.clone();

    while !a.is_zero() {
        // Pull out the powers of two: `(2/p) = -1` iff `p = 3 or 5 mod 8`.
        let s = a.trailing_zeros().unwrap_or(0);
        a >>= s;
        let p_mod_8 = low_bits(&p, 7);
        if s & 1 == 1 && (p_mod_8 == 3 || p_mod_8 == 5) {
            result = -result;
        }

        // Quadratic reciprocity for odd `a` and `p`.
        if low_bits(&a, 3) == 3 && low_bits(&p, 3) == 3 {
            result = -result;
        }
        core::mem::swap(&mut a, &mut p);
        a %= &p;
    }

    if p.is_one() {
        result
    } else {
        JacobiSymbol::Zero
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::{jacobi_symbol, JacobiSymbol};

    // Euler's criterion, valid for prime `p`.
    fn legendre_ref(a: u64, p: u64) -> JacobiSymbol {
        let r = BigUint::from(a).modpow(&BigUint::from((p - 1) / 2), &BigUint::from(p));
        if r == BigUint::from(0u32) {
            JacobiSymbol::Zero
        } else if r == BigUint::from(1u32) {
            JacobiSymbol::One
        } else {
            JacobiSymbol::MinusOne
        }
    }

    #[test]
    fn matches_legendre_for_primes() {
        for p in [3u64, 5, 7, 11, 13, 17, 19, 23, 29, 31] {
            for a in 0u64..40 {
                assert_eq!(
                    jacobi_symbol(&BigUint::from(a), &BigUint::from(p)),
                    legendre_ref(a, p),
                    "({a}/{p})"
                );
            }
        }
    }

    #[test]
    fn composite_modulus() {
        // (a/15) = (a/3)(a/5)
        for a in 0u64..30 {
            let expected = match (legendre_ref(a, 3), legendre_ref(a, 5)) {
                (JacobiSymbol::Zero, _) | (_, JacobiSymbol::Zero) => JacobiSymbol::Zero,
                (x, y) if x == y => JacobiSymbol::One,
                _ => JacobiSymbol::MinusOne,
            };
            assert_eq!(jacobi_symbol(&BigUint::from(a), &BigUint::from(15u32)), expected);
        }
    }

    #[test]
    fn even_modulus() {
        assert_eq!(
            jacobi_symbol(&BigUint::from(3u32), &BigUint::from(8u32)),
            JacobiSymbol::Zero
        );
    }
}
