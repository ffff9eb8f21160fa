use num_bigint::{BigInt, BigUint};
use num_traits::One;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::keys::{PublicKeyPaillier, SecretKeyPaillier};
use crate::{
    sessions::LocalError,
    uint::{center, is_invertible, pow_signed, reduce_signed},
};

/// A Paillier ciphertext, an element of `Z^*_{N^2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Ciphertext(BigUint);

impl Ciphertext {
    /// Encrypts `plaintext` (taken modulo `N`) with the given randomizer:
    /// `(1 + N)^m * rho^N mod N^2`.
    pub fn new_with_randomizer(pk: &PublicKeyPaillier, plaintext: &BigInt, randomizer: &BigUint) -> Self {
        let modulus = pk.modulus();
        let modulus_squared = pk.modulus_squared();
        // `(1 + N)^m = 1 + m * N mod N^2`
        let m = reduce_signed(plaintext, modulus);
        let prod = (BigUint::one() + m * modulus) % modulus_squared;
        let mask = randomizer.modpow(modulus, modulus_squared);
        Self((prod * mask) % modulus_squared)
    }

    /// Encrypts `plaintext` with a freshly sampled randomizer, returning both.
    pub fn new(
        rng: &mut impl CryptoRngCore,
        pk: &PublicKeyPaillier,
        plaintext: &BigInt,
    ) -> Result<(Self, BigUint), LocalError> {
        let randomizer = pk.random_randomizer(rng)?;
        Ok((Self::new_with_randomizer(pk, plaintext, &randomizer), randomizer))
    }

    /// Returns `true` if the ciphertext is in `(0, N^2)` and coprime to `N`.
    pub fn is_valid(&self, pk: &PublicKeyPaillier) -> bool {
        // Coprime to `N^2` iff coprime to `N`.
        is_invertible(&self.0, pk.modulus_squared())
    }

    /// Decrypts the ciphertext into a value in `(-N/2, N/2]`.
    pub fn decrypt(&self, sk: &SecretKeyPaillier) -> BigInt {
        let modulus = sk.modulus();
        let modulus_squared = modulus * modulus;
        let u = self.0.modpow(sk.totient(), &modulus_squared);
        // `u = 1 + m * phi * N mod N^2`
        let l = (u + &modulus_squared - 1u32) % &modulus_squared / modulus;
        let m = (l * sk.inv_totient()) % modulus;
        center(&m, modulus)
    }

    /// Recovers the randomizer `rho` such that the ciphertext equals `Enc(m; rho)`.
    pub fn derive_randomizer(&self, sk: &SecretKeyPaillier) -> BigUint {
        let modulus = sk.modulus();
        // `c = rho^N mod N`, so `rho = c^(N^(-1) mod phi) mod N`
        (&self.0 % modulus).modpow(sk.inv_modulus(), modulus)
    }

    /// Returns the ciphertext of `m * k`, where `m` is the plaintext of `self`.
    pub fn homomorphic_mul(&self, pk: &PublicKeyPaillier, k: &BigInt) -> Self {
        Self(pow_signed(&self.0, k, pk.modulus_squared()))
    }

    /// Returns the ciphertext of `m1 + m2`.
    pub fn homomorphic_add(&self, pk: &PublicKeyPaillier, other: &Self) -> Self {
        Self((&self.0 * &other.0) % pk.modulus_squared())
    }

    /// Multiplies the ciphertext by `rho^N`, that is, adds an encryption of zero with the randomizer `rho`.
    pub fn mul_randomizer(&self, pk: &PublicKeyPaillier, randomizer: &BigUint) -> Self {
        let modulus_squared = pk.modulus_squared();
        let mask = randomizer.modpow(pk.modulus(), modulus_squared);
        Self((&self.0 * mask) % modulus_squared)
    }

    /// Returns the product of ciphertexts as plain group elements modulo `N^2`.
    pub fn product<'a>(pk: &PublicKeyPaillier, ciphertexts: impl IntoIterator<Item = &'a Self>) -> Self {
        let modulus_squared = pk.modulus_squared();
        Self(
            ciphertexts
                .into_iter()
                .fold(BigUint::one(), |acc, ct| (acc * &ct.0) % modulus_squared),
        )
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use rand_core::OsRng;

    use super::Ciphertext;
    use crate::{
        paillier::SecretKeyPaillier,
        params::PaillierTest,
        uint::{pow2, random_bounded_bits},
    };

    #[test]
    fn encrypt_decrypt() {
        let sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let pk = sk.public_key();

        for plaintext in [BigInt::from(0), BigInt::from(-1), random_bounded_bits(&mut OsRng, 600)] {
            let (ct, rho) = Ciphertext::new(&mut OsRng, &pk, &plaintext).unwrap();
            assert!(ct.is_valid(&pk));
            assert_eq!(ct.decrypt(&sk), plaintext);
            assert_eq!(ct.derive_randomizer(&sk), rho);
        }
    }

    #[test]
    fn homomorphic_operations() {
        let sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let pk = sk.public_key();

        let a = random_bounded_bits(&mut OsRng, 256);
        let b = random_bounded_bits(&mut OsRng, 256);
        let k = random_bounded_bits(&mut OsRng, 256);

        let (ct_a, _) = Ciphertext::new(&mut OsRng, &pk, &a).unwrap();
        let (ct_b, _) = Ciphertext::new(&mut OsRng, &pk, &b).unwrap();

        let ct = ct_a.homomorphic_mul(&pk, &k).homomorphic_add(&pk, &ct_b);
        assert_eq!(ct.decrypt(&sk), &a * &k + &b);

        let ct_neg = ct_a.homomorphic_mul(&pk, &BigInt::from(-1));
        assert_eq!(ct_neg.decrypt(&sk), -&a);

        let rho = pk.random_randomizer(&mut OsRng).unwrap();
        assert_eq!(ct_a.mul_randomizer(&pk, &rho).decrypt(&sk), a);
    }

    #[test]
    fn validation() {
        let sk = SecretKeyPaillier::random::<PaillierTest>(&mut OsRng).unwrap();
        let pk = sk.public_key();
        let bytes = bincode::serialize(&pk.modulus()).unwrap();
        let not_coprime: Ciphertext = bincode::deserialize(&bytes).unwrap();
        assert!(!not_coprime.is_valid(&pk));

        let bytes = bincode::serialize(&(pk.modulus_squared() + 1u32)).unwrap();
        let too_large: Ciphertext = bincode::deserialize(&bytes).unwrap();
        assert!(!too_large.is_valid(&pk));

        let big = pow2(1100);
        let (ct, _) = Ciphertext::new(&mut OsRng, &pk, &big).unwrap();
        assert_ne!(ct.decrypt(&sk), big);
    }
}
