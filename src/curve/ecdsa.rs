use k256::ecdsa::{RecoveryId, Signature as BackendSignature, VerifyingKey};

use super::arithmetic::{Point, Scalar};

/// A wrapper for a signature and public key recovery info.
#[derive(Debug, Clone, Copy)]
pub struct RecoverableSignature {
    signature: BackendSignature,
    recovery_id: RecoveryId,
}

impl RecoverableSignature {
    /// Assembles a signature from its components.
    ///
    /// Returns `None` if the signature does not verify for `vkey` and the prehashed `message`.
    pub(crate) fn from_scalars(r: &Scalar, s: &Scalar, vkey: &Point, message: &Scalar) -> Option<Self> {
        let signature = BackendSignature::from_scalars(r.to_backend(), s.to_backend()).ok()?;

        // `BackendSignature`'s constructor does not require `s` to be normalized,
        // but consequent usage of it may fail otherwise.
        let signature = signature.normalize_s().unwrap_or(signature);

        let message_bytes = message.to_bytes();
        let recovery_id = RecoveryId::trial_recovery_from_prehash(
            &VerifyingKey::from_affine(vkey.to_backend().to_affine()).ok()?,
            &message_bytes,
            &signature,
        )
        .ok()?;

        Some(Self {
            signature,
            recovery_id,
        })
    }

    /// Unwraps into the signature and recovery info objects from the backend crate.
    pub fn to_backend(self) -> (BackendSignature, RecoveryId) {
        (self.signature, self.recovery_id)
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};
    use rand_core::OsRng;

    use super::RecoverableSignature;
    use crate::curve::Scalar;

    #[test]
    fn assembles_and_verifies() {
        let sk = Scalar::random_nonzero(&mut OsRng);
        let k = Scalar::random_nonzero(&mut OsRng);
        let message = Scalar::random(&mut OsRng);
        let vkey = sk.mul_by_generator();

        let r = k.mul_by_generator().x_coordinate();
        let k_inv = Option::<Scalar>::from(k.invert()).unwrap();
        let s = k_inv * (message + r * sk);

        let sig = RecoverableSignature::from_scalars(&r, &s, &vkey, &message).unwrap();
        let (signature, recovery_id) = sig.to_backend();

        let verifying_key = vkey.to_verifying_key().unwrap();
        verifying_key
            .verify_prehash(&message.to_bytes(), &signature)
            .unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&message.to_bytes(), &signature, recovery_id).unwrap();
        assert_eq!(recovered, verifying_key);

        // A wrong `s` must not produce a signature
        assert!(RecoverableSignature::from_scalars(&r, &(s + Scalar::ONE), &vkey, &message).is_none());
    }
}
