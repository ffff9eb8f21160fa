use core::fmt::Debug;

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// A helper wrapper for managing secret values.
///
/// On top of `secrecy::SecretBox` functionality, it provides:
/// - Safe `Clone` implementation (without needing to impl `CloneableSecret`)
/// - Safe `Debug` implementation
/// - Serialization/deserialization delegated to the wrapped type
pub(crate) struct Secret<T: Zeroize>(SecretBox<T>);

impl<T> Secret<T>
where
    T: Zeroize,
{
    pub fn expose_secret(&self) -> &T {
        self.0.expose_secret()
    }
}

impl<T> Secret<T>
where
    T: Zeroize + Clone,
{
    pub fn init_with(ctr: impl FnOnce() -> T) -> Self {
        Self(SecretBox::init_with(ctr))
    }
}

impl<T> Clone for Secret<T>
where
    T: Zeroize + Clone,
{
    fn clone(&self) -> Self {
        Self::init_with(|| self.0.expose_secret().clone())
    }
}

impl<T> Serialize for Secret<T>
where
    T: Zeroize + Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.expose_secret().serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Secret<T>
where
    T: Zeroize + Clone + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = T::deserialize(deserializer)?;
        let secret = Self::init_with(|| value.clone());
        value.zeroize();
        Ok(secret)
    }
}

impl<T> Debug for Secret<T>
where
    T: Zeroize,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Secret<{}>(...)", core::any::type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::Secret;
    use crate::curve::Scalar;

    #[test]
    fn debug_output_is_redacted() {
        let secret = Secret::init_with(|| Scalar::from(12345u64));
        let debug = format!("{secret:?}");
        assert!(!debug.contains("3039"));
        assert!(debug.starts_with("Secret<"));
    }

    #[test]
    fn serialization_roundtrip() {
        let secret = Secret::init_with(|| Scalar::from(7u64));
        let bytes = bincode::serialize(&secret).unwrap();
        let restored: Secret<Scalar> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.expose_secret(), secret.expose_secret());
    }
}
