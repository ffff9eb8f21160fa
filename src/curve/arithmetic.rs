use core::ops::{Add, Mul, Neg, Sub};

use k256::elliptic_curve::{
    bigint::{U256, U512},
    generic_array::GenericArray,
    ops::Reduce,
    point::AffineCoordinates,
    sec1::{EncodedPoint, FromEncodedPoint, ToEncodedPoint},
    subtle::CtOption,
    Field, FieldBytesSize, NonZeroScalar,
};
use k256::{
    ecdsa::{SigningKey, VerifyingKey},
    elliptic_curve::group::ff::PrimeField,
    elliptic_curve::group::Group,
    Secp256k1,
};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_encoded_bytes::{Hex, SliceLike};
use sha3::digest::XofReader;
use zeroize::DefaultIsZeroes;

pub(crate) type BackendScalar = k256::Scalar;
pub(crate) type BackendPoint = k256::ProjectivePoint;

/// The bit size of the curve order.
pub(crate) const ORDER_BITS: u32 = 256;

/// An element of the secp256k1 scalar field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct Scalar(BackendScalar);

impl Scalar {
    /// The additive identity.
    pub const ZERO: Self = Self(BackendScalar::ZERO);
    /// The multiplicative identity.
    pub const ONE: Self = Self(BackendScalar::ONE);

    /// Samples a uniformly random scalar.
    pub fn random(rng: &mut impl CryptoRngCore) -> Self {
        Self(BackendScalar::random(rng))
    }

    /// Samples a uniformly random non-zero scalar.
    pub fn random_nonzero(rng: &mut impl CryptoRngCore) -> Self {
        Self(*NonZeroScalar::<Secp256k1>::random(rng).as_ref())
    }

    /// Returns `self * G`.
    pub fn mul_by_generator(&self) -> Point {
        Point::GENERATOR * self
    }

    /// Inverts the scalar. The result is none if the scalar is zero.
    pub fn invert(&self) -> CtOption<Self> {
        self.0.invert().map(Self)
    }

    pub(crate) fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    /// Converts a 32-byte big-endian number into a scalar, reducing it modulo the curve order.
    ///
    /// This is the conversion SEC1 uses for message prehashes.
    pub fn from_reduced_bytes(bytes: &[u8; 32]) -> Self {
        let arr = GenericArray::<u8, FieldBytesSize<Secp256k1>>::from(*bytes);
        Self(<BackendScalar as Reduce<U256>>::reduce_bytes(&arr))
    }

    /// Reads 64 bytes from an XOF and reduces them to a scalar, which gives a negligible bias.
    pub(crate) fn from_xof_reader(reader: &mut impl XofReader) -> Self {
        let mut bytes = [0u8; 64];
        reader.read(&mut bytes);
        let arr = GenericArray::clone_from_slice(&bytes);
        Self(<BackendScalar as Reduce<U512>>::reduce_bytes(&arr))
    }

    /// Returns the big-endian representation of the scalar.
    pub fn to_bytes(self) -> k256::FieldBytes {
        self.0.to_bytes()
    }

    pub(crate) fn to_backend(self) -> BackendScalar {
        self.0
    }

    /// Returns the scalar as a signing key, or `None` if it is zero.
    pub fn to_signing_key(self) -> Option<SigningKey> {
        let scalar: Option<NonZeroScalar<Secp256k1>> = NonZeroScalar::new(self.0).into();
        Some(SigningKey::from(scalar?))
    }

    /// Extracts the secret scalar from a signing key.
    pub fn from_signing_key(sk: &SigningKey) -> Self {
        Self(*sk.as_nonzero_scalar().as_ref())
    }

    pub(crate) fn try_from_bytes(bytes: &[u8]) -> Result<Self, String> {
        let arr = GenericArray::<u8, FieldBytesSize<Secp256k1>>::from_exact_iter(bytes.iter().cloned())
            .ok_or("Invalid length of a curve scalar")?;

        BackendScalar::from_repr_vartime(arr)
            .map(Self)
            .ok_or_else(|| "Invalid curve scalar representation".into())
    }
}

impl<'a> TryFrom<&'a [u8]> for Scalar {
    type Error = String;
    fn try_from(val: &'a [u8]) -> Result<Self, Self::Error> {
        Self::try_from_bytes(val)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SliceLike::<Hex>::serialize(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        SliceLike::<Hex>::deserialize(deserializer)
    }
}

impl DefaultIsZeroes for Scalar {}

impl From<u64> for Scalar {
    fn from(val: u64) -> Self {
        Self(BackendScalar::from(val))
    }
}

/// A point on the secp256k1 curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point(BackendPoint);

impl Point {
    /// The curve generator.
    pub const GENERATOR: Self = Self(BackendPoint::GENERATOR);

    /// The point at infinity.
    pub const IDENTITY: Self = Self(BackendPoint::IDENTITY);

    /// Returns the x-coordinate of the point reduced modulo the curve order.
    pub fn x_coordinate(&self) -> Scalar {
        let bytes = self.0.to_affine().x();
        Scalar(<BackendScalar as Reduce<U256>>::reduce_bytes(&bytes))
    }

    /// Returns `true` if this is the point at infinity.
    pub fn is_identity(&self) -> bool {
        bool::from(self.0.is_identity())
    }

    /// Converts a verifying key into a point.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.as_affine().into())
    }

    /// Converts the point to a [`VerifyingKey`]. Returns `None` for the point at infinity.
    pub fn to_verifying_key(self) -> Option<VerifyingKey> {
        VerifyingKey::from_affine(self.0.to_affine()).ok()
    }

    pub(crate) fn try_from_compressed_bytes(bytes: &[u8]) -> Result<Self, String> {
        let ep = EncodedPoint::<Secp256k1>::from_bytes(bytes).map_err(|err| format!("{err}"))?;

        let cp_opt: Option<BackendPoint> = BackendPoint::from_encoded_point(&ep).into();
        cp_opt
            .map(Self)
            .ok_or_else(|| "Invalid curve point representation".into())
    }

    /// SEC1 compressed encoding (a single zero byte for the identity).
    pub(crate) fn to_compressed_bytes(self) -> Box<[u8]> {
        self.0.to_affine().to_encoded_point(true).as_bytes().into()
    }

    pub(crate) fn to_backend(self) -> BackendPoint {
        self.0
    }
}

impl<'a> TryFrom<&'a [u8]> for Point {
    type Error = String;
    fn try_from(val: &'a [u8]) -> Result<Self, Self::Error> {
        Self::try_from_compressed_bytes(val)
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SliceLike::<Hex>::serialize(&self.to_compressed_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        SliceLike::<Hex>::deserialize(deserializer)
    }
}

impl Neg for Scalar {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Neg for Point {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Add<Scalar> for Scalar {
    type Output = Scalar;

    fn add(self, other: Scalar) -> Scalar {
        Scalar(self.0.add(&other.0))
    }
}

impl Add<&Scalar> for &Scalar {
    type Output = Scalar;

    fn add(self, other: &Scalar) -> Scalar {
        Scalar(self.0.add(&other.0))
    }
}

impl Add<Point> for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point(self.0.add(&(other.0)))
    }
}

impl Add<&Point> for &Point {
    type Output = Point;

    fn add(self, other: &Point) -> Point {
        Point(self.0.add(&(other.0)))
    }
}

impl Sub<Scalar> for Scalar {
    type Output = Scalar;

    fn sub(self, other: Scalar) -> Scalar {
        Scalar(self.0.sub(&(other.0)))
    }
}

impl Sub<&Scalar> for &Scalar {
    type Output = Scalar;

    fn sub(self, other: &Scalar) -> Scalar {
        Scalar(self.0.sub(&(other.0)))
    }
}

impl Sub<Point> for Point {
    type Output = Point;

    fn sub(self, other: Point) -> Point {
        Point(self.0.sub(&(other.0)))
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;

    fn mul(self, other: Scalar) -> Point {
        Point(self.0.mul(&(other.0)))
    }
}

impl Mul<&Scalar> for Point {
    type Output = Point;

    fn mul(self, other: &Scalar) -> Point {
        Point(self.0.mul(&(other.0)))
    }
}

impl Mul<&Scalar> for &Point {
    type Output = Point;

    fn mul(self, other: &Scalar) -> Point {
        Point(self.0.mul(&(other.0)))
    }
}

impl Mul<Scalar> for Scalar {
    type Output = Scalar;

    fn mul(self, other: Scalar) -> Scalar {
        Scalar(self.0.mul(&(other.0)))
    }
}

impl Mul<&Scalar> for Scalar {
    type Output = Scalar;

    fn mul(self, other: &Scalar) -> Scalar {
        Scalar(self.0.mul(&(other.0)))
    }
}

impl Mul<&Scalar> for &Scalar {
    type Output = Scalar;

    fn mul(self, other: &Scalar) -> Scalar {
        Scalar(self.0.mul(&(other.0)))
    }
}

impl core::iter::Sum for Scalar {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.reduce(Add::add).unwrap_or(Self::ZERO)
    }
}

impl<'a> core::iter::Sum<&'a Self> for Scalar {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.cloned().sum()
    }
}

impl core::iter::Product for Scalar {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.reduce(Mul::mul).unwrap_or(Self::ONE)
    }
}

impl core::iter::Sum for Point {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.reduce(Add::add).unwrap_or(Self::IDENTITY)
    }
}

impl<'a> core::iter::Sum<&'a Self> for Point {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.cloned().sum()
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;
    use rand_core::OsRng;

    use super::{Point, Scalar};

    #[test]
    fn point_encoding_handles_identity() {
        let bytes = Point::IDENTITY.to_compressed_bytes();
        assert_eq!(bytes.len(), 1);
        assert_eq!(Point::try_from(bytes.as_ref()).unwrap(), Point::IDENTITY);

        let point = Scalar::random(&mut OsRng).mul_by_generator();
        let bytes = point.to_compressed_bytes();
        assert_eq!(bytes.len(), 33);
        assert_eq!(Point::try_from(bytes.as_ref()).unwrap(), point);
    }

    #[test]
    fn scalar_inversion() {
        let x = Scalar::random_nonzero(&mut OsRng);
        let x_inv = Option::<Scalar>::from(x.invert()).unwrap();
        assert_eq!(x * x_inv, Scalar::ONE);
        assert!(bool::from(Scalar::ZERO.invert().is_none()));
    }

    #[test]
    fn scalar_bytes_roundtrip_rejects_unreduced() {
        let x = Scalar::random(&mut OsRng);
        assert_eq!(Scalar::try_from(x.to_bytes().as_slice()).unwrap(), x);
        assert!(Scalar::try_from([0xffu8; 32].as_slice()).is_err());
        assert!(Scalar::try_from([1u8; 31].as_slice()).is_err());
    }

    #[test]
    fn signing_key_conversion() {
        let sk = SigningKey::random(&mut OsRng);
        let scalar = Scalar::from_signing_key(&sk);
        assert_eq!(scalar.to_signing_key().unwrap(), sk);
        assert_eq!(
            Point::from_verifying_key(sk.verifying_key()),
            scalar.mul_by_generator()
        );
        assert!(Scalar::ZERO.to_signing_key().is_none());
    }
}
