//! The twisted-Edwards backend (Edwards25519 via `curve25519-dalek`), used by
//! the EdDSA protocols. Point encoding follows RFC 8032: little-endian Y with
//! the parity of X in the top bit.

use core::iter::Sum;
use core::ops::{Add, Mul, Neg, Sub};

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::traits::Identity;
use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use super::{Curve, PointDecodeError};
use crate::tools::hashing::{Chain, Hashable};
use crate::tools::serde::{deserialize, serialize, TryFromBytes};

pub(crate) type BackendScalar = curve25519_dalek::scalar::Scalar;

/// The order of the prime subgroup, `2^252 + 27742317777372353535851937790883648493`.
const ORDER_DEC: &[u8] = b"7237005577332262213973186563042994240857116359379907606001950938285454250989";

/// Marker for the Edwards25519 curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519;

impl Curve for Ed25519 {
    type Scalar = Scalar;
    type Point = Point;

    const NAME: &'static str = "ed25519";

    fn order() -> BigUint {
        BigUint::parse_bytes(ORDER_DEC, 10).expect("valid decimal constant")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scalar(BackendScalar);

impl Scalar {
    pub const ZERO: Self = Self(BackendScalar::ZERO);
    pub const ONE: Self = Self(BackendScalar::ONE);

    /// The canonical little-endian encoding (RFC 8032 `s` encoding).
    pub fn to_le_bytes(self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Reduces a 512-bit little-endian integer, as produced by the SHA-512
    /// challenge hash.
    pub fn from_wide_le_bytes(bytes: &[u8; 64]) -> Self {
        Self(BackendScalar::from_bytes_mod_order_wide(bytes))
    }

    pub(crate) fn try_from_le_bytes(bytes: &[u8]) -> Result<Self, String> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "invalid length of a curve scalar".to_string())?;
        Option::<BackendScalar>::from(BackendScalar::from_canonical_bytes(arr))
            .map(Self)
            .ok_or_else(|| "invalid curve scalar representation".into())
    }
}

impl super::Scalar<Ed25519> for Scalar {
    fn zero() -> Self {
        Self::ZERO
    }

    fn one() -> Self {
        Self::ONE
    }

    fn random(rng: &mut (impl CryptoRngCore + ?Sized)) -> Self {
        Self(BackendScalar::random(rng))
    }

    fn invert(&self) -> Option<Self> {
        if self.is_zero() {
            return None;
        }
        Some(Self(self.0.invert()))
    }

    fn from_biguint(value: &BigUint) -> Self {
        let reduced = value % Ed25519::order();
        let mut bytes = [0u8; 32];
        let le = reduced.to_bytes_le();
        bytes[..le.len()].copy_from_slice(&le);
        Self(BackendScalar::from_bytes_mod_order(bytes))
    }

    fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.to_le_bytes())
    }

    fn is_zero(&self) -> bool {
        self.0 == BackendScalar::ZERO
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0 = BackendScalar::ZERO;
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize(self.to_le_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize(deserializer)
    }
}

impl TryFromBytes for Scalar {
    type Error = String;

    fn try_from_bytes(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_le_bytes(bytes)
    }
}

impl Hashable for Scalar {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.to_le_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point(EdwardsPoint);

impl Point {
    /// The canonical 32-byte compressed encoding.
    pub fn to_compressed_bytes(self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    fn try_from_compressed_bytes(bytes: &[u8]) -> Result<Self, PointDecodeError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| PointDecodeError)?;
        let compressed = CompressedEdwardsY(arr);
        let point = compressed.decompress().ok_or(PointDecodeError)?;
        // Reject non-canonical encodings and small-order components.
        if point.compress().to_bytes() != arr || !point.is_torsion_free() {
            return Err(PointDecodeError);
        }
        Ok(Self(point))
    }
}

impl super::Point<Ed25519> for Point {
    fn generator() -> Self {
        Self(ED25519_BASEPOINT_POINT)
    }

    fn identity() -> Self {
        Self(EdwardsPoint::identity())
    }

    fn mul(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar.0)
    }

    fn to_bytes(&self) -> Box<[u8]> {
        self.to_compressed_bytes().into()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, PointDecodeError> {
        Self::try_from_compressed_bytes(bytes)
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize(self.to_compressed_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize(deserializer)
    }
}

impl TryFromBytes for Point {
    type Error = PointDecodeError;

    fn try_from_bytes(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_compressed_bytes(bytes)
    }
}

impl Hashable for Point {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.to_compressed_bytes())
    }
}

impl Neg for Scalar {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Add for Scalar {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Scalar {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Mul for Scalar {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        Self(self.0 * other.0)
    }
}

impl Sum for Scalar {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl Add for Point {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sum for Point {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self(EdwardsPoint::identity()), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Point as _, Scalar as _};
    use super::*;

    #[test]
    fn rfc8032_encoding_parity_bit() {
        // The generator's canonical encoding, from RFC 8032 test vectors.
        let generator = Point::generator();
        let bytes = generator.to_compressed_bytes();
        assert_eq!(
            hex::encode(bytes),
            "5866666666666666666666666666666666666666666666666666666666666666"
        );
    }

    #[test]
    fn leading_zero_scalar_roundtrips() {
        // A scalar below 2^240: the high bytes of the encoding are zero.
        let small = BigUint::from(123456789u64);
        let scalar = <Scalar as super::super::Scalar<Ed25519>>::from_biguint(&small);
        let bytes = scalar.to_le_bytes();
        assert!(bytes[31] == 0 && bytes[30] == 0);
        let back = Scalar::try_from_le_bytes(&bytes).unwrap();
        assert_eq!(scalar, back);
        assert_eq!(back.to_biguint(), small);
    }
}
