//! The short-Weierstrass backend (secp256k1 via `k256`), used by the ECDSA
//! protocols.

use core::iter::Sum;
use core::ops::{Add, Mul, Neg, Sub};

use k256::ecdsa::hazmat::VerifyPrimitive;
use k256::elliptic_curve::group::ff::PrimeField;
use k256::elliptic_curve::{
    bigint::U256, // Note that this type is different from typenum::U256
    generic_array::{typenum, GenericArray},
    ops::Reduce,
    point::AffineCoordinates,
    scalar::IsHigh,
    sec1::{EncodedPoint, FromEncodedPoint, ToEncodedPoint},
    Field,
};
use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use super::{Curve, PointDecodeError};
use crate::tools::hashing::{Chain, Hashable};
use crate::tools::serde::{deserialize, serialize, TryFromBytes};

pub(crate) type BackendScalar = k256::Scalar;
pub(crate) type BackendPoint = k256::ProjectivePoint;

const ORDER_HEX: &[u8] = b"fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

/// Marker for the secp256k1 curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Secp256k1;

impl Curve for Secp256k1 {
    type Scalar = Scalar;
    type Point = Point;

    const NAME: &'static str = "secp256k1";

    fn order() -> BigUint {
        BigUint::parse_bytes(ORDER_HEX, 16).expect("valid hex constant")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scalar(BackendScalar);

impl Scalar {
    pub const ZERO: Self = Self(BackendScalar::ZERO);
    pub const ONE: Self = Self(BackendScalar::ONE);

    /// Flips the scalar to the low half of the order if needed (low-`s`
    /// normalization for canonical ECDSA signatures).
    pub fn normalized(&self) -> (Self, bool) {
        if self.0.is_high().into() {
            (-*self, true)
        } else {
            (*self, false)
        }
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    pub(crate) fn try_from_be_bytes(bytes: &[u8]) -> Result<Self, String> {
        let arr = GenericArray::<u8, typenum::U32>::from_exact_iter(bytes.iter().cloned())
            .ok_or("invalid length of a curve scalar")?;
        BackendScalar::from_repr_vartime(arr)
            .map(Self)
            .ok_or_else(|| "invalid curve scalar representation".into())
    }
}

impl super::Scalar<Secp256k1> for Scalar {
    fn zero() -> Self {
        Self::ZERO
    }

    fn one() -> Self {
        Self::ONE
    }

    fn random(rng: &mut (impl CryptoRngCore + ?Sized)) -> Self {
        Self(BackendScalar::random(&mut *rng))
    }

    fn invert(&self) -> Option<Self> {
        Option::<BackendScalar>::from(self.0.invert()).map(Self)
    }

    fn from_biguint(value: &BigUint) -> Self {
        let reduced = value % Secp256k1::order();
        let mut bytes = [0u8; 32];
        let be = reduced.to_bytes_be();
        bytes[32 - be.len()..].copy_from_slice(&be);
        Self(<BackendScalar as Reduce<U256>>::reduce_bytes(&bytes.into()))
    }

    fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.to_be_bytes())
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0 = BackendScalar::ZERO;
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize(self.to_be_bytes(), serializer)
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
        Self::try_from_be_bytes(bytes)
    }
}

impl Hashable for Scalar {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.to_be_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point(BackendPoint);

impl Point {
    pub const GENERATOR: Self = Self(BackendPoint::GENERATOR);
    pub const IDENTITY: Self = Self(BackendPoint::IDENTITY);

    /// The x-coordinate reduced into the scalar field (the ECDSA `r` value).
    pub fn x_coordinate(&self) -> Scalar {
        let bytes = self.0.to_affine().x();
        Scalar(<BackendScalar as Reduce<U256>>::reduce_bytes(&bytes))
    }

    /// Whether the x-coordinate, as an integer, exceeds the group order
    /// (the second recovery-id bit).
    pub fn x_overflows(&self) -> bool {
        let bytes = self.0.to_affine().x();
        BigUint::from_bytes_be(&bytes) >= Secp256k1::order()
    }

    pub fn y_is_odd(&self) -> bool {
        self.0.to_affine().y_is_odd().into()
    }

    fn to_compressed_bytes(self) -> Box<[u8]> {
        self.0.to_affine().to_encoded_point(true).as_bytes().into()
    }

    fn try_from_compressed_bytes(bytes: &[u8]) -> Result<Self, PointDecodeError> {
        // Only the 33-byte compressed form is canonical on the wire.
        if bytes.len() != 33 || (bytes[0] != 0x02 && bytes[0] != 0x03) {
            return Err(PointDecodeError);
        }
        let encoded = EncodedPoint::<k256::Secp256k1>::from_bytes(bytes)
            .map_err(|_| PointDecodeError)?;
        Option::<BackendPoint>::from(BackendPoint::from_encoded_point(&encoded))
            .map(Self)
            .ok_or(PointDecodeError)
    }

    /// Verifies an ECDSA signature `(r, s)` over a prehashed message against
    /// this point as the public key.
    pub fn verify_ecdsa(&self, message: &Scalar, r: &Scalar, s: &Scalar) -> bool {
        let signature = match k256::ecdsa::Signature::from_scalars(r.0, s.0) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        self.0
            .to_affine()
            .verify_prehashed(&message.0.to_bytes(), &signature)
            .is_ok()
    }
}

impl super::Point<Secp256k1> for Point {
    fn generator() -> Self {
        Self::GENERATOR
    }

    fn identity() -> Self {
        Self::IDENTITY
    }

    fn mul(&self, scalar: &Scalar) -> Self {
        Self(self.0.mul(&scalar.0))
    }

    fn to_bytes(&self) -> Box<[u8]> {
        self.to_compressed_bytes()
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
        Self(self.0.add(&other.0))
    }
}

impl Sub for Scalar {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self(self.0.sub(&other.0))
    }
}

impl Mul for Scalar {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        Self(self.0.mul(&other.0))
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
        Self(self.0.add(&other.0))
    }
}

impl Sum for Point {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::IDENTITY, Add::add)
    }
}
