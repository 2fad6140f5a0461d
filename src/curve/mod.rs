//! Adapters to the ECC backends.
//!
//! The backend crates have somewhat unstable APIs, so all the related logic
//! is isolated here behind newtype wrappers and a small [`Curve`] trait that
//! the curve-agnostic components (VSS, Schnorr proofs) are generic over.

pub mod ed25519;
pub mod secp256k1;

use core::fmt::Debug;
use core::iter::Sum;
use core::ops::{Add, Mul, Neg, Sub};

use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroize;

use crate::tools::hashing::Hashable;

pub use ed25519::Ed25519;
pub use secp256k1::Secp256k1;

/// point encoding is not a valid element of the expected group
#[derive(Debug, Clone, PartialEq, Eq, displaydoc::Display)]
pub struct PointDecodeError;

impl std::error::Error for PointDecodeError {}

/// An elliptic curve group of prime order, as used by the protocols.
pub trait Curve: 'static + Clone + Copy + Debug + PartialEq + Eq + Send + Sync {
    type Scalar: Scalar<Self>;
    type Point: Point<Self>;

    /// Stable name, used for transcript domain separation and type URLs.
    const NAME: &'static str;

    /// The group order `q`.
    fn order() -> BigUint;
}

/// An element of the curve's prime-order scalar field.
pub trait Scalar<C: Curve<Scalar = Self>>:
    'static
    + Clone
    + Copy
    + Debug
    + PartialEq
    + Eq
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Hashable
    + Zeroize
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + Sum
{
    fn zero() -> Self;
    fn one() -> Self;
    fn random(rng: &mut (impl CryptoRngCore + ?Sized)) -> Self;

    fn random_nonzero(rng: &mut (impl CryptoRngCore + ?Sized)) -> Self {
        loop {
            let scalar = Self::random(rng);
            if !scalar.is_zero() {
                return scalar;
            }
        }
    }

    fn is_zero(&self) -> bool {
        self == &Self::zero()
    }

    /// `None` for zero.
    fn invert(&self) -> Option<Self>;

    /// Reduces an arbitrary-precision integer into the field.
    fn from_biguint(value: &BigUint) -> Self;
    fn to_biguint(&self) -> BigUint;

    fn mul_by_generator(&self) -> C::Point {
        C::Point::generator().mul(self)
    }
}

/// A point on the curve, restricted to the prime-order subgroup.
pub trait Point<C: Curve>:
    'static
    + Clone
    + Copy
    + Debug
    + PartialEq
    + Eq
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Hashable
    + Add<Output = Self>
    + Sum
{
    fn generator() -> Self;
    fn identity() -> Self;
    fn mul(&self, scalar: &C::Scalar) -> Self;

    /// Canonical compressed encoding.
    fn to_bytes(&self) -> Box<[u8]>;

    /// Decodes and fully validates a received point; failure names the sender
    /// as culprit at the protocol layer.
    fn from_bytes(bytes: &[u8]) -> Result<Self, PointDecodeError>;
}
