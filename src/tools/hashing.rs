//! Protocol hashing: SHA-512/256 over length-prefixed inputs.
//!
//! Every hashed input is prefixed with its 64-bit big-endian length, so that
//! concatenation ambiguities (`H(AB|C) == H(A|BC)`) are impossible. Integers
//! are fed through their minimal big-endian representation.

use digest::Digest;
use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512_256;

/// A digest object that takes byte slices or decomposable ([`Hashable`]) objects.
pub trait Chain: Sized {
    /// Hash raw bytes.
    ///
    /// Note: only for impls in specific types, do not use directly.
    fn chain_raw_bytes(self, bytes: &[u8]) -> Self;

    /// Hash raw bytes in a collision-resistant way.
    fn chain_bytes(self, bytes: &(impl AsRef<[u8]> + ?Sized)) -> Self {
        // Hash the length too to prevent hash conflicts. (e.g. H(AB|CD) == H(ABC|D)).
        // Not strictly necessary for fixed-size arrays, but it's easier to just always do it.
        let len = (bytes.as_ref().len() as u64).to_be_bytes();
        self.chain_raw_bytes(&len).chain_raw_bytes(bytes.as_ref())
    }

    fn chain<T: Hashable + ?Sized>(self, hashable: &T) -> Self {
        hashable.chain(self)
    }

    /// Hash a slice of hashable items, committing to the item count.
    fn chain_each<T: Hashable>(self, items: &[T]) -> Self {
        let digest = self.chain(&(items.len() as u64));
        items.iter().fold(digest, |digest, item| digest.chain(item))
    }
}

/// The protocol hash output (SHA-512 truncated to 256 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashOutput(pub(crate) [u8; 32]);

impl AsRef<[u8]> for HashOutput {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA-512/256 wrapped for easier replacement, standardizing the use of a
/// domain separation tag.
pub struct Hash(Sha512_256);

impl Chain for Hash {
    fn chain_raw_bytes(self, bytes: &[u8]) -> Self {
        Self(self.0.chain_update(bytes))
    }
}

impl Hash {
    fn new() -> Self {
        Self(Sha512_256::new())
    }

    pub fn new_with_dst(dst: &[u8]) -> Self {
        Self::new().chain_bytes(dst)
    }

    pub fn finalize(self) -> HashOutput {
        HashOutput(self.0.finalize().into())
    }

    /// Finalizes into an unsigned integer in `[0, 2^256)`.
    pub fn finalize_to_uint(self) -> BigUint {
        BigUint::from_bytes_be(self.finalize().as_ref())
    }
}

/// A trait allowing complex objects to give access to their contents for hashing
/// purposes without the need of a conversion to a new form (e.g. serialization).
pub trait Hashable {
    fn chain<C: Chain>(&self, digest: C) -> C;
}

impl<T: Hashable + ?Sized> Hashable for &T {
    fn chain<C: Chain>(&self, digest: C) -> C {
        (*self).chain(digest)
    }
}

impl Hashable for [u8] {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self)
    }
}

impl Hashable for Box<[u8]> {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self)
    }
}

impl Hashable for Vec<u8> {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(self)
    }
}

impl Hashable for u8 {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&[*self])
    }
}

impl Hashable for u64 {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.to_be_bytes())
    }
}

impl Hashable for HashOutput {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.0)
    }
}

/// Integers hash as their minimal big-endian representation.
impl Hashable for BigUint {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_bytes(&self.to_bytes_be())
    }
}

impl<T1: Hashable, T2: Hashable> Hashable for (T1, T2) {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.0).chain(&self.1)
    }
}

impl<T1: Hashable, T2: Hashable, T3: Hashable> Hashable for (T1, T2, T3) {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.0).chain(&self.1).chain(&self.2)
    }
}

impl<T1: Hashable, T2: Hashable, T3: Hashable, T4: Hashable> Hashable for (T1, T2, T3, T4) {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest
            .chain(&self.0)
            .chain(&self.1)
            .chain(&self.2)
            .chain(&self.3)
    }
}

/// Hashes a slice of hashable items, committing to the item count.
pub struct HashableSlice<'a, T: Hashable>(pub &'a [T]);

impl<'a, T: Hashable> Hashable for HashableSlice<'a, T> {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_each(self.0)
    }
}

/// Derives a uniform integer in `[0, bound)` from a transcript hash,
/// re-hashing with an incrementing counter until the value fits.
pub fn rejection_sample(bound: &BigUint, seed: &HashOutput) -> BigUint {
    let mut value = BigUint::from_bytes_be(seed.as_ref());
    let mut counter: u64 = 0;
    while &value >= bound {
        value = Hash::new_with_dst(b"rejection-sample")
            .chain(seed)
            .chain(&counter)
            .finalize_to_uint();
        counter += 1;
    }
    value
}

const BLIND_LEN: usize = 32;

/// A hash commitment to a decomposable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashCommitment(HashOutput);

/// The blinding factor revealed when opening a [`HashCommitment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment(Box<[u8]>);

fn commitment_hash(blind: &[u8], data: &impl Hashable) -> HashOutput {
    Hash::new_with_dst(b"hash-commitment")
        .chain_bytes(blind)
        .chain(data)
        .finalize()
}

impl HashCommitment {
    pub fn new(rng: &mut (impl CryptoRngCore + ?Sized), data: &impl Hashable) -> (Self, Decommitment) {
        let mut blind = vec![0u8; BLIND_LEN];
        rng.fill_bytes(&mut blind);
        let commitment = Self(commitment_hash(&blind, data));
        (commitment, Decommitment(blind.into_boxed_slice()))
    }

    pub fn verify(&self, data: &impl Hashable, decommitment: &Decommitment) -> bool {
        decommitment.0.len() == BLIND_LEN && commitment_hash(&decommitment.0, data) == self.0
    }
}

impl Hashable for HashCommitment {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint_dig::BigUint;
    use rand_core::OsRng;

    use super::{rejection_sample, Chain, Hash, HashCommitment};

    #[test]
    fn length_prefixes_disambiguate() {
        let h1 = Hash::new_with_dst(b"test")
            .chain_bytes(b"ab")
            .chain_bytes(b"cd")
            .finalize();
        let h2 = Hash::new_with_dst(b"test")
            .chain_bytes(b"abc")
            .chain_bytes(b"d")
            .finalize();
        assert_ne!(h1, h2);
    }

    #[test]
    fn dst_separates_domains() {
        let h1 = Hash::new_with_dst(b"one").chain_bytes(b"data").finalize();
        let h2 = Hash::new_with_dst(b"two").chain_bytes(b"data").finalize();
        assert_ne!(h1, h2);
    }

    #[test]
    fn rejection_sample_is_below_bound() {
        let bound = BigUint::from(12345u64);
        for i in 0..100u64 {
            let seed = Hash::new_with_dst(b"seed").chain(&i).finalize();
            assert!(rejection_sample(&bound, &seed) < bound);
        }
    }

    #[test]
    fn commitment_roundtrip() {
        let data = b"committed data".to_vec();
        let (commitment, decommitment) = HashCommitment::new(&mut OsRng, &data);
        assert!(commitment.verify(&data, &decommitment));

        let other = b"other data".to_vec();
        assert!(!commitment.verify(&other, &decommitment));
    }
}
