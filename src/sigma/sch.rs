//! Schnorr proof of knowledge of a discrete logarithm, over any base point.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::curve::{Curve, Point, Scalar};
use crate::tools::hashing::{rejection_sample, Chain, Hash, Hashable};

/// The prover's ephemeral nonce. Kept between the commitment round and the
/// proof round, wiped when consumed.
#[derive(Debug, Clone)]
pub(crate) struct SchSecret<C: Curve>(C::Scalar);

impl<C: Curve> SchSecret<C> {
    pub fn random(rng: &mut (impl CryptoRngCore + ?Sized)) -> Self {
        Self(C::Scalar::random_nonzero(rng))
    }
}

impl<C: Curve> Drop for SchSecret<C> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// The commitment `R = r·B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub(crate) struct SchCommitment<C: Curve>(C::Point);

impl<C: Curve> SchCommitment<C> {
    pub fn new(secret: &SchSecret<C>) -> Self {
        Self(secret.0.mul_by_generator())
    }

    pub fn new_for_base(secret: &SchSecret<C>, base: &C::Point) -> Self {
        Self(base.mul(&secret.0))
    }
}

impl<C: Curve> Hashable for SchCommitment<C> {
    fn chain<Ch: Chain>(&self, digest: Ch) -> Ch {
        digest.chain(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub(crate) struct SchProof<C: Curve> {
    commitment: SchCommitment<C>,
    response: C::Scalar,
}

fn challenge<C: Curve>(
    base: &C::Point,
    public: &C::Point,
    commitment: &SchCommitment<C>,
    aux: &impl Hashable,
) -> C::Scalar {
    let seed = Hash::new_with_dst(b"schnorr-proof")
        .chain_bytes(C::NAME.as_bytes())
        .chain(base)
        .chain(public)
        .chain(commitment)
        .chain(aux)
        .finalize();
    C::Scalar::from_biguint(&rejection_sample(&C::order(), &seed))
}

impl<C: Curve> SchProof<C> {
    /// Proves knowledge of `x` with `public = x·G`.
    pub fn new(
        secret: &SchSecret<C>,
        x: &C::Scalar,
        commitment: &SchCommitment<C>,
        public: &C::Point,
        aux: &impl Hashable,
    ) -> Self {
        Self::new_for_base(secret, x, commitment, &C::Point::generator(), public, aux)
    }

    /// Proves knowledge of `x` with `public = x·base`.
    pub fn new_for_base(
        secret: &SchSecret<C>,
        x: &C::Scalar,
        commitment: &SchCommitment<C>,
        base: &C::Point,
        public: &C::Point,
        aux: &impl Hashable,
    ) -> Self {
        let e = challenge(base, public, commitment, aux);
        let response = secret.0 + e * *x;
        Self {
            commitment: *commitment,
            response,
        }
    }

    pub fn verify(&self, public: &C::Point, aux: &impl Hashable) -> bool {
        self.verify_for_base(&C::Point::generator(), public, aux)
    }

    pub fn verify_for_base(
        &self,
        base: &C::Point,
        public: &C::Point,
        aux: &impl Hashable,
    ) -> bool {
        let e = challenge(base, public, &self.commitment, aux);
        base.mul(&self.response) == self.commitment.0 + public.mul(&e)
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::curve::{Ed25519, Secp256k1};

    fn prove_and_verify<C: Curve>() {
        let x = C::Scalar::random(&mut OsRng);
        let public = x.mul_by_generator();
        let secret = SchSecret::<C>::random(&mut OsRng);
        let commitment = SchCommitment::new(&secret);
        let aux = b"session transcript".to_vec();

        let proof = SchProof::new(&secret, &x, &commitment, &public, &aux);
        assert!(proof.verify(&public, &aux));

        // A different statement or transcript must not verify.
        let other = C::Scalar::random(&mut OsRng).mul_by_generator();
        assert!(!proof.verify(&other, &aux));
        assert!(!proof.verify(&public, &b"other transcript".to_vec()));
    }

    #[test]
    fn secp256k1() {
        prove_and_verify::<Secp256k1>();
    }

    #[test]
    fn ed25519() {
        prove_and_verify::<Ed25519>();
    }

    #[test]
    fn arbitrary_base() {
        type C = Secp256k1;
        let base = <C as Curve>::Scalar::random(&mut OsRng).mul_by_generator();
        let x = <C as Curve>::Scalar::random(&mut OsRng);
        let public = base.mul(&x);
        let secret = SchSecret::<C>::random(&mut OsRng);
        let commitment = SchCommitment::new_for_base(&secret, &base);
        let aux = b"aux".to_vec();

        let proof = SchProof::new_for_base(&secret, &x, &commitment, &base, &public, &aux);
        assert!(proof.verify_for_base(&base, &public, &aux));
        assert!(!proof.verify(&public, &aux));
    }
}
