//! Non-interactive zero-knowledge proofs (Fiat-Shamir over the session
//! transcript and the statement).

pub(crate) mod blum;
pub(crate) mod fac;
pub mod range;
pub(crate) mod sch;

use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::tools::hashing::{Chain, Hashable};
use crate::tools::modular::ModInt;
use crate::tools::random::{random_coprime_int, random_positive_int};

/// Ring-Pedersen auxiliaries `(Ñ, h1, h2)` used as the commitment base of the
/// range, factorization and respondent proofs. Each party publishes its own
/// set at key generation; proofs addressed to a party use that party's set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingPedersenParams {
    pub(crate) n_tilde: BigUint,
    pub(crate) h1: BigUint,
    pub(crate) h2: BigUint,
}

impl RingPedersenParams {
    /// Derives the auxiliaries from a fresh modulus `Ñ = p̃·q̃`:
    /// `h1` a random quadratic residue, `h2 = h1^α` for secret `α`.
    /// The trapdoor (`α` and the factors) is discarded after setup.
    pub(crate) fn generate(rng: &mut (impl CryptoRngCore + ?Sized), p: &BigUint, q: &BigUint) -> Self {
        let n_tilde = p * q;
        let modulus = ModInt::new(n_tilde.clone());
        let f = random_coprime_int(rng, &n_tilde);
        let alpha = random_positive_int(rng, &n_tilde);
        let h1 = modulus.mul(&f, &f);
        let h2 = modulus.exp(&h1, &alpha);
        Self { n_tilde, h1, h2 }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.n_tilde
    }

    /// `h1^a · h2^b mod Ñ`.
    pub(crate) fn commit(&self, a: &BigUint, b: &BigUint) -> BigUint {
        let modulus = ModInt::new(self.n_tilde.clone());
        modulus.mul(&modulus.exp(&self.h1, a), &modulus.exp(&self.h2, b))
    }
}

impl Hashable for RingPedersenParams {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.n_tilde).chain(&self.h1).chain(&self.h2)
    }
}
