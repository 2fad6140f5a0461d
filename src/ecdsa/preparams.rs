//! Pre-computed Paillier material for the ECDSA protocols.

use std::time::Duration;

use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::paillier::SecretKey;
use crate::party::{Error, ErrorKind};
use crate::sigma::RingPedersenParams;
use crate::tools::random::{random_blum_prime, safe_prime, safe_primes_concurrent};

/// The Paillier modulus size required of every party.
pub const PAILLIER_MODULUS_BITS: usize = 2048;

/// A party's Paillier secret key plus the ring-Pedersen auxiliaries
/// `(Ñ, h1, h2)` that its peers' proofs will be verified against.
///
/// Generation needs four large primes and dominates keygen cost, so the
/// result may be computed once, persisted, and reused across keygens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPreParams {
    pub(crate) paillier_sk: SecretKey,
    pub(crate) ring_pedersen: RingPedersenParams,
}

impl LocalPreParams {
    /// Generates production pre-params from safe primes, fanning the search
    /// out across available cores. Fails with
    /// [`ErrorKind::ResourceExhausted`] when the optional wall-clock budget
    /// runs out; the caller may retry.
    pub fn generate(budget: Option<Duration>) -> Result<Self, Error> {
        let bits = PAILLIER_MODULUS_BITS / 2;
        let (p, q) = safe_primes_concurrent(bits, budget)
            .map_err(|err| Error::new(ErrorKind::ResourceExhausted(err.to_string()), None, Vec::new()))?;
        let (p_tilde, q_tilde) = safe_primes_concurrent(bits, budget)
            .map_err(|err| Error::new(ErrorKind::ResourceExhausted(err.to_string()), None, Vec::new()))?;
        Self::from_primes(&mut rand_core::OsRng, p, q, &p_tilde, &q_tilde)
    }

    /// As [`generate`](Self::generate), but deterministic from the given rng
    /// (single-threaded search).
    pub fn generate_with_rng(
        rng: &mut impl CryptoRngCore,
        budget: Option<Duration>,
    ) -> Result<Self, Error> {
        let bits = PAILLIER_MODULUS_BITS / 2;
        let mut next = |rng: &mut dyn CryptoRngCore| {
            safe_prime(rng, bits, budget).map_err(|err| {
                Error::new(ErrorKind::ResourceExhausted(err.to_string()), None, Vec::new())
            })
        };
        let p = next(&mut *rng)?;
        let q = next(&mut *rng)?;
        let p_tilde = next(&mut *rng)?;
        let q_tilde = next(&mut *rng)?;
        Self::from_primes(rng, p, q, &p_tilde, &q_tilde)
    }

    /// Generates pre-params from plain Blum primes instead of safe primes.
    ///
    /// Orders of magnitude faster, and all protocol proofs still apply, but
    /// the hidden-order assumption behind the ring-Pedersen auxiliaries is
    /// weakened. For tests and fixtures only.
    pub fn generate_unsafe(rng: &mut (impl CryptoRngCore + ?Sized)) -> Result<Self, Error> {
        let bits = PAILLIER_MODULUS_BITS / 2;
        let p = random_blum_prime(rng, bits);
        let q = random_blum_prime(rng, bits);
        let p_tilde = random_blum_prime(rng, bits);
        let q_tilde = random_blum_prime(rng, bits);
        Self::from_primes(rng, p, q, &p_tilde, &q_tilde)
    }

    fn from_primes(
        rng: &mut (impl CryptoRngCore + ?Sized),
        p: BigUint,
        q: BigUint,
        p_tilde: &BigUint,
        q_tilde: &BigUint,
    ) -> Result<Self, Error> {
        let paillier_sk = SecretKey::from_primes(p, q)
            .map_err(|err| Error::configuration(err.to_string()))?;
        let ring_pedersen = RingPedersenParams::generate(rng, p_tilde, q_tilde);
        let params = Self {
            paillier_sk,
            ring_pedersen,
        };
        if !params.is_well_formed() {
            return Err(Error::configuration(
                "pre-params do not meet the modulus size requirements",
            ));
        }
        Ok(params)
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.paillier_sk.public_key().modulus().bits() >= PAILLIER_MODULUS_BITS
            && self.ring_pedersen.modulus().bits() >= PAILLIER_MODULUS_BITS
            && self.ring_pedersen.h1 != self.ring_pedersen.h2
    }
}
