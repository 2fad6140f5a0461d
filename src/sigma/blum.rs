//! Paillier-Blum modulus proof: `N` is a product of two primes, both
//! `≡ 3 (mod 4)`. Self-contained (no verifier auxiliaries), so it travels
//! with the Paillier public key itself.

use num_bigint_dig::prime::probably_prime;
use num_bigint_dig::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::paillier::SecretKey;
use crate::tools::hashing::{rejection_sample, Chain, Hash, Hashable};
use crate::tools::modular::{jacobi, mod_inverse, ModInt};
use crate::tools::random::{random_positive_int, MR_ITERATIONS};

/// Soundness error is `2^-ITERATIONS`.
const ITERATIONS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Iteration {
    x: BigUint,
    a: bool,
    b: bool,
    z: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlumModProof {
    w: BigUint,
    iterations: Vec<Iteration>,
}

fn challenge(n: &BigUint, w: &BigUint, index: u64, aux: &impl Hashable) -> BigUint {
    let seed = Hash::new_with_dst(b"blum-mod-proof")
        .chain(n)
        .chain(w)
        .chain(&index)
        .chain(aux)
        .finalize();
    rejection_sample(n, &seed)
}

/// The Legendre symbol of `a` modulo an odd prime `p`.
fn is_quadratic_residue(a: &BigUint, p: &BigUint) -> bool {
    let exponent = (p - 1u32) >> 1;
    a.modpow(&exponent, p).is_one()
}

impl BlumModProof {
    /// `None` when the key is not a Blum structure (both factors must be
    /// `≡ 3 (mod 4)`), or, negligibly, when a challenge is not a unit.
    pub fn new(rng: &mut (impl CryptoRngCore + ?Sized), sk: &SecretKey, aux: &impl Hashable) -> Option<Self> {
        let (p, q) = sk.primes();
        if (p % 4u32) != BigUint::from(3u32) || (q % 4u32) != BigUint::from(3u32) {
            return None;
        }
        let n = sk.public_key().modulus();
        let phi = sk.totient();
        let modulus = ModInt::new(n.clone());

        // A witness with Jacobi symbol -1 makes the four twists
        // `±y, ±w·y` cover all quadratic classes.
        let w = loop {
            let candidate = random_positive_int(rng, n);
            if jacobi(&candidate, n) == -1 {
                break candidate;
            }
        };

        // Fourth roots of quadratic residues: x = y^{((φ+4)/8)^2}.
        let eighth = (phi + 4u32) >> 3;
        let quartic_exponent = &eighth * &eighth;
        let n_inv = mod_inverse(n, phi)?;

        let mut iterations = Vec::with_capacity(ITERATIONS);
        for index in 0..ITERATIONS as u64 {
            let y = challenge(n, &w, index, aux);
            if y.gcd(n) != BigUint::one() {
                return None;
            }
            let z = modulus.exp(&y, &n_inv);

            let (a, b, y_prime) = Self::quadratic_twist(&modulus, p, q, &w, &y)?;
            let x = modulus.exp(&y_prime, &quartic_exponent);
            iterations.push(Iteration { x, a, b, z });
        }

        Some(Self { w, iterations })
    }

    /// Finds the unique `(a, b)` twist making `(-1)^a · w^b · y` a quadratic
    /// residue.
    fn quadratic_twist(
        modulus: &ModInt,
        p: &BigUint,
        q: &BigUint,
        w: &BigUint,
        y: &BigUint,
    ) -> Option<(bool, bool, BigUint)> {
        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            let mut candidate = y.clone();
            if b {
                candidate = modulus.mul(&candidate, w);
            }
            if a {
                candidate = modulus.sub(&BigUint::zero(), &candidate);
            }
            if is_quadratic_residue(&candidate, p) && is_quadratic_residue(&candidate, q) {
                return Some((a, b, candidate));
            }
        }
        None
    }

    pub fn verify(&self, n: &BigUint, aux: &impl Hashable) -> bool {
        if self.iterations.len() != ITERATIONS {
            return false;
        }
        if n.is_even() || n.is_one() {
            return false;
        }
        // A prime modulus would make the factor claim vacuous.
        if probably_prime(n, MR_ITERATIONS) {
            return false;
        }
        if self.w.is_zero() || &self.w >= n || jacobi(&self.w, n) != -1 {
            return false;
        }

        let modulus = ModInt::new(n.clone());
        for (index, iteration) in self.iterations.iter().enumerate() {
            let y = challenge(n, &self.w, index as u64, aux);
            if modulus.exp(&iteration.z, n) != y {
                return false;
            }
            let mut y_prime = y;
            if iteration.b {
                y_prime = modulus.mul(&y_prime, &self.w);
            }
            if iteration.a {
                y_prime = modulus.sub(&BigUint::zero(), &y_prime);
            }
            let x4 = modulus.exp(&iteration.x, &BigUint::from(4u32));
            if x4 != y_prime {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::paillier::tests::test_key;

    #[test]
    fn honest_proof_verifies() {
        let sk = test_key(512);
        let aux = b"transcript".to_vec();
        let proof = BlumModProof::new(&mut OsRng, &sk, &aux).unwrap();
        assert!(proof.verify(sk.public_key().modulus(), &aux));
        assert!(!proof.verify(sk.public_key().modulus(), &b"other".to_vec()));
    }

    #[test]
    fn wrong_modulus_rejected() {
        let sk = test_key(512);
        let other = test_key(512);
        let aux = b"transcript".to_vec();
        let proof = BlumModProof::new(&mut OsRng, &sk, &aux).unwrap();
        assert!(!proof.verify(other.public_key().modulus(), &aux));
    }
}
