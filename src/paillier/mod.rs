//! The Paillier cryptosystem: additively homomorphic encryption over `Z/N`,
//! keyed by a product of two large primes.

use num_bigint_dig::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::tools::hashing::{Chain, Hashable};
use crate::tools::modular::{mod_inverse, ModInt};
use crate::tools::random::random_coprime_int;

/// The required distance between the factors' bit lengths and `bits/2`,
/// rejecting trivially unbalanced moduli.
const PQ_BIT_DISTANCE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, displaydoc::Display)]
pub enum PaillierError {
    /// plaintext is outside `[0, N)`
    MessageTooLarge,
    /// ciphertext is outside `(0, N^2)` or shares a factor with the modulus
    MalformedCiphertext,
    /// the prime factors do not form a usable modulus
    BadFactors,
}

impl std::error::Error for PaillierError {}

/// The public key `(N, g = N + 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    n: BigUint,
}

impl PublicKey {
    pub(crate) fn from_modulus(n: BigUint) -> Self {
        Self { n }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    pub fn n_square(&self) -> BigUint {
        &self.n * &self.n
    }

    /// `true` iff `c` is a unit of `Z/N^2` (a well-formed ciphertext).
    pub fn is_valid_ciphertext(&self, c: &BigUint) -> bool {
        let n_square = self.n_square();
        !c.is_zero() && c < &n_square && c.gcd(&n_square).is_one()
    }

    /// Encrypts `m ∈ [0, N)`, returning the ciphertext and the randomizer used.
    pub fn encrypt(
        &self,
        rng: &mut (impl CryptoRngCore + ?Sized),
        m: &BigUint,
    ) -> Result<(BigUint, BigUint), PaillierError> {
        let r = random_coprime_int(rng, &self.n);
        Ok((self.encrypt_with(m, &r)?, r))
    }

    /// Encrypts `m ∈ [0, N)` with the given randomizer `r ∈ (Z/N)*`:
    /// `(1 + mN) · r^N mod N^2`.
    pub fn encrypt_with(&self, m: &BigUint, r: &BigUint) -> Result<BigUint, PaillierError> {
        if m >= &self.n {
            return Err(PaillierError::MessageTooLarge);
        }
        let modulus = ModInt::new(self.n_square());
        let gm = modulus.reduce(&(BigUint::one() + m * &self.n));
        let rn = modulus.exp(r, &self.n);
        Ok(modulus.mul(&gm, &rn))
    }

    /// `c1 · c2 mod N^2` encrypts `m1 + m2`.
    pub fn homo_add(&self, c1: &BigUint, c2: &BigUint) -> Result<BigUint, PaillierError> {
        if !self.is_valid_ciphertext(c1) || !self.is_valid_ciphertext(c2) {
            return Err(PaillierError::MalformedCiphertext);
        }
        Ok(ModInt::new(self.n_square()).mul(c1, c2))
    }

    /// `c^k mod N^2` encrypts `k · m`.
    pub fn homo_mult(&self, k: &BigUint, c: &BigUint) -> Result<BigUint, PaillierError> {
        if !self.is_valid_ciphertext(c) {
            return Err(PaillierError::MalformedCiphertext);
        }
        Ok(ModInt::new(self.n_square()).exp(c, k))
    }
}

impl Hashable for PublicKey {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&self.n)
    }
}

/// The secret key: the factors of `N` and the derived totients.
///
/// The factors stay in the key for later zero-knowledge proofs; everything is
/// wiped on drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey {
    public: PublicKey,
    p: BigUint,
    q: BigUint,
    phi: BigUint,
    lambda: BigUint,
}

impl SecretKey {
    /// Builds a key from two primes of roughly `N`'s half bit length.
    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self, PaillierError> {
        if p == q || p.is_one() || q.is_one() {
            return Err(PaillierError::BadFactors);
        }
        let half_bits = (p.bits() + q.bits()) / 2;
        if p.bits() < half_bits - PQ_BIT_DISTANCE || q.bits() < half_bits - PQ_BIT_DISTANCE {
            return Err(PaillierError::BadFactors);
        }
        let n = &p * &q;
        let p_minus_one = &p - 1u32;
        let q_minus_one = &q - 1u32;
        let phi = &p_minus_one * &q_minus_one;
        let lambda = &phi / p_minus_one.gcd(&q_minus_one);
        Ok(Self {
            public: PublicKey::from_modulus(n),
            p,
            q,
            phi,
            lambda,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn primes(&self) -> (&BigUint, &BigUint) {
        (&self.p, &self.q)
    }

    pub(crate) fn totient(&self) -> &BigUint {
        &self.phi
    }

    /// Decrypts a ciphertext: `L(c^λ mod N^2) · L(g^λ mod N^2)^{-1} mod N`,
    /// where `L(u) = (u - 1) / N`.
    pub fn decrypt(&self, c: &BigUint) -> Result<BigUint, PaillierError> {
        let n = self.public.modulus();
        if !self.public.is_valid_ciphertext(c) {
            return Err(PaillierError::MalformedCiphertext);
        }
        let mod_n_square = ModInt::new(self.public.n_square());
        let lc = l_function(&mod_n_square.exp(c, &self.lambda), n)?;
        // With g = N + 1, L(g^λ mod N^2) is just λ mod N.
        let lg = &self.lambda % n;
        let lg_inv = mod_inverse(&lg, n).ok_or(PaillierError::MalformedCiphertext)?;
        Ok(ModInt::new(n.clone()).mul(&lc, &lg_inv))
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.p.zeroize();
        self.q.zeroize();
        self.phi.zeroize();
        self.lambda.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

fn l_function(u: &BigUint, n: &BigUint) -> Result<BigUint, PaillierError> {
    let u_minus_one = u - 1u32;
    if !(&u_minus_one % n).is_zero() {
        return Err(PaillierError::MalformedCiphertext);
    }
    Ok(u_minus_one / n)
}

#[cfg(test)]
pub(crate) mod tests {
    use num_bigint_dig::BigUint;
    use rand_core::OsRng;

    use super::*;
    use crate::tools::random::random_blum_prime;

    pub(crate) fn test_key(bits: usize) -> SecretKey {
        let p = random_blum_prime(&mut OsRng, bits / 2);
        let q = loop {
            let q = random_blum_prime(&mut OsRng, bits / 2);
            if q != p {
                break q;
            }
        };
        SecretKey::from_primes(p, q).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let sk = test_key(512);
        let pk = sk.public_key().clone();
        let boundary = pk.modulus() - 1u32;
        for m in [
            BigUint::from(0u32),
            BigUint::from(1u32),
            BigUint::from(123456u32),
            boundary,
        ] {
            let (c, _r) = pk.encrypt(&mut OsRng, &m).unwrap();
            assert_eq!(sk.decrypt(&c).unwrap(), m);
        }
    }

    #[test]
    fn homomorphic_add_and_mult() {
        let sk = test_key(512);
        let pk = sk.public_key().clone();
        let m1 = BigUint::from(100u32);
        let m2 = BigUint::from(50u32);
        let k = BigUint::from(3u32);

        let (c1, _) = pk.encrypt(&mut OsRng, &m1).unwrap();
        let (c2, _) = pk.encrypt(&mut OsRng, &m2).unwrap();

        let sum = pk.homo_add(&c1, &c2).unwrap();
        assert_eq!(sk.decrypt(&sum).unwrap(), (&m1 + &m2) % pk.modulus());

        let scaled = pk.homo_mult(&k, &c1).unwrap();
        assert_eq!(sk.decrypt(&scaled).unwrap(), (&m1 * &k) % pk.modulus());
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        let sk = test_key(512);
        let pk = sk.public_key().clone();
        assert_eq!(
            pk.encrypt(&mut OsRng, pk.modulus()),
            Err(PaillierError::MessageTooLarge)
        );
        assert_eq!(
            sk.decrypt(&pk.n_square()),
            Err(PaillierError::MalformedCiphertext)
        );
        assert_eq!(
            sk.decrypt(&BigUint::from(0u32)),
            Err(PaillierError::MalformedCiphertext)
        );
    }
}
