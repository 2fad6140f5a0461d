//! Range proof for a Paillier ciphertext: the plaintext lies in `[0, q^3]`.
//!
//! Sent by the MtA initiator alongside `Enc(k)`; verified against the
//! receiver's ring-Pedersen auxiliaries.

use num_bigint_dig::BigUint;
use num_traits::One;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::RingPedersenParams;
use crate::paillier::PublicKey;
use crate::tools::hashing::{rejection_sample, Chain, Hash, Hashable};
use crate::tools::modular::{is_in_interval, pow, ModInt};
use crate::tools::random::{random_coprime_int, random_positive_int};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeProofAlice {
    z: BigUint,
    u: BigUint,
    w: BigUint,
    s: BigUint,
    s1: BigUint,
    s2: BigUint,
}

fn challenge(
    q: &BigUint,
    pk: &PublicKey,
    ciphertext: &BigUint,
    z: &BigUint,
    u: &BigUint,
    w: &BigUint,
    aux: &impl Hashable,
) -> BigUint {
    let seed = Hash::new_with_dst(b"range-proof-alice")
        .chain(pk)
        .chain(ciphertext)
        .chain(z)
        .chain(u)
        .chain(w)
        .chain(aux)
        .finalize();
    rejection_sample(q, &seed)
}

impl RangeProofAlice {
    /// Proves that `ciphertext = Enc(m; r)` with `m < q` (honest provers use
    /// a curve scalar; the proof only guarantees `m ≤ q^3`).
    pub fn new(
        rng: &mut (impl CryptoRngCore + ?Sized),
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        m: &BigUint,
        r: &BigUint,
        ciphertext: &BigUint,
        aux: &impl Hashable,
    ) -> Self {
        let q3 = pow(q, 3);
        let q_n_tilde = q * rp.modulus();
        let q3_n_tilde = &q3 * rp.modulus();

        let alpha = random_positive_int(rng, &q3);
        let beta = random_coprime_int(rng, pk.modulus());
        let gamma = random_positive_int(rng, &q3_n_tilde);
        let rho = random_positive_int(rng, &q_n_tilde);

        let z = rp.commit(m, &rho);
        let mod_n_square = ModInt::new(pk.n_square());
        // u = Γ^α · β^N mod N^2, with Γ = N + 1.
        let u = mod_n_square.mul(
            &mod_n_square.reduce(&(BigUint::one() + &alpha * pk.modulus())),
            &mod_n_square.exp(&beta, pk.modulus()),
        );
        let w = rp.commit(&alpha, &gamma);

        let e = challenge(q, pk, ciphertext, &z, &u, &w, aux);

        let mod_n = ModInt::new(pk.modulus().clone());
        let s = mod_n.mul(&mod_n.exp(r, &e), &beta);
        let s1 = &e * m + alpha;
        let s2 = &e * rho + gamma;

        Self {
            z,
            u,
            w,
            s,
            s1,
            s2,
        }
    }

    pub fn verify(
        &self,
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        ciphertext: &BigUint,
        aux: &impl Hashable,
    ) -> bool {
        let q3 = pow(q, 3);
        if !is_in_interval(&self.s1, &(&q3 + 1u32)) {
            return false;
        }
        if !pk.is_valid_ciphertext(ciphertext) {
            return false;
        }

        let e = challenge(q, pk, ciphertext, &self.z, &self.u, &self.w, aux);

        // u ?= Γ^s1 · s^N · c^{-e} mod N^2
        let mod_n_square = ModInt::new(pk.n_square());
        let c_inv = match mod_n_square.inv(ciphertext) {
            Some(inverse) => inverse,
            None => return false,
        };
        let lhs = mod_n_square.mul(
            &mod_n_square.mul(
                &mod_n_square.reduce(&(BigUint::one() + &self.s1 * pk.modulus())),
                &mod_n_square.exp(&self.s, pk.modulus()),
            ),
            &mod_n_square.exp(&c_inv, &e),
        );
        if lhs != self.u {
            return false;
        }

        // h1^s1 · h2^s2 ?= w · z^e mod Ñ
        let mod_n_tilde = ModInt::new(rp.modulus().clone());
        let lhs = rp.commit(&self.s1, &self.s2);
        let rhs = mod_n_tilde.mul(&self.w, &mod_n_tilde.exp(&self.z, &e));
        lhs == rhs
    }
}

#[cfg(test)]
mod tests {
    use num_bigint_dig::BigUint;
    use rand_core::OsRng;

    use super::*;
    use crate::curve::{Curve, Secp256k1};
    use crate::paillier::tests::test_key;
    use crate::tools::random::random_blum_prime;

    fn test_rp_params() -> RingPedersenParams {
        let p = random_blum_prime(&mut OsRng, 256);
        let q = random_blum_prime(&mut OsRng, 256);
        RingPedersenParams::generate(&mut OsRng, &p, &q)
    }

    #[test]
    fn honest_proof_verifies() {
        let q = Secp256k1::order();
        let sk = test_key(2048);
        let pk = sk.public_key().clone();
        let rp = test_rp_params();
        let aux = b"transcript".to_vec();

        let m = BigUint::from(987654321u64) % &q;
        let (c, r) = pk.encrypt(&mut OsRng, &m).unwrap();
        let proof = RangeProofAlice::new(&mut OsRng, &q, &pk, &rp, &m, &r, &c, &aux);
        assert!(proof.verify(&q, &pk, &rp, &c, &aux));
    }

    #[test]
    fn tampered_proof_rejected() {
        let q = Secp256k1::order();
        let sk = test_key(2048);
        let pk = sk.public_key().clone();
        let rp = test_rp_params();
        let aux = b"transcript".to_vec();

        let m = BigUint::from(42u64);
        let (c, r) = pk.encrypt(&mut OsRng, &m).unwrap();
        let proof = RangeProofAlice::new(&mut OsRng, &q, &pk, &rp, &m, &r, &c, &aux);

        // Wrong ciphertext binding.
        let (other_c, _) = pk.encrypt(&mut OsRng, &m).unwrap();
        assert!(!proof.verify(&q, &pk, &rp, &other_c, &aux));
        // Wrong transcript.
        assert!(!proof.verify(&q, &pk, &rp, &c, &b"other".to_vec()));

        // Mutated response.
        let mut bad = proof.clone();
        bad.s1 += 1u32;
        assert!(!bad.verify(&q, &pk, &rp, &c, &aux));
    }

    #[test]
    fn oversized_plaintext_rejected() {
        // A plaintext far beyond q^3 cannot produce a passing proof with the
        // honest prover algorithm (s1 blows the interval check).
        let q = Secp256k1::order();
        let sk = test_key(2048);
        let pk = sk.public_key().clone();
        let rp = test_rp_params();
        let aux = b"transcript".to_vec();

        let m = pow(&q, 4);
        let (c, r) = pk.encrypt(&mut OsRng, &m).unwrap();
        let proof = RangeProofAlice::new(&mut OsRng, &q, &pk, &rp, &m, &r, &c, &aux);
        assert!(!proof.verify(&q, &pk, &rp, &c, &aux));
    }
}
