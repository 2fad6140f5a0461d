//! No-small-factor proof: the prover knows `p, q` with `N0 = p·q` and both
//! factors of roughly `sqrt(N0)` size. Verified against the receiver's
//! ring-Pedersen auxiliaries.

use num_bigint_dig::{BigInt, BigUint};
use num_integer::Roots;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::RingPedersenParams;
use crate::tools::hashing::{rejection_sample, Chain, Hash, Hashable};
use crate::tools::modular::{is_in_interval, pow, ModInt};
use crate::tools::random::random_positive_int;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacProof {
    cap_p: BigUint,
    cap_q: BigUint,
    cap_a: BigUint,
    cap_b: BigUint,
    cap_t: BigUint,
    sigma: BigUint,
    z1: BigUint,
    z2: BigUint,
    w1: BigUint,
    w2: BigUint,
    v: BigInt,
}

#[allow(clippy::too_many_arguments)]
fn challenge(
    q: &BigUint,
    n0: &BigUint,
    rp: &RingPedersenParams,
    cap_p: &BigUint,
    cap_q: &BigUint,
    cap_a: &BigUint,
    cap_b: &BigUint,
    cap_t: &BigUint,
    sigma: &BigUint,
    aux: &impl Hashable,
) -> BigUint {
    let seed = Hash::new_with_dst(b"fac-proof")
        .chain(n0)
        .chain(rp)
        .chain(cap_p)
        .chain(cap_q)
        .chain(cap_a)
        .chain(cap_b)
        .chain(cap_t)
        .chain(sigma)
        .chain(aux)
        .finalize();
    rejection_sample(q, &seed)
}

impl FacProof {
    pub fn new(
        rng: &mut (impl CryptoRngCore + ?Sized),
        q: &BigUint,
        p_factor: &BigUint,
        q_factor: &BigUint,
        rp: &RingPedersenParams,
        aux: &impl Hashable,
    ) -> Self {
        let n0 = p_factor * q_factor;
        let sqrt_n0 = n0.sqrt();
        let q3 = pow(q, 3);

        let lead_bound = &q3 * &sqrt_n0;
        let q_n_tilde = q * rp.modulus();
        let q3_n_tilde = &q3 * rp.modulus();
        let q_n0_n_tilde = &q_n_tilde * &n0;
        let q3_n0_n_tilde = &q3_n_tilde * &n0;

        let alpha = random_positive_int(rng, &lead_bound);
        let beta = random_positive_int(rng, &lead_bound);
        let mu = random_positive_int(rng, &q_n_tilde);
        let nu = random_positive_int(rng, &q_n_tilde);
        let sigma = random_positive_int(rng, &q_n0_n_tilde);
        let r = random_positive_int(rng, &q3_n0_n_tilde);
        let x = random_positive_int(rng, &q3_n_tilde);
        let y = random_positive_int(rng, &q3_n_tilde);

        let cap_p = rp.commit(p_factor, &mu);
        let cap_q = rp.commit(q_factor, &nu);
        let cap_a = rp.commit(&alpha, &x);
        let cap_b = rp.commit(&beta, &y);
        let mod_n_tilde = ModInt::new(rp.modulus().clone());
        let cap_t = mod_n_tilde.mul(
            &mod_n_tilde.exp(&cap_q, &alpha),
            &mod_n_tilde.exp(&rp.h2, &r),
        );

        let e = challenge(q, &n0, rp, &cap_p, &cap_q, &cap_a, &cap_b, &cap_t, &sigma, aux);

        let z1 = &alpha + &e * p_factor;
        let z2 = &beta + &e * q_factor;
        let w1 = &x + &e * &mu;
        let w2 = &y + &e * &nu;
        // v = r + e·(σ - ν·p); the subtraction can go negative.
        let v = BigInt::from(r)
            + BigInt::from(e) * (BigInt::from(sigma.clone()) - BigInt::from(nu) * BigInt::from(p_factor.clone()));

        Self {
            cap_p,
            cap_q,
            cap_a,
            cap_b,
            cap_t,
            sigma,
            z1,
            z2,
            w1,
            w2,
            v,
        }
    }

    pub fn verify(
        &self,
        q: &BigUint,
        n0: &BigUint,
        rp: &RingPedersenParams,
        aux: &impl Hashable,
    ) -> bool {
        let sqrt_n0 = n0.sqrt();
        let q3 = pow(q, 3);
        // Response bound: z1, z2 ≤ q^3·sqrt(N0) (up to the challenge slack),
        // which pins both factors to their required size.
        let bound = &q3 * &sqrt_n0 * (q + 1u32);
        if !is_in_interval(&self.z1, &bound) || !is_in_interval(&self.z2, &bound) {
            return false;
        }

        let e = challenge(
            q, n0, rp, &self.cap_p, &self.cap_q, &self.cap_a, &self.cap_b, &self.cap_t,
            &self.sigma, aux,
        );
        let mod_n_tilde = ModInt::new(rp.modulus().clone());

        // s^z1 · t^w1 ?= A · P^e
        if rp.commit(&self.z1, &self.w1)
            != mod_n_tilde.mul(&self.cap_a, &mod_n_tilde.exp(&self.cap_p, &e))
        {
            return false;
        }
        // s^z2 · t^w2 ?= B · Q^e
        if rp.commit(&self.z2, &self.w2)
            != mod_n_tilde.mul(&self.cap_b, &mod_n_tilde.exp(&self.cap_q, &e))
        {
            return false;
        }
        // Q^z1 · t^v ?= T · R^e, with R = s^N0 · t^σ
        let t_v = match mod_n_tilde.exp_signed(&rp.h2, &self.v) {
            Some(value) => value,
            None => return false,
        };
        let lhs = mod_n_tilde.mul(&mod_n_tilde.exp(&self.cap_q, &self.z1), &t_v);
        let cap_r = rp.commit(n0, &self.sigma);
        let rhs = mod_n_tilde.mul(&self.cap_t, &mod_n_tilde.exp(&cap_r, &e));
        lhs == rhs
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::curve::{Curve, Secp256k1};
    use crate::tools::random::random_blum_prime;

    #[test]
    fn honest_proof_verifies() {
        let q = Secp256k1::order();
        let p_factor = random_blum_prime(&mut OsRng, 512);
        let q_factor = random_blum_prime(&mut OsRng, 512);
        let n0 = &p_factor * &q_factor;

        let rp_p = random_blum_prime(&mut OsRng, 256);
        let rp_q = random_blum_prime(&mut OsRng, 256);
        let rp = RingPedersenParams::generate(&mut OsRng, &rp_p, &rp_q);
        let aux = b"transcript".to_vec();

        let proof = FacProof::new(&mut OsRng, &q, &p_factor, &q_factor, &rp, &aux);
        assert!(proof.verify(&q, &n0, &rp, &aux));

        // Binding to the modulus and the transcript.
        assert!(!proof.verify(&q, &(&n0 + 2u32), &rp, &aux));
        assert!(!proof.verify(&q, &n0, &rp, &b"other".to_vec()));

        let mut bad = proof.clone();
        bad.z1 += 1u32;
        assert!(!bad.verify(&q, &n0, &rp, &aux));
    }
}
