//! Respondent proofs for the MtA subprotocol: the responder's ciphertext
//! `c2 = c1^x · Enc(y; r)` is well-formed with `x` and `y` in their expected
//! ranges. The "with check" variant additionally binds `x` to a public curve
//! point `X = x·G`.

use num_bigint_dig::BigUint;
use num_traits::One;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::curve::secp256k1::{Point, Scalar};
use crate::curve::{Point as _, Scalar as _};
use crate::paillier::PublicKey;
use crate::sigma::RingPedersenParams;
use crate::tools::hashing::{rejection_sample, Chain, Hash, Hashable};
use crate::tools::modular::{is_in_interval, pow, ModInt};
use crate::tools::random::{random_coprime_int, random_positive_int};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBob {
    z: BigUint,
    z_prime: BigUint,
    t: BigUint,
    v: BigUint,
    w: BigUint,
    s: BigUint,
    s1: BigUint,
    s2: BigUint,
    t1: BigUint,
    t2: BigUint,
}

/// [`ProofBob`] plus the curve-level binding `u = α·G`, checked against the
/// responder's public share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBobWc {
    proof: ProofBob,
    u: Point,
}

#[allow(clippy::too_many_arguments)]
fn challenge(
    q: &BigUint,
    pk: &PublicKey,
    c1: &BigUint,
    c2: &BigUint,
    proof: &ProofBobParts<'_>,
    wc: Option<(&Point, &Point)>,
    aux: &impl Hashable,
) -> BigUint {
    let digest = Hash::new_with_dst(b"mta-respondent-proof")
        .chain(pk)
        .chain(c1)
        .chain(c2)
        .chain(proof.z)
        .chain(proof.z_prime)
        .chain(proof.t)
        .chain(proof.v)
        .chain(proof.w);
    let digest = match wc {
        Some((big_x, u)) => digest.chain(&1u8).chain(big_x).chain(u),
        None => digest.chain(&0u8),
    };
    rejection_sample(q, &digest.chain(aux).finalize())
}

struct ProofBobParts<'a> {
    z: &'a BigUint,
    z_prime: &'a BigUint,
    t: &'a BigUint,
    v: &'a BigUint,
    w: &'a BigUint,
}

struct BobWitness<'a> {
    x: &'a BigUint,
    y: &'a BigUint,
    r: &'a BigUint,
}

impl ProofBob {
    #[allow(clippy::too_many_arguments)]
    fn new_internal(
        rng: &mut (impl CryptoRngCore + ?Sized),
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        c1: &BigUint,
        c2: &BigUint,
        witness: &BobWitness<'_>,
        with_check: bool,
        aux: &impl Hashable,
    ) -> (Self, Option<Point>) {
        let q3 = pow(q, 3);
        let q9 = pow(q, 9);
        let q_n_tilde = q * rp.modulus();
        let q3_n_tilde = &q3 * rp.modulus();

        let alpha = random_positive_int(rng, &q3);
        let rho = random_positive_int(rng, &q_n_tilde);
        let rho_prime = random_positive_int(rng, &q3_n_tilde);
        let sigma = random_positive_int(rng, &q_n_tilde);
        let tau = random_positive_int(rng, &q3_n_tilde);
        let beta = random_coprime_int(rng, pk.modulus());
        let gamma = random_positive_int(rng, &q9);

        let z = rp.commit(witness.x, &rho);
        let z_prime = rp.commit(&alpha, &rho_prime);
        let t = rp.commit(witness.y, &sigma);
        let mod_n_square = ModInt::new(pk.n_square());
        let v = mod_n_square.mul(
            &mod_n_square.mul(
                &mod_n_square.exp(c1, &alpha),
                &mod_n_square.reduce(&(BigUint::one() + &gamma * pk.modulus())),
            ),
            &mod_n_square.exp(&beta, pk.modulus()),
        );
        let w = rp.commit(&gamma, &tau);

        let u = with_check.then(|| Scalar::from_biguint(&alpha).mul_by_generator());
        let big_x = with_check.then(|| Scalar::from_biguint(witness.x).mul_by_generator());

        let parts = ProofBobParts {
            z: &z,
            z_prime: &z_prime,
            t: &t,
            v: &v,
            w: &w,
        };
        let wc = match (&big_x, &u) {
            (Some(big_x), Some(u)) => Some((big_x, u)),
            _ => None,
        };
        let e = challenge(q, pk, c1, c2, &parts, wc, aux);

        let mod_n = ModInt::new(pk.modulus().clone());
        let s = mod_n.mul(&mod_n.exp(witness.r, &e), &beta);
        let s1 = &e * witness.x + alpha;
        let s2 = &e * rho + rho_prime;
        let t1 = &e * witness.y + gamma;
        let t2 = &e * sigma + tau;

        (
            Self {
                z,
                z_prime,
                t,
                v,
                w,
                s,
                s1,
                s2,
                t1,
                t2,
            },
            u,
        )
    }

    /// Proves `c2 = c1^x · Enc(y; r)` with `x ≤ q^3` and `y ≤ q^9`
    /// (honest responders use `x < q`, `y < q^7`).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut (impl CryptoRngCore + ?Sized),
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        c1: &BigUint,
        c2: &BigUint,
        x: &BigUint,
        y: &BigUint,
        r: &BigUint,
        aux: &impl Hashable,
    ) -> Self {
        let witness = BobWitness { x, y, r };
        Self::new_internal(rng, q, pk, rp, c1, c2, &witness, false, aux).0
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_internal(
        &self,
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        c1: &BigUint,
        c2: &BigUint,
        wc: Option<(&Point, &Point)>,
        aux: &impl Hashable,
    ) -> bool {
        let q3 = pow(q, 3);
        let q9 = pow(q, 9);
        if !is_in_interval(&self.s1, &(&q3 + 1u32)) {
            return false;
        }
        if !is_in_interval(&self.t1, &(&q9 + &q9 + 1u32)) {
            return false;
        }
        if !pk.is_valid_ciphertext(c1) || !pk.is_valid_ciphertext(c2) {
            return false;
        }

        let parts = ProofBobParts {
            z: &self.z,
            z_prime: &self.z_prime,
            t: &self.t,
            v: &self.v,
            w: &self.w,
        };
        let e = challenge(q, pk, c1, c2, &parts, wc, aux);

        let mod_n_tilde = ModInt::new(rp.modulus().clone());
        // h1^s1 · h2^s2 ?= z^e · z'
        if rp.commit(&self.s1, &self.s2)
            != mod_n_tilde.mul(&mod_n_tilde.exp(&self.z, &e), &self.z_prime)
        {
            return false;
        }
        // h1^t1 · h2^t2 ?= t^e · w
        if rp.commit(&self.t1, &self.t2)
            != mod_n_tilde.mul(&mod_n_tilde.exp(&self.t, &e), &self.w)
        {
            return false;
        }
        // c1^s1 · Γ^t1 · s^N ?= c2^e · v mod N^2
        let mod_n_square = ModInt::new(pk.n_square());
        let lhs = mod_n_square.mul(
            &mod_n_square.mul(
                &mod_n_square.exp(c1, &self.s1),
                &mod_n_square.reduce(&(BigUint::one() + &self.t1 * pk.modulus())),
            ),
            &mod_n_square.exp(&self.s, pk.modulus()),
        );
        let rhs = mod_n_square.mul(&mod_n_square.exp(c2, &e), &self.v);
        if lhs != rhs {
            return false;
        }

        // With check: s1·G ?= X^e · u
        if let Some((big_x, u)) = wc {
            let s1_scalar = Scalar::from_biguint(&self.s1);
            let e_scalar = Scalar::from_biguint(&e);
            if s1_scalar.mul_by_generator() != big_x.mul(&e_scalar) + *u {
                return false;
            }
        }
        true
    }

    pub fn verify(
        &self,
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        c1: &BigUint,
        c2: &BigUint,
        aux: &impl Hashable,
    ) -> bool {
        self.verify_internal(q, pk, rp, c1, c2, None, aux)
    }
}

impl ProofBobWc {
    /// As [`ProofBob::new`], additionally binding `x` to `X = x·G`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rng: &mut (impl CryptoRngCore + ?Sized),
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        c1: &BigUint,
        c2: &BigUint,
        x: &BigUint,
        y: &BigUint,
        r: &BigUint,
        aux: &impl Hashable,
    ) -> Self {
        let witness = BobWitness { x, y, r };
        let (proof, u) = ProofBob::new_internal(rng, q, pk, rp, c1, c2, &witness, true, aux);
        Self {
            proof,
            u: u.expect("with_check requested"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &self,
        q: &BigUint,
        pk: &PublicKey,
        rp: &RingPedersenParams,
        c1: &BigUint,
        c2: &BigUint,
        big_x: &Point,
        aux: &impl Hashable,
    ) -> bool {
        self.proof
            .verify_internal(q, pk, rp, c1, c2, Some((big_x, &self.u)), aux)
    }
}
