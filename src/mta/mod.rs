//! Multiplicative-to-additive share conversion.
//!
//! Alice holds `a`, Bob holds `b`; they end up with `α + β = a·b mod q`
//! without revealing the inputs. Alice's ciphertext travels with a range
//! proof which Bob must verify before responding (the signing rounds do this
//! one message earlier); Bob's response carries a respondent proof,
//! optionally binding his input to a public curve point ("with check").

mod proofs;

use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;

pub use proofs::{ProofBob, ProofBobWc};

use crate::curve::secp256k1::{Point, Scalar};
use crate::curve::{Curve, Scalar as _, Secp256k1};
use crate::paillier::{PublicKey, SecretKey};
use crate::sigma::range::RangeProofAlice;
use crate::sigma::RingPedersenParams;
use crate::tools::hashing::Hashable;
use crate::tools::modular::pow;
use crate::tools::random::{random_coprime_int, random_positive_int};

#[derive(Debug, Clone, PartialEq, Eq, displaydoc::Display)]
pub enum MtaError {
    /// the initiator's range proof did not verify
    RangeProofRejected,
    /// the responder's consistency proof did not verify
    RespondentProofRejected,
    /// a ciphertext is not a unit modulo N^2
    MalformedCiphertext,
}

impl std::error::Error for MtaError {}

/// Alice's opening move: `Enc_A(a)` and the randomizer, to be accompanied by
/// one [`RangeProofAlice`] per receiver.
pub fn alice_init(
    rng: &mut (impl CryptoRngCore + ?Sized),
    pk: &PublicKey,
    a: &Scalar,
) -> (BigUint, BigUint) {
    pk.encrypt(rng, &a.to_biguint())
        .expect("a curve scalar is below any admissible Paillier modulus")
}

/// Builds Alice's range proof for one receiver, against that receiver's
/// ring-Pedersen auxiliaries.
pub fn alice_range_proof(
    rng: &mut (impl CryptoRngCore + ?Sized),
    pk: &PublicKey,
    receiver_rp: &RingPedersenParams,
    a: &Scalar,
    r: &BigUint,
    c_a: &BigUint,
    aux: &impl Hashable,
) -> RangeProofAlice {
    RangeProofAlice::new(
        rng,
        &Secp256k1::order(),
        pk,
        receiver_rp,
        &a.to_biguint(),
        r,
        c_a,
        aux,
    )
}

/// Bob's check of Alice's opening against his own auxiliaries. Responding to
/// an unverified ciphertext leaks through plaintext overflow.
pub fn verify_alice(
    alice_pk: &PublicKey,
    own_rp: &RingPedersenParams,
    range_proof: &RangeProofAlice,
    c_a: &BigUint,
    aux: &impl Hashable,
) -> Result<(), MtaError> {
    if !alice_pk.is_valid_ciphertext(c_a) {
        return Err(MtaError::MalformedCiphertext);
    }
    if !range_proof.verify(&Secp256k1::order(), alice_pk, own_rp, c_a, aux) {
        return Err(MtaError::RangeProofRejected);
    }
    Ok(())
}

/// Bob's response computed over Alice's ciphertext.
pub struct BobOutput<P> {
    /// Bob's additive share `β = -β' mod q`.
    pub beta: Scalar,
    /// The response ciphertext under Alice's key.
    pub c_b: BigUint,
    /// The consistency proof for Alice.
    pub proof: P,
}

fn bob_prepare(
    rng: &mut (impl CryptoRngCore + ?Sized),
    alice_pk: &PublicKey,
    c_a: &BigUint,
    b: &Scalar,
) -> Result<(Scalar, BigUint, BigUint, BigUint), MtaError> {
    let q = Secp256k1::order();
    if !alice_pk.is_valid_ciphertext(c_a) {
        return Err(MtaError::MalformedCiphertext);
    }

    let beta_prime = random_positive_int(rng, &pow(&q, 7));
    let r = random_coprime_int(rng, alice_pk.modulus());
    let c_b = alice_pk
        .homo_add(
            &alice_pk
                .homo_mult(&b.to_biguint(), c_a)
                .map_err(|_| MtaError::MalformedCiphertext)?,
            &alice_pk
                .encrypt_with(&beta_prime, &r)
                .map_err(|_| MtaError::MalformedCiphertext)?,
        )
        .map_err(|_| MtaError::MalformedCiphertext)?;

    let beta = -Scalar::from_biguint(&beta_prime);
    Ok((beta, c_b, beta_prime, r))
}

/// Bob's response for the plain MtA (used for the `k·γ` pairs). Alice's
/// range proof must have been verified via [`verify_alice`] beforehand.
pub fn bob_respond(
    rng: &mut (impl CryptoRngCore + ?Sized),
    alice_pk: &PublicKey,
    alice_rp: &RingPedersenParams,
    c_a: &BigUint,
    b: &Scalar,
    prove_aux: &impl Hashable,
) -> Result<BobOutput<ProofBob>, MtaError> {
    let (beta, c_b, beta_prime, r) = bob_prepare(rng, alice_pk, c_a, b)?;
    let proof = ProofBob::new(
        rng,
        &Secp256k1::order(),
        alice_pk,
        alice_rp,
        c_a,
        &c_b,
        &b.to_biguint(),
        &beta_prime,
        &r,
        prove_aux,
    );
    Ok(BobOutput { beta, c_b, proof })
}

/// Bob's response for the checked MtA (used for the `k·w` pairs, binding his
/// input to the public share point).
pub fn bob_respond_wc(
    rng: &mut (impl CryptoRngCore + ?Sized),
    alice_pk: &PublicKey,
    alice_rp: &RingPedersenParams,
    c_a: &BigUint,
    b: &Scalar,
    prove_aux: &impl Hashable,
) -> Result<BobOutput<ProofBobWc>, MtaError> {
    let (beta, c_b, beta_prime, r) = bob_prepare(rng, alice_pk, c_a, b)?;
    let proof = ProofBobWc::new(
        rng,
        &Secp256k1::order(),
        alice_pk,
        alice_rp,
        c_a,
        &c_b,
        &b.to_biguint(),
        &beta_prime,
        &r,
        prove_aux,
    );
    Ok(BobOutput { beta, c_b, proof })
}

fn alice_decrypt(sk: &SecretKey, c_b: &BigUint) -> Result<Scalar, MtaError> {
    let plaintext = sk.decrypt(c_b).map_err(|_| MtaError::MalformedCiphertext)?;
    Ok(Scalar::from_biguint(&plaintext))
}

/// Alice's closing move for the plain MtA: verify Bob's proof and decrypt
/// her additive share `α`.
pub fn alice_end(
    sk: &SecretKey,
    own_rp: &RingPedersenParams,
    proof: &ProofBob,
    c_a: &BigUint,
    c_b: &BigUint,
    aux: &impl Hashable,
) -> Result<Scalar, MtaError> {
    if !proof.verify(&Secp256k1::order(), sk.public_key(), own_rp, c_a, c_b, aux) {
        return Err(MtaError::RespondentProofRejected);
    }
    alice_decrypt(sk, c_b)
}

/// Alice's closing move for the checked MtA.
pub fn alice_end_wc(
    sk: &SecretKey,
    own_rp: &RingPedersenParams,
    proof: &ProofBobWc,
    c_a: &BigUint,
    c_b: &BigUint,
    big_b: &Point,
    aux: &impl Hashable,
) -> Result<Scalar, MtaError> {
    if !proof.verify(
        &Secp256k1::order(),
        sk.public_key(),
        own_rp,
        c_a,
        c_b,
        big_b,
        aux,
    ) {
        return Err(MtaError::RespondentProofRejected);
    }
    alice_decrypt(sk, c_b)
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::curve::Point as _;
    use crate::paillier::tests::test_key;
    use crate::tools::random::random_blum_prime;

    fn rp_params() -> RingPedersenParams {
        let p = random_blum_prime(&mut OsRng, 256);
        let q = random_blum_prime(&mut OsRng, 256);
        RingPedersenParams::generate(&mut OsRng, &p, &q)
    }

    #[test]
    fn shares_sum_to_product() {
        let alice_sk = test_key(2048);
        let alice_pk = alice_sk.public_key().clone();
        let alice_rp = rp_params();
        let bob_rp = rp_params();
        let to_bob = b"alice to bob".to_vec();
        let to_alice = b"bob to alice".to_vec();

        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);

        let (c_a, r_a) = alice_init(&mut OsRng, &alice_pk, &a);
        let range_proof =
            alice_range_proof(&mut OsRng, &alice_pk, &bob_rp, &a, &r_a, &c_a, &to_bob);
        verify_alice(&alice_pk, &bob_rp, &range_proof, &c_a, &to_bob).unwrap();

        let output = bob_respond(&mut OsRng, &alice_pk, &alice_rp, &c_a, &b, &to_alice).unwrap();

        let alpha = alice_end(
            &alice_sk, &alice_rp, &output.proof, &c_a, &output.c_b, &to_alice,
        )
        .unwrap();

        assert_eq!(alpha + output.beta, a * b);
    }

    #[test]
    fn with_check_binds_the_share_point() {
        let alice_sk = test_key(2048);
        let alice_pk = alice_sk.public_key().clone();
        let alice_rp = rp_params();
        let bob_rp = rp_params();
        let to_bob = b"alice to bob".to_vec();
        let to_alice = b"bob to alice".to_vec();

        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);
        let big_b = b.mul_by_generator();

        let (c_a, r_a) = alice_init(&mut OsRng, &alice_pk, &a);
        let range_proof =
            alice_range_proof(&mut OsRng, &alice_pk, &bob_rp, &a, &r_a, &c_a, &to_bob);
        verify_alice(&alice_pk, &bob_rp, &range_proof, &c_a, &to_bob).unwrap();

        let output =
            bob_respond_wc(&mut OsRng, &alice_pk, &alice_rp, &c_a, &b, &to_alice).unwrap();

        let alpha = alice_end_wc(
            &alice_sk, &alice_rp, &output.proof, &c_a, &output.c_b, &big_b, &to_alice,
        )
        .unwrap();
        assert_eq!(alpha + output.beta, a * b);

        // A different claimed share point must fail verification.
        let wrong = Scalar::random(&mut OsRng).mul_by_generator();
        assert_eq!(
            alice_end_wc(
                &alice_sk, &alice_rp, &output.proof, &c_a, &output.c_b, &wrong, &to_alice,
            ),
            Err(MtaError::RespondentProofRejected)
        );
    }

    #[test]
    fn malformed_range_proof_rejected() {
        let alice_sk = test_key(2048);
        let alice_pk = alice_sk.public_key().clone();
        let bob_rp = rp_params();
        let to_bob = b"alice to bob".to_vec();

        let a = Scalar::random(&mut OsRng);
        let (c_a, r_a) = alice_init(&mut OsRng, &alice_pk, &a);
        // Proof bound to a different transcript.
        let range_proof =
            alice_range_proof(&mut OsRng, &alice_pk, &bob_rp, &a, &r_a, &c_a, &b"x".to_vec());

        assert_eq!(
            verify_alice(&alice_pk, &bob_rp, &range_proof, &c_a, &to_bob),
            Err(MtaError::RangeProofRejected)
        );
    }
}
