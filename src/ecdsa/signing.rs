//! Threshold ECDSA signing over a quorum of at least `t + 1` key holders.
//!
//! Shares are Lagrange-weighted into additive form, then every ordered pair
//! of signers runs the MtA subprotocol twice (`k·γ` and, with a share-point
//! check, `k·w`). The nonce point is assembled from committed `Γ_i` values,
//! each signer's `δ_i` contribution is bound by a Schnorr proof against the
//! nonce base before any `s_i` is revealed, and the final `(r, s)` is
//! low-`s` normalized and verified before it is released.

use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{lagrange_weight, LocalSaveData};
use crate::curve::secp256k1::{Point, Scalar};
use crate::curve::{Curve, Point as _, Scalar as _, Secp256k1};
use crate::mta;
use crate::party::error::Error;
use crate::party::id::PartyIdx;
use crate::party::round::{
    all_but, FinalizeError, FinalizeSuccess, FirstRound, InitError, NonExistent, ReceiveError,
    Round, Stage, ToSendTyped,
};
use crate::party::session::Party;
use crate::party::Parameters;
use crate::sigma::range::RangeProofAlice;
use crate::sigma::sch::{SchCommitment, SchProof, SchSecret};
use crate::signature::SignatureData;
use crate::tools::collections::{HoleVec, HoleVecAccum, Payloads};
use crate::tools::hashing::{Chain, Decommitment, Hash, HashCommitment};
use crate::tools::modular::is_in_interval;

const PROTOCOL: &str = "ecdsa-signing";

pub(crate) const ROUND_NAMES: &[&str] = &[
    "ECDSASigning.SignRound1Message1",
    "ECDSASigning.SignRound1Message2",
    "ECDSASigning.SignRound2Message",
    "ECDSASigning.SignRound3Message",
    "ECDSASigning.SignRound4Message",
    "ECDSASigning.SignRound5Message",
    "ECDSASigning.SignRound6Message",
];

/// Starts a signing party for a message hash already reduced below the curve
/// order. The parameters' peer context is the signing quorum: any subset of
/// the keygen parties of size at least `t + 1`.
pub fn new_party(
    rng: &mut impl CryptoRngCore,
    params: Parameters,
    save: LocalSaveData,
    message_hash: &BigUint,
    session_seed: &[u8],
) -> Result<Party<SignatureData>, Error> {
    if !is_in_interval(message_hash, &Secp256k1::order()) {
        return Err(Error::configuration(
            "the message hash must be reduced below the curve order",
        ));
    }
    let message = Scalar::from_biguint(message_hash);
    let peers = params.peers().clone();
    let me = params.self_index();
    let round1 = Round1Bcast::new(rng, session_seed, (params, save, message))
        .map_err(|InitError(reason)| Error::configuration(reason))?;
    Ok(Party::new(
        PROTOCOL,
        peers,
        me,
        ROUND_NAMES,
        Box::new(Stage::new(round1)),
    ))
}

pub(crate) struct Context {
    params: Parameters,
    save: LocalSaveData,
    /// Keygen index of every quorum member, in quorum order.
    key_indices: Vec<PartyIdx>,
    message: Scalar,
    ssid: Box<[u8]>,
    /// This signer's Lagrange-weighted share `w_i`.
    w: Scalar,
    /// Every signer's weighted public share `W_j = λ_j·X_j`.
    big_ws: Vec<Point>,
    k: Scalar,
    gamma: Scalar,
}

impl Context {
    fn aux(&self, party: PartyIdx) -> (Box<[u8]>, PartyIdx) {
        (self.ssid.clone(), party)
    }

    fn quorum_size(&self) -> usize {
        self.params.party_count()
    }

    fn me(&self) -> PartyIdx {
        self.params.self_index()
    }

    fn paillier_pk_of(&self, quorum_idx: PartyIdx) -> &crate::paillier::PublicKey {
        &self.save.paillier_pks[self.key_indices[quorum_idx.as_usize()].as_usize()]
    }

    fn ring_pedersen_of(&self, quorum_idx: PartyIdx) -> &crate::sigma::RingPedersenParams {
        &self.save.ring_pedersen[self.key_indices[quorum_idx.as_usize()].as_usize()]
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.w.zeroize();
        self.k.zeroize();
        self.gamma.zeroize();
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round1BcastMsg {
    commitment: HashCommitment,
    c_a: BigUint,
}

pub(crate) struct Round1Payload {
    commitment: HashCommitment,
    c_a: BigUint,
}

pub(crate) struct Round1Bcast {
    context: Context,
    gamma_point: Point,
    commitment: HashCommitment,
    decommitment: Decommitment,
    c_a: BigUint,
    r_a: BigUint,
}

impl FirstRound for Round1Bcast {
    type Context = (Parameters, LocalSaveData, Scalar);

    fn new(
        rng: &mut dyn CryptoRngCore,
        shared_randomness: &[u8],
        context: Self::Context,
    ) -> Result<Self, InitError> {
        let (params, save, message) = context;

        if params.party_count() < save.threshold() + 1 {
            return Err(InitError(format!(
                "a quorum of at least {} signers is required",
                save.threshold() + 1
            )));
        }
        let key_indices: Vec<PartyIdx> = params
            .peers()
            .iter()
            .map(|party| {
                save.index_of_key(party.key())
                    .ok_or_else(|| InitError(format!("{:?} holds no share of this key", party.id())))
            })
            .collect::<Result<_, _>>()?;

        let ssid = Hash::new_with_dst(b"ecdsa-signing-ssid")
            .chain_bytes(shared_randomness)
            .chain_bytes(Secp256k1::NAME.as_bytes())
            .chain(params.peers())
            .chain(&save.public_key)
            .chain(&message)
            .finalize()
            .as_ref()
            .to_vec()
            .into_boxed_slice();

        // Convert the polynomial shares to additive shares over the quorum.
        let quorum_xs = params.share_xs::<Secp256k1>();
        let me = params.self_index().as_usize();
        let lambda =
            lagrange_weight(&quorum_xs, me).map_err(|err| InitError(err.to_string()))?;
        let w = lambda * save.secret_share;
        let big_ws: Vec<Point> = (0..params.party_count())
            .map(|j| {
                let lambda_j = lagrange_weight(&quorum_xs, j)?;
                Ok(save.public_shares[key_indices[j].as_usize()].mul(&lambda_j))
            })
            .collect::<Result<_, Error>>()
            .map_err(|err| InitError(err.to_string()))?;

        let k = Scalar::random_nonzero(&mut *rng);
        let gamma = Scalar::random_nonzero(&mut *rng);
        let gamma_point = gamma.mul_by_generator();
        let (commitment, decommitment) = HashCommitment::new(&mut *rng, &gamma_point);

        let (c_a, r_a) = mta::alice_init(&mut *rng, save.paillier_sk.public_key(), &k);

        Ok(Self {
            context: Context {
                params,
                save,
                key_indices,
                message,
                ssid,
                w,
                big_ws,
                k,
                gamma,
            },
            gamma_point,
            commitment,
            decommitment,
            c_a,
            r_a,
        })
    }
}

impl Round for Round1Bcast {
    type Message = Round1BcastMsg;
    type Payload = Round1Payload;
    type NextRound = Round1Proofs;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 1;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[0];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.quorum_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round1BcastMsg {
            commitment: self.commitment,
            c_a: self.c_a.clone(),
        })
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        if !self.context.paillier_pk_of(from).is_valid_ciphertext(&msg.c_a) {
            return Err(ReceiveError("malformed nonce ciphertext".into()));
        }
        Ok(Round1Payload {
            commitment: msg.commitment,
            c_a: msg.c_a,
        })
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let received = payloads
            .into_hole_vec(self.context.quorum_size(), self.context.me().as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 1 payloads".into()))?;
        Ok(FinalizeSuccess::AnotherRound(Round1Proofs {
            context: self.context,
            gamma_point: self.gamma_point,
            decommitment: self.decommitment,
            c_a: self.c_a,
            r_a: self.r_a,
            round1: received,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round1ProofMsg {
    range_proof: RangeProofAlice,
}

pub(crate) struct Round1Proofs {
    context: Context,
    gamma_point: Point,
    decommitment: Decommitment,
    c_a: BigUint,
    r_a: BigUint,
    round1: HoleVec<Round1Payload>,
}

impl Round for Round1Proofs {
    type Message = Round1ProofMsg;
    type Payload = ();
    type NextRound = Round2;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 2;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[1];
    const BROADCAST: bool = false;

    fn num_parties(&self) -> usize {
        self.context.quorum_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        let me = self.context.me();
        let messages = all_but(self.context.quorum_size(), me)
            .into_iter()
            .map(|idx| {
                let range_proof = mta::alice_range_proof(
                    &mut *rng,
                    self.context.save.paillier_sk.public_key(),
                    self.context.ring_pedersen_of(idx),
                    &self.context.k,
                    &self.r_a,
                    &self.c_a,
                    &self.context.aux(me),
                );
                (idx, Round1ProofMsg { range_proof })
            })
            .collect();
        ToSendTyped::Direct(messages)
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        let c_a = &self
            .round1
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("unknown sender".into()))?
            .c_a;
        mta::verify_alice(
            self.context.paillier_pk_of(from),
            self.context.ring_pedersen_of(self.context.me()),
            &msg.range_proof,
            c_a,
            &self.context.aux(from),
        )
        .map_err(|err| ReceiveError(err.to_string()))?;
        Ok(())
    }

    fn finalize(
        self,
        rng: &mut dyn CryptoRngCore,
        _payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        // Build the MtA responses now (they need randomness and state that
        // the next round's message assembly will only clone).
        let n = self.context.quorum_size();
        let me = self.context.me();
        let mut betas = HoleVecAccum::new(n, me.as_usize());
        let mut nus = HoleVecAccum::new(n, me.as_usize());
        let mut messages = HoleVecAccum::new(n, me.as_usize());

        for idx in all_but(n, me) {
            let alice_pk = self.context.paillier_pk_of(idx).clone();
            let alice_rp = self.context.ring_pedersen_of(idx);
            let c_a = &self
                .round1
                .get(idx.as_usize())
                .expect("payload present for every peer")
                .c_a;
            let aux = self.context.aux(me);

            let gamma_output =
                mta::bob_respond(&mut *rng, &alice_pk, alice_rp, c_a, &self.context.gamma, &aux)
                    .map_err(|err| FinalizeError::Internal(err.to_string()))?;
            let w_output =
                mta::bob_respond_wc(&mut *rng, &alice_pk, alice_rp, c_a, &self.context.w, &aux)
                    .map_err(|err| FinalizeError::Internal(err.to_string()))?;

            let message = Round2Direct {
                c_gamma: gamma_output.c_b,
                proof_gamma: gamma_output.proof,
                c_w: w_output.c_b,
                proof_w: w_output.proof,
            };
            betas
                .insert(idx.as_usize(), gamma_output.beta)
                .expect("fresh slot");
            nus.insert(idx.as_usize(), w_output.beta).expect("fresh slot");
            messages.insert(idx.as_usize(), message).expect("fresh slot");
        }

        Ok(FinalizeSuccess::AnotherRound(Round2 {
            context: self.context,
            gamma_point: self.gamma_point,
            decommitment: self.decommitment,
            c_a: self.c_a,
            round1: self.round1,
            betas: betas.finalize().expect("all slots filled"),
            nus: nus.finalize().expect("all slots filled"),
            messages: messages.finalize().expect("all slots filled"),
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Direct {
    c_gamma: BigUint,
    proof_gamma: mta::ProofBob,
    c_w: BigUint,
    proof_w: mta::ProofBobWc,
}

pub(crate) struct Round2 {
    context: Context,
    gamma_point: Point,
    decommitment: Decommitment,
    c_a: BigUint,
    round1: HoleVec<Round1Payload>,
    /// Responder shares from the `k_j·γ_i` conversions.
    betas: HoleVec<Scalar>,
    /// Responder shares from the `k_j·w_i` conversions.
    nus: HoleVec<Scalar>,
    messages: HoleVec<Round2Direct>,
}

pub(crate) struct Round2Payload {
    alpha: Scalar,
    mu: Scalar,
}

impl Round for Round2 {
    type Message = Round2Direct;
    type Payload = Round2Payload;
    type NextRound = Round3;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 3;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[2];
    const BROADCAST: bool = false;

    fn num_parties(&self) -> usize {
        self.context.quorum_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Direct(
            self.messages
                .iter_enumerated()
                .map(|(idx, message)| (PartyIdx::from_usize(idx), message.clone()))
                .collect(),
        )
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        let me = self.context.me();
        let my_rp = self.context.ring_pedersen_of(me);
        let aux = self.context.aux(from);

        let alpha = mta::alice_end(
            &self.context.save.paillier_sk,
            my_rp,
            &msg.proof_gamma,
            &self.c_a,
            &msg.c_gamma,
            &aux,
        )
        .map_err(|err| ReceiveError(format!("k*gamma response: {err}")))?;

        let mu = mta::alice_end_wc(
            &self.context.save.paillier_sk,
            my_rp,
            &msg.proof_w,
            &self.c_a,
            &msg.c_w,
            &self.context.big_ws[from.as_usize()],
            &aux,
        )
        .map_err(|err| ReceiveError(format!("k*w response: {err}")))?;

        Ok(Round2Payload { alpha, mu })
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let n = self.context.quorum_size();
        let me = self.context.me();
        let received = payloads
            .into_hole_vec(n, me.as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 2 payloads".into()))?;

        let alpha_sum: Scalar = received.iter().map(|payload| payload.alpha).sum();
        let mu_sum: Scalar = received.iter().map(|payload| payload.mu).sum();
        let beta_sum: Scalar = self.betas.iter().copied().sum();
        let nu_sum: Scalar = self.nus.iter().copied().sum();

        let delta = self.context.k * self.context.gamma + alpha_sum + beta_sum;
        let sigma = self.context.k * self.context.w + mu_sum + nu_sum;

        Ok(FinalizeSuccess::AnotherRound(Round3 {
            context: self.context,
            gamma_point: self.gamma_point,
            decommitment: self.decommitment,
            round1: self.round1,
            delta,
            sigma,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round3Bcast {
    delta: Scalar,
}

pub(crate) struct Round3 {
    context: Context,
    gamma_point: Point,
    decommitment: Decommitment,
    round1: HoleVec<Round1Payload>,
    delta: Scalar,
    sigma: Scalar,
}

impl Round for Round3 {
    type Message = Round3Bcast;
    type Payload = Scalar;
    type NextRound = Round4;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 4;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[3];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.quorum_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round3Bcast { delta: self.delta })
    }

    fn verify_received(
        &self,
        _from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(msg.delta)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let mut delta_total = self.delta;
        for (_, delta) in payloads.iter() {
            delta_total = delta_total + *delta;
        }
        let delta_inv = delta_total.invert().ok_or_else(|| {
            FinalizeError::Internal("the combined nonce mask is zero; restart signing".into())
        })?;

        Ok(FinalizeSuccess::AnotherRound(Round4 {
            context: self.context,
            gamma_point: self.gamma_point,
            decommitment: self.decommitment,
            round1: self.round1,
            sigma: self.sigma,
            delta_inv,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round4Bcast {
    decommitment: Decommitment,
    gamma_point: Point,
}

pub(crate) struct Round4 {
    context: Context,
    gamma_point: Point,
    decommitment: Decommitment,
    round1: HoleVec<Round1Payload>,
    sigma: Scalar,
    delta_inv: Scalar,
}

impl Round for Round4 {
    type Message = Round4Bcast;
    type Payload = Point;
    type NextRound = Round5;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 5;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[4];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.quorum_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round4Bcast {
            decommitment: self.decommitment.clone(),
            gamma_point: self.gamma_point,
        })
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        let commitment = self
            .round1
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("unknown sender".into()))?
            .commitment;
        if !commitment.verify(&msg.gamma_point, &msg.decommitment) {
            return Err(ReceiveError("nonce decommitment does not match".into()));
        }
        Ok(msg.gamma_point)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let mut big_gamma = self.gamma_point;
        for (_, gamma_point) in payloads.iter() {
            big_gamma = big_gamma + *gamma_point;
        }

        let nonce_point = big_gamma.mul(&self.delta_inv);
        let r = nonce_point.x_coordinate();
        if r.is_zero() {
            return Err(FinalizeError::Internal(
                "the nonce x-coordinate is zero; restart signing".into(),
            ));
        }
        let recovery_id =
            (nonce_point.y_is_odd() as u8) | ((nonce_point.x_overflows() as u8) << 1);

        Ok(FinalizeSuccess::AnotherRound(Round5 {
            context: self.context,
            sigma: self.sigma,
            nonce_point,
            r,
            recovery_id,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round5Bcast {
    big_r_share: Point,
    proof: SchProof<Secp256k1>,
}

pub(crate) struct Round5 {
    context: Context,
    sigma: Scalar,
    nonce_point: Point,
    r: Scalar,
    recovery_id: u8,
}

impl Round for Round5 {
    type Message = Round5Bcast;
    type Payload = Point;
    type NextRound = Round6;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 6;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[5];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.quorum_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        // Bind this signer's delta contribution: R̄_i = k_i·R with a proof of
        // knowledge of k_i to base R. The sum check in finalize guarantees
        // Σ k_i · R = G, i.e. the revealed nonce point is consistent.
        let secret = SchSecret::random(&mut *rng);
        let commitment = SchCommitment::new_for_base(&secret, &self.nonce_point);
        let big_r_share = self.nonce_point.mul(&self.context.k);
        let proof = SchProof::new_for_base(
            &secret,
            &self.context.k,
            &commitment,
            &self.nonce_point,
            &big_r_share,
            &self.context.aux(self.context.me()),
        );
        ToSendTyped::Broadcast(Round5Bcast { big_r_share, proof })
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        if !msg.proof.verify_for_base(
            &self.nonce_point,
            &msg.big_r_share,
            &self.context.aux(from),
        ) {
            return Err(ReceiveError(
                "nonce consistency proof did not verify".into(),
            ));
        }
        Ok(msg.big_r_share)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let mut sum = self.nonce_point.mul(&self.context.k);
        for (_, share) in payloads.iter() {
            sum = sum + *share;
        }
        if sum != Point::GENERATOR {
            // Every proof verified individually, so the inconsistency is not
            // attributable to a single sender without the transport's
            // broadcast transcript; all peers are reported.
            return Err(FinalizeError::Validation {
                reason: "the nonce shares do not add up to the group generator".into(),
                culprits: all_but(self.context.quorum_size(), self.context.me()),
            });
        }

        Ok(FinalizeSuccess::AnotherRound(Round6 {
            s_share: self.context.message * self.context.k + self.r * self.sigma,
            context: self.context,
            r: self.r,
            recovery_id: self.recovery_id,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round6Bcast {
    s_share: Scalar,
}

pub(crate) struct Round6 {
    context: Context,
    r: Scalar,
    recovery_id: u8,
    s_share: Scalar,
}

impl Round for Round6 {
    type Message = Round6Bcast;
    type Payload = Scalar;
    type NextRound = NonExistent<SignatureData>;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 7;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[6];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.quorum_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round6Bcast {
            s_share: self.s_share,
        })
    }

    fn verify_received(
        &self,
        _from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(msg.s_share)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let mut s = self.s_share;
        for (_, share) in payloads.iter() {
            s = s + *share;
        }
        if s.is_zero() {
            return Err(FinalizeError::Internal(
                "the combined signature scalar is zero; restart signing".into(),
            ));
        }
        let (s, flipped) = s.normalized();
        let recovery_id = self.recovery_id ^ (flipped as u8);

        if !self
            .context
            .save
            .public_key
            .verify_ecdsa(&self.context.message, &self.r, &s)
        {
            // The delta-binding round already identified misbehaving signers;
            // reaching this point means an unattributable inconsistency.
            return Err(FinalizeError::Internal(
                "the assembled signature does not verify against the joint public key".into(),
            ));
        }

        Ok(FinalizeSuccess::Result(SignatureData::ecdsa(
            &self.r,
            &s,
            recovery_id,
            &self.context.message,
        )))
    }
}

#[cfg(test)]
mod tests {
    use rand_core::{OsRng, RngCore};

    use super::super::keygen::tests::{run_keygen, test_params};
    use super::*;
    use crate::party::round::test_helpers::{assert_next_round, assert_result, step};

    #[test]
    fn execute_signing() {
        let saves = run_keygen(3, 1);
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);

        // Quorum: parties 0 and 2.
        let quorum: Vec<usize> = vec![0, 2];
        let message_hash = Secp256k1::order() - 12345u32;
        let message = Scalar::from_biguint(&message_hash);

        let all_params = test_params(3, 1);
        let r1: Vec<Round1Bcast> = quorum
            .iter()
            .map(|&i| {
                let quorum_peers = crate::party::PeerContext::new(
                    quorum
                        .iter()
                        .map(|&j| all_params[j].self_id().clone())
                        .collect(),
                )
                .unwrap();
                let params = Parameters::new::<Secp256k1>(
                    quorum_peers,
                    all_params[i].self_id().clone(),
                    1,
                )
                .unwrap();
                Round1Bcast::new(&mut OsRng, &seed, (params, saves[i].clone(), message)).unwrap()
            })
            .collect();

        let r1b = assert_next_round(step(&mut OsRng, r1).unwrap()).unwrap();
        let r2 = assert_next_round(step(&mut OsRng, r1b).unwrap()).unwrap();
        let r3 = assert_next_round(step(&mut OsRng, r2).unwrap()).unwrap();
        let r4 = assert_next_round(step(&mut OsRng, r3).unwrap()).unwrap();
        let r5 = assert_next_round(step(&mut OsRng, r4).unwrap()).unwrap();
        let r6 = assert_next_round(step(&mut OsRng, r5).unwrap()).unwrap();
        let signatures = assert_result(step(&mut OsRng, r6).unwrap()).unwrap();

        for signature in &signatures {
            assert_eq!(signature, &signatures[0]);
            assert_eq!(signature.message, message.to_be_bytes().to_vec());
        }
    }
}
