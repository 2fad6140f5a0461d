//! Threshold Schnorr signing producing stock Ed25519 signatures.
//!
//! Three rounds: commit to the nonce shares, decommit and assemble
//! `R = Σ R_i`, then reveal `s_i = r_i + h·λ_i·x_i` where `h` is the
//! RFC 8032 challenge over the raw message. Every `s_i` is checked against
//! the sender's public share before the sum is released.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use super::{lagrange_weight, LocalSaveData};
use crate::curve::ed25519::{Point, Scalar};
use crate::curve::{Curve, Ed25519, Point as _, Scalar as _};
use crate::party::error::Error;
use crate::party::id::PartyIdx;
use crate::party::round::{
    FinalizeError, FinalizeSuccess, FirstRound, InitError, NonExistent, ReceiveError, Round,
    Stage, ToSendTyped,
};
use crate::party::session::Party;
use crate::party::Parameters;
use crate::signature::SignatureData;
use crate::tools::collections::{HoleVec, Payloads};
use crate::tools::hashing::{Chain, Decommitment, Hash, HashCommitment};

const PROTOCOL: &str = "eddsa-signing";

pub(crate) const ROUND_NAMES: &[&str] = &[
    "EDDSASigning.SignRound1Message",
    "EDDSASigning.SignRound2Message",
    "EDDSASigning.SignRound3Message",
];

/// Starts a signing party over the raw message bytes (RFC 8032 hashes the
/// message internally; it must not be pre-hashed). The parameters' peer
/// context is the signing quorum.
pub fn new_party(
    rng: &mut impl CryptoRngCore,
    params: Parameters,
    save: LocalSaveData,
    message: Vec<u8>,
    session_seed: &[u8],
) -> Result<Party<SignatureData>, Error> {
    let peers = params.peers().clone();
    let me = params.self_index();
    let round1 = Round1::new(rng, session_seed, (params, save, message))
        .map_err(|InitError(reason)| Error::configuration(reason))?;
    Ok(Party::new(
        PROTOCOL,
        peers,
        me,
        ROUND_NAMES,
        Box::new(Stage::new(round1)),
    ))
}

/// The RFC 8032 challenge: SHA-512 of `R ‖ A ‖ M`, reduced as a 512-bit
/// little-endian integer.
fn challenge(big_r: &Point, public_key: &Point, message: &[u8]) -> Scalar {
    let digest: [u8; 64] = Sha512::new()
        .chain_update(big_r.to_compressed_bytes())
        .chain_update(public_key.to_compressed_bytes())
        .chain_update(message)
        .finalize()
        .into();
    Scalar::from_wide_le_bytes(&digest)
}

pub(crate) struct Context {
    params: Parameters,
    save: LocalSaveData,
    message: Vec<u8>,
    ssid: Box<[u8]>,
    /// This signer's Lagrange-weighted share `w_i = λ_i·x_i`.
    w: Scalar,
    /// Every signer's weighted public share `W_j = λ_j·X_j`.
    big_ws: Vec<Point>,
    /// The nonce share `r_i`.
    nonce: Scalar,
}

impl Context {
    fn me(&self) -> PartyIdx {
        self.params.self_index()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.w.zeroize();
        self.nonce.zeroize();
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round1Bcast {
    commitment: HashCommitment,
}

pub(crate) struct Round1 {
    context: Context,
    big_r_share: Point,
    commitment: HashCommitment,
    decommitment: Decommitment,
}

impl FirstRound for Round1 {
    type Context = (Parameters, LocalSaveData, Vec<u8>);

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
                save.parties()
                    .index_of(party)
                    .ok_or_else(|| InitError(format!("{:?} holds no share of this key", party.id())))
            })
            .collect::<Result<_, _>>()?;

        let ssid = Hash::new_with_dst(b"eddsa-signing-ssid")
            .chain_bytes(shared_randomness)
            .chain_bytes(Ed25519::NAME.as_bytes())
            .chain(params.peers())
            .chain(&save.public_key)
            .chain_bytes(&message)
            .finalize()
            .as_ref()
            .to_vec()
            .into_boxed_slice();

        let quorum_xs = params.share_xs::<Ed25519>();
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

        let nonce = Scalar::random_nonzero(&mut *rng);
        let big_r_share = nonce.mul_by_generator();
        let (commitment, decommitment) = HashCommitment::new(&mut *rng, &big_r_share);

        Ok(Self {
            context: Context {
                params,
                save,
                message,
                ssid,
                w,
                big_ws,
                nonce,
            },
            big_r_share,
            commitment,
            decommitment,
        })
    }
}

impl Round for Round1 {
    type Message = Round1Bcast;
    type Payload = HashCommitment;
    type NextRound = Round2;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 1;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[0];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.params.party_count()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round1Bcast {
            commitment: self.commitment,
        })
    }

    fn verify_received(
        &self,
        _from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(msg.commitment)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let commitments = payloads
            .into_hole_vec(self.num_parties(), self.party_idx().as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 1 payloads".into()))?;
        Ok(FinalizeSuccess::AnotherRound(Round2 {
            context: self.context,
            big_r_share: self.big_r_share,
            decommitment: self.decommitment,
            commitments,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Bcast {
    decommitment: Decommitment,
    big_r_share: Point,
}

pub(crate) struct Round2 {
    context: Context,
    big_r_share: Point,
    decommitment: Decommitment,
    commitments: HoleVec<HashCommitment>,
}

impl Round for Round2 {
    type Message = Round2Bcast;
    type Payload = Point;
    type NextRound = Round3;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 2;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[1];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.params.party_count()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round2Bcast {
            decommitment: self.decommitment.clone(),
            big_r_share: self.big_r_share,
        })
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        let commitment = self
            .commitments
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("unknown sender".into()))?;
        if !commitment.verify(&msg.big_r_share, &msg.decommitment) {
            return Err(ReceiveError("nonce decommitment does not match".into()));
        }
        Ok(msg.big_r_share)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let shares = payloads
            .into_hole_vec(self.num_parties(), self.party_idx().as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 2 payloads".into()))?;

        let big_r: Point = shares.iter().copied().sum::<Point>() + self.big_r_share;
        let h = challenge(&big_r, &self.context.save.public_key, &self.context.message);
        let s_share = self.context.nonce + h * self.context.w;

        Ok(FinalizeSuccess::AnotherRound(Round3 {
            context: self.context,
            nonce_shares: shares,
            big_r,
            h,
            s_share,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round3Bcast {
    s_share: Scalar,
}

pub(crate) struct Round3 {
    context: Context,
    nonce_shares: HoleVec<Point>,
    big_r: Point,
    h: Scalar,
    s_share: Scalar,
}

impl Round for Round3 {
    type Message = Round3Bcast;
    type Payload = Scalar;
    type NextRound = NonExistent<SignatureData>;
    type Result = SignatureData;

    const ROUND_NUM: u8 = 3;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[2];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.params.party_count()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round3Bcast {
            s_share: self.s_share,
        })
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        // s_j·G must equal R_j + h·λ_j·X_j; a mismatch identifies the signer.
        let nonce_share = self
            .nonce_shares
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("unknown sender".into()))?;
        let expected = *nonce_share + self.context.big_ws[from.as_usize()].mul(&self.h);
        if msg.s_share.mul_by_generator() != expected {
            return Err(ReceiveError(
                "signature share does not open against the sender's public share".into(),
            ));
        }
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

        // The assembled signature must satisfy the stock verification
        // equation before it is released.
        if s.mul_by_generator() != self.big_r + self.context.save.public_key.mul(&self.h) {
            return Err(FinalizeError::Internal(
                "the assembled signature does not verify against the joint public key".into(),
            ));
        }

        Ok(FinalizeSuccess::Result(SignatureData::eddsa(
            &self.big_r,
            &s,
            self.context.message.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use rand_core::{OsRng, RngCore};

    use super::super::keygen::tests::{run_keygen, test_params};
    use super::*;
    use crate::party::round::test_helpers::{assert_next_round, assert_result, step};
    use crate::party::PeerContext;

    fn stock_verify(public_key: &[u8], message: &[u8], signature: &[u8]) {
        let verifying_key =
            ed25519_dalek::VerifyingKey::from_bytes(public_key.try_into().unwrap()).unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(signature.try_into().unwrap());
        verifying_key.verify_strict(message, &signature).unwrap();
    }

    fn sign_with_quorum(
        saves: &[LocalSaveData],
        quorum: &[usize],
        threshold: usize,
        message: &[u8],
    ) -> SignatureData {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let all_params = test_params(saves.len(), threshold);

        let r1: Vec<Round1> = quorum
            .iter()
            .map(|&i| {
                let quorum_peers = PeerContext::new(
                    quorum
                        .iter()
                        .map(|&j| all_params[j].self_id().clone())
                        .collect(),
                )
                .unwrap();
                let params = Parameters::new::<Ed25519>(
                    quorum_peers,
                    all_params[i].self_id().clone(),
                    threshold,
                )
                .unwrap();
                Round1::new(
                    &mut OsRng,
                    &seed,
                    (params, saves[i].clone(), message.to_vec()),
                )
                .unwrap()
            })
            .collect();

        let r2 = assert_next_round(step(&mut OsRng, r1).unwrap()).unwrap();
        let r3 = assert_next_round(step(&mut OsRng, r2).unwrap()).unwrap();
        let signatures = assert_result(step(&mut OsRng, r3).unwrap()).unwrap();
        for signature in &signatures {
            assert_eq!(signature, &signatures[0]);
        }
        signatures.into_iter().next().unwrap()
    }

    #[test]
    fn threshold_signature_verifies_under_stock_ed25519() {
        let saves = run_keygen(3, 1);
        let message = b"attack at dawn";
        let signature = sign_with_quorum(&saves, &[0, 2], 1, message);
        assert_eq!(signature.signature.len(), 64);
        stock_verify(&saves[0].public_key_bytes(), message, &signature.signature);
    }

    #[test]
    fn different_quorums_both_verify() {
        let saves = run_keygen(4, 2);
        let message = b"rotating quorums";
        for quorum in [[0usize, 1, 2], [1, 2, 3]] {
            let signature = sign_with_quorum(&saves, &quorum, 2, message);
            stock_verify(&saves[0].public_key_bytes(), message, &signature.signature);
        }
    }

    #[test]
    fn message_with_leading_zero_scalar_roundtrips() {
        // A message whose SHA-512 reduction starts with zero bytes still
        // produces a canonical 64-byte signature.
        let saves = run_keygen(2, 1);
        let message = [0u8; 32];
        let signature = sign_with_quorum(&saves, &[0, 1], 1, &message);
        stock_verify(&saves[0].public_key_bytes(), &message, &signature.signature);
        assert_eq!(signature.message, message.to_vec());
    }
}
