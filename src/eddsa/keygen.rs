//! Distributed Ed25519 key generation: hash commitment, VSS dealing with
//! decommitment, then a Schnorr proof of the accumulated share.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::LocalSaveData;
use crate::curve::ed25519::{Point, Scalar};
use crate::curve::{Curve, Ed25519, Point as _, Scalar as _};
use crate::party::error::Error;
use crate::party::id::PartyIdx;
use crate::party::round::{
    FinalizeError, FinalizeSuccess, FirstRound, InitError, NonExistent, ReceiveError, Round,
    Stage, ToSendTyped,
};
use crate::party::session::Party;
use crate::party::{Parameters, PeerContext};
use crate::sigma::sch::{SchCommitment, SchProof, SchSecret};
use crate::tools::collections::{HoleVec, Payloads};
use crate::tools::hashing::{Chain, Decommitment, Hash, HashCommitment, HashableSlice};
use crate::vss;

const PROTOCOL: &str = "eddsa-keygen";

pub(crate) const ROUND_NAMES: &[&str] = &[
    "EDDSAKeygen.KGRound1Message",
    "EDDSAKeygen.KGRound2Message1",
    "EDDSAKeygen.KGRound2Message2",
    "EDDSAKeygen.KGRound3Message",
];

pub fn new_party(
    rng: &mut impl CryptoRngCore,
    params: Parameters,
    session_seed: &[u8],
) -> Result<Party<LocalSaveData>, Error> {
    let peers = params.peers().clone();
    let me = params.self_index();
    let round1 = Round1::new(rng, session_seed, params)
        .map_err(|InitError(reason)| Error::configuration(reason))?;
    Ok(Party::new(
        PROTOCOL,
        peers,
        me,
        ROUND_NAMES,
        Box::new(Stage::new(round1)),
    ))
}

pub(crate) fn make_ssid(seed: &[u8], peers: &PeerContext, threshold: usize) -> Box<[u8]> {
    Hash::new_with_dst(b"eddsa-keygen-ssid")
        .chain_bytes(seed)
        .chain_bytes(Ed25519::NAME.as_bytes())
        .chain(peers)
        .chain(&(threshold as u64))
        .finalize()
        .as_ref()
        .to_vec()
        .into_boxed_slice()
}

pub(crate) struct Context {
    params: Parameters,
    ssid: Box<[u8]>,
}

impl Context {
    fn aux(&self, party: PartyIdx) -> (Box<[u8]>, PartyIdx) {
        (self.ssid.clone(), party)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round1Bcast {
    commitment: HashCommitment,
}

pub(crate) struct Round1 {
    context: Context,
    shares: Vec<Scalar>,
    vss_commitments: Vec<Point>,
    commitment: HashCommitment,
    decommitment: Decommitment,
}

impl FirstRound for Round1 {
    type Context = Parameters;

    fn new(
        rng: &mut dyn CryptoRngCore,
        shared_randomness: &[u8],
        params: Self::Context,
    ) -> Result<Self, InitError> {
        let ssid = make_ssid(shared_randomness, params.peers(), params.threshold());
        let xs = params.share_xs::<Ed25519>();

        let mut u = Scalar::random_nonzero(&mut *rng);
        let (vss_commitments, shares) =
            vss::share::<Ed25519>(&mut *rng, params.threshold(), &u, &xs)
                .map_err(|err| InitError(err.to_string()))?;
        u.zeroize();

        let (commitment, decommitment) =
            HashCommitment::new(&mut *rng, &HashableSlice(&vss_commitments));

        Ok(Self {
            context: Context { params, ssid },
            shares,
            vss_commitments,
            commitment,
            decommitment,
        })
    }
}

impl Round for Round1 {
    type Message = Round1Bcast;
    type Payload = HashCommitment;
    type NextRound = Round2Shares;
    type Result = LocalSaveData;

    const ROUND_NUM: u8 = 1;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[0];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.params.party_count()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.params.self_index()
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
        let received = payloads
            .into_hole_vec(self.num_parties(), self.party_idx().as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 1 payloads".into()))?;
        Ok(FinalizeSuccess::AnotherRound(Round2Shares {
            context: self.context,
            shares: self.shares,
            vss_commitments: self.vss_commitments,
            decommitment: self.decommitment,
            commitments: received,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Direct {
    share: Scalar,
}

pub(crate) struct Round2Shares {
    context: Context,
    shares: Vec<Scalar>,
    vss_commitments: Vec<Point>,
    decommitment: Decommitment,
    commitments: HoleVec<HashCommitment>,
}

impl Round for Round2Shares {
    type Message = Round2Direct;
    type Payload = Scalar;
    type NextRound = Round2Decommit;
    type Result = LocalSaveData;

    const ROUND_NUM: u8 = 2;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[1];
    const BROADCAST: bool = false;

    fn num_parties(&self) -> usize {
        self.context.params.party_count()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.params.self_index()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        let messages = self
            .shares
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != self.party_idx().as_usize())
            .map(|(idx, share)| (PartyIdx::from_usize(idx), Round2Direct { share: *share }))
            .collect();
        ToSendTyped::Direct(messages)
    }

    fn verify_received(
        &self,
        _from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(msg.share)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let received_shares = payloads
            .into_hole_vec(self.num_parties(), self.party_idx().as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 2 payloads".into()))?;
        Ok(FinalizeSuccess::AnotherRound(Round2Decommit {
            context: self.context,
            shares: self.shares,
            vss_commitments: self.vss_commitments,
            decommitment: self.decommitment,
            commitments: self.commitments,
            received_shares,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Bcast {
    decommitment: Decommitment,
    vss_commitments: Vec<Point>,
}

pub(crate) struct Round2Decommit {
    context: Context,
    shares: Vec<Scalar>,
    vss_commitments: Vec<Point>,
    decommitment: Decommitment,
    commitments: HoleVec<HashCommitment>,
    received_shares: HoleVec<Scalar>,
}

impl Round for Round2Decommit {
    type Message = Round2Bcast;
    type Payload = Vec<Point>;
    type NextRound = Round3;
    type Result = LocalSaveData;

    const ROUND_NUM: u8 = 3;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[2];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.params.party_count()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.params.self_index()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Broadcast(Round2Bcast {
            decommitment: self.decommitment.clone(),
            vss_commitments: self.vss_commitments.clone(),
        })
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        if msg.vss_commitments.len() != self.context.params.threshold() + 1 {
            return Err(ReceiveError(
                "commitment vector length does not match the threshold".into(),
            ));
        }
        let committed = self
            .commitments
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("unknown sender".into()))?;
        if !committed.verify(&HashableSlice(&msg.vss_commitments), &msg.decommitment) {
            return Err(ReceiveError("decommitment does not match".into()));
        }

        let my_x = self.context.params.share_xs::<Ed25519>()[self.party_idx().as_usize()];
        let share = self
            .received_shares
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("missing share from this sender".into()))?;
        if !vss::verify_share::<Ed25519>(&msg.vss_commitments, &my_x, share) {
            return Err(ReceiveError(
                "VSS share is inconsistent with the commitments".into(),
            ));
        }
        Ok(msg.vss_commitments)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let n = self.num_parties();
        let me = self.party_idx();
        let received = payloads
            .into_hole_vec(n, me.as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 3 payloads".into()))?;
        let all_commitments = received.into_vec(self.vss_commitments.clone());

        let mut own_shares = self.shares;
        let mut secret_share = own_shares[me.as_usize()];
        for share in self.received_shares.iter() {
            secret_share = secret_share + *share;
        }
        own_shares.iter_mut().for_each(Zeroize::zeroize);

        let public_key: Point = all_commitments
            .iter()
            .map(|commitments| commitments[0])
            .sum();
        let xs = self.context.params.share_xs::<Ed25519>();
        let public_shares: Vec<Point> = xs
            .iter()
            .map(|x| {
                all_commitments
                    .iter()
                    .map(|commitments| vss::commitment_eval::<Ed25519>(commitments, x))
                    .sum()
            })
            .collect();

        if secret_share.mul_by_generator() != public_shares[me.as_usize()] {
            return Err(FinalizeError::Internal(
                "public key reconstructed from shares does not match the published key".into(),
            ));
        }

        Ok(FinalizeSuccess::AnotherRound(Round3 {
            context: self.context,
            secret_share,
            public_key,
            public_shares,
            all_commitments,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round3Bcast {
    proof: SchProof<Ed25519>,
}

pub(crate) struct Round3 {
    context: Context,
    secret_share: Scalar,
    public_key: Point,
    public_shares: Vec<Point>,
    all_commitments: Vec<Vec<Point>>,
}

impl Round for Round3 {
    type Message = Round3Bcast;
    type Payload = ();
    type NextRound = NonExistent<LocalSaveData>;
    type Result = LocalSaveData;

    const ROUND_NUM: u8 = 4;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[3];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.params.party_count()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.params.self_index()
    }

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        let me = self.party_idx();
        let secret = SchSecret::random(&mut *rng);
        let commitment = SchCommitment::new(&secret);
        let proof = SchProof::new(
            &secret,
            &self.secret_share,
            &commitment,
            &self.public_shares[me.as_usize()],
            &self.context.aux(me),
        );
        ToSendTyped::Broadcast(Round3Bcast { proof })
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        if !msg.proof.verify(
            &self.public_shares[from.as_usize()],
            &self.context.aux(from),
        ) {
            return Err(ReceiveError("Schnorr verification failed".into()));
        }
        Ok(())
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        _payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let save = LocalSaveData::new_checked(
            self.context.params.threshold(),
            self.context.params.peers().clone(),
            self.party_idx(),
            self.public_key,
            self.public_shares,
            self.all_commitments,
            self.secret_share,
        )
        .map_err(|err| FinalizeError::Internal(err.to_string()))?;
        Ok(FinalizeSuccess::Result(save))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rand_core::{OsRng, RngCore};

    use super::*;
    use crate::party::round::test_helpers::{assert_next_round, assert_result, step};
    use crate::party::PartyID;

    pub(crate) fn test_params(n: usize, threshold: usize) -> Vec<Parameters> {
        let parties: Vec<PartyID> = (1..=n as u64)
            .map(|key| PartyID::new(format!("party-{key}"), format!("P{key}"), key.into()))
            .collect();
        let peers = PeerContext::new(parties.clone()).unwrap();
        parties
            .into_iter()
            .map(|party| Parameters::new::<Ed25519>(peers.clone(), party, threshold).unwrap())
            .collect()
    }

    pub(crate) fn run_keygen(n: usize, threshold: usize) -> Vec<LocalSaveData> {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);

        let r1: Vec<Round1> = test_params(n, threshold)
            .into_iter()
            .map(|params| Round1::new(&mut OsRng, &seed, params).unwrap())
            .collect();

        let r2a = assert_next_round(step(&mut OsRng, r1).unwrap()).unwrap();
        let r2b = assert_next_round(step(&mut OsRng, r2a).unwrap()).unwrap();
        let r3 = assert_next_round(step(&mut OsRng, r2b).unwrap()).unwrap();
        assert_result(step(&mut OsRng, r3).unwrap()).unwrap()
    }

    #[test]
    fn execute_keygen() {
        let saves = run_keygen(4, 2);
        assert!(saves[1..]
            .iter()
            .all(|save| save.public_key() == saves[0].public_key()));

        // Interpolating any t+1 shares opens the joint key.
        for subset in [[0usize, 1, 2], [1, 2, 3], [0, 2, 3]] {
            let xs: Vec<Scalar> = subset
                .iter()
                .map(|&i| saves[i].share_x_of(saves[i].self_index))
                .collect();
            let secret: Scalar = subset
                .iter()
                .enumerate()
                .map(|(position, &i)| {
                    super::super::lagrange_weight(&xs, position).unwrap() * saves[i].secret_share
                })
                .sum();
            assert_eq!(secret.mul_by_generator(), *saves[0].public_key());
        }
    }
}
