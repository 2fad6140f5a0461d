//! Ed25519 committee rotation: the ECDSA variant minus the Paillier rounds.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
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
use crate::party::ReSharingParameters;
use crate::tools::collections::Payloads;
use crate::tools::hashing::{Chain, Decommitment, Hash, HashCommitment, HashableSlice};
use crate::vss;

const PROTOCOL: &str = "eddsa-resharing";

pub(crate) const ROUND_NAMES: &[&str] = &[
    "EDDSAReSharing.DGRound1Message",
    "EDDSAReSharing.DGRound2Message1",
    "EDDSAReSharing.DGRound2Message2",
    "EDDSAReSharing.DGRound3Message",
];

/// The resharing result: `None` for a party that only belonged to the old
/// committee.
pub type ReSharingOutput = Option<LocalSaveData>;

pub fn new_party(
    rng: &mut impl CryptoRngCore,
    params: ReSharingParameters,
    old_save: Option<LocalSaveData>,
    session_seed: &[u8],
) -> Result<Party<ReSharingOutput>, Error> {
    let peers = params.union().clone();
    let me = params.self_index();
    let round1 = Round1::new(rng, session_seed, (params, old_save))
        .map_err(|InitError(reason)| Error::configuration(reason))?;
    Ok(Party::new(
        PROTOCOL,
        peers,
        me,
        ROUND_NAMES,
        Box::new(Stage::new(round1)),
    ))
}

struct Dealing {
    public_key: Point,
    vss_commitments: Vec<Point>,
    shares: Vec<Scalar>,
    commitment: HashCommitment,
    decommitment: Decommitment,
}

pub(crate) struct Context {
    params: ReSharingParameters,
    dealing: Option<Dealing>,
    ssid: Box<[u8]>,
}

impl Context {
    fn union_size(&self) -> usize {
        self.params.union().len()
    }

    fn me(&self) -> PartyIdx {
        self.params.self_index()
    }

    fn expecting_old(&self) -> Vec<PartyIdx> {
        self.params
            .old_indices()
            .into_iter()
            .filter(|idx| *idx != self.me())
            .collect()
    }

    fn expecting_new(&self) -> Vec<PartyIdx> {
        self.params
            .new_indices()
            .into_iter()
            .filter(|idx| *idx != self.me())
            .collect()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(dealing) = &mut self.dealing {
            dealing.shares.iter_mut().for_each(Zeroize::zeroize);
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round1Bcast {
    commitment: HashCommitment,
    public_key: Point,
}

pub(crate) struct Round1 {
    context: Context,
}

impl FirstRound for Round1 {
    type Context = (ReSharingParameters, Option<LocalSaveData>);

    fn new(
        rng: &mut dyn CryptoRngCore,
        shared_randomness: &[u8],
        context: Self::Context,
    ) -> Result<Self, InitError> {
        let (params, old_save) = context;

        let ssid = Hash::new_with_dst(b"eddsa-resharing-ssid")
            .chain_bytes(shared_randomness)
            .chain_bytes(Ed25519::NAME.as_bytes())
            .chain(params.union())
            .chain(&(params.old_threshold() as u64))
            .chain(&(params.new_threshold() as u64))
            .finalize()
            .as_ref()
            .to_vec()
            .into_boxed_slice();

        let dealing = if params.is_old_member() {
            let save = old_save.ok_or_else(|| {
                InitError("an old-committee member needs its save-data".into())
            })?;
            if save.parties() != params.old_peers() {
                return Err(InitError(
                    "save-data was generated for a different committee".into(),
                ));
            }

            let old_xs = params.old_share_xs::<Ed25519>();
            let position = params.old_position().expect("checked to be an old member");
            let lambda = lagrange_weight(&old_xs, position)
                .map_err(|err| InitError(err.to_string()))?;
            let mut w = lambda * save.secret_share;

            let new_xs = params.new_share_xs::<Ed25519>();
            let (vss_commitments, shares) =
                vss::share::<Ed25519>(&mut *rng, params.new_threshold(), &w, &new_xs)
                    .map_err(|err| InitError(err.to_string()))?;
            w.zeroize();

            let (commitment, decommitment) =
                HashCommitment::new(&mut *rng, &HashableSlice(&vss_commitments));

            Some(Dealing {
                public_key: save.public_key,
                vss_commitments,
                shares,
                commitment,
                decommitment,
            })
        } else {
            None
        };

        Ok(Self {
            context: Context {
                params,
                dealing,
                ssid,
            },
        })
    }
}

impl Round for Round1 {
    type Message = Round1Bcast;
    type Payload = Round1Bcast;
    type NextRound = Round2Shares;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 1;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[0];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.union_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn expecting(&self) -> Vec<PartyIdx> {
        self.context.expecting_old()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        match &self.context.dealing {
            Some(dealing) => ToSendTyped::Broadcast(Round1Bcast {
                commitment: dealing.commitment,
                public_key: dealing.public_key,
            }),
            None => ToSendTyped::Nothing,
        }
    }

    fn verify_received(
        &self,
        _from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        Ok(msg)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let mut claims = payloads.iter().map(|(_, payload)| payload.public_key);
        let public_key = match &self.context.dealing {
            Some(dealing) => dealing.public_key,
            None => claims.next().ok_or_else(|| {
                FinalizeError::Internal("the old committee cannot be empty".into())
            })?,
        };
        if !payloads
            .iter()
            .all(|(_, payload)| payload.public_key == public_key)
        {
            return Err(FinalizeError::Validation {
                reason: "the old committee disagrees on the joint public key".into(),
                culprits: self.context.params.old_indices(),
            });
        }

        let mut commitments = Payloads::new();
        for (idx, payload) in payloads.iter() {
            commitments
                .insert(idx, payload.commitment)
                .expect("unique senders");
        }

        Ok(FinalizeSuccess::AnotherRound(Round2Shares {
            context: self.context,
            public_key,
            commitments,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Direct {
    share: Scalar,
}

pub(crate) struct Round2Shares {
    context: Context,
    public_key: Point,
    commitments: Payloads<HashCommitment>,
}

impl Round for Round2Shares {
    type Message = Round2Direct;
    type Payload = Scalar;
    type NextRound = Round2Decommit;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 2;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[1];
    const BROADCAST: bool = false;

    fn num_parties(&self) -> usize {
        self.context.union_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn expecting(&self) -> Vec<PartyIdx> {
        if self.context.params.is_new_member() {
            self.context.expecting_old()
        } else {
            Vec::new()
        }
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        match &self.context.dealing {
            Some(dealing) => {
                let messages = self
                    .context
                    .params
                    .new_indices()
                    .into_iter()
                    .enumerate()
                    .filter(|(_, idx)| *idx != self.context.me())
                    .map(|(position, idx)| {
                        (
                            idx,
                            Round2Direct {
                                share: dealing.shares[position],
                            },
                        )
                    })
                    .collect();
                ToSendTyped::Direct(messages)
            }
            None => ToSendTyped::Nothing,
        }
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
        Ok(FinalizeSuccess::AnotherRound(Round2Decommit {
            context: self.context,
            public_key: self.public_key,
            commitments: self.commitments,
            shares: payloads,
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
    public_key: Point,
    commitments: Payloads<HashCommitment>,
    shares: Payloads<Scalar>,
}

impl Round for Round2Decommit {
    type Message = Round2Bcast;
    type Payload = Vec<Point>;
    type NextRound = Round3;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 3;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[2];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.union_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn expecting(&self) -> Vec<PartyIdx> {
        self.context.expecting_old()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        match &self.context.dealing {
            Some(dealing) => ToSendTyped::Broadcast(Round2Bcast {
                decommitment: dealing.decommitment.clone(),
                vss_commitments: dealing.vss_commitments.clone(),
            }),
            None => ToSendTyped::Nothing,
        }
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        if msg.vss_commitments.len() != self.context.params.new_threshold() + 1 {
            return Err(ReceiveError(
                "commitment vector length does not match the new threshold".into(),
            ));
        }
        let committed = self
            .commitments
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("decommitment from a non-dealer".into()))?;
        if !committed.verify(&HashableSlice(&msg.vss_commitments), &msg.decommitment) {
            return Err(ReceiveError("decommitment does not match".into()));
        }

        if let Some(position) = self.context.params.new_position() {
            let my_x = self.context.params.new_share_xs::<Ed25519>()[position];
            let share = self
                .shares
                .get(from.as_usize())
                .ok_or_else(|| ReceiveError("missing share from this dealer".into()))?;
            if !vss::verify_share::<Ed25519>(&msg.vss_commitments, &my_x, share) {
                return Err(ReceiveError(
                    "re-dealt share is inconsistent with the commitments".into(),
                ));
            }
        }
        Ok(msg.vss_commitments)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let mut dealer_commitments: Vec<Vec<Point>> = Vec::new();
        for idx in self.context.params.old_indices() {
            if idx == self.context.me() {
                let dealing = self
                    .context
                    .dealing
                    .as_ref()
                    .expect("an old member has a dealing");
                dealer_commitments.push(dealing.vss_commitments.clone());
            } else {
                let commitments = payloads
                    .get(idx.as_usize())
                    .ok_or_else(|| FinalizeError::Internal("missing dealer commitments".into()))?;
                dealer_commitments.push(commitments.clone());
            }
        }

        let mut summed: Vec<Point> =
            vec![Point::identity(); self.context.params.new_threshold() + 1];
        for commitments in &dealer_commitments {
            for (slot, commitment) in summed.iter_mut().zip(commitments.iter()) {
                *slot = *slot + *commitment;
            }
        }
        if summed[0] != self.public_key {
            return Err(FinalizeError::Validation {
                reason: "the re-dealt shares do not reconstruct the joint public key".into(),
                culprits: self.context.params.old_indices(),
            });
        }

        let secret_share = match self.context.params.new_position() {
            Some(position) => {
                let mut share = Scalar::ZERO;
                for idx in self.context.params.old_indices() {
                    if idx == self.context.me() {
                        let dealing = self
                            .context
                            .dealing
                            .as_ref()
                            .expect("an old member has a dealing");
                        share = share + dealing.shares[position];
                    } else {
                        let dealt = self.shares.get(idx.as_usize()).ok_or_else(|| {
                            FinalizeError::Internal("missing dealer share".into())
                        })?;
                        share = share + *dealt;
                    }
                }
                Some(share)
            }
            None => None,
        };

        Ok(FinalizeSuccess::AnotherRound(Round3 {
            context: self.context,
            public_key: self.public_key,
            summed_commitments: summed,
            secret_share,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round3Bcast {
    public_key: Point,
}

pub(crate) struct Round3 {
    context: Context,
    public_key: Point,
    summed_commitments: Vec<Point>,
    secret_share: Option<Scalar>,
}

impl Round for Round3 {
    type Message = Round3Bcast;
    type Payload = ();
    type NextRound = NonExistent<ReSharingOutput>;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 4;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[3];
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        self.context.union_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn expecting(&self) -> Vec<PartyIdx> {
        self.context.expecting_new()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        if self.context.params.is_new_member() {
            ToSendTyped::Broadcast(Round3Bcast {
                public_key: self.public_key,
            })
        } else {
            ToSendTyped::Nothing
        }
    }

    fn verify_received(
        &self,
        _from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        if msg.public_key != self.public_key {
            return Err(ReceiveError(
                "acknowledgement names a different public key".into(),
            ));
        }
        Ok(())
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        _payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let secret_share = match self.secret_share {
            Some(secret_share) => secret_share,
            None => return Ok(FinalizeSuccess::Result(None)),
        };

        let params = &self.context.params;
        let new_position = params.new_position().expect("holds a share, so is new");
        let new_xs = params.new_share_xs::<Ed25519>();
        let public_shares: Vec<Point> = new_xs
            .iter()
            .map(|x| vss::commitment_eval::<Ed25519>(&self.summed_commitments, x))
            .collect();

        let save = LocalSaveData::new_checked(
            params.new_threshold(),
            params.new_peers().clone(),
            PartyIdx::from_usize(new_position),
            self.public_key,
            public_shares,
            vec![self.summed_commitments.clone()],
            secret_share,
        )
        .map_err(|err| FinalizeError::Internal(err.to_string()))?;

        Ok(FinalizeSuccess::Result(Some(save)))
    }
}

#[cfg(test)]
mod tests {
    use rand_core::{OsRng, RngCore};

    use super::super::keygen::tests::run_keygen;
    use super::*;
    use crate::party::round::test_helpers::{assert_next_round, assert_result, step};
    use crate::party::{PartyID, PeerContext};

    #[test]
    fn reshare_preserves_the_public_key() {
        let saves = run_keygen(3, 1);
        let public_key = *saves[0].public_key();

        let old_parties: Vec<PartyID> = saves[0].parties().iter().cloned().collect();
        let old_peers = PeerContext::new(old_parties.clone()).unwrap();
        let new_parties: Vec<PartyID> = vec![
            old_parties[1].clone(),
            PartyID::new("party-7", "P7", 7u64.into()),
        ];
        let new_peers = PeerContext::new(new_parties.clone()).unwrap();

        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);

        let members: Vec<PartyID> = {
            let mut all = old_parties.clone();
            for party in &new_parties {
                if !all.contains(party) {
                    all.push(party.clone());
                }
            }
            all
        };

        let r1: Vec<Round1> = members
            .iter()
            .map(|member| {
                let params = ReSharingParameters::new::<Ed25519>(
                    old_peers.clone(),
                    1,
                    new_peers.clone(),
                    1,
                    member.clone(),
                )
                .unwrap();
                let old_save = old_parties
                    .iter()
                    .position(|party| party == member)
                    .map(|position| saves[position].clone());
                Round1::new(&mut OsRng, &seed, (params, old_save)).unwrap()
            })
            .collect();

        let r2a = assert_next_round(step(&mut OsRng, r1).unwrap()).unwrap();
        let r2b = assert_next_round(step(&mut OsRng, r2a).unwrap()).unwrap();
        let r3 = assert_next_round(step(&mut OsRng, r2b).unwrap()).unwrap();
        let outputs = assert_result(step(&mut OsRng, r3).unwrap()).unwrap();

        let mut new_saves = Vec::new();
        for (member, output) in members.iter().zip(outputs) {
            match output {
                Some(save) => {
                    assert!(new_peers.contains(member));
                    assert_eq!(save.public_key(), &public_key);
                    new_saves.push(save);
                }
                None => assert!(!new_peers.contains(member)),
            }
        }
        assert_eq!(new_saves.len(), 2);

        let xs: Vec<Scalar> = new_saves
            .iter()
            .map(|save| save.share_x_of(save.self_index))
            .collect();
        let secret: Scalar = new_saves
            .iter()
            .enumerate()
            .map(|(position, save)| lagrange_weight(&xs, position).unwrap() * save.secret_share)
            .sum();
        assert_eq!(secret.mul_by_generator(), public_key);
    }
}
