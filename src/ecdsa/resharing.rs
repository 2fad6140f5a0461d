//! Committee rotation: the old committee re-deals its shares to a possibly
//! different new committee under a new threshold, without reconstructing the
//! key. The joint public key is unchanged; Paillier material is regenerated
//! by the new committee.

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{lagrange_weight, LocalPreParams, LocalSaveData, PAILLIER_MODULUS_BITS};
use crate::curve::secp256k1::{Point, Scalar};
use crate::curve::{Curve, Point as _, Scalar as _, Secp256k1};
use crate::paillier::PublicKey;
use crate::party::error::Error;
use crate::party::id::PartyIdx;
use crate::party::round::{
    FinalizeError, FinalizeSuccess, FirstRound, InitError, NonExistent, ReceiveError, Round,
    Stage, ToSendTyped,
};
use crate::party::session::Party;
use crate::party::ReSharingParameters;
use crate::sigma::blum::BlumModProof;
use crate::sigma::fac::FacProof;
use crate::sigma::RingPedersenParams;
use crate::tools::collections::Payloads;
use crate::tools::hashing::{Chain, Decommitment, Hash, HashCommitment, HashableSlice};
use crate::vss;

const PROTOCOL: &str = "ecdsa-resharing";

pub(crate) const ROUND_NAMES: &[&str] = &[
    "ECDSAReSharing.DGRound1Message",
    "ECDSAReSharing.DGRound2Message",
    "ECDSAReSharing.DGRound3Message1",
    "ECDSAReSharing.DGRound3Message2",
    "ECDSAReSharing.DGRound4Message",
    "ECDSAReSharing.DGRound5Message",
];

/// The resharing result: new committee members receive fresh save-data; a
/// party that only belonged to the old committee retires its share and
/// receives `None`.
pub type ReSharingOutput = Option<LocalSaveData>;

/// Starts a resharing party. Old-committee members must supply their current
/// save-data; new-committee members need pre-params (generated on the spot
/// when not supplied).
pub fn new_party(
    rng: &mut impl CryptoRngCore,
    params: ReSharingParameters,
    old_save: Option<LocalSaveData>,
    pre_params: Option<LocalPreParams>,
    session_seed: &[u8],
) -> Result<Party<ReSharingOutput>, Error> {
    let pre_params = if params.is_new_member() {
        match pre_params {
            Some(pre_params) => Some(pre_params),
            None => Some(LocalPreParams::generate(None)?),
        }
    } else {
        None
    };
    let peers = params.union().clone();
    let me = params.self_index();
    let round1 = Round1::new(rng, session_seed, (params, old_save, pre_params))
        .map_err(|InitError(reason)| Error::configuration(reason))?;
    Ok(Party::new(
        PROTOCOL,
        peers,
        me,
        ROUND_NAMES,
        Box::new(Stage::new(round1)),
    ))
}

/// The old-committee dealing state.
struct Dealing {
    public_key: Point,
    vss_commitments: Vec<Point>,
    /// Shares for the new committee, in new-committee order.
    shares: Vec<Scalar>,
    commitment: HashCommitment,
    decommitment: Decommitment,
}

pub(crate) struct Context {
    params: ReSharingParameters,
    pre_params: Option<LocalPreParams>,
    dealing: Option<Dealing>,
    ssid: Box<[u8]>,
}

impl Context {
    fn aux(&self, party: PartyIdx) -> (Box<[u8]>, PartyIdx) {
        (self.ssid.clone(), party)
    }

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
    type Context = (
        ReSharingParameters,
        Option<LocalSaveData>,
        Option<LocalPreParams>,
    );

    fn new(
        rng: &mut dyn CryptoRngCore,
        shared_randomness: &[u8],
        context: Self::Context,
    ) -> Result<Self, InitError> {
        let (params, old_save, pre_params) = context;

        if params.is_new_member() {
            match &pre_params {
                Some(pre_params) if pre_params.is_well_formed() => {}
                _ => {
                    return Err(InitError(
                        "a new-committee member needs well-formed pre-params".into(),
                    ))
                }
            }
        }

        let ssid = Hash::new_with_dst(b"ecdsa-resharing-ssid")
            .chain_bytes(shared_randomness)
            .chain_bytes(Secp256k1::NAME.as_bytes())
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

            // Additive conversion over the full old committee, then a fresh
            // polynomial at the new threshold.
            let old_xs = params.old_share_xs::<Secp256k1>();
            let position = params
                .old_position()
                .expect("checked to be an old member");
            let lambda = lagrange_weight(&old_xs, position)
                .map_err(|err| InitError(err.to_string()))?;
            let mut w = lambda * save.secret_share;

            let new_xs = params.new_share_xs::<Secp256k1>();
            let (vss_commitments, shares) =
                vss::share::<Secp256k1>(&mut *rng, params.new_threshold(), &w, &new_xs)
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
                pre_params,
                dealing,
                ssid,
            },
        })
    }
}

impl Round for Round1 {
    type Message = Round1Bcast;
    type Payload = Round1Bcast;
    type NextRound = Round2;
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
        // All old-committee claims of the joint public key must agree.
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

        let commitments: Payloads<HashCommitment> = {
            let mut map = Payloads::new();
            for (idx, payload) in payloads.iter() {
                map.insert(idx, payload.commitment).expect("unique senders");
            }
            map
        };

        Ok(FinalizeSuccess::AnotherRound(Round2 {
            context: self.context,
            public_key,
            commitments,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Bcast {
    paillier_pk: PublicKey,
    ring_pedersen: RingPedersenParams,
    blum_proof: BlumModProof,
}

pub(crate) struct Round2Payload {
    paillier_pk: PublicKey,
    ring_pedersen: RingPedersenParams,
}

pub(crate) struct Round2 {
    context: Context,
    public_key: Point,
    commitments: Payloads<HashCommitment>,
}

impl Round for Round2 {
    type Message = Round2Bcast;
    type Payload = Round2Payload;
    type NextRound = Round3Shares;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 2;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[1];
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

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        match &self.context.pre_params {
            Some(pre_params) => {
                let blum_proof = BlumModProof::new(
                    &mut *rng,
                    &pre_params.paillier_sk,
                    &self.context.aux(self.context.me()),
                )
                .expect("own key has the Blum structure");
                ToSendTyped::Broadcast(Round2Bcast {
                    paillier_pk: pre_params.paillier_sk.public_key().clone(),
                    ring_pedersen: pre_params.ring_pedersen.clone(),
                    blum_proof,
                })
            }
            None => ToSendTyped::Nothing,
        }
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        if msg.paillier_pk.modulus().bits() < PAILLIER_MODULUS_BITS {
            return Err(ReceiveError("Paillier modulus is too small".into()));
        }
        if msg.ring_pedersen.modulus().bits() < PAILLIER_MODULUS_BITS {
            return Err(ReceiveError("ring-Pedersen modulus is too small".into()));
        }
        if msg.ring_pedersen.h1 == msg.ring_pedersen.h2 {
            return Err(ReceiveError("h1 and h2 are equal".into()));
        }
        if !msg
            .blum_proof
            .verify(msg.paillier_pk.modulus(), &self.context.aux(from))
        {
            return Err(ReceiveError(
                "the Paillier modulus proof did not verify".into(),
            ));
        }
        Ok(Round2Payload {
            paillier_pk: msg.paillier_pk,
            ring_pedersen: msg.ring_pedersen,
        })
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        Ok(FinalizeSuccess::AnotherRound(Round3Shares {
            context: self.context,
            public_key: self.public_key,
            commitments: self.commitments,
            new_paillier: payloads,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round3Direct {
    share: Scalar,
}

pub(crate) struct Round3Shares {
    context: Context,
    public_key: Point,
    commitments: Payloads<HashCommitment>,
    new_paillier: Payloads<Round2Payload>,
}

impl Round for Round3Shares {
    type Message = Round3Direct;
    type Payload = Scalar;
    type NextRound = Round3Decommit;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 3;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[2];
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
                let new_indices = self.context.params.new_indices();
                let messages = new_indices
                    .into_iter()
                    .enumerate()
                    .filter(|(_, idx)| *idx != self.context.me())
                    .map(|(position, idx)| {
                        (
                            idx,
                            Round3Direct {
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
        // Consistency with the dealer's committed polynomial is checked at
        // decommitment time.
        Ok(msg.share)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        Ok(FinalizeSuccess::AnotherRound(Round3Decommit {
            context: self.context,
            public_key: self.public_key,
            commitments: self.commitments,
            new_paillier: self.new_paillier,
            shares: payloads,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round3Bcast {
    decommitment: Decommitment,
    vss_commitments: Vec<Point>,
}

pub(crate) struct Round3Decommit {
    context: Context,
    public_key: Point,
    commitments: Payloads<HashCommitment>,
    new_paillier: Payloads<Round2Payload>,
    /// Shares received from the old committee (new members only).
    shares: Payloads<Scalar>,
}

impl Round for Round3Decommit {
    type Message = Round3Bcast;
    type Payload = Vec<Point>;
    type NextRound = Round4;
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
        self.context.expecting_old()
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        match &self.context.dealing {
            Some(dealing) => ToSendTyped::Broadcast(Round3Bcast {
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
            let my_x = self.context.params.new_share_xs::<Secp256k1>()[position];
            let share = self
                .shares
                .get(from.as_usize())
                .ok_or_else(|| ReceiveError("missing share from this dealer".into()))?;
            if !vss::verify_share::<Secp256k1>(&msg.vss_commitments, &my_x, share) {
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
        // Assemble the commitment matrix over all dealers (mine included).
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

        // The re-dealt polynomials must still open the old public key.
        let mut summed: Vec<Point> =
            vec![Point::IDENTITY; self.context.params.new_threshold() + 1];
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

        // New members accumulate their share of the unchanged key.
        let secret_share = match self.context.params.new_position() {
            Some(_) => {
                let mut share = Scalar::ZERO;
                for idx in self.context.params.old_indices() {
                    if idx == self.context.me() {
                        let dealing = self
                            .context
                            .dealing
                            .as_ref()
                            .expect("an old member has a dealing");
                        let position = self
                            .context
                            .params
                            .new_position()
                            .expect("checked to be a new member");
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

        Ok(FinalizeSuccess::AnotherRound(Round4 {
            context: self.context,
            public_key: self.public_key,
            new_paillier: self.new_paillier,
            summed_commitments: summed,
            secret_share,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round4Direct {
    fac_proof: FacProof,
}

pub(crate) struct Round4 {
    context: Context,
    public_key: Point,
    new_paillier: Payloads<Round2Payload>,
    summed_commitments: Vec<Point>,
    secret_share: Option<Scalar>,
}

impl Round for Round4 {
    type Message = Round4Direct;
    type Payload = ();
    type NextRound = Round5;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 5;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[4];
    const BROADCAST: bool = false;

    fn num_parties(&self) -> usize {
        self.context.union_size()
    }

    fn party_idx(&self) -> PartyIdx {
        self.context.me()
    }

    fn expecting(&self) -> Vec<PartyIdx> {
        if self.context.params.is_new_member() {
            self.context.expecting_new()
        } else {
            Vec::new()
        }
    }

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        match &self.context.pre_params {
            Some(pre_params) => {
                let (p, q) = pre_params.paillier_sk.primes();
                let messages = self
                    .context
                    .expecting_new()
                    .into_iter()
                    .map(|idx| {
                        let receiver_rp = &self
                            .new_paillier
                            .get(idx.as_usize())
                            .expect("every new member published auxiliaries")
                            .ring_pedersen;
                        let fac_proof = FacProof::new(
                            &mut *rng,
                            &Secp256k1::order(),
                            p,
                            q,
                            receiver_rp,
                            &self.context.aux(self.context.me()),
                        );
                        (idx, Round4Direct { fac_proof })
                    })
                    .collect();
                ToSendTyped::Direct(messages)
            }
            None => ToSendTyped::Nothing,
        }
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        let sender_n = self
            .new_paillier
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("factorization proof from a non-member".into()))?
            .paillier_pk
            .modulus()
            .clone();
        let my_rp = &self
            .context
            .pre_params
            .as_ref()
            .expect("only new members expect this round")
            .ring_pedersen;
        if !msg.fac_proof.verify(
            &Secp256k1::order(),
            &sender_n,
            my_rp,
            &self.context.aux(from),
        ) {
            return Err(ReceiveError(
                "the factorization proof did not verify".into(),
            ));
        }
        Ok(())
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        _payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        Ok(FinalizeSuccess::AnotherRound(Round5 {
            context: self.context,
            public_key: self.public_key,
            new_paillier: self.new_paillier,
            summed_commitments: self.summed_commitments,
            secret_share: self.secret_share,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round5Bcast {
    public_key: Point,
}

pub(crate) struct Round5 {
    context: Context,
    public_key: Point,
    new_paillier: Payloads<Round2Payload>,
    summed_commitments: Vec<Point>,
    secret_share: Option<Scalar>,
}

impl Round for Round5 {
    type Message = Round5Bcast;
    type Payload = ();
    type NextRound = NonExistent<ReSharingOutput>;
    type Result = ReSharingOutput;

    const ROUND_NUM: u8 = 6;
    const MESSAGE_NAME: &'static str = ROUND_NAMES[5];
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
            ToSendTyped::Broadcast(Round5Bcast {
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
            // Old-only members retire their share here.
            None => return Ok(FinalizeSuccess::Result(None)),
        };

        let params = &self.context.params;
        let new_position = params.new_position().expect("holds a share, so is new");
        let new_xs = params.new_share_xs::<Secp256k1>();
        let public_shares: Vec<Point> = new_xs
            .iter()
            .map(|x| vss::commitment_eval::<Secp256k1>(&self.summed_commitments, x))
            .collect();

        let mut paillier_pks = Vec::with_capacity(params.new_peers().len());
        let mut ring_pedersen = Vec::with_capacity(params.new_peers().len());
        for idx in params.new_indices() {
            if idx == self.context.me() {
                let pre_params = self
                    .context
                    .pre_params
                    .as_ref()
                    .expect("a new member has pre-params");
                paillier_pks.push(pre_params.paillier_sk.public_key().clone());
                ring_pedersen.push(pre_params.ring_pedersen.clone());
            } else {
                let payload = self
                    .new_paillier
                    .get(idx.as_usize())
                    .ok_or_else(|| FinalizeError::Internal("missing Paillier material".into()))?;
                paillier_pks.push(payload.paillier_pk.clone());
                ring_pedersen.push(payload.ring_pedersen.clone());
            }
        }

        let save = LocalSaveData::new_checked(
            params.new_threshold(),
            params.new_peers().clone(),
            PartyIdx::from_usize(new_position),
            self.public_key,
            public_shares,
            vec![self.summed_commitments.clone()],
            paillier_pks,
            ring_pedersen,
            self.context
                .pre_params
                .as_ref()
                .expect("a new member has pre-params")
                .paillier_sk
                .clone(),
            secret_share,
        )
        .map_err(|err| FinalizeError::Internal(err.to_string()))?;

        Ok(FinalizeSuccess::Result(Some(save)))
    }
}

#[cfg(test)]
mod tests {
    use rand_core::{OsRng, RngCore};

    use super::super::keygen::tests::{run_keygen, test_pre_params};
    use super::*;
    use crate::party::round::test_helpers::{assert_next_round, assert_result, step};
    use crate::party::{PartyID, PeerContext};

    #[test]
    fn reshare_preserves_the_public_key() {
        let saves = run_keygen(3, 1);
        let public_key = *saves[0].public_key();

        let old_parties: Vec<PartyID> = saves[0].parties().iter().cloned().collect();
        let old_peers = PeerContext::new(old_parties.clone()).unwrap();
        // The new committee keeps one old member and adds two fresh ones.
        let new_parties: Vec<PartyID> = vec![
            old_parties[0].clone(),
            PartyID::new("party-8", "P8", 8u64.into()),
            PartyID::new("party-9", "P9", 9u64.into()),
        ];
        let new_peers = PeerContext::new(new_parties.clone()).unwrap();

        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let pre_params = test_pre_params(7);

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
                let params = ReSharingParameters::new::<Secp256k1>(
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
                let pre = new_peers
                    .index_of(member)
                    .map(|idx| pre_params[4 + idx.as_usize()].clone());
                Round1::new(&mut OsRng, &seed, (params, old_save, pre)).unwrap()
            })
            .collect();

        let r2 = assert_next_round(step(&mut OsRng, r1).unwrap()).unwrap();
        let r3a = assert_next_round(step(&mut OsRng, r2).unwrap()).unwrap();
        let r3b = assert_next_round(step(&mut OsRng, r3a).unwrap()).unwrap();
        let r4 = assert_next_round(step(&mut OsRng, r3b).unwrap()).unwrap();
        let r5 = assert_next_round(step(&mut OsRng, r4).unwrap()).unwrap();
        let outputs = assert_result(step(&mut OsRng, r5).unwrap()).unwrap();

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
        assert_eq!(new_saves.len(), 3);

        // Any new quorum interpolates back to the same key.
        let xs: Vec<Scalar> = new_saves[..2]
            .iter()
            .map(|save| save.share_x_of(save.self_index))
            .collect();
        let secret: Scalar = new_saves[..2]
            .iter()
            .enumerate()
            .map(|(position, save)| {
                lagrange_weight(&xs, position).unwrap() * save.secret_share
            })
            .sum();
        assert_eq!(secret.mul_by_generator(), public_key);
    }
}
