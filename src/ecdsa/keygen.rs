//! Distributed ECDSA key generation.
//!
//! Wire rounds: hash commitment + Paillier material (broadcast), VSS share +
//! factorization proof (direct) and decommitment (broadcast), then a Schnorr
//! proof of the final share. No party ever learns the private key.

use num_bigint_dig::BigUint;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{LocalPreParams, LocalSaveData, PAILLIER_MODULUS_BITS};
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
use crate::party::{Parameters, PeerContext};
use crate::sigma::blum::BlumModProof;
use crate::sigma::fac::FacProof;
use crate::sigma::sch::{SchCommitment, SchProof, SchSecret};
use crate::sigma::RingPedersenParams;
use crate::tools::collections::{HoleVec, Payloads};
use crate::tools::hashing::{Chain, Decommitment, Hash, HashCommitment, HashableSlice};
use crate::vss;

const PROTOCOL: &str = "ecdsa-keygen";

pub(crate) const ROUND_NAMES: &[&str] = &[
    "ECDSAKeygen.KGRound1Message",
    "ECDSAKeygen.KGRound2Message1",
    "ECDSAKeygen.KGRound2Message2",
    "ECDSAKeygen.KGRound3Message",
];

/// Starts a key generation party over the given session.
///
/// Pre-params are generated on the spot when not supplied, which takes a
/// safe-prime search; long-running callers should generate them ahead of
/// time and pass them in.
pub fn new_party(
    rng: &mut impl CryptoRngCore,
    params: Parameters,
    pre_params: Option<LocalPreParams>,
    session_seed: &[u8],
) -> Result<Party<LocalSaveData>, Error> {
    let pre_params = match pre_params {
        Some(pre_params) => pre_params,
        None => LocalPreParams::generate(None)?,
    };
    let peers = params.peers().clone();
    let me = params.self_index();
    let round1 = Round1::new(&mut *rng, session_seed, (params, pre_params))
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
    Hash::new_with_dst(b"ecdsa-keygen-ssid")
        .chain_bytes(seed)
        .chain_bytes(Secp256k1::NAME.as_bytes())
        .chain(peers)
        .chain(&(threshold as u64))
        .finalize()
        .as_ref()
        .to_vec()
        .into_boxed_slice()
}

#[derive(Debug)]
pub(crate) struct Context {
    params: Parameters,
    pre_params: LocalPreParams,
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
    paillier_pk: PublicKey,
    ring_pedersen: RingPedersenParams,
    blum_proof: BlumModProof,
}

#[derive(Debug)]
pub(crate) struct Round1Payload {
    commitment: HashCommitment,
    paillier_pk: PublicKey,
    ring_pedersen: RingPedersenParams,
}

pub(crate) struct Round1 {
    context: Context,
    shares: Vec<Scalar>,
    vss_commitments: Vec<Point>,
    commitment: HashCommitment,
    decommitment: Decommitment,
}

impl FirstRound for Round1 {
    type Context = (Parameters, LocalPreParams);

    fn new(
        rng: &mut dyn CryptoRngCore,
        shared_randomness: &[u8],
        context: Self::Context,
    ) -> Result<Self, InitError> {
        let (params, pre_params) = context;
        if !pre_params.is_well_formed() {
            return Err(InitError(
                "pre-params do not meet the modulus size requirements".into(),
            ));
        }

        let ssid = make_ssid(shared_randomness, params.peers(), params.threshold());
        let xs = params.share_xs::<Secp256k1>();

        let mut u = Scalar::random_nonzero(&mut *rng);
        let (vss_commitments, shares) = vss::share::<Secp256k1>(
            &mut *rng,
            params.threshold(),
            &u,
            &xs,
        )
        .map_err(|err| InitError(err.to_string()))?;
        u.zeroize();

        let (commitment, decommitment) =
            HashCommitment::new(&mut *rng, &HashableSlice(&vss_commitments));

        Ok(Self {
            context: Context {
                params,
                pre_params,
                ssid,
            },
            shares,
            vss_commitments,
            commitment,
            decommitment,
        })
    }
}

impl Round for Round1 {
    type Message = Round1Bcast;
    type Payload = Round1Payload;
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

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        let blum_proof = BlumModProof::new(
            &mut *rng,
            &self.context.pre_params.paillier_sk,
            &self.context.aux(self.party_idx()),
        )
        .expect("own key has the Blum structure");
        ToSendTyped::Broadcast(Round1Bcast {
            commitment: self.commitment,
            paillier_pk: self.context.pre_params.paillier_sk.public_key().clone(),
            ring_pedersen: self.context.pre_params.ring_pedersen.clone(),
            blum_proof,
        })
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
        Ok(Round1Payload {
            commitment: msg.commitment,
            paillier_pk: msg.paillier_pk,
            ring_pedersen: msg.ring_pedersen,
        })
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
            .ok_or_else(|| FinalizeError::Internal("incomplete round 1 payloads".into()))?;

        // h1/h2 pairs must be unique across parties.
        let mut seen: Vec<(usize, &BigUint)> = vec![
            (me.as_usize(), &self.context.pre_params.ring_pedersen.h1),
            (me.as_usize(), &self.context.pre_params.ring_pedersen.h2),
        ];
        let mut culprits = Vec::new();
        for (idx, payload) in received.iter_enumerated() {
            for value in [&payload.ring_pedersen.h1, &payload.ring_pedersen.h2] {
                if seen.iter().any(|(_, existing)| *existing == value) {
                    culprits.push(PartyIdx::from_usize(idx));
                }
                seen.push((idx, value));
            }
        }
        if !culprits.is_empty() {
            culprits.sort();
            culprits.dedup();
            return Err(FinalizeError::Validation {
                reason: "h1 or h2 was already used by another party".into(),
                culprits,
            });
        }

        Ok(FinalizeSuccess::AnotherRound(Round2Shares {
            context: self.context,
            shares: self.shares,
            vss_commitments: self.vss_commitments,
            decommitment: self.decommitment,
            round1: received,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Direct {
    share: Scalar,
    fac_proof: FacProof,
}

pub(crate) struct Round2Shares {
    context: Context,
    shares: Vec<Scalar>,
    vss_commitments: Vec<Point>,
    decommitment: Decommitment,
    round1: HoleVec<Round1Payload>,
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

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        let me = self.party_idx();
        let (p, q) = self.context.pre_params.paillier_sk.primes();
        let messages = self
            .round1
            .iter_enumerated()
            .map(|(idx, payload)| {
                let fac_proof = FacProof::new(
                    &mut *rng,
                    &Secp256k1::order(),
                    p,
                    q,
                    &payload.ring_pedersen,
                    &self.context.aux(me),
                );
                (
                    PartyIdx::from_usize(idx),
                    Round2Direct {
                        share: self.shares[idx],
                        fac_proof,
                    },
                )
            })
            .collect();
        ToSendTyped::Direct(messages)
    }

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        let sender_n = self
            .round1
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("unknown sender".into()))?
            .paillier_pk
            .modulus()
            .clone();
        if !msg.fac_proof.verify(
            &Secp256k1::order(),
            &sender_n,
            &self.context.pre_params.ring_pedersen,
            &self.context.aux(from),
        ) {
            return Err(ReceiveError(
                "the factorization proof did not verify".into(),
            ));
        }
        Ok(msg.share)
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        let n = self.num_parties();
        let me = self.party_idx();
        let received_shares = payloads
            .into_hole_vec(n, me.as_usize())
            .ok_or_else(|| FinalizeError::Internal("incomplete round 2 payloads".into()))?;
        Ok(FinalizeSuccess::AnotherRound(Round2Decommit {
            context: self.context,
            shares: self.shares,
            vss_commitments: self.vss_commitments,
            decommitment: self.decommitment,
            round1: self.round1,
            received_shares,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round2Bcast {
    decommitment: Decommitment,
    vss_commitments: Vec<Point>,
}
#[derive(Debug)]

pub(crate) struct Round2Decommit {
    context: Context,
    shares: Vec<Scalar>,
    vss_commitments: Vec<Point>,
    decommitment: Decommitment,
    round1: HoleVec<Round1Payload>,
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
            .round1
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("unknown sender".into()))?
            .commitment;
        if !committed.verify(&HashableSlice(&msg.vss_commitments), &msg.decommitment) {
            return Err(ReceiveError("decommitment does not match".into()));
        }

        let my_x = self
            .context
            .params
            .share_xs::<Secp256k1>()[self.party_idx().as_usize()];
        let share = self
            .received_shares
            .get(from.as_usize())
            .ok_or_else(|| ReceiveError("missing share from this sender".into()))?;
        if !vss::verify_share::<Secp256k1>(&msg.vss_commitments, &my_x, share) {
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
        let xs = self.context.params.share_xs::<Secp256k1>();
        let public_shares: Vec<Point> = xs
            .iter()
            .map(|x| {
                all_commitments
                    .iter()
                    .map(|commitments| vss::commitment_eval::<Secp256k1>(commitments, x))
                    .sum()
            })
            .collect();

        // Fatal self-check: the accumulated share must open our public share.
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
            round1: self.round1,
        }))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct Round3Bcast {
    proof: SchProof<Secp256k1>,
}

#[derive(Debug)]
pub(crate) struct Round3 {
    context: Context,
    secret_share: Scalar,
    public_key: Point,
    public_shares: Vec<Point>,
    all_commitments: Vec<Vec<Point>>,
    round1: HoleVec<Round1Payload>,
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
        let me = self.party_idx();
        let (paillier_pks, ring_pedersen) = {
            let mut pks = Vec::with_capacity(self.num_parties());
            let mut rps = Vec::with_capacity(self.num_parties());
            let own = (
                self.context.pre_params.paillier_sk.public_key().clone(),
                self.context.pre_params.ring_pedersen.clone(),
            );
            let all = self
                .round1
                .map_ref(|payload| (payload.paillier_pk.clone(), payload.ring_pedersen.clone()))
                .into_vec(own);
            for (pk, rp) in all {
                pks.push(pk);
                rps.push(rp);
            }
            (pks, rps)
        };

        let save = LocalSaveData::new_checked(
            self.context.params.threshold(),
            self.context.params.peers().clone(),
            me,
            self.public_key,
            self.public_shares,
            self.all_commitments,
            paillier_pks,
            ring_pedersen,
            self.context.pre_params.paillier_sk.clone(),
            self.secret_share,
        )
        .map_err(|err| FinalizeError::Internal(err.to_string()))?;

        Ok(FinalizeSuccess::Result(save))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::OnceLock;

    use rand_core::{OsRng, RngCore};

    use super::*;
    use crate::party::round::test_helpers::{assert_next_round, assert_result, step};
    use crate::party::PartyID;

    pub(crate) fn test_pre_params(count: usize) -> Vec<LocalPreParams> {
        static CACHE: OnceLock<Vec<LocalPreParams>> = OnceLock::new();
        let cache = CACHE.get_or_init(|| {
            (0..7)
                .map(|_| LocalPreParams::generate_unsafe(&mut OsRng).unwrap())
                .collect()
        });
        cache[..count].to_vec()
    }

    pub(crate) fn test_params(n: usize, threshold: usize) -> Vec<Parameters> {
        let parties: Vec<PartyID> = (1..=n as u64)
            .map(|key| PartyID::new(format!("party-{key}"), format!("P{key}"), key.into()))
            .collect();
        let peers = PeerContext::new(parties.clone()).unwrap();
        parties
            .into_iter()
            .map(|party| Parameters::new::<Secp256k1>(peers.clone(), party, threshold).unwrap())
            .collect()
    }

    pub(crate) fn run_keygen(n: usize, threshold: usize) -> Vec<LocalSaveData> {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);

        let pre_params = test_pre_params(n);
        let r1: Vec<Round1> = test_params(n, threshold)
            .into_iter()
            .zip(pre_params)
            .map(|(params, pre)| Round1::new(&mut OsRng, &seed, (params, pre)).unwrap())
            .collect();

        let r2a = assert_next_round(step(&mut OsRng, r1).unwrap()).unwrap();
        let r2b = assert_next_round(step(&mut OsRng, r2a).unwrap()).unwrap();
        let r3 = assert_next_round(step(&mut OsRng, r2b).unwrap()).unwrap();
        assert_result(step(&mut OsRng, r3).unwrap()).unwrap()
    }

    #[test]
    fn execute_keygen() {
        let saves = run_keygen(3, 1);

        // All parties agree on the public key.
        assert!(saves[1..]
            .iter()
            .all(|save| save.public_key() == saves[0].public_key()));

        // Lagrange interpolation over any quorum of shares opens the key.
        for subset in [[0usize, 1], [1, 2], [0, 2]] {
            let xs: Vec<Scalar> = subset.iter().map(|&i| saves[i].share_x_of(saves[i].self_index)).collect();
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

    #[test]
    fn tampered_share_names_the_dealer() {
        // A dealt share modified in transit must be rejected at decommitment
        // time with the dealer as culprit.
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let pre_params = test_pre_params(3);
        let r1: Vec<Round1> = test_params(3, 1)
            .into_iter()
            .zip(pre_params)
            .map(|(params, pre)| Round1::new(&mut OsRng, &seed, (params, pre)).unwrap())
            .collect();

        let mut r2a = assert_next_round(step(&mut OsRng, r1).unwrap()).unwrap();
        // Party 0 deals a corrupted share to party 1.
        r2a[0].shares[1] = r2a[0].shares[1] + Scalar::ONE;

        let r2b = assert_next_round(step(&mut OsRng, r2a).unwrap()).unwrap();
        let err = step(&mut OsRng, r2b).unwrap_err();
        assert!(err.contains("VSS share is inconsistent"));
    }
}
