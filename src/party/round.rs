//! The generic round contract.
//!
//! Every protocol is a chain of round objects. A round emits this party's
//! outbound messages once, validates inbound messages as they arrive
//! (naming the sender on failure), and finalizes into the next round or the
//! protocol result once every expected sender has been heard from.

use core::marker::PhantomData;

use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use super::id::PartyIdx;
use crate::tools::collections::Payloads;

/// Typed outbound messages of one round.
pub(crate) enum ToSendTyped<M> {
    Broadcast(M),
    Direct(Vec<(PartyIdx, M)>),
    /// This party has no sending role in the round (resharing committees).
    Nothing,
}

/// Serialized outbound messages of one round.
pub(crate) enum ToSendSerialized {
    Broadcast(Box<[u8]>),
    Direct(Vec<(PartyIdx, Box<[u8]>)>),
    Nothing,
}

/// A failure while constructing the first round (bad inputs).
#[derive(Debug, Clone)]
pub(crate) struct InitError(pub(crate) String);

/// A message failed this round's semantic checks; the sender is the culprit.
#[derive(Debug, Clone)]
pub(crate) struct ReceiveError(pub(crate) String);

/// A failure while finalizing a round.
#[derive(Debug, Clone)]
pub(crate) enum FinalizeError {
    /// Peer-attributable misbehaviour discovered at the end of the round.
    Validation {
        reason: String,
        culprits: Vec<PartyIdx>,
    },
    /// A bug, or byzantine behaviour that slipped past the proof checks.
    Internal(String),
}

/// A stage-level receive failure, mapped to the session error taxonomy by the
/// driver.
#[derive(Debug, Clone)]
pub(crate) enum ReceiveFault {
    UnexpectedSender,
    Duplicate,
    Deserialization(String),
    Validation(String),
}

#[derive(Debug)]
pub(crate) enum FinalizeSuccess<R: Round> {
    AnotherRound(R::NextRound),
    Result(R::Result),
}

pub(crate) trait Round: Sized + Send + 'static {
    type Message: Serialize + for<'de> Deserialize<'de>;
    type Payload: Send + 'static;
    type NextRound: Round<Result = Self::Result>;
    type Result;

    const ROUND_NUM: u8;
    /// The type-URL schema suffix of this round's message.
    const MESSAGE_NAME: &'static str;
    /// Whether this round's messages use broadcast routing (`false` for
    /// point-to-point rounds).
    const BROADCAST: bool;

    fn num_parties(&self) -> usize;
    fn party_idx(&self) -> PartyIdx;

    /// The senders this round waits for. Defaults to every peer.
    fn expecting(&self) -> Vec<PartyIdx> {
        all_but(self.num_parties(), self.party_idx())
    }

    fn to_send(&self, rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message>;

    fn verify_received(
        &self,
        from: PartyIdx,
        msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError>;

    fn finalize(
        self,
        rng: &mut dyn CryptoRngCore,
        payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError>;
}

/// The entry round of a protocol, constructed from the caller's inputs.
pub(crate) trait FirstRound: Round {
    type Context;

    fn new(
        rng: &mut dyn CryptoRngCore,
        shared_randomness: &[u8],
        context: Self::Context,
    ) -> Result<Self, InitError>;
}

pub(crate) fn all_but(num_parties: usize, me: PartyIdx) -> Vec<PartyIdx> {
    (0..num_parties)
        .map(PartyIdx::from_usize)
        .filter(|idx| idx != &me)
        .collect()
}

/// The terminal link of a round chain; never instantiated.
pub(crate) struct NonExistent<Res>(PhantomData<Res>);

impl<Res: Send + 'static> Round for NonExistent<Res> {
    type Message = ();
    type Payload = ();
    type NextRound = Self;
    type Result = Res;

    const ROUND_NUM: u8 = 0;
    const MESSAGE_NAME: &'static str = "";
    const BROADCAST: bool = true;

    fn num_parties(&self) -> usize {
        0
    }

    fn party_idx(&self) -> PartyIdx {
        PartyIdx::from_usize(0)
    }

    fn to_send(&self, _rng: &mut dyn CryptoRngCore) -> ToSendTyped<Self::Message> {
        ToSendTyped::Nothing
    }

    fn verify_received(
        &self,
        _from: PartyIdx,
        _msg: Self::Message,
    ) -> Result<Self::Payload, ReceiveError> {
        Err(ReceiveError("message for a non-existent round".into()))
    }

    fn finalize(
        self,
        _rng: &mut dyn CryptoRngCore,
        _payloads: Payloads<Self::Payload>,
    ) -> Result<FinalizeSuccess<Self>, FinalizeError> {
        Err(FinalizeError::Internal(
            "finalizing a non-existent round".into(),
        ))
    }
}

pub(crate) fn serialize_message(message: &impl Serialize) -> Result<Box<[u8]>, String> {
    rmp_serde::encode::to_vec(message)
        .map(|serialized| serialized.into_boxed_slice())
        .map_err(|err| err.to_string())
}

pub(crate) fn deserialize_message<M: for<'de> Deserialize<'de>>(
    message_bytes: &[u8],
) -> Result<M, String> {
    rmp_serde::decode::from_slice(message_bytes).map_err(|err| err.to_string())
}

/// A round together with its receive accumulator.
pub(crate) struct Stage<R: Round> {
    round: R,
    payloads: Payloads<R::Payload>,
    sent: bool,
}

impl<R: Round> Stage<R> {
    pub fn new(round: R) -> Self {
        Self {
            round,
            payloads: Payloads::new(),
            sent: false,
        }
    }

    pub fn to_send(&mut self, rng: &mut dyn CryptoRngCore) -> Result<ToSendSerialized, String> {
        if self.sent {
            return Err("the round's messages were already emitted".into());
        }
        self.sent = true;
        Ok(match self.round.to_send(rng) {
            ToSendTyped::Broadcast(message) => {
                ToSendSerialized::Broadcast(serialize_message(&message)?)
            }
            ToSendTyped::Direct(messages) => {
                let mut serialized = Vec::with_capacity(messages.len());
                for (idx, message) in messages.into_iter() {
                    serialized.push((idx, serialize_message(&message)?));
                }
                ToSendSerialized::Direct(serialized)
            }
            ToSendTyped::Nothing => ToSendSerialized::Nothing,
        })
    }

    pub fn receive(&mut self, from: PartyIdx, message_bytes: &[u8]) -> Result<(), ReceiveFault> {
        if !self.round.expecting().contains(&from) {
            return Err(ReceiveFault::UnexpectedSender);
        }
        if self.payloads.contains(from.as_usize()) {
            return Err(ReceiveFault::Duplicate);
        }
        let message: R::Message =
            deserialize_message(message_bytes).map_err(ReceiveFault::Deserialization)?;
        let payload = self
            .round
            .verify_received(from, message)
            .map_err(|ReceiveError(reason)| ReceiveFault::Validation(reason))?;
        self.payloads
            .insert(from.as_usize(), payload)
            .expect("uniqueness checked above");
        Ok(())
    }

    pub fn can_finalize(&self) -> bool {
        self.round
            .expecting()
            .iter()
            .all(|idx| self.payloads.contains(idx.as_usize()))
    }

    pub fn waiting_for(&self) -> Vec<PartyIdx> {
        self.round
            .expecting()
            .into_iter()
            .filter(|idx| !self.payloads.contains(idx.as_usize()))
            .collect()
    }

    pub fn finalize(
        self,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<FinalizeSuccess<R>, FinalizeError> {
        if !self.can_finalize() {
            return Err(FinalizeError::Internal(
                "messages from some of the parties are missing".into(),
            ));
        }
        self.round.finalize(rng, self.payloads)
    }
}

/// Object-safe view of a [`Stage`], letting the session driver walk a round
/// chain without knowing the concrete round types.
pub(crate) trait DynRound<Res>: Send {
    fn round_num(&self) -> u8;
    fn message_name(&self) -> &'static str;
    fn broadcast_round(&self) -> bool;
    fn to_send(&mut self, rng: &mut dyn CryptoRngCore) -> Result<ToSendSerialized, String>;
    fn receive(&mut self, from: PartyIdx, message_bytes: &[u8]) -> Result<(), ReceiveFault>;
    fn can_finalize(&self) -> bool;
    fn waiting_for(&self) -> Vec<PartyIdx>;
    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<DynFinalize<Res>, FinalizeError>;
}

pub(crate) enum DynFinalize<Res> {
    AnotherRound(Box<dyn DynRound<Res>>),
    Result(Res),
}

impl<R: Round> DynRound<R::Result> for Stage<R> {
    fn round_num(&self) -> u8 {
        R::ROUND_NUM
    }

    fn message_name(&self) -> &'static str {
        R::MESSAGE_NAME
    }

    fn broadcast_round(&self) -> bool {
        R::BROADCAST
    }

    fn to_send(&mut self, rng: &mut dyn CryptoRngCore) -> Result<ToSendSerialized, String> {
        Stage::to_send(self, rng)
    }

    fn receive(&mut self, from: PartyIdx, message_bytes: &[u8]) -> Result<(), ReceiveFault> {
        Stage::receive(self, from, message_bytes)
    }

    fn can_finalize(&self) -> bool {
        Stage::can_finalize(self)
    }

    fn waiting_for(&self) -> Vec<PartyIdx> {
        Stage::waiting_for(self)
    }

    fn finalize(
        self: Box<Self>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<DynFinalize<R::Result>, FinalizeError> {
        match Stage::finalize(*self, rng)? {
            FinalizeSuccess::AnotherRound(next) => {
                Ok(DynFinalize::AnotherRound(Box::new(Stage::new(next))))
            }
            FinalizeSuccess::Result(result) => Ok(DynFinalize::Result(result)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    //! Drives one round across a set of in-process parties, including the
    //! serialization path, for protocol unit tests.

    use super::*;

    pub(crate) fn step<R: Round>(
        rng: &mut dyn CryptoRngCore,
        rounds: Vec<R>,
    ) -> Result<Vec<FinalizeSuccess<R>>, String> {
        let mut stages: Vec<Stage<R>> = rounds.into_iter().map(Stage::new).collect();
        let indices: Vec<PartyIdx> = stages.iter().map(|stage| stage.round.party_idx()).collect();

        let mut deliveries: Vec<(PartyIdx, PartyIdx, Box<[u8]>)> = Vec::new();
        for (position, stage) in stages.iter_mut().enumerate() {
            let from = indices[position];
            match stage.to_send(rng)? {
                ToSendSerialized::Broadcast(message) => {
                    for target in indices.iter().filter(|idx| **idx != from) {
                        deliveries.push((from, *target, message.clone()));
                    }
                }
                ToSendSerialized::Direct(messages) => {
                    for (target, message) in messages {
                        deliveries.push((from, target, message));
                    }
                }
                ToSendSerialized::Nothing => {}
            }
        }

        for (from, target, message) in deliveries {
            let position = indices
                .iter()
                .position(|idx| *idx == target)
                .ok_or("message addressed outside the test set")?;
            let stage = &mut stages[position];
            if !stage.round.expecting().contains(&from) {
                continue;
            }
            stage
                .receive(from, &message)
                .map_err(|fault| format!("{fault:?}"))?;
        }

        stages
            .into_iter()
            .map(|stage| stage.finalize(rng).map_err(|err| format!("{err:?}")))
            .collect()
    }

    pub(crate) fn assert_next_round<R: Round>(
        outcomes: Vec<FinalizeSuccess<R>>,
    ) -> Result<Vec<R::NextRound>, String> {
        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                FinalizeSuccess::AnotherRound(round) => Ok(round),
                FinalizeSuccess::Result(_) => Err("expected another round, got a result".into()),
            })
            .collect()
    }

    pub(crate) fn assert_result<R: Round>(
        outcomes: Vec<FinalizeSuccess<R>>,
    ) -> Result<Vec<R::Result>, String> {
        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                FinalizeSuccess::Result(result) => Ok(result),
                FinalizeSuccess::AnotherRound(_) => Err("expected a result, got another round".into()),
            })
            .collect()
    }
}
