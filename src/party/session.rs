//! The round-driven party state machine.
//!
//! One round is current at a time. Messages for the next round are buffered
//! and drained when the round advances; anything older, duplicated or beyond
//! the horizon names the sender. The protocol result is delivered at most
//! once, after all round state has been released.

use rand_core::CryptoRngCore;
use tracing::{debug, warn};

use super::error::{Error, ErrorKind};
use super::id::{PartyID, PartyIdx, PeerContext};
use super::round::{DynFinalize, DynRound, FinalizeError, ReceiveFault, ToSendSerialized};
use super::wire::{
    full_type_url, type_url_matches, MessageRouting, MessageWrapper, OutgoingMessage,
    DEFAULT_TYPE_URL_PREFIX,
};

/// A protocol participant, driven by the embedder's transport:
/// [`start`](Self::start) begins round 1, [`update_from_bytes`](Self::update_from_bytes)
/// feeds inbound wire messages, and [`take_output`](Self::take_output)
/// yields the result once the final round has been finalized.
pub struct Party<Res> {
    protocol: &'static str,
    peers: PeerContext,
    me: PartyIdx,
    type_url_prefix: String,
    /// Message schema suffix of each wire round, indexed by `round - 1`.
    round_names: &'static [&'static str],
    round: Option<Box<dyn DynRound<Res>>>,
    /// Messages for future rounds: `(sender, round, claimed broadcast flag,
    /// payload)`. Anything past the last round is outside the horizon.
    buffered: Vec<(PartyIdx, u8, bool, Vec<u8>)>,
    result: Option<Res>,
    started: bool,
    cancelled: bool,
}

impl<Res> Party<Res> {
    pub(crate) fn new(
        protocol: &'static str,
        peers: PeerContext,
        me: PartyIdx,
        round_names: &'static [&'static str],
        first_round: Box<dyn DynRound<Res>>,
    ) -> Self {
        Self {
            protocol,
            peers,
            me,
            type_url_prefix: DEFAULT_TYPE_URL_PREFIX.into(),
            round_names,
            round: Some(first_round),
            buffered: Vec::new(),
            result: None,
            started: false,
            cancelled: false,
        }
    }

    /// Overrides the deployment's type-URL prefix (receivers only match the
    /// schema suffix, so differing prefixes interoperate).
    pub fn with_type_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.type_url_prefix = prefix.into();
        self
    }

    pub fn party_id(&self) -> &PartyID {
        self.peers
            .get(self.me)
            .expect("own index is valid by construction")
    }

    /// The parties whose messages the current round is still missing. Used by
    /// the caller to attribute culpability on timeout.
    pub fn waiting_for(&self) -> Vec<PartyID> {
        match &self.round {
            Some(round) => round
                .waiting_for()
                .into_iter()
                .filter_map(|idx| self.peers.get(idx).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.round.is_none()
    }

    /// Delivers the protocol output. At most one call returns `Some`.
    pub fn take_output(&mut self) -> Option<Res> {
        self.result.take()
    }

    /// Cooperative cancellation: every subsequent driver call fails with
    /// [`ErrorKind::Cancelled`] and partial state is dropped on the floor.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Begins round 1 and returns this party's outbound messages.
    pub fn start(&mut self, rng: &mut dyn CryptoRngCore) -> Result<Vec<OutgoingMessage>, Error> {
        self.check_cancelled()?;
        if self.started {
            return Err(Error::internal("the session was already started"));
        }
        self.started = true;
        debug!(protocol = self.protocol, party = self.party_id().id(), "starting session");
        let mut outgoing = self.emit_current(rng)?;
        outgoing.extend(self.try_advance(rng)?);
        Ok(outgoing)
    }

    /// Decodes and dispatches one wire message. Returns the outbound messages
    /// of any rounds that became current as a result.
    pub fn update_from_bytes(
        &mut self,
        wire_bytes: &[u8],
        sender: &PartyID,
        is_broadcast: bool,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Vec<OutgoingMessage>, Error> {
        self.check_cancelled()?;
        if !self.started {
            return Err(Error::internal("update before start"));
        }

        let from = self.peers.index_of(sender).ok_or_else(|| {
            self.fault(sender, "message from a party outside the session")
        })?;
        let current = match &self.round {
            Some(round) => round.round_num(),
            None => {
                return Err(self.sequencing_fault(sender, "message for a completed session"));
            }
        };

        let wrapper = MessageWrapper::decode(wire_bytes)
            .map_err(|err| self.fault(sender, format!("undecodable wire message: {err}")))?;
        if wrapper.sender != sender.key().to_bytes_be() {
            return Err(self.fault(sender, "wire sender does not match the transport sender"));
        }
        if wrapper.is_broadcast != is_broadcast {
            return Err(self.fault(sender, "wire broadcast flag does not match the transport"));
        }
        if !wrapper.is_broadcast {
            let me = self.party_id().key().to_bytes_be();
            match &wrapper.recipients {
                Some(recipients) if recipients.iter().any(|recipient| recipient == &me) => {}
                _ => return Err(self.fault(sender, "direct message not addressed to this party")),
            }
        }

        let round_num = match self
            .round_names
            .iter()
            .position(|name| type_url_matches(&wrapper.type_url, name))
        {
            Some(position) => (position + 1) as u8,
            None => {
                return Err(self.fault(
                    sender,
                    format!("unrecognized message type {:?}", wrapper.type_url),
                ));
            }
        };

        if round_num == current {
            self.receive_current(from, sender, wrapper.is_broadcast, &wrapper.payload)?;
            self.try_advance(rng)
        } else if round_num > current && (round_num as usize) <= self.round_names.len() {
            if self
                .buffered
                .iter()
                .any(|(idx, round, _, _)| *idx == from && *round == round_num)
            {
                return Err(self.sequencing_fault(sender, "duplicate message for a future round"));
            }
            debug!(
                protocol = self.protocol,
                from = sender.id(),
                round = round_num,
                "buffering message for a future round"
            );
            self.buffered
                .push((from, round_num, wrapper.is_broadcast, wrapper.payload));
            Ok(Vec::new())
        } else {
            Err(self.sequencing_fault(
                sender,
                format!("message for round {round_num} while round {current} is current"),
            ))
        }
    }

    fn receive_current(
        &mut self,
        from: PartyIdx,
        sender: &PartyID,
        claimed_broadcast: bool,
        payload: &[u8],
    ) -> Result<(), Error> {
        let round = self.round.as_mut().expect("checked by the caller");
        if round.broadcast_round() != claimed_broadcast {
            let reason = if claimed_broadcast {
                "a per-recipient round message claims broadcast semantics"
            } else {
                "a broadcast round message claims per-recipient semantics"
            };
            return Err(Error::new(
                ErrorKind::InvalidMessage(reason.into()),
                Some(round.round_num()),
                vec![sender.clone()],
            ));
        }
        let round_num = round.round_num();
        round.receive(from, payload).map_err(|fault| {
            warn!(
                protocol = self.protocol,
                from = sender.id(),
                round = round_num,
                ?fault,
                "rejecting message"
            );
            let (kind, message) = match fault {
                ReceiveFault::UnexpectedSender => (
                    ErrorKind::Sequencing as fn(String) -> ErrorKind,
                    "message from a party with no sending role in this round".to_string(),
                ),
                ReceiveFault::Duplicate => (
                    ErrorKind::Sequencing as fn(String) -> ErrorKind,
                    "duplicate message from the same sender".to_string(),
                ),
                ReceiveFault::Deserialization(reason) => (
                    ErrorKind::InvalidMessage as fn(String) -> ErrorKind,
                    format!("undecodable round payload: {reason}"),
                ),
                ReceiveFault::Validation(reason) => {
                    (ErrorKind::InvalidMessage as fn(String) -> ErrorKind, reason)
                }
            };
            Error::new(kind(message), Some(round_num), vec![sender.clone()])
        })
    }

    /// Finalizes the current round for as long as it can proceed, emitting
    /// the messages of each newly current round and draining the buffer.
    fn try_advance(&mut self, rng: &mut dyn CryptoRngCore) -> Result<Vec<OutgoingMessage>, Error> {
        let mut outgoing = Vec::new();
        loop {
            self.check_cancelled()?;
            let can_finalize = match &self.round {
                Some(round) => round.can_finalize(),
                None => break,
            };
            if !can_finalize {
                break;
            }
            let round = self.round.take().expect("checked above");
            let round_num = round.round_num();
            match round.finalize(rng).map_err(|err| self.finalize_error(round_num, err))? {
                DynFinalize::AnotherRound(next) => {
                    let current = next.round_num();
                    debug!(
                        protocol = self.protocol,
                        party = self.party_id().id(),
                        round = current,
                        "advancing to the next round"
                    );
                    self.round = Some(next);
                    outgoing.extend(self.emit_current(rng)?);
                    let (due, later): (Vec<_>, Vec<_>) = core::mem::take(&mut self.buffered)
                        .into_iter()
                        .partition(|(_, round, _, _)| *round == current);
                    self.buffered = later;
                    for (from, _, claimed_broadcast, payload) in due {
                        let sender = self
                            .peers
                            .get(from)
                            .cloned()
                            .expect("buffered senders were validated");
                        self.receive_current(from, &sender, claimed_broadcast, &payload)?;
                    }
                }
                DynFinalize::Result(result) => {
                    debug!(
                        protocol = self.protocol,
                        party = self.party_id().id(),
                        "session finished"
                    );
                    self.result = Some(result);
                    self.round = None;
                }
            }
        }
        Ok(outgoing)
    }

    fn emit_current(&mut self, rng: &mut dyn CryptoRngCore) -> Result<Vec<OutgoingMessage>, Error> {
        let round = self.round.as_mut().expect("a round is current");
        let type_url = full_type_url(&self.type_url_prefix, round.message_name());
        let is_broadcast = round.broadcast_round();
        let to_send = round
            .to_send(rng)
            .map_err(Error::internal)?;
        let from = self.party_id().clone();
        let sender_bytes = from.key().to_bytes_be();

        Ok(match to_send {
            ToSendSerialized::Nothing => Vec::new(),
            ToSendSerialized::Broadcast(payload) => {
                let wrapper = MessageWrapper {
                    sender: sender_bytes,
                    recipients: None,
                    is_broadcast: true,
                    type_url,
                    payload: payload.into_vec(),
                };
                debug_assert!(is_broadcast);
                vec![OutgoingMessage {
                    routing: MessageRouting {
                        from,
                        to: None,
                        is_broadcast: true,
                    },
                    wire_bytes: wrapper.encode().map_err(Error::internal)?,
                }]
            }
            ToSendSerialized::Direct(messages) => {
                debug_assert!(!is_broadcast);
                let mut outgoing = Vec::with_capacity(messages.len());
                for (target, payload) in messages {
                    let recipient = self
                        .peers
                        .get(target)
                        .cloned()
                        .ok_or_else(|| Error::internal("direct message to an unknown index"))?;
                    let wrapper = MessageWrapper {
                        sender: sender_bytes.clone(),
                        recipients: Some(vec![recipient.key().to_bytes_be()]),
                        is_broadcast: false,
                        type_url: type_url.clone(),
                        payload: payload.into_vec(),
                    };
                    outgoing.push(OutgoingMessage {
                        routing: MessageRouting {
                            from: from.clone(),
                            to: Some(vec![recipient]),
                            is_broadcast: false,
                        },
                        wire_bytes: wrapper.encode().map_err(Error::internal)?,
                    });
                }
                outgoing
            }
        })
    }

    fn finalize_error(&self, round_num: u8, err: FinalizeError) -> Error {
        match err {
            FinalizeError::Validation { reason, culprits } => Error::new(
                ErrorKind::InvalidMessage(reason),
                Some(round_num),
                culprits
                    .into_iter()
                    .filter_map(|idx| self.peers.get(idx).cloned())
                    .collect(),
            ),
            FinalizeError::Internal(reason) => {
                Error::new(ErrorKind::Internal(reason), Some(round_num), Vec::new())
            }
        }
    }

    fn fault(&self, sender: &PartyID, message: impl Into<String>) -> Error {
        Error::new(
            ErrorKind::InvalidMessage(message.into()),
            self.round.as_ref().map(|round| round.round_num()),
            vec![sender.clone()],
        )
    }

    fn sequencing_fault(&self, sender: &PartyID, message: impl Into<String>) -> Error {
        Error::new(
            ErrorKind::Sequencing(message.into()),
            self.round.as_ref().map(|round| round.round_num()),
            vec![sender.clone()],
        )
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancelled {
            Err(Error::cancelled())
        } else {
            Ok(())
        }
    }
}
