//! The session-level error taxonomy. Any error escaping a round carries the
//! round number and the culprits it names; a named culprit makes the session
//! fatal.

use core::fmt;

use super::id::PartyID;

#[derive(Debug, Clone, PartialEq, Eq, displaydoc::Display)]
pub enum ErrorKind {
    /// invalid protocol configuration: {0}
    Configuration(String),
    /// message validation failed: {0}
    InvalidMessage(String),
    /// protocol sequencing violation: {0}
    Sequencing(String),
    /// resource budget exhausted: {0}
    ResourceExhausted(String),
    /// internal invariant violated: {0}
    Internal(String),
    /// session cancelled by the caller
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    round: Option<u8>,
    culprits: Vec<PartyID>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, round: Option<u8>, culprits: Vec<PartyID>) -> Self {
        Self {
            kind,
            round,
            culprits,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration(message.into()), None, Vec::new())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()), None, Vec::new())
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, None, Vec::new())
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The round the error escaped from, when attributable to one.
    pub fn round(&self) -> Option<u8> {
        self.round
    }

    /// The parties responsible for the failure. Empty for configuration and
    /// internal errors.
    pub fn culprits(&self) -> &[PartyID] {
        &self.culprits
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.round {
            Some(round) => write!(f, "round {}: {}", round, self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }
        if !self.culprits.is_empty() {
            let ids: Vec<&str> = self.culprits.iter().map(|party| party.id()).collect();
            write!(f, " (culprits: {})", ids.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
