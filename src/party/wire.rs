//! The outer wire format: a typed-binary wrapper around round payloads.
//!
//! The wrapper fields are stable: sender key bytes, optional recipient key
//! bytes, the broadcast flag, a type-URL string identifying the payload
//! schema, and the payload itself. The type-URL prefix is deployment
//! configuration; receivers match on the schema suffix only.

use serde::{Deserialize, Serialize};

use super::id::PartyID;

/// The default type-URL prefix: `<organization>.tsslib`.
pub const DEFAULT_TYPE_URL_PREFIX: &str = "apella.tsslib";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MessageWrapper {
    pub sender: Vec<u8>,
    pub recipients: Option<Vec<Vec<u8>>>,
    pub is_broadcast: bool,
    pub type_url: String,
    pub payload: Vec<u8>,
}

impl MessageWrapper {
    pub fn encode(&self) -> Result<Box<[u8]>, String> {
        rmp_serde::encode::to_vec(self)
            .map(|bytes| bytes.into_boxed_slice())
            .map_err(|err| err.to_string())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        rmp_serde::decode::from_slice(bytes).map_err(|err| err.to_string())
    }
}

pub(crate) fn full_type_url(prefix: &str, suffix: &str) -> String {
    format!("{prefix}.{suffix}")
}

/// Prefix-tolerant matching: deployments may use different organization
/// prefixes as long as the schema suffix agrees.
pub(crate) fn type_url_matches(url: &str, suffix: &str) -> bool {
    url == suffix
        || (url.len() > suffix.len()
            && url.ends_with(suffix)
            && url.as_bytes()[url.len() - suffix.len() - 1] == b'.')
}

/// Routing information accompanying an outgoing wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRouting {
    pub from: PartyID,
    /// `None` for broadcast (all peers), a recipient list otherwise.
    pub to: Option<Vec<PartyID>>,
    pub is_broadcast: bool,
}

/// A wire message produced by this party, ready for the transport.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub routing: MessageRouting,
    pub wire_bytes: Box<[u8]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_roundtrip() {
        let wrapper = MessageWrapper {
            sender: vec![1, 2, 3],
            recipients: Some(vec![vec![4], vec![5, 6]]),
            is_broadcast: false,
            type_url: full_type_url(DEFAULT_TYPE_URL_PREFIX, "ECDSAKeygen.Round1"),
            payload: vec![0, 0, 7],
        };
        let bytes = wrapper.encode().unwrap();
        assert_eq!(MessageWrapper::decode(&bytes).unwrap(), wrapper);
    }

    #[test]
    fn suffix_matching_tolerates_prefixes() {
        assert!(type_url_matches(
            "apella.tsslib.ECDSAKeygen.Round1",
            "ECDSAKeygen.Round1"
        ));
        assert!(type_url_matches(
            "example.org.tss.ECDSAKeygen.Round1",
            "ECDSAKeygen.Round1"
        ));
        assert!(type_url_matches("ECDSAKeygen.Round1", "ECDSAKeygen.Round1"));
        assert!(!type_url_matches(
            "apella.tsslib.ECDSAKeygen.Round12",
            "ECDSAKeygen.Round1"
        ));
        assert!(!type_url_matches(
            "apella.tsslib.XECDSAKeygen.Round1",
            "ECDSAKeygen.Round1"
        ));
        assert!(!type_url_matches(
            "apella.tsslib.EdDSAKeygen.Round1",
            "ECDSAKeygen.Round1"
        ));
    }
}
