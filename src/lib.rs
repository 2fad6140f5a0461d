//! Threshold signatures for a set of mutually distrusting parties: joint key
//! generation, quorum signing, and committee resharing, without ever
//! materializing the private key.
//!
//! Two schemes are provided: ECDSA over secp256k1 (the GG18 protocol family,
//! built on Paillier-based MtA conversions) and Ed25519 (threshold Schnorr,
//! RFC 8032 compatible). Each protocol is driven through the same
//! message-based [`Party`] state machine; the embedder supplies
//! authenticated point-to-point channels, reliable broadcast and the session
//! scoping (see the `party` module docs for the transport contract).

pub mod curve;
pub mod ecdsa;
pub mod eddsa;
pub mod mta;
pub mod paillier;
pub mod party;
pub mod sigma;
mod signature;
mod tools;
pub mod vss;

pub use party::{
    Error, ErrorKind, MessageRouting, OutgoingMessage, Parameters, Party, PartyID, PartyIdx,
    PeerContext, ReSharingParameters, DEFAULT_TYPE_URL_PREFIX,
};
pub use signature::SignatureData;

pub use curve25519_dalek;
pub use k256;
pub use num_bigint_dig;
