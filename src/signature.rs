//! Finalized signatures, encoded for standard verifiers.

use serde::{Deserialize, Serialize};

use crate::curve::ed25519;
use crate::curve::secp256k1;

/// A finalized threshold signature.
///
/// For ECDSA, `r`/`s` are 32-byte big-endian scalars (`s` normalized to the
/// low half of the order), `signature` is `r ‖ s`, `recovery_id` identifies
/// the nonce point, and `message` is the 32-byte message hash that was
/// signed. For EdDSA, `r` is the compressed nonce point, `s` the little-
/// endian scalar, `signature` the 64-byte RFC 8032 form, and `message` the
/// raw signed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureData {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
    pub signature: Vec<u8>,
    pub recovery_id: Option<u8>,
    pub message: Vec<u8>,
}

impl SignatureData {
    pub(crate) fn ecdsa(
        r: &secp256k1::Scalar,
        s: &secp256k1::Scalar,
        recovery_id: u8,
        message: &secp256k1::Scalar,
    ) -> Self {
        let r_bytes = r.to_be_bytes().to_vec();
        let s_bytes = s.to_be_bytes().to_vec();
        let mut signature = r_bytes.clone();
        signature.extend_from_slice(&s_bytes);
        Self {
            r: r_bytes,
            s: s_bytes,
            signature,
            recovery_id: Some(recovery_id),
            message: message.to_be_bytes().to_vec(),
        }
    }

    pub(crate) fn eddsa(r: &ed25519::Point, s: &ed25519::Scalar, message: Vec<u8>) -> Self {
        let r_bytes = r.to_compressed_bytes().to_vec();
        let s_bytes = s.to_le_bytes().to_vec();
        let mut signature = r_bytes.clone();
        signature.extend_from_slice(&s_bytes);
        Self {
            r: r_bytes,
            s: s_bytes,
            signature,
            recovery_id: None,
            message,
        }
    }
}
