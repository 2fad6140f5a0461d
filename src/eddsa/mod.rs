//! Threshold Ed25519 (RFC 8032 compatible): dealerless key generation,
//! threshold Schnorr signing, and committee resharing. Same skeleton as the
//! ECDSA protocols, without the Paillier machinery.

pub mod keygen;
pub mod resharing;
pub mod signing;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::curve::ed25519::{Point, Scalar};
use crate::curve::{Ed25519, Scalar as _};
use crate::party::{Error, PartyID, PartyIdx, PeerContext};
use crate::vss;

const SAVE_DATA_FORMAT: u8 = 1;

/// Everything a party persists after keygen or resharing, and needs to sign.
#[derive(Clone, Serialize, Deserialize)]
pub struct LocalSaveData {
    format: u8,
    pub(crate) threshold: usize,
    /// The participant set bound at keygen time.
    pub(crate) parties: PeerContext,
    pub(crate) self_index: PartyIdx,
    /// The joint public key `A`.
    pub(crate) public_key: Point,
    /// Every party's public share `X_j`.
    pub(crate) public_shares: Vec<Point>,
    /// The Feldman commitment vectors from the dealing phase.
    pub(crate) vss_commitments: Vec<Vec<Point>>,
    /// This party's additive share of the private key.
    pub(crate) secret_share: Scalar,
}

impl LocalSaveData {
    pub fn public_key(&self) -> &Point {
        &self.public_key
    }

    /// The RFC 8032 public key encoding (32 bytes).
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key.to_compressed_bytes()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn parties(&self) -> &PeerContext {
        &self.parties
    }

    pub fn self_id(&self) -> &PartyID {
        self.parties
            .get(self.self_index)
            .expect("own index is valid by construction")
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rmp_serde::encode::to_vec(self).map_err(|err| Error::internal(err.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let data: Self = rmp_serde::decode::from_slice(bytes)
            .map_err(|err| Error::configuration(format!("undecodable save-data: {err}")))?;
        if data.format != SAVE_DATA_FORMAT {
            return Err(Error::configuration(
                "legacy save-data format; run a fresh keygen or resharing",
            ));
        }
        data.verify_consistency()?;
        Ok(data)
    }

    pub(crate) fn new_checked(
        threshold: usize,
        parties: PeerContext,
        self_index: PartyIdx,
        public_key: Point,
        public_shares: Vec<Point>,
        vss_commitments: Vec<Vec<Point>>,
        secret_share: Scalar,
    ) -> Result<Self, Error> {
        let data = Self {
            format: SAVE_DATA_FORMAT,
            threshold,
            parties,
            self_index,
            public_key,
            public_shares,
            vss_commitments,
            secret_share,
        };
        data.verify_consistency()?;
        Ok(data)
    }

    fn verify_consistency(&self) -> Result<(), Error> {
        if self.public_shares.len() != self.parties.len()
            || self.self_index.as_usize() >= self.parties.len()
        {
            return Err(Error::internal("save-data is inconsistent with the party set"));
        }
        if self.secret_share.mul_by_generator() != self.public_shares[self.self_index.as_usize()]
        {
            return Err(Error::internal(
                "secret share does not open this party's public share",
            ));
        }
        Ok(())
    }

    pub(crate) fn share_x_of(&self, index: PartyIdx) -> Scalar {
        let party = self.parties.get(index).expect("index bound by party set");
        Scalar::from_biguint(party.key())
    }
}

impl Drop for LocalSaveData {
    fn drop(&mut self) {
        self.secret_share.zeroize();
    }
}

pub(crate) fn lagrange_weight(quorum_xs: &[Scalar], position: usize) -> Result<Scalar, Error> {
    vss::lagrange_coefficient::<Ed25519>(quorum_xs, position)
        .ok_or_else(|| Error::configuration("quorum x-coordinates are not distinct"))
}
