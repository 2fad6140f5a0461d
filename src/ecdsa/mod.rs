//! Threshold ECDSA over secp256k1 (the GG18 protocol family): dealerless key
//! generation, quorum signing via Paillier-based MtA, and committee
//! resharing.

pub mod keygen;
mod preparams;
pub mod resharing;
pub mod signing;

use num_bigint_dig::BigUint;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

pub use preparams::{LocalPreParams, PAILLIER_MODULUS_BITS};

use crate::curve::secp256k1::{Point, Scalar};
use crate::paillier;
use crate::party::{Error, PartyID, PartyIdx, PeerContext};
use crate::sigma::RingPedersenParams;
use crate::vss;

/// Binary format tag of the persisted save-data. Save-data from before the
/// Paillier factors were persisted cannot support the factorization proofs;
/// such blobs are rejected and require a fresh keygen or resharing.
const SAVE_DATA_FORMAT: u8 = 1;

/// Everything a party persists after keygen or resharing, and needs to sign.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalSaveData {
    format: u8,
    pub(crate) threshold: usize,
    /// The participant set bound at keygen time.
    pub(crate) parties: PeerContext,
    pub(crate) self_index: PartyIdx,
    /// The joint public key.
    pub(crate) public_key: Point,
    /// Every party's public share `X_j`.
    pub(crate) public_shares: Vec<Point>,
    /// The Feldman commitment vectors from the dealing phase (one per dealer
    /// at keygen; the summed vector after a resharing).
    pub(crate) vss_commitments: Vec<Vec<Point>>,
    /// Every party's Paillier public key.
    pub(crate) paillier_pks: Vec<paillier::PublicKey>,
    /// Every party's ring-Pedersen auxiliaries.
    pub(crate) ring_pedersen: Vec<RingPedersenParams>,
    /// This party's Paillier secret key.
    pub(crate) paillier_sk: paillier::SecretKey,
    /// This party's additive share of the private key.
    pub(crate) secret_share: Scalar,
}

impl LocalSaveData {
    pub fn public_key(&self) -> &Point {
        &self.public_key
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

    /// The stable opaque encoding for persistence.
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
        paillier_pks: Vec<paillier::PublicKey>,
        ring_pedersen: Vec<RingPedersenParams>,
        paillier_sk: paillier::SecretKey,
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
            paillier_pks,
            ring_pedersen,
            paillier_sk,
            secret_share,
        };
        data.verify_consistency()?;
        Ok(data)
    }

    /// The final self-consistency check of keygen: this party's share must
    /// open its own public share, which in turn must belong to the published
    /// public key.
    fn verify_consistency(&self) -> Result<(), Error> {
        use crate::curve::Scalar as _;
        let n = self.parties.len();
        if self.public_shares.len() != n
            || self.paillier_pks.len() != n
            || self.ring_pedersen.len() != n
            || self.self_index.as_usize() >= n
        {
            return Err(Error::internal("save-data is inconsistent with the party set"));
        }
        if self.secret_share.mul_by_generator() != self.public_shares[self.self_index.as_usize()] {
            return Err(Error::internal(
                "secret share does not open this party's public share",
            ));
        }
        Ok(())
    }

    pub(crate) fn share_x_of(&self, index: PartyIdx) -> Scalar {
        use crate::curve::Scalar as _;
        let party = self.parties.get(index).expect("index bound by party set");
        Scalar::from_biguint(party.key())
    }

    pub(crate) fn index_of_key(&self, key: &BigUint) -> Option<PartyIdx> {
        self.parties.index_of_key(key)
    }
}

impl Drop for LocalSaveData {
    fn drop(&mut self) {
        self.secret_share.zeroize();
        // The Paillier secret wipes itself.
    }
}

/// Lagrange-weights a quorum's shares into additive form; shared by the
/// signing and resharing protocols.
pub(crate) fn lagrange_weight(
    quorum_xs: &[Scalar],
    position: usize,
) -> Result<Scalar, Error> {
    vss::lagrange_coefficient::<crate::curve::Secp256k1>(quorum_xs, position)
        .ok_or_else(|| Error::configuration("quorum x-coordinates are not distinct"))
}
