//! Session parameters, validated at construction.

use super::error::Error;
use super::id::{PartyID, PartyIdx, PeerContext};
use crate::curve::{Curve, Scalar};

fn check_share_xs<C: Curve>(peers: &PeerContext) -> Result<(), Error> {
    // Party keys reduce into the scalar field as Shamir x-coordinates; the
    // reductions must stay distinct and non-zero.
    let mut xs: Vec<C::Scalar> = Vec::with_capacity(peers.len());
    for party in peers.iter() {
        let x = C::Scalar::from_biguint(party.key());
        if x.is_zero() {
            return Err(Error::configuration(format!(
                "party {:?}: key reduces to zero in the scalar field",
                party.id()
            )));
        }
        if xs.contains(&x) {
            return Err(Error::configuration(format!(
                "party {:?}: key collides in the scalar field",
                party.id()
            )));
        }
        xs.push(x);
    }
    Ok(())
}

fn check_threshold(threshold: usize, party_count: usize) -> Result<(), Error> {
    if threshold + 1 > party_count {
        return Err(Error::configuration(format!(
            "threshold {threshold} needs {} cooperating parties but only {party_count} exist",
            threshold + 1,
        )));
    }
    Ok(())
}

/// Parameters of a keygen or signing session: the ordered peer context, this
/// party's identity, and the threshold `t` (any `t + 1` can sign).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    peers: PeerContext,
    self_id: PartyID,
    self_index: PartyIdx,
    threshold: usize,
}

impl Parameters {
    pub fn new<C: Curve>(
        peers: PeerContext,
        self_id: PartyID,
        threshold: usize,
    ) -> Result<Self, Error> {
        check_threshold(threshold, peers.len())?;
        check_share_xs::<C>(&peers)?;
        let self_index = peers
            .index_of(&self_id)
            .ok_or_else(|| Error::configuration("own party id is not in the peer context"))?;
        Ok(Self {
            peers,
            self_id,
            self_index,
            threshold,
        })
    }

    pub fn peers(&self) -> &PeerContext {
        &self.peers
    }

    pub fn party_count(&self) -> usize {
        self.peers.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn self_id(&self) -> &PartyID {
        &self.self_id
    }

    pub fn self_index(&self) -> PartyIdx {
        self.self_index
    }

    /// The Shamir x-coordinates of all parties, in context order.
    pub(crate) fn share_xs<C: Curve>(&self) -> Vec<C::Scalar> {
        self.peers
            .iter()
            .map(|party| C::Scalar::from_biguint(party.key()))
            .collect()
    }
}

/// Parameters of a resharing session: the old committee hands the key over
/// to a possibly different new committee under a new threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReSharingParameters {
    old_peers: PeerContext,
    old_threshold: usize,
    new_peers: PeerContext,
    new_threshold: usize,
    self_id: PartyID,
    union: PeerContext,
    self_index: PartyIdx,
}

impl ReSharingParameters {
    pub fn new<C: Curve>(
        old_peers: PeerContext,
        old_threshold: usize,
        new_peers: PeerContext,
        new_threshold: usize,
        self_id: PartyID,
    ) -> Result<Self, Error> {
        check_threshold(old_threshold, old_peers.len())?;
        check_threshold(new_threshold, new_peers.len())?;
        check_share_xs::<C>(&old_peers)?;
        check_share_xs::<C>(&new_peers)?;
        let union = old_peers.union(&new_peers)?;
        let self_index = union
            .index_of(&self_id)
            .ok_or_else(|| Error::configuration("own party id is in neither committee"))?;
        Ok(Self {
            old_peers,
            old_threshold,
            new_peers,
            new_threshold,
            self_id,
            union,
            self_index,
        })
    }

    pub fn old_peers(&self) -> &PeerContext {
        &self.old_peers
    }

    pub fn new_peers(&self) -> &PeerContext {
        &self.new_peers
    }

    pub fn old_threshold(&self) -> usize {
        self.old_threshold
    }

    pub fn new_threshold(&self) -> usize {
        self.new_threshold
    }

    pub fn self_id(&self) -> &PartyID {
        &self.self_id
    }

    /// The wire-level session context: both committees merged and ordered.
    pub fn union(&self) -> &PeerContext {
        &self.union
    }

    pub fn self_index(&self) -> PartyIdx {
        self.self_index
    }

    pub fn is_old_member(&self) -> bool {
        self.old_peers.contains(&self.self_id)
    }

    pub fn is_new_member(&self) -> bool {
        self.new_peers.contains(&self.self_id)
    }

    /// Union indices of the old committee, in old-committee order.
    pub(crate) fn old_indices(&self) -> Vec<PartyIdx> {
        self.old_peers
            .iter()
            .map(|party| self.union.index_of(party).expect("union is a superset"))
            .collect()
    }

    /// Union indices of the new committee, in new-committee order.
    pub(crate) fn new_indices(&self) -> Vec<PartyIdx> {
        self.new_peers
            .iter()
            .map(|party| self.union.index_of(party).expect("union is a superset"))
            .collect()
    }

    /// This party's position within the old committee, when a member.
    pub(crate) fn old_position(&self) -> Option<usize> {
        self.old_peers
            .index_of(&self.self_id)
            .map(PartyIdx::as_usize)
    }

    /// This party's position within the new committee, when a member.
    pub(crate) fn new_position(&self) -> Option<usize> {
        self.new_peers
            .index_of(&self.self_id)
            .map(PartyIdx::as_usize)
    }

    pub(crate) fn new_share_xs<C: Curve>(&self) -> Vec<C::Scalar> {
        self.new_peers
            .iter()
            .map(|party| C::Scalar::from_biguint(party.key()))
            .collect()
    }

    pub(crate) fn old_share_xs<C: Curve>(&self) -> Vec<C::Scalar> {
        self.old_peers
            .iter()
            .map(|party| C::Scalar::from_biguint(party.key()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use num_bigint_dig::BigUint;

    use super::*;
    use crate::curve::Secp256k1;

    fn party(id: &str, key: u64) -> PartyID {
        PartyID::new(id, format!("party-{id}"), BigUint::from(key))
    }

    fn context(ids: &[(&str, u64)]) -> PeerContext {
        PeerContext::new(ids.iter().map(|(id, key)| party(id, *key)).collect()).unwrap()
    }

    #[test]
    fn validates_threshold() {
        let peers = context(&[("a", 1), ("b", 2), ("c", 3)]);
        assert!(Parameters::new::<Secp256k1>(peers.clone(), party("a", 1), 2).is_ok());
        assert!(Parameters::new::<Secp256k1>(peers.clone(), party("a", 1), 3).is_err());
        assert!(Parameters::new::<Secp256k1>(peers, party("x", 9), 1).is_err());
    }

    #[test]
    fn resharing_roles() {
        let old = context(&[("a", 1), ("b", 2), ("c", 3)]);
        let new = context(&[("c", 3), ("d", 4)]);
        let params = ReSharingParameters::new::<Secp256k1>(
            old.clone(),
            1,
            new.clone(),
            1,
            party("c", 3),
        )
        .unwrap();
        assert!(params.is_old_member() && params.is_new_member());
        assert_eq!(params.union().len(), 4);
        assert_eq!(params.old_indices().len(), 3);
        assert_eq!(params.new_indices().len(), 2);

        let old_only =
            ReSharingParameters::new::<Secp256k1>(old, 1, new, 1, party("a", 1)).unwrap();
        assert!(old_only.is_old_member() && !old_only.is_new_member());
        assert_eq!(old_only.new_position(), None);
    }
}
