//! Party identities and the ordered peer context.

use core::cmp::Ordering;

use num_bigint_dig::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::error::Error;
use crate::tools::hashing::{Chain, Hashable};

/// A stable, externally assigned party identity. The `key` doubles as the
/// Shamir evaluation x-coordinate and as the sort key for the session
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyID {
    id: String,
    moniker: String,
    key: BigUint,
}

impl PartyID {
    pub fn new(id: impl Into<String>, moniker: impl Into<String>, key: BigUint) -> Self {
        Self {
            id: id.into(),
            moniker: moniker.into(),
            key,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    pub fn key(&self) -> &BigUint {
        &self.key
    }
}

impl Ord for PartyID {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for PartyID {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hashable for PartyID {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest
            .chain_bytes(self.id.as_bytes())
            .chain(&self.key)
    }
}

/// A participant's position in the session ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyIdx(u16);

impl PartyIdx {
    pub fn from_usize(value: usize) -> Self {
        Self(value as u16)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Hashable for PartyIdx {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain(&(self.0 as u64))
    }
}

/// The ordered list of parties participating in a session. Ordering is total
/// and stable: ascending by key; indices used throughout the protocols are
/// positions in this list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerContext {
    parties: Vec<PartyID>,
}

impl PeerContext {
    pub fn new(mut parties: Vec<PartyID>) -> Result<Self, Error> {
        if parties.is_empty() {
            return Err(Error::configuration("empty peer context"));
        }
        parties.sort();
        for window in parties.windows(2) {
            if window[0].id() == window[1].id() {
                return Err(Error::configuration(format!(
                    "duplicate party id {:?}",
                    window[0].id()
                )));
            }
            if window[0].key() == window[1].key() {
                return Err(Error::configuration(format!(
                    "duplicate party key for ids {:?} and {:?}",
                    window[0].id(),
                    window[1].id()
                )));
            }
        }
        if parties.iter().any(|party| party.key().is_zero()) {
            return Err(Error::configuration("party key must be non-zero"));
        }
        Ok(Self { parties })
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartyID> {
        self.parties.iter()
    }

    pub fn get(&self, index: PartyIdx) -> Option<&PartyID> {
        self.parties.get(index.as_usize())
    }

    pub fn index_of(&self, party: &PartyID) -> Option<PartyIdx> {
        self.index_of_id(party.id())
    }

    pub fn index_of_id(&self, id: &str) -> Option<PartyIdx> {
        self.parties
            .iter()
            .position(|party| party.id() == id)
            .map(PartyIdx::from_usize)
    }

    pub fn index_of_key(&self, key: &BigUint) -> Option<PartyIdx> {
        self.parties
            .iter()
            .position(|party| party.key() == key)
            .map(PartyIdx::from_usize)
    }

    pub fn contains(&self, party: &PartyID) -> bool {
        self.index_of(party).is_some()
    }

    /// Merges two contexts into one ordered context without duplicates
    /// (the wire-level ordering of a resharing session).
    pub(crate) fn union(&self, other: &PeerContext) -> Result<PeerContext, Error> {
        let mut parties = self.parties.clone();
        for party in other.iter() {
            match parties.iter().find(|existing| existing.id() == party.id()) {
                Some(existing) if existing != party => {
                    return Err(Error::configuration(format!(
                        "party {:?} appears in both committees with different keys",
                        party.id()
                    )));
                }
                Some(_) => {}
                None => parties.push(party.clone()),
            }
        }
        PeerContext::new(parties)
    }
}

impl Hashable for PeerContext {
    fn chain<C: Chain>(&self, digest: C) -> C {
        digest.chain_each(&self.parties)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint_dig::BigUint;

    use super::*;

    fn party(id: &str, key: u64) -> PartyID {
        PartyID::new(id, format!("party-{id}"), BigUint::from(key))
    }

    #[test]
    fn ordering_is_by_key() {
        let ctx =
            PeerContext::new(vec![party("c", 30), party("a", 10), party("b", 20)]).unwrap();
        let ids: Vec<&str> = ctx.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ctx.index_of_id("b"), Some(PartyIdx::from_usize(1)));
        assert_eq!(ctx.index_of_key(&BigUint::from(30u64)), Some(PartyIdx::from_usize(2)));
    }

    #[test]
    fn rejects_invalid_contexts() {
        assert!(PeerContext::new(vec![]).is_err());
        assert!(PeerContext::new(vec![party("a", 1), party("a", 2)]).is_err());
        assert!(PeerContext::new(vec![party("a", 1), party("b", 1)]).is_err());
        assert!(PeerContext::new(vec![party("a", 0)]).is_err());
    }

    #[test]
    fn union_deduplicates_shared_members() {
        let old = PeerContext::new(vec![party("a", 1), party("b", 2)]).unwrap();
        let new = PeerContext::new(vec![party("b", 2), party("c", 3)]).unwrap();
        let union = old.union(&new).unwrap();
        assert_eq!(union.len(), 3);

        let conflicting = PeerContext::new(vec![party("b", 9)]).unwrap();
        assert!(old.union(&conflicting).is_err());
    }
}
