//! Accumulators for per-peer round state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An iterator over `0..length` that skips the `hole` position.
///
/// `None` when `hole` is out of range.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HoleRange {
    length: usize,
    position: usize,
    hole: usize,
}

impl HoleRange {
    pub fn new(length: usize, hole: usize) -> Self {
        debug_assert!(hole < length);
        Self {
            length,
            hole,
            position: 0,
        }
    }
}

impl Iterator for HoleRange {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.position == self.hole {
            self.position += 1;
        }
        if self.position >= self.length {
            return None;
        }
        let result = self.position;
        self.position += 1;
        Some(result)
    }
}

/// A `length`-element vector with an unoccupied `hole` position (this party's own slot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HoleVec<T> {
    elements: Vec<T>,
    hole: usize,
}

impl<T> HoleVec<T> {
    pub fn hole(&self) -> usize {
        self.hole
    }

    pub fn len(&self) -> usize {
        self.elements.len() + 1
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index == self.hole {
            return None;
        }
        let index = if index > self.hole { index - 1 } else { index };
        self.elements.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }

    /// Iterates together with the original (hole-aware) indices.
    pub fn iter_enumerated(&self) -> impl Iterator<Item = (usize, &T)> {
        HoleRange::new(self.len(), self.hole).zip(self.elements.iter())
    }

    /// Fills the hole with `value`, producing a plain vector.
    pub fn into_vec(self, value: T) -> Vec<T> {
        let mut result = self.elements;
        result.insert(self.hole, value);
        result
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> HoleVec<U> {
        HoleVec {
            elements: self.elements.into_iter().map(f).collect(),
            hole: self.hole,
        }
    }

    pub fn map_ref<U, F: FnMut(&T) -> U>(&self, f: F) -> HoleVec<U> {
        HoleVec {
            elements: self.elements.iter().map(f).collect(),
            hole: self.hole,
        }
    }
}

/// Accumulator for a [`HoleVec`]: slots are filled one by one and the vector
/// can be finalized once every non-hole slot is occupied.
#[derive(Debug, Clone)]
pub(crate) struct HoleVecAccum<T> {
    elements: Vec<Option<T>>,
    hole: usize,
}

impl<T> HoleVecAccum<T> {
    pub fn new(length: usize, hole: usize) -> Self {
        debug_assert!(hole < length && length > 0);
        Self {
            elements: (1..length).map(|_| None).collect(),
            hole,
        }
    }

    pub fn insert(&mut self, index: usize, value: T) -> Option<()> {
        if index == self.hole {
            return None;
        }
        let index = if index > self.hole { index - 1 } else { index };
        let slot = self.elements.get_mut(index)?;
        if slot.is_some() {
            return None;
        }
        *slot = Some(value);
        Some(())
    }

    pub fn can_finalize(&self) -> bool {
        self.elements.iter().all(Option::is_some)
    }

    pub fn finalize(self) -> Option<HoleVec<T>> {
        let elements = self.elements.into_iter().collect::<Option<Vec<_>>>()?;
        Some(HoleVec {
            elements,
            hole: self.hole,
        })
    }
}

/// Payloads received for a round, keyed by party index. Unlike [`HoleVec`]
/// this supports rounds whose expected sender set is a strict subset of the
/// session (resharing committees).
#[derive(Debug, Clone)]
pub(crate) struct Payloads<T> {
    map: BTreeMap<usize, T>,
}

impl<T> Default for Payloads<T> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }
}

impl<T> Payloads<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if the slot is already occupied.
    pub fn insert(&mut self, index: usize, value: T) -> Option<()> {
        if self.map.contains_key(&index) {
            return None;
        }
        self.map.insert(index, value);
        Some(())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.map.contains_key(&index)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.map.get(&index)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.map.iter().map(|(index, value)| (*index, value))
    }

    pub fn into_iter_sorted(self) -> impl Iterator<Item = (usize, T)> {
        self.map.into_iter()
    }

    /// Converts into a [`HoleVec`] when the payloads cover exactly
    /// `0..length` minus the `hole` position.
    pub fn into_hole_vec(self, length: usize, hole: usize) -> Option<HoleVec<T>> {
        let mut accum = HoleVecAccum::new(length, hole);
        for (index, value) in self.map.into_iter() {
            accum.insert(index, value)?;
        }
        accum.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hole_range_skips_hole() {
        let indices: Vec<usize> = HoleRange::new(4, 1).collect();
        assert_eq!(indices, vec![0, 2, 3]);
        let indices: Vec<usize> = HoleRange::new(3, 0).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn accumulate_and_finalize() {
        let mut accum = HoleVecAccum::<u32>::new(3, 1);
        assert!(accum.insert(1, 10).is_none()); // the hole
        accum.insert(0, 10).unwrap();
        assert!(accum.insert(0, 20).is_none()); // duplicate
        assert!(!accum.can_finalize());
        accum.insert(2, 30).unwrap();
        assert!(accum.can_finalize());

        let vec = accum.finalize().unwrap();
        assert_eq!(vec.get(0), Some(&10));
        assert_eq!(vec.get(1), None);
        assert_eq!(vec.get(2), Some(&30));
        assert_eq!(
            vec.iter_enumerated().collect::<Vec<_>>(),
            vec![(0, &10), (2, &30)]
        );
        assert_eq!(vec.into_vec(20), vec![10, 20, 30]);
    }

    #[test]
    fn payloads_to_hole_vec() {
        let mut payloads = Payloads::new();
        payloads.insert(0, "a").unwrap();
        payloads.insert(2, "b").unwrap();
        assert!(payloads.insert(2, "c").is_none());

        let vec = payloads.into_hole_vec(3, 1).unwrap();
        assert_eq!(vec.get(0), Some(&"a"));
        assert_eq!(vec.get(2), Some(&"b"));

        let mut partial = Payloads::new();
        partial.insert(0, "a").unwrap();
        assert!(partial.into_hole_vec(3, 1).is_none());
    }
}
