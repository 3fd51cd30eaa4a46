//! The per-bucket register.
//!
//! A classic HyperLogLog register keeps a single maximum. To answer "what is the
//! maximum precision value seen since `t`" for any `t`, a register instead keeps the
//! observations that are not strictly dominated by a more recent, more informative
//! one. For a stream whose precision values are bounded, this set stays small no
//! matter how long the stream is.

use std::slice;

/// The precision value seen for a bucket at a given timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Observation {
    pub timestamp: u64,
    pub precision: u8,
}

impl Observation {
    pub fn new(timestamp: u64, precision: u8) -> Self {
        Self {
            timestamp,
            precision,
        }
    }

    /// `other` is strictly more recent and strictly more informative.
    fn is_dominated_by(&self, other: &Self) -> bool {
        self.timestamp < other.timestamp && self.precision < other.precision
    }

    /// `self` gives an answer at least as large as `other` for every cutoff.
    fn covers(&self, other: &Self) -> bool {
        self.timestamp >= other.timestamp && self.precision >= other.precision
    }
}

/// A self-pruning set of observations for one bucket.
///
/// No two retained observations `a`, `b` satisfy `b.timestamp > a.timestamp &&
/// b.precision > a.precision`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Register {
    frontier: Vec<Observation>,
}

impl Register {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, dropping every observation it strictly dominates.
    ///
    /// Observations that some retained observation already covers change no query
    /// result and are ignored, so inserting the same observation twice is the same as
    /// inserting it once. Observations sharing a timestamp never evict each other.
    pub fn insert(&mut self, obs: Observation) {
        if self.frontier.iter().any(|o| o.covers(&obs)) {
            return;
        }
        self.frontier.retain(|o| !o.is_dominated_by(&obs));
        self.frontier.push(obs);
    }

    /// The maximum precision among observations with `timestamp >= since`, `0` if
    /// there are none.
    pub fn get(&self, since: u64) -> u8 {
        self.frontier
            .iter()
            .filter(|o| o.timestamp >= since)
            .map(|o| o.precision)
            .max()
            .unwrap_or(0)
    }

    /// Number of retained observations.
    pub fn len(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// The retained observations, in insertion order.
    pub fn iter(&self) -> slice::Iter<'_, Observation> {
        self.frontier.iter()
    }
}

impl<'a> IntoIterator for &'a Register {
    type Item = &'a Observation;
    type IntoIter = slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
