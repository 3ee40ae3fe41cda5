//! DeleteByQueryTracker - watermark of applied delete-by-query predicates
//!
//! A leader add can arrive after a delete-by-query with a higher version
//! that would have removed it. The tracker retains the most recent
//! predicates so such an add is suppressed instead of resurrecting the
//! document.
//!
//! # Gate
//!
//! The watermark sits behind an `RwLock`. Every per-id mutation holds it
//! shared for its whole apply; registering a predicate takes it
//! exclusively. A registration therefore never interleaves with an
//! in-flight add: the add either completed first (and the sweep that
//! follows registration finds it) or sees the new predicate.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{Document, PredicateEvaluator, Query};

/// Decision for a candidate add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// A retained predicate newer than the add matches it; carries the
    /// magnitude of the newest such predicate.
    Suppressed(u64),
    /// The add is older than a predicate no longer retained, so whether it
    /// should survive cannot be decided.
    BeyondRetention { evicted_through: u64 },
}

#[derive(Debug)]
pub struct DbqWatermark {
    /// Highest predicate version ever registered
    max_version: u64,
    /// Highest predicate version dropped from the retention window
    evicted_through: u64,
    retained: BTreeMap<u64, Query>,
    retention: usize,
}

impl DbqWatermark {
    fn new(retention: usize) -> Self {
        Self {
            max_version: 0,
            evicted_through: 0,
            retained: BTreeMap::new(),
            retention: retention.max(1),
        }
    }

    pub fn max_version(&self) -> u64 {
        self.max_version
    }

    pub fn evicted_through(&self) -> u64 {
        self.evicted_through
    }

    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    pub fn contains(&self, version: u64) -> bool {
        self.retained.contains_key(&version)
    }

    /// Predicates currently retained, oldest first.
    pub fn retained(&self) -> impl Iterator<Item = (u64, &Query)> {
        self.retained.iter().map(|(version, query)| (*version, query))
    }

    /// Records a predicate. Returns false if this version is already known.
    pub fn register(&mut self, version: u64, query: Query) -> bool {
        if self.retained.contains_key(&version) || version <= self.evicted_through {
            return false;
        }
        self.retained.insert(version, query);
        self.max_version = self.max_version.max(version);

        while self.retained.len() > self.retention {
            if let Some((evicted, _)) = self.retained.pop_first() {
                self.evicted_through = self.evicted_through.max(evicted);
            }
        }
        true
    }

    /// Treats every version at or below `magnitude` as evicted. Used when
    /// the predicates themselves were compacted out of the update log.
    pub fn raise_evicted_through(&mut self, magnitude: u64) {
        self.evicted_through = self.evicted_through.max(magnitude);
        self.max_version = self.max_version.max(magnitude);
        let floor = self.evicted_through;
        self.retained.retain(|version, _| *version > floor);
    }
}

pub struct DeleteByQueryTracker {
    gate: RwLock<DbqWatermark>,
    evaluator: Arc<dyn PredicateEvaluator>,
}

impl DeleteByQueryTracker {
    pub fn new(evaluator: Arc<dyn PredicateEvaluator>, retention: usize) -> Self {
        Self {
            gate: RwLock::new(DbqWatermark::new(retention)),
            evaluator,
        }
    }

    /// Shared hold on the watermark, taken by every per-id mutation.
    pub fn gate(&self) -> RwLockReadGuard<'_, DbqWatermark> {
        self.gate.read()
    }

    /// Exclusive hold, taken only to register a predicate.
    pub fn gate_exclusive(&self) -> RwLockWriteGuard<'_, DbqWatermark> {
        self.gate.write()
    }

    pub fn matches(&self, query: &Query, document: &Document) -> bool {
        self.evaluator.matches(query, document)
    }

    /// Decides whether `candidate` (an add about to be applied at
    /// `candidate.version`) survives the predicates in `watermark`.
    pub fn admit(&self, watermark: &DbqWatermark, candidate: &Document) -> Admission {
        let version = candidate.version.magnitude();
        if version >= watermark.max_version {
            return Admission::Admit;
        }
        if version < watermark.evicted_through {
            return Admission::BeyondRetention {
                evicted_through: watermark.evicted_through,
            };
        }

        watermark
            .retained
            .range(version + 1..)
            .rev()
            .find(|(_, query)| self.evaluator.matches(query, candidate))
            .map_or(Admission::Admit, |(newest, _)| Admission::Suppressed(*newest))
    }

    /// Copy of the retained predicates, oldest first.
    pub fn retained(&self) -> Vec<(u64, Query)> {
        self.gate
            .read()
            .retained()
            .map(|(version, query)| (version, query.clone()))
            .collect()
    }

    pub fn max_version(&self) -> u64 {
        self.gate.read().max_version()
    }
}
