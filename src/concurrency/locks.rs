//! Per-document mutual exclusion.
//!
//! Locks are created on first use and never removed, so two threads asking
//! for the same id always get the same mutex. Operations on different ids
//! never contend beyond the `DashMap` shard lookup.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::model::DocumentId;

#[derive(Debug, Default)]
pub struct IdLocks {
    locks: DashMap<DocumentId, Arc<Mutex<()>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `id`. Callers lock it for the whole operation.
    pub fn get(&self, id: &DocumentId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(id) {
            return Arc::clone(&lock);
        }
        Arc::clone(&self.locks.entry(id.clone()).or_default())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_yields_same_lock() {
        let locks = IdLocks::new();
        let a = locks.get(&"1".into());
        let b = locks.get(&"1".into());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_distinct_ids_do_not_contend() {
        let locks = IdLocks::new();
        let a = locks.get(&"1".into());
        let b = locks.get(&"2".into());
        let _held = a.lock();
        assert!(b.try_lock().is_some());
    }
}
