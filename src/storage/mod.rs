//! The replicated state machine.
//!
//! Holds the authoritative key-value mapping for this node. Mutation is only
//! reachable from the crate (the driver's committed-entry apply step); the
//! read path is public and never touches consensus.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct KvStore {
    data: Mutex<HashMap<String, String>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites `key` unconditionally.
    pub(crate) fn put(&self, key: String, value: String) {
        self.lock().insert(key, value);
    }

    /// Local, possibly stale read of `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
