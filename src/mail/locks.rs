//! Per-mailbox lock registry

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Hands out one exclusive lock per mailbox name.
///
/// Commands that touch a mailbox (SEND to it, LIST/READ/DEL by its owner)
/// hold that mailbox's lock for the duration of the command, so conflicting
/// operations on one mailbox serialize while unrelated mailboxes proceed in
/// parallel. The lock object for a name is created on first use, exactly
/// once for the lifetime of the process; two threads racing to first-touch
/// the same name receive the same `Arc`.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `user`, creating it if this is the first touch.
    ///
    /// The lookup and the create are one atomic step under the registry's
    /// own mutex, which is independent of every mailbox lock it hands out.
    pub fn acquire(&self, user: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user.to_string()).or_default())
    }
}
