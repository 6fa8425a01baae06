//! In-flight claims
//!
//! A flow claims a key (`card:<id>` or `issue:<id>`) before touching any
//! remote service. A second delivery of the same event while the first is
//! still running finds the key taken and backs off. The claim is released
//! when the guard drops, whatever way the flow ends.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keys of flows currently running in this process
#[derive(Debug, Default)]
pub struct InFlight {
    keys: Mutex<HashSet<String>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if another flow holds it
    pub fn try_claim(self: &Arc<Self>, key: impl Into<String>) -> Option<Claim> {
        let key = key.into();
        if !self.lock().insert(key.clone()) {
            return None;
        }
        Some(Claim {
            registry: Arc::clone(self),
            key,
        })
    }

    #[cfg(test)]
    pub fn is_claimed(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held for the lifetime of one flow
#[derive(Debug)]
pub struct Claim {
    registry: Arc<InFlight>,
    key: String,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}
