use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

/// Identifies one upload stream: `(username, logical name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadKey {
    pub username: String,
    pub name: String,
}

impl UploadKey {
    pub fn new(username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            name: name.into(),
        }
    }
}

/// Single-holder gate per [`UploadKey`] (thread-safe).
///
/// Only keys currently held occupy memory. Callers on different keys never
/// wait on each other beyond the short bookkeeping critical section.
#[derive(Debug, Default)]
pub struct KeyedGate {
    held: Mutex<HashSet<UploadKey>>,
    released: Condvar,
}

impl KeyedGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `key` is free, then holds it until the guard drops.
    pub fn acquire(&self, key: UploadKey) -> KeyGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.clone());
        KeyGuard { gate: self, key }
    }

    #[cfg(test)]
    fn is_held(&self, key: &UploadKey) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    #[cfg(test)]
    fn held_count(&self) -> usize {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, key: &UploadKey) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(key);
        drop(held);
        self.released.notify_all();
    }
}

/// Holds a key of a [`KeyedGate`]; releases it on drop, including unwinds.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    gate: &'a KeyedGate,
    key: UploadKey,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.key);
    }
}
