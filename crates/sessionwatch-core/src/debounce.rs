//! Per-key trailing-edge timers.
//!
//! Scheduling a key that already has a pending timer aborts the old one, so
//! a burst of changes collapses into a single message after the quiet window.
//! Each timer carries a generation number; a message that was already queued
//! when a newer timer replaced it completes nothing.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Debouncer<K> {
    pending: HashMap<K, (u64, JoinHandle<()>)>,
    next_generation: u64,
}

impl<K> Debouncer<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Send the message built by `msg` on `tx` after `delay`, replacing any
    /// timer already pending for `key`. `msg` receives the timer's generation,
    /// which the receiver hands back to [`Debouncer::complete`].
    pub fn schedule<M, F>(&mut self, key: K, delay: Duration, tx: mpsc::UnboundedSender<M>, msg: F)
    where
        M: Send + 'static,
        F: FnOnce(u64) -> M,
    {
        if let Some((_, handle)) = self.pending.remove(&key) {
            handle.abort();
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let msg = msg(generation);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg);
        });
        self.pending.insert(key, (generation, handle));
    }

    /// Forget the timer for `key` once its message has been received.
    ///
    /// Returns `false`, and keeps the pending timer, when `generation` is not
    /// the timer currently scheduled for `key`.
    pub fn complete(&mut self, key: &K, generation: u64) -> bool {
        match self.pending.get(key) {
            Some((current, _)) if *current == generation => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Abort and forget the timer for `key`. Returns whether one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Abort every pending timer.
    pub fn clear(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }
}

impl<K> Default for Debouncer<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }
}
