// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Edge-triggered broadcast signals used to coordinate the background
//! tasks without polling: connection-established, currently-disconnected
//! and shutdown-initiated.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A signal that fires exactly once and then stays fired forever
/// (connection-established, shutdown-initiated).
#[derive(Default)]
pub struct OnceSignal {
    fired: AtomicBool,
    notify: Notify,
}

impl OnceSignal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent: firing an already-fired signal is a
    /// no-op.
    pub fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// True once `fire` has been called.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolve immediately if already fired, otherwise wait for `fire`.
    pub async fn wait(&self) {
        if self.is_fired() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}

/// A signal that can be set and cleared repeatedly (currently-disconnected).
/// Each clear/set cycle is a fresh "reconnect epoch": waiters that resolved
/// on a previous `set` will block again until the next one.
#[derive(Default)]
pub struct ResettableSignal {
    set: AtomicBool,
    notify: Notify,
}

impl ResettableSignal {
    /// Create a signal that starts cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal, waking any current waiters.
    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clear the signal.
    pub fn clear(&self) {
        self.set.store(false, Ordering::SeqCst);
    }

    /// True if currently set.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Resolve immediately if currently set, otherwise wait for the next
    /// `set` call.
    pub async fn wait_until_set(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
