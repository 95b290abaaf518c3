// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Tracks which notification subscriptions the caller has requested, so
//! they can be replayed after a reconnect.

use std::collections::BTreeSet;
use std::sync::Mutex;

/// A point-in-time copy of the subscription state, used to drive replay
/// without holding the state lock for the duration of the replay.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Whether block-connected/disconnected notifications are subscribed.
    pub blocks: bool,
    /// Whether plain new-transaction notifications are subscribed.
    pub new_tx: bool,
    /// Whether verbose new-transaction notifications are subscribed.
    pub new_tx_verbose: bool,
    /// The outpoints currently being watched for spend notifications.
    pub spent_outpoints: BTreeSet<String>,
    /// The addresses currently being watched for receive notifications.
    pub received_addresses: BTreeSet<String>,
}

impl Snapshot {
    /// True if there is nothing to replay.
    pub fn is_empty(&self) -> bool {
        !self.blocks
            && !self.new_tx
            && !self.new_tx_verbose
            && self.spent_outpoints.is_empty()
            && self.received_addresses.is_empty()
    }
}

#[derive(Debug, Default)]
struct State {
    blocks: bool,
    new_tx: bool,
    new_tx_verbose: bool,
    spent_outpoints: BTreeSet<String>,
    received_addresses: BTreeSet<String>,
}

/// Tracks the notification subscriptions a caller has successfully
/// requested. Mutated only once the corresponding subscribe command has
/// been acknowledged by the node.
#[derive(Default)]
pub struct NotificationState {
    state: Mutex<State>,
}

impl NotificationState {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that block notifications were successfully subscribed.
    pub fn mark_blocks_subscribed(&self) {
        self.state.lock().unwrap().blocks = true;
    }

    /// Record that new-transaction notifications were successfully
    /// subscribed, at the given verbosity.
    pub fn mark_new_tx_subscribed(&self, verbose: bool) {
        let mut s = self.state.lock().unwrap();
        if verbose {
            s.new_tx_verbose = true;
        } else {
            s.new_tx = true;
        }
    }

    /// Record that the given outpoints were successfully subscribed for
    /// spend notifications.
    pub fn mark_outpoints_subscribed(&self, outpoints: impl IntoIterator<Item = String>) {
        let mut s = self.state.lock().unwrap();
        s.spent_outpoints.extend(outpoints);
    }

    /// Record that the given addresses were successfully subscribed for
    /// receive notifications.
    pub fn mark_addresses_subscribed(&self, addresses: impl IntoIterator<Item = String>) {
        let mut s = self.state.lock().unwrap();
        s.received_addresses.extend(addresses);
    }

    /// Take a consistent snapshot under a short critical section, suitable
    /// for driving replay without holding the lock across I/O.
    pub fn snapshot(&self) -> Snapshot {
        let s = self.state.lock().unwrap();
        Snapshot {
            blocks: s.blocks,
            new_tx: s.new_tx,
            new_tx_verbose: s.new_tx_verbose,
            spent_outpoints: s.spent_outpoints.clone(),
            received_addresses: s.received_addresses.clone(),
        }
    }
}

/// One optional callback per notification kind a node can push. Unset
/// callbacks silently drop the matching notification; an unrecognised
/// method name is logged at debug level and dropped.
///
/// Modelled as a record of optional function values (see the crate's design
/// notes on dynamic dispatch): production code supplies only the handlers
/// it cares about, leaving the rest `None`.
#[derive(Clone, Default)]
pub struct NotificationHandlers {
    /// Invoked for `blockconnected`/`blockdisconnected`, carrying the raw
    /// `[hash, height]`-shaped params.
    pub on_block: Option<std::sync::Arc<dyn Fn(Box<serde_json::value::RawValue>) + Send + Sync>>,
    /// Invoked for plain `recvtx`/`redeemingtx` new-transaction pushes.
    pub on_new_transaction:
        Option<std::sync::Arc<dyn Fn(Box<serde_json::value::RawValue>) + Send + Sync>>,
    /// Invoked for verbose (`relevanttxaccepted`) new-transaction pushes.
    pub on_new_transaction_verbose:
        Option<std::sync::Arc<dyn Fn(Box<serde_json::value::RawValue>) + Send + Sync>>,
    /// Invoked when a watched outpoint is spent.
    pub on_spent: Option<std::sync::Arc<dyn Fn(Box<serde_json::value::RawValue>) + Send + Sync>>,
    /// Invoked when a watched address receives funds.
    pub on_received: Option<std::sync::Arc<dyn Fn(Box<serde_json::value::RawValue>) + Send + Sync>>,
}

impl std::fmt::Debug for NotificationHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHandlers")
            .field("on_block", &self.on_block.is_some())
            .field("on_new_transaction", &self.on_new_transaction.is_some())
            .field(
                "on_new_transaction_verbose",
                &self.on_new_transaction_verbose.is_some(),
            )
            .field("on_spent", &self.on_spent.is_some())
            .field("on_received", &self.on_received.is_some())
            .finish()
    }
}

impl NotificationHandlers {
    /// Dispatch a decoded notification by method name to the matching
    /// handler, if any is registered. Never panics on an unknown method.
    pub fn dispatch(&self, method: &str, params: Box<serde_json::value::RawValue>) {
        let handler = match method {
            "blockconnected" | "blockdisconnected" => self.on_block.as_ref(),
            "recvtx" | "redeemingtx" => self.on_new_transaction.as_ref(),
            "relevanttxaccepted" => self.on_new_transaction_verbose.as_ref(),
            "notifyspent" | "spentoutput" => self.on_spent.as_ref(),
            "notifyreceived" | "recvaddress" => self.on_received.as_ref(),
            other => {
                tracing::debug!(target: crate::LOG_TARGET, method = other, "no handler registered for notification");
                None
            }
        };
        if let Some(handler) = handler {
            handler(params);
        }
    }
}
