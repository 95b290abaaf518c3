// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! The pending-request registry: id → pending request, plus insertion order.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::codec::RemoteError;
use crate::error::{Error, LifecycleError};
use serde_json::value::RawValue;
use tokio::sync::oneshot;

/// The outcome delivered to a caller through their reply-sink.
#[derive(Debug)]
pub enum Reply {
    /// The raw JSON result, not yet decoded into a typed value.
    Result(Box<RawValue>),
    /// The node returned a structured JSON-RPC error.
    Remote(RemoteError),
    /// The request failed for a reason surfaced as a crate [`Error`].
    Failed(Error),
}

impl Reply {
    /// Convert this reply into the `Result` a typed command wrapper expects.
    pub fn into_result(self) -> Result<Box<RawValue>, Error> {
        match self {
            Reply::Result(v) => Ok(v),
            Reply::Remote(e) => Err(e.into()),
            Reply::Failed(e) => Err(e),
        }
    }
}

/// Which ordered sequence a pending request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    /// The persistent/one-shot live sequence (replayed on reconnect).
    Live,
    /// The batch-accumulation sequence (flushed explicitly).
    Batch,
}

/// A request that has been submitted but not yet replied to.
pub struct PendingRequest {
    /// The request id.
    pub id: u64,
    /// The JSON-RPC method name, used to consult the "do not resend" set.
    pub method: String,
    /// The fully serialized bytes, resent verbatim on reconnect.
    pub bytes: Vec<u8>,
    /// The caller-owned reply sink.
    pub reply_to: oneshot::Sender<Reply>,
}

/// One link of an intrusive doubly-linked list threaded through `by_id`,
/// so a sequence can be unlinked at an arbitrary id in O(1) instead of
/// scanning for it.
struct Link {
    prev: Option<u64>,
    next: Option<u64>,
}

/// A submission-order sequence of ids, stored as a doubly-linked list
/// whose links live in the caller's id-keyed map rather than in a
/// separate node allocation. `remove` is O(1): the id's own link names
/// its neighbours directly, so no scan is needed to find them.
#[derive(Default)]
struct OrderedIds {
    links: HashMap<u64, Link>,
    head: Option<u64>,
    tail: Option<u64>,
}

impl OrderedIds {
    fn push_back(&mut self, id: u64) {
        let prev = self.tail;
        self.links.insert(id, Link { prev, next: None });
        match prev {
            Some(p) => self.links.get_mut(&p).unwrap().next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    /// Unlink `id` in O(1), given that it is a member of this sequence.
    fn remove(&mut self, id: u64) {
        let Some(link) = self.links.remove(&id) else {
            return;
        };
        match link.prev {
            Some(p) => self.links.get_mut(&p).unwrap().next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(n) => self.links.get_mut(&n).unwrap().prev = link.prev,
            None => self.tail = link.prev,
        }
    }

    fn iter(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.links.len());
        let mut cursor = self.head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.links[&id].next;
        }
        out
    }

    fn drain(&mut self) -> Vec<u64> {
        let ids = self.iter();
        self.links.clear();
        self.head = None;
        self.tail = None;
        ids
    }
}

struct Inner {
    by_id: HashMap<u64, (Sequence, PendingRequest)>,
    live_order: OrderedIds,
    batch_order: OrderedIds,
    shutting_down: bool,
}

/// Maps request id to pending request, tracking two disjoint insertion-order
/// sequences (live and batch) so replay and drain can iterate in submission
/// order. Each id's sequence membership is recorded alongside it in `by_id`,
/// so removal unlinks from exactly the right sequence in O(1) rather than
/// scanning both. Guarded by a single short-held mutex; never held across
/// I/O.
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_id: HashMap::new(),
                live_order: OrderedIds::default(),
                batch_order: OrderedIds::default(),
                shutting_down: false,
            }),
        }
    }

    /// Register a pending request in the given sequence.
    ///
    /// Fails with [`LifecycleError::ShuttingDown`] if shutdown has already
    /// been initiated; the shutdown check and the insertion happen under
    /// the same critical section so no request can be lost to a race with
    /// a concurrent `drain_all`.
    pub fn add(&self, req: PendingRequest, seq: Sequence) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if inner.shutting_down {
            return Err(LifecycleError::ShuttingDown.into());
        }
        let id = req.id;
        match seq {
            Sequence::Live => inner.live_order.push_back(id),
            Sequence::Batch => inner.batch_order.push_back(id),
        }
        inner.by_id.insert(id, (seq, req));
        Ok(())
    }

    /// Remove and return the entry for `id`, if present. O(1): the
    /// sequence an id belongs to is recorded alongside it, so only that
    /// one sequence is ever touched, and unlinking from it does not scan.
    pub fn remove(&self, id: u64) -> Option<PendingRequest> {
        let mut inner = self.inner.lock().unwrap();
        let (seq, entry) = inner.by_id.remove(&id)?;
        match seq {
            Sequence::Live => inner.live_order.remove(id),
            Sequence::Batch => inner.batch_order.remove(id),
        }
        Some(entry)
    }

    /// Fulfill every pending reply-sink with an error built from `make_err`
    /// and empty the registry. Also marks the registry as shutting down, so
    /// subsequent `add` calls fail fast. Idempotent: calling this again on
    /// an already-empty, already-shutting-down registry is a no-op.
    pub fn drain_all(&self, make_err: impl Fn() -> Error) {
        let entries: Vec<PendingRequest> = {
            let mut inner = self.inner.lock().unwrap();
            inner.shutting_down = true;
            inner.live_order.drain();
            inner.batch_order.drain();
            inner.by_id.drain().map(|(_, (_, v))| v).collect()
        };
        for entry in entries {
            let _ = entry.reply_to.send(Reply::Failed(make_err()));
        }
    }

    /// Snapshot the live sequence in submission order, without removing
    /// anything. Used by the reconnect supervisor to decide what to resend.
    pub fn snapshot_live(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner.live_order.iter()
    }

    /// Snapshot the batch sequence in submission order, without removing
    /// anything.
    pub fn snapshot_batch(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner.batch_order.iter()
    }

    /// Clear the batch sequence only: ids stay registered under `by_id`,
    /// so their reply-sinks remain unfulfilled until the lifecycle drain
    /// resolves them on shutdown. They are dropped from batch iteration
    /// (snapshotting, peeking) only.
    pub fn clear_batch_sequence(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.batch_order.drain();
    }

    /// Look up the serialized request bytes for `id` without removing the
    /// entry. Used to assemble a batch frame from the ids currently queued.
    pub fn peek_bytes(&self, id: u64) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.by_id.get(&id).map(|(_, p)| p.bytes.clone())
    }

    /// Look up the method name and serialized bytes for `id` without
    /// removing the entry. Used by the reconnect supervisor to decide
    /// whether a live request is eligible for resend.
    pub fn peek(&self, id: u64) -> Option<(String, Vec<u8>)> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_id
            .get(&id)
            .map(|(_, p)| (p.method.clone(), p.bytes.clone()))
    }

    /// True once shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock().unwrap().shutting_down
    }

    /// Mark the registry as shutting down without draining it (used when
    /// shutdown begins but draining happens as a separate explicit step).
    pub fn mark_shutting_down(&self) {
        self.inner.lock().unwrap().shutting_down = true;
    }
}
