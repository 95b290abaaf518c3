// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Batch accumulation: requests are queued without being sent, then flushed
//! together as a single JSON-RPC 2.0 array exchange over the one-shot
//! engine, regardless of the client's connection mode.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::value::RawValue;
use tokio::sync::oneshot;

use crate::codec;
use crate::error::{Error, LifecycleError, TransportError};
use crate::id::IdGenerator;
use crate::registry::{PendingRequest, Registry, Reply, Sequence};
use crate::transport::oneshot::OneShotHandle;

/// Accumulates requests for a single batch, then flushes them as one
/// array-framed exchange.
///
/// Each [`BatchAccumulator`] is single-use: once [`Self::flush`] has run,
/// constructing a new accumulator for the next batch is the caller's
/// responsibility (mirroring how a caller builds up one batch at a time).
pub struct BatchAccumulator {
    registry: Arc<Registry>,
    ids: Arc<IdGenerator>,
    transport: OneShotHandle,
}

impl BatchAccumulator {
    /// Create an empty accumulator bound to the given registry, id
    /// generator and one-shot transport.
    pub fn new(registry: Arc<Registry>, ids: Arc<IdGenerator>, transport: OneShotHandle) -> Self {
        Self {
            registry,
            ids,
            transport,
        }
    }

    /// Queue `method`/`params` into the batch, returning a receiver that
    /// resolves once [`Self::flush`] has exchanged the batch with the node.
    pub fn add(&self, method: &str, params: &RawValue) -> Result<oneshot::Receiver<Reply>, Error> {
        let id = self.ids.next();
        let frame = codec::serialize_request(id, method, params, true);
        let (tx, rx) = oneshot::channel();
        self.registry.add(
            PendingRequest {
                id,
                method: method.to_string(),
                bytes: frame.bytes,
                reply_to: tx,
            },
            Sequence::Batch,
        )?;
        Ok(rx)
    }

    /// Exchange every queued request as one JSON array, fan out replies by
    /// id, and clear the batch. Fails with [`LifecycleError::EmptyBatch`] if
    /// nothing was queued.
    pub async fn flush(&self) -> Result<(), Error> {
        let ids = self.registry.snapshot_batch();
        if ids.is_empty() {
            return Err(LifecycleError::EmptyBatch.into());
        }

        let frames: Vec<Vec<u8>> = ids
            .iter()
            .filter_map(|&id| self.registry.peek_bytes(id))
            .collect();
        let body = codec::frame_batch(frames.iter().map(|b| b.as_slice()));

        let response = match self.transport.exchange(body).await {
            Ok(bytes) => bytes,
            Err(e) => {
                // Exchange-level failure: the whole array request/response
                // failed before any per-element parsing happened. The queued
                // reply-sinks are left registered — a caller will only see
                // them resolved by the lifecycle drain on shutdown — while
                // the flushing caller gets the exchange error directly.
                self.registry.clear_batch_sequence();
                return Err(e);
            }
        };

        let elements = match codec::parse_batch_response(&response) {
            Ok(elements) => elements,
            Err(parse_err) => {
                self.registry.clear_batch_sequence();
                return Err(Error::Deserialization(parse_err));
            }
        };

        let mut claimed: HashSet<u64> = HashSet::new();
        for element in elements {
            if !claimed.insert(element.id) {
                // Duplicate id in the response: the first occurrence already
                // claimed this reply-sink, so this one is skipped.
                continue;
            }
            let Some(pending) = self.registry.remove(element.id) else {
                continue;
            };
            let reply = match (element.result, element.error) {
                (_, Some(remote)) => Reply::Remote(remote),
                (Some(result), None) => Reply::Result(result),
                (None, None) => Reply::Failed(
                    TransportError::Http("batch element carried neither result nor error".into())
                        .into(),
                ),
            };
            let _ = pending.reply_to.send(reply);
        }

        // Anything still outstanding was simply absent from the response.
        for id in ids {
            if let Some(pending) = self.registry.remove(id) {
                let _ = pending.reply_to.send(Reply::Failed(
                    TransportError::Http("id missing from batch response".into()).into(),
                ));
            }
        }

        Ok(())
    }
}
