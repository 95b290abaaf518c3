// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! The reconnect supervisor: redials after a disconnect with backoff,
//! replays subscription state, then resends outstanding live requests in
//! their original submission order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::CredentialProvider;
use crate::commands::Command;
use crate::config::Endpoint;
use crate::id::IdGenerator;
use crate::notifications::NotificationState;
use crate::registry::Registry;
use crate::signals::{OnceSignal, ResettableSignal};
use crate::transport::socket::{self, Notification, SocketHandle};

/// Shared slot holding the currently-active socket handle, swapped out by
/// the supervisor each time the connection is re-established. `None`
/// while disconnected.
pub type SocketSlot = Arc<RwLock<Option<SocketHandle>>>;

/// Shared slot holding the reader/writer task handles for whichever
/// connection epoch is currently live, so [`crate::client::Client::wait_for_shutdown`]
/// can join them deterministically instead of trusting that a graceful
/// close always unblocks them in time.
pub type CurrentIo = Arc<AsyncMutex<Option<(JoinHandle<()>, JoinHandle<()>)>>>;

/// Shared slot holding the node/backend version last observed on the
/// current connection (e.g. from a `getnetworkinfo`-style call a caller
/// makes after connecting). Invalidated on every successful redial: a
/// version learned from the previous socket may not hold for whatever node
/// answers the new one.
pub type VersionCache = Arc<RwLock<Option<u64>>>;

const RETRY_STEP: Duration = Duration::from_secs(5);
const RETRY_CAP: Duration = Duration::from_secs(60);

fn backoff_for(retry: u32) -> Duration {
    std::cmp::min(RETRY_STEP * retry, RETRY_CAP)
}

/// The parameters the supervisor needs to redial and drive replay/resend.
pub struct ReconnectConfig {
    /// The endpoint to redial.
    pub endpoint: Endpoint,
    /// The WebSocket URL used for the handshake request line.
    pub url: String,
    /// Extra headers to merge into the upgrade request on every dial.
    pub extra_headers: Vec<(String, String)>,
    /// Credentials resolved into the `Authorization: Basic` header sent on
    /// every redial's handshake request.
    pub credentials: Option<Arc<CredentialProvider>>,
    /// Methods excluded from automatic resend after a reconnect.
    pub do_not_resend: HashSet<String>,
}

/// Spawn the supervisor task. Runs until `shutdown` fires.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    config: ReconnectConfig,
    slot: SocketSlot,
    current_io: CurrentIo,
    registry: Arc<Registry>,
    notification_state: Arc<NotificationState>,
    notification_tx: mpsc::UnboundedSender<Notification>,
    ids: Arc<IdGenerator>,
    disconnected: Arc<ResettableSignal>,
    shutdown: Arc<OnceSignal>,
    cached_version: VersionCache,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = disconnected.wait_until_set() => {}
                _ = shutdown.wait() => return,
            }
            if shutdown.is_fired() {
                return;
            }

            let mut retry: u32 = 0;
            loop {
                if shutdown.is_fired() {
                    return;
                }

                match socket::dial(
                    &config.endpoint,
                    &config.url,
                    &config.extra_headers,
                    config.credentials.as_deref(),
                )
                .await
                {
                    Ok(dialed) => {
                        let (handle, reader, writer) = socket::spawn_dialed(
                            dialed,
                            registry.clone(),
                            notification_tx.clone(),
                            disconnected.clone(),
                            shutdown.clone(),
                        );
                        *slot.write().await = Some(handle.clone());
                        *current_io.lock().await = Some((reader, writer));
                        disconnected.clear();
                        // A version observed on the previous socket may not
                        // hold for whatever node answers the new one.
                        *cached_version.write().await = None;
                        tracing::debug!(target: crate::LOG_TARGET, "reconnected, replaying subscriptions");

                        replay_and_resend(
                            &handle,
                            &registry,
                            &notification_state,
                            &ids,
                            &config.do_not_resend,
                            &disconnected,
                        )
                        .await;

                        // This connection epoch lives until either background
                        // task exits, at which point `disconnected` is set
                        // and the outer loop takes over again.
                        if let Some((reader, writer)) = current_io.lock().await.take() {
                            let _ = reader.await;
                            let _ = writer.await;
                        }
                        break;
                    }
                    Err(e) => {
                        retry += 1;
                        tracing::debug!(
                            target: crate::LOG_TARGET,
                            retry,
                            error = %e,
                            "reconnect attempt failed"
                        );
                        let wait = backoff_for(retry);
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {}
                            _ = shutdown.wait() => return,
                        }
                    }
                }
            }
        }
    })
}

/// Replay subscription state, then resend outstanding live requests in
/// their original order. Aborts as soon as `disconnected` fires again,
/// leaving anything unsent for the next reconnect cycle to pick up.
async fn replay_and_resend(
    handle: &SocketHandle,
    registry: &Registry,
    notification_state: &NotificationState,
    ids: &IdGenerator,
    do_not_resend: &HashSet<String>,
    disconnected: &ResettableSignal,
) {
    let snapshot = notification_state.snapshot();
    if !snapshot.is_empty() {
        let mut replay = Vec::new();
        if snapshot.blocks {
            replay.push(Command::NotifyBlocks);
        }
        if snapshot.new_tx {
            replay.push(Command::NotifyNewTransactions { verbose: false });
        }
        if snapshot.new_tx_verbose {
            replay.push(Command::NotifyNewTransactions { verbose: true });
        }
        if !snapshot.spent_outpoints.is_empty() {
            replay.push(Command::NotifySpent {
                outpoints: snapshot.spent_outpoints.into_iter().collect(),
            });
        }
        if !snapshot.received_addresses.is_empty() {
            replay.push(Command::NotifyReceived {
                addresses: snapshot.received_addresses.into_iter().collect(),
            });
        }

        for command in replay {
            if disconnected.is_set() {
                return;
            }
            let id = ids.next();
            let frame = crate::codec::serialize_request(id, command.method_name(), &command.params(), false);
            if handle.send(frame.bytes, disconnected).await.is_err() {
                return;
            }
        }
    }

    for id in registry.snapshot_live() {
        if disconnected.is_set() {
            return;
        }
        let Some((method, bytes)) = registry.peek(id) else {
            continue;
        };
        if do_not_resend.contains(method.as_str()) {
            // Drop the entry without fulfilling its reply-sink: no reply
            // will ever come for a long-running scan left behind by a
            // dropped connection, and the caller is expected to notice the
            // sink itself has been dropped.
            registry.remove(id);
            continue;
        }
        if handle.send(bytes, disconnected).await.is_err() {
            return;
        }
    }
}
