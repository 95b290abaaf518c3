// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! The public [`Client`]: a cheap-to-clone handle over the shared
//! transport-multiplexer state, its [`ClientBuilder`], and the lifecycle
//! controller that coordinates connect/disconnect/shutdown across every
//! background task.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::value::RawValue;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::CredentialProvider;
use crate::batch::BatchAccumulator;
use crate::codec;
use crate::commands::Command;
use crate::config::{ConnConfig, Endpoint};
use crate::error::{Error, LifecycleError, TransportError};
use crate::id::IdGenerator;
use crate::notifications::{NotificationHandlers, NotificationState};
use crate::reconnect::{self, CurrentIo, ReconnectConfig, SocketSlot, VersionCache};
use crate::registry::{PendingRequest, Registry, Reply, Sequence};
use crate::signals::{OnceSignal, ResettableSignal};
use crate::transport::oneshot as oneshot_transport;
use crate::transport::oneshot::OneShotHandle;
use crate::transport::socket::{self, Notification};

/// Which transport a client uses for request/response traffic. Fixed for
/// the lifetime of a client; chosen from [`ConnConfig::one_shot_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A persistent, bidirectional socket: supports server-initiated
    /// notifications and automatic reconnect/resend.
    Persistent,
    /// Independent one-shot HTTP request/response exchanges. No
    /// notifications, no reconnect supervisor.
    OneShot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    NeverConnected,
    Connecting,
    Connected,
    Disconnected,
    ShutDown,
}

/// A reply that is either already resolved (the one-shot path, where the
/// exchange has already completed by the time the caller sees this value)
/// or still pending delivery from the persistent-socket/batch path.
pub enum PendingReply {
    /// The reply has already been determined.
    Ready(Reply),
    /// The reply will arrive asynchronously through this rendezvous.
    Pending(oneshot::Receiver<Reply>),
}

impl PendingReply {
    /// Wait for the reply (immediately, if already [`PendingReply::Ready`])
    /// and convert it into the `Result` a caller expects.
    pub async fn wait(self) -> Result<Box<RawValue>, Error> {
        let reply = match self {
            PendingReply::Ready(reply) => reply,
            PendingReply::Pending(rx) => rx
                .await
                .map_err(|_| Error::Lifecycle(LifecycleError::ShuttingDown))?,
        };
        reply.into_result()
    }
}

/// Builds a [`Client`], wiring up every background task exactly once.
pub struct ClientBuilder {
    config: ConnConfig,
    handlers: NotificationHandlers,
}

impl ClientBuilder {
    /// Start building a client for `config`.
    pub fn new(config: ConnConfig) -> Self {
        Self {
            config,
            handlers: NotificationHandlers::default(),
        }
    }

    /// Register the callbacks invoked for server-pushed notifications.
    /// Only meaningful for [`Mode::Persistent`] clients.
    pub fn notification_handlers(mut self, handlers: NotificationHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Construct the client: validates the endpoint, spawns the one-shot
    /// engine's consumer task, the notification dispatcher, and (for a
    /// persistent client with auto-reconnect enabled) the reconnect
    /// supervisor — each exactly once. Dials immediately unless
    /// [`ConnConfig::disable_connect_on_new`] is set.
    pub async fn build(self) -> Result<Client, Error> {
        let ClientBuilder { config, handlers } = self;

        let endpoint = config.parsed_endpoint()?;
        let mode = if config.one_shot_mode {
            Mode::OneShot
        } else {
            Mode::Persistent
        };

        let ids = Arc::new(IdGenerator::new());
        let registry = Arc::new(Registry::new());
        let notification_state = Arc::new(NotificationState::new());
        let connected = Arc::new(OnceSignal::new());
        let disconnected = Arc::new(ResettableSignal::new());
        let shutdown = Arc::new(OnceSignal::new());
        let socket_slot: SocketSlot = Arc::new(RwLock::new(None));
        let current_io: CurrentIo = Arc::new(AsyncMutex::new(None));
        let cached_version: VersionCache = Arc::new(RwLock::new(None));

        let credentials = config
            .credentials
            .clone()
            .map(|c| Arc::new(CredentialProvider::new(c)));

        let http_client = build_http_client(&config)?;

        let (notification_tx, notification_rx) = mpsc::unbounded_channel::<Notification>();

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let (oneshot_handle, batch) = match endpoint.http_url(config.disable_tls, &config.endpoint_path) {
            Ok(url) => {
                let (handle, task) = oneshot_transport::spawn(
                    http_client,
                    url,
                    credentials.clone(),
                    config.extra_headers.clone(),
                    shutdown.clone(),
                );
                tasks.push(task);
                let batch = BatchAccumulator::new(registry.clone(), ids.clone(), handle.clone());
                (Some(handle), Some(batch))
            }
            Err(e) => {
                if mode == Mode::OneShot {
                    return Err(e);
                }
                tracing::debug!(
                    target: crate::LOG_TARGET,
                    "no HTTP-reachable endpoint: one-shot submission and batch flush are unavailable"
                );
                (None, None)
            }
        };

        tasks.push(spawn_notification_dispatcher(
            notification_rx,
            handlers,
            shutdown.clone(),
        ));

        let ws_url = endpoint.ws_url(config.disable_tls, &config.endpoint_path);

        if mode == Mode::Persistent && !config.disable_auto_reconnect {
            let reconnect_config = ReconnectConfig {
                endpoint: endpoint.clone(),
                url: ws_url.clone(),
                extra_headers: config.extra_headers.clone(),
                credentials: credentials.clone(),
                do_not_resend: config.do_not_resend.clone(),
            };
            tasks.push(reconnect::spawn(
                reconnect_config,
                socket_slot.clone(),
                current_io.clone(),
                registry.clone(),
                notification_state.clone(),
                notification_tx.clone(),
                ids.clone(),
                disconnected.clone(),
                shutdown.clone(),
                cached_version.clone(),
            ));
        }

        let disable_connect_on_new = config.disable_connect_on_new;

        let inner = Arc::new(Inner {
            config,
            mode,
            endpoint,
            ws_url,
            credentials: credentials.clone(),
            ids,
            registry,
            notification_state,
            lifecycle: StdMutex::new(LifecycleState::NeverConnected),
            connected,
            disconnected,
            shutdown,
            socket_slot,
            current_io,
            cached_version,
            notification_tx,
            oneshot: oneshot_handle,
            batch,
            tasks: StdMutex::new(tasks),
            reconnect_epoch: AtomicUsize::new(0),
        });

        let client = Client { inner };

        if !disable_connect_on_new {
            if let Err(e) = client.connect().await {
                // The initial dial failed: nobody outside this function has
                // a handle on `client` yet, so if we returned the error
                // as-is the background tasks just spawned above (one-shot
                // consumer, notification dispatcher, reconnect supervisor)
                // would be orphaned forever with no shutdown signal ever
                // able to reach them. Fire it and join them ourselves before
                // propagating the dial error.
                client.shutdown().await;
                client.wait_for_shutdown().await;
                return Err(e);
            }
        }

        Ok(client)
    }
}

fn build_http_client(config: &ConnConfig) -> Result<reqwest::Client, Error> {
    let mut builder = reqwest::Client::builder();
    if let Some(bundle) = &config.tls_cert_bundle {
        let cert = reqwest::Certificate::from_pem(bundle)
            .map_err(|e| Error::InvalidAuth(format!("invalid TLS certificate bundle: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }
    if let Some(proxy) = &config.proxy {
        let mut p = reqwest::Proxy::all(&proxy.address)
            .map_err(|e| Error::InvalidEndpoint(format!("invalid proxy address: {e}")))?;
        if let (Some(user), Some(pass)) = (&proxy.user, &proxy.pass) {
            p = p.basic_auth(user, pass);
        }
        builder = builder.proxy(p);
    }
    builder
        .build()
        .map_err(|e| TransportError::Dial(e.to_string()).into())
}

fn spawn_notification_dispatcher(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    handlers: NotificationHandlers,
    shutdown: Arc<OnceSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => return,
                notification = rx.recv() => {
                    let Some(n) = notification else { return };
                    handlers.dispatch(&n.method, n.params);
                }
            }
        }
    })
}

struct Inner {
    config: ConnConfig,
    mode: Mode,
    endpoint: Endpoint,
    ws_url: String,
    credentials: Option<Arc<CredentialProvider>>,
    ids: Arc<IdGenerator>,
    registry: Arc<Registry>,
    notification_state: Arc<NotificationState>,
    lifecycle: StdMutex<LifecycleState>,
    connected: Arc<OnceSignal>,
    disconnected: Arc<ResettableSignal>,
    shutdown: Arc<OnceSignal>,
    socket_slot: SocketSlot,
    current_io: CurrentIo,
    /// The node/backend version last observed on the current connection,
    /// if any caller has recorded one via [`Client::note_backend_version`].
    /// Cleared on every successful reconnect.
    cached_version: VersionCache,
    notification_tx: mpsc::UnboundedSender<Notification>,
    oneshot: Option<OneShotHandle>,
    batch: Option<BatchAccumulator>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    /// Bumped every time a fresh socket is established; purely diagnostic.
    reconnect_epoch: AtomicUsize,
}

/// The entry point for submitting commands to a node and subscribing to
/// its notifications. Cheap to clone: every clone shares the same
/// registry, background tasks and lifecycle state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Start building a client for `config`.
    pub fn builder(config: ConnConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Which transport this client uses.
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// Wait until the client has connected for the first time. Resolves
    /// immediately if that has already happened.
    pub async fn wait_connected(&self) {
        self.inner.connected.wait().await;
    }

    /// The node/backend version last recorded via
    /// [`Self::note_backend_version`], if any. Reset to `None` every time
    /// the persistent socket successfully reconnects, since a version
    /// learned from the previous connection may not hold for whatever node
    /// answers the new one.
    pub async fn cached_backend_version(&self) -> Option<u64> {
        *self.inner.cached_version.read().await
    }

    /// Record the node/backend version observed on the current connection
    /// (typically parsed from the result of a version-reporting call such
    /// as `getnetworkinfo`). Callers that care about version-dependent
    /// behaviour should re-check this after every reconnect rather than
    /// trusting a value learned before a drop.
    pub async fn note_backend_version(&self, version: u64) {
        *self.inner.cached_version.write().await = Some(version);
    }

    fn check_submit_allowed(&self) -> Result<(), Error> {
        match *self.inner.lifecycle.lock().unwrap() {
            LifecycleState::ShutDown => Err(LifecycleError::ShuttingDown.into()),
            LifecycleState::NeverConnected => Err(LifecycleError::NotConnected.into()),
            LifecycleState::Connecting | LifecycleState::Connected | LifecycleState::Disconnected => {
                Ok(())
            }
        }
    }

    fn require_persistent(&self) -> Result<(), Error> {
        if self.inner.mode != Mode::Persistent {
            return Err(LifecycleError::NotBidirectionalClient.into());
        }
        Ok(())
    }

    /// Submit a raw `method`/`params` pair and await the reply. The
    /// generic entry point every typed command wrapper is expected to
    /// funnel through.
    pub async fn call(&self, method: &str, params: &RawValue) -> Result<Box<RawValue>, Error> {
        self.submit(method, params).await?.wait().await
    }

    /// Like [`Self::call`], but returns a [`PendingReply`] immediately
    /// instead of waiting for the reply, so the caller can fan out many
    /// requests before collecting results.
    pub async fn submit(&self, method: &str, params: &RawValue) -> Result<PendingReply, Error> {
        self.check_submit_allowed()?;
        match self.inner.mode {
            Mode::Persistent => self.submit_persistent(method, params).await,
            Mode::OneShot => self.submit_one_shot(method, params).await,
        }
    }

    /// Convenience wrapper for the stand-in [`Command`] catalogue (see
    /// `commands` module docs): derives `method`/`params` from the
    /// command and submits it.
    pub async fn submit_command(&self, command: &Command) -> Result<Box<RawValue>, Error> {
        self.call(command.method_name(), &command.params()).await
    }

    async fn submit_persistent(&self, method: &str, params: &RawValue) -> Result<PendingReply, Error> {
        let id = self.inner.ids.next();
        let frame = codec::serialize_request(id, method, params, false);
        let (tx, rx) = oneshot::channel();
        self.inner.registry.add(
            PendingRequest {
                id,
                method: method.to_string(),
                bytes: frame.bytes.clone(),
                reply_to: tx,
            },
            Sequence::Live,
        )?;

        let handle = self.inner.socket_slot.read().await.clone();
        if let Some(handle) = handle {
            // Best-effort: if the send loses the race with a disconnect,
            // the request stays registered and the next reconnect's
            // resend pass will deliver it.
            let _ = handle.send(frame.bytes, &self.inner.disconnected).await;
        }

        Ok(PendingReply::Pending(rx))
    }

    async fn submit_one_shot(&self, method: &str, params: &RawValue) -> Result<PendingReply, Error> {
        let engine = self
            .inner
            .oneshot
            .as_ref()
            .ok_or_else(|| Error::InvalidEndpoint("no HTTP-reachable endpoint configured".into()))?;
        let id = self.inner.ids.next();
        let frame = codec::serialize_request(id, method, params, false);
        let body = engine.exchange(frame.bytes).await?;
        match codec::parse_frame(&body) {
            Ok(Some(crate::codec::Frame::Response { outcome, .. })) => {
                let reply = match outcome {
                    Ok(result) => Reply::Result(result),
                    Err(remote) => Reply::Remote(remote),
                };
                Ok(PendingReply::Ready(reply))
            }
            Ok(Some(crate::codec::Frame::Notification { .. })) => Err(TransportError::Http(
                "one-shot transport received an unexpected notification frame".into(),
            )
            .into()),
            Ok(None) => Err(TransportError::Http(
                "one-shot response was not a well-formed JSON-RPC frame".into(),
            )
            .into()),
            Err(e) => Err(Error::Deserialization(e)),
        }
    }

    /// Subscribe to block-connected/disconnected notifications. Persistent
    /// mode only.
    pub async fn subscribe_blocks(&self) -> Result<Box<RawValue>, Error> {
        self.require_persistent()?;
        let result = self.submit_command(&Command::NotifyBlocks).await?;
        self.inner.notification_state.mark_blocks_subscribed();
        Ok(result)
    }

    /// Subscribe to new-transaction notifications, plain or verbose.
    /// Persistent mode only.
    pub async fn subscribe_new_transactions(&self, verbose: bool) -> Result<Box<RawValue>, Error> {
        self.require_persistent()?;
        let result = self
            .submit_command(&Command::NotifyNewTransactions { verbose })
            .await?;
        self.inner.notification_state.mark_new_tx_subscribed(verbose);
        Ok(result)
    }

    /// Subscribe to spend notifications for `outpoints` (merged with any
    /// already-watched set). Persistent mode only.
    pub async fn subscribe_spent(&self, outpoints: Vec<String>) -> Result<Box<RawValue>, Error> {
        self.require_persistent()?;
        let result = self
            .submit_command(&Command::NotifySpent {
                outpoints: outpoints.clone(),
            })
            .await?;
        self.inner.notification_state.mark_outpoints_subscribed(outpoints);
        Ok(result)
    }

    /// Subscribe to receive notifications for `addresses` (merged with any
    /// already-watched set). Persistent mode only.
    pub async fn subscribe_received(&self, addresses: Vec<String>) -> Result<Box<RawValue>, Error> {
        self.require_persistent()?;
        let result = self
            .submit_command(&Command::NotifyReceived {
                addresses: addresses.clone(),
            })
            .await?;
        self.inner
            .notification_state
            .mark_addresses_subscribed(addresses);
        Ok(result)
    }

    /// Queue `method`/`params` into the in-progress batch without sending
    /// it; resolves once [`Self::batch_flush`] exchanges the batch.
    pub async fn batch_add(&self, method: &str, params: &RawValue) -> Result<PendingReply, Error> {
        self.check_submit_allowed()?;
        let batch = self
            .inner
            .batch
            .as_ref()
            .ok_or_else(|| Error::InvalidEndpoint("no HTTP-reachable endpoint configured".into()))?;
        Ok(PendingReply::Pending(batch.add(method, params)?))
    }

    /// Flush every request queued via [`Self::batch_add`] as a single
    /// array-framed exchange. Fails with [`LifecycleError::EmptyBatch`] if
    /// nothing was queued.
    pub async fn batch_flush(&self) -> Result<(), Error> {
        let batch = self
            .inner
            .batch
            .as_ref()
            .ok_or_else(|| Error::InvalidEndpoint("no HTTP-reachable endpoint configured".into()))?;
        batch.flush().await
    }

    /// Dial and bring the client to the `connected` state. Only valid from
    /// `never-connected` or `disconnected`; fails with
    /// [`LifecycleError::AlreadyConnected`] otherwise.
    pub async fn connect(&self) -> Result<(), Error> {
        let inner = &self.inner;

        let previous = {
            let mut lifecycle = inner.lifecycle.lock().unwrap();
            match *lifecycle {
                LifecycleState::ShutDown => return Err(LifecycleError::ShuttingDown.into()),
                LifecycleState::Connected | LifecycleState::Connecting => {
                    return Err(LifecycleError::AlreadyConnected.into())
                }
                previous @ (LifecycleState::NeverConnected | LifecycleState::Disconnected) => {
                    *lifecycle = LifecycleState::Connecting;
                    previous
                }
            }
        };

        if inner.mode == Mode::OneShot {
            *inner.lifecycle.lock().unwrap() = LifecycleState::Connected;
            inner.connected.fire();
            return Ok(());
        }

        match socket::dial(
            &inner.endpoint,
            &inner.ws_url,
            &inner.config.extra_headers,
            inner.credentials.as_deref(),
        )
        .await
        {
            Ok(dialed) => {
                let (handle, reader, writer) = socket::spawn_dialed(
                    dialed,
                    inner.registry.clone(),
                    inner.notification_tx.clone(),
                    inner.disconnected.clone(),
                    inner.shutdown.clone(),
                );
                *inner.socket_slot.write().await = Some(handle);
                *inner.current_io.lock().await = Some((reader, writer));
                inner.disconnected.clear();
                inner.reconnect_epoch.fetch_add(1, Ordering::Relaxed);
                *inner.lifecycle.lock().unwrap() = LifecycleState::Connected;
                inner.connected.fire();
                Ok(())
            }
            Err(e) => {
                *inner.lifecycle.lock().unwrap() = previous;
                Err(e)
            }
        }
    }

    /// Idempotent: closes the current socket (if any) and, unless
    /// auto-reconnect is enabled, drains the registry and initiates
    /// shutdown. A no-op for [`Mode::OneShot`] clients other than
    /// returning [`LifecycleError::NotBidirectionalClient`].
    pub async fn disconnect(&self) -> Result<(), Error> {
        if self.inner.mode == Mode::OneShot {
            return Err(LifecycleError::NotBidirectionalClient.into());
        }
        self.disconnect_only().await;
        if self.inner.config.disable_auto_reconnect {
            self.inner
                .registry
                .drain_all(|| TransportError::Read("connection lost".into()).into());
            self.shutdown().await;
        }
        Ok(())
    }

    async fn disconnect_only(&self) {
        let inner = &self.inner;
        inner.disconnected.set();
        *inner.socket_slot.write().await = None;
        let mut lifecycle = inner.lifecycle.lock().unwrap();
        if !matches!(*lifecycle, LifecycleState::ShutDown) {
            *lifecycle = LifecycleState::Disconnected;
        }
    }

    /// Idempotent, terminal: fires the shutdown signal, drains every
    /// pending reply-sink with [`LifecycleError::ShuttingDown`], then
    /// disconnects if still connected.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_fired() {
            return;
        }
        self.inner.shutdown.fire();
        self.inner
            .registry
            .drain_all(|| LifecycleError::ShuttingDown.into());
        self.disconnect_only().await;
        *self.inner.lifecycle.lock().unwrap() = LifecycleState::ShutDown;
    }

    /// Wait for shutdown to have been initiated (by [`Self::shutdown`] or
    /// a disconnect with auto-reconnect disabled), then join every
    /// background task. Returns once no task is running and the send
    /// queues are empty.
    pub async fn wait_for_shutdown(&self) {
        self.inner.shutdown.wait().await;
        if let Some((reader, writer)) = self.inner.current_io.lock().await.take() {
            let _ = reader.await;
            let _ = writer.await;
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }
    }

    /// The methods excluded from automatic resend after a reconnect.
    pub fn do_not_resend(&self) -> &HashSet<String> {
        &self.inner.config.do_not_resend
    }
}
