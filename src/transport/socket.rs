// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! The persistent-socket engine: a split reader/writer pair driving a
//! long-lived WebSocket connection, used whenever the client needs to
//! receive server-initiated notifications.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::auth::CredentialProvider;
use crate::codec::{self, Frame};
use crate::config::Endpoint;
use crate::error::{Error, TransportError};
use crate::registry::{Registry, Reply};
use crate::signals::{OnceSignal, ResettableSignal};

/// A dialed persistent connection, over either a TCP (optionally TLS'd) or
/// a Unix domain stream socket. Kept as a small enum rather than a boxed
/// trait object so the reader/writer tasks can be monomorphized per
/// transport kind.
pub enum DialedSocket {
    /// A TCP (optionally TLS) connection, the common case.
    Tcp(WebSocketStream<MaybeTlsStream<TcpStream>>),
    /// A Unix domain stream socket connection.
    Unix(WebSocketStream<UnixStream>),
}

/// A single decoded server-initiated notification.
#[derive(Debug)]
pub struct Notification {
    /// The notification method name.
    pub method: String,
    /// The notification's raw parameters.
    pub params: Box<serde_json::value::RawValue>,
}

/// How many outbound frames may be queued before `send` applies
/// backpressure to the caller.
const SEND_QUEUE_CAPACITY: usize = 50;

/// A cheap-to-clone handle for submitting frames to a running socket
/// engine's writer task.
#[derive(Clone)]
pub struct SocketHandle {
    outbound: mpsc::Sender<Vec<u8>>,
}

impl SocketHandle {
    /// Queue `bytes` for transmission. Fails if the writer task has already
    /// exited (the connection has dropped), racing the disconnect signal so
    /// callers see a stable error rather than a hang.
    pub async fn send(&self, bytes: Vec<u8>, disconnected: &ResettableSignal) -> Result<(), Error> {
        tokio::select! {
            result = self.outbound.send(bytes) => {
                result.map_err(|_| TransportError::Write("socket writer has exited".into()).into())
            }
            _ = disconnected.wait_until_set() => {
                Err(TransportError::Write("socket disconnected while sending".into()).into())
            }
        }
    }
}

fn build_request(
    url: &str,
    extra_headers: &[(String, String)],
    credentials: Option<&CredentialProvider>,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, Error> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Dial(e.to_string()))?;
    if let Some(provider) = credentials {
        let (user, pass) = provider.resolve()?;
        let value = crate::auth::basic_auth_header(&user, &pass);
        let value = tokio_tungstenite::tungstenite::http::HeaderValue::try_from(value)
            .map_err(|e| TransportError::Dial(e.to_string()))?;
        request
            .headers_mut()
            .insert(tokio_tungstenite::tungstenite::http::header::AUTHORIZATION, value);
    }
    for (name, value) in extra_headers {
        let name = tokio_tungstenite::tungstenite::http::HeaderName::try_from(name.as_str())
            .map_err(|e| TransportError::Dial(e.to_string()))?;
        let value = tokio_tungstenite::tungstenite::http::HeaderValue::try_from(value.as_str())
            .map_err(|e| TransportError::Dial(e.to_string()))?;
        request.headers_mut().insert(name, value);
    }
    Ok(request)
}

/// Dial `endpoint`, performing the WebSocket upgrade with basic-auth (if
/// `credentials` resolves to any) and any `extra_headers` merged into the
/// handshake request. `url` carries the `ws://`/`wss://` URL used for the
/// handshake request line itself (for a Unix socket, this is a synthetic
/// `ws://localhost/...` URL: the request's `Host` header is not meaningful
/// once the underlying transport is a local socket, but the upgrade
/// handshake still needs a well-formed request).
pub async fn dial(
    endpoint: &Endpoint,
    url: &str,
    extra_headers: &[(String, String)],
    credentials: Option<&CredentialProvider>,
) -> Result<DialedSocket, Error> {
    match endpoint {
        Endpoint::Tcp { .. } => {
            let request = build_request(url, extra_headers, credentials)?;
            let (stream, _response) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| TransportError::Dial(e.to_string()))?;
            Ok(DialedSocket::Tcp(stream))
        }
        Endpoint::Unix(path) => {
            let request = build_request(url, extra_headers, credentials)?;
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| TransportError::Dial(e.to_string()))?;
            let (ws, _response) = tokio_tungstenite::client_async(request, stream)
                .await
                .map_err(|e| TransportError::Dial(e.to_string()))?;
            Ok(DialedSocket::Unix(ws))
        }
        Endpoint::UnixPacket(_) => Err(TransportError::Dial(
            "unixpacket sockets are not supported by the persistent notification transport"
                .to_string(),
        )
        .into()),
    }
}

/// Dispatch to the generic [`spawn`] for whichever transport kind was
/// actually dialed.
pub fn spawn_dialed(
    dialed: DialedSocket,
    registry: Arc<Registry>,
    notifications: mpsc::UnboundedSender<Notification>,
    disconnected: Arc<ResettableSignal>,
    shutdown: Arc<OnceSignal>,
) -> (
    SocketHandle,
    tokio::task::JoinHandle<()>,
    tokio::task::JoinHandle<()>,
) {
    match dialed {
        DialedSocket::Tcp(ws) => spawn(ws, registry, notifications, disconnected, shutdown),
        DialedSocket::Unix(ws) => spawn(ws, registry, notifications, disconnected, shutdown),
    }
}

/// Spawn the reader and writer tasks driving `ws`. Returns a handle for
/// submitting outbound frames and the two task handles, so callers can
/// detect exit without polling.
///
/// The reader task dispatches `Response` frames to their pending request's
/// reply-sink via `registry`, and forwards `Notification` frames on
/// `notifications`. Either task exiting (on I/O error or peer close) sets
/// `disconnected`, which the reconnect supervisor and [`SocketHandle::send`]
/// both observe.
pub fn spawn<S>(
    ws: WebSocketStream<S>,
    registry: Arc<Registry>,
    notifications: mpsc::UnboundedSender<Notification>,
    disconnected: Arc<ResettableSignal>,
    shutdown: Arc<OnceSignal>,
) -> (
    SocketHandle,
    tokio::task::JoinHandle<()>,
    tokio::task::JoinHandle<()>,
)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(SEND_QUEUE_CAPACITY);

    let writer_disconnected = disconnected.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = writer_disconnected.wait_until_set() => {
                    let _ = write.close().await;
                    outbound_rx.close();
                    while outbound_rx.try_recv().is_ok() {}
                    return;
                }
                frame = outbound_rx.recv() => {
                    let Some(bytes) = frame else { return };
                    if let Err(e) = write
                        .send(Message::Text(String::from_utf8_lossy(&bytes).into_owned().into()))
                        .await
                    {
                        tracing::debug!(target: crate::LOG_TARGET, error = %e, "socket write failed");
                        writer_disconnected.set();
                    }
                }
            }
        }
    });

    let reader = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    disconnected.set();
                    return;
                }
                m = read.next() => m,
            };
            let Some(message) = message else {
                tracing::debug!(target: crate::LOG_TARGET, "socket closed by peer");
                disconnected.set();
                return;
            };
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(target: crate::LOG_TARGET, error = %e, "socket read failed");
                    disconnected.set();
                    return;
                }
            };
            let bytes = match message {
                Message::Text(t) => t.into_bytes(),
                Message::Binary(b) => b.into(),
                Message::Close(_) => {
                    disconnected.set();
                    return;
                }
                _ => continue,
            };

            match codec::parse_frame(&bytes) {
                Ok(Some(Frame::Response { id, outcome })) => {
                    if let Some(pending) = registry.remove(id) {
                        let reply = match outcome {
                            Ok(result) => Reply::Result(result),
                            Err(remote) => Reply::Remote(remote),
                        };
                        let _ = pending.reply_to.send(reply);
                    }
                }
                Ok(Some(Frame::Notification { method, params })) => {
                    let _ = notifications.send(Notification { method, params });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(target: crate::LOG_TARGET, error = %e, "dropping unparseable frame");
                }
            }
        }
    });

    (
        SocketHandle {
            outbound: outbound_tx,
        },
        reader,
        writer,
    )
}
