// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! The crate-wide error type.

/// A convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while talking to a node.
///
/// This is the single error type returned from every public entry point.
/// It groups the four failure taxonomies described by the core: transport,
/// protocol, remote and lifecycle errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A transport-level failure: the dial, read or write itself failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The node's JSON-RPC server sent back a structured error object.
    #[error("remote error {code}: {message}")]
    Remote {
        /// The JSON-RPC error code.
        code: i64,
        /// The JSON-RPC error message.
        message: String,
    },

    /// A client-side lifecycle precondition was not met.
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// The response body could not be deserialized as JSON.
    #[error("failed to deserialize response: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The configured endpoint address does not match the supported grammar.
    #[error("invalid endpoint address {0:?}")]
    InvalidEndpoint(String),

    /// Credentials could not be resolved (cookie file unreadable, etc).
    #[error("invalid auth configuration: {0}")]
    InvalidAuth(String),
}

/// Transport-level failures: dialing, reading or writing the underlying
/// socket or HTTP connection failed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish the underlying connection.
    #[error("dial failed: {0}")]
    Dial(String),

    /// A read from the persistent socket failed or the peer closed it.
    #[error("read failed: {0}")]
    Read(String),

    /// A write to the persistent socket failed.
    #[error("write failed: {0}")]
    Write(String),

    /// The one-shot HTTP exchange failed after exhausting all retries.
    #[error("http request failed after retrying: {0}")]
    Http(String),

    /// The HTTP response carried a non-2xx status and an empty or
    /// non-JSON-RPC body; `body` is truncated to a reasonable length.
    #[error("http status {status}: {body}")]
    HttpStatus {
        /// The HTTP status code returned by the server.
        status: u16,
        /// The (possibly truncated) response body.
        body: String,
    },

    /// The underlying I/O operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by lifecycle preconditions: the client must be in a
/// particular state (connected, not shutting down, ...) for the operation
/// to proceed.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LifecycleError {
    /// No connection has ever been established.
    #[error("client is not connected")]
    NotConnected,

    /// The persistent socket is currently disconnected.
    #[error("client is currently disconnected")]
    Disconnected,

    /// The client has initiated (or completed) shutdown.
    #[error("client is shutting down")]
    ShuttingDown,

    /// `connect()` was called on an already-connected client.
    #[error("client is already connected")]
    AlreadyConnected,

    /// A persistent-socket-only operation was attempted on a one-shot client.
    #[error("client is not a persistent bidirectional client")]
    NotBidirectionalClient,

    /// `flush()` was called on an empty batch.
    #[error("batch is empty")]
    EmptyBatch,
}
