// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! A dual-mode JSON-RPC client for Bitcoin-style nodes.
//!
//! A [`client::Client`] multiplexes traffic over one of two transports,
//! chosen once at construction time via [`config::ConnConfig::one_shot_mode`]:
//!
//! - a persistent, bidirectional socket that carries request/response
//!   traffic alongside server-initiated notifications, automatically
//!   reconnecting with backoff and resending in-flight requests and
//!   subscriptions after a drop; or
//! - independent one-shot HTTP request/response exchanges, with no
//!   notification support and no reconnect supervisor.
//!
//! Batch accumulation ([`Client::batch_add`]/[`Client::batch_flush`]) is
//! available regardless of mode: queued requests are always exchanged as a
//! single JSON-RPC 2.0 array over the one-shot HTTP engine.
//!
//! ```rust,ignore
//! use rpcclient::{Client, ConnConfig};
//!
//! # async fn go() -> Result<(), rpcclient::Error> {
//! let client = Client::builder(ConnConfig::new("127.0.0.1:8332").with_user_pass("user", "pass"))
//!     .build()
//!     .await?;
//! let height = client.call("getblockcount", &rpcclient::empty_params()).await?;
//! client.shutdown().await;
//! client.wait_for_shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! This crate does not bring a typed command/response catalogue: callers
//! supply their own method names and parameters (see the `commands` module
//! docs for the minimal stand-in used by this crate's own tests).

mod auth;
mod batch;
mod client;
mod codec;
mod commands;
mod config;
mod error;
mod id;
mod notifications;
mod reconnect;
mod registry;
mod signals;
mod transport;

/// The `tracing` target used by every log emitted from this crate.
pub(crate) const LOG_TARGET: &str = "rpcclient";

pub use crate::auth::Credentials;
pub use crate::client::{Client, ClientBuilder, Mode, PendingReply};
pub use crate::codec::RemoteError;
pub use crate::commands::Command;
pub use crate::config::{ConnConfig, Endpoint, ProxyConfig};
pub use crate::error::{Error, LifecycleError, Result, TransportError};
pub use crate::notifications::{NotificationHandlers, NotificationState, Snapshot};
pub use crate::registry::Reply;

use serde_json::value::RawValue;

/// A convenience constructor for an empty JSON-RPC parameter array, for
/// commands that take none.
pub fn empty_params() -> Box<RawValue> {
    RawValue::from_string("[]".to_string()).expect("literal is valid JSON")
}
