// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Connection configuration: endpoint address grammar, TLS/proxy options,
//! and the knobs that shape reconnect/resend behaviour.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::auth::Credentials;
use crate::error::Error;

/// A parsed endpoint address.
///
/// Supported grammar:
/// - `host:port` or `[ipv6]:port` — TCP, resolved against `host`.
/// - `port` alone — shorthand for `localhost:port`.
/// - `unix:///path/to/socket` — a Unix domain stream socket.
/// - `unixpacket:///path/to/socket` — a Unix domain datagram socket.
///
/// Any other `scheme://` prefix is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A TCP host/port pair.
    Tcp {
        /// The hostname or IP literal (brackets stripped for IPv6).
        host: String,
        /// The port.
        port: u16,
    },
    /// A Unix domain stream socket.
    Unix(PathBuf),
    /// A Unix domain datagram socket.
    UnixPacket(PathBuf),
}

impl Endpoint {
    /// Parse an address string per the supported grammar.
    pub fn parse(address: &str) -> Result<Self, Error> {
        if let Some(path) = address.strip_prefix("unix://") {
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if let Some(path) = address.strip_prefix("unixpacket://") {
            return Ok(Endpoint::UnixPacket(PathBuf::from(path)));
        }
        if address.contains("://") {
            return Err(Error::InvalidEndpoint(address.to_string()));
        }
        if let Ok(port) = address.parse::<u16>() {
            return Ok(Endpoint::Tcp {
                host: "localhost".to_string(),
                port,
            });
        }
        if let Some(rest) = address.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| Error::InvalidEndpoint(address.to_string()))?;
            let port = after
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(|| Error::InvalidEndpoint(address.to_string()))?;
            return Ok(Endpoint::Tcp {
                host: host.to_string(),
                port,
            });
        }
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidEndpoint(address.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidEndpoint(address.to_string()))?;
        if host.is_empty() {
            return Err(Error::InvalidEndpoint(address.to_string()));
        }
        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// Build the `ws://`/`wss://` URL used for the persistent-socket
    /// handshake request line. For a Unix domain socket there is no real
    /// host to address (the connection is dialed separately via the
    /// filesystem path), so a synthetic `localhost` authority is used;
    /// it only ever appears in the `Host` header of the upgrade request.
    pub fn ws_url(&self, disable_tls: bool, endpoint_path: &str) -> String {
        let scheme = if disable_tls { "ws" } else { "wss" };
        match self {
            Endpoint::Tcp { host, port } => {
                format!("{scheme}://{host}:{port}{}", with_leading_slash(endpoint_path))
            }
            Endpoint::Unix(_) | Endpoint::UnixPacket(_) => {
                format!("{scheme}://localhost{}", with_leading_slash(endpoint_path))
            }
        }
    }

    /// Build the `http://`/`https://` URL used for a one-shot HTTP
    /// exchange. Unix domain sockets are not dialable over plain HTTP with
    /// this crate's transport stack.
    pub fn http_url(&self, disable_tls: bool, endpoint_path: &str) -> Result<String, Error> {
        let scheme = if disable_tls { "http" } else { "https" };
        match self {
            Endpoint::Tcp { host, port } => Ok(format!(
                "{scheme}://{host}:{port}{}",
                with_leading_slash(endpoint_path)
            )),
            Endpoint::Unix(path) | Endpoint::UnixPacket(path) => Err(Error::InvalidEndpoint(
                format!("{} (one-shot HTTP mode does not support unix sockets)", path.display()),
            )),
        }
    }
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Proxy configuration for outbound connections.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// The proxy's address, in the same grammar as [`Endpoint`].
    pub address: String,
    /// Optional proxy username.
    pub user: Option<String>,
    /// Optional proxy password.
    pub pass: Option<String>,
}

/// The full set of options governing a connection to a node.
#[derive(Clone)]
pub struct ConnConfig {
    /// The node's address, in the [`Endpoint`] grammar.
    pub address: String,
    /// The JSON-RPC endpoint path, appended to the address for HTTP mode
    /// (e.g. `/` or a wallet-scoped path).
    pub endpoint_path: String,
    /// How to authenticate to the node.
    pub credentials: Option<Credentials>,
    /// An opaque chain-parameters selector, forwarded verbatim to whatever
    /// command catalogue the caller brings; this crate does not interpret it.
    pub chain_params: Option<String>,
    /// Disable TLS even if the scheme/port would suggest it.
    pub disable_tls: bool,
    /// A PEM-encoded certificate bundle to trust, in addition to the system
    /// roots.
    pub tls_cert_bundle: Option<Vec<u8>>,
    /// An optional SOCKS/HTTP proxy to dial through.
    pub proxy: Option<ProxyConfig>,
    /// Disable the automatic reconnect supervisor.
    pub disable_auto_reconnect: bool,
    /// Don't dial immediately on construction; wait for an explicit
    /// `connect()` call.
    pub disable_connect_on_new: bool,
    /// Use the one-shot HTTP engine instead of the persistent socket, even
    /// if the caller never subscribes to notifications.
    pub one_shot_mode: bool,
    /// Extra headers to send with every HTTP or upgrade request.
    pub extra_headers: Vec<(String, String)>,
    /// Relax strict JSON-RPC 2.0 framing to tolerate known non-conformant
    /// servers (e.g. accept a bare result where an envelope is expected).
    pub compatibility_hacks: bool,
    /// Methods that should not be automatically resent after a reconnect.
    /// Defaults to [`default_do_not_resend`].
    pub do_not_resend: HashSet<String>,
}

impl ConnConfig {
    /// Start building a configuration for `address`, with every other
    /// option at its documented default.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            endpoint_path: "/".to_string(),
            credentials: None,
            chain_params: None,
            disable_tls: false,
            tls_cert_bundle: None,
            proxy: None,
            disable_auto_reconnect: false,
            disable_connect_on_new: false,
            one_shot_mode: false,
            extra_headers: Vec::new(),
            compatibility_hacks: false,
            do_not_resend: default_do_not_resend(),
        }
    }

    /// Validate and parse [`Self::address`] into an [`Endpoint`].
    pub fn parsed_endpoint(&self) -> Result<Endpoint, Error> {
        Endpoint::parse(&self.address)
    }

    /// Set direct username/password credentials.
    pub fn with_user_pass(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::UserPass {
            user: user.into(),
            pass: pass.into(),
        });
        self
    }

    /// Set a cookie-file path to authenticate with.
    pub fn with_cookie_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials = Some(Credentials::CookieFile(path.into()));
        self
    }

    /// Replace the "do not resend" method set entirely.
    pub fn with_do_not_resend(mut self, methods: HashSet<String>) -> Self {
        self.do_not_resend = methods;
        self
    }
}

/// The default set of methods excluded from automatic resend after a
/// reconnect: long-running or explicitly one-shot operations whose silent
/// re-invocation would surprise a caller.
pub fn default_do_not_resend() -> HashSet<String> {
    ["rescanblocks"].into_iter().map(String::from).collect()
}
