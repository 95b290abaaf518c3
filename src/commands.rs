// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! A small stand-in command catalogue.
//!
//! The real catalogue of typed command structs and their result types is an
//! external collaborator (out of scope for this crate, see the crate docs):
//! production code is expected to bring its own `Command`-shaped enum (or a
//! per-command struct implementing [`Serialize`]) and feed its method name
//! and parameters into [`crate::client::Client`]. This module exists only so
//! the core transport can be exercised end-to-end in tests and examples.

use serde::Serialize;
use serde_json::value::RawValue;

/// A minimal tagged union of commands, sufficient to drive the core
/// end-to-end. Mirrors the shape (one variant per RPC call, parameters
/// carried on the variant) that a generated command catalogue would have.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// `getblockcount`: no parameters.
    GetBlockCount,
    /// `getblockhash height`.
    GetBlockHash {
        /// The block height.
        height: u64,
    },
    /// `notifyblocks`: subscribe to block-connected/disconnected events.
    NotifyBlocks,
    /// `notifynewtransactions verbose`: subscribe to new-transaction events.
    NotifyNewTransactions {
        /// Whether to receive full transaction bodies.
        verbose: bool,
    },
    /// `notifyspent outpoints`: subscribe to spend notifications.
    NotifySpent {
        /// The outpoints to watch, as `"txid:vout"` strings.
        outpoints: Vec<String>,
    },
    /// `notifyreceived addresses`: subscribe to receive notifications.
    NotifyReceived {
        /// The addresses to watch.
        addresses: Vec<String>,
    },
    /// `rescanblocks ...`: a long-running scan, excluded from resend by
    /// default (see [`crate::config::default_do_not_resend`]).
    RescanBlocks {
        /// The block hashes to rescan.
        block_hashes: Vec<String>,
    },
}

impl Command {
    /// The JSON-RPC method name for this command.
    pub fn method_name(&self) -> &'static str {
        match self {
            Command::GetBlockCount => "getblockcount",
            Command::GetBlockHash { .. } => "getblockhash",
            Command::NotifyBlocks => "notifyblocks",
            Command::NotifyNewTransactions { .. } => "notifynewtransactions",
            Command::NotifySpent { .. } => "notifyspent",
            Command::NotifyReceived { .. } => "notifyreceived",
            Command::RescanBlocks { .. } => "rescanblocks",
        }
    }

    /// Serialize this command's arguments as a JSON array, the shape every
    /// JSON-RPC 1.0/2.0 `params` field requires.
    pub fn params(&self) -> Box<RawValue> {
        let value = match self {
            Command::GetBlockCount | Command::NotifyBlocks => serde_json::json!([]),
            Command::GetBlockHash { height } => serde_json::json!([height]),
            Command::NotifyNewTransactions { verbose } => serde_json::json!([verbose]),
            Command::NotifySpent { outpoints } => serde_json::json!([outpoints]),
            Command::NotifyReceived { addresses } => serde_json::json!([addresses]),
            Command::RescanBlocks { block_hashes } => serde_json::json!([block_hashes]),
        };
        RawValue::from_string(value.to_string()).expect("serde_json::json! produces valid JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_match_catalogue() {
        assert_eq!(Command::GetBlockCount.method_name(), "getblockcount");
        assert_eq!(
            Command::GetBlockHash { height: 1 }.method_name(),
            "getblockhash"
        );
    }

    #[test]
    fn params_serialize_as_json_arrays() {
        assert_eq!(Command::GetBlockCount.params().get(), "[]");
        assert_eq!(Command::GetBlockHash { height: 7 }.params().get(), "[7]");
        assert_eq!(
            Command::NotifyReceived {
                addresses: vec!["A".into(), "B".into()]
            }
            .params()
            .get(),
            r#"["A","B"]"#
        );
    }
}
