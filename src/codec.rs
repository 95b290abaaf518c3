// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Parsing of inbound JSON-RPC frames and serialization of outbound ones.
//!
//! Inbound framing follows JSON-RPC 1.0: a server-to-client frame is a
//! notification when `id` is null or absent, otherwise it is a response.
//! Outbound framing is JSON-RPC 1.0 by default and JSON-RPC 2.0 when part
//! of a batch (each element then carries `"jsonrpc":"2.0"`).

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::Error;

/// A remote JSON-RPC error object: `{code, message}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteError {
    /// The JSON-RPC error code.
    pub code: i64,
    /// The human-readable error message.
    pub message: String,
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        Error::Remote {
            code: e.code,
            message: e.message,
        }
    }
}

/// A decoded server-to-client frame.
#[derive(Debug)]
pub enum Frame {
    /// A reply to a previously-submitted request.
    Response {
        /// The id the reply correlates to.
        id: u64,
        /// The outcome: either raw result bytes or a remote error.
        outcome: std::result::Result<Box<RawValue>, RemoteError>,
    },
    /// A server-initiated notification, not correlated to any request.
    Notification {
        /// The notification method name.
        method: String,
        /// The notification's parameters, as a raw JSON array.
        params: Box<RawValue>,
    },
}

/// The raw shape we expect server frames to (roughly) conform to. Every
/// field is optional at this layer; validity is enforced by [`parse_frame`].
#[derive(Debug, Deserialize)]
struct RawFrame<'a> {
    #[serde(borrow)]
    id: Option<&'a RawValue>,
    method: Option<String>,
    #[serde(borrow)]
    params: Option<&'a RawValue>,
    #[serde(borrow)]
    result: Option<&'a RawValue>,
    error: Option<RemoteError>,
}

/// Parse one inbound frame. Returns `Ok(None)` for malformed frames that
/// should be logged and dropped rather than treated as fatal.
pub fn parse_frame(bytes: &[u8]) -> Result<Option<Frame>, serde_json::Error> {
    let raw: RawFrame = match serde_json::from_slice(bytes) {
        Ok(raw) => raw,
        Err(e) => return Err(e),
    };

    let is_notification = match raw.id {
        None => true,
        Some(id) => id.get() == "null",
    };

    if is_notification {
        let Some(method) = raw.method.filter(|m| !m.is_empty()) else {
            tracing::debug!(target: crate::LOG_TARGET, "dropping notification with missing/empty method");
            return Ok(None);
        };
        let Some(params) = raw.params else {
            tracing::debug!(target: crate::LOG_TARGET, method, "dropping notification with missing params");
            return Ok(None);
        };
        if params.get() == "null" {
            tracing::debug!(target: crate::LOG_TARGET, method, "dropping notification with null params");
            return Ok(None);
        }
        return Ok(Some(Frame::Notification {
            method,
            params: params.to_owned().into(),
        }));
    }

    let Some(id_raw) = raw.id else {
        unreachable!("is_notification would have been true");
    };
    let Some(id) = parse_id(id_raw) else {
        tracing::debug!(target: crate::LOG_TARGET, id = id_raw.get(), "dropping response with invalid id");
        return Ok(None);
    };

    let outcome = match (raw.result, raw.error) {
        (_, Some(err)) => Err(err),
        (Some(result), None) => Ok(result.to_owned().into()),
        (None, None) => {
            tracing::debug!(target: crate::LOG_TARGET, id, "dropping response with neither result nor error");
            return Ok(None);
        }
    };

    Ok(Some(Frame::Response { id, outcome }))
}

/// Accept only finite, non-negative, integer-valued ids, per the codec
/// rules: the id must be truncation-equal to itself when cast to `u64`.
fn parse_id(raw: &RawValue) -> Option<u64> {
    let n: f64 = serde_json::from_str(raw.get()).ok()?;
    if !n.is_finite() || n < 0.0 || n.trunc() != n {
        return None;
    }
    Some(n as u64)
}

/// An outbound JSON-RPC request frame, serialized once at submission time
/// and reused verbatim on resend.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    /// The fully serialized frame bytes, ready to write to the wire.
    pub bytes: Vec<u8>,
}

/// Serialize a single outbound request. `two_dot_oh` selects JSON-RPC 2.0
/// framing (used for batch elements); otherwise JSON-RPC 1.0 is emitted.
pub fn serialize_request(
    id: u64,
    method: &str,
    params: &RawValue,
    two_dot_oh: bool,
) -> RequestFrame {
    let bytes = if two_dot_oh {
        format!(
            r#"{{"jsonrpc":"2.0","id":{id},"method":{method},"params":{params}}}"#,
            method = serde_json::to_string(method).expect("string serializes"),
        )
        .into_bytes()
    } else {
        format!(
            r#"{{"jsonrpc":"1.0","id":{id},"method":{method},"params":{params}}}"#,
            method = serde_json::to_string(method).expect("string serializes"),
        )
        .into_bytes()
    };
    RequestFrame { bytes }
}

/// Concatenate serialized request frames into one JSON array frame, as
/// required for a batch exchange.
pub fn frame_batch<'a>(frames: impl Iterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.push(b'[');
    for (i, frame) in frames.enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(frame);
    }
    out.push(b']');
    out
}

/// One element of a parsed batch response array.
#[derive(Debug, Deserialize)]
pub struct BatchElement {
    /// The id the element correlates to.
    pub id: u64,
    /// The raw result, if any.
    pub result: Option<Box<RawValue>>,
    /// The remote error, if any.
    pub error: Option<RemoteError>,
}

/// Parse a raw batch response body into its individual elements.
pub fn parse_batch_response(body: &[u8]) -> Result<Vec<BatchElement>, serde_json::Error> {
    serde_json::from_slice(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str) -> Box<RawValue> {
        RawValue::from_string(s.to_string()).unwrap()
    }

    #[test]
    fn parses_simple_response() {
        let frame = parse_frame(br#"{"result":42,"error":null,"id":1}"#)
            .unwrap()
            .unwrap();
        match frame {
            Frame::Response { id, outcome } => {
                assert_eq!(id, 1);
                assert_eq!(outcome.unwrap().get(), "42");
            }
            _ => panic!("expected a response"),
        }
    }

    #[test]
    fn parses_remote_error() {
        let frame = parse_frame(
            br#"{"result":null,"error":{"code":-32601,"message":"Method not found"},"id":7}"#,
        )
        .unwrap()
        .unwrap();
        match frame {
            Frame::Response { id, outcome } => {
                assert_eq!(id, 7);
                let err = outcome.unwrap_err();
                assert_eq!(err.code, -32601);
                assert_eq!(err.message, "Method not found");
            }
            _ => panic!("expected a response"),
        }
    }

    #[test]
    fn parses_notification() {
        let frame = parse_frame(br#"{"id":null,"method":"blockconnected","params":["HASH",123]}"#)
            .unwrap()
            .unwrap();
        match frame {
            Frame::Notification { method, params } => {
                assert_eq!(method, "blockconnected");
                assert_eq!(params.get(), r#"["HASH",123]"#);
            }
            _ => panic!("expected a notification"),
        }
    }

    #[test]
    fn drops_notification_with_null_params() {
        let frame = parse_frame(br#"{"id":null,"method":"x","params":null}"#).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn drops_response_with_non_integer_id() {
        let frame = parse_frame(br#"{"result":1,"id":1.5}"#).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn drops_response_with_negative_id() {
        let frame = parse_frame(br#"{"result":1,"id":-1}"#).unwrap();
        assert!(frame.is_none());
    }

    #[test]
    fn serializes_json_rpc_1_0_by_default() {
        let req = serialize_request(5, "getblockcount", &raw("[]"), false);
        let s = String::from_utf8(req.bytes).unwrap();
        assert!(s.contains(r#""jsonrpc":"1.0""#));
        assert!(s.contains(r#""id":5"#));
    }

    #[test]
    fn serializes_json_rpc_2_0_for_batch() {
        let req = serialize_request(5, "getblockcount", &raw("[]"), true);
        let s = String::from_utf8(req.bytes).unwrap();
        assert!(s.contains(r#""jsonrpc":"2.0""#));
    }

    #[test]
    fn frames_a_batch_array() {
        let a = b"{\"a\":1}".to_vec();
        let b = b"{\"b\":2}".to_vec();
        let framed = frame_batch([a.as_slice(), b.as_slice()].into_iter());
        assert_eq!(framed, b"[{\"a\":1},{\"b\":2}]");
    }

    #[test]
    fn parses_batch_response_array() {
        let elems = parse_batch_response(
            br#"[{"id":101,"result":"b"},{"id":100,"result":"a"},{"id":102,"error":{"code":-1,"message":"x"}}]"#,
        )
        .unwrap();
        assert_eq!(elems.len(), 3);
        assert_eq!(elems[0].id, 101);
        assert_eq!(elems[2].error.as_ref().unwrap().code, -1);
    }
}
