// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! One-shot HTTP scenarios: a simple exchange, and a batch fan-out whose
//! response arrives out of order with a mix of results and a remote error.

mod support;

use rpcclient::{empty_params, Client, ConnConfig, Error, LifecycleError, PendingReply};
use support::MockHttpServer;

fn one_shot_config(address: String) -> ConnConfig {
    let mut config = ConnConfig::new(address);
    config.disable_tls = true;
    config.one_shot_mode = true;
    config
}

#[tokio::test]
async fn one_shot_request_round_trips_over_http() {
    let server = MockHttpServer::start(vec![r#"{"result":99,"error":null,"id":1}"#.to_string()]).await;
    let client = Client::builder(one_shot_config(server.address()))
        .build()
        .await
        .expect("one-shot client builds without dialing a socket");

    let result = client
        .call("getblockcount", &empty_params())
        .await
        .expect("exchange succeeds");
    assert_eq!(result.get(), "99");

    assert_eq!(server.received().len(), 1);
    assert!(server.received()[0].contains("getblockcount"));
}

#[tokio::test]
async fn batch_flush_fans_out_replies_by_id_despite_out_of_order_response() {
    // The node's response reorders the elements relative to submission and
    // includes an error for the third command — ids below match the
    // sequence this client's own id generator hands out (1, 2, 3).
    let response =
        r#"[{"id":2,"result":"b"},{"id":1,"result":"a"},{"id":3,"error":{"code":-1,"message":"x"}}]"#;
    let server = MockHttpServer::start(vec![response.to_string()]).await;
    let client = Client::builder(one_shot_config(server.address()))
        .build()
        .await
        .expect("one-shot client builds without dialing a socket");

    let first = client
        .batch_add("cmd_a", &empty_params())
        .await
        .expect("queues onto the batch");
    let second = client
        .batch_add("cmd_b", &empty_params())
        .await
        .expect("queues onto the batch");
    let third = client
        .batch_add("cmd_c", &empty_params())
        .await
        .expect("queues onto the batch");

    client.batch_flush().await.expect("batch exchange succeeds");

    let a = first.wait().await.expect("first result");
    let b = second.wait().await.expect("second result");
    let err = third.wait().await.expect_err("third carries a remote error");

    assert_eq!(a.get(), "\"a\"");
    assert_eq!(b.get(), "\"b\"");
    match err {
        Error::Remote { code, message } => {
            assert_eq!(code, -1);
            assert_eq!(message, "x");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }

    assert_eq!(server.received().len(), 1);
    let sent = &server.received()[0];
    assert!(sent.starts_with('['));
    assert!(sent.contains("cmd_a"));
    assert!(sent.contains("cmd_b"));
    assert!(sent.contains("cmd_c"));
}

#[tokio::test]
async fn batch_exchange_failure_leaves_reply_sinks_pending_until_shutdown() {
    // A non-JSON body with a 200 status is a final, non-retryable failure
    // (see `oneshot::looks_like_json_rpc`), so `exchange` returns quickly
    // without exhausting the retry budget.
    let server = MockHttpServer::start(vec!["not json".to_string()]).await;
    let client = Client::builder(one_shot_config(server.address()))
        .build()
        .await
        .expect("one-shot client builds without dialing a socket");

    let queued = client
        .batch_add("cmd_a", &empty_params())
        .await
        .expect("queues onto the batch");
    let PendingReply::Pending(mut rx) = queued else {
        panic!("a freshly queued batch entry is always still pending")
    };

    client
        .batch_flush()
        .await
        .expect_err("exchange-level failure propagates to the flushing caller");

    // The reply-sink must still be registered and unfulfilled: only the
    // lifecycle drain on shutdown may resolve it, not the failed flush.
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::oneshot::error::TryRecvError::Empty)
    ));

    client.shutdown().await;
    client.wait_for_shutdown().await;

    let reply = rx.await.expect("sink fulfilled by the lifecycle drain");
    let err = reply.into_result().expect_err("lifecycle drain fulfills with an error");
    assert!(matches!(err, Error::Lifecycle(LifecycleError::ShuttingDown)));
}

#[tokio::test]
async fn batch_parse_failure_leaves_reply_sinks_pending_until_shutdown() {
    // A 200 response whose body is valid JSON but not an array of batch
    // elements passes the transport-level check and fails at
    // `codec::parse_batch_response` instead.
    let server = MockHttpServer::start(vec!["{}".to_string()]).await;
    let client = Client::builder(one_shot_config(server.address()))
        .build()
        .await
        .expect("one-shot client builds without dialing a socket");

    let queued = client
        .batch_add("cmd_a", &empty_params())
        .await
        .expect("queues onto the batch");
    let PendingReply::Pending(mut rx) = queued else {
        panic!("a freshly queued batch entry is always still pending")
    };

    let err = client
        .batch_flush()
        .await
        .expect_err("parse-level failure propagates to the flushing caller");
    assert!(matches!(err, Error::Deserialization(_)));

    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::oneshot::error::TryRecvError::Empty)
    ));

    client.shutdown().await;
    client.wait_for_shutdown().await;

    let reply = rx.await.expect("sink fulfilled by the lifecycle drain");
    let err = reply.into_result().expect_err("lifecycle drain fulfills with an error");
    assert!(matches!(err, Error::Lifecycle(LifecycleError::ShuttingDown)));
}
