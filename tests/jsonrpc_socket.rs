// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Persistent-socket scenarios: a simple request/response round trip, a
//! remote error, and a notification arriving interleaved with two replies.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::{timeout, Duration};

use rpcclient::{empty_params, Client, ConnConfig, Error, NotificationHandlers};
use support::{wait_for, MockWsServer};

fn persistent_config(address: String) -> ConnConfig {
    let mut config = ConnConfig::new(address);
    config.disable_tls = true;
    config
}

#[tokio::test]
async fn simple_request_round_trips() {
    let server = MockWsServer::start().await;
    let client = Client::builder(persistent_config(server.address()))
        .build()
        .await
        .expect("client connects to the mock server");

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call("getblockcount", &empty_params()).await }
    });

    wait_for(|| server.received().len() == 1).await;
    assert!(server.received()[0].contains(r#""id":1"#));
    server.send(r#"{"result":42,"error":null,"id":1}"#);

    let result = timeout(Duration::from_secs(5), call)
        .await
        .expect("call did not time out")
        .expect("task did not panic")
        .expect("call succeeded");
    assert_eq!(result.get(), "42");

    client.shutdown().await;
    client.wait_for_shutdown().await;
}

#[tokio::test]
async fn remote_error_is_surfaced_with_code_and_message() {
    let server = MockWsServer::start().await;
    let client = Client::builder(persistent_config(server.address()))
        .build()
        .await
        .expect("client connects to the mock server");

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call("nosuchmethod", &empty_params()).await }
    });

    wait_for(|| server.received().len() == 1).await;
    server.send(r#"{"result":null,"error":{"code":-32601,"message":"Method not found"},"id":1}"#);

    let err = timeout(Duration::from_secs(5), call)
        .await
        .expect("call did not time out")
        .expect("task did not panic")
        .expect_err("call should fail");
    match err {
        Error::Remote { code, message } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "Method not found");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }

    client.shutdown().await;
    client.wait_for_shutdown().await;
}

#[tokio::test]
async fn notification_interleaved_with_responses_is_routed_correctly() {
    let server = MockWsServer::start().await;
    let blocks_seen = Arc::new(AtomicUsize::new(0));
    let handlers = {
        let blocks_seen = blocks_seen.clone();
        NotificationHandlers {
            on_block: Some(Arc::new(move |_| {
                blocks_seen.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        }
    };

    let client = Client::builder(persistent_config(server.address()))
        .notification_handlers(handlers)
        .build()
        .await
        .expect("client connects to the mock server");

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.call("getblockcount", &empty_params()).await }
    });
    wait_for(|| server.received().len() == 1).await;
    server.send(r#"{"result":1,"error":null,"id":1}"#);
    let first = timeout(Duration::from_secs(5), first)
        .await
        .unwrap()
        .unwrap()
        .expect("first call succeeds");
    assert_eq!(first.get(), "1");

    // A notification arrives on its own, between the two responses.
    server.send(r#"{"id":null,"method":"blockconnected","params":["HASH",123]}"#);

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.call("getblockhash", &empty_params()).await }
    });
    wait_for(|| server.received().len() == 2).await;
    server.send(r#"{"result":"HASH","error":null,"id":2}"#);
    let second = timeout(Duration::from_secs(5), second)
        .await
        .unwrap()
        .unwrap()
        .expect("second call succeeds");
    assert_eq!(second.get(), "\"HASH\"");

    wait_for(|| blocks_seen.load(Ordering::SeqCst) == 1).await;

    client.shutdown().await;
    client.wait_for_shutdown().await;
}
