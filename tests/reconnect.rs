// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Reconnect scenarios: resend of in-flight requests after a dropped
//! connection, and replay of subscription state.

mod support;

use tokio::time::{timeout, Duration};

use rpcclient::{empty_params, Client, ConnConfig};
use support::{wait_for, MockWsServer};

fn persistent_config(address: String) -> ConnConfig {
    let mut config = ConnConfig::new(address);
    config.disable_tls = true;
    config
}

#[tokio::test]
async fn reconnect_resends_in_flight_requests_in_submission_order() {
    let server = MockWsServer::start().await;
    let client = Client::builder(persistent_config(server.address()))
        .build()
        .await
        .expect("client connects to the mock server");

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.call("getblockhash", &empty_params()).await }
    });
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.call("getblockhash", &empty_params()).await }
    });

    wait_for(|| server.received().len() == 2).await;
    assert!(server.received()[0].contains(r#""id":1"#));
    assert!(server.received()[1].contains(r#""id":2"#));

    // The mock server's accept loop stays up, so the supervisor's redial
    // succeeds on its first attempt with no backoff wait.
    server.close_connection();

    wait_for(|| server.received().len() == 4).await;
    let resent = &server.received()[2..4];
    assert!(resent[0].contains(r#""id":1"#));
    assert!(resent[1].contains(r#""id":2"#));

    server.send(r#"{"result":"first","error":null,"id":1}"#);
    server.send(r#"{"result":"second","error":null,"id":2}"#);

    let first = timeout(Duration::from_secs(5), first)
        .await
        .unwrap()
        .unwrap()
        .expect("first call eventually resolves via the resend");
    let second = timeout(Duration::from_secs(5), second)
        .await
        .unwrap()
        .unwrap()
        .expect("second call eventually resolves via the resend");
    assert_eq!(first.get(), "\"first\"");
    assert_eq!(second.get(), "\"second\"");

    client.shutdown().await;
    client.wait_for_shutdown().await;
}

#[tokio::test]
async fn reconnect_replays_every_subscribed_kind_exactly_once() {
    let server = MockWsServer::start().await;
    let client = Client::builder(persistent_config(server.address()))
        .build()
        .await
        .expect("client connects to the mock server");

    let subscribe_blocks = tokio::spawn({
        let client = client.clone();
        async move { client.subscribe_blocks().await }
    });
    wait_for(|| server.received().len() == 1).await;
    server.send(r#"{"result":true,"error":null,"id":1}"#);
    subscribe_blocks
        .await
        .unwrap()
        .expect("subscribe_blocks succeeds");

    let subscribe_addresses = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .subscribe_received(vec!["A".to_string(), "B".to_string()])
                .await
        }
    });
    wait_for(|| server.received().len() == 2).await;
    server.send(r#"{"result":true,"error":null,"id":2}"#);
    subscribe_addresses
        .await
        .unwrap()
        .expect("subscribe_received succeeds");

    server.close_connection();

    // Exactly one block-subscribe and one address-subscribe (carrying both
    // addresses) are replayed; no live requests to resend since both
    // subscribe calls already completed before the drop.
    wait_for(|| server.received().len() == 4).await;
    let replayed = &server.received()[2..4];
    assert!(replayed.iter().any(|frame| frame.contains("notifyblocks")));
    assert!(replayed
        .iter()
        .any(|frame| frame.contains("notifyreceived") && frame.contains('A') && frame.contains('B')));

    client.shutdown().await;
    client.wait_for_shutdown().await;
}
