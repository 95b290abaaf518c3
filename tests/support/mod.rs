// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Scriptable in-process mock servers used by the scenario tests: a mock
//! WebSocket server for the persistent-socket engine, and a mock HTTP
//! server for the one-shot/batch engine. Both accept real loopback TCP
//! connections rather than faking the transport, so the tests exercise the
//! crate's actual dial/read/write paths.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

enum ServerCommand {
    Send(String),
    CloseConnection,
}

/// A mock WebSocket server that accepts connections one at a time (as a
/// reconnecting persistent-socket client would dial), recording every text
/// frame it receives and letting a test push frames to, or close, whichever
/// connection is currently live.
pub struct MockWsServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    send_tx: mpsc::UnboundedSender<ServerCommand>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (send_tx, mut send_rx) = mpsc::unbounded_channel::<ServerCommand>();

        let received_task = received.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();

                loop {
                    tokio::select! {
                        message = read.next() => {
                            match message {
                                Some(Ok(Message::Text(t))) => {
                                    let bytes = t.into_bytes();
                                    received_task.lock().unwrap().push(String::from_utf8(bytes).unwrap());
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Err(_)) => break,
                                _ => {}
                            }
                        }
                        command = send_rx.recv() => {
                            match command {
                                Some(ServerCommand::Send(text)) => {
                                    let _ = write.send(Message::Text(text.into())).await;
                                }
                                Some(ServerCommand::CloseConnection) => {
                                    let _ = write.close().await;
                                    break;
                                }
                                None => return,
                            }
                        }
                    }
                }
            }
        });

        Self {
            addr,
            received,
            send_tx,
        }
    }

    /// Push a text frame to whichever connection is currently live.
    pub fn send(&self, text: impl Into<String>) {
        let _ = self.send_tx.send(ServerCommand::Send(text.into()));
    }

    /// Close the current connection, as if the node had dropped the client.
    pub fn close_connection(&self) {
        let _ = self.send_tx.send(ServerCommand::CloseConnection);
    }

    /// Every text frame received so far, across every connection, in order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// The address in the `host:port` grammar `ConnConfig` expects.
    pub fn address(&self) -> String {
        format!("{}:{}", self.addr.ip(), self.addr.port())
    }
}

/// A mock HTTP server for the one-shot/batch engine: reads one request per
/// connection, replies with the next scripted response body (200 OK,
/// `application/json`), then closes the connection.
pub struct MockHttpServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockHttpServer {
    pub async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::new(Mutex::new(responses.into_iter().collect::<VecDeque<_>>()));

        let received_task = received.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let body = match read_http_request_body(&mut stream).await {
                    Some(body) => body,
                    None => continue,
                };
                received_task.lock().unwrap().push(body);

                let response_body = queue
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| "{}".to_string());
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response_body.len(),
                    response_body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { addr, received }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.addr.ip(), self.addr.port())
    }
}

async fn read_http_request_body(stream: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]);
    let content_length: usize = header_text
        .lines()
        .find_map(|line| line.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(String::from_utf8_lossy(&buf[header_end..header_end + content_length]).into_owned())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Poll `cond` every 10ms until it's true, or panic after two seconds.
/// Scenario tests use this instead of a fixed sleep so they don't race the
/// mock server's background task.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition was never met within 2s");
}
