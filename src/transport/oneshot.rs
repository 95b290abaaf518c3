// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! The one-shot HTTP engine: a single POST/response exchange per call, used
//! for connections that never need server-initiated notifications, and for
//! every batch flush regardless of connection mode.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::auth::CredentialProvider;
use crate::error::{Error, LifecycleError, TransportError};
use crate::signals::OnceSignal;

/// How many outbound exchanges may be queued before `exchange` applies
/// backpressure to the caller.
const QUEUE_CAPACITY: usize = 100;

/// The maximum number of attempts made for a single exchange before giving
/// up and returning an error to the caller.
const MAX_ATTEMPTS: u32 = 10;

/// The per-attempt linear backoff step.
const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// The backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// The request timeout applied to each individual attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

struct Exchange {
    bytes: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<u8>, Error>>,
}

/// A cheap-to-clone handle for submitting request bodies to the one-shot
/// engine's consumer task and awaiting the matching response body.
#[derive(Clone)]
pub struct OneShotHandle {
    outbound: mpsc::Sender<Exchange>,
}

impl OneShotHandle {
    /// Submit `bytes` as an HTTP request body and await the response body.
    pub async fn exchange(&self, bytes: Vec<u8>) -> Result<Vec<u8>, Error> {
        let (tx, rx) = oneshot::channel();
        self.outbound
            .send(Exchange { bytes, reply: tx })
            .await
            .map_err(|_| TransportError::Http("one-shot engine has exited".into()))?;
        rx.await
            .map_err(|_| TransportError::Http("one-shot engine dropped the reply".into()).into())
            .and_then(|r| r)
    }
}

fn backoff_for(attempt: u32) -> Duration {
    std::cmp::min(BACKOFF_STEP * attempt, BACKOFF_CAP)
}

/// Spawn the one-shot engine's consumer task, POSTing each queued exchange
/// to `url` with basic auth resolved from `credentials` and `extra_headers`
/// merged in. Retries each exchange up to [`MAX_ATTEMPTS`] times with linear
/// backoff, aborting the backoff wait early if `shutdown` fires.
pub fn spawn(
    client: reqwest::Client,
    url: String,
    credentials: Option<Arc<CredentialProvider>>,
    extra_headers: Vec<(String, String)>,
    shutdown: Arc<OnceSignal>,
) -> (OneShotHandle, tokio::task::JoinHandle<()>) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Exchange>(QUEUE_CAPACITY);

    let task = tokio::spawn(async move {
        loop {
            let exchange = tokio::select! {
                biased;
                _ = shutdown.wait() => return,
                exchange = outbound_rx.recv() => exchange,
            };
            let Some(exchange) = exchange else { return };
            let result = run_with_retries(
                &client,
                &url,
                credentials.as_deref(),
                &extra_headers,
                exchange.bytes,
                &shutdown,
            )
            .await;
            let _ = exchange.reply.send(result);
        }
    });

    (
        OneShotHandle {
            outbound: outbound_tx,
        },
        task,
    )
}

/// The result of a single attempt: a transport failure (dial/write/read
/// never completed) is retried; anything else — including a non-2xx HTTP
/// status, which did complete a transport exchange — is final per §4.6.3.
enum AttemptOutcome {
    Transport(TransportError),
    Final(Error),
    Success(Vec<u8>),
}

async fn run_with_retries(
    client: &reqwest::Client,
    url: &str,
    credentials: Option<&CredentialProvider>,
    extra_headers: &[(String, String)],
    body: Vec<u8>,
    shutdown: &OnceSignal,
) -> Result<Vec<u8>, Error> {
    let mut last_err = TransportError::Http("no attempt was made".into());

    for attempt in 1..=MAX_ATTEMPTS {
        match attempt_once(client, url, credentials, extra_headers, &body).await {
            AttemptOutcome::Success(bytes) => return Ok(bytes),
            AttemptOutcome::Final(e) => return Err(e),
            AttemptOutcome::Transport(e) => {
                tracing::debug!(
                    target: crate::LOG_TARGET,
                    attempt,
                    error = %e,
                    "one-shot exchange attempt failed"
                );
                last_err = e;
            }
        }

        if attempt < MAX_ATTEMPTS {
            let wait = backoff_for(attempt);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.wait() => {
                    return Err(LifecycleError::ShuttingDown.into());
                }
            }
        }
    }

    Err(last_err.into())
}

async fn attempt_once(
    client: &reqwest::Client,
    url: &str,
    credentials: Option<&CredentialProvider>,
    extra_headers: &[(String, String)],
    body: &[u8],
) -> AttemptOutcome {
    let mut request = client
        .post(url)
        .timeout(REQUEST_TIMEOUT)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::CONNECTION, "close")
        .body(body.to_vec());

    if let Some(provider) = credentials {
        let (user, pass) = match provider.resolve() {
            Ok(creds) => creds,
            Err(e) => return AttemptOutcome::Final(Error::InvalidAuth(e.to_string())),
        };
        request = request.header(
            reqwest::header::AUTHORIZATION,
            crate::auth::basic_auth_header(&user, &pass),
        );
    }

    for (name, value) in extra_headers {
        request = request.header(name, value);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return AttemptOutcome::Transport(TransportError::Http(e.to_string())),
    };

    let status = response.status();
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => return AttemptOutcome::Transport(TransportError::Http(e.to_string())),
    };

    if !status.is_success() || !looks_like_json_rpc(&bytes) {
        let body = String::from_utf8_lossy(&bytes).chars().take(512).collect();
        return AttemptOutcome::Final(
            TransportError::HttpStatus {
                status: status.as_u16(),
                body,
            }
            .into(),
        );
    }

    AttemptOutcome::Success(bytes.to_vec())
}

/// A cheap well-formedness check applied regardless of status code: a 2xx
/// response with an empty or non-JSON body is just as much a final,
/// non-retryable outcome as a non-2xx one (§4.6 point 4). Full JSON-RPC
/// envelope validation (single response vs. batch array) is left to the
/// caller, which knows which shape it asked for.
fn looks_like_json_rpc(bytes: &[u8]) -> bool {
    !bytes.is_empty() && serde_json::from_slice::<serde_json::Value>(bytes).is_ok()
}
