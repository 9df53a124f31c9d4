// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery toward the collector.
//!
//! The pipeline owns only the retry/requeue decision; everything about the
//! wire lives behind the [`Transport`] trait. The real implementation is
//! an HTTP POST of `{"logs": [...]}` with a bearer token; outcomes are
//! classified from the status code. A no-op implementation backs the
//! transport-disabled configuration.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::entry::LogEntry;

/// Result of one delivery attempt, as classified by the transport.
///
/// Every non-`Delivered` outcome leads to the same requeue behavior in
/// the worker; the distinction exists for local diagnostics and for the
/// per-flush attempt policy (auth and rate-limit failures are not
/// hammered with immediate retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 2xx; the batch is done and its entries are discarded.
    Delivered,
    /// 429; retry later.
    RateLimited,
    /// 401; logged as terminal for this attempt, but the entries are
    /// still requeued since the root cause may be transient token
    /// propagation.
    AuthFailed,
    /// Network error or any other non-2xx status.
    TransportError,
}

/// Boundary toward the collector.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[LogEntry]) -> SendOutcome;
}

#[derive(Serialize)]
struct LogsPayload<'a> {
    logs: &'a [LogEntry],
}

/// HTTP transport: `POST {endpoint}/api/logs` with a bearer credential.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    auth_token: String,
}

impl HttpTransport {
    /// Builds the transport for `endpoint`. The client is created once
    /// and reused for every batch.
    #[must_use]
    pub fn new(endpoint: &str, auth_token: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        HttpTransport {
            client,
            url: format!("{}/api/logs", endpoint.trim_end_matches('/')),
            auth_token: auth_token.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[LogEntry]) -> SendOutcome {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.auth_token)
            .json(&LogsPayload { logs: batch })
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!("Delivered batch of {} entries", batch.len());
                    return SendOutcome::Delivered;
                }
                match status {
                    StatusCode::UNAUTHORIZED => {
                        error!("Collector rejected credentials (401); batch will be requeued");
                        SendOutcome::AuthFailed
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        debug!("Collector rate-limited batch (429); will retry later");
                        SendOutcome::RateLimited
                    }
                    status => {
                        error!(
                            "{status}: collector refused batch: {}",
                            response.text().await.unwrap_or_default()
                        );
                        SendOutcome::TransportError
                    }
                }
            }
            Err(e) => {
                error!("Failed to reach collector: {e}");
                SendOutcome::TransportError
            }
        }
    }
}

/// Transport used when shipping is configured off. Batches are consumed
/// without a network call so the rest of the pipeline behaves normally.
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn send(&self, batch: &[LogEntry]) -> SendOutcome {
        debug!("Transport disabled, discarding batch of {} entries", batch.len());
        SendOutcome::Delivered
    }
}
