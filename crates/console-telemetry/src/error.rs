// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the pipeline.
//!
//! Nothing here ever reaches the callers of the logging surface; these
//! errors are produced at configuration time or inside the worker and are
//! absorbed there, down-classified to "run console-only", "retry later"
//! or "accept loss".

use thiserror::Error;

/// Problems detected when validating a [`crate::config::TelemetryConfig`].
///
/// A failed validation leaves the pipeline in console-only mode; it is
/// never surfaced to logging callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("collector endpoint is not set")]
    MissingEndpoint,
    #[error("collector endpoint is not a valid URL: {0}")]
    InvalidEndpoint(String),
    #[error("auth token is not set")]
    MissingAuthToken,
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

/// Failures while writing or reading durable pipeline state (the overflow
/// file and the key-value store backing identity).
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
