// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Development harness for the telemetry pipeline.
//!
//! Configures a pipeline from `TELEMETRY_*` environment variables and
//! emits a heartbeat entry every few seconds until interrupted, then
//! flushes once more and shuts the pipeline down. Point
//! `TELEMETRY_ENDPOINT` at a collector (or a local mock) to watch
//! batches arrive; unset it to see console-only degradation.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use tokio::time::{interval, Duration};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use console_telemetry::{FileKeyStore, TelemetryConfig, TelemetryLogger};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("TELEMETRY_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("hyper=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = TelemetryConfig::from_env();
    let identity_path = env::var("TELEMETRY_IDENTITY_PATH")
        .unwrap_or_else(|_| "telemetry-identity.json".to_string());

    let logger = Arc::new(TelemetryLogger::new());
    logger.configure(config, Arc::new(FileKeyStore::open(identity_path.into())));

    if logger.is_shipping() {
        info!("Pipeline configured, shipping enabled");
    } else {
        info!("Pipeline running console-only (set TELEMETRY_ENDPOINT and TELEMETRY_AUTH_TOKEN to ship)");
    }

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // discard first tick, which is instantaneous
    let mut beats: u64 = 0;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                beats += 1;
                let mut metadata = HashMap::new();
                metadata.insert("beat".to_string(), beats.to_string());
                logger.info("harness heartbeat", Some(metadata));
                debug!("Emitted heartbeat {beats}");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {e}");
                }
                break;
            }
        }
    }

    info!("Shutting down, flushing pending entries");
    logger.shutdown().await;
}
