// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Periodic flush trigger.
//!
//! The size trigger alone would hold entries indefinitely during
//! low-traffic periods, so a recurring ticker asks the worker to flush at
//! the configured interval regardless of buffer size.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::worker::PipelineHandle;

/// Spawns the ticker task. It runs until cancelled or until the worker
/// goes away.
pub(crate) fn spawn_flush_ticker(
    handle: PipelineHandle,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // The first tick completes immediately; discard it so the first
        // periodic flush happens one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Flush ticker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if handle.trigger_flush().is_err() {
                        debug!("Worker gone, stopping flush ticker");
                        break;
                    }
                }
            }
        }
    })
}
