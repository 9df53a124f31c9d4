// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Serialized pipeline worker.
//!
//! Every mutation of the pending-entries buffer is funneled through one
//! actor task fed by a command channel:
//!
//! ```text
//!    ┌──────────────┐
//!    │   Handles    │ (any number of logging callers)
//!    └──────┬───────┘
//!           │ commands, fire-and-forget
//!           v
//!    ┌──────────────┐
//!    │    Worker    │ (single consumer)
//!    └──────┬───────┘
//!           │ owns buffer + overflow file
//!           v
//!    ┌──────────────┐
//!    │  Transport   │
//!    └──────────────┘
//! ```
//!
//! Producers never block; the worker awaits the transport inline, so a
//! slow collector delays later flushes but can never corrupt buffer
//! state. A failed batch goes back to the buffer head; if the buffer has
//! grown past the overflow threshold after a failure, everything is
//! spilled to disk and memory is released.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::buffer::Buffer;
use crate::entry::LogEntry;
use crate::overflow::OverflowStore;
use crate::transport::{SendOutcome, Transport};

/// Commands accepted by the worker.
#[derive(Debug)]
pub enum PipelineCommand {
    /// Append one entry; flushes immediately if the buffer has reached
    /// the batch size.
    Enqueue(LogEntry),
    /// Drain up to one batch and attempt delivery. The optional channel
    /// is acknowledged once the attempt (including requeue/overflow
    /// handling) has completed.
    Flush(Option<oneshot::Sender<()>>),
    /// Stop the worker.
    Shutdown,
}

/// Cloneable, non-blocking front of the worker.
#[derive(Clone, Debug)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineCommand>,
}

impl PipelineHandle {
    /// Hands an entry to the worker. Fire-and-forget; fails only when
    /// the worker has shut down.
    pub fn enqueue(
        &self,
        entry: LogEntry,
    ) -> Result<(), mpsc::error::SendError<PipelineCommand>> {
        self.tx.send(PipelineCommand::Enqueue(entry))
    }

    /// Requests a flush and waits for the attempt to complete.
    pub async fn flush(&self) -> Result<(), String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(PipelineCommand::Flush(Some(response_tx)))
            .map_err(|e| format!("Failed to send flush command: {e}"))?;
        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {e}"))
    }

    /// Requests a flush without waiting. Used by the periodic ticker.
    pub fn trigger_flush(&self) -> Result<(), mpsc::error::SendError<PipelineCommand>> {
        self.tx.send(PipelineCommand::Flush(None))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<PipelineCommand>> {
        self.tx.send(PipelineCommand::Shutdown)
    }
}

/// Owns the buffer, the transport, and the overflow file.
pub struct PipelineWorker {
    buffer: Buffer,
    transport: Arc<dyn Transport>,
    overflow: OverflowStore,
    batch_size: usize,
    max_retries: u32,
    rx: mpsc::UnboundedReceiver<PipelineCommand>,
}

impl PipelineWorker {
    /// Creates the worker and its handle, draining any overflow file
    /// left by a previous run into the (empty) buffer.
    #[must_use]
    pub fn new(
        batch_size: usize,
        max_retries: u32,
        transport: Arc<dyn Transport>,
        overflow: OverflowStore,
    ) -> (Self, PipelineHandle) {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut buffer = Buffer::new();
        buffer.extend_back(overflow.load_and_clear());

        let worker = PipelineWorker {
            buffer,
            transport,
            overflow,
            batch_size: batch_size.max(1),
            max_retries: max_retries.max(1),
            rx,
        };
        let handle = PipelineHandle { tx };
        (worker, handle)
    }

    /// Processes commands until shutdown. Spawn this as a tokio task.
    pub async fn run(mut self) {
        debug!("Telemetry pipeline worker started");

        while let Some(command) = self.rx.recv().await {
            match command {
                PipelineCommand::Enqueue(entry) => {
                    self.buffer.push_back(entry);
                    if self.buffer.len() >= self.batch_size {
                        self.flush_once().await;
                    }
                }
                PipelineCommand::Flush(ack) => {
                    self.flush_once().await;
                    if let Some(ack) = ack {
                        if ack.send(()).is_err() {
                            debug!("Flush requester went away before acknowledgment");
                        }
                    }
                }
                PipelineCommand::Shutdown => {
                    debug!("Telemetry pipeline worker shutting down");
                    break;
                }
            }
        }
    }

    /// One flush: take a batch off the head, attempt delivery, and on
    /// failure put it back exactly where it was. Never drops entries;
    /// pressure relief goes through the overflow file.
    async fn flush_once(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = self.buffer.take_batch(self.batch_size);
        debug!("Flushing batch of {} entries", batch.len());

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let outcome = self.transport.send(&batch).await;
            match outcome {
                SendOutcome::Delivered => break outcome,
                // Hammering on a bad credential or an explicit rate
                // limit does no good; hand the batch back and let the
                // next trigger retry it.
                SendOutcome::AuthFailed | SendOutcome::RateLimited => break outcome,
                SendOutcome::TransportError => {
                    if attempts >= self.max_retries {
                        break outcome;
                    }
                }
            }
        };

        if outcome == SendOutcome::Delivered {
            return;
        }

        warn!(
            "Batch of {} entries not delivered ({outcome:?} after {attempts} attempts), requeueing",
            batch.len()
        );
        self.buffer.requeue_front(batch);

        if self.buffer.exceeds_overflow_threshold() {
            let spilled = self.buffer.drain_all();
            let count = spilled.len();
            match self.overflow.persist(spilled) {
                Ok(total) => {
                    warn!("Spilled {count} buffered entries to disk ({total} now persisted)");
                }
                Err(e) => {
                    error!("Failed to persist overflow, {count} entries lost: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::buffer::OVERFLOW_THRESHOLD;
    use crate::device::{DeviceInfo, DeviceSpec};
    use crate::entry::LogLevel;

    /// Transport that replays a scripted list of outcomes and records
    /// every batch it is handed.
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<SendOutcome>>,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<SendOutcome>) -> Arc<Self> {
            Arc::new(ScriptedTransport {
                outcomes: Mutex::new(outcomes.into()),
                batches: Mutex::new(Vec::new()),
            })
        }

        fn always(outcome: SendOutcome) -> Arc<Self> {
            // An empty script falls back to repeating this outcome.
            let transport = Self::new(Vec::new());
            transport.outcomes.lock().unwrap().push_back(outcome);
            transport
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, batch: &[LogEntry]) -> SendOutcome {
            self.batches
                .lock()
                .unwrap()
                .push(batch.iter().map(|e| e.message.clone()).collect());
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                *outcomes.front().unwrap()
            }
        }
    }

    fn entry(message: &str) -> LogEntry {
        let device = DeviceInfo::snapshot(
            "device-1",
            &DeviceSpec {
                hardware_id: "test".to_string(),
                os_version: "1.0".to_string(),
                app_version: "1.0".to_string(),
                build_number: "1".to_string(),
            },
        );
        LogEntry::new(
            LogLevel::Info,
            message.to_string(),
            device,
            None,
            "session-1".to_string(),
            HashMap::new(),
        )
    }

    fn spawn_worker(
        batch_size: usize,
        max_retries: u32,
        transport: Arc<ScriptedTransport>,
        dir: &tempfile::TempDir,
    ) -> PipelineHandle {
        let overflow = OverflowStore::new(dir.path().join("overflow.json"));
        let (worker, handle) = PipelineWorker::new(batch_size, max_retries, transport, overflow);
        tokio::spawn(worker.run());
        handle
    }

    #[tokio::test]
    async fn flush_on_empty_buffer_makes_no_transport_call() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::always(SendOutcome::Delivered);
        let handle = spawn_worker(10, 1, Arc::clone(&transport), &dir);

        handle.flush().await.unwrap();
        assert!(transport.batches().is_empty());
    }

    #[tokio::test]
    async fn reaching_batch_size_triggers_exactly_one_flush() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::always(SendOutcome::Delivered);
        let handle = spawn_worker(2, 1, Arc::clone(&transport), &dir);

        handle.enqueue(entry("e0")).unwrap();
        handle.enqueue(entry("e1")).unwrap();
        handle.enqueue(entry("e2")).unwrap();

        // An awaited flush both drains the pending third entry and
        // proves command ordering: the size-triggered flush came first.
        handle.flush().await.unwrap();

        let batches = transport.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec!["e0", "e1"]);
        assert_eq!(batches[1], vec!["e2"]);
    }

    #[tokio::test]
    async fn sequential_enqueues_are_delivered_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::always(SendOutcome::Delivered);
        let handle = spawn_worker(100, 1, Arc::clone(&transport), &dir);

        for i in 0..5 {
            handle.enqueue(entry(&format!("e{i}"))).unwrap();
        }
        handle.flush().await.unwrap();

        assert_eq!(transport.batches(), vec![vec!["e0", "e1", "e2", "e3", "e4"]]);
    }

    #[tokio::test]
    async fn concurrent_enqueues_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::always(SendOutcome::Delivered);
        let handle = spawn_worker(10_000, 1, Arc::clone(&transport), &dir);

        let mut tasks = Vec::new();
        for task_id in 0..10 {
            let h = handle.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    h.enqueue(entry(&format!("t{task_id}-e{i}"))).unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        handle.flush().await.unwrap();
        let total: usize = transport.batches().iter().map(Vec::len).sum();
        assert_eq!(total, 500);
    }

    #[tokio::test]
    async fn failed_batch_is_requeued_ahead_of_later_entries() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            SendOutcome::TransportError,
            SendOutcome::Delivered,
        ]);
        let handle = spawn_worker(5, 1, Arc::clone(&transport), &dir);

        for i in 0..5 {
            handle.enqueue(entry(&format!("e{i}"))).unwrap();
        }
        // The size-triggered flush fails and the batch returns to the
        // head; these arrive afterwards.
        handle.enqueue(entry("e5")).unwrap();
        handle.enqueue(entry("e6")).unwrap();

        handle.flush().await.unwrap();
        handle.flush().await.unwrap();

        let batches = transport.batches();
        assert_eq!(batches[0], vec!["e0", "e1", "e2", "e3", "e4"]);
        // Original order preserved across the retry, never interleaved.
        assert_eq!(batches[1], vec!["e0", "e1", "e2", "e3", "e4"]);
        assert_eq!(batches[2], vec!["e5", "e6"]);
    }

    #[tokio::test]
    async fn auth_failure_requeues_the_identical_batch() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            SendOutcome::AuthFailed,
            SendOutcome::Delivered,
        ]);
        let handle = spawn_worker(10, 3, Arc::clone(&transport), &dir);

        handle.enqueue(entry("e0")).unwrap();
        handle.enqueue(entry("e1")).unwrap();
        handle.flush().await.unwrap();
        handle.flush().await.unwrap();

        let batches = transport.batches();
        // No immediate retry on auth failure: one attempt per flush.
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], batches[1]);
        assert_eq!(batches[1], vec!["e0", "e1"]);
    }

    #[tokio::test]
    async fn transport_errors_retry_up_to_max_retries_within_one_flush() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::always(SendOutcome::TransportError);
        let handle = spawn_worker(10, 3, Arc::clone(&transport), &dir);

        handle.enqueue(entry("e0")).unwrap();
        handle.flush().await.unwrap();

        assert_eq!(transport.batches().len(), 3);
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried_within_the_flush() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::always(SendOutcome::RateLimited);
        let handle = spawn_worker(10, 3, Arc::clone(&transport), &dir);

        handle.enqueue(entry("e0")).unwrap();
        handle.flush().await.unwrap();

        assert_eq!(transport.batches().len(), 1);
    }

    #[tokio::test]
    async fn overflow_spills_buffer_to_disk_and_recovers_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let overflow_path = dir.path().join("overflow.json");
        let count = OVERFLOW_THRESHOLD + 1;

        {
            let transport = ScriptedTransport::always(SendOutcome::TransportError);
            let overflow = OverflowStore::new(overflow_path.clone());
            let (worker, handle) =
                PipelineWorker::new(5000, 1, Arc::clone(&transport) as Arc<dyn Transport>, overflow);
            tokio::spawn(worker.run());

            for i in 0..count {
                handle.enqueue(entry(&format!("e{i}"))).unwrap();
            }
            handle.flush().await.unwrap();

            // Buffer exceeded the threshold after the failed flush, so
            // everything went to disk and memory is back to baseline.
            assert!(overflow_path.exists());
            handle.flush().await.unwrap();
            assert_eq!(transport.batches().len(), 1);
            handle.shutdown().unwrap();
        }

        // Next pipeline start drains the file back in, oldest first,
        // and removes it.
        let transport = ScriptedTransport::always(SendOutcome::Delivered);
        let overflow = OverflowStore::new(overflow_path.clone());
        let (worker, handle) =
            PipelineWorker::new(count, 1, Arc::clone(&transport) as Arc<dyn Transport>, overflow);
        tokio::spawn(worker.run());
        assert!(!overflow_path.exists());

        handle.flush().await.unwrap();
        let batches = transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), count);
        assert_eq!(batches[0][0], "e0");
        assert_eq!(batches[0][count - 1], format!("e{}", count - 1));
    }

    #[tokio::test]
    async fn failure_below_threshold_keeps_entries_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let overflow_path = dir.path().join("overflow.json");
        let transport = ScriptedTransport::always(SendOutcome::TransportError);
        let overflow = OverflowStore::new(overflow_path.clone());
        let (worker, handle) =
            PipelineWorker::new(10, 1, Arc::clone(&transport) as Arc<dyn Transport>, overflow);
        tokio::spawn(worker.run());

        handle.enqueue(entry("e0")).unwrap();
        handle.flush().await.unwrap();

        assert!(!overflow_path.exists());
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::always(SendOutcome::Delivered);
        let overflow = OverflowStore::new(dir.path().join("overflow.json"));
        let (worker, handle) =
            PipelineWorker::new(10, 1, Arc::clone(&transport) as Arc<dyn Transport>, overflow);
        let worker_task = tokio::spawn(worker.run());

        handle.shutdown().unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), worker_task)
            .await
            .expect("worker did not stop")
            .unwrap();

        assert!(handle.enqueue(entry("late")).is_err());
    }
}
