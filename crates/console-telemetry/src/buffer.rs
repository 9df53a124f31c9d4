// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! FIFO buffer of pending entries.
//!
//! The buffer itself is a plain single-owner structure; all concurrency is
//! handled by the worker that owns it (see [`crate::worker`]). Entries are
//! ordered by enqueue time, batches are contiguous prefixes, and a failed
//! batch goes back to the *front* so chronological order survives retries.

use std::collections::VecDeque;

use crate::entry::LogEntry;

/// Buffered entry count above which, after a failed send, the whole
/// buffer is spilled to the overflow file.
pub const OVERFLOW_THRESHOLD: usize = 1000;

/// Ordered queue of entries awaiting delivery.
#[derive(Debug, Default)]
pub struct Buffer {
    entries: VecDeque<LogEntry>,
}

impl Buffer {
    #[must_use]
    pub fn new() -> Self {
        Buffer::default()
    }

    pub fn push_back(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
    }

    /// Appends recovered entries behind anything already present. Used
    /// only at startup, when the buffer is empty, so recovered entries
    /// stay strictly older than everything enqueued later.
    pub fn extend_back(&mut self, entries: Vec<LogEntry>) {
        self.entries.extend(entries);
    }

    /// Removes and returns up to `n` entries from the head, oldest first.
    #[must_use]
    pub fn take_batch(&mut self, n: usize) -> Vec<LogEntry> {
        let count = n.min(self.entries.len());
        self.entries.drain(..count).collect()
    }

    /// Reinserts a failed batch at the front, preserving the original
    /// relative order of all entries.
    pub fn requeue_front(&mut self, batch: Vec<LogEntry>) {
        for entry in batch.into_iter().rev() {
            self.entries.push_front(entry);
        }
    }

    /// Empties the buffer, returning every entry in order.
    #[must_use]
    pub fn drain_all(&mut self) -> Vec<LogEntry> {
        self.entries.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once the buffer has grown past [`OVERFLOW_THRESHOLD`].
    #[must_use]
    pub fn exceeds_overflow_threshold(&self) -> bool {
        self.entries.len() > OVERFLOW_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::device::{DeviceInfo, DeviceSpec};
    use crate::entry::LogLevel;

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

    fn messages(buffer: &mut Buffer) -> Vec<String> {
        buffer.drain_all().into_iter().map(|e| e.message).collect()
    }

    #[test]
    fn entries_come_out_in_enqueue_order() {
        let mut buffer = Buffer::new();
        for i in 0..5 {
            buffer.push_back(entry(&format!("e{i}")));
        }
        assert_eq!(messages(&mut buffer), vec!["e0", "e1", "e2", "e3", "e4"]);
    }

    #[test]
    fn take_batch_returns_oldest_prefix() {
        let mut buffer = Buffer::new();
        for i in 0..5 {
            buffer.push_back(entry(&format!("e{i}")));
        }

        let batch = buffer.take_batch(3);
        let batch_messages: Vec<&str> = batch.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(batch_messages, vec!["e0", "e1", "e2"]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(messages(&mut buffer), vec!["e3", "e4"]);
    }

    #[test]
    fn take_batch_caps_at_buffer_size() {
        let mut buffer = Buffer::new();
        buffer.push_back(entry("only"));
        let batch = buffer.take_batch(50);
        assert_eq!(batch.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn take_batch_on_empty_buffer_is_empty() {
        let mut buffer = Buffer::new();
        assert!(buffer.take_batch(10).is_empty());
    }

    #[test]
    fn requeue_front_preserves_chronological_order() {
        let mut buffer = Buffer::new();
        for i in 0..5 {
            buffer.push_back(entry(&format!("e{i}")));
        }

        let batch = buffer.take_batch(3);
        // Entries e3/e4 arrived while the batch was in flight.
        buffer.push_back(entry("e5"));
        buffer.requeue_front(batch);

        assert_eq!(
            messages(&mut buffer),
            vec!["e0", "e1", "e2", "e3", "e4", "e5"]
        );
    }

    #[test]
    fn overflow_threshold_is_strictly_exceeded() {
        let mut buffer = Buffer::new();
        for _ in 0..OVERFLOW_THRESHOLD {
            buffer.push_back(entry("x"));
        }
        assert!(!buffer.exceeds_overflow_threshold());
        buffer.push_back(entry("one more"));
        assert!(buffer.exceeds_overflow_threshold());
    }

    #[test]
    fn drain_all_empties_the_buffer() {
        let mut buffer = Buffer::new();
        buffer.push_back(entry("a"));
        buffer.push_back(entry("b"));
        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
    }
}
