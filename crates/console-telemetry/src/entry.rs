// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Log entry data model.
//!
//! A [`LogEntry`] is the unit moved through the whole pipeline: constructed
//! once on the caller's thread, enqueued into the buffer, delivered in a
//! batch, and possibly spilled to the overflow file. It is never mutated
//! after construction, which is what makes the cross-thread handoff into
//! the worker race-free.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::device::DeviceInfo;

/// Severity of a log entry, totally ordered so entries can be filtered by
/// level (`Debug < Info < Warn < Error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Upper-case label used by the console mirror.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Optional call-site and principal context attached to an entry.
///
/// Every field is optional; the UI layer fills in whatever it knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContext {
    /// Short source file name (no directory components).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file: Option<String>,
    /// Function or operation name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub function: Option<String>,
    /// Line number within `file`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub line: Option<u32>,
    /// Identifier of the signed-in user, when one is known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    /// Identifier of the user's organization, when one is known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub organization_id: Option<String>,
}

impl LogContext {
    /// True when no field is set; such a context is omitted from the wire
    /// payload entirely.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file.is_none()
            && self.function.is_none()
            && self.line.is_none()
            && self.user_id.is_none()
            && self.organization_id.is_none()
    }
}

/// One immutable captured log event.
///
/// The timestamp is wall-clock time at construction, in milliseconds since
/// the Unix epoch. `device` is a snapshot taken at construction time, not a
/// live reference, and `session_id` is whatever the session was at that
/// moment; rotating the session later never rewrites queued entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: String,
    pub device: DeviceInfo,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<LogContext>,
    pub session_id: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub metadata: HashMap<String, String>,
}

impl LogEntry {
    /// Builds an entry stamped with the current wall-clock time.
    ///
    /// An all-`None` context collapses to no context at all.
    #[must_use]
    pub fn new(
        level: LogLevel,
        message: String,
        device: DeviceInfo,
        context: Option<LogContext>,
        session_id: String,
        metadata: HashMap<String, String>,
    ) -> Self {
        LogEntry {
            timestamp: now_millis(),
            level,
            message,
            device,
            context: context.filter(|c| !c.is_empty()),
            session_id,
            metadata,
        }
    }

    /// Single-line rendering used by the console mirror. The severity is
    /// not repeated here; the mirror emits at the matching level.
    #[must_use]
    pub fn console_line(&self) -> String {
        let mut line = self.message.clone();
        if let Some(context) = &self.context {
            if let (Some(file), Some(line_no)) = (&context.file, context.line) {
                line.push_str(&format!(" ({file}:{line_no})"));
            }
        }
        if !self.metadata.is_empty() {
            let mut pairs: Vec<String> = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            pairs.sort();
            line.push_str(&format!(" {{{}}}", pairs.join(", ")));
        }
        line
    }
}

/// Milliseconds since the Unix epoch; clamps to zero if the clock is
/// somehow before 1970.
#[must_use]
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
