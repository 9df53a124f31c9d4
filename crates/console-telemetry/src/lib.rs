// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Client-side diagnostic telemetry pipeline.
//!
//! Captures structured log events from anywhere in the application,
//! buffers them behind a single serialized worker, ships them to a
//! collector in batches, and degrades gracefully to durable local
//! storage when the collector is unreachable.
//!
//! # Architecture
//!
//! ```text
//!   callers (any thread)
//!        │ record()
//!        v
//!   ┌──────────────┐     ┌───────────────┐
//!   │ Entry factory│────>│    Worker     │  single consumer,
//!   │ + mirror     │     │ buffer+batches│  owns all mutation
//!   └──────────────┘     └───────┬───────┘
//!        ^ ticker                │ flush (size / interval)
//!        └───────────────────────┤
//!                                v
//!                        ┌───────────────┐   failure    ┌──────────┐
//!                        │   Transport   │─────────────>│ requeue  │
//!                        │ POST /api/logs│              │ overflow │
//!                        └───────────────┘              └──────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use console_telemetry::{FileKeyStore, TelemetryConfig, TelemetryLogger};
//!
//! let logger = Arc::new(TelemetryLogger::new());
//! logger.configure(
//!     TelemetryConfig::from_env(),
//!     Arc::new(FileKeyStore::open("identity.json".into())),
//! );
//!
//! logger.info("instance list loaded", None);
//! logger.flush().await; // e.g. when the app is about to suspend
//! ```
//!
//! # Failure policy
//!
//! Nothing in this crate raises errors to logging callers. Bad
//! configuration leaves the logger in console-only mode; delivery
//! failures requeue the batch at the head of the buffer; sustained
//! failure spills the buffer to a single overflow file that the next
//! startup drains back in.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod config;
pub mod device;
pub mod entry;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod logger;
pub mod overflow;
mod scheduler;
pub mod transport;
pub mod worker;

pub use config::TelemetryConfig;
pub use device::{DeviceInfo, DeviceSpec};
pub use entry::{LogContext, LogEntry, LogLevel};
pub use error::{ConfigError, PersistError};
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use logger::TelemetryLogger;
pub use transport::{SendOutcome, Transport};
