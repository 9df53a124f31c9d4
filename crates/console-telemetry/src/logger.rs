// Copyright 2025-Present Console Telemetry contributors
// SPDX-License-Identifier: Apache-2.0

//! Public logging surface.
//!
//! [`TelemetryLogger`] is the one object the rest of the application
//! talks to: create it at process start, call [`configure`] once, and
//! log from anywhere. Every call on this surface is infallible from the
//! caller's point of view; a pipeline that cannot ship degrades to
//! mirroring entries on the local console, never to raising errors into
//! UI code.
//!
//! [`configure`]: TelemetryLogger::configure

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::TelemetryConfig;
use crate::device::DeviceInfo;
use crate::entry::{LogContext, LogEntry, LogLevel};
use crate::identity::IdentityManager;
use crate::keystore::KeyStore;
use crate::overflow::OverflowStore;
use crate::scheduler::spawn_flush_ticker;
use crate::transport::{HttpTransport, NoopTransport, Transport};
use crate::worker::{PipelineHandle, PipelineWorker};

const MIRROR_TARGET: &str = "console_telemetry::mirror";

#[derive(Debug, Clone, Default)]
struct UserContext {
    user_id: Option<String>,
    organization_id: Option<String>,
}

/// Everything a shipping pipeline needs per entry.
struct Shipping {
    handle: PipelineHandle,
    identity: Arc<IdentityManager>,
    device: DeviceInfo,
    cancel: CancellationToken,
}

enum State {
    /// `configure` has not been called. Entries are mirrored (mirror
    /// defaults on) and dropped.
    Unconfigured,
    /// `configure` was called with an unusable config. Same as
    /// unconfigured but with the configured mirror flag.
    ConsoleOnly,
    /// Fully operational.
    Active(Shipping),
}

/// Process-wide diagnostic logger.
///
/// One instance is created and owned by process startup and handed to
/// callers by reference; the type itself keeps no global state.
pub struct TelemetryLogger {
    state: RwLock<State>,
    console_mirror: RwLock<bool>,
    user: Mutex<UserContext>,
}

impl Default for TelemetryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryLogger {
    /// Creates an unconfigured logger. Logging works immediately but
    /// only mirrors to the console until [`configure`] succeeds.
    ///
    /// [`configure`]: TelemetryLogger::configure
    #[must_use]
    pub fn new() -> Self {
        TelemetryLogger {
            state: RwLock::new(State::Unconfigured),
            console_mirror: RwLock::new(true),
            user: Mutex::new(UserContext::default()),
        }
    }

    /// Configures the pipeline. Must be called from within a tokio
    /// runtime; spawns the worker and the periodic flush ticker.
    ///
    /// An invalid configuration is absorbed: the logger stays in
    /// console-only mode and callers never see an error. A second call
    /// is ignored with a warning; the pipeline lives for the process
    /// lifetime.
    pub fn configure(&self, config: TelemetryConfig, keystore: Arc<dyn KeyStore>) {
        #[allow(clippy::expect_used)]
        let mut state = self.state.write().expect("lock poisoned");
        if !matches!(*state, State::Unconfigured) {
            warn!("Telemetry pipeline already configured, ignoring reconfiguration");
            return;
        }

        #[allow(clippy::expect_used)]
        {
            *self.console_mirror.write().expect("lock poisoned") = config.console_mirror;
        }

        if let Err(e) = config.validate() {
            error!("Telemetry configuration rejected, staying console-only: {e}");
            *state = State::ConsoleOnly;
            return;
        }

        let identity = Arc::new(IdentityManager::new(keystore));
        let device = DeviceInfo::snapshot(identity.device_id(), &config.device);

        let transport: Arc<dyn Transport> = if config.transport_enabled {
            Arc::new(HttpTransport::new(
                &config.endpoint,
                &config.auth_token,
                config.send_timeout,
            ))
        } else {
            debug!("Transport disabled by configuration, batches will be discarded");
            Arc::new(NoopTransport)
        };

        let overflow = OverflowStore::new(config.overflow_path.clone());
        let (worker, handle) = PipelineWorker::new(
            config.batch_size,
            config.max_retries,
            transport,
            overflow,
        );
        tokio::spawn(worker.run());

        let cancel = CancellationToken::new();
        spawn_flush_ticker(handle.clone(), config.flush_interval, cancel.clone());

        *state = State::Active(Shipping {
            handle,
            identity,
            device,
            cancel,
        });
        debug!("Telemetry pipeline configured");
    }

    /// True when entries are being shipped (not just mirrored).
    #[must_use]
    pub fn is_shipping(&self) -> bool {
        #[allow(clippy::expect_used)]
        let state = self.state.read().expect("lock poisoned");
        matches!(*state, State::Active(_))
    }

    /// Remembers the signed-in principal; subsequent entries carry it in
    /// their context.
    pub fn set_user_context(&self, user_id: Option<String>, organization_id: Option<String>) {
        #[allow(clippy::expect_used)]
        let mut user = self.user.lock().expect("lock poisoned");
        user.user_id = user_id;
        user.organization_id = organization_id;
    }

    /// Captures one entry. Never blocks and never fails; before
    /// configuration the entry is mirrored (if enabled) and dropped.
    pub fn record(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: Option<LogContext>,
        metadata: Option<HashMap<String, String>>,
    ) {
        let message = message.into();
        let metadata = metadata.unwrap_or_default();
        let context = self.merge_user_context(context);

        #[allow(clippy::expect_used)]
        let state = self.state.read().expect("lock poisoned");
        match &*state {
            State::Active(shipping) => {
                let entry = LogEntry::new(
                    level,
                    message,
                    shipping.device.clone(),
                    context,
                    shipping.identity.session_id(),
                    metadata,
                );
                if self.mirror_enabled() {
                    mirror_entry(&entry);
                }
                if shipping.handle.enqueue(entry).is_err() {
                    debug!("Pipeline worker gone, entry dropped");
                }
            }
            State::Unconfigured | State::ConsoleOnly => {
                if self.mirror_enabled() {
                    mirror_raw(level, &message, &metadata);
                }
            }
        }
    }

    pub fn error(&self, message: impl Into<String>, metadata: Option<HashMap<String, String>>) {
        self.record(LogLevel::Error, message, None, metadata);
    }

    pub fn warn(&self, message: impl Into<String>, metadata: Option<HashMap<String, String>>) {
        self.record(LogLevel::Warn, message, None, metadata);
    }

    pub fn info(&self, message: impl Into<String>, metadata: Option<HashMap<String, String>>) {
        self.record(LogLevel::Info, message, None, metadata);
    }

    pub fn debug(&self, message: impl Into<String>, metadata: Option<HashMap<String, String>>) {
        self.record(LogLevel::Debug, message, None, metadata);
    }

    /// Rotates the session identifier and emits a marker entry carrying
    /// the previous one. Entries already queued keep the session they
    /// were created under. Returns the new identifier when shipping.
    pub fn start_new_session(&self) -> Option<String> {
        let rotated = {
            #[allow(clippy::expect_used)]
            let state = self.state.read().expect("lock poisoned");
            match &*state {
                State::Active(shipping) => Some(shipping.identity.start_new_session()),
                _ => None,
            }
        };

        let (previous, fresh) = rotated?;
        let mut metadata = HashMap::new();
        metadata.insert("previous_session_id".to_string(), previous);
        self.record(LogLevel::Info, "Session started", None, Some(metadata));
        Some(fresh)
    }

    /// Asks the worker to flush and waits for the attempt to complete.
    /// Call this when the app is about to suspend, to minimize the loss
    /// window. A no-op while not shipping.
    pub async fn flush(&self) {
        let handle = self.shipping_handle();
        if let Some(handle) = handle {
            if let Err(e) = handle.flush().await {
                debug!("Flush request not completed: {e}");
            }
        }
    }

    /// Flushes once more, then stops the ticker and the worker. The
    /// logger degrades to console-only afterwards.
    pub async fn shutdown(&self) {
        let shipping = {
            #[allow(clippy::expect_used)]
            let mut state = self.state.write().expect("lock poisoned");
            match std::mem::replace(&mut *state, State::ConsoleOnly) {
                State::Active(shipping) => Some(shipping),
                other => {
                    *state = other;
                    None
                }
            }
        };

        if let Some(shipping) = shipping {
            shipping.cancel.cancel();
            if let Err(e) = shipping.handle.flush().await {
                debug!("Final flush not completed: {e}");
            }
            let _ = shipping.handle.shutdown();
        }
    }

    fn merge_user_context(&self, context: Option<LogContext>) -> Option<LogContext> {
        #[allow(clippy::expect_used)]
        let user = self.user.lock().expect("lock poisoned");
        if user.user_id.is_none() && user.organization_id.is_none() {
            return context;
        }
        let mut context = context.unwrap_or_default();
        if context.user_id.is_none() {
            context.user_id.clone_from(&user.user_id);
        }
        if context.organization_id.is_none() {
            context.organization_id.clone_from(&user.organization_id);
        }
        Some(context)
    }

    fn mirror_enabled(&self) -> bool {
        #[allow(clippy::expect_used)]
        *self.console_mirror.read().expect("lock poisoned")
    }

    fn shipping_handle(&self) -> Option<PipelineHandle> {
        #[allow(clippy::expect_used)]
        let state = self.state.read().expect("lock poisoned");
        match &*state {
            State::Active(shipping) => Some(shipping.handle.clone()),
            _ => None,
        }
    }
}

fn mirror_entry(entry: &LogEntry) {
    let line = entry.console_line();
    match entry.level {
        LogLevel::Error => error!(target: MIRROR_TARGET, "{line}"),
        LogLevel::Warn => warn!(target: MIRROR_TARGET, "{line}"),
        LogLevel::Info => tracing::info!(target: MIRROR_TARGET, "{line}"),
        LogLevel::Debug => debug!(target: MIRROR_TARGET, "{line}"),
    }
}

fn mirror_raw(level: LogLevel, message: &str, metadata: &HashMap<String, String>) {
    let line = if metadata.is_empty() {
        message.to_string()
    } else {
        let mut pairs: Vec<String> = metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        format!("{message} {{{}}}", pairs.join(", "))
    };
    match level {
        LogLevel::Error => error!(target: MIRROR_TARGET, "{line}"),
        LogLevel::Warn => warn!(target: MIRROR_TARGET, "{line}"),
        LogLevel::Info => tracing::info!(target: MIRROR_TARGET, "{line}"),
        LogLevel::Debug => debug!(target: MIRROR_TARGET, "{line}"),
    }
}
