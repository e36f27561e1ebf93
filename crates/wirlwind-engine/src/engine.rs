//! The schedule-driven poll engine.
//!
//! One engine per device session, one tokio task, one command channel.
//! Commands never overlap: collections fire in definition order whenever
//! their interval elapses, and the whole pipeline for one collection runs
//! before the next command goes out. The only suspension points are
//! channel I/O and the inter-cycle sleep; both honor the shutdown signal.

use crate::error::{EngineError, Result, TransportError};
use crate::store::{PublishMeta, StateStore};
use crate::transport::{CommandChannel, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use wirlwind_collections::{CollectionConfig, CollectionRegistry};
use wirlwind_common::{ConnectionState, DeviceTarget, ParserKind};
use wirlwind_drivers::{shape_rows, VendorDriver};
use wirlwind_parse::{sanitize_cli_output, ChainOutcome, ParseTrace, ParserChain, TraceStore};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on one command's round trip.
    pub command_timeout: Duration,
    /// Consecutive transport failures (across all collections) before the
    /// session enters reconnect backoff.
    pub failure_threshold: u32,
    /// First reconnect backoff; doubles per attempt.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(15),
            failure_threshold: 3,
            backoff_base: Duration::from_secs(3),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

/// How one collection's poll ended. Contained failures stay inside the
/// collection and cycle; transport failures feed the reconnect counter.
enum PollFailure {
    Transport(TransportError),
    Contained,
}

pub struct PollEngine {
    target: DeviceTarget,
    collections: CollectionRegistry,
    driver: Arc<dyn VendorDriver>,
    chain: ParserChain,
    store: Arc<StateStore>,
    traces: Arc<TraceStore>,
    options: EngineOptions,
}

impl PollEngine {
    pub fn new(
        target: DeviceTarget,
        collections: CollectionRegistry,
        driver: Arc<dyn VendorDriver>,
        chain: ParserChain,
        store: Arc<StateStore>,
        traces: Arc<TraceStore>,
    ) -> Self {
        Self {
            target,
            collections,
            driver,
            chain,
            store,
            traces,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    /// Run the session until the shutdown signal flips or a fatal error.
    ///
    /// `shutdown` starts `false`; setting it `true` stops the engine at the
    /// next suspension point. Cancellation mid-command terminates the
    /// session rather than waiting out the response.
    pub async fn run(
        self,
        transport: &dyn Transport,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let capabilities = self.chain.capabilities();
        tracing::info!(
            host = %self.target.host,
            vendor = %self.target.vendor,
            collections = ?self.collections.names(),
            textfsm = capabilities.textfsm,
            ttp = capabilities.ttp,
            "Poll engine starting"
        );

        let mut channel = transport
            .connect(&self.target)
            .await
            .map_err(EngineError::InitialConnect)?;
        self.store.publish_connection(ConnectionState::Connected, None);

        let mut device_info = wirlwind_common::Row::new();
        device_info.insert("host".into(), self.target.host.clone().into());
        device_info.insert("vendor".into(), self.target.vendor.clone().into());
        device_info.insert("display_name".into(), self.target.display().into());
        self.store.set_device_info(device_info);

        self.issue_pagination(&mut channel).await;

        // One-shot collections run once, in definition order, before the
        // scheduler takes over.
        for config in self.collections.iter().filter(|c| c.is_one_shot()) {
            if *shutdown.borrow() {
                break;
            }
            let _ = self.poll_collection(&mut channel, config, &mut shutdown).await;
        }

        let recurring: Vec<&CollectionConfig> =
            self.collections.iter().filter(|c| !c.is_one_shot()).collect();

        let mut next_fire: HashMap<&str, Instant> = HashMap::new();
        let mut transport_failures = 0u32;

        while !*shutdown.borrow() {
            if recurring.is_empty() {
                // Nothing to schedule; hold the session open until stop.
                let _ = shutdown.changed().await;
                break;
            }

            let now = Instant::now();
            for config in &recurring {
                if *shutdown.borrow() {
                    break;
                }
                let due = next_fire
                    .get(config.name.as_str())
                    .is_none_or(|at| *at <= now);
                if !due {
                    continue;
                }

                let result = self.poll_collection(&mut channel, config, &mut shutdown).await;
                // Failures never accelerate retries.
                next_fire.insert(
                    config.name.as_str(),
                    now + Duration::from_secs(config.interval_seconds),
                );

                match result {
                    Ok(()) | Err(PollFailure::Contained) => transport_failures = 0,
                    Err(PollFailure::Transport(e)) => {
                        transport_failures += 1;
                        tracing::warn!(
                            collection = %config.name,
                            error = %e,
                            consecutive = transport_failures,
                            "Transport failure"
                        );
                        if transport_failures >= self.options.failure_threshold {
                            if !self.reconnect(transport, &mut channel, &mut shutdown).await {
                                // Cancelled during backoff.
                                self.teardown(channel).await;
                                return Ok(());
                            }
                            transport_failures = 0;
                        }
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
            let earliest = next_fire.values().min().copied();
            let pause = earliest
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(1));
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.teardown(channel).await;
        Ok(())
    }

    async fn teardown(&self, mut channel: Box<dyn CommandChannel>) {
        channel.close().await;
        self.store
            .publish_connection(ConnectionState::Disconnected, None);
        self.store.clear();
        tracing::info!(host = %self.target.host, "Session closed");
    }

    async fn issue_pagination(&self, channel: &mut Box<dyn CommandChannel>) {
        let command = self.driver.pagination_command();
        if command.is_empty() {
            return;
        }
        match channel.execute(command).await {
            // Output is irrelevant; vendors ack pagination silently.
            Ok(_) => tracing::debug!(command, "Pagination disabled"),
            Err(e) => tracing::warn!(command, error = %e, "Pagination command failed"),
        }
    }

    /// Close the dead channel and retry connecting with doubling backoff
    /// until success or cancellation. Returns `false` when cancelled.
    async fn reconnect(
        &self,
        transport: &dyn Transport,
        channel: &mut Box<dyn CommandChannel>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        channel.close().await;
        let mut attempt = 1u32;
        let mut backoff = self.options.backoff_base;

        loop {
            if *shutdown.borrow() {
                return false;
            }
            self.store
                .publish_connection(ConnectionState::Reconnecting, Some(attempt));
            tracing::warn!(attempt, backoff_secs = backoff.as_secs(), "Reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => return false,
            }

            match transport.connect(&self.target).await {
                Ok(new_channel) => {
                    *channel = new_channel;
                    self.issue_pagination(channel).await;
                    self.store
                        .publish_connection(ConnectionState::Connected, None);
                    tracing::info!(host = %self.target.host, "Reconnected");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                    attempt += 1;
                    backoff = (backoff * 2).min(self.options.backoff_cap);
                }
            }
        }
    }

    /// Execute one command with the per-command timeout, honoring
    /// cancellation.
    async fn execute(
        &self,
        channel: &mut Box<dyn CommandChannel>,
        command: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::result::Result<String, TransportError> {
        tokio::select! {
            result = tokio::time::timeout(self.options.command_timeout, channel.execute(command)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(TransportError::Timeout(self.options.command_timeout)),
                }
            }
            _ = shutdown.changed() => Err(TransportError::Closed),
        }
    }

    /// The full pipeline for one collection. Exactly one trace record is
    /// stored per invocation, whatever happens.
    async fn poll_collection(
        &self,
        channel: &mut Box<dyn CommandChannel>,
        config: &CollectionConfig,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::result::Result<(), PollFailure> {
        let mut trace = ParseTrace::new(&config.name, self.collections.vendor());
        tracing::debug!(collection = %config.name, command = %config.command, "Polling");

        let raw = match self.execute(channel, &config.command, shutdown).await {
            Ok(raw) => raw,
            Err(e) => {
                let reason = e.to_string();
                trace.delivered(ParserKind::None, None, Vec::new(), 0, Some(reason.clone()));
                self.finish_trace(trace);
                self.store.mark_error(&config.name, &reason);
                return Err(PollFailure::Transport(e));
            }
        };
        trace.raw_received(&raw, &config.command);

        if raw.trim().is_empty() {
            let reason = "empty output".to_string();
            trace.delivered(ParserKind::None, None, Vec::new(), 0, Some(reason.clone()));
            self.finish_trace(trace);
            self.store.mark_error(&config.name, &reason);
            return Err(PollFailure::Contained);
        }

        let sanitized = sanitize_cli_output(&raw, Some(&config.command), channel.prompt());
        trace.sanitized(sanitized.text.len(), sanitized.lines_stripped);

        let outcome = self.chain.parse(
            &sanitized.text,
            &config.parsers,
            &config.remap,
            config.schema.as_ref(),
            &mut trace,
        );

        let (parsed_by, template, rows) = match outcome {
            ChainOutcome::Success {
                parsed_by,
                template,
                rows,
            } => (parsed_by, template, rows),
            ChainOutcome::AllFailed { .. } => {
                let detail = outcome.failure_detail();
                self.store
                    .put_error(&config.name, "AllParsersFailed", &detail);
                trace.delivered(
                    ParserKind::None,
                    None,
                    Vec::new(),
                    0,
                    Some(format!("AllParsersFailed: {detail}")),
                );
                self.finish_trace(trace);
                return Err(PollFailure::Contained);
            }
        };

        let row_count = rows.len();
        let envelope = shape_rows(&config.shape, rows);

        match self
            .driver
            .post_process(&config.name, envelope, self.store.as_ref())
        {
            Ok(envelope) => {
                trace.post_processed(self.driver.vendor_id());
                let fields: Vec<String> = envelope
                    .as_object()
                    .map(|o| o.keys().cloned().collect())
                    .unwrap_or_default();
                self.store.put(
                    &config.name,
                    envelope,
                    PublishMeta {
                        parsed_by,
                        template: template.clone(),
                        history_capacity: config.history_capacity,
                    },
                );
                trace.delivered(parsed_by, template, fields, row_count, None);
                self.finish_trace(trace);
                Ok(())
            }
            Err(e) => {
                let detail = e.to_string();
                self.store
                    .put_error(&config.name, "PostProcessError", &detail);
                trace.delivered(ParserKind::None, template, Vec::new(), row_count, Some(detail));
                self.finish_trace(trace);
                Err(PollFailure::Contained)
            }
        }
    }

    fn finish_trace(&self, trace: ParseTrace) {
        let record = trace.into_record();
        record.emit();
        self.traces.store(record);
    }
}
