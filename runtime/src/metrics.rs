//! Prometheus metrics for dispatcher observability.
//!
//! This module records:
//! - Requests sent (typed and erased paths)
//! - Notifications published and their fan-out width
//! - Wrapper constructions
//! - Handler resolution and handler failures
//!
//! # Example
//!
//! ```rust,no_run
//! use observr_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // ... dispatch requests ...
//!
//! if let Some(text) = exporter.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder for dispatcher metrics.
///
/// Installs a process-wide recorder and renders the Prometheus text format.
/// Serving the text is left to the embedding application.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that has not installed its recorder yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs
    /// a warning and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .set_buckets_for_metric(
                Matcher::Full("observr_publish_handlers".to_string()),
                &[0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Dispatcher metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the Prometheus handle, if this exporter installed the recorder.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "observr_send_total",
        "Total number of requests sent, labelled by typed or erased path"
    );
    describe_counter!(
        "observr_publish_total",
        "Total number of notifications published, labelled by typed or erased path"
    );
    describe_histogram!(
        "observr_publish_handlers",
        "Number of handlers resolved for a published notification"
    );
    describe_counter!(
        "observr_wrapper_created_total",
        "Total number of handler wrappers built, labelled by kind"
    );
    describe_histogram!(
        "observr_resolve_duration_seconds",
        "Time spent in the handler factory"
    );
    describe_counter!(
        "observr_resolve_errors_total",
        "Total number of failed handler resolutions, labelled by reason"
    );
    describe_counter!(
        "observr_handler_failures_total",
        "Total number of notification handler failures, labelled by phase"
    );
}

/// Dispatcher metrics recorder.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a request sent through `path` (`typed` or `erased`).
    pub fn record_send(path: &'static str) {
        counter!("observr_send_total", "path" => path).increment(1);
    }

    /// Record a notification published through `path`.
    pub fn record_publish(path: &'static str) {
        counter!("observr_publish_total", "path" => path).increment(1);
    }

    /// Record how many handlers a notification was fanned out to.
    #[allow(clippy::cast_precision_loss)] // handler counts are small
    pub fn record_fan_out(handlers: usize) {
        histogram!("observr_publish_handlers").record(handlers as f64);
    }

    /// Record a wrapper built for a new request type.
    pub fn record_wrapper_created(kind: &'static str) {
        counter!("observr_wrapper_created_total", "kind" => kind).increment(1);
    }

    /// Record time spent resolving handlers.
    pub fn record_resolve(duration: Duration) {
        histogram!("observr_resolve_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed resolution (`not_found` or `construction`).
    pub fn record_resolve_error(reason: &'static str) {
        counter!("observr_resolve_errors_total", "reason" => reason).increment(1);
    }

    /// Record a notification handler failure (`started` or `detached`).
    pub fn record_handler_failure(phase: &'static str) {
        counter!("observr_handler_failures_total", "phase" => phase).increment(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;

    #[test]
    fn test_exporter_creation() {
        let exporter = MetricsExporter::new();
        assert!(exporter.handle().is_none());
        assert!(exporter.render().is_none());
    }

    #[test]
    fn test_exporter_render() {
        let mut exporter = MetricsExporter::new();
        exporter.install().unwrap();

        DispatchMetrics::record_send("typed");
        DispatchMetrics::record_publish("erased");
        DispatchMetrics::record_fan_out(3);
        DispatchMetrics::record_wrapper_created("request");

        // If another test installed the recorder first, the handle is None.
        // Metrics are still recorded by that recorder.
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("observr_send_total"));
            assert!(rendered.contains("observr_publish_total"));
            assert!(rendered.contains("observr_wrapper_created_total"));
        }
    }

    #[test]
    fn test_install_twice_is_tolerated() {
        let mut first = MetricsExporter::new();
        let mut second = MetricsExporter::new();
        first.install().unwrap();
        assert!(second.install().is_ok());
    }
}
