//! # Prometheus Metrics
//!
//! Operational counters for the trust services, scraped at `/metrics` on the
//! metrics port. Everything is registered in a dedicated
//! [`prometheus::Registry`] under the `anchor` namespace.
//!
//! Counters never carry identifiers or DIDs as labels. The only label is the
//! route on the latency histogram.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// OTPs issued and handed to a notifier.
    pub otp_issued_total: IntCounter,
    /// `generate` calls refused by the rate limiter.
    pub otp_rate_limited_total: IntCounter,
    /// Successful OTP validations.
    pub otp_validated_total: IntCounter,
    /// Wrong or expired OTPs.
    pub otp_rejected_total: IntCounter,
    pub challenges_issued_total: IntCounter,
    pub proofs_verified_total: IntCounter,
    pub proofs_rejected_total: IntCounter,
    pub backups_created_total: IntCounter,
    pub restores_total: IntCounter,
    /// Trust-token device setups, first links and repeat logins alike.
    pub devices_linked_total: IntCounter,
    /// Handler latency in seconds, by route.
    pub request_latency_seconds: HistogramVec,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("anchor".into()), None)?;

        let request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "request_latency_seconds",
                "API handler latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["route"],
        )?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        Ok(Self {
            otp_issued_total: counter(&registry, "otp_issued_total", "OTPs issued")?,
            otp_rate_limited_total: counter(
                &registry,
                "otp_rate_limited_total",
                "OTP requests refused by the rate limiter",
            )?,
            otp_validated_total: counter(&registry, "otp_validated_total", "OTPs validated")?,
            otp_rejected_total: counter(
                &registry,
                "otp_rejected_total",
                "OTP validations that failed or found no code",
            )?,
            challenges_issued_total: counter(
                &registry,
                "challenges_issued_total",
                "Proof-of-control challenges issued",
            )?,
            proofs_verified_total: counter(
                &registry,
                "proofs_verified_total",
                "Proofs of control accepted",
            )?,
            proofs_rejected_total: counter(
                &registry,
                "proofs_rejected_total",
                "Proofs of control rejected",
            )?,
            backups_created_total: counter(&registry, "backups_created_total", "Backups exported")?,
            restores_total: counter(&registry, "restores_total", "Identities restored from backup")?,
            devices_linked_total: counter(
                &registry,
                "devices_linked_total",
                "Devices bound to a DID for trust-token sign-in",
            )?,
            request_latency_seconds,
            registry,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
