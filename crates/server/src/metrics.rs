//! Prometheus metrics for the certfolio server.
//!
//! Exposes counters for certificate mutations, attachment storage and
//! cleanup, login attempts and rate-limit rejections.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no certificate content or usernames, only aggregate counts.
//! Restrict the endpoint to scraper IPs at the network level, or disable it
//! with `server.metrics_enabled = false`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use certfolio_storage::RemovalOutcome;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Certificate lifecycle
pub static CERTIFICATES_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "certfolio_certificates_created_total",
        "Total number of certificates created",
    )
    .expect("metric creation failed")
});

pub static CERTIFICATES_UPDATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "certfolio_certificates_updated_total",
        "Total number of certificate metadata updates",
    )
    .expect("metric creation failed")
});

pub static CERTIFICATE_FILES_REPLACED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "certfolio_certificate_files_replaced_total",
        "Total number of certificate attachments replaced",
    )
    .expect("metric creation failed")
});

pub static CERTIFICATES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "certfolio_certificates_deleted_total",
        "Total number of certificates deleted",
    )
    .expect("metric creation failed")
});

// Attachments
pub static ATTACHMENT_BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "certfolio_attachment_bytes_stored_total",
        "Total bytes written to the attachment store",
    )
    .expect("metric creation failed")
});

pub static ATTACHMENT_CLEANUPS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "certfolio_attachment_cleanups_total",
            "Best-effort attachment removals by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Auth
pub static LOGIN_ATTEMPTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("certfolio_login_attempts_total", "Login attempts by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Rate limiting
pub static RATE_LIMIT_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "certfolio_rate_limit_rejections_total",
            "Requests rejected by the rate limiter, by limiter",
        ),
        &["limiter"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(CERTIFICATES_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CERTIFICATES_UPDATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CERTIFICATE_FILES_REPLACED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CERTIFICATES_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ATTACHMENT_BYTES_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ATTACHMENT_CLEANUPS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOGIN_ATTEMPTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RATE_LIMIT_REJECTIONS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record the outcome of a best-effort attachment removal.
pub fn record_cleanup(outcome: &RemovalOutcome) {
    ATTACHMENT_CLEANUPS
        .with_label_values(&[outcome.label()])
        .inc();
}

/// Record a login attempt.
pub fn record_login(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    LOGIN_ATTEMPTS.with_label_values(&[outcome]).inc();
}
