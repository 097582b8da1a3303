//! Metrics collection and export for `tmi-collab`.
//!
//! This crate provides a unified metrics interface using the `metrics` crate facade.
//! When the `prometheus` feature is enabled, metrics are exported in Prometheus format.
//! When the `tracing` feature is enabled, span context is propagated to metrics labels.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tmi_metrics::{counter, gauge, histogram};
//!
//! counter!("tmi_session_connections_total").increment(1);
//! gauge!("tmi_session_connections_active").set(42.0);
//! histogram!("tmi_webhook_delivery_duration_seconds").record(0.123);
//! ```
//!
//! # Features
//!
//! - `prometheus`: Enable Prometheus metrics export via `/metrics` endpoint
//! - `tracing`: Enable tracing span context propagation to metrics labels

mod definitions;
mod error;
mod recorder;
mod snapshot;
pub mod tracing_integration;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
    snapshot::{MetricCategories, MetricSnapshot, MetricType, MetricsSnapshot},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
