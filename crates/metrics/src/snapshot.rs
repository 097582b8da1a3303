//! Metrics snapshot for internal API consumption.
//!
//! Provides a structured JSON view of current metrics, separate from the
//! Prometheus text format, for an operator-facing status endpoint.

use {
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

/// Type of metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// A single metric value with its labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub labels: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// A complete snapshot of all metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Timestamp when the snapshot was taken (Unix millis)
    pub timestamp: u64,
    pub metrics: Vec<MetricSnapshot>,
    pub categories: MetricCategories,
}

/// Metrics organized by category for easier UI consumption
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricCategories {
    pub session: SessionMetrics,
    pub ratelimit: RateLimitMetrics,
    pub webhook: WebhookMetrics,
    pub system: SystemMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub connections_total: u64,
    pub connections_active: u64,
    pub state_corrections_total: u64,
    pub operations_rejected_total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitMetrics {
    pub checks_total: u64,
    pub denied_total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookMetrics {
    pub invocations_created_total: u64,
    pub invocations_completed_total: u64,
    pub invocations_reaped_total: u64,
    pub queue_depth: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub uptime_seconds: f64,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            metrics: Vec::new(),
            categories: MetricCategories::default(),
        }
    }

    /// Parse Prometheus text format into a structured snapshot.
    ///
    /// Best-effort: extracts bare counter/gauge values, skipping histogram
    /// bucket/sum lines.
    #[must_use]
    pub fn from_prometheus_text(text: &str) -> Self {
        let mut snapshot = Self::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(metric) = parse_prometheus_line(line) {
                update_categories(&mut snapshot.categories, &metric);
                snapshot.metrics.push(metric);
            }
        }

        snapshot
    }
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_prometheus_line(line: &str) -> Option<MetricSnapshot> {
    let (name_and_labels, value_str) = line.rsplit_once(' ')?;
    let value: f64 = value_str.parse().ok()?;

    let (name, labels) = if let Some(brace_start) = name_and_labels.find('{') {
        let name = &name_and_labels[..brace_start];
        let labels_str = name_and_labels
            .get(brace_start + 1..name_and_labels.len() - 1)
            .unwrap_or("");
        (name, parse_labels(labels_str))
    } else {
        (name_and_labels, HashMap::new())
    };

    if name.ends_with("_bucket") || name.ends_with("_sum") {
        return None;
    }

    let metric_type = if name.ends_with("_total") || name.ends_with("_count") {
        MetricType::Counter
    } else {
        MetricType::Gauge
    };

    Some(MetricSnapshot {
        name: name.to_string(),
        metric_type,
        labels,
        value: Some(value),
    })
}

fn parse_labels(labels_str: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if labels_str.is_empty() {
        return labels;
    }
    for part in labels_str.split(',') {
        if let Some((key, value)) = part.split_once('=') {
            labels.insert(key.to_string(), value.trim_matches('"').to_string());
        }
    }
    labels
}

fn update_categories(categories: &mut MetricCategories, metric: &MetricSnapshot) {
    let name = metric.name.as_str();
    let value = metric.value.unwrap_or(0.0) as u64;

    match name {
        "tmi_session_connections_total" => categories.session.connections_total += value,
        "tmi_session_connections_active" => categories.session.connections_active = value,
        "tmi_session_state_corrections_total" => {
            categories.session.state_corrections_total += value;
        },
        "tmi_session_operations_rejected_total" => {
            categories.session.operations_rejected_total += value;
        },
        "tmi_ratelimit_checks_total" => categories.ratelimit.checks_total += value,
        "tmi_ratelimit_denied_total" => categories.ratelimit.denied_total += value,
        "tmi_webhook_invocations_created_total" => {
            categories.webhook.invocations_created_total += value;
        },
        "tmi_webhook_invocations_completed_total" => {
            categories.webhook.invocations_completed_total += value;
        },
        "tmi_webhook_invocations_reaped_total" => {
            categories.webhook.invocations_reaped_total += value;
        },
        "tmi_webhook_queue_depth" => categories.webhook.queue_depth = value,
        "tmi_uptime_seconds" => categories.system.uptime_seconds = metric.value.unwrap_or(0.0),
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_counter_line() {
        let metric = parse_prometheus_line("tmi_session_connections_total 42").unwrap();
        assert_eq!(metric.name, "tmi_session_connections_total");
        assert_eq!(metric.value, Some(42.0));
        assert!(metric.labels.is_empty());
    }

    #[test]
    fn parses_line_with_labels() {
        let metric =
            parse_prometheus_line(r#"tmi_ratelimit_denied_total{scope="ip"} 7"#).unwrap();
        assert_eq!(metric.value, Some(7.0));
        assert_eq!(metric.labels.get("scope"), Some(&"ip".to_string()));
    }

    #[test]
    fn snapshot_aggregates_known_categories() {
        let text = "tmi_session_connections_total 10\ntmi_webhook_queue_depth 3\n";
        let snapshot = MetricsSnapshot::from_prometheus_text(text);
        assert_eq!(snapshot.categories.session.connections_total, 10);
        assert_eq!(snapshot.categories.webhook.queue_depth, 3);
    }
}
