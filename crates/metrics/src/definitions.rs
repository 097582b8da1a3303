//! Metric name and label definitions.
//!
//! Centralizes the metric names emitted across `tmi-collab` so dashboards and
//! alerts have one place to refer to.

/// HTTP request metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "tmi_http_requests_total";
    /// Duration of HTTP requests in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "tmi_http_request_duration_seconds";
    /// Number of currently in-flight HTTP requests
    pub const REQUESTS_IN_FLIGHT: &str = "tmi_http_requests_in_flight";
}

/// WebSocket session metrics (§5 heartbeat, §4.G pipeline)
pub mod session {
    /// Total number of sessions established
    pub const CONNECTIONS_TOTAL: &str = "tmi_session_connections_total";
    /// Number of currently active sessions
    pub const CONNECTIONS_ACTIVE: &str = "tmi_session_connections_active";
    /// Total inbound messages received, by message type
    pub const MESSAGES_RECEIVED_TOTAL: &str = "tmi_session_messages_received_total";
    /// Total outbound messages sent, by message type
    pub const MESSAGES_SENT_TOTAL: &str = "tmi_session_messages_sent_total";
    /// Message processing duration in seconds
    pub const MESSAGE_DURATION_SECONDS: &str = "tmi_session_message_duration_seconds";
    /// Sessions disconnected because their outbound queue overflowed
    pub const QUEUE_OVERFLOW_DISCONNECTS_TOTAL: &str =
        "tmi_session_queue_overflow_disconnects_total";
    /// `state_correction` frames sent due to a sequence gap or duplicate
    pub const STATE_CORRECTIONS_TOTAL: &str = "tmi_session_state_corrections_total";
    /// Operations rejected by authorization or validation
    pub const OPERATIONS_REJECTED_TOTAL: &str = "tmi_session_operations_rejected_total";
}

/// Diagram (threat model) collaboration metrics
pub mod diagram {
    /// Cell operations applied successfully
    pub const OPERATIONS_APPLIED_TOTAL: &str = "tmi_diagram_operations_applied_total";
    /// Number of diagrams with at least one connected participant
    pub const ACTIVE: &str = "tmi_diagram_active";
    /// Presenter-mode changes
    pub const PRESENTER_CHANGES_TOTAL: &str = "tmi_diagram_presenter_changes_total";
}

/// Rate limiting metrics (§4.A)
pub mod ratelimit {
    /// Rate limit checks performed, by scope
    pub const CHECKS_TOTAL: &str = "tmi_ratelimit_checks_total";
    /// Requests denied for exceeding a window, by scope
    pub const DENIED_TOTAL: &str = "tmi_ratelimit_denied_total";
    /// Rate limit check duration in seconds
    pub const CHECK_DURATION_SECONDS: &str = "tmi_ratelimit_check_duration_seconds";
}

/// Webhook/add-on dispatch metrics (§4.B-E)
pub mod webhook {
    /// Invocations created
    pub const INVOCATIONS_CREATED_TOTAL: &str = "tmi_webhook_invocations_created_total";
    /// Invocations that completed, by outcome (succeeded, failed, timed_out)
    pub const INVOCATIONS_COMPLETED_TOTAL: &str = "tmi_webhook_invocations_completed_total";
    /// Invocations reaped for exceeding the staleness timeout
    pub const INVOCATIONS_REAPED_TOTAL: &str = "tmi_webhook_invocations_reaped_total";
    /// Delivery duration in seconds
    pub const DELIVERY_DURATION_SECONDS: &str = "tmi_webhook_delivery_duration_seconds";
    /// Number of invocations currently queued
    pub const QUEUE_DEPTH: &str = "tmi_webhook_queue_depth";
    /// HMAC signature verification failures on inbound callbacks
    pub const SIGNATURE_FAILURES_TOTAL: &str = "tmi_webhook_signature_failures_total";
}

/// System/runtime metrics
pub mod system {
    /// Process uptime in seconds
    pub const UPTIME_SECONDS: &str = "tmi_uptime_seconds";
    /// Build information (labels: version, commit)
    pub const BUILD_INFO: &str = "tmi_build_info";
}

/// Common label keys used across metrics
pub mod labels {
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const MESSAGE_TYPE: &str = "message_type";
    pub const SCOPE: &str = "scope";
    pub const OUTCOME: &str = "outcome";
    pub const ERROR_TYPE: &str = "error_type";
    pub const REASON: &str = "reason";
}

/// Standard histogram buckets for different metric types
pub mod buckets {
    use once_cell::sync::Lazy;

    /// HTTP/websocket-message duration buckets (in seconds), 1ms to 60s
    pub static HTTP_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]
    });

    /// Webhook delivery duration buckets (in seconds), 10ms to 5 minutes
    pub static WEBHOOK_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
        ]
    });

    /// Queue depth buckets, 1 to 10000
    pub static QUEUE_SIZE: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 10000.0,
        ]
    });
}
