//! Add-on invocation lifecycle record (§3, §4.B).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tmi_common::{InvocationId, ThreatModelId, UserId};

use crate::error::{Error, Result};

pub const MAX_PAYLOAD_BYTES: usize = 1024;
pub const INVOCATION_TTL_SECS: u64 = 7 * 24 * 3600;
pub const ACTIVE_POINTER_TTL_SECS: u64 = 3600;
pub const STALENESS_TIMEOUT_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl InvocationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub id: InvocationId,
    pub addon_id: String,
    pub threat_model_id: ThreatModelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    pub invoked_by_uuid: UserId,
    pub invoked_by_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoked_by_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoked_by_name: Option<String>,
    pub payload: serde_json::Value,
    pub status: InvocationStatus,
    pub status_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Fields a caller supplies to create a new invocation (§6 `POST /addons/:id/invoke`).
pub struct NewInvocation {
    pub addon_id: String,
    pub threat_model_id: ThreatModelId,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub invoked_by_uuid: UserId,
    pub invoked_by_id: String,
    pub invoked_by_email: Option<String>,
    pub invoked_by_name: Option<String>,
    pub payload: serde_json::Value,
}

impl Invocation {
    pub fn new(fields: NewInvocation, now: DateTime<Utc>) -> Result<Self> {
        let encoded_len = serde_json::to_vec(&fields.payload)?.len();
        if encoded_len > MAX_PAYLOAD_BYTES {
            return Err(Error::PayloadTooLarge { limit: MAX_PAYLOAD_BYTES });
        }

        Ok(Self {
            id: InvocationId::new(),
            addon_id: fields.addon_id,
            threat_model_id: fields.threat_model_id,
            object_type: fields.object_type,
            object_id: fields.object_id,
            invoked_by_uuid: fields.invoked_by_uuid,
            invoked_by_id: fields.invoked_by_id,
            invoked_by_email: fields.invoked_by_email,
            invoked_by_name: fields.invoked_by_name,
            payload: fields.payload,
            status: InvocationStatus::Pending,
            status_percent: 0,
            status_message: None,
            created_at: now,
            status_updated_at: now,
            last_activity_at: now,
        })
    }

    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal()
            && (now - self.last_activity_at).num_seconds() >= STALENESS_TIMEOUT_SECS
    }

    /// Apply a status update, enforcing the §4.B/§4.D transition rules.
    /// Rejects updates to a terminal invocation and out-of-range percentages.
    pub fn apply_status_update(
        &mut self,
        status: InvocationStatus,
        status_percent: i32,
        status_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::AlreadyTerminal(self.id.as_uuid()));
        }
        if matches!(status, InvocationStatus::Pending) {
            return Err(Error::InvalidTransition { from: self.status, to: status });
        }
        if !(0..=100).contains(&status_percent) {
            return Err(Error::StatusPercentOutOfRange(status_percent));
        }

        self.status = status;
        self.status_percent = status_percent as u8;
        self.status_message = status_message;
        self.status_updated_at = now;
        self.last_activity_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(now: DateTime<Utc>) -> Invocation {
        Invocation::new(
            NewInvocation {
                addon_id: "addon-1".to_string(),
                threat_model_id: ThreatModelId::new(),
                object_type: None,
                object_id: None,
                invoked_by_uuid: UserId::new(),
                invoked_by_id: "u1".to_string(),
                invoked_by_email: None,
                invoked_by_name: None,
                payload: serde_json::json!({"k": "v"}),
            },
            now,
        )
        .unwrap()
    }

    #[test]
    fn rejects_oversized_payload() {
        let now = Utc::now();
        let big = "x".repeat(2000);
        let err = Invocation::new(
            NewInvocation {
                addon_id: "a".to_string(),
                threat_model_id: ThreatModelId::new(),
                object_type: None,
                object_id: None,
                invoked_by_uuid: UserId::new(),
                invoked_by_id: "u".to_string(),
                invoked_by_email: None,
                invoked_by_name: None,
                payload: serde_json::json!({ "blob": big }),
            },
            now,
        )
        .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
    }

    #[test]
    fn rejects_update_to_terminal_invocation() {
        let now = Utc::now();
        let mut inv = base(now);
        inv.apply_status_update(InvocationStatus::Completed, 100, None, now).unwrap();
        let err = inv.apply_status_update(InvocationStatus::Failed, 0, None, now).unwrap_err();
        assert!(matches!(err, Error::AlreadyTerminal(_)));
    }

    #[test]
    fn rejects_out_of_range_percent() {
        let now = Utc::now();
        let mut inv = base(now);
        let err = inv.apply_status_update(InvocationStatus::InProgress, 101, None, now).unwrap_err();
        assert!(matches!(err, Error::StatusPercentOutOfRange(101)));
    }

    #[test]
    fn stale_after_timeout_while_non_terminal() {
        let now = Utc::now();
        let inv = base(now);
        assert!(!inv.is_stale(now));
        assert!(inv.is_stale(now + chrono::Duration::minutes(16)));
    }
}
