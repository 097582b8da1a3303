//! Two-pass frame parsing (§4.F): peek the discriminator before committing
//! to a full decode, so an unknown `message_type` gets a clean error
//! instead of surfacing serde's internal-tagging failure mode.

use crate::message::Message;

const KNOWN_TYPES: &[&str] = &[
    "diagram_operation_request",
    "diagram_operation_event",
    "presenter_request",
    "presenter_denied",
    "change_presenter_request",
    "change_presenter",
    "remove_participant_request",
    "remove_participant",
    "current_presenter",
    "presenter_cursor",
    "presenter_selection",
    "authorization_denied",
    "state_correction",
    "diagram_state_sync",
    "resync_request",
    "resync_response",
    "history_operation",
    "undo_request",
    "redo_request",
    "participants_update",
    "error",
    "operation_rejected",
];

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("missing message_type")]
    MissingType,
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),
    #[error("malformed {message_type} frame: {source}")]
    Malformed {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a single wire frame. First pass peeks `message_type`; second pass
/// deserializes into the matching [`Message`] arm.
pub fn parse_message(raw: &str) -> Result<Message, CodecError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| CodecError::Malformed {
        message_type: "<unparsed>".to_string(),
        source: e,
    })?;

    let message_type = value
        .get("message_type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| match value.as_object() {
            Some(_) => CodecError::MissingType,
            None => CodecError::NotAnObject,
        })?
        .to_string();

    if !KNOWN_TYPES.contains(&message_type.as_str()) {
        return Err(CodecError::UnsupportedType(message_type));
    }

    serde_json::from_value(value).map_err(|e| CodecError::Malformed { message_type, source: e })
}

#[cfg(test)]
mod tests {
    use tmi_common::DiagramId;

    use super::*;

    #[test]
    fn rejects_unknown_message_type() {
        let raw = r#"{"message_type":"teleport_request","diagram_id":"00000000-0000-0000-0000-000000000000"}"#;
        let err = parse_message(raw).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType(t) if t == "teleport_request"));
    }

    #[test]
    fn rejects_missing_message_type() {
        let err = parse_message("{}").unwrap_err();
        assert!(matches!(err, CodecError::MissingType));
    }

    #[test]
    fn parses_known_variant() {
        let diagram_id = DiagramId::new();
        let raw = serde_json::json!({
            "message_type": "resync_request",
            "diagram_id": diagram_id,
        })
        .to_string();
        let msg = parse_message(&raw).unwrap();
        assert_eq!(msg.type_name(), "resync_request");
    }
}
