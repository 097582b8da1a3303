//! Identity carried on messages (§4.F, §6).

use serde::{Deserialize, Serialize};
use tmi_common::UserId;

/// The user a server-initiated message is attributed to. Must satisfy
/// `has(provider_id) ∨ has(email)`; purely system events may omit it
/// entirely at the message level instead of constructing an empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatingUser {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UserIdentityError {
    #[error("initiating_user must carry a provider_id or an email")]
    MissingIdentity,
    #[error("email does not look like an email address")]
    MalformedEmail,
}

impl InitiatingUser {
    pub fn validate(&self) -> Result<(), UserIdentityError> {
        match (&self.provider_id, &self.email) {
            (None, None) => Err(UserIdentityError::MissingIdentity),
            (_, Some(email)) if !looks_like_email(email) => Err(UserIdentityError::MalformedEmail),
            _ => Ok(()),
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// A member of a session's participant list (`participants_update`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(provider_id: Option<&str>, email: Option<&str>) -> InitiatingUser {
        InitiatingUser {
            user_id: UserId::new(),
            provider_id: provider_id.map(str::to_string),
            email: email.map(str::to_string),
            display_name: None,
        }
    }

    #[test]
    fn requires_provider_id_or_email() {
        assert!(user(None, None).validate().is_err());
        assert!(user(Some("idp:123"), None).validate().is_ok());
        assert!(user(None, Some("a@b.com")).validate().is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        assert_eq!(
            user(None, Some("not-an-email")).validate(),
            Err(UserIdentityError::MalformedEmail)
        );
    }
}
