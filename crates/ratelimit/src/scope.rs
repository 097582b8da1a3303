use crate::limiter::{Decision, Limit, SlidingWindowLimiter};

/// Named rate-limit scopes (§4.A). The auth/connect path evaluates
/// `Session`, `Ip`, `User` in that fixed order; the webhook path uses the
/// remaining variants for its own per-owner/per-user limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Session,
    Ip,
    User,
    WebhookEventsPerMinute,
    WebhookSubscriptionRequestsPerMinute,
    WebhookSubscriptionRequestsPerDay,
    WebhookInvocationsPerHour,
}

impl Scope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Ip => "ip",
            Self::User => "user",
            Self::WebhookEventsPerMinute => "webhook_events_per_minute",
            Self::WebhookSubscriptionRequestsPerMinute => "webhook_subscription_requests_per_minute",
            Self::WebhookSubscriptionRequestsPerDay => "webhook_subscription_requests_per_day",
            Self::WebhookInvocationsPerHour => "webhook_invocations_per_hour",
        }
    }
}

/// One scope's key and limit, to be checked as part of a fixed-order
/// multi-scope decision.
pub struct ScopedCheck<'a> {
    pub scope: Scope,
    pub key: &'a str,
    pub limit: Limit,
}

#[derive(Debug, Clone, Copy)]
pub struct MultiScopeDecision {
    pub allowed: bool,
    pub denied_scope: Option<Scope>,
    pub decision: Decision,
}

/// Evaluate `checks` in order, stopping at the first deny (§4.A:
/// "evaluate scopes in a fixed order ... return on the first deny").
pub async fn check_fixed_order(
    limiter: &mut SlidingWindowLimiter,
    checks: &[ScopedCheck<'_>],
) -> MultiScopeDecision {
    evaluate_in_order(checks, |redis_key, limit| limiter.check(&redis_key, limit)).await
}

/// The fixed-order stop-at-first-deny control flow, taking the single-scope
/// check as an injectable async function so it's testable without a Redis
/// connection backing it.
pub async fn evaluate_in_order<F, Fut>(checks: &[ScopedCheck<'_>], mut check_fn: F) -> MultiScopeDecision
where
    F: FnMut(String, Limit) -> Fut,
    Fut: std::future::Future<Output = Decision>,
{
    let mut last = Decision { allowed: true, remaining: 0, retry_after_secs: None, reset_at: 0 };

    for check in checks {
        let redis_key = format!("auth:ratelimit:{}:{}s:{}", check.scope.as_str(), check.limit.window_secs, check.key);
        let decision = check_fn(redis_key, check.limit).await;
        last = decision;
        if !decision.allowed {
            return MultiScopeDecision { allowed: false, denied_scope: Some(check.scope), decision };
        }
    }

    MultiScopeDecision { allowed: true, denied_scope: None, decision: last }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_names_match_redis_key_convention() {
        assert_eq!(Scope::Session.as_str(), "session");
        assert_eq!(Scope::Ip.as_str(), "ip");
    }
}
