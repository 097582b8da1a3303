use std::time::{SystemTime, UNIX_EPOCH};

use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::warn;

use crate::error::Result;

/// A per-key limit: `limit` requests allowed per `window_secs`.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    pub requests: u64,
    pub window_secs: u64,
}

impl Limit {
    #[must_use]
    pub fn new(requests: u64, window_secs: u64) -> Self {
        Self { requests, window_secs }
    }
}

/// Outcome of a single sliding-window check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    pub retry_after_secs: Option<u64>,
    pub reset_at: u64,
}

/// Sliding-window limiter over Redis sorted sets. Cheap to clone: wraps a
/// `ConnectionManager`, which is itself a cheap, shareable handle.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    conn: ConnectionManager,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// §4.A algorithm: prune, count, peek oldest, refresh expiry — all in
    /// one pipelined round trip — then conditionally insert.
    ///
    /// If Redis is unreachable the check fails open (allowed, logged) per
    /// §4.A's stated failure semantics.
    pub async fn check(&mut self, key: &str, limit: Limit) -> Decision {
        match self.check_inner(key, limit).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, key, "rate limiter check failed, failing open");
                Decision { allowed: true, remaining: limit.requests, retry_after_secs: None, reset_at: now_secs() }
            },
        }
    }

    async fn check_inner(&mut self, key: &str, limit: Limit) -> Result<Decision> {
        let now = now_secs();
        let cutoff = now.saturating_sub(limit.window_secs) as f64;

        let (count, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
            .zrembyscore(key, 0, cutoff)
            .ignore()
            .zcard(key)
            .zrange_withscores(key, 0, 0)
            .expire(key, (limit.window_secs + 60) as i64)
            .ignore()
            .query_async(&mut self.conn)
            .await?;

        let oldest_score = oldest.first().map(|(_, score)| *score as u64);
        let decision = decide(now, limit, count, oldest_score);

        if decision.allowed {
            let member = format!("{now}:{}", now_nanos());
            if let Err(e) = self.conn.zadd::<_, _, _, ()>(key, member, now as f64).await {
                warn!(error = %e, key, "rate limiter insert failed, counter may undercount");
            }
        }

        Ok(decision)
    }
}

/// Pure window decision, split out from `check_inner` so it's testable
/// without a Redis connection.
fn decide(now: u64, limit: Limit, count: u64, oldest_score: Option<u64>) -> Decision {
    let oldest_score = oldest_score.unwrap_or(now);
    let reset_at = oldest_score + limit.window_secs;

    if count < limit.requests {
        Decision { allowed: true, remaining: limit.requests - count - 1, retry_after_secs: None, reset_at }
    } else {
        let retry_after = reset_at.saturating_sub(now).max(1);
        Decision { allowed: false, remaining: 0, retry_after_secs: Some(retry_after), reset_at }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn now_nanos() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::under_limit(3, 5, None, true, 1)]
    #[case::at_limit(5, 5, None, false, 0)]
    #[case::over_limit(6, 5, None, false, 0)]
    fn decide_allows_until_limit_reached(
        #[case] count: u64,
        #[case] limit: u64,
        #[case] oldest: Option<u64>,
        #[case] expect_allowed: bool,
        #[case] expect_remaining: u64,
    ) {
        let decision = decide(1_000, Limit::new(limit, 60), count, oldest);
        assert_eq!(decision.allowed, expect_allowed);
        assert_eq!(decision.remaining, expect_remaining);
    }

    #[test]
    fn denied_decision_carries_retry_after_from_oldest_entry() {
        let decision = decide(1_000, Limit::new(5, 60), 5, Some(970));
        assert!(!decision.allowed);
        assert_eq!(decision.reset_at, 1_030);
        assert_eq!(decision.retry_after_secs, Some(30));
    }

    #[test]
    fn retry_after_is_never_zero_even_when_reset_has_passed() {
        let decision = decide(1_000, Limit::new(5, 60), 5, Some(900));
        assert_eq!(decision.retry_after_secs, Some(1));
    }

}
