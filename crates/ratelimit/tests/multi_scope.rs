//! Integration coverage for the §4.A auth-path multi-scope decision: session
//! 5/60s, then IP 100/60s, then user 10/3600s, evaluated in that fixed order
//! with the first deny winning.

use std::sync::atomic::{AtomicUsize, Ordering};

use tmi_ratelimit::{Decision, Limit, Scope, ScopedCheck, evaluate_in_order};

fn allow(remaining: u64) -> Decision {
    Decision { allowed: true, remaining, retry_after_secs: None, reset_at: 1_000 }
}

fn deny() -> Decision {
    Decision { allowed: false, remaining: 0, retry_after_secs: Some(42), reset_at: 1_000 }
}

#[tokio::test]
async fn allows_when_every_scope_is_under_its_limit() {
    let checks = [
        ScopedCheck { scope: Scope::Session, key: "s1", limit: Limit::new(5, 60) },
        ScopedCheck { scope: Scope::Ip, key: "1.2.3.4", limit: Limit::new(100, 60) },
        ScopedCheck { scope: Scope::User, key: "u1", limit: Limit::new(10, 3600) },
    ];

    let decision = evaluate_in_order(&checks, |_key, _limit| async { allow(4) }).await;

    assert!(decision.allowed);
    assert!(decision.denied_scope.is_none());
}

#[tokio::test]
async fn session_scope_is_checked_before_ip_and_user() {
    let checks = [
        ScopedCheck { scope: Scope::Session, key: "s1", limit: Limit::new(5, 60) },
        ScopedCheck { scope: Scope::Ip, key: "1.2.3.4", limit: Limit::new(100, 60) },
        ScopedCheck { scope: Scope::User, key: "u1", limit: Limit::new(10, 3600) },
    ];
    let calls = AtomicUsize::new(0);

    let decision = evaluate_in_order(&checks, |key, _limit| {
        let seen = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if seen == 0 {
                assert!(key.contains("session"), "first evaluated scope must be session, got {key}");
                deny()
            } else {
                panic!("evaluation should have stopped after the session deny");
            }
        }
    })
    .await;

    assert!(!decision.allowed);
    assert_eq!(decision.denied_scope, Some(Scope::Session));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "ip/user scopes must not be checked once session denies");
}

#[tokio::test]
async fn ip_deny_stops_before_user_scope_runs() {
    let checks = [
        ScopedCheck { scope: Scope::Session, key: "s1", limit: Limit::new(5, 60) },
        ScopedCheck { scope: Scope::Ip, key: "1.2.3.4", limit: Limit::new(100, 60) },
        ScopedCheck { scope: Scope::User, key: "u1", limit: Limit::new(10, 3600) },
    ];
    let calls = AtomicUsize::new(0);

    let decision = evaluate_in_order(&checks, |key, _limit| {
        let seen = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            match seen {
                0 => {
                    assert!(key.contains("session"));
                    allow(1)
                }
                1 => {
                    assert!(key.contains(Scope::Ip.as_str()));
                    deny()
                }
                _ => panic!("user scope must not run once ip denies"),
            }
        }
    })
    .await;

    assert!(!decision.allowed);
    assert_eq!(decision.denied_scope, Some(Scope::Ip));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
