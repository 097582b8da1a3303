//! Sliding-window rate limiting backed by Redis sorted sets (§4.A).
//!
//! One sorted set per key; members are unique per-request tokens, scores
//! are Unix timestamps. A check prunes entries outside the window, counts
//! what's left, and — if under the limit — inserts a fresh entry. All of
//! it short of the final insert runs in a single pipelined round trip;
//! true atomicity would need a server-side script (§9 design note), which
//! this core trades away for simplicity.

mod error;
mod limiter;
mod scope;

pub use {
    error::{Error, Result},
    limiter::{Decision, Limit, SlidingWindowLimiter},
    scope::{MultiScopeDecision, Scope, ScopedCheck, check_fixed_order, evaluate_in_order},
};
