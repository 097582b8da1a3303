//! Add-on webhook dispatch: HMAC signing, invocation lifecycle state machine,
//! Redis-backed transient store, dispatcher worker pool, and event emitter
//! (spec §2 module group B-E).

mod cascade;
mod dispatcher;
mod error;
mod events;
pub mod hmac;
mod invocation;
mod reaper;
mod store;
mod subscription;
#[cfg(test)]
mod test_support;

pub use {
    cascade::run as run_cascade_sweep,
    dispatcher::{DispatchHandle, DispatcherConfig, apply_inbound_status_update, spawn as spawn_dispatcher},
    error::{Error, Result},
    events::{EntityEvent, EventEmitter, matches_event_type},
    invocation::{Invocation, InvocationStatus, NewInvocation, MAX_PAYLOAD_BYTES, STALENESS_TIMEOUT_SECS},
    reaper::run as run_reaper,
    store::InvocationStore,
    subscription::{Subscription, SubscriptionProvider},
};
