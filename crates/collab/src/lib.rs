//! Real-time collaborative diagram editing core (§1-§6): session lifecycle,
//! wire-message pipeline, presenter mode, and the HTTP/WS surface a host
//! binds into its router alongside its own REST CRUD and auth layers.

pub mod auth;
pub mod diagram;
pub mod error;
pub mod hub;
pub mod http;
pub mod net;
pub mod session;
pub mod state;
pub mod ws;

pub use error::{ApiError, ApiResult};
pub use hub::Hub;
pub use http::router;
pub use state::AppState;
