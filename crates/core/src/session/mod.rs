//! Multi-tenant session registry.
//!
//! Every browser connection gets its own session id, authentication state
//! and cached platform client. Sessions start out as guests, are promoted by
//! login, demoted by logout and evicted after a period of inactivity.

mod auth;
mod registry;
mod sweeper;
mod types;

pub use auth::AuthService;
pub use registry::{SessionRegistry, DEFAULT_RETENTION_DAYS};
pub use sweeper::SessionSweeper;
pub use types::*;
