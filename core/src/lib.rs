/// Amora realtime session core
///
/// Client-side library for the Amora matching app: connection management,
/// inbound event ordering and dedup, typing presence, toast fan-out, and the
/// distance-filtered discovery swipe queue. CRUD services, auth, and UI live
/// elsewhere and talk to this crate through its contracts.

pub mod config;
pub mod discovery;
pub mod error;
pub mod geo;
pub mod profile_store;
pub mod realtime;
pub mod rest;
pub mod session;

pub use config::Config;
pub use error::{AmoraError, Result};
pub use session::{Session, SessionEvent};
