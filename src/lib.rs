//! Atelier client library.
//!
//! Keeps server-derived state for projects, journals, posts, categories, site
//! settings and follow relationships consistent across every view of a session.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use error::{ErrorReport, RequestError};
pub use session::Session;
