//! Platform resources on top of the cache: keys, paths, declared mutations,
//! the typed client and follow toggles.

pub mod client;
pub mod follow;
pub mod keys;
pub mod mutations;
pub mod paths;

pub use client::{AtelierClient, ResourceFetcher};
pub use follow::{FollowController, FollowError};
pub use mutations::PostScope;
