//! Atelier cache layer
//!
//! Keeps server-derived state for one session and coordinates writes against it:
//!
//! - **Store**: key to entry map with freshness and in-flight state per key
//! - **Engine**: deduplicated, last-issued-wins reads through the store
//! - **Mutations**: writes that invalidate every key they affect once confirmed
//! - **Optimistic toggles**: instant boolean flips reconciled with the server
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_entries = 512
//! stale_after_seconds = 60
//! refetch_on_invalidate = true
//!
//! [toggle]
//! pending_timeout_seconds = 30
//! ```

mod config;
mod engine;
mod entry;
mod keys;
mod lock;
mod mutation;
mod optimistic;
mod store;

pub use config::CacheConfig;
pub use engine::{FnFetcher, Fetcher, QueryEngine, Watch, fetcher_fn};
pub use entry::{CacheEntry, EntryStatus, RequestId};
pub use keys::{KeySegment, QueryKey, is_prefix_of, make_key};
pub use mutation::{MutationDescriptor, MutationPipeline, Operation};
pub use optimistic::{
    OptimisticToggles, ToggleError, ToggleListener, ToggleOutcome, TogglePhase, ToggleState,
};
pub use store::{CacheStore, FetchTicket, Listener, Resolution, Subscription};
