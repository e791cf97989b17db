//! Cache entry state.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::RequestError;

use super::keys::QueryKey;

/// Request sequence number, issued store-wide. Later requests for a key always carry larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Absent,
    Fetching,
    Fresh,
    Stale,
    Error,
}

/// Snapshot of one cached query.
///
/// `data` survives `Stale`, `Fetching` and `Error` transitions so views keep
/// rendering the last known value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub data: Option<Value>,
    pub status: EntryStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    pub error: Option<RequestError>,
    pub in_flight: Option<RequestId>,
}

impl CacheEntry {
    pub fn absent(key: QueryKey) -> Self {
        Self {
            key,
            data: None,
            status: EntryStatus::Absent,
            last_updated: None,
            error: None,
            in_flight: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.status == EntryStatus::Fresh
    }

    pub fn is_fetching(&self) -> bool {
        self.status == EntryStatus::Fetching
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}
