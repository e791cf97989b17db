//! Query key definitions.
//!
//! A `QueryKey` names one cacheable query as an ordered list of segments.
//! Keys compare by value and form a prefix hierarchy: the key `(journals)`
//! covers `(journals, page:1)` and `(journals, authorId:7)` alike.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One segment of a query key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Number(i64),
    Text(String),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for KeySegment {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        Self::Number(i64::from(value))
    }
}

/// Identifies a resource collection or instance for caching and invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Start a key at its resource type.
    pub fn new(resource: impl Into<KeySegment>) -> Self {
        Self(vec![resource.into()])
    }

    /// Build a key from raw segments. An empty key is the root and prefixes every key.
    pub fn from_segments(segments: impl IntoIterator<Item = KeySegment>) -> Self {
        Self(segments.into_iter().collect())
    }

    /// Append a positional segment.
    #[must_use]
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Append a named parameter rendered as a single `name:value` segment.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.push(KeySegment::Text(format!("{name}:{value}")));
        self
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resource type, i.e. the first segment.
    pub fn resource(&self) -> Option<&KeySegment> {
        self.0.first()
    }

    /// True iff `self`'s segments are a prefix of `other`'s (a key prefixes itself).
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str(")")
    }
}

/// Build a key from a resource type and its scope parameters.
pub fn make_key<I, S>(resource: &str, params: I) -> QueryKey
where
    I: IntoIterator<Item = S>,
    S: Into<KeySegment>,
{
    let mut key = QueryKey::new(resource);
    key.0.extend(params.into_iter().map(Into::into));
    key
}

/// Free-function form of [`QueryKey::is_prefix_of`].
pub fn is_prefix_of(prefix: &QueryKey, key: &QueryKey) -> bool {
    prefix.is_prefix_of(key)
}

/// `query_key!["journals", "page:1"]` builds a key from mixed segments.
#[macro_export]
macro_rules! query_key {
    ($($segment:expr),+ $(,)?) => {
        $crate::cache::QueryKey::from_segments([
            $($crate::cache::KeySegment::from($segment)),+
        ])
    };
}
