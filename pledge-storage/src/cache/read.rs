//! What a read-through call hands back besides the value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored form of every value written by the tiered cache.
#[derive(Debug, Serialize)]
pub(crate) struct EnvelopeRef<'a, T> {
    pub cached_at: DateTime<Utc>,
    pub value: &'a T,
}

/// Decoded form of [`EnvelopeRef`].
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub cached_at: DateTime<Utc>,
    pub value: T,
}

/// Where a remembered value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Served from a live cache entry.
    Cache,
    /// Built on this call and written back.
    Builder,
}

/// A value returned by `remember_read` or `get_read`.
#[derive(Debug, Clone)]
pub struct Remembered<T> {
    value: T,
    cached_at: DateTime<Utc>,
    origin: Origin,
}

impl<T> Remembered<T> {
    pub(crate) fn built(value: T) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            origin: Origin::Builder,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// When the entry was written. For a built value, the build time.
    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn was_cache_hit(&self) -> bool {
        self.origin == Origin::Cache
    }
}

impl<T> From<Envelope<T>> for Remembered<T> {
    fn from(envelope: Envelope<T>) -> Self {
        Self {
            value: envelope.value,
            cached_at: envelope.cached_at,
            origin: Origin::Cache,
        }
    }
}
