///! Air365 data types

use std::collections::BTreeMap;
use std::sync::Arc;

use air365_common::{FieldKind, StationQuery};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw tag → text pairs from one successful fetch, values kept verbatim
pub type Readings = BTreeMap<String, String>;

/// Key under which the fetch completion time is stored
pub const LAST_UPDATE_TIME_FIELD: &str = "last_update_time";

/// Index of a fixed-width time window since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BucketKey(i64);

impl BucketKey {
    /// `floor(now / width)`; `width` is clamped to at least one second.
    pub fn at(now: DateTime<Utc>, width: std::time::Duration) -> Self {
        let width_secs = width.as_secs().max(1) as i64;
        Self(now.timestamp().div_euclid(width_secs))
    }

    pub fn index(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The readings held for one station in the current bucket
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bucket_key: BucketKey,
    pub station_no: StationQuery,
    pub readings: Arc<Readings>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn get(&self, field: FieldKind) -> Option<&str> {
        self.readings.get(field.upstream_tag()).map(String::as_str)
    }
}
