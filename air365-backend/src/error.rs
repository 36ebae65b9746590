use thiserror::Error;

/// Why a single upstream fetch produced no readings.
///
/// Cloneable so one outcome can be handed to every caller coalesced onto the
/// same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error for station {station_no}: {message}")]
    Transport { station_no: String, message: String },

    #[error("upstream returned HTTP {status} for station {station_no}")]
    UpstreamStatus { station_no: String, status: u16 },

    #[error("malformed response for station {station_no}: {message}")]
    Parse { station_no: String, message: String },
}

impl FetchError {
    pub fn station_no(&self) -> &str {
        match self {
            FetchError::Transport { station_no, .. }
            | FetchError::UpstreamStatus { station_no, .. }
            | FetchError::Parse { station_no, .. } => station_no,
        }
    }
}

/// Invalid station group configuration. Only the offending group is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("group '{group}': station_no is missing or empty")]
    EmptyStationNo { group: String },

    #[error("group '{group}': interval must be a positive number of seconds, got {interval}")]
    ZeroInterval { group: String, interval: i64 },

    #[error("group '{group}': interval of {interval}s exceeds the maximum of {max}s")]
    IntervalTooLarge { group: String, interval: i64, max: i64 },

    #[error("group '{group}': unknown sensor type '{field}'")]
    UnknownField { group: String, field: String },

    #[error("group '{group}': no sensor types requested")]
    NoFields { group: String },

    #[error("cache_bucket_minutes must be at least 1")]
    ZeroBucket,
}

/// A refresh cycle that did not update any observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("response is missing requested fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}
