///! KWeather Air365 station data
///!
///! Fetches the IoT data endpoint for one station, parses the XML body,
///! and memoizes the readings per time bucket so every observer of a
///! station shares one upstream call.

pub mod types;
pub mod parser;
pub mod fetcher;
pub mod cache;

pub use cache::FetchCache;
pub use fetcher::{HttpFetcher, StationFetcher};
pub use parser::parse_station_xml;
pub use types::{BucketKey, CacheEntry, Readings, LAST_UPDATE_TIME_FIELD};
