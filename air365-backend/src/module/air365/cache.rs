///! Bucketed single-flight cache in front of the station fetcher
///!
///! One slot per station. A slot is either waiting on a shared in-flight
///! fetch or holds the readings of the bucket it was fetched in. Failures are
///! never stored, so the next caller in the same bucket fetches again.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use air365_common::StationQuery;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use super::fetcher::StationFetcher;
use super::types::{BucketKey, CacheEntry, Readings};
use crate::error::FetchError;

type FetchOutcome = Result<Arc<Readings>, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

enum Slot {
    InFlight { generation: u64, fetch: SharedFetch },
    Ready(CacheEntry),
}

struct StationSlot {
    bucket: BucketKey,
    slot: Slot,
}

enum Lookup {
    Hit(Arc<Readings>),
    Join(u64, SharedFetch),
}

pub struct FetchCache {
    fetcher: Arc<dyn StationFetcher>,
    bucket_width: Duration,
    slots: Mutex<HashMap<StationQuery, StationSlot>>,
    generation: AtomicU64,
}

impl FetchCache {
    pub fn new(fetcher: Arc<dyn StationFetcher>, bucket_width: Duration) -> Self {
        Self {
            fetcher,
            bucket_width,
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn bucket_key(&self, now: DateTime<Utc>) -> BucketKey {
        BucketKey::at(now, self.bucket_width)
    }

    /// Readings for `station` in the bucket containing `now`.
    ///
    /// Callers arriving while a fetch for the same bucket is running await
    /// that fetch instead of starting another one. A caller whose `now` falls
    /// before the stored bucket (wall clock stepped back) is served the newer
    /// slot; only a later bucket replaces it.
    pub async fn get_or_fetch(
        &self,
        station: &StationQuery,
        now: DateTime<Utc>,
    ) -> Result<Arc<Readings>, FetchError> {
        let bucket = self.bucket_key(now);

        let (generation, fetch) = {
            let mut slots = self.slots.lock().await;

            let current = slots
                .get(station)
                .filter(|s| s.bucket >= bucket)
                .map(|s| {
                    if s.bucket > bucket {
                        tracing::debug!(
                            "Clock behind stored bucket for station {} ({} < {}), reusing it",
                            station,
                            bucket,
                            s.bucket
                        );
                    }
                    match &s.slot {
                        Slot::Ready(entry) => Lookup::Hit(entry.readings.clone()),
                        Slot::InFlight { generation, fetch } => Lookup::Join(*generation, fetch.clone()),
                    }
                });

            match current {
                Some(Lookup::Hit(readings)) => {
                    tracing::debug!("Cache hit for station {} (bucket {})", station, bucket);
                    return Ok(readings);
                }
                Some(Lookup::Join(generation, fetch)) => {
                    tracing::debug!("Joining in-flight fetch for station {} (bucket {})", station, bucket);
                    (generation, fetch)
                }
                None => {
                    if let Some(stale) = slots.get(station) {
                        tracing::debug!(
                            "Evicting station {} bucket {} (now {})",
                            station,
                            stale.bucket,
                            bucket
                        );
                    }

                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.start_fetch(station.clone());
                    slots.insert(
                        station.clone(),
                        StationSlot {
                            bucket,
                            slot: Slot::InFlight {
                                generation,
                                fetch: fetch.clone(),
                            },
                        },
                    );
                    (generation, fetch)
                }
            }
        };

        let outcome = fetch.await;
        self.settle(station, generation, &outcome).await;
        outcome
    }

    fn start_fetch(&self, station: StationQuery) -> SharedFetch {
        let fetcher = self.fetcher.clone();
        async move { fetcher.fetch(&station).await.map(Arc::new) }
            .boxed()
            .shared()
    }

    /// Swap the in-flight slot for its result. Only the slot created for
    /// `generation` is touched, so a newer bucket's fetch is never clobbered.
    /// The entry keeps the slot's bucket, not the settling caller's.
    async fn settle(&self, station: &StationQuery, generation: u64, outcome: &FetchOutcome) {
        let mut slots = self.slots.lock().await;

        let bucket = match slots.get(station) {
            Some(StationSlot {
                bucket,
                slot: Slot::InFlight { generation: g, .. },
            }) if *g == generation => *bucket,
            _ => return,
        };

        match outcome {
            Ok(readings) => {
                slots.insert(
                    station.clone(),
                    StationSlot {
                        bucket,
                        slot: Slot::Ready(CacheEntry {
                            bucket_key: bucket,
                            station_no: station.clone(),
                            readings: readings.clone(),
                            fetched_at: Utc::now(),
                        }),
                    },
                );
            }
            Err(e) => {
                tracing::debug!("Not caching failed fetch for station {}: {}", station, e);
                slots.remove(station);
            }
        }
    }

    /// The stored entry for `station`, if its fetch has completed
    pub async fn peek(&self, station: &StationQuery) -> Option<CacheEntry> {
        let slots = self.slots.lock().await;
        match slots.get(station) {
            Some(StationSlot { slot: Slot::Ready(entry), .. }) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Number of stations with a slot (completed or in flight)
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}
