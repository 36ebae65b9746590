//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use air365_common::StationQuery;
use async_trait::async_trait;

use crate::error::FetchError;
use crate::module::air365::{Readings, StationFetcher};

pub fn readings(pairs: &[(&str, &str)]) -> Readings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Returns queued outcomes in order and counts every call.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Readings, FetchError>>>,
    stations: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<Readings, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            stations: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stations(&self) -> Vec<String> {
        self.stations.lock().unwrap().clone()
    }
}

#[async_trait]
impl StationFetcher for ScriptedFetcher {
    async fn fetch(&self, station: &StationQuery) -> Result<Readings, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.stations.lock().unwrap().push(station.station_no().to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(FetchError::Transport {
                station_no: station.station_no().to_string(),
                message: "script exhausted".to_string(),
            })
        })
    }
}
