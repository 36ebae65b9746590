///! Scheduled task manager - one polling task per station group
///!
///! Each group is refreshed once during setup, before its sensors are exposed,
///! then on a fixed interval until shutdown:
///! IDLE -> REFRESHING -> IDLE -> ... -> STOPPED

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::air365::FetchCache;
use super::registry::SensorRegistry;
use crate::config::StationGroup;
use crate::error::RefreshError;

/// Wall clock used to pick the cache bucket
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Refreshing,
    Stopped,
}

/// Progress of one station group, as shown to the host
#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub group: String,
    pub station_no: String,
    pub interval_seconds: u64,
    pub state: PollerState,
    pub refreshes: u64,
    pub failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Refreshes one station group and publishes the results
pub struct StationPoller {
    group: StationGroup,
    cache: Arc<FetchCache>,
    registry: Arc<SensorRegistry>,
    clock: Arc<dyn Clock>,
    status: watch::Sender<PollerStatus>,
    /// When the most recent scheduled refresh began
    last_wakeup: Instant,
}

impl StationPoller {
    pub fn new(
        group: StationGroup,
        cache: Arc<FetchCache>,
        registry: Arc<SensorRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(PollerStatus {
            group: group.slug.clone(),
            station_no: group.station.station_no().to_string(),
            interval_seconds: group.interval.as_secs(),
            state: PollerState::Idle,
            refreshes: 0,
            failures: 0,
            last_success: None,
            last_error: None,
        });

        Self {
            group,
            cache,
            registry,
            clock,
            status,
            last_wakeup: Instant::now(),
        }
    }

    pub fn status(&self) -> watch::Receiver<PollerStatus> {
        self.status.subscribe()
    }

    fn set_state(&self, state: PollerState) {
        self.status.send_modify(|s| s.state = state);
    }

    /// One refresh cycle. Returns how many sensors changed value.
    ///
    /// A failed fetch, or a response missing any requested field, leaves every
    /// sensor of the group untouched.
    pub async fn refresh(&self) -> Result<usize, RefreshError> {
        self.set_state(PollerState::Refreshing);

        let result = match self
            .cache
            .get_or_fetch(&self.group.station, self.clock.now())
            .await
        {
            Ok(readings) => self.publish(&readings),
            Err(e) => Err(RefreshError::from(e)),
        };

        self.status.send_modify(|s| {
            s.state = PollerState::Idle;
            s.refreshes += 1;
            match &result {
                Ok(_) => {
                    s.last_success = Some(Utc::now());
                    s.last_error = None;
                }
                Err(e) => {
                    s.failures += 1;
                    s.last_error = Some(e.to_string());
                }
            }
        });

        result
    }

    fn publish(&self, readings: &super::air365::Readings) -> Result<usize, RefreshError> {
        let missing: Vec<String> = self
            .group
            .fields
            .iter()
            .filter(|f| !readings.contains_key(f.upstream_tag()))
            .map(|f| f.upstream_tag().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RefreshError::MissingFields(missing));
        }

        let station_no = self.group.station.station_no();
        let mut changed = 0;
        for &field in &self.group.fields {
            if let Some(value) = readings.get(field.upstream_tag()) {
                changed += self.registry.write(station_no, field, value);
            }
        }
        Ok(changed)
    }

    async fn refresh_logged(&self) {
        match self.refresh().await {
            Ok(changed) => tracing::info!(
                "Refreshed group '{}' (station {}): {} sensors changed",
                self.group.slug,
                self.group.station,
                changed
            ),
            Err(e) => tracing::warn!(
                "Refresh failed for group '{}', keeping last known values: {}",
                self.group.slug,
                e
            ),
        }
    }

    /// The refresh done in setup, which anchors every later wakeup
    async fn initial_refresh(&mut self) {
        self.last_wakeup = Instant::now();
        self.refresh_logged().await;
    }

    /// Poll until `shutdown` flips to true or its sender is dropped.
    ///
    /// Wakeups are anchored to the initial refresh, so slow refreshes do not
    /// push later ones back; a wakeup missed entirely is skipped.
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.group.interval;
        let Some(first) = self.last_wakeup.checked_add(period) else {
            tracing::error!(
                "Interval of group '{}' ({}s) is out of range, not polling",
                self.group.slug,
                period.as_secs()
            );
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            self.set_state(PollerState::Stopped);
            return;
        };
        let mut ticker = tokio::time::interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Polling group '{}' every {}s",
            self.group.slug,
            period.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            // Shutdown mid-fetch abandons it; nothing is published.
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.refresh_logged() => {}
            }
        }

        self.set_state(PollerState::Stopped);
        tracing::info!("Stopped polling group '{}'", self.group.slug);
    }
}

/// Owns every station poller and their tasks
pub struct ScheduledTaskManager {
    registry: Arc<SensorRegistry>,
    pollers: Vec<StationPoller>,
    statuses: Vec<watch::Receiver<PollerStatus>>,
    shutdown: watch::Sender<bool>,
    task_handles: Vec<JoinHandle<()>>,
}

impl ScheduledTaskManager {
    /// Build the sensors for `groups` and give each group its first refresh.
    ///
    /// Groups are refreshed one after another, so groups sharing a station
    /// and bucket reuse the first group's fetch.
    pub async fn setup(groups: Vec<StationGroup>, cache: Arc<FetchCache>, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(SensorRegistry::from_groups(&groups));
        tracing::info!(
            "Setting up {} station groups ({} sensors)",
            groups.len(),
            registry.len()
        );

        let mut pollers = Vec::with_capacity(groups.len());
        for group in groups {
            let mut poller = StationPoller::new(group, cache.clone(), registry.clone(), clock.clone());
            tracing::info!("Performing initial refresh for group '{}'...", poller.group.slug);
            poller.initial_refresh().await;
            pollers.push(poller);
        }

        let statuses = pollers.iter().map(StationPoller::status).collect();
        let (shutdown, _) = watch::channel(false);

        Self {
            registry,
            pollers,
            statuses,
            shutdown,
            task_handles: Vec::new(),
        }
    }

    pub fn registry(&self) -> Arc<SensorRegistry> {
        self.registry.clone()
    }

    /// Live status receivers, one per group
    pub fn status_board(&self) -> Vec<watch::Receiver<PollerStatus>> {
        self.statuses.clone()
    }

    pub fn statuses(&self) -> Vec<PollerStatus> {
        self.statuses.iter().map(|rx| rx.borrow().clone()).collect()
    }

    /// Spawn one polling task per group
    pub fn start_all(&mut self) {
        for poller in self.pollers.drain(..) {
            let shutdown = self.shutdown.subscribe();
            self.task_handles.push(tokio::spawn(poller.run(shutdown)));
        }
        tracing::info!("Started {} polling tasks", self.task_handles.len());
    }

    /// Signal every poller to stop and wait for them
    pub async fn shutdown(self) {
        tracing::info!("Shutting down scheduled task manager...");
        self.shutdown.send_replace(true);

        for handle in self.task_handles {
            if let Err(e) = handle.await {
                tracing::error!("Polling task ended abnormally: {}", e);
            }
        }

        tracing::info!("All scheduled tasks stopped");
    }
}
