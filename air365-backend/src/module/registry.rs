///! Observer registry - last known value per configured (station, field)
///!
///! Built once from the validated station groups and never resized. Reads
///! are lock-free snapshots; only the scheduler writes.

use std::collections::HashMap;
use std::time::Duration;

use air365_common::{DeviceClass, FieldKind, SensorState, StationQuery};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::StationGroup;

/// One exposed sensor
#[derive(Debug)]
pub struct Observer {
    entity_id: String,
    group: String,
    name: String,
    station: StationQuery,
    field: FieldKind,
    interval: Duration,
    location: Option<String>,
    unique_id: Option<String>,
    state: watch::Sender<SensorState>,
}

impl Observer {
    fn new(group: &StationGroup, field: FieldKind) -> Self {
        let (state, _) = watch::channel(SensorState::Unknown);
        Self {
            entity_id: format!("{}_{}", group.slug, field),
            group: group.slug.clone(),
            name: format!("{} {}", group.name, field.label()),
            station: group.station.clone(),
            field,
            interval: group.interval,
            location: group.location.clone(),
            unique_id: group.unique_id.as_ref().map(|id| format!("{}_{}", id, field)),
            state,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn station(&self) -> &StationQuery {
        &self.station
    }

    pub fn field(&self) -> FieldKind {
        self.field
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn unit(&self) -> Option<&'static str> {
        self.field.unit()
    }

    pub fn device_class(&self) -> DeviceClass {
        self.field.device_class()
    }

    pub fn icon(&self) -> &'static str {
        self.field.icon()
    }

    pub fn state(&self) -> SensorState {
        self.state.borrow().clone()
    }

    /// Returns true when the published value changed.
    fn publish(&self, value: &str) -> bool {
        self.state.send_if_modified(|current| {
            if current.value() == Some(value) {
                return false;
            }
            *current = SensorState::Value(value.to_string());
            true
        })
    }

    pub fn snapshot(&self) -> ObserverSnapshot {
        let state = self.state();
        ObserverSnapshot {
            entity_id: self.entity_id.clone(),
            name: self.name.clone(),
            group: self.group().to_string(),
            station_no: self.station().station_no().to_string(),
            field: self.field,
            value: state.as_str().to_string(),
            available: state.is_known(),
            unit: self.unit(),
            device_class: self.device_class(),
            icon: self.icon(),
            interval_seconds: self.interval().as_secs(),
            location: self.location.clone(),
            unique_id: self.unique_id.clone(),
        }
    }
}

/// Serializable view handed to the host
#[derive(Debug, Clone, Serialize)]
pub struct ObserverSnapshot {
    pub entity_id: String,
    pub name: String,
    pub group: String,
    pub station_no: String,
    pub field: FieldKind,
    pub value: String,
    pub available: bool,
    pub unit: Option<&'static str>,
    pub device_class: DeviceClass,
    pub icon: &'static str,
    pub interval_seconds: u64,
    pub location: Option<String>,
    pub unique_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct SensorRegistry {
    observers: Vec<Observer>,
    by_entity: HashMap<String, usize>,
}

impl SensorRegistry {
    /// One observer per requested field of every group, in config order.
    pub fn from_groups(groups: &[StationGroup]) -> Self {
        let mut registry = Self::default();
        for group in groups {
            for &field in &group.fields {
                let observer = Observer::new(group, field);
                registry
                    .by_entity
                    .insert(observer.entity_id.clone(), registry.observers.len());
                registry.observers.push(observer);
            }
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn observers(&self) -> impl Iterator<Item = &Observer> {
        self.observers.iter()
    }

    pub fn get(&self, entity_id: &str) -> Option<&Observer> {
        self.by_entity.get(entity_id).map(|&i| &self.observers[i])
    }

    pub fn find(&self, station_no: &str, field: FieldKind) -> Option<&Observer> {
        self.observers
            .iter()
            .find(|o| o.station.station_no() == station_no && o.field == field)
    }

    /// Last known value, or the placeholder if none was observed or the pair
    /// is not configured.
    pub fn read(&self, station_no: &str, field: FieldKind) -> SensorState {
        self.find(station_no, field)
            .map(Observer::state)
            .unwrap_or_default()
    }

    /// Publish `value` to every observer of (station, field). Returns how
    /// many observers changed.
    pub fn write(&self, station_no: &str, field: FieldKind, value: &str) -> usize {
        self.observers
            .iter()
            .filter(|o| o.station.station_no() == station_no && o.field == field)
            .filter(|o| o.publish(value))
            .count()
    }

    /// Change notifications for one sensor
    pub fn subscribe(&self, entity_id: &str) -> Option<watch::Receiver<SensorState>> {
        self.get(entity_id).map(|o| o.state.subscribe())
    }

    pub fn snapshots(&self) -> Vec<ObserverSnapshot> {
        self.observers().map(Observer::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationGroupConfig;

    fn group(slug: &str, station_no: &str, fields: &[&str]) -> StationGroup {
        let config = StationGroupConfig {
            name: String::new(),
            station_no: station_no.to_string(),
            interval: 600,
            sensor_types: fields.iter().map(|f| f.to_string()).collect(),
            sensor_location: None,
            unique_id: Some(format!("{}-id", slug)),
        };
        config.validate(slug).unwrap()
    }

    #[test]
    fn test_observers_start_unknown() {
        let registry = SensorRegistry::from_groups(&[group("home", "S1", &["pm25", "temp"])]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.read("S1", FieldKind::Pm25), SensorState::Unknown);
        assert_eq!(registry.read("S9", FieldKind::Pm25), SensorState::Unknown);

        let temp = registry.get("home_temperature").unwrap();
        assert_eq!(temp.name(), "home Temperature");
        assert_eq!(temp.unit(), Some("°C"));
        assert_eq!(temp.icon(), "mdi:thermometer");
        let snapshot = temp.snapshot();
        assert_eq!(snapshot.unique_id.as_deref(), Some("home-id_temperature"));
        assert_eq!(snapshot.group, "home");
        assert_eq!(snapshot.station_no, "S1");
        assert_eq!(snapshot.interval_seconds, 600);
        assert!(registry.get("home_pm10").is_none());
    }

    #[test]
    fn test_write_updates_every_matching_observer() {
        let registry = SensorRegistry::from_groups(&[
            group("a", "S1", &["pm25"]),
            group("b", "S1", &["pm25", "pm10"]),
        ]);

        assert_eq!(registry.write("S1", FieldKind::Pm25, "12"), 2);
        assert_eq!(registry.get("a_pm25").unwrap().state(), SensorState::Value("12".into()));
        assert_eq!(registry.get("b_pm25").unwrap().state(), SensorState::Value("12".into()));
        assert_eq!(registry.read("S1", FieldKind::Pm10), SensorState::Unknown);

        // Same value again is not a change
        assert_eq!(registry.write("S1", FieldKind::Pm25, "12"), 0);
        assert_eq!(registry.write("S2", FieldKind::Pm25, "40"), 0);
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let registry = SensorRegistry::from_groups(&[group("home", "S1", &["humi"])]);
        let mut rx = registry.subscribe("home_humidity").unwrap();
        assert!(!rx.has_changed().unwrap());

        registry.write("S1", FieldKind::Humidity, "40");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_str(), "40");

        let snapshot = &registry.snapshots()[0];
        assert_eq!(snapshot.value, "40");
        assert!(snapshot.available);
        assert_eq!(snapshot.device_class, DeviceClass::Humidity);
    }
}
