pub mod types;

pub use types::{DeviceClass, FieldKind, SensorState, StationQuery};
