use serde::{Deserialize, Serialize};

/// A measurement exposed per station.
///
/// The upstream API reports temperature and humidity under the short tags
/// `temp` and `humi`; both spellings are accepted when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "pm25")]
    Pm25,
    #[serde(rename = "pm10")]
    Pm10,
    #[serde(rename = "temperature", alias = "temp")]
    Temperature,
    #[serde(rename = "humidity", alias = "humi")]
    Humidity,
    #[serde(rename = "last_update_time")]
    LastUpdateTime,
}

impl FieldKind {
    pub const ALL: [FieldKind; 5] = [
        FieldKind::Pm25,
        FieldKind::Pm10,
        FieldKind::Temperature,
        FieldKind::Humidity,
        FieldKind::LastUpdateTime,
    ];

    /// Fields requested when a station group does not list any.
    pub const DEFAULT_MEASUREMENTS: [FieldKind; 4] = [
        FieldKind::Pm25,
        FieldKind::Pm10,
        FieldKind::Temperature,
        FieldKind::Humidity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Pm25 => "pm25",
            FieldKind::Pm10 => "pm10",
            FieldKind::Temperature => "temperature",
            FieldKind::Humidity => "humidity",
            FieldKind::LastUpdateTime => "last_update_time",
        }
    }

    /// Tag name used in the upstream XML response
    pub fn upstream_tag(&self) -> &'static str {
        match self {
            FieldKind::Pm25 => "pm25",
            FieldKind::Pm10 => "pm10",
            FieldKind::Temperature => "temp",
            FieldKind::Humidity => "humi",
            FieldKind::LastUpdateTime => "last_update_time",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Pm25 => "PM2.5",
            FieldKind::Pm10 => "PM10",
            FieldKind::Temperature => "Temperature",
            FieldKind::Humidity => "Humidity",
            FieldKind::LastUpdateTime => "Last Update",
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            FieldKind::Pm25 | FieldKind::Pm10 => Some("µg/m³"),
            FieldKind::Temperature => Some("°C"),
            FieldKind::Humidity => Some("%"),
            FieldKind::LastUpdateTime => None,
        }
    }

    pub fn device_class(&self) -> DeviceClass {
        match self {
            FieldKind::Pm25 => DeviceClass::Pm25,
            FieldKind::Pm10 => DeviceClass::Pm10,
            FieldKind::Temperature => DeviceClass::Temperature,
            FieldKind::Humidity => DeviceClass::Humidity,
            FieldKind::LastUpdateTime => DeviceClass::Timestamp,
        }
    }

    /// Icon hint for the host UI (Material Design Icons names)
    pub fn icon(&self) -> &'static str {
        match self {
            FieldKind::Pm25 | FieldKind::Pm10 => "mdi:alien-outline",
            FieldKind::Temperature => "mdi:thermometer",
            FieldKind::Humidity => "mdi:water-percent",
            FieldKind::LastUpdateTime => "mdi:clock-outline",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pm25" | "pm2.5" => Ok(FieldKind::Pm25),
            "pm10" => Ok(FieldKind::Pm10),
            "temperature" | "temp" => Ok(FieldKind::Temperature),
            "humidity" | "humi" => Ok(FieldKind::Humidity),
            "last_update_time" => Ok(FieldKind::LastUpdateTime),
            _ => Err(format!("Unknown sensor field: {}", s)),
        }
    }
}

/// Category hint the host uses to pick formatting and graphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Pm25,
    Pm10,
    Temperature,
    Humidity,
    Timestamp,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Pm25 => "pm25",
            DeviceClass::Pm10 => "pm10",
            DeviceClass::Temperature => "temperature",
            DeviceClass::Humidity => "humidity",
            DeviceClass::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Vendor-assigned station number, e.g. "OT2CL1900053"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StationQuery {
    station_no: String,
}

impl StationQuery {
    pub fn new(station_no: impl Into<String>) -> Result<Self, String> {
        let station_no = station_no.into().trim().to_string();
        if station_no.is_empty() {
            return Err("station number must not be empty".to_string());
        }
        Ok(Self { station_no })
    }

    pub fn station_no(&self) -> &str {
        &self.station_no
    }
}

impl std::fmt::Display for StationQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.station_no)
    }
}

/// Value currently published for one sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    /// No successful fetch has been observed yet
    #[default]
    Unknown,
    Value(String),
}

impl SensorState {
    pub const PLACEHOLDER: &'static str = "unknown";

    pub fn as_str(&self) -> &str {
        match self {
            SensorState::Unknown => Self::PLACEHOLDER,
            SensorState::Value(v) => v,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            SensorState::Unknown => None,
            SensorState::Value(v) => Some(v),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, SensorState::Value(_))
    }
}

impl std::fmt::Display for SensorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
