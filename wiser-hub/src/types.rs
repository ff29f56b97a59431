//! Data model for the subset of the hub's REST API the exporter reads.
//!
//! Field names mirror the hub's PascalCase JSON. Everything a single room
//! needs is optional so that one incomplete room entry can be skipped
//! without discarding the rest of the room list.

use serde::{Deserialize, Deserializer, Serialize};

/// On/off state of a relay or room heating output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum OutputState {
    #[default]
    Off,
    On,
}

impl OutputState {
    pub fn is_on(self) -> bool {
        self == OutputState::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputState::Off => "Off",
            OutputState::On => "On",
        }
    }
}

impl From<bool> for OutputState {
    fn from(on: bool) -> Self {
        if on { OutputState::On } else { OutputState::Off }
    }
}

impl std::fmt::Display for OutputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firmware reports `"On"`/`"Off"`; booleans and `0`/`1` are accepted as well.
impl<'de> Deserialize<'de> for OutputState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(on) => Ok(on.into()),
            Raw::Number(0) => Ok(OutputState::Off),
            Raw::Number(1) => Ok(OutputState::On),
            Raw::Number(n) => Err(serde::de::Error::custom(format!(
                "invalid output state {n}, expected 0 or 1"
            ))),
            Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => Ok(OutputState::On),
                "off" | "false" | "0" => Ok(OutputState::Off),
                _ => Err(serde::de::Error::custom(format!(
                    "invalid output state '{s}', expected \"On\" or \"Off\""
                ))),
            },
        }
    }
}

/// `/data/network/`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInfo {
    pub station: Station,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Station {
    pub mdns_hostname: String,
}

/// `/data/domain/System/`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    /// Hub clock, seconds since the Unix epoch.
    pub unix_time: i64,

    #[serde(default)]
    pub active_system_version: Option<String>,

    #[serde(default)]
    pub time_zone_offset: Option<i32>,
}

/// Entry of `/data/domain/HeatingChannel/`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeatingChannel {
    #[serde(rename = "id")]
    pub id: u32,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub heating_relay_state: Option<OutputState>,
}

/// Entry of `/data/domain/HotWater/`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HotWater {
    #[serde(rename = "id")]
    pub id: u32,

    #[serde(default)]
    pub water_heating_state: Option<OutputState>,
}

/// Entry of `/data/domain/Room/`.
///
/// Temperatures are in tenths of a degree Celsius.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Room {
    #[serde(rename = "id", default)]
    pub id: Option<u32>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub room_stat_id: Option<u32>,

    #[serde(default)]
    pub control_output_state: Option<OutputState>,

    #[serde(default)]
    pub current_set_point: Option<i32>,

    #[serde(default)]
    pub calculated_temperature: Option<i32>,
}

/// `/data/domain/RoomStat/{id}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoomStat {
    /// Some firmware omits the id from single-entity responses.
    #[serde(rename = "id", default)]
    pub id: u32,

    #[serde(default)]
    pub measured_humidity: Option<f64>,

    /// Tenths of a degree Celsius.
    #[serde(default)]
    pub measured_temperature: Option<i32>,
}
