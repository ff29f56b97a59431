//! Per-cycle view of the hub, derived from raw hub responses.

use thiserror::Error;
use wiser_hub::Room;

/// Raw hub temperatures are integers in tenths of a degree.
pub fn scale_tenths(raw: i32) -> f64 {
    f64::from(raw) / 10.0
}

/// Address and display name of the polled hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubIdentity {
    pub host: String,
    pub name: String,
}

/// Whole-system relay outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalState {
    pub heating_output_on: bool,
    pub hot_water_output_on: bool,
}

/// Derived values for one room in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomReading {
    pub room_id: u32,
    /// Trimmed display name.
    pub room_name: String,
    pub calculated_temperature_c: f64,
    pub set_point_c: f64,
    pub output_on: bool,
    /// Present only when the room has a room stat reporting humidity.
    pub humidity_percent: Option<f64>,
}

/// A room entry that cannot be turned into a [`RoomReading`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room entry has no id")]
    MissingId,
    #[error("room {room_id} is missing field {field}")]
    MissingField { room_id: u32, field: &'static str },
}

impl RoomReading {
    /// Validate a raw room and derive its values. Humidity is attached separately.
    pub fn from_room(room: &Room) -> Result<Self, RoomError> {
        let room_id = room.id.ok_or(RoomError::MissingId)?;
        let missing = |field| RoomError::MissingField { room_id, field };

        let room_name = room.name.as_deref().ok_or_else(|| missing("Name"))?;
        let calculated = room
            .calculated_temperature
            .ok_or_else(|| missing("CalculatedTemperature"))?;
        let set_point = room
            .current_set_point
            .ok_or_else(|| missing("CurrentSetPoint"))?;
        let output = room
            .control_output_state
            .ok_or_else(|| missing("ControlOutputState"))?;

        Ok(Self {
            room_id,
            room_name: room_name.trim().to_string(),
            calculated_temperature_c: scale_tenths(calculated),
            set_point_c: scale_tenths(set_point),
            output_on: output.is_on(),
            humidity_percent: None,
        })
    }
}

/// Everything one collection cycle read from the hub.
///
/// Built completely before any instrument is touched, so a failing hub call
/// never leaves a cycle half-applied.
#[derive(Debug, Clone, PartialEq)]
pub struct HubSnapshot {
    pub hub: HubIdentity,
    /// Hub clock, seconds since the Unix epoch.
    pub system_time: i64,
    pub global: GlobalState,
    pub rooms: Vec<RoomReading>,
    /// Room entries dropped because they were incomplete.
    pub skipped_rooms: usize,
}
