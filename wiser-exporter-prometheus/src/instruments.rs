//! Prometheus instruments for hub and room state.
//!
//! Every metric family is registered exactly once, when the
//! [`InstrumentRegistry`] is created. Per-room instruments are children of
//! those families, created on first sight of a room id and cached for the
//! lifetime of the process, so the same family is never registered twice.
//!
//! # Metrics
//!
//! ```text
//! wiser_heating_output_state{hub_host,hub_name,state}
//! wiser_hotwater_output_state{hub_host,hub_name,state}
//! wiser_room_output_state{hub_host,hub_name,room_id,room_name,state}
//! wiser_room_temperature_celsius{hub_host,hub_name,room_id,room_name}
//! wiser_room_setpoint_celsius{hub_host,hub_name,room_id,room_name}
//! wiser_room_humidity_percent{hub_host,hub_name,room_id,room_name}
//! wiser_collection_cycle_duration_seconds (histogram)
//! wiser_collection_cycles_total{outcome}
//! ```
//!
//! Output states are state sets: one series per state, the active one at 1.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tracing::debug;

use crate::snapshot::{GlobalState, HubSnapshot, RoomReading};

/// Floating point gauge.
pub type FloatGauge = Gauge<f64, AtomicU64>;

/// Value of the `state` label of output state series.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum StateValue {
    Off,
    On,
}

/// Labels for whole-hub output states.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HubStateLabels {
    pub hub_host: String,
    pub hub_name: String,
    pub state: StateValue,
}

/// Labels bound to every per-room instrument.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RoomLabels {
    pub hub_host: String,
    pub hub_name: String,
    pub room_id: String,
    pub room_name: String,
}

/// Labels for per-room output states.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RoomStateLabels {
    pub hub_host: String,
    pub hub_name: String,
    pub room_id: String,
    pub room_name: String,
    pub state: StateValue,
}

/// Labels for the cycle outcome counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

/// Result of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    Error,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Error => "error",
        }
    }
}

/// Cycle duration buckets in seconds (50ms to ~25s).
fn cycle_duration_buckets() -> impl Iterator<Item = f64> {
    exponential_buckets(0.05, 2.0, 10)
}

/// A two-valued Off/On instrument.
#[derive(Clone, Debug)]
pub struct StateInstrument {
    off: Gauge,
    on: Gauge,
}

impl StateInstrument {
    fn new(off: Gauge, on: Gauge) -> Self {
        Self { off, on }
    }

    pub fn set(&self, on: bool) {
        self.on.set(i64::from(on));
        self.off.set(i64::from(!on));
    }

    /// Currently exposed state.
    pub fn state(&self) -> StateValue {
        if self.on.get() == 1 {
            StateValue::On
        } else {
            StateValue::Off
        }
    }
}

/// Heating and hot water output instruments, bound to the hub labels.
#[derive(Clone, Debug)]
pub struct GlobalInstruments {
    hub_host: String,
    hub_name: String,
    pub heating: StateInstrument,
    pub hot_water: StateInstrument,
}

/// Instruments of one room, bound at creation to the room's labels.
///
/// Labels are never rewritten: if the hub renames a room, values keep
/// flowing into the series created under the old name.
#[derive(Clone, Debug)]
pub struct InstrumentSet {
    labels: RoomLabels,
    temperature: FloatGauge,
    set_point: FloatGauge,
    output_state: StateInstrument,
    humidity: Option<FloatGauge>,
}

impl InstrumentSet {
    fn new(families: &Families, labels: RoomLabels) -> Self {
        let state = |state| {
            families
                .room_output
                .get_or_create(&RoomStateLabels {
                    hub_host: labels.hub_host.clone(),
                    hub_name: labels.hub_name.clone(),
                    room_id: labels.room_id.clone(),
                    room_name: labels.room_name.clone(),
                    state,
                })
                .clone()
        };
        let output_state = StateInstrument::new(state(StateValue::Off), state(StateValue::On));

        Self {
            temperature: families.room_temperature.get_or_create(&labels).clone(),
            set_point: families.room_set_point.get_or_create(&labels).clone(),
            output_state,
            humidity: None,
            labels,
        }
    }

    fn humidity_or_create(&mut self, family: &Family<RoomLabels, FloatGauge>) -> &FloatGauge {
        let labels = &self.labels;
        self.humidity
            .get_or_insert_with(|| family.get_or_create(labels).clone())
    }

    pub fn labels(&self) -> &RoomLabels {
        &self.labels
    }

    pub fn temperature(&self) -> f64 {
        self.temperature.get()
    }

    pub fn set_point(&self) -> f64 {
        self.set_point.get()
    }

    pub fn output_state(&self) -> StateValue {
        self.output_state.state()
    }

    /// `None` until the room has been seen with humidity data.
    pub fn humidity(&self) -> Option<f64> {
        self.humidity.as_ref().map(|g| g.get())
    }
}

/// Handles to the registered families.
#[derive(Clone, Debug, Default)]
struct Families {
    heating_output: Family<HubStateLabels, Gauge>,
    hot_water_output: Family<HubStateLabels, Gauge>,
    room_output: Family<RoomStateLabels, Gauge>,
    room_temperature: Family<RoomLabels, FloatGauge>,
    room_set_point: Family<RoomLabels, FloatGauge>,
    room_humidity: Family<RoomLabels, FloatGauge>,
    cycles: Family<OutcomeLabels, Counter>,
}

impl Families {
    fn register(&self, registry: &mut Registry) {
        registry.register(
            "wiser_heating_output_state",
            "Heating Output State",
            self.heating_output.clone(),
        );
        registry.register(
            "wiser_hotwater_output_state",
            "Hot Water Output State",
            self.hot_water_output.clone(),
        );
        registry.register(
            "wiser_room_output_state",
            "Room Output State",
            self.room_output.clone(),
        );
        registry.register(
            "wiser_room_temperature_celsius",
            "Room Temperature Celsius",
            self.room_temperature.clone(),
        );
        registry.register(
            "wiser_room_setpoint_celsius",
            "Room Set Point Celsius",
            self.room_set_point.clone(),
        );
        registry.register(
            "wiser_room_humidity_percent",
            "Room Humidity Percent",
            self.room_humidity.clone(),
        );
        registry.register(
            "wiser_collection_cycles",
            "Collection cycles by outcome",
            self.cycles.clone(),
        );
    }
}

/// The encoded side of the instruments, shared with the HTTP server.
#[derive(Debug)]
pub struct MetricsExposition {
    registry: Registry,
    /// Held for writing while a cycle is committed, for reading while encoding.
    commit_guard: RwLock<()>,
    committed: AtomicBool,
}

impl MetricsExposition {
    /// Render all metrics in OpenMetrics text format.
    ///
    /// Never observes a partially committed cycle.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let _guard = self.commit_guard.read();
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    /// True once at least one cycle has been committed.
    pub fn is_ready(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }
}

/// Shareable exposition handle.
pub type SharedExposition = Arc<MetricsExposition>;

/// Owns the room id to [`InstrumentSet`] mapping and the single write path
/// for cycle results.
#[derive(Debug)]
pub struct InstrumentRegistry {
    families: Families,
    cycle_duration: Histogram,
    exposition: SharedExposition,
    global: Option<GlobalInstruments>,
    rooms: HashMap<u32, InstrumentSet>,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentRegistry {
    /// Create the registry and register every metric family.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let families = Families::default();
        families.register(&mut registry);

        let cycle_duration = Histogram::new(cycle_duration_buckets());
        registry.register(
            "wiser_collection_cycle_duration_seconds",
            "Time spent processing one collection cycle",
            cycle_duration.clone(),
        );

        Self {
            families,
            cycle_duration,
            exposition: Arc::new(MetricsExposition {
                registry,
                commit_guard: RwLock::new(()),
                committed: AtomicBool::new(false),
            }),
            global: None,
            rooms: HashMap::new(),
        }
    }

    /// Handle for rendering the metrics.
    pub fn exposition(&self) -> SharedExposition {
        self.exposition.clone()
    }

    /// Instruments for `room_id`, created and bound to the given labels on
    /// first call. Later calls return the same set whatever labels they pass.
    pub fn get_or_create(
        &mut self,
        room_id: u32,
        room_name: &str,
        hub_host: &str,
        hub_name: &str,
    ) -> &mut InstrumentSet {
        resolve_room(
            &self.families,
            &mut self.rooms,
            room_id,
            room_name,
            hub_host,
            hub_name,
        )
    }

    /// Write one room's values.
    pub fn apply_room_reading(&mut self, reading: &RoomReading, hub_host: &str, hub_name: &str) {
        let set = resolve_room(
            &self.families,
            &mut self.rooms,
            reading.room_id,
            &reading.room_name,
            hub_host,
            hub_name,
        );

        if set.labels.room_name != reading.room_name {
            debug!(
                room_id = reading.room_id,
                bound_name = %set.labels.room_name,
                current_name = %reading.room_name,
                "Room renamed on hub, keeping first-seen labels"
            );
        }

        set.temperature.set(reading.calculated_temperature_c);
        set.set_point.set(reading.set_point_c);
        set.output_state.set(reading.output_on);

        if let Some(humidity) = reading.humidity_percent {
            set.humidity_or_create(&self.families.room_humidity)
                .set(humidity);
        }
    }

    /// Write the heating and hot water output states.
    pub fn apply_global_state(&mut self, state: &GlobalState, hub_host: &str, hub_name: &str) {
        let families = &self.families;
        let global = self.global.get_or_insert_with(|| {
            let instrument = |family: &Family<HubStateLabels, Gauge>| {
                let series = |state| {
                    family
                        .get_or_create(&HubStateLabels {
                            hub_host: hub_host.to_string(),
                            hub_name: hub_name.to_string(),
                            state,
                        })
                        .clone()
                };
                StateInstrument::new(series(StateValue::Off), series(StateValue::On))
            };

            GlobalInstruments {
                hub_host: hub_host.to_string(),
                hub_name: hub_name.to_string(),
                heating: instrument(&families.heating_output),
                hot_water: instrument(&families.hot_water_output),
            }
        });

        if global.hub_host != hub_host || global.hub_name != hub_name {
            debug!(
                bound_host = %global.hub_host,
                bound_name = %global.hub_name,
                "Hub identity changed, keeping first-seen labels"
            );
        }

        global.heating.set(state.heating_output_on);
        global.hot_water.set(state.hot_water_output_on);
    }

    /// Apply a whole snapshot as one unit with respect to scrapes.
    pub fn commit(&mut self, snapshot: &HubSnapshot) {
        let exposition = self.exposition.clone();
        let _guard = exposition.commit_guard.write();

        let host = snapshot.hub.host.as_str();
        let name = snapshot.hub.name.as_str();

        self.apply_global_state(&snapshot.global, host, name);
        for reading in &snapshot.rooms {
            self.apply_room_reading(reading, host, name);
        }

        exposition.committed.store(true, Ordering::Release);
    }

    /// Record a finished cycle, successful or not.
    pub fn record_cycle(&self, elapsed: Duration, outcome: CycleOutcome) {
        self.cycle_duration.observe(elapsed.as_secs_f64());
        self.families
            .cycles
            .get_or_create(&OutcomeLabels {
                outcome: outcome.as_str().to_string(),
            })
            .inc();
    }

    /// Number of rooms with instruments.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn instrument_set(&self, room_id: u32) -> Option<&InstrumentSet> {
        self.rooms.get(&room_id)
    }

    pub fn global_instruments(&self) -> Option<&GlobalInstruments> {
        self.global.as_ref()
    }
}

fn resolve_room<'a>(
    families: &Families,
    rooms: &'a mut HashMap<u32, InstrumentSet>,
    room_id: u32,
    room_name: &str,
    hub_host: &str,
    hub_name: &str,
) -> &'a mut InstrumentSet {
    rooms.entry(room_id).or_insert_with(|| {
        debug!(room_id, room_name, "Creating instruments for room");
        InstrumentSet::new(
            families,
            RoomLabels {
                hub_host: hub_host.to_string(),
                hub_name: hub_name.to_string(),
                room_id: room_id.to_string(),
                room_name: room_name.to_string(),
            },
        )
    })
}
