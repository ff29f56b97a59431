//! Collection cycle: poll the hub, derive values, commit them to the instruments.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use wiser_hub::{HubClient, HubError};

use crate::instruments::{CycleOutcome, InstrumentRegistry, SharedExposition};
use crate::snapshot::{GlobalState, HubIdentity, HubSnapshot, RoomReading};

/// Error aborting a collection cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Hub communication failed: {0}")]
    Hub(#[from] HubError),
}

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub rooms: usize,
    pub skipped_rooms: usize,
    pub elapsed: Duration,
}

/// One hub, its instruments, and the logic to refresh them.
pub struct CollectionCycle<C> {
    client: C,
    hub: HubIdentity,
    instruments: InstrumentRegistry,
}

impl<C: HubClient> CollectionCycle<C> {
    /// Create a cycle for a hub whose display name is already known.
    ///
    /// The name is reused for every cycle and is not refreshed.
    pub fn new(client: C, hub: HubIdentity, instruments: InstrumentRegistry) -> Self {
        Self {
            client,
            hub,
            instruments,
        }
    }

    /// Fetch the hub name once, then create the cycle.
    pub async fn connect(
        client: C,
        host: impl Into<String>,
        instruments: InstrumentRegistry,
    ) -> Result<Self, CycleError> {
        let host = host.into();
        let name = client.hub_name().await?;
        info!(hub_host = %host, hub_name = %name, "Connected to hub");

        Ok(Self::new(client, HubIdentity { host, name }, instruments))
    }

    pub fn hub(&self) -> &HubIdentity {
        &self.hub
    }

    pub fn instruments(&self) -> &InstrumentRegistry {
        &self.instruments
    }

    pub fn exposition(&self) -> SharedExposition {
        self.instruments.exposition()
    }

    /// Read everything the cycle needs from the hub. Touches no instrument.
    pub async fn gather(&self) -> Result<HubSnapshot, CycleError> {
        let system = self.client.system().await?;
        let heating = self.client.heating_relay_state().await?;
        let hot_water = self.client.hot_water_relay_state().await?;
        let rooms = self.client.rooms().await?;

        let mut readings = Vec::with_capacity(rooms.len());
        let mut skipped_rooms = 0;

        for room in &rooms {
            let mut reading = match RoomReading::from_room(room) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed room");
                    skipped_rooms += 1;
                    continue;
                }
            };

            if let Some(room_stat_id) = room.room_stat_id {
                reading.humidity_percent = match self.client.room_stat(room_stat_id).await {
                    Ok(stat) => stat.and_then(|stat| stat.measured_humidity),
                    // A bad sensor payload only costs this room its humidity
                    Err(e @ HubError::Decode { .. }) => {
                        warn!(
                            room_id = reading.room_id,
                            room_stat_id,
                            error = %e,
                            "Ignoring undecodable room stat"
                        );
                        None
                    }
                    Err(e) => return Err(e.into()),
                };
            }

            readings.push(reading);
        }

        Ok(HubSnapshot {
            hub: self.hub.clone(),
            system_time: system.unix_time,
            global: GlobalState {
                heating_output_on: heating.is_on(),
                hot_water_output_on: hot_water.is_on(),
            },
            rooms: readings,
            skipped_rooms,
        })
    }

    /// Run one full cycle. The duration is recorded whether or not it succeeds.
    pub async fn run_once(&mut self) -> Result<CycleSummary, CycleError> {
        let started = Instant::now();

        let result = self.gather().await.map(|snapshot| {
            log_snapshot(&snapshot);
            self.instruments.commit(&snapshot);
            (snapshot.rooms.len(), snapshot.skipped_rooms)
        });

        let elapsed = started.elapsed();
        let outcome = if result.is_ok() {
            CycleOutcome::Success
        } else {
            CycleOutcome::Error
        };
        self.instruments.record_cycle(elapsed, outcome);

        let (rooms, skipped_rooms) = result?;
        Ok(CycleSummary {
            rooms,
            skipped_rooms,
            elapsed,
        })
    }
}

fn log_snapshot(snapshot: &HubSnapshot) {
    let system_time = chrono::DateTime::from_timestamp(snapshot.system_time, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| snapshot.system_time.to_string());

    debug!(
        hub_host = %snapshot.hub.host,
        hub_name = %snapshot.hub.name,
        %system_time,
        "Hub"
    );
    debug!(
        heating = snapshot.global.heating_output_on,
        hot_water = snapshot.global.hot_water_output_on,
        "State"
    );

    for room in &snapshot.rooms {
        match room.humidity_percent {
            Some(humidity) => debug!(
                room_id = room.room_id,
                room_name = %room.room_name,
                calculated_temperature = room.calculated_temperature_c,
                set_point = room.set_point_c,
                output_on = room.output_on,
                humidity,
                "Room"
            ),
            None => debug!(
                room_id = room.room_id,
                room_name = %room.room_name,
                calculated_temperature = room.calculated_temperature_c,
                set_point = room.set_point_c,
                output_on = room.output_on,
                humidity = "No RoomStat",
                "Room"
            ),
        }
    }
}

/// Fetch the hub identity, retrying every `retry_delay` until it succeeds
/// or shutdown is signalled.
pub async fn resolve_hub_identity<C: HubClient>(
    client: &C,
    host: &str,
    retry_delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<HubIdentity> {
    loop {
        if *shutdown.borrow() {
            return None;
        }

        match client.hub_name().await {
            Ok(name) => {
                info!(hub_host = %host, hub_name = %name, "Connected to hub");
                return Some(HubIdentity {
                    host: host.to_string(),
                    name,
                });
            }
            Err(e) => {
                error!(hub_host = %host, error = %e, "Failed to fetch hub name");
            }
        }

        if !wait_or_shutdown(retry_delay, shutdown).await {
            return None;
        }
    }
}

/// Sleep for `delay`; false if shutdown was signalled meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

/// Runs collection cycles back to back with a fixed delay in between.
pub struct Poller<C> {
    cycle: CollectionCycle<C>,
    delay: Duration,
}

impl<C: HubClient> Poller<C> {
    pub fn new(cycle: CollectionCycle<C>, delay: Duration) -> Self {
        Self { cycle, delay }
    }

    /// Run the polling loop until the shutdown signal is received.
    ///
    /// A failed cycle is logged and the next one starts after the usual delay.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            hub_host = %self.cycle.hub().host,
            hub_name = %self.cycle.hub().name,
            delay_secs = self.delay.as_secs(),
            "Starting collection loop"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.cycle.run_once().await {
                Ok(summary) => {
                    debug!(
                        rooms = summary.rooms,
                        skipped_rooms = summary.skipped_rooms,
                        elapsed_ms = summary.elapsed.as_millis() as u64,
                        "Collection cycle complete"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Collection cycle failed");
                }
            }

            if !wait_or_shutdown(self.delay, &mut shutdown).await {
                break;
            }
        }

        info!("Collection loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::StateValue;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use wiser_hub::{OutputState, Room, RoomStat, SystemInfo};

    #[derive(Default)]
    struct FakeHub {
        rooms: Mutex<Vec<Room>>,
        stats: Mutex<HashMap<u32, RoomStat>>,
        fail_rooms: Mutex<bool>,
        stat_calls: Mutex<Vec<u32>>,
        undecodable_stats: Mutex<Vec<u32>>,
        unavailable_stats: Mutex<Vec<u32>>,
    }

    fn hub_failure() -> HubError {
        HubError::Status {
            path: "/data/domain/Room/".to_string(),
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    impl HubClient for FakeHub {
        async fn hub_name(&self) -> wiser_hub::Result<String> {
            Ok("WiserHeatTest".to_string())
        }

        async fn system(&self) -> wiser_hub::Result<SystemInfo> {
            Ok(SystemInfo {
                unix_time: 1_700_000_000,
                active_system_version: None,
                time_zone_offset: None,
            })
        }

        async fn heating_relay_state(&self) -> wiser_hub::Result<OutputState> {
            Ok(OutputState::On)
        }

        async fn hot_water_relay_state(&self) -> wiser_hub::Result<OutputState> {
            Ok(OutputState::Off)
        }

        async fn rooms(&self) -> wiser_hub::Result<Vec<Room>> {
            if *self.fail_rooms.lock() {
                return Err(hub_failure());
            }
            Ok(self.rooms.lock().clone())
        }

        async fn room_stat(&self, id: u32) -> wiser_hub::Result<Option<RoomStat>> {
            self.stat_calls.lock().push(id);
            let path = format!("/data/domain/RoomStat/{id}");
            if self.undecodable_stats.lock().contains(&id) {
                return Err(HubError::Decode {
                    path,
                    message: "invalid type: string \"wet\", expected f64".to_string(),
                });
            }
            if self.unavailable_stats.lock().contains(&id) {
                return Err(HubError::Status {
                    path,
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            Ok(self.stats.lock().get(&id).cloned())
        }
    }

    fn room(id: u32, name: &str, stat: Option<u32>) -> Room {
        Room {
            id: Some(id),
            name: Some(name.to_string()),
            room_stat_id: stat,
            control_output_state: Some(OutputState::On),
            current_set_point: Some(200),
            calculated_temperature: Some(215),
        }
    }

    fn cycle(hub: FakeHub) -> CollectionCycle<FakeHub> {
        CollectionCycle::new(
            hub,
            HubIdentity {
                host: "10.0.0.5".to_string(),
                name: "WiserHeatTest".to_string(),
            },
            InstrumentRegistry::new(),
        )
    }

    #[tokio::test]
    async fn test_connect_fetches_hub_name() {
        let cycle = CollectionCycle::connect(FakeHub::default(), "10.0.0.5", InstrumentRegistry::new())
            .await
            .unwrap();

        assert_eq!(cycle.hub().name, "WiserHeatTest");
        assert_eq!(cycle.hub().host, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_gather_builds_snapshot() {
        let hub = FakeHub::default();
        *hub.rooms.lock() = vec![room(1, " Kitchen ", None), room(2, "Bath", Some(40))];
        hub.stats.lock().insert(
            40,
            RoomStat {
                id: 40,
                measured_humidity: Some(61.0),
                measured_temperature: Some(215),
            },
        );

        let cycle = cycle(hub);
        let snapshot = cycle.gather().await.unwrap();

        assert!(snapshot.global.heating_output_on);
        assert!(!snapshot.global.hot_water_output_on);
        assert_eq!(snapshot.system_time, 1_700_000_000);
        assert_eq!(snapshot.rooms.len(), 2);
        assert_eq!(snapshot.rooms[0].room_name, "Kitchen");
        assert_eq!(snapshot.rooms[0].humidity_percent, None);
        assert_eq!(snapshot.rooms[1].humidity_percent, Some(61.0));

        // Only the room declaring a room stat triggers a lookup
        assert_eq!(*cycle.client.stat_calls.lock(), vec![40]);
        // Gathering alone creates no instruments
        assert_eq!(cycle.instruments().room_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_room_is_skipped() {
        let hub = FakeHub::default();
        let mut broken = room(3, "Hall", Some(50));
        broken.calculated_temperature = None;
        *hub.rooms.lock() = vec![room(1, "Kitchen", None), broken, room(2, "Bath", None)];

        let mut cycle = cycle(hub);
        let summary = cycle.run_once().await.unwrap();

        assert_eq!(summary.rooms, 2);
        assert_eq!(summary.skipped_rooms, 1);
        assert!(cycle.instruments().instrument_set(3).is_none());
        assert!(cycle.instruments().instrument_set(2).is_some());
        // No sensor lookup for the skipped room
        assert!(cycle.client.stat_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_room_stat_only_drops_humidity() {
        let hub = FakeHub::default();
        *hub.rooms.lock() = vec![room(7, "Lounge", None), room(3, "Bathroom", Some(30))];
        hub.undecodable_stats.lock().push(30);

        let mut cycle = cycle(hub);
        let summary = cycle.run_once().await.unwrap();

        assert_eq!(summary.rooms, 2);
        assert_eq!(summary.skipped_rooms, 0);
        assert_eq!(cycle.instruments().instrument_set(7).unwrap().temperature(), 21.5);

        let bathroom = cycle.instruments().instrument_set(3).unwrap();
        assert_eq!(bathroom.temperature(), 21.5);
        assert_eq!(bathroom.humidity(), None);
    }

    #[tokio::test]
    async fn test_room_stat_transport_failure_aborts_cycle() {
        let hub = FakeHub::default();
        *hub.rooms.lock() = vec![room(7, "Lounge", None), room(3, "Bathroom", Some(30))];
        hub.unavailable_stats.lock().push(30);

        let mut cycle = cycle(hub);
        let err = cycle.run_once().await.unwrap_err();

        assert!(matches!(err, CycleError::Hub(HubError::Status { .. })));
        assert_eq!(cycle.instruments().room_count(), 0);
        assert!(!cycle.exposition().is_ready());
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_values() {
        let hub = FakeHub::default();
        *hub.rooms.lock() = vec![room(1, "Kitchen", None)];

        let mut cycle = cycle(hub);
        cycle.run_once().await.unwrap();

        {
            let mut rooms = cycle.client.rooms.lock();
            rooms[0].calculated_temperature = Some(100);
            rooms[0].control_output_state = Some(OutputState::Off);
        }
        *cycle.client.fail_rooms.lock() = true;

        assert!(cycle.run_once().await.is_err());

        let set = cycle.instruments().instrument_set(1).unwrap();
        assert_eq!(set.temperature(), 21.5);
        assert_eq!(set.output_state(), StateValue::On);

        let output = cycle.exposition().encode().unwrap();
        assert!(output.contains("wiser_collection_cycles_total{outcome=\"error\"} 1"));
        assert!(output.contains("wiser_collection_cycles_total{outcome=\"success\"} 1"));
    }

    #[tokio::test]
    async fn test_resolve_hub_identity_stops_on_shutdown() {
        struct DownHub;

        impl HubClient for DownHub {
            async fn hub_name(&self) -> wiser_hub::Result<String> {
                Err(hub_failure())
            }
            async fn system(&self) -> wiser_hub::Result<SystemInfo> {
                Err(hub_failure())
            }
            async fn heating_relay_state(&self) -> wiser_hub::Result<OutputState> {
                Err(hub_failure())
            }
            async fn hot_water_relay_state(&self) -> wiser_hub::Result<OutputState> {
                Err(hub_failure())
            }
            async fn rooms(&self) -> wiser_hub::Result<Vec<Room>> {
                Err(hub_failure())
            }
            async fn room_stat(&self, _id: u32) -> wiser_hub::Result<Option<RoomStat>> {
                Err(hub_failure())
            }
        }

        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            resolve_hub_identity(&DownHub, "10.0.0.5", Duration::from_secs(60), &mut rx).await
        });

        tx.send(true).unwrap();
        let identity = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn test_poller_stops_on_shutdown() {
        let hub = FakeHub::default();
        *hub.rooms.lock() = vec![room(1, "Kitchen", None)];

        let cycle = cycle(hub);
        let exposition = cycle.exposition();
        let poller = Poller::new(cycle, Duration::from_secs(60));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(poller.run(rx));

        // First cycle runs immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while !exposition.is_ready() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
