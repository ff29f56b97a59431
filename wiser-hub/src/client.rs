//! HTTP client for the hub's local REST API.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::error::{HubError, Result};
use crate::types::{HeatingChannel, HotWater, NetworkInfo, OutputState, Room, RoomStat, SystemInfo};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const SECRET_HEADER: HeaderName = HeaderName::from_static("secret");

/// Read-only view of a Wiser hub.
///
/// The exporter only depends on this trait, so tests can drive collection
/// cycles against an in-memory hub.
pub trait HubClient: Send + Sync {
    /// The hub's mDNS host name, used as its display name.
    fn hub_name(&self) -> impl Future<Output = Result<String>> + Send;

    fn system(&self) -> impl Future<Output = Result<SystemInfo>> + Send;

    /// `On` when any heating channel relay is energised.
    fn heating_relay_state(&self) -> impl Future<Output = Result<OutputState>> + Send;

    /// State of the first hot water channel, `Off` if the system has none.
    fn hot_water_relay_state(&self) -> impl Future<Output = Result<OutputState>> + Send;

    fn rooms(&self) -> impl Future<Output = Result<Vec<Room>>> + Send;

    /// Sensor data for a room stat, `None` if the hub does not know the id.
    fn room_stat(&self, id: u32) -> impl Future<Output = Result<Option<RoomStat>>> + Send;
}

/// [`HubClient`] talking to a real hub over HTTP.
#[derive(Debug, Clone)]
pub struct WiserHub {
    client: reqwest::Client,
    host: String,
    base_url: String,
}

impl WiserHub {
    /// Create a client for the hub at `host` (address or `host:port`).
    pub fn new(host: impl Into<String>, secret: &str, timeout: Duration) -> Result<Self> {
        let host = host.into();
        let trimmed = host.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(HubError::InvalidHost(host));
        }

        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", trimmed.trim_end_matches('/'))
        };

        let mut secret_value =
            HeaderValue::from_str(secret.trim()).map_err(|_| HubError::InvalidSecret)?;
        secret_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, secret_value);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(HubError::Client)?;

        Ok(Self {
            client,
            host: trimmed.to_string(),
            base_url,
        })
    }

    /// The host this client was created for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// GET a JSON document; `Ok(None)` on 404.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        trace!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| HubError::Http {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(path, "Hub returned 404");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(HubError::Status {
                path: path.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| HubError::Http {
            path: path.to_string(),
            source,
        })?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| HubError::Decode {
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    /// Like [`fetch`](Self::fetch) but a 404 is an error.
    async fn fetch_required<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(path).await?.ok_or_else(|| HubError::Status {
            path: path.to_string(),
            status: StatusCode::NOT_FOUND,
        })
    }
}

impl HubClient for WiserHub {
    async fn hub_name(&self) -> Result<String> {
        let network: NetworkInfo = self.fetch_required("/data/network/").await?;
        Ok(network.station.mdns_hostname)
    }

    async fn system(&self) -> Result<SystemInfo> {
        self.fetch_required("/data/domain/System/").await
    }

    async fn heating_relay_state(&self) -> Result<OutputState> {
        let channels: Vec<HeatingChannel> =
            self.fetch_required("/data/domain/HeatingChannel/").await?;

        let on = channels
            .iter()
            .any(|c| c.heating_relay_state.is_some_and(OutputState::is_on));
        let state = OutputState::from(on);
        trace!(channels = channels.len(), %state, "Heating relay state");
        Ok(state)
    }

    async fn hot_water_relay_state(&self) -> Result<OutputState> {
        let hot_water: Vec<HotWater> = self.fetch_required("/data/domain/HotWater/").await?;

        let Some(first) = hot_water.first() else {
            debug!("Hub has no hot water channel, reporting Off");
            return Ok(OutputState::Off);
        };

        let state = first.water_heating_state.unwrap_or_default();
        trace!(id = first.id, %state, "Hot water relay state");
        Ok(state)
    }

    async fn rooms(&self) -> Result<Vec<Room>> {
        let entries: Vec<serde_json::Value> = self.fetch_required("/data/domain/Room/").await?;

        Ok(decode_rooms(entries))
    }

    async fn room_stat(&self, id: u32) -> Result<Option<RoomStat>> {
        self.fetch(&format!("/data/domain/RoomStat/{}", id)).await
    }
}

/// Decode room entries one by one, dropping entries whose fields have the wrong type.
fn decode_rooms(entries: Vec<serde_json::Value>) -> Vec<Room> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Room>(entry) {
            Ok(room) => Some(room),
            Err(e) => {
                warn!(index, error = %e, "Skipping undecodable room entry");
                None
            }
        })
        .collect()
}
