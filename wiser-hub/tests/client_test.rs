//! Tests for [`WiserHub`] against a fake hub served on localhost.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;

use wiser_hub::{HubClient, HubError, OutputState, WiserHub};

const SECRET: &str = "test-secret";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("secret")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == SECRET)
}

fn json_or_unauthorized(headers: &HeaderMap, body: serde_json::Value) -> Response {
    if authorized(headers) {
        axum::Json(body).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

fn fake_hub() -> Router {
    Router::new()
        .route(
            "/data/network/",
            get(|headers: HeaderMap| async move {
                json_or_unauthorized(&headers, json!({"Station": {"MdnsHostname": "WiserHeat0A1B2C"}}))
            }),
        )
        .route(
            "/data/domain/System/",
            get(|headers: HeaderMap| async move {
                json_or_unauthorized(&headers, json!({"UnixTime": 1700000000}))
            }),
        )
        .route(
            "/data/domain/HeatingChannel/",
            get(|headers: HeaderMap| async move {
                json_or_unauthorized(
                    &headers,
                    json!([
                        {"id": 1, "Name": "Channel-1", "HeatingRelayState": "Off"},
                        {"id": 2, "Name": "Channel-2", "HeatingRelayState": "On"}
                    ]),
                )
            }),
        )
        .route(
            "/data/domain/HotWater/",
            get(|headers: HeaderMap| async move {
                json_or_unauthorized(&headers, json!([{"id": 2, "WaterHeatingState": "Off"}]))
            }),
        )
        .route(
            "/data/domain/Room/",
            get(|headers: HeaderMap| async move {
                json_or_unauthorized(
                    &headers,
                    json!([
                        {
                            "id": 7,
                            "Name": " Lounge ",
                            "ControlOutputState": "On",
                            "CurrentSetPoint": 200,
                            "CalculatedTemperature": 215
                        },
                        {
                            "id": 8,
                            "Name": "Bedroom",
                            "RoomStatId": 30,
                            "ControlOutputState": "Off",
                            "CurrentSetPoint": 160,
                            "CalculatedTemperature": 181
                        }
                    ]),
                )
            }),
        )
        .route(
            "/data/domain/RoomStat/:id",
            get(|Path(id): Path<u32>, headers: HeaderMap| async move {
                if id == 30 {
                    json_or_unauthorized(
                        &headers,
                        json!({"id": 30, "MeasuredHumidity": 57, "MeasuredTemperature": 181}),
                    )
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            }),
        )
}

async fn spawn_fake_hub() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, fake_hub()).await.unwrap();
    });

    addr
}

fn client(addr: SocketAddr, secret: &str) -> WiserHub {
    WiserHub::new(addr.to_string(), secret, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_hub_name_and_system() {
    let addr = spawn_fake_hub().await;
    let hub = client(addr, SECRET);

    assert_eq!(hub.hub_name().await.unwrap(), "WiserHeat0A1B2C");
    assert_eq!(hub.system().await.unwrap().unix_time, 1_700_000_000);
}

#[tokio::test]
async fn test_relay_states() {
    let addr = spawn_fake_hub().await;
    let hub = client(addr, SECRET);

    // One of two heating channels is on
    assert_eq!(hub.heating_relay_state().await.unwrap(), OutputState::On);
    assert_eq!(hub.hot_water_relay_state().await.unwrap(), OutputState::Off);
}

#[tokio::test]
async fn test_rooms_and_room_stats() {
    let addr = spawn_fake_hub().await;
    let hub = client(addr, SECRET);

    let rooms = hub.rooms().await.unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].name.as_deref(), Some(" Lounge "));
    assert_eq!(rooms[0].room_stat_id, None);
    assert_eq!(rooms[1].room_stat_id, Some(30));

    let stat = hub.room_stat(30).await.unwrap().unwrap();
    assert_eq!(stat.measured_humidity, Some(57.0));

    // Unknown room stat is not an error
    assert!(hub.room_stat(99).await.unwrap().is_none());
}

#[tokio::test]
async fn test_wrong_secret_is_status_error() {
    let addr = spawn_fake_hub().await;
    let hub = client(addr, "wrong");

    let err = hub.rooms().await.unwrap_err();
    match err {
        HubError::Status { path, status } => {
            assert_eq!(path, "/data/domain/Room/");
            assert_eq!(status.as_u16(), 401);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_hub() {
    // Bind and drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let hub = client(addr, SECRET);
    let err = hub.system().await.unwrap_err();
    assert!(err.is_unreachable(), "expected unreachable, got {err}");
}

#[tokio::test]
async fn test_missing_collection_endpoints_are_errors() {
    // Hub that only knows its identity
    let router = Router::new().route(
        "/data/network/",
        get(|| async { axum::Json(json!({"Station": {"MdnsHostname": "WiserHeat0A1B2C"}})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let hub = client(addr, SECRET);
    assert_eq!(hub.hub_name().await.unwrap(), "WiserHeat0A1B2C");

    let expect_not_found = |err: HubError, expected_path: &str| match err {
        HubError::Status { path, status } => {
            assert_eq!(path, expected_path);
            assert_eq!(status.as_u16(), 404);
        }
        other => panic!("unexpected error: {other}"),
    };

    expect_not_found(
        hub.rooms().await.unwrap_err(),
        "/data/domain/Room/",
    );
    expect_not_found(
        hub.heating_relay_state().await.unwrap_err(),
        "/data/domain/HeatingChannel/",
    );
    expect_not_found(
        hub.hot_water_relay_state().await.unwrap_err(),
        "/data/domain/HotWater/",
    );
}

#[tokio::test]
async fn test_empty_hot_water_list_is_off() {
    let router = Router::new().route(
        "/data/domain/HotWater/",
        get(|| async { axum::Json(json!([])) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let hub = client(addr, SECRET);
    assert_eq!(hub.hot_water_relay_state().await.unwrap(), OutputState::Off);
}
