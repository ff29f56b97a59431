//! Client for the Drayton Wiser heating hub.
//!
//! This crate provides read-only access to the hub's local REST API:
//!
//! - [`client`] - The [`HubClient`] trait and its HTTP implementation [`WiserHub`]
//! - [`types`] - Hub data model (`Room`, `RoomStat`, `SystemInfo`, `OutputState`)
//! - [`error`] - Error types
//!
//! Every request carries the hub secret in a `SECRET` header. The client
//! applies a per-request timeout and does not retry.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DEFAULT_TIMEOUT, HubClient, WiserHub};
pub use error::{HubError, Result};
pub use types::{HeatingChannel, HotWater, NetworkInfo, OutputState, Room, RoomStat, SystemInfo};
