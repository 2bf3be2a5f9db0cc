//! Connectivity core of a GBS video scaler controller.
//!
//! Decides whether the device runs as a WiFi station, as its own access
//! point or mid-WPS, supervises reconnection, and pushes a compact binary
//! status frame to web UI clients. Everything except the ESP-IDF glue is
//! platform independent and tested on the host.

pub mod config;
pub mod connectivity;
pub mod network;
pub mod node;
pub mod platform;
pub mod status;
pub mod wifi;

pub use config::{NetConfig, RuntimeOptions, UserOptions, WifiConfig};
pub use connectivity::{ConnectionState, ConnectionSupervisor, ConnectivityError};
pub use network::{LinkStats, StatusServer};
pub use node::NetCore;
pub use status::{build_frame, StatusSnapshot, TickReport};
pub use wifi::{event_channel, NetEvent, RadioMode, SimDriver, WifiDriver};
