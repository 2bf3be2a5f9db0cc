//! Connection supervision.
//!
//! [`ConnectionSupervisor`] owns the [`ConnectionState`] and the reconnect
//! timer. It applies driver events, runs the periodic reconnect check and
//! dispatches the explicit mode transitions to [`AccessPointController`] and
//! [`WpsManager`].

mod access_point;
mod supervisor;
mod wps;

pub use access_point::AccessPointController;
pub use supervisor::{Clock, ConnectionSupervisor};
pub use wps::{NetworkIdentity, WpsManager, WPS_SETTLE_DELAY};

use crate::wifi::DriverError;
use std::fmt;

/// Connectivity state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link. A reconnect may be pending.
    #[default]
    Disconnected,
    /// Associated, waiting for an address.
    ConnectingStation,
    /// Associated with an address; mDNS is advertised.
    ConnectedStation,
    /// Hosting our own network.
    AccessPoint,
    /// Push-button handshake running.
    WpsInProgress,
}

impl ConnectionState {
    /// Kebab-case name used in logs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::ConnectingStation => "connecting-station",
            Self::ConnectedStation => "connected-station",
            Self::AccessPoint => "access-point",
            Self::WpsInProgress => "wps-in-progress",
        }
    }

    /// Compact form for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::ConnectingStation => 1,
            Self::ConnectedStation => 2,
            Self::AccessPoint => 3,
            Self::WpsInProgress => 4,
        }
    }

    /// Inverse of [`to_u8`](Self::to_u8).
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disconnected),
            1 => Some(Self::ConnectingStation),
            2 => Some(Self::ConnectedStation),
            3 => Some(Self::AccessPoint),
            4 => Some(Self::WpsInProgress),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by mode transitions.
#[derive(Debug)]
pub enum ConnectivityError {
    /// Access point or station mode failed to start.
    RadioStartFailure(DriverError),
    /// Push-button handshake produced no network.
    WpsHandshakeFailed,
    /// Station mode requested without explicit or stored credentials.
    NotConfigured,
    /// Other driver failure.
    Driver(DriverError),
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RadioStartFailure(e) => write!(f, "radio failed to start: {}", e),
            Self::WpsHandshakeFailed => write!(f, "WPS handshake failed"),
            Self::NotConfigured => write!(f, "no station credentials configured"),
            Self::Driver(e) => write!(f, "driver error: {}", e),
        }
    }
}

impl std::error::Error for ConnectivityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RadioStartFailure(e) | Self::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DriverError> for ConnectivityError {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_u8_round_trip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::ConnectingStation,
            ConnectionState::ConnectedStation,
            ConnectionState::AccessPoint,
            ConnectionState::WpsInProgress,
        ] {
            assert_eq!(ConnectionState::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(ConnectionState::from_u8(9), None);
    }

    #[test]
    fn test_error_display() {
        let err = ConnectivityError::RadioStartFailure(DriverError::Rejected("busy".into()));
        assert_eq!(err.to_string(), "radio failed to start: rejected by driver: busy");
        assert!(std::error::Error::source(&err).is_some());
        assert!(std::error::Error::source(&ConnectivityError::WpsHandshakeFailed).is_none());
    }
}
