//! WiFi driver boundary.
//!
//! The connectivity core talks to the radio through [`WifiDriver`]. Mode
//! switches and connection requests are synchronous calls; what the radio
//! does afterwards is reported asynchronously as [`RawDriverEvent`]s through
//! the bounded channel in [`events`].
//!
//! # Components
//!
//! - [`events`] - raw driver notifications and their translation
//! - [`sim`] - simulated driver for host runs and tests
//! - `esp` - ESP-IDF driver (ESP32 only)
//! - `storage` - NVS persistence for station credentials (ESP32 only)

pub mod events;
pub mod sim;

#[cfg(feature = "esp32")]
mod esp;
#[cfg(feature = "esp32")]
mod storage;

pub use events::{event_channel, EventReceiver, EventSender, NetEvent, PeerMac, RawDriverEvent};
pub use sim::{DriverCall, SimDriver};

#[cfg(feature = "esp32")]
pub use esp::EspWifiDriver;
#[cfg(feature = "esp32")]
pub use storage::{init_nvs, load_wifi_config, save_wifi_config};

use crate::config::WifiConfig;
use std::fmt;
use std::net::Ipv4Addr;

/// Operating mode of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Off,
    Station,
    AccessPoint,
    /// Station and access point at once (driver-native).
    Mixed,
}

impl RadioMode {
    /// Whether a station interface exists in this mode.
    pub fn has_station(self) -> bool {
        matches!(self, Self::Station | Self::Mixed)
    }

    /// Whether the radio hosts an access point in this mode.
    pub fn has_access_point(self) -> bool {
        matches!(self, Self::AccessPoint | Self::Mixed)
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Station => "station",
            Self::AccessPoint => "access point",
            Self::Mixed => "station+access point",
        };
        f.write_str(name)
    }
}

/// Radio parameters applied once at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioSettings {
    pub hostname: String,
    /// Maximum transmit power in dBm.
    pub tx_power_dbm: f32,
    /// Modem power saving. Kept off so UI latency stays low.
    pub power_save: bool,
    /// Driver-level auto reconnect. Kept off: the supervisor owns reconnection.
    pub auto_reconnect: bool,
}

impl RadioSettings {
    /// Settings used by the appliance.
    pub fn for_hostname(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            tx_power_dbm: 16.0,
            power_save: false,
            auto_reconnect: false,
        }
    }
}

/// Radio parameters of the device's own access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String,
    /// Empty for an open access point.
    pub password: String,
    pub channel: u8,
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub max_clients: u8,
    pub hidden: bool,
}

/// Radio operations the connectivity core needs.
///
/// Every method except [`begin_wps`](Self::begin_wps) must return promptly;
/// results of connection attempts arrive later as driver events.
pub trait WifiDriver {
    /// Apply hostname, TX power and power-save settings.
    fn apply_settings(&mut self, settings: &RadioSettings) -> Result<(), DriverError>;

    /// Switch the radio mode. Emits a mode-changed event when the mode differs.
    ///
    /// Modes with an access point are refused until
    /// [`start_access_point`](Self::start_access_point) has configured one.
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), DriverError>;

    /// Start joining a network. `None` uses the credentials the driver has
    /// stored from the last successful configuration.
    fn begin_station(&mut self, credentials: Option<&WifiConfig>) -> Result<(), DriverError>;

    /// Retry the last used network.
    fn reconnect(&mut self) -> Result<(), DriverError>;

    /// Leave the current network.
    fn disconnect(&mut self) -> Result<(), DriverError>;

    /// Configure the access point and switch the radio to AP mode with it.
    ///
    /// The radio never transmits before the SSID, password, client limit and
    /// address are in place.
    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError>;

    /// Run one push-button WPS handshake.
    ///
    /// Blocks for at most the driver's handshake window. Returns the SSID of
    /// the negotiated network, or `None` if nothing was negotiated.
    fn begin_wps(&mut self) -> Result<Option<String>, DriverError>;

    /// SSID of the last used network, if any.
    fn stored_ssid(&self) -> Option<String>;

    /// Signal strength of the current link in dBm.
    fn rssi(&self) -> Option<i8>;

    /// Turn the radio off.
    fn power_off(&mut self) -> Result<(), DriverError>;
}

/// Errors reported by a [`WifiDriver`].
#[derive(Debug)]
pub enum DriverError {
    /// SSID could not be handed to the driver.
    InvalidSsid,
    /// Password could not be handed to the driver.
    InvalidPassword,
    /// The driver refused the request.
    Rejected(String),
    /// ESP-IDF error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "invalid SSID"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::Rejected(reason) => write!(f, "rejected by driver: {}", reason),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for DriverError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for DriverError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_modes() {
        assert!(RadioMode::Station.has_station());
        assert!(RadioMode::Mixed.has_station());
        assert!(!RadioMode::AccessPoint.has_station());
        assert!(!RadioMode::Off.has_station());
        assert!(RadioMode::AccessPoint.has_access_point());
        assert!(RadioMode::Mixed.has_access_point());
        assert!(!RadioMode::Station.has_access_point());
    }

    #[test]
    fn test_appliance_radio_settings() {
        let settings = RadioSettings::for_hostname("gbscontrol");
        assert_eq!(settings.hostname, "gbscontrol");
        assert_eq!(settings.tx_power_dbm, 16.0);
        assert!(!settings.power_save);
        assert!(!settings.auto_reconnect);
    }
}
