//! Device and network configuration.
//!
//! # Components
//!
//! - [`wifi`] - station credentials (host-testable)
//! - [`options`] - the externally owned user/runtime option sets the status
//!   frame is built from
//!
//! The device role (master or slave) is chosen at compile time with the
//! `role-slave` feature and fixes the access point credentials and the mDNS
//! hostname for the lifetime of the process.

mod options;
mod wifi;

pub use options::{OutputResolution, RuntimeOptions, UserOptions};
pub use wifi::{ConfigError, WifiConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN};

use crate::wifi::AccessPointConfig;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Address of the device while it hosts its own network.
pub const AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Netmask of the access point network.
pub const AP_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Access point radio channel.
pub const AP_CHANNEL: u8 = 1;

/// Maximum number of stations allowed on the access point.
pub const AP_MAX_CLIENTS: u8 = 2;

/// Time a disconnected station waits before the next reconnect attempt.
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Port of the captive portal DNS responder.
pub const CAPTIVE_DNS_PORT: u16 = 53;

/// TTL of the captive portal A records, in seconds.
pub const CAPTIVE_DNS_TTL_SECS: u32 = 300;

/// Port of the web UI announced over mDNS.
pub const HTTP_PORT: u16 = 80;

/// Password shared by both role profiles.
const AP_PASSWORD: &str = "qqqqqqqq";

/// Which unit of a master/slave pair this firmware runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Primary controller (`gbscontrol`).
    Master,
    /// Secondary controller (`gbsslave`).
    Slave,
}

impl DeviceRole {
    /// Hostname used for DHCP and mDNS.
    pub fn hostname(self) -> &'static str {
        match self {
            Self::Master => "gbscontrol",
            Self::Slave => "gbsslave",
        }
    }

    /// Access point credentials of this role.
    pub fn ap_credentials(self) -> ApCredentials {
        ApCredentials {
            ssid: self.hostname(),
            password: AP_PASSWORD,
        }
    }
}

impl Default for DeviceRole {
    fn default() -> Self {
        #[cfg(feature = "role-slave")]
        return Self::Slave;
        #[cfg(not(feature = "role-slave"))]
        Self::Master
    }
}

/// SSID/password pair of the device's own access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApCredentials {
    pub ssid: &'static str,
    /// Empty for an open access point.
    pub password: &'static str,
}

/// Static connectivity configuration handed to the supervisor at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    pub role: DeviceRole,
    pub hostname: String,
    pub ap: ApCredentials,
    pub ap_address: Ipv4Addr,
    pub ap_netmask: Ipv4Addr,
    pub ap_channel: u8,
    pub ap_max_clients: u8,
    pub reconnect_timeout: Duration,
    pub dns_port: u16,
    pub dns_ttl_secs: u32,
    pub http_port: u16,
}

impl NetConfig {
    /// Configuration for the given role with the fixed network parameters.
    pub fn for_role(role: DeviceRole) -> Self {
        Self {
            role,
            hostname: role.hostname().to_string(),
            ap: role.ap_credentials(),
            ap_address: AP_ADDRESS,
            ap_netmask: AP_NETMASK,
            ap_channel: AP_CHANNEL,
            ap_max_clients: AP_MAX_CLIENTS,
            reconnect_timeout: RECONNECT_TIMEOUT,
            dns_port: CAPTIVE_DNS_PORT,
            dns_ttl_secs: CAPTIVE_DNS_TTL_SECS,
            http_port: HTTP_PORT,
        }
    }

    /// Radio parameters for access point mode.
    pub fn access_point_config(&self) -> AccessPointConfig {
        AccessPointConfig {
            ssid: self.ap.ssid.to_string(),
            password: self.ap.password.to_string(),
            channel: self.ap_channel,
            address: self.ap_address,
            gateway: self.ap_address,
            netmask: self.ap_netmask,
            max_clients: self.ap_max_clients,
            hidden: false,
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::for_role(DeviceRole::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_profiles() {
        assert_eq!(DeviceRole::Master.hostname(), "gbscontrol");
        assert_eq!(DeviceRole::Slave.ap_credentials().ssid, "gbsslave");
        assert_eq!(DeviceRole::Slave.ap_credentials().password, "qqqqqqqq");
    }

    #[test]
    fn test_default_role_follows_features() {
        #[cfg(not(feature = "role-slave"))]
        assert_eq!(DeviceRole::default(), DeviceRole::Master);
        #[cfg(feature = "role-slave")]
        assert_eq!(DeviceRole::default(), DeviceRole::Slave);
    }

    #[test]
    fn test_access_point_config() {
        let config = NetConfig::for_role(DeviceRole::Master);
        let ap = config.access_point_config();
        assert_eq!(ap.ssid, "gbscontrol");
        assert_eq!(ap.address, Ipv4Addr::new(192, 168, 4, 1));
        assert_eq!(ap.gateway, ap.address);
        assert_eq!(ap.netmask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(ap.channel, 1);
        assert_eq!(ap.max_clients, 2);
        assert!(!ap.hidden);
    }

    #[test]
    fn test_fixed_timings() {
        let config = NetConfig::default();
        assert_eq!(config.reconnect_timeout, Duration::from_millis(10_000));
        assert_eq!(config.dns_port, 53);
        assert_eq!(config.dns_ttl_secs, 300);
        assert_eq!(config.http_port, 80);
    }
}
