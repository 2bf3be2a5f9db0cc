//! Network services driven by the connectivity core.
//!
//! - [`captive_dns`] - wildcard DNS responder for the access point (host and ESP32)
//! - [`mdns`] - hostname/service advertisement behind [`MdnsResponder`]
//! - [`status_server`] - HTTP diagnostics endpoint (host and ESP32)

pub mod captive_dns;
pub mod mdns;
pub mod status_server;

pub use captive_dns::CaptiveDns;
pub use mdns::HostMdns;
#[cfg(feature = "esp32")]
pub use mdns::EspMdnsResponder;
pub use status_server::{LinkStats, StatusServer, DEFAULT_STATUS_PORT};

use std::fmt;
use std::net::Ipv4Addr;

/// A DNS-SD service record announced alongside the hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service type, e.g. `_http`.
    pub service: &'static str,
    /// Transport, e.g. `_tcp`.
    pub proto: &'static str,
    pub port: u16,
}

impl ServiceRecord {
    /// The web UI record.
    pub fn http(port: u16) -> Self {
        Self {
            service: "_http",
            proto: "_tcp",
            port,
        }
    }
}

/// mDNS responder as seen by the supervisor.
///
/// The advertisement is only valid while the station holds an address; the
/// supervisor withdraws it on every other transition.
pub trait MdnsResponder {
    /// Start answering for `hostname`.local at `address` and announce `service`.
    fn advertise(
        &mut self,
        hostname: &str,
        address: Ipv4Addr,
        service: &ServiceRecord,
    ) -> Result<(), ServiceError>;

    /// Housekeeping step, called once per scheduling round.
    fn update(&mut self);

    /// Stop answering and drop all records.
    fn withdraw(&mut self);

    /// Whether an advertisement is currently active.
    fn is_advertising(&self) -> bool;
}

/// Errors from the auxiliary network services.
#[derive(Debug)]
pub enum ServiceError {
    /// Socket setup failed (e.g. no sockets left, port in use).
    Io(std::io::Error),
    /// The service refused the request.
    Rejected(String),
    /// ESP-IDF error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Rejected(reason) => write!(f, "rejected: {}", reason),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for ServiceError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
