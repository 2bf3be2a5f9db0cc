//! Access point mode with a captive portal.

use super::ConnectivityError;
use crate::config::NetConfig;
use crate::network::CaptiveDns;
use crate::wifi::{AccessPointConfig, WifiDriver};
use log::{info, warn};
use std::net::{Ipv4Addr, SocketAddrV4};

/// Brings up the device's own network and the DNS responder that points
/// every lookup at it.
pub struct AccessPointController {
    config: AccessPointConfig,
    dns: CaptiveDns,
    dns_bind: SocketAddrV4,
}

impl AccessPointController {
    /// Controller for the access point described by `config`.
    pub fn new(config: &NetConfig) -> Self {
        Self {
            config: config.access_point_config(),
            dns: CaptiveDns::new(config.dns_ttl_secs),
            dns_bind: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.dns_port),
        }
    }

    /// Override where the DNS responder binds (tests use an ephemeral port).
    pub fn with_dns_bind(mut self, bind: SocketAddrV4) -> Self {
        self.dns_bind = bind;
        self
    }

    /// Settings the access point is started with.
    pub fn config(&self) -> &AccessPointConfig {
        &self.config
    }

    /// Start the access point and, once it is up, the captive portal.
    ///
    /// Returns the access point address. A DNS failure only costs the
    /// captive redirect.
    pub fn enter<D: WifiDriver>(&mut self, driver: &mut D) -> Result<Ipv4Addr, ConnectivityError> {
        // switches the mode itself, with our SSID and limits already applied
        driver
            .start_access_point(&self.config)
            .map_err(ConnectivityError::RadioStartFailure)?;

        let address = self.config.address;
        if let Err(e) = self.dns.start(self.dns_bind, address) {
            warn!("captive portal unavailable: {}", e);
        }

        info!(
            "access point \"{}\" up, UI at http://{}",
            self.config.ssid, address
        );
        Ok(address)
    }

    /// Answer at most one pending DNS request.
    pub fn tick(&mut self) {
        if let Err(e) = self.dns.process_next_request() {
            warn!("captive DNS: {}", e);
        }
    }

    /// Stop the captive portal.
    pub fn stop(&mut self) {
        self.dns.stop();
    }

    /// Whether the DNS responder is bound.
    pub fn captive_portal_active(&self) -> bool {
        self.dns.is_running()
    }
}
