//! mDNS responders.
//!
//! On ESP32 the ESP-IDF `mdns` component does the protocol work; on the host
//! the OS resolver owns `.local`, so [`HostMdns`] only tracks and logs what
//! would be advertised.

use super::{MdnsResponder, ServiceError, ServiceRecord};
use log::{debug, info};
use std::net::Ipv4Addr;

/// Host-side responder: records the advertisement without touching the network.
#[derive(Debug, Default)]
pub struct HostMdns {
    active: Option<(String, Ipv4Addr, ServiceRecord)>,
    advertisements: u32,
    updates: u32,
}

impl HostMdns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hostname and address currently advertised.
    pub fn advertised(&self) -> Option<(&str, Ipv4Addr)> {
        self.active
            .as_ref()
            .map(|(host, addr, _)| (host.as_str(), *addr))
    }

    /// Service record currently announced.
    pub fn service(&self) -> Option<ServiceRecord> {
        self.active.as_ref().map(|(_, _, service)| *service)
    }

    /// How many times an advertisement was started.
    pub fn advertisements(&self) -> u32 {
        self.advertisements
    }

    /// How many housekeeping steps ran while advertising.
    pub fn updates(&self) -> u32 {
        self.updates
    }
}

impl MdnsResponder for HostMdns {
    fn advertise(
        &mut self,
        hostname: &str,
        address: Ipv4Addr,
        service: &ServiceRecord,
    ) -> Result<(), ServiceError> {
        info!(
            "mDNS: {}.local -> {} ({}.{} port {})",
            hostname, address, service.service, service.proto, service.port
        );
        self.active = Some((hostname.to_string(), address, *service));
        self.advertisements += 1;
        Ok(())
    }

    fn update(&mut self) {
        if self.active.is_some() {
            self.updates += 1;
        }
    }

    fn withdraw(&mut self) {
        if let Some((hostname, _, _)) = self.active.take() {
            debug!("mDNS: withdrew {}.local", hostname);
        }
    }

    fn is_advertising(&self) -> bool {
        self.active.is_some()
    }
}

/// ESP-IDF mDNS responder.
///
/// The component runs its own task, so [`update`](MdnsResponder::update) has
/// nothing to do. Dropping the handle shuts the responder down.
#[cfg(feature = "esp32")]
#[derive(Default)]
pub struct EspMdnsResponder {
    mdns: Option<esp_idf_svc::mdns::EspMdns>,
}

#[cfg(feature = "esp32")]
impl EspMdnsResponder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "esp32")]
impl MdnsResponder for EspMdnsResponder {
    fn advertise(
        &mut self,
        hostname: &str,
        address: Ipv4Addr,
        service: &ServiceRecord,
    ) -> Result<(), ServiceError> {
        // Release any previous instance before taking the singleton again
        self.mdns = None;

        let mut mdns = esp_idf_svc::mdns::EspMdns::take()?;
        mdns.set_hostname(hostname)?;
        mdns.set_instance_name(hostname)?;
        mdns.add_service(None, service.service, service.proto, service.port, &[])?;
        info!(
            "mDNS: {}.local -> {} ({}.{} port {})",
            hostname, address, service.service, service.proto, service.port
        );
        self.mdns = Some(mdns);
        Ok(())
    }

    fn update(&mut self) {}

    fn withdraw(&mut self) {
        if self.mdns.take().is_some() {
            debug!("mDNS: responder stopped");
        }
    }

    fn is_advertising(&self) -> bool {
        self.mdns.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_mdns_lifecycle() {
        let mut mdns = HostMdns::new();
        assert!(!mdns.is_advertising());

        let ip = Ipv4Addr::new(192, 168, 1, 50);
        mdns.advertise("gbscontrol", ip, &ServiceRecord::http(80))
            .unwrap();
        assert_eq!(mdns.advertised(), Some(("gbscontrol", ip)));
        assert_eq!(mdns.service(), Some(ServiceRecord::http(80)));

        mdns.update();
        mdns.withdraw();
        mdns.update();
        assert!(!mdns.is_advertising());
        assert_eq!(mdns.advertisements(), 1);
        assert_eq!(mdns.updates(), 1);
    }

    #[test]
    fn test_http_record() {
        let record = ServiceRecord::http(80);
        assert_eq!(record.service, "_http");
        assert_eq!(record.proto, "_tcp");
        assert_eq!(record.port, 80);
    }
}
