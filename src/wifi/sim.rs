//! Simulated WiFi driver.
//!
//! Behaves like the real driver at the boundary the core sees: mode switches
//! emit mode-changed events, association results arrive as events through the
//! same queue. Used by `host-node` and by the unit tests.

use super::events::{EventSender, RawDriverEvent};
use super::{AccessPointConfig, DriverError, RadioMode, RadioSettings, WifiDriver};
use crate::config::WifiConfig;
use std::net::Ipv4Addr;

/// Disconnect reason reported when the station leaves on request.
const REASON_ASSOC_LEAVE: u16 = 8;

/// A driver call, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    ApplySettings(String),
    SetMode(RadioMode),
    /// SSID of explicit credentials, `None` for stored credentials.
    BeginStation(Option<String>),
    Reconnect,
    Disconnect,
    StartAccessPoint(String),
    BeginWps,
    PowerOff,
}

/// Simulated radio.
#[derive(Debug)]
pub struct SimDriver {
    events: EventSender,
    mode: RadioMode,
    stored: Option<WifiConfig>,
    /// Address handed out when a join succeeds. `None`: joins never complete.
    lease: Option<Ipv4Addr>,
    associated: bool,
    ap_fails: bool,
    /// SSID of the configured access point.
    access_point: Option<String>,
    wps_network: Option<WifiConfig>,
    rssi: i8,
    calls: Vec<DriverCall>,
}

impl SimDriver {
    /// Create a radio with no stored network whose joins never complete.
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            mode: RadioMode::Off,
            stored: None,
            lease: None,
            associated: false,
            ap_fails: false,
            access_point: None,
            wps_network: None,
            rssi: -55,
            calls: Vec::new(),
        }
    }

    /// Pretend a network was stored by a previous run.
    pub fn with_stored_network(mut self, credentials: WifiConfig) -> Self {
        self.stored = Some(credentials);
        self
    }

    /// Let joins to the stored network succeed and lease `address`.
    pub fn with_lease(mut self, address: Ipv4Addr) -> Self {
        self.lease = Some(address);
        self
    }

    /// Make the access point refuse to start.
    pub fn with_failing_access_point(mut self) -> Self {
        self.ap_fails = true;
        self
    }

    /// Network a WPS handshake negotiates. Without one, WPS times out.
    pub fn with_wps_network(mut self, credentials: WifiConfig) -> Self {
        self.wps_network = Some(credentials);
        self
    }

    /// Current radio mode.
    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Calls made so far.
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// Number of recorded calls matching `call`.
    pub fn count(&self, call: &DriverCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    /// Drop the stored network, as if flash had been erased.
    pub fn forget_network(&mut self) {
        self.stored = None;
    }

    /// Simulate the access point going away under a connected station.
    pub fn drop_link(&mut self) {
        if self.associated {
            self.associated = false;
            self.events.post(RawDriverEvent::StaDisconnected { reason: None });
        }
    }

    fn switch_mode(&mut self, mode: RadioMode) {
        if mode == self.mode {
            return;
        }
        if self.associated && !mode.has_station() {
            self.associated = false;
            self.events.post(RawDriverEvent::StaDisconnected {
                reason: Some(REASON_ASSOC_LEAVE),
            });
        }
        self.mode = mode;
        self.events.post(RawDriverEvent::ModeChanged(mode));
    }

    fn try_join(&mut self) {
        if !self.mode.has_station() || self.stored.is_none() {
            return;
        }
        if let Some(address) = self.lease {
            self.associated = true;
            self.events.post(RawDriverEvent::StaConnected);
            self.events.post(RawDriverEvent::StaGotIp(address));
        }
    }
}

impl WifiDriver for SimDriver {
    fn apply_settings(&mut self, settings: &RadioSettings) -> Result<(), DriverError> {
        self.calls
            .push(DriverCall::ApplySettings(settings.hostname.clone()));
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), DriverError> {
        self.calls.push(DriverCall::SetMode(mode));
        if mode.has_access_point() && self.access_point.is_none() {
            return Err(DriverError::Rejected("access point not configured".into()));
        }
        self.switch_mode(mode);
        Ok(())
    }

    fn begin_station(&mut self, credentials: Option<&WifiConfig>) -> Result<(), DriverError> {
        self.calls.push(DriverCall::BeginStation(
            credentials.map(|c| c.ssid.clone()),
        ));
        if let Some(credentials) = credentials {
            self.stored = Some(credentials.clone());
        }
        self.try_join();
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), DriverError> {
        self.calls.push(DriverCall::Reconnect);
        self.try_join();
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        self.calls.push(DriverCall::Disconnect);
        if self.associated {
            self.associated = false;
            self.events.post(RawDriverEvent::StaDisconnected {
                reason: Some(REASON_ASSOC_LEAVE),
            });
        }
        Ok(())
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError> {
        self.calls.push(DriverCall::StartAccessPoint(config.ssid.clone()));
        if self.ap_fails {
            return Err(DriverError::Rejected("soft AP did not start".into()));
        }
        self.access_point = Some(config.ssid.clone());
        self.switch_mode(RadioMode::AccessPoint);
        Ok(())
    }

    fn begin_wps(&mut self) -> Result<Option<String>, DriverError> {
        self.calls.push(DriverCall::BeginWps);
        let Some(network) = self.wps_network.clone() else {
            return Ok(None);
        };
        let ssid = network.ssid.clone();
        self.stored = Some(network);
        self.try_join();
        Ok(Some(ssid))
    }

    fn stored_ssid(&self) -> Option<String> {
        self.stored.as_ref().map(|c| c.ssid.clone())
    }

    fn rssi(&self) -> Option<i8> {
        (self.associated || self.mode == RadioMode::AccessPoint).then_some(self.rssi)
    }

    fn power_off(&mut self) -> Result<(), DriverError> {
        self.calls.push(DriverCall::PowerOff);
        self.set_mode(RadioMode::Off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::{event_channel, NetEvent};

    #[test]
    fn test_mode_switch_emits_event_once() {
        let (tx, mut rx) = event_channel();
        let mut driver = SimDriver::new(tx);
        driver.set_mode(RadioMode::Station).unwrap();
        driver.set_mode(RadioMode::Station).unwrap();

        assert_eq!(
            rx.next_event(),
            Some(NetEvent::ModeChanged(RadioMode::Station))
        );
        assert_eq!(rx.next_event(), None);
    }

    #[test]
    fn test_join_with_lease() {
        let (tx, mut rx) = event_channel();
        let ip = Ipv4Addr::new(192, 168, 1, 50);
        let mut driver = SimDriver::new(tx).with_lease(ip);
        driver.set_mode(RadioMode::Station).unwrap();
        let credentials = WifiConfig::new("Studio", "password123").unwrap();
        driver.begin_station(Some(&credentials)).unwrap();

        assert_eq!(driver.stored_ssid().as_deref(), Some("Studio"));
        let events: Vec<_> = std::iter::from_fn(|| rx.next_event()).collect();
        assert_eq!(
            events,
            vec![
                NetEvent::ModeChanged(RadioMode::Station),
                NetEvent::StationConnected,
                NetEvent::StationGotAddress(ip),
            ]
        );
        assert_eq!(driver.rssi(), Some(-55));
    }

    #[test]
    fn test_join_without_stored_network_stays_silent() {
        let (tx, mut rx) = event_channel();
        let mut driver = SimDriver::new(tx).with_lease(Ipv4Addr::new(10, 0, 0, 2));
        driver.set_mode(RadioMode::Station).unwrap();
        rx.next_event();
        driver.begin_station(None).unwrap();
        assert_eq!(rx.next_event(), None);
        assert_eq!(driver.rssi(), None);
    }

    #[test]
    fn test_wps_without_partner_times_out() {
        let (tx, _rx) = event_channel();
        let mut driver = SimDriver::new(tx);
        assert_eq!(driver.begin_wps().unwrap(), None);
        assert_eq!(driver.count(&DriverCall::BeginWps), 1);
    }
}
