//! The connection state machine.
//!
//! Transitions happen in two places only: [`ConnectionSupervisor::on_event`]
//! for driver events and the explicit mode operations
//! ([`enter_access_point_mode`](ConnectionSupervisor::enter_access_point_mode),
//! [`start_station_mode`](ConnectionSupervisor::start_station_mode),
//! [`start_wps`](ConnectionSupervisor::start_wps),
//! [`disable`](ConnectionSupervisor::disable)). Nothing else writes the state.
//!
//! The reconnect timer is armed only while `Disconnected` after a station
//! attempt. A failed join is never reported as such; the supervisor simply
//! retries once the timeout has elapsed without an address.

use super::{
    AccessPointController, ConnectionState, ConnectivityError, NetworkIdentity, WpsManager,
};
use crate::config::{NetConfig, WifiConfig};
use crate::network::{MdnsResponder, ServiceRecord};
use crate::wifi::{EventReceiver, NetEvent, RadioMode, RadioSettings, WifiDriver};
use log::{debug, error, info, warn};
use std::net::Ipv4Addr;
use std::time::Instant;

/// Reads the time after a blocking call.
pub type Clock = Box<dyn Fn() -> Instant + Send>;

/// Owns the connection state, the reconnect timer and the radio.
pub struct ConnectionSupervisor<D: WifiDriver, M: MdnsResponder> {
    driver: D,
    mdns: M,
    events: EventReceiver,
    access_point: AccessPointController,
    wps: WpsManager,
    config: NetConfig,
    state: ConnectionState,
    /// Start of the current reconnect wait.
    reconnect_armed_at: Option<Instant>,
    station_address: Option<Ipv4Addr>,
    reconnect_attempts: u32,
    ap_peers: u32,
    clock: Clock,
}

impl<D: WifiDriver, M: MdnsResponder> ConnectionSupervisor<D, M> {
    /// Supervisor in `Disconnected` with no timer armed. Call
    /// [`initialize`](Self::initialize) before ticking.
    pub fn new(driver: D, mdns: M, events: EventReceiver, config: NetConfig) -> Self {
        Self {
            driver,
            mdns,
            events,
            access_point: AccessPointController::new(&config),
            wps: WpsManager::new(),
            config,
            state: ConnectionState::Disconnected,
            reconnect_armed_at: None,
            station_address: None,
            reconnect_attempts: 0,
            ap_peers: 0,
            clock: Box::new(Instant::now),
        }
    }

    /// Replace the access point controller.
    pub fn with_access_point(mut self, access_point: AccessPointController) -> Self {
        self.access_point = access_point;
        self
    }

    /// Replace the WPS manager.
    pub fn with_wps(mut self, wps: WpsManager) -> Self {
        self.wps = wps;
        self
    }

    /// Replace the clock read when a WPS handshake returns.
    pub fn with_clock(mut self, clock: impl Fn() -> Instant + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// When the current reconnect wait started, `None` if no wait is pending.
    pub fn reconnect_armed_at(&self) -> Option<Instant> {
        self.reconnect_armed_at
    }

    /// Address leased to the station while connected.
    pub fn station_address(&self) -> Option<Ipv4Addr> {
        self.station_address
    }

    /// Reconnects issued by the timer since start.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Clients currently on our access point.
    pub fn ap_peers(&self) -> u32 {
        self.ap_peers
    }

    /// Network settings this supervisor was built with.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// The radio driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The radio driver, for driver-specific controls.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// The mDNS responder.
    pub fn mdns(&self) -> &M {
        &self.mdns
    }

    /// The access point and captive portal controller.
    pub fn access_point(&self) -> &AccessPointController {
        &self.access_point
    }

    /// Whether the driver knows a network to join.
    pub fn has_stored_network(&self) -> bool {
        self.driver.stored_ssid().is_some()
    }

    /// Apply radio settings and, if credentials are stored, start joining.
    ///
    /// Without stored credentials the state stays `Disconnected` with the
    /// timer unset; the caller decides whether to open the access point.
    pub fn initialize(
        &mut self,
        now: Instant,
        stored_credentials_present: bool,
    ) -> Result<(), ConnectivityError> {
        let settings = RadioSettings::for_hostname(&self.config.hostname);
        if let Err(e) = self.driver.apply_settings(&settings) {
            warn!("could not apply radio settings: {}", e);
        }

        if !stored_credentials_present {
            info!("no stored network");
            return Ok(());
        }

        // Armed first so a failed start is retried like a failed join.
        self.arm_reconnect(now);
        info!(
            "connecting to stored network \"{}\"",
            self.driver.stored_ssid().unwrap_or_default()
        );
        self.driver
            .set_mode(RadioMode::Station)
            .and_then(|()| self.driver.begin_station(None))
            .map_err(ConnectivityError::RadioStartFailure)
    }

    /// Apply one event.
    pub fn on_event(&mut self, now: Instant, event: NetEvent) {
        use ConnectionState::*;

        debug!("event {:?} in state {}", event, self.state);
        match event {
            NetEvent::StationConnected => match self.state {
                Disconnected | ConnectingStation | WpsInProgress => {
                    self.reconnect_armed_at = None;
                    self.set_state(ConnectingStation);
                }
                ConnectedStation | AccessPoint => {}
            },
            NetEvent::StationGotAddress(address) => match self.state {
                Disconnected | ConnectingStation | WpsInProgress => {
                    self.reconnect_armed_at = None;
                    self.station_address = Some(address);
                    self.set_state(ConnectedStation);
                    self.advertise(address);
                    info!("access the web UI at http://{}.local", self.config.hostname);
                }
                ConnectedStation if self.station_address != Some(address) => {
                    info!("station address changed to {}", address);
                    self.station_address = Some(address);
                    self.advertise(address);
                }
                ConnectedStation | AccessPoint => {}
            },
            NetEvent::StationDisconnected => match self.state {
                ConnectedStation | ConnectingStation => {
                    self.mdns.withdraw();
                    self.station_address = None;
                    self.set_state(Disconnected);
                    self.arm_reconnect(now);
                }
                // Duplicates and stale reports change nothing
                Disconnected | AccessPoint | WpsInProgress => {}
            },
            NetEvent::ModeChanged(mode) => {
                debug!("radio mode now {}", mode);
                if !mode.has_station() {
                    self.mdns.withdraw();
                }
            }
            NetEvent::PeerJoinedAp(mac) => {
                self.ap_peers = self.ap_peers.saturating_add(1);
                info!("client {} joined the access point", mac);
            }
            NetEvent::PeerLeftAp(mac) => {
                self.ap_peers = self.ap_peers.saturating_sub(1);
                info!("client {} left the access point", mac);
            }
        }
    }

    /// Apply pending events, then run the reconnect check. Never blocks.
    pub fn tick(&mut self, now: Instant) {
        while let Some(event) = self.events.next_event() {
            self.on_event(now, event);
        }

        if self.state != ConnectionState::Disconnected {
            return;
        }
        let Some(armed_at) = self.reconnect_armed_at else {
            return;
        };
        if now.saturating_duration_since(armed_at) <= self.config.reconnect_timeout {
            return;
        }

        if let Some(ssid) = self.driver.stored_ssid() {
            self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
            info!(
                "reconnecting to \"{}\" (attempt {})",
                ssid, self.reconnect_attempts
            );
            if let Err(e) = self.driver.reconnect() {
                warn!("reconnect request failed: {}", e);
            }
            self.arm_reconnect(now);
        } else {
            info!("no network to return to, opening access point");
            if let Err(e) = self.enter_access_point_mode() {
                error!("{}", e);
            }
        }
    }

    /// Service housekeeping: mDNS step and one captive DNS request.
    pub fn pump_services(&mut self) {
        self.mdns.update();
        self.access_point.tick();
    }

    /// Host our own network. Tears down any mDNS advertisement first.
    pub fn enter_access_point_mode(&mut self) -> Result<Ipv4Addr, ConnectivityError> {
        self.mdns.withdraw();
        self.reconnect_armed_at = None;
        self.station_address = None;
        self.set_state(ConnectionState::Disconnected);

        let address = self.access_point.enter(&mut self.driver)?;
        self.ap_peers = 0;
        self.set_state(ConnectionState::AccessPoint);
        Ok(address)
    }

    /// Leave access point mode and join a network.
    ///
    /// `None` uses the stored network. Refused without touching the radio if
    /// there is nothing to join.
    pub fn start_station_mode(
        &mut self,
        now: Instant,
        credentials: Option<&WifiConfig>,
    ) -> Result<(), ConnectivityError> {
        if credentials.is_none() && !self.has_stored_network() {
            return Err(ConnectivityError::NotConfigured);
        }

        self.access_point.stop();
        self.mdns.withdraw();
        self.station_address = None;
        self.set_state(ConnectionState::Disconnected);
        self.arm_reconnect(now);

        if let Some(credentials) = credentials {
            info!("joining \"{}\"", credentials.ssid);
        }
        self.driver
            .set_mode(RadioMode::Station)
            .and_then(|()| self.driver.begin_station(credentials))
            .map_err(ConnectivityError::RadioStartFailure)
    }

    /// Run a push-button handshake. Blocks until the driver gives up or
    /// succeeds.
    ///
    /// `now` is the time of the request. Follow-up timing uses the clock
    /// read after the handshake returns (see [`with_clock`](Self::with_clock)).
    ///
    /// Success hands over to the normal station flow (`ConnectingStation`).
    /// Failure leaves `Disconnected`, with a reconnect pending only if a
    /// network is stored.
    pub fn start_wps(&mut self, now: Instant) -> Result<NetworkIdentity, ConnectivityError> {
        self.access_point.stop();
        self.mdns.withdraw();
        self.station_address = None;
        self.reconnect_armed_at = None;
        self.set_state(ConnectionState::WpsInProgress);

        let result = self.wps.start_wps(&mut self.driver);

        // The handshake took a while; drop what it left behind (our own
        // disconnect) and pick up an early association.
        let after = (self.clock)().max(now);
        while self.state == ConnectionState::WpsInProgress {
            let Some(event) = self.events.next_event() else {
                break;
            };
            self.on_event(after, event);
        }

        if self.state == ConnectionState::WpsInProgress {
            match &result {
                Ok(_) => self.set_state(ConnectionState::ConnectingStation),
                Err(_) => {
                    self.set_state(ConnectionState::Disconnected);
                    if self.has_stored_network() {
                        self.arm_reconnect(after);
                    }
                }
            }
        }
        result
    }

    /// Turn the radio off and stop supervising.
    pub fn disable(&mut self) {
        self.access_point.stop();
        self.mdns.withdraw();
        self.reconnect_armed_at = None;
        self.station_address = None;
        self.set_state(ConnectionState::Disconnected);
        if let Err(e) = self.driver.power_off() {
            warn!("could not power off radio: {}", e);
        }
        info!("WiFi disabled");
    }

    /// Signal strength in dBm while connected or hosting, else 0.
    pub fn rssi(&self) -> i8 {
        match self.state {
            ConnectionState::ConnectedStation | ConnectionState::AccessPoint => {
                self.driver.rssi().unwrap_or(0)
            }
            _ => 0,
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("connection: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn arm_reconnect(&mut self, now: Instant) {
        self.reconnect_armed_at = Some(now);
    }

    fn advertise(&mut self, address: Ipv4Addr) {
        let service = ServiceRecord::http(self.config.http_port);
        if let Err(e) = self
            .mdns
            .advertise(&self.config.hostname, address, &service)
        {
            warn!("mDNS unavailable: {}", e);
        }
    }
}
