//! The connectivity core as one schedulable unit.
//!
//! [`NetCore`] ties the supervisor, the network services and the status
//! broadcaster together behind a single non-blocking [`tick`](NetCore::tick)
//! for the firmware's main loop.
//!
//! # Example
//!
//! ```
//! use gbs_netcore::config::{NetConfig, RuntimeOptions, UserOptions};
//! use gbs_netcore::network::HostMdns;
//! use gbs_netcore::status::RecordingSink;
//! use gbs_netcore::wifi::{event_channel, SimDriver};
//! use gbs_netcore::NetCore;
//! use std::time::Instant;
//!
//! let (tx, rx) = event_channel();
//! let now = Instant::now();
//! let mut core = NetCore::new(
//!     SimDriver::new(tx),
//!     HostMdns::new(),
//!     RecordingSink::default(),
//!     rx,
//!     NetConfig::default(),
//!     now,
//! );
//! let runtime = RuntimeOptions::default();
//! core.tick(now, &UserOptions::default(), &runtime, false, usize::MAX);
//! ```

use crate::config::{NetConfig, RuntimeOptions, UserOptions, WifiConfig};
use crate::connectivity::{
    ConnectionState, ConnectionSupervisor, ConnectivityError, NetworkIdentity,
};
use crate::network::{LinkStats, MdnsResponder};
use crate::status::{StatusBroadcaster, StatusSink, StatusSnapshot, TickReport};
use crate::wifi::{EventReceiver, WifiDriver};
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

/// Connectivity and status reporting, driven by [`tick`](Self::tick).
pub struct NetCore<D: WifiDriver, M: MdnsResponder, S: StatusSink> {
    supervisor: ConnectionSupervisor<D, M>,
    broadcaster: StatusBroadcaster,
    sink: S,
    stats: Arc<LinkStats>,
}

impl<D: WifiDriver, M: MdnsResponder, S: StatusSink> NetCore<D, M, S> {
    /// Build the core around a fresh supervisor.
    pub fn new(
        driver: D,
        mdns: M,
        sink: S,
        events: EventReceiver,
        config: NetConfig,
        now: Instant,
    ) -> Self {
        let supervisor = ConnectionSupervisor::new(driver, mdns, events, config);
        Self::from_parts(supervisor, sink, now)
    }

    /// Build around an already configured supervisor.
    pub fn from_parts(supervisor: ConnectionSupervisor<D, M>, sink: S, now: Instant) -> Self {
        Self {
            supervisor,
            broadcaster: StatusBroadcaster::new(now),
            sink,
            stats: Arc::new(LinkStats::new()),
        }
    }

    /// Publish counters into `stats` instead of a private instance.
    pub fn with_stats(mut self, stats: Arc<LinkStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Join the stored network, or open the access point if there is none.
    pub fn start(&mut self, now: Instant) -> Result<(), ConnectivityError> {
        let stored = self.supervisor.has_stored_network();
        if let Err(e) = self.supervisor.initialize(now, stored) {
            // timer is armed, the next attempt follows after the timeout
            warn!("station start failed: {}", e);
        }
        if !stored {
            self.supervisor.enter_access_point_mode()?;
        }
        self.publish(&TickReport::default());
        Ok(())
    }

    /// One scheduling round. Never blocks.
    ///
    /// Connection supervision always runs. mDNS, the captive portal and the
    /// status broadcast only run while the web server is up.
    pub fn tick(
        &mut self,
        now: Instant,
        user: &UserOptions,
        runtime: &RuntimeOptions,
        adc_filter_active: bool,
        free_heap: usize,
    ) -> TickReport {
        self.supervisor.tick(now);

        let mut report = TickReport::default();
        if runtime.web_ui_active() {
            self.supervisor.pump_services();
            let snapshot = StatusSnapshot::compose(user, runtime, adc_filter_active);
            report = self
                .broadcaster
                .tick(now, &mut self.sink, &snapshot, free_heap);
        }
        self.publish(&report);
        report
    }

    /// Push a status frame on the next tick, e.g. after a setting changed.
    pub fn request_instant_update(&mut self) {
        self.broadcaster.request_instant_update();
    }

    /// Run a push-button handshake. Blocks for up to the driver's WPS window.
    ///
    /// Without a network to fall back to, a failed handshake reopens the
    /// access point so the device stays reachable.
    pub fn start_wps(&mut self, now: Instant) -> Result<NetworkIdentity, ConnectivityError> {
        let result = self.supervisor.start_wps(now);
        if result.is_err() && !self.supervisor.has_stored_network() {
            info!("no network to fall back to, reopening access point");
            if let Err(e) = self.supervisor.enter_access_point_mode() {
                error!("{}", e);
            }
        }
        self.publish(&TickReport::default());
        result
    }

    /// Leave access point mode and join `credentials` (or the stored network).
    pub fn start_station_mode(
        &mut self,
        now: Instant,
        credentials: Option<&WifiConfig>,
    ) -> Result<(), ConnectivityError> {
        let result = self.supervisor.start_station_mode(now, credentials);
        self.publish(&TickReport::default());
        result
    }

    /// Open the device's own network with the captive portal.
    pub fn enter_access_point_mode(&mut self) -> Result<Ipv4Addr, ConnectivityError> {
        let result = self.supervisor.enter_access_point_mode();
        self.publish(&TickReport::default());
        result
    }

    /// Turn the radio off and drop every status client.
    pub fn disable(&mut self) {
        self.supervisor.disable();
        self.sink.disconnect_all();
        self.publish(&TickReport::default());
    }

    /// Signal strength in dBm, 0 when there is no link.
    pub fn rssi(&self) -> i8 {
        self.supervisor.rssi()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Counters shared with the diagnostics endpoint.
    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.stats
    }

    /// The connection supervisor.
    pub fn supervisor(&self) -> &ConnectionSupervisor<D, M> {
        &self.supervisor
    }

    /// The connection supervisor, mutably.
    pub fn supervisor_mut(&mut self) -> &mut ConnectionSupervisor<D, M> {
        &mut self.supervisor
    }

    /// Where status frames go.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Where status frames go, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn publish(&self, report: &TickReport) {
        self.stats.set_state(self.supervisor.state());
        self.stats
            .set_reconnect_attempts(self.supervisor.reconnect_attempts());
        self.stats.set_ap_peers(self.supervisor.ap_peers());
        if report.pinged {
            self.stats.record_ping();
        }
        if let Some(frame) = report.frame.as_ref() {
            self.stats.record_frame(frame);
        }
        if report.shed {
            self.stats.record_shed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputResolution;
    use crate::connectivity::{AccessPointController, WpsManager};
    use crate::network::HostMdns;
    use crate::status::{build_frame, RecordingSink};
    use crate::wifi::{event_channel, DriverCall, RadioMode, SimDriver};
    use std::net::SocketAddrV4;
    use std::time::Duration;

    type TestCore = NetCore<SimDriver, HostMdns, RecordingSink>;

    const LEASE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);
    const PLENTY: usize = 40_000;

    fn core(build: impl FnOnce(SimDriver) -> SimDriver, clients: usize, t0: Instant) -> TestCore {
        let (tx, rx) = event_channel();
        let config = NetConfig::default();
        let access_point = AccessPointController::new(&config)
            .with_dns_bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        let supervisor =
            ConnectionSupervisor::new(build(SimDriver::new(tx)), HostMdns::new(), rx, config)
                .with_access_point(access_point)
                .with_wps(WpsManager::new().with_settle_delay(Duration::ZERO));
        NetCore::from_parts(supervisor, RecordingSink::with_clients(clients), t0)
    }

    fn studio() -> WifiConfig {
        WifiConfig::new("Studio", "password123").unwrap()
    }

    fn web_ui() -> RuntimeOptions {
        RuntimeOptions {
            web_server_enabled: true,
            web_server_started: true,
            ..Default::default()
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_start_without_network_opens_access_point() {
        let t0 = Instant::now();
        let mut core = core(|d| d, 0, t0);
        core.start(t0).unwrap();

        assert_eq!(core.state(), ConnectionState::AccessPoint);
        assert_eq!(core.stats().state(), ConnectionState::AccessPoint);
        assert!(core.supervisor().access_point().captive_portal_active());
        assert_eq!(core.supervisor().driver().mode(), RadioMode::AccessPoint);
    }

    #[test]
    fn test_start_with_stored_network_connects() {
        let t0 = Instant::now();
        let mut core = core(|d| d.with_stored_network(studio()).with_lease(LEASE), 0, t0);
        core.start(t0).unwrap();
        assert_eq!(core.state(), ConnectionState::Disconnected);

        core.tick(t0, &UserOptions::default(), &web_ui(), false, PLENTY);
        assert_eq!(core.state(), ConnectionState::ConnectedStation);
        assert!(core.supervisor().mdns().is_advertising());
        assert_eq!(core.rssi(), -55);
    }

    #[test]
    fn test_frames_reach_clients() {
        let t0 = Instant::now();
        let mut core = core(|d| d.with_stored_network(studio()).with_lease(LEASE), 1, t0);
        core.start(t0).unwrap();
        let user = UserOptions {
            resolution: OutputResolution::Output1080p,
            slot_id: 4,
            want_scanlines: true,
            ..Default::default()
        };
        let runtime = web_ui();

        core.tick(t0, &user, &runtime, false, PLENTY);
        let report = core.tick(t0 + ms(974), &user, &runtime, false, PLENTY);

        let expected = build_frame(&StatusSnapshot::compose(&user, &runtime, false));
        assert_eq!(report.frame, Some(expected));
        assert_eq!(expected, [b'#', b'4', 10, 0x01, 0x01, 0, 0, 0]);
        assert_eq!(core.sink().frames(), &[expected.to_vec()]);
        assert_eq!(core.stats().frames_sent(), 1);
        assert_eq!(core.stats().pings_sent(), 1);
        assert_eq!(core.stats().last_frame(), expected);
    }

    #[test]
    fn test_web_ui_off_only_supervises() {
        let t0 = Instant::now();
        let mut core = core(|d| d.with_stored_network(studio()).with_lease(LEASE), 1, t0);
        core.start(t0).unwrap();
        let idle = RuntimeOptions::default();

        for step in 0..3 {
            core.tick(t0 + ms(step * 1_000), &UserOptions::default(), &idle, false, PLENTY);
        }
        assert_eq!(core.state(), ConnectionState::ConnectedStation);
        assert!(core.sink().frames().is_empty());
        assert_eq!(core.sink().pings(), 0);
        assert_eq!(core.supervisor().mdns().updates(), 0);
    }

    #[test]
    fn test_instant_update() {
        let t0 = Instant::now();
        let mut core = core(|d| d, 1, t0);
        core.start(t0).unwrap();

        core.request_instant_update();
        let report = core.tick(t0 + ms(10), &UserOptions::default(), &web_ui(), true, PLENTY);
        let frame = report.frame.unwrap();
        // ADC filter bit
        assert_eq!(frame[6], 0b0000_1000);
    }

    #[test]
    fn test_low_heap_sheds_and_counts() {
        let t0 = Instant::now();
        let mut core = core(|d| d, 2, t0);
        core.start(t0).unwrap();

        let report = core.tick(t0 + ms(974), &UserOptions::default(), &web_ui(), false, 8_000);
        assert!(report.shed);
        assert!(report.frame.is_none());
        assert_eq!(core.sink().connected_clients(), 0);
        assert_eq!(core.stats().shed_events(), 1);
    }

    #[test]
    fn test_failed_wps_without_network_reopens_access_point() {
        let t0 = Instant::now();
        let mut core = core(|d| d, 0, t0);
        core.start(t0).unwrap();

        assert!(matches!(
            core.start_wps(t0),
            Err(ConnectivityError::WpsHandshakeFailed)
        ));
        assert_eq!(core.state(), ConnectionState::AccessPoint);
        assert!(core.supervisor().access_point().captive_portal_active());
    }

    #[test]
    fn test_link_loss_reconnects_after_timeout() {
        let t0 = Instant::now();
        let mut core = core(|d| d.with_stored_network(studio()).with_lease(LEASE), 0, t0);
        core.start(t0).unwrap();
        let user = UserOptions::default();
        let runtime = web_ui();
        core.tick(t0, &user, &runtime, false, PLENTY);

        core.supervisor_mut().driver_mut().drop_link();
        let t1 = t0 + ms(500);
        core.tick(t1, &user, &runtime, false, PLENTY);
        assert_eq!(core.state(), ConnectionState::Disconnected);
        assert!(!core.supervisor().mdns().is_advertising());

        core.tick(t1 + ms(10_000), &user, &runtime, false, PLENTY);
        assert_eq!(core.supervisor().driver().count(&DriverCall::Reconnect), 0);

        // reconnect succeeds through the lease; events apply on the next tick
        core.tick(t1 + ms(10_001), &user, &runtime, false, PLENTY);
        assert_eq!(core.supervisor().driver().count(&DriverCall::Reconnect), 1);
        assert!(core.stats().to_json().contains("\"reconnect_attempts\":1"));
        core.tick(t1 + ms(10_002), &user, &runtime, false, PLENTY);
        assert_eq!(core.state(), ConnectionState::ConnectedStation);
        assert!(core.supervisor().mdns().is_advertising());
    }

    #[test]
    fn test_disable_drops_clients() {
        let t0 = Instant::now();
        let mut core = core(|d| d, 1, t0);
        core.start(t0).unwrap();
        core.disable();
        assert_eq!(core.state(), ConnectionState::Disconnected);
        assert_eq!(core.sink().connected_clients(), 0);
        assert_eq!(core.rssi(), 0);
    }
}
