//! HTTP diagnostics endpoint.
//!
//! Serves `GET /status` with the connectivity counters as JSON. Uses
//! `tiny_http`, which works on both host and ESP32 (via std::net).
//!
//! # Example Response
//!
//! ```json
//! {
//!   "uptime_secs": 3600,
//!   "state": "connected-station",
//!   "reconnect_attempts": 2,
//!   "ap_peers": 0,
//!   "broadcast": { "pings": 3700, "frames": 3712, "shed": 0 },
//!   "last_frame": "2330000100000000",
//!   "last_status": { "slot": 0, "resolution": 0, "flags": ["scanlines"] }
//! }
//! ```

use log::{error, info, warn};
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Header, Method, Response, Server};

use crate::connectivity::ConnectionState;
use crate::status::decode_frame;

/// Default port for the diagnostics endpoint.
pub const DEFAULT_STATUS_PORT: u16 = 8080;

const POLL: Duration = Duration::from_millis(100);

/// Connectivity counters shared between the scheduler and the HTTP thread.
///
/// The scheduler publishes into it after every tick; all fields are atomics
/// so readers never block the scheduler.
#[derive(Debug)]
pub struct LinkStats {
    start_time: Instant,
    state: AtomicU8,
    reconnect_attempts: AtomicU32,
    ap_peers: AtomicU32,
    pings_sent: AtomicU32,
    frames_sent: AtomicU32,
    shed_events: AtomicU32,
    /// Last status frame, big-endian.
    last_frame: AtomicU64,
}

impl LinkStats {
    /// All counters at zero, uptime starting now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            state: AtomicU8::new(ConnectionState::Disconnected.to_u8()),
            reconnect_attempts: AtomicU32::new(0),
            ap_peers: AtomicU32::new(0),
            pings_sent: AtomicU32::new(0),
            frames_sent: AtomicU32::new(0),
            shed_events: AtomicU32::new(0),
            last_frame: AtomicU64::new(0),
        }
    }

    /// Seconds since creation.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Publish the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }

    /// Last published connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Publish the supervisor's reconnect count.
    pub fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::Relaxed);
    }

    /// Publish the number of access point clients.
    pub fn set_ap_peers(&self, peers: u32) {
        self.ap_peers.store(peers, Ordering::Relaxed);
    }

    /// Count one ping broadcast.
    pub fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a frame and keep it as the last one.
    pub fn record_frame(&self, frame: &[u8; 8]) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.last_frame
            .store(u64::from_be_bytes(*frame), Ordering::Relaxed);
    }

    /// Count one memory-pressure shed.
    pub fn record_shed(&self) {
        self.shed_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Ping broadcasts so far.
    pub fn pings_sent(&self) -> u32 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    /// Status frames so far.
    pub fn frames_sent(&self) -> u32 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Times subscribers were shed.
    pub fn shed_events(&self) -> u32 {
        self.shed_events.load(Ordering::Relaxed)
    }

    /// Last frame sent, all zeros before the first one.
    pub fn last_frame(&self) -> [u8; 8] {
        self.last_frame.load(Ordering::Relaxed).to_be_bytes()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> String {
        let frame = self.last_frame();
        let last_frame: String = frame.iter().map(|b| format!("{:02x}", b)).collect();
        // all zeros until the first frame, which does not decode
        let last_status = match decode_frame(&frame) {
            Ok(status) => {
                let flags: Vec<String> = status
                    .active_flags()
                    .iter()
                    .map(|name| format!("\"{}\"", name))
                    .collect();
                format!(
                    r#"{{"slot":{},"resolution":{},"flags":[{}]}}"#,
                    status.slot_id,
                    status.resolution_id,
                    flags.join(",")
                )
            }
            Err(_) => "null".to_string(),
        };
        format!(
            r#"{{"uptime_secs":{},"state":"{}","reconnect_attempts":{},"ap_peers":{},"broadcast":{{"pings":{},"frames":{},"shed":{}}},"last_frame":"{}","last_status":{}}}"#,
            self.uptime_secs(),
            self.state().as_str(),
            self.reconnect_attempts.load(Ordering::Relaxed),
            self.ap_peers.load(Ordering::Relaxed),
            self.pings_sent(),
            self.frames_sent(),
            self.shed_events(),
            last_frame,
            last_status
        )
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP diagnostics server.
///
/// Runs in a background thread; drop it to stop.
pub struct StatusServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    port: u16,
}

impl StatusServer {
    /// Bind and start serving `stats`.
    ///
    /// `bind_addr` of `None` listens on all interfaces. Port 0 picks a free
    /// port, see [`port`](Self::port).
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        stats: Arc<LinkStats>,
    ) -> Result<Self, std::io::Error> {
        let ip = bind_addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let server = Server::http(SocketAddr::new(ip, port))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, e.to_string()))?;
        let port = match server.server_addr().to_ip() {
            Some(bound) => bound.port(),
            None => port,
        };
        info!("Status endpoint on {}:{}/status", ip, port);

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new()
            .name("status-http".into())
            .spawn({
                let shutdown = shutdown.clone();
                move || serve(server, &stats, &shutdown)
            })?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            port,
        })
    }

    /// Port actually bound.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop serving. Returns within one poll period.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("status endpoint thread panicked");
            }
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("static header")
}

fn route(method: &Method, url: &str, stats: &LinkStats) -> Response<Cursor<Vec<u8>>> {
    if *method != Method::Get {
        return Response::from_string("Method Not Allowed")
            .with_status_code(405)
            .with_header(header("Allow", "GET"));
    }
    match url {
        "/status" | "/status/" => Response::from_string(stats.to_json())
            .with_header(header("Content-Type", "application/json")),
        "/" => Response::from_string("See /status")
            .with_status_code(302)
            .with_header(header("Location", "/status")),
        _ => Response::from_string("Not Found").with_status_code(404),
    }
}

/// Request loop; polls `shutdown` between requests.
fn serve(server: Server, stats: &LinkStats, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Acquire) {
        match server.recv_timeout(POLL) {
            Ok(Some(request)) => {
                let response = route(request.method(), request.url(), stats);
                if let Err(e) = request.respond(response) {
                    warn!("status response not sent: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("status endpoint failed: {}", e);
                return;
            }
        }
    }
    info!("Status endpoint stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};

    #[test]
    fn test_link_stats_json() {
        let stats = LinkStats::new();
        stats.set_state(ConnectionState::AccessPoint);
        stats.set_ap_peers(1);
        stats.record_ping();
        stats.record_frame(&[0x23, b'0', 0, 0x01, 0, 0, 0, 0]);
        stats.record_shed();

        let json = stats.to_json();
        assert!(json.contains("\"state\":\"access-point\""));
        assert!(json.contains("\"ap_peers\":1"));
        assert!(json.contains("\"pings\":1"));
        assert!(json.contains("\"frames\":1"));
        assert!(json.contains("\"shed\":1"));
        assert!(json.contains("\"last_frame\":\"2330000100000000\""));
        assert!(json.contains(r#""last_status":{"slot":0,"resolution":0,"flags":["scanlines"]}"#));
    }

    #[test]
    fn test_no_status_before_first_frame() {
        let stats = LinkStats::new();
        assert!(stats.to_json().ends_with(r#""last_frame":"0000000000000000","last_status":null}"#));

        stats.record_frame(&[0x23, b'4', 10, 0x30, 0, 0, 0x08, 0]);
        assert!(stats.to_json().contains(
            r#""last_status":{"slot":4,"resolution":10,"flags":["auto_gain","frame_time_lock","adc_filter_active"]}"#
        ));
    }

    #[test]
    fn test_last_frame_round_trip() {
        let stats = LinkStats::new();
        assert_eq!(stats.last_frame(), [0; 8]);
        let frame = [0x23, b'3', 6, 0x30, 0x01, 0, 0x04, 0x01];
        stats.record_frame(&frame);
        assert_eq!(stats.last_frame(), frame);
    }

    #[test]
    fn test_serves_status_over_http() {
        let stats = Arc::new(LinkStats::new());
        stats.set_state(ConnectionState::ConnectedStation);
        let mut server =
            StatusServer::start(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), 0, stats).unwrap();

        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, server.port())).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        stream
            .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).unwrap();

        assert!(body.starts_with("HTTP/1.1 200"));
        assert!(body.contains("\"state\":\"connected-station\""));
        server.stop();
    }
}
