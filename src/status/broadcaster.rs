//! Periodic status push to web UI clients.
//!
//! Two cadences run side by side: a ping keeps client connections alive and
//! a data frame carries the current status. Their intervals are deliberately
//! offset so the two never settle into lockstep with other periodic work.

use super::frame::{build_frame, StatusSnapshot, FRAME_LEN};
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Interval between keep-alive pings.
pub const PING_INTERVAL: Duration = Duration::from_millis(953);

/// Interval between status frames.
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(973);

/// Below this much free heap, subscribers are dropped instead of served.
pub const MIN_FREE_HEAP_BYTES: usize = 14_000;

/// Where status frames go (a WebSocket server on the device).
pub trait StatusSink {
    /// Number of subscribed clients.
    fn connected_clients(&self) -> usize;

    /// Send a keep-alive ping to every client.
    fn broadcast_ping(&mut self);

    /// Send a binary message to every client.
    fn broadcast_binary(&mut self, frame: &[u8]);

    /// Drop every client.
    fn disconnect_all(&mut self);
}

/// Frames a [`RecordingSink`] keeps by default.
pub const RECORDED_FRAMES: usize = 64;

/// In-memory sink that records what it was asked to send.
///
/// Counters cover the whole run; only the most recent frames are kept.
#[derive(Debug)]
pub struct RecordingSink {
    clients: usize,
    pings: u32,
    frames: Vec<Vec<u8>>,
    frames_sent: u64,
    history: usize,
    disconnects: u32,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            clients: 0,
            pings: 0,
            frames: Vec::new(),
            frames_sent: 0,
            history: RECORDED_FRAMES,
            disconnects: 0,
        }
    }
}

impl RecordingSink {
    /// Sink reporting `clients` subscribers.
    pub fn with_clients(clients: usize) -> Self {
        Self {
            clients,
            ..Self::default()
        }
    }

    /// Keep at most `frames` recent frames (at least one).
    pub fn with_history(mut self, frames: usize) -> Self {
        self.history = frames.max(1);
        self
    }

    /// Change the reported subscriber count.
    pub fn set_clients(&mut self, clients: usize) {
        self.clients = clients;
    }

    /// Pings sent.
    pub fn pings(&self) -> u32 {
        self.pings
    }

    /// Recent frames, oldest first.
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    /// Frames sent since creation, including those no longer kept.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Most recent frame, if any.
    pub fn last_frame(&self) -> Option<&[u8]> {
        self.frames.last().map(Vec::as_slice)
    }

    /// Times all clients were dropped.
    pub fn disconnects(&self) -> u32 {
        self.disconnects
    }
}

impl StatusSink for RecordingSink {
    fn connected_clients(&self) -> usize {
        self.clients
    }

    fn broadcast_ping(&mut self) {
        self.pings += 1;
    }

    fn broadcast_binary(&mut self, frame: &[u8]) {
        if self.frames.len() == self.history {
            self.frames.remove(0);
        }
        self.frames.push(frame.to_vec());
        self.frames_sent += 1;
    }

    fn disconnect_all(&mut self) {
        self.clients = 0;
        self.disconnects += 1;
    }
}

/// Timestamps of the last ping and the last data broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatState {
    pub last_ping: Instant,
    pub last_broadcast: Instant,
}

/// What a broadcaster tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub pinged: bool,
    /// Frame sent this tick.
    pub frame: Option<[u8; FRAME_LEN]>,
    /// Subscribers were shed for lack of memory.
    pub shed: bool,
}

/// Drives both cadences.
#[derive(Debug)]
pub struct StatusBroadcaster {
    heartbeat: HeartbeatState,
    instant_pending: bool,
}

impl StatusBroadcaster {
    /// Both timers start at `now`, so the first ping and frame follow one
    /// interval later.
    pub fn new(now: Instant) -> Self {
        Self {
            heartbeat: HeartbeatState {
                last_ping: now,
                last_broadcast: now,
            },
            instant_pending: false,
        }
    }

    /// When each cadence last fired.
    pub fn heartbeat(&self) -> HeartbeatState {
        self.heartbeat
    }

    /// Send a frame on the next tick regardless of the data interval. The
    /// ping cadence is unaffected.
    pub fn request_instant_update(&mut self) {
        self.instant_pending = true;
    }

    /// Whether the next tick sends a frame regardless of the timer.
    pub fn instant_update_pending(&self) -> bool {
        self.instant_pending
    }

    /// Drop all subscribers if free heap is below [`MIN_FREE_HEAP_BYTES`].
    ///
    /// Returns `true` if memory is short.
    pub fn guard_memory_pressure<S: StatusSink>(&self, free_heap: usize, sink: &mut S) -> bool {
        if free_heap >= MIN_FREE_HEAP_BYTES {
            return false;
        }
        let clients = sink.connected_clients();
        if clients > 0 {
            warn!(
                "free heap {} bytes, disconnecting {} status client(s)",
                free_heap, clients
            );
            sink.disconnect_all();
        }
        true
    }

    /// Run both cadences once. Never blocks.
    pub fn tick<S: StatusSink>(
        &mut self,
        now: Instant,
        sink: &mut S,
        snapshot: &StatusSnapshot,
        free_heap: usize,
    ) -> TickReport {
        let mut report = TickReport::default();

        if now.saturating_duration_since(self.heartbeat.last_ping) > PING_INTERVAL {
            self.heartbeat.last_ping = now;
            if sink.connected_clients() > 0 {
                sink.broadcast_ping();
                report.pinged = true;
            }
        }

        let due = now.saturating_duration_since(self.heartbeat.last_broadcast) > BROADCAST_INTERVAL;
        if due || self.instant_pending {
            self.instant_pending = false;
            self.heartbeat.last_broadcast = now;

            if self.guard_memory_pressure(free_heap, sink) {
                report.shed = true;
            } else if sink.connected_clients() > 0 {
                let frame = build_frame(snapshot);
                debug!("status frame {:02x?}", frame);
                sink.broadcast_binary(&frame);
                report.frame = Some(frame);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::frame::FRAME_MARKER;

    const PLENTY: usize = 40_000;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_recording_sink_keeps_recent_frames() {
        let mut sink = RecordingSink::with_clients(1).with_history(2);
        for n in 0..5u8 {
            sink.broadcast_binary(&[b'#', n]);
        }
        assert_eq!(sink.frames_sent(), 5);
        assert_eq!(sink.frames(), &[vec![b'#', 3], vec![b'#', 4]]);
        assert_eq!(sink.last_frame(), Some(&[b'#', 4][..]));
    }

    #[test]
    fn test_cadences_are_independent() {
        let t0 = Instant::now();
        let mut b = StatusBroadcaster::new(t0);
        let mut sink = RecordingSink::with_clients(1);
        let s = StatusSnapshot::default();

        assert_eq!(b.tick(t0 + ms(953), &mut sink, &s, PLENTY), TickReport::default());

        let r = b.tick(t0 + ms(954), &mut sink, &s, PLENTY);
        assert!(r.pinged);
        assert!(r.frame.is_none());

        let r = b.tick(t0 + ms(974), &mut sink, &s, PLENTY);
        assert!(!r.pinged);
        assert_eq!(r.frame.map(|f| f[0]), Some(FRAME_MARKER));

        assert_eq!(sink.pings(), 1);
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn test_ten_seconds_of_ticks() {
        let t0 = Instant::now();
        let mut b = StatusBroadcaster::new(t0);
        let mut sink = RecordingSink::with_clients(2);
        let s = StatusSnapshot::default();

        for step in 1..=10_000u64 {
            b.tick(t0 + ms(step), &mut sink, &s, PLENTY);
        }
        // 10 s: ping every 954 ms, data every 974 ms
        assert_eq!(sink.pings(), 10);
        assert_eq!(sink.frames().len(), 10);
    }

    #[test]
    fn test_instant_update_resets_only_data_timer() {
        let t0 = Instant::now();
        let mut b = StatusBroadcaster::new(t0);
        let mut sink = RecordingSink::with_clients(1);
        let s = StatusSnapshot::default();

        b.request_instant_update();
        let t1 = t0 + ms(100);
        let r = b.tick(t1, &mut sink, &s, PLENTY);
        assert!(r.frame.is_some());
        assert!(!b.instant_update_pending());
        assert_eq!(b.heartbeat().last_broadcast, t1);
        assert_eq!(b.heartbeat().last_ping, t0);

        // ping still fires on its original schedule
        let r = b.tick(t0 + ms(954), &mut sink, &s, PLENTY);
        assert!(r.pinged);
        assert!(r.frame.is_none());

        // data waits a full interval from the instant frame
        assert!(b.tick(t1 + ms(973), &mut sink, &s, PLENTY).frame.is_none());
        assert!(b.tick(t1 + ms(974), &mut sink, &s, PLENTY).frame.is_some());
    }

    #[test]
    fn test_no_clients_no_traffic() {
        let t0 = Instant::now();
        let mut b = StatusBroadcaster::new(t0);
        let mut sink = RecordingSink::default();
        let r = b.tick(t0 + ms(2_000), &mut sink, &StatusSnapshot::default(), PLENTY);
        assert_eq!(r, TickReport::default());
        assert_eq!(sink.pings(), 0);
        assert!(sink.frames().is_empty());
        // timers still advanced
        assert_eq!(b.heartbeat().last_ping, t0 + ms(2_000));
    }

    #[test]
    fn test_low_heap_sheds_clients_without_frame() {
        let t0 = Instant::now();
        let mut b = StatusBroadcaster::new(t0);
        let mut sink = RecordingSink::with_clients(2);

        let r = b.tick(t0 + ms(974), &mut sink, &StatusSnapshot::default(), 13_999);
        assert!(r.shed);
        assert!(r.frame.is_none());
        assert_eq!(sink.disconnects(), 1);
        assert_eq!(sink.connected_clients(), 0);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn test_heap_at_threshold_is_enough() {
        let b = StatusBroadcaster::new(Instant::now());
        let mut sink = RecordingSink::with_clients(1);
        assert!(!b.guard_memory_pressure(MIN_FREE_HEAP_BYTES, &mut sink));
        assert!(b.guard_memory_pressure(MIN_FREE_HEAP_BYTES - 1, &mut sink));
        assert_eq!(sink.disconnects(), 1);
        // nothing left to drop
        assert!(b.guard_memory_pressure(0, &mut sink));
        assert_eq!(sink.disconnects(), 1);
    }
}
