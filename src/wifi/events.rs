//! Driver notifications and their translation into supervisor inputs.
//!
//! Driver callbacks run on the driver's own task and may interleave with the
//! scheduler. They therefore never touch connection state: they post a
//! [`RawDriverEvent`] into a bounded queue, and the supervisor drains the queue
//! in arrival order at the start of every tick.

use super::RadioMode;
use log::{debug, error};
use std::fmt;
use std::net::Ipv4Addr;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Depth of the driver event queue.
///
/// A burst of mode change + disconnect + reconnect fits easily; overflow means
/// the scheduler has stalled and the newest event is dropped.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Hardware address of a station on the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerMac(pub [u8; 6]);

impl fmt::Display for PeerMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Notification as reported by the radio driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawDriverEvent {
    /// Station associated with an access point.
    StaConnected,
    /// Station obtained an address via DHCP.
    StaGotIp(Ipv4Addr),
    /// Station lost or left its access point.
    StaDisconnected { reason: Option<u16> },
    /// Radio mode switched.
    ModeChanged(RadioMode),
    /// A client joined our access point.
    ApStaConnected { mac: PeerMac, aid: u8 },
    /// A client left our access point.
    ApStaDisconnected { mac: PeerMac, aid: u8 },
}

/// Input to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    StationConnected,
    StationGotAddress(Ipv4Addr),
    StationDisconnected,
    ModeChanged(RadioMode),
    PeerJoinedAp(PeerMac),
    PeerLeftAp(PeerMac),
}

/// Map a driver notification to a state machine input.
pub fn translate(raw: RawDriverEvent) -> NetEvent {
    match raw {
        RawDriverEvent::StaConnected => NetEvent::StationConnected,
        RawDriverEvent::StaGotIp(ip) => NetEvent::StationGotAddress(ip),
        RawDriverEvent::StaDisconnected { reason } => {
            if let Some(reason) = reason {
                debug!("station disconnect reason: {}", reason);
            }
            NetEvent::StationDisconnected
        }
        RawDriverEvent::ModeChanged(mode) => NetEvent::ModeChanged(mode),
        RawDriverEvent::ApStaConnected { mac, aid } => {
            debug!("access point association id {} -> {}", aid, mac);
            NetEvent::PeerJoinedAp(mac)
        }
        RawDriverEvent::ApStaDisconnected { mac, .. } => NetEvent::PeerLeftAp(mac),
    }
}

/// Create the driver event queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    (EventSender { tx }, EventReceiver { rx })
}

/// Callback-side handle of the event queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<RawDriverEvent>,
}

impl EventSender {
    /// Enqueue an event without blocking.
    ///
    /// Returns `false` if the event was dropped.
    pub fn post(&self, event: RawDriverEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                error!("driver event queue full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!("driver event queue closed, dropping {:?}", event);
                false
            }
        }
    }
}

/// Scheduler-side handle of the event queue.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<RawDriverEvent>,
}

impl EventReceiver {
    /// Next pending event, translated. Never waits.
    pub fn next_event(&mut self) -> Option<NetEvent> {
        self.rx.try_recv().ok().map(translate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: PeerMac = PeerMac([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);

    #[test]
    fn test_translate_station_events() {
        assert_eq!(translate(RawDriverEvent::StaConnected), NetEvent::StationConnected);
        let ip = Ipv4Addr::new(10, 0, 0, 7);
        assert_eq!(
            translate(RawDriverEvent::StaGotIp(ip)),
            NetEvent::StationGotAddress(ip)
        );
        assert_eq!(
            translate(RawDriverEvent::StaDisconnected { reason: Some(201) }),
            NetEvent::StationDisconnected
        );
    }

    #[test]
    fn test_translate_access_point_events() {
        assert_eq!(
            translate(RawDriverEvent::ModeChanged(RadioMode::AccessPoint)),
            NetEvent::ModeChanged(RadioMode::AccessPoint)
        );
        assert_eq!(
            translate(RawDriverEvent::ApStaConnected { mac: MAC, aid: 1 }),
            NetEvent::PeerJoinedAp(MAC)
        );
        assert_eq!(
            translate(RawDriverEvent::ApStaDisconnected { mac: MAC, aid: 1 }),
            NetEvent::PeerLeftAp(MAC)
        );
    }

    #[test]
    fn test_mac_display() {
        assert_eq!(MAC.to_string(), "DE:AD:BE:EF:00:01");
    }

    #[test]
    fn test_queue_preserves_arrival_order() {
        let (tx, mut rx) = event_channel();
        assert!(tx.post(RawDriverEvent::StaConnected));
        assert!(tx.post(RawDriverEvent::StaGotIp(Ipv4Addr::new(10, 0, 0, 7))));
        assert!(tx.post(RawDriverEvent::StaDisconnected { reason: None }));

        assert_eq!(rx.next_event(), Some(NetEvent::StationConnected));
        assert!(matches!(rx.next_event(), Some(NetEvent::StationGotAddress(_))));
        assert_eq!(rx.next_event(), Some(NetEvent::StationDisconnected));
        assert_eq!(rx.next_event(), None);
    }

    #[test]
    fn test_queue_overflow_drops_newest() {
        let (tx, mut rx) = event_channel();
        for _ in 0..EVENT_QUEUE_DEPTH {
            assert!(tx.post(RawDriverEvent::StaConnected));
        }
        assert!(!tx.post(RawDriverEvent::StaDisconnected { reason: None }));

        let mut drained = 0;
        while let Some(event) = rx.next_event() {
            assert_eq!(event, NetEvent::StationConnected);
            drained += 1;
        }
        assert_eq!(drained, EVENT_QUEUE_DEPTH);
    }

    #[test]
    fn test_post_after_receiver_dropped() {
        let (tx, rx) = event_channel();
        drop(rx);
        assert!(!tx.post(RawDriverEvent::StaConnected));
    }
}
