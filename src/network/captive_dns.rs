//! Captive portal DNS responder.
//!
//! While the device runs its own access point, every name lookup from a
//! client is answered with the access point address so that any URL lands on
//! the web UI. Uses a plain non-blocking `std::net::UdpSocket`, which works on
//! both host and ESP32.
//!
//! Only the first question of a standard query is considered. `A` and `ANY`
//! questions of class `IN` get one answer record; everything else gets an
//! empty reply with rcode NoError so clients fall back quickly.

use super::ServiceError;
use log::{debug, info};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

const HEADER_LEN: usize = 12;
const MAX_PACKET: usize = 512;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_AUTHORITATIVE: u16 = 0x0400;
const FLAG_RECURSION_DESIRED: u16 = 0x0100;
const OPCODE_MASK: u16 = 0x7800;

const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;

/// Pointer to the question name at offset 12.
const NAME_POINTER: [u8; 2] = [0xC0, 0x0C];

/// Wildcard DNS responder.
pub struct CaptiveDns {
    socket: Option<UdpSocket>,
    answer: Ipv4Addr,
    ttl_secs: u32,
    buf: [u8; MAX_PACKET],
}

impl CaptiveDns {
    /// Create a stopped responder whose records carry `ttl_secs`.
    pub fn new(ttl_secs: u32) -> Self {
        Self {
            socket: None,
            answer: Ipv4Addr::UNSPECIFIED,
            ttl_secs,
            buf: [0; MAX_PACKET],
        }
    }

    /// Bind to `bind` and answer every query with `answer`.
    ///
    /// A running responder is stopped first.
    pub fn start(&mut self, bind: SocketAddrV4, answer: Ipv4Addr) -> Result<(), ServiceError> {
        self.stop();
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        info!("captive DNS listening on {} -> {}", bind, answer);
        self.answer = answer;
        self.socket = Some(socket);
        Ok(())
    }

    /// Close the socket.
    pub fn stop(&mut self) {
        if self.socket.take().is_some() {
            debug!("captive DNS stopped");
        }
    }

    /// Whether the socket is bound.
    pub fn is_running(&self) -> bool {
        self.socket.is_some()
    }

    /// Actual bound address (useful when bound to port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Handle at most one pending request. Never waits.
    ///
    /// Returns `true` if a reply was sent.
    pub fn process_next_request(&mut self) -> Result<bool, ServiceError> {
        let Some(socket) = self.socket.as_ref() else {
            return Ok(false);
        };

        let (len, peer) = match socket.recv_from(&mut self.buf) {
            Ok(received) => received,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let Some(reply) = build_reply(&self.buf[..len], self.answer, self.ttl_secs) else {
            debug!("captive DNS: ignoring malformed packet from {}", peer);
            return Ok(false);
        };
        socket.send_to(&reply, peer)?;
        Ok(true)
    }
}

fn read_u16(packet: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*packet.get(at)?, *packet.get(at + 1)?]))
}

/// Build the reply to `query`, or `None` if it should be dropped.
fn build_reply(query: &[u8], answer: Ipv4Addr, ttl_secs: u32) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let flags = read_u16(query, 2)?;
    if flags & FLAG_RESPONSE != 0 || read_u16(query, 4)? == 0 {
        return None;
    }

    // Walk the labels of the first question; compression is not valid here.
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos)? as usize;
        pos += 1;
        if len == 0 {
            break;
        }
        if len & 0xC0 != 0 {
            return None;
        }
        pos += len;
    }
    let qtype = read_u16(query, pos)?;
    let qclass = read_u16(query, pos + 2)?;
    let question = &query[HEADER_LEN..pos + 4];

    let standard = flags & OPCODE_MASK == 0;
    let answered = standard && (qtype == TYPE_A || qtype == TYPE_ANY) && qclass == CLASS_IN;

    // rcode stays NoError, answered or not
    let reply_flags =
        FLAG_RESPONSE | FLAG_AUTHORITATIVE | (flags & (OPCODE_MASK | FLAG_RECURSION_DESIRED));

    let mut reply = Vec::with_capacity(HEADER_LEN + question.len() + 16);
    reply.extend_from_slice(&query[0..2]);
    reply.extend_from_slice(&reply_flags.to_be_bytes());
    reply.extend_from_slice(&1u16.to_be_bytes());
    reply.extend_from_slice(&u16::from(answered).to_be_bytes());
    reply.extend_from_slice(&[0, 0, 0, 0]);
    reply.extend_from_slice(question);

    if answered {
        reply.extend_from_slice(&NAME_POINTER);
        reply.extend_from_slice(&TYPE_A.to_be_bytes());
        reply.extend_from_slice(&CLASS_IN.to_be_bytes());
        reply.extend_from_slice(&ttl_secs.to_be_bytes());
        reply.extend_from_slice(&4u16.to_be_bytes());
        reply.extend_from_slice(&answer.octets());
    }
    Some(reply)
}
