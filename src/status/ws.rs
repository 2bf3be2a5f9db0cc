//! WebSocket status sink on the ESP-IDF HTTP server.

use super::StatusSink;
use esp_idf_svc::http::server::ws::EspHttpWsDetachedSender;
use esp_idf_svc::http::server::{EspHttpServer, EspHttpWsConnection};
use esp_idf_svc::ws::FrameType;
use esp_idf_sys::EspError;
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};

/// Broadcasts to every client of one WebSocket endpoint.
///
/// The HTTP server task registers clients; the scheduler sends. Closed
/// clients are pruned before each operation.
#[derive(Clone, Default)]
pub struct EspWsSink {
    clients: Arc<Mutex<Vec<EspHttpWsDetachedSender>>>,
}

impl EspWsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept WebSocket clients on `uri`.
    pub fn register(&self, server: &mut EspHttpServer<'static>, uri: &str) -> Result<(), EspError> {
        let clients = self.clients.clone();
        server.ws_handler(uri, move |ws: &mut EspHttpWsConnection| {
            if ws.is_new() {
                let sender = ws.create_detached_sender()?;
                lock(&clients).push(sender);
                debug!("status client subscribed");
            }
            Ok::<(), EspError>(())
        })?;
        Ok(())
    }

    fn live(&self) -> MutexGuard<'_, Vec<EspHttpWsDetachedSender>> {
        let mut clients = lock(&self.clients);
        clients.retain(|c| !c.is_closed());
        clients
    }

    fn send_all(&self, frame_type: FrameType, data: &[u8]) {
        for client in self.live().iter_mut() {
            if let Err(e) = client.send(frame_type, data) {
                warn!("status send failed: {:?}", e);
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StatusSink for EspWsSink {
    fn connected_clients(&self) -> usize {
        self.live().len()
    }

    fn broadcast_ping(&mut self) {
        self.send_all(FrameType::Ping, &[]);
    }

    fn broadcast_binary(&mut self, frame: &[u8]) {
        self.send_all(FrameType::Binary(false), frame);
    }

    fn disconnect_all(&mut self) {
        let mut clients = lock(&self.clients);
        for client in clients.iter_mut() {
            if let Err(e) = client.send(FrameType::Close, &[]) {
                debug!("status client already gone: {:?}", e);
            }
        }
        clients.clear();
    }
}
