//! Push-button WPS.
//!
//! The handshake is the one operation in the core that blocks the scheduler.
//! It only runs when the user asks for it, and the driver bounds it to its
//! handshake window.

use super::ConnectivityError;
use crate::wifi::{RadioMode, WifiDriver};
use log::{info, warn};
use std::thread;
use std::time::Duration;

/// Pause between leaving the current network and starting the handshake.
pub const WPS_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Network negotiated by a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub ssid: String,
}

/// Runs WPS handshakes.
#[derive(Debug, Clone)]
pub struct WpsManager {
    settle_delay: Duration,
}

impl WpsManager {
    pub fn new() -> Self {
        Self {
            settle_delay: WPS_SETTLE_DELAY,
        }
    }

    /// Override the settle pause (tests use zero).
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Leave the current network, switch to station mode and run one
    /// handshake. Blocks until the driver returns.
    pub fn start_wps<D: WifiDriver>(
        &self,
        driver: &mut D,
    ) -> Result<NetworkIdentity, ConnectivityError> {
        info!("WPS: starting push-button handshake");
        driver.disconnect()?;
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
        driver
            .set_mode(RadioMode::Station)
            .map_err(ConnectivityError::RadioStartFailure)?;

        match driver.begin_wps()? {
            Some(ssid) if !ssid.is_empty() => {
                info!("WPS: negotiated network \"{}\"", ssid);
                Ok(NetworkIdentity { ssid })
            }
            _ => {
                warn!("WPS failed, please try again");
                Err(ConnectivityError::WpsHandshakeFailed)
            }
        }
    }
}

impl Default for WpsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WifiConfig;
    use crate::wifi::{event_channel, DriverCall, SimDriver};

    #[test]
    fn test_handshake_success() {
        let (tx, _rx) = event_channel();
        let network = WifiConfig::new("Living Room", "password123").unwrap();
        let mut driver = SimDriver::new(tx).with_wps_network(network);
        let wps = WpsManager::new().with_settle_delay(Duration::ZERO);

        let identity = wps.start_wps(&mut driver).unwrap();
        assert_eq!(identity.ssid, "Living Room");
        assert_eq!(
            driver.calls(),
            &[
                DriverCall::Disconnect,
                DriverCall::SetMode(RadioMode::Station),
                DriverCall::BeginWps,
            ]
        );
        assert_eq!(driver.stored_ssid().as_deref(), Some("Living Room"));
    }

    #[test]
    fn test_handshake_timeout() {
        let (tx, _rx) = event_channel();
        let mut driver = SimDriver::new(tx);
        let wps = WpsManager::new().with_settle_delay(Duration::ZERO);

        assert!(matches!(
            wps.start_wps(&mut driver),
            Err(ConnectivityError::WpsHandshakeFailed)
        ));
        assert_eq!(driver.mode(), RadioMode::Station);
    }

    #[test]
    fn test_default_settle_delay() {
        assert_eq!(WpsManager::default().settle_delay, WPS_SETTLE_DELAY);
    }
}
