//! Station credentials.
//!
//! # Example
//!
//! ```
//! use gbs_netcore::config::WifiConfig;
//!
//! let network = WifiConfig::new("HomeNetwork", "hunter2hunter2").unwrap();
//! assert!(!network.is_open());
//! let stored = network.to_bytes();
//! assert_eq!(WifiConfig::from_bytes(&stored).unwrap(), network);
//! ```

use std::fmt;
use std::ops::RangeInclusive;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Longest SSID 802.11 allows.
pub const MAX_SSID_LEN: usize = 32;

/// Longest WPA2 passphrase.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Shortest WPA2 passphrase.
pub const MIN_PASSWORD_LEN: usize = 8;

const SSID_LEN: RangeInclusive<usize> = 1..=MAX_SSID_LEN;
const PASSWORD_LEN: RangeInclusive<usize> = MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN;

/// Network the device joins as a station. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WifiConfig {
    pub ssid: String,
    /// Empty for an open network.
    pub password: String,
}

impl WifiConfig {
    /// Validated credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let network = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        network.validate()?;
        Ok(network)
    }

    /// Credentials of a network without a passphrase.
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(ssid, "")
    }

    /// Check SSID and password lengths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SSID_LEN.contains(&self.ssid.len()) {
            return Err(ConfigError::SsidLength(self.ssid.len()));
        }
        if !self.is_open() && !PASSWORD_LEN.contains(&self.password.len()) {
            return Err(ConfigError::PasswordLength(self.password.len()));
        }
        Ok(())
    }

    /// Whether the network needs no passphrase.
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Storage record: two length-prefixed UTF-8 fields, SSID first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(2 + self.ssid.len() + self.password.len());
        for field in [&self.ssid, &self.password] {
            record.push(field.len() as u8);
            record.extend_from_slice(field.as_bytes());
        }
        record
    }

    /// Parse a record written by [`to_bytes`](Self::to_bytes). Trailing
    /// bytes are ignored.
    pub fn from_bytes(record: &[u8]) -> Result<Self, ConfigError> {
        let (ssid, rest) = take_field(record)?;
        let (password, _) = take_field(rest)?;
        Self::new(ssid, password)
    }
}

fn take_field(bytes: &[u8]) -> Result<(&str, &[u8]), ConfigError> {
    let (&len, rest) = bytes.split_first().ok_or(ConfigError::Truncated)?;
    let len = usize::from(len);
    if rest.len() < len {
        return Err(ConfigError::Truncated);
    }
    let (field, rest) = rest.split_at(len);
    let field = std::str::from_utf8(field).map_err(|_| ConfigError::NotUtf8)?;
    Ok((field, rest))
}

impl fmt::Debug for WifiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.is_open() { "<open>" } else { "<redacted>" };
        f.debug_struct("WifiConfig")
            .field("ssid", &self.ssid)
            .field("password", &password)
            .finish()
    }
}

/// Credentials that cannot be used or stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID length outside 1..=32 bytes.
    SsidLength(usize),
    /// Non-empty password outside 8..=64 bytes.
    PasswordLength(usize),
    /// Stored record ends early.
    Truncated,
    /// Stored record is not UTF-8.
    NotUtf8,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidLength(len) => write!(
                f,
                "SSID must be 1-{} bytes, got {}",
                MAX_SSID_LEN, len
            ),
            Self::PasswordLength(len) => write!(
                f,
                "password must be empty or {}-{} bytes, got {}",
                MIN_PASSWORD_LEN, MAX_PASSWORD_LEN, len
            ),
            Self::Truncated => write!(f, "stored network record is truncated"),
            Self::NotUtf8 => write!(f, "stored network record is not UTF-8"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssid_limits() {
        assert_eq!(
            WifiConfig::new("", "password123"),
            Err(ConfigError::SsidLength(0))
        );
        assert!(WifiConfig::open("x".repeat(32)).is_ok());
        assert_eq!(
            WifiConfig::open("x".repeat(33)),
            Err(ConfigError::SsidLength(33))
        );
    }

    #[test]
    fn test_password_limits() {
        assert_eq!(
            WifiConfig::new("Studio", "1234567"),
            Err(ConfigError::PasswordLength(7))
        );
        assert!(WifiConfig::new("Studio", "12345678").is_ok());
        assert!(WifiConfig::new("Studio", "p".repeat(64)).is_ok());
        assert_eq!(
            WifiConfig::new("Studio", "p".repeat(65)),
            Err(ConfigError::PasswordLength(65))
        );
        assert!(WifiConfig::open("Lobby").unwrap().is_open());
    }

    #[test]
    fn test_record_layout() {
        let network = WifiConfig::new("Studio", "password123").unwrap();
        let record = network.to_bytes();
        assert_eq!(record[0], 6);
        assert_eq!(&record[1..7], b"Studio");
        assert_eq!(record[7], 11);
        assert_eq!(record.len(), 19);

        let open = WifiConfig::open("Lobby").unwrap().to_bytes();
        assert_eq!(open, [5, b'L', b'o', b'b', b'b', b'y', 0]);
        assert!(WifiConfig::from_bytes(&open).unwrap().is_open());
    }

    #[test]
    fn test_damaged_records() {
        assert_eq!(WifiConfig::from_bytes(&[]), Err(ConfigError::Truncated));
        assert_eq!(
            WifiConfig::from_bytes(&[5, b'h', b'e', b'l', b'l']),
            Err(ConfigError::Truncated)
        );
        assert_eq!(
            WifiConfig::from_bytes(&[1, b'x', 8, b'a', b'b']),
            Err(ConfigError::Truncated)
        );
        assert_eq!(
            WifiConfig::from_bytes(&[1, 0xFF, 0]),
            Err(ConfigError::NotUtf8)
        );
        // decodes, then fails validation
        assert_eq!(
            WifiConfig::from_bytes(&[1, b'x', 3, b'a', b'b', b'c']),
            Err(ConfigError::PasswordLength(3))
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let network = WifiConfig::new("Studio", "password123").unwrap();
        let debug = format!("{:?}", network);
        assert!(debug.contains("Studio"));
        assert!(!debug.contains("password123"));
    }
}
