//! Station credentials in NVS.
//!
//! The ESP-IDF WiFi driver keeps its own copy of the last configuration, but
//! WPS and explicit joins go through here as well so the network survives a
//! driver reset or a firmware update that changes the driver's layout.

use crate::config::{WifiConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_sys::EspError;
use log::warn;

const NVS_NAMESPACE: &str = "gbs_wifi";
const NVS_KEY: &str = "station";

/// `[ssid_len][ssid][password_len][password]`
const MAX_RECORD_LEN: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN;

/// Open the credentials namespace on the default partition.
pub fn init_nvs(partition: EspDefaultNvsPartition) -> Result<EspNvs<NvsDefault>, EspError> {
    EspNvs::new(partition, NVS_NAMESPACE, true)
}

/// Stored credentials, `None` if absent or unreadable.
pub fn load_wifi_config(nvs: &EspNvs<NvsDefault>) -> Option<WifiConfig> {
    let mut buf = [0u8; MAX_RECORD_LEN];
    let bytes = nvs.get_raw(NVS_KEY, &mut buf).ok()??;
    match WifiConfig::from_bytes(bytes) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("discarding stored network: {}", e);
            None
        }
    }
}

/// Store credentials, replacing any previous network.
pub fn save_wifi_config(nvs: &mut EspNvs<NvsDefault>, config: &WifiConfig) -> Result<(), EspError> {
    nvs.set_raw(NVS_KEY, &config.to_bytes())?;
    Ok(())
}
