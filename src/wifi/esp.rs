//! ESP-IDF WiFi driver.
//!
//! Wraps `EspWifi` behind [`WifiDriver`]. Association and DHCP results come
//! from system event loop subscriptions, which only post into the event
//! queue. Joins use the non-blocking driver calls; only WPS blocks.

use super::events::{EventSender, PeerMac, RawDriverEvent};
use super::storage::{load_wifi_config, save_wifi_config};
use super::{AccessPointConfig, DriverError, RadioMode, RadioSettings, WifiDriver};
use crate::config::WifiConfig;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::ipv4::{self, Mask, RouterConfiguration, Subnet};
use esp_idf_svc::netif::{EspNetif, IpEvent, NetifConfiguration};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
    EspWifi, WifiEvent, WpsConfig, WpsFactoryInfo, WpsStatus, WpsType,
};
use esp_idf_sys::{esp, EspError};
use log::{info, warn};
use std::net::Ipv4Addr;

/// WPS device description.
const WPS_FACTORY_INFO: WpsFactoryInfo<'static> = WpsFactoryInfo {
    manufacturer: "gbscontrol",
    model_number: "1",
    model_name: "gbscontrol",
    device_name: "gbscontrol",
};

pub struct EspWifiDriver {
    wifi: BlockingWifi<EspWifi<'static>>,
    nvs: EspNvs<NvsDefault>,
    events: EventSender,
    mode: RadioMode,
    settings: Option<RadioSettings>,
    station: Option<ClientConfiguration>,
    access_point: Option<AccessPointConfiguration>,
    ap_address: Option<Ipv4Addr>,
    _wifi_events: EspSubscription<'static, System>,
    _ip_events: EspSubscription<'static, System>,
}

impl EspWifiDriver {
    /// Take the modem and subscribe to WiFi and IP events.
    ///
    /// A network stored in `nvs` becomes the station configuration.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        partition: EspDefaultNvsPartition,
        nvs: EspNvs<NvsDefault>,
        events: EventSender,
    ) -> Result<Self, EspError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(partition))?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop.clone())?;

        let tx = events.clone();
        let wifi_events = sysloop.subscribe::<WifiEvent, _>(move |event| {
            let raw = match event {
                WifiEvent::StaConnected(_) => RawDriverEvent::StaConnected,
                WifiEvent::StaDisconnected(e) => RawDriverEvent::StaDisconnected {
                    reason: Some(e.reason()),
                },
                WifiEvent::ApStaConnected(e) => RawDriverEvent::ApStaConnected {
                    mac: PeerMac(e.mac()),
                    aid: e.aid(),
                },
                WifiEvent::ApStaDisconnected(e) => RawDriverEvent::ApStaDisconnected {
                    mac: PeerMac(e.mac()),
                    aid: e.aid(),
                },
                _ => return,
            };
            tx.post(raw);
        })?;

        let tx = events.clone();
        let ip_events = sysloop.subscribe::<IpEvent, _>(move |event| {
            if let IpEvent::DhcpIpAssigned(assignment) = event {
                tx.post(RawDriverEvent::StaGotIp(assignment.ip()));
            }
        })?;

        let station = load_wifi_config(&nvs).and_then(|c| client_configuration(&c).ok());

        Ok(Self {
            wifi,
            nvs,
            events,
            mode: RadioMode::Off,
            settings: None,
            station,
            access_point: None,
            ap_address: None,
            _wifi_events: wifi_events,
            _ip_events: ip_events,
        })
    }

    /// Driver configuration for `mode`. `None` for an access point mode
    /// before the access point has been configured.
    fn configuration(&self, mode: RadioMode) -> Option<Configuration> {
        let station = || self.station.clone().unwrap_or_default();
        Some(match mode {
            RadioMode::Off => Configuration::None,
            RadioMode::Station => Configuration::Client(station()),
            RadioMode::AccessPoint => Configuration::AccessPoint(self.access_point.clone()?),
            RadioMode::Mixed => Configuration::Mixed(station(), self.access_point.clone()?),
        })
    }

    /// Apply the configuration for `mode` and make sure the radio runs.
    fn run(&mut self, mode: RadioMode) -> Result<(), DriverError> {
        let configuration = self
            .configuration(mode)
            .ok_or_else(|| DriverError::Rejected("access point not configured".into()))?;
        self.wifi.wifi_mut().set_configuration(&configuration)?;
        if !self.wifi.is_started()? {
            self.wifi.wifi_mut().start()?;
        }
        self.apply_radio_settings();
        if mode != self.mode {
            self.mode = mode;
            // The IDF has no mode-changed event.
            self.events.post(RawDriverEvent::ModeChanged(mode));
        }
        Ok(())
    }

    fn apply_radio_settings(&mut self) {
        let Some(settings) = self.settings.as_ref() else {
            return;
        };
        // quarter-dBm units
        let power = (settings.tx_power_dbm * 4.0) as i8;
        let ps = if settings.power_save {
            esp_idf_sys::wifi_ps_type_t_WIFI_PS_MIN_MODEM
        } else {
            esp_idf_sys::wifi_ps_type_t_WIFI_PS_NONE
        };
        // SAFETY: plain driver setters, valid once the radio is started.
        let result = unsafe {
            esp!(esp_idf_sys::esp_wifi_set_max_tx_power(power))
                .and_then(|()| esp!(esp_idf_sys::esp_wifi_set_ps(ps)))
        };
        if let Err(e) = result {
            warn!("radio settings not applied: {:?}", e);
        }
    }

    fn configure_ap_netif(&mut self, config: &AccessPointConfig) -> Result<(), EspError> {
        if self.ap_address == Some(config.address) {
            return Ok(());
        }
        let prefix = u32::from(config.netmask).count_ones() as u8;
        let netif = EspNetif::new_with_conf(&NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(RouterConfiguration {
                subnet: Subnet {
                    gateway: config.gateway,
                    mask: Mask(prefix),
                },
                dhcp_enabled: true,
                dns: Some(config.address),
                ..Default::default()
            })),
            ..NetifConfiguration::wifi_default_router()
        })?;
        self.wifi.wifi_mut().swap_netif_ap(netif)?;
        self.ap_address = Some(config.address);
        Ok(())
    }
}

fn client_configuration(config: &WifiConfig) -> Result<ClientConfiguration, DriverError> {
    Ok(ClientConfiguration {
        ssid: config
            .ssid
            .as_str()
            .try_into()
            .map_err(|_| DriverError::InvalidSsid)?,
        password: config
            .password
            .as_str()
            .try_into()
            .map_err(|_| DriverError::InvalidPassword)?,
        auth_method: if config.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    })
}

impl WifiDriver for EspWifiDriver {
    fn apply_settings(&mut self, settings: &RadioSettings) -> Result<(), DriverError> {
        self.wifi
            .wifi_mut()
            .sta_netif_mut()
            .set_hostname(&settings.hostname)?;
        // ESP-IDF never reconnects on its own; nothing to do for auto_reconnect.
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), DriverError> {
        if mode == self.mode {
            return Ok(());
        }
        if mode != RadioMode::Off {
            return self.run(mode);
        }
        self.wifi.wifi_mut().stop()?;
        self.mode = mode;
        self.events.post(RawDriverEvent::ModeChanged(mode));
        Ok(())
    }

    fn begin_station(&mut self, credentials: Option<&WifiConfig>) -> Result<(), DriverError> {
        if let Some(credentials) = credentials {
            self.station = Some(client_configuration(credentials)?);
            if let Err(e) = save_wifi_config(&mut self.nvs, credentials) {
                warn!("could not store network: {:?}", e);
            }
        }
        let mode = if self.mode.has_station() {
            self.mode
        } else {
            RadioMode::Station
        };
        self.run(mode)?;
        self.wifi.wifi_mut().connect()?;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), DriverError> {
        self.wifi.wifi_mut().connect()?;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DriverError> {
        if self.wifi.is_started()? {
            self.wifi.wifi_mut().disconnect()?;
        }
        Ok(())
    }

    fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError> {
        self.configure_ap_netif(config)?;
        self.access_point = Some(AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| DriverError::InvalidSsid)?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| DriverError::InvalidPassword)?,
            auth_method: if config.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            channel: config.channel,
            ssid_hidden: config.hidden,
            max_connections: u16::from(config.max_clients),
            ..Default::default()
        });
        self.run(RadioMode::AccessPoint)
    }

    fn begin_wps(&mut self) -> Result<Option<String>, DriverError> {
        let config = WpsConfig {
            wps_type: WpsType::Pbc,
            factory_info: WPS_FACTORY_INFO,
        };
        match self.wifi.start_wps(&config)? {
            WpsStatus::SuccessConnected => {
                let Configuration::Client(client) = self.wifi.get_configuration()? else {
                    return Ok(None);
                };
                let ssid = client.ssid.to_string();
                match WifiConfig::new(ssid.clone(), client.password.to_string()) {
                    Ok(credentials) => {
                        if let Err(e) = save_wifi_config(&mut self.nvs, &credentials) {
                            warn!("could not store network: {:?}", e);
                        }
                    }
                    Err(e) => warn!("WPS credentials not stored: {}", e),
                }
                self.station = Some(client);
                Ok(Some(ssid))
            }
            status => {
                info!("WPS ended: {:?}", status);
                Ok(None)
            }
        }
    }

    fn stored_ssid(&self) -> Option<String> {
        self.station
            .as_ref()
            .map(|c| c.ssid.to_string())
            .filter(|ssid| !ssid.is_empty())
    }

    fn rssi(&self) -> Option<i8> {
        if !self.mode.has_station() {
            return None;
        }
        // SAFETY: the record is plain data filled in by the driver.
        unsafe {
            let mut record: esp_idf_sys::wifi_ap_record_t = std::mem::zeroed();
            esp!(esp_idf_sys::esp_wifi_sta_get_ap_info(&mut record))
                .ok()
                .map(|()| record.rssi)
        }
    }

    fn power_off(&mut self) -> Result<(), DriverError> {
        if self.mode.has_station() && self.wifi.is_connected()? {
            self.wifi.wifi_mut().disconnect()?;
        }
        self.set_mode(RadioMode::Off)
    }
}
