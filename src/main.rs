//! GBS connectivity firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Err(e) = firmware::run() {
        log::error!("connectivity core stopped: {:?}", e);
    }
}

#[cfg(feature = "esp32")]
mod firmware {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_sys::EspError;
    use gbs_netcore::config::{NetConfig, RuntimeOptions, UserOptions};
    use gbs_netcore::network::{EspMdnsResponder, LinkStats, StatusServer, DEFAULT_STATUS_PORT};
    use gbs_netcore::platform::free_heap_bytes;
    use gbs_netcore::status::EspWsSink;
    use gbs_netcore::wifi::{event_channel, init_nvs, EspWifiDriver};
    use gbs_netcore::NetCore;
    use log::{info, warn};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Main loop period.
    const TICK: Duration = Duration::from_millis(10);

    /// Bring up the radio, HTTP server and core, then tick forever.
    pub fn run() -> Result<(), EspError> {
        let config = NetConfig::default();
        info!("=== {} starting ===", config.hostname);

        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let partition = EspDefaultNvsPartition::take()?;
        let nvs = init_nvs(partition.clone())?;

        let (tx, rx) = event_channel();
        let driver = EspWifiDriver::new(peripherals.modem, sysloop, partition, nvs, tx)?;

        let mut http = EspHttpServer::new(&HttpConfiguration::default())?;
        let sink = EspWsSink::new();
        sink.register(&mut http, "/ws")?;

        let stats = Arc::new(LinkStats::new());
        let _status_server = StatusServer::start(None, DEFAULT_STATUS_PORT, stats.clone())
            .map_err(|e| warn!("status endpoint unavailable: {}", e))
            .ok();

        let now = Instant::now();
        let mut core = NetCore::new(driver, EspMdnsResponder::new(), sink, rx, config, now)
            .with_stats(stats);
        if let Err(e) = core.start(now) {
            warn!("{}", e);
        }

        // Video settings live elsewhere; the UI server is ours and already up.
        let user = UserOptions::default();
        let runtime = RuntimeOptions {
            web_server_enabled: true,
            web_server_started: true,
            ..Default::default()
        };

        loop {
            core.tick(Instant::now(), &user, &runtime, false, free_heap_bytes());
            std::thread::sleep(TICK);
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-node' for a simulated device.");
}
