//! Simulated device for development.
//!
//! Runs the full connectivity core on the host against the simulated radio:
//! - status frames go to a recording sink with a configurable client count
//! - counters are served at http://localhost:8080/status
//! - the captive portal DNS responder binds UDP 53 (needs privileges; it is
//!   skipped with a warning otherwise)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-node                           # no stored network: access point
//! cargo run --bin host-node -- --ssid Studio --password password123 --clients 1
//! ```

use gbs_netcore::config::{NetConfig, RuntimeOptions, UserOptions, WifiConfig};
use gbs_netcore::network::{HostMdns, LinkStats, StatusServer, DEFAULT_STATUS_PORT};
use gbs_netcore::platform::free_heap_bytes;
use gbs_netcore::status::RecordingSink;
use gbs_netcore::wifi::{event_channel, SimDriver};
use gbs_netcore::NetCore;
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Scheduler period.
const TICK: Duration = Duration::from_millis(10);

/// Address handed to the simulated station.
const SIM_LEASE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

#[derive(Debug, Default)]
struct Args {
    ssid: Option<String>,
    password: String,
    clients: usize,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{} needs a value", flag));
        match flag.as_str() {
            "--ssid" => args.ssid = Some(value()?),
            "--password" => args.password = value()?,
            "--clients" => {
                args.clients = value()?
                    .parse()
                    .map_err(|e| format!("--clients: {}", e))?
            }
            other => return Err(format!("unknown argument {}", other)),
        }
    }
    Ok(args)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            error!("{}", e);
            error!("usage: host-node [--ssid NAME [--password PW]] [--clients N]");
            std::process::exit(2);
        }
    };

    let config = NetConfig::default();
    info!("=== {} host node starting ===", config.hostname);

    let (tx, rx) = event_channel();
    let mut driver = SimDriver::new(tx).with_lease(SIM_LEASE);
    if let Some(ssid) = args.ssid {
        match WifiConfig::new(ssid, args.password) {
            Ok(network) => driver = driver.with_stored_network(network),
            Err(e) => {
                error!("invalid network: {}", e);
                std::process::exit(2);
            }
        }
    }

    let stats = Arc::new(LinkStats::new());
    let _status_server = match StatusServer::start(None, DEFAULT_STATUS_PORT, stats.clone()) {
        Ok(server) => {
            info!(
                "Status at http://localhost:{}/status",
                DEFAULT_STATUS_PORT
            );
            Some(server)
        }
        Err(e) => {
            warn!("Failed to start status server: {}", e);
            None
        }
    };

    let start = Instant::now();
    let sink = RecordingSink::with_clients(args.clients).with_history(1);
    let mut core =
        NetCore::new(driver, HostMdns::new(), sink, rx, config, start).with_stats(stats);
    if let Err(e) = core.start(start) {
        error!("{}", e);
    }

    let user = UserOptions::default();
    let runtime = RuntimeOptions {
        web_server_enabled: true,
        web_server_started: true,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let scheduler = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = loop_cancel.cancelled() => break,
                _ = interval.tick() => {
                    core.tick(Instant::now(), &user, &runtime, false, free_heap_bytes());
                }
            }
        }
        info!(
            "{} frames sent, final state {}",
            core.sink().frames_sent(),
            core.state()
        );
    });

    info!("Running (Ctrl+C to exit)...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutting down...");
    cancel.cancel();
    if let Err(e) = scheduler.await {
        error!("Scheduler task error: {}", e);
    }
}
