mod config;
mod error;
mod local_ctl;
mod net_check;
mod net_ctl;
mod net_data;
mod os_config;
mod remote_api;
mod setup_ctl;
mod setup_queue;

use std::path::PathBuf;

use log::{error, info, warn};
use tokio::io::AsyncBufReadExt;
use tokio::time::{interval, MissedTickBehavior};

use config::{AppConfig, TimingConfig};
use error::Result;
use net_check::PingValidator;
use net_ctl::{CmdRunner, NetIfCtl, NetIfController, WpaCtl};
use net_data::{JsonFileDb, NetData};
use os_config::OsConfig;
use remote_api::{HttpNetworkApi, NetworkSetupApi};
use setup_ctl::{NetSetupController, RequestOrigin};
use setup_queue::SetupQueue;

/// Fetches pending setups and device actions and queues them.
async fn poll_server(api: &impl NetworkSetupApi, queue: &SetupQueue) {
    match api.get_network_setup().await {
        Ok(Some(request)) => {
            match queue.apply(request, RequestOrigin::Remote).await {
                Ok(outcome) => info!("Remote network setup finished: {:?}", outcome),
                Err(e) => error!("Failed to apply remote network setup, error: {}", e),
            }
        }
        Ok(None) => {}
        Err(e) => warn!("Failed to fetch network setup, error: {}", e),
    }

    match api.get_device_action().await {
        Ok(Some(action)) => match queue.device_action(action).await {
            Ok(outcome) => info!("Device action finished: {:?}", outcome),
            Err(e) => error!("Failed to handle device action, error: {}", e),
        },
        Ok(None) => {}
        Err(e) => warn!("Failed to fetch device action, error: {}", e),
    }

    match api.get_restart_action().await {
        // restarts are carried out by the player service
        Ok(Some(action)) => info!("Restart action pending: {}", action),
        Ok(None) => {}
        Err(e) => warn!("Failed to fetch restart action, error: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    info!("Starting network setup");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    //init the interface controller---------
    let wpa_ctl = WpaCtl::new(
        config.paths.wpa_ctrl_dir.clone(),
        &config.device.wifi_interface,
    );
    let net_if = NetIfController::new(CmdRunner, wpa_ctl, &config.device.wifi_interface)
        .with_scan_timings(
            TimingConfig::secs(config.timings.scan_wait_secs),
            TimingConfig::secs(config.timings.scan_retry_secs),
        );

    let device_id = match &config.device.device_id {
        Some(device_id) => device_id.clone(),
        None => net_if.mac_address(&config.device.eth_interface).await?,
    };
    info!("Device id: {}", device_id);

    //init the remote api---------
    let api = HttpNetworkApi::new(&config.api, &device_id)?;

    //init the setup workflows------
    let store = NetData::new(JsonFileDb::open_from(&config.paths.connections_file));
    let os_config = OsConfig::new(config.paths.clone(), config.supplicant.clone());
    let validator = PingValidator::new(CmdRunner, config.probe.clone());
    let controller = NetSetupController::new(
        store,
        os_config,
        net_if,
        validator,
        api.clone(),
        config.device.clone(),
        config.timings.clone(),
    );
    let queue = SetupQueue::new(controller);

    match queue.boot_checkup().await {
        Ok(outcome) => info!("Boot check-up finished: {:?}", outcome),
        Err(e) => error!("Boot check-up failed, error: {}", e),
    }
    match queue.sync().await {
        Ok(outcome) => info!("Network sync finished: {:?}", outcome),
        Err(e) => error!("Network sync failed, error: {}", e),
    }

    let mut ticker = interval(TimingConfig::secs(config.api.poll_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    //local UI commands, one JSON line each
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_server(&api, &queue).await;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    match local_ctl::handle_line(&queue, &line).await {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => error!("Failed to answer local command, error: {}", e),
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!("Local command input closed");
                    stdin_open = false;
                }
                Err(e) => {
                    error!("Failed to read local command, error: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping network setup");
                break;
            }
        }
    }

    Ok(())
}
