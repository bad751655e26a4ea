use std::sync::Arc;

use color_eyre::Result;
use device_virtual::api::{self, SharedService};
use device_virtual::config::Config;
use device_virtual::device::{Device, DeviceHandle};
use device_virtual::middleware::{describe_metrics, InstrumentingMiddleware, LoggingMiddleware};
use device_virtual::mqtt::MqttBrokerClient;
use device_virtual::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::load().await?;
    info!(ca_path = %config.device.ca_path.display(), "Configuration loaded");

    let client = MqttBrokerClient::new(config.mqtt.clone());
    info!("MQTT client created");
    let (device_handle, device_worker) = DeviceHandle::spawn(client);

    describe_metrics();
    let service: SharedService = Arc::new(InstrumentingMiddleware::new(LoggingMiddleware::new(
        Device::new(config.device.ca_path.clone(), device_handle.clone()),
    )));

    let app = api::router(service, &config.server.ui_origin())?;
    server::run(app, &config.server).await?;

    if device_handle.is_connected().await {
        info!("Shutting down, closing broker session");
    } else {
        info!("Shutting down");
    }
    device_handle.disconnect().await;
    device_worker.abort();
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("device_virtual=info,tower_http=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
