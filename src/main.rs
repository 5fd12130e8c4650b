pub mod cli;
pub mod config;
pub mod http;
pub mod mqtt;
pub mod relay;
pub mod validation;

use clap::Parser;
use cli::Cli;
use color_eyre::{eyre::eyre, Result};
use config::RelayConfig;
use mqtt::mqtt_handler::{resolve_broker, MQTTHandle};
use relay::RelayHandler;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    let config = match RelayConfig::load(cli.config.as_deref(), cli.log.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            setup_logging(Level::ERROR);
            error!("Configuration error: {}", e);
            return Err(eyre!("Configuration error: {}", e));
        }
    };
    setup_logging(config.level());

    info!(
        "Relaying http://{} to mqtt://{} ({} whitelisted topics, prefix {:?})",
        config.http.bind_addr(),
        config.mqtt.broker_addr(),
        config.topics.whitelist.len(),
        config.topics.prefix
    );

    let broker = resolve_broker(&config.mqtt).await.map_err(|e| {
        error!("{}", e);
        eyre!("{}", e)
    })?;
    info!("MQTT broker resolved to {}", broker);

    let shutdown = CancellationToken::new();
    let (mqtt_handle, mqtt_task) = MQTTHandle::spawn(config.mqtt.clone(), shutdown.clone());
    let handler = RelayHandler::new(config.policy(), mqtt_handle.clone());

    let listener = match TcpListener::bind(config.http.bind_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.http.bind_addr(), e);
            stop_broker_task(&shutdown, mqtt_task).await;
            return Err(eyre!("Failed to bind {}: {}", config.http.bind_addr(), e));
        }
    };

    tokio::spawn(wait_for_stop_signal(shutdown.clone()));

    let served = http::serve(listener, http::router(handler), shutdown.clone()).await;
    stop_broker_task(&shutdown, mqtt_task).await;

    let status = mqtt_handle.status();
    info!(
        "Server stopped: {} published, {} failed, {} reconnect attempts",
        status.messages_sent, status.publish_failures, status.reconnect_attempts
    );

    served.map_err(|e| eyre!("HTTP server failed: {}", e))
}

/// Cancels the broker actor and waits for it; false if it panicked or was
/// aborted
async fn stop_broker_task(shutdown: &CancellationToken, task: JoinHandle<()>) -> bool {
    shutdown.cancel();
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("MQTT task ended abnormally: {}", e);
            false
        }
    }
}

async fn wait_for_stop_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Server stop request");
    shutdown.cancel();
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stopping_reports_a_clean_broker_task() {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { token.cancelled().await });

        assert!(stop_broker_task(&shutdown, task).await);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn stopping_reports_a_panicked_broker_task() {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(async { panic!("actor failed") });

        assert!(!stop_broker_task(&shutdown, task).await);
    }
}
