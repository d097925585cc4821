mod config;
mod control;
mod registry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use config::PdAgentConfig;
use hr_pd_net::Demultiplexer;
use registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hr_pd_agent=debug".parse().unwrap()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .context("usage: hr-pd-agent <config-path>")?;
    let config = PdAgentConfig::load(&config_path)?;

    info!(
        pd_socket_loc = config.pd_socket_loc,
        pd_interface = config.pd_interface,
        pd_confs = config.pd_confs,
        "PD agent starting"
    );

    // Binding the client socket is one of two startup failures that's
    // fatal to the process, per the error-handling design (the other is
    // the control socket bind below).
    let socket = hr_pd_net::open_client_socket(&config.pd_interface)
        .context("failed to bind DHCPv6 client socket")?;
    let socket = Arc::new(socket);
    let demux = Demultiplexer::spawn(socket.clone());

    let registry = Arc::new(Registry::new(socket, demux, config.pd_confs.clone()));
    registry.load_persisted().await;

    // Binding the control socket is the other startup failure that's
    // fatal (spec §7): done here, synchronously, rather than inside the
    // spawned server task, so a bind failure actually exits the process
    // instead of just logging from a task nobody awaits for errors.
    let control_socket = control::bind(&config.pd_socket_loc)
        .context("failed to bind control socket")?;

    let control_registry = registry.clone();
    let socket_dir = config.pd_socket_loc.clone();
    let control_task = tokio::spawn(async move {
        if let Err(err) = control::serve(control_socket, control_registry, &socket_dir).await {
            error!(error = %err, "control socket server exited");
        }
    });

    info!("PD agent running, awaiting SIGINT");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
        }
        result = control_task => {
            if let Err(err) = result {
                error!(error = %err, "control socket task panicked");
            }
        }
    }

    Ok(())
}
