//! Local control-plane RPC: a world-writable `AF_UNIX/SOCK_DGRAM` socket
//! accepting `enable`/`disable`/`get` commands from the orchestrator.
//!
//! Each datagram is handed to a freshly spawned task, matching
//! `original_source/python_neutron_pd_driver/utils.py`'s
//! `new_daemon_thread` one-for-one: a slow `get` response never blocks
//! the next `enable`/`disable`.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UnixDatagram;
use tracing::{info, warn};

use crate::config::CONTROL_PATH;
use crate::registry::Registry;

const MAX_DATAGRAM: usize = 1024;

/// Unlinks any stale control socket left from a prior run and binds a
/// fresh one, world-writable. Failure here is fatal to the agent process
/// (spec §7) — callers should propagate it with `?` before spawning
/// [`serve`], rather than let a bind failure surface only as a logged,
/// silently-exited background task.
pub fn bind(socket_dir: &str) -> Result<UnixDatagram> {
    let path = PathBuf::from(socket_dir).join(CONTROL_PATH);
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to unlink stale control socket {}", path.display()))?;
    }

    let socket = UnixDatagram::bind(&path)
        .with_context(|| format!("failed to bind control socket {}", path.display()))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o777))
        .with_context(|| format!("failed to chmod control socket {}", path.display()))?;

    info!(path = %path.display(), "control socket listening");
    Ok(socket)
}

/// Serves commands on an already-bound control socket until the process
/// exits. Never returns `Err` — recv failures are logged and the loop
/// continues, per the error-handling design (only startup binds are fatal).
pub async fn serve(socket: UnixDatagram, registry: Arc<Registry>, socket_dir: &str) -> Result<()> {
    let socket_dir = socket_dir.to_string();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let len = match socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(err) => {
                warn!(error = %err, "control socket recv failed");
                continue;
            }
        };

        let datagram = buf[..len].to_vec();
        let registry = registry.clone();
        let socket_dir = socket_dir.clone();
        tokio::spawn(async move {
            handle_command(registry, &socket_dir, &datagram).await;
        });
    }
}

async fn handle_command(registry: Arc<Registry>, socket_dir: &str, datagram: &[u8]) {
    let text = String::from_utf8_lossy(datagram);
    let mut fields = text.trim_end_matches(',').split(',');

    match fields.next() {
        Some("enable") => {
            let (Some(subnet_id), Some(owner_pid)) = (fields.next(), fields.next()) else {
                warn!(command = %text, "malformed enable command");
                return;
            };
            match owner_pid.parse::<u32>() {
                Ok(owner_pid) => registry.enable(subnet_id.as_bytes().to_vec(), owner_pid).await,
                Err(_) => warn!(owner_pid, "malformed owner_pid in enable command"),
            }
        }
        Some("disable") => {
            let Some(subnet_id) = fields.next() else {
                warn!(command = %text, "malformed disable command");
                return;
            };
            registry.disable(subnet_id.as_bytes()).await;
        }
        Some("get") => {
            let (Some(subnet_id), Some(response_id)) = (fields.next(), fields.next()) else {
                warn!(command = %text, "malformed get command");
                return;
            };
            let prefix = registry.get(subnet_id.as_bytes()).await;
            send_response(socket_dir, response_id, &prefix).await;
        }
        _ => warn!(command = %text, "unrecognized control command"),
    }
}

async fn send_response(socket_dir: &str, response_id: &str, body: &str) {
    let response_path = PathBuf::from(socket_dir).join(format!("resp_{response_id}"));
    let socket = match UnixDatagram::unbound() {
        Ok(socket) => socket,
        Err(err) => {
            warn!(error = %err, "failed to create response socket");
            return;
        }
    };
    if let Err(err) = socket.send_to(body.as_bytes(), &response_path).await {
        warn!(response_id, error = %err, "failed to deliver get response");
    }
}
