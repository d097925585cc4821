//! Maps subnet-id to a running PD session, persists session identity
//! across restarts, and notifies the owning orchestrator process.
//!
//! The live-connection map and atomic tmp-file-then-rename persistence
//! mirror `hr-registry::state::RegistryState` (`Arc<Mutex<HashMap<..>>>`
//! plus a `persist`/`persist_inner` pair), generalized here to one file
//! per subnet rather than one aggregate JSON blob, since the persisted
//! unit the original agent scans at startup (`agent.py`'s
//! `subnet_<id>` files) is already per-subnet.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use hr_pd_codec::Lease;
use hr_pd_net::Demultiplexer;
use hr_pd_session::{SessionContext, SharedStatus};
#[cfg(test)]
use hr_pd_session::SessionState;

pub type SubnetId = Vec<u8>;

struct SessionHandle {
    owner_pid: u32,
    status: SharedStatus,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// Owns the live session map, the shared transport, and the persisted
/// subnet-directory. Constructed once per agent process in `main`.
pub struct Registry {
    sessions: Mutex<HashMap<SubnetId, SessionHandle>>,
    socket: Arc<UdpSocket>,
    demux: Demultiplexer,
    conf_dir: PathBuf,
}

impl Registry {
    pub fn new(socket: Arc<UdpSocket>, demux: Demultiplexer, conf_dir: impl Into<PathBuf>) -> Self {
        Registry {
            sessions: Mutex::new(HashMap::new()),
            socket,
            demux,
            conf_dir: conf_dir.into(),
        }
    }

    /// Scans `conf_dir` for `subnet_<id>` files and synthesises an
    /// `enable(id, owner_pid)` for each, exactly as
    /// `agent.py::DHCPV6Agent.__init__` does: unreadable files or a
    /// missing directory are logged and skipped, never fatal.
    pub async fn load_persisted(self: &Arc<Self>) {
        let entries = match std::fs::read_dir(&self.conf_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.conf_dir.display(), error = %err, "cannot scan persisted subnet directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(subnet_id) = name.strip_prefix("subnet_") else {
                continue;
            };

            match std::fs::read_to_string(entry.path()) {
                Ok(contents) => match contents.lines().next().and_then(|l| l.trim().parse::<u32>().ok()) {
                    Some(owner_pid) => {
                        info!(subnet_id, owner_pid, "restoring persisted subnet session");
                        self.enable(subnet_id.as_bytes().to_vec(), owner_pid).await;
                    }
                    None => warn!(subnet_id, "persisted subnet file has no valid owner_pid, skipping"),
                },
                Err(err) => {
                    warn!(subnet_id, error = %err, "cannot read persisted subnet file, skipping");
                }
            }
        }
    }

    /// Idempotent. Creates and starts a session if none exists; if one
    /// already exists, immediately re-notifies the orchestrator (SIGHUP)
    /// rather than erroring, matching the control-RPC `enable` contract.
    pub async fn enable(self: &Arc<Self>, subnet_id: SubnetId, owner_pid: u32) {
        let mut sessions = self.sessions.lock().await;

        if sessions.contains_key(&subnet_id) {
            debug!(subnet_id = ?subnet_id, owner_pid, "enable on already-running session, re-notifying");
            notify(owner_pid);
            return;
        }

        if let Err(err) = persist(&self.conf_dir, &subnet_id, owner_pid) {
            warn!(subnet_id = ?subnet_id, error = %err, "failed to persist subnet record");
        }

        let status = SharedStatus::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let notify_owner_pid = owner_pid;

        let ctx = SessionContext {
            subnet_id: subnet_id.clone(),
            socket: self.socket.clone(),
            demux: self.demux.clone(),
            notify: Arc::new(move || notify(notify_owner_pid)),
            status: status.clone(),
        };

        let task = tokio::spawn(hr_pd_session::run(ctx, shutdown_rx));

        sessions.insert(
            subnet_id,
            SessionHandle {
                owner_pid,
                status,
                shutdown: shutdown_tx,
                task,
            },
        );
    }

    /// If a session exists: signals it into RELEASING, removes it from the
    /// registry, and deletes the persisted file. Absent subnet: logged and
    /// ignored — disabling twice is not an error.
    pub async fn disable(&self, subnet_id: &[u8]) {
        let mut sessions = self.sessions.lock().await;
        let Some(handle) = sessions.remove(subnet_id) else {
            debug!(subnet_id = ?subnet_id, "disable on unknown subnet, ignoring");
            return;
        };
        drop(sessions);

        let _ = handle.shutdown.send(true);
        // Drop the JoinHandle without aborting: the task keeps running its
        // own RELEASING → TERMINATED path to completion in the background,
        // detached, so disable doesn't block on the RELEASE round-trip.
        drop(handle.task);

        if let Err(err) = remove_persisted(&self.conf_dir, subnet_id) {
            warn!(subnet_id = ?subnet_id, error = %err, "failed to remove persisted subnet record");
        }
    }

    /// `NOT_RUNNING` for an unknown subnet; otherwise the session's current
    /// prefix string (`::/64` before a lease is bound).
    pub async fn get(&self, subnet_id: &[u8]) -> String {
        let sessions = self.sessions.lock().await;
        match sessions.get(subnet_id) {
            Some(handle) => {
                let (_, lease) = handle.status.snapshot();
                render_lease(lease)
            }
            None => "NOT_RUNNING".to_string(),
        }
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    pub async fn session_state(&self, subnet_id: &[u8]) -> Option<SessionState> {
        self.sessions
            .lock()
            .await
            .get(subnet_id)
            .map(|h| h.status.snapshot().0)
    }
}

fn render_lease(lease: Lease) -> String {
    lease.to_string()
}

fn notify(owner_pid: u32) {
    match kill(Pid::from_raw(owner_pid as i32), Signal::SIGHUP) {
        Ok(()) => debug!(owner_pid, "sent SIGHUP to orchestrator"),
        Err(err) => warn!(owner_pid, error = %err, "failed to signal orchestrator"),
    }
}

fn persisted_path(conf_dir: &Path, subnet_id: &[u8]) -> PathBuf {
    conf_dir.join(format!("subnet_{}", String::from_utf8_lossy(subnet_id)))
}

fn persist(conf_dir: &Path, subnet_id: &[u8], owner_pid: u32) -> Result<()> {
    let path = persisted_path(conf_dir, subnet_id);
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, owner_pid.to_string())
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, &path)
        .with_context(|| format!("failed to rename into {}", path.display()))?;
    Ok(())
}

fn remove_persisted(conf_dir: &Path, subnet_id: &[u8]) -> Result<()> {
    let path = persisted_path(conf_dir, subnet_id);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}
