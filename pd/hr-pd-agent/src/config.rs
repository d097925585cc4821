//! Agent configuration, loaded from a TOML file at startup.
//!
//! Grounded on `hr-agent::config::AgentConfig::load` (and the JSON-flavored
//! sibling in `rust-dns-dhcp::config::Config::load_from_file`) for the
//! read-then-parse-with-context shape; this crate uses `toml` rather than
//! `serde_json` because the config is a small, hand-edited file, not a
//! persisted runtime snapshot.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PdAgentConfig {
    /// Directory for the control socket and per-response sockets.
    #[serde(default = "default_pd_socket_loc")]
    pub pd_socket_loc: String,

    /// Physical interface to bind the IPv6 client socket to. Empty means
    /// "let the kernel pick based on routing", matching the source's
    /// default when no interface is configured.
    #[serde(default)]
    pub pd_interface: String,

    /// Directory holding persisted `subnet_<id>` files. Required: there is
    /// no sane default for where tenant subnet state should live.
    pub pd_confs: String,
}

fn default_pd_socket_loc() -> String {
    "/tmp".to_string()
}

pub const CONTROL_PATH: &str = "dhcp_pd";

impl PdAgentConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {path}"))?;
        let config: PdAgentConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config from {path}"))?;
        Ok(config)
    }
}
