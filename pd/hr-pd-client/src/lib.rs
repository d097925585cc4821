//! Thin in-orchestrator adapter that speaks the agent's control RPC.
//!
//! Grounded on `original_source/python_neutron_pd_driver/driver.py`'s
//! `PDDriver`: `enable`/`disable` are fire-and-forget datagrams,
//! `get_prefix` binds a private response socket and blocks with a 3s
//! timeout.

pub mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixDatagram;

pub use error::PdClientError;

const GET_PREFIX_TIMEOUT: Duration = Duration::from_secs(3);

/// Speaks the control RPC for one subnet on behalf of the orchestrator
/// process. Cheap to construct; holds no open sockets between calls.
pub struct PdClient {
    control_path: PathBuf,
    socket_dir: PathBuf,
    subnet_id: String,
    pid: u32,
}

impl PdClient {
    pub fn new(socket_dir: impl AsRef<Path>, control_file: &str, subnet_id: impl Into<String>, pid: u32) -> Self {
        let socket_dir = socket_dir.as_ref().to_path_buf();
        PdClient {
            control_path: socket_dir.join(control_file),
            socket_dir,
            subnet_id: subnet_id.into(),
            pid,
        }
    }

    async fn send_command(&self, command: &str, misc: &str) -> Result<(), PdClientError> {
        let socket = UnixDatagram::unbound()?;
        let datagram = format!("{command},{},{misc},", self.subnet_id);
        socket.send_to(datagram.as_bytes(), &self.control_path).await?;
        Ok(())
    }

    /// Fire-and-forget: requests the agent start (or re-notify) a session
    /// for this subnet.
    pub async fn enable(&self) -> Result<(), PdClientError> {
        self.send_command("enable", &self.pid.to_string()).await
    }

    /// Fire-and-forget: requests the agent release and remove this
    /// subnet's session.
    pub async fn disable(&self) -> Result<(), PdClientError> {
        self.send_command("disable", &self.pid.to_string()).await
    }

    /// Blocks up to 3 seconds for the agent's response. Returns the
    /// rendered `"<prefix>/<len>"` string, or `PdClientError::NotRunning`
    /// if the agent has no session for this subnet.
    pub async fn get_prefix(&self) -> Result<String, PdClientError> {
        let response_id = uuid::Uuid::new_v4();
        let response_path = self.socket_dir.join(format!("resp_{response_id}"));

        let response_socket = UnixDatagram::bind(&response_path)?;
        self.send_command("get", &response_id.to_string()).await?;

        let result = tokio::time::timeout(GET_PREFIX_TIMEOUT, async {
            let mut buf = vec![0u8; 1024];
            let len = response_socket.recv(&mut buf).await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf[..len]).into_owned())
        })
        .await;

        let _ = std::fs::remove_file(&response_path);

        match result {
            Ok(Ok(body)) if body == "NOT_RUNNING" => Err(PdClientError::NotRunning),
            Ok(Ok(body)) => Ok(body),
            Ok(Err(err)) => Err(PdClientError::Io(err)),
            Err(_) => Err(PdClientError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixDatagram as ServerSocket;

    #[tokio::test]
    async fn enable_emits_exact_s6_datagram() {
        let dir = std::env::temp_dir().join(format!("hr-pd-client-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let control_path = dir.join("dhcp_pd_enable_test");
        let _ = std::fs::remove_file(&control_path);
        let server = ServerSocket::bind(&control_path).unwrap();

        let client = PdClient::new(&dir, "dhcp_pd_enable_test", "subnet", 12345);
        client.enable().await.unwrap();

        let mut buf = vec![0u8; 64];
        let len = server.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"enable,subnet,12345,");

        let _ = std::fs::remove_file(&control_path);
    }

    #[tokio::test]
    async fn get_prefix_emits_command_with_response_id() {
        let dir = std::env::temp_dir().join(format!("hr-pd-client-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let control_path = dir.join("dhcp_pd_get_test");
        let _ = std::fs::remove_file(&control_path);
        let server = ServerSocket::bind(&control_path).unwrap();

        let client = PdClient::new(&dir, "dhcp_pd_get_test", "subnet", 1);

        let responder = tokio::spawn({
            let dir = dir.clone();
            async move {
                let mut buf = vec![0u8; 128];
                let len = server.recv(&mut buf).await.unwrap();
                let text = String::from_utf8_lossy(&buf[..len]).into_owned();
                assert!(text.starts_with("get,subnet,"));
                let response_id = text
                    .trim_end_matches(',')
                    .split(',')
                    .nth(2)
                    .unwrap()
                    .to_string();
                let response_path = dir.join(format!("resp_{response_id}"));
                let client_socket = ServerSocket::unbound().unwrap();
                client_socket
                    .send_to(b"2001:db8::/64", &response_path)
                    .await
                    .unwrap();
            }
        });

        let prefix = client.get_prefix().await.unwrap();
        assert_eq!(prefix, "2001:db8::/64");
        responder.await.unwrap();

        let _ = std::fs::remove_file(&control_path);
    }

    #[tokio::test]
    async fn not_running_maps_to_error() {
        let dir = std::env::temp_dir().join(format!("hr-pd-client-test3-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let control_path = dir.join("dhcp_pd_notrunning_test");
        let _ = std::fs::remove_file(&control_path);
        let server = ServerSocket::bind(&control_path).unwrap();

        let client = PdClient::new(&dir, "dhcp_pd_notrunning_test", "subnet", 1);

        let responder = tokio::spawn({
            let dir = dir.clone();
            async move {
                let mut buf = vec![0u8; 128];
                let len = server.recv(&mut buf).await.unwrap();
                let text = String::from_utf8_lossy(&buf[..len]).into_owned();
                let response_id = text
                    .trim_end_matches(',')
                    .split(',')
                    .nth(2)
                    .unwrap()
                    .to_string();
                let response_path = dir.join(format!("resp_{response_id}"));
                let client_socket = ServerSocket::unbound().unwrap();
                client_socket
                    .send_to(b"NOT_RUNNING", &response_path)
                    .await
                    .unwrap();
            }
        });

        let result = client.get_prefix().await;
        assert!(matches!(result, Err(PdClientError::NotRunning)));
        responder.await.unwrap();

        let _ = std::fs::remove_file(&control_path);
    }
}
