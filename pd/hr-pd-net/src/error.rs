use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind DHCPv6 client socket: {0}")]
    Bind(#[source] std::io::Error),

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("send timed out after {0:?}")]
    SendTimeout(std::time::Duration),
}
