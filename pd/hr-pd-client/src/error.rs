use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdClientError {
    #[error("control socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("get_prefix timed out waiting for a response")]
    Timeout,

    #[error("PD_NOT_RUNNING")]
    NotRunning,
}
