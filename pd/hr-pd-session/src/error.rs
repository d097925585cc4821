use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no ADVERTISE received after 3 SOLICIT attempts")]
    SolicitFailed,

    #[error("no REPLY received after 3 REQUEST attempts")]
    RequestFailed,

    #[error("RENEW timed out without a REPLY")]
    RenewFailed,

    #[error("transport error: {0}")]
    Transport(#[from] hr_pd_net::TransportError),

    #[error("malformed frame from server: {0}")]
    Codec(#[from] hr_pd_codec::CodecError),
}
