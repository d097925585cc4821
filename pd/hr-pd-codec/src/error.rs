use thiserror::Error;

/// Structured codec failures. Never panics on malformed wire input — every
/// parse path returns one of these instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("option length exceeds remaining buffer (at offset {offset})")]
    TruncatedOption { offset: usize },

    #[error("message shorter than the 4-byte header")]
    TruncatedHeader,

    #[error("response missing mandatory option: {0}")]
    MissingOption(&'static str),

    #[error("prefix length {0} exceeds 128 bits")]
    PrefixTooLong(u8),

    #[error("IA_PD option payload shorter than the 12-byte fixed part")]
    TruncatedIaPd,
}
