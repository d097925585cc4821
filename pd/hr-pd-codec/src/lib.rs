//! DHCPv6 Prefix Delegation wire codec (RFC 3315/3633, IA_PD only).
//!
//! Encodes/decodes the SOLICIT/ADVERTISE/REQUEST/REPLY/RENEW/RELEASE subset
//! this client speaks, plus IA_PD (option 25) / IA Prefix (option 26)
//! framing. Nothing in this crate touches a socket; see `hr-pd-net` for
//! that.

pub mod error;
pub mod message;
pub mod option;
pub mod prefix;

pub use error::CodecError;
pub use message::{
    encode_release, encode_renew, encode_request, encode_solicit, extract_server_and_ia_prefix,
    header_of, MSG_ADVERTISE, MSG_RELEASE, MSG_RENEW, MSG_REPLY, MSG_REQUEST, MSG_SOLICIT,
};
pub use option::{parse_options, preference_of, OptionMap};
pub use prefix::{parse_ia_prefix, render, Lease};
