//! Raw DHCPv6 option TLV framing: `code(2) | length(2) | value(length)`.

use std::collections::BTreeMap;

use crate::error::CodecError;

pub const OPT_CLIENTID: u16 = 1;
pub const OPT_SERVERID: u16 = 2;
pub const OPT_PREFERENCE: u16 = 7;
pub const OPT_ELAPSED_TIME: u16 = 8;
pub const OPT_ORO: u16 = 6;
pub const OPT_IA_PD: u16 = 25;
pub const OPT_IAPREFIX: u16 = 26;

/// Requested option codes carried in every Option Request (option 6).
pub const REQUESTED_OPTIONS: [u16; 2] = [23, 24];

/// Appends one TLV option to `buf`.
pub fn append_option(buf: &mut Vec<u8>, code: u16, data: &[u8]) {
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
    buf.extend_from_slice(data);
}

/// Multimap of option code → values, in arrival order within a code.
pub type OptionMap = BTreeMap<u16, Vec<Vec<u8>>>;

/// Walks TLV options starting at `start_offset` until the end of `frame`.
/// `start_offset` is 4 for an outer DHCPv6 message, 12 for an IA_PD payload.
///
/// Duplicates accumulate under the same code, preserving arrival order.
pub fn parse_options(frame: &[u8], start_offset: usize) -> Result<OptionMap, CodecError> {
    let mut options: OptionMap = BTreeMap::new();
    let mut offset = start_offset;

    while offset + 4 <= frame.len() {
        let code = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
        let len = u16::from_be_bytes([frame[offset + 2], frame[offset + 3]]) as usize;
        offset += 4;

        if offset + len > frame.len() {
            return Err(CodecError::TruncatedOption { offset });
        }

        options
            .entry(code)
            .or_default()
            .push(frame[offset..offset + len].to_vec());

        offset += len;
    }

    Ok(options)
}

/// Returns the first value for `code`, if present.
pub fn first<'a>(options: &'a OptionMap, code: u16) -> Option<&'a [u8]> {
    options.get(&code).and_then(|v| v.first()).map(|v| v.as_slice())
}

/// The single-byte Preference option (7); absent means preference 0.
pub fn preference_of(options: &OptionMap) -> u8 {
    first(options, OPT_PREFERENCE)
        .and_then(|v| v.first().copied())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_option() {
        let mut buf = Vec::new();
        append_option(&mut buf, OPT_ELAPSED_TIME, &[0, 0]);
        let parsed = parse_options(&buf, 0).unwrap();
        assert_eq!(parsed.get(&OPT_ELAPSED_TIME).unwrap(), &vec![vec![0u8, 0]]);
    }

    #[test]
    fn preserves_duplicate_order() {
        let mut buf = Vec::new();
        append_option(&mut buf, OPT_SERVERID, b"first");
        append_option(&mut buf, OPT_SERVERID, b"second");
        let parsed = parse_options(&buf, 0).unwrap();
        let values = parsed.get(&OPT_SERVERID).unwrap();
        assert_eq!(values, &vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn rejects_truncated_option() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&OPT_SERVERID.to_be_bytes());
        buf.extend_from_slice(&10u16.to_be_bytes()); // claims 10 bytes, supplies none
        assert_eq!(
            parse_options(&buf, 0),
            Err(CodecError::TruncatedOption { offset: 4 })
        );
    }

    #[test]
    fn option_request_matches_s2() {
        let mut buf = Vec::new();
        let mut data = Vec::new();
        for code in REQUESTED_OPTIONS {
            data.extend_from_slice(&code.to_be_bytes());
        }
        append_option(&mut buf, OPT_ORO, &data);
        assert_eq!(buf, vec![0x00, 0x06, 0x00, 0x04, 0x00, 0x17, 0x00, 0x18]);
    }
}
