//! Decoders for binary-encoded Active Directory attribute values.
//!
//! LDIF carries everything as text or base64, so the few attributes that the
//! directory stores in a binary or packed form are turned into their
//! canonical representation here:
//!
//! - [`decode_guid`]: 16 raw bytes to a 32 character permuted hex string
//! - [`decode_sid`]: a binary security identifier to `S-R-A-S1-...-Sn`
//! - [`decode_timestamp`]: a generalized time string to epoch seconds
//!
//! Errors are reported against a generic attribute label; callers that know
//! which attribute was being decoded relabel them with
//! [`Error::with_attribute`].

use crate::error::{Error, Result};
use chrono::NaiveDate;

/// Byte order in which a raw GUID is rendered (0-indexed).
///
/// The first three groups are stored little-endian, the trailing eight bytes
/// as-is.
const GUID_ORDER: [usize; 16] = [3, 2, 1, 0, 5, 4, 7, 6, 8, 9, 10, 11, 12, 13, 14, 15];

/// Length of a binary GUID
pub const GUID_LEN: usize = 16;

/// Fixed part of a binary SID: revision, count and 6 byte authority
const SID_HEADER_LEN: usize = 8;

/// Number of digits in `YYYYMMDDHHMMSS`
const TIMESTAMP_DIGITS: usize = 14;

/// Decode a binary GUID into 32 lowercase hex characters.
pub fn decode_guid(raw: &[u8]) -> Result<String> {
    if raw.len() != GUID_LEN {
        return Err(Error::decode(
            "guid",
            raw,
            format!("expected {} bytes, got {}", GUID_LEN, raw.len()),
        ));
    }

    let permuted: Vec<u8> = GUID_ORDER.iter().map(|&i| raw[i]).collect();
    Ok(hex::encode(permuted))
}

/// Decode a binary security identifier into its string form.
///
/// Layout: revision (1 byte), sub-authority count N (1 byte), identifier
/// authority (6 bytes, big-endian), then N little-endian `u32`
/// sub-authorities. Trailing bytes beyond the declared sub-authorities are
/// ignored.
pub fn decode_sid(raw: &[u8]) -> Result<String> {
    if raw.len() < SID_HEADER_LEN {
        return Err(Error::decode(
            "sid",
            raw,
            format!("need at least {} bytes, got {}", SID_HEADER_LEN, raw.len()),
        ));
    }

    let revision = raw[0];
    let count = raw[1] as usize;

    let needed = SID_HEADER_LEN + 4 * count;
    if raw.len() < needed {
        return Err(Error::decode(
            "sid",
            raw,
            format!(
                "{} sub-authorities need {} bytes, got {}",
                count,
                needed,
                raw.len()
            ),
        ));
    }

    // Pad the 6 byte authority to a big-endian u64
    let mut authority = [0u8; 8];
    authority[2..].copy_from_slice(&raw[2..SID_HEADER_LEN]);
    let authority = u64::from_be_bytes(authority);

    let mut sid = format!("S-{}-{}", revision, authority);
    for chunk in raw[SID_HEADER_LEN..needed].chunks_exact(4) {
        let sub = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        sid.push('-');
        sid.push_str(&sub.to_string());
    }

    Ok(sid)
}

/// Decode a directory timestamp (`YYYYMMDDHHMMSS[.fraction]Z`) into seconds
/// since the Unix epoch, interpreting it as UTC.
///
/// The fraction may use `.` or `,` as separator and is discarded.
pub fn decode_timestamp(raw: &str) -> Result<i64> {
    let fail = |details: &str| Error::decode("timestamp", raw.as_bytes(), details);

    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    let digits = trimmed
        .split(['.', ','])
        .next()
        .unwrap_or_default();

    if digits.len() != TIMESTAMP_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(fail("expected YYYYMMDDHHMMSS"));
    }

    // All-ASCII, so byte slicing is safe
    let field = |range: std::ops::Range<usize>| -> u32 {
        digits[range].parse().unwrap_or_default()
    };

    let date = NaiveDate::from_ymd_opt(field(0..4) as i32, field(4..6), field(6..8))
        .ok_or_else(|| fail("invalid calendar date"))?;
    let datetime = date
        .and_hms_opt(field(8..10), field(10..12), field(12..14))
        .ok_or_else(|| fail("invalid time of day"))?;

    Ok(datetime.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_all_zero() {
        assert_eq!(
            decode_guid(&[0u8; 16]).unwrap(),
            "00000000000000000000000000000000"
        );
    }

    #[test]
    fn test_guid_permutation() {
        let raw = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
            0x0F, 0x10,
        ];
        assert_eq!(
            decode_guid(&raw).unwrap(),
            "0403020106050807090a0b0c0d0e0f10"
        );
    }

    #[test]
    fn test_guid_pads_single_digit_bytes() {
        let mut raw = [0xffu8; 16];
        raw[3] = 0x0a;
        let guid = decode_guid(&raw).unwrap();
        assert_eq!(guid.len(), 32);
        assert!(guid.starts_with("0aff"));
    }

    #[test]
    fn test_guid_wrong_length() {
        let err = decode_guid(&[0u8; 15]).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    /// Encodes a SID the way the directory stores it
    fn encode_sid(revision: u8, authority: u64, subs: &[u32]) -> Vec<u8> {
        let mut raw = vec![revision, subs.len() as u8];
        raw.extend_from_slice(&authority.to_be_bytes()[2..]);
        for sub in subs {
            raw.extend_from_slice(&sub.to_le_bytes());
        }
        raw
    }

    #[test]
    fn test_sid_builtin_administrators() {
        let raw = encode_sid(1, 5, &[32, 544]);
        assert_eq!(
            raw,
            [1, 2, 0, 0, 0, 0, 0, 5, 32, 0, 0, 0, 0x20, 0x02, 0, 0]
        );
        assert_eq!(decode_sid(&raw).unwrap(), "S-1-5-32-544");
    }

    #[test]
    fn test_sid_short() {
        let raw = encode_sid(1, 5, &[18]);
        assert_eq!(decode_sid(&raw).unwrap(), "S-1-5-18");
    }

    #[test]
    fn test_sid_domain_account() {
        let raw = encode_sid(1, 5, &[21, 1270288957, 3800934213, 3019856503, 500]);
        assert_eq!(
            decode_sid(&raw).unwrap(),
            "S-1-5-21-1270288957-3800934213-3019856503-500"
        );
    }

    #[test]
    fn test_sid_truncated() {
        let mut raw = encode_sid(1, 5, &[32, 544]);
        raw.truncate(14);
        assert!(matches!(decode_sid(&raw), Err(Error::Decode { .. })));
        assert!(decode_sid(&[1, 0, 0]).is_err());
    }

    #[test]
    fn test_timestamp_with_fraction() {
        // 2007-08-28T08:54:01Z
        assert_eq!(decode_timestamp("20070828085401.0Z").unwrap(), 1_188_291_241);
    }

    #[test]
    fn test_timestamp_without_fraction() {
        assert_eq!(decode_timestamp("19700101000000Z").unwrap(), 0);
        assert_eq!(decode_timestamp("20070828085401Z").unwrap(), 1_188_291_241);
    }

    #[test]
    fn test_timestamp_malformed() {
        assert!(decode_timestamp("2007-08-28").is_err());
        assert!(decode_timestamp("20071328085401.0Z").is_err());
        assert!(decode_timestamp("20070828256101.0Z").is_err());
        assert!(decode_timestamp("").is_err());
    }
}
