//! MARC record leader (the 24-byte pseudo-field at index 0).
//!
//! The leader carries the record length, base-address-of-data, and a few
//! other structural bytes used by the codec. The engine does not interpret
//! the cataloging-semantic positions (record status, bibliographic level,
//! etc.) -- it treats the leader as an opaque 24-byte fixed field, copied
//! verbatim from input to output, except that the length and base-address
//! bytes are recomputed by the writer on serialization.

use crate::error::{MarcError, Result};
use serde::{Deserialize, Serialize};

/// Length in bytes of a MARC leader.
pub const LEADER_LEN: usize = 24;

/// The 24-byte MARC leader, stored as an opaque byte array plus the two
/// structural fields the codec must recompute on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    /// All 24 bytes, as read from (or about to be written to) the wire.
    /// Positions 0-4 (record length) and 12-16 (base address) are
    /// overwritten by [`crate::codec::MarcWriter`] at serialization time;
    /// callers may otherwise treat this as opaque cataloging metadata.
    bytes: [u8; LEADER_LEN],
}

impl Default for Leader {
    fn default() -> Self {
        // A conventional blank leader: record length and base address
        // filled with zeros (recomputed on write), indicator/subfield
        // counts '2', and the fixed "4500" entry map at the end.
        let mut bytes = [b' '; LEADER_LEN];
        bytes[0..5].copy_from_slice(b"00000");
        bytes[10] = b'2';
        bytes[11] = b'2';
        bytes[12..17].copy_from_slice(b"00000");
        bytes[20..24].copy_from_slice(b"4500");
        Leader { bytes }
    }
}

impl Leader {
    /// Parse a leader from exactly 24 bytes.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != LEADER_LEN {
            return Err(MarcError::BadRecordLength);
        }
        let mut bytes = [0u8; LEADER_LEN];
        bytes.copy_from_slice(buf);
        Ok(Leader { bytes })
    }

    /// The raw 24 bytes, as currently stored.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; LEADER_LEN] {
        &self.bytes
    }

    /// Record length declared in positions 0-4. `None` if not all-digit.
    #[must_use]
    pub fn record_length(&self) -> Option<u32> {
        parse_digits(&self.bytes[0..5])
    }

    /// Base address of data declared in positions 12-16. `None` if not
    /// all-digit.
    #[must_use]
    pub fn base_address(&self) -> Option<u32> {
        parse_digits(&self.bytes[12..17])
    }

    /// Overwrite the record-length field (positions 0-4). Caller guarantees
    /// `len <= 99999`.
    pub(crate) fn set_record_length(&mut self, len: u32) {
        write_digits(&mut self.bytes[0..5], len);
    }

    /// Overwrite the base-address field (positions 12-16). Caller
    /// guarantees `addr <= 99999`.
    pub(crate) fn set_base_address(&mut self, addr: u32) {
        write_digits(&mut self.bytes[12..17], addr);
    }
}

fn parse_digits(field: &[u8]) -> Option<u32> {
    if field.iter().all(u8::is_ascii_digit) {
        std::str::from_utf8(field).ok()?.parse().ok()
    } else {
        None
    }
}

fn write_digits(field: &mut [u8], mut value: u32) {
    for b in field.iter_mut().rev() {
        *b = b'0' + (value % 10) as u8;
        value /= 10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_leader_is_24_bytes_with_fixed_tail() {
        let l = Leader::default();
        assert_eq!(l.as_bytes().len(), LEADER_LEN);
        assert_eq!(&l.as_bytes()[20..24], b"4500");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Leader::parse(b"short").is_err());
    }

    #[test]
    fn round_trips_length_fields() {
        let mut l = Leader::default();
        l.set_record_length(123);
        l.set_base_address(456);
        assert_eq!(l.record_length(), Some(123));
        assert_eq!(l.base_address(), Some(456));
    }
}
