//! The logical MARC record model: an owned tree of fields and subfields,
//! decoupled from the ISO 2709 byte layout.
//!
//! Field 0 is always the 24-byte leader, exposed through the same
//! navigation API as any other field so callers don't need a special case;
//! [`MarcRecord::fields`] below index 0 holds only the "real" fields
//! (tags 0..999), and [`crate::codec::MarcCodec`] adds the leader's
//! pseudo-field-0 offset on top.

use crate::error::{MarcError, Result};
use crate::leader::Leader;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Synthetic subfield code standing in for indicator 1.
pub const INDIC1_CODE: u8 = 0x01;
/// Synthetic subfield code standing in for indicator 2.
pub const INDIC2_CODE: u8 = 0x02;

/// A single subfield: a one-byte code plus an opaque payload.
///
/// For a variable field the first two "subfields" returned by navigation
/// are always the indicator pseudo-subfields ([`INDIC1_CODE`] at position 0,
/// [`INDIC2_CODE`] at position 1); real subfields start at position 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfield {
    /// Subfield code. Printable (0x21..=0x7E) for real subfields; one of
    /// the `INDIC*_CODE` sentinels for indicator pseudo-subfields.
    pub code: u8,
    /// Opaque payload bytes.
    pub value: Vec<u8>,
}

impl Subfield {
    /// Construct a new subfield, validating a printable, non-indicator code.
    pub fn new(code: u8, value: Vec<u8>) -> Result<Self> {
        if !is_printable_subfield_code(code) {
            return Err(MarcError::BadSubfieldCode(code));
        }
        Ok(Subfield { code, value })
    }
}

/// True for a printable, non-indicator subfield code (U+0021..U+007E).
#[must_use]
pub fn is_printable_subfield_code(code: u8) -> bool {
    (0x21..=0x7E).contains(&code)
}

/// The payload of a field: opaque bytes for a fixed field (tag < 10), or
/// two indicators plus an ordered subfield list for a variable field
/// (tag >= 10).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldPayload {
    /// Fixed field: a single opaque byte string (tag < 10).
    Fixed(Vec<u8>),
    /// Variable field: two indicators plus subfields (tag >= 10).
    Variable {
        /// Indicator 1 byte.
        indic1: u8,
        /// Indicator 2 byte.
        indic2: u8,
        /// Real subfields, in order (indicator pseudo-subfields are
        /// synthesized on navigation, not stored here).
        subfields: SmallVec<[Subfield; 4]>,
    },
}

impl FieldPayload {
    /// True if this is a fixed-field payload.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, FieldPayload::Fixed(_))
    }
}

/// A single field: a 3-digit tag (0..999) plus payload. Occurrence (the
/// 0-origin ordinal of this tag among fields sharing it) is derived from
/// position, not stored redundantly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field tag, 0..=999.
    pub tag: i32,
    /// Field payload.
    pub payload: FieldPayload,
}

impl Field {
    /// A new, empty field for `tag` with default indicators (space) and no
    /// subfields (variable) or empty payload (fixed).
    #[must_use]
    pub fn new_empty(tag: i32) -> Self {
        let payload = if tag < 10 {
            FieldPayload::Fixed(Vec::new())
        } else {
            FieldPayload::Variable {
                indic1: b' ',
                indic2: b' ',
                subfields: SmallVec::new(),
            }
        };
        Field { tag, payload }
    }

    /// Serialized byte length of this field's *data area* contribution,
    /// not counting the field terminator (codec adds that).
    #[must_use]
    pub fn data_len(&self) -> usize {
        match &self.payload {
            FieldPayload::Fixed(bytes) => bytes.len(),
            FieldPayload::Variable { subfields, .. } => {
                2 + subfields
                    .iter()
                    .map(|sf| 2 + sf.value.len())
                    .sum::<usize>()
            }
        }
    }
}

/// An ordered sequence of fields plus the leader. This is the logical
/// model mutated by [`crate::codec::MarcCodec`]; it has no notion of byte
/// offsets or directory entries -- those are computed fresh on
/// serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarcRecord {
    /// The 24-byte leader.
    pub leader: Leader,
    /// Real fields (tags 0..999), in input/output order. Does not include
    /// the leader; callers that want uniform field-0-is-leader navigation
    /// go through [`crate::codec::MarcCodec`].
    pub fields: Vec<Field>,
}

impl MarcRecord {
    /// A new, empty record (for building output) with a default leader.
    #[must_use]
    pub fn new(leader: Leader) -> Self {
        MarcRecord {
            leader,
            fields: Vec::new(),
        }
    }

    /// Occurrence (0-origin) of the field at `field_index` among fields
    /// sharing its tag.
    #[must_use]
    pub fn occurrence_of(&self, field_index: usize) -> i32 {
        let tag = self.fields[field_index].tag;
        self.fields[..field_index]
            .iter()
            .filter(|f| f.tag == tag)
            .count() as i32
    }

    /// Find the field index (into `self.fields`) for the `occ`-th
    /// occurrence of `tag`, if any.
    #[must_use]
    pub fn find(&self, tag: i32, occ: i32) -> Option<usize> {
        let mut seen = 0;
        for (i, f) in self.fields.iter().enumerate() {
            if f.tag == tag {
                if seen == occ {
                    return Some(i);
                }
                seen += 1;
            }
        }
        None
    }

    /// Count of fields sharing `tag`.
    #[must_use]
    pub fn count_occurrences(&self, tag: i32) -> i32 {
        self.fields.iter().filter(|f| f.tag == tag).count() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_empty_variable_field_has_blank_indicators() {
        let f = Field::new_empty(245);
        match f.payload {
            FieldPayload::Variable {
                indic1,
                indic2,
                subfields,
            } => {
                assert_eq!(indic1, b' ');
                assert_eq!(indic2, b' ');
                assert!(subfields.is_empty());
            }
            FieldPayload::Fixed(_) => panic!("expected variable"),
        }
    }

    #[test]
    fn new_empty_fixed_field_is_empty_bytes() {
        let f = Field::new_empty(1);
        assert_eq!(f.payload, FieldPayload::Fixed(Vec::new()));
    }

    #[test]
    fn occurrence_and_find_round_trip() {
        let mut rec = MarcRecord::new(Leader::default());
        rec.fields.push(Field::new_empty(650));
        rec.fields.push(Field::new_empty(245));
        rec.fields.push(Field::new_empty(650));
        assert_eq!(rec.occurrence_of(2), 1);
        assert_eq!(rec.find(650, 1), Some(2));
        assert_eq!(rec.count_occurrences(650), 2);
    }

    #[test]
    fn subfield_rejects_non_printable_code() {
        assert!(Subfield::new(0x00, vec![]).is_err());
        assert!(Subfield::new(b'a', vec![]).is_ok());
    }
}
