//! The navigable codec handle: a cursor over a [`MarcRecord`] plus the
//! mutation and save/restore API the interpreter drives procedures through.
//!
//! Field 0 is a synthetic slot standing in for the leader; real fields
//! are addressed 1-origin against
//! [`MarcRecord::fields`][crate::record::MarcRecord::fields].

pub mod marc_ref;
pub mod wire;

pub use marc_ref::{MarcRef, CURRENT, NEW};

use crate::error::{MarcError, Result};
use crate::leader::Leader;
use crate::record::{Field, FieldPayload, MarcRecord, Subfield, INDIC1_CODE, INDIC2_CODE};

/// Maximum depth of the save/restore position stack.
pub const MAX_SAVE_DEPTH: usize = 32;

/// A cursor position: field index (0 = leader) and subfield index within
/// that field (meaningless for fixed fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// 0 = leader; 1.. indexes into `record.fields[field - 1]`.
    pub field: usize,
    /// Subfield ordinal; 0/1 are the indicator pseudo-subfields for a
    /// variable field, 2.. are real subfields.
    pub subfield: usize,
}

/// Navigable, mutable handle over one [`MarcRecord`].
#[derive(Debug, Clone)]
pub struct MarcCodec {
    record: MarcRecord,
    cursor: Position,
    save_stack: Vec<Position>,
}

impl MarcCodec {
    /// Wrap `record`, cursor parked on the leader.
    #[must_use]
    pub fn new(record: MarcRecord) -> Self {
        MarcCodec {
            record,
            cursor: Position::default(),
            save_stack: Vec::new(),
        }
    }

    /// Read-only access to the underlying record.
    #[must_use]
    pub fn record(&self) -> &MarcRecord {
        &self.record
    }

    /// Consume the codec, returning the underlying record.
    #[must_use]
    pub fn into_record(self) -> MarcRecord {
        self.record
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> Position {
        self.cursor
    }

    /// A read-only duplicate sharing no mutable state, used by the
    /// interpreter to give a procedure both an input and output view of
    /// the same underlying data.
    #[must_use]
    pub fn dup(&self) -> Self {
        MarcCodec {
            record: self.record.clone(),
            cursor: self.cursor,
            save_stack: Vec::new(),
        }
    }

    // -- navigation ---------------------------------------------------

    /// Number of navigable field slots, including the leader pseudo-field.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.record.fields.len() + 1 // +1 for the leader pseudo-field
    }

    fn subfield_count_at(&self, field: usize) -> usize {
        if field == 0 {
            return 1;
        }
        match &self.record.fields[field - 1].payload {
            FieldPayload::Fixed(_) => 1,
            FieldPayload::Variable { subfields, .. } => 2 + subfields.len(),
        }
    }

    /// Move the cursor to field `field_index` (0 = leader), subfield 0.
    pub fn goto_field(&mut self, field_index: usize) -> Result<()> {
        if field_index >= self.field_count() {
            return Err(MarcError::PastEndOfRecord);
        }
        self.cursor = Position {
            field: field_index,
            subfield: 0,
        };
        Ok(())
    }

    /// Move the cursor to the `occ`-th occurrence of `tag`.
    pub fn goto_tag(&mut self, tag: i32, occ: i32) -> Result<()> {
        if tag == 0 {
            return self.goto_field(0);
        }
        let real_occ = if occ == CURRENT { 0 } else { occ };
        let idx = self
            .record
            .find(tag, real_occ)
            .ok_or(MarcError::NoSuchFieldOccurrence { tag, occ })?;
        self.goto_field(idx + 1)
    }

    /// Advance the cursor to the next field, if any.
    pub fn next_field(&mut self) -> Result<()> {
        self.goto_field(self.cursor.field + 1)
    }

    /// Move the cursor's subfield index within the current field.
    pub fn goto_subfield(&mut self, subfield_index: usize) -> Result<()> {
        if subfield_index >= self.subfield_count_at(self.cursor.field) {
            return Err(MarcError::PastEndOfField);
        }
        self.cursor.subfield = subfield_index;
        Ok(())
    }

    /// Move the cursor to the `occ`-th occurrence of subfield `code`
    /// within the current field.
    pub fn goto_subfield_code(&mut self, code: u8, occ: i32) -> Result<()> {
        let field = self.current_field()?;
        match &field.payload {
            FieldPayload::Fixed(_) => Err(MarcError::NoSuchSubfield(code as char)),
            FieldPayload::Variable { subfields, .. } => {
                if code == INDIC1_CODE {
                    self.cursor.subfield = 0;
                    return Ok(());
                }
                if code == INDIC2_CODE {
                    self.cursor.subfield = 1;
                    return Ok(());
                }
                let mut seen = 0;
                for (i, sf) in subfields.iter().enumerate() {
                    if sf.code == code {
                        if seen == occ {
                            self.cursor.subfield = i + 2;
                            return Ok(());
                        }
                        seen += 1;
                    }
                }
                Err(MarcError::NoSuchSubfieldOccurrence {
                    code: code as char,
                    occ,
                })
            }
        }
    }

    fn current_field(&self) -> Result<&Field> {
        if self.cursor.field == 0 {
            return Err(MarcError::PastEndOfRecord);
        }
        self.record
            .fields
            .get(self.cursor.field - 1)
            .ok_or(MarcError::PastEndOfRecord)
    }

    /// Tag of the field at the cursor (0 for the leader).
    #[must_use]
    pub fn current_tag(&self) -> i32 {
        if self.cursor.field == 0 {
            0
        } else {
            self.record.fields[self.cursor.field - 1].tag
        }
    }

    /// Occurrence (0-origin) of the current field among same-tag fields.
    #[must_use]
    pub fn current_occurrence(&self) -> i32 {
        if self.cursor.field == 0 {
            0
        } else {
            self.record.occurrence_of(self.cursor.field - 1)
        }
    }

    /// Current subfield's code, or `None` for a fixed field / the leader.
    #[must_use]
    pub fn current_subfield_code(&self) -> Option<u8> {
        if self.cursor.field == 0 {
            return None;
        }
        match &self.record.fields[self.cursor.field - 1].payload {
            FieldPayload::Fixed(_) => None,
            FieldPayload::Variable { .. } => match self.cursor.subfield {
                0 => Some(INDIC1_CODE),
                1 => Some(INDIC2_CODE),
                n => self
                    .record
                    .fields
                    .get(self.cursor.field - 1)
                    .and_then(|f| match &f.payload {
                        FieldPayload::Variable { subfields, .. } => {
                            subfields.get(n - 2).map(|sf| sf.code)
                        }
                        FieldPayload::Fixed(_) => None,
                    }),
            },
        }
    }

    /// Bytes at the cursor: the leader's bytes, a fixed field's full
    /// payload, an indicator's single byte, or a subfield's value.
    pub fn current_bytes(&self) -> Result<&[u8]> {
        if self.cursor.field == 0 {
            return Ok(self.record.leader.as_bytes());
        }
        let field = self.current_field()?;
        match &field.payload {
            FieldPayload::Fixed(bytes) => Ok(bytes),
            FieldPayload::Variable {
                indic1,
                indic2,
                subfields,
            } => match self.cursor.subfield {
                0 => Ok(std::slice::from_ref(indic1)),
                1 => Ok(std::slice::from_ref(indic2)),
                n => subfields
                    .get(n - 2)
                    .map(|sf| sf.value.as_slice())
                    .ok_or(MarcError::PastEndOfField),
            },
        }
    }

    // -- mutation -------------------------------------------------------

    /// Append a new field with tag `tag` at the end of the record and
    /// move the cursor onto it.
    pub fn add_field(&mut self, tag: i32) -> Result<()> {
        if !(0..=999).contains(&tag) {
            return Err(MarcError::BadFieldId(tag));
        }
        self.record.fields.push(Field::new_empty(tag));
        self.cursor = Position {
            field: self.record.fields.len(),
            subfield: 0,
        };
        Ok(())
    }

    /// Append a new subfield to the current (variable) field and move the
    /// cursor onto it.
    pub fn add_subfield(&mut self, code: u8, value: Vec<u8>) -> Result<()> {
        let field_idx = self.cursor.field;
        if field_idx == 0 {
            return Err(MarcError::FieldClassMismatch { old: 0, new: 0 });
        }
        let field = self
            .record
            .fields
            .get_mut(field_idx - 1)
            .ok_or(MarcError::PastEndOfRecord)?;
        match &mut field.payload {
            FieldPayload::Fixed(_) => Err(MarcError::FieldClassMismatch {
                old: field.tag,
                new: field.tag,
            }),
            FieldPayload::Variable { subfields, .. } => {
                let sf = Subfield::new(code, value)?;
                subfields.push(sf);
                self.cursor.subfield = 1 + subfields.len();
                Ok(())
            }
        }
    }

    /// Delete the current field. The cursor moves to the field that was
    /// previously next (or the new last field, if the deleted field was
    /// last). Deleting the leader (field 0) is a no-op-rejecting error.
    pub fn delete_current_field(&mut self) -> Result<()> {
        if self.cursor.field == 0 {
            return Err(MarcError::OutOfOrderDelete);
        }
        self.record.fields.remove(self.cursor.field - 1);
        if self.cursor.field > self.record.fields.len() {
            self.cursor.field = self.record.fields.len();
        }
        self.cursor.subfield = 0;
        Ok(())
    }

    /// Delete the current subfield (must not be an indicator pseudo-slot).
    pub fn delete_current_subfield(&mut self) -> Result<()> {
        if self.cursor.subfield < 2 {
            return Err(MarcError::OutOfOrderDelete);
        }
        let field_idx = self.cursor.field;
        let field = self
            .record
            .fields
            .get_mut(field_idx - 1)
            .ok_or(MarcError::PastEndOfRecord)?;
        match &mut field.payload {
            FieldPayload::Fixed(_) => Err(MarcError::OutOfOrderDelete),
            FieldPayload::Variable { subfields, .. } => {
                if self.cursor.subfield - 2 >= subfields.len() {
                    return Err(MarcError::PastEndOfField);
                }
                subfields.remove(self.cursor.subfield - 2);
                self.cursor.subfield = 0;
                Ok(())
            }
        }
    }

    /// Rename the current field's tag. Rejects crossing the fixed/variable
    /// class boundary (tag < 10 vs >= 10), matching the original engine's
    /// field-class invariant.
    pub fn rename_current_field(&mut self, new_tag: i32) -> Result<()> {
        if !(0..=999).contains(&new_tag) {
            return Err(MarcError::BadFieldId(new_tag));
        }
        let field_idx = self.cursor.field;
        if field_idx == 0 {
            return Err(MarcError::FieldClassMismatch {
                old: 0,
                new: new_tag,
            });
        }
        let field = &mut self.record.fields[field_idx - 1];
        if (field.tag < 10) != (new_tag < 10) {
            return Err(MarcError::FieldClassMismatch {
                old: field.tag,
                new: new_tag,
            });
        }
        field.tag = new_tag;
        Ok(())
    }

    /// Rename the current subfield's code (indicators excepted: they are
    /// not renameable, only settable via [`Self::set_indicator`]).
    pub fn rename_current_subfield(&mut self, new_code: u8) -> Result<()> {
        if self.cursor.subfield < 2 {
            return Err(MarcError::OutOfOrderDelete);
        }
        let field_idx = self.cursor.field;
        let field = self
            .record
            .fields
            .get_mut(field_idx - 1)
            .ok_or(MarcError::PastEndOfRecord)?;
        match &mut field.payload {
            FieldPayload::Fixed(_) => Err(MarcError::OutOfOrderDelete),
            FieldPayload::Variable { subfields, .. } => {
                let sf = subfields
                    .get_mut(self.cursor.subfield - 2)
                    .ok_or(MarcError::PastEndOfField)?;
                if !crate::record::is_printable_subfield_code(new_code) {
                    return Err(MarcError::BadSubfieldCode(new_code));
                }
                sf.code = new_code;
                Ok(())
            }
        }
    }

    /// Overwrite the indicator (1 or 2) of the current field.
    pub fn set_indicator(&mut self, which: u8, value: u8) -> Result<()> {
        let field_idx = self.cursor.field;
        if field_idx == 0 {
            return Err(MarcError::BadIndicatorLength(0));
        }
        let field = self
            .record
            .fields
            .get_mut(field_idx - 1)
            .ok_or(MarcError::PastEndOfRecord)?;
        match &mut field.payload {
            FieldPayload::Fixed(_) => Err(MarcError::BadIndicatorLength(0)),
            FieldPayload::Variable {
                indic1, indic2, ..
            } => {
                match which {
                    1 => *indic1 = value,
                    2 => *indic2 = value,
                    _ => return Err(MarcError::BadIndicatorLength(0)),
                }
                Ok(())
            }
        }
    }

    /// Overwrite `len` bytes of the current fixed field's payload
    /// starting at `pos`, growing it with spaces if necessary.
    pub fn write_fixed_bytes(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let field_idx = self.cursor.field;
        if field_idx == 0 {
            // writing into the leader is permitted for control-level
            // bookkeeping; length/base-address bytes are recomputed on
            // output regardless.
            return Err(MarcError::BadFieldId(0));
        }
        let field = self
            .record
            .fields
            .get_mut(field_idx - 1)
            .ok_or(MarcError::PastEndOfRecord)?;
        match &mut field.payload {
            FieldPayload::Fixed(buf) => {
                let end = pos + bytes.len();
                if buf.len() < end {
                    buf.resize(end, b' ');
                }
                buf[pos..end].copy_from_slice(bytes);
                Ok(())
            }
            FieldPayload::Variable { .. } => Err(MarcError::FieldClassMismatch {
                old: field.tag,
                new: field.tag,
            }),
        }
    }

    // -- save/restore -----------------------------------------------------

    /// Push the current cursor position. Bounded to [`MAX_SAVE_DEPTH`].
    pub fn save_position(&mut self) -> Result<()> {
        if self.save_stack.len() >= MAX_SAVE_DEPTH {
            return Err(MarcError::SaveRestoreImbalance);
        }
        self.save_stack.push(self.cursor);
        Ok(())
    }

    /// Pop and restore the most recently saved cursor position.
    pub fn restore_position(&mut self) -> Result<()> {
        self.cursor = self
            .save_stack
            .pop()
            .ok_or(MarcError::SaveRestoreImbalance)?;
        Ok(())
    }

    /// Depth of the save/restore stack (for assertions that it's balanced
    /// at the end of a procedure invocation).
    #[must_use]
    pub fn save_depth(&self) -> usize {
        self.save_stack.len()
    }
}

/// Read one record from `r` into a fresh [`MarcCodec`].
pub fn read_codec<R: std::io::Read>(r: &mut R) -> Result<Option<MarcCodec>> {
    Ok(wire::read_record(r)?.map(MarcCodec::new))
}

/// Write `codec`'s record to `w` in ISO 2709 form.
pub fn write_codec<W: std::io::Write>(w: &mut W, codec: &MarcCodec) -> Result<()> {
    wire::write_record(w, &codec.record)
}

/// A blank record codec, cursor on the leader, for building output from
/// scratch (e.g. the interpreter's `NEW`-sentinel output record).
#[must_use]
pub fn blank_codec() -> MarcCodec {
    MarcCodec::new(MarcRecord::new(Leader::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader::Leader;

    fn sample() -> MarcCodec {
        let mut rec = MarcRecord::new(Leader::default());
        rec.fields.push(Field::new_empty(1));
        rec.fields.push(Field::new_empty(245));
        MarcCodec::new(rec)
    }

    #[test]
    fn navigates_leader_then_fields() {
        let mut c = sample();
        assert_eq!(c.current_tag(), 0);
        c.next_field().unwrap();
        assert_eq!(c.current_tag(), 1);
        c.next_field().unwrap();
        assert_eq!(c.current_tag(), 245);
        assert!(c.next_field().is_err());
    }

    #[test]
    fn add_and_delete_subfield() {
        let mut c = sample();
        c.goto_tag(245, CURRENT).unwrap();
        c.add_subfield(b'a', b"Title".to_vec()).unwrap();
        assert_eq!(c.current_bytes().unwrap(), b"Title");
        c.delete_current_subfield().unwrap();
        c.goto_subfield(0).unwrap();
        assert_eq!(c.current_subfield_code(), Some(INDIC1_CODE));
    }

    #[test]
    fn save_restore_round_trips_and_bounds_depth() {
        let mut c = sample();
        c.next_field().unwrap();
        c.save_position().unwrap();
        c.next_field().unwrap();
        assert_eq!(c.current_tag(), 245);
        c.restore_position().unwrap();
        assert_eq!(c.current_tag(), 1);
        assert!(c.restore_position().is_err());
    }

    #[test]
    fn rename_rejects_class_crossing() {
        let mut c = sample();
        c.goto_tag(1, CURRENT).unwrap();
        assert!(c.rename_current_field(245).is_err());
        c.rename_current_field(3).unwrap();
        assert_eq!(c.current_tag(), 3);
    }

    #[test]
    fn delete_field_moves_cursor_sanely() {
        let mut c = sample();
        c.goto_field(2).unwrap();
        c.delete_current_field().unwrap();
        assert_eq!(c.record().fields.len(), 1);
    }
}
