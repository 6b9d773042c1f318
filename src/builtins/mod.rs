//! The builtin procedure catalog: their identities, legal-scope
//! bitmask, argument-count validation, execution context
//! ([`ProcParams`]), and short-circuit return status.
//!
//! Grounded in `original_source/marcproclist.c`'s name table and
//! `marcproc.h`'s `PROC_PARAMS` struct.

pub mod catalog;
pub mod domain;
pub mod source;

use crate::codec::MarcCodec;
use crate::control::NamedBufferStore;
use crate::error::EngineError;

/// Fixed capacity of the "current data" scratch buffer every procedure
/// call shares.
pub const SCRATCH_CAPACITY: usize = 16_384;

/// Helper macro emitting a set of `pub const u16` bitmask flags plus an
/// `ANY_SCOPE` convenience constant, avoiding a `bitflags` dependency
/// for what is otherwise a plain scope mask.
macro_rules! bitmask_consts {
    ($(#[$meta:meta] $name:ident = $val:expr;)+) => {
        $(#[$meta] pub const $name: u16 = $val;)+
        /// Every scope bit set; procedures legal everywhere (e.g. `nop`).
        pub const ANY_SCOPE: u16 = 0 $(| $name)+;
    };
}

bitmask_consts! {
    /// Legal in the session-pre chain.
    SESSION_PRE = 0b0000_0001;
    /// Legal in the session-post chain.
    SESSION_POST = 0b0000_0010;
    /// Legal in the record-pre chain.
    RECORD_PRE = 0b0000_0100;
    /// Legal in the record-post chain.
    RECORD_POST = 0b0000_1000;
    /// Legal in a field-pre chain.
    FIELD_PRE = 0b0001_0000;
    /// Legal in a field-post chain.
    FIELD_POST = 0b0010_0000;
    /// Legal in a subfield-pre chain.
    SUBFIELD_PRE = 0b0100_0000;
    /// Legal in a subfield-post chain.
    SUBFIELD_POST = 0b1000_0000;
}

/// Short-circuit control-flow status returned by every builtin: what
/// the subfield/field/record loop that called it should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcStatus {
    /// Normal success; advance to `true_next`.
    Ok,
    /// `if` evaluated false; advance to `false_next` (not an error).
    IfFailed,
    /// Short-circuit to the end of the current subfield iteration.
    DoneSf,
    /// Short-circuit to the end of the current field iteration.
    DoneField,
    /// Short-circuit to the end of record processing.
    DoneRecord,
    /// Like `DoneField`, but the caller deletes the current output field.
    KillField,
    /// Short-circuit to record-post with the record marked for suppression.
    KillRecord,
    /// Fatal for this record: log and abort without writing it.
    Error,
}

/// Which builtin a [`crate::control::ProcNode`] invokes. A tagged
/// enum rather than a name string, so dispatch is exhaustive and the
/// lookup table built once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinId {
    /// `if(src, op, value?)`
    If,
    /// `nop` — else/endif branch target.
    Nop,
    /// `indic(1|2, ch)`
    Indic,
    /// `clear(dest)`
    Clear,
    /// `copy(dest, src)`
    Copy,
    /// `append(dest, src)`
    Append,
    /// `substr(dest, src, start, length?)`
    Substr,
    /// `normalize(dest, src)`
    Normalize,
    /// `makefld(tag)`
    Makefld,
    /// `makesf(code)`
    Makesf,
    /// `renfld(tag)`
    Renfld,
    /// `rensf(code)`
    Rensf,
    /// `killfld`
    Killfld,
    /// `killrec`
    Killrec,
    /// `donesf`
    Donesf,
    /// `donefld`
    Donefld,
    /// `donerec`
    Donerec,
    /// `today(dest, fmt)`
    Today,
    /// `y2toy4(dest, src)`
    Y2toY4,
    /// `log(severity, srcs...)`
    Log,
    /// `mesh`
    Mesh,
    /// Fixed-field sanity/derivation procedure for tag 000 (leader bytes).
    Tag000,
    /// ISBN-bearing field 010 cleanup.
    Tag010,
    /// ISSN field 022 cleanup.
    Tag022,
    /// System control number field 035 cleanup.
    Tag035,
    /// Language code field 041 cleanup.
    Tag041,
    /// Classification field 066 cleanup.
    Tag066,
    /// Title statement field 245 cleanup.
    Tag245,
    /// Local subject field 659 cleanup.
    Tag659,
    /// Series-added-entry range (760-787) cleanup.
    Tag76x,
    /// Electronic-location field 856 cleanup.
    Tag856,
    /// Alternate-graphic-representation field 880 cleanup.
    Tag880,
    /// Local-use field 998 cleanup.
    Tag998,
    /// ISBN checksum recomputation/validation.
    IsbnCheck,
    /// Duplicate-field detection.
    DupField,
    /// Field-length sanity enforcement.
    FieldLenCheck,
    /// NACO heading-normalization cleanup.
    NacoClean,
}

/// One entry in the builtin lookup table: argument-count bounds and
/// the scope mask the compiler validates a `prep`/`post` directive
/// against.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinSpec {
    /// The builtin this entry describes.
    pub id: BuiltinId,
    /// Control-table name, e.g. `"copy"`.
    pub name: &'static str,
    /// Minimum argument count.
    pub min_args: usize,
    /// Maximum argument count (`usize::MAX` for unbounded, e.g. `log`).
    pub max_args: usize,
    /// Bitmask of scopes×positions this builtin may be used in.
    pub scopes: u16,
}

/// The static name→builtin table, built once and consulted by the
/// compiler.
pub const BUILTIN_TABLE: &[BuiltinSpec] = &[
    BuiltinSpec { id: BuiltinId::If, name: "if", min_args: 2, max_args: 3, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Nop, name: "nop", min_args: 0, max_args: 0, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Indic, name: "indic", min_args: 2, max_args: 2, scopes: FIELD_PRE | FIELD_POST | SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Clear, name: "clear", min_args: 1, max_args: 1, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Copy, name: "copy", min_args: 2, max_args: 2, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Append, name: "append", min_args: 2, max_args: 2, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Substr, name: "substr", min_args: 3, max_args: 4, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Normalize, name: "normalize", min_args: 2, max_args: 2, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Makefld, name: "makefld", min_args: 1, max_args: 1, scopes: RECORD_PRE | RECORD_POST | FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Makesf, name: "makesf", min_args: 1, max_args: 1, scopes: FIELD_PRE | FIELD_POST | SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Renfld, name: "renfld", min_args: 1, max_args: 1, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Rensf, name: "rensf", min_args: 1, max_args: 1, scopes: SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Killfld, name: "killfld", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST | SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Killrec, name: "killrec", min_args: 0, max_args: 0, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Donesf, name: "donesf", min_args: 0, max_args: 0, scopes: SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Donefld, name: "donefld", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST | SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Donerec, name: "donerec", min_args: 0, max_args: 0, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Today, name: "today", min_args: 2, max_args: 2, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Y2toY4, name: "y2toy4", min_args: 2, max_args: 2, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Log, name: "log", min_args: 1, max_args: usize::MAX, scopes: ANY_SCOPE },
    BuiltinSpec { id: BuiltinId::Mesh, name: "mesh", min_args: 0, max_args: 0, scopes: RECORD_PRE | RECORD_POST },
    BuiltinSpec { id: BuiltinId::Tag000, name: "tag000", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag010, name: "tag010", min_args: 0, max_args: 0, scopes: SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag022, name: "tag022", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag035, name: "tag035", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag041, name: "tag041", min_args: 0, max_args: 0, scopes: SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag066, name: "tag066", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag245, name: "tag245", min_args: 0, max_args: 0, scopes: SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag659, name: "tag659", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag76x, name: "tag76x", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag856, name: "tag856", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag880, name: "tag880", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::Tag998, name: "tag998", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::IsbnCheck, name: "isbncheck", min_args: 1, max_args: 1, scopes: FIELD_PRE | FIELD_POST | SUBFIELD_PRE | SUBFIELD_POST },
    BuiltinSpec { id: BuiltinId::DupField, name: "dupfield", min_args: 0, max_args: 0, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::FieldLenCheck, name: "fieldlencheck", min_args: 1, max_args: 1, scopes: FIELD_PRE | FIELD_POST },
    BuiltinSpec { id: BuiltinId::NacoClean, name: "nacoclean", min_args: 1, max_args: 1, scopes: FIELD_PRE | FIELD_POST | SUBFIELD_PRE | SUBFIELD_POST },
];

/// Look up a builtin by its control-table name.
#[must_use]
pub fn find_builtin(name: &str) -> Option<&'static BuiltinSpec> {
    BUILTIN_TABLE.iter().find(|s| s.name == name)
}

/// Look up a builtin's static spec by identity (always succeeds; every
/// [`BuiltinId`] variant has exactly one table entry).
#[must_use]
pub fn spec_of(id: BuiltinId) -> &'static BuiltinSpec {
    BUILTIN_TABLE
        .iter()
        .find(|s| s.id == id)
        .expect("every BuiltinId has a BUILTIN_TABLE entry")
}

/// A fixed-capacity byte buffer standing in for the original's
/// 16 384-byte "current data" scratch area. Writes beyond capacity are
/// a fatal [`EngineError::ScratchBufferOverflow`] rather than silently
/// truncating.
#[derive(Debug, Clone, Default)]
pub struct ScratchBuffer {
    bytes: Vec<u8>,
}

impl ScratchBuffer {
    /// Current contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrite the buffer, rejecting writes that would exceed
    /// [`SCRATCH_CAPACITY`].
    pub fn set(&mut self, data: &[u8]) -> Result<(), EngineError> {
        if data.len() > SCRATCH_CAPACITY {
            return Err(EngineError::ScratchBufferOverflow {
                len: data.len(),
                cap: SCRATCH_CAPACITY,
            });
        }
        self.bytes.clear();
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Append to the buffer, rejecting writes that would exceed
    /// [`SCRATCH_CAPACITY`].
    pub fn append(&mut self, data: &[u8]) -> Result<(), EngineError> {
        if self.bytes.len() + data.len() > SCRATCH_CAPACITY {
            return Err(EngineError::ScratchBufferOverflow {
                len: self.bytes.len() + data.len(),
                cap: SCRATCH_CAPACITY,
            });
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }
}

/// The execution context passed to every builtin call.
///
/// `input` is a read-only duplicate of the live input cursor so a
/// procedure's navigation can never desynchronize the interpreter's
/// own walk of the input record. `output` is the live, mutable output
/// cursor. The interpreter snapshots a checksum of the invariant
/// fields (the input record's field count and the output record's
/// identity) across each call; in place of the original's pointer
/// checksum we use a `debug_assert!`-gated structural check, since a
/// memory-safe host language cannot corrupt these fields by accident
/// the way a stray pointer write could.
#[derive(Debug)]
pub struct ProcParams<'a> {
    /// Read-only duplicate of the input record's cursor.
    pub input: MarcCodec,
    /// The live, mutable output cursor.
    pub output: &'a mut MarcCodec,
    /// Scratch "current data" buffer for this call.
    pub current: ScratchBuffer,
    /// Raw argument strings from the control table.
    pub args: &'a [String],
    /// Process-lifetime named buffers and switches.
    pub buffers: &'a mut NamedBufferStore,
    /// Messages the `log` builtin (or a domain procedure) wants
    /// reported to the diagnostics sink; the interpreter drains this
    /// after the call rather than threading the sink's writer type
    /// through every procedure signature.
    pub log_messages: &'a mut Vec<(crate::diagnostics::Severity, String)>,
}

impl ProcParams<'_> {
    /// Debug-only corruption check: the input duplicate's field count
    /// must not have changed across a call, since procedures only ever
    /// receive a fresh duplicate and must not retain it.
    pub(crate) fn debug_assert_not_corrupted(&self, expected_input_fields: usize) {
        debug_assert_eq!(
            self.input.field_count(),
            expected_input_fields,
            "ProcParams input cursor was mutated by a procedure call"
        );
    }
}
