//! Error types for the MARC codec, control-table compiler, and engine.
//!
//! Each distinct structural or model violation named in the specification
//! gets its own variant so callers (and the diagnostics sink) can report a
//! precise kind rather than a single opaque message.

use thiserror::Error;

/// Errors raised while parsing or serializing the MARC wire format, or while
/// mutating the logical record model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarcError {
    /// The 5-byte record-length prefix was not all-digit.
    #[error("bad record length field")]
    BadRecordLength,

    /// The leader's base-address-of-data field was not all-digit or pointed
    /// outside the record.
    #[error("bad base address of data")]
    BadBaseAddress,

    /// A directory entry contained a non-digit byte.
    #[error("non-digit byte in directory entry {0}")]
    NonDigitInDirectory(usize),

    /// The directory was not terminated by a field terminator.
    #[error("missing directory terminator")]
    MissingDirectoryTerminator,

    /// Summing directory entry lengths does not agree with the leader's
    /// declared base address / record length.
    #[error("directory entry lengths disagree with leader")]
    DirectorySumMismatch,

    /// The record was not terminated by a record terminator.
    #[error("missing record terminator")]
    MissingRecordTerminator,

    /// Fewer bytes were available than the declared record length.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Bytes the leader's length field promised.
        expected: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// The stream ended partway through a record.
    #[error("incomplete trailing record")]
    IncompleteTrailingRecord,

    /// Serialized record would exceed the 100,000 byte size ceiling.
    #[error("record would exceed maximum size of {max} bytes ({got} bytes)")]
    RecordTooLarge {
        /// Size ceiling.
        max: usize,
        /// Size that was attempted.
        got: usize,
    },

    /// Field id outside 0..=999.
    #[error("field id {0} out of range 0..=999")]
    BadFieldId(i32),

    /// A subfield code that is not a printable, non-indicator byte.
    #[error("subfield code {0:#04x} is not printable")]
    BadSubfieldCode(u8),

    /// An indicator payload was not exactly one byte.
    #[error("indicator payload length {0} != 1")]
    BadIndicatorLength(usize),

    /// Renaming a field across the fixed/variable boundary.
    #[error("cannot rename field {old} (fixed/variable class mismatch) to {new}")]
    FieldClassMismatch {
        /// Original tag.
        old: i32,
        /// Requested new tag.
        new: i32,
    },

    /// No such field (tag unknown in this record).
    #[error("no such field: tag {0}")]
    NoSuchField(i32),

    /// No such occurrence of an otherwise-known tag.
    #[error("no such occurrence {occ} of field {tag}")]
    NoSuchFieldOccurrence {
        /// Tag looked up.
        tag: i32,
        /// Occurrence requested.
        occ: i32,
    },

    /// No such subfield code in the current field.
    #[error("no such subfield: code {0:?}")]
    NoSuchSubfield(char),

    /// No such occurrence of an otherwise-known subfield code.
    #[error("no such occurrence {occ} of subfield {code:?}")]
    NoSuchSubfieldOccurrence {
        /// Subfield code looked up.
        code: char,
        /// Occurrence requested.
        occ: i32,
    },

    /// Positional navigation ran past the end of the record.
    #[error("past end of record")]
    PastEndOfRecord,

    /// Positional navigation ran past the end of the current field.
    #[error("past end of field")]
    PastEndOfField,

    /// Deleting a field/subfield out of the order the codec requires.
    #[error("out-of-order delete")]
    OutOfOrderDelete,

    /// Save/restore position stack over- or under-flowed.
    #[error("save/restore position stack imbalance")]
    SaveRestoreImbalance,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MarcError {
    fn from(e: std::io::Error) -> Self {
        MarcError::Io(e.to_string())
    }
}

/// Convenience alias for MARC codec results.
pub type Result<T> = std::result::Result<T, MarcError>;

/// Errors raised while compiling a control table into a [`crate::control::program::RuleProgram`].
///
/// Unlike [`MarcError`], most of these are *counted* rather than
/// immediately fatal; the compiler accumulates them and only aborts
/// once a configurable ceiling is exceeded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A `prep`/`post` line named a procedure not in the builtin table.
    #[error("{location}: unknown procedure {name:?}")]
    UnknownProcedure {
        /// `file(line)` style location.
        location: String,
        /// The unresolved name.
        name: String,
    },

    /// Too few arguments for the resolved procedure.
    #[error("{location}: insufficient arguments for {name:?} (need >= {min})")]
    InsufficientArguments {
        /// `file(line)` style location.
        location: String,
        /// Procedure name.
        name: String,
        /// Minimum argument count.
        min: usize,
    },

    /// Too many arguments for the resolved procedure.
    #[error("{location}: too many arguments for {name:?} (max {max})")]
    TooManyArguments {
        /// `file(line)` style location.
        location: String,
        /// Procedure name.
        name: String,
        /// Maximum argument count.
        max: usize,
    },

    /// The procedure isn't legal in the current scope/position.
    #[error("{location}: procedure {name:?} not legal in this position")]
    IllegalPosition {
        /// `file(line)` style location.
        location: String,
        /// Procedure name.
        name: String,
    },

    /// Two equally-specific range rules target the same field tag.
    #[error("{location}: duplicate input field id {tag}")]
    DuplicateFieldRule {
        /// `file(line)` style location.
        location: String,
        /// Conflicting tag.
        tag: i32,
    },

    /// An `else` or `endif` with no matching `if`.
    #[error("{location}: mismatched {keyword}")]
    MismatchedConditional {
        /// `file(line)` style location.
        location: String,
        /// `else` or `endif`.
        keyword: &'static str,
    },

    /// Nested `if` depth exceeded the bounded stack.
    #[error("{location}: if-nesting exceeds maximum depth {max}")]
    IfNestTooDeep {
        /// `file(line)` style location.
        location: String,
        /// Maximum supported depth.
        max: usize,
    },

    /// A scope directive (`field=`, `subfield=`, `indicator=`) had a bad value.
    #[error("{location}: {message}")]
    BadScopeDirective {
        /// `file(line)` style location.
        location: String,
        /// Human-readable description.
        message: String,
    },

    /// The error count exceeded the configured ceiling; compilation aborted.
    #[error("compilation aborted: {count} errors exceeds ceiling {max}")]
    TooManyErrors {
        /// Errors seen so far.
        count: usize,
        /// Configured ceiling.
        max: usize,
    },
}

/// Errors raised by the interpreter while a procedure is running that are
/// severe enough to abort the entire run (never per-record -- those are
/// expressed through `ProcStatus::Error` and `ProcStatus::KillRecord`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A procedure's `ProcParams` context was found corrupted after a call.
    #[error("badly behaved procedure {0:?}: context corrupted")]
    CorruptedProcParams(String),

    /// The scratch buffer would have overflowed its fixed capacity.
    #[error("scratch buffer overflow: {len} bytes exceeds capacity {cap}")]
    ScratchBufferOverflow {
        /// Attempted length.
        len: usize,
        /// Fixed capacity (16384 per spec).
        cap: usize,
    },

    /// A named buffer exceeded the name-length or table-size limits.
    #[error("named buffer error: {0}")]
    NamedBuffer(String),

    /// A MeSH table (`meshexcp.tbl` / `language.tbl`) failed to load.
    #[error("MeSH table load error: {0}")]
    MeshTableLoad(String),

    /// Underlying MARC codec error surfaced during engine execution.
    #[error(transparent)]
    Marc(#[from] MarcError),
}
