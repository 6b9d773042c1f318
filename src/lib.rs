//! # marcconv-rs
//!
//! A declarative, control-table-driven engine for converting MARC
//! bibliographic records between content conventions: fields are
//! renamed, split, merged, re-indexed, normalized, conditionally
//! suppressed, cross-field combined, and supplemented with derived
//! data, all according to an external rule file compiled at startup
//! rather than hardcoded in the engine.
//!
//! ## Modules
//!
//! - [`leader`] / [`record`] — the logical MARC record model (leader
//!   plus an owned tree of fields and subfields).
//! - [`codec`] — the navigable cursor over a record (wire-format
//!   read/write, positional and (tag, occurrence) lookup, mutation,
//!   save/restore).
//! - [`control`] — the control-table compiler: line reader, named
//!   buffers/switches, and the `RuleProgram` it produces.
//! - [`builtins`] — the builtin procedure catalog and the
//!   data-source/destination addressing every procedure argument goes
//!   through.
//! - [`mesh`] — the MeSH 650/651/655 recombination rulebook.
//! - [`interpreter`] — drives a compiled `RuleProgram` over each input
//!   record at session/record/field/subfield scope.
//! - [`argparser`] — the command-line surface's positional + short-option parser.
//! - [`diagnostics`] — the severity-tagged, per-session diagnostics sink.
//! - [`error`] — error types shared across the above.

pub mod argparser;
pub mod builtins;
pub mod codec;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod interpreter;
pub mod leader;
pub mod mesh;
pub mod record;

pub use codec::MarcCodec;
pub use control::{ControlCompiler, NamedBufferStore, RuleProgram};
pub use error::{EngineError, MarcError};
pub use interpreter::{Interpreter, RecordOutcome};
pub use leader::Leader;
pub use mesh::MeshTables;
pub use record::MarcRecord;
