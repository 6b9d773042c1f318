//! Control-table compiler: turns a textual control file into a
//! [`program::RuleProgram`] the interpreter walks per record.

pub mod buffers;
pub mod compiler;
pub mod line_reader;
pub mod program;

pub use buffers::{load_switches, NamedBufferStore};
pub use compiler::ControlCompiler;
pub use program::{FieldRules, ProcNode, RuleProgram, SubfieldRules};
