//! The rule interpreter: walks a compiled [`RuleProgram`] over one
//! input record at a time, driving builtins through session, record,
//! field, and subfield scope with the short-circuit semantics of
//! [`ProcStatus`].
//!
//! Grounded in `original_source/marcconv.c`'s main conversion loop (the
//! inline per-record/field/subfield walk in `main`), reshaped around an
//! explicit [`Flow`] return value in place of the original's nested
//! `goto`s.

use crate::builtins::{self, BuiltinId, ProcParams, ProcStatus, ScratchBuffer};
use crate::codec::{blank_codec, MarcCodec};
use crate::control::{NamedBufferStore, RuleProgram};
use crate::diagnostics::{Diagnostics, Location, Severity};
use crate::error::EngineError;
use crate::mesh::MeshTables;
use crate::record::{FieldPayload, INDIC1_CODE, INDIC2_CODE};
use std::io::Write;

/// Dispatch a node's builtin to the catalog, a domain-specific
/// fixed/variable-field procedure, or the MeSH rulebook.
fn dispatch(id: BuiltinId, params: &mut ProcParams, mesh_tables: &MeshTables) -> Result<ProcStatus, EngineError> {
    match id {
        BuiltinId::Mesh => crate::mesh::rulebook::run(params, mesh_tables),
        BuiltinId::Tag000
        | BuiltinId::Tag010
        | BuiltinId::Tag022
        | BuiltinId::Tag035
        | BuiltinId::Tag041
        | BuiltinId::Tag066
        | BuiltinId::Tag245
        | BuiltinId::Tag659
        | BuiltinId::Tag76x
        | BuiltinId::Tag856
        | BuiltinId::Tag880
        | BuiltinId::Tag998
        | BuiltinId::IsbnCheck
        | BuiltinId::DupField
        | BuiltinId::FieldLenCheck
        | BuiltinId::NacoClean => builtins::domain::run(id, params),
        _ => builtins::catalog::call(id, params),
    }
}

/// Where a chain walk bottomed out: which enclosing loop boundary the
/// caller must now jump to.
///
/// `DoneField`/`KillField` only ever skip the rest of the *subfield*
/// loop; the field-post chain and emptiness check still run afterward
/// for `DoneField` (only `KillField` skips them, since that field is
/// discarded regardless). This reading isn't spelled out further than
/// "short-circuit to the enclosing loop boundary"; it's the simplest
/// one consistent with every scope `donefld`/`killfld` are legal in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// The chain ran to its end normally (or had no head at all).
    Normal,
    /// `donesf`: stop at the end of the current subfield.
    DoneSf,
    /// `donefld`: stop the subfield loop early; field-post still runs.
    DoneField,
    /// `donerec`: stop at the end of the record (record-post still runs).
    DoneRecord,
    /// `killfld`: stop the subfield loop early and discard the field.
    KillField,
    /// `killrec`: record-post still runs, but the record is not written.
    KillRecord,
    /// A procedure returned `ProcStatus::Error`, an engine error occurred,
    /// or a diagnostic escalated to fatal: the record is abandoned
    /// unwritten (record-post does not run).
    Aborted,
}

/// What became of one input record after conversion.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The record survived and should be written to the output stream.
    Written(MarcCodec),
    /// The record was killed, errored, or ended up with no fields and
    /// should not be written.
    Suppressed,
    /// A diagnostic escalated past the fatal threshold; the whole run
    /// must stop (the caller should still flush `Diagnostics::finish`).
    Fatal,
}

/// Drives one compiled [`RuleProgram`] over a stream of input records.
///
/// Owns the [`NamedBufferStore`] (switches persist for the life of the
/// process) and borrows the compiled program and MeSH tables, which are
/// also process-lifetime but logically separate components.
#[derive(Debug)]
pub struct Interpreter<'a> {
    program: &'a RuleProgram,
    mesh_tables: &'a MeshTables,
    buffers: NamedBufferStore,
    scratch: ScratchBuffer,
    fatal_pending: bool,
}

impl<'a> Interpreter<'a> {
    /// Build an interpreter for `program`, with `buffers` pre-seeded
    /// from a switch file if one was given.
    #[must_use]
    pub fn new(program: &'a RuleProgram, mesh_tables: &'a MeshTables, buffers: NamedBufferStore) -> Self {
        Interpreter {
            program,
            mesh_tables,
            buffers,
            scratch: ScratchBuffer::default(),
            fatal_pending: false,
        }
    }

    /// Hand the named-buffer store back (e.g. to persist switches after the run).
    #[must_use]
    pub fn into_buffers(self) -> NamedBufferStore {
        self.buffers
    }

    /// Run the session-pre chain once, before any record is converted.
    /// Returns `true` if a diagnostic escalated to fatal.
    pub fn run_session_pre<W: Write>(&mut self, diag: &mut Diagnostics<W>) -> bool {
        self.fatal_pending = false;
        let blank = blank_codec();
        let mut output = blank_codec();
        let loc = Location::Record { rec_no: 0, ident: Some("session".into()) };
        self.scratch = ScratchBuffer::default();
        self.run_chain(self.program.session_pre, &blank, &mut output, &loc, diag);
        self.fatal_pending
    }

    /// Run the session-post chain once, after the last record is converted.
    pub fn run_session_post<W: Write>(&mut self, diag: &mut Diagnostics<W>) -> bool {
        self.fatal_pending = false;
        let blank = blank_codec();
        let mut output = blank_codec();
        let loc = Location::Record { rec_no: 0, ident: Some("session".into()) };
        self.scratch = ScratchBuffer::default();
        self.run_chain(self.program.session_post, &blank, &mut output, &loc, diag);
        self.fatal_pending
    }

    /// Convert one input record, producing the output record to write
    /// (if any).
    pub fn convert_record<W: Write>(
        &mut self,
        input: &MarcCodec,
        rec_no: usize,
        diag: &mut Diagnostics<W>,
    ) -> RecordOutcome {
        self.fatal_pending = false;
        let mut output = MarcCodec::new(crate::record::MarcRecord::new(input.record().leader.clone()));
        let loc = Location::Record { rec_no, ident: record_ident(input) };
        let mut killed = false;

        let mut skip_fields = false;
        self.scratch = ScratchBuffer::default();
        match self.run_chain(self.program.record_pre, input, &mut output, &loc, diag) {
            Flow::Aborted => return self.aborted_outcome(),
            Flow::KillRecord => {
                killed = true;
                skip_fields = true;
            }
            Flow::DoneRecord => skip_fields = true,
            _ => {}
        }

        if !skip_fields {
            'fields: for field in &input.record().fields {
                let tag = field.tag;
                if output.add_field(tag).is_err() {
                    diag.report(&loc, Severity::Error, &format!("cannot add output field for tag {tag}"));
                    continue;
                }
                let rules = self.program.fields.get(&tag);

                let mut skip_subfields = false;
                let mut delete_field = false;
                // Set once a Done/KillRecord surfaces from any nested
                // chain; this field is finalized below exactly like any
                // other, then the per-field loop stops for good.
                let mut stop_record = false;

                if let Some(rules) = rules {
                    self.scratch = ScratchBuffer::default();
                    match self.run_chain(rules.pre, input, &mut output, &loc, diag) {
                        Flow::Aborted => return self.aborted_outcome(),
                        Flow::DoneField => skip_subfields = true,
                        Flow::KillField => {
                            skip_subfields = true;
                            delete_field = true;
                        }
                        Flow::DoneRecord => {
                            skip_subfields = true;
                            stop_record = true;
                        }
                        Flow::KillRecord => {
                            skip_subfields = true;
                            stop_record = true;
                            killed = true;
                        }
                        _ => {}
                    }
                }

                if !skip_subfields {
                    match &field.payload {
                        FieldPayload::Fixed(bytes) => {
                            if output.write_fixed_bytes(0, bytes).is_err() {
                                diag.report(&loc, Severity::Error, &format!("cannot copy fixed field {tag}"));
                            }
                        }
                        FieldPayload::Variable { indic1, indic2, subfields } => {
                            let total = 2 + subfields.len();
                            let mut stop_subfields = false;
                            for sf_idx in 0..total {
                                let (code, value) = if sf_idx == 0 {
                                    (INDIC1_CODE, vec![*indic1])
                                } else if sf_idx == 1 {
                                    (INDIC2_CODE, vec![*indic2])
                                } else {
                                    let sf = &subfields[sf_idx - 2];
                                    (sf.code, sf.value.clone())
                                };

                                let sub_rules = rules.and_then(|r| r.subfields.get(&code));
                                let pre_head = sub_rules.and_then(|r| r.pre);
                                let post_head = sub_rules.and_then(|r| r.post);

                                self.scratch = ScratchBuffer::default();
                                if self.scratch.set(&value).is_err() {
                                    diag.report(&loc, Severity::Error, "subfield exceeds scratch capacity");
                                    continue;
                                }

                                let mut suppressed = false;
                                match self.run_chain(pre_head, input, &mut output, &loc, diag) {
                                    Flow::Aborted => return self.aborted_outcome(),
                                    Flow::DoneSf => suppressed = true,
                                    Flow::DoneField => {
                                        suppressed = true;
                                        stop_subfields = true;
                                    }
                                    Flow::KillField => {
                                        suppressed = true;
                                        stop_subfields = true;
                                        delete_field = true;
                                    }
                                    Flow::DoneRecord => {
                                        suppressed = true;
                                        stop_subfields = true;
                                        stop_record = true;
                                    }
                                    Flow::KillRecord => {
                                        suppressed = true;
                                        stop_subfields = true;
                                        stop_record = true;
                                        killed = true;
                                    }
                                    _ => {}
                                }

                                if !suppressed {
                                    let write_result = if code == INDIC1_CODE {
                                        output.set_indicator(1, self.scratch.as_slice()[0])
                                    } else if code == INDIC2_CODE {
                                        output.set_indicator(2, self.scratch.as_slice()[0])
                                    } else {
                                        output.add_subfield(code, self.scratch.as_slice().to_vec())
                                    };
                                    if write_result.is_err() {
                                        diag.report(&loc, Severity::Error, &format!("cannot write subfield {code:#04x}"));
                                    } else if code != INDIC1_CODE && code != INDIC2_CODE {
                                        // add_subfield leaves the cursor on the new
                                        // subfield; step back so the next node's
                                        // save/restore scoping starts from a stable spot.
                                        let _ = output.goto_subfield(0);
                                    }

                                    match self.run_chain(post_head, input, &mut output, &loc, diag) {
                                        Flow::Aborted => return self.aborted_outcome(),
                                        Flow::DoneField => stop_subfields = true,
                                        Flow::KillField => {
                                            stop_subfields = true;
                                            delete_field = true;
                                        }
                                        Flow::DoneRecord => {
                                            stop_subfields = true;
                                            stop_record = true;
                                        }
                                        Flow::KillRecord => {
                                            stop_subfields = true;
                                            stop_record = true;
                                            killed = true;
                                        }
                                        _ => {}
                                    }
                                }

                                if stop_subfields {
                                    break;
                                }
                            }
                        }
                    }
                }

                if !delete_field && !stop_record {
                    if let Some(rules) = rules {
                        let _ = output.goto_subfield(0);
                        match self.run_chain(rules.post, input, &mut output, &loc, diag) {
                            Flow::Aborted => return self.aborted_outcome(),
                            Flow::KillField => delete_field = true,
                            Flow::DoneRecord => stop_record = true,
                            Flow::KillRecord => {
                                stop_record = true;
                                killed = true;
                            }
                            _ => {}
                        }
                    }
                }

                let _ = output.goto_subfield(0);
                if delete_field || field_is_empty(&output) {
                    let _ = output.delete_current_field();
                }

                if stop_record {
                    break 'fields;
                }
            }
        }

        match self.run_chain(self.program.record_post, input, &mut output, &loc, diag) {
            Flow::Aborted => return self.aborted_outcome(),
            Flow::KillRecord => killed = true,
            _ => {}
        }

        if self.fatal_pending {
            return RecordOutcome::Fatal;
        }
        if killed || output.record().fields.is_empty() {
            RecordOutcome::Suppressed
        } else {
            RecordOutcome::Written(output)
        }
    }

    fn aborted_outcome(&self) -> RecordOutcome {
        if self.fatal_pending {
            RecordOutcome::Fatal
        } else {
            RecordOutcome::Suppressed
        }
    }

    /// Walk a chain starting at `head`, invoking each node's builtin and
    /// following `true_next`/`false_next` per its returned status.
    ///
    /// Output cursor save/restore wraps every call: a procedure that
    /// completes normally (`Ok`/`IfFailed`) has its cursor movement
    /// undone, so auxiliary fields it created along the way don't
    /// disturb the caller's position. A short-circuit status leaves the
    /// cursor exactly where the procedure left it, since the caller
    /// (this interpreter) needs it to act on the field the procedure
    /// was pointed at (e.g. to delete it for `KillField`).
    fn run_chain<W: Write>(
        &mut self,
        head: Option<usize>,
        input_view: &MarcCodec,
        output: &mut MarcCodec,
        loc: &Location,
        diag: &mut Diagnostics<W>,
    ) -> Flow {
        let mut cur = head;
        while let Some(idx) = cur {
            let node = self.program.nodes[idx].clone();
            let before_fields = input_view.field_count();
            let saved = output.save_position().is_ok();

            let mut log_messages = Vec::new();
            let result = {
                let mut params = ProcParams {
                    input: input_view.clone(),
                    output,
                    current: std::mem::take(&mut self.scratch),
                    args: &node.args,
                    buffers: &mut self.buffers,
                    log_messages: &mut log_messages,
                };
                let status = dispatch(node.builtin, &mut params, self.mesh_tables);
                params.debug_assert_not_corrupted(before_fields);
                self.scratch = params.current;
                status
            };

            for (severity, message) in log_messages {
                if diag.report(loc, severity, &message) {
                    self.fatal_pending = true;
                    return Flow::Aborted;
                }
            }

            match result {
                Ok(ProcStatus::Ok) => {
                    if saved {
                        let _ = output.restore_position();
                    }
                    cur = node.true_next;
                }
                Ok(ProcStatus::IfFailed) => {
                    if saved {
                        let _ = output.restore_position();
                    }
                    cur = node.false_next;
                }
                Ok(ProcStatus::DoneSf) => return Flow::DoneSf,
                Ok(ProcStatus::DoneField) => return Flow::DoneField,
                Ok(ProcStatus::DoneRecord) => return Flow::DoneRecord,
                Ok(ProcStatus::KillField) => return Flow::KillField,
                Ok(ProcStatus::KillRecord) => return Flow::KillRecord,
                Ok(ProcStatus::Error) => {
                    if diag.report(loc, Severity::Error, &format!("{:?} returned an error status", node.builtin)) {
                        self.fatal_pending = true;
                    }
                    return Flow::Aborted;
                }
                Err(e) => {
                    if diag.report(loc, Severity::Error, &e.to_string()) {
                        self.fatal_pending = true;
                    }
                    return Flow::Aborted;
                }
            }
        }
        Flow::Normal
    }
}

/// Extract a human-readable record identifier (the 001 control number,
/// if present) for diagnostics.
fn record_ident(codec: &MarcCodec) -> Option<String> {
    let idx = codec.record().find(1, 0)?;
    match &codec.record().fields[idx].payload {
        FieldPayload::Fixed(bytes) => Some(String::from_utf8_lossy(bytes).trim().to_string()),
        FieldPayload::Variable { .. } => None,
    }
}

/// Whether the output field at the cursor carries no real content: a
/// zero-length fixed field, or a variable field with no subfields
/// (indicators alone don't count as content).
fn field_is_empty(output: &MarcCodec) -> bool {
    let idx = output.position().field;
    if idx == 0 {
        return false;
    }
    match &output.record().fields[idx - 1].payload {
        FieldPayload::Fixed(bytes) => bytes.is_empty(),
        FieldPayload::Variable { subfields, .. } => subfields.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{read_codec, write_codec};
    use crate::control::ControlCompiler;
    use std::io::Cursor;

    fn compile(src: &str) -> RuleProgram {
        let mut compiler = ControlCompiler::new(50);
        compiler.compile_file("test.ctl", Cursor::new(src.as_bytes())).unwrap();
        let (program, errors) = compiler.finish();
        assert!(errors.is_empty(), "unexpected compile errors: {errors:?}");
        program
    }

    fn make_record(tag245_title: &str) -> MarcCodec {
        let mut codec = blank_codec();
        codec.add_field(1).unwrap();
        codec.write_fixed_bytes(0, b"ocm00000000").unwrap();
        codec.add_field(245).unwrap();
        codec.add_subfield(b'a', tag245_title.as_bytes().to_vec()).unwrap();
        codec
    }

    fn run_one(program: &RuleProgram, input: &MarcCodec) -> RecordOutcome {
        let tables = MeshTables::default();
        let mut interp = Interpreter::new(program, &tables, NamedBufferStore::new());
        let mut log = Vec::new();
        let mut diag = Diagnostics::new(&mut log, 50).unwrap();
        interp.convert_record(input, 1, &mut diag)
    }

    #[test]
    fn empty_program_reproduces_record_byte_for_byte() {
        let program = RuleProgram::empty();
        let input = make_record("The hobbit");
        let mut in_bytes = Vec::new();
        write_codec(&mut in_bytes, &input).unwrap();

        match run_one(&program, &input) {
            RecordOutcome::Written(out) => {
                let mut out_bytes = Vec::new();
                write_codec(&mut out_bytes, &out).unwrap();
                assert_eq!(in_bytes, out_bytes);
            }
            other => panic!("expected Written, got {other:?}"),
        }
    }

    #[test]
    fn field_rule_renames_tag() {
        let program = compile("field = 245\nprep = renfld / 650\n");
        let input = make_record("The hobbit");
        match run_one(&program, &input) {
            RecordOutcome::Written(out) => {
                assert!(out.record().find(650, 0).is_some());
                assert!(out.record().find(245, 0).is_none());
            }
            other => panic!("expected Written, got {other:?}"),
        }
    }

    #[test]
    fn conditional_killrec_suppresses_record() {
        let program = compile("field = 245\nsubfield = a\nprep = if / 245$a / = / \"The hobbit\"\nprep = killrec\n");
        let input = make_record("The hobbit");
        assert!(matches!(run_one(&program, &input), RecordOutcome::Suppressed));

        let input2 = make_record("Something else");
        assert!(matches!(run_one(&program, &input2), RecordOutcome::Written(_)));
    }

    #[test]
    fn read_codec_round_trips_through_identity_program() {
        let mut raw = Vec::new();
        write_codec(&mut raw, &make_record("Identity test")).unwrap();
        let mut cursor = Cursor::new(raw);
        let input = read_codec(&mut cursor).unwrap().unwrap();
        let program = RuleProgram::empty();
        assert!(matches!(run_one(&program, &input), RecordOutcome::Written(_)));
    }
}
