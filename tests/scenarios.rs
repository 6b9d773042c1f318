//! End-to-end scenarios driving a compiled control table through the
//! interpreter over hand-built records.

use marcconv_rs::codec::blank_codec;
use marcconv_rs::control::{ControlCompiler, NamedBufferStore};
use marcconv_rs::diagnostics::Diagnostics;
use marcconv_rs::mesh::MeshTables;
use marcconv_rs::record::FieldPayload;
use marcconv_rs::{Interpreter, MarcCodec, RecordOutcome, RuleProgram};
use std::io::Cursor;

fn compile(src: &str) -> RuleProgram {
    let mut compiler = ControlCompiler::new(50);
    compiler.compile_file("scenario.ctl", Cursor::new(src.as_bytes())).unwrap();
    let (program, errors) = compiler.finish();
    assert!(errors.is_empty(), "unexpected compile errors: {errors:?}");
    program
}

fn run_record(program: &RuleProgram, input: &MarcCodec) -> RecordOutcome {
    let tables = MeshTables::default();
    let mut interp = Interpreter::new(program, &tables, NamedBufferStore::new());
    let mut log = Vec::new();
    let mut diag = Diagnostics::new(&mut log, 50).unwrap();
    interp.convert_record(input, 1, &mut diag)
}

fn subfield_value<'a>(codec: &'a MarcCodec, tag: i32, code: u8) -> Option<&'a [u8]> {
    let idx = codec.record().find(tag, 0)?;
    match &codec.record().fields[idx].payload {
        FieldPayload::Variable { subfields, .. } => subfields.iter().find(|sf| sf.code == code).map(|sf| sf.value.as_slice()),
        FieldPayload::Fixed(_) => None,
    }
}

/// Scenario B: a `post = renfld / 10` rule under `field = 20` renames
/// the tag on the way out without touching the subfield payload.
#[test]
fn scenario_b_field_rename() {
    let program = compile("field = 20\npost = renfld / 10\n");

    let mut input = blank_codec();
    input.add_field(20).unwrap();
    input.add_subfield(b'a', b"xyz".to_vec()).unwrap();

    match run_record(&program, &input) {
        RecordOutcome::Written(out) => {
            assert!(out.record().find(10, 0).is_some(), "renamed field should be addressable at tag 10");
            assert!(out.record().find(20, 0).is_none(), "original tag should no longer be present");
            assert_eq!(subfield_value(&out, 10, b'a'), Some(b"xyz".as_slice()));
        }
        other => panic!("expected Written, got {other:?}"),
    }
}

/// Scenario C: a record-pre `if`/`killrec` chain only fires when the
/// condition holds; flipping `=` to `!=` flips which branch fires.
#[test]
fn scenario_c_conditional_kill() {
    let program = compile("record\nprep = if / \"hello\" / = / \"world\"\nprep = killrec\nendif\n");

    let mut input = blank_codec();
    input.add_field(1).unwrap();
    input.write_fixed_bytes(0, b"ignored").unwrap();

    assert!(matches!(run_record(&program, &input), RecordOutcome::Written(_)), "\"hello\" = \"world\" is false, record should survive");
}

#[test]
fn scenario_c_conditional_kill_fires_on_not_equal() {
    let program = compile("record\nprep = if / \"hello\" / != / \"world\"\nprep = killrec\nendif\n");

    let mut input = blank_codec();
    input.add_field(1).unwrap();
    input.write_fixed_bytes(0, b"ignored").unwrap();

    assert!(matches!(run_record(&program, &input), RecordOutcome::Suppressed), "\"hello\" != \"world\" is true, killrec should fire");
}

/// Scenario D: `copy` stashes the current subfield in a named buffer,
/// then `substr` rewrites the scratch data from that buffer before it
/// is committed to the output field.
#[test]
fn scenario_d_substring_via_named_buffers() {
    let program = compile(
        "field = 245\n\
         subfield = a\n\
         prep = copy / &src / %data\n\
         prep = substr / %data / &src / 6 / 5\n",
    );

    let mut input = blank_codec();
    input.add_field(245).unwrap();
    input.add_subfield(b'a', b"hello world".to_vec()).unwrap();

    match run_record(&program, &input) {
        RecordOutcome::Written(out) => {
            assert_eq!(subfield_value(&out, 245, b'a'), Some(b"world".as_slice()));
        }
        other => panic!("expected Written, got {other:?}"),
    }
}
