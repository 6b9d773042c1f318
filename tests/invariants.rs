//! Cross-cutting behavioral invariants, independent of any one scenario:
//! codec round-tripping, the empty-program identity law, `killrec`
//! suppression, and save/restore stack balance.

use marcconv_rs::codec::{blank_codec, read_codec, write_codec, MarcCodec};
use marcconv_rs::control::{ControlCompiler, NamedBufferStore};
use marcconv_rs::diagnostics::Diagnostics;
use marcconv_rs::leader::Leader;
use marcconv_rs::mesh::MeshTables;
use marcconv_rs::record::{Field, FieldPayload, MarcRecord, Subfield};
use marcconv_rs::{Interpreter, RecordOutcome, RuleProgram};
use proptest::collection::vec as pvec;
use proptest::prelude::*;
use std::io::Cursor;

fn printable_byte() -> impl Strategy<Value = u8> {
    0x20u8..=0x7E
}

fn subfield_strategy() -> impl Strategy<Value = Subfield> {
    (0x21u8..=0x7E, pvec(printable_byte(), 0..12)).prop_map(|(code, value)| Subfield { code, value })
}

fn field_strategy() -> impl Strategy<Value = Field> {
    prop_oneof![
        (1i32..=9, pvec(printable_byte(), 0..20)).prop_map(|(tag, bytes)| Field {
            tag,
            payload: FieldPayload::Fixed(bytes),
        }),
        (10i32..=999, printable_byte(), printable_byte(), pvec(subfield_strategy(), 0..6)).prop_map(
            |(tag, indic1, indic2, subfields)| Field {
                tag,
                payload: FieldPayload::Variable {
                    indic1,
                    indic2,
                    subfields: subfields.into(),
                },
            }
        ),
    ]
}

fn record_strategy() -> impl Strategy<Value = MarcRecord> {
    pvec(field_strategy(), 0..8).prop_map(|fields| {
        let mut rec = MarcRecord::new(Leader::default());
        rec.fields = fields;
        rec
    })
}

fn run_record(program: &RuleProgram, input: &MarcCodec) -> RecordOutcome {
    let tables = MeshTables::default();
    let mut interp = Interpreter::new(program, &tables, NamedBufferStore::new());
    let mut log = Vec::new();
    let mut diag = Diagnostics::new(&mut log, 50).unwrap();
    interp.convert_record(input, 1, &mut diag)
}

proptest! {
    /// A record written to the wire and read back produces the same
    /// logical field list, byte for byte.
    #[test]
    fn codec_round_trip_preserves_fields(record in record_strategy()) {
        let mut buf = Vec::new();
        write_codec(&mut buf, &MarcCodec::new(record.clone())).unwrap();
        let mut cursor = Cursor::new(buf);
        let parsed = read_codec(&mut cursor).unwrap().unwrap();
        prop_assert_eq!(parsed.record().fields.clone(), record.fields);
    }

    /// An empty control program (no rules at all) reproduces every
    /// input record's field list unchanged.
    #[test]
    fn empty_program_is_identity(record in record_strategy()) {
        let program = RuleProgram::empty();
        let input = MarcCodec::new(record.clone());
        match run_record(&program, &input) {
            RecordOutcome::Written(out) => prop_assert_eq!(out.record().fields.clone(), record.fields),
            other => prop_assert!(false, "expected Written, got {:?}", other),
        }
    }
}

/// A `record-pre: killrec` chain empties the output regardless of what
/// the input record contained.
#[test]
fn killrec_suppresses_any_record() {
    let mut compiler = ControlCompiler::new(50);
    compiler
        .compile_file("killrec.ctl", Cursor::new(b"record\nprep = killrec\n".as_slice()))
        .unwrap();
    let (program, errors) = compiler.finish();
    assert!(errors.is_empty());

    let mut input = blank_codec();
    input.add_field(245).unwrap();
    input.add_subfield(b'a', b"Anything at all".to_vec()).unwrap();

    assert!(matches!(run_record(&program, &input), RecordOutcome::Suppressed));
}

/// The save/restore cursor stack returns to depth zero after a matched
/// save/restore pair, and detects an unmatched restore as an error.
#[test]
fn save_restore_stack_balances() {
    let mut codec = blank_codec();
    codec.add_field(245).unwrap();
    codec.add_subfield(b'a', b"Title".to_vec()).unwrap();

    assert_eq!(codec.save_depth(), 0);
    codec.save_position().unwrap();
    codec.save_position().unwrap();
    assert_eq!(codec.save_depth(), 2);
    codec.restore_position().unwrap();
    codec.restore_position().unwrap();
    assert_eq!(codec.save_depth(), 0);

    assert!(codec.restore_position().is_err());
}
