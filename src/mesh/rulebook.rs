//! The MeSH 650/651/655 recombination rulebook: the record-level
//! post-processing pass run over every 650/651/655 in a record.
//!
//! Grounded in `original_source/meshproc.c`'s `cmp_Mesh` entry point
//! and its `mrule_*` per-rule helpers; the working-model types this
//! operates on live in [`super`].

use super::{
    Disposition, ExceptionGroup, MeshField, MeshTables, NoRecombine, MAX_MESH_FIELDS,
};
use crate::builtins::{ProcParams, ProcStatus};
use crate::diagnostics::Severity;
use crate::error::EngineError;
use crate::record::FieldPayload;

/// Temporary subfield code used while combining age-source `$a` values
/// into age-target fields, so a freshly-added `$x` never collides with
/// an `$x` already present on the target before the sweep at the end
/// of the rule. Swept back to `$x` once the rule finishes.
const AGE_COMBINE_TEMP_CODE: u8 = b'|';

/// Run the MeSH recombination rulebook against the output record's
/// current 650/651/655 fields, replacing them with the recombined,
/// sorted result.
pub fn run(params: &mut ProcParams, tables: &MeshTables) -> Result<ProcStatus, EngineError> {
    let mut fields = collect_working_fields(params, tables)?;

    mark_ok_650s(&mut fields);

    if fields.iter().any(|f| f.tag == 650 && f.disposition == Disposition::Output) {
        age_650(&mut fields);
        case_report(&mut fields);
        geographic(&mut fields);
        block_v_on_9n(&mut fields);
        let dict_triggered = forms(&mut fields);
        if dict_triggered {
            if let Some(status) = dict_language(&mut fields, params, tables)? {
                return Ok(status);
            }
        }
        indic2_2(&mut fields);
    } else {
        no_650_path(&mut fields);
    }

    drop_dollar9(&mut fields);
    output_nonmesh_655(&mut fields);
    if let Some(status) = end_period(&mut fields, params) {
        return Ok(status);
    }

    sort_and_emit(&mut fields, params)
}

/// Copy every 650/651/655 field out of the output record into the
/// bounded working array, annotating each subfield via the exception
/// table, and delete the originals (they are re-emitted, recombined,
/// at the end of the rulebook).
fn collect_working_fields(
    params: &mut ProcParams,
    tables: &MeshTables,
) -> Result<Vec<MeshField>, EngineError> {
    const MESH_TAGS: [i32; 3] = [650, 651, 655];
    let mut fields = Vec::new();
    let mut source_positions = Vec::new();
    for (i, f) in params.output.record().fields.iter().enumerate() {
        if !MESH_TAGS.contains(&f.tag) {
            continue;
        }
        if fields.len() >= MAX_MESH_FIELDS {
            break;
        }
        if let FieldPayload::Variable { indic1, indic2, subfields } = &f.payload {
            let mut mf = MeshField::new(f.tag, *indic1, *indic2);
            for sf in subfields {
                let group = tables.exceptions.lookup(f.tag, sf.code, &sf.value);
                mf.add_subfield(group, sf.code, sf.value.clone());
            }
            fields.push(mf);
            source_positions.push(i);
        }
    }
    for &i in source_positions.iter().rev() {
        params.output.goto_field(i + 1)?;
        params.output.delete_current_field()?;
    }
    Ok(fields)
}

fn mark_ok_650s(fields: &mut [MeshField]) {
    for mf in fields.iter_mut().filter(|m| m.tag == 650) {
        mf.disposition = Disposition::Output;
    }
}

fn has_dollar9_a(mf: &MeshField) -> bool {
    mf.subfields.iter().any(|sf| sf.code == b'9' && sf.value == b"a")
}

/// Appends `value` as subfield `code` onto `fields[target]`, following
/// the duplicate-on-tail-collision rule shared by every combination
/// step.
fn combine_one(fields: &mut Vec<MeshField>, target: usize, code: u8, value: Vec<u8>) {
    let tail_matches = fields[target]
        .subfields
        .last()
        .is_some_and(|sf| sf.code == code);
    if tail_matches {
        let same = fields[target].subfields.last().unwrap().value == value;
        if same {
            return;
        }
        let mut dup = fields[target].clone();
        dup.subfields.pop();
        dup.add_subfield(None, code, value);
        fields.push(dup);
    } else {
        fields[target].add_subfield(None, code, value);
    }
}

/// Classifies each `Age650` 650 by indicator-1 and the presence of any
/// field carrying `$9=a`, combining age-source `$a` into age-target
/// `$x`.
fn age_650(fields: &mut Vec<MeshField>) {
    let has_9a_anywhere = fields.iter().any(has_dollar9_a);
    let mut age_sources: Vec<Vec<u8>> = Vec::new();

    for i in 0..fields.len() {
        if fields[i].tag != 650 || !fields[i].has_exception(ExceptionGroup::Age650) {
            continue;
        }
        let ind1_is_2 = fields[i].indic1 == b'2';
        match (ind1_is_2, has_9a_anywhere) {
            (false, false) => fields[i].keep_indicators = true,
            (false, true) => {
                if let Some(idx) = fields[i].find_subfield(b'a', 0) {
                    age_sources.push(fields[i].subfields[idx].value.clone());
                }
                fields[i].disposition = Disposition::Combine;
            }
            (true, false) => fields[i].disposition = Disposition::Complete,
            (true, true) => fields[i].keep_indicators = true,
        }
    }

    if age_sources.is_empty() {
        return;
    }

    for mf in fields.iter_mut().filter(|f| has_dollar9_a(f)) {
        mf.keep_indicators = true;
    }

    let snapshot_len = fields.len();
    for a_val in &age_sources {
        for i in 0..snapshot_len {
            if !has_dollar9_a(&fields[i]) || !fields[i].allows_recombine(AGE_COMBINE_TEMP_CODE) {
                continue;
            }
            combine_one(fields, i, AGE_COMBINE_TEMP_CODE, a_val.clone());
        }
    }

    for mf in fields.iter_mut() {
        for sf in &mut mf.subfields {
            if sf.code == AGE_COMBINE_TEMP_CODE {
                sf.code = b'x';
            }
        }
    }
}

/// Retags any field whose first subfield is in group `CaseRep` to 655.
fn case_report(fields: &mut [MeshField]) {
    for mf in fields.iter_mut() {
        let is_case_rep = mf.subfields.first().is_some_and(|sf| sf.group == Some(ExceptionGroup::CaseRep));
        if !is_case_rep {
            continue;
        }
        mf.tag = 655;
        match mf.find_subfield(b'2', 0) {
            Some(idx) => mf.subfields[idx].value = b"mesh".to_vec(),
            None => {
                mf.add_subfield(None, b'2', b"mesh".to_vec());
            }
        }
        mf.disposition = Disposition::Combine;
    }
}

/// Adds each 651's `$a` as `$z` on every eligible output 650, with the
/// `USMed1`/`USMed` suppression special case.
fn geographic(fields: &mut Vec<MeshField>) {
    let snapshot_len = fields.len();
    for i in 0..snapshot_len {
        if fields[i].tag != 651 {
            continue;
        }
        let Some(a_idx) = fields[i].find_subfield(b'a', 0) else { continue };
        let a_group = fields[i].subfields[a_idx].group;
        let a_val = fields[i].subfields[a_idx].value.clone();
        for j in 0..snapshot_len {
            if fields[j].tag != 650
                || fields[j].disposition != Disposition::Output
                || !fields[j].allows_recombine(b'z')
            {
                continue;
            }
            if a_group == Some(ExceptionGroup::USMed1) && fields[j].has_exception(ExceptionGroup::USMed) {
                continue;
            }
            combine_one(fields, j, b'z', a_val.clone());
        }
    }
}

/// Blocks `$v` recombination on any 650 carrying `$9=n`.
fn block_v_on_9n(fields: &mut [MeshField]) {
    for mf in fields.iter_mut() {
        if mf.tag == 650 && mf.subfields.iter().any(|sf| sf.code == b'9' && sf.value == b"n") {
            mf.no_recombine = NoRecombine::Blocked(b'v');
        }
    }
}

/// Adds each mesh-form 655's `$a` as `$v` on every eligible output
/// 650, applying the `Stats5`/`Law5` exclusion filters; returns
/// whether any `Dict`-group combination happened, which triggers the
/// language pass.
fn forms(fields: &mut Vec<MeshField>) -> bool {
    let snapshot_len = fields.len();
    let mut dict_triggered = false;
    for i in 0..snapshot_len {
        if fields[i].tag != 655 {
            continue;
        }
        let has_2_mesh = fields[i].subfields.iter().any(|sf| sf.code == b'2' && sf.value == b"mesh");
        if !(has_2_mesh || fields[i].indic2 == b'2') {
            continue;
        }
        let Some(a_idx) = fields[i].find_subfield(b'a', 0) else { continue };
        let a_group = fields[i].subfields[a_idx].group;
        let a_val = fields[i].subfields[a_idx].value.clone();
        if a_group == Some(ExceptionGroup::Dict) {
            dict_triggered = true;
        }
        for j in 0..snapshot_len {
            if fields[j].tag != 650
                || fields[j].disposition != Disposition::Output
                || !fields[j].allows_recombine(b'v')
            {
                continue;
            }
            match a_group {
                Some(ExceptionGroup::Stats5) if fields[j].has_exception(ExceptionGroup::Stats) => continue,
                Some(ExceptionGroup::Law5) if fields[j].has_exception(ExceptionGroup::Law) => continue,
                _ => {}
            }
            combine_one(fields, j, b'v', a_val.clone());
        }
    }
    dict_triggered
}

/// Expands 041 `$a` language codes onto every `Dict`-group output 650
/// as a new `$x`, first duplicating each target as a non-recombinable
/// language-free copy if a non-specific (`und`/`mul`) code was present.
/// Returns `Some(status)` only when an unknown language code forces
/// the whole record to be killed.
fn dict_language(
    fields: &mut Vec<MeshField>,
    params: &ProcParams,
    tables: &MeshTables,
) -> Result<Option<ProcStatus>, EngineError> {
    let dict_targets: Vec<usize> = (0..fields.len())
        .filter(|&j| {
            fields[j].tag == 650
                && fields[j].disposition == Disposition::Output
                && fields[j].has_exception(ExceptionGroup::Dict)
        })
        .collect();
    if dict_targets.is_empty() {
        return Ok(None);
    }

    let mut codes = Vec::new();
    for f in &params.output.record().fields {
        if f.tag != 41 {
            continue;
        }
        if let FieldPayload::Variable { subfields, .. } = &f.payload {
            for sf in subfields {
                if sf.code == b'a' {
                    codes.push(String::from_utf8_lossy(&sf.value).to_ascii_lowercase());
                }
            }
        }
    }

    let mut non_specific_present = false;
    let mut names = Vec::new();
    for code in &codes {
        if code == "und" || code == "mul" {
            non_specific_present = true;
            continue;
        }
        match tables.languages.lookup(code) {
            Some(name) => names.push(name.to_string()),
            None => return Ok(Some(ProcStatus::KillRecord)),
        }
    }

    if non_specific_present {
        for &j in &dict_targets {
            let mut dup = fields[j].clone();
            dup.no_recombine = NoRecombine::AllBlocked;
            fields.push(dup);
        }
    }

    for name in &names {
        for &j in &dict_targets {
            combine_one(fields, j, b'x', name.as_bytes().to_vec());
        }
    }

    Ok(None)
}

/// Forces indicator-2 to `'2'` on every output field not protected by
/// `keep_indicators`.
fn indic2_2(fields: &mut [MeshField]) {
    for mf in fields.iter_mut() {
        if mf.disposition == Disposition::Output && !mf.keep_indicators {
            mf.indic2 = b'2';
        }
    }
}

fn is_mesh_655(mf: &MeshField) -> bool {
    let has_2 = mf.subfields.iter().any(|sf| sf.code == b'2');
    let has_2_mesh = mf.subfields.iter().any(|sf| sf.code == b'2' && sf.value == b"mesh");
    (mf.indic2 == b'7' && has_2_mesh) || (mf.indic2 == b'2' && !has_2)
}

/// The branch taken when no 650 survives: normalizes 651 indicators, and either folds mesh-form 655s
/// into every 651 as `$v` or, absent any 651, validates and outputs
/// them standalone.
fn no_650_path(fields: &mut Vec<MeshField>) {
    let has_651 = fields.iter().any(|f| f.tag == 651);
    for mf in fields.iter_mut().filter(|m| m.tag == 651) {
        mf.indic1 = b' ';
        mf.indic2 = b'2';
        mf.disposition = Disposition::Output;
    }

    let snapshot_len = fields.len();
    for i in 0..snapshot_len {
        if fields[i].tag != 655 || !is_mesh_655(&fields[i]) {
            continue;
        }
        if has_651 {
            let Some(a_idx) = fields[i].find_subfield(b'a', 0) else { continue };
            let a_val = fields[i].subfields[a_idx].value.clone();
            for j in 0..snapshot_len {
                if fields[j].tag == 651 {
                    combine_one(fields, j, b'v', a_val.clone());
                }
            }
            fields[i].disposition = Disposition::Combine;
        } else {
            let has_a = fields[i].subfields.iter().any(|sf| sf.code == b'a');
            if has_a && fields[i].indic1 == b' ' {
                fields[i].disposition = Disposition::Output;
            }
        }
    }
}

/// Deletes every `$9` subfield from output fields.
fn drop_dollar9(fields: &mut [MeshField]) {
    for mf in fields.iter_mut() {
        if mf.disposition == Disposition::Output {
            mf.subfields.retain(|sf| sf.code != b'9');
        }
    }
}

/// Marks any not-yet-dispositioned non-mesh 655 for output.
fn output_nonmesh_655(fields: &mut [MeshField]) {
    for mf in fields.iter_mut() {
        if mf.tag == 655 && mf.disposition == Disposition::None && !is_mesh_655(mf) {
            mf.disposition = Disposition::Output;
        }
    }
}

/// Ensures every Output field's last non-`$2` subfield ends with `.`
/// or `)`, trimming trailing spaces first; cancels a field that has
/// only `$2`. Returns `Some(status)`
/// only if a field was cancelled and the interpreter should log it
/// (status is always `Ok`; the field is simply dropped from output).
fn end_period(fields: &mut [MeshField], params: &mut ProcParams) -> Option<ProcStatus> {
    for mf in fields.iter_mut() {
        if mf.disposition != Disposition::Output {
            continue;
        }
        match mf.subfields.iter().rposition(|sf| sf.code != b'2') {
            None => {
                mf.disposition = Disposition::Error;
                params.log_messages.push((
                    Severity::Error,
                    format!("mesh: field {} has only $2, cannot terminate with a period", mf.tag),
                ));
            }
            Some(idx) => {
                let v = &mut mf.subfields[idx].value;
                while v.last() == Some(&b' ') {
                    v.pop();
                }
                if !matches!(v.last(), Some(b'.') | Some(b')')) {
                    v.push(b'.');
                }
            }
        }
    }
    None
}

/// Sorts surviving Output fields by (indicator-1, subfield strings,
/// subfield count) and emits them to the output record; identical
/// fields kill the record.
fn sort_and_emit(fields: &mut [MeshField], params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let mut keys: Vec<usize> = (0..fields.len())
        .filter(|&i| fields[i].disposition == Disposition::Output)
        .collect();
    keys.sort_by(|&a, &b| {
        fields[a]
            .indic1
            .cmp(&fields[b].indic1)
            .then_with(|| fields[a].subfield_strings().cmp(&fields[b].subfield_strings()))
            .then_with(|| fields[a].subfields.len().cmp(&fields[b].subfields.len()))
    });

    for w in keys.windows(2) {
        let (a, b) = (&fields[w[0]], &fields[w[1]]);
        if a.tag == b.tag
            && a.indic1 == b.indic1
            && a.indic2 == b.indic2
            && a.subfield_strings() == b.subfield_strings()
        {
            return Ok(ProcStatus::KillRecord);
        }
    }

    for &i in &keys {
        let mf = &fields[i];
        params.output.add_field(mf.tag)?;
        params.output.set_indicator(1, mf.indic1)?;
        params.output.set_indicator(2, mf.indic2)?;
        for sf in &mf.subfields {
            params.output.add_subfield(sf.code, sf.value.clone())?;
        }
    }
    Ok(ProcStatus::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::NamedBufferStore;
    use crate::mesh::exception::ExceptionTable;
    use crate::mesh::language::LanguageTable;
    use std::io::Cursor;

    fn tables(excp: &str, lang: &str) -> MeshTables {
        MeshTables {
            exceptions: ExceptionTable::load(Cursor::new(excp)).unwrap(),
            languages: LanguageTable::load(Cursor::new(lang)).unwrap(),
            qualifiers: Box::new(crate::builtins::domain::NoopQualifierExpander),
        }
    }

    fn add_variable(codec: &mut crate::codec::MarcCodec, tag: i32, indic2: u8, subs: &[(u8, &[u8])]) {
        codec.add_field(tag).unwrap();
        codec.set_indicator(2, indic2).unwrap();
        for &(code, val) in subs {
            codec.add_subfield(code, val.to_vec()).unwrap();
        }
    }

    #[test]
    fn geographic_combination_matches_scenario_e() {
        let excp = "651:a:USMed1:United States\n650:x:USMed:Medicaid\n";
        let t = tables(excp, "");
        let mut output = crate::codec::blank_codec();
        add_variable(&mut output, 650, b'2', &[(b'a', b"Chemistry")]);
        add_variable(&mut output, 651, b' ', &[(b'a', b"United States")]);
        add_variable(&mut output, 650, b' ', &[(b'a', b"Medicaid"), (b'x', b"legislation & jurisprudence")]);

        let input = output.dup();
        let mut buffers = NamedBufferStore::new();
        let mut log = Vec::new();
        let args: Vec<String> = Vec::new();
        let mut params = ProcParams {
            input,
            output: &mut output,
            current: crate::builtins::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };

        let status = run(&mut params, &t).unwrap();
        assert_eq!(status, ProcStatus::Ok);

        let rec = params.output.record();
        let chemistry = rec.fields.iter().find(|f| {
            matches!(&f.payload, FieldPayload::Variable { subfields, .. } if subfields.iter().any(|sf| sf.value == b"Chemistry"))
        }).unwrap();
        let FieldPayload::Variable { subfields, indic2, .. } = &chemistry.payload else { panic!() };
        assert_eq!(*indic2, b'2');
        assert!(subfields.iter().any(|sf| sf.code == b'z' && sf.value == b"United States"));

        let medicaid = rec.fields.iter().find(|f| {
            matches!(&f.payload, FieldPayload::Variable { subfields, .. } if subfields.iter().any(|sf| sf.value == b"Medicaid"))
        }).unwrap();
        let FieldPayload::Variable { subfields, .. } = &medicaid.payload else { panic!() };
        assert!(!subfields.iter().any(|sf| sf.code == b'z'));
    }

    #[test]
    fn language_expansion_matches_scenario_f() {
        let excp = "655:a:Dict:Dictionary\n";
        let lang = "eng:English\nfre:French\n";
        let t = tables(excp, lang);
        let mut output = crate::codec::blank_codec();
        add_variable(&mut output, 41, b' ', &[(b'a', b"eng"), (b'a', b"fre"), (b'a', b"und")]);
        add_variable(&mut output, 650, b' ', &[(b'a', b"Medicine")]);
        add_variable(&mut output, 655, b'2', &[(b'a', b"Dictionary")]);

        let input = output.dup();
        let mut buffers = NamedBufferStore::new();
        let mut log = Vec::new();
        let args: Vec<String> = Vec::new();
        let mut params = ProcParams {
            input,
            output: &mut output,
            current: crate::builtins::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };

        let status = run(&mut params, &t).unwrap();
        assert_eq!(status, ProcStatus::Ok);

        let medicine_fields: Vec<_> = params
            .output
            .record()
            .fields
            .iter()
            .filter(|f| f.tag == 650)
            .collect();
        assert_eq!(medicine_fields.len(), 3);
    }

    #[test]
    fn dict_language_unknown_code_kills_record() {
        let excp = "655:a:Dict:Dictionary\n";
        let t = tables(excp, "eng:English\n");
        let mut output = crate::codec::blank_codec();
        add_variable(&mut output, 41, b' ', &[(b'a', b"xyz")]);
        add_variable(&mut output, 650, b' ', &[(b'a', b"Medicine")]);
        add_variable(&mut output, 655, b'2', &[(b'a', b"Dictionary")]);

        let input = output.dup();
        let mut buffers = NamedBufferStore::new();
        let mut log = Vec::new();
        let args: Vec<String> = Vec::new();
        let mut params = ProcParams {
            input,
            output: &mut output,
            current: crate::builtins::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };

        let status = run(&mut params, &t).unwrap();
        assert_eq!(status, ProcStatus::KillRecord);
    }
}
