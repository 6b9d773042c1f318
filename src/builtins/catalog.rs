//! The generic, non-domain-specific builtins: conditionals, buffer
//! manipulation, field/subfield structural edits, and the short-circuit
//! control procedures.
//!
//! Grounded in `original_source/marcproclist.c`'s `cmp_if`, `cmp_copy`,
//! `cmp_substr`, `cmp_normalize`, `cmp_makefld`, `cmp_renfld`, etc.

use super::source::{read_source, write_destination};
use super::{BuiltinId, ProcParams, ProcStatus};
use crate::diagnostics::Severity;
use crate::error::EngineError;

/// Dispatch a generic builtin call. `mesh` and the domain (tag-specific)
/// procedures are dispatched separately by the interpreter, which
/// tries [`crate::mesh::run`] / [`super::domain::run`] first.
pub fn call(id: BuiltinId, params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    match id {
        BuiltinId::If => do_if(params),
        BuiltinId::Nop => Ok(ProcStatus::Ok),
        BuiltinId::Indic => do_indic(params),
        BuiltinId::Clear => do_clear(params),
        BuiltinId::Copy => do_copy(params),
        BuiltinId::Append => do_append(params),
        BuiltinId::Substr => do_substr(params),
        BuiltinId::Normalize => do_normalize(params),
        BuiltinId::Makefld => do_makefld(params),
        BuiltinId::Makesf => do_makesf(params),
        BuiltinId::Renfld => do_renfld(params),
        BuiltinId::Rensf => do_rensf(params),
        BuiltinId::Killfld => Ok(ProcStatus::KillField),
        BuiltinId::Killrec => Ok(ProcStatus::KillRecord),
        BuiltinId::Donesf => Ok(ProcStatus::DoneSf),
        BuiltinId::Donefld => Ok(ProcStatus::DoneField),
        BuiltinId::Donerec => Ok(ProcStatus::DoneRecord),
        BuiltinId::Today => do_today(params),
        BuiltinId::Y2toY4 => do_y2toy4(params),
        BuiltinId::Log => do_log(params),
        _ => unreachable!("catalog::call received a non-generic builtin {id:?}"),
    }
}

fn do_if(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let src = read_source(params, &params.args[0])?;
    let mut op = params.args[1].as_str();
    let mut negate = false;
    let mut case_insensitive = false;
    loop {
        match op.as_bytes().first() {
            Some(b'!') => {
                negate = true;
                op = &op[1..];
            }
            Some(b'~') => {
                case_insensitive = true;
                op = &op[1..];
            }
            _ => break,
        }
    }
    let value = params.args.get(2).map(String::as_str);

    let result = match op {
        "*" => !src.is_empty(),
        "=" => cmp_bytes(&src, value.unwrap_or("").as_bytes(), case_insensitive, |a, b| a == b),
        "^" => {
            let v = value.unwrap_or("").as_bytes();
            src.len() >= v.len() && cmp_bytes(&src[..v.len()], v, case_insensitive, |a, b| a == b)
        }
        "?" => contains_subslice(&src, value.unwrap_or("").as_bytes(), case_insensitive),
        "9" => !src.is_empty() && src.iter().all(u8::is_ascii_digit),
        "<" | ">" | "<=" | ">=" => {
            let a = parse_signed(&src).ok_or_else(|| {
                EngineError::NamedBuffer(format!("if: non-numeric operand {src:?}"))
            })?;
            let b = parse_signed(value.unwrap_or("").as_bytes()).ok_or_else(|| {
                EngineError::NamedBuffer("if: non-numeric operand".to_string())
            })?;
            match op {
                "<" => a < b,
                ">" => a > b,
                "<=" => a <= b,
                ">=" => a >= b,
                _ => unreachable!(),
            }
        }
        other => {
            return Err(EngineError::NamedBuffer(format!(
                "if: unrecognized operator {other:?}"
            )))
        }
    };
    let result = if negate { !result } else { result };
    Ok(if result { ProcStatus::Ok } else { ProcStatus::IfFailed })
}

fn cmp_bytes(a: &[u8], b: &[u8], ci: bool, f: impl Fn(&[u8], &[u8]) -> bool) -> bool {
    if ci {
        let la: Vec<u8> = a.iter().map(u8::to_ascii_lowercase).collect();
        let lb: Vec<u8> = b.iter().map(u8::to_ascii_lowercase).collect();
        f(&la, &lb)
    } else {
        f(a, b)
    }
}

fn contains_subslice(hay: &[u8], needle: &[u8], ci: bool) -> bool {
    if needle.is_empty() {
        return true;
    }
    let (hay_owned, needle_owned);
    let (hay, needle): (&[u8], &[u8]) = if ci {
        hay_owned = hay.iter().map(u8::to_ascii_lowercase).collect::<Vec<_>>();
        needle_owned = needle.iter().map(u8::to_ascii_lowercase).collect::<Vec<_>>();
        (&hay_owned, &needle_owned)
    } else {
        (hay, needle)
    };
    hay.windows(needle.len()).any(|w| w == needle)
}

/// Parse an optional leading `-` followed by ASCII digits; any other
/// tail character fails the parse.
fn parse_signed(bytes: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(bytes).ok()?;
    s.parse::<i64>().ok()
}

fn do_indic(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let which: u8 = params.args[0].parse().unwrap_or(0);
    let ch = params.args[1].as_bytes().first().copied().unwrap_or(b' ');
    params.output.set_indicator(which, ch)?;
    Ok(ProcStatus::Ok)
}

fn do_clear(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    write_destination(params, &params.args[0].clone(), b"", false)?;
    Ok(ProcStatus::Ok)
}

fn do_copy(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let src = read_source(params, &params.args[1].clone())?;
    write_destination(params, &params.args[0].clone(), &src, false)?;
    Ok(ProcStatus::Ok)
}

fn do_append(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let src = read_source(params, &params.args[1].clone())?;
    write_destination(params, &params.args[0].clone(), &src, true)?;
    Ok(ProcStatus::Ok)
}

fn do_substr(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let src = read_source(params, &params.args[1].clone())?;
    let start: i64 = params.args[2].parse().unwrap_or(0);
    let len: Option<usize> = params.args.get(3).and_then(|s| s.parse().ok()).filter(|n| *n != 0);

    // Negative start clamps to 0; a start more negative than the
    // source length yields the entire source.
    let start_idx = if start < 0 {
        let from_end = (-start) as usize;
        src.len().saturating_sub(from_end)
    } else {
        (start as usize).min(src.len())
    };
    let end_idx = match len {
        Some(l) => (start_idx + l).min(src.len()),
        None => src.len(),
    };
    let result = &src[start_idx..end_idx];
    write_destination(params, &params.args[0].clone(), result, false)?;
    Ok(ProcStatus::Ok)
}

fn do_normalize(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let src = read_source(params, &params.args[1].clone())?;
    let mut out = Vec::with_capacity(src.len());
    let mut run_has_space = false;
    let mut pending_collapse = false;
    for &b in &src {
        if b.is_ascii_alphanumeric() || b == b'-' {
            if pending_collapse {
                if run_has_space {
                    out.push(b' ');
                }
                pending_collapse = false;
                run_has_space = false;
            }
            out.push(b.to_ascii_lowercase());
        } else {
            pending_collapse = true;
            if b == b' ' {
                run_has_space = true;
            }
        }
    }
    write_destination(params, &params.args[0].clone(), &out, false)?;
    Ok(ProcStatus::Ok)
}

fn do_makefld(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let tag: i32 = params.args[0].parse().map_err(|_| {
        EngineError::NamedBuffer(format!("makefld: bad tag {:?}", params.args[0]))
    })?;
    params.output.add_field(tag)?;
    Ok(ProcStatus::Ok)
}

fn do_makesf(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let code = params.args[0].as_bytes().first().copied().ok_or_else(|| {
        EngineError::NamedBuffer("makesf: empty subfield code".to_string())
    })?;
    let data = params.current.as_slice().to_vec();
    params.output.add_subfield(code, data)?;
    Ok(ProcStatus::Ok)
}

fn do_renfld(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let tag: i32 = params.args[0].parse().map_err(|_| {
        EngineError::NamedBuffer(format!("renfld: bad tag {:?}", params.args[0]))
    })?;
    params.output.rename_current_field(tag)?;
    Ok(ProcStatus::Ok)
}

fn do_rensf(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let code = params.args[0].as_bytes().first().copied().ok_or_else(|| {
        EngineError::NamedBuffer("rensf: empty subfield code".to_string())
    })?;
    params.output.rename_current_subfield(code)?;
    Ok(ProcStatus::Ok)
}

fn do_today(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let fmt = params.args[1].as_str();
    let (y, m, d) = crate::builtins::domain::today_ymd();
    let out = match fmt {
        "YYYYMMDD" => format!("{y:04}{m:02}{d:02}"),
        "YYMMDD" => format!("{:02}{m:02}{d:02}", y % 100),
        other => {
            return Err(EngineError::NamedBuffer(format!(
                "today: unrecognized format {other:?}"
            )))
        }
    };
    write_destination(params, &params.args[0].clone(), out.as_bytes(), false)?;
    Ok(ProcStatus::Ok)
}

fn do_y2toy4(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let src = read_source(params, &params.args[1].clone())?;
    if src.len() > 6 || !src.iter().all(u8::is_ascii_digit) {
        return Err(EngineError::NamedBuffer(format!(
            "y2toy4: source must be all digits, <=6 bytes, got {src:?}"
        )));
    }
    if src.len() < 2 {
        return Err(EngineError::NamedBuffer(
            "y2toy4: source too short for a 2-digit year".to_string(),
        ));
    }
    let yy: u32 = std::str::from_utf8(&src[0..2]).unwrap().parse().unwrap();
    let century = if yy < 35 { 20 } else { 19 };
    let mut out = format!("{century:02}{yy:02}");
    out.push_str(std::str::from_utf8(&src[2..]).unwrap());
    write_destination(params, &params.args[0].clone(), out.as_bytes(), false)?;
    Ok(ProcStatus::Ok)
}

fn do_log(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let severity = match params.args[0].as_str() {
        "info" | "cont" => Severity::Continue,
        "warn" | "warning" => Severity::Warning,
        "error" => Severity::Error,
        "fatal" => Severity::Fatal,
        other => {
            return Err(EngineError::NamedBuffer(format!(
                "log: unrecognized severity {other:?}"
            )))
        }
    };
    let mut message = Vec::new();
    for src in &params.args[1..] {
        message.extend(read_source(params, src)?);
    }
    let text = String::from_utf8_lossy(&message).into_owned();
    params.log_messages.push((severity, text));
    Ok(ProcStatus::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::NamedBufferStore;

    fn run(args: &[&str], id: BuiltinId) -> (ProcStatus, Vec<u8>, Vec<u8>) {
        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut buffers = NamedBufferStore::new();
        buffers.set("src", b"hello world".to_vec()).unwrap();
        let mut log = Vec::new();
        let mut p = ProcParams {
            input,
            output: &mut output,
            current: super::super::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };
        let status = call(id, &mut p).unwrap();
        let dst = p.buffers.get("dst").to_vec();
        let dst2 = p.buffers.get("dst2").to_vec();
        (status, dst, dst2)
    }

    #[test]
    fn copy_then_substr_matches_scenario_d() {
        let (_s, dst, _) = run(&["dst", "src"], BuiltinId::Copy);
        assert_eq!(dst, b"hello world");

        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = vec!["dst2".into(), "src".into(), "6".into(), "5".into()];
        let mut buffers = NamedBufferStore::new();
        buffers.set("src", b"hello world".to_vec()).unwrap();
        let mut log = Vec::new();
        let mut p = ProcParams {
            input,
            output: &mut output,
            current: super::super::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };
        call(BuiltinId::Substr, &mut p).unwrap();
        assert_eq!(p.buffers.get("dst2"), b"world");
    }

    #[test]
    fn if_equal_comparison() {
        let (status, _, _) = run(&["\"hello\"", "=", "\"world\""], BuiltinId::If);
        assert_eq!(status, ProcStatus::IfFailed);
        let (status, _, _) = run(&["\"hello\"", "!=", "\"world\""], BuiltinId::If);
        assert_eq!(status, ProcStatus::Ok);
    }

    #[test]
    fn substr_negative_start_clamps_to_zero() {
        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = vec!["dst".into(), "src".into(), "-100".into()];
        let mut buffers = NamedBufferStore::new();
        buffers.set("src", b"hello".to_vec()).unwrap();
        let mut log = Vec::new();
        let mut p = ProcParams {
            input,
            output: &mut output,
            current: super::super::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };
        call(BuiltinId::Substr, &mut p).unwrap();
        assert_eq!(p.buffers.get("dst"), b"hello");
    }

    #[test]
    fn normalize_collapses_space_runs_and_lowercases() {
        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = vec!["dst".into(), "src".into()];
        let mut buffers = NamedBufferStore::new();
        buffers.set("src", b"Foo & Bar--Baz".to_vec()).unwrap();
        let mut log = Vec::new();
        let mut p = ProcParams {
            input,
            output: &mut output,
            current: super::super::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };
        call(BuiltinId::Normalize, &mut p).unwrap();
        assert_eq!(p.buffers.get("dst"), b"foo bar--baz");
    }

    #[test]
    fn y2toy4_applies_y_window() {
        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = vec!["dst".into(), "src".into()];
        let mut buffers = NamedBufferStore::new();
        buffers.set("src", b"99".to_vec()).unwrap();
        let mut log = Vec::new();
        let mut p = ProcParams {
            input,
            output: &mut output,
            current: super::super::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };
        call(BuiltinId::Y2toY4, &mut p).unwrap();
        assert_eq!(p.buffers.get("dst"), b"1999");
        buffers.set("src", b"12".to_vec()).unwrap();
        let mut log = Vec::new();
        let mut p = ProcParams {
            input: crate::codec::blank_codec(),
            output: &mut output,
            current: super::super::ScratchBuffer::default(),
            args: &args,
            buffers: &mut buffers,
            log_messages: &mut log,
        };
        call(BuiltinId::Y2toY4, &mut p).unwrap();
        assert_eq!(p.buffers.get("dst"), b"2012");
    }
}
