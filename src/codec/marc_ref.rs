//! Parser for the textual MARC reference grammar used throughout the
//! control table: `tag[:focc][$sf[:socc]][@indic][:pos:len]`.
//!
//! Grounded in `marc_ref()` (`original_source/marc.h`).

use crate::error::{MarcError, Result};

/// Sentinel meaning "the current occurrence/position", spelled `*` in the
/// control table.
pub const CURRENT: i32 = -1;
/// Sentinel meaning "a brand new occurrence", spelled `+` in the control
/// table. Only legal on writes.
pub const NEW: i32 = -2;

/// A parsed MARC reference. `None` fields mean "not specified in the
/// reference text"; occurrence fields use [`CURRENT`]/[`NEW`] sentinels
/// rather than `Option` so callers can match the original's
/// `MARC_REF_CURRENT`/`MARC_REF_NEW` encoding directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarcRef {
    /// Field tag, 0..=999.
    pub tag: i32,
    /// Field occurrence, or [`CURRENT`]/[`NEW`].
    pub focc: i32,
    /// Subfield code, if a `$sf` clause was present.
    pub sf: Option<u8>,
    /// Subfield occurrence, or [`CURRENT`]/[`NEW`]; meaningless if `sf`
    /// is `None`.
    pub socc: i32,
    /// Indicator number (1 or 2), if an `@indic` clause was present.
    pub indic: Option<u8>,
    /// Fixed-field byte offset, if a `:pos:len` clause was present.
    pub pos: Option<usize>,
    /// Fixed-field byte length, if a `:pos:len` clause was present.
    pub len: Option<usize>,
}

/// Parse a textual MARC reference.
pub fn parse(text: &str) -> Result<MarcRef> {
    let bytes = text.as_bytes();
    let mut i = 0;

    // tag: exactly 3 digits
    if bytes.len() < 3 || !bytes[0..3].iter().all(u8::is_ascii_digit) {
        return Err(MarcError::BadFieldId(-1));
    }
    let tag: i32 = text[0..3].parse().map_err(|_| MarcError::BadFieldId(-1))?;
    i = 3;

    let mut focc = CURRENT;
    let mut sf = None;
    let mut socc = CURRENT;
    let mut indic = None;
    let mut pos = None;
    let mut len = None;

    // `:focc` directly after tag, before any `$`/`@`.
    if bytes.get(i) == Some(&b':') {
        let (val, consumed) = parse_occurrence(&bytes[i + 1..])?;
        // Only treat as focc if followed by `$`, `@`, or end, or another `:pos:len` pair.
        focc = val;
        i += 1 + consumed;
    }

    if bytes.get(i) == Some(&b'$') {
        i += 1;
        let code = *bytes.get(i).ok_or(MarcError::NoSuchSubfield('\0'))?;
        sf = Some(code);
        i += 1;
        if bytes.get(i) == Some(&b':') {
            let (val, consumed) = parse_occurrence(&bytes[i + 1..])?;
            socc = val;
            i += 1 + consumed;
        }
    }

    if bytes.get(i) == Some(&b'@') {
        i += 1;
        let code = *bytes.get(i).ok_or(MarcError::BadIndicatorLength(0))?;
        if code != b'1' && code != b'2' {
            return Err(MarcError::BadIndicatorLength(0));
        }
        indic = Some(code);
        i += 1;
    }

    if bytes.get(i) == Some(&b':') {
        let rest = &text[i + 1..];
        let mut parts = rest.splitn(2, ':');
        let p = parts
            .next()
            .ok_or(MarcError::BadFieldId(tag))?
            .parse::<usize>()
            .map_err(|_| MarcError::BadFieldId(tag))?;
        let l = parts
            .next()
            .ok_or(MarcError::BadFieldId(tag))?
            .parse::<usize>()
            .map_err(|_| MarcError::BadFieldId(tag))?;
        pos = Some(p);
        len = Some(l);
        i = bytes.len();
    }

    if i != bytes.len() {
        return Err(MarcError::BadFieldId(tag));
    }

    Ok(MarcRef {
        tag,
        focc,
        sf,
        socc,
        indic,
        pos,
        len,
    })
}

fn parse_occurrence(bytes: &[u8]) -> Result<(i32, usize)> {
    match bytes.first() {
        Some(b'*') => Ok((CURRENT, 1)),
        Some(b'+') => Ok((NEW, 1)),
        Some(c) if c.is_ascii_digit() => {
            let mut end = 0;
            while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
            }
            let val: i32 = std::str::from_utf8(&bytes[0..end])
                .unwrap()
                .parse()
                .map_err(|_| MarcError::BadFieldId(-1))?;
            Ok((val, end))
        }
        _ => Err(MarcError::BadFieldId(-1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_tag() {
        let r = parse("245").unwrap();
        assert_eq!(r.tag, 245);
        assert_eq!(r.focc, CURRENT);
        assert_eq!(r.sf, None);
    }

    #[test]
    fn parses_tag_and_subfield() {
        let r = parse("245$a").unwrap();
        assert_eq!(r.tag, 245);
        assert_eq!(r.sf, Some(b'a'));
        assert_eq!(r.socc, CURRENT);
    }

    #[test]
    fn parses_new_sentinels() {
        let r = parse("245:+$a:+").unwrap();
        assert_eq!(r.focc, NEW);
        assert_eq!(r.socc, NEW);
    }

    #[test]
    fn parses_indicator_clause() {
        let r = parse("245@1").unwrap();
        assert_eq!(r.indic, Some(b'1'));
    }

    #[test]
    fn parses_fixed_field_pos_len() {
        let r = parse("008:7:4").unwrap();
        assert_eq!(r.pos, Some(7));
        assert_eq!(r.len, Some(4));
    }

    #[test]
    fn parses_occurrence_number() {
        let r = parse("650:2$a").unwrap();
        assert_eq!(r.focc, 2);
        assert_eq!(r.sf, Some(b'a'));
    }
}
