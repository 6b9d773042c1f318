//! Data-source/destination addressing: the first-character dispatch
//! that every procedure argument identifying a source or destination
//! goes through.
//!
//! Grounded in `original_source/marcproc.c`'s `cmp_read_source` /
//! `cmp_write_dest` pair.

use super::ProcParams;
use crate::codec::{MarcCodec, MarcRef, CURRENT, NEW};
use crate::error::EngineError;

/// A resolved data-source/destination identity.
enum Addr<'a> {
    Marc(MarcRef),
    CurrentData,
    BuiltinVar(&'a str),
    Literal(Vec<u8>),
    Named(&'a str),
}

fn classify(id: &str) -> Result<Addr<'_>, EngineError> {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() || c == '$' || c == '@' => {
            let r = crate::codec::marc_ref::parse(id).map_err(EngineError::Marc)?;
            Ok(Addr::Marc(r))
        }
        Some('%') => {
            let rest = &id[1..];
            if rest == "data" {
                Ok(Addr::CurrentData)
            } else {
                Ok(Addr::BuiltinVar(rest))
            }
        }
        Some('"') => {
            let inner = id.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(&id[1..]);
            Ok(Addr::Literal(inner.as_bytes().to_vec()))
        }
        Some(c) if c.is_ascii_alphabetic() || c == '&' => Ok(Addr::Named(id)),
        _ => Err(EngineError::NamedBuffer(format!("unrecognized data source {id:?}"))),
    }
}

fn builtin_var(params: &ProcParams, name: &str, codec: &MarcCodec) -> Vec<u8> {
    let value = match name {
        "fid" => codec.current_tag().to_string(),
        "focc" => codec.current_occurrence().to_string(),
        "fpos" => codec.position().field.to_string(),
        "sid" => codec
            .current_subfield_code()
            .map(|c| c.to_string())
            .unwrap_or_default(),
        "socc" => codec.position().subfield.to_string(),
        "spos" => codec.position().subfield.to_string(),
        _ => {
            let _ = params;
            String::new()
        }
    };
    value.into_bytes()
}

/// Read the bytes named by `id`. Missing data yields an empty slice
/// rather than an error.
pub fn read_source(params: &ProcParams, id: &str) -> Result<Vec<u8>, EngineError> {
    match classify(id)? {
        Addr::Literal(bytes) => Ok(bytes),
        Addr::CurrentData => Ok(params.current.as_slice().to_vec()),
        Addr::BuiltinVar(name) => Ok(builtin_var(params, name, &params.input)),
        Addr::Named(name) => Ok(params.buffers.get(name).to_vec()),
        Addr::Marc(r) => Ok(read_marc_ref(&params.input, &r).unwrap_or_default()),
    }
}

fn read_marc_ref(codec: &MarcCodec, r: &MarcRef) -> Option<Vec<u8>> {
    let mut c = codec.clone();
    if r.focc == CURRENT {
        // leave cursor where it is, but still require the right tag
        if c.current_tag() != r.tag {
            c.goto_tag(r.tag, CURRENT).ok()?;
        }
    } else {
        c.goto_tag(r.tag, r.focc).ok()?;
    }
    if let Some(sf) = r.sf {
        c.goto_subfield_code(sf, if r.socc == CURRENT { 0 } else { r.socc }).ok()?;
    } else if let Some(indic) = r.indic {
        let code = if indic == b'1' {
            crate::record::INDIC1_CODE
        } else {
            crate::record::INDIC2_CODE
        };
        c.goto_subfield_code(code, 0).ok()?;
    }
    let bytes = c.current_bytes().ok()?;
    match (r.pos, r.len) {
        (Some(pos), Some(len)) => bytes.get(pos..pos + len).map(<[u8]>::to_vec),
        _ => Some(bytes.to_vec()),
    }
}

/// Write `bytes` to the destination named by `id` on the output
/// record. `append` selects append-vs-replace for buffers and MARC
/// subfields; a brand new field/subfield occurrence (`NEW`/`+`) is
/// always created regardless of `append`.
pub fn write_destination(
    params: &mut ProcParams,
    id: &str,
    bytes: &[u8],
    append: bool,
) -> Result<(), EngineError> {
    match classify(id)? {
        Addr::Literal(_) => Err(EngineError::NamedBuffer(
            "cannot write to a literal destination".into(),
        )),
        Addr::CurrentData => {
            if append {
                params.current.append(bytes)
            } else {
                params.current.set(bytes)
            }
        }
        Addr::BuiltinVar(_) => Err(EngineError::NamedBuffer(
            "builtin variables are read-only".into(),
        )),
        Addr::Named(name) => {
            if append {
                params.buffers.append(name, bytes)
            } else {
                params.buffers.set(name, bytes.to_vec())
            }
        }
        Addr::Marc(r) => write_marc_ref(params.output, &r, bytes, append).map_err(EngineError::from),
    }
}

fn write_marc_ref(
    codec: &mut MarcCodec,
    r: &MarcRef,
    bytes: &[u8],
    append: bool,
) -> crate::error::Result<()> {
    if r.focc == NEW {
        codec.add_field(r.tag)?;
    } else if r.focc == CURRENT {
        if codec.current_tag() != r.tag {
            codec.goto_tag(r.tag, CURRENT)?;
        }
    } else if codec.goto_tag(r.tag, r.focc).is_err() {
        codec.add_field(r.tag)?;
    }

    if let Some(sf) = r.sf {
        if r.socc == NEW {
            codec.add_subfield(sf, bytes.to_vec())?;
            return Ok(());
        }
        let occ = if r.socc == CURRENT { 0 } else { r.socc };
        match codec.goto_subfield_code(sf, occ) {
            Ok(()) if append => {
                let mut existing = codec.current_bytes()?.to_vec();
                existing.extend_from_slice(bytes);
                codec.delete_current_subfield()?;
                codec.add_subfield(sf, existing)
            }
            Ok(()) => {
                codec.delete_current_subfield()?;
                codec.add_subfield(sf, bytes.to_vec())
            }
            Err(_) => codec.add_subfield(sf, bytes.to_vec()),
        }?;
        return Ok(());
    }

    if let Some(indic) = r.indic {
        let which = if indic == b'1' { 1 } else { 2 };
        return codec.set_indicator(which, bytes.first().copied().unwrap_or(b' '));
    }

    match (r.pos, r.len) {
        (Some(pos), Some(_)) => codec.write_fixed_bytes(pos, bytes),
        _ => {
            if append {
                let mut existing = codec.current_bytes()?.to_vec();
                existing.extend_from_slice(bytes);
                codec.write_fixed_bytes(0, &existing)
            } else {
                codec.write_fixed_bytes(0, bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::NamedBufferStore;

    #[allow(clippy::too_many_arguments)]
    fn params<'a>(
        input: &MarcCodec,
        output: &'a mut MarcCodec,
        args: &'a [String],
        buffers: &'a mut NamedBufferStore,
        log_messages: &'a mut Vec<(crate::diagnostics::Severity, String)>,
    ) -> ProcParams<'a> {
        ProcParams {
            input: input.clone(),
            output,
            current: super::super::ScratchBuffer::default(),
            args,
            buffers,
            log_messages,
        }
    }

    #[test]
    fn reads_literal() {
        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = vec![];
        let mut buffers = NamedBufferStore::new();
        let mut log = Vec::new();
        let p = params(&input, &mut output, &args, &mut buffers, &mut log);
        assert_eq!(read_source(&p, "\"hello\"").unwrap(), b"hello");
    }

    #[test]
    fn missing_named_buffer_reads_empty() {
        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = vec![];
        let mut buffers = NamedBufferStore::new();
        let mut log = Vec::new();
        let p = params(&input, &mut output, &args, &mut buffers, &mut log);
        assert_eq!(read_source(&p, "scratch").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn writes_named_buffer_then_reads_back() {
        let input = crate::codec::blank_codec();
        let mut output = crate::codec::blank_codec();
        let args: Vec<String> = vec![];
        let mut buffers = NamedBufferStore::new();
        let mut log = Vec::new();
        {
            let mut p = params(&input, &mut output, &args, &mut buffers, &mut log);
            write_destination(&mut p, "dst", b"hello world", false).unwrap();
        }
        let p = params(&input, &mut output, &args, &mut buffers, &mut log);
        assert_eq!(read_source(&p, "dst").unwrap(), b"hello world");
    }
}
