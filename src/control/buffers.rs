//! Named scratch buffers and switches: a name-to-bytes map addressed by
//! data-source references like `&name`.
//!
//! Grounded in `original_source/marcproc.c`'s `cmp_get_named_buf` /
//! named-buffer table.

use crate::control::line_reader::ControlLineReader;
use crate::error::EngineError;
use std::collections::HashMap;
use std::io::BufRead;

type Result<T> = std::result::Result<T, EngineError>;

/// Maximum length of a named buffer's name (excluding the `&` sigil).
pub const MAX_NAME_LEN: usize = 31;

/// A process-lifetime table of named buffers. A "switch" is just a
/// buffer holding `b"1"` or empty; callers interpret truthiness, this
/// store only holds bytes.
#[derive(Debug, Clone, Default)]
pub struct NamedBufferStore {
    buffers: HashMap<String, Vec<u8>>,
}

impl NamedBufferStore {
    /// A fresh, empty store.
    #[must_use]
    pub fn new() -> Self {
        NamedBufferStore::default()
    }

    /// Current contents of `name`, or an empty slice if never set.
    #[must_use]
    pub fn get(&self, name: &str) -> &[u8] {
        self.buffers.get(name).map_or(&[], Vec::as_slice)
    }

    /// Overwrite `name`'s contents, validating the name-length limit.
    pub fn set(&mut self, name: &str, value: Vec<u8>) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::NamedBuffer(format!(
                "buffer name {name:?} exceeds {MAX_NAME_LEN} bytes"
            )));
        }
        self.buffers.insert(name.to_string(), value);
        Ok(())
    }

    /// Append to `name`'s existing contents (auto-creating it empty if
    /// unset), validating the name-length limit.
    pub fn append(&mut self, name: &str, more: &[u8]) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::NamedBuffer(format!(
                "buffer name {name:?} exceeds {MAX_NAME_LEN} bytes"
            )));
        }
        self.buffers.entry(name.to_string()).or_default().extend_from_slice(more);
        Ok(())
    }

    /// True if `name` currently holds non-empty contents ("switch on").
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.buffers.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Clear `name`'s contents ("switch off") without removing the slot.
    pub fn clear(&mut self, name: &str) {
        if let Some(v) = self.buffers.get_mut(name) {
            v.clear();
        }
    }
}

/// Load a switch file: each line is `&name = value`, no list structure.
pub fn load_switches<R: BufRead>(r: R) -> Result<NamedBufferStore> {
    let mut store = NamedBufferStore::new();
    let mut reader = ControlLineReader::new(r);
    loop {
        let line = reader
            .next_line()
            .map_err(EngineError::NamedBuffer)?;
        let Some(line) = line else { break };
        let Some(name) = line.key.strip_prefix('&') else {
            return Err(EngineError::NamedBuffer(format!(
                "line {}: switch name must start with '&'",
                line.line_no
            )));
        };
        let value = line.values.first().cloned().unwrap_or_default();
        store.set(name, value.into_bytes())?;
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_append_round_trip() {
        let mut store = NamedBufferStore::new();
        store.set("scratch", b"abc".to_vec()).unwrap();
        assert_eq!(store.get("scratch"), b"abc");
        store.append("scratch", b"def").unwrap();
        assert_eq!(store.get("scratch"), b"abcdef");
    }

    #[test]
    fn rejects_overlong_names() {
        let mut store = NamedBufferStore::new();
        let long_name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(store.set(&long_name, vec![]).is_err());
    }

    #[test]
    fn load_switches_parses_ampersand_lines() {
        let input = "# comment\n&verbose = 1\n&prefix = bib-\n";
        let store = load_switches(std::io::Cursor::new(input)).unwrap();
        assert!(store.is_set("verbose"));
        assert_eq!(store.get("prefix"), b"bib-");
    }

    #[test]
    fn switch_semantics() {
        let mut store = NamedBufferStore::new();
        assert!(!store.is_set("flag"));
        store.set("flag", b"1".to_vec()).unwrap();
        assert!(store.is_set("flag"));
        store.clear("flag");
        assert!(!store.is_set("flag"));
    }
}
