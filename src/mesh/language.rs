//! The language table: 3-letter code to full language name, used by
//! the `dict` (language) rule.
//!
//! Grounded in `original_source/meshproc.c`'s `load_lang_tbl` and
//! `compare_lang`.

use crate::error::EngineError;
use std::collections::HashMap;
use std::io::BufRead;

/// The loaded, queryable language table.
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    names: HashMap<String, String>,
}

impl LanguageTable {
    /// Parse the `abc:Full language name` format. `abc` must
    /// be exactly 3 bytes.
    pub fn load<R: BufRead>(r: R) -> Result<Self, EngineError> {
        let mut names = HashMap::new();
        for (line_no, line) in r.lines().enumerate() {
            let line = line.map_err(|e| EngineError::MeshTableLoad(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (code, name) = line.split_once(':').ok_or_else(|| {
                EngineError::MeshTableLoad(format!("line {}: missing ':'", line_no + 1))
            })?;
            if code.len() != 3 {
                return Err(EngineError::MeshTableLoad(format!(
                    "line {}: language code {code:?} is not 3 bytes",
                    line_no + 1
                )));
            }
            names.insert(code.to_ascii_lowercase(), name.to_string());
        }
        Ok(LanguageTable { names })
    }

    /// Expand a lower-cased 3-letter code, or `None` if unknown.
    #[must_use]
    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.names.get(&code.to_ascii_lowercase()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn loads_and_expands() {
        let input = "eng:English\nfre:French\n";
        let table = LanguageTable::load(Cursor::new(input)).unwrap();
        assert_eq!(table.lookup("eng"), Some("English"));
        assert_eq!(table.lookup("fre"), Some("French"));
        assert_eq!(table.lookup("und"), None);
    }
}
