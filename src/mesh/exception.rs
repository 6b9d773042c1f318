//! The exception table: `field:subfield:group:heading` records, sorted
//! for lookup, annotating specific heading strings with the exception
//! group that drives the rulebook's special-case treatment.
//!
//! Grounded in `original_source/meshproc.c`'s `load_mesh_excp` and
//! `mesh_excp_lookup`.

use super::ExceptionGroup;
use crate::error::EngineError;
use std::io::BufRead;

/// One parsed exception-table line.
#[derive(Debug, Clone)]
struct ExceptionRecord {
    field: i32,
    subfield: u8,
    group: ExceptionGroup,
    heading: String,
}

/// The loaded, queryable exception table.
#[derive(Debug, Clone, Default)]
pub struct ExceptionTable {
    records: Vec<ExceptionRecord>,
}

fn parse_group(name: &str) -> Option<ExceptionGroup> {
    Some(match name {
        "Age650" => ExceptionGroup::Age650,
        "Law" => ExceptionGroup::Law,
        "Law5" => ExceptionGroup::Law5,
        "CaseRep" => ExceptionGroup::CaseRep,
        "Stats" => ExceptionGroup::Stats,
        "Stats5" => ExceptionGroup::Stats5,
        "Dict" => ExceptionGroup::Dict,
        "USMed" => ExceptionGroup::USMed,
        "USMed1" => ExceptionGroup::USMed1,
        _ => return None,
    })
}

impl ExceptionTable {
    /// Parse the `NNN:C:Group:Heading bytes` exception-table format.
    /// Sorts by (field, subfield, heading) for binary search.
    pub fn load<R: BufRead>(r: R) -> Result<Self, EngineError> {
        let mut records = Vec::new();
        for (line_no, line) in r.lines().enumerate() {
            let line = line.map_err(|e| EngineError::MeshTableLoad(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(4, ':');
            let field: i32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| EngineError::MeshTableLoad(format!("line {}: bad field tag", line_no + 1)))?;
            let subfield = parts
                .next()
                .and_then(|s| s.bytes().next())
                .ok_or_else(|| EngineError::MeshTableLoad(format!("line {}: missing subfield", line_no + 1)))?;
            let group_name = parts
                .next()
                .ok_or_else(|| EngineError::MeshTableLoad(format!("line {}: missing group", line_no + 1)))?;
            let group = parse_group(group_name)
                .ok_or_else(|| EngineError::MeshTableLoad(format!("line {}: unknown group {group_name:?}", line_no + 1)))?;
            let heading = parts
                .next()
                .ok_or_else(|| EngineError::MeshTableLoad(format!("line {}: missing heading", line_no + 1)))?
                .to_string();
            records.push(ExceptionRecord {
                field,
                subfield,
                group,
                heading,
            });
        }
        records.sort_by(|a, b| (a.field, a.subfield, &a.heading).cmp(&(b.field, b.subfield, &b.heading)));
        Ok(ExceptionTable { records })
    }

    /// Look up the exception group for a given field/subfield/heading,
    /// if the table has an entry for that exact heading text.
    #[must_use]
    pub fn lookup(&self, field: i32, subfield: u8, heading: &[u8]) -> Option<ExceptionGroup> {
        let heading = String::from_utf8_lossy(heading);
        self.records
            .iter()
            .find(|r| r.field == field && r.subfield == subfield && r.heading == heading)
            .map(|r| r.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn loads_and_looks_up() {
        let input = "650:a:Age650:Infant, Newborn\n651:a:USMed1:United States\n";
        let table = ExceptionTable::load(Cursor::new(input)).unwrap();
        assert_eq!(
            table.lookup(650, b'a', b"Infant, Newborn"),
            Some(ExceptionGroup::Age650)
        );
        assert_eq!(table.lookup(651, b'a', b"United States"), Some(ExceptionGroup::USMed1));
        assert_eq!(table.lookup(650, b'a', b"Nothing"), None);
    }
}
