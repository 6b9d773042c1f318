//! The MeSH 650/651/655 recombination engine: the most intricate
//! domain logic in the conversion engine.
//!
//! Grounded in `original_source/meshproc.c` throughout; the working
//! model types here mirror its `MH_FLD`/`MH_SF` structs.

pub mod exception;
pub mod language;
pub mod rulebook;

use crate::builtins::domain::{NoopQualifierExpander, QualifierExpander};
use exception::ExceptionTable;
use language::LanguageTable;
use smallvec::SmallVec;

/// The process-lifetime, read-only tables the rulebook consults:
/// loaded once at start-up.
#[derive(Debug)]
pub struct MeshTables {
    /// The loaded exception table.
    pub exceptions: ExceptionTable,
    /// The loaded language table.
    pub languages: LanguageTable,
    /// The MeSH-qualifier-expansion extension point.
    pub qualifiers: Box<dyn QualifierExpander + Send + Sync>,
}

impl Default for MeshTables {
    fn default() -> Self {
        MeshTables {
            exceptions: ExceptionTable::default(),
            languages: LanguageTable::default(),
            qualifiers: Box::new(NoopQualifierExpander),
        }
    }
}

/// Maximum number of 650/651/655 fields the rulebook works with per
/// record.
pub const MAX_MESH_FIELDS: usize = 100;

/// Maximum subfields tracked per working [`MeshField`].
pub const MAX_MESH_SUBFIELDS: usize = 8;

/// The exception groups the exception table may tag a heading with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExceptionGroup {
    /// Age-related 650 headings eligible for age-source/age-target combination.
    Age650,
    /// Law-related headings, combined via the non-`Stats5`-style `Law5` 655s.
    Law,
    /// 655 law-form headings that drive `Law` combination, excluding `Law` targets.
    Law5,
    /// Case-report headings, retagged to 655.
    CaseRep,
    /// Statistics-related 650 headings.
    Stats,
    /// 655 statistics-form headings that drive `Stats` combination, excluding `Stats` targets.
    Stats5,
    /// Dictionary-form headings, triggering the language-expansion pass.
    Dict,
    /// United-States-medicine headings that suppress a redundant `$z`.
    USMed,
    /// The literal "United States" 651 heading suppressed against `USMed`.
    USMed1,
}

/// A working subfield within a [`MeshField`]: its exception-group
/// annotation (if any), code, and value bytes.
#[derive(Debug, Clone)]
pub struct MeshSubfield {
    /// Exception group this subfield's value matched in the exception
    /// table, if any.
    pub group: Option<ExceptionGroup>,
    /// Subfield code.
    pub code: u8,
    /// Subfield value bytes.
    pub value: Vec<u8>,
}

/// Whether recombination may target a [`MeshField`], and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoRecombine {
    /// Combinations are permitted.
    Allowed,
    /// Combinations of this specific subfield code are blocked.
    Blocked(u8),
    /// All combinations are blocked.
    AllBlocked,
}

/// What ultimately happens to a working [`MeshField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not (yet) slated for output.
    None,
    /// Will be emitted.
    Output,
    /// Combined into another field; not separately emitted.
    Combine,
    /// Finished being processed (e.g. an age-source after combination); not emitted.
    Complete,
    /// A rule-level error occurred; emission is cancelled for this field.
    Error,
}

/// The transient per-record working model for one 650/651/655 field.
#[derive(Debug, Clone)]
pub struct MeshField {
    /// Original tag (650, 651, or 655; case-report retags to 655 in place).
    pub tag: i32,
    /// Indicator 1.
    pub indic1: u8,
    /// Indicator 2.
    pub indic2: u8,
    /// Subfields, including any exception-group annotation.
    pub subfields: SmallVec<[MeshSubfield; MAX_MESH_SUBFIELDS]>,
    /// Current disposition.
    pub disposition: Disposition,
    /// Whether indicators are protected from the final `indic2-2` sweep.
    pub keep_indicators: bool,
    /// Recombination eligibility.
    pub no_recombine: NoRecombine,
}

impl MeshField {
    /// A fresh working field with blank indicators, no subfields, and
    /// [`Disposition::None`].
    #[must_use]
    pub fn new(tag: i32, indic1: u8, indic2: u8) -> Self {
        MeshField {
            tag,
            indic1,
            indic2,
            subfields: SmallVec::new(),
            disposition: Disposition::None,
            keep_indicators: false,
            no_recombine: NoRecombine::Allowed,
        }
    }

    /// Append a subfield, rejecting once [`MAX_MESH_SUBFIELDS`] is reached.
    pub fn add_subfield(&mut self, group: Option<ExceptionGroup>, code: u8, value: Vec<u8>) -> bool {
        if self.subfields.len() >= MAX_MESH_SUBFIELDS {
            return false;
        }
        self.subfields.push(MeshSubfield { group, code, value });
        true
    }

    /// Find the first subfield with the given code, optionally starting
    /// the search at `from`.
    #[must_use]
    pub fn find_subfield(&self, code: u8, from: usize) -> Option<usize> {
        self.subfields.iter().enumerate().skip(from).find(|(_, sf)| sf.code == code).map(|(i, _)| i)
    }

    /// Find the first subfield carrying `group`, returning its code.
    #[must_use]
    pub fn find_exception(&self, group: ExceptionGroup) -> Option<u8> {
        self.subfields.iter().find(|sf| sf.group == Some(group)).map(|sf| sf.code)
    }

    /// `true` if any subfield carries `group`.
    #[must_use]
    pub fn has_exception(&self, group: ExceptionGroup) -> bool {
        self.subfields.iter().any(|sf| sf.group == Some(group))
    }

    /// Remove the subfield at `index`.
    pub fn delete_subfield(&mut self, index: usize) {
        self.subfields.remove(index);
    }

    /// Whether recombination is permitted for subfield code `code`.
    #[must_use]
    pub fn allows_recombine(&self, code: u8) -> bool {
        match self.no_recombine {
            NoRecombine::Allowed => true,
            NoRecombine::Blocked(blocked) => blocked != code,
            NoRecombine::AllBlocked => false,
        }
    }

    /// Render subfields as `$code value` pairs joined with spaces, used
    /// both for the sort key and for serializing back to the output
    /// record.
    #[must_use]
    pub fn subfield_strings(&self) -> Vec<String> {
        self.subfields
            .iter()
            .map(|sf| format!("${}{}", sf.code as char, String::from_utf8_lossy(&sf.value)))
            .collect()
    }
}
