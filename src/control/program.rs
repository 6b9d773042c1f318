//! The compiled representation of a control table: an arena of
//! [`ProcNode`]s linked by index, plus the fixed session/record head
//! pointers and the tag-indexed [`FieldRules`] table.
//!
//! Nodes carry two optional indices rather than pointers, and the
//! program owns a `Vec<ProcNode>` arena so the whole graph is trivially
//! inspectable and serializable.

use crate::builtins::BuiltinId;
use indexmap::IndexMap;

/// Index into a [`RuleProgram`]'s node arena.
pub type NodeIndex = usize;

/// The branch role a conditional node plays, used only by the compiler
/// to know what it is backpatching; the interpreter just follows
/// `true_next`/`false_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    /// An ordinary procedure: success falls through to `true_next`;
    /// there is no meaningful `false_next`.
    None,
    /// An `if` procedure: `true_next` on success, `false_next` on
    /// [`crate::builtins::ProcStatus::IfFailed`].
    If,
    /// A no-op `else` target, backpatched in by the compiler.
    Else,
    /// A no-op `endif` target, backpatched in by the compiler.
    Endif,
}

/// One invocation in the compiled graph: a builtin identity, its frozen
/// argument strings, and up to two successor indices.
#[derive(Debug, Clone)]
pub struct ProcNode {
    /// Which builtin this node invokes.
    pub builtin: BuiltinId,
    /// Raw argument strings exactly as written in the control table.
    pub args: Vec<String>,
    /// Source location, for diagnostics (`filename(line)`).
    pub location: String,
    /// Role in conditional backpatching.
    pub condition: ConditionKind,
    /// Successor on [`crate::builtins::ProcStatus::Ok`] (or on an
    /// `if` that passed).
    pub true_next: Option<NodeIndex>,
    /// Successor on [`crate::builtins::ProcStatus::IfFailed`].
    pub false_next: Option<NodeIndex>,
}

impl ProcNode {
    fn new(builtin: BuiltinId, args: Vec<String>, location: String, condition: ConditionKind) -> Self {
        ProcNode {
            builtin,
            args,
            location,
            condition,
            true_next: None,
            false_next: None,
        }
    }
}

/// The pre/post chains attached to a single subfield code within a
/// field's rules.
#[derive(Debug, Clone, Default)]
pub struct SubfieldRules {
    /// Head of the subfield-pre chain, if any.
    pub pre: Option<NodeIndex>,
    /// Head of the subfield-post chain, if any.
    pub post: Option<NodeIndex>,
}

/// The pre/post chains attached to one tag (or tag range), plus its
/// per-subfield-code rule table.
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    /// Head of the field-pre chain, if any.
    pub pre: Option<NodeIndex>,
    /// Head of the field-post chain, if any.
    pub post: Option<NodeIndex>,
    /// Rules keyed by subfield code (including the indicator
    /// pseudo-codes [`crate::codec::INDIC1_CODE`]/[`crate::codec::INDIC2_CODE`]).
    pub subfields: IndexMap<u8, SubfieldRules>,
    /// How specific the tag pattern that produced this entry was: 3
    /// (no `X`s) is most specific, 0 (`XXX`) least. Used only during
    /// compilation to resolve range overlaps.
    pub(crate) specificity: u8,
}

/// A fully compiled control table: the eight session/record head
/// pointers, the per-tag field rules, and the node arena they all
/// index into.
#[derive(Debug, Clone, Default)]
pub struct RuleProgram {
    /// Node arena; all chains are sequences of indices into this.
    pub nodes: Vec<ProcNode>,
    /// Head of the session-pre chain.
    pub session_pre: Option<NodeIndex>,
    /// Head of the session-post chain.
    pub session_post: Option<NodeIndex>,
    /// Head of the record-pre chain.
    pub record_pre: Option<NodeIndex>,
    /// Head of the record-post chain.
    pub record_post: Option<NodeIndex>,
    /// Rules for each concrete tag (0..=999) that the control table
    /// mentions, directly or via a range pattern resolved at the end
    /// of compilation.
    pub fields: IndexMap<i32, FieldRules>,
}

impl RuleProgram {
    /// A program with no directives: running this against any record
    /// must reproduce it byte-for-byte.
    #[must_use]
    pub fn empty() -> Self {
        RuleProgram::default()
    }

    /// Allocate a new node and return its index.
    pub(crate) fn push_node(
        &mut self,
        builtin: BuiltinId,
        args: Vec<String>,
        location: String,
        condition: ConditionKind,
    ) -> NodeIndex {
        self.nodes.push(ProcNode::new(builtin, args, location, condition));
        self.nodes.len() - 1
    }

    /// Append `node` to the end of a chain whose head is `head`,
    /// returning the (possibly new) head. `None` means "chain is
    /// empty"; appending to an empty chain makes `node` the head.
    pub(crate) fn append_chain(&mut self, head: Option<NodeIndex>, node: NodeIndex) -> Option<NodeIndex> {
        match head {
            None => Some(node),
            Some(h) => {
                let mut cur = h;
                loop {
                    match self.nodes[cur].true_next {
                        Some(next) => cur = next,
                        None => {
                            self.nodes[cur].true_next = Some(node);
                            break;
                        }
                    }
                }
                Some(h)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_has_no_chains() {
        let p = RuleProgram::empty();
        assert!(p.session_pre.is_none());
        assert!(p.record_pre.is_none());
        assert!(p.fields.is_empty());
    }

    #[test]
    fn append_chain_links_sequentially() {
        let mut p = RuleProgram::empty();
        let a = p.push_node(BuiltinId::Nop, vec![], "t(1)".into(), ConditionKind::None);
        let b = p.push_node(BuiltinId::Nop, vec![], "t(2)".into(), ConditionKind::None);
        let head = p.append_chain(None, a);
        let head = p.append_chain(head, b);
        assert_eq!(head, Some(a));
        assert_eq!(p.nodes[a].true_next, Some(b));
    }
}
