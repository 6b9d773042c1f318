//! Compiles a textual control file into a [`RuleProgram`].
//!
//! Grounded in `original_source/marcconv.c`'s control-table reader: a
//! single pass over [`ControlLineReader`] lines, threading a current
//! scope (session/record/field/subfield/indicator) and, within it, the
//! chain most recently touched by a `prep=`/`post=` line, since bare
//! `else`/`endif` lines apply to that chain rather than naming one.

use super::line_reader::{ControlLine, ControlLineReader};
use super::program::{ConditionKind, FieldRules, NodeIndex, RuleProgram, SubfieldRules};
use crate::builtins::{
    find_builtin, BuiltinId, ANY_SCOPE as _, FIELD_POST, FIELD_PRE, RECORD_POST, RECORD_PRE,
    SESSION_POST, SESSION_PRE, SUBFIELD_POST, SUBFIELD_PRE,
};
use crate::error::CompileError;
use crate::record::{INDIC1_CODE, INDIC2_CODE};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::io::BufRead;

/// Bound on nested `if`s.
const MAX_IF_DEPTH: usize = 64;

/// Append-only linked-list builder over a [`RuleProgram`]'s node
/// arena: `O(1)` per append, unlike [`RuleProgram::append_chain`]'s
/// walk, which is what divergent if/else branching needs.
#[derive(Debug, Clone, Copy, Default)]
struct ChainBuilder {
    head: Option<NodeIndex>,
    tail: Option<NodeIndex>,
}

impl ChainBuilder {
    /// Link `node` after the current tail (or make it the head, if
    /// empty), and advance the tail to it.
    fn push(&mut self, program: &mut RuleProgram, node: NodeIndex) {
        match self.tail {
            None => self.head = Some(node),
            Some(t) => program.nodes[t].true_next = Some(node),
        }
        self.tail = Some(node);
    }

    /// Move the tail to `node` without linking the old tail's
    /// `true_next` — used only for the `else` branch target, which is
    /// reached through the `if` node's `false_next`, not a fallthrough.
    fn retarget(&mut self, node: NodeIndex) {
        if self.head.is_none() {
            self.head = Some(node);
        }
        self.tail = Some(node);
    }
}

/// One open `if` awaiting its `else`/`endif`.
struct CondFrame {
    if_node: NodeIndex,
    /// The true-branch's last node, captured when `else` is seen, so
    /// `endif` can wire its `true_next` to the join point. `None`
    /// until `else` is processed (a bare `if`/`endif` with no `else`
    /// never needs it).
    branch_tail_before_else: Option<NodeIndex>,
    has_else: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Pre,
    Post,
}

#[derive(Debug, Clone)]
enum Scope {
    Session,
    Record,
    Field { pattern: String, all_variable: bool },
    Subfield { pattern: String, all_variable: bool, code: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveChain {
    SessionPre,
    SessionPost,
    RecordPre,
    RecordPost,
    FieldPre,
    FieldPost,
    SubfieldPre(u8),
    SubfieldPost(u8),
}

/// Per-field-block working chains, finalized into [`RuleProgram::fields`]
/// once the next `field =` (or end of file) closes the block.
#[derive(Default)]
struct FieldBlockState {
    pre: ChainBuilder,
    post: ChainBuilder,
    subfields: IndexMap<u8, (ChainBuilder, ChainBuilder)>,
}

/// Compiles one or more control-file sources into a single
/// [`RuleProgram`], accumulating recoverable [`CompileError`]s and
/// aborting only once their count exceeds a configured ceiling.
pub struct ControlCompiler {
    program: RuleProgram,
    errors: Vec<CompileError>,
    max_errors: usize,

    session_pre: ChainBuilder,
    session_post: ChainBuilder,
    record_pre: ChainBuilder,
    record_post: ChainBuilder,

    scope: Scope,
    active: Option<ActiveChain>,
    cond_stack: Vec<CondFrame>,

    current_field_block: Option<FieldBlockState>,
    /// `(specificity, block_id)` of whichever field block currently
    /// owns a given concrete tag, for range-overlap resolution.
    field_owner: HashMap<i32, (u8, usize)>,
    next_block_id: usize,
}

impl ControlCompiler {
    /// A fresh compiler, starting in session scope with no active chain.
    #[must_use]
    pub fn new(max_errors: usize) -> Self {
        ControlCompiler {
            program: RuleProgram::empty(),
            errors: Vec::new(),
            max_errors,
            session_pre: ChainBuilder::default(),
            session_post: ChainBuilder::default(),
            record_pre: ChainBuilder::default(),
            record_post: ChainBuilder::default(),
            scope: Scope::Session,
            active: None,
            cond_stack: Vec::new(),
            current_field_block: None,
            field_owner: HashMap::new(),
            next_block_id: 0,
        }
    }

    /// Compile one control-file source, identified by `filename` for
    /// diagnostics. May be called more than once to layer several
    /// files into one program.
    pub fn compile_file<R: BufRead>(&mut self, filename: &str, source: R) -> Result<(), CompileError> {
        let mut reader = ControlLineReader::new(source);
        loop {
            let line = match reader.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(message) => {
                    self.record_error(CompileError::BadScopeDirective {
                        location: format!("{filename}(?)"),
                        message,
                    })?;
                    break;
                }
            };
            let location = format!("{filename}({})", line.line_no);
            self.handle_line(&line, &location)?;
        }
        Ok(())
    }

    /// Finish compilation: close any still-open field block and
    /// return the program plus every recoverable error seen.
    #[must_use]
    pub fn finish(mut self) -> (RuleProgram, Vec<CompileError>) {
        self.finalize_open_field_block();
        self.program.session_pre = self.session_pre.head;
        self.program.session_post = self.session_post.head;
        self.program.record_pre = self.record_pre.head;
        self.program.record_post = self.record_post.head;
        (self.program, self.errors)
    }

    fn record_error(&mut self, err: CompileError) -> Result<(), CompileError> {
        self.errors.push(err);
        if self.errors.len() > self.max_errors {
            return Err(CompileError::TooManyErrors {
                count: self.errors.len(),
                max: self.max_errors,
            });
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &ControlLine, location: &str) -> Result<(), CompileError> {
        match line.key.as_str() {
            "session" => {
                self.finalize_open_field_block();
                self.scope = Scope::Session;
                self.active = None;
            }
            "record" => {
                self.finalize_open_field_block();
                self.scope = Scope::Record;
                self.active = None;
            }
            "field" => self.handle_field_directive(line, location)?,
            "subfield" => self.handle_subfield_directive(line, location)?,
            "indicator" => self.handle_indicator_directive(line, location)?,
            "prep" => self.compile_procedure(Position::Pre, line, location)?,
            "post" => self.compile_procedure(Position::Post, line, location)?,
            "else" => self.handle_else(location)?,
            "endif" => self.handle_endif(location)?,
            other => {
                self.record_error(CompileError::UnknownProcedure {
                    location: location.to_string(),
                    name: other.to_string(),
                })?;
            }
        }
        Ok(())
    }

    fn handle_field_directive(&mut self, line: &ControlLine, location: &str) -> Result<(), CompileError> {
        self.finalize_open_field_block();
        let pattern = line.values.first().cloned().unwrap_or_default();
        match expand_tag_pattern(&pattern) {
            Some(tags) => {
                let all_variable = tags.iter().all(|&t| t >= 10);
                self.scope = Scope::Field { pattern, all_variable };
                self.current_field_block = Some(FieldBlockState::default());
                self.active = None;
            }
            None => {
                self.record_error(CompileError::BadScopeDirective {
                    location: location.to_string(),
                    message: format!("invalid field pattern {pattern:?}"),
                })?;
            }
        }
        Ok(())
    }

    fn handle_subfield_directive(&mut self, line: &ControlLine, location: &str) -> Result<(), CompileError> {
        let (pattern, all_variable) = match &self.scope {
            Scope::Field { pattern, all_variable } => (pattern.clone(), *all_variable),
            Scope::Subfield { pattern, all_variable, .. } => (pattern.clone(), *all_variable),
            _ => {
                self.record_error(CompileError::BadScopeDirective {
                    location: location.to_string(),
                    message: "subfield directive requires an active field scope".to_string(),
                })?;
                return Ok(());
            }
        };
        let code_str = line.values.first().cloned().unwrap_or_default();
        match parse_subfield_code(&code_str) {
            Some(code) => {
                self.scope = Scope::Subfield { pattern, all_variable, code };
                self.active = None;
            }
            None => {
                self.record_error(CompileError::BadScopeDirective {
                    location: location.to_string(),
                    message: format!("invalid subfield code {code_str:?}"),
                })?;
            }
        }
        Ok(())
    }

    fn handle_indicator_directive(&mut self, line: &ControlLine, location: &str) -> Result<(), CompileError> {
        let (pattern, all_variable) = match &self.scope {
            Scope::Field { pattern, all_variable } => (pattern.clone(), *all_variable),
            Scope::Subfield { pattern, all_variable, .. } => (pattern.clone(), *all_variable),
            _ => {
                self.record_error(CompileError::BadScopeDirective {
                    location: location.to_string(),
                    message: "indicator directive requires an active field scope".to_string(),
                })?;
                return Ok(());
            }
        };
        if !all_variable {
            self.record_error(CompileError::BadScopeDirective {
                location: location.to_string(),
                message: "indicator directive is not legal on a fixed field".to_string(),
            })?;
            return Ok(());
        }
        let which = line.values.first().map(String::as_str);
        let code = match which {
            Some("1") => INDIC1_CODE,
            Some("2") => INDIC2_CODE,
            _ => {
                self.record_error(CompileError::BadScopeDirective {
                    location: location.to_string(),
                    message: format!("indicator selector must be 1 or 2, got {which:?}"),
                })?;
                return Ok(());
            }
        };
        self.scope = Scope::Subfield { pattern, all_variable, code };
        self.active = None;
        Ok(())
    }

    fn compile_procedure(&mut self, pos: Position, line: &ControlLine, location: &str) -> Result<(), CompileError> {
        let Some(name) = line.values.first().cloned() else {
            self.record_error(CompileError::UnknownProcedure {
                location: location.to_string(),
                name: String::new(),
            })?;
            return Ok(());
        };
        let Some(spec) = find_builtin(&name) else {
            self.record_error(CompileError::UnknownProcedure {
                location: location.to_string(),
                name,
            })?;
            return Ok(());
        };
        let args: Vec<String> = line.values[1..].to_vec();
        if args.len() < spec.min_args {
            self.record_error(CompileError::InsufficientArguments {
                location: location.to_string(),
                name,
                min: spec.min_args,
            })?;
            return Ok(());
        }
        if args.len() > spec.max_args {
            self.record_error(CompileError::TooManyArguments {
                location: location.to_string(),
                name,
                max: spec.max_args,
            })?;
            return Ok(());
        }

        let scope_bit = self.scope_bit(pos);
        if spec.scopes & scope_bit == 0 {
            self.record_error(CompileError::IllegalPosition {
                location: location.to_string(),
                name,
            })?;
            return Ok(());
        }

        self.active = Some(self.active_chain(pos));
        let condition = if spec.id == BuiltinId::If { ConditionKind::If } else { ConditionKind::None };
        let node = self.program.push_node(spec.id, args, location.to_string(), condition);
        self.push_to_active(node);

        if condition == ConditionKind::If {
            if self.cond_stack.len() >= MAX_IF_DEPTH {
                self.record_error(CompileError::IfNestTooDeep {
                    location: location.to_string(),
                    max: MAX_IF_DEPTH,
                })?;
            } else {
                self.cond_stack.push(CondFrame {
                    if_node: node,
                    branch_tail_before_else: None,
                    has_else: false,
                });
            }
        }
        Ok(())
    }

    fn handle_else(&mut self, location: &str) -> Result<(), CompileError> {
        let Some(mut frame) = self.cond_stack.pop() else {
            return self.record_error(CompileError::MismatchedConditional {
                location: location.to_string(),
                keyword: "else",
            });
        };
        let else_node = self.program.push_node(BuiltinId::Nop, vec![], location.to_string(), ConditionKind::Else);
        self.program.nodes[frame.if_node].false_next = Some(else_node);
        frame.branch_tail_before_else = self.active_builder_tail();
        frame.has_else = true;
        self.retarget_active(else_node);
        self.cond_stack.push(frame);
        Ok(())
    }

    fn handle_endif(&mut self, location: &str) -> Result<(), CompileError> {
        let Some(frame) = self.cond_stack.pop() else {
            return self.record_error(CompileError::MismatchedConditional {
                location: location.to_string(),
                keyword: "endif",
            });
        };
        let endif_node = self.program.push_node(BuiltinId::Nop, vec![], location.to_string(), ConditionKind::Endif);
        if frame.has_else {
            if let Some(tail) = frame.branch_tail_before_else {
                self.program.nodes[tail].true_next = Some(endif_node);
            }
        } else {
            self.program.nodes[frame.if_node].false_next = Some(endif_node);
        }
        self.push_to_active(endif_node);
        Ok(())
    }

    fn scope_bit(&self, pos: Position) -> u16 {
        match (&self.scope, pos) {
            (Scope::Session, Position::Pre) => SESSION_PRE,
            (Scope::Session, Position::Post) => SESSION_POST,
            (Scope::Record, Position::Pre) => RECORD_PRE,
            (Scope::Record, Position::Post) => RECORD_POST,
            (Scope::Field { .. }, Position::Pre) => FIELD_PRE,
            (Scope::Field { .. }, Position::Post) => FIELD_POST,
            (Scope::Subfield { .. }, Position::Pre) => SUBFIELD_PRE,
            (Scope::Subfield { .. }, Position::Post) => SUBFIELD_POST,
        }
    }

    fn active_chain(&self, pos: Position) -> ActiveChain {
        match (&self.scope, pos) {
            (Scope::Session, Position::Pre) => ActiveChain::SessionPre,
            (Scope::Session, Position::Post) => ActiveChain::SessionPost,
            (Scope::Record, Position::Pre) => ActiveChain::RecordPre,
            (Scope::Record, Position::Post) => ActiveChain::RecordPost,
            (Scope::Field { .. }, Position::Pre) => ActiveChain::FieldPre,
            (Scope::Field { .. }, Position::Post) => ActiveChain::FieldPost,
            (Scope::Subfield { code, .. }, Position::Pre) => ActiveChain::SubfieldPre(*code),
            (Scope::Subfield { code, .. }, Position::Post) => ActiveChain::SubfieldPost(*code),
        }
    }

    /// Link `node` after the active chain's current tail and advance it.
    fn push_to_active(&mut self, node: NodeIndex) {
        let Some(active) = self.active else { return };
        let ControlCompiler {
            program,
            session_pre,
            session_post,
            record_pre,
            record_post,
            current_field_block,
            ..
        } = self;
        match active {
            ActiveChain::SessionPre => session_pre.push(program, node),
            ActiveChain::SessionPost => session_post.push(program, node),
            ActiveChain::RecordPre => record_pre.push(program, node),
            ActiveChain::RecordPost => record_post.push(program, node),
            ActiveChain::FieldPre => current_field_block.as_mut().expect("field scope active").pre.push(program, node),
            ActiveChain::FieldPost => current_field_block.as_mut().expect("field scope active").post.push(program, node),
            ActiveChain::SubfieldPre(code) => {
                let block = current_field_block.as_mut().expect("field scope active");
                block.subfields.entry(code).or_default().0.push(program, node);
            }
            ActiveChain::SubfieldPost(code) => {
                let block = current_field_block.as_mut().expect("field scope active");
                block.subfields.entry(code).or_default().1.push(program, node);
            }
        }
    }

    /// Move the active chain's tail to `node` without linking the old
    /// tail (the `else` branch-target case).
    fn retarget_active(&mut self, node: NodeIndex) {
        let Some(active) = self.active else { return };
        let ControlCompiler { current_field_block, session_pre, session_post, record_pre, record_post, .. } = self;
        match active {
            ActiveChain::SessionPre => session_pre.retarget(node),
            ActiveChain::SessionPost => session_post.retarget(node),
            ActiveChain::RecordPre => record_pre.retarget(node),
            ActiveChain::RecordPost => record_post.retarget(node),
            ActiveChain::FieldPre => current_field_block.as_mut().expect("field scope active").pre.retarget(node),
            ActiveChain::FieldPost => current_field_block.as_mut().expect("field scope active").post.retarget(node),
            ActiveChain::SubfieldPre(code) => {
                let block = current_field_block.as_mut().expect("field scope active");
                block.subfields.entry(code).or_default().0.retarget(node);
            }
            ActiveChain::SubfieldPost(code) => {
                let block = current_field_block.as_mut().expect("field scope active");
                block.subfields.entry(code).or_default().1.retarget(node);
            }
        }
    }

    fn active_builder_tail(&self) -> Option<NodeIndex> {
        let active = self.active?;
        match active {
            ActiveChain::SessionPre => self.session_pre.tail,
            ActiveChain::SessionPost => self.session_post.tail,
            ActiveChain::RecordPre => self.record_pre.tail,
            ActiveChain::RecordPost => self.record_post.tail,
            ActiveChain::FieldPre => self.current_field_block.as_ref()?.pre.tail,
            ActiveChain::FieldPost => self.current_field_block.as_ref()?.post.tail,
            ActiveChain::SubfieldPre(code) => self.current_field_block.as_ref()?.subfields.get(&code)?.0.tail,
            ActiveChain::SubfieldPost(code) => self.current_field_block.as_ref()?.subfields.get(&code)?.1.tail,
        }
    }

    /// Close the current field block (if any), resolving range-overlap
    /// conflicts against every tag it covers.
    fn finalize_open_field_block(&mut self) {
        let Scope::Field { pattern, .. } | Scope::Subfield { pattern, .. } = &self.scope else {
            return;
        };
        let Some(block) = self.current_field_block.take() else { return };
        let pattern = pattern.clone();
        let Some(tags) = expand_tag_pattern(&pattern) else { return };
        let specificity = pattern.chars().filter(|c| !c.eq_ignore_ascii_case(&'x')).count() as u8;
        let block_id = self.next_block_id;
        self.next_block_id += 1;

        let rules = FieldRules {
            pre: block.pre.head,
            post: block.post.head,
            subfields: block
                .subfields
                .into_iter()
                .map(|(code, (pre, post))| (code, SubfieldRules { pre: pre.head, post: post.head }))
                .collect(),
            specificity,
        };

        for tag in tags {
            match self.field_owner.get(&tag).copied() {
                None => {
                    self.field_owner.insert(tag, (specificity, block_id));
                    self.program.fields.insert(tag, rules.clone());
                }
                Some((existing_specificity, existing_block)) => {
                    if specificity > existing_specificity {
                        self.field_owner.insert(tag, (specificity, block_id));
                        self.program.fields.insert(tag, rules.clone());
                    } else if specificity == existing_specificity && existing_block != block_id {
                        self.errors.push(CompileError::DuplicateFieldRule {
                            location: format!("(field pattern {pattern:?})"),
                            tag,
                        });
                    }
                }
            }
        }
    }
}

/// Expand a 3-character tag pattern (digits and `X`/`x` wildcards)
/// into the concrete tags it matches, or `None` if malformed. `X`
/// positions denote wildcard digit ranges.
fn expand_tag_pattern(pattern: &str) -> Option<Vec<i32>> {
    let chars: Vec<char> = pattern.chars().collect();
    if chars.len() != 3 {
        return None;
    }
    let mut digit_sets: Vec<Vec<i32>> = Vec::with_capacity(3);
    for c in chars {
        if c.eq_ignore_ascii_case(&'x') {
            digit_sets.push((0..10).collect());
        } else if let Some(d) = c.to_digit(10) {
            digit_sets.push(vec![d as i32]);
        } else {
            return None;
        }
    }
    let mut tags = Vec::new();
    for a in &digit_sets[0] {
        for b in &digit_sets[1] {
            for c in &digit_sets[2] {
                tags.push(a * 100 + b * 10 + c);
            }
        }
    }
    Some(tags)
}

/// A subfield code must be a single printable, non-indicator-sentinel
/// byte.
fn parse_subfield_code(s: &str) -> Option<u8> {
    let bytes = s.as_bytes();
    if bytes.len() != 1 {
        return None;
    }
    let b = bytes[0];
    if b == INDIC1_CODE || b == INDIC2_CODE || !b.is_ascii_graphic() {
        return None;
    }
    Some(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_control_file_yields_empty_program() {
        let mut c = ControlCompiler::new(50);
        c.compile_file("t.ctl", Cursor::new("")).unwrap();
        let (prog, errors) = c.finish();
        assert!(errors.is_empty());
        assert!(prog.session_pre.is_none());
        assert!(prog.fields.is_empty());
    }

    #[test]
    fn field_scope_compiles_prep_chain() {
        let src = "field = 245\nsubfield = a\nprep = substr/%data/%data/0/5\n";
        let mut c = ControlCompiler::new(50);
        c.compile_file("t.ctl", Cursor::new(src)).unwrap();
        let (prog, errors) = c.finish();
        assert!(errors.is_empty(), "{errors:?}");
        let rules = prog.fields.get(&245).expect("245 rule present");
        let sf_rules = rules.subfields.get(&b'a').expect("subfield a rule present");
        assert!(sf_rules.pre.is_some());
        let node = &prog.nodes[sf_rules.pre.unwrap()];
        assert_eq!(node.builtin, BuiltinId::Substr);
    }

    #[test]
    fn range_pattern_is_less_specific_than_exact_tag() {
        let src = "field = 9XX\nprep = killfld\nfield = 980\nprep = donefld\n";
        let mut c = ControlCompiler::new(50);
        c.compile_file("t.ctl", Cursor::new(src)).unwrap();
        let (prog, errors) = c.finish();
        assert!(errors.is_empty(), "{errors:?}");
        let exact = &prog.nodes[prog.fields[&980].pre.unwrap()];
        assert_eq!(exact.builtin, BuiltinId::Donefld);
        let ranged = &prog.nodes[prog.fields[&981].pre.unwrap()];
        assert_eq!(ranged.builtin, BuiltinId::Killfld);
    }

    #[test]
    fn duplicate_equally_specific_rule_is_an_error() {
        let src = "field = 245\nprep = killfld\nfield = 245\nprep = donefld\n";
        let mut c = ControlCompiler::new(50);
        c.compile_file("t.ctl", Cursor::new(src)).unwrap();
        let (_prog, errors) = c.finish();
        assert!(matches!(errors.as_slice(), [CompileError::DuplicateFieldRule { tag: 245, .. }]));
    }

    #[test]
    fn if_else_endif_converge() {
        let src = "record\nprep = if/%data/*\nprep = copy/%data/\"a\"\nelse\nprep = copy/%data/\"b\"\nendif\nprep = clear/%data\n";
        let mut c = ControlCompiler::new(50);
        c.compile_file("t.ctl", Cursor::new(src)).unwrap();
        let (prog, errors) = c.finish();
        assert!(errors.is_empty(), "{errors:?}");
        let if_idx = prog.record_pre.unwrap();
        let if_node = &prog.nodes[if_idx];
        assert_eq!(if_node.builtin, BuiltinId::If);
        let true_branch = &prog.nodes[if_node.true_next.unwrap()];
        assert_eq!(true_branch.builtin, BuiltinId::Copy);
        let else_node = &prog.nodes[if_node.false_next.unwrap()];
        assert_eq!(else_node.condition, ConditionKind::Else);
        let false_branch = &prog.nodes[else_node.true_next.unwrap()];
        assert_eq!(false_branch.builtin, BuiltinId::Copy);
        // both branches converge on the endif node, then on `clear`.
        let true_endif = true_branch.true_next.unwrap();
        let false_endif = false_branch.true_next.unwrap();
        assert_eq!(true_endif, false_endif);
        let clear_node = &prog.nodes[prog.nodes[true_endif].true_next.unwrap()];
        assert_eq!(clear_node.builtin, BuiltinId::Clear);
    }

    #[test]
    fn mismatched_endif_is_recorded_but_compilation_continues() {
        let src = "record\nendif\nprep = clear/%data\n";
        let mut c = ControlCompiler::new(50);
        c.compile_file("t.ctl", Cursor::new(src)).unwrap();
        let (prog, errors) = c.finish();
        assert!(matches!(errors.as_slice(), [CompileError::MismatchedConditional { keyword: "endif", .. }]));
        assert!(prog.record_pre.is_some());
    }

    #[test]
    fn indicator_directive_rejected_on_fixed_field() {
        let src = "field = 001\nindicator = 1\n";
        let mut c = ControlCompiler::new(50);
        c.compile_file("t.ctl", Cursor::new(src)).unwrap();
        let (_prog, errors) = c.finish();
        assert!(matches!(errors.as_slice(), [CompileError::BadScopeDirective { .. }]));
    }
}
