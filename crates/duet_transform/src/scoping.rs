//! Binding analysis ahead of lowering.
//!
//! Block-scoped declarations become function-scoped `var`s. A binding
//! declared in a nested block is renamed when hoisting it would collide with
//! another binding of the same function, or would capture a reference that
//! resolves elsewhere. Loops whose block-scoped bindings are captured by a
//! closure are recorded, so each iteration can get a scope of its own.

use std::collections::{HashMap, HashSet};

use oxc_ast::ast::{
    BindingIdentifier, BindingPattern, BindingPatternKind, ClassType, ForStatementInit, ForStatementLeft,
    FunctionType, Program, VariableDeclarationKind,
};
use oxc_ast::{AstKind, Visit};
use oxc_semantic::SymbolTable;
use oxc_span::{GetSpan, Span};
use oxc_syntax::symbol::SymbolId;

/// Hands out identifiers that appear nowhere in the bundle.
#[derive(Debug, Default)]
pub(crate) struct NameGen {
    taken: HashSet<String>,
}

impl NameGen {
    pub(crate) fn fresh(&mut self, base: &str) -> String {
        let base = base.trim_start_matches('_');
        let mut n = 1;
        loop {
            let name = if n == 1 {
                format!("_{base}")
            } else {
                format!("_{base}{n}")
            };
            n += 1;
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }
}

/// What lowering needs to know about one loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoopFacts {
    body: Span,
    /// A closure captures one of the loop's block-scoped bindings.
    pub(crate) captured: bool,
    /// The body refers to the enclosing `this`.
    pub(crate) this: bool,
    /// Offset of a `break`, `continue` or `return` leaving the body.
    pub(crate) jump: Option<u32>,
    /// Offset of an `arguments` reference in the body.
    pub(crate) arguments: Option<u32>,
    /// Offset of a `var` or function declaration in the body.
    pub(crate) declaration: Option<u32>,
    /// Offset of an assignment to a head binding inside the body.
    pub(crate) head_write: Option<u32>,
}

/// The outcome of [`analyze`].
#[derive(Debug, Default)]
pub(crate) struct Scoping {
    pub(crate) renames: HashMap<SymbolId, String>,
    pub(crate) names: NameGen,
    loops: HashMap<u32, LoopFacts>,
}

impl Scoping {
    /// Facts about the loop statement starting at `start`.
    pub(crate) fn loop_at(&self, start: u32) -> Option<&LoopFacts> {
        self.loops.get(&start)
    }
}

/// Collects the identifiers a binding pattern declares.
pub(crate) fn pattern_bindings<'p, 'a>(
    pattern: &'p BindingPattern<'a>,
    out: &mut Vec<&'p BindingIdentifier<'a>>,
) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => out.push(&**id),
        BindingPatternKind::ObjectPattern(obj) => {
            for prop in &obj.properties {
                pattern_bindings(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                pattern_bindings(&rest.argument, out);
            }
        }
        BindingPatternKind::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                pattern_bindings(element, out);
            }
            if let Some(rest) = &arr.rest {
                pattern_bindings(&rest.argument, out);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => pattern_bindings(&assign.left, out),
    }
}

/// Analyzes `program`, whose identifiers `symbols` resolves.
pub(crate) fn analyze(program: &Program<'_>, symbols: &SymbolTable) -> Scoping {
    let mut analyzer = Analyzer {
        symbols,
        frames: Vec::new(),
        next_frame: 0,
        bindings: HashMap::new(),
        uses: Vec::new(),
        loops: Vec::new(),
        loop_starts: Vec::new(),
        heads: HashMap::new(),
        names: HashSet::new(),
    };
    analyzer.push_frame(FrameKind::Program);
    analyzer.visit_program(program);
    analyzer.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Program,
    Function,
    Arrow,
}

/// A function body being visited.
#[derive(Debug)]
struct Frame {
    id: usize,
    kind: FrameKind,
    block_depth: u32,
    loops: Vec<usize>,
    /// Innermost-last break targets; `None` is a `switch`.
    breakables: Vec<Option<usize>>,
}

#[derive(Debug)]
struct Binding {
    name: String,
    frame: usize,
    /// Block-scoped and declared below the function's top level.
    candidate: bool,
    order: usize,
    scope_loop: Option<usize>,
    head_of: Option<usize>,
}

#[derive(Debug)]
struct Use {
    symbol: Option<SymbolId>,
    name: String,
    /// Frame ids from outermost to the frame of the reference.
    frames: Vec<usize>,
    offset: u32,
    write: bool,
}

struct Analyzer<'s> {
    symbols: &'s SymbolTable,
    frames: Vec<Frame>,
    next_frame: usize,
    bindings: HashMap<SymbolId, Binding>,
    uses: Vec<Use>,
    loops: Vec<LoopFacts>,
    loop_starts: Vec<u32>,
    /// Loop head declarations by span start.
    heads: HashMap<u32, usize>,
    names: HashSet<String>,
}

impl Analyzer<'_> {
    fn push_frame(&mut self, kind: FrameKind) {
        self.frames.push(Frame {
            id: self.next_frame,
            kind,
            block_depth: 0,
            loops: Vec::new(),
            breakables: Vec::new(),
        });
        self.next_frame += 1;
    }

    fn frame(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn bind(&mut self, id: &BindingIdentifier<'_>, block_scoped: bool, head_of: Option<usize>) {
        self.names.insert(id.name.to_string());
        let Some(symbol) = id.symbol_id.get() else {
            return;
        };
        if self.bindings.contains_key(&symbol) {
            return;
        }
        let order = self.bindings.len();
        let frame = self.frame();
        let binding = Binding {
            name: id.name.to_string(),
            frame: frame.id,
            candidate: block_scoped && frame.block_depth > 0,
            order,
            scope_loop: if block_scoped {
                frame.loops.last().copied()
            } else {
                None
            },
            head_of,
        };
        self.bindings.insert(symbol, binding);
    }

    fn push_loop(&mut self, span: Span, body: Span) {
        let index = self.loops.len();
        self.loops.push(LoopFacts {
            body,
            ..LoopFacts::default()
        });
        self.loop_starts.push(span.start);
        let frame = self.frame();
        frame.loops.push(index);
        frame.breakables.push(Some(index));
    }

    fn pop_loop(&mut self) {
        let frame = self.frame();
        frame.loops.pop();
        frame.breakables.pop();
    }

    /// Applies `mark` to the loops whose bodies share the current `this`.
    fn mark_lexical(&mut self, mut mark: impl FnMut(&mut LoopFacts)) {
        for frame in self.frames.iter().rev() {
            for &l in &frame.loops {
                mark(&mut self.loops[l]);
            }
            if frame.kind != FrameKind::Arrow {
                break;
            }
        }
    }

    fn mark_jump(&mut self, loops: Vec<usize>, offset: u32) {
        for l in loops {
            self.loops[l].jump.get_or_insert(offset);
        }
    }

    fn note_declaration(&mut self, offset: u32) {
        let frame = self.frames.len() - 1;
        for &l in &self.frames[frame].loops {
            let facts = &mut self.loops[l];
            if facts.body.start <= offset && offset < facts.body.end {
                facts.declaration.get_or_insert(offset);
            }
        }
    }

    fn finish(self) -> Scoping {
        let Analyzer {
            bindings,
            uses,
            mut loops,
            loop_starts,
            names,
            ..
        } = self;

        for u in &uses {
            let Some(binding) = u.symbol.and_then(|s| bindings.get(&s)) else {
                continue;
            };
            if let Some(l) = binding.scope_loop {
                if u.frames.last() != Some(&binding.frame) {
                    loops[l].captured = true;
                }
            }
            if let Some(l) = binding.head_of {
                let body = loops[l].body;
                if u.write && body.start <= u.offset && u.offset < body.end {
                    loops[l].head_write.get_or_insert(u.offset);
                }
            }
        }

        // Names referenced through each frame, with what they resolve to.
        let mut through: HashMap<(usize, &str), Vec<Option<SymbolId>>> = HashMap::new();
        for u in &uses {
            let home = u.symbol.and_then(|s| bindings.get(&s)).map(|b| b.frame);
            for &frame in u.frames.iter().rev() {
                if Some(frame) == home {
                    break;
                }
                through.entry((frame, u.name.as_str())).or_default().push(u.symbol);
            }
        }

        let mut groups: HashMap<(usize, &str), Vec<(SymbolId, &Binding)>> = HashMap::new();
        for (&symbol, binding) in &bindings {
            groups
                .entry((binding.frame, binding.name.as_str()))
                .or_default()
                .push((symbol, binding));
        }

        let mut candidates: Vec<(SymbolId, &Binding)> = bindings
            .iter()
            .filter(|(_, b)| b.candidate)
            .map(|(&s, b)| (s, b))
            .collect();
        candidates.sort_by_key(|(_, b)| b.order);

        let mut gen = NameGen { taken: names };
        let mut renames = HashMap::new();
        for (symbol, binding) in candidates {
            let key = (binding.frame, binding.name.as_str());
            let group = groups.get(&key).map(Vec::as_slice).unwrap_or_default();
            let shares_with_other = group.iter().any(|(_, b)| !b.candidate);
            let first = group
                .iter()
                .filter(|(_, b)| b.candidate)
                .min_by_key(|(_, b)| b.order)
                .map(|(s, _)| *s);
            let captures_other = through
                .get(&key)
                .is_some_and(|resolved| resolved.iter().any(|s| *s != Some(symbol)));
            if shares_with_other || first != Some(symbol) || captures_other {
                renames.insert(symbol, gen.fresh(&binding.name));
            }
        }

        Scoping {
            renames,
            names: gen,
            loops: loop_starts.into_iter().zip(loops).collect(),
        }
    }
}

impl<'a> Visit<'a> for Analyzer<'_> {
    fn enter_node(&mut self, kind: AstKind<'a>) {
        match kind {
            AstKind::Function(func) => {
                if func.r#type == FunctionType::FunctionDeclaration {
                    if let Some(id) = &func.id {
                        self.bind(id, false, None);
                    }
                    self.note_declaration(func.span.start);
                }
                self.push_frame(FrameKind::Function);
            }
            AstKind::ArrowFunctionExpression(_) => self.push_frame(FrameKind::Arrow),
            AstKind::Class(class) => {
                if class.r#type == ClassType::ClassDeclaration {
                    if let Some(id) = &class.id {
                        self.bind(id, true, None);
                    }
                }
            }
            AstKind::VariableDeclaration(decl) => {
                let head = self.heads.get(&decl.span.start).copied();
                let block_scoped = matches!(
                    decl.kind,
                    VariableDeclarationKind::Let | VariableDeclarationKind::Const
                );
                if !block_scoped && head.is_none() {
                    self.note_declaration(decl.span.start);
                }
                let mut ids = Vec::new();
                for declarator in &decl.declarations {
                    pattern_bindings(&declarator.id, &mut ids);
                }
                for id in ids {
                    self.bind(id, block_scoped, head.filter(|_| block_scoped));
                }
            }
            AstKind::BindingIdentifier(id) => self.bind(id, false, None),
            AstKind::IdentifierReference(ident) => {
                self.names.insert(ident.name.to_string());
                let symbols = self.symbols;
                let reference = ident.reference_id.get().map(|id| symbols.get_reference(id));
                let symbol = reference.and_then(|r| r.symbol_id());
                if symbol.is_none() && ident.name == "arguments" {
                    let offset = ident.span.start;
                    self.mark_lexical(|facts| {
                        facts.arguments.get_or_insert(offset);
                    });
                }
                self.uses.push(Use {
                    symbol,
                    name: ident.name.to_string(),
                    frames: self.frames.iter().map(|f| f.id).collect(),
                    offset: ident.span.start,
                    write: reference.is_some_and(|r| r.is_write()),
                });
            }
            AstKind::IdentifierName(name) => {
                self.names.insert(name.name.to_string());
            }
            AstKind::ThisExpression(_) => self.mark_lexical(|facts| facts.this = true),
            AstKind::BlockStatement(_) => self.frame().block_depth += 1,
            AstKind::SwitchStatement(_) => {
                let frame = self.frame();
                frame.block_depth += 1;
                frame.breakables.push(None);
            }
            AstKind::ForStatement(stmt) => {
                self.frame().block_depth += 1;
                if let Some(ForStatementInit::VariableDeclaration(decl)) = &stmt.init {
                    self.heads.insert(decl.span.start, self.loops.len());
                }
                self.push_loop(stmt.span, stmt.body.span());
            }
            AstKind::ForInStatement(stmt) => {
                self.frame().block_depth += 1;
                if let ForStatementLeft::VariableDeclaration(decl) = &stmt.left {
                    self.heads.insert(decl.span.start, self.loops.len());
                }
                self.push_loop(stmt.span, stmt.body.span());
            }
            AstKind::ForOfStatement(stmt) => {
                self.frame().block_depth += 1;
                if let ForStatementLeft::VariableDeclaration(decl) = &stmt.left {
                    self.heads.insert(decl.span.start, self.loops.len());
                }
                self.push_loop(stmt.span, stmt.body.span());
            }
            AstKind::WhileStatement(stmt) => self.push_loop(stmt.span, stmt.body.span()),
            AstKind::DoWhileStatement(stmt) => self.push_loop(stmt.span, stmt.body.span()),
            AstKind::BreakStatement(stmt) => {
                let frame = self.frame();
                let targets = if stmt.label.is_some() {
                    frame.loops.clone()
                } else {
                    frame.breakables.last().copied().flatten().into_iter().collect()
                };
                self.mark_jump(targets, stmt.span.start);
            }
            AstKind::ContinueStatement(stmt) => {
                let frame = self.frame();
                let targets = if stmt.label.is_some() {
                    frame.loops.clone()
                } else {
                    frame.loops.last().copied().into_iter().collect()
                };
                self.mark_jump(targets, stmt.span.start);
            }
            AstKind::ReturnStatement(stmt) => {
                let targets = self.frame().loops.clone();
                self.mark_jump(targets, stmt.span.start);
            }
            _ => {}
        }
    }

    fn leave_node(&mut self, kind: AstKind<'a>) {
        match kind {
            AstKind::Function(_) | AstKind::ArrowFunctionExpression(_) => {
                self.frames.pop();
            }
            AstKind::BlockStatement(_) => self.frame().block_depth -= 1,
            AstKind::SwitchStatement(_) => {
                let frame = self.frame();
                frame.block_depth -= 1;
                frame.breakables.pop();
            }
            AstKind::ForStatement(_) | AstKind::ForInStatement(_) | AstKind::ForOfStatement(_) => {
                self.frame().block_depth -= 1;
                self.pop_loop();
            }
            AstKind::WhileStatement(_) | AstKind::DoWhileStatement(_) => self.pop_loop(),
            _ => {}
        }
    }
}
