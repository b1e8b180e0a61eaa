//! Lowering of modern syntax to the legacy baseline.
//!
//! The bundle is parsed and resolved with oxc, then rewritten as text edits
//! in one post-order walk, so every construct renders its already-lowered
//! children into its own replacement. Lowered constructs:
//!
//! * arrow functions, bound with `.bind(this)` when they use `this`;
//! * `let`, `const` and class declarations, renamed where hoisting to `var`
//!   would collide, with loops whose bindings escape into closures given a
//!   scope per iteration;
//! * classes, including `extends` and `super`;
//! * destructuring declarations, default and rest parameters;
//! * template literals, shorthand properties and methods, spread in arrays
//!   and calls, `for...of` over array-likes and `**`;
//! * binary, octal and separated numeric literals, and `\u{...}` escapes.
//!
//! Anything else above the baseline fails with its position instead of
//! passing through.

use std::collections::HashSet;

use duet_sourcemap::SourceMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, ArrayExpression, ArrayExpressionElement, ArrowFunctionExpression, AssignmentTarget,
    BindingIdentifier, BindingPattern, BindingPatternKind, CallExpression, Class, ClassElement,
    ClassType, Expression, ForOfStatement, ForStatementInit, ForStatementLeft, FormalParameters,
    Function, FunctionBody, IdentifierReference, MethodDefinitionKind, NumericLiteral,
    ObjectProperty, ObjectPropertyKind, PropertyKey, Statement, StringLiteral, TemplateElement,
    TemplateLiteral, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast::{AstKind, Visit};
use oxc_parser::Parser;
use oxc_semantic::{SemanticBuilder, SymbolTable};
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::operator::{AssignmentOperator, BinaryOperator, LogicalOperator};

use crate::edit::{Edits, Side};
use crate::error::SyntaxError;
use crate::js::{is_identifier_name, member, number, quote};
use crate::scoping::{analyze, pattern_bindings, Scoping};

/// Options for [`lower`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerOptions<'o> {
    /// Rewrites string literals starting with the first string to start
    /// with the second. Used on the runtime chunk, whose lazy chunk URLs
    /// embed the target tag.
    pub chunk_rewrite: Option<(&'o str, &'o str)>,
}

/// Lowered code with a map back to the input.
#[derive(Debug, Clone)]
pub struct Lowered {
    /// Code at the legacy syntax level.
    pub code: String,
    /// Maps `code` to the input, named after the input file.
    pub map: SourceMap,
    /// How many chunk references were rewritten.
    pub rewritten: usize,
}

/// Parses `source` as a script, for lowering and printing alike.
pub(crate) fn script_type() -> SourceType {
    SourceType::default().with_module(false)
}

/// Lowers `source`, whose file is called `source_name`.
pub fn lower(
    source: &str,
    source_name: &str,
    options: LowerOptions<'_>,
) -> Result<Lowered, SyntaxError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, script_type()).parse();
    if !parsed.errors.is_empty() {
        return Err(SyntaxError::from_diagnostics(source, &parsed.errors));
    }
    let semantic = SemanticBuilder::new().build(&parsed.program).semantic;
    let symbols = semantic.symbols();
    let scoping = analyze(&parsed.program, symbols);

    let mut lowerer = Lowerer {
        edits: Edits::new(source),
        symbols,
        scoping,
        chunk_rewrite: options.chunk_rewrite,
        rewritten: 0,
        frames: Vec::new(),
        classes: Vec::new(),
        methods: Vec::new(),
        super_calls: HashSet::new(),
        loop_heads: HashSet::new(),
        error: None,
    };
    lowerer.visit_program(&parsed.program);
    if let Some(err) = lowerer.error {
        return Err(err);
    }
    let rewritten = lowerer.rewritten;
    let (code, map) = lowerer.edits.finish(source_name, source_name);
    Ok(Lowered {
        code,
        map,
        rewritten,
    })
}

/// A function or arrow being walked.
#[derive(Debug, Default)]
struct Frame {
    arrow: bool,
    this: bool,
    arguments: Option<u32>,
    super_ref: Option<u32>,
}

struct ClassFrame {
    super_name: Option<String>,
}

struct Lowerer<'s, 'o> {
    edits: Edits<'s>,
    symbols: &'s SymbolTable,
    scoping: Scoping,
    chunk_rewrite: Option<(&'o str, &'o str)>,
    rewritten: usize,
    frames: Vec<Frame>,
    classes: Vec<ClassFrame>,
    /// Whether each enclosing method is static.
    methods: Vec<bool>,
    /// Starts of `super` callees.
    super_calls: HashSet<u32>,
    /// Starts of `for...in` and `for...of` head declarations.
    loop_heads: HashSet<u32>,
    error: Option<SyntaxError>,
}

impl Lowerer<'_, '_> {
    fn fail(&mut self, offset: u32, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(SyntaxError::at(self.edits.source(), offset, message));
        }
    }

    fn unsupported(&mut self, offset: u32, what: &str) {
        self.fail(offset, format!("{what} cannot be lowered to ES5"));
    }

    fn text(&self, span: Span) -> String {
        self.edits.render(span.start, span.end)
    }

    fn fresh(&mut self, base: &str) -> String {
        self.scoping.names.fresh(base)
    }

    fn binding_name(&self, id: &BindingIdentifier<'_>) -> String {
        id.symbol_id
            .get()
            .and_then(|s| self.scoping.renames.get(&s))
            .cloned()
            .unwrap_or_else(|| id.name.to_string())
    }

    fn reference_name(&self, ident: &IdentifierReference<'_>) -> String {
        ident
            .reference_id
            .get()
            .and_then(|r| self.symbols.get_reference(r).symbol_id())
            .and_then(|s| self.scoping.renames.get(&s))
            .cloned()
            .unwrap_or_else(|| ident.name.to_string())
    }

    /// Marks the frames sharing the current `this`, innermost first.
    fn mark_lexical(&mut self, mut mark: impl FnMut(&mut Frame)) {
        for frame in self.frames.iter_mut().rev() {
            mark(frame);
            if !frame.arrow {
                break;
            }
        }
    }

    /// `value` if it is a plain name, else a temporary holding it.
    fn simple(&mut self, value: String, out: &mut Vec<String>) -> String {
        if is_identifier_name(&value) {
            value
        } else {
            let tmp = self.fresh("ref");
            out.push(format!("{tmp} = {value}"));
            tmp
        }
    }

    fn key_member(&self, key: &PropertyKey<'_>) -> Option<String> {
        match key {
            PropertyKey::StaticIdentifier(id) => Some(member(&id.name)),
            PropertyKey::StringLiteral(lit) => Some(member(&lit.value)),
            PropertyKey::NumericLiteral(lit) => Some(format!("[{}]", number(lit.value))),
            _ => None,
        }
    }

    fn key_name(&self, key: &PropertyKey<'_>) -> Option<String> {
        match key {
            PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
            PropertyKey::StringLiteral(lit) => Some(lit.value.to_string()),
            PropertyKey::NumericLiteral(lit) => Some(number(lit.value)),
            _ => None,
        }
    }

    /// Appends `name = part` declarators binding `pattern` to `value`.
    fn destructure(&mut self, pattern: &BindingPattern<'_>, value: String, out: &mut Vec<String>) {
        match &pattern.kind {
            BindingPatternKind::BindingIdentifier(id) => {
                out.push(format!("{} = {}", self.binding_name(id), value));
            }
            BindingPatternKind::AssignmentPattern(assign) => {
                let default = self.text(assign.right.span());
                let tmp = self.simple(value, out);
                self.destructure(
                    &assign.left,
                    format!("{tmp} === void 0 ? {default} : {tmp}"),
                    out,
                );
            }
            BindingPatternKind::ObjectPattern(obj) => {
                let base = self.simple(value, out);
                for prop in &obj.properties {
                    match self.key_member(&prop.key).filter(|_| !prop.computed) {
                        Some(access) => self.destructure(&prop.value, format!("{base}{access}"), out),
                        None => self.unsupported(prop.span.start, "a computed destructuring key"),
                    }
                }
                if let Some(rest) = &obj.rest {
                    self.unsupported(rest.span.start, "object rest");
                }
            }
            BindingPatternKind::ArrayPattern(arr) => {
                let base = self.simple(value, out);
                for (i, element) in arr.elements.iter().enumerate() {
                    if let Some(element) = element {
                        self.destructure(element, format!("{base}[{i}]"), out);
                    }
                }
                if let Some(rest) = &arr.rest {
                    let tail = format!("{base}.slice({})", arr.elements.len());
                    self.destructure(&rest.argument, tail, out);
                }
            }
        }
    }

    /// Rewrites default, rest and destructured parameters to plain names,
    /// returning the statements that restore them.
    fn lower_params(&mut self, params: &FormalParameters<'_>) -> String {
        let mut prologue = String::new();
        for param in &params.items {
            match &param.pattern.kind {
                BindingPatternKind::BindingIdentifier(_) => {}
                BindingPatternKind::AssignmentPattern(assign) => {
                    let default = self.text(assign.right.span());
                    let name = match &assign.left.kind {
                        BindingPatternKind::BindingIdentifier(id) => self.binding_name(id),
                        _ => self.fresh("ref"),
                    };
                    self.edits.replace(param.span.start, param.span.end, name.clone());
                    prologue.push_str(&format!("if ({name} === void 0) {name} = {default}; "));
                    if !matches!(assign.left.kind, BindingPatternKind::BindingIdentifier(_)) {
                        let mut parts = Vec::new();
                        self.destructure(&assign.left, name, &mut parts);
                        prologue.push_str(&format!("var {}; ", parts.join(", ")));
                    }
                }
                _ => {
                    let name = self.fresh("ref");
                    self.edits.replace(param.span.start, param.span.end, name.clone());
                    let mut parts = Vec::new();
                    self.destructure(&param.pattern, name, &mut parts);
                    prologue.push_str(&format!("var {}; ", parts.join(", ")));
                }
            }
        }
        if let Some(rest) = &params.rest {
            let start = params.items.last().map_or(rest.span.start, |p| p.span.end);
            self.edits.replace(start, rest.span.end, "");
            let tail = format!("[].slice.call(arguments, {})", params.items.len());
            let mut parts = Vec::new();
            self.destructure(&rest.argument, tail, &mut parts);
            prologue.push_str(&format!("var {}; ", parts.join(", ")));
        }
        prologue
    }

    fn insert_prologue(&mut self, body: &FunctionBody<'_>, prologue: String) {
        if prologue.is_empty() {
            return;
        }
        let at = body
            .directives
            .last()
            .map_or(body.span.start + 1, |d| d.span.end);
        self.edits
            .insert(at, Side::After, format!(" {}", prologue.trim_end()));
    }

    fn lower_function(&mut self, func: &Function<'_>) {
        let Some(body) = &func.body else {
            return;
        };
        let prologue = self.lower_params(&func.params);
        self.insert_prologue(body, prologue);
    }

    fn lower_arrow(&mut self, arrow: &ArrowFunctionExpression<'_>, frame: Frame) {
        if let Some(offset) = frame.arguments {
            self.unsupported(offset, "`arguments` inside an arrow function");
            return;
        }
        if let Some(offset) = frame.super_ref {
            self.unsupported(offset, "`super` inside an arrow function");
            return;
        }
        let source = self.edits.source();
        let params = &arrow.params;
        let bare = source.as_bytes().get(params.span.start as usize) != Some(&b'(');
        let prologue = self.lower_params(params);

        let mut open = String::new();
        if frame.this {
            open.push('(');
        }
        open.push_str(if bare { "function (" } else { "function " });
        self.edits.insert(arrow.span.start, Side::Before, open);
        if bare {
            self.edits.insert(params.span.end, Side::After, ")");
        }

        let tail = &source[params.span.end as usize..arrow.span.end as usize];
        let Some(token) = tail.find("=>").map(|i| params.span.end + i as u32) else {
            self.fail(params.span.end, "arrow token not found");
            return;
        };
        let mut close = String::new();
        if arrow.expression {
            let body_start = arrow
                .body
                .statements
                .first()
                .map_or(arrow.body.span.start, |s| s.span().start);
            self.edits
                .replace(token, body_start, format!("{{ {prologue}return "));
            close.push_str(" }");
        } else {
            self.edits.replace(token, token + 2, "");
            self.insert_prologue(&arrow.body, prologue);
        }
        if frame.this {
            close.push_str(").bind(this)");
        }
        self.edits.insert(arrow.span.end, Side::After, close);
    }

    fn lower_template(&mut self, tpl: &TemplateLiteral<'_>) {
        fn cooked(element: &TemplateElement<'_>) -> String {
            element
                .value
                .cooked
                .as_ref()
                .map_or_else(|| element.value.raw.to_string(), |c| c.to_string())
        }

        let (Some(first), Some(last)) = (tpl.expressions.first(), tpl.expressions.last()) else {
            let text = tpl.quasis.first().map(cooked).unwrap_or_default();
            self.edits.replace(tpl.span.start, tpl.span.end, quote(&text));
            return;
        };
        // The head stays even when empty, so `+` concatenates.
        let head = tpl.quasis.first().map(cooked).unwrap_or_default();
        self.edits.replace(
            tpl.span.start,
            first.span().start,
            format!("({} + (", quote(&head)),
        );
        for (i, pair) in tpl.expressions.windows(2).enumerate() {
            let middle = tpl.quasis.get(i + 1).map(cooked).unwrap_or_default();
            let text = if middle.is_empty() {
                ") + (".to_string()
            } else {
                format!(") + {} + (", quote(&middle))
            };
            self.edits.replace(pair[0].span().end, pair[1].span().start, text);
        }
        let tail = tpl.quasis.last().map(cooked).unwrap_or_default();
        let text = if tail.is_empty() {
            "))".to_string()
        } else {
            format!(") + {})", quote(&tail))
        };
        self.edits.replace(last.span().end, tpl.span.end, text);
    }

    fn lower_declaration(&mut self, decl: &VariableDeclaration<'_>) {
        let keyword = match decl.kind {
            VariableDeclarationKind::Let => 3,
            VariableDeclarationKind::Const => 5,
            _ => 0,
        };
        if keyword > 0 {
            self.edits
                .replace(decl.span.start, decl.span.start + keyword, "var");
        }
        if self.loop_heads.contains(&decl.span.start) {
            return;
        }
        for declarator in &decl.declarations {
            match (&declarator.id.kind, &declarator.init) {
                (BindingPatternKind::BindingIdentifier(id), None) => {
                    // A hoisted `let` must still start each pass undefined.
                    if decl.kind == VariableDeclarationKind::Let {
                        self.edits.insert(id.span.end, Side::After, " = void 0");
                    }
                }
                (BindingPatternKind::BindingIdentifier(_), Some(_)) => {}
                (_, Some(init)) => {
                    let value = self.text(init.span());
                    let mut parts = Vec::new();
                    self.destructure(&declarator.id, value, &mut parts);
                    self.edits
                        .replace(declarator.span.start, declarator.span.end, parts.join(", "));
                }
                (_, None) => self.unsupported(declarator.span.start, "destructuring without a value"),
            }
        }
    }

    fn lower_property(&mut self, prop: &ObjectProperty<'_>) {
        if prop.computed {
            return;
        }
        if prop.shorthand {
            let (Some(key), Expression::Identifier(ident)) = (self.key_name(&prop.key), &prop.value)
            else {
                return;
            };
            let value = self.reference_name(ident);
            self.edits
                .replace(prop.span.start, prop.span.end, format!("{key}: {value}"));
        } else if prop.method {
            self.edits
                .insert(prop.key.span().end, Side::After, ": function");
        }
    }

    /// The array a list of possibly spread elements evaluates to.
    fn spread_array(&self, elements: impl Iterator<Item = (bool, Option<Span>)>) -> String {
        let mut groups = Vec::new();
        let mut plain: Vec<String> = Vec::new();
        for (spread, span) in elements {
            let text = span.map_or_else(|| "void 0".to_string(), |s| self.text(s));
            if spread {
                if !plain.is_empty() {
                    groups.push(format!("[{}]", plain.join(", ")));
                    plain.clear();
                }
                groups.push(format!("[].slice.call({text})"));
            } else {
                plain.push(text);
            }
        }
        if !plain.is_empty() {
            groups.push(format!("[{}]", plain.join(", ")));
        }
        format!("[].concat({})", groups.join(", "))
    }

    fn lower_array(&mut self, arr: &ArrayExpression<'_>) {
        let has_spread = arr
            .elements
            .iter()
            .any(|e| matches!(e, ArrayExpressionElement::SpreadElement(_)));
        if !has_spread {
            return;
        }
        let text = self.spread_array(arr.elements.iter().map(|element| match element {
            ArrayExpressionElement::SpreadElement(spread) => (true, Some(spread.argument.span())),
            ArrayExpressionElement::Elision(_) => (false, None),
            other => (false, Some(other.span())),
        }));
        self.edits.replace(arr.span.start, arr.span.end, text);
    }

    fn lower_super(&mut self, span: Span) {
        let super_name = self.classes.last().map(|c| c.super_name.clone());
        let Some(super_name) = super_name else {
            self.unsupported(span.start, "`super` outside a class");
            return;
        };
        let Some(name) = super_name else {
            self.fail(span.start, "`super` in a class without a superclass");
            return;
        };
        let is_static = self.methods.last().copied().unwrap_or(false);
        let text = if self.super_calls.contains(&span.start) || is_static {
            name
        } else {
            format!("{name}.prototype")
        };
        self.edits.replace(span.start, span.end, text);
    }

    fn lower_call(&mut self, call: &CallExpression<'_>) {
        let spread = call
            .arguments
            .iter()
            .any(|a| matches!(a, Argument::SpreadElement(_)));
        let member_object = match &call.callee {
            Expression::StaticMemberExpression(m) => Some(&m.object),
            Expression::ComputedMemberExpression(m) => Some(&m.object),
            _ => None,
        };
        let on_super = matches!(call.callee, Expression::Super(_))
            || matches!(member_object, Some(Expression::Super(_)));
        if !spread && !on_super {
            return;
        }

        let callee = call.callee.span();
        if !spread {
            let source = self.edits.source();
            let Some(open) = source[callee.end as usize..call.span.end as usize]
                .find('(')
                .map(|i| callee.end + i as u32)
            else {
                return;
            };
            self.edits.insert(callee.end, Side::After, ".call");
            let this_arg = if call.arguments.is_empty() { "this" } else { "this, " };
            self.edits.insert(open + 1, Side::After, this_arg);
            return;
        }

        let this_arg = match member_object {
            _ if on_super => "this".to_string(),
            Some(object @ (Expression::Identifier(_) | Expression::ThisExpression(_))) => {
                self.text(object.span())
            }
            None if matches!(call.callee, Expression::Identifier(_)) => "void 0".to_string(),
            _ => {
                self.unsupported(call.span.start, "spread arguments to this callee");
                return;
            }
        };
        let target = self.text(callee);
        let args = self.spread_array(call.arguments.iter().map(|arg| match arg {
            Argument::SpreadElement(spread) => (true, Some(spread.argument.span())),
            other => (false, Some(other.span())),
        }));
        self.edits.replace(
            call.span.start,
            call.span.end,
            format!("{target}.apply({this_arg}, {args})"),
        );
    }

    fn lower_class(&mut self, class: &Class<'_>) {
        let name = match &class.id {
            Some(id) => self.binding_name(id),
            None => self.fresh("class"),
        };
        let super_name = self.classes.last().and_then(|c| c.super_name.clone());

        let mut constructor = None;
        let mut members = Vec::new();
        let mut accessors: Vec<(String, String, Option<String>, Option<String>)> = Vec::new();
        for element in &class.body.body {
            let ClassElement::MethodDefinition(method) = element else {
                continue;
            };
            let Some(body) = &method.value.body else {
                continue;
            };
            let function = self.text(Span::new(method.value.params.span.start, body.span.end));
            let target = if method.r#static {
                name.clone()
            } else {
                format!("{name}.prototype")
            };
            match method.kind {
                MethodDefinitionKind::Constructor => {
                    constructor = Some(format!("function {name}{function}"));
                }
                MethodDefinitionKind::Method => {
                    if let Some(access) = self.key_member(&method.key) {
                        members.push(format!("{target}{access} = function {function};"));
                    }
                }
                MethodDefinitionKind::Get | MethodDefinitionKind::Set => {
                    let Some(key) = self.key_name(&method.key) else {
                        continue;
                    };
                    let slot = match accessors.iter().position(|(t, k, _, _)| *t == target && *k == key) {
                        Some(i) => i,
                        None => {
                            accessors.push((target.clone(), key, None, None));
                            accessors.len() - 1
                        }
                    };
                    let function = format!("function {function}");
                    if method.kind == MethodDefinitionKind::Get {
                        accessors[slot].2 = Some(function);
                    } else {
                        accessors[slot].3 = Some(function);
                    }
                }
            }
        }

        let mut body = vec![constructor.unwrap_or_else(|| match &super_name {
            Some(sup) => format!("function {name}() {{ {sup}.apply(this, arguments); }}"),
            None => format!("function {name}() {{}}"),
        })];
        if let Some(sup) = &super_name {
            body.push(format!(
                "{name}.prototype = Object.create({sup}.prototype, {{ constructor: {{ value: {name}, writable: true, configurable: true }} }}); {name}.__proto__ = {sup};"
            ));
        }
        body.extend(members);
        for (target, key, get, set) in accessors {
            let mut parts = Vec::new();
            if let Some(get) = get {
                parts.push(format!("get: {get}"));
            }
            if let Some(set) = set {
                parts.push(format!("set: {set}"));
            }
            parts.push("configurable: true".to_string());
            body.push(format!(
                "Object.defineProperty({target}, {}, {{ {} }});",
                quote(&key),
                parts.join(", ")
            ));
        }
        body.push(format!("return {name};"));

        let iife = match (&super_name, &class.super_class) {
            (Some(sup), Some(parent)) => format!(
                "(function ({sup}) {{ {} }})({})",
                body.join(" "),
                self.text(parent.span())
            ),
            _ => format!("(function () {{ {} }})()", body.join(" ")),
        };
        let text = if class.r#type == ClassType::ClassDeclaration {
            format!("var {name} = {iife};")
        } else {
            iife
        };
        self.edits.replace(class.span.start, class.span.end, text);
    }

    fn lower_number(&mut self, lit: &NumericLiteral<'_>) {
        let raw = &self.edits.source()[lit.span.start as usize..lit.span.end as usize];
        let prefixed = raw.len() > 1
            && raw.as_bytes()[0] == b'0'
            && matches!(raw.as_bytes()[1], b'b' | b'B' | b'o' | b'O');
        if prefixed || raw.contains('_') {
            self.edits
                .replace(lit.span.start, lit.span.end, number(lit.value));
        }
    }

    fn lower_string(&mut self, lit: &StringLiteral<'_>) {
        let raw = &self.edits.source()[lit.span.start as usize..lit.span.end as usize];
        if let Some((from, to)) = self.chunk_rewrite {
            if let Some(rest) = raw.get(1..).and_then(|r| r.strip_prefix(from)) {
                let quote_char = &raw[..1];
                self.edits.replace(
                    lit.span.start,
                    lit.span.end,
                    format!("{quote_char}{to}{rest}"),
                );
                self.rewritten += 1;
                return;
            }
        }
        if raw.contains("\\u{") {
            self.edits
                .replace(lit.span.start, lit.span.end, quote(&lit.value));
        }
    }

    /// The statements of a loop body, without braces.
    fn loop_body(&self, body: &Statement<'_>) -> String {
        match body {
            Statement::BlockStatement(block) => self
                .text(Span::new(block.span.start + 1, block.span.end - 1))
                .trim()
                .to_string(),
            other => self.text(other.span()),
        }
    }

    /// Wraps `inner` in a function called once per iteration when the loop
    /// starting at `start` has bindings captured by closures.
    fn iteration_scope(&mut self, start: u32, params: &[String], inner: &str) -> Option<String> {
        let facts = self.scoping.loop_at(start)?.clone();
        if !facts.captured {
            return None;
        }
        let violation = [
            (facts.jump, "`break`, `continue` or `return`"),
            (facts.arguments, "`arguments`"),
            (facts.declaration, "a `var` or function declaration"),
            (facts.head_write, "an assignment to a loop binding"),
        ]
        .into_iter()
        .find_map(|(offset, what)| offset.map(|o| (o, what)));
        if let Some((offset, what)) = violation {
            self.fail(
                offset,
                format!("{what} in a loop whose bindings are captured by a closure cannot be lowered to ES5"),
            );
            return None;
        }
        let list = params.join(", ");
        let call = if facts.this {
            let args: String = params.iter().map(|p| format!(", {p}")).collect();
            format!(".call(this{args})")
        } else {
            format!("({list})")
        };
        Some(format!("(function ({list}) {{ {inner} }}){call};"))
    }

    fn declared_names(&self, decl: &VariableDeclaration<'_>) -> Vec<String> {
        if decl.kind == VariableDeclarationKind::Var {
            return Vec::new();
        }
        let mut ids = Vec::new();
        for declarator in &decl.declarations {
            pattern_bindings(&declarator.id, &mut ids);
        }
        ids.into_iter().map(|id| self.binding_name(id)).collect()
    }

    fn wrap_loop(&mut self, start: u32, body: &Statement<'_>, params: Vec<String>) {
        if !self.scoping.loop_at(start).is_some_and(|f| f.captured) {
            return;
        }
        let inner = self.loop_body(body);
        if let Some(call) = self.iteration_scope(start, &params, &inner) {
            let span = body.span();
            self.edits.replace(span.start, span.end, format!("{{ {call} }}"));
        }
    }

    fn lower_for_of(&mut self, stmt: &ForOfStatement<'_>) {
        let index = self.fresh("i");
        let array = self.fresh("a");
        let item = format!("{array}[{index}]");
        let binding = match &stmt.left {
            ForStatementLeft::VariableDeclaration(decl) => {
                let Some(declarator) = decl.declarations.first() else {
                    return;
                };
                let mut parts = Vec::new();
                self.destructure(&declarator.id, item, &mut parts);
                format!("var {};", parts.join(", "))
            }
            ForStatementLeft::ArrayAssignmentTarget(_) | ForStatementLeft::ObjectAssignmentTarget(_) => {
                return;
            }
            target => format!("{} = {item};", self.text(target.span())),
        };
        let right = self.text(stmt.right.span());
        let inner = format!("{binding} {}", self.loop_body(&stmt.body));
        let body = self
            .iteration_scope(stmt.span.start, &[], &inner)
            .unwrap_or(inner);
        self.edits.replace(
            stmt.span.start,
            stmt.span.end,
            format!(
                "for (var {index} = 0, {array} = {right}; {index} < {array}.length; {index}++) {{ {body} }}"
            ),
        );
    }

    fn check_regex(&mut self, span: Span) {
        let raw = &self.edits.source()[span.start as usize..span.end as usize];
        let flags = raw.rsplit('/').next().unwrap_or_default();
        if let Some(flag) = flags.chars().find(|c| "uysdv".contains(*c)) {
            self.unsupported(span.start, &format!("the regular expression flag `{flag}`"));
        }
    }
}

impl<'a> Visit<'a> for Lowerer<'_, '_> {
    fn enter_node(&mut self, kind: AstKind<'a>) {
        match kind {
            AstKind::Function(func) => {
                if func.generator {
                    self.unsupported(func.span.start, "a generator function");
                }
                if func.r#async {
                    self.unsupported(func.span.start, "an async function");
                }
                self.frames.push(Frame::default());
            }
            AstKind::ArrowFunctionExpression(arrow) => {
                if arrow.r#async {
                    self.unsupported(arrow.span.start, "an async arrow function");
                }
                self.frames.push(Frame {
                    arrow: true,
                    ..Frame::default()
                });
            }
            AstKind::ThisExpression(_) => self.mark_lexical(|f| f.this = true),
            AstKind::Super(sup) => {
                let offset = sup.span.start;
                self.mark_lexical(|f| {
                    if f.arrow {
                        f.super_ref.get_or_insert(offset);
                    }
                });
            }
            AstKind::IdentifierReference(ident) => {
                let symbol = ident
                    .reference_id
                    .get()
                    .and_then(|r| self.symbols.get_reference(r).symbol_id());
                if symbol.is_none() && ident.name == "arguments" {
                    let offset = ident.span.start;
                    self.mark_lexical(|f| {
                        if f.arrow {
                            f.arguments.get_or_insert(offset);
                        }
                    });
                }
                if let Some(name) = symbol.and_then(|s| self.scoping.renames.get(&s)).cloned() {
                    self.edits.replace(ident.span.start, ident.span.end, name);
                }
            }
            AstKind::BindingIdentifier(id) => {
                if let Some(name) = id.symbol_id.get().and_then(|s| self.scoping.renames.get(&s)).cloned() {
                    self.edits.replace(id.span.start, id.span.end, name);
                }
            }
            AstKind::Class(class) => {
                let super_name = class.super_class.as_ref().map(|_| self.fresh("super"));
                self.classes.push(ClassFrame { super_name });
            }
            AstKind::MethodDefinition(method) => {
                if method.computed {
                    self.unsupported(method.span.start, "a computed method name");
                }
                self.methods.push(method.r#static);
            }
            AstKind::CallExpression(call) => {
                if let Expression::Super(sup) = &call.callee {
                    self.super_calls.insert(sup.span.start);
                }
            }
            AstKind::NewExpression(new) => {
                if new.arguments.iter().any(|a| matches!(a, Argument::SpreadElement(_))) {
                    self.unsupported(new.span.start, "spread arguments to `new`");
                }
            }
            AstKind::ObjectExpression(obj) => {
                if let Some(spread) = obj.properties.iter().find_map(|p| match p {
                    ObjectPropertyKind::SpreadProperty(spread) => Some(spread.span.start),
                    ObjectPropertyKind::ObjectProperty(_) => None,
                }) {
                    self.unsupported(spread, "object spread");
                }
            }
            AstKind::ObjectProperty(prop) => {
                if prop.computed {
                    self.unsupported(prop.span.start, "a computed property key");
                }
            }
            AstKind::ForOfStatement(stmt) => {
                if stmt.r#await {
                    self.unsupported(stmt.span.start, "`for await`");
                }
                match &stmt.left {
                    ForStatementLeft::VariableDeclaration(decl) => {
                        self.loop_heads.insert(decl.span.start);
                    }
                    ForStatementLeft::ArrayAssignmentTarget(_)
                    | ForStatementLeft::ObjectAssignmentTarget(_) => {
                        self.unsupported(stmt.span.start, "destructuring assignment");
                    }
                    _ => {}
                }
            }
            AstKind::ForInStatement(stmt) => {
                if let ForStatementLeft::VariableDeclaration(decl) = &stmt.left {
                    self.loop_heads.insert(decl.span.start);
                    let patterned = decl.declarations.iter().any(|d| {
                        !matches!(d.id.kind, BindingPatternKind::BindingIdentifier(_))
                    });
                    if patterned {
                        self.unsupported(decl.span.start, "destructuring in a `for...in` head");
                    }
                }
            }
            AstKind::VariableDeclaration(decl) => {
                if matches!(
                    decl.kind,
                    VariableDeclarationKind::Using | VariableDeclarationKind::AwaitUsing
                ) {
                    self.unsupported(decl.span.start, "a `using` declaration");
                }
            }
            AstKind::AssignmentExpression(assign) => {
                match assign.operator {
                    AssignmentOperator::Exponential => {
                        self.unsupported(assign.span.start, "`**=`");
                    }
                    AssignmentOperator::LogicalAnd
                    | AssignmentOperator::LogicalOr
                    | AssignmentOperator::LogicalNullish => {
                        self.unsupported(assign.span.start, "logical assignment");
                    }
                    _ => {}
                }
                if matches!(
                    assign.left,
                    AssignmentTarget::ArrayAssignmentTarget(_)
                        | AssignmentTarget::ObjectAssignmentTarget(_)
                ) {
                    self.unsupported(assign.span.start, "destructuring assignment");
                }
            }
            AstKind::LogicalExpression(expr) if expr.operator == LogicalOperator::Coalesce => {
                self.unsupported(expr.span.start, "`??`");
            }
            AstKind::ChainExpression(chain) => self.unsupported(chain.span.start, "optional chaining"),
            AstKind::TaggedTemplateExpression(tagged) => {
                self.unsupported(tagged.span.start, "a tagged template");
            }
            AstKind::MetaProperty(meta) => self.unsupported(
                meta.span.start,
                &format!("`{}.{}`", meta.meta.name, meta.property.name),
            ),
            AstKind::ImportExpression(import) => {
                self.unsupported(import.span.start, "dynamic `import()`");
            }
            AstKind::PrivateIdentifier(private) => {
                self.unsupported(private.span.start, "a private class member");
            }
            AstKind::PropertyDefinition(field) => self.unsupported(field.span.start, "a class field"),
            AstKind::StaticBlock(block) => self.unsupported(block.span.start, "a static block"),
            AstKind::BigIntLiteral(lit) => self.unsupported(lit.span.start, "a BigInt literal"),
            AstKind::RegExpLiteral(re) => self.check_regex(re.span),
            _ => {}
        }
    }

    fn leave_node(&mut self, kind: AstKind<'a>) {
        match kind {
            AstKind::Function(func) => {
                self.frames.pop();
                self.lower_function(func);
            }
            AstKind::ArrowFunctionExpression(arrow) => {
                let frame = self.frames.pop().unwrap_or_default();
                self.lower_arrow(arrow, frame);
            }
            AstKind::Class(class) => {
                self.lower_class(class);
                self.classes.pop();
            }
            AstKind::MethodDefinition(_) => {
                self.methods.pop();
            }
            AstKind::Super(sup) => self.lower_super(sup.span),
            AstKind::CallExpression(call) => self.lower_call(call),
            AstKind::TemplateLiteral(tpl) => self.lower_template(tpl),
            AstKind::VariableDeclaration(decl) => self.lower_declaration(decl),
            AstKind::ObjectProperty(prop) => self.lower_property(prop),
            AstKind::ArrayExpression(arr) => self.lower_array(arr),
            AstKind::BinaryExpression(expr) if expr.operator == BinaryOperator::Exponential => {
                let text = format!(
                    "Math.pow({}, {})",
                    self.text(expr.left.span()),
                    self.text(expr.right.span())
                );
                self.edits.replace(expr.span.start, expr.span.end, text);
            }
            AstKind::NumericLiteral(lit) => self.lower_number(lit),
            AstKind::StringLiteral(lit) => self.lower_string(lit),
            AstKind::ForOfStatement(stmt) => self.lower_for_of(stmt),
            AstKind::ForStatement(stmt) => {
                let params = match &stmt.init {
                    Some(ForStatementInit::VariableDeclaration(decl)) => self.declared_names(decl),
                    _ => Vec::new(),
                };
                self.wrap_loop(stmt.span.start, &stmt.body, params);
            }
            AstKind::ForInStatement(stmt) => {
                let params = match &stmt.left {
                    ForStatementLeft::VariableDeclaration(decl) => self.declared_names(decl),
                    _ => Vec::new(),
                };
                self.wrap_loop(stmt.span.start, &stmt.body, params);
            }
            AstKind::WhileStatement(stmt) => self.wrap_loop(stmt.span.start, &stmt.body, Vec::new()),
            AstKind::DoWhileStatement(stmt) => {
                self.wrap_loop(stmt.span.start, &stmt.body, Vec::new());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lowered(source: &str) -> String {
        lower(source, "in.js", LowerOptions::default()).unwrap().code
    }

    fn failure(source: &str) -> SyntaxError {
        lower(source, "in.js", LowerOptions::default()).unwrap_err()
    }

    #[test]
    fn bare_parameter_arrows_as_call_arguments() {
        assert_eq!(lowered("f(x => x);"), "f(function (x) { return x });");
        assert_eq!(
            lowered("xs.map(x => x * 2);"),
            "xs.map(function (x) { return x * 2 });"
        );
        assert_eq!(
            lowered("var add = a => b => a + b;"),
            "var add = function (a) { return function (b) { return a + b } };"
        );
    }

    #[test]
    fn arrows_using_this_are_bound() {
        assert_eq!(
            lowered("function C() { this.cb = () => this.n; }"),
            "function C() { this.cb = (function () { return this.n }).bind(this); }"
        );
    }

    #[test]
    fn shadowing_block_bindings_are_renamed() {
        assert_eq!(
            lowered("let x = 1; { let x = 2; } console.log(x);"),
            "var x = 1; { var _x = 2; } console.log(x);"
        );
        assert_eq!(
            lowered("function f(v) { if (v) { const v = 0; return v; } return v; }"),
            "function f(v) { if (v) { var _v = 0; return _v; } return v; }"
        );
    }

    #[test]
    fn loop_closures_get_a_scope_per_iteration() {
        assert_eq!(
            lowered("for (let i = 0; i < 3; i++) { fns.push(() => i); }"),
            "for (var i = 0; i < 3; i++) { (function (i) { fns.push(function () { return i }); })(i); }"
        );
        assert_eq!(
            lowered("for (let i = 0; i < 3; i++) { f(i); }"),
            "for (var i = 0; i < 3; i++) { f(i); }"
        );
    }

    #[test]
    fn captured_loop_that_jumps_out_fails() {
        let err = failure("for (let i = 0; i < 3; i++) { fns.push(() => i); if (i) break; }");
        assert!(err.message.contains("captured"));
        assert_eq!(err.column, 57);
    }

    #[test]
    fn uninitialized_let_is_reset_each_pass() {
        assert_eq!(
            lowered("while (more()) { let last; use(last); }"),
            "while (more()) { var last = void 0; use(last); }"
        );
    }

    #[test]
    fn templates_concatenate_strings() {
        assert_eq!(
            lowered("var s = `a${b}c${d}`;"),
            r#"var s = ("a" + (b) + "c" + (d));"#
        );
        assert_eq!(lowered("var s = `${n}`;"), r#"var s = ("" + (n));"#);
        assert_eq!(lowered("var s = `line\n`;"), r#"var s = "line\n";"#);
    }

    #[test]
    fn classes_become_constructor_functions() {
        let source = "class A extends B { constructor(x) { super(x); } get v() { return 1; } static m() { return super.m(); } }";
        assert_eq!(
            lowered(source),
            concat!(
                "var A = (function (_super) { ",
                "function A(x) { _super.call(this, x); } ",
                "A.prototype = Object.create(_super.prototype, { constructor: { value: A, writable: true, configurable: true } }); A.__proto__ = _super; ",
                "A.m = function () { return _super.m.call(this); }; ",
                "Object.defineProperty(A.prototype, \"v\", { get: function () { return 1; }, configurable: true }); ",
                "return A; })(B);"
            )
        );
        assert_eq!(
            lowered("var P = class { area() { return 0; } };"),
            "var P = (function () { function _class() {} _class.prototype.area = function () { return 0; }; return _class; })();"
        );
    }

    #[test]
    fn parameters_and_declarations_are_destructured() {
        assert_eq!(
            lowered("function f(a, b = 2, ...rest) { return [a, b, rest]; }"),
            "function f(a, b) { if (b === void 0) b = 2; var rest = [].slice.call(arguments, 2); return [a, b, rest]; }"
        );
        assert_eq!(
            lowered("const { a, b: [c, , d = 1] } = obj;"),
            "var a = obj.a, _ref = obj.b, c = _ref[0], _ref2 = _ref[2], d = _ref2 === void 0 ? 1 : _ref2;"
        );
        assert_eq!(
            lowered("var g = ({ id }) => id;"),
            "var g = function (_ref) { var id = _ref.id; return id };"
        );
    }

    #[test]
    fn object_literals_spread_and_for_of() {
        assert_eq!(
            lowered("var o = { x, m() { return 2 ** 3; } };"),
            "var o = { x: x, m: function() { return Math.pow(2, 3); } };"
        );
        assert_eq!(
            lowered("f(...args); o.g(1, ...xs); var all = [0, ...xs];"),
            "f.apply(void 0, [].concat([].slice.call(args))); o.g.apply(o, [].concat([1], [].slice.call(xs))); var all = [].concat([0], [].slice.call(xs));"
        );
        assert_eq!(
            lowered("for (const item of items) { use(item); }"),
            "for (var _i = 0, _a = items; _i < _a.length; _i++) { var item = _a[_i]; use(item); }"
        );
        assert_eq!(lowered("var n = 0b101 + 1_000;"), "var n = 5 + 1000;");
    }

    #[test]
    fn syntax_without_a_legacy_form_fails_with_its_position() {
        let err = failure("var a = 1;\nasync function f() {}");
        assert_eq!((err.line, err.column), (2, 1));
        assert!(failure("a ?? b;").message.contains("??"));
        assert!(failure("class A { n = 1; }").message.contains("class field"));
        assert!(failure("var t = tag`x`;").message.contains("tagged template"));
        assert!(failure("[a, b] = [b, a];").message.contains("destructuring assignment"));
        assert!(failure("var r = /x/u;").message.contains("flag `u`"));
        assert!(failure("f(() => arguments);").message.contains("`arguments`"));
    }

    #[test]
    fn runtime_chunk_references_are_rewritten() {
        let out = lower(
            r#"var u = "-es2015." + h + '-es2015.js';"#,
            "runtime.js",
            LowerOptions {
                chunk_rewrite: Some(("-es2015.", "-es5.")),
            },
        )
        .unwrap();
        assert_eq!(out.code, r#"var u = "-es5." + h + '-es5.js';"#);
        assert_eq!(out.rewritten, 2);
    }

    #[test]
    fn lowered_map_points_into_the_input() {
        let out = lower("const a = 1;\nconst f = () => a;", "main.js", LowerOptions::default()).unwrap();
        assert_eq!(out.code, "var a = 1;\nvar f = function () { return a };");
        assert_eq!(out.map.sources(), ["main.js"]);
        let a = out.code.rfind('a').unwrap() as u32 - 11;
        let origin = out.map.original_position_for(1, a).unwrap();
        assert_eq!((origin.line, origin.column), (1, 16));
    }
}
