use std::collections::{BTreeMap, BTreeSet};

use crate::labels::{Cap, LabelSet};
use crate::model::{Expr, ExprKind, MethodModel, Span, Visibility};

const ASSIGN_OPS: &[&str] = &["=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=", ">>>="];

/// Declared types whose values cannot carry an injected string.
const INERT_TYPES: &[&str] = &["int", "long", "short", "byte", "boolean", "char", "double", "float"];

/// Taint carried by one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taint {
    /// Capabilities the value can still break. Empty means clean.
    pub caps: Cap,
    /// The tainted concatenation that built the value, if any.
    pub concat: Option<Span>,
    /// The value embeds literal HTML markup.
    pub markup: bool,
}

impl Taint {
    pub fn is_tainted(&self) -> bool {
        !self.caps.is_empty()
    }

    fn source() -> Self {
        Taint { caps: Cap::all(), concat: None, markup: false }
    }

    fn absorb(&mut self, other: Taint) {
        self.caps |= other.caps;
        self.concat = self.concat.or(other.concat);
        self.markup |= other.markup;
    }

    fn normalised(self) -> Self {
        if self.is_tainted() { self } else { Taint::default() }
    }
}

fn is_markup(literal: &str) -> bool {
    literal
        .split('<')
        .skip(1)
        .any(|rest| rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!'))
}

/// Per-path analysis state for one method body.
///
/// Cloned at every branch and joined afterwards, so anything learnt inside a
/// branch (a sanitizer call, a null check) stays local to it unless every
/// live branch learns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowState {
    vars: BTreeMap<String, Taint>,
    maybe_null: BTreeSet<String>,
    writers: BTreeSet<String>,
}

impl FlowState {
    /// Parameters flagged as externally controlled start out fully tainted.
    /// Private methods are never entry points, so they start clean.
    pub fn seed(method: &MethodModel) -> Self {
        let mut state = FlowState::default();
        if method.visibility == Visibility::Private {
            return state;
        }
        for p in method.params.iter().filter(|p| p.tainted) {
            state.vars.insert(p.name.clone(), Taint::source());
        }
        state
    }

    pub fn var(&self, name: &str) -> Option<&Taint> {
        self.vars.get(name)
    }

    pub fn may_be_null(&self, name: &str) -> bool {
        self.maybe_null.contains(name)
    }

    /// `e` evaluates to a stream that reaches the HTTP response.
    pub fn is_writer(&self, e: &Expr, labels: &LabelSet) -> bool {
        match &e.kind {
            ExprKind::Identifier(name) => self.writers.contains(name),
            ExprKind::Call(call) => labels.is_writer(&call.path()),
            _ => false,
        }
    }

    /// Taint of `e` under the current state.
    pub fn taint_of(&self, e: &Expr, labels: &LabelSet) -> Taint {
        match &e.kind {
            ExprKind::Literal(_) => Taint::default(),
            ExprKind::Identifier(name) => self.vars.get(name).cloned().unwrap_or_default(),
            ExprKind::FieldAccess { object, .. } => match e.path().and_then(|p| self.vars.get(&p)) {
                Some(t) => t.clone(),
                None => self.taint_of(object, labels),
            },
            ExprKind::Concatenation(parts) => {
                let mut t = Taint::default();
                for part in parts {
                    t.absorb(self.taint_of(part, labels));
                    t.markup |= part.as_str_literal().is_some_and(is_markup);
                }
                // the outermost concatenation is the reported site
                t.concat = Some(e.span);
                t.normalised()
            }
            ExprKind::Call(call) => {
                let path = call.path();
                if labels.is_source(&path) {
                    return Taint::source();
                }
                let mut t = Taint::default();
                for input in call.receiver.as_deref().into_iter().chain(call.args.iter()) {
                    t.absorb(self.taint_of(input, labels));
                }
                t.caps.remove(labels.sanitizer_caps(&path));
                t.normalised()
            }
            ExprKind::Operation { op, operands } => {
                let carried: &[Expr] = match op.as_str() {
                    "?:" | "=" => operands.get(1..).unwrap_or_default(),
                    "[]" | "array_initializer" | "array_creation_expression" => operands,
                    _ => &[],
                };
                let mut t = Taint::default();
                for o in carried {
                    t.absorb(self.taint_of(o, labels));
                }
                t.normalised()
            }
        }
    }

    /// Bind `name` to `value` (or to nothing, for a bare declaration).
    pub fn bind(&mut self, name: &str, value: Option<&Expr>, labels: &LabelSet) {
        let Some(value) = value else {
            self.forget(name);
            return;
        };
        self.apply_nested(value, labels);

        let t = self.taint_of(value, labels);
        let writer = self.is_writer(value, labels);
        self.forget(name);
        if t.is_tainted() {
            self.vars.insert(name.to_owned(), t);
        }
        if value.is_null() {
            self.maybe_null.insert(name.to_owned());
        }
        if writer {
            self.writers.insert(name.to_owned());
        }
    }

    /// Local declaration. A primitive-typed variable never holds taint, so
    /// `int id = Integer.parseInt(raw)` ends the flow.
    pub fn declare(&mut self, name: &str, ty: &str, value: Option<&Expr>, labels: &LabelSet) {
        self.bind(name, value, labels);
        if INERT_TYPES.contains(&ty.trim()) {
            self.vars.remove(name);
        }
    }

    /// Plain or compound assignment to an identifier or field path.
    pub fn assign(&mut self, target: &Expr, op: &str, value: &Expr, span: Span, labels: &LabelSet) {
        let Some(key) = target.path() else { return };
        if op == "=" {
            return self.bind(&key, Some(value), labels);
        }
        self.apply_nested(value, labels);

        let mut t = self.vars.get(&key).cloned().unwrap_or_default();
        let rhs = self.taint_of(value, labels);
        t.absorb(rhs);
        if op == "+=" && t.is_tainted() {
            t.concat = Some(span);
            t.markup |= value.as_str_literal().is_some_and(is_markup);
        }
        self.maybe_null.remove(&key);
        if t.is_tainted() {
            self.vars.insert(key, t);
        } else {
            self.vars.remove(&key);
        }
    }

    /// Apply assignments nested inside an expression, e.g. `(line = r.readLine()) != null`.
    pub fn apply_nested(&mut self, e: &Expr, labels: &LabelSet) {
        let mut nested = Vec::new();
        e.walk(&mut |sub| {
            if let ExprKind::Operation { op, operands } = &sub.kind {
                if ASSIGN_OPS.contains(&op.as_str()) && operands.len() == 2 {
                    nested.push((sub, op.as_str(), &operands[0], &operands[1]));
                }
            }
        });
        for (sub, op, target, value) in nested {
            self.assign(target, op, value, sub.span, labels);
        }
    }

    pub fn clear(&mut self, name: &str, caps: Cap) {
        if let Some(t) = self.vars.get_mut(name) {
            t.caps.remove(caps);
            if !t.is_tainted() {
                self.vars.remove(name);
            }
        }
    }

    pub fn mark_non_null(&mut self, name: &str) {
        self.maybe_null.remove(name);
    }

    fn forget(&mut self, name: &str) {
        self.vars.remove(name);
        self.maybe_null.remove(name);
        self.writers.remove(name);
    }

    /// Merge the state of another path reaching the same point.
    pub fn join(&mut self, other: &FlowState) {
        for (name, t) in &other.vars {
            self.vars
                .entry(name.clone())
                .and_modify(|mine| mine.absorb(t.clone()))
                .or_insert_with(|| t.clone());
        }
        self.maybe_null.extend(other.maybe_null.iter().cloned());
        self.writers.extend(other.writers.iter().cloned());
    }

    /// Split the state at a condition: facts that hold when `cond` is true go
    /// to `then`, facts that hold when it is false go to `otherwise`.
    pub fn narrow(cond: &Expr, labels: &LabelSet, then: &mut FlowState, otherwise: &mut FlowState) {
        for (state, truth) in [(then, true), (otherwise, false)] {
            for name in non_null_facts(cond, truth) {
                state.mark_non_null(&name);
            }
            for (name, caps) in guard_facts(cond, truth, labels) {
                state.clear(&name, caps);
            }
        }
    }
}

fn null_compared(operands: &[Expr]) -> Option<&str> {
    match operands {
        [a, b] if b.is_null() => a.as_identifier(),
        [a, b] if a.is_null() => b.as_identifier(),
        _ => None,
    }
}

/// Identifiers known to be non-null when `cond` evaluates to `truth`. Only
/// explicit comparisons against `null` count.
pub fn non_null_facts(cond: &Expr, truth: bool) -> Vec<String> {
    let ExprKind::Operation { op, operands } = &cond.kind else {
        return Vec::new();
    };
    match op.as_str() {
        "!" if operands.len() == 1 => non_null_facts(&operands[0], !truth),
        "&&" if truth => operands.iter().flat_map(|o| non_null_facts(o, truth)).collect(),
        "||" if !truth => operands.iter().flat_map(|o| non_null_facts(o, truth)).collect(),
        "==" | "!=" => match null_compared(operands) {
            Some(name) if (op == "!=") == truth => vec![name.to_owned()],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Identifiers validated by a guard that holds when `cond` is `truth`, with the
/// capabilities cleared. Allow-list guards (`ALLOWED.contains(x)`) vouch for
/// their arguments only; receiver checks (`p.startsWith(base)`) for the
/// receiver only.
pub fn guard_facts(cond: &Expr, truth: bool, labels: &LabelSet) -> Vec<(String, Cap)> {
    match &cond.kind {
        ExprKind::Operation { op, operands } => match op.as_str() {
            "!" if operands.len() == 1 => guard_facts(&operands[0], !truth, labels),
            "&&" if truth => operands.iter().flat_map(|o| guard_facts(o, truth, labels)).collect(),
            "||" if !truth => operands.iter().flat_map(|o| guard_facts(o, truth, labels)).collect(),
            _ => Vec::new(),
        },
        ExprKind::Call(call) if truth => {
            let path = call.path();
            let (guard, check) = (labels.guard_caps(&path), labels.check_caps(&path));
            let mut facts: Vec<_> = call.args.iter().filter_map(Expr::path).map(|name| (name, guard)).collect();
            facts.extend(call.receiver.as_deref().and_then(Expr::path).map(|name| (name, check)));
            facts.retain(|(_, caps)| !caps.is_empty());
            facts
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
fn method_body(src: &str) -> (MethodModel, LabelSet) {
    let unit = crate::extract::parse("T.java", src, &crate::extract::default_taint_types()).unwrap();
    (unit.classes[0].methods[0].clone(), LabelSet::default())
}

#[test]
fn concatenation_records_site_and_markup() {
    let (m, labels) = method_body(r#"class T { public void f(String name) { String h = "<b>" + name + "</b>"; } }"#);
    let mut state = FlowState::seed(&m);
    let crate::model::StmtKind::Declare { name, init, .. } = &m.body[0].kind else { panic!() };
    state.bind(name, init.as_ref(), &labels);

    let t = state.var("h").expect("h is tainted");
    assert!(t.markup);
    assert_eq!(t.concat, init.as_ref().map(|e| e.span));
}

#[test]
fn sanitizer_clears_only_its_capability() {
    let (m, labels) = method_body(r#"class T { public void f(String n) { String s = StringEscapeUtils.escapeHtml4(n); } }"#);
    let mut state = FlowState::seed(&m);
    let crate::model::StmtKind::Declare { name, init, .. } = &m.body[0].kind else { panic!() };
    state.bind(name, init.as_ref(), &labels);

    let t = state.var("s").unwrap();
    assert!(!t.caps.contains(Cap::HTML));
    assert!(t.caps.contains(Cap::SQL));
}

#[test]
fn join_is_a_union_of_branches() {
    let mut a = FlowState::default();
    let mut b = FlowState::default();
    a.vars.insert("x".into(), Taint { caps: Cap::SQL, concat: None, markup: false });
    b.maybe_null.insert("u".into());
    a.join(&b);
    assert!(a.var("x").is_some());
    assert!(a.may_be_null("u"));
}

#[test]
fn only_explicit_null_checks_narrow() {
    let (m, _) = method_body(r#"class T { void f(User u, String id) { if (u != null && id.equals("x")) {} if (id.equals("admin")) {} } }"#);
    let crate::model::StmtKind::If { cond, .. } = &m.body[0].kind else { panic!() };
    assert_eq!(non_null_facts(cond, true), vec!["u".to_string()]);
    assert!(non_null_facts(cond, false).is_empty());

    let crate::model::StmtKind::If { cond, .. } = &m.body[1].kind else { panic!() };
    assert!(non_null_facts(cond, true).is_empty());
}

#[test]
fn allow_list_guards_vouch_for_arguments_not_receiver() {
    let (m, labels) = method_body(
        r#"class T { public void f(String cmd, String p) { if (cmd.contains("ls")) {} if (p.startsWith(BASE)) {} } }"#,
    );
    let crate::model::StmtKind::If { cond, .. } = &m.body[0].kind else { panic!() };
    assert!(guard_facts(cond, true, &labels).is_empty());

    let crate::model::StmtKind::If { cond, .. } = &m.body[1].kind else { panic!() };
    assert_eq!(guard_facts(cond, true, &labels), vec![("p".to_string(), Cap::PATH)]);
}

#[test]
fn primitive_declarations_and_private_methods_start_clean() {
    let (m, labels) = method_body(
        r#"class T { public void f(String raw) { int id = Integer.parseInt(raw); String s = raw.trim(); } private void g(String raw) {} }"#,
    );
    let mut state = FlowState::seed(&m);
    for stmt in &m.body {
        let crate::model::StmtKind::Declare { name, ty, init } = &stmt.kind else { panic!() };
        state.declare(name, ty, init.as_ref(), &labels);
    }
    assert!(state.var("id").is_none());
    assert!(state.var("s").is_some());

    let unit = crate::extract::parse(
        "T.java",
        "class T { private void g(String raw) {} }",
        &crate::extract::default_taint_types(),
    )
    .unwrap();
    assert_eq!(FlowState::seed(&unit.classes[0].methods[0]), FlowState::default());
}

#[test]
fn negated_guard_applies_to_else_branch() {
    let (m, labels) = method_body(r#"class T { public void f(String cmd) { if (!ALLOWED.contains(cmd)) { return; } } }"#);
    let crate::model::StmtKind::If { cond, .. } = &m.body[0].kind else { panic!() };
    let seeded = FlowState::seed(&m);
    let (mut then, mut otherwise) = (seeded.clone(), seeded.clone());
    FlowState::narrow(cond, &labels, &mut then, &mut otherwise);
    assert!(then.var("cmd").unwrap().caps.contains(Cap::SHELL));
    assert!(!otherwise.var("cmd").unwrap().caps.contains(Cap::SHELL));
}
