//! Lightweight structural model produced by the extractor.
//!
//! Nothing here is resolved semantically: names are plain strings, types are the
//! text written in the source, and calls carry their receiver expression rather
//! than a resolved target.

use serde::Serialize;

/// 1-based source location plus the byte range used for snippets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    pub end_line: usize,
    pub end_col: usize,
    #[serde(skip)]
    pub start_byte: usize,
    #[serde(skip)]
    pub end_byte: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

/// One compilation unit. Built once per file and dropped after the scan.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub id: String,
    pub text: String,
    /// Every class in declaration order; inner classes follow their outer class.
    pub classes: Vec<ClassModel>,
}

impl SourceUnit {
    /// Source text under `span`, whitespace collapsed onto one line.
    pub fn snippet(&self, span: Span) -> String {
        const MAX: usize = 120;
        let raw = self.text.get(span.start_byte..span.end_byte).unwrap_or_default();
        let mut out = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if out.chars().count() > MAX {
            out = out.chars().take(MAX - 3).collect::<String>() + "...";
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ClassModel {
    pub name: String,
    pub span: Span,
    pub fields: Vec<FieldModel>,
    pub methods: Vec<MethodModel>,
}

#[derive(Debug, Clone)]
pub struct FieldModel {
    pub name: String,
    pub ty: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub init: Option<Expr>,
    /// Span of the declared name only, so reports never echo the initializer.
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: String,
    /// Declared type is one that carries external input; seeded only in
    /// non-private methods.
    pub tainted: bool,
}

#[derive(Debug, Clone)]
pub struct MethodModel {
    pub name: String,
    pub class: String,
    pub visibility: Visibility,
    pub params: Vec<Param>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Declare { name: String, ty: String, init: Option<Expr> },
    /// `op` is `=` or a compound operator such as `+=`.
    Assign { target: Expr, op: String, value: Expr },
    Expr(Expr),
    Return(Option<Expr>),
    Throw(Expr),
    If { cond: Expr, then: Vec<Statement>, otherwise: Vec<Statement> },
    Loop { header: Vec<Expr>, body: Vec<Statement> },
    Try { body: Vec<Statement>, handlers: Vec<Vec<Statement>>, finally: Vec<Statement> },
    Block(Vec<Statement>),
    /// Anything the model does not structure further; only its expressions survive.
    Opaque(Vec<Expr>),
}

impl Statement {
    /// Expressions owned directly by this statement. Nested statements are not included.
    pub fn exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::Declare { init, .. } => init.iter().collect(),
            StmtKind::Assign { target, value, .. } => vec![target, value],
            StmtKind::Expr(e) | StmtKind::Throw(e) => vec![e],
            StmtKind::Return(e) => e.iter().collect(),
            StmtKind::If { cond, .. } => vec![cond],
            StmtKind::Loop { header, .. } => header.iter().collect(),
            StmtKind::Opaque(es) => es.iter().collect(),
            StmtKind::Try { .. } | StmtKind::Block(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    /// A flattened chain of `+` operands.
    Concatenation(Vec<Expr>),
    Call(Call),
    FieldAccess { object: Box<Expr>, field: String },
    /// Every other operator; operands are kept so nested calls stay visible.
    Operation { op: String, operands: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// String contents without the surrounding quotes, escapes left as written.
    Str(String),
    Null,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Method,
    Construct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub receiver: Option<Box<Expr>>,
    /// Method name, or the constructed type for `new T(..)`.
    pub name: String,
    pub args: Vec<Expr>,
    pub kind: CallKind,
}

impl Call {
    /// Dotted callee path used for label matching, e.g. `Runtime.getRuntime.exec`.
    pub fn path(&self) -> String {
        match self.receiver.as_deref().and_then(Expr::path) {
            Some(recv) => format!("{recv}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl Expr {
    /// Dotted path of identifiers, field accesses and call names. `None` for
    /// anything that has no sensible name (literals, operators).
    pub fn path(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name.clone()),
            ExprKind::FieldAccess { object, field } => Some(match object.path() {
                Some(p) => format!("{p}.{field}"),
                None => field.clone(),
            }),
            ExprKind::Call(call) => Some(call.path()),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Literal(Literal::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(Literal::Null))
    }

    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Identifier(_) => Vec::new(),
            ExprKind::Concatenation(parts) => parts.iter().collect(),
            ExprKind::Call(call) => call.receiver.as_deref().into_iter().chain(call.args.iter()).collect(),
            ExprKind::FieldAccess { object, .. } => vec![object],
            ExprKind::Operation { operands, .. } => operands.iter().collect(),
        }
    }

    /// Pre-order visit of this expression and everything below it.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        let mut stack = vec![self];
        while let Some(e) = stack.pop() {
            f(e);
            let children = e.children();
            stack.extend(children.into_iter().rev());
        }
    }

    /// Every call expression below (and including) this one, in source order.
    pub fn calls(&self) -> Vec<(&Expr, &Call)> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let ExprKind::Call(c) = &e.kind {
                out.push((e, c));
            }
        });
        out
    }
}

/// True when control cannot fall off the end of `stmts`.
pub fn always_exits(stmts: &[Statement]) -> bool {
    stmts.last().is_some_and(|s| match &s.kind {
        StmtKind::Return(_) | StmtKind::Throw(_) => true,
        StmtKind::Block(inner) => always_exits(inner),
        StmtKind::If { then, otherwise, .. } => always_exits(then) && always_exits(otherwise),
        StmtKind::Try { body, handlers, finally } => {
            always_exits(finally) || (always_exits(body) && handlers.iter().all(|h| always_exits(h)))
        }
        _ => false,
    })
}

#[cfg(test)]
pub(crate) fn ident(name: &str) -> Expr {
    Expr { kind: ExprKind::Identifier(name.into()), span: Span::default() }
}

#[test]
fn call_path_joins_receiver_chain() {
    let get_runtime = Expr {
        kind: ExprKind::Call(Call {
            receiver: Some(Box::new(ident("Runtime"))),
            name: "getRuntime".into(),
            args: vec![],
            kind: CallKind::Method,
        }),
        span: Span::default(),
    };
    let exec = Call {
        receiver: Some(Box::new(get_runtime)),
        name: "exec".into(),
        args: vec![ident("cmd")],
        kind: CallKind::Method,
    };
    assert_eq!(exec.path(), "Runtime.getRuntime.exec");
}

#[test]
fn snippet_collapses_whitespace() {
    let text = "String q = \"a\" +\n        name;".to_string();
    let unit = SourceUnit { id: "x".into(), text: text.clone(), classes: vec![] };
    let span = Span { start_byte: 11, end_byte: text.len() - 1, ..Span::default() };
    assert_eq!(unit.snippet(span), "\"a\" + name");
}

#[test]
fn walk_reaches_nested_calls_in_order() {
    let inner = Expr {
        kind: ExprKind::Call(Call { receiver: Some(Box::new(ident("u"))), name: "getName".into(), args: vec![], kind: CallKind::Method }),
        span: Span::default(),
    };
    let concat = Expr { kind: ExprKind::Concatenation(vec![ident("a"), inner]), span: Span::default() };
    let names: Vec<_> = concat.calls().iter().map(|(_, c)| c.name.clone()).collect();
    assert_eq!(names, vec!["getName"]);
}
