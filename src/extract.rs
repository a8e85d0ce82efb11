use std::cell::RefCell;

use phf::{Map, phf_map};
use tree_sitter::{Language, Node};

use crate::errors::ParseError;
use crate::model::{
    Call, CallKind, ClassModel, Expr, ExprKind, FieldModel, Literal, MethodModel, Param, SourceUnit,
    Span, Statement, StmtKind, Visibility,
};

/// Syntax nesting beyond this is reported as a parse failure instead of
/// being lowered recursively.
const MAX_NESTING: usize = 400;

thread_local! {
    static PARSER: RefCell<tree_sitter::Parser> = RefCell::new(tree_sitter::Parser::new());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Type,
    Field,
    Method,
    Declare,
    ExprStmt,
    Return,
    Throw,
    If,
    While,
    Do,
    For,
    ForEach,
    Try,
    Block,
    Labeled,
    Synchronized,
    Switch,
    CtorCall,
    Trivia,
    Other,
}

static KINDS: Map<&'static str, Kind> = phf_map! {
    // declarations
    "class_declaration"               => Kind::Type,
    "interface_declaration"           => Kind::Type,
    "enum_declaration"                => Kind::Type,
    "record_declaration"              => Kind::Type,
    "field_declaration"               => Kind::Field,
    "constant_declaration"            => Kind::Field,
    "method_declaration"              => Kind::Method,
    "constructor_declaration"         => Kind::Method,
    "compact_constructor_declaration" => Kind::Method,

    // statements
    "local_variable_declaration"      => Kind::Declare,
    "expression_statement"            => Kind::ExprStmt,
    "return_statement"                => Kind::Return,
    "throw_statement"                 => Kind::Throw,
    "if_statement"                    => Kind::If,
    "while_statement"                 => Kind::While,
    "do_statement"                    => Kind::Do,
    "for_statement"                   => Kind::For,
    "enhanced_for_statement"          => Kind::ForEach,
    "try_statement"                   => Kind::Try,
    "try_with_resources_statement"    => Kind::Try,
    "block"                           => Kind::Block,
    "labeled_statement"               => Kind::Labeled,
    "synchronized_statement"          => Kind::Synchronized,
    "switch_expression"               => Kind::Switch,
    "explicit_constructor_invocation" => Kind::CtorCall,

    // trivia
    "line_comment"                    => Kind::Trivia,
    "block_comment"                   => Kind::Trivia,
    "local_class_declaration"         => Kind::Trivia,
    "package_declaration"             => Kind::Trivia,
    "import_declaration"              => Kind::Trivia,
};

fn kind_of(node: Node<'_>) -> Kind {
    KINDS.get(node.kind()).copied().unwrap_or(Kind::Other)
}

/// Parse Java source into a [`SourceUnit`].
///
/// `tainted_types` lists the declared parameter types that mark a parameter as
/// externally controlled.
pub fn parse(id: &str, text: &str, tainted_types: &[String]) -> Result<SourceUnit, ParseError> {
    tracing::debug!(unit = id, "extracting structural model");

    let tree = PARSER.with(|cell| {
        let mut parser = cell.borrow_mut();
        parser
            .set_language(&Language::from(tree_sitter_java::LANGUAGE))
            .map_err(|e| ParseError::unit(id, format!("grammar unavailable: {e}")))?;
        parser
            .parse(text, None)
            .ok_or_else(|| ParseError::unit(id, "parser produced no tree"))
    })?;

    let root = tree.root_node();
    if root.has_error() {
        let bad = first_error(root).unwrap_or(root);
        let pos = bad.start_position();
        let reason = if bad.is_missing() {
            format!("missing `{}`", bad.kind())
        } else {
            let snippet: String = bad
                .utf8_text(text.as_bytes())
                .unwrap_or_default()
                .chars()
                .take(24)
                .collect();
            format!("unexpected `{}`", snippet.trim())
        };
        return Err(ParseError::new(id, pos.row + 1, pos.column + 1, reason));
    }

    if let Some(deep) = too_deep(root, text.as_bytes()) {
        let pos = deep.start_position();
        return Err(ParseError::new(
            id,
            pos.row + 1,
            pos.column + 1,
            format!("nesting deeper than {MAX_NESTING} levels"),
        ));
    }

    let mut lower = Lower { src: text.as_bytes(), tainted_types, classes: Vec::new() };
    for item in named(root) {
        if kind_of(item) == Kind::Type {
            lower.class(item);
        }
    }

    Ok(SourceUnit { id: id.to_owned(), text: text.to_owned(), classes: lower.classes })
}

fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut node = root;
    loop {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        node = children.into_iter().find(|c| c.has_error())?;
    }
}

fn is_concat(node: Node<'_>, src: &[u8]) -> bool {
    node.kind() == "binary_expression"
        && node
            .child_by_field_name("operator")
            .and_then(|op| op.utf8_text(src).ok())
            == Some("+")
}

/// First node nested deeper than [`MAX_NESTING`], not counting the left spine
/// of `+` chains (lowered without recursion).
fn too_deep<'t>(root: Node<'t>, src: &[u8]) -> Option<Node<'t>> {
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_NESTING {
            return Some(node);
        }
        let spine = if is_concat(node, src) { node.child_by_field_name("left") } else { None };
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let flat = spine == Some(child) && is_concat(child, src);
            stack.push((child, if flat { depth } else { depth + 1 }));
        }
    }
    None
}

/// Named children without comments.
fn named(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| !matches!(n.kind(), "line_comment" | "block_comment"))
        .collect()
}

fn span(node: Node<'_>) -> Span {
    let (s, e) = (node.start_position(), node.end_position());
    Span {
        line: s.row + 1,
        col: s.column + 1,
        end_line: e.row + 1,
        end_col: e.column + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
    }
}

fn placeholder(span: Span) -> Expr {
    Expr { kind: ExprKind::Operation { op: String::new(), operands: Vec::new() }, span }
}

fn unquote(raw: &str) -> String {
    raw.strip_prefix("\"\"\"")
        .and_then(|s| s.strip_suffix("\"\"\""))
        .or_else(|| raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(raw)
        .to_owned()
}

fn is_type_kind(kind: &str) -> bool {
    matches!(
        kind,
        "type_identifier"
            | "scoped_type_identifier"
            | "generic_type"
            | "array_type"
            | "integral_type"
            | "floating_point_type"
            | "boolean_type"
    )
}

struct Mods {
    vis: Visibility,
    is_static: bool,
    is_final: bool,
}

fn modifiers(node: Node<'_>, default_vis: Visibility) -> Mods {
    let mut m = Mods { vis: default_vis, is_static: false, is_final: false };
    let mut cursor = node.walk();
    let Some(mods) = node.children(&mut cursor).find(|c| c.kind() == "modifiers") else {
        return m;
    };
    let mut cursor = mods.walk();
    for tok in mods.children(&mut cursor) {
        match tok.kind() {
            "public" => m.vis = Visibility::Public,
            "protected" => m.vis = Visibility::Protected,
            "private" => m.vis = Visibility::Private,
            "static" => m.is_static = true,
            "final" => m.is_final = true,
            _ => {}
        }
    }
    m
}

struct Lower<'s> {
    src: &'s [u8],
    tainted_types: &'s [String],
    classes: Vec<ClassModel>,
}

impl<'s> Lower<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.src).unwrap_or_default()
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> String {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_owned())
            .unwrap_or_default()
    }

    /* ----------  declarations  ---------- */

    fn class(&mut self, node: Node<'_>) {
        let name = self.field_text(node, "name");
        let interface = node.kind() == "interface_declaration";
        let slot = self.classes.len();
        self.classes.push(ClassModel {
            name: name.clone(),
            span: span(node),
            fields: Vec::new(),
            methods: Vec::new(),
        });

        let Some(body) = node.child_by_field_name("body") else { return };
        let mut members = named(body);
        // enum constants come first; the real members sit one level down
        if let Some(decls) = members.iter().copied().find(|n| n.kind() == "enum_body_declarations") {
            members = named(decls);
        }

        for member in members {
            match kind_of(member) {
                Kind::Field => {
                    let fields = self.field(member, interface);
                    self.classes[slot].fields.extend(fields);
                }
                Kind::Method => {
                    let method = self.method(member, &name, interface);
                    self.classes[slot].methods.push(method);
                }
                Kind::Type => self.class(member),
                _ => {}
            }
        }
    }

    fn field(&self, node: Node<'_>, interface: bool) -> Vec<FieldModel> {
        let default_vis = if interface { Visibility::Public } else { Visibility::Package };
        let mut mods = modifiers(node, default_vis);
        if interface || node.kind() == "constant_declaration" {
            mods.is_static = true;
            mods.is_final = true;
        }
        let ty = self.field_text(node, "type");

        let mut cursor = node.walk();
        node.children_by_field_name("declarator", &mut cursor)
            .map(|d| FieldModel {
                name: self.field_text(d, "name"),
                ty: ty.clone(),
                visibility: mods.vis,
                is_static: mods.is_static,
                is_final: mods.is_final,
                init: d.child_by_field_name("value").map(|v| self.expr(v)),
                span: d.child_by_field_name("name").map(span).unwrap_or_else(|| span(d)),
            })
            .collect()
    }

    fn method(&self, node: Node<'_>, class: &str, interface: bool) -> MethodModel {
        let default_vis = if interface { Visibility::Public } else { Visibility::Package };
        let mods = modifiers(node, default_vis);
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_owned())
            .unwrap_or_else(|| class.to_owned());

        MethodModel {
            name,
            class: class.to_owned(),
            visibility: mods.vis,
            params: node
                .child_by_field_name("parameters")
                .map(|p| self.params(p))
                .unwrap_or_default(),
            body: node
                .child_by_field_name("body")
                .map(|b| self.block(b))
                .unwrap_or_default(),
            span: span(node),
        }
    }

    fn params(&self, list: Node<'_>) -> Vec<Param> {
        named(list)
            .into_iter()
            .filter_map(|p| {
                let (name, ty) = match p.kind() {
                    "formal_parameter" => (
                        p.child_by_field_name("name")?,
                        self.text(p.child_by_field_name("type")?).to_owned(),
                    ),
                    "spread_parameter" => {
                        let children = named(p);
                        let decl = children.iter().find(|n| n.kind() == "variable_declarator")?;
                        let ty = children.iter().find(|n| is_type_kind(n.kind()))?;
                        (decl.child_by_field_name("name")?, format!("{}[]", self.text(*ty)))
                    }
                    _ => return None,
                };
                Some(Param {
                    name: self.text(name).to_owned(),
                    tainted: self.is_tainted_type(&ty),
                    ty,
                })
            })
            .collect()
    }

    fn is_tainted_type(&self, ty: &str) -> bool {
        let ty: String = ty.split_whitespace().collect();
        let simple = ty.rsplit('.').next().unwrap_or(ty.as_str());
        self.tainted_types.iter().any(|t| *t == ty || t == simple)
    }

    /* ----------  statements  ---------- */

    /// Statements of a block, or of a single-statement body.
    fn block(&self, node: Node<'_>) -> Vec<Statement> {
        let mut out = Vec::new();
        match node.kind() {
            "block" | "constructor_body" => {
                for child in named(node) {
                    self.stmt(child, &mut out);
                }
            }
            _ => self.stmt(node, &mut out),
        }
        out
    }

    fn body(&self, node: Node<'_>) -> Vec<Statement> {
        node.child_by_field_name("body")
            .map(|b| self.block(b))
            .unwrap_or_default()
    }

    fn declare(&self, node: Node<'_>, out: &mut Vec<Statement>) {
        let ty = self.field_text(node, "type");
        let mut cursor = node.walk();
        for d in node.children_by_field_name("declarator", &mut cursor) {
            out.push(Statement {
                kind: StmtKind::Declare {
                    name: self.field_text(d, "name"),
                    ty: ty.clone(),
                    init: d.child_by_field_name("value").map(|v| self.expr(v)),
                },
                span: span(d),
            });
        }
    }

    fn expr_stmt(&self, node: Node<'_>) -> StmtKind {
        if node.kind() == "assignment_expression" {
            return StmtKind::Assign {
                target: self.opt_expr(node, "left"),
                op: self.field_text(node, "operator"),
                value: self.opt_expr(node, "right"),
            };
        }
        StmtKind::Expr(self.expr(node))
    }

    fn stmt(&self, node: Node<'_>, out: &mut Vec<Statement>) {
        let sp = span(node);
        let kind = match kind_of(node) {
            Kind::Trivia | Kind::Type | Kind::Field | Kind::Method => return,
            Kind::Declare => return self.declare(node, out),
            Kind::Labeled => {
                if let Some(inner) = named(node).last() {
                    self.stmt(*inner, out);
                }
                return;
            }
            Kind::ExprStmt => match named(node).first() {
                Some(e) => self.expr_stmt(*e),
                None => return,
            },
            Kind::Return => StmtKind::Return(named(node).first().map(|e| self.expr(*e))),
            Kind::Throw => match named(node).first() {
                Some(e) => StmtKind::Throw(self.expr(*e)),
                None => return,
            },
            Kind::If => StmtKind::If {
                cond: self.opt_expr(node, "condition"),
                then: node
                    .child_by_field_name("consequence")
                    .map(|n| self.block(n))
                    .unwrap_or_default(),
                otherwise: node
                    .child_by_field_name("alternative")
                    .map(|n| self.block(n))
                    .unwrap_or_default(),
            },
            Kind::While | Kind::Do => StmtKind::Loop {
                header: node
                    .child_by_field_name("condition")
                    .map(|c| self.expr(c))
                    .into_iter()
                    .collect(),
                body: self.body(node),
            },
            Kind::For => {
                let mut stmts = Vec::new();
                let inits: Vec<_> = {
                    let mut cursor = node.walk();
                    node.children_by_field_name("init", &mut cursor).collect()
                };
                for init in inits {
                    if init.kind() == "local_variable_declaration" {
                        self.declare(init, &mut stmts);
                    } else {
                        stmts.push(Statement { kind: self.expr_stmt(init), span: span(init) });
                    }
                }
                let mut header: Vec<Expr> = node
                    .child_by_field_name("condition")
                    .map(|c| self.expr(c))
                    .into_iter()
                    .collect();
                let mut cursor = node.walk();
                header.extend(node.children_by_field_name("update", &mut cursor).map(|u| self.expr(u)));
                stmts.push(Statement { kind: StmtKind::Loop { header, body: self.body(node) }, span: sp });
                StmtKind::Block(stmts)
            }
            Kind::ForEach => {
                let value = self.opt_expr(node, "value");
                let mut body = Vec::new();
                if let Some(name) = node.child_by_field_name("name") {
                    body.push(Statement {
                        kind: StmtKind::Declare {
                            name: self.text(name).to_owned(),
                            ty: self.field_text(node, "type"),
                            init: Some(value.clone()),
                        },
                        span: span(name),
                    });
                }
                body.extend(self.body(node));
                StmtKind::Loop { header: vec![value], body }
            }
            Kind::Try => {
                let mut body = Vec::new();
                if let Some(resources) = node.child_by_field_name("resources") {
                    for r in named(resources).into_iter().filter(|r| r.kind() == "resource") {
                        if let (Some(name), Some(value)) = (r.child_by_field_name("name"), r.child_by_field_name("value")) {
                            body.push(Statement {
                                kind: StmtKind::Declare {
                                    name: self.text(name).to_owned(),
                                    ty: self.field_text(r, "type"),
                                    init: Some(self.expr(value)),
                                },
                                span: span(r),
                            });
                        }
                    }
                }
                body.extend(self.body(node));

                let mut handlers = Vec::new();
                let mut finally = Vec::new();
                for clause in named(node) {
                    match clause.kind() {
                        "catch_clause" => handlers.push(self.body(clause)),
                        "finally_clause" => {
                            if let Some(b) = named(clause).into_iter().find(|n| n.kind() == "block") {
                                finally = self.block(b);
                            }
                        }
                        _ => {}
                    }
                }
                StmtKind::Try { body, handlers, finally }
            }
            Kind::Block => StmtKind::Block(self.block(node)),
            Kind::Synchronized => StmtKind::Block(self.body(node)),
            Kind::Switch => {
                let cond = self.opt_expr(node, "condition");
                let arms: Vec<Vec<Statement>> = node
                    .child_by_field_name("body")
                    .map(|b| {
                        named(b)
                            .into_iter()
                            .map(|arm| {
                                let mut stmts = Vec::new();
                                for s in named(arm).into_iter().filter(|s| s.kind() != "switch_label") {
                                    self.stmt(s, &mut stmts);
                                }
                                stmts
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                // each arm becomes its own branch; fall-through is not modelled
                let chain = arms.into_iter().rev().fold(Vec::new(), |otherwise, then| {
                    vec![Statement { kind: StmtKind::If { cond: cond.clone(), then, otherwise }, span: sp }]
                });
                StmtKind::Block(chain)
            }
            Kind::CtorCall => StmtKind::Expr(Expr {
                kind: ExprKind::Call(Call {
                    receiver: None,
                    name: self.field_text(node, "constructor"),
                    args: self.args(node),
                    kind: CallKind::Method,
                }),
                span: sp,
            }),
            Kind::Other => StmtKind::Opaque(named(node).into_iter().map(|n| self.expr(n)).collect()),
        };
        out.push(Statement { kind, span: sp });
    }

    /* ----------  expressions  ---------- */

    fn is_concat(&self, node: Node<'_>) -> bool {
        is_concat(node, self.src)
    }

    /// Operands of a `+` chain, left to right. Java nests `a + b + c` to the
    /// left one level per operator, so the spine is followed with a loop.
    fn concat_chain(&self, node: Node<'_>) -> Vec<Expr> {
        let mut sides = Vec::new();
        let mut cur = node;
        loop {
            sides.push(cur.child_by_field_name("right"));
            match cur.child_by_field_name("left") {
                Some(left) if self.is_concat(left) => cur = left,
                left => {
                    sides.push(left);
                    break;
                }
            }
        }

        let mut parts = Vec::new();
        for side in sides.into_iter().rev() {
            let e = side.map(|n| self.expr(n)).unwrap_or_else(|| placeholder(span(cur)));
            match e.kind {
                ExprKind::Concatenation(inner) => parts.extend(inner),
                _ => parts.push(e),
            }
        }
        parts
    }

    fn opt_expr(&self, node: Node<'_>, field: &str) -> Expr {
        node.child_by_field_name(field)
            .map(|n| self.expr(n))
            .unwrap_or_else(|| placeholder(span(node)))
    }

    fn args(&self, node: Node<'_>) -> Vec<Expr> {
        node.child_by_field_name("arguments")
            .map(|a| named(a).into_iter().map(|n| self.expr(n)).collect())
            .unwrap_or_default()
    }

    fn expr(&self, node: Node<'_>) -> Expr {
        let sp = span(node);
        let kind = match node.kind() {
            "string_literal" => ExprKind::Literal(Literal::Str(unquote(self.text(node)))),
            "null_literal" => ExprKind::Literal(Literal::Null),
            "identifier" | "this" | "super" => ExprKind::Identifier(self.text(node).to_owned()),
            "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal"
            | "decimal_floating_point_literal"
            | "hex_floating_point_literal"
            | "character_literal"
            | "class_literal"
            | "true"
            | "false" => ExprKind::Literal(Literal::Other(self.text(node).to_owned())),
            "parenthesized_expression" => {
                return named(node)
                    .first()
                    .map(|inner| self.expr(*inner))
                    .unwrap_or_else(|| placeholder(sp));
            }
            "cast_expression" => return self.opt_expr(node, "value"),
            "binary_expression" if self.is_concat(node) => ExprKind::Concatenation(self.concat_chain(node)),
            "binary_expression" => ExprKind::Operation {
                op: self.field_text(node, "operator"),
                operands: vec![self.opt_expr(node, "left"), self.opt_expr(node, "right")],
            },
            "method_invocation" => ExprKind::Call(Call {
                receiver: node.child_by_field_name("object").map(|o| Box::new(self.expr(o))),
                name: self.field_text(node, "name"),
                args: self.args(node),
                kind: CallKind::Method,
            }),
            "object_creation_expression" => {
                let ty = self.field_text(node, "type");
                ExprKind::Call(Call {
                    receiver: None,
                    name: ty.split('<').next().unwrap_or_default().trim().to_owned(),
                    args: self.args(node),
                    kind: CallKind::Construct,
                })
            }
            "field_access" => ExprKind::FieldAccess {
                object: Box::new(self.opt_expr(node, "object")),
                field: self.field_text(node, "field"),
            },
            "assignment_expression" => ExprKind::Operation {
                op: self.field_text(node, "operator"),
                operands: vec![self.opt_expr(node, "left"), self.opt_expr(node, "right")],
            },
            "unary_expression" => ExprKind::Operation {
                op: self.field_text(node, "operator"),
                operands: vec![self.opt_expr(node, "operand")],
            },
            "ternary_expression" => ExprKind::Operation {
                op: "?:".into(),
                operands: vec![
                    self.opt_expr(node, "condition"),
                    self.opt_expr(node, "consequence"),
                    self.opt_expr(node, "alternative"),
                ],
            },
            "array_access" => ExprKind::Operation {
                op: "[]".into(),
                operands: vec![self.opt_expr(node, "array"), self.opt_expr(node, "index")],
            },
            // bodies of lambdas are not walked
            "lambda_expression" | "method_reference" => {
                ExprKind::Operation { op: node.kind().to_owned(), operands: Vec::new() }
            }
            other => ExprKind::Operation {
                op: other.to_owned(),
                operands: named(node).into_iter().map(|n| self.expr(n)).collect(),
            },
        };
        Expr { kind, span: sp }
    }
}

#[cfg(test)]
pub(crate) fn default_taint_types() -> Vec<String> {
    ["String", "String[]", "HttpServletRequest"].iter().map(|s| s.to_string()).collect()
}

#[test]
fn fixture_classes_and_methods_are_recognised() {
    let src = include_str!("../demos/servlet/Vulnerable.java");
    let unit = parse("Vulnerable.java", src, &default_taint_types()).expect("fixture parses");

    let classes: Vec<_> = unit.classes.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(classes, vec!["Vulnerable", "User"]);

    let methods: Vec<_> = unit.classes.iter().flat_map(|c| &c.methods).map(|m| m.name.as_str()).collect();
    assert_eq!(
        methods,
        vec!["getUser", "doGet", "readFile", "encryptData", "executeCommand", "processUser", "getName"]
    );

    let key = &unit.classes[0].fields[0];
    assert_eq!(key.name, "ENCRYPTION_KEY");
    assert_eq!(key.visibility, Visibility::Private);
    assert!(key.is_static && key.is_final);
    assert_eq!(key.init.as_ref().and_then(Expr::as_str_literal), Some("MySuperSecretKey"));

    let user_fields: Vec<_> = unit.classes[1]
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.visibility))
        .collect();
    assert_eq!(user_fields, vec![("name", Visibility::Public), ("password", Visibility::Public)]);
}

#[test]
fn parameters_get_taint_flag_from_declared_type() {
    let src = r#"
        class A {
            public void f(String s, int n, javax.servlet.http.HttpServletRequest req) {}
            private void g(String s) {}
        }"#;
    let unit = parse("A.java", src, &default_taint_types()).unwrap();
    let f = &unit.classes[0].methods[0];
    let flags: Vec<_> = f.params.iter().map(|p| (p.name.as_str(), p.tainted)).collect();
    assert_eq!(flags, vec![("s", true), ("n", false), ("req", true)]);

    let g = &unit.classes[0].methods[1];
    assert_eq!(g.visibility, Visibility::Private);
}

#[test]
fn concatenation_chain_is_flattened() {
    let src = r#"class A { void f(String u) { String q = "a" + u + "b"; } }"#;
    let unit = parse("A.java", src, &[]).unwrap();
    let body = &unit.classes[0].methods[0].body;
    let StmtKind::Declare { name, init: Some(init), .. } = &body[0].kind else {
        panic!("expected a declaration, got {:?}", body[0].kind);
    };
    assert_eq!(name, "q");
    let ExprKind::Concatenation(parts) = &init.kind else { panic!("expected concatenation") };
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[1].as_identifier(), Some("u"));
    assert_eq!(unit.snippet(init.span), "\"a\" + u + \"b\"");
}

#[test]
fn calls_keep_receiver_and_arguments() {
    let src = r#"class A { void f(String c) { Runtime.getRuntime().exec(c); new java.io.File(c); } }"#;
    let unit = parse("A.java", src, &[]).unwrap();
    let body = &unit.classes[0].methods[0].body;

    let StmtKind::Expr(e) = &body[0].kind else { panic!() };
    let call = e.as_call().unwrap();
    assert_eq!(call.path(), "Runtime.getRuntime.exec");
    assert_eq!(call.args[0].as_identifier(), Some("c"));

    let StmtKind::Expr(e) = &body[1].kind else { panic!() };
    let call = e.as_call().unwrap();
    assert_eq!(call.kind, CallKind::Construct);
    assert_eq!(call.name, "java.io.File");
}

#[test]
fn if_else_and_try_are_structured() {
    let src = r#"
        class A {
            void f(String x) {
                try {
                    if (x == null) { return; } else { g(x); }
                } catch (Exception e) {
                    h();
                } finally {
                    k();
                }
            }
        }"#;
    let unit = parse("A.java", src, &[]).unwrap();
    let body = &unit.classes[0].methods[0].body;
    let StmtKind::Try { body, handlers, finally } = &body[0].kind else { panic!() };
    assert_eq!(handlers.len(), 1);
    assert_eq!(finally.len(), 1);
    let StmtKind::If { cond, then, otherwise } = &body[0].kind else { panic!() };
    assert!(matches!(&cond.kind, ExprKind::Operation { op, .. } if op == "=="));
    assert!(crate::model::always_exits(then));
    assert_eq!(otherwise.len(), 1);
}

#[test]
fn unbalanced_braces_are_a_parse_error() {
    let src = "class A {\n  void f() {\n    int x = 1;\n  }\n";
    let err = parse("A.java", src, &[]).unwrap_err();
    assert_eq!(err.unit, "A.java");
    assert!(err.line >= 1);
}

#[test]
fn unterminated_string_is_a_parse_error() {
    let src = "class A { void f() { String s = \"abc; } }\n";
    assert!(parse("A.java", src, &[]).is_err());
}

#[test]
fn long_concatenation_chain_is_lowered_flat() {
    let terms: Vec<String> = (0..6000).map(|i| format!("a{i}")).collect();
    let src = format!("class A {{ void f() {{ String q = \"x\" + {}; }} }}", terms.join(" + "));
    let unit = parse("A.java", &src, &[]).unwrap();

    let StmtKind::Declare { init: Some(init), .. } = &unit.classes[0].methods[0].body[0].kind else {
        panic!("expected a declaration");
    };
    let ExprKind::Concatenation(parts) = &init.kind else { panic!("expected concatenation") };
    assert_eq!(parts.len(), 6001);
    assert_eq!(parts[1].as_identifier(), Some("a0"));
    assert_eq!(parts[6000].as_identifier(), Some("a5999"));
}

#[test]
fn pathological_nesting_is_a_parse_error() {
    let depth = 2000;
    let src = format!("class A {{ int f() {{ return {}1{}; }} }}", "(".repeat(depth), ")".repeat(depth));
    let err = parse("A.java", &src, &[]).unwrap_err();
    assert!(err.reason.contains("nesting"), "{err}");
    assert_eq!(err.line, 1);
}
