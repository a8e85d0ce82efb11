use crate::errors::RuleError;
use crate::model::{Expr, ExprKind, Span, Visibility};
use crate::rules::{FieldCx, Rule, RuleMeta, Severity, StmtCx};
use crate::taint::{FlowState, non_null_facts};

pub struct PossibleNullDereference;
pub struct PublicMutableField;

static NULL_DEREF: RuleMeta = RuleMeta {
    id: "possible_null_dereference",
    description: "A variable that may still be null is dereferenced",
    severity: Severity::Medium,
    remediation: "Check the variable against null before use, or initialise it with a real value.",
};

static PUBLIC_FIELD: RuleMeta = RuleMeta {
    id: "public_mutable_field",
    description: "A public non-final field exposes mutable state",
    severity: Severity::Low,
    remediation: "Make the field private and expose it through accessors.",
};

/// Walk `e` looking for dereferences of possibly-null identifiers. `known`
/// holds names proven non-null by the left side of an enclosing `&&`/`||`
/// or by the condition of an enclosing `?:`.
fn visit(e: &Expr, state: &FlowState, known: &mut Vec<String>, out: &mut Vec<Span>) {
    let deref = match &e.kind {
        ExprKind::Operation { op, operands } if op == "?:" && operands.len() == 3 => {
            let cond = &operands[0];
            visit(cond, state, known, out);
            for (branch, truth) in [(&operands[1], true), (&operands[2], false)] {
                let mark = known.len();
                known.extend(non_null_facts(cond, truth));
                visit(branch, state, known, out);
                known.truncate(mark);
            }
            return;
        }
        ExprKind::Operation { op, operands } if op == "&&" || op == "||" => {
            let mark = known.len();
            for o in operands {
                visit(o, state, known, out);
                known.extend(non_null_facts(o, op == "&&"));
            }
            known.truncate(mark);
            return;
        }
        ExprKind::Call(call) => call.receiver.as_deref().and_then(Expr::as_identifier),
        ExprKind::FieldAccess { object, .. } => object.as_identifier(),
        _ => None,
    };
    if let Some(name) = deref {
        if state.may_be_null(name) && !known.iter().any(|k| k == name) {
            out.push(e.span);
        }
    }
    for child in e.children() {
        visit(child, state, known, out);
    }
}

impl Rule for PossibleNullDereference {
    fn meta(&self) -> &'static RuleMeta {
        &NULL_DEREF
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        let mut known = Vec::new();
        for e in cx.stmt.exprs() {
            visit(e, cx.state, &mut known, out);
        }
        Ok(())
    }
}

impl Rule for PublicMutableField {
    fn meta(&self) -> &'static RuleMeta {
        &PUBLIC_FIELD
    }

    fn check_field(&self, cx: &FieldCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        if cx.field.visibility == Visibility::Public && !cx.field.is_final {
            out.push(cx.field.span);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::matcher::scan_snippet;

    fn null_hits(src: &str) -> Vec<(String, usize)> {
        scan_snippet(src)
            .into_iter()
            .filter(|f| f.rule_id == "possible_null_dereference")
            .map(|f| (f.method, f.span.line))
            .collect()
    }

    #[test]
    fn explicit_null_checks_guard_the_access() {
        let src = r#"class C {
    void a() { User u = null; if (u != null) { u.getName(); } }
    void b() { User u = null; if (u == null) { return; } u.getName(); }
    void c() { User u = null; boolean ok = u != null && u.isActive(); }
    void d() { User u = null; if (u == null || u.isBanned()) { return; } }
    void e() { User u = null; String n = u != null ? u.getName() : "anon"; }
    void f() { User u = null; String n = u == null ? "anon" : u.getName(); }
}"#;
        assert!(null_hits(src).is_empty());

        let src = r#"class C {
    void a() { User u = null; String n = u == null ? u.getName() : "anon"; }
}"#;
        assert_eq!(null_hits(src), vec![("a".to_string(), 2)]);
    }

    #[test]
    fn equals_is_not_a_null_check_and_reassignment_clears() {
        let src = r#"class C {
    void a(String id) { User u = null; if (id.equals("x")) { u.getName(); } }
    void b() { User u = null; u = new User(); u.getName(); }
    void c(boolean f) { User u = null; if (f) { u = find(); } u.getName(); }
}"#;
        assert_eq!(null_hits(src), vec![("a".to_string(), 2), ("c".to_string(), 4)]);
    }

    #[test]
    fn only_public_non_final_fields_are_flagged() {
        let src = r#"class C {
    public String name;
    public final String id = "x";
    public static final int MAX = 3;
    protected int count;
    public int a, b;
}"#;
        let hits: Vec<_> = scan_snippet(src)
            .into_iter()
            .filter(|f| f.rule_id == "public_mutable_field")
            .map(|f| f.snippet)
            .collect();
        assert_eq!(hits, vec!["name", "a", "b"]);
    }
}
