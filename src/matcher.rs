use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::labels::LabelSet;
use crate::model::{ClassModel, MethodModel, SourceUnit, Span, Statement, StmtKind, always_exits};
use crate::report::Finding;
use crate::rules::{FieldCx, Rule, RuleSet, StmtCx};
use crate::taint::FlowState;
use crate::utils::config::HeuristicsConfig;

/// Cooperative cancellation for one file scan: a flag shared with the
/// caller plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl Cancel {
    pub fn new(flag: Option<Arc<AtomicBool>>, deadline: Option<Instant>) -> Self {
        Self { flag, deadline }
    }

    /// Why the scan should stop, if it should.
    pub fn check(&self) -> Option<&'static str> {
        if self.flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Some("scan cancelled");
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some("per-file time budget exceeded");
        }
        None
    }
}

/// Findings for one unit, deduplicated on (rule, span).
struct Collector<'u> {
    unit: &'u SourceUnit,
    seen: HashSet<(&'static str, Span)>,
    findings: Vec<Finding>,
}

impl<'u> Collector<'u> {
    fn emit(&mut self, rule: &dyn Rule, scope: &str, span: Span) {
        let meta = rule.meta();
        if !self.seen.insert((meta.id, span)) {
            tracing::trace!(rule = meta.id, line = span.line, col = span.col, "duplicate finding suppressed");
            return;
        }
        self.findings.push(Finding {
            rule_id: meta.id,
            severity: meta.severity,
            file: self.unit.id.clone(),
            method: scope.to_owned(),
            span,
            snippet: self.unit.snippet(span),
            remediation: meta.remediation,
        });
    }
}

pub struct Matcher<'a> {
    rules: &'a RuleSet,
    labels: &'a LabelSet,
    heuristics: &'a HeuristicsConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(rules: &'a RuleSet, labels: &'a LabelSet, heuristics: &'a HeuristicsConfig) -> Self {
        Self { rules, labels, heuristics }
    }

    /// Run every active rule over `unit`. Returns the cancellation reason if
    /// the scan was abandoned part way.
    pub fn scan(&self, unit: &SourceUnit, cancel: &Cancel) -> Result<Vec<Finding>, String> {
        let mut sink = Collector { unit, seen: HashSet::new(), findings: Vec::new() };

        for class in &unit.classes {
            self.fields(class, &mut sink);
            for method in &class.methods {
                if let Some(reason) = cancel.check() {
                    tracing::debug!(unit = %unit.id, method = %method.name, "{reason}");
                    return Err(reason.to_owned());
                }
                tracing::trace!(class = %method.class, method = %method.name, line = method.span.line, "walking method");
                let mut walk = MethodWalk {
                    matcher: self,
                    method,
                    sink: &mut sink,
                    skipped: BTreeSet::new(),
                };
                let mut state = FlowState::seed(method);
                walk.block(&method.body, &mut state);
            }
        }

        tracing::debug!(unit = %unit.id, findings = sink.findings.len(), "unit matched");
        Ok(sink.findings)
    }

    fn fields(&self, class: &ClassModel, sink: &mut Collector<'_>) {
        for field in &class.fields {
            let cx = FieldCx { field, heuristics: self.heuristics };
            for rule in self.rules.iter() {
                let mut hits = Vec::new();
                match rule.check_field(&cx, &mut hits) {
                    Ok(()) => hits.into_iter().for_each(|span| sink.emit(rule, &class.name, span)),
                    Err(e) => tracing::warn!(class = %class.name, field = %field.name, "{e}; field skipped"),
                }
            }
        }
    }
}

struct MethodWalk<'m, 'c, 'u> {
    matcher: &'m Matcher<'m>,
    method: &'m MethodModel,
    sink: &'c mut Collector<'u>,
    /// Rules that failed earlier in this method.
    skipped: BTreeSet<&'static str>,
}

impl MethodWalk<'_, '_, '_> {
    fn block(&mut self, stmts: &[Statement], state: &mut FlowState) {
        for (i, stmt) in stmts.iter().enumerate() {
            self.statement(stmt, state);
            if matches!(stmt.kind, StmtKind::Return(_) | StmtKind::Throw(_)) && i + 1 < stmts.len() {
                tracing::trace!(method = %self.method.name, line = stmt.span.line, "unreachable statements skipped");
                break;
            }
        }
    }

    fn rules_at(&mut self, stmt: &Statement, state: &FlowState) {
        let m = self.matcher;
        for rule in m.rules.iter() {
            let id = rule.meta().id;
            if self.skipped.contains(id) {
                continue;
            }
            let cx = StmtCx { stmt, state, labels: m.labels, heuristics: m.heuristics };
            let mut hits = Vec::new();
            match rule.check_statement(&cx, &mut hits) {
                Ok(()) => hits.into_iter().for_each(|span| self.sink.emit(rule, &self.method.name, span)),
                Err(e) => {
                    tracing::warn!(
                        unit = %self.sink.unit.id,
                        method = %self.method.name,
                        line = stmt.span.line,
                        "{e}; rule skipped for the rest of this method"
                    );
                    self.skipped.insert(id);
                }
            }
        }
    }

    fn statement(&mut self, stmt: &Statement, state: &mut FlowState) {
        self.rules_at(stmt, state);
        let labels = self.matcher.labels;

        match &stmt.kind {
            StmtKind::Declare { name, ty, init } => state.declare(name, ty, init.as_ref(), labels),
            StmtKind::Assign { target, op, value } => state.assign(target, op, value, stmt.span, labels),
            StmtKind::Expr(e) | StmtKind::Throw(e) | StmtKind::Return(Some(e)) => state.apply_nested(e, labels),
            StmtKind::Return(None) => {}
            StmtKind::Opaque(es) => es.iter().for_each(|e| state.apply_nested(e, labels)),
            StmtKind::Block(inner) => self.block(inner, state),
            StmtKind::If { cond, then, otherwise } => {
                state.apply_nested(cond, labels);
                let mut then_state = state.clone();
                let mut else_state = state.clone();
                FlowState::narrow(cond, labels, &mut then_state, &mut else_state);

                self.block(then, &mut then_state);
                self.block(otherwise, &mut else_state);

                *state = match (always_exits(then), always_exits(otherwise)) {
                    (true, _) => else_state,
                    (false, true) => then_state,
                    (false, false) => {
                        then_state.join(&else_state);
                        then_state
                    }
                };
            }
            StmtKind::Loop { header, body } => {
                header.iter().for_each(|e| state.apply_nested(e, labels));
                let mut body_state = state.clone();
                self.block(body, &mut body_state);
                if !always_exits(body) {
                    state.join(&body_state);
                }
            }
            StmtKind::Try { body, handlers, finally } => {
                let entry = state.clone();
                self.block(body, state);
                let mut live = !always_exits(body);
                let mut merged = state.clone();
                for handler in handlers {
                    // a handler may run after any prefix of the body
                    let mut h = entry.clone();
                    h.join(state);
                    self.block(handler, &mut h);
                    if !always_exits(handler) {
                        if live {
                            merged.join(&h);
                        } else {
                            merged = h;
                            live = true;
                        }
                    }
                }
                *state = merged;
                self.block(finally, state);
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn scan_snippet(src: &str) -> Vec<Finding> {
    let cfg = crate::utils::config::Config::default();
    let rules = RuleSet::all();
    let labels = LabelSet::default();
    let unit = crate::extract::parse("Snippet.java", src, &cfg.heuristics.tainted_parameter_types).unwrap();
    let mut findings = Matcher::new(&rules, &labels, &cfg.heuristics).scan(&unit, &Cancel::default()).unwrap();
    crate::report::sort_findings(&mut findings);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_hits(src: &str, rule: &str) -> Vec<String> {
        scan_snippet(src)
            .into_iter()
            .filter(|f| f.rule_id == rule)
            .map(|f| f.snippet)
            .collect()
    }

    #[test]
    fn sanitizing_one_branch_does_not_clear_after_join() {
        let src = r#"class C {
    public void f(String name, boolean esc, HttpServletResponse resp) throws Exception {
        PrintWriter out = resp.getWriter();
        String v = name;
        if (esc) { v = StringEscapeUtils.escapeHtml4(name); }
        out.println("<p>" + v);
    }
}"#;
        assert_eq!(rule_hits(src, "unescaped_output"), vec!["\"<p>\" + v"]);
    }

    #[test]
    fn sanitizing_every_branch_clears() {
        let src = r#"class C {
    public void f(String name, boolean esc, HttpServletResponse resp) throws Exception {
        PrintWriter out = resp.getWriter();
        String v;
        if (esc) { v = StringEscapeUtils.escapeHtml4(name); } else { v = Encode.forHtml(name); }
        out.println("<p>" + v);
    }
}"#;
        assert!(rule_hits(src, "unescaped_output").is_empty());
    }

    #[test]
    fn negated_guard_with_early_exit_clears_after_if() {
        let src = r#"class C {
    public void run(String cmd) throws Exception {
        if (!ALLOWED.contains(cmd)) { throw new IllegalArgumentException(cmd); }
        Runtime.getRuntime().exec(cmd);
    }
    public void raw(String cmd) throws Exception {
        Runtime.getRuntime().exec(cmd);
    }
}"#;
        let hits: Vec<_> = scan_snippet(src)
            .into_iter()
            .filter(|f| f.rule_id == "command_injection")
            .map(|f| f.method)
            .collect();
        assert_eq!(hits, vec!["raw"]);
    }

    #[test]
    fn taint_flows_through_loops_and_catch_handlers() {
        let src = r#"class C {
    public void f(String[] parts, Connection c) throws Exception {
        String q = "SELECT 1";
        for (String p : parts) { q += " OR id = " + p; }
        c.createStatement().executeQuery(q);
    }
    public void g(String id, Connection c) throws Exception {
        String q = "SELECT 1";
        try { q = "SELECT * FROM t WHERE id = " + id; throw new Exception(); }
        catch (Exception e) { c.createStatement().executeQuery(q); }
    }
}"#;
        let hits: Vec<_> = scan_snippet(src)
            .into_iter()
            .filter(|f| f.rule_id == "injection_via_concatenation")
            .map(|f| (f.method, f.span.line))
            .collect();
        assert_eq!(hits, vec![("f".to_string(), 4), ("g".to_string(), 9)]);
    }

    #[test]
    fn private_helpers_do_not_seed_taint() {
        let src = r#"class C {
    private void helper(String cmd) throws Exception { Runtime.getRuntime().exec(cmd); }
}"#;
        assert!(rule_hits(src, "command_injection").is_empty());
    }

    #[test]
    fn request_sources_taint_without_parameters() {
        let src = r#"class C {
    void f(HttpServletRequest req) throws Exception {
        String file = req.getParameter("f");
        new FileInputStream("/srv/" + file);
    }
}"#;
        assert_eq!(rule_hits(src, "unvalidated_path_use"), vec!["new FileInputStream(\"/srv/\" + file)"]);
    }

    #[test]
    fn cancelled_scan_reports_reason() {
        let cfg = crate::utils::config::Config::default();
        let rules = RuleSet::all();
        let labels = LabelSet::default();
        let unit = crate::extract::parse("A.java", "class A { void f() {} }", &cfg.heuristics.tainted_parameter_types).unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let cancel = Cancel::new(Some(flag), None);
        let out = Matcher::new(&rules, &labels, &cfg.heuristics).scan(&unit, &cancel);
        assert_eq!(out, Err("scan cancelled".to_string()));
    }
}
