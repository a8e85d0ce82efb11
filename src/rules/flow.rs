//! Rules driven by the taint table: untrusted data reaching a sink.

use crate::errors::RuleError;
use crate::labels::Cap;
use crate::model::{CallKind, Span};
use crate::rules::{Rule, RuleMeta, Severity, StmtCx};

pub struct InjectionViaConcatenation;
pub struct UnescapedOutput;
pub struct UnvalidatedPathUse;
pub struct CommandInjection;
pub struct OpenRedirect;
pub struct InsecureDeserialization;

static INJECTION: RuleMeta = RuleMeta {
    id: "injection_via_concatenation",
    description: "Query text built by concatenating untrusted input is executed",
    severity: Severity::Critical,
    remediation: "Use a PreparedStatement with bound parameters instead of building the query string.",
};

static OUTPUT: RuleMeta = RuleMeta {
    id: "unescaped_output",
    description: "Untrusted input is written into HTML sent to the client without escaping",
    severity: Severity::High,
    remediation: "HTML-encode the value before writing it (e.g. StringEscapeUtils.escapeHtml4 or OWASP Encoder).",
};

static PATH: RuleMeta = RuleMeta {
    id: "unvalidated_path_use",
    description: "Untrusted input is used as a filesystem path",
    severity: Severity::High,
    remediation: "Resolve the path against a fixed base directory, normalize it and check it stays inside that directory.",
};

static COMMAND: RuleMeta = RuleMeta {
    id: "command_injection",
    description: "Untrusted input reaches a process-spawning call",
    severity: Severity::Critical,
    remediation: "Do not pass user input to a shell; check it against an allow-list and pass arguments separately.",
};

static REDIRECT: RuleMeta = RuleMeta {
    id: "open_redirect",
    description: "The redirect or forward target is taken from untrusted input",
    severity: Severity::Medium,
    remediation: "Redirect only to fixed paths, or map the input to an allow-listed target.",
};

static DESERIALIZE: RuleMeta = RuleMeta {
    id: "insecure_deserialization",
    description: "Objects are deserialized from an untrusted stream",
    severity: Severity::Critical,
    remediation: "Avoid Java serialization for external data; otherwise set an ObjectInputFilter or use ValidatingObjectInputStream with an allow-list.",
};

/// Calls in `cx.stmt` labelled as sinks for `cap`.
fn sinks<'a>(cx: &StmtCx<'a>, cap: Cap) -> Vec<(&'a crate::model::Expr, &'a crate::model::Call)> {
    cx.stmt
        .exprs()
        .into_iter()
        .flat_map(|e| e.calls())
        .filter(|(_, call)| cx.labels.sink_caps(&call.path()).contains(cap))
        .collect()
}

impl Rule for InjectionViaConcatenation {
    fn meta(&self) -> &'static RuleMeta {
        &INJECTION
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for (_, call) in sinks(cx, Cap::SQL) {
            let site = call.args.iter().find_map(|arg| {
                let t = cx.state.taint_of(arg, cx.labels);
                if t.caps.contains(Cap::SQL) { t.concat } else { None }
            });
            out.extend(site);
        }
        Ok(())
    }
}

impl Rule for UnescapedOutput {
    fn meta(&self) -> &'static RuleMeta {
        &OUTPUT
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for (_, call) in sinks(cx, Cap::HTML) {
            let Some(recv) = call.receiver.as_deref() else { continue };
            if !cx.state.is_writer(recv, cx.labels) {
                continue;
            }
            let site = call.args.iter().find_map(|arg| {
                let t = cx.state.taint_of(arg, cx.labels);
                if t.caps.contains(Cap::HTML) && t.markup { Some(t.concat.unwrap_or(arg.span)) } else { None }
            });
            out.extend(site);
        }
        Ok(())
    }
}

impl Rule for UnvalidatedPathUse {
    fn meta(&self) -> &'static RuleMeta {
        &PATH
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for (expr, call) in sinks(cx, Cap::PATH) {
            if call.args.iter().any(|a| cx.state.taint_of(a, cx.labels).caps.contains(Cap::PATH)) {
                out.push(expr.span);
            }
        }
        Ok(())
    }
}

impl Rule for CommandInjection {
    fn meta(&self) -> &'static RuleMeta {
        &COMMAND
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for (expr, call) in sinks(cx, Cap::SHELL) {
            // `new ProcessBuilder()` is legal and configured later; a bare `exec()` is not
            if call.args.is_empty() && call.kind == CallKind::Method {
                return Err(RuleError::new(COMMAND.id, format!("`{}` called without a command", call.path())));
            }
            if call.args.iter().any(|a| cx.state.taint_of(a, cx.labels).caps.contains(Cap::SHELL)) {
                out.push(expr.span);
            }
        }
        Ok(())
    }
}

impl Rule for OpenRedirect {
    fn meta(&self) -> &'static RuleMeta {
        &REDIRECT
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for (expr, call) in sinks(cx, Cap::REDIRECT) {
            if call.args.iter().any(|a| cx.state.taint_of(a, cx.labels).caps.contains(Cap::REDIRECT)) {
                out.push(expr.span);
            }
        }
        Ok(())
    }
}

impl Rule for InsecureDeserialization {
    fn meta(&self) -> &'static RuleMeta {
        &DESERIALIZE
    }

    /// The stream being read from, not the call's arguments, decides.
    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for (expr, call) in sinks(cx, Cap::DESERIALIZE) {
            let Some(stream) = call.receiver.as_deref() else { continue };
            if cx.state.taint_of(stream, cx.labels).caps.contains(Cap::DESERIALIZE) {
                out.push(expr.span);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::matcher::scan_snippet;

    fn hits(src: &str, rule: &str) -> Vec<(String, String)> {
        scan_snippet(src)
            .into_iter()
            .filter(|f| f.rule_id == rule)
            .map(|f| (f.method, f.snippet))
            .collect()
    }

    #[test]
    fn substring_checks_do_not_validate_the_receiver() {
        let src = r#"class C {
    public void a(String cmd) { if (cmd.contains("ls")) { Runtime.getRuntime().exec(cmd); } }
    public void b(String cmd) { if (ALLOWED.contains(cmd)) { Runtime.getRuntime().exec(cmd); } }
}"#;
        assert_eq!(hits(src, "command_injection"), vec![("a".to_string(), "Runtime.getRuntime().exec(cmd)".to_string())]);
    }

    #[test]
    fn redirect_targets_from_request_are_flagged() {
        let src = r#"class C {
    protected void a(HttpServletRequest req, HttpServletResponse resp) {
        resp.sendRedirect("/home?next=" + req.getParameter("next"));
    }
    protected void b(HttpServletRequest req, HttpServletResponse resp) {
        String next = req.getParameter("next");
        if (isAllowedTarget(next)) { resp.sendRedirect(next); }
        resp.sendRedirect("/login");
    }
}"#;
        let found = hits(src, "open_redirect");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "a");
    }

    #[test]
    fn only_streams_fed_by_untrusted_input_are_flagged() {
        let src = r#"class C {
    protected void a(HttpServletRequest req) throws Exception {
        ObjectInputStream in = new ObjectInputStream(req.getInputStream());
        Object o = in.readObject();
    }
    private Object b() throws Exception {
        ObjectInputStream in = new ObjectInputStream(new FileInputStream("cache.bin"));
        return in.readObject();
    }
    protected void c(HttpServletRequest req) throws Exception {
        ValidatingObjectInputStream in = new ValidatingObjectInputStream(req.getInputStream());
        Object o = in.readObject();
    }
}"#;
        assert_eq!(hits(src, "insecure_deserialization"), vec![("a".to_string(), "in.readObject()".to_string())]);
    }
}
