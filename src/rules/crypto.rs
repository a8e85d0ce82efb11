use crate::errors::RuleError;
use crate::labels::Cap;
use crate::model::{CallKind, Expr, Span};
use crate::rules::{FieldCx, Rule, RuleMeta, Severity, StmtCx};

pub struct WeakCipherSelection;
pub struct HardcodedSecret;
pub struct WeakRandomness;

static WEAK_CIPHER: RuleMeta = RuleMeta {
    id: "weak_cipher_selection",
    description: "A broken cipher or cipher mode is requested by name",
    severity: Severity::High,
    remediation: "Use AES/GCM/NoPadding (or ChaCha20-Poly1305) with a random IV.",
};

static SECRET: RuleMeta = RuleMeta {
    id: "hardcoded_secret",
    description: "A secret is embedded in source as a string literal",
    severity: Severity::High,
    remediation: "Load the secret from a key store, environment variable or secrets manager at runtime.",
};

static WEAK_RANDOM: RuleMeta = RuleMeta {
    id: "weak_randomness",
    description: "A predictable random number generator is used",
    severity: Severity::Medium,
    remediation: "Use java.security.SecureRandom for tokens, keys, IVs and anything security relevant.",
};

impl Rule for WeakCipherSelection {
    fn meta(&self) -> &'static RuleMeta {
        &WEAK_CIPHER
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for e in cx.stmt.exprs() {
            for (_, call) in e.calls() {
                if !cx.labels.sink_caps(&call.path()).contains(Cap::CIPHER) {
                    continue;
                }
                let Some(first) = call.args.first() else {
                    return Err(RuleError::new(
                        WEAK_CIPHER.id,
                        format!("`{}` called without an algorithm", call.path()),
                    ));
                };
                // a non-literal transform cannot be judged syntactically
                let Some(transform) = first.as_str_literal() else { continue };
                let weak = transform.split('/').any(|part| {
                    cx.heuristics
                        .weak_ciphers
                        .iter()
                        .any(|w| w.eq_ignore_ascii_case(part.trim()))
                });
                if weak {
                    out.push(first.span);
                }
            }
        }
        Ok(())
    }
}

impl Rule for HardcodedSecret {
    fn meta(&self) -> &'static RuleMeta {
        &SECRET
    }

    fn check_field(&self, cx: &FieldCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        let Some(value) = cx.field.init.as_ref().and_then(|e| e.as_str_literal()) else {
            return Ok(());
        };
        if value.is_empty() {
            return Ok(());
        }
        let name = cx.field.name.to_ascii_lowercase();
        if cx
            .heuristics
            .secret_names
            .iter()
            .any(|w| name.contains(&w.to_ascii_lowercase()))
        {
            out.push(cx.field.span);
        }
        Ok(())
    }
}

impl Rule for WeakRandomness {
    fn meta(&self) -> &'static RuleMeta {
        &WEAK_RANDOM
    }

    fn check_statement(&self, cx: &StmtCx<'_>, out: &mut Vec<Span>) -> Result<(), RuleError> {
        for e in cx.stmt.exprs() {
            for (expr, call) in e.calls() {
                let path = call.path();
                // `new Random(..)` or the static `Math.random()`, not any method named `random`
                let generator = call.kind == CallKind::Construct
                    || call.receiver.as_deref().and_then(Expr::as_identifier) == Some("Math");
                if generator && cx.labels.sink_caps(&path).contains(Cap::RANDOM) {
                    out.push(expr.span);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::matcher::scan_snippet;

    #[test]
    fn aes_gcm_is_not_flagged_but_des_prefix_names_are_exact() {
        let src = r#"
            class C {
                void ok() throws Exception {
                    Cipher a = Cipher.getInstance("AES/GCM/NoPadding");
                    Cipher b = Cipher.getInstance("DESX/CBC/PKCS5Padding");
                }
                void bad() throws Exception {
                    Cipher c = Cipher.getInstance("AES/ECB/PKCS5Padding");
                    Cipher d = Cipher.getInstance("rc4");
                }
            }"#;
        let findings = scan_snippet(src);
        let hits: Vec<_> = findings.iter().map(|f| (f.method.as_str(), f.snippet.as_str())).collect();
        assert_eq!(hits, vec![("bad", "\"AES/ECB/PKCS5Padding\""), ("bad", "\"rc4\"")]);
    }

    #[test]
    fn cipher_call_without_arguments_skips_rule_for_that_method_only() {
        let src = r#"
            class C {
                void broken() throws Exception {
                    Cipher x = Cipher.getInstance();
                    Cipher y = Cipher.getInstance("DES");
                }
                void other() throws Exception {
                    Cipher z = Cipher.getInstance("DES");
                }
            }"#;
        let findings = scan_snippet(src);
        let methods: Vec<_> = findings.iter().map(|f| f.method.as_str()).collect();
        assert_eq!(methods, vec!["other"]);
    }

    #[test]
    fn secret_fields_need_a_non_empty_literal() {
        let src = r#"
            class C {
                private static final String API_TOKEN = "abc123";
                private String passwordHint = "";
                private String secret = loadSecret();
                private static final String GREETING = "hello";
            }"#;
        let findings = scan_snippet(src);
        let hits: Vec<_> = findings.iter().map(|f| (f.rule_id, f.snippet.as_str())).collect();
        assert_eq!(hits, vec![("hardcoded_secret", "API_TOKEN")]);
    }

    #[test]
    fn util_random_is_flagged_but_secure_random_is_not() {
        let src = r#"
            class C {
                String token() {
                    Random rnd = new Random();
                    SecureRandom ok = new SecureRandom();
                    double d = Math.random();
                    int n = picker.random();
                    return Long.toHexString(new java.util.Random(42).nextLong());
                }
            }"#;
        let hits: Vec<_> = scan_snippet(src)
            .into_iter()
            .filter(|f| f.rule_id == "weak_randomness")
            .map(|f| f.snippet)
            .collect();
        assert_eq!(hits, vec!["new Random()", "Math.random()", "new java.util.Random(42)"]);
    }
}
