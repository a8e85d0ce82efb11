use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::errors::{ConfigError, ParseError};
use crate::extract;
use crate::labels::LabelSet;
use crate::matcher::{Cancel, Matcher};
use crate::report::{Outcome, Report, UnitResult};
use crate::rules::RuleSet;
use crate::utils::Config;
use crate::walk;

/// Source text read from disk or stdin. Reading fails per file, never for the whole scan.
#[derive(Debug, Clone)]
pub struct Input {
    pub id: String,
    pub text: Result<String, ParseError>,
}

impl Input {
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: Ok(text.into()) }
    }

    pub fn from_bytes(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        let id = id.into();
        let text = decode(&id, bytes);
        Self { id, text }
    }

    pub fn read(path: &Path) -> Self {
        let id = path.display().to_string();
        match std::fs::read(path) {
            Ok(bytes) => Self::from_bytes(id, bytes),
            Err(e) => {
                let text = Err(ParseError::unit(&id, format!("cannot read file: {e}")));
                Self { id, text }
            }
        }
    }
}

fn decode(id: &str, bytes: Vec<u8>) -> Result<String, ParseError> {
    let nuls = bytes.iter().filter(|b| **b == 0).count();
    if nuls > 0 && nuls * 100 > bytes.len() {
        return Err(ParseError::unit(id, "binary content"));
    }
    String::from_utf8(bytes).map_err(|e| {
        ParseError::unit(id, format!("not valid UTF-8 (byte offset {})", e.utf8_error().valid_up_to()))
    })
}

/// Owns the validated configuration and the tables derived from it. Safe to
/// share across worker threads.
pub struct Scanner {
    config: Config,
    rules: RuleSet,
    labels: LabelSet,
    cancelled: Arc<AtomicBool>,
}

impl Scanner {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let rules = RuleSet::from_config(&config.rules)?;
        let labels = LabelSet::new(&config.labels);
        tracing::debug!(rules = ?rules, "scanner ready");
        Ok(Self { config, rules, labels, cancelled: Arc::new(AtomicBool::new(false)) })
    }

    /// Setting this flag makes every file still being matched report `Cancelled`.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn file_cancel(&self) -> Cancel {
        let deadline = self
            .config
            .performance
            .scan_timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        Cancel::new(Some(self.cancel_handle()), deadline)
    }

    /// Parse and match one in-memory unit.
    pub fn scan_source(&self, id: &str, text: &str) -> UnitResult {
        let outcome = match extract::parse(id, text, &self.config.heuristics.tainted_parameter_types) {
            Err(e) => Outcome::Failed(e),
            Ok(unit) => {
                let matcher = Matcher::new(&self.rules, &self.labels, &self.config.heuristics);
                match matcher.scan(&unit, &self.file_cancel()) {
                    Ok(findings) => Outcome::Scanned(findings),
                    Err(reason) => Outcome::Cancelled(reason),
                }
            }
        };
        UnitResult { file: id.to_owned(), outcome }
    }

    /// Scan already-read inputs in parallel. Result order follows input order.
    pub fn scan_inputs(&self, inputs: &[Input]) -> Vec<UnitResult> {
        inputs
            .par_iter()
            .map(|input| match &input.text {
                Ok(text) => self.scan_source(&input.id, text),
                Err(e) => UnitResult { file: input.id.clone(), outcome: Outcome::Failed(e.clone()) },
            })
            .collect()
    }

    /// Expand directories, read every file, then scan.
    pub fn scan_paths(&self, paths: &[PathBuf]) -> Vec<UnitResult> {
        let inputs: Vec<Input> = self.expand(paths).iter().map(|p| Input::read(p)).collect();
        tracing::debug!("{} inputs read", inputs.len());
        self.scan_inputs(&inputs)
    }

    /// Files named explicitly are kept whatever their extension.
    pub fn expand(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for p in paths {
            if p.is_dir() {
                files.extend(walk::collect_paths(p, &self.config));
            } else {
                files.push(p.clone());
            }
        }
        files
    }

    pub fn report(&self, results: Vec<UnitResult>) -> Report {
        Report::build(results, self.config.scanner.min_severity, self.config.output.max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Finding;
    use crate::rules::Severity;

    const FIXTURE: &str = include_str!("../demos/servlet/Vulnerable.java");
    const HARDENED: &str = include_str!("../demos/hardened/Hardened.java");
    const LEGACY: &str = include_str!("../demos/servlet/Legacy.java");

    fn findings(scanner: &Scanner, id: &str, text: &str) -> Vec<Finding> {
        let report = scanner.report(vec![scanner.scan_source(id, text)]);
        report.findings
    }

    fn by_method<'a>(found: &'a [Finding], method: &str) -> Vec<&'a Finding> {
        found.iter().filter(|f| f.method == method).collect()
    }

    #[test]
    fn fixture_yields_one_finding_per_vulnerability() {
        let scanner = Scanner::new(Config::default()).unwrap();
        let found = findings(&scanner, "Vulnerable.java", FIXTURE);

        let get_user = by_method(&found, "getUser");
        assert_eq!(get_user.len(), 1);
        assert_eq!(get_user[0].rule_id, "injection_via_concatenation");
        assert_eq!(get_user[0].severity, Severity::Critical);
        assert_eq!(get_user[0].snippet, "\"SELECT * FROM users WHERE username = '\" + username + \"'\"");
        assert_eq!(get_user[0].span.line, 17);

        let do_get = by_method(&found, "doGet");
        assert_eq!(do_get.len(), 1);
        assert_eq!(do_get[0].rule_id, "unescaped_output");
        assert!(do_get[0].snippet.starts_with("\"<html><body>Welcome, \" + userInput"));

        let read_file = by_method(&found, "readFile");
        assert_eq!(read_file.len(), 1);
        assert_eq!(read_file[0].rule_id, "unvalidated_path_use");

        let encrypt = by_method(&found, "encryptData");
        assert_eq!(encrypt.len(), 1);
        assert_eq!(encrypt[0].rule_id, "weak_cipher_selection");
        assert_eq!(encrypt[0].snippet, "\"DES/ECB/PKCS5Padding\"");

        let class_level = by_method(&found, "Vulnerable");
        assert_eq!(class_level.len(), 1);
        assert_eq!(class_level[0].rule_id, "hardcoded_secret");
        assert_eq!(class_level[0].snippet, "ENCRYPTION_KEY");

        let exec = by_method(&found, "executeCommand");
        assert_eq!(exec.len(), 1);
        assert_eq!(exec[0].rule_id, "command_injection");

        let process = by_method(&found, "processUser");
        assert_eq!(process.len(), 1);
        assert_eq!(process[0].rule_id, "possible_null_dereference");
        assert_eq!(process[0].snippet, "user.getName()");

        let user: Vec<_> = by_method(&found, "User").iter().map(|f| (f.rule_id, f.snippet.as_str())).collect();
        assert_eq!(user, vec![("public_mutable_field", "name"), ("public_mutable_field", "password")]);

        assert_eq!(found.len(), 9);
        assert!(by_method(&found, "getName").is_empty());
    }

    #[test]
    fn legacy_fixture_yields_redirect_deserialization_and_randomness() {
        let scanner = Scanner::new(Config::default()).unwrap();
        let found = findings(&scanner, "Legacy.java", LEGACY);
        let hits: Vec<_> = found
            .iter()
            .map(|f| (f.rule_id, f.method.as_str(), f.snippet.as_str(), f.span.line))
            .collect();
        assert_eq!(
            hits,
            vec![
                ("insecure_deserialization", "doPost", "in.readObject()", 12),
                ("open_redirect", "doGet", "response.sendRedirect(\"/app/\" + next)", 19),
                ("weak_randomness", "newSessionToken", "new Random()", 24),
            ]
        );
    }

    #[test]
    fn repeated_scans_render_identically() {
        let scanner = Scanner::new(Config::default()).unwrap();
        let inputs = vec![
            Input::from_text("Vulnerable.java", FIXTURE),
            Input::from_text("Hardened.java", HARDENED),
            Input::from_text("Broken.java", "class Broken { void f() { "),
        ];
        let first = scanner.report(scanner.scan_inputs(&inputs));
        let second = scanner.report(scanner.scan_inputs(&inputs));
        assert_eq!(first.render_json().unwrap(), second.render_json().unwrap());
        assert_eq!(first.render_text(), second.render_text());
        assert_eq!(first.summary.files_failed, 1);
    }

    #[test]
    fn disabling_a_rule_removes_exactly_its_findings() {
        let all = findings(&Scanner::new(Config::default()).unwrap(), "Vulnerable.java", FIXTURE);

        let mut cfg = Config::default();
        cfg.rules.disabled = vec!["public_mutable_field".into()];
        let fewer = findings(&Scanner::new(cfg).unwrap(), "Vulnerable.java", FIXTURE);

        let expected: Vec<_> = all.into_iter().filter(|f| f.rule_id != "public_mutable_field").collect();
        assert_eq!(fewer, expected);
    }

    #[test]
    fn hardened_variant_has_no_findings() {
        let scanner = Scanner::new(Config::default()).unwrap();
        let found = findings(&scanner, "Hardened.java", HARDENED);
        assert!(found.is_empty(), "unexpected findings: {found:#?}");
    }

    #[test]
    fn malformed_and_binary_inputs_degrade_without_stopping_the_scan() {
        let scanner = Scanner::new(Config::default()).unwrap();
        let inputs = vec![
            Input::from_bytes("bin.java", vec![0u8; 64]),
            Input::from_bytes("latin1.java", b"class A { String s = \"caf\xe9\"; }".to_vec()),
            Input::from_text("Vulnerable.java", FIXTURE),
        ];
        let report = scanner.report(scanner.scan_inputs(&inputs));
        assert_eq!(report.summary.files_failed, 2);
        assert_eq!(report.summary.files_scanned, 1);
        assert_eq!(report.summary.total, 9);
    }

    #[test]
    fn unknown_rule_in_config_is_fatal() {
        let mut cfg = Config::default();
        cfg.rules.disabled = vec!["sql_injection".into()];
        assert!(matches!(Scanner::new(cfg), Err(ConfigError::UnknownRule(_))));
    }

    #[test]
    fn cancelled_scanner_marks_files_cancelled() {
        let scanner = Scanner::new(Config::default()).unwrap();
        scanner.cancel_handle().store(true, std::sync::atomic::Ordering::Relaxed);
        let result = scanner.scan_source("Vulnerable.java", FIXTURE);
        assert!(matches!(result.outcome, Outcome::Cancelled(_)));
    }

    #[test]
    fn scan_paths_walks_directories_and_reads_named_files() {
        let dir = tempfile::Builder::new().prefix("snare").tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/Vulnerable.java"), FIXTURE).unwrap();
        std::fs::write(dir.path().join("web/README.md"), "docs").unwrap();
        let missing = dir.path().join("Missing.java");

        let scanner = Scanner::new(Config::default()).unwrap();
        let results = scanner.scan_paths(&[dir.path().to_path_buf(), missing]);
        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0].outcome, Outcome::Scanned(f) if f.len() == 9));
        assert!(matches!(&results[1].outcome, Outcome::Failed(e) if e.reason.starts_with("cannot read file")));
    }
}
