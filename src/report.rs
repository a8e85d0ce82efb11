use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use console::style;
use serde::Serialize;

use crate::errors::ParseError;
use crate::model::Span;
use crate::rules::Severity;

/// One rule match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub file: String,
    /// Enclosing method, or the class for declaration-level findings.
    pub method: String,
    pub span: Span,
    pub snippet: String,
    pub remediation: &'static str,
}

/// Severity descending, then method, then line; ties broken by file,
/// column and rule id so the order never depends on scheduling.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.method.cmp(&b.method))
            .then_with(|| a.span.line.cmp(&b.span.line))
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.span.col.cmp(&b.span.col))
            .then_with(|| a.rule_id.cmp(b.rule_id))
    });
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Scanned(Vec<Finding>),
    Failed(ParseError),
    Cancelled(String),
}

/// What happened to one input.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitResult {
    pub file: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileStatus {
    Scanned { matches: usize },
    Failed { reason: String },
    Cancelled { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub file: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_severity: BTreeMap<&'static str, usize>,
    pub by_rule: BTreeMap<&'static str, usize>,
    pub files_scanned: usize,
    pub files_failed: usize,
    pub files_cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub files: Vec<FileEntry>,
    pub summary: Summary,
}

impl Report {
    pub fn build(results: Vec<UnitResult>, min_severity: Severity, max_results: Option<usize>) -> Self {
        let mut files = Vec::with_capacity(results.len());
        let mut findings = Vec::new();

        for UnitResult { file, outcome } in results {
            let status = match outcome {
                Outcome::Scanned(found) => {
                    let matches = found.len();
                    findings.extend(found);
                    FileStatus::Scanned { matches }
                }
                Outcome::Failed(e) => {
                    tracing::warn!(file = %file, "skipped: {e}");
                    FileStatus::Failed { reason: e.to_string() }
                }
                Outcome::Cancelled(reason) => {
                    tracing::warn!(file = %file, "abandoned: {reason}");
                    FileStatus::Cancelled { reason }
                }
            };
            files.push(FileEntry { file, status });
        }
        files.sort_by(|a, b| a.file.cmp(&b.file));

        let before = findings.len();
        findings.retain(|f| f.severity >= min_severity);
        if findings.len() < before {
            tracing::debug!("{} findings below {} not reported", before - findings.len(), min_severity.as_str());
        }

        sort_findings(&mut findings);
        if let Some(max) = max_results {
            if findings.len() > max {
                tracing::debug!("{} findings beyond max_results={max} not reported", findings.len() - max);
                findings.truncate(max);
            }
        }

        let mut summary = Summary { total: findings.len(), ..Summary::default() };
        for f in &findings {
            *summary.by_severity.entry(f.severity.as_str()).or_default() += 1;
            *summary.by_rule.entry(f.rule_id).or_default() += 1;
        }
        for entry in &files {
            match entry.status {
                FileStatus::Scanned { .. } => summary.files_scanned += 1,
                FileStatus::Failed { .. } => summary.files_failed += 1,
                FileStatus::Cancelled { .. } => summary.files_cancelled += 1,
            }
        }

        Self { findings, files, summary }
    }

    /// Any reported finding at or above `threshold`.
    pub fn fails(&self, threshold: Severity) -> bool {
        self.findings.iter().any(|f| f.severity >= threshold)
    }

    pub fn rule_ids(&self) -> BTreeSet<&'static str> {
        self.findings.iter().map(|f| f.rule_id).collect()
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();

        for f in &self.findings {
            let _ = writeln!(
                out,
                "{}:{}:{}  [{}]  {}  ({})",
                style(&f.file).blue().underlined(),
                f.span.line,
                f.span.col,
                f.severity,
                style(f.rule_id).bold(),
                f.method,
            );
            let _ = writeln!(out, "    {}", style(&f.snippet).dim());
            let _ = writeln!(out, "    {}: {}\n", style("fix").green(), f.remediation);
        }

        for entry in &self.files {
            let (label, reason) = match &entry.status {
                FileStatus::Scanned { .. } => continue,
                FileStatus::Failed { reason } => (style("skipped").yellow().bold(), reason),
                FileStatus::Cancelled { reason } => (style("cancelled").yellow().bold(), reason),
            };
            let _ = writeln!(out, "{label}: {}: {reason}", entry.file);
        }

        let s = &self.summary;
        let counts: Vec<String> = Severity::ALL
            .iter()
            .filter_map(|sev| s.by_severity.get(sev.as_str()).map(|n| format!("{n} {}", sev.as_str())))
            .collect();
        let _ = write!(
            out,
            "{} {} finding{}",
            style("Found").bold(),
            s.total,
            if s.total == 1 { "" } else { "s" }
        );
        if !counts.is_empty() {
            let _ = write!(out, " ({})", counts.join(", "));
        }
        let _ = writeln!(
            out,
            " in {} file{}, {} skipped, {} cancelled.",
            s.files_scanned,
            if s.files_scanned == 1 { "" } else { "s" },
            s.files_failed,
            s.files_cancelled
        );
        out
    }
}

/// Rule ids present before and after a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub fixed: Vec<&'static str>,
    pub remaining: Vec<&'static str>,
    pub introduced: Vec<&'static str>,
}

impl Comparison {
    pub fn between(before: &Report, after: &Report) -> Self {
        let (old, new) = (before.rule_ids(), after.rule_ids());
        Self {
            fixed: old.difference(&new).copied().collect(),
            remaining: old.intersection(&new).copied().collect(),
            introduced: new.difference(&old).copied().collect(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (label, ids) in [
            (style("fixed").green().bold(), &self.fixed),
            (style("remaining").yellow().bold(), &self.remaining),
            (style("introduced").red().bold(), &self.introduced),
        ] {
            let list = if ids.is_empty() { "-".to_owned() } else { ids.join(", ") };
            let _ = writeln!(out, "{label}: {list}");
        }
        out
    }
}

#[cfg(test)]
fn finding(rule_id: &'static str, severity: Severity, method: &str, line: usize) -> Finding {
    Finding {
        rule_id,
        severity,
        file: "A.java".into(),
        method: method.into(),
        span: Span { line, col: 1, end_line: line, end_col: 2, ..Span::default() },
        snippet: String::new(),
        remediation: "",
    }
}

#[test]
fn findings_sort_by_severity_then_method_then_line() {
    let results = vec![UnitResult {
        file: "A.java".into(),
        outcome: Outcome::Scanned(vec![
            finding("public_mutable_field", Severity::Low, "User", 3),
            finding("unescaped_output", Severity::High, "doGet", 9),
            finding("command_injection", Severity::Critical, "run", 20),
            finding("unvalidated_path_use", Severity::High, "doGet", 4),
            finding("injection_via_concatenation", Severity::Critical, "getUser", 30),
        ]),
    }];
    let report = Report::build(results, Severity::Low, None);
    let order: Vec<_> = report.findings.iter().map(|f| f.rule_id).collect();
    assert_eq!(
        order,
        vec![
            "injection_via_concatenation",
            "command_injection",
            "unvalidated_path_use",
            "unescaped_output",
            "public_mutable_field",
        ]
    );
    assert_eq!(report.summary.by_severity.get("critical"), Some(&2));
}

#[test]
fn min_severity_and_max_results_trim_after_sorting() {
    let results = vec![UnitResult {
        file: "A.java".into(),
        outcome: Outcome::Scanned(vec![
            finding("public_mutable_field", Severity::Low, "User", 3),
            finding("possible_null_dereference", Severity::Medium, "f", 9),
            finding("command_injection", Severity::Critical, "run", 20),
        ]),
    }];
    let report = Report::build(results.clone(), Severity::Medium, None);
    assert_eq!(report.summary.total, 2);
    assert!(report.fails(Severity::Critical));

    let report = Report::build(results, Severity::Low, Some(1));
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].rule_id, "command_injection");
}

#[test]
fn degraded_files_are_listed_in_name_order() {
    let results = vec![
        UnitResult { file: "b.java".into(), outcome: Outcome::Failed(ParseError::new("b.java", 2, 1, "missing `}`")) },
        UnitResult { file: "c.java".into(), outcome: Outcome::Cancelled("per-file time budget exceeded".into()) },
        UnitResult { file: "a.java".into(), outcome: Outcome::Scanned(vec![]) },
    ];
    let report = Report::build(results, Severity::Low, None);
    let names: Vec<_> = report.files.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(names, vec!["a.java", "b.java", "c.java"]);
    assert_eq!((report.summary.files_scanned, report.summary.files_failed, report.summary.files_cancelled), (1, 1, 1));
    assert!(!report.fails(Severity::Low));

    let json = report.render_json().unwrap();
    assert!(json.contains(r#""status": "failed""#));
    assert!(json.contains("b.java:2:1: missing `}`"));
}

#[test]
fn comparison_splits_rule_ids() {
    let before = Report::build(
        vec![UnitResult {
            file: "A.java".into(),
            outcome: Outcome::Scanned(vec![
                finding("command_injection", Severity::Critical, "run", 1),
                finding("public_mutable_field", Severity::Low, "User", 2),
            ]),
        }],
        Severity::Low,
        None,
    );
    let after = Report::build(
        vec![UnitResult {
            file: "A.java".into(),
            outcome: Outcome::Scanned(vec![
                finding("public_mutable_field", Severity::Low, "User", 2),
                finding("possible_null_dereference", Severity::Medium, "run", 4),
            ]),
        }],
        Severity::Low,
        None,
    );
    let cmp = Comparison::between(&before, &after);
    assert_eq!(cmp.fixed, vec!["command_injection"]);
    assert_eq!(cmp.remaining, vec!["public_mutable_field"]);
    assert_eq!(cmp.introduced, vec!["possible_null_dereference"]);
}
