use crate::errors::SnareResult;
use crate::rules::{CATALOG, RuleSet};
use crate::utils::config::Config;
use console::style;
use std::fmt::Write as _;
use std::process::ExitCode;

pub fn handle(verbose: bool, config: &Config) -> SnareResult<ExitCode> {
    let active = RuleSet::from_config(&config.rules)?;
    print!("{}", render(verbose, &active));
    Ok(ExitCode::SUCCESS)
}

fn render(verbose: bool, active: &RuleSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("Rules").blue().bold().underlined());

    for rule in CATALOG {
        let meta = rule.meta();
        let state = if active.contains(meta.id) {
            style("enabled").green()
        } else {
            style("disabled").dim()
        };
        let _ = writeln!(out, "  {:32} [{}]  {}", style(meta.id).white().bold(), meta.severity, state);

        if verbose {
            let _ = writeln!(out, "    {:12} {}", style("What"), meta.description);
            let _ = writeln!(out, "    {:12} {}", style("Fix"), meta.remediation);
        }
    }
    out
}

#[test]
fn listing_marks_disabled_rules() {
    let mut cfg = Config::default();
    cfg.rules.disabled = vec!["hardcoded_secret".into()];
    let active = RuleSet::from_config(&cfg.rules).unwrap();
    let text = console::strip_ansi_codes(&render(true, &active)).into_owned();

    let line = text.lines().find(|l| l.contains("hardcoded_secret")).unwrap();
    assert!(line.contains("disabled"));
    let line = text.lines().find(|l| l.contains("command_injection")).unwrap();
    assert!(line.contains("enabled"));
    assert!(text.contains("PreparedStatement"));
}
