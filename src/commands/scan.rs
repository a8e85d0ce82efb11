use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::engine::{Input, Scanner};
use crate::errors::SnareResult;
use crate::report::Report;
use crate::rules::Severity;
use crate::utils::config::{Config, OutputFormat};

pub struct ScanArgs {
    pub paths: Vec<String>,
    pub rules: Vec<String>,
    pub disable: Vec<String>,
    pub format: Option<OutputFormat>,
    pub min_severity: Option<Severity>,
    pub fail_on: Option<Severity>,
    pub max_results: Option<usize>,
    pub stdin_name: String,
}

/// Entry point called by the CLI.
pub fn handle(args: ScanArgs, config: Config) -> SnareResult<ExitCode> {
    let format = args.format.unwrap_or(config.output.default_format);
    let (report, fail_on) = run(args, config, std::io::stdin().lock())?;

    match format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.render_json()?),
    }

    if report.fails(fail_on) {
        tracing::debug!("findings at or above {} reported", fail_on.as_str());
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

/// Command-line flags win over the config file.
fn apply_overrides(args: &ScanArgs, config: &mut Config) {
    if !args.rules.is_empty() {
        config.rules.enabled = args.rules.clone();
    }
    config.rules.disabled.extend(args.disable.iter().cloned());
    if let Some(sev) = args.min_severity {
        config.scanner.min_severity = sev;
    }
    if let Some(sev) = args.fail_on {
        config.output.fail_on = sev;
    }
    if args.max_results.is_some() {
        config.output.max_results = args.max_results;
    }
}

/// Read every input (stdin included) up front, then scan.
fn run(args: ScanArgs, mut config: Config, mut stdin: impl Read) -> SnareResult<(Report, Severity)> {
    apply_overrides(&args, &mut config);
    let fail_on = config.output.fail_on;
    let scanner = Scanner::new(config)?;

    let (from_stdin, on_disk): (Vec<_>, Vec<_>) = args.paths.iter().partition(|p| p.as_str() == "-");
    let on_disk: Vec<PathBuf> = on_disk.into_iter().map(PathBuf::from).collect();

    let mut inputs = Vec::new();
    if !from_stdin.is_empty() {
        let mut bytes = Vec::new();
        stdin.read_to_end(&mut bytes)?;
        inputs.push(Input::from_bytes(args.stdin_name.clone(), bytes));
    }
    inputs.extend(scanner.expand(&on_disk).iter().map(|p| Input::read(p)));
    tracing::debug!("{} inputs read", inputs.len());

    let results = scanner.scan_inputs(&inputs);
    Ok((scanner.report(results), fail_on))
}

#[cfg(test)]
fn args(paths: &[&str]) -> ScanArgs {
    ScanArgs {
        paths: paths.iter().map(|p| p.to_string()).collect(),
        rules: vec![],
        disable: vec![],
        format: None,
        min_severity: None,
        fail_on: None,
        max_results: None,
        stdin_name: "stdin.java".into(),
    }
}

#[test]
fn dash_reads_stdin_under_the_given_name() {
    let src = include_str!("../../demos/servlet/Vulnerable.java");
    let mut a = args(&["-"]);
    a.stdin_name = "Upload.java".into();
    let (report, fail_on) = run(a, Config::default(), src.as_bytes()).unwrap();
    assert_eq!(fail_on, Severity::Low);
    assert_eq!(report.summary.total, 9);
    assert!(report.findings.iter().all(|f| f.file == "Upload.java"));
    assert!(report.fails(fail_on));
}

#[test]
fn flags_override_config() {
    let src = include_str!("../../demos/servlet/Vulnerable.java");
    let mut a = args(&["-"]);
    a.rules = vec!["command_injection".into(), "public_mutable_field".into()];
    a.disable = vec!["public_mutable_field".into()];
    a.fail_on = Some(Severity::Critical);
    let err = run(a, Config::default(), src.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("both enabled and disabled"));

    let mut a = args(&["-"]);
    a.min_severity = Some(Severity::High);
    a.fail_on = Some(Severity::Critical);
    a.max_results = Some(3);
    let (report, fail_on) = run(a, Config::default(), src.as_bytes()).unwrap();
    assert_eq!(fail_on, Severity::Critical);
    assert_eq!(report.findings.len(), 3);
    assert!(report.findings.iter().all(|f| f.severity >= Severity::High));
}

#[test]
fn hardened_source_passes() {
    let src = include_str!("../../demos/hardened/Hardened.java");
    let (report, fail_on) = run(args(&["-"]), Config::default(), src.as_bytes()).unwrap();
    assert!(!report.fails(fail_on));
}
