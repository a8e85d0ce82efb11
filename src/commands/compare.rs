use std::path::Path;
use std::process::ExitCode;

use crate::engine::Scanner;
use crate::errors::SnareResult;
use crate::report::Comparison;
use crate::utils::config::{Config, OutputFormat};

/// Scan a vulnerable and a mitigated version of the same code. Exits 1 when
/// the mitigated version introduces a rule the original did not trigger.
pub fn handle(before: &Path, after: &Path, format: Option<OutputFormat>, config: Config) -> SnareResult<ExitCode> {
    let format = format.unwrap_or(config.output.default_format);
    let cmp = compare(before, after, config)?;

    match format {
        OutputFormat::Text => print!("{}", cmp.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cmp)?),
    }
    Ok(if cmp.introduced.is_empty() { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

fn compare(before: &Path, after: &Path, config: Config) -> SnareResult<Comparison> {
    let scanner = Scanner::new(config)?;
    let old = scanner.report(scanner.scan_paths(&[before.to_path_buf()]));
    let new = scanner.report(scanner.scan_paths(&[after.to_path_buf()]));
    tracing::debug!(before = old.summary.total, after = new.summary.total, "compared");
    Ok(Comparison::between(&old, &new))
}

#[test]
fn hardened_fixture_fixes_every_rule() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    let cmp = compare(
        &root.join("servlet/Vulnerable.java"),
        &root.join("hardened/Hardened.java"),
        Config::default(),
    )
    .unwrap();
    assert_eq!(cmp.fixed.len(), 8);
    assert!(cmp.remaining.is_empty());
    assert!(cmp.introduced.is_empty());
}
