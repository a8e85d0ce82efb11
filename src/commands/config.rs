use crate::errors::SnareResult;
use crate::utils::config::Config;
use std::process::ExitCode;

/// Print the merged configuration as TOML, after validating it.
pub fn handle(config: &Config) -> SnareResult<ExitCode> {
    config.validate()?;
    let text = config
        .to_toml()
        .map_err(|e| crate::errors::SnareError::Other(format!("cannot render config: {e}")))?;
    print!("{text}");
    Ok(ExitCode::SUCCESS)
}
