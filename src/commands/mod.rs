pub mod compare;
pub mod config;
pub mod rules;
pub mod scan;

use crate::cli::Commands;
use crate::errors::SnareResult;
use crate::utils::config::Config;
use std::process::ExitCode;

pub fn handle_command(command: Commands, config: Config) -> SnareResult<ExitCode> {
    match command {
        Commands::Scan {
            paths,
            rules,
            disable,
            format,
            min_severity,
            fail_on,
            max_results,
            stdin_name,
        } => {
            let args = scan::ScanArgs {
                paths,
                rules,
                disable,
                format,
                min_severity,
                fail_on,
                max_results,
                stdin_name,
            };
            scan::handle(args, config)
        }
        Commands::Rules { verbose } => rules::handle(verbose, &config),
        Commands::Compare { before, after, format } => compare::handle(&before, &after, format, config),
        Commands::Config => config::handle(&config),
    }
}
