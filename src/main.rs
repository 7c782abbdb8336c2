use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context;
use show_files::config::{RunConfig, USAGE};
use show_files::run_report;

fn main() -> ExitCode {
    env_logger::init();

    let config = match RunConfig::from_args(std::env::args_os().skip(1)) {
        Ok(Some(config)) => config,
        Ok(None) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => e.exit(),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = run_report(&config, &mut out)
        .and_then(|()| out.flush().context("flushing standard output"));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Keep whatever was printed before the failure.
            if let Err(flush_error) = out.flush() {
                log::warn!("Could not flush standard output: {flush_error}");
            }
            eprintln!("Error reading image: {e:#}");
            eprintln!("{e:?}");
            ExitCode::FAILURE
        }
    }
}
