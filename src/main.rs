// main.rs: argument parsing and exit codes only. Everything else lives in the library.
use std::process::ExitCode;

use clap::Parser;

use discord_launcher::cli::{self, Cli};
use discord_launcher::logging::setup_logger;

fn main() -> ExitCode {
    let args = Cli::parse();
    setup_logger(args.global.log_level.0);

    match cli::execute(args) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(cli::exit_code(&err))
        }
    }
}
