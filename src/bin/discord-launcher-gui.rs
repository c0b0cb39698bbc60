use std::process::ExitCode;

use clap::Parser;

use discord_launcher::gui::{run_gui, GuiCli};
use discord_launcher::logging::setup_logger;

fn main() -> ExitCode {
    let args = GuiCli::parse();
    setup_logger(args.global.log_level.0);

    let result = args
        .global
        .config_path()
        .and_then(|path| run_gui(path, args.mode));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
