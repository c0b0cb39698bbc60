//! Command-line front-end: argument definitions, dispatch and exit codes.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::{default_config_path, default_launcher_path, ConfigError, LauncherConfig};
use crate::error::{ErrorKind, LauncherError};
use crate::launcher::{Launcher, UpdateOptions, UpdateOutcome};
use crate::logging::LogLevel;
use crate::process::RunOptions;
use crate::update::UpdateStatus;

pub const EXIT_UPDATE_AVAILABLE: u8 = 10;
pub const EXIT_NOT_INSTALLED: u8 = 11;
pub const EXIT_CHANNEL_MISMATCH: u8 = 12;
pub const EXIT_INSTALLED_NEWER: u8 = 13;

/// Flags shared by the CLI and the GUI binary.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Use a custom config location.
    #[arg(short, long, value_name = "CONFIG FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level: debug, info, warn or error.
    #[arg(short = 'v', long, value_name = "LEVEL", default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl GlobalArgs {
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(default_config_path()?),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "discord-launcher",
    version,
    about = "Launch and auto-update Discord.",
    after_help = "Arguments after `--` (or any unrecognized ones) are passed to Discord and \
                  override the configured launch options."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, Args)]
pub struct UpdateArgs {
    /// Install even if no existing install is found or it isn't older than
    /// the latest version.
    #[arg(short = 'f', long = "force-update")]
    pub force: bool,

    /// Allow updating from a different channel if the config changed.
    #[arg(short = 'C', long)]
    pub allow_channel_swap: bool,
}

impl From<&UpdateArgs> for UpdateOptions {
    fn from(args: &UpdateArgs) -> Self {
        UpdateOptions {
            force: args.force,
            allow_channel_swap: args.allow_channel_swap,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Return as soon as Discord has started instead of waiting for it to exit.
    #[arg(long)]
    pub detach: bool,

    /// Launch even if another instance appears to be running.
    #[arg(long)]
    pub ignore_running: bool,

    /// Arguments passed to Discord.
    #[arg(
        value_name = "DISCORD ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub discord_args: Vec<String>,
}

impl RunArgs {
    fn options(&self, config: &LauncherConfig) -> RunOptions {
        RunOptions {
            ignore_running: self.ignore_running,
            wait: config.wait_for_exit && !self.detach,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the latest Discord version number.
    LatestVersion,
    /// Print the installed Discord version number.
    InstalledVersion,
    /// Print the installed Discord release channel.
    InstalledChannel,
    /// Check if the installed Discord has an update available.
    CheckUpdates,
    /// Stop a running Discord started by this launcher.
    Stop,
    /// Update Discord if there is an update available.
    Update(UpdateArgs),
    /// Run the installed Discord without updating.
    Run(RunArgs),
    /// Update if there is an update available, then run Discord.
    UpdateRun {
        #[command(flatten)]
        update: UpdateArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Install Discord. An existing installation WILL be removed.
    Install,
    /// Install a desktop entry. Discord must be installed first.
    InstallDesktopEntry,
    /// Remove the installation and the desktop entry.
    Uninstall,
}

/// Read the config, creating a default one if it is missing.
pub fn load_config(path: &Path) -> anyhow::Result<LauncherConfig> {
    let config = LauncherConfig::load_or_init(path, default_launcher_path())?;
    if let Err(ConfigError::Invalid(problems)) = config.validate() {
        for problem in problems {
            log::warn!("Config {}: {}", path.display(), problem);
        }
    }
    Ok(config)
}

pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.global.config_path()?;
    let config = load_config(&config_path)?;
    let launcher = Launcher::from_config(config)?;
    dispatch(&launcher, &cli.command)
}

pub fn dispatch(launcher: &Launcher, command: &Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::LatestVersion => {
            println!("{}", launcher.latest_version()?);
        }
        Command::InstalledVersion => {
            let version = launcher.installed_version()?.ok_or_else(|| not_installed(launcher))?;
            println!("{version}");
        }
        Command::InstalledChannel => {
            let channel = launcher.installed_channel()?.ok_or_else(|| not_installed(launcher))?;
            println!("{channel}");
        }
        Command::CheckUpdates => return Ok(report_status(launcher.check_updates()?, launcher)),
        Command::Stop => {
            let pid = launcher.stop()?;
            log::info!("Stopped Discord (pid {})", pid);
        }
        Command::Update(args) => match launcher.update(args.into())? {
            UpdateOutcome::AlreadyLatest(version) => {
                println!("Discord {version} is already the latest version.");
            }
            UpdateOutcome::Updated { from, to } => match from {
                Some(from) => println!("Updated Discord {} from {from} to {}.", to.channel, to.version),
                None => println!("Installed Discord {} {}.", to.channel, to.version),
            },
        },
        Command::Run(args) => {
            let outcome = launcher.run(&args.discord_args, args.options(launcher.config()))?;
            log::debug!("Discord run finished: {:?}", outcome);
        }
        Command::UpdateRun { update, run } => {
            let outcome = launcher.update_run(
                update.into(),
                &run.discord_args,
                run.options(launcher.config()),
            )?;
            log::debug!("Discord run finished: {:?}", outcome);
        }
        Command::Install => {
            let path = &launcher.config().discord_path;
            if path.exists() {
                println!("Replacing the existing installation at {}", path.display());
            }
            let state = launcher.install()?;
            println!("Installed Discord {} {}.", state.channel, state.version);
        }
        Command::InstallDesktopEntry => {
            let path = launcher
                .install_desktop_entry()
                .context("failed to install desktop entry")?;
            println!("Desktop entry written to {}", path.display());
        }
        Command::Uninstall => {
            launcher.uninstall()?;
            println!("Discord uninstalled.");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn not_installed(launcher: &Launcher) -> LauncherError {
    LauncherError::Precheck(format!(
        "Discord is not installed at \"{}\"",
        launcher.config().discord_path.display()
    ))
}

fn report_status(status: UpdateStatus, launcher: &Launcher) -> ExitCode {
    let channel = launcher.config().release_channel;
    match status {
        UpdateStatus::UpToDate { version } => {
            println!(
                "The installed version of Discord {channel} is {version}, which is the latest available version."
            );
            ExitCode::SUCCESS
        }
        UpdateStatus::UpdateAvailable { installed, latest } => {
            println!(
                "There is an update available for Discord {channel}. Installed version is {installed} and latest available version is {latest}."
            );
            ExitCode::from(EXIT_UPDATE_AVAILABLE)
        }
        UpdateStatus::NotInstalled => {
            println!(
                "Discord is not installed at {}.",
                launcher.config().discord_path.display()
            );
            ExitCode::from(EXIT_NOT_INSTALLED)
        }
        UpdateStatus::ChannelMismatch {
            installed,
            configured,
        } => {
            println!(
                "The installed version of Discord is of the release channel {}, version {}, but the config specifies release channel {configured}.",
                installed.channel, installed.version
            );
            ExitCode::from(EXIT_CHANNEL_MISMATCH)
        }
        UpdateStatus::InstalledNewer { installed, latest } => {
            println!(
                "The installed version of Discord {channel} is {installed}, newer than the latest available version {latest}."
            );
            ExitCode::from(EXIT_INSTALLED_NEWER)
        }
    }
}

pub fn kind_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Config => 1,
        ErrorKind::Network => 3,
        ErrorKind::Parse => 4,
        ErrorKind::AlreadyRunning => 5,
        ErrorKind::NotRunning => 6,
        ErrorKind::Filesystem => 7,
        ErrorKind::Precheck => 8,
        ErrorKind::Process => 9,
    }
}

/// Exit code for an error that reached `main`.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<LauncherError>())
        .map_or(1, |e| kind_exit_code(e.kind()))
}
