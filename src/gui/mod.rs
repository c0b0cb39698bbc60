//! egui front-end: a setup window over the same config and operations as the
//! CLI, plus headless `run`/`update-run` modes for the desktop entry.

mod app;
mod settings;
pub mod task;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use eframe::egui;

use crate::cli::GlobalArgs;
use crate::config::{default_launcher_path, ConfigError, LauncherConfig};
use crate::error::LauncherError;
use crate::launcher::{Launcher, UpdateOptions, UpdateOutcome};

pub use app::{SetupApp, Tab};

#[derive(Debug, Parser)]
#[command(
    name = "discord-launcher-gui",
    version,
    about = "Set up, launch and auto-update Discord."
)]
pub struct GuiCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub mode: Option<GuiMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum GuiMode {
    /// Open the settings editor.
    EditConfig,
    /// Run Discord without updating.
    Run,
    /// Update Discord after confirmation.
    Update,
    /// Update if needed, then run Discord.
    UpdateRun,
}

/// Config as the GUI sees it: defaults stand in for a file that is missing
/// or broken, and automatic actions are held until the user saves.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LauncherConfig,
    pub notice: Option<String>,
}

impl LoadedConfig {
    pub fn load(path: &Path) -> Self {
        let err = match LauncherConfig::load(path) {
            Ok(config) => return LoadedConfig { config, notice: None },
            Err(err) => err,
        };
        let notice = match &err {
            ConfigError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                "No configuration exists yet.\nA new config has been generated for you.\nPlease save it before continuing."
                    .to_string()
            }
            ConfigError::Parse { .. } => format!(
                "Failed to parse the existing configuration:\n{err}\n\nA new config has been generated for you.\nIf this is acceptable, please save it before continuing.\nIf not, close this app without saving and edit the config at {}.",
                path.display()
            ),
            _ => format!(
                "Failed to read the existing configuration:\n{err}\n\nA new config has been generated for you.\nPlease save it before continuing."
            ),
        };
        log::warn!("{}", err);
        LoadedConfig {
            config: LauncherConfig::defaults_for(path, default_launcher_path()),
            notice: Some(notice),
        }
    }

    /// Problems that block the setup actions.
    pub fn problems(&self) -> Vec<String> {
        match self.config.validate() {
            Ok(()) => Vec::new(),
            Err(ConfigError::Invalid(problems)) => problems,
            Err(other) => vec![other.to_string()],
        }
    }

    pub fn ready(&self) -> bool {
        self.notice.is_none() && self.problems().is_empty()
    }
}

/// Operations reachable from the setup window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    UpdateRun,
    Run,
    Update,
    Install,
    Uninstall,
    InstallDesktopEntry,
    UninstallDesktopEntry,
    Stop,
}

impl Action {
    /// Used in "An error occurred while ..." and progress labels.
    pub fn describe(self) -> &'static str {
        match self {
            Action::UpdateRun => "updating and running Discord",
            Action::Run => "running Discord",
            Action::Update => "updating Discord",
            Action::Install => "installing Discord",
            Action::Uninstall => "uninstalling Discord",
            Action::InstallDesktopEntry => "installing the desktop entry",
            Action::UninstallDesktopEntry => "removing the desktop entry",
            Action::Stop => "stopping Discord",
        }
    }

    /// Question to ask before running the action, and how long the accept
    /// button stays disabled.
    pub fn confirmation(self, config: &LauncherConfig) -> Option<(String, Duration)> {
        match self {
            Action::Update => Some((
                "Are you sure you want to update Discord?".to_string(),
                Duration::ZERO,
            )),
            Action::Install => {
                let mut text = "Are you sure you want to install Discord?".to_string();
                if config.discord_path.exists() {
                    text.push_str("\nThis will REMOVE the Discord install directory!");
                }
                Some((text, Duration::ZERO))
            }
            Action::Uninstall => Some((
                "Are you sure you want to uninstall Discord?".to_string(),
                Duration::from_millis(1250),
            )),
            _ => None,
        }
    }
}

/// Run `action` to completion. `Ok(Some(_))` is a message for the user.
///
/// The GUI follows a configured channel change without asking, so updates
/// here allow a channel swap.
pub fn perform(action: Action, config: LauncherConfig) -> Result<Option<String>, LauncherError> {
    let launcher = Launcher::from_config(config)?;
    let update = UpdateOptions {
        force: false,
        allow_channel_swap: true,
    };
    let run = launcher.default_run_options();
    match action {
        Action::UpdateRun => {
            if let UpdateOutcome::Updated { to, .. } = launcher.update(update)? {
                log::info!("Discord has been updated to version {}", to.version);
            }
            launcher.run(&[], run)?;
            Ok(None)
        }
        Action::Run => {
            launcher.run(&[], run)?;
            Ok(None)
        }
        Action::Update => Ok(Some(match launcher.update(update)? {
            UpdateOutcome::AlreadyLatest(version) => format!(
                "Discord is already the latest version.\nLatest available version is {version}, which is installed."
            ),
            UpdateOutcome::Updated { to, .. } => {
                format!("Discord has been updated to version {}.", to.version)
            }
        })),
        Action::Install => {
            let state = launcher.install()?;
            Ok(Some(format!("Discord {} has been installed.", state.version)))
        }
        Action::Uninstall => {
            launcher.uninstall()?;
            Ok(Some("Discord has been uninstalled.".to_string()))
        }
        Action::InstallDesktopEntry => {
            let path = launcher.install_desktop_entry()?;
            Ok(Some(format!("Desktop entry written to {}.", path.display())))
        }
        Action::UninstallDesktopEntry => {
            launcher.uninstall_desktop_entry()?;
            Ok(Some("Desktop entry removed.".to_string()))
        }
        Action::Stop => {
            let pid = launcher.stop()?;
            Ok(Some(format!("Stopped Discord (pid {pid}).")))
        }
    }
}

/// What the window shows first.
#[derive(Debug, Default)]
pub struct Startup {
    pub tab: Option<Tab>,
    pub confirm: Option<Action>,
    pub error: Option<(Action, String)>,
}

pub fn run_gui(config_path: PathBuf, mode: Option<GuiMode>) -> anyhow::Result<()> {
    let loaded = LoadedConfig::load(&config_path);
    let mut startup = Startup::default();

    let automatic = match mode {
        Some(GuiMode::Run) => Some(Action::Run),
        Some(GuiMode::UpdateRun) => Some(Action::UpdateRun),
        Some(GuiMode::Update) => Some(Action::Update),
        Some(GuiMode::EditConfig) => {
            startup.tab = Some(Tab::Settings);
            None
        }
        None => None,
    };
    match automatic {
        Some(action) if !loaded.ready() => {
            log::warn!("Not {} until the configuration is fixed and saved", action.describe());
        }
        Some(Action::Update) => startup.confirm = Some(Action::Update),
        Some(action) => match perform(action, loaded.config.clone()) {
            // Nothing to show; the window never opens.
            Ok(_) => return Ok(()),
            Err(err) => {
                log::error!("Error while {}: {}", action.describe(), err);
                startup.error = Some((action, err.to_string()));
            }
        },
        None => {}
    }

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size((560.0, 600.0))
            .with_app_id("discord-launcher"),
        ..Default::default()
    };

    eframe::run_native(
        "Discord Launcher",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(SetupApp::new(
                config_path,
                loaded,
                startup,
                &cc.egui_ctx,
            )))
        }),
    )
    .map_err(|e| anyhow::anyhow!("failed to open the launcher window: {e}"))
}
