use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::Channel;
use crate::config::LauncherConfig;
use crate::desktop::DesktopEntryInstaller;
use crate::error::{LauncherError, Result};
use crate::install::{InstallPolicy, InstalledState, Installer};
use crate::process::{ProcessController, RunOptions, RunOutcome};
use crate::update::{DiscordApi, ReleaseSource, UpdateChecker, UpdateStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Install even when nothing is installed, the installed version is the
    /// latest, or the installed version is newer than the remote one.
    pub force: bool,
    /// Allow replacing an install from another release channel.
    pub allow_channel_swap: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    AlreadyLatest(String),
    Updated {
        from: Option<String>,
        to: InstalledState,
    },
}

/// Entry point for both front-ends. Owns the config and the release source
/// and wires the update, install, process and desktop-entry components.
pub struct Launcher {
    config: LauncherConfig,
    source: Box<dyn ReleaseSource>,
    stop_timeout: Option<Duration>,
}

impl Launcher {
    pub fn new(config: LauncherConfig, source: Box<dyn ReleaseSource>) -> Self {
        Launcher {
            config,
            source,
            stop_timeout: None,
        }
    }

    /// Launcher talking to the Discord download API named in the config.
    pub fn from_config(config: LauncherConfig) -> Result<Self> {
        let api = DiscordApi::from_config(&config)?;
        Ok(Self::new(config, Box::new(api)))
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    fn checker(&self) -> UpdateChecker<'_> {
        UpdateChecker::new(&self.config, self.source.as_ref())
    }

    fn installer(&self) -> Installer<'_> {
        Installer::new(&self.config, self.source.as_ref())
    }

    fn process(&self) -> ProcessController<'_> {
        let controller = ProcessController::new(&self.config);
        match self.stop_timeout {
            Some(timeout) => controller.with_stop_timeout(timeout),
            None => controller,
        }
    }

    fn desktop(&self) -> DesktopEntryInstaller<'_> {
        DesktopEntryInstaller::new(&self.config)
    }

    /// Latest version of the configured channel.
    pub fn latest_version(&self) -> Result<String> {
        self.checker().latest_version(self.config.release_channel)
    }

    pub fn installed_state(&self) -> Result<Option<InstalledState>> {
        self.checker().installed_state()
    }

    pub fn installed_version(&self) -> Result<Option<String>> {
        self.checker().installed_version()
    }

    pub fn installed_channel(&self) -> Result<Option<Channel>> {
        self.checker().installed_channel()
    }

    pub fn check_updates(&self) -> Result<UpdateStatus> {
        self.checker().check_updates()
    }

    pub fn is_running(&self) -> Result<bool> {
        self.process().is_running()
    }

    /// Install the latest release if it is newer than the installed one.
    ///
    /// A running Discord is not stopped, but its install directory is deleted
    /// and replaced under it. It needs a restart to run the new files.
    pub fn update(&self, options: UpdateOptions) -> Result<UpdateOutcome> {
        let status = self.check_updates()?;
        let from = match &status {
            UpdateStatus::NotInstalled => None,
            UpdateStatus::UpToDate { version }
            | UpdateStatus::UpdateAvailable {
                installed: version, ..
            }
            | UpdateStatus::InstalledNewer {
                installed: version, ..
            } => Some(version.clone()),
            UpdateStatus::ChannelMismatch { installed, .. } => Some(installed.version.clone()),
        };

        let policy = match status {
            UpdateStatus::UpdateAvailable { installed, latest } => {
                log::info!("Updating Discord from {} to {}", installed, latest);
                InstallPolicy::UPDATE
            }
            UpdateStatus::UpToDate { version } if !options.force => {
                log::info!("Latest available version is {}, which is installed", version);
                return Ok(UpdateOutcome::AlreadyLatest(version));
            }
            UpdateStatus::UpToDate { version } => {
                log::warn!("Forcing reinstall of version {}", version);
                InstallPolicy {
                    force: true,
                    strict_channel: true,
                }
            }
            UpdateStatus::NotInstalled if !options.force => {
                return Err(LauncherError::Precheck(format!(
                    "Discord is not installed at \"{}\"; run install or update with --force-update",
                    self.config.discord_path.display()
                )));
            }
            UpdateStatus::NotInstalled => {
                log::info!("No existing installation found, installing");
                InstallPolicy::REPLACE
            }
            UpdateStatus::ChannelMismatch {
                installed,
                configured,
            } => {
                if !options.allow_channel_swap {
                    return Err(LauncherError::ChannelMismatch {
                        installed: installed.channel,
                        configured,
                    });
                }
                log::info!(
                    "Configured release channel has been changed to {}, installing now",
                    configured
                );
                InstallPolicy {
                    force: options.force,
                    strict_channel: false,
                }
            }
            UpdateStatus::InstalledNewer { installed, latest } if !options.force => {
                return Err(LauncherError::InstalledNewer {
                    installed,
                    requested: latest,
                });
            }
            UpdateStatus::InstalledNewer { installed, latest } => {
                log::warn!("Downgrading Discord from {} to {}", installed, latest);
                InstallPolicy {
                    force: true,
                    strict_channel: true,
                }
            }
        };

        if self.is_running()? {
            log::warn!("{}", running_update_warning(&self.config.discord_path));
        }
        let to = self.installer().install(self.config.release_channel, policy)?;
        self.desktop().sync()?;
        Ok(UpdateOutcome::Updated { from, to })
    }

    /// Install the latest release, replacing whatever is at `discord_path`.
    /// A running instance is stopped first.
    pub fn install(&self) -> Result<InstalledState> {
        if self.is_running()? {
            log::info!("Stopping running Discord before reinstalling");
            self.stop()?;
        }
        let state = self
            .installer()
            .install(self.config.release_channel, InstallPolicy::REPLACE)?;
        self.desktop().sync()?;
        Ok(state)
    }

    /// Remove the installation and the desktop entry. Both are attempted; the
    /// first failure is returned afterwards.
    pub fn uninstall(&self) -> Result<()> {
        let install = self.installer().uninstall();
        if let Err(e) = &install {
            log::error!("{}", e);
        }
        let desktop = self.desktop().uninstall();
        if let Err(e) = &desktop {
            log::error!("{}", e);
        }
        install.and(desktop)
    }

    pub fn install_desktop_entry(&self) -> Result<PathBuf> {
        self.desktop().install()
    }

    pub fn uninstall_desktop_entry(&self) -> Result<()> {
        self.desktop().uninstall()
    }

    pub fn run(&self, extra_args: &[String], options: RunOptions) -> Result<RunOutcome> {
        self.process().run(extra_args, options)
    }

    pub fn update_run(
        &self,
        update: UpdateOptions,
        extra_args: &[String],
        run: RunOptions,
    ) -> Result<RunOutcome> {
        self.update(update)?;
        self.run(extra_args, run)
    }

    pub fn stop(&self) -> Result<u32> {
        self.process().stop()
    }

    /// `RunOptions` derived from the config, as used by `run` without flags.
    pub fn default_run_options(&self) -> RunOptions {
        RunOptions {
            ignore_running: false,
            wait: self.config.wait_for_exit,
        }
    }
}

fn running_update_warning(install: &Path) -> String {
    format!(
        "Discord is running from \"{}\", whose files are being deleted and replaced; restart Discord now",
        install.display()
    )
}
