use std::cmp::Ordering;
use std::time::Duration;

use crate::channel::Channel;
use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::install::InstalledState;
use crate::version::version_from_download_url;

const DOWNLOAD_PARAMS: &str = "platform=linux&format=tar.gz";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRelease {
    pub channel: Channel,
    pub version: String, // "0.0.45"
    pub download_url: String,
}

/// Where releases come from. `DiscordApi` in production; tests substitute
/// an in-memory source.
pub trait ReleaseSource: Send + Sync {
    fn latest_release(&self, channel: Channel) -> Result<RemoteRelease>;
    fn download(&self, release: &RemoteRelease) -> Result<Vec<u8>>;
}

/// The Discord download API: `GET /api/download[/<channel>]` answers with a
/// redirect whose `Location` is the versioned tarball URL.
pub struct DiscordApi {
    base_url: String,
    probe: reqwest::blocking::Client,
    downloader: reqwest::blocking::Client,
}

fn user_agent() -> String {
    format!("discord-launcher/{}", env!("CARGO_PKG_VERSION"))
}

impl DiscordApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let probe = reqwest::blocking::Client::builder()
            .user_agent(user_agent())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(PROBE_TIMEOUT)
            .build()?;
        let downloader = reqwest::blocking::Client::builder()
            .user_agent(user_agent())
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(DiscordApi {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe,
            downloader,
        })
    }

    pub fn from_config(config: &LauncherConfig) -> Result<Self> {
        Self::new(config.download_api.clone())
    }
}

pub fn release_endpoint(base_url: &str, channel: Channel) -> String {
    match channel.api_segment() {
        Some(segment) => format!("{base_url}/{segment}?{DOWNLOAD_PARAMS}"),
        None => format!("{base_url}?{DOWNLOAD_PARAMS}"),
    }
}

/// Turn the redirect target of the download API into a release.
pub fn release_from_location(channel: Channel, location: &str) -> Result<RemoteRelease> {
    let version = version_from_download_url(location)?;
    Ok(RemoteRelease {
        channel,
        version: version.to_string(),
        download_url: location.to_string(),
    })
}

impl ReleaseSource for DiscordApi {
    fn latest_release(&self, channel: Channel) -> Result<RemoteRelease> {
        let url = release_endpoint(&self.base_url, channel);
        log::debug!("Using Discord API URL \"{}\"", url);

        let response = self.probe.get(&url).send()?;
        let status = response.status();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .ok_or_else(|| {
                LauncherError::Parse(format!(
                    "download API answered {status} without a Location header"
                ))
            })?
            .to_str()
            .map_err(|_| LauncherError::Parse("Location header is not valid text".to_string()))?;

        release_from_location(channel, location)
    }

    fn download(&self, release: &RemoteRelease) -> Result<Vec<u8>> {
        log::info!("Downloading Discord from {}", release.download_url);
        let response = self
            .downloader
            .get(&release.download_url)
            .send()?
            .error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate {
        version: String,
    },
    UpdateAvailable {
        installed: String,
        latest: String,
    },
    NotInstalled,
    /// The install on disk belongs to a different channel than the config.
    ChannelMismatch {
        installed: InstalledState,
        configured: Channel,
    },
    InstalledNewer {
        installed: String,
        latest: String,
    },
}

/// Read-only queries against the local install and the release source.
pub struct UpdateChecker<'a> {
    config: &'a LauncherConfig,
    source: &'a dyn ReleaseSource,
}

impl<'a> UpdateChecker<'a> {
    pub fn new(config: &'a LauncherConfig, source: &'a dyn ReleaseSource) -> Self {
        UpdateChecker { config, source }
    }

    pub fn latest_version(&self, channel: Channel) -> Result<String> {
        Ok(self.source.latest_release(channel)?.version)
    }

    pub fn installed_state(&self) -> Result<Option<InstalledState>> {
        InstalledState::read(&self.config.discord_path)
    }

    pub fn installed_version(&self) -> Result<Option<String>> {
        Ok(self.installed_state()?.map(|s| s.version))
    }

    pub fn installed_channel(&self) -> Result<Option<Channel>> {
        Ok(self.installed_state()?.map(|s| s.channel))
    }

    pub fn check_updates(&self) -> Result<UpdateStatus> {
        let Some(installed) = self.installed_state()? else {
            return Ok(UpdateStatus::NotInstalled);
        };
        if installed.channel != self.config.release_channel {
            return Ok(UpdateStatus::ChannelMismatch {
                installed,
                configured: self.config.release_channel,
            });
        }

        let latest = self.latest_version(self.config.release_channel)?;
        let ordering = self
            .config
            .version_ordering
            .compare(&installed.version, &latest)?;
        Ok(match ordering {
            Ordering::Less => UpdateStatus::UpdateAvailable {
                installed: installed.version,
                latest,
            },
            Ordering::Equal => UpdateStatus::UpToDate {
                version: installed.version,
            },
            Ordering::Greater => UpdateStatus::InstalledNewer {
                installed: installed.version,
                latest,
            },
        })
    }
}
