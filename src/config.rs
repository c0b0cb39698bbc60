use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::Channel;
use crate::process::ArgMergeMode;
use crate::version::VersionOrdering;

pub const APP_DIR_NAME: &str = "discord_launcher";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_DOWNLOAD_API: &str = "https://discord.com/api/download";
const DESKTOP_ENTRY_FILE_NAME: &str = "discord-launcher.desktop";
const MARKER_FILE_NAME: &str = "discord-launcher.instance.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopEntryConfig {
    /// Rewrite the desktop entry after every install or update.
    pub enabled: bool,
    #[serde(default = "default_desktop_entry_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub tryexec: bool,
    #[serde(default)]
    pub setup_action: bool,
}

impl Default for DesktopEntryConfig {
    fn default() -> Self {
        DesktopEntryConfig {
            enabled: true,
            path: default_desktop_entry_path(),
            tryexec: true,
            setup_action: false,
        }
    }
}

/// Settings file contents. Loaded once per invocation and handed to every
/// component that needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub discord_path: PathBuf,
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    #[serde(default)]
    pub launch_args: Vec<String>,
    #[serde(default)]
    pub launch_args_mode: ArgMergeMode,
    pub launcher_path: PathBuf,
    #[serde(default)]
    pub release_channel: Channel,
    #[serde(default)]
    pub version_ordering: VersionOrdering,
    /// Block `run` until Discord exits.
    #[serde(default = "default_true")]
    pub wait_for_exit: bool,
    #[serde(default = "default_marker_path")]
    pub marker_path: PathBuf,
    #[serde(default = "default_download_api")]
    pub download_api: String,
    #[serde(default)]
    pub desktop_entry: DesktopEntryConfig,
}

fn default_true() -> bool {
    true
}

fn default_download_api() -> String {
    DEFAULT_DOWNLOAD_API.to_string()
}

fn default_working_directory() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}

fn default_desktop_entry_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("applications")
        .join(DESKTOP_ENTRY_FILE_NAME)
}

fn default_marker_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(|| dirs::data_local_dir().map(|d| d.join(APP_DIR_NAME)))
        .unwrap_or_else(std::env::temp_dir)
        .join(MARKER_FILE_NAME)
}

/// `~/.local/share/discord_launcher`
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    Ok(dirs::data_local_dir()
        .ok_or(ConfigError::NoHomeDir)?
        .join(APP_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(data_dir()?.join(CONFIG_FILE_NAME))
}

/// Path of the running launcher binary, used for the desktop entry `Exec`.
pub fn default_launcher_path() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| PathBuf::from("discord-launcher"))
}

impl LauncherConfig {
    /// Defaults rooted at `data_dir`. Meant to be edited before use.
    pub fn with_defaults(data_dir: &Path, launcher_path: PathBuf) -> Self {
        LauncherConfig {
            discord_path: data_dir.join("Discord"),
            working_directory: default_working_directory(),
            launch_args: Vec::new(),
            launch_args_mode: ArgMergeMode::default(),
            launcher_path,
            release_channel: Channel::Stable,
            version_ordering: VersionOrdering::default(),
            wait_for_exit: true,
            marker_path: default_marker_path(),
            download_api: default_download_api(),
            desktop_entry: DesktopEntryConfig::default(),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the config at `path`, writing a default one first if none exists.
    pub fn load_or_init(path: &Path, launcher_path: PathBuf) -> Result<Self, ConfigError> {
        if path.is_file() {
            log::debug!("Config found at \"{}\"", path.display());
            return Self::load(path);
        }
        log::info!("Initializing config at {}", path.display());
        let config = Self::defaults_for(path, launcher_path);
        config.save(path)?;
        Ok(config)
    }

    /// Defaults for a config file at `path`, installing Discord next to it.
    pub fn defaults_for(path: &Path, launcher_path: PathBuf) -> Self {
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_defaults(&root, launcher_path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = self.to_toml()?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, text).map_err(write_err)
    }

    /// Check that the configured paths make sense on this machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let parent_exists = |p: &Path| p.parent().is_some_and(|d| d.as_os_str().is_empty() || d.exists());

        if !parent_exists(&self.discord_path) {
            problems.push(format!(
                "parent directory of discord_path {} does not exist",
                self.discord_path.display()
            ));
        }
        if !self.working_directory.is_dir() {
            problems.push(format!(
                "working_directory {} is not a directory",
                self.working_directory.display()
            ));
        }
        if !self.launcher_path.exists() {
            problems.push(format!(
                "launcher_path {} does not exist",
                self.launcher_path.display()
            ));
        }
        if self.desktop_entry.enabled && !parent_exists(&self.desktop_entry.path) {
            problems.push(format!(
                "parent directory of desktop_entry.path {} does not exist",
                self.desktop_entry.path.display()
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_init_writes_defaults_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = LauncherConfig::load_or_init(&path, PathBuf::from("/bin/sh")).unwrap();
        assert!(path.is_file());
        assert_eq!(config.discord_path, dir.path().join("nested").join("Discord"));
        assert_eq!(config.release_channel, Channel::Stable);
        assert_eq!(LauncherConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn save_then_load_preserves_edits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = LauncherConfig::with_defaults(dir.path(), PathBuf::from("/bin/sh"));
        config.release_channel = Channel::Canary;
        config.launch_args = vec!["--start-minimized".to_string()];
        config.launch_args_mode = ArgMergeMode::Replace;
        config.desktop_entry.setup_action = true;
        config.save(&path).unwrap();
        assert_eq!(LauncherConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn minimal_file_fills_in_defaults() {
        let text = r#"
discord_path = "/opt/Discord"
working_directory = "/tmp"
launch_args = ["--a"]
launcher_path = "/usr/local/bin/discord-launcher"
release_channel = "ptb"

[desktop_entry]
enabled = false
"#;
        let config = LauncherConfig::from_toml(text).unwrap();
        assert_eq!(config.release_channel, Channel::Ptb);
        assert_eq!(config.launch_args_mode, ArgMergeMode::Merge);
        assert_eq!(config.version_ordering, VersionOrdering::Semantic);
        assert!(config.wait_for_exit);
        assert_eq!(config.download_api, DEFAULT_DOWNLOAD_API);
        assert!(!config.desktop_entry.enabled);
        assert!(config.desktop_entry.tryexec);
    }

    #[test]
    fn unknown_channel_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "discord_path = \"/x\"\nlauncher_path = \"/y\"\nrelease_channel = \"nightly\"\n",
        )
        .unwrap();
        assert!(matches!(
            LauncherConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn validate_reports_every_problem() {
        let dir = tempdir().unwrap();
        let mut config = LauncherConfig::with_defaults(dir.path(), dir.path().join("missing-launcher"));
        config.working_directory = dir.path().join("nope");
        config.desktop_entry.path = dir.path().join("a").join("b").join("x.desktop");
        match config.validate() {
            Err(ConfigError::Invalid(problems)) => assert_eq!(problems.len(), 3),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_sane_paths() {
        let dir = tempdir().unwrap();
        let launcher = dir.path().join("discord-launcher");
        std::fs::write(&launcher, "").unwrap();
        let mut config = LauncherConfig::with_defaults(dir.path(), launcher);
        config.working_directory = dir.path().to_path_buf();
        config.desktop_entry.path = dir.path().join("x.desktop");
        config.validate().unwrap();
    }
}
