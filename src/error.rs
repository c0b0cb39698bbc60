use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::channel::Channel;
use crate::config::ConfigError;
use crate::version::VersionParseError;

pub type Result<T> = std::result::Result<T, LauncherError>;

/// Coarse classification the front-ends map to exit codes and dialogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    AlreadyRunning,
    NotRunning,
    Filesystem,
    Precheck,
    Process,
    Config,
}

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("network request failed: {0}")]
    Network(String),
    #[error("{0}")]
    Parse(String),
    #[error("Discord is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },
    #[error("Discord is not running")]
    NotRunning,
    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Precheck(String),
    #[error("release channel mismatch: installed is {installed}, config specifies {configured}")]
    ChannelMismatch {
        installed: Channel,
        configured: Channel,
    },
    #[error("installed version {installed} is newer than requested version {requested}")]
    InstalledNewer { installed: String, requested: String },
    #[error("version {0} is already installed")]
    InstalledSame(String),
    #[error("failed to launch {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to signal Discord (pid {pid}): {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("Discord (pid {pid}) did not exit within {timeout:?}")]
    StopTimeout { pid: u32, timeout: Duration },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LauncherError {
    pub fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        LauncherError::Filesystem {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Network(_) => ErrorKind::Network,
            LauncherError::Parse(_) => ErrorKind::Parse,
            LauncherError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            LauncherError::NotRunning => ErrorKind::NotRunning,
            LauncherError::Filesystem { .. } => ErrorKind::Filesystem,
            LauncherError::Precheck(_)
            | LauncherError::ChannelMismatch { .. }
            | LauncherError::InstalledNewer { .. }
            | LauncherError::InstalledSame(_) => ErrorKind::Precheck,
            LauncherError::Spawn { .. }
            | LauncherError::Signal { .. }
            | LauncherError::StopTimeout { .. } => ErrorKind::Process,
            LauncherError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<reqwest::Error> for LauncherError {
    fn from(err: reqwest::Error) -> Self {
        LauncherError::Network(err.to_string())
    }
}

impl From<VersionParseError> for LauncherError {
    fn from(err: VersionParseError) -> Self {
        LauncherError::Parse(err.to_string())
    }
}
