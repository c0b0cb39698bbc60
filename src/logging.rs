use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use env_logger::Builder;
use log::LevelFilter;

use crate::config::data_dir;

/// Level names accepted by `--log-level`. Anything unknown falls back to info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel(pub LevelFilter);

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel(LevelFilter::Info)
    }
}

impl FromStr for LogLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LogLevel(match s.to_ascii_lowercase().as_str() {
            "debug" => LevelFilter::Debug,
            "warn" | "warning" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        }))
    }
}

/// `~/.local/share/discord_launcher/logs/launcher.log`
pub fn log_file_path() -> Option<PathBuf> {
    data_dir().ok().map(|d| d.join("logs").join("launcher.log"))
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Send `log` records to stderr and, when it can be opened, the log file.
pub fn setup_logger(level: LevelFilter) {
    let log_file = log_file_path().and_then(|path| match open_log_file(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Not logging to {}: {}", path.display(), e);
            None
        }
    });
    let log_file = log_file.map(Mutex::new);

    let mut builder = Builder::new();
    builder.filter(None, level);

    builder.format(move |buf, record| {
        if let Some(file) = &log_file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{} - {}", record.level(), record.args());
            }
        }
        writeln!(buf, "{} - {}", record.level(), record.args())
    });

    // A second call (GUI relaunching a mode, tests) keeps the first logger.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        let parse = |s: &str| s.parse::<LogLevel>().unwrap().0;
        assert_eq!(parse("debug"), LevelFilter::Debug);
        assert_eq!(parse("WARNING"), LevelFilter::Warn);
        assert_eq!(parse("warn"), LevelFilter::Warn);
        assert_eq!(parse("error"), LevelFilter::Error);
        assert_eq!(parse("info"), LevelFilter::Info);
        assert_eq!(parse("verbose"), LevelFilter::Info);
    }
}
