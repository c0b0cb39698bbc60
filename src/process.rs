use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::install::InstalledState;

const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SPAWN_RETRIES: u32 = 5;

/// How caller-supplied arguments combine with `launch_args` from the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgMergeMode {
    /// Keep configured args, dropping those whose option the caller also sets.
    #[default]
    Merge,
    /// Caller args, when given, replace the configured ones.
    Replace,
}

/// `--key=value` and `--key` both have key `--key`; positional args have none.
fn option_key(arg: &str) -> Option<&str> {
    if !arg.starts_with('-') || arg == "-" || arg == "--" {
        return None;
    }
    Some(arg.split_once('=').map_or(arg, |(key, _)| key))
}

/// Effective argument list for Discord. Caller args always come last.
///
/// In merge mode a configured arg is dropped when the caller passes the same
/// option key. Which flags take a value is unknown, so a configured
/// `--key value` pair loses its value token only when the caller also writes
/// `--key value`. A bare `--key` from the caller keeps a following
/// positional (a URL, say).
pub fn merge_launch_args(configured: &[String], overrides: &[String], mode: ArgMergeMode) -> Vec<String> {
    if overrides.is_empty() {
        return configured.to_vec();
    }
    if mode == ArgMergeMode::Replace {
        return overrides.to_vec();
    }

    // Option key -> whether the caller gives it a separate value token.
    let mut override_keys: HashMap<&str, bool> = HashMap::new();
    let mut caller = overrides.iter().peekable();
    while let Some(arg) = caller.next() {
        if let Some(key) = option_key(arg) {
            let valued = takes_separate_value(arg, caller.peek().map(|s| s.as_str()));
            *override_keys.entry(key).or_default() |= valued;
        }
    }

    let mut merged = Vec::with_capacity(configured.len() + overrides.len());
    let mut args = configured.iter().peekable();
    while let Some(arg) = args.next() {
        match option_key(arg).and_then(|key| override_keys.get(key)) {
            Some(&valued) => {
                if valued && takes_separate_value(arg, args.peek().map(|s| s.as_str())) {
                    args.next();
                }
            }
            None => merged.push(arg.clone()),
        }
    }
    merged.extend(overrides.iter().cloned());
    merged
}

fn takes_separate_value(arg: &str, next: Option<&str>) -> bool {
    !arg.contains('=') && next.is_some_and(|next| option_key(next).is_none())
}

/// Contents of the marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceState {
    Running { pid: u32 },
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Launch even if the marker says an instance is alive.
    pub ignore_running: bool,
    /// Block until Discord exits.
    pub wait: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub pid: u32,
    /// None when not waiting, or when the exit status could not be collected.
    pub exit_status: Option<ExitStatus>,
}

/// Tracks and controls the launched Discord process through the marker file.
pub struct ProcessController<'a> {
    config: &'a LauncherConfig,
    stop_timeout: Duration,
}

impl<'a> ProcessController<'a> {
    pub fn new(config: &'a LauncherConfig) -> Self {
        ProcessController {
            config,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn marker(&self) -> &Path {
        &self.config.marker_path
    }

    fn read_marker(&self) -> Result<InstanceState> {
        let bytes = match std::fs::read(self.marker()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(InstanceState::NotRunning),
            Err(e) => {
                return Err(LauncherError::fs(
                    format!("reading marker {}", self.marker().display()),
                    e,
                ))
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                log::warn!("Ignoring unreadable marker {}: {}", self.marker().display(), e);
                Ok(InstanceState::NotRunning)
            }
        }
    }

    fn write_marker(&self, state: InstanceState) -> Result<()> {
        let marker = self.marker();
        let context = || format!("writing marker {}", marker.display());
        if let Some(parent) = marker.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::fs(context(), e))?;
        }
        let json = serde_json::to_vec(&state)
            .map_err(|e| LauncherError::Parse(format!("serializing marker: {e}")))?;
        std::fs::write(marker, json).map_err(|e| LauncherError::fs(context(), e))
    }

    fn clear_marker(&self) -> Result<()> {
        match std::fs::remove_file(self.marker()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LauncherError::fs(
                format!("removing marker {}", self.marker().display()),
                e,
            )),
        }
    }

    /// Marker state after discarding a stale `Running` entry.
    pub fn state(&self) -> Result<InstanceState> {
        match self.read_marker()? {
            InstanceState::Running { pid } if !pid_alive(pid) => {
                log::debug!("Clearing stale marker for pid {}", pid);
                self.clear_marker()?;
                Ok(InstanceState::NotRunning)
            }
            state => Ok(state),
        }
    }

    pub fn is_running(&self) -> Result<bool> {
        Ok(matches!(self.state()?, InstanceState::Running { .. }))
    }

    /// Binary of the installed channel, e.g. `<discord_path>/DiscordPTB`.
    pub fn binary_path(&self) -> Result<PathBuf> {
        let installed = InstalledState::read(&self.config.discord_path)?.ok_or_else(|| {
            LauncherError::Precheck(format!(
                "Discord is not installed at \"{}\"",
                self.config.discord_path.display()
            ))
        })?;
        Ok(self
            .config
            .discord_path
            .join(installed.channel.binary_name()))
    }

    pub fn run(&self, extra_args: &[String], options: RunOptions) -> Result<RunOutcome> {
        if let InstanceState::Running { pid } = self.state()? {
            if !options.ignore_running {
                return Err(LauncherError::AlreadyRunning { pid });
            }
            log::warn!("Discord is already running (pid {}), launching anyway", pid);
        }

        let binary = self.binary_path()?;
        if !binary.is_file() {
            return Err(LauncherError::Precheck(format!(
                "Discord binary not found at \"{}\"",
                binary.display()
            )));
        }
        let args = merge_launch_args(
            &self.config.launch_args,
            extra_args,
            self.config.launch_args_mode,
        );

        log::debug!("Running Discord at '{}' using launch args {:?}", binary.display(), args);
        let mut child = spawn(&binary, &args, &self.config.working_directory)?;
        let pid = child.id();
        log::debug!("Discord PID is {}", pid);

        if let Err(e) = self.write_marker(InstanceState::Running { pid }) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        if !options.wait {
            return Ok(RunOutcome {
                pid,
                exit_status: None,
            });
        }

        let exit_status = match child.wait() {
            Ok(status) => {
                log::info!("Discord exited with {}", status);
                Some(status)
            }
            // Reaped elsewhere, e.g. by a concurrent stop().
            Err(e) => {
                log::debug!("Could not collect Discord exit status: {}", e);
                None
            }
        };
        if self.read_marker()? == (InstanceState::Running { pid }) {
            self.clear_marker()?;
        }
        Ok(RunOutcome { pid, exit_status })
    }

    /// SIGTERM the recorded process and wait for it to go away.
    pub fn stop(&self) -> Result<u32> {
        let InstanceState::Running { pid } = self.state()? else {
            return Err(LauncherError::NotRunning);
        };

        if let Err(err) = send_terminate(pid).map_err(|e| signal_error(pid, e)) {
            // Only a vanished process makes the marker stale.
            if matches!(err, LauncherError::NotRunning) {
                self.clear_marker()?;
            }
            return Err(err);
        }
        log::debug!("Sent SIGTERM to {}", pid);

        let deadline = Instant::now() + self.stop_timeout;
        while pid_alive(pid) {
            if Instant::now() >= deadline {
                return Err(LauncherError::StopTimeout {
                    pid,
                    timeout: self.stop_timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        log::debug!("Discord is no longer running");
        self.clear_marker()?;
        Ok(pid)
    }
}

/// Spawn `binary`, retrying briefly while it is still busy from being written
/// (a fresh install can race with the exec).
fn spawn(binary: &Path, args: &[String], cwd: &Path) -> Result<Child> {
    let mut attempts = 0;
    loop {
        match Command::new(binary).args(args).current_dir(cwd).spawn() {
            Ok(child) => return Ok(child),
            Err(e) if is_text_busy(&e) && attempts < SPAWN_RETRIES => {
                attempts += 1;
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                return Err(LauncherError::Spawn {
                    path: binary.to_path_buf(),
                    source,
                })
            }
        }
    }
}

#[cfg(unix)]
fn is_text_busy(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ETXTBSY)
}

/// True if `pid` names a live process. Reaps it first when it is one of our
/// own exited children, which would otherwise linger as a zombie.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: plain syscalls on a pid value; no memory is shared.
    unsafe {
        libc::waitpid(pid, std::ptr::null_mut(), libc::WNOHANG);
        if libc::kill(pid, 0) == 0 {
            return true;
        }
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> std::io::Result<()> {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return Err(std::io::Error::from_raw_os_error(libc::ESRCH));
    };
    // SAFETY: see pid_alive.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// ESRCH means the process is gone; anything else (EPERM) leaves it running.
fn signal_error(pid: u32, source: std::io::Error) -> LauncherError {
    if source.raw_os_error() == Some(libc::ESRCH) {
        LauncherError::NotRunning
    } else {
        LauncherError::Signal { pid, source }
    }
}
