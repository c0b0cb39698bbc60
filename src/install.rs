use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::update::ReleaseSource;
use crate::version::VersionOrdering;

/// Written by Discord itself into every release; the source of InstalledState.
pub const BUILD_INFO_PATH: &str = "resources/build_info.json";

/// Top-level directories a Discord tarball may use.
const ARCHIVE_ROOTS: [&str; 3] = ["Discord", "DiscordPTB", "DiscordCanary"];

/// Version and channel of the Discord tree at an install path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledState {
    pub version: String,
    #[serde(rename = "releaseChannel")]
    pub channel: Channel,
}

impl InstalledState {
    /// Read `resources/build_info.json` under `install_path`; None if absent.
    pub fn read(install_path: &Path) -> Result<Option<Self>> {
        let path = install_path.join(BUILD_INFO_PATH);
        if !path.exists() {
            return Ok(None);
        }
        if !path.is_file() {
            return Err(LauncherError::Parse(format!(
                "{} is not a file",
                path.display()
            )));
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| LauncherError::fs(format!("reading {}", path.display()), e))?;
        let state = serde_json::from_slice(&bytes).map_err(|e| {
            LauncherError::Parse(format!("malformed {}: {e}", path.display()))
        })?;
        Ok(Some(state))
    }
}

/// Which existing installs an install may replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallPolicy {
    /// Allow reinstalling the same version or downgrading.
    pub force: bool,
    /// Refuse to replace an install from a different channel.
    pub strict_channel: bool,
}

impl InstallPolicy {
    /// Fresh install: replace whatever is there.
    pub const REPLACE: InstallPolicy = InstallPolicy {
        force: true,
        strict_channel: false,
    };
    /// Regular update: only move forward within the same channel.
    pub const UPDATE: InstallPolicy = InstallPolicy {
        force: false,
        strict_channel: true,
    };
}

fn check_policy(
    existing: Option<&InstalledState>,
    incoming: &InstalledState,
    policy: InstallPolicy,
    ordering: VersionOrdering,
) -> Result<()> {
    let Some(existing) = existing else {
        return Ok(());
    };
    log::info!(
        "Existing Discord version is {} of release channel {}",
        existing.version,
        existing.channel
    );

    if existing.channel != incoming.channel {
        if policy.strict_channel {
            return Err(LauncherError::ChannelMismatch {
                installed: existing.channel,
                configured: incoming.channel,
            });
        }
        log::warn!(
            "Requested version has a different release channel than the existing installation (archive=\"{}\", existing=\"{}\")",
            incoming.channel,
            existing.channel
        );
        return Ok(());
    }

    match ordering.compare(&incoming.version, &existing.version)? {
        std::cmp::Ordering::Greater => Ok(()),
        std::cmp::Ordering::Equal if policy.force => {
            log::warn!("Reinstalling version {}", existing.version);
            Ok(())
        }
        std::cmp::Ordering::Equal => Err(LauncherError::InstalledSame(existing.version.clone())),
        std::cmp::Ordering::Less if policy.force => {
            log::warn!(
                "Installed version ({}) is newer than the version requested ({})",
                existing.version,
                incoming.version
            );
            Ok(())
        }
        std::cmp::Ordering::Less => Err(LauncherError::InstalledNewer {
            installed: existing.version.clone(),
            requested: incoming.version.clone(),
        }),
    }
}

/// Downloads, unpacks and swaps Discord releases into `config.discord_path`.
pub struct Installer<'a> {
    config: &'a LauncherConfig,
    source: &'a dyn ReleaseSource,
}

impl<'a> Installer<'a> {
    pub fn new(config: &'a LauncherConfig, source: &'a dyn ReleaseSource) -> Self {
        Installer { config, source }
    }

    /// Download the latest release of `channel` and install it.
    pub fn install(&self, channel: Channel, policy: InstallPolicy) -> Result<InstalledState> {
        let release = self.source.latest_release(channel)?;
        log::info!(
            "Latest available Discord version is {} of release channel {}",
            release.version,
            channel
        );
        let archive = self.source.download(&release)?;
        self.install_archive(&archive, policy)
    }

    /// Install from an in-memory `.tar.gz`.
    ///
    /// The archive is unpacked next to the install path first; the old install
    /// is only removed once the new tree is complete, so a failure at any
    /// point before the swap leaves the previous InstalledState in place.
    pub fn install_archive(&self, archive: &[u8], policy: InstallPolicy) -> Result<InstalledState> {
        if archive.is_empty() {
            return Err(LauncherError::Parse("downloaded archive is empty".to_string()));
        }

        let target = &self.config.discord_path;
        let staging = staging_dir(target)?;
        clear_path(&staging)?;
        std::fs::create_dir_all(&staging)
            .map_err(|e| LauncherError::fs(format!("creating {}", staging.display()), e))?;

        let prepared = self.prepare(archive, &staging, policy);
        let incoming = match prepared {
            Ok(state) => state,
            Err(err) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(err);
            }
        };

        if target.exists() {
            log::info!("Removing old Discord installation at \"{}\"", target.display());
            if let Err(e) = clear_path(target) {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
        }
        std::fs::rename(&staging, target).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging);
            LauncherError::fs(format!("moving new install into {}", target.display()), e)
        })?;

        log::info!(
            "Installed Discord {} ({}) at \"{}\"",
            incoming.version,
            incoming.channel,
            target.display()
        );
        Ok(incoming)
    }

    fn prepare(&self, archive: &[u8], staging: &Path, policy: InstallPolicy) -> Result<InstalledState> {
        log::info!("Extracting archive to \"{}\"", staging.display());
        extract_archive(archive, staging)?;

        let incoming = InstalledState::read(staging)?.ok_or_else(|| {
            LauncherError::Parse(format!("archive does not contain {BUILD_INFO_PATH}"))
        })?;
        log::info!(
            "Discord version in archive is {} of release channel {}",
            incoming.version,
            incoming.channel
        );

        let existing = match InstalledState::read(&self.config.discord_path) {
            Ok(existing) => existing,
            Err(err) if policy.force => {
                log::warn!("Ignoring unreadable existing installation: {}", err);
                None
            }
            Err(err) => return Err(err),
        };
        check_policy(existing.as_ref(), &incoming, policy, self.config.version_ordering)?;
        Ok(incoming)
    }

    /// Remove the install directory.
    pub fn uninstall(&self) -> Result<()> {
        let target = &self.config.discord_path;
        if !target.exists() {
            return Err(LauncherError::Precheck(format!(
                "Discord installation did not already exist at \"{}\"",
                target.display()
            )));
        }
        if !target.is_dir() {
            return Err(LauncherError::Precheck(format!(
                "Discord installation specified at \"{}\" is not a directory",
                target.display()
            )));
        }
        log::info!("Removing Discord installation at \"{}\"", target.display());
        std::fs::remove_dir_all(target)
            .map_err(|e| LauncherError::fs(format!("removing {}", target.display()), e))
    }
}

/// `<parent>/.<name>.partial`, on the same filesystem as the target so the
/// final move is a rename.
fn staging_dir(target: &Path) -> Result<PathBuf> {
    let name = target.file_name().ok_or_else(|| {
        LauncherError::Precheck(format!(
            "discord_path \"{}\" does not name a directory",
            target.display()
        ))
    })?;
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .map_err(|e| LauncherError::fs(format!("creating {}", parent.display()), e))?;
    let mut staging_name = std::ffi::OsString::from(".");
    staging_name.push(name);
    staging_name.push(".partial");
    Ok(parent.join(staging_name))
}

fn clear_path(path: &Path) -> Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
    };
    result.map_err(|e| LauncherError::fs(format!("removing {}", path.display()), e))
}

/// Path of an archive entry relative to the Discord root directory.
///
/// Entries outside the known roots are skipped (None); entries that would
/// escape the destination are rejected.
fn relative_entry_path(path: &Path) -> Result<Option<PathBuf>> {
    let mut components = path
        .components()
        .skip_while(|c| matches!(c, Component::CurDir));
    let root = match components.next() {
        Some(Component::Normal(root)) => root,
        _ => return Ok(None),
    };
    if !ARCHIVE_ROOTS.iter().any(|r| root == *r) {
        return Ok(None);
    }

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => {
                return Err(LauncherError::Parse(format!(
                    "archive entry \"{}\" escapes the install directory",
                    path.display()
                )))
            }
        }
    }
    Ok(if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    })
}

/// A symlink target that resolves under the link's own directory.
fn stays_inside(target: &Path) -> bool {
    !target.as_os_str().is_empty()
        && target
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Refuse to write an entry through a symlink an earlier entry created.
fn check_no_symlink_on_path(dest: &Path, relative: &Path) -> Result<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(LauncherError::Parse(format!(
                    "archive entry {} passes through a symlink",
                    relative.display()
                )))
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => {
                return Err(LauncherError::fs(format!("inspecting {}", current.display()), e))
            }
        }
    }
    Ok(())
}

/// Unpack the Discord root of a `.tar.gz` into `dest` using pure Rust.
fn extract_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::{Archive, EntryType};

    let malformed = |e: std::io::Error| LauncherError::Parse(format!("malformed archive: {e}"));

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut unpacked = 0usize;
    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let path = entry.path().map_err(malformed)?.into_owned();
        let Some(relative) = relative_entry_path(&path)? else {
            continue;
        };

        match entry.header().entry_type() {
            EntryType::Symlink => {
                let target = entry.link_name().map_err(malformed)?.unwrap_or_default();
                if !stays_inside(&target) {
                    return Err(LauncherError::Parse(format!(
                        "archive entry {} links outside the install: {}",
                        path.display(),
                        target.display()
                    )));
                }
            }
            EntryType::Link => {
                return Err(LauncherError::Parse(format!(
                    "archive entry {} is a hard link",
                    path.display()
                )));
            }
            _ => {}
        }
        check_no_symlink_on_path(dest, &relative)?;

        let out = dest.join(&relative);
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LauncherError::fs(format!("creating {}", parent.display()), e))?;
        }
        entry.unpack(&out).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData => malformed(e),
            _ => LauncherError::fs(format!("writing {}", out.display()), e),
        })?;
        unpacked += 1;
    }

    if unpacked == 0 {
        return Err(LauncherError::Parse(
            "archive contains no Discord directory".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{
        make_discord_archive, make_tar_gz, make_tar_gz_entries, test_config, write_build_info,
        FakeSource,
    };
    use tempfile::tempdir;

    #[test]
    fn read_returns_none_when_not_installed() {
        let dir = tempdir().unwrap();
        assert_eq!(InstalledState::read(dir.path()).unwrap(), None);
    }

    #[test]
    fn read_parses_build_info() {
        let dir = tempdir().unwrap();
        write_build_info(dir.path(), "0.0.45", Channel::Ptb);
        let state = InstalledState::read(dir.path()).unwrap().unwrap();
        assert_eq!(state.version, "0.0.45");
        assert_eq!(state.channel, Channel::Ptb);
    }

    #[test]
    fn read_rejects_malformed_build_info() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("resources")).unwrap();
        std::fs::write(dir.path().join(BUILD_INFO_PATH), "{not json").unwrap();
        let err = InstalledState::read(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn install_then_installed_version() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let source = FakeSource::new("0.0.46");
        let state = Installer::new(&config, &source)
            .install(Channel::Stable, InstallPolicy::REPLACE)
            .unwrap();
        assert_eq!(state.version, "0.0.46");
        assert_eq!(
            InstalledState::read(&config.discord_path).unwrap(),
            Some(state)
        );
        assert!(config.discord_path.join("Discord").is_file());
        assert!(!dir.path().join(".Discord.partial").exists());
    }

    #[test]
    fn install_replaces_previous_tree() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.1", Channel::Stable);
        std::fs::write(config.discord_path.join("stale.txt"), "old").unwrap();

        let source = FakeSource::new("0.0.2");
        Installer::new(&config, &source)
            .install(Channel::Stable, InstallPolicy::UPDATE)
            .unwrap();
        assert!(!config.discord_path.join("stale.txt").exists());
    }

    #[test]
    fn empty_archive_is_rejected() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let source = FakeSource::offline();
        let err = Installer::new(&config, &source)
            .install_archive(&[], InstallPolicy::REPLACE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn archive_without_build_info_keeps_old_install() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.1", Channel::Stable);

        let archive = make_tar_gz(&[("Discord/Discord", "#!/bin/sh\n")]);
        let source = FakeSource::offline();
        let err = Installer::new(&config, &source)
            .install_archive(&archive, InstallPolicy::REPLACE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        let state = InstalledState::read(&config.discord_path).unwrap().unwrap();
        assert_eq!(state.version, "0.0.1");
        assert!(!dir.path().join(".Discord.partial").exists());
    }

    #[test]
    fn write_failure_during_extraction_keeps_old_install() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.1", Channel::Stable);

        // `resources` lands as a plain file, so creating resources/ fails.
        let archive = make_tar_gz(&[
            ("Discord/resources", "not a directory"),
            (
                "Discord/resources/build_info.json",
                r#"{"version":"0.0.2","releaseChannel":"stable"}"#,
            ),
        ]);
        let source = FakeSource::offline();
        let err = Installer::new(&config, &source)
            .install_archive(&archive, InstallPolicy::REPLACE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem, "{err}");
        let state = InstalledState::read(&config.discord_path).unwrap().unwrap();
        assert_eq!(state.version, "0.0.1");
    }

    #[test]
    fn truncated_archive_keeps_old_install() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.1", Channel::Stable);

        let full = make_discord_archive(Channel::Stable, "0.0.2");
        let truncated = &full[..full.len() / 2];
        let source = FakeSource::offline();
        assert!(Installer::new(&config, &source)
            .install_archive(truncated, InstallPolicy::REPLACE)
            .is_err());
        let state = InstalledState::read(&config.discord_path).unwrap().unwrap();
        assert_eq!(state.version, "0.0.1");
    }

    #[test]
    fn escaping_entries_are_rejected() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let archive = make_tar_gz(&[("Discord/../escaped", "gotcha")]);
        let source = FakeSource::offline();
        let err = Installer::new(&config, &source)
            .install_archive(&archive, InstallPolicy::REPLACE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn symlinks_cannot_redirect_writes_outside() {
        use tar::EntryType::{Link, Regular, Symlink};

        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let config = test_config(dir.path());
        let source = FakeSource::offline();
        let installer = Installer::new(&config, &source);
        let outside_target = outside.path().to_string_lossy().into_owned();

        let cases: [&[(&str, tar::EntryType, &str)]; 4] = [
            &[
                ("Discord/link", Symlink, outside_target.as_str()),
                ("Discord/link/evil.txt", Regular, "gotcha"),
            ],
            &[("Discord/link", Symlink, "../../evil.txt")],
            &[
                ("Discord/sub/", tar::EntryType::Directory, ""),
                ("Discord/link", Symlink, "sub"),
                ("Discord/link/evil.txt", Regular, "gotcha"),
            ],
            &[("Discord/hard", Link, "/etc/passwd")],
        ];
        for entries in cases {
            let archive = make_tar_gz_entries(entries);
            let err = installer
                .install_archive(&archive, InstallPolicy::REPLACE)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "{entries:?}: {err}");
        }
        assert!(!outside.path().join("evil.txt").exists());
        assert!(!config.discord_path.exists());
    }

    #[test]
    fn relative_symlinks_inside_the_install_are_kept() {
        use tar::EntryType::{Regular, Symlink};

        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let source = FakeSource::offline();
        let archive = make_tar_gz_entries(&[
            (
                "Discord/resources/build_info.json",
                Regular,
                r#"{"releaseChannel":"stable","version":"0.0.5"}"#,
            ),
            ("Discord/Discord", Regular, "#!/bin/sh\n"),
            ("Discord/discord-alias", Symlink, "Discord"),
        ]);

        Installer::new(&config, &source)
            .install_archive(&archive, InstallPolicy::REPLACE)
            .unwrap();
        let alias = config.discord_path.join("discord-alias");
        assert!(std::fs::symlink_metadata(&alias).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(alias).unwrap(), PathBuf::from("Discord"));
    }

    #[test]
    fn update_policy_refuses_same_and_older_versions() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.5", Channel::Stable);
        let installer_source = FakeSource::offline();
        let installer = Installer::new(&config, &installer_source);

        let same = make_discord_archive(Channel::Stable, "0.0.5");
        assert!(matches!(
            installer.install_archive(&same, InstallPolicy::UPDATE),
            Err(LauncherError::InstalledSame(_))
        ));

        let older = make_discord_archive(Channel::Stable, "0.0.4");
        assert!(matches!(
            installer.install_archive(&older, InstallPolicy::UPDATE),
            Err(LauncherError::InstalledNewer { .. })
        ));

        let state = installer.install_archive(&older, InstallPolicy::REPLACE).unwrap();
        assert_eq!(state.version, "0.0.4");
    }

    #[test]
    fn strict_channel_refuses_channel_change() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.5", Channel::Stable);
        let source = FakeSource::offline();
        let installer = Installer::new(&config, &source);

        let canary = make_discord_archive(Channel::Canary, "0.0.900");
        assert!(matches!(
            installer.install_archive(&canary, InstallPolicy::UPDATE),
            Err(LauncherError::ChannelMismatch { .. })
        ));
        let swap = InstallPolicy {
            force: false,
            strict_channel: false,
        };
        let state = installer.install_archive(&canary, swap).unwrap();
        assert_eq!(state.channel, Channel::Canary);
        assert!(config.discord_path.join("DiscordCanary").is_file());
    }

    #[test]
    fn uninstall_requires_existing_install() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let source = FakeSource::offline();
        let installer = Installer::new(&config, &source);
        assert_eq!(installer.uninstall().unwrap_err().kind(), ErrorKind::Precheck);

        write_build_info(&config.discord_path, "0.0.5", Channel::Stable);
        installer.uninstall().unwrap();
        assert!(!config.discord_path.exists());
    }

    #[test]
    fn entries_outside_known_roots_are_skipped() {
        assert_eq!(relative_entry_path(Path::new("Other/file")).unwrap(), None);
        assert_eq!(relative_entry_path(Path::new("Discord/")).unwrap(), None);
        assert_eq!(
            relative_entry_path(Path::new("./DiscordPTB/resources/app.asar")).unwrap(),
            Some(PathBuf::from("resources/app.asar"))
        );
    }
}
