//! Test fixtures shared by the unit tests of several modules.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::channel::Channel;
use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::install::BUILD_INFO_PATH;
use crate::update::{ReleaseSource, RemoteRelease};

/// Stand-in for the Discord binary: stays alive until signalled.
pub const FAKE_DISCORD_SCRIPT: &str = "#!/bin/sh\nexec sleep 30\n";

/// Config rooted in a temp dir. Desktop entries are off unless a test turns
/// them on.
pub fn test_config(root: &Path) -> LauncherConfig {
    let launcher = root.join("discord-launcher");
    let mut config = LauncherConfig::with_defaults(root, launcher);
    config.working_directory = root.to_path_buf();
    config.marker_path = root.join("instance.json");
    config.desktop_entry.enabled = false;
    config.desktop_entry.path = root.join("applications").join("discord-launcher.desktop");
    config
}

pub fn write_build_info(install_path: &Path, version: &str, channel: Channel) {
    let path = install_path.join(BUILD_INFO_PATH);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        path,
        format!(r#"{{"releaseChannel":"{channel}","version":"{version}"}}"#),
    )
    .unwrap();
}

/// Build an in-memory .tar.gz from `(path, content)` pairs.
///
/// Names are written into the header verbatim so tests can produce entries
/// the `tar` builder itself would refuse.
pub fn make_tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
    let entries: Vec<_> = files
        .iter()
        .map(|(name, content)| (*name, tar::EntryType::Regular, *content))
        .collect();
    make_tar_gz_entries(&entries)
}

/// Like `make_tar_gz`, but with explicit entry types. For links the third
/// field is the link target rather than the content.
pub fn make_tar_gz_entries(entries: &[(&str, tar::EntryType, &str)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::Builder;

    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = Builder::new(enc);

    for (name, kind, data) in entries {
        let mut header = tar::Header::new_gnu();
        let raw = name.as_bytes();
        header.as_old_mut().name[..raw.len()].copy_from_slice(raw);
        header.set_mode(0o755);
        header.set_entry_type(*kind);
        let content = if kind.is_symlink() || kind.is_hard_link() {
            let target = data.as_bytes();
            header.as_old_mut().linkname[..target.len()].copy_from_slice(target);
            ""
        } else {
            data
        };
        header.set_size(content.len() as u64);
        header.set_cksum();
        archive.append(&header, content.as_bytes()).unwrap();
    }

    let enc = archive.into_inner().unwrap();
    enc.finish().unwrap()
}

/// A release tarball laid out like Discord's.
pub fn make_discord_archive(channel: Channel, version: &str) -> Vec<u8> {
    let root = channel.binary_name();
    let build_info = format!(r#"{{"releaseChannel":"{channel}","version":"{version}"}}"#);
    let desktop = format!(
        "[Desktop Entry]\nName=Discord\nComment=All-in-one voice and text chat\nExec=/usr/share/discord/{root}\nIcon=discord\nType=Application\nCategories=Network;InstantMessaging;\n"
    );
    let binary_path = format!("{root}/{root}");
    let info_path = format!("{root}/{BUILD_INFO_PATH}");
    let desktop_path = format!("{root}/{}", channel.desktop_file_name());
    let icon_path = format!("{root}/discord.png");
    make_tar_gz(&[
        (info_path.as_str(), build_info.as_str()),
        (binary_path.as_str(), FAKE_DISCORD_SCRIPT),
        (desktop_path.as_str(), desktop.as_str()),
        (icon_path.as_str(), "PNG"),
    ])
}

/// In-memory release source serving one version for every channel.
pub struct FakeSource {
    latest: Option<String>,
    downloads: AtomicUsize,
}

impl FakeSource {
    pub fn new(latest: &str) -> Self {
        FakeSource {
            latest: Some(latest.to_string()),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Every request fails as if the network were down.
    pub fn offline() -> Self {
        FakeSource {
            latest: None,
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for FakeSource {
    fn latest_release(&self, channel: Channel) -> Result<RemoteRelease> {
        let version = self
            .latest
            .clone()
            .ok_or_else(|| LauncherError::Network("offline".to_string()))?;
        Ok(RemoteRelease {
            channel,
            download_url: format!("https://example.invalid/{channel}/{version}/discord-{version}.tar.gz"),
            version,
        })
    }

    fn download(&self, release: &RemoteRelease) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(make_discord_archive(release.channel, &release.version))
    }
}
