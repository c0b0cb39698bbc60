use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::install::InstalledState;

const MAIN_GROUP: &str = "Desktop Entry";
const SETUP_ACTION: &str = "setup";
const ICON_NAME: &str = "discord.png";
const GUI_BINARY_NAME: &str = "discord-launcher-gui";

/// A freedesktop `.desktop` file: ordered groups of ordered keys.
///
/// Comments in a parsed file are not preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesktopEntry {
    groups: Vec<(String, Vec<(String, String)>)>,
}

impl DesktopEntry {
    pub fn parse(text: &str) -> Self {
        let mut entry = DesktopEntry::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                entry.groups.push((name.to_string(), Vec::new()));
                continue;
            }
            if let (Some((key, value)), Some((_, keys))) = (line.split_once('='), entry.groups.last_mut()) {
                keys.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        entry
    }

    /// Minimal entry used when the install ships none.
    pub fn application(name: &str) -> Self {
        let mut entry = DesktopEntry::default();
        entry.set(MAIN_GROUP, "Type", "Application");
        entry.set(MAIN_GROUP, "Name", name);
        entry.set(MAIN_GROUP, "Categories", "Network;InstantMessaging;");
        entry.set(MAIN_GROUP, "Terminal", "false");
        entry
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)?
            .1
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let index = match self.groups.iter().position(|(name, _)| name == group) {
            Some(i) => i,
            None => {
                self.groups.push((group.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        let keys = &mut self.groups[index].1;
        match keys.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => keys.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, group: &str, key: &str) {
        if let Some((_, keys)) = self.groups.iter_mut().find(|(name, _)| name == group) {
            keys.retain(|(k, _)| k != key);
        }
    }

    pub fn remove_group(&mut self, group: &str) {
        self.groups.retain(|(name, _)| name != group);
    }
}

impl fmt::Display for DesktopEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (group, keys)) in self.groups.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{group}]")?;
            for (key, value) in keys {
                writeln!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

/// Quote one `Exec` argument per the desktop entry spec.
pub fn quote_exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(', ')', '`',
    ];
    let arg = arg.replace('%', "%%");
    if !arg.contains(RESERVED) {
        return arg;
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Writes the launcher's `.desktop` file.
pub struct DesktopEntryInstaller<'a> {
    config: &'a LauncherConfig,
}

impl<'a> DesktopEntryInstaller<'a> {
    pub fn new(config: &'a LauncherConfig) -> Self {
        DesktopEntryInstaller { config }
    }

    /// Create the desktop entry unconditionally. Requires an installation,
    /// since the icon and the template come from it.
    pub fn install(&self) -> Result<PathBuf> {
        let discord_path = &self.config.discord_path;
        let installed = InstalledState::read(discord_path)?.ok_or_else(|| {
            LauncherError::Precheck(format!(
                "Discord must be installed at \"{}\" before creating a desktop entry",
                discord_path.display()
            ))
        })?;

        let template = discord_path.join(installed.channel.desktop_file_name());
        let mut entry = if template.is_file() {
            log::info!("Reading Discord installation desktop entry");
            let text = std::fs::read_to_string(&template)
                .map_err(|e| LauncherError::fs(format!("reading {}", template.display()), e))?;
            DesktopEntry::parse(&text)
        } else {
            log::debug!("No desktop entry shipped at {}, generating one", template.display());
            DesktopEntry::application("Discord")
        };
        self.customize(&mut entry);

        let path = &self.config.desktop_entry.path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LauncherError::fs(format!("creating {}", parent.display()), e))?;
        }
        log::info!("Writing desktop entry to \"{}\"", path.display());
        std::fs::write(path, entry.to_string())
            .map_err(|e| LauncherError::fs(format!("writing {}", path.display()), e))?;
        Ok(path.clone())
    }

    fn customize(&self, entry: &mut DesktopEntry) {
        let launcher = &self.config.launcher_path;
        let launcher_arg = quote_exec_arg(&launcher.to_string_lossy());

        entry.set(
            MAIN_GROUP,
            "Icon",
            self.config.discord_path.join(ICON_NAME).to_string_lossy(),
        );
        entry.set(MAIN_GROUP, "Exec", format!("{launcher_arg} update-run"));
        match launcher.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => entry.set(MAIN_GROUP, "Path", dir.to_string_lossy()),
            None => log::error!(
                "Couldn't find the parent directory of launcher_path {}; make sure it is an absolute path",
                launcher.display()
            ),
        }
        if self.config.desktop_entry.tryexec {
            entry.set(MAIN_GROUP, "TryExec", launcher.to_string_lossy());
        } else {
            entry.remove(MAIN_GROUP, "TryExec");
        }

        let action_group = format!("Desktop Action {SETUP_ACTION}");
        if self.config.desktop_entry.setup_action {
            let gui = gui_binary(launcher);
            entry.set(MAIN_GROUP, "Actions", format!("{SETUP_ACTION};"));
            entry.set(&action_group, "Name", "Setup Launcher");
            entry.set(&action_group, "Exec", quote_exec_arg(&gui.to_string_lossy()));
        } else {
            entry.remove(MAIN_GROUP, "Actions");
            entry.remove_group(&action_group);
        }
    }

    /// Called after install/update: rewrite the entry if the config asks for it.
    pub fn sync(&self) -> Result<Option<PathBuf>> {
        if !self.config.desktop_entry.enabled {
            log::info!("Not creating desktop entry because it is disabled.");
            return Ok(None);
        }
        self.install().map(Some)
    }

    pub fn uninstall(&self) -> Result<()> {
        let path = &self.config.desktop_entry.path;
        if !path.exists() {
            return Err(LauncherError::Precheck(format!(
                "Desktop entry did not already exist at \"{}\"",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(LauncherError::Precheck(format!(
                "Desktop entry specified at \"{}\" is not a file",
                path.display()
            )));
        }
        log::info!("Removing desktop entry at \"{}\"", path.display());
        std::fs::remove_file(path)
            .map_err(|e| LauncherError::fs(format!("removing {}", path.display()), e))
    }
}

fn gui_binary(launcher: &Path) -> PathBuf {
    launcher.with_file_name(GUI_BINARY_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::error::ErrorKind;
    use crate::testing::{test_config, write_build_info};
    use tempfile::tempdir;

    #[test]
    fn parse_and_render_keep_order() {
        let text = "# comment\n[Desktop Entry]\nName=Discord\nExec=/opt/Discord/Discord\n\n[Desktop Action new]\nName=New\n";
        let entry = DesktopEntry::parse(text);
        assert_eq!(entry.get(MAIN_GROUP, "Exec"), Some("/opt/Discord/Discord"));
        assert_eq!(
            entry.to_string(),
            "[Desktop Entry]\nName=Discord\nExec=/opt/Discord/Discord\n\n[Desktop Action new]\nName=New\n"
        );
    }

    #[test]
    fn quoting_follows_exec_rules() {
        assert_eq!(quote_exec_arg("/usr/bin/discord-launcher"), "/usr/bin/discord-launcher");
        assert_eq!(quote_exec_arg("/home/a b/launcher"), "\"/home/a b/launcher\"");
        assert_eq!(quote_exec_arg("/x/$HOME"), "\"/x/\\$HOME\"");
        assert_eq!(quote_exec_arg("/x/100%"), "/x/100%%");
    }

    #[test]
    fn install_requires_discord() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let err = DesktopEntryInstaller::new(&config).install().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precheck);
        assert!(!config.desktop_entry.path.exists());
    }

    #[test]
    fn install_references_launcher() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.45", Channel::Stable);
        std::fs::write(
            config.discord_path.join("discord.desktop"),
            "[Desktop Entry]\nName=Discord\nComment=Chat\nExec=/usr/share/discord/Discord\n",
        )
        .unwrap();

        let path = DesktopEntryInstaller::new(&config).install().unwrap();
        let entry = DesktopEntry::parse(&std::fs::read_to_string(&path).unwrap());
        let launcher = config.launcher_path.to_string_lossy().to_string();
        assert_eq!(
            entry.get(MAIN_GROUP, "Exec"),
            Some(format!("{launcher} update-run").as_str())
        );
        assert_eq!(entry.get(MAIN_GROUP, "TryExec"), Some(launcher.as_str()));
        assert_eq!(entry.get(MAIN_GROUP, "Comment"), Some("Chat"));
        assert_eq!(entry.get(MAIN_GROUP, "Actions"), None);
    }

    #[test]
    fn setup_action_points_at_gui() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.desktop_entry.setup_action = true;
        config.desktop_entry.tryexec = false;
        write_build_info(&config.discord_path, "0.0.45", Channel::Canary);

        let path = DesktopEntryInstaller::new(&config).install().unwrap();
        let entry = DesktopEntry::parse(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(entry.get(MAIN_GROUP, "Actions"), Some("setup;"));
        assert_eq!(entry.get(MAIN_GROUP, "TryExec"), None);
        let gui = dir.path().join(GUI_BINARY_NAME).to_string_lossy().to_string();
        assert_eq!(entry.get("Desktop Action setup", "Exec"), Some(gui.as_str()));
    }

    #[test]
    fn sync_respects_enabled_flag() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        write_build_info(&config.discord_path, "0.0.45", Channel::Stable);
        assert_eq!(DesktopEntryInstaller::new(&config).sync().unwrap(), None);

        config.desktop_entry.enabled = true;
        let written = DesktopEntryInstaller::new(&config).sync().unwrap();
        assert_eq!(written, Some(config.desktop_entry.path.clone()));
    }

    #[test]
    fn uninstall_removes_file() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let installer = DesktopEntryInstaller::new(&config);
        assert_eq!(installer.uninstall().unwrap_err().kind(), ErrorKind::Precheck);

        write_build_info(&config.discord_path, "0.0.45", Channel::Stable);
        installer.install().unwrap();
        installer.uninstall().unwrap();
        assert!(!config.desktop_entry.path.exists());
    }
}
