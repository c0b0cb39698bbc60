use std::path::PathBuf;

use eframe::egui;

use crate::channel::Channel;
use crate::config::LauncherConfig;
use crate::process::ArgMergeMode;
use crate::version::VersionOrdering;

/// Editable copy of the config with paths held as text.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsForm {
    discord_path: String,
    working_directory: String,
    launch_args: Vec<String>,
    launch_args_mode: ArgMergeMode,
    launcher_path: String,
    release_channel: Channel,
    version_ordering: VersionOrdering,
    wait_for_exit: bool,
    desktop_entry_enabled: bool,
    desktop_entry_path: String,
    tryexec: bool,
    setup_action: bool,
}

fn path_text(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

impl SettingsForm {
    pub fn from_config(config: &LauncherConfig) -> Self {
        SettingsForm {
            discord_path: path_text(&config.discord_path),
            working_directory: path_text(&config.working_directory),
            launch_args: config.launch_args.clone(),
            launch_args_mode: config.launch_args_mode,
            launcher_path: path_text(&config.launcher_path),
            release_channel: config.release_channel,
            version_ordering: config.version_ordering,
            wait_for_exit: config.wait_for_exit,
            desktop_entry_enabled: config.desktop_entry.enabled,
            desktop_entry_path: path_text(&config.desktop_entry.path),
            tryexec: config.desktop_entry.tryexec,
            setup_action: config.desktop_entry.setup_action,
        }
    }

    /// `base` with the form's values applied. Fields the form does not show
    /// (marker path, download API) are kept from `base`.
    pub fn apply(&self, base: &LauncherConfig) -> LauncherConfig {
        let mut config = base.clone();
        config.discord_path = PathBuf::from(&self.discord_path);
        config.working_directory = PathBuf::from(&self.working_directory);
        config.launch_args = self
            .launch_args
            .iter()
            .filter(|arg| !arg.trim().is_empty())
            .cloned()
            .collect();
        config.launch_args_mode = self.launch_args_mode;
        config.launcher_path = PathBuf::from(&self.launcher_path);
        config.release_channel = self.release_channel;
        config.version_ordering = self.version_ordering;
        config.wait_for_exit = self.wait_for_exit;
        config.desktop_entry.enabled = self.desktop_entry_enabled;
        config.desktop_entry.path = PathBuf::from(&self.desktop_entry_path);
        config.desktop_entry.tryexec = self.tryexec;
        config.desktop_entry.setup_action = self.setup_action;
        config
    }

    pub fn render_ui(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("Discord path");
                ui.text_edit_singleline(&mut self.discord_path);
                ui.end_row();

                ui.label("Working directory");
                ui.text_edit_singleline(&mut self.working_directory);
                ui.end_row();

                ui.label("Launcher path");
                ui.text_edit_singleline(&mut self.launcher_path);
                ui.end_row();

                ui.label("Release channel");
                egui::ComboBox::from_id_salt("release_channel")
                    .selected_text(self.release_channel.as_str())
                    .show_ui(ui, |ui| {
                        for channel in Channel::ALL {
                            ui.selectable_value(&mut self.release_channel, channel, channel.as_str());
                        }
                    });
                ui.end_row();

                ui.label("Version comparison");
                ui.horizontal(|ui| {
                    ui.radio_value(&mut self.version_ordering, VersionOrdering::Semantic, "semantic");
                    ui.radio_value(
                        &mut self.version_ordering,
                        VersionOrdering::Lexicographic,
                        "lexicographic",
                    );
                });
                ui.end_row();

                ui.label("");
                ui.checkbox(&mut self.wait_for_exit, "Wait for Discord to exit");
                ui.end_row();
            });

        ui.separator();
        ui.horizontal(|ui| {
            ui.label("Launch arguments");
            ui.radio_value(&mut self.launch_args_mode, ArgMergeMode::Merge, "merge");
            ui.radio_value(&mut self.launch_args_mode, ArgMergeMode::Replace, "replace");
        });
        let mut removed = None;
        for (i, arg) in self.launch_args.iter_mut().enumerate() {
            ui.horizontal(|ui| {
                ui.text_edit_singleline(arg);
                if ui.button("Remove").clicked() {
                    removed = Some(i);
                }
            });
        }
        if let Some(i) = removed {
            self.launch_args.remove(i);
        }
        if ui.button("Add argument").clicked() {
            self.launch_args.push(String::new());
        }

        ui.separator();
        ui.checkbox(&mut self.desktop_entry_enabled, "Manage desktop entry");
        ui.add_enabled_ui(self.desktop_entry_enabled, |ui| {
            ui.horizontal(|ui| {
                ui.label("Desktop entry path");
                ui.text_edit_singleline(&mut self.desktop_entry_path);
            });
            ui.checkbox(&mut self.tryexec, "Add TryExec");
            ui.checkbox(&mut self.setup_action, "Add \"Setup Launcher\" action");
        });
    }
}
