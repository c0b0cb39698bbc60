use std::path::PathBuf;
use std::time::{Duration, Instant};

use eframe::egui;

use super::settings::SettingsForm;
use super::task::{self, Task};
use super::{perform, Action, LoadedConfig, Startup};
use crate::config::LauncherConfig;
use crate::error::LauncherError;
use crate::install::InstalledState;
use crate::launcher::Launcher;

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Setup,
    Settings,
    Editor,
}

enum Dialog {
    Message {
        title: String,
        text: String,
    },
    Error {
        text: String,
    },
    Confirm {
        action: Action,
        text: String,
        opened: Instant,
        accept_delay: Duration,
    },
}

struct Pending {
    action: Action,
    task: Task<Result<Option<String>, LauncherError>>,
}

pub struct SetupApp {
    config_path: PathBuf,
    /// What is on disk; every action runs against this.
    saved: LauncherConfig,
    /// Last synchronized edit state; the form or the raw text is ahead of it.
    draft: LauncherConfig,
    form: SettingsForm,
    raw: String,
    tab: Tab,
    halt_actions: bool,
    problems: Vec<String>,
    status: Option<(String, Instant)>,
    installed_label: String,
    latest_label: String,
    latest_task: Option<Task<Result<String, LauncherError>>>,
    pending: Vec<Pending>,
    dialogs: Vec<Dialog>,
}

impl eframe::App for SetupApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll();
        self.ui(ctx);
    }
}

impl SetupApp {
    pub fn new(
        config_path: PathBuf,
        loaded: LoadedConfig,
        startup: Startup,
        ctx: &egui::Context,
    ) -> Self {
        let form = SettingsForm::from_config(&loaded.config);
        let mut app = SetupApp {
            config_path,
            saved: loaded.config.clone(),
            draft: loaded.config.clone(),
            form,
            raw: String::new(),
            tab: startup.tab.unwrap_or(Tab::Setup),
            halt_actions: false,
            problems: Vec::new(),
            status: None,
            installed_label: String::new(),
            latest_label: String::new(),
            latest_task: None,
            pending: Vec::new(),
            dialogs: Vec::new(),
        };
        app.apply_loaded(loaded);
        if let Some((action, text)) = startup.error {
            app.show_error(action, &text);
        }
        if let Some(action) = startup.confirm {
            app.request(action, ctx);
        }
        app.check_latest(ctx);
        app
    }

    fn apply_loaded(&mut self, loaded: LoadedConfig) {
        self.problems = loaded.problems();
        self.halt_actions = loaded.notice.is_some();
        if let Some(notice) = loaded.notice {
            self.show_message("Alert", notice);
        }
        self.saved = loaded.config.clone();
        self.set_draft(loaded.config);
        self.refresh_installed_label();
    }

    fn reload(&mut self, ctx: &egui::Context) {
        self.apply_loaded(LoadedConfig::load(&self.config_path));
        self.set_status("Reloaded");
        self.check_latest(ctx);
    }

    fn save(&mut self) {
        let draft = match self.current_draft() {
            Ok(draft) => draft,
            Err(e) => return self.show_error_text("saving the configuration", &e),
        };
        let loaded = LoadedConfig {
            config: draft,
            notice: None,
        };
        let problems = loaded.problems();
        if !problems.is_empty() {
            let text = format!("Configuration is invalid:\n- {}", problems.join("\n- "));
            return self.show_error_text("saving the configuration", &text);
        }
        if let Err(e) = loaded.config.save(&self.config_path) {
            return self.show_error_text("saving the configuration", &e.to_string());
        }
        log::info!("Saved configuration to {}", self.config_path.display());
        self.problems.clear();
        self.halt_actions = false;
        self.saved = loaded.config.clone();
        self.set_draft(loaded.config);
        self.refresh_installed_label();
        self.set_status("Saved");
    }

    fn set_draft(&mut self, config: LauncherConfig) {
        self.form = SettingsForm::from_config(&config);
        self.raw = config
            .to_toml()
            .unwrap_or_else(|e| format!("# failed to serialize the configuration: {e}\n"));
        self.draft = config;
    }

    /// The config as currently edited on the active tab.
    fn current_draft(&self) -> Result<LauncherConfig, String> {
        match self.tab {
            Tab::Editor => LauncherConfig::from_toml(&self.raw).map_err(|e| e.to_string()),
            Tab::Setup | Tab::Settings => Ok(self.form.apply(&self.draft)),
        }
    }

    fn unsaved(&self) -> bool {
        self.current_draft().map_or(true, |draft| draft != self.saved)
    }

    fn switch_tab(&mut self, tab: Tab) {
        if tab == self.tab {
            return;
        }
        match self.current_draft() {
            Ok(draft) => {
                self.set_draft(draft);
                self.tab = tab;
            }
            Err(e) => self.show_error_text("reading the edited configuration", &e),
        }
    }

    fn set_status(&mut self, text: &str) {
        self.status = Some((text.to_string(), Instant::now()));
    }

    fn show_message(&mut self, title: &str, text: String) {
        self.dialogs.push(Dialog::Message {
            title: title.to_string(),
            text,
        });
    }

    fn show_error_text(&mut self, while_doing: &str, err: &str) {
        self.dialogs.push(Dialog::Error {
            text: format!("An error occurred while {while_doing}:\n{err}"),
        });
    }

    fn show_error(&mut self, action: Action, err: &str) {
        self.show_error_text(action.describe(), err);
    }

    fn refresh_installed_label(&mut self) {
        self.installed_label = match InstalledState::read(&self.saved.discord_path) {
            Ok(Some(state)) => format!("Installed version: {} ({})", state.version, state.channel),
            Ok(None) => "Installed version: not installed".to_string(),
            Err(e) => format!("Installed version: unknown ({e})"),
        };
    }

    fn check_latest(&mut self, ctx: &egui::Context) {
        let config = self.saved.clone();
        self.latest_label = "Latest version: checking...".to_string();
        self.latest_task = Some(task::spawn(ctx, move || -> Result<String, LauncherError> {
            Launcher::from_config(config)?.latest_version()
        }));
    }

    fn actions_enabled(&self) -> bool {
        !self.halt_actions
            && self.problems.is_empty()
            && self.pending.iter().all(|p| p.action == Action::Stop)
    }

    fn request(&mut self, action: Action, ctx: &egui::Context) {
        match action.confirmation(&self.saved) {
            Some((text, accept_delay)) => self.dialogs.push(Dialog::Confirm {
                action,
                text,
                opened: Instant::now(),
                accept_delay,
            }),
            None => self.start(action, ctx),
        }
    }

    fn start(&mut self, action: Action, ctx: &egui::Context) {
        log::debug!("Starting: {}", action.describe());
        let config = self.saved.clone();
        let task = task::spawn(ctx, move || perform(action, config));
        self.pending.push(Pending { action, task });
    }

    fn poll(&mut self) {
        if let Some(result) = self.latest_task.as_ref().and_then(|t| t.take_result()) {
            self.latest_task = None;
            self.latest_label = match result {
                Ok(version) => format!("Latest version: {version}"),
                Err(e) => format!("Latest version: unknown ({e})"),
            };
        }

        let mut finished = Vec::new();
        self.pending.retain(|pending| match pending.task.take_result() {
            Some(result) => {
                finished.push((pending.action, result));
                false
            }
            None => true,
        });
        for (action, result) in finished {
            match result {
                Ok(Some(message)) => self.show_message("Alert", message),
                Ok(None) => {}
                Err(LauncherError::AlreadyRunning { .. }) => self.show_message(
                    "Error",
                    "Discord is already running. Please close it before running it again.".to_string(),
                ),
                Err(e) => self.show_error(action, &e.to_string()),
            }
            self.refresh_installed_label();
        }

        if self
            .status
            .as_ref()
            .is_some_and(|(_, at)| at.elapsed() >= STATUS_TIMEOUT)
        {
            self.status = None;
        }
    }

    fn ui(&mut self, ctx: &egui::Context) {
        let mut requested_tab = None;
        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                for (tab, label) in [
                    (Tab::Setup, "Setup"),
                    (Tab::Settings, "Settings"),
                    (Tab::Editor, "Config file"),
                ] {
                    if ui.selectable_label(self.tab == tab, label).clicked() {
                        requested_tab = Some(tab);
                    }
                }
            });
        });
        if let Some(tab) = requested_tab {
            self.switch_tab(tab);
        }

        let mut save = false;
        let mut reload = false;
        egui::TopBottomPanel::bottom("config_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match &self.status {
                    Some((text, _)) => ui.label(text.as_str()),
                    None => ui.label(self.config_path.display().to_string()),
                };
                if self.unsaved() {
                    ui.weak("(unsaved changes)");
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    save = ui.button("Save").clicked();
                    reload = ui.button("Reload").clicked();
                });
            });
        });
        if save {
            self.save();
        }
        if reload {
            self.reload(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Setup => self.setup_tab(ui),
            Tab::Settings => {
                egui::ScrollArea::vertical().show(ui, |ui| self.form.render_ui(ui));
            }
            Tab::Editor => {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.raw)
                            .code_editor()
                            .desired_width(f32::INFINITY)
                            .desired_rows(24),
                    );
                });
            }
        });

        self.dialog_ui(ctx);
    }

    fn setup_tab(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let mut requested = None;

        ui.heading("Discord");
        ui.label(self.installed_label.as_str());
        ui.horizontal(|ui| {
            ui.label(self.latest_label.as_str());
            if ui
                .add_enabled(self.latest_task.is_none(), egui::Button::new("Check"))
                .clicked()
            {
                self.check_latest(&ctx);
            }
        });

        if self.halt_actions {
            ui.colored_label(
                ui.visuals().warn_fg_color,
                "Save the configuration before continuing.",
            );
        }
        for problem in &self.problems {
            ui.colored_label(ui.visuals().error_fg_color, problem.as_str());
        }
        if self.unsaved() {
            ui.weak("Actions use the saved configuration.");
        }

        ui.separator();
        ui.add_enabled_ui(self.actions_enabled(), |ui| {
            if ui.button("Update and run Discord").clicked() {
                requested = Some(Action::UpdateRun);
            }
            ui.horizontal(|ui| {
                if ui.button("Run").clicked() {
                    requested = Some(Action::Run);
                }
                if ui.button("Update").clicked() {
                    requested = Some(Action::Update);
                }
                if ui.button("Install").clicked() {
                    requested = Some(Action::Install);
                }
                if ui.button("Uninstall").clicked() {
                    requested = Some(Action::Uninstall);
                }
            });
            ui.horizontal(|ui| {
                if ui.button("Install desktop entry").clicked() {
                    requested = Some(Action::InstallDesktopEntry);
                }
                if ui.button("Remove desktop entry").clicked() {
                    requested = Some(Action::UninstallDesktopEntry);
                }
            });
        });
        let stopping = self.pending.iter().any(|p| p.action == Action::Stop);
        if ui
            .add_enabled(!stopping, egui::Button::new("Stop Discord"))
            .clicked()
        {
            requested = Some(Action::Stop);
        }

        for pending in &self.pending {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(pending.action.describe());
            });
        }

        if let Some(action) = requested {
            self.request(action, &ctx);
        }
    }

    fn dialog_ui(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.dialogs.first() else {
            return;
        };
        let mut close = false;
        let mut confirmed = None;

        let window = |title: &str| {
            egui::Window::new(title.to_string())
                .id(egui::Id::new("dialog"))
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        };
        match dialog {
            Dialog::Message { title, text } => {
                window(title).show(ctx, |ui| {
                    ui.label(text.as_str());
                    close = ui.button("OK").clicked();
                });
            }
            Dialog::Error { text } => {
                window("Error").show(ctx, |ui| {
                    ui.label(text.as_str());
                    ui.horizontal(|ui| {
                        if ui.button("Copy").clicked() {
                            ui.ctx().copy_text(text.clone());
                        }
                        close = ui.button("OK").clicked();
                    });
                });
            }
            Dialog::Confirm {
                action,
                text,
                opened,
                accept_delay,
            } => {
                let remaining = accept_delay.saturating_sub(opened.elapsed());
                window("Warning").show(ctx, |ui| {
                    ui.label(text.as_str());
                    ui.horizontal(|ui| {
                        if ui
                            .add_enabled(remaining.is_zero(), egui::Button::new("Yes"))
                            .clicked()
                        {
                            confirmed = Some(*action);
                            close = true;
                        }
                        if ui.button("No").clicked() {
                            close = true;
                        }
                    });
                });
                if !remaining.is_zero() {
                    ctx.request_repaint_after(remaining);
                }
            }
        }

        if close {
            self.dialogs.remove(0);
        }
        if let Some(action) = confirmed {
            self.start(action, ctx);
        }
    }
}
