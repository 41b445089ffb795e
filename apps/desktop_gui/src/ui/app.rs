use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use client_core::{
    config::{self, normalize_api_base},
    AuthMode, ClientSettings, DisplayMessage, SessionPhase,
};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use shared::domain::ConversationId;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::controller::orchestration::dispatch_backend_command;
use crate::controller::reducer::{AppViewState, ChatView, FocusTarget};
use crate::ui::theme::Palette;
use crate::ui::widgets::{avatar, inline_error};

const USERNAME_INPUT_ID: &str = "login_username";
const PASSWORD_INPUT_ID: &str = "login_password";
const NEW_CHAT_INPUT_ID: &str = "sidebar_new_chat";
const COMPOSER_INPUT_ID: &str = "thread_composer";

#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub api_base: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl StartupConfig {
    /// Loaded settings with command-line overrides applied on top.
    pub fn into_settings(self) -> anyhow::Result<ClientSettings> {
        let mut settings = config::load_settings();
        if let Some(api_base) = self.api_base {
            settings.api_base = api_base;
        }
        if let Some(data_dir) = self.data_dir {
            settings.data_dir = Some(data_dir);
        }
        settings.api_base = normalize_api_base(&settings.api_base)
            .with_context(|| format!("invalid API base '{}'", settings.api_base))?;
        Ok(settings)
    }
}

pub struct DesktopGuiApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    api_base: String,
    view: ChatView,
}

impl DesktopGuiApp {
    pub fn bootstrap(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        settings: &ClientSettings,
    ) -> Self {
        let mut app = Self {
            cmd_tx,
            ui_rx,
            api_base: settings.api_base.clone(),
            view: ChatView::default(),
        };
        app.dispatch(BackendCommand::CheckHealth);
        app.dispatch(BackendCommand::RestoreSession);
        app
    }

    fn dispatch(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.view.status);
    }

    fn dispatch_opt(&mut self, cmd: Option<BackendCommand>) {
        if let Some(cmd) = cmd {
            self.dispatch(cmd);
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            self.view.apply(event);
        }
    }

    fn text_field(
        ui: &mut egui::Ui,
        id: &'static str,
        hint: &str,
        value: &mut String,
        password: bool,
        should_focus: bool,
    ) -> egui::Response {
        let edit = egui::TextEdit::singleline(value)
            .id(egui::Id::new(id))
            .hint_text(hint)
            .password(password)
            .desired_width(f32::INFINITY);
        let response = ui.add_sized([ui.available_width(), 32.0], edit);
        if should_focus {
            response.request_focus();
        }
        response
    }

    fn backend_line(&self) -> (String, bool) {
        match &self.view.backend_status {
            None => (format!("Checking {}...", self.api_base), true),
            Some(Ok(status)) => (format!("Backend {status} at {}", self.api_base), true),
            Some(Err(reason)) => (format!("Backend unreachable: {reason}"), false),
        }
    }

    fn show_login_screen(&mut self, ctx: &egui::Context, focus: Option<FocusTarget>) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_size();
            let card_width = avail.x.clamp(360.0, 440.0);
            ui.add_space((avail.y * 0.15).clamp(18.0, 120.0));

            ui.vertical_centered(|ui| {
                ui.set_width(card_width);
                egui::Frame::NONE
                    .fill(ui.visuals().faint_bg_color)
                    .corner_radius(14.0)
                    .stroke(egui::Stroke::new(
                        1.0,
                        ui.visuals().widgets.noninteractive.bg_stroke.color,
                    ))
                    .inner_margin(egui::Margin::symmetric(20, 18))
                    .show(ui, |ui| {
                        ui.style_mut().spacing.item_spacing = egui::vec2(10.0, 10.0);
                        ui.heading("Friendly Messenger");
                        ui.weak("Chat with your friends.");

                        let mut mode = self.view.auth.mode;
                        ui.horizontal(|ui| {
                            ui.selectable_value(&mut mode, AuthMode::Login, "Log in");
                            ui.selectable_value(&mut mode, AuthMode::Register, "Sign up");
                        });
                        self.view.set_auth_mode(mode);

                        let user_resp = Self::text_field(
                            ui,
                            USERNAME_INPUT_ID,
                            "Username",
                            &mut self.view.auth.username,
                            false,
                            focus == Some(FocusTarget::Username),
                        );
                        let pass_resp = Self::text_field(
                            ui,
                            PASSWORD_INPUT_ID,
                            "Password",
                            &mut self.view.auth.password,
                            true,
                            false,
                        );

                        inline_error(ui, self.view.auth.error.as_deref());

                        let label = match self.view.auth.mode {
                            AuthMode::Login => "Log in",
                            AuthMode::Register => "Create account",
                        };
                        let busy =
                            self.view.auth.busy || self.view.phase == SessionPhase::Resolving;
                        let button = egui::Button::new(egui::RichText::new(label).strong())
                            .min_size(egui::vec2(ui.available_width(), 36.0));
                        let clicked = ui.add_enabled(!busy, button).clicked();
                        let entered = (user_resp.lost_focus() || pass_resp.lost_focus())
                            && ui.input(|i| i.key_pressed(egui::Key::Enter));
                        if clicked || entered {
                            let cmd = self.view.submit_auth();
                            self.dispatch_opt(cmd);
                        }

                        ui.separator();
                        let (line, healthy) = self.backend_line();
                        if healthy {
                            ui.small(egui::RichText::new(line).weak());
                        } else {
                            ui.small(egui::RichText::new(line).color(ui.visuals().warn_fg_color));
                        }
                        ui.small(egui::RichText::new(&self.view.status).weak());
                    });
            });
        });
    }

    fn show_sidebar(&mut self, ctx: &egui::Context, palette: Palette, focus: Option<FocusTarget>) {
        egui::SidePanel::left("conversation_sidebar")
            .resizable(false)
            .exact_width(280.0)
            .frame(
                egui::Frame::NONE
                    .fill(palette.sidebar_fill)
                    .inner_margin(egui::Margin::same(12)),
            )
            .show(ctx, |ui| {
                let me = self.view.username().unwrap_or_default().to_string();
                let mut log_out = false;
                ui.horizontal(|ui| {
                    avatar(ui, &me, 36.0);
                    ui.vertical(|ui| {
                        ui.strong(&me);
                        ui.small(egui::RichText::new("Signed in").weak());
                    });
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        log_out = ui.button("Log out").clicked();
                    });
                });
                if log_out {
                    let cmd = self.view.logout();
                    self.dispatch(cmd);
                    return;
                }

                ui.add_space(8.0);
                let mut start = false;
                ui.horizontal(|ui| {
                    let edit = egui::TextEdit::singleline(&mut self.view.new_chat)
                        .id(egui::Id::new(NEW_CHAT_INPUT_ID))
                        .hint_text("Start a chat with...")
                        .desired_width(ui.available_width() - 56.0);
                    let response = ui.add(edit);
                    if focus == Some(FocusTarget::NewChat) {
                        response.request_focus();
                    }
                    let entered =
                        response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    start = ui.button("Start").clicked() || entered;
                    if entered {
                        response.request_focus();
                    }
                });
                if start {
                    let cmd = self.view.submit_new_chat();
                    self.dispatch_opt(cmd);
                }
                inline_error(ui, self.view.chat_error.as_deref());
                ui.separator();

                if self.view.conversations_pending() {
                    ui.weak("Loading conversations…");
                } else if self.view.conversations.is_empty() {
                    ui.weak("No conversations yet. Start one above.");
                }

                let mut clicked: Option<ConversationId> = None;
                egui::ScrollArea::vertical()
                    .id_salt("conversation_list")
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        for conversation in &self.view.conversations {
                            let is_selected = self.view.selected == Some(conversation.id);
                            let fill = if is_selected {
                                palette.selected_row
                            } else {
                                egui::Color32::TRANSPARENT
                            };
                            let row = egui::Frame::NONE
                                .fill(fill)
                                .corner_radius(8.0)
                                .inner_margin(egui::Margin::symmetric(8, 6))
                                .show(ui, |ui| {
                                    ui.set_width(ui.available_width());
                                    ui.horizontal(|ui| {
                                        avatar(ui, &conversation.other_username, 32.0);
                                        ui.vertical(|ui| {
                                            ui.strong(&conversation.other_username);
                                            ui.small(
                                                egui::RichText::new(format!(
                                                    "Conversation #{}",
                                                    conversation.id
                                                ))
                                                .weak(),
                                            );
                                        });
                                    });
                                });
                            let response = row
                                .response
                                .interact(egui::Sense::click())
                                .on_hover_cursor(egui::CursorIcon::PointingHand);
                            if response.clicked() {
                                clicked = Some(conversation.id);
                            }
                        }
                    });
                if let Some(id) = clicked {
                    let cmd = self.view.select(id);
                    self.dispatch_opt(cmd);
                }
            });
    }

    fn show_composer(&mut self, ctx: &egui::Context, focus: Option<FocusTarget>) {
        egui::TopBottomPanel::bottom("thread_composer_panel")
            .resizable(false)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                inline_error(ui, self.view.send_error.as_deref());
                let enabled = self.view.can_compose();
                let composer_id = egui::Id::new(COMPOSER_INPUT_ID);
                let composer_focused = ui.memory(|m| m.has_focus(composer_id));
                // Enter sends; Shift+Enter falls through and inserts a newline.
                let enter_sends = enabled
                    && composer_focused
                    && !ui.input(|i| i.modifiers.shift)
                    && ui.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Enter));

                let mut send = enter_sends;
                ui.horizontal(|ui| {
                    let hint = if enabled {
                        "Type a message"
                    } else {
                        "Select a conversation to start typing"
                    };
                    let edit = egui::TextEdit::multiline(&mut self.view.composer)
                        .id(composer_id)
                        .hint_text(hint)
                        .desired_rows(2)
                        .desired_width(ui.available_width() - 72.0);
                    let response = ui.add_enabled(enabled, edit);
                    if enabled && focus == Some(FocusTarget::Composer) {
                        response.request_focus();
                    }
                    let button = egui::Button::new("Send").min_size(egui::vec2(64.0, 40.0));
                    send |= ui.add_enabled(enabled, button).clicked();
                });
                if send {
                    let cmd = self.view.submit_message();
                    self.dispatch_opt(cmd);
                }
                ui.add_space(6.0);
            });
    }

    fn show_thread(&mut self, ctx: &egui::Context, palette: Palette) {
        egui::CentralPanel::default().show(ctx, |ui| {
            if self.view.selected.is_none() {
                ui.centered_and_justified(|ui| {
                    ui.weak("Select a conversation or start a new one.");
                });
                return;
            }
            if let Some(conversation) = self.view.selected_conversation() {
                ui.horizontal(|ui| {
                    avatar(ui, &conversation.other_username, 36.0);
                    ui.heading(&conversation.other_username);
                });
                ui.separator();
            }
            self.show_messages(ui, palette);
        });
    }

    fn show_messages(&mut self, ui: &mut egui::Ui, palette: Palette) {
        let me = self.view.username().map(str::to_string);
        let empty = self.view.thread().next().is_none();
        if empty {
            if self.view.messages_pending() {
                ui.weak("Loading messages…");
            } else {
                ui.weak("No messages yet. Say hello!");
            }
        }

        let scroll_to_bottom = self.view.scroll.take_scroll_request();
        let output = egui::ScrollArea::vertical()
            .id_salt("message_thread")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for message in self.view.thread() {
                    message_row(ui, message, me.as_deref(), palette);
                    ui.add_space(4.0);
                }
                if scroll_to_bottom {
                    ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                }
            });
        self.view.scroll.observe(
            output.state.offset.y,
            output.content_size.y,
            output.inner_rect.height(),
        );
    }

    fn show_main_workspace(&mut self, ctx: &egui::Context, focus: Option<FocusTarget>) {
        let palette = Palette::for_visuals(&ctx.style().visuals);
        self.show_sidebar(ctx, palette, focus);
        if self.view.view_state() != AppViewState::Main {
            return;
        }
        self.show_composer(ctx, focus);
        self.show_thread(ctx, palette);
    }
}

fn message_row(ui: &mut egui::Ui, message: &DisplayMessage, me: Option<&str>, palette: Palette) {
    let own = me.is_some_and(|me| message.is_from(me));
    let (layout, bubble, text) = if own {
        (
            egui::Layout::right_to_left(egui::Align::TOP),
            palette.own_bubble,
            palette.own_text,
        )
    } else {
        (
            egui::Layout::left_to_right(egui::Align::TOP),
            palette.other_bubble,
            palette.other_text,
        )
    };
    ui.with_layout(layout, |ui| {
        avatar(ui, &message.sender_username, 30.0);
        let max_width = ui.available_width() * 0.7;
        egui::Frame::NONE
            .fill(bubble)
            .corner_radius(12.0)
            .inner_margin(egui::Margin::symmetric(10, 6))
            .show(ui, |ui| {
                ui.set_max_width(max_width);
                ui.vertical(|ui| {
                    ui.horizontal(|ui| {
                        ui.label(
                            egui::RichText::new(message.sender_label(me))
                                .strong()
                                .color(text),
                        );
                        ui.label(
                            egui::RichText::new(message.time_label())
                                .small()
                                .color(text.gamma_multiply(0.7)),
                        );
                    });
                    ui.label(egui::RichText::new(&message.text).color(text));
                });
            });
    });
}

impl eframe::App for DesktopGuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        let focus = self.view.take_focus();
        match self.view.view_state() {
            AppViewState::Login => self.show_login_screen(ctx, focus),
            AppViewState::Main => self.show_main_workspace(ctx, focus),
        }

        // Poll results arrive on the channel, not through egui input.
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
