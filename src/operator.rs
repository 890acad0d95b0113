//! Conversational operator console for license lifecycle management.
//!
//! The console is transport-agnostic: a chat bot, a terminal or a test feeds
//! it messages and menu actions for a session id and renders the returned
//! [`Reply`] values. Each session is either idle or awaiting one piece of
//! input:
//!
//! ```text
//! idle --(menu action: new / ask_info / ask_setlimit / ask_enable / ask_disable)--> awaiting
//! awaiting --(valid input)--> idle
//! awaiting --(invalid limit / wrong arity)--> awaiting
//! any --(/start, /help, /menu, menu action "menu")--> idle
//! ```
//!
//! Only the configured admin session is served. With a key format set,
//! keys that cannot have been issued are turned away before the store is
//! asked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDateTime, SecondsFormat};
use tracing::{debug, warn};

use crate::errors::LicenseError;
use crate::license_key::{is_well_formed_key, LicenseKeyConfig};
use crate::store::{Database, LicenseInfo};

/// Rows shown by `/list`.
const LIST_LIMIT: usize = 50;
/// Rows (and info buttons) shown by the list menu action.
const LIST_BUTTON_LIMIT: usize = 20;
/// Bindings shown in a license info message.
const INFO_BINDING_LIMIT: usize = 30;
/// Notes longer than this are cut.
const NOTE_MAX_CHARS: usize = 200;

/// Input the console is waiting for in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInput {
    NewLicense,
    Info,
    SetLimit,
    Enable,
    Disable,
}

/// A menu button press, encoded as short callback data on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    Menu,
    New,
    List,
    AskInfo,
    AskSetLimit,
    AskEnable,
    AskDisable,
    Info(String),
}

impl MenuAction {
    /// Parse callback data such as `new`, `ask_info` or `info:<key>`.
    pub fn parse(data: &str) -> Option<Self> {
        let data = data.trim();
        if let Some(key) = data.strip_prefix("info:") {
            let key = key.trim();
            return (!key.is_empty()).then(|| MenuAction::Info(key.to_string()));
        }
        match data {
            "menu" => Some(MenuAction::Menu),
            "new" => Some(MenuAction::New),
            "list" => Some(MenuAction::List),
            "ask_info" => Some(MenuAction::AskInfo),
            "ask_setlimit" => Some(MenuAction::AskSetLimit),
            "ask_enable" => Some(MenuAction::AskEnable),
            "ask_disable" => Some(MenuAction::AskDisable),
            _ => None,
        }
    }

    pub fn callback_data(&self) -> String {
        match self {
            MenuAction::Menu => "menu".to_string(),
            MenuAction::New => "new".to_string(),
            MenuAction::List => "list".to_string(),
            MenuAction::AskInfo => "ask_info".to_string(),
            MenuAction::AskSetLimit => "ask_setlimit".to_string(),
            MenuAction::AskEnable => "ask_enable".to_string(),
            MenuAction::AskDisable => "ask_disable".to_string(),
            MenuAction::Info(key) => format!("info:{key}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: MenuAction,
}

impl Button {
    fn new(label: impl Into<String>, action: MenuAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// One outgoing message, optionally with rows of buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    /// The main menu under `title` (or a generic title when empty).
    pub fn menu(title: &str) -> Self {
        let title = if title.trim().is_empty() { "Menu" } else { title };
        Self {
            text: title.to_string(),
            buttons: vec![
                vec![
                    Button::new("New license", MenuAction::New),
                    Button::new("List", MenuAction::List),
                ],
                vec![
                    Button::new("Info", MenuAction::AskInfo),
                    Button::new("Change limit", MenuAction::AskSetLimit),
                ],
                vec![
                    Button::new("Enable", MenuAction::AskEnable),
                    Button::new("Disable", MenuAction::AskDisable),
                ],
            ],
        }
    }

    pub fn has_menu(&self) -> bool {
        self.buttons
            .iter()
            .flatten()
            .any(|b| b.action == MenuAction::New)
    }
}

/// Per-session conversational front end over the license store.
pub struct OperatorConsole {
    db: Arc<Database>,
    admin_session: i64,
    key_format: Option<LicenseKeyConfig>,
    sessions: Mutex<HashMap<i64, PendingInput>>,
}

impl OperatorConsole {
    pub fn new(db: Arc<Database>, admin_session: i64) -> Self {
        Self {
            db,
            admin_session,
            key_format: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Reject keys that do not have the shape `keys` generates.
    pub fn with_key_format(mut self, keys: LicenseKeyConfig) -> Self {
        self.key_format = Some(keys);
        self
    }

    /// What the session is waiting for, `None` when idle.
    pub fn pending(&self, session: i64) -> Option<PendingInput> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session)
            .copied()
    }

    fn set_pending(&self, session: i64, pending: Option<PendingInput>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match pending {
            Some(p) => {
                sessions.insert(session, p);
            }
            None => {
                sessions.remove(&session);
            }
        }
    }

    /// Handle a free-text message from `session`.
    pub async fn handle_message(&self, session: i64, text: &str) -> Vec<Reply> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        if session != self.admin_session {
            warn!("Operator message from unauthorized session {session}");
            return vec![Reply::text(
                "This console is only available to the administrator.",
            )];
        }

        if ["/start", "/help", "/menu"]
            .iter()
            .any(|cmd| text.starts_with(cmd))
        {
            self.set_pending(session, None);
            return vec![Reply::menu("License management menu")];
        }

        match self.pending(session) {
            Some(PendingInput::NewLicense) => self.new_license_input(session, text).await,
            Some(PendingInput::Info) => {
                self.set_pending(session, None);
                vec![self.info(text).await, Reply::menu("")]
            }
            Some(PendingInput::SetLimit) => self.set_limit_input(session, text).await,
            Some(PendingInput::Enable) => {
                self.set_pending(session, None);
                vec![self.set_enabled(text, true).await, Reply::menu("")]
            }
            Some(PendingInput::Disable) => {
                self.set_pending(session, None);
                vec![self.set_enabled(text, false).await, Reply::menu("")]
            }
            None => self.command(text).await,
        }
    }

    /// Handle a menu button press from `session`.
    pub async fn handle_action(&self, session: i64, action: MenuAction) -> Vec<Reply> {
        if session != self.admin_session {
            warn!("Operator action from unauthorized session {session}");
            return vec![Reply::text("Access denied.")];
        }
        debug!("Operator action {}", action.callback_data());

        match action {
            MenuAction::Menu => {
                self.set_pending(session, None);
                vec![Reply::menu("Management menu")]
            }
            MenuAction::New => {
                self.set_pending(session, Some(PendingInput::NewLicense));
                vec![Reply::text(
                    "Send the device limit, optionally followed by a note.\nExample: 3 customer-a",
                )]
            }
            MenuAction::List => {
                self.set_pending(session, None);
                vec![self.list_with_buttons().await]
            }
            MenuAction::AskInfo => {
                self.set_pending(session, Some(PendingInput::Info));
                vec![Reply::text("Send the license key:")]
            }
            MenuAction::AskSetLimit => {
                self.set_pending(session, Some(PendingInput::SetLimit));
                vec![Reply::text(
                    "Format: <license> <limit>\nExample: LIC-XXXX-XXXX 5",
                )]
            }
            MenuAction::AskEnable => {
                self.set_pending(session, Some(PendingInput::Enable));
                vec![Reply::text("Send the license key to enable:")]
            }
            MenuAction::AskDisable => {
                self.set_pending(session, Some(PendingInput::Disable));
                vec![Reply::text("Send the license key to disable:")]
            }
            MenuAction::Info(key) => {
                self.set_pending(session, None);
                vec![self.info(&key).await, Reply::menu("")]
            }
        }
    }

    async fn new_license_input(&self, session: i64, text: &str) -> Vec<Reply> {
        let Some((limit_text, note)) = split_first_word(text) else {
            return vec![Reply::text("Invalid input. Format: <limit> [note]")];
        };
        let Some(limit) = parse_limit(limit_text) else {
            return vec![Reply::text("Invalid limit.")];
        };

        match self.db.create_license(limit, note).await {
            Ok(license) => {
                self.set_pending(session, None);
                vec![
                    Reply::text(format!(
                        "License created:\n{}\nLimit: {}\nEnabled: {}\nNote: {}",
                        license.key,
                        license.limit,
                        license.enabled,
                        safe_note(license.note.as_deref())
                    )),
                    Reply::menu(""),
                ]
            }
            Err(e) => vec![error_reply(&e)],
        }
    }

    async fn set_limit_input(&self, session: i64, text: &str) -> Vec<Reply> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 2 {
            return vec![Reply::text("Invalid input. Format: <license> <limit>")];
        }
        let Some(limit) = parse_limit(fields[1]) else {
            return vec![Reply::text("Invalid limit.")];
        };

        self.set_pending(session, None);
        vec![self.set_limit(fields[0], limit).await, Reply::menu("")]
    }

    /// Slash commands accepted while idle.
    async fn command(&self, text: &str) -> Vec<Reply> {
        let (command, rest) = split_first_word(text).unwrap_or((text, ""));
        let args: Vec<&str> = rest.split_whitespace().collect();

        match command {
            "/new" => {
                let Some((limit_text, note)) = split_first_word(rest) else {
                    return vec![Reply::text("Usage: /new <limit> [note]")];
                };
                let Some(limit) = parse_limit(limit_text) else {
                    return vec![Reply::text("Invalid limit.")];
                };
                match self.db.create_license(limit, note).await {
                    Ok(license) => vec![Reply::text(format!(
                        "License created:\n{}\nLimit: {}\nEnabled: {}\nNote: {}",
                        license.key,
                        license.limit,
                        license.enabled,
                        safe_note(license.note.as_deref())
                    ))],
                    Err(e) => vec![error_reply(&e)],
                }
            }
            "/list" => vec![self.list().await],
            "/info" => match args.as_slice() {
                [key] => vec![self.info(key).await],
                _ => vec![Reply::text("Usage: /info <license>")],
            },
            "/setlimit" => match args.as_slice() {
                [key, limit] => match parse_limit(limit) {
                    Some(limit) => vec![self.set_limit(key, limit).await],
                    None => vec![Reply::text("Invalid limit.")],
                },
                _ => vec![Reply::text("Usage: /setlimit <license> <limit>")],
            },
            "/enable" => match args.as_slice() {
                [key] => vec![self.set_enabled(key, true).await],
                _ => vec![Reply::text("Usage: /enable <license>")],
            },
            "/disable" => match args.as_slice() {
                [key] => vec![self.set_enabled(key, false).await],
                _ => vec![Reply::text("Usage: /disable <license>")],
            },
            _ => vec![Reply::menu("Use the menu buttons to manage licenses.")],
        }
    }

    fn malformed_key(&self, key: &str) -> Option<Reply> {
        let format = self.key_format.as_ref()?;
        (!is_well_formed_key(key, format))
            .then(|| Reply::text(format!("Invalid license key: {key}")))
    }

    async fn info(&self, key: &str) -> Reply {
        let key = key.trim();
        if let Some(reply) = self.malformed_key(key) {
            return reply;
        }
        match self.db.get_info(key).await {
            Ok(info) => Reply::text(render_info(&info)),
            Err(e) => error_reply(&e),
        }
    }

    async fn list(&self) -> Reply {
        match self.db.list_licenses().await {
            Ok(list) if list.is_empty() => Reply::text("No licenses yet."),
            Ok(list) => Reply::text(render_list("Licenses:", &list, LIST_LIMIT)),
            Err(e) => error_reply(&e),
        }
    }

    async fn list_with_buttons(&self) -> Reply {
        let list = match self.db.list_licenses().await {
            Ok(list) if list.is_empty() => return Reply::text("No licenses yet."),
            Ok(list) => list,
            Err(e) => return error_reply(&e),
        };

        let mut buttons: Vec<Vec<Button>> = list
            .iter()
            .take(LIST_BUTTON_LIMIT)
            .map(|it| {
                vec![Button::new(
                    format!("Info {}", short_key(&it.license.key)),
                    MenuAction::Info(it.license.key.clone()),
                )]
            })
            .collect();
        buttons.push(vec![Button::new("Back to menu", MenuAction::Menu)]);

        Reply {
            text: render_list(
                "Latest licenses (press a button for details):",
                &list,
                LIST_BUTTON_LIMIT,
            ),
            buttons,
        }
    }

    async fn set_limit(&self, key: &str, limit: i64) -> Reply {
        if let Some(reply) = self.malformed_key(key) {
            return reply;
        }
        match self.db.set_limit(key, limit).await {
            Ok(license) => Reply::text(format!("OK\n{}\nNew limit: {}", license.key, license.limit)),
            Err(e) => error_reply(&e),
        }
    }

    async fn set_enabled(&self, key: &str, enabled: bool) -> Reply {
        let key = key.trim();
        if let Some(reply) = self.malformed_key(key) {
            return reply;
        }
        match self.db.set_enabled(key, enabled).await {
            Ok(license) => Reply::text(format!("OK\n{}\nEnabled: {}", license.key, license.enabled)),
            Err(e) => error_reply(&e),
        }
    }
}

fn error_reply(err: &LicenseError) -> Reply {
    Reply::text(format!("Error: {err}"))
}

/// Split off the first whitespace-delimited word; the rest is trimmed.
fn split_first_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.split_once(char::is_whitespace) {
        Some((first, rest)) => Some((first, rest.trim())),
        None => Some((text, "")),
    }
}

/// A strictly positive integer, or `None`.
pub fn parse_limit(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok().filter(|l| *l > 0)
}

fn rfc3339(ts: &NaiveDateTime) -> String {
    ts.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Trimmed note, `-` when empty, cut to 200 characters.
pub fn safe_note(note: Option<&str>) -> String {
    let note = note.unwrap_or_default().trim();
    if note.is_empty() {
        return "-".to_string();
    }
    if note.chars().count() > NOTE_MAX_CHARS {
        let cut: String = note.chars().take(NOTE_MAX_CHARS).collect();
        return format!("{cut}...");
    }
    note.to_string()
}

/// Button-sized rendering of a key: head and tail around an ellipsis.
pub fn short_key(key: &str) -> String {
    let key = key.trim();
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 18 {
        return key.to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{head}...{tail}")
}

pub fn render_info(info: &LicenseInfo) -> String {
    let mut lines = vec![
        format!("License: {}", info.license.key),
        format!("Enabled: {}", info.license.enabled),
        format!("Limit: {}", info.license.limit),
        format!("Used: {}", info.used),
        format!("Note: {}", safe_note(info.license.note.as_deref())),
        format!("Created: {}", rfc3339(&info.license.created_at)),
    ];

    if !info.bindings.is_empty() {
        lines.push("Devices:".to_string());
        for binding in info.bindings.iter().take(INFO_BINDING_LIMIT) {
            lines.push(format!(
                "- {} (last: {})",
                binding.device_id,
                rfc3339(&binding.last_seen)
            ));
        }
        if info.bindings.len() > INFO_BINDING_LIMIT {
            lines.push(format!(
                "... ({} more)",
                info.bindings.len() - INFO_BINDING_LIMIT
            ));
        }
    }

    lines.join("\n")
}

pub fn render_list(title: &str, list: &[LicenseInfo], max: usize) -> String {
    let mut lines = vec![title.to_string()];
    for it in list.iter().take(max) {
        lines.push(format!(
            "- {} | {}/{} | enabled={}",
            it.license.key, it.used, it.license.limit, it.license.enabled
        ));
    }
    if list.len() > max {
        lines.push(format!("... ({} more)", list.len() - max));
    }
    lines.join("\n")
}
