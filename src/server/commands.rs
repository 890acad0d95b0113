//! Command-line operations for `licensegate_server`.
//!
//! ```text
//! licensegate_server                                   # serve HTTP
//! licensegate_server serve --console                   # serve HTTP and run the console
//! licensegate_server license create --limit 3 --note "Acme"
//! licensegate_server license list
//! licensegate_server license info <key>
//! licensegate_server license set-limit <key> <limit>
//! licensegate_server license enable <key>
//! licensegate_server license disable <key>
//! licensegate_server console                           # interactive operator console
//! ```
//!
//! The database file belongs to one process at a time. The `license ...`
//! one-shot commands and the standalone `console` are for a stopped server;
//! use `serve --console` to manage licenses while serving.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::LicenseResult;
use crate::license_key::LicenseKeyConfig;
use crate::operator::{parse_limit, render_info, render_list, MenuAction, OperatorConsole, Reply};
use crate::store::Database;

/// Top-level command parsed from the process arguments.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server, optionally with the console on stdin
    Serve { console: bool },
    /// Interactive operator console on stdin/stdout
    Console,
    /// One license registry operation
    License(LicenseCommand),
    /// Arguments could not be understood; carries a usage message
    Usage(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum LicenseCommand {
    Create { limit: i64, note: String },
    List,
    Info { key: String },
    SetLimit { key: String, limit: i64 },
    SetEnabled { key: String, enabled: bool },
}

const USAGE: &str = "usage: licensegate_server [serve [--console] | console | license <create|list|info|set-limit|enable|disable> ...]";

/// Parse process arguments (including the program name at index 0).
pub fn parse_command(args: &[String]) -> Command {
    if args.len() < 2 {
        return Command::Serve { console: false };
    }

    match args[1].as_str() {
        "serve" => match &args[2..] {
            [] => Command::Serve { console: false },
            [flag] if flag == "--console" => Command::Serve { console: true },
            _ => Command::Usage(format!("bad arguments for serve\n{USAGE}")),
        },
        "console" => Command::Console,
        "license" => parse_license_command(&args[2..]),
        other => Command::Usage(format!("unknown command '{other}'\n{USAGE}")),
    }
}

fn parse_license_command(args: &[String]) -> Command {
    let Some(sub) = args.first() else {
        return Command::Usage(USAGE.to_string());
    };

    let cmd = match (sub.as_str(), &args[1..]) {
        ("create", rest) => {
            let mut limit = None;
            let mut note = String::new();

            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--limit" | "-l" => {
                        limit = rest.get(i + 1).and_then(|v| parse_limit(v));
                        i += 2;
                    }
                    "--note" | "-n" => {
                        note = rest.get(i + 1).cloned().unwrap_or_default();
                        i += 2;
                    }
                    _ => i += 1,
                }
            }

            match limit {
                Some(limit) => LicenseCommand::Create { limit, note },
                None => {
                    return Command::Usage(
                        "license create requires --limit <positive integer>".to_string(),
                    )
                }
            }
        }
        ("list", _) => LicenseCommand::List,
        ("info", [key]) => LicenseCommand::Info { key: key.clone() },
        ("set-limit", [key, limit]) => match parse_limit(limit) {
            Some(limit) => LicenseCommand::SetLimit {
                key: key.clone(),
                limit,
            },
            None => return Command::Usage("limit must be a positive integer".to_string()),
        },
        ("enable", [key]) => LicenseCommand::SetEnabled {
            key: key.clone(),
            enabled: true,
        },
        ("disable", [key]) => LicenseCommand::SetEnabled {
            key: key.clone(),
            enabled: false,
        },
        (other, _) => {
            return Command::Usage(format!("bad arguments for license {other}\n{USAGE}"));
        }
    };

    Command::License(cmd)
}

/// Run one registry operation and print the outcome.
pub async fn execute_license_command(db: &Database, cmd: LicenseCommand) -> LicenseResult<()> {
    match cmd {
        LicenseCommand::Create { limit, note } => {
            let license = db.create_license(limit, &note).await?;
            println!("License created successfully!");
            println!("───────────────────────────────────────────");
            println!("Key:     {}", license.key);
            println!("Limit:   {}", license.limit);
            println!("Enabled: {}", license.enabled);
            if let Some(note) = &license.note {
                println!("Note:    {}", note);
            }
            println!("───────────────────────────────────────────");
        }
        LicenseCommand::List => {
            let list = db.list_licenses().await?;
            if list.is_empty() {
                println!("No licenses found.");
            } else {
                println!("{}", render_list("Licenses:", &list, list.len()));
            }
        }
        LicenseCommand::Info { key } => {
            let info = db.get_info(&key).await?;
            println!("{}", render_info(&info));
        }
        LicenseCommand::SetLimit { key, limit } => {
            let license = db.set_limit(&key, limit).await?;
            println!("License {} limit set to {}.", license.key, license.limit);
        }
        LicenseCommand::SetEnabled { key, enabled } => {
            let license = db.set_enabled(&key, enabled).await?;
            let state = if license.enabled { "enabled" } else { "disabled" };
            println!("License {} {}.", license.key, state);
        }
    }
    Ok(())
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.text);
    for row in &reply.buttons {
        let rendered: Vec<String> = row
            .iter()
            .map(|b| format!("[{}] :{}", b.label, b.action.callback_data()))
            .collect();
        println!("  {}", rendered.join("   "));
    }
}

/// Drive an [`OperatorConsole`] from stdin as the admin session.
///
/// Lines starting with `:` are menu actions (`:new`, `:info:<key>`), every
/// other line is a message. Ends at EOF. Stdin is read on its own thread so
/// an idle console never holds up shutdown.
pub async fn run_console(
    db: Arc<Database>,
    admin_session: i64,
    keys: LicenseKeyConfig,
) -> LicenseResult<()> {
    let console = OperatorConsole::new(db, admin_session).with_key_format(keys);
    let mut lines = stdin_lines();

    for reply in console.handle_message(admin_session, "/menu").await {
        print_reply(&reply);
    }

    while let Some(line) = lines.recv().await {
        let replies = match line.trim().strip_prefix(':') {
            Some(data) => match MenuAction::parse(data) {
                Some(action) => console.handle_action(admin_session, action).await,
                None => vec![Reply::text(format!("Unknown action '{data}'"))],
            },
            None => console.handle_message(admin_session, &line).await,
        };
        for reply in &replies {
            print_reply(reply);
        }
    }

    Ok(())
}

fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_no_args_serves() {
        assert_eq!(
            parse_command(&args(&["licensegate"])),
            Command::Serve { console: false }
        );
    }

    #[test]
    fn parse_serve_with_console() {
        assert_eq!(
            parse_command(&args(&["licensegate", "serve"])),
            Command::Serve { console: false }
        );
        assert_eq!(
            parse_command(&args(&["licensegate", "serve", "--console"])),
            Command::Serve { console: true }
        );
        assert!(matches!(
            parse_command(&args(&["licensegate", "serve", "--bogus"])),
            Command::Usage(_)
        ));
    }

    #[test]
    fn parse_console() {
        assert_eq!(
            parse_command(&args(&["licensegate", "console"])),
            Command::Console
        );
    }

    #[test]
    fn parse_create_with_note() {
        let cmd = parse_command(&args(&[
            "licensegate",
            "license",
            "create",
            "--limit",
            "3",
            "--note",
            "Acme Corp",
        ]));
        assert_eq!(
            cmd,
            Command::License(LicenseCommand::Create {
                limit: 3,
                note: "Acme Corp".to_string()
            })
        );
    }

    #[test]
    fn parse_create_requires_positive_limit() {
        let cmd = parse_command(&args(&["licensegate", "license", "create", "--limit", "0"]));
        assert!(matches!(cmd, Command::Usage(_)));
        let cmd = parse_command(&args(&["licensegate", "license", "create"]));
        assert!(matches!(cmd, Command::Usage(_)));
    }

    #[test]
    fn parse_set_limit() {
        let cmd = parse_command(&args(&["licensegate", "license", "set-limit", "LIC-X", "5"]));
        assert_eq!(
            cmd,
            Command::License(LicenseCommand::SetLimit {
                key: "LIC-X".to_string(),
                limit: 5
            })
        );
    }

    #[test]
    fn parse_enable_disable() {
        assert_eq!(
            parse_command(&args(&["licensegate", "license", "disable", "LIC-X"])),
            Command::License(LicenseCommand::SetEnabled {
                key: "LIC-X".to_string(),
                enabled: false
            })
        );
        assert!(matches!(
            parse_command(&args(&["licensegate", "license", "enable"])),
            Command::Usage(_)
        ));
    }

    #[test]
    fn parse_unknown_command() {
        assert!(matches!(
            parse_command(&args(&["licensegate", "frobnicate"])),
            Command::Usage(_)
        ));
    }
}
