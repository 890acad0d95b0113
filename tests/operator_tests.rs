use std::sync::Arc;

use licensegate::errors::LicenseResult;
use licensegate::license_key::{KeyGenerator, LicenseKeyConfig};
use licensegate::operator::{MenuAction, OperatorConsole, PendingInput, Reply};
use licensegate::store::Database;

const ADMIN: i64 = 4242;

async fn console() -> LicenseResult<(Arc<Database>, OperatorConsole)> {
    let db = Arc::new(Database::in_memory().await?);
    let console = OperatorConsole::new(db.clone(), ADMIN);
    Ok((db, console))
}

fn texts(replies: &[Reply]) -> Vec<&str> {
    replies.iter().map(|r| r.text.as_str()).collect()
}

// =============================================================================
// Access control
// =============================================================================

#[tokio::test]
async fn non_admin_sessions_are_refused() -> LicenseResult<()> {
    let (db, console) = console().await?;

    let replies = console.handle_message(7, "/new 3 sneaky").await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.contains("only available to the administrator"));

    let replies = console.handle_action(7, MenuAction::New).await;
    assert_eq!(texts(&replies), vec!["Access denied."]);
    assert_eq!(console.pending(7), None);

    assert!(db.list_licenses().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn blank_messages_are_ignored() -> LicenseResult<()> {
    let (_db, console) = console().await?;
    assert!(console.handle_message(ADMIN, "   ").await.is_empty());
    Ok(())
}

// =============================================================================
// Menu flows
// =============================================================================

#[tokio::test]
async fn start_shows_menu_and_resets_state() -> LicenseResult<()> {
    let (_db, console) = console().await?;

    console.handle_action(ADMIN, MenuAction::AskInfo).await;
    assert_eq!(console.pending(ADMIN), Some(PendingInput::Info));

    let replies = console.handle_message(ADMIN, "/start").await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].has_menu());
    assert_eq!(console.pending(ADMIN), None);

    Ok(())
}

#[tokio::test]
async fn new_license_flow_retries_on_bad_limit() -> LicenseResult<()> {
    let (db, console) = console().await?;

    console.handle_action(ADMIN, MenuAction::New).await;
    assert_eq!(console.pending(ADMIN), Some(PendingInput::NewLicense));

    let replies = console.handle_message(ADMIN, "lots of devices").await;
    assert_eq!(texts(&replies), vec!["Invalid limit."]);
    assert_eq!(console.pending(ADMIN), Some(PendingInput::NewLicense));

    let replies = console.handle_message(ADMIN, "0").await;
    assert_eq!(texts(&replies), vec!["Invalid limit."]);

    let replies = console.handle_message(ADMIN, "3 Acme Corp").await;
    assert_eq!(replies.len(), 2);
    assert!(replies[0].text.starts_with("License created:"));
    assert!(replies[0].text.contains("Limit: 3"));
    assert!(replies[0].text.contains("Note: Acme Corp"));
    assert!(replies[1].has_menu());
    assert_eq!(console.pending(ADMIN), None);

    let list = db.list_licenses().await?;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].license.limit, 3);
    assert_eq!(list[0].license.note.as_deref(), Some("Acme Corp"));

    Ok(())
}

#[tokio::test]
async fn set_limit_flow_requires_two_fields() -> LicenseResult<()> {
    let (db, console) = console().await?;
    let key = db.create_license(1, "").await?.key;

    console.handle_action(ADMIN, MenuAction::AskSetLimit).await;

    let replies = console.handle_message(ADMIN, &key).await;
    assert!(replies[0].text.starts_with("Invalid input"));
    assert_eq!(console.pending(ADMIN), Some(PendingInput::SetLimit));

    let replies = console.handle_message(ADMIN, &format!("{key} -2")).await;
    assert_eq!(texts(&replies), vec!["Invalid limit."]);
    assert_eq!(console.pending(ADMIN), Some(PendingInput::SetLimit));

    let replies = console.handle_message(ADMIN, &format!("{key} 5")).await;
    assert!(replies[0].text.contains("New limit: 5"));
    assert_eq!(console.pending(ADMIN), None);
    assert_eq!(db.get_info(&key).await?.license.limit, 5);

    Ok(())
}

#[tokio::test]
async fn disable_flow_blocks_activation() -> LicenseResult<()> {
    let (db, console) = console().await?;
    let key = db.create_license(2, "").await?.key;

    console.handle_action(ADMIN, MenuAction::AskDisable).await;
    let replies = console.handle_message(ADMIN, &key).await;
    assert!(replies[0].text.contains("Enabled: false"));
    assert!(replies[1].has_menu());

    assert!(!db.activate(&key, "A").await?.ok);

    console.handle_action(ADMIN, MenuAction::AskEnable).await;
    let replies = console.handle_message(ADMIN, &key).await;
    assert!(replies[0].text.contains("Enabled: true"));
    assert!(db.activate(&key, "A").await?.ok);

    Ok(())
}

#[tokio::test]
async fn info_flow_reports_unknown_key_and_returns_to_idle() -> LicenseResult<()> {
    let (_db, console) = console().await?;

    console.handle_action(ADMIN, MenuAction::AskInfo).await;
    let replies = console.handle_message(ADMIN, "LIC-NOPE").await;
    assert!(replies[0].text.starts_with("Error:"));
    assert!(replies[1].has_menu());
    assert_eq!(console.pending(ADMIN), None);

    Ok(())
}

#[tokio::test]
async fn info_button_renders_bindings() -> LicenseResult<()> {
    let (db, console) = console().await?;
    let key = db.create_license(3, "").await?.key;
    db.activate(&key, "server-01").await?;

    let replies = console.handle_action(ADMIN, MenuAction::Info(key.clone())).await;
    let text = &replies[0].text;
    assert!(text.contains(&format!("License: {key}")));
    assert!(text.contains("Used: 1"));
    assert!(text.contains("Limit: 3"));
    assert!(text.contains("Note: -"));
    assert!(text.contains("Devices:"));
    assert!(text.contains("- server-01 (last: "));

    Ok(())
}

#[tokio::test]
async fn list_action_offers_info_buttons() -> LicenseResult<()> {
    let (db, console) = console().await?;

    let replies = console.handle_action(ADMIN, MenuAction::List).await;
    assert_eq!(texts(&replies), vec!["No licenses yet."]);

    let first = db.create_license(1, "").await?.key;
    let second = db.create_license(2, "").await?.key;

    let replies = console.handle_action(ADMIN, MenuAction::List).await;
    let reply = &replies[0];
    assert!(reply.text.contains(&format!("{first} | 0/1")));
    assert!(reply.text.contains(&format!("{second} | 0/2")));

    // One info button per license plus "back to menu".
    assert_eq!(reply.buttons.len(), 3);
    let actions: Vec<&MenuAction> = reply.buttons.iter().flatten().map(|b| &b.action).collect();
    assert!(actions.contains(&&MenuAction::Info(first.clone())));
    assert!(actions.contains(&&MenuAction::Info(second.clone())));
    assert_eq!(actions.last(), Some(&&MenuAction::Menu));

    Ok(())
}

// =============================================================================
// Slash commands
// =============================================================================

#[tokio::test]
async fn slash_commands_drive_the_registry() -> LicenseResult<()> {
    let (db, console) = console().await?;

    let replies = console.handle_message(ADMIN, "/new 2 from chat").await;
    assert!(replies[0].text.starts_with("License created:"));
    let key = db.list_licenses().await?[0].license.key.clone();

    let replies = console.handle_message(ADMIN, &format!("/setlimit {key} 4")).await;
    assert!(replies[0].text.contains("New limit: 4"));

    let replies = console.handle_message(ADMIN, &format!("/disable {key}")).await;
    assert!(replies[0].text.contains("Enabled: false"));

    let replies = console.handle_message(ADMIN, &format!("/info {key}")).await;
    assert!(replies[0].text.contains("Enabled: false"));
    assert!(replies[0].text.contains("Note: from chat"));

    let replies = console.handle_message(ADMIN, "/list").await;
    assert!(replies[0].text.contains(&format!("{key} | 0/4 | enabled=false")));

    Ok(())
}

#[tokio::test]
async fn slash_commands_report_usage() -> LicenseResult<()> {
    let (_db, console) = console().await?;

    let replies = console.handle_message(ADMIN, "/info").await;
    assert_eq!(texts(&replies), vec!["Usage: /info <license>"]);

    let replies = console.handle_message(ADMIN, "/new").await;
    assert_eq!(texts(&replies), vec!["Usage: /new <limit> [note]"]);

    let replies = console.handle_message(ADMIN, "/setlimit LIC-X zero").await;
    assert_eq!(texts(&replies), vec!["Invalid limit."]);

    let replies = console.handle_message(ADMIN, "hello there").await;
    assert!(replies[0].has_menu());

    Ok(())
}

// =============================================================================
// Key format
// =============================================================================

#[tokio::test]
async fn key_format_turns_away_impossible_keys() -> LicenseResult<()> {
    let db = Arc::new(Database::in_memory().await?);
    let console =
        OperatorConsole::new(db.clone(), ADMIN).with_key_format(LicenseKeyConfig::default());
    let key = db.create_license(2, "").await?.key;

    let replies = console.handle_message(ADMIN, "/info LIC-NOPE").await;
    assert_eq!(texts(&replies), vec!["Invalid license key: LIC-NOPE"]);

    let replies = console.handle_message(ADMIN, "/disable lic-typo").await;
    assert_eq!(texts(&replies), vec!["Invalid license key: lic-typo"]);

    console.handle_action(ADMIN, MenuAction::AskSetLimit).await;
    let replies = console.handle_message(ADMIN, "LIC-NOPE 5").await;
    assert_eq!(replies[0].text, "Invalid license key: LIC-NOPE");

    // Well-formed keys still reach the store.
    let replies = console.handle_message(ADMIN, &format!("/info {key}")).await;
    assert!(replies[0].text.contains(&format!("License: {key}")));

    let unknown = LicenseKeyConfig::default().generate()?;
    let replies = console.handle_message(ADMIN, &format!("/enable {unknown}")).await;
    assert!(replies[0].text.starts_with("Error:"));

    Ok(())
}
