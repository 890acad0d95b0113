use std::env;

use serial_test::serial;

use licensegate::config::LicensegateConfig;
use licensegate::license_key::{is_well_formed_key, KeyGenerator, LicenseKeyConfig};

const VARS: &[&str] = &[
    "LICENSEGATE_SERVER_HOST",
    "LICENSEGATE_SERVER_PORT",
    "LICENSEGATE_DATABASE_URL",
    "LICENSEGATE_LICENSE_KEY_PREFIX",
    "LICENSEGATE_LICENSE_KEY_BYTES",
    "LICENSEGATE_LOG_LEVEL",
    "LICENSEGATE_ADMIN_SESSION_ID",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn load_without_overrides_uses_defaults() {
    clear_env();

    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.license.key_prefix, "LIC");
    assert_eq!(config.license.key_bytes, 20);
    assert_eq!(config.operator.admin_session_id, 0);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear_env();
    env::set_var("LICENSEGATE_SERVER_HOST", "0.0.0.0");
    env::set_var("LICENSEGATE_SERVER_PORT", "9191");
    env::set_var("LICENSEGATE_DATABASE_URL", "sqlite://var/licenses.db");
    env::set_var("LICENSEGATE_LICENSE_KEY_PREFIX", "KYPAQET");
    env::set_var("LICENSEGATE_ADMIN_SESSION_ID", "123456789");

    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.server.bind_address(), "0.0.0.0:9191");
    assert_eq!(config.database.url, "sqlite://var/licenses.db");
    assert_eq!(config.license.key_prefix, "KYPAQET");
    assert_eq!(config.operator.admin_session_id, 123456789);
    assert!(config.validate().is_ok());

    let keys = LicenseKeyConfig::from(&config.license);
    let key = keys.generate().expect("generate key");
    assert!(key.starts_with("KYPAQET-"));
    assert!(is_well_formed_key(&key, &keys));

    clear_env();
}

#[test]
#[serial]
fn unparseable_override_is_ignored() {
    clear_env();
    env::set_var("LICENSEGATE_SERVER_PORT", "not-a-port");

    let config = LicensegateConfig::load().expect("load config");
    assert_eq!(config.server.port, 8080);

    clear_env();
}

#[test]
#[serial]
fn invalid_override_fails_validation() {
    clear_env();
    env::set_var("LICENSEGATE_LOG_LEVEL", "chatty");

    let config = LicensegateConfig::load().expect("load config");
    assert!(config.validate().is_err());

    clear_env();
}
