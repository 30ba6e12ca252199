//! Configuration tests.
//!
//! Verifies secret handling across config layers and the access-control
//! settings read from file.

use std::io::Write;

use warden::config::{Loader, Overrides};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{contents}").unwrap();
    file
}

/// The loader strips `jwt_secret` from TOML files before applying
/// environment and explicit overrides.
#[test]
fn jwt_secret_stripped_from_config_file() {
    let file = write_config(
        r#"
[auth]
jwt_secret = "should_be_stripped"
token_expiry_days = 7
"#,
    );

    let loader = Loader::new("CFGAUDIT_STRIP");
    let config = loader
        .load(
            Some(file.path()),
            Overrides {
                jwt_secret: Some("explicit_override_secret"),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(config.auth.jwt_secret, "explicit_override_secret");
    assert_eq!(config.auth.token_expiry_days, 7);
}

#[test]
fn file_secret_alone_is_not_enough() {
    let file = write_config(
        r#"
[auth]
jwt_secret = "file_secret_that_is_long_enough_32b"
"#,
    );

    let loader = Loader::new("CFGAUDIT_FILEONLY");
    assert!(loader.load(Some(file.path()), Overrides::default()).is_err());
}

#[test]
fn access_settings_are_read_from_file() {
    let file = write_config(
        r#"
[server]
production = true

[auth]
cookie_name = "session"
service_hosts = ["10.0.0.5"]

[rbac]
super_admin = "root@example.com"
"#,
    );

    let loader = Loader::new("CFGAUDIT_RBAC");
    let config = loader
        .load(
            Some(file.path()),
            Overrides {
                jwt_secret: Some("explicit_override_secret"),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(config.server.production);
    assert_eq!(config.auth.cookie_name, "session");
    assert_eq!(config.auth.service_hosts, vec!["10.0.0.5".to_string()]);
    assert_eq!(config.rbac.super_admin.as_deref(), Some("root@example.com"));
}

#[test]
fn explicit_super_admin_overrides_file() {
    let file = write_config(
        r#"
[rbac]
super_admin = "file@example.com"
"#,
    );

    let loader = Loader::new("CFGAUDIT_ADMIN");
    let config = loader
        .load(
            Some(file.path()),
            Overrides {
                jwt_secret: Some("explicit_override_secret"),
                super_admin: Some("cli@example.com"),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(config.rbac.super_admin.as_deref(), Some("cli@example.com"));
}
