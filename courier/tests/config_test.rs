use std::time::Duration;

use courier::config::{EnvConfig, MailSettings, ServerSettings};

#[test]
fn server_settings_load_from_prefixed_environment() {
    std::env::set_var("SMTPTEST_HOST", "mail.example.com");
    std::env::set_var("SMTPTEST_PORT", "2525");
    std::env::set_var("SMTPTEST_TLS", "true");

    let server = ServerSettings::from_env_with_prefix("SMTPTEST").unwrap();

    assert_eq!(server.hostname(), Some("mail.example.com"));
    assert_eq!(server.port, Some(2525));
    assert_eq!(server.tls, Some(true));
    assert_eq!(server.username, None);

    std::env::remove_var("SMTPTEST_HOST");
    std::env::remove_var("SMTPTEST_PORT");
    std::env::remove_var("SMTPTEST_TLS");
}

#[test]
fn mail_settings_load_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courier.toml");
    std::fs::write(
        &path,
        r#"
default_encoding = "iso-8859-1"
spool_enable = true
spool_interval = 2.0
connection_timeout = 15
spool_directory = "/var/spool/courier/unsent"

[[mail_servers]]
host = "smtp.example.com"
port = 587
username = "mailer"
password = "secret"
tls = true

[[mail_servers]]
smtp = "backup.example.com"

[signing]
sign_message = true
keystore = "/etc/courier/signer.p12"
keystore_password = "changeit"
"#,
    )
    .unwrap();

    let settings = MailSettings::load(Some(path.as_path())).unwrap();

    assert_eq!(settings.default_encoding, "iso-8859-1");
    assert!(settings.spool_enable);
    assert_eq!(settings.spool_interval(), Duration::from_secs(120));
    assert_eq!(settings.connection_timeout(), Duration::from_secs(15));
    assert_eq!(settings.spool_directory.to_str(), Some("/var/spool/courier/unsent"));
    assert_eq!(settings.bounce_directory.to_str(), Some("mail/bounced"));

    assert_eq!(settings.mail_servers.len(), 2);
    assert_eq!(settings.mail_servers[0].hostname(), Some("smtp.example.com"));
    assert_eq!(settings.mail_servers[0].port, Some(587));
    assert_eq!(settings.mail_servers[1].hostname(), Some("backup.example.com"));

    assert!(settings.signing.sign_message);
    assert_eq!(settings.signing.keystore_password.as_deref(), Some("changeit"));
}

#[test]
fn mail_settings_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(MailSettings::load(Some(dir.path().join("absent.toml").as_path())).is_err());
}

#[test]
fn environment_overrides_the_file_including_nested_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courier.toml");
    std::fs::write(
        &path,
        r#"
spool_enable = true
connection_timeout = 15

[signing]
keystore_password = "from-file"
"#,
    )
    .unwrap();

    std::env::set_var("CFGTEST_SPOOL_ENABLE", "false");
    std::env::set_var("CFGTEST_SIGNING__KEYSTORE_PASSWORD", "from-env");

    let settings = MailSettings::from_file_with_prefix(Some(path.as_path()), "CFGTEST").unwrap();

    assert!(!settings.spool_enable);
    assert_eq!(settings.connection_timeout(), Duration::from_secs(15));
    assert_eq!(settings.signing.keystore_password.as_deref(), Some("from-env"));

    std::env::remove_var("CFGTEST_SPOOL_ENABLE");
    std::env::remove_var("CFGTEST_SIGNING__KEYSTORE_PASSWORD");
}
