//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_init_logging_only_once() {
    // A process may install a global subscriber exactly once
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    tracing::warn!(account = %redact_if_sensitive("account", "bob@example.com"), "after init");
}

#[test]
fn test_account_emails_are_masked() {
    let redacted = redact_if_sensitive("account", "bob@example.org");

    assert!(redacted.starts_with('b'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.org"));
}

#[test]
fn test_secrets_are_always_masked() {
    assert_eq!(redact_if_sensitive("refresh_token", "1//0g"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("client_secret", "GOCSPX"), "[REDACTED]");
}

#[test]
fn test_item_ids_pass_through() {
    assert_eq!(
        redact_if_sensitive("media_item_id", "AF1QipN9"),
        "AF1QipN9"
    );
}

#[test]
fn test_backup_paths_are_stripped() {
    assert_eq!(
        strip_path("/data/bob@example.org/2019/12/VID_0001.mp4"),
        "VID_0001.mp4"
    );
    assert_eq!(strip_path(""), "");
}
