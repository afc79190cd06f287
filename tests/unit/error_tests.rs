//! Unit tests for the error enumeration.

use agent_switchboard::AppError;

#[test]
fn display_includes_domain_prefix() {
    assert_eq!(
        AppError::Config("bad value".into()).to_string(),
        "config: bad value"
    );
    assert_eq!(AppError::Store("torn".into()).to_string(), "store: torn");
    assert_eq!(
        AppError::Process("gone".into()).to_string(),
        "process: gone"
    );
    assert_eq!(AppError::Cron("rpc".into()).to_string(), "cron: rpc");
    assert_eq!(
        AppError::NotFound("nope".into()).to_string(),
        "not found: nope"
    );
}

#[test]
fn toml_errors_convert_to_config() {
    let err: AppError = toml::from_str::<toml::Value>("not = = toml")
        .expect_err("invalid toml")
        .into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn json_errors_convert_to_store() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{oops")
        .expect_err("invalid json")
        .into();
    assert!(matches!(err, AppError::Store(_)));
}

#[test]
fn error_is_std_error() {
    let err = AppError::Io("disk".into());
    let dynamic: &dyn std::error::Error = &err;
    assert!(dynamic.to_string().contains("disk"));
}
