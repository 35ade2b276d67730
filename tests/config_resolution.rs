//! Configuration layering: call override, client, environment, file, defaults.

use std::io::Write;

use tempfile::NamedTempFile;
use tideline::config::{ConfigFile, EnvSource};
use tideline::{ConfigError, ConfigResolver, RetryEngine, RetryMode, RetrySettings};

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const PROFILES: &str = r#"
[default]
retry_mode = "standard"
max_attempts = 4
region = "us-east-1"

[batch]
retry_mode = "adaptive"
max_attempts = 8
"#;

const AWS_CONFIG: &str = "\
# shared AWS config
[default]
region = us-east-1
retry_mode = standard
max_attempts = 4

[profile batch]
retry_mode = adaptive
max_attempts = 8

[sso-session corp]
sso_region = us-east-1
";

#[test]
fn test_file_is_loaded_from_env_path() {
    let file = config_file(AWS_CONFIG);
    let env = EnvSource::from_pairs([("AWS_CONFIG_FILE", file.path().to_str().unwrap())]);

    let config = ConfigResolver::new()
        .with_env(env)
        .load_config_file()
        .unwrap()
        .resolve()
        .unwrap();

    assert_eq!(config.mode(), RetryMode::Standard);
    assert_eq!(config.max_attempts(), 4);
}

#[test]
fn test_profile_selected_by_env() {
    let file = config_file(AWS_CONFIG);
    let env = EnvSource::from_pairs([
        ("AWS_CONFIG_FILE", file.path().to_str().unwrap()),
        ("AWS_PROFILE", "batch"),
    ]);

    let config = ConfigResolver::new()
        .with_env(env)
        .load_config_file()
        .unwrap()
        .resolve()
        .unwrap();

    assert_eq!(config.mode(), RetryMode::Adaptive);
    assert_eq!(config.max_attempts(), 8);
}

#[test]
fn test_toml_file_replaces_aws_config_file() {
    let toml = config_file(PROFILES);
    let env = EnvSource::from_pairs([
        ("TIDELINE_CONFIG_FILE", toml.path().to_str().unwrap()),
        ("AWS_CONFIG_FILE", "/definitely/not/here"),
        ("AWS_PROFILE", "batch"),
    ]);

    let config = ConfigResolver::new()
        .with_env(env)
        .load_config_file()
        .unwrap()
        .resolve()
        .unwrap();

    assert_eq!(config.mode(), RetryMode::Adaptive);
    assert_eq!(config.max_attempts(), 8);
}

#[test]
fn test_aws_profile_sections() {
    let file = ConfigFile::from_ini_str(AWS_CONFIG).unwrap();

    let default = file.profile("default").unwrap();
    assert_eq!(default.retry_mode.as_deref(), Some("standard"));
    assert_eq!(default.max_attempts.as_deref(), Some("4"));
    assert_eq!(
        file.profile("batch").unwrap().retry_mode.as_deref(),
        Some("adaptive")
    );
    // Only `default` and `profile <name>` sections are profiles.
    assert!(file.profile("profile batch").is_none());
    assert!(file.profile("corp").is_none());
    assert!(file.profile("sso-session corp").is_none());
}

#[test]
fn test_prefixed_default_wins_over_bare_default() {
    let file = ConfigFile::from_ini_str(
        "[profile default]\nretry_mode = adaptive\n\n[default]\nretry_mode = legacy\nmax_attempts = 2\n",
    )
    .unwrap();
    let profile = file.profile("default").unwrap();
    assert_eq!(profile.retry_mode.as_deref(), Some("adaptive"));
    assert_eq!(profile.max_attempts, None);
}

#[test]
fn test_bad_ini_attempts_fail_at_resolution() {
    let file = ConfigFile::from_ini_str("[default]\nmax_attempts = lots\n").unwrap();
    let err = ConfigResolver::new()
        .with_env(EnvSource::from_pairs(Vec::<(String, String)>::new()))
        .with_config_file(file)
        .resolve()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMaxAttempts(ref raw) if raw == "lots"));
}

#[test]
fn test_explicit_profile_beats_env_profile() {
    let file = ConfigFile::from_toml_str(PROFILES).unwrap();
    let config = ConfigResolver::new()
        .with_env(EnvSource::from_pairs([("AWS_PROFILE", "batch")]))
        .with_config_file(file)
        .with_profile("default")
        .resolve()
        .unwrap();
    assert_eq!(config.mode(), RetryMode::Standard);
}

#[test]
fn test_missing_profile_falls_back_to_defaults() {
    let file = ConfigFile::from_toml_str(PROFILES).unwrap();
    let config = ConfigResolver::new()
        .with_env(EnvSource::from_pairs([("AWS_PROFILE", "nope")]))
        .with_config_file(file)
        .resolve()
        .unwrap();
    assert_eq!(config.mode(), RetryMode::Legacy);
    assert_eq!(config.max_attempts(), 5);
}

#[test]
fn test_full_precedence_chain() {
    let file = ConfigFile::from_toml_str(PROFILES).unwrap();
    let resolver = ConfigResolver::new()
        .with_env(EnvSource::from_pairs([
            ("AWS_RETRY_MODE", "legacy"),
            ("AWS_MAX_ATTEMPTS", "6"),
        ]))
        .with_config_file(file)
        .with_client(RetrySettings::new().with_max_attempts(2));

    // client attempts, env mode
    let client = resolver.resolve().unwrap();
    assert_eq!(client.mode(), RetryMode::Legacy);
    assert_eq!(client.max_attempts(), 2);

    // call override beats everything
    let call = resolver
        .resolve_with(
            &RetrySettings::new()
                .with_mode(RetryMode::Adaptive)
                .with_max_attempts(9),
        )
        .unwrap();
    assert_eq!(call.mode(), RetryMode::Adaptive);
    assert_eq!(call.max_attempts(), 9);
}

#[test]
fn test_unknown_file_mode_fails_at_construction() {
    let file = ConfigFile::from_toml_str("[default]\nretry_mode = \"turbo\"\n").unwrap();
    let resolver = ConfigResolver::new()
        .with_env(EnvSource::from_pairs(Vec::<(String, String)>::new()))
        .with_config_file(file);

    let err = RetryEngine::from_resolver(&resolver).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownRetryMode(ref m) if m == "turbo"));
}

#[test]
fn test_missing_file_is_reported_with_path() {
    let env = EnvSource::from_pairs([("AWS_CONFIG_FILE", "/definitely/not/here.toml")]);
    let err = ConfigResolver::new().with_env(env).load_config_file().unwrap_err();
    assert!(matches!(err, ConfigError::ConfigFile { .. }));
    assert!(err.to_string().contains("/definitely/not/here.toml"));
}

#[test]
fn test_malformed_toml_file_is_parse_error() {
    let file = config_file("[default\nretry_mode = ");
    let err = ConfigFile::load_toml(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigParse { .. }));
}

#[test]
fn test_malformed_ini_file_is_parse_error() {
    let file = config_file("[default\nretry_mode = standard\n");
    let err = ConfigFile::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::IniParse { .. }));
    assert!(err.to_string().contains("failed to parse config file"));
}
