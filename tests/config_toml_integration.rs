use fanout_provisioner::cli::{ConfigDiscovery, ConfigError, ProvisionConfig};
use std::fs;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_config_serialization_roundtrip() {
    let original = ProvisionConfig::default();

    let toml_str = original
        .to_toml_string()
        .expect("Should be able to serialize config to TOML");
    assert!(toml_str.contains("[service]"));
    assert!(toml_str.contains("[pools]"));
    assert!(toml_str.contains("[retry]"));
    assert!(toml_str.contains("[naming]"));

    let restored =
        ProvisionConfig::from_toml_str(&toml_str).expect("Should be able to parse TOML string");
    assert_eq!(original, restored);
}

#[test]
fn test_config_file_operations() {
    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");

    let mut config = ProvisionConfig::default();
    config.service.base_url = "https://identity.example.com".to_string();
    config.service.api_token = Some("token".to_string());
    config.pools.user = 16;
    config.retry.retry_terminal_errors = true;

    config
        .to_toml_file(temp_file.path())
        .expect("Should be able to write config file");
    let loaded =
        ProvisionConfig::from_toml_file(temp_file.path()).expect("Should be able to load config");

    assert_eq!(loaded, config);
    let zitadel = loaded.zitadel_config(|_| None).unwrap();
    assert_eq!(zitadel.api_token, "token");
    assert_eq!(zitadel.base_url.as_str(), "https://identity.example.com/");
}

#[test]
fn test_full_example_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fanout.toml");
    fs::write(
        &path,
        r#"
run_timeout_secs = 3600

[service]
base_url = "http://127.0.0.1.sslip.io:8080"
token_env = "MY_TOKEN"
request_timeout_secs = 10
user_password = "Another@5678"

[pools]
organization = 10
project = 20
application = 40
user = 40

[retry]
max_attempts = 4
initial_backoff_ms = 250
attempt_timeout_secs = 15

[naming]
organization_prefix = "loadtest"
randomize_suffix = false
"#,
    )
    .unwrap();

    let (config, source) = ConfigDiscovery::load(Some(&path)).unwrap();
    assert_eq!(source.as_deref(), Some(path.as_path()));
    assert_eq!(config.pools.application, 40);
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.naming.suffix_range, 10_000);

    let orchestrator = config.orchestrator_config();
    assert_eq!(orchestrator.user_password, "Another@5678");
    assert_eq!(orchestrator.naming.organization_prefix, "loadtest");

    let token = config
        .resolve_token(|name| (name == "MY_TOKEN").then(|| "secret".to_string()))
        .unwrap();
    assert_eq!(token, "secret");
}

#[test]
fn test_invalid_file_reports_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "[pools]\nproject = \"many\"\n").unwrap();

    assert!(matches!(
        ConfigDiscovery::load(Some(&path)),
        Err(ConfigError::Parse(_))
    ));
}
