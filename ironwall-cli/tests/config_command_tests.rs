//! Integration tests for `ironwall config` command.
//!
//! Tests config validation and display functionality with real TOML files.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use ironwall_cli::cli::{ConfigAction, ConfigArgs, OutputFormat};
use ironwall_cli::commands::config::{execute, load_or_default};
use ironwall_cli::error::CliError;
use ironwall_cli::output::OutputWriter;

fn write_config(dir: &TempDir, engine_extra: &str) -> std::path::PathBuf {
    let config_path = dir.path().join("ironwall.toml");
    let content = format!(
        r#"
[general]
log_level = "info"
log_format = "json"

[engine]
rate_threshold = 500
{engine_extra}
"#
    );
    fs::write(&config_path, content).expect("should write config");
    config_path
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

async fn validate(config_path: &Path) -> Result<(), CliError> {
    let writer = OutputWriter::new(OutputFormat::Json);
    execute(
        ConfigArgs {
            action: ConfigAction::Validate,
        },
        config_path,
        &writer,
    )
    .await
}

async fn show(config_path: &Path, section: Option<&str>) -> Result<(), CliError> {
    let writer = OutputWriter::new(OutputFormat::Text);
    execute(
        ConfigArgs {
            action: ConfigAction::Show {
                section: section.map(str::to_owned),
            },
        },
        config_path,
        &writer,
    )
    .await
}

#[tokio::test]
async fn test_config_validate_valid_toml() {
    // Given: A valid config file without a policy file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "");

    // When / Then: Validation succeeds
    validate(&config_path)
        .await
        .expect("valid config should validate");
}

#[tokio::test]
async fn test_config_validate_with_policy_file() {
    // Given: A config pointing at a well-formed policy file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let policy_path = temp_dir.path().join("policy.toml");
    fs::write(
        &policy_path,
        r#"
[[blacklist]]
addr = "203.0.113.0/24"

[[signatures]]
name = "nop-sled"
kind = "contains"
hex = "90909090"
"#,
    )
    .expect("should write policy");
    let config_path = write_config(
        &temp_dir,
        &format!("policy_path = \"{}\"", toml_path(&policy_path)),
    );

    // When / Then: Validation succeeds
    validate(&config_path)
        .await
        .expect("config with policy should validate");
}

#[tokio::test]
async fn test_config_validate_bad_signature_is_config_error() {
    // Given: A policy whose signature sets both text and hex
    let temp_dir = TempDir::new().expect("should create temp dir");
    let policy_path = temp_dir.path().join("policy.toml");
    fs::write(
        &policy_path,
        r#"
[[signatures]]
name = "both"
text = "abc"
hex = "616263"
"#,
    )
    .expect("should write policy");
    let config_path = write_config(
        &temp_dir,
        &format!("policy_path = \"{}\"", toml_path(&policy_path)),
    );

    // When: Validating
    let err = validate(&config_path)
        .await
        .expect_err("bad signature should fail validation");

    // Then: Reported as a configuration error
    assert!(matches!(err, CliError::Config(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_config_validate_zero_threshold() {
    // Given: A config with an invalid threshold
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("ironwall.toml");
    fs::write(&config_path, "[engine]\nsyn_rate_threshold = 0\n").expect("should write config");

    // When / Then: Validation fails
    let err = validate(&config_path)
        .await
        .expect_err("zero threshold should fail");
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_config_validate_malformed_toml() {
    // Given: A malformed TOML file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[engine\nrate_threshold = 1\n").expect("should write bad config");

    // When / Then: Validation fails
    assert!(validate(&config_path).await.is_err());
}

#[tokio::test]
async fn test_config_show_sections() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "closing_syn_policy = \"reject\"");

    // When / Then: Every known section renders
    for section in [None, Some("general"), Some("engine"), Some("policy")] {
        show(&config_path, section)
            .await
            .unwrap_or_else(|e| panic!("section {section:?} should render: {e}"));
    }
}

#[tokio::test]
async fn test_config_show_unknown_section() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = write_config(&temp_dir, "");

    // When: Requesting an unknown section
    let err = show(&config_path, Some("ebpf"))
        .await
        .expect_err("unknown section should fail");

    // Then: Command error listing the valid sections
    assert!(matches!(err, CliError::Command(_)));
    assert!(err.to_string().contains("general, engine, policy"));
}

#[tokio::test]
async fn test_load_or_default_missing_file() {
    // Given: A path that does not exist
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("missing.toml");

    // When: Loading with fallback
    let config = load_or_default(&config_path)
        .await
        .expect("missing file should fall back to defaults");

    // Then: Defaults are used
    assert_eq!(config.engine.rate_window_ms, 1_000);
    assert_eq!(config.engine.dns_max_udp_len, 512);
}

#[tokio::test]
async fn test_load_or_default_keeps_parse_errors() {
    // Given: A file that exists but is not valid TOML
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "not = [valid").expect("should write file");

    // When / Then: The parse error is returned, not masked by defaults
    assert!(load_or_default(&config_path).await.is_err());
}
