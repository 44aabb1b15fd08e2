//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use packet_intercept::config::InterceptConfig;

#[test]
fn test_default_config_validates() {
    let config = InterceptConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_zero_max_packet_size() {
    let mut config = InterceptConfig::default();
    config.limits.max_packet_size = 0;

    let errors = config.validate();
    assert!(!errors.is_empty(), "Should have validation errors");
    assert!(errors.iter().any(|e| e.contains("Max packet size")));
}

#[test]
fn test_zero_string_length() {
    let mut config = InterceptConfig::default();
    config.limits.max_string_length = 0;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max string length")));
}

#[test]
fn test_oversized_string_length() {
    let mut config = InterceptConfig::default();
    config.limits.max_string_length = usize::MAX / 2;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max string length too large")));
}

#[test]
fn test_zero_pool_size() {
    let mut config = InterceptConfig::default();
    config.buffers.pool_size = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Buffer pool size must be greater than 0")));
}

#[test]
fn test_compression_threshold_above_packet_cap() {
    let mut config = InterceptConfig::default();
    config.compression.threshold_bytes = config.limits.max_packet_size + 1;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Compression threshold cannot be larger")));
}

#[test]
fn test_decompression_cap_below_packet_cap() {
    let mut config = InterceptConfig::default();
    config.compression.max_decompressed_size = 1024;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Max decompressed size")));
}

#[test]
fn test_file_logging_requires_path() {
    let mut config = InterceptConfig::default();
    config.logging.log_to_file = true;
    config.logging.log_file_path = None;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_no_logging_outputs() {
    let mut config = InterceptConfig::default();
    config.logging.log_to_console = false;
    config.logging.log_to_file = false;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_validate_strict_returns_error() {
    let mut config = InterceptConfig::default();
    config.limits.max_packet_size = 0;
    assert!(config.validate_strict().is_err());

    let config = InterceptConfig::default();
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_toml_roundtrip() {
    let example = InterceptConfig::example_config();
    let parsed = InterceptConfig::from_toml(&example).expect("example config should parse");
    assert!(parsed.validate().is_empty());
    assert_eq!(
        parsed.limits.max_packet_size,
        InterceptConfig::default().limits.max_packet_size
    );
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = InterceptConfig::from_toml(
        r#"
        [limits]
        max_packet_size = 4096
        max_string_length = 128
        max_list_length = 32
        "#,
    )
    .expect("partial config should parse");

    assert_eq!(config.limits.max_packet_size, 4096);
    // untouched sections fall back to defaults
    assert_eq!(
        config.buffers.pool_size,
        InterceptConfig::default().buffers.pool_size
    );
}

#[test]
fn test_invalid_toml_is_rejected() {
    assert!(InterceptConfig::from_toml("limits = \"not a table\"").is_err());
    assert!(InterceptConfig::from_toml("[[[").is_err());
}

#[test]
fn test_default_with_overrides() {
    let config = InterceptConfig::default_with_overrides(|c| {
        c.compression.threshold_bytes = 512;
    });
    assert_eq!(config.compression.threshold_bytes, 512);
    assert!(config.validate().is_empty());
}
