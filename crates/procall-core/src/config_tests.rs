//! Tests for callable configuration loading

use crate::{CallableConfig, ProcallError};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::io::Write;

#[test]
fn test_default_config() {
    let config = CallableConfig::default();
    assert!(!config.ignore_procedure_type);
    assert!(!config.default_selectable);
    assert_eq!(config.statement_name_prefix, "procall");
}

#[test]
fn test_from_toml_str() {
    let config = CallableConfig::from_toml_str(indoc! {r#"
        ignore_procedure_type = true
        statement_name_prefix = "billing"
    "#})
    .unwrap();

    assert!(config.ignore_procedure_type);
    assert!(!config.default_selectable);
    assert_eq!(config.statement_name_prefix, "billing");
}

#[test]
fn test_from_toml_rejects_unknown_keys() {
    let err = CallableConfig::from_toml_str("ignore_procedure = true").unwrap_err();
    assert!(matches!(err, ProcallError::Configuration(_)));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "default_selectable = true").unwrap();

    let config = CallableConfig::load(file.path()).unwrap();
    assert!(config.default_selectable);
}

#[test]
fn test_load_missing_file_is_io_error() {
    let err = CallableConfig::load("/definitely/not/here/procall.toml").unwrap_err();
    assert!(matches!(err, ProcallError::Io(_)));
}

#[test]
fn test_from_params_accepts_camel_case() {
    let params = HashMap::from([
        ("ignoreProcedureType".to_string(), "true".to_string()),
        ("charSet".to_string(), "UTF8".to_string()),
    ]);
    let config = CallableConfig::from_params(&params).unwrap();
    assert!(config.ignore_procedure_type);
}

#[test]
fn test_from_params_empty_flag_means_true() {
    let params = HashMap::from([("ignore_procedure_type".to_string(), String::new())]);
    assert!(CallableConfig::from_params(&params).unwrap().ignore_procedure_type);
}

#[test]
fn test_from_params_invalid_bool() {
    let params = HashMap::from([("defaultSelectable".to_string(), "maybe".to_string())]);
    let err = CallableConfig::from_params(&params).unwrap_err();
    assert!(matches!(err, ProcallError::Configuration(_)));
}

#[test]
fn test_with_param_round_trips_through_params() {
    let config = CallableConfig::default()
        .with_param("ignoreProcedureType", true)
        .unwrap();
    assert!(config.ignore_procedure_type);
    assert_eq!(
        CallableConfig::from_params(&config.to_params()).unwrap(),
        config
    );
}

#[test]
fn test_with_param_snake_case_key_wins_every_time() {
    for _ in 0..50 {
        let config = CallableConfig::default()
            .with_param("ignore_procedure_type", true)
            .unwrap()
            .with_param("statement_name_prefix", "audit")
            .unwrap();
        assert!(config.ignore_procedure_type);
        assert_eq!(config.statement_name_prefix, "audit");
    }
}

#[test]
fn test_from_params_both_spellings() {
    let agreeing = HashMap::from([
        ("defaultSelectable".to_string(), "true".to_string()),
        ("default_selectable".to_string(), "true".to_string()),
    ]);
    assert!(CallableConfig::from_params(&agreeing).unwrap().default_selectable);

    let conflicting = HashMap::from([
        ("defaultSelectable".to_string(), "true".to_string()),
        ("default_selectable".to_string(), "false".to_string()),
    ]);
    let err = CallableConfig::from_params(&conflicting).unwrap_err();
    assert!(matches!(err, ProcallError::Configuration(_)));
}
