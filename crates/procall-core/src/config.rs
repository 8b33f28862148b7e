//! Configuration for callable statements

use crate::{ProcallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Callable-statement settings of a connection.
///
/// Loaded from a TOML document, or from the string parameters of a connection
/// (`ignoreProcedureType=true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallableConfig {
    /// Never consult the procedure catalog; every procedure is executed as
    /// executable (`EXECUTE PROCEDURE`)
    pub ignore_procedure_type: bool,
    /// Selectability assumed when the catalog has no entry for a procedure
    pub default_selectable: bool,
    /// Prefix of the statement ids that appear in log output
    pub statement_name_prefix: String,
}

impl Default for CallableConfig {
    fn default() -> Self {
        Self {
            ignore_procedure_type: false,
            default_selectable: false,
            statement_name_prefix: "procall".to_string(),
        }
    }
}

impl CallableConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|e| ProcallError::Configuration(format!("invalid callable config: {}", e)))
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading callable config");
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Build from connection string parameters.
    ///
    /// Keys are accepted in both `camelCase` and `snake_case`; unknown keys
    /// belong to other layers of the driver and are ignored. Giving one
    /// setting under both spellings with different values is an error.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut settings: HashMap<&'static str, (&str, &str)> = HashMap::new();
        for (key, value) in params {
            let Some(canonical) = canonical_key(key) else {
                continue;
            };
            let previous = settings.insert(canonical, (key.as_str(), value.as_str()));
            if let Some((other_key, other_value)) = previous
                && other_value != value.as_str()
            {
                return Err(ProcallError::Configuration(format!(
                    "conflicting values for parameter '{}' and '{}'",
                    other_key, key
                )));
            }
        }

        let mut config = Self::default();
        for (canonical, (key, value)) in settings {
            match canonical {
                "ignoreProcedureType" => config.ignore_procedure_type = parse_bool(key, value)?,
                "defaultSelectable" => config.default_selectable = parse_bool(key, value)?,
                _ => config.statement_name_prefix = value.to_string(),
            }
        }
        Ok(config)
    }

    /// Set a parameter from any JSON-representable value
    pub fn with_param(self, key: &str, value: impl Into<serde_json::Value>) -> Result<Self> {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let mut params = self.to_params();
        let key = canonical_key(key).unwrap_or(key);
        params.insert(key.to_string(), str_val);
        Self::from_params(&params)
    }

    /// Render as connection string parameters
    pub fn to_params(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                "ignoreProcedureType".to_string(),
                self.ignore_procedure_type.to_string(),
            ),
            (
                "defaultSelectable".to_string(),
                self.default_selectable.to_string(),
            ),
            (
                "statementNamePrefix".to_string(),
                self.statement_name_prefix.clone(),
            ),
        ])
    }
}

/// The `camelCase` spelling of a known parameter key
fn canonical_key(key: &str) -> Option<&'static str> {
    match key {
        "ignoreProcedureType" | "ignore_procedure_type" => Some("ignoreProcedureType"),
        "defaultSelectable" | "default_selectable" => Some("defaultSelectable"),
        "statementNamePrefix" | "statement_name_prefix" => Some("statementNamePrefix"),
        _ => None,
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ProcallError::Configuration(format!(
            "invalid boolean '{}' for parameter '{}'",
            other, key
        ))),
    }
}
