//! TOML-backed settings store with `AUTOSTATUS_<KEY>` environment overrides.
//!
//! The file is a flat table of the option keys. Every `load` rereads the file
//! and the environment, so edits apply to the next event.

use std::path::{Path, PathBuf};

use autostatus::{AutoStatusConfig, AutoStatusError, AutoStatusResult, ConfigStore, SettingsMap};

/// Environment variable prefix for option overrides
pub const ENV_PREFIX: &str = "AUTOSTATUS_";

pub struct TomlConfigStore {
    path: PathBuf,
    use_env: bool,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_env: true,
        }
    }

    /// Ignore environment overrides.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> AutoStatusResult<SettingsMap> {
        if !self.path.exists() {
            return Ok(SettingsMap::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        parse_settings(&text)
    }

    fn write_file(&self, values: &SettingsMap) -> AutoStatusResult<()> {
        let text = toml::to_string(values)
            .map_err(|e| AutoStatusError::config(format!("cannot render settings: {}", e)))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> AutoStatusResult<SettingsMap> {
        let mut values = self.read_file()?;
        if self.use_env {
            values.extend(env_overrides(std::env::vars()));
        }
        Ok(values)
    }

    fn save(&self, values: &SettingsMap) -> AutoStatusResult<()> {
        let mut stored = self.read_file()?;
        stored.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_file(&stored)
    }

    fn delete(&self, keys: &[&str]) -> AutoStatusResult<()> {
        let mut stored = self.read_file()?;
        for key in keys {
            stored.remove(*key);
        }
        self.write_file(&stored)
    }
}

/// Parse a flat TOML table into stored-text settings.
///
/// Booleans become `1`/`0`, numbers their decimal text, arrays of ids a CSV
/// list. Nested tables are rejected.
pub fn parse_settings(text: &str) -> AutoStatusResult<SettingsMap> {
    let table: toml::Table = text
        .parse()
        .map_err(|e| AutoStatusError::config(format!("invalid TOML: {}", e)))?;

    let mut values = SettingsMap::new();
    for (key, value) in table {
        let raw = scalar_text(&key, &value)?;
        values.insert(key, raw);
    }
    Ok(values)
}

fn scalar_text(key: &str, value: &toml::Value) -> AutoStatusResult<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        toml::Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| scalar_text(key, item))
                .collect::<AutoStatusResult<Vec<_>>>()?;
            Ok(parts.join(","))
        }
        other => Err(AutoStatusError::config(format!(
            "option '{}' must be a scalar, got {}",
            key,
            other.type_str()
        ))),
    }
}

/// Pick `AUTOSTATUS_<KEY>` overrides for known option keys.
pub fn env_overrides(vars: impl IntoIterator<Item = (String, String)>) -> SettingsMap {
    let mut values = SettingsMap::new();
    for (name, raw) in vars {
        let Some(suffix) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let key = suffix.to_lowercase();
        if AutoStatusConfig::KEYS.contains(&key.as_str()) {
            values.insert(key, normalize_env_value(&raw));
        }
    }
    values
}

/// Accept the usual spellings of booleans in the environment.
fn normalize_env_value(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" => "1".to_string(),
        "false" | "no" | "off" => "0".to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Default configuration as a TOML document.
pub fn defaults_toml() -> anyhow::Result<String> {
    Ok(toml::to_string(&AutoStatusConfig::default().to_values())?)
}
