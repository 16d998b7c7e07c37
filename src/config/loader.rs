//! Configuration Loader
//!
//! Finds `orion-config.yaml`, overlays the section named after the active
//! environment and hands back a validated [`OrionConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::OrionConfig;
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value as YamlValue};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["orion-config.yaml", "orion-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Keys whose values never reach the logs
const REDACTED_KEYS: [&str; 4] = ["token", "password", "secret", "credential"];

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: OrionConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Search the default directory for the detected environment
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory_with_env(config_dir, &Self::detect_environment())
    }

    /// Explicit environment, leaving process variables alone
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(default_config_directory);
        let path = locate(&config_directory)?;
        let label = path.display().to_string();
        debug!(environment = environment, file = %label, "⚙️ CONFIG: Reading configuration");

        let document: YamlValue =
            serde_yaml::from_str(&read_bounded(&path)?).map_err(|e| ConfigurationError::invalid_yaml(&label, e))?;
        let config = Self::resolve(document, environment, &label)?;
        config.validate()?;

        debug!(config = %redacted(&config), "⚙️ CONFIG: Effective configuration");
        info!(
            environment = environment,
            clusters = config.clusters.len(),
            connect_string = %config.coordination.connect_string,
            management = config.management.is_some(),
            "⚙️ CONFIG: Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Parse an in-memory YAML document for `environment`
    pub fn from_yaml_str(yaml: &str, environment: &str) -> ConfigResult<OrionConfig> {
        let document: YamlValue =
            serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::invalid_yaml("<inline>", e))?;
        let config = Self::resolve(document, environment, "<inline>")?;
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &OrionConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with secrets masked
    pub fn debug_config(&self) -> JsonValue {
        redacted(&self.config)
    }

    /// `ORION_ENV`, then `APP_ENV`, else `development`
    pub fn detect_environment() -> String {
        ["ORION_ENV", "APP_ENV"]
            .iter()
            .find_map(|name| env::var(name).ok())
            .map_or_else(|| "development".to_string(), |value| value.to_lowercase())
    }

    fn resolve(document: YamlValue, environment: &str, label: &str) -> ConfigResult<OrionConfig> {
        let YamlValue::Mapping(mut base) = document else {
            return Err(ConfigurationError::invalid_yaml(label, "top level must be a mapping"));
        };

        let sections: Vec<(String, Option<YamlValue>)> = ENVIRONMENT_SECTIONS
            .iter()
            .map(|section| (section.to_string(), base.remove(*section)))
            .collect();
        if let Some((_, Some(YamlValue::Mapping(section)))) =
            sections.into_iter().find(|(name, _)| name == environment)
        {
            debug!(environment = environment, keys = section.len(), "Applying environment section");
            overlay(&mut base, section);
        }

        let mut config: OrionConfig = serde_yaml::from_value(YamlValue::Mapping(base))
            .map_err(|e| ConfigurationError::invalid_yaml(label, format!("Failed to deserialize configuration: {e}")))?;
        config.environment = environment.to_string();
        Ok(config)
    }
}

fn default_config_directory() -> PathBuf {
    env::var("ORION_CONFIG_DIR").map_or_else(|_| PathBuf::from("config"), PathBuf::from)
}

fn locate(directory: &Path) -> ConfigResult<PathBuf> {
    let candidates: Vec<PathBuf> = CONFIG_FILE_NAMES.iter().map(|name| directory.join(name)).collect();
    match candidates.iter().find(|path| path.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(ConfigurationError::config_file_not_found(candidates)),
    }
}

fn read_bounded(path: &Path) -> ConfigResult<String> {
    let label = path.display().to_string();
    let size = std::fs::metadata(path)
        .map_err(|e| ConfigurationError::file_read_error(&label, e))?
        .len();
    if size > MAX_FILE_BYTES {
        return Err(ConfigurationError::invalid_value(
            "file_size",
            size.to_string(),
            format!("configuration files are limited to {MAX_FILE_BYTES} bytes"),
        ));
    }
    std::fs::read_to_string(path).map_err(|e| ConfigurationError::file_read_error(&label, e))
}

/// Nested mappings merge key by key; any other value replaces the base
fn overlay(base: &mut Mapping, section: Mapping) {
    for (key, value) in section {
        match (base.get_mut(&key), value) {
            (Some(YamlValue::Mapping(existing)), YamlValue::Mapping(nested)) => overlay(existing, nested),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn redacted(config: &OrionConfig) -> JsonValue {
    let mut value = serde_json::to_value(config).unwrap_or(JsonValue::Null);
    mask(&mut value);
    value
}

fn mask(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let key = key.to_lowercase();
                if REDACTED_KEYS.iter().any(|secret| key.contains(secret)) {
                    if !entry.is_null() {
                        *entry = JsonValue::String("[MASKED]".to_string());
                    }
                } else {
                    mask(entry);
                }
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(mask),
        _ => {}
    }
}
