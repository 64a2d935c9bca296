//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

/// Run the config command.
pub fn run_config(action: &ConfigAction, settings: Settings, path: Option<&PathBuf>) -> Result<()> {
    let config_path = path.cloned().unwrap_or_else(Settings::default_config_path);

    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&settings)
                .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Set { key, value } => {
            let updated = set_value(&settings, key, value)?;
            updated.save_to(&config_path)?;
            Output::success(&format!("Set {} = {}", key, value));
        }

        ConfigAction::Edit => {
            if !config_path.exists() {
                settings.save_to(&config_path)?;
                Output::info(&format!("Created default config at {:?}", config_path));
            }

            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());

            Output::info(&format!("Opening config in {}...", editor));

            let status = std::process::Command::new(&editor)
                .arg(&config_path)
                .status();

            match status {
                Ok(s) if s.success() => match Settings::load_from(Some(&config_path)) {
                    Ok(_) => Output::success("Config saved."),
                    Err(e) => Output::warning(&format!("Config no longer parses: {}", e)),
                },
                Ok(_) => {
                    Output::warning("Editor exited with non-zero status.");
                }
                Err(e) => {
                    Output::error(&format!("Failed to open editor: {}", e));
                    Output::info(&format!("Config file is at: {:?}", config_path));
                }
            }
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }

    Ok(())
}

/// Apply `section.key = value` to `settings`, rejecting unknown keys and mistyped values.
fn set_value(settings: &Settings, key: &str, raw: &str) -> Result<Settings> {
    let mut root = toml::Value::try_from(settings)?;

    let parts: Vec<&str> = key.split('.').collect();
    let Some((field, sections)) = parts.split_last() else {
        bail!("Empty config key");
    };

    let mut table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root is not a table"))?;
    for section in sections {
        table = table
            .get_mut(*section)
            .and_then(toml::Value::as_table_mut)
            .ok_or_else(|| anyhow!("Unknown config section: {}", section))?;
    }

    // Optional fields are omitted when unset, so only top-level sections must pre-exist.
    if sections.is_empty() && !table.contains_key(*field) {
        bail!("Unknown config key: {}", key);
    }
    table.insert(field.to_string(), parse_value(raw));

    let updated: Settings = root
        .try_into()
        .map_err(|e| anyhow!("Invalid value for {}: {}", key, e))?;

    // Serde ignores unknown fields; catch typos by checking the key survived.
    let check = toml::Value::try_from(&updated)?;
    let mut node = Some(&check);
    for part in &parts {
        node = node.and_then(|n| n.get(*part));
    }
    if node.is_none() {
        bail!("Unknown config key: {}", key);
    }

    Ok(updated)
}

fn parse_value(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreProvider;

    #[test]
    fn test_set_nested_values() {
        let settings = Settings::default();

        let updated = set_value(&settings, "vector_store.top_k", "4").unwrap();
        assert_eq!(updated.vector_store.top_k, 4);

        let updated = set_value(&updated, "vector_store.provider", "postgres").unwrap();
        assert_eq!(updated.vector_store.provider, StoreProvider::Postgres);

        let updated = set_value(&updated, "rag.auto_citations", "true").unwrap();
        assert!(updated.rag.auto_citations);

        let updated = set_value(&updated, "rag.answer_temperature", "0.3").unwrap();
        assert_eq!(updated.rag.answer_temperature, Some(0.3));
    }

    #[test]
    fn test_set_rejects_bad_keys_and_types() {
        let settings = Settings::default();
        assert!(set_value(&settings, "vector_store.top_k", "many").is_err());
        assert!(set_value(&settings, "nope.top_k", "1").is_err());
        assert!(set_value(&settings, "server.prot", "8080").is_err());
        assert!(set_value(&settings, "server", "8080").is_err());
    }

    #[test]
    fn test_set_persists_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let action = ConfigAction::Set {
            key: "server.port".to_string(),
            value: "8088".to_string(),
        };
        run_config(&action, Settings::default(), Some(&path)).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.server.port, 8088);
    }
}
