//! Configuration management for the inspection server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub export: ExportConfig,
    pub autosave: AutosaveConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub template_dir: PathBuf,
}

impl StorageConfig {
    /// Processed photos
    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join("inspection_images")
    }

    /// Intermediate files
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    /// Exported PDFs
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// When set, exported reports are copied here
    pub share_outbox: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub window_secs: u64,
}

impl AutosaveConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./inspections.db".to_string(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                template_dir: PathBuf::from("./templates"),
            },
            export: ExportConfig { share_outbox: None },
            autosave: AutosaveConfig {
                enabled: true,
                window_secs: 30,
            },
        }
    }
}

impl Config {
    /// Read from the process environment. Missing or malformed values fall
    /// back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or(&lookup, "SERVER_PORT", defaults.server.port),
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            storage: StorageConfig {
                data_dir: lookup("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.data_dir),
                template_dir: lookup("TEMPLATE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.template_dir),
            },
            export: ExportConfig {
                share_outbox: lookup("SHARE_OUTBOX_DIR")
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from),
            },
            autosave: AutosaveConfig {
                enabled: match lookup("AUTOSAVE_ENABLED") {
                    Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                        tracing::warn!(value = %raw, "Invalid AUTOSAVE_ENABLED, using default");
                        defaults.autosave.enabled
                    }),
                    None => defaults.autosave.enabled,
                },
                window_secs: parse_or(&lookup, "AUTOSAVE_WINDOW_SECS", defaults.autosave.window_secs),
            },
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:./inspections.db");
        assert_eq!(config.storage.image_dir(), PathBuf::from("./data/inspection_images"));
        assert!(config.export.share_outbox.is_none());
        assert!(config.autosave.enabled);
        assert_eq!(config.autosave.window(), Duration::from_secs(30));
    }

    #[test]
    fn test_values_from_env() {
        let config = config_from(&[
            ("SERVER_PORT", "8080"),
            ("DATA_DIR", "/var/lib/inspect"),
            ("SHARE_OUTBOX_DIR", "/srv/outbox"),
            ("AUTOSAVE_ENABLED", "no"),
            ("AUTOSAVE_WINDOW_SECS", "5"),
        ]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.reports_dir(), PathBuf::from("/var/lib/inspect/reports"));
        assert_eq!(config.export.share_outbox, Some(PathBuf::from("/srv/outbox")));
        assert!(!config.autosave.enabled);
        assert_eq!(config.autosave.window_secs, 5);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = config_from(&[
            ("SERVER_PORT", "eighty"),
            ("AUTOSAVE_ENABLED", "maybe"),
            ("AUTOSAVE_WINDOW_SECS", "-1"),
        ]);
        assert_eq!(config.server.port, 3000);
        assert!(config.autosave.enabled);
        assert_eq!(config.autosave.window_secs, 30);
    }
}
