use crate::parser::is_valid_time_format;
use crate::prompt;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const APP_NAME: &str = "slsh";

/// User configuration, stored as JSON.
///
/// Missing fields fall back to [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_partition: String,
    pub default_nodes: u32,
    pub default_cpus: u32,
    pub default_memory: String,
    pub default_time: String,
    pub default_qos: String,
    pub default_account: String,

    pub prompt: String,
    pub history_size: usize,
    pub show_timestamps: bool,
    pub color_output: bool,

    pub aliases: HashMap<String, String>,

    #[serde(rename = "command_timeout_seconds")]
    pub command_timeout: u64,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let aliases = [
            ("q", "queue"),
            ("j", "jobs"),
            ("n", "nodes"),
            ("h", "help"),
            ("st", "status"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            default_partition: String::new(),
            default_nodes: 1,
            default_cpus: 1,
            default_memory: String::new(),
            default_time: "01:00:00".to_string(),
            default_qos: String::new(),
            default_account: String::new(),
            prompt: prompt::DEFAULT_PROMPT.to_string(),
            history_size: 1000,
            show_timestamps: false,
            color_output: true,
            aliases,
            command_timeout: 30,
            path: None,
        }
    }
}

/// `$HOME/.config/slsh/config.json`, or `/tmp/.slshrc` without a home directory.
pub fn default_config_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".config").join(APP_NAME).join("config.json"),
        None => PathBuf::from("/tmp/.slshrc"),
    }
}

impl Config {
    /// Loads the configuration at `path`, falling back to defaults.
    ///
    /// A missing file is created with the defaults. Read, parse and validation
    /// failures are logged and yield the defaults; they never stop the shell.
    pub fn load(path: &Path) -> Self {
        let mut config = match Self::try_load(path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                let config = Self::default().with_path(path);
                if let Err(e) = config.save() {
                    warn!("could not write default config: {e:#}");
                }
                return config;
            }
            Err(e) => {
                warn!("could not load config file: {e:#}");
                Self::default()
            }
        };
        if let Err(e) = config.validate() {
            warn!("invalid config, using defaults: {e}");
            config = Self::default();
        }
        config.with_path(path)
    }

    fn try_load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("can't parse {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(Some(config))
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the configuration as pretty JSON, creating the directory if needed.
    ///
    /// A configuration without a path (e.g. in tests) is not persisted.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        }
        let data = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, data)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        debug!("saved config to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_timeout < 1 {
            bail!("command_timeout_seconds must be at least 1");
        }
        if !self.default_time.is_empty() && !is_valid_time_format(&self.default_time) {
            bail!("invalid default_time format: {}", self.default_time);
        }
        Ok(())
    }

    /// Updates one setting by its JSON name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "default_partition" => self.default_partition = value.to_string(),
            "default_nodes" => self.default_nodes = parse_number(key, value)?,
            "default_cpus" => self.default_cpus = parse_number(key, value)?,
            "default_memory" => self.default_memory = value.to_string(),
            "default_time" => {
                if !value.is_empty() && !is_valid_time_format(value) {
                    bail!("invalid default_time format: {value}");
                }
                self.default_time = value.to_string();
            }
            "default_qos" => self.default_qos = value.to_string(),
            "default_account" => self.default_account = value.to_string(),
            // a style name selects its template
            "prompt" => self.prompt = prompt::style(value).unwrap_or(value).to_string(),
            "history_size" => self.history_size = parse_number(key, value)?,
            "show_timestamps" => self.show_timestamps = parse_bool(key, value)?,
            "color_output" => self.color_output = parse_bool(key, value)?,
            "command_timeout_seconds" => {
                let secs: u64 = parse_number(key, value)?;
                if secs < 1 {
                    bail!("command_timeout_seconds must be at least 1");
                }
                self.command_timeout = secs;
            }
            _ => bail!("unknown config key: {key}"),
        }
        Ok(())
    }

    pub fn set_alias(&mut self, name: impl Into<String>, expansion: impl Into<String>) {
        self.aliases.insert(name.into(), expansion.into());
    }

    pub fn remove_alias(&mut self, name: &str) -> Option<String> {
        self.aliases.remove(name)
    }

    /// Human readable dump used by the `config` command.
    pub fn describe(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Slurm Shell Configuration ===\n\n");
        s.push_str("Job Defaults:\n");
        s.push_str(&format!("  Partition: {}\n", self.default_partition));
        s.push_str(&format!("  Nodes: {}\n", self.default_nodes));
        s.push_str(&format!("  CPUs: {}\n", self.default_cpus));
        s.push_str(&format!("  Memory: {}\n", self.default_memory));
        s.push_str(&format!("  Time: {}\n", self.default_time));
        s.push_str(&format!("  QoS: {}\n", self.default_qos));
        s.push_str(&format!("  Account: {}\n\n", self.default_account));
        s.push_str("Shell Settings:\n");
        s.push_str(&format!("  Prompt: {}\n", self.prompt));
        s.push_str(&format!("  History Size: {}\n", self.history_size));
        s.push_str(&format!("  Show Timestamps: {}\n", self.show_timestamps));
        s.push_str(&format!("  Color Output: {}\n", self.color_output));
        s.push_str(&format!(
            "  Command Timeout: {} seconds\n",
            self.command_timeout
        ));
        if !self.aliases.is_empty() {
            s.push_str("\nAliases:\n");
            let mut names: Vec<_> = self.aliases.iter().collect();
            names.sort();
            for (name, expansion) in names {
                s.push_str(&format!("  {name:<10} = {expansion}\n"));
            }
        }
        s
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("{key}: expected a number, got {value:?}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("{key}: expected true or false, got {value:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load(&path);

        assert_eq!(config.history_size, 1000);
        assert_eq!(config.aliases.get("q").map(String::as_str), Some("queue"));
        assert!(path.exists());
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"default_partition": "gpu", "aliases": {"x": "nodes"}}"#).unwrap();

        let config = Config::load(&path);

        assert_eq!(config.default_partition, "gpu");
        assert_eq!(config.command_timeout, 30);
        assert_eq!(config.aliases.len(), 1);
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = Config::load(&path);
        assert_eq!(config.prompt, "slsh> ");
        assert_eq!(config.path(), Some(path.as_path()));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"command_timeout_seconds": 0, "prompt": "x> "}"#).unwrap();

        let config = Config::load(&path);
        assert_eq!(config.command_timeout, 30);
        assert_eq!(config.prompt, "slsh> ");
    }

    #[test]
    fn test_save_and_reload_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default().with_path(&path);
        config.set_alias("gpu", "run -p gpu");
        config.remove_alias("q");
        config.save().unwrap();

        let reloaded = Config::load(&path);
        assert_eq!(
            reloaded.aliases.get("gpu").map(String::as_str),
            Some("run -p gpu")
        );
        assert!(!reloaded.aliases.contains_key("q"));
    }

    #[test]
    fn test_set_by_key() {
        let mut config = Config::default();
        config.set("default_nodes", "4").unwrap();
        config.set("show_timestamps", "yes").unwrap();
        config.set("prompt", "[%t] > ").unwrap();
        assert_eq!(config.default_nodes, 4);
        assert!(config.show_timestamps);
        assert_eq!(config.prompt, "[%t] > ");
        config.set("prompt", "user").unwrap();
        assert_eq!(config.prompt, "%u@slsh> ");

        assert!(config.set("default_nodes", "many").is_err());
        assert!(config.set("default_time", "soon").is_err());
        assert!(config.set("command_timeout_seconds", "0").is_err());
        assert!(config.set("no_such_key", "1").is_err());
    }
}
