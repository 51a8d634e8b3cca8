//! Configuration for erlmodel

use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// File name looked up at the workspace root
pub const CONFIG_FILE: &str = "erlmodel.toml";

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# erlmodel configuration

[model]
# A top-level directory is an Erlang project when it contains this file
nature_marker = ".erlproject"
# Files with these extensions become modules
module_extensions = ["erl", "hrl"]

[project]
# Defaults for projects whose marker file leaves a setting out
source_dirs = ["src"]
include_dirs = ["include"]
output_dir = "ebin"
external_includes = []

[rpc]
# Deadline for calls to the Erlang runtime (e.g., "500ms", "5s", "1m")
timeout = "5s"
# Command that starts the runtime, e.g. ["erl", "-noshell", "-s", "erlmodel_rpc"]
# runtime_command = []

[watch]
# How often `erlmodel watch` rescans the workspace
poll_interval = "2s"

[logging]
# Fallback level when ERLMODEL_LOG is unset
level = "warn"
"#;

/// erlmodel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub project: ProjectDefaults,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_nature_marker")]
    pub nature_marker: String,
    #[serde(default = "default_module_extensions")]
    pub module_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDefaults {
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<String>,
    #[serde(default = "default_include_dirs")]
    pub include_dirs: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub external_includes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub runtime_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_nature_marker() -> String {
    ".erlproject".to_string()
}
fn default_module_extensions() -> Vec<String> {
    vec!["erl".to_string(), "hrl".to_string()]
}
fn default_source_dirs() -> Vec<String> {
    vec!["src".to_string()]
}
fn default_include_dirs() -> Vec<String> {
    vec!["include".to_string()]
}
fn default_output_dir() -> String {
    "ebin".to_string()
}
fn default_rpc_timeout() -> String {
    "5s".to_string()
}
fn default_poll_interval() -> String {
    "2s".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            nature_marker: default_nature_marker(),
            module_extensions: default_module_extensions(),
        }
    }
}

impl Default for ProjectDefaults {
    fn default() -> Self {
        Self {
            source_dirs: default_source_dirs(),
            include_dirs: default_include_dirs(),
            output_dir: default_output_dir(),
            external_includes: Vec::new(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: default_rpc_timeout(),
            runtime_command: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| ModelError::ConfigParse(e.to_string()))
    }

    /// Load `erlmodel.toml` from the workspace root, or fall back to defaults
    pub fn discover(root: &Path) -> crate::Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config to the workspace root
    pub fn init(root: &Path) -> crate::Result<()> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            return Err(ModelError::ConfigExists(path));
        }
        fs::write(&path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// RPC deadline as Duration
    pub fn rpc_timeout(&self) -> Duration {
        parse_duration(&self.rpc.timeout).unwrap_or(Duration::from_secs(5))
    }

    /// Watch rescan interval as Duration
    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.watch.poll_interval).unwrap_or(Duration::from_secs(2))
    }

    /// True when `extension` names a module file
    pub fn is_module_extension(&self, extension: &str) -> bool {
        self.model
            .module_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

/// Parse duration string (e.g., "250ms", "30m", "1d")
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }

    let (split, unit) = s.char_indices().last()?;
    let num: u64 = s[..split].parse().ok()?;

    let scale = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => return None,
    };
    num.checked_mul(scale).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.model.nature_marker, ".erlproject");
        assert_eq!(config.project.source_dirs, vec!["src"]);
        assert_eq!(config.project.output_dir, "ebin");
        assert!(config.rpc.runtime_command.is_none());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("2d"), Some(Duration::from_secs(172800)));
        assert_eq!(parse_duration("invalid"), None);
    }

    #[test]
    fn test_parse_duration_rejects_odd_input() {
        assert_eq!(parse_duration("5é"), None);
        assert_eq!(parse_duration("é"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("999999999999999999d"), None);
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Some(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_toml("[rpc]\ntimeout = \"750ms\"\n").unwrap();
        assert_eq!(config.rpc_timeout(), Duration::from_millis(750));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.is_module_extension("ERL"));
        assert!(!config.is_module_extension("beam"));
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        Config::init(dir.path()).unwrap();
        let loaded = Config::discover(dir.path()).unwrap();
        assert_eq!(loaded.watch.poll_interval, "2s");

        let err = Config::init(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::ConfigExists(_)));
    }
}
