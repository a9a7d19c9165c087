use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::types::Port;

/// Top-level Agent Studio configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
    /// Extra node kinds on top of the built-in templates, keyed by kind.
    #[serde(default)]
    pub templates: HashMap<String, TemplateConfig>,
}

/// How a run walks its resolved order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One node per step, strictly in resolved order.
    #[default]
    Sequential,
    /// One dependency wave per step, nodes within a wave run concurrently.
    Wave,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single node action.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    /// Duration of the simulated node action used by the CLI.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Refuse to start a run while a required input port is unconnected.
    #[serde(default = "default_enforce_required_inputs")]
    pub enforce_required_inputs: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            step_delay_ms: default_step_delay_ms(),
            mode: ExecutionMode::default(),
            enforce_required_inputs: default_enforce_required_inputs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

fn default_step_timeout_secs() -> u64 { 30 }
fn default_step_delay_ms() -> u64 { 250 }
fn default_enforce_required_inputs() -> bool { true }
fn default_event_capacity() -> usize { 256 }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: ./runs
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
        }
    }
}

fn default_log_enabled() -> bool { true }

impl LogConfig {
    /// Resolve the log directory (expand ~).
    pub fn dir(&self) -> PathBuf {
        let dir = self.log_dir.as_deref().unwrap_or("./runs");
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

/// Port layout for a node kind declared in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StudioError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| StudioError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.engine.step_timeout_secs == 0 {
            return Err(StudioError::Config(
                "engine.step_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.engine.event_capacity == 0 {
            return Err(StudioError::Config(
                "engine.event_capacity must be greater than zero".into(),
            ));
        }
        for (kind, template) in &self.templates {
            for (i, port) in template.ports.iter().enumerate() {
                if template.ports[..i].iter().any(|p| p.id == port.id) {
                    return Err(StudioError::Config(format!(
                        "template '{}' declares port '{}' twice",
                        kind, port.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortDirection;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_STUDIO_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_STUDIO_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_STUDIO_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_STUDIO_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_STUDIO_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.step_timeout_secs, 30);
        assert_eq!(config.engine.step_delay_ms, 250);
        assert_eq!(config.engine.mode, ExecutionMode::Sequential);
        assert!(config.engine.enforce_required_inputs);
        assert!(config.log.is_none());
        assert!(config.templates.is_empty());
    }

    #[test]
    fn test_template_section() {
        let toml_str = r#"
[engine]
mode = "wave"

[templates.retriever]
ports = [
  { id = "query", direction = "input", required = true },
  { id = "documents", direction = "output" },
]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.mode, ExecutionMode::Wave);
        let ports = &config.templates["retriever"].ports;
        assert_eq!(ports.len(), 2);
        assert!(ports[0].required);
        assert_eq!(ports[1].direction, PortDirection::Output);
    }

    #[test]
    fn test_duplicate_template_port_rejected() {
        let config: AppConfig = toml::from_str(
            r#"
[templates.broken]
ports = [
  { id = "in", direction = "input" },
  { id = "in", direction = "output" },
]
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(StudioError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.engine.step_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_dir_default() {
        let log = LogConfig::default();
        assert_eq!(log.dir(), PathBuf::from("./runs"));
    }
}
