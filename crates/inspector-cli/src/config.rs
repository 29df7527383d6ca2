//! Configuration file support

use inspector_agent::ProcessConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for inspector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent binary to run
    pub program: Option<String>,
    /// Base arguments, replacing the built-in defaults
    pub args: Option<Vec<String>>,
    /// Model passed via `--model`
    pub model: Option<String>,
    /// Whether to request partial output streaming
    pub stream_partial_output: Option<bool>,
    /// Variable checked for the agent's API key; empty disables the check
    pub api_key_env: Option<String>,
    /// Extra environment for the agent process
    pub env: BTreeMap<String, String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("inspector")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for INSPECTOR_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("INSPECTOR_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let defaults = ProcessConfig::default();
        let default_config = Config {
            program: Some(defaults.program),
            args: None,
            model: None,
            stream_partial_output: Some(defaults.stream_partial_output),
            api_key_env: defaults.api_key_env,
            env: BTreeMap::new(),
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// Resolve the process configuration; `program` and `model` come from CLI flags
    pub fn process_config(&self, program: Option<String>, model: Option<String>) -> ProcessConfig {
        let defaults = ProcessConfig::default();
        let base = self.args.clone().unwrap_or(defaults.default_args);
        let default_args = match model.or_else(|| self.model.clone()) {
            Some(model) => with_model(base, &model),
            None => base,
        };
        let api_key_env = match &self.api_key_env {
            Some(name) if name.is_empty() => None,
            Some(name) => Some(name.clone()),
            None => defaults.api_key_env,
        };

        ProcessConfig {
            program: program
                .or_else(|| self.program.clone())
                .unwrap_or(defaults.program),
            default_args,
            stream_partial_output: self
                .stream_partial_output
                .unwrap_or(defaults.stream_partial_output),
            api_key_env,
        }
    }
}

/// Set the `--model` value in an argument list, appending the flag if absent
pub fn with_model(mut args: Vec<String>, model: &str) -> Vec<String> {
    if let Some(pos) = args.iter().position(|arg| arg == "--model") {
        if pos + 1 < args.len() {
            args[pos + 1] = model.to_string();
        } else {
            args.push(model.to_string());
        }
        return args;
    }
    if let Some(pos) = args.iter().position(|arg| arg.starts_with("--model=")) {
        args[pos] = format!("--model={}", model);
        return args;
    }
    args.push("--model".to_string());
    args.push(model.to_string());
    args
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# inspector configuration file
# Place at ~/.config/inspector/config.toml (Linux/Mac) or %APPDATA%\inspector\config.toml (Windows)
# or point INSPECTOR_CONFIG_PATH at another file.

# Agent binary to run
program = "cursor-agent"

# Base arguments (optional; defaults to
# -p --force --model gpt-5 --output-format stream-json)
# args = ["-p", "--force", "--output-format", "stream-json"]

# Model, substituted for the --model argument
# model = "gpt-5"

# Request partial output streaming when a prompt is passed
stream_partial_output = true

# Warn when this variable is unset; set to "" to disable the check
api_key_env = "CURSOR_API_KEY"

# Extra environment for the agent process
[env]
# NO_COLOR = "1"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector_agent::DEFAULT_ARGS;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.program.as_deref(), Some("cursor-agent"));
        assert_eq!(config.stream_partial_output, Some(true));
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_with_model() {
        assert_eq!(
            with_model(strings(DEFAULT_ARGS), "sonnet-4"),
            strings(&["-p", "--force", "--model", "sonnet-4", "--output-format", "stream-json"])
        );
        assert_eq!(with_model(strings(&["-p"]), "m"), strings(&["-p", "--model", "m"]));
        assert_eq!(with_model(strings(&["--model=a"]), "b"), strings(&["--model=b"]));
    }

    #[test]
    fn test_flags_take_precedence() {
        let config: Config = toml::from_str(
            r#"
program = "/opt/agent"
model = "from-config"
api_key_env = ""

[env]
A = "1"
"#,
        )
        .unwrap();

        let process = config.process_config(None, None);
        assert_eq!(process.program, "/opt/agent");
        assert!(process.default_args.contains(&"from-config".to_string()));
        assert_eq!(process.api_key_env, None);
        assert_eq!(config.env.get("A").map(String::as_str), Some("1"));

        let process = config.process_config(Some("other".into()), Some("from-flag".into()));
        assert_eq!(process.program, "other");
        assert!(process.default_args.contains(&"from-flag".to_string()));
        assert!(!process.default_args.contains(&"from-config".to_string()));
    }

    #[test]
    fn test_defaults_when_unset() {
        let process = Config::default().process_config(None, None);
        assert_eq!(process.program, "cursor-agent");
        assert_eq!(process.default_args, strings(DEFAULT_ARGS));
        assert!(process.stream_partial_output);
        assert_eq!(process.api_key_env.as_deref(), Some("CURSOR_API_KEY"));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("inspector-config-{}", std::process::id()))
            .join("config.toml");
        let mut config = Config {
            model: Some("gpt-5".into()),
            ..Default::default()
        };
        config.env.insert("KEY".into(), "value".into());
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
        assert_eq!(Config::load_from(&path.with_file_name("missing.toml")), Config::default());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
