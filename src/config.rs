//! Environment-driven settings
//!
//! Values are read once at process start (after `.env` is loaded by the binary).

use crate::error::RouterError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MODEL_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL_NAME: &str = "llama3.2";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 3;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TOOL_SERVER_COMMAND: &str = "python3";
const DEFAULT_TOOL_SERVER_ARGS: &str = "server.py";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Settings {
    pub model_endpoint: String,
    pub model_name: String,
    pub model_timeout: Duration,
    pub classifier_llm_enabled: bool,
    pub tool_server_command: String,
    pub tool_server_args: Vec<String>,
    pub tool_timeout: Duration,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
            classifier_llm_enabled: true,
            tool_server_command: DEFAULT_TOOL_SERVER_COMMAND.to_string(),
            tool_server_args: split_args(DEFAULT_TOOL_SERVER_ARGS),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (env, test maps)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let model_timeout_secs =
            parse_or(&lookup, "MODEL_TIMEOUT_SECS", DEFAULT_MODEL_TIMEOUT_SECS)?;
        let tool_timeout_secs =
            parse_or(&lookup, "TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?;

        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                RouterError::Config(format!("PORT must be a port number, got '{}'", raw))
            })?,
            None => defaults.port,
        };

        let classifier_llm_enabled = match lookup("CLASSIFIER_LLM_ENABLED") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                RouterError::Config(format!(
                    "CLASSIFIER_LLM_ENABLED must be true/false, got '{}'",
                    raw
                ))
            })?,
            None => defaults.classifier_llm_enabled,
        };

        Ok(Self {
            model_endpoint: lookup("MODEL_ENDPOINT")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.model_endpoint),
            model_name: lookup("MODEL_NAME").unwrap_or(defaults.model_name),
            model_timeout: Duration::from_secs(model_timeout_secs),
            classifier_llm_enabled,
            tool_server_command: lookup("TOOL_SERVER_COMMAND")
                .unwrap_or(defaults.tool_server_command),
            tool_server_args: lookup("TOOL_SERVER_ARGS")
                .map(|v| split_args(&v))
                .unwrap_or(defaults.tool_server_args),
            tool_timeout: Duration::from_secs(tool_timeout_secs),
            port,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            RouterError::Config(format!("{} must be a number, got '{}'", key, raw))
        }),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
