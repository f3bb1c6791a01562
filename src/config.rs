//! Environment-driven settings for binaries embedding the dispatcher.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::registry::CapabilityRegistry;
use crate::types::AgentConfig;

pub const REGISTRY_PATH_VAR: &str = "MCP_ROUTER_REGISTRY";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const MODEL_VAR: &str = "OPENAI_MODEL";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const MAX_ITERATIONS_VAR: &str = "MCP_ROUTER_MAX_ITERATIONS";
pub const PARALLEL_ACTIONS_VAR: &str = "MCP_ROUTER_PARALLEL_ACTIONS";
pub const REQUEST_TIMEOUT_VAR: &str = "MCP_ROUTER_REQUEST_TIMEOUT_SECS";

const DEFAULT_REGISTRY_PATH: &str = "servers.json";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone)]
pub struct Settings {
    pub registry_path: PathBuf,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub agent: AgentConfig,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("registry_path", &self.registry_path)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("agent", &self.agent)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// [`AgentError::Config`] if the API key is missing or a value is malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, treating empty values as unset.
    ///
    /// # Errors
    ///
    /// See [`Settings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let api_key = get(API_KEY_VAR)
            .ok_or_else(|| AgentError::Config(format!("{API_KEY_VAR} is not set")))?;

        let mut agent = AgentConfig::default();
        if let Some(raw) = get(MAX_ITERATIONS_VAR) {
            agent.max_iterations = parse_max_iterations(&raw)?;
        }
        if let Some(raw) = get(PARALLEL_ACTIONS_VAR) {
            agent.parallel_actions = parse_bool(PARALLEL_ACTIONS_VAR, &raw)?;
        }
        if let Some(raw) = get(REQUEST_TIMEOUT_VAR) {
            let secs: u64 = raw.parse().map_err(|_| invalid(REQUEST_TIMEOUT_VAR, &raw))?;
            if secs == 0 {
                return Err(invalid(REQUEST_TIMEOUT_VAR, &raw));
            }
            agent.request_timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            registry_path: get(REGISTRY_PATH_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_REGISTRY_PATH), PathBuf::from),
            api_key,
            model: get(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            base_url: get(BASE_URL_VAR),
            agent,
        })
    }

    /// Load the capability registry these settings point at.
    ///
    /// # Errors
    ///
    /// [`AgentError::Config`] if the catalog is missing or invalid.
    pub fn registry(&self) -> Result<CapabilityRegistry> {
        CapabilityRegistry::from_path(&self.registry_path)
    }
}

/// `0` and `none` disable the cap.
fn parse_max_iterations(raw: &str) -> Result<Option<usize>> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match raw.parse::<usize>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(invalid(MAX_ITERATIONS_VAR, raw)),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw)),
    }
}

fn invalid(key: &str, raw: &str) -> AgentError {
    AgentError::Config(format!("invalid value for {key}: {raw:?}"))
}
