//! Session configuration (§6, §10.3): a typed, serde-driven TOML surface
//! holding every recognized option, loaded the way `machi-bot::config` loads
//! `BotConfig` — defaults first, then the file on top, with API keys
//! resolved through an environment-variable fallback chain the way
//! `machi-bot::main::create_model` resolves provider credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_session_timeout_secs() -> u64 {
    900
}

fn default_turn_timeout_secs() -> u64 {
    120
}

fn default_tool_timeout_secs() -> u64 {
    30
}

const fn default_max_attempts_per_agent() -> u32 {
    8
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./session")
}

/// Which wire protocol a [`BackendConfig`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI Chat Completions-style streaming.
    OpenAi,
    /// Anthropic Messages-style streaming.
    Anthropic,
}

/// One named backend an [`AgentDescriptor`] can reference via `backend_ref`.
///
/// Shared by reference rather than embedded per-agent so that several agents
/// can point at the same provider credentials and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Wire protocol this backend speaks.
    pub provider: ProviderKind,
    /// Model name passed to the provider.
    pub model: String,
    /// Name of the environment variable holding the API key. Defaults to the
    /// provider's conventional variable name when omitted.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override the provider's default base URL (self-hosted gateways, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl BackendConfig {
    fn default_api_key_env(&self) -> &'static str {
        match self.provider {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Resolve the API key from the configured or conventional environment
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the variable is unset.
    pub fn resolve_api_key(&self) -> Result<String> {
        let var = self.api_key_env.as_deref().unwrap_or_else(|| self.default_api_key_env());
        std::env::var(var).map_err(|_| {
            Error::configuration(format!(
                "backend requires ${var} to be set (provider {:?})",
                self.provider
            ))
        })
    }
}

/// One configured agent (§6: `agents: {agent_id, backend_ref, system_prompt, available_tools}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Stable agent identifier, used as the key into [`crate::state::CoordinationState`].
    pub agent_id: String,
    /// Key into [`SessionConfig::backends`].
    pub backend_ref: String,
    /// This agent's system prompt.
    pub system_prompt: String,
    /// Names of external tools, from the session's registry, this agent may call.
    #[serde(default)]
    pub available_tools: Vec<String>,
}

/// The full set of session-level options recognized by the coordination core (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The task every agent coordinates toward an answer for.
    pub task: String,
    /// Named backends, referenced by [`AgentDescriptor::backend_ref`].
    pub backends: std::collections::BTreeMap<String, BackendConfig>,
    /// Participating agents.
    pub agents: Vec<AgentDescriptor>,
    /// Whether side-effecting tools are deferred during coordination (§4.2).
    #[serde(default = "default_true")]
    pub planning_mode: bool,
    /// Extra prompt text injected while `planning_mode` is enabled.
    #[serde(default)]
    pub planning_mode_instruction: Option<String>,
    /// Session-wide wall-clock budget, in seconds.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Per-backend-turn budget, in seconds.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    /// Per-external-tool-call budget, in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Upper bound on an agent's republication count before it is forced terminal.
    #[serde(default = "default_max_attempts_per_agent")]
    pub max_attempts_per_agent: u32,
    /// Root directory for this session's workspace layout (§6 persisted state layout).
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
}

const fn default_true() -> bool {
    true
}

impl SessionConfig {
    /// `session_timeout_secs` as a [`Duration`].
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// `turn_timeout_secs` as a [`Duration`].
    #[must_use]
    pub const fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// `tool_timeout_secs` as a [`Duration`].
    #[must_use]
    pub const fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Validate cross-field invariants TOML deserialization alone can't express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if fewer than two agents are
    /// configured, if an agent's `agent_id` is duplicated, or if an agent's
    /// `backend_ref` names a backend not present in `backends`.
    pub fn validate(&self) -> Result<()> {
        if self.agents.len() < 2 {
            return Err(Error::configuration("a session requires at least two agents"));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.agent_id.as_str()) {
                return Err(Error::configuration(format!("duplicate agent_id '{}'", agent.agent_id)));
            }
            if !self.backends.contains_key(&agent.backend_ref) {
                return Err(Error::configuration(format!(
                    "agent '{}' references unknown backend '{}'",
                    agent.agent_id, agent.backend_ref
                )));
            }
        }
        Ok(())
    }
}

/// Load a [`SessionConfig`] from a TOML file at `path`, filling defaults for
/// every optional field.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file can't be read, [`Error::Configuration`]
/// if it fails to parse or doesn't pass [`SessionConfig::validate`].
pub async fn load_config(path: &Path) -> Result<SessionConfig> {
    let content = tokio::fs::read_to_string(path).await?;
    let config: SessionConfig = toml::from_str(&content)
        .map_err(|e| Error::configuration(format!("failed to parse '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
