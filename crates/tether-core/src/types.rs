//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use tether_protocol::{AgentConfig, AgentKind};

/// Unique identifier for an agent. Generated ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Generate a new unique agent id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a connected client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    /// Generate a new unique client id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for an authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Resolved agent specification, ready to spawn.
///
/// Unlike the wire-level [`AgentConfig`], the working directory is mandatory
/// here: resolution (explicit config, preset, or daemon data dir) happens
/// before an `AgentSpec` exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// What kind of agent this is
    pub kind: AgentKind,
    /// Human-readable name
    pub name: String,
    /// Command to auto-run inside the shell, if any
    pub command: Option<String>,
    /// Arguments for the auto-run command
    pub args: Vec<String>,
    /// Working directory for the shell
    pub cwd: PathBuf,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Initial prompt typed into the agent after launch
    pub initial_prompt: Option<String>,
    /// Whether to auto-run the command after the shell settles
    pub auto_run: bool,
}

impl AgentSpec {
    /// Resolve a wire-level config into a spec, filling in the working
    /// directory from `fallback_cwd` when the config omits it.
    pub fn from_config(config: AgentConfig, fallback_cwd: &std::path::Path) -> Self {
        let cwd = config
            .cwd
            .map(PathBuf::from)
            .unwrap_or_else(|| fallback_cwd.to_path_buf());
        Self {
            kind: config.kind,
            name: config.name,
            command: config.command,
            args: config.args,
            cwd,
            env: config.env,
            initial_prompt: config.initial_prompt,
            auto_run: config.auto_run,
        }
    }
}

/// An agent config without a working directory, as carried inside a preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetAgent {
    /// What kind of agent this is
    pub kind: AgentKind,
    /// Human-readable name
    pub name: String,
    /// Command to auto-run inside the shell, if any
    pub command: Option<String>,
    /// Arguments for the auto-run command
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Initial prompt typed into the agent after launch
    #[serde(default)]
    pub initial_prompt: Option<String>,
    /// Whether to auto-run the command after the shell settles
    #[serde(default)]
    pub auto_run: bool,
}

/// A named bundle of agent configs sharing one working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    /// Preset name
    pub name: String,
    /// Working directory shared by every agent in the bundle
    pub cwd: PathBuf,
    /// Agent configs
    pub agents: Vec<PresetAgent>,
}

impl Preset {
    /// Expand the preset into fully resolved agent specs
    pub fn specs(&self) -> Vec<AgentSpec> {
        self.agents
            .iter()
            .map(|a| AgentSpec {
                kind: a.kind.clone(),
                name: a.name.clone(),
                command: a.command.clone(),
                args: a.args.clone(),
                cwd: self.cwd.clone(),
                env: a.env.clone(),
                initial_prompt: a.initial_prompt.clone(),
                auto_run: a.auto_run,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_unique() {
        let a = AgentId::generate();
        let b = AgentId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_spec_from_config_fallback_cwd() {
        let config = AgentConfig {
            kind: AgentKind::Shell,
            name: "work".to_string(),
            command: None,
            args: vec![],
            cwd: None,
            env: vec![],
            initial_prompt: None,
            auto_run: true,
        };
        let spec = AgentSpec::from_config(config, std::path::Path::new("/tmp"));
        assert_eq!(spec.cwd, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_preset_specs_share_cwd() {
        let preset = Preset {
            name: "review".to_string(),
            cwd: PathBuf::from("/work/project"),
            agents: vec![
                PresetAgent {
                    kind: AgentKind::Shell,
                    name: "shell".to_string(),
                    command: None,
                    args: vec![],
                    env: vec![],
                    initial_prompt: None,
                    auto_run: false,
                },
                PresetAgent {
                    kind: AgentKind::AiCli,
                    name: "coder".to_string(),
                    command: Some("claude".to_string()),
                    args: vec![],
                    env: vec![],
                    initial_prompt: Some("fix the tests".to_string()),
                    auto_run: true,
                },
            ],
        };

        let specs = preset.specs();
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| s.cwd == PathBuf::from("/work/project")));
    }
}
