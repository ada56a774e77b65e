// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Thinking effort presets exposed to the agent SDK. Distinct from
/// `max_thinking_tokens`, which bounds the budget directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingLevel {
    #[default]
    Standard,
    Extended,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    StreamJson,
}

/// Per-session agent definition (the `agents` field of `config.*` — a named
/// sub-agent configuration the session can dispatch tool calls to).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

/// Everything reloadable for a running session. Optional fields default to
/// "inherit from daemon config" when absent; `None` is a meaningful "not
/// set" rather than a missing-field error, so every field round-trips
/// through `config.*` get/update without schema churn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub model: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub max_budget_usd: Option<f64>,
    #[serde(default)]
    pub max_thinking_tokens: Option<u32>,
    #[serde(default)]
    pub thinking_level: ThinkingLevel,
    #[serde(default)]
    pub system_prompt_override: Option<String>,
    #[serde(default)]
    pub tools_allow: Vec<String>,
    #[serde(default)]
    pub tools_deny: Vec<String>,
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub mcp_servers: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub disabled_mcp_servers: Vec<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub beta_flags: Vec<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    #[serde(default)]
    pub coordinator_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            fallback_model: None,
            max_turns: None,
            max_budget_usd: None,
            max_thinking_tokens: None,
            thinking_level: ThinkingLevel::default(),
            system_prompt_override: None,
            tools_allow: Vec::new(),
            tools_deny: Vec::new(),
            agents: Vec::new(),
            sandbox: SandboxConfig::default(),
            mcp_servers: HashMap::new(),
            disabled_mcp_servers: Vec::new(),
            output_format: OutputFormat::default(),
            beta_flags: Vec::new(),
            environment: HashMap::new(),
            permission_mode: PermissionMode::default(),
            coordinator_mode: false,
        }
    }
}

impl SessionConfig {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut config = SessionConfig::default();
        config.max_thinking_tokens = Some(4096);
        config.disabled_mcp_servers.push("flaky-server".into());

        let json = config.to_json().unwrap();
        let back = SessionConfig::from_json(&json).unwrap();
        assert_eq!(back.max_thinking_tokens, Some(4096));
        assert_eq!(back.disabled_mcp_servers, vec!["flaky-server".to_string()]);
    }

    #[test]
    fn defaults_are_permissive() {
        let config = SessionConfig::default();
        assert_eq!(config.permission_mode, PermissionMode::Default);
        assert!(config.tools_allow.is_empty());
    }
}
