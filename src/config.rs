use serde::Deserialize;
use std::path::PathBuf;

use crate::sandbox::DEFAULT_ROOT;

/// Placeholder API key shipped in sample configs; never valid.
const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Project directory the agent may touch. Relative to the working directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl SandboxConfig {
    /// Reads only the `[sandbox]` table of a config file, so the other
    /// sections (and the variables they reference) need not be valid.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut value: toml::Value = toml::from_str(content)?;
        let Some(mut sandbox) = value.as_table_mut().and_then(|t| t.remove("sandbox")) else {
            return Ok(Self::default());
        };
        expand_env(&mut sandbox)?;
        let config: SandboxConfig = sandbox.try_into()?;
        Ok(config)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    /// OpenAI-compatible endpoint, e.g. "https://api.openai.com/v1"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Persona; the file-operation protocol is appended to it.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Conversation messages kept besides the system prompt
    #[serde(default = "default_max_context")]
    pub max_context: usize,
    /// LLM round trips allowed per user turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: default_system_prompt(),
            max_context: default_max_context(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_agent_name() -> String {
    "tagwright".to_string()
}

fn default_max_context() -> usize {
    50
}

fn default_max_rounds() -> usize {
    5
}

fn default_system_prompt() -> String {
    "\
You are an experienced Python programmer.
You build Python projects from the user's requirements.

Your responsibilities:
1. Analyse the requirements and design a suitable solution
2. Write code that follows Python best practices
3. Keep the code modular and maintainable
4. Write the necessary documentation and comments
5. Create the files and directories the project layout needs

Requirements:
1. Follow PEP 8
2. Add type annotations
3. Include docstrings
4. Handle errors where appropriate
5. The project root may contain only one file: `main.py`
6. All other code goes into sub-directories
7. Never hard-code secrets
8. Integrate logging (daily rotation, written to log/)
9. Do not run code; only write code and explanations

"
    .to_string()
}

/// Expands `${VAR}` in every string of a parsed TOML value.
fn expand_env(value: &mut toml::Value) -> anyhow::Result<()> {
    match value {
        toml::Value::String(s) => {
            let expanded = shellexpand::env(s.as_str())?.into_owned();
            *s = expanded;
        }
        toml::Value::Array(items) => {
            for item in items {
                expand_env(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                expand_env(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses TOML, then expands `${VAR}` references from the environment in
    /// string values. Comments are never expanded.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut value: toml::Value = toml::from_str(content)?;
        expand_env(&mut value)?;
        let config: Config = value.try_into()?;
        Ok(config)
    }

    /// Rejects settings that cannot possibly reach a model.
    pub fn validate(&self) -> anyhow::Result<()> {
        let llm = &self.llm;
        if llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }
        if llm.api_key.trim().is_empty() || llm.api_key == PLACEHOLDER_API_KEY {
            anyhow::bail!("llm.api_key is not set");
        }
        let url = url::Url::parse(&llm.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid llm.base_url: {e}"))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!(
                "llm.base_url must start with http:// or https:// (got {}://)",
                url.scheme()
            );
        }
        if self.agent.max_rounds == 0 {
            anyhow::bail!("agent.max_rounds must be at least 1");
        }
        Ok(())
    }
}
