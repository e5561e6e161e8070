use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the model API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// `[llm]` block from config.toml.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_command: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

/// `[pipeline]` block: chunking, fan-out and scoring knobs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_chunk_tokens: usize,
    pub tokens_per_word: f64,
    pub max_parallel_extractions: usize,
    pub max_evidence_per_dimension: usize,
    /// Median reply latency at which responsiveness scores 50.
    pub latency_half_life_minutes: f64,
    /// Reply gaps longer than this are not counted as responses.
    pub max_latency_minutes: f64,
    pub max_key_topics: usize,
    pub max_tone_indicators: usize,
    pub max_recommendations: usize,
    /// Positive and improvement examples quoted in the report.
    pub max_extracted_items: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 3000,
            tokens_per_word: 1.3,
            max_parallel_extractions: 4,
            max_evidence_per_dimension: 3,
            latency_half_life_minutes: 120.0,
            max_latency_minutes: 7.0 * 24.0 * 60.0,
            max_key_topics: 5,
            max_tone_indicators: 5,
            max_recommendations: 5,
            max_extracted_items: 3,
        }
    }
}

/// Top-level commhealth config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Load config from `path`, or ~/.commhealth/config.toml. Returns default if the file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Display config with secrets redacted.
    pub fn display_redacted(&self) -> String {
        let mut lines = vec!["[llm]".to_string()];
        let llm = &self.llm;
        if let Some(ref key) = llm.api_key {
            lines.push(format!("  api_key = \"{}\"", redact(key)));
        }
        if let Some(ref cmd) = llm.api_key_command {
            lines.push(format!("  api_key_command = \"{}\"", cmd));
        }
        lines.push(format!("  base_url = \"{}\"", llm.base_url));
        lines.push(format!("  model = \"{}\"", llm.model));
        lines.push(format!("  temperature = {}", llm.temperature));
        lines.push(format!("  max_tokens = {}", llm.max_tokens));
        lines.push(format!("  timeout_secs = {}", llm.timeout_secs));

        let p = &self.pipeline;
        lines.push("[pipeline]".to_string());
        lines.push(format!("  max_chunk_tokens = {}", p.max_chunk_tokens));
        lines.push(format!("  tokens_per_word = {}", p.tokens_per_word));
        lines.push(format!("  max_parallel_extractions = {}", p.max_parallel_extractions));
        lines.push(format!("  max_evidence_per_dimension = {}", p.max_evidence_per_dimension));
        lines.push(format!("  latency_half_life_minutes = {}", p.latency_half_life_minutes));
        lines.push(format!("  max_latency_minutes = {}", p.max_latency_minutes));
        lines.push(format!("  max_key_topics = {}", p.max_key_topics));
        lines.push(format!("  max_tone_indicators = {}", p.max_tone_indicators));
        lines.push(format!("  max_recommendations = {}", p.max_recommendations));
        lines.push(format!("  max_extracted_items = {}", p.max_extracted_items));
        lines.join("\n")
    }
}

pub fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

/// Resolve a credential through the chain: CLI flag > env var > config key > config command.
pub fn resolve_credential(
    cli_flag: Option<&str>,
    env_var_name: &str,
    config: &LlmConfig,
) -> Result<String> {
    // 1. CLI flag
    if let Some(key) = cli_flag {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    // 2. Environment variable
    if let Ok(val) = std::env::var(env_var_name) {
        if !val.is_empty() {
            return Ok(val);
        }
    }

    // 3. Config file api_key
    if let Some(ref key) = config.api_key {
        if !key.is_empty() {
            return Ok(key.clone());
        }
    }

    // 4. External command
    if let Some(ref cmd) = config.api_key_command {
        if !cmd.is_empty() {
            let output = std::process::Command::new("sh")
                .arg("-c")
                .arg(cmd)
                .output()
                .with_context(|| format!("Failed to run api_key_command: {cmd}"))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                bail!(
                    "api_key_command failed (exit {}): {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                );
            }

            let secret = String::from_utf8(output.stdout)
                .context("api_key_command output is not valid UTF-8")?
                .trim()
                .to_string();

            if !secret.is_empty() {
                return Ok(secret);
            }
        }
    }

    bail!(
        "No API key found. Provide via --api-key, {} env var, or ~/.commhealth/config.toml (or run with --offline)",
        env_var_name
    );
}

/// Path to the config file: ~/.commhealth/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".commhealth").join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.commhealth/config.toml
# Credential resolution order: CLI flag > OPENAI_API_KEY > api_key > api_key_command

[llm]
# api_key = "your-api-key"
# api_key_command = "your-secrets-manager-command-here"
# base_url = "https://api.openai.com/v1"
# model = "gpt-4o-mini"
# temperature = 0.1
# max_tokens = 2000
# timeout_secs = 60

[pipeline]
# max_chunk_tokens = 3000
# tokens_per_word = 1.3
# max_parallel_extractions = 4
# max_evidence_per_dimension = 3
# latency_half_life_minutes = 120
# max_latency_minutes = 10080
# max_key_topics = 5
# max_tone_indicators = 5
# max_recommendations = 5
# max_extracted_items = 3
"#
}

/// Create the config file at `path` (or the default location) if it doesn't already exist.
pub fn init_config(path: Option<&Path>) -> Result<(PathBuf, bool)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if path.exists() {
        return Ok((path, false));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, default_config_template())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok((path, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(cfg.pipeline, PipelineSettings::default());
        assert_eq!(cfg.llm.timeout_secs, 60);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[llm]\nmodel = \"local-model\"\n\n[pipeline]\nmax_chunk_tokens = 500\n",
        )
        .unwrap();
        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.llm.model, "local-model");
        assert_eq!(cfg.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.pipeline.max_chunk_tokens, 500);
        assert_eq!(cfg.pipeline.max_parallel_extractions, 4);
        assert_eq!(cfg.pipeline.max_key_topics, 5);
        assert_eq!(cfg.pipeline.max_extracted_items, 3);
    }

    #[test]
    fn template_parses_and_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let (_, created) = init_config(Some(&path)).unwrap();
        assert!(created);
        let (_, created_again) = init_config(Some(&path)).unwrap();
        assert!(!created_again);
        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.pipeline, PipelineSettings::default());
    }

    #[test]
    fn redacted_display_hides_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.api_key = Some("sk-abcdefghijklmnop".to_string());
        let shown = cfg.display_redacted();
        assert!(shown.contains("sk-a...mnop"));
        assert!(!shown.contains("abcdefghijkl"));
    }

    #[test]
    fn credential_chain_prefers_flag_then_config() {
        let mut llm = LlmConfig::default();
        llm.api_key = Some("from-config".to_string());
        let env = "COMMHEALTH_TEST_UNSET_KEY_VAR";
        assert_eq!(resolve_credential(Some("flag"), env, &llm).unwrap(), "flag");
        assert_eq!(resolve_credential(None, env, &llm).unwrap(), "from-config");
        assert_eq!(resolve_credential(Some(""), env, &llm).unwrap(), "from-config");
    }

    #[test]
    fn credential_chain_runs_command_last() {
        let llm = LlmConfig {
            api_key_command: Some("echo '  from-command  '".to_string()),
            ..LlmConfig::default()
        };
        let key = resolve_credential(None, "COMMHEALTH_TEST_UNSET_KEY_VAR", &llm).unwrap();
        assert_eq!(key, "from-command");
    }

    #[test]
    fn credential_chain_errors_when_empty() {
        let err = resolve_credential(None, "COMMHEALTH_TEST_UNSET_KEY_VAR", &LlmConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("No API key found"));
    }
}
