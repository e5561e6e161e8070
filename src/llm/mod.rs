pub mod openai;
pub mod prompts;
pub mod schema;

use anyhow::Result;
use serde_json::Value;
use tracing::info;

use crate::config::{resolve_credential, LlmConfig, API_KEY_ENV};

pub use openai::OpenAiCompatClient;

/// A named JSON schema the model is asked to answer with.
#[derive(Debug, Clone)]
pub struct JsonSchema {
    pub name: &'static str,
    pub schema: Value,
}

/// What came back from one model call. `json` is `None` when the reply could
/// not be read as JSON; `raw` always holds the reply text.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub json: Option<Value>,
    pub raw: String,
}

/// Trait every model backend implements. Implementations must be callable
/// from several extraction workers at once.
pub trait LanguageModel: Send + Sync {
    /// Backend name, used in logs.
    fn name(&self) -> &str;

    /// Send one prompt and ask for a reply shaped like `schema`.
    fn complete(&self, prompt: &str, schema: &JsonSchema) -> Result<Completion>;
}

/// Backend that never answers. Every LLM stage takes its deterministic fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineModel;

impl LanguageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    fn complete(&self, _prompt: &str, _schema: &JsonSchema) -> Result<Completion> {
        Ok(Completion::default())
    }
}

/// Build the backend for a run: offline, or an OpenAI-compatible endpoint
/// with a key from the credential chain.
pub fn build_model(
    config: &LlmConfig,
    api_key_flag: Option<&str>,
    offline: bool,
) -> Result<Box<dyn LanguageModel>> {
    if offline {
        info!("Running offline; all model stages use their fallbacks");
        return Ok(Box::new(OfflineModel));
    }
    let api_key = resolve_credential(api_key_flag, API_KEY_ENV, config)?;
    let client = OpenAiCompatClient::new(config, api_key)?;
    info!("Using model {} at {}", config.model, config.base_url);
    Ok(Box::new(client))
}
