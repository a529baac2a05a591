//! Reference data seeded into empty catalog tables.

use serde::Serialize;

/// A default model provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSeed {
    pub key: &'static str,
    pub display_name: &'static str,
    pub base_url: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Chat,
    Embedding,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Embedding => "embedding",
        }
    }
}

/// A default model, linked to its provider by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSeed {
    pub provider_key: &'static str,
    pub model_key: &'static str,
    pub display_name: &'static str,
    pub kind: ModelKind,
    pub dimensions: Option<i32>,
}

pub const PROVIDERS_TABLE: &str = "llm_providers";
pub const MODELS_TABLE: &str = "llm_models";

pub const INSERT_PROVIDER: &str =
    "INSERT INTO llm_providers (key, display_name, base_url) VALUES ($1, $2, $3)";

pub const INSERT_MODEL: &str = "INSERT INTO llm_models \
    (provider_id, model_key, display_name, kind, dimensions) \
    SELECT id, $2, $3, $4, $5 FROM llm_providers WHERE key = $1";

pub fn default_providers() -> Vec<ProviderSeed> {
    vec![
        ProviderSeed {
            key: "openai",
            display_name: "OpenAI",
            base_url: "https://api.openai.com/v1",
        },
        ProviderSeed {
            key: "anthropic",
            display_name: "Anthropic",
            base_url: "https://api.anthropic.com/v1",
        },
        ProviderSeed {
            key: "ollama",
            display_name: "Ollama (local)",
            base_url: "http://localhost:11434",
        },
    ]
}

pub fn default_models() -> Vec<ModelSeed> {
    vec![
        ModelSeed {
            provider_key: "openai",
            model_key: "text-embedding-3-small",
            display_name: "Text Embedding 3 Small",
            kind: ModelKind::Embedding,
            dimensions: Some(1536),
        },
        ModelSeed {
            provider_key: "openai",
            model_key: "gpt-4o-mini",
            display_name: "GPT-4o mini",
            kind: ModelKind::Chat,
            dimensions: None,
        },
        ModelSeed {
            provider_key: "anthropic",
            model_key: "claude-sonnet-4",
            display_name: "Claude Sonnet 4",
            kind: ModelKind::Chat,
            dimensions: None,
        },
        ModelSeed {
            provider_key: "ollama",
            model_key: "nomic-embed-text",
            display_name: "Nomic Embed Text",
            kind: ModelKind::Embedding,
            dimensions: Some(768),
        },
    ]
}
