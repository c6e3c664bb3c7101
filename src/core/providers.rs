use crate::utils::url::normalize_base_url;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// The closed set of backends this application knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    Groq,
    DeepSeek,
    Moonshot,
    OpenRouter,
    Ollama,
}

impl Provider {
    pub fn all() -> &'static [Provider] {
        &[
            Provider::OpenAi,
            Provider::Anthropic,
            Provider::Gemini,
            Provider::Groq,
            Provider::DeepSeek,
            Provider::Moonshot,
            Provider::OpenRouter,
            Provider::Ollama,
        ]
    }

    pub fn id(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::DeepSeek => "deepseek",
            Provider::Moonshot => "moonshot",
            Provider::OpenRouter => "openrouter",
            Provider::Ollama => "ollama",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Gemini => "Gemini",
            Provider::Groq => "Groq",
            Provider::DeepSeek => "DeepSeek",
            Provider::Moonshot => "Moonshot",
            Provider::OpenRouter => "OpenRouter",
            Provider::Ollama => "Ollama",
        }
    }

    /// Look up a provider by its id, case-insensitively.
    pub fn from_id(id: &str) -> Option<Provider> {
        Provider::all()
            .iter()
            .copied()
            .find(|p| p.id().eq_ignore_ascii_case(id))
    }

    /// Base URL for the provider's OpenAI-style chat endpoint, when chat is
    /// supported. Ollama derives its URL from the stored credential value.
    pub fn chat_base_url(self, ollama_credential: &str) -> Option<String> {
        match self {
            Provider::OpenAi => Some("https://api.openai.com/v1".to_string()),
            Provider::Groq => Some("https://api.groq.com/openai/v1".to_string()),
            Provider::DeepSeek => Some("https://api.deepseek.com".to_string()),
            Provider::OpenRouter => Some("https://openrouter.ai/api/v1".to_string()),
            Provider::Moonshot => Some("https://api.moonshot.cn/v1".to_string()),
            Provider::Ollama => {
                let raw = if ollama_credential.is_empty() {
                    DEFAULT_OLLAMA_URL
                } else {
                    ollama_credential
                };
                Some(format!("{}/v1", normalize_base_url(raw)))
            }
            Provider::Anthropic | Provider::Gemini => None,
        }
    }

    pub fn supports_chat(self) -> bool {
        !matches!(self, Provider::Anthropic | Provider::Gemini)
    }

    /// Whether chat requests require a credential. OpenRouter works
    /// unauthenticated and Ollama's credential is a URL, not a secret.
    pub fn requires_chat_key(self) -> bool {
        self.supports_chat() && !matches!(self, Provider::OpenRouter | Provider::Ollama)
    }
}

/// A `"provider:model"` reference as the catalog and selection store use it.
/// Model ids may contain colons themselves, so only the first colon splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRef<'a> {
    pub provider: &'a str,
    pub model_id: &'a str,
}

impl<'a> ModelRef<'a> {
    pub fn parse(reference: &'a str) -> Option<Self> {
        let (provider, model_id) = reference.split_once(':')?;
        Some(ModelRef { provider, model_id })
    }
}
