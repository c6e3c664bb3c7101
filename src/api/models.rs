use std::time::Duration;

use async_trait::async_trait;

use crate::api::{GeminiModelsResponse, ModelsResponse, OllamaTagsResponse};
use crate::core::providers::{Provider, DEFAULT_OLLAMA_URL};
use crate::utils::url::{construct_api_url, normalize_base_url};

const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const ANTHROPIC_MODELS: &[&str] = &[
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// Produces a provider's model listing. `Err` carries the user-facing error
/// string the catalog stores; a missing credential is an empty `Ok`, treated
/// as "not configured" rather than a failure. Implementations never panic.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    async fn fetch_models(&self, provider: Provider, credential: &str)
        -> Result<Vec<String>, String>;
}

pub struct HttpModelFetcher {
    client: reqwest::Client,
}

impl HttpModelFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn openai_style(&self, base_url: &str, api_key: &str) -> Result<Vec<String>, String> {
        if api_key.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(construct_api_url(base_url, "models"))
            .header("Authorization", format!("Bearer {api_key}"))
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| format!("Error: {e}"))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err("Invalid API Key.".to_string());
        }
        if !response.status().is_success() {
            return Err(format!(
                "Error: API request failed with status {}",
                response.status()
            ));
        }

        let listing = response
            .json::<ModelsResponse>()
            .await
            .map_err(|e| format!("Error: {e}"))?;
        let mut ids: Vec<String> = listing.data.into_iter().map(|m| m.id).collect();
        ids.sort();
        Ok(ids)
    }

    async fn openrouter(&self, api_key: &str) -> Result<Vec<String>, String> {
        // Unauthenticated listing works; attach auth only when a key exists.
        let mut request = self
            .client
            .get("https://openrouter.ai/api/v1/models")
            .timeout(FETCH_TIMEOUT);
        if !api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request.send().await.map_err(|e| format!("Error: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("Error: {}", response.status().as_u16()));
        }

        let listing = response
            .json::<ModelsResponse>()
            .await
            .map_err(|e| format!("Error: {e}"))?;
        let mut ids: Vec<String> = listing.data.into_iter().map(|m| m.id).collect();
        ids.sort();
        Ok(ids)
    }

    async fn ollama(&self, credential: &str) -> Result<Vec<String>, String> {
        let base = if credential.is_empty() {
            DEFAULT_OLLAMA_URL.to_string()
        } else {
            normalize_base_url(credential)
        };

        let response = self
            .client
            .get(construct_api_url(&base, "api/tags"))
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|_| "Connection failed. Is Ollama running?".to_string())?;

        if !response.status().is_success() {
            return Err(format!(
                "Error: API request failed with status {}",
                response.status()
            ));
        }

        let tags = response
            .json::<OllamaTagsResponse>()
            .await
            .map_err(|e| format!("Error: {e}"))?;
        let mut names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        names.sort();
        Ok(names)
    }

    async fn gemini(&self, api_key: &str) -> Result<Vec<String>, String> {
        if api_key.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(GEMINI_MODELS_URL)
            .query(&[("key", api_key), ("pageSize", "1000")])
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| format!("Error: {e}"))?;

        if !response.status().is_success() {
            return Err(format!(
                "Error: API request failed with status {}",
                response.status()
            ));
        }

        let listing = response
            .json::<GeminiModelsResponse>()
            .await
            .map_err(|e| format!("Error: {e}"))?;
        let mut names: Vec<String> = listing
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl ModelFetcher for HttpModelFetcher {
    async fn fetch_models(
        &self,
        provider: Provider,
        credential: &str,
    ) -> Result<Vec<String>, String> {
        match provider {
            Provider::OpenAi => {
                self.openai_style("https://api.openai.com/v1", credential).await
            }
            Provider::Groq => {
                self.openai_style("https://api.groq.com/openai/v1", credential)
                    .await
            }
            Provider::DeepSeek => {
                self.openai_style("https://api.deepseek.com", credential).await
            }
            Provider::Moonshot => {
                self.openai_style("https://api.moonshot.cn/v1", credential)
                    .await
            }
            Provider::OpenRouter => self.openrouter(credential).await,
            Provider::Ollama => self.ollama(credential).await,
            Provider::Gemini => self.gemini(credential).await,
            Provider::Anthropic => Ok(ANTHROPIC_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anthropic_listing_is_fixed_and_offline() {
        let fetcher = HttpModelFetcher::new(reqwest::Client::new());
        let models = fetcher
            .fetch_models(Provider::Anthropic, "")
            .await
            .expect("anthropic listing never fails");
        assert_eq!(models.len(), 3);
        assert!(models.iter().all(|m| m.starts_with("claude-3-")));
    }

    #[tokio::test]
    async fn missing_keys_short_circuit_to_empty() {
        let fetcher = HttpModelFetcher::new(reqwest::Client::new());
        for provider in [Provider::OpenAi, Provider::Groq, Provider::DeepSeek, Provider::Moonshot, Provider::Gemini] {
            let models = fetcher
                .fetch_models(provider, "")
                .await
                .expect("unset credential is not a failure");
            assert!(models.is_empty(), "{} should short-circuit", provider.id());
        }
    }
}
