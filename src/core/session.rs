//! The session container: one logical chat session's threads, credentials,
//! model catalog, capability registry, selection, and streaming flag behind a
//! single lock. Long-running work (catalog fetches, response streams) runs on
//! spawned tasks that re-acquire the lock for each discrete mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::api::models::{HttpModelFetcher, ModelFetcher};
use crate::api::ChatMessage;
use crate::core::capabilities::{CapabilityRegistry, CapabilityServer, RegistryError};
use crate::core::catalog::CatalogState;
use crate::core::chat_stream::{self, StreamMessage, StreamParams};
use crate::core::message::Message;
use crate::core::providers::{ModelRef, Provider};
use crate::core::thread::ThreadStore;

pub const NO_MODEL_SELECTED: &str = "No model selected. Please select a model in settings.";

struct SessionState {
    threads: ThreadStore,
    credentials: HashMap<Provider, String>,
    catalog: CatalogState,
    capabilities: CapabilityRegistry,
    selected_model: String,
    is_streaming: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            threads: ThreadStore::new(),
            credentials: HashMap::new(),
            catalog: CatalogState::new(),
            capabilities: CapabilityRegistry::new(),
            selected_model: String::new(),
            is_streaming: false,
        }
    }

    fn credential(&self, provider: Provider) -> &str {
        self.credentials
            .get(&provider)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Where a submission's assistant placeholder lives. Captured when the
/// submission starts so stream writes keep landing in the same message even
/// if the active thread changes underneath the stream.
#[derive(Clone)]
struct WriteHandle {
    thread_key: String,
    index: usize,
}

struct StreamRoute {
    base_url: String,
    api_key: String,
    model: String,
}

fn resolve_route(state: &SessionState) -> Result<StreamRoute, String> {
    let parsed = ModelRef::parse(&state.selected_model)
        .filter(|r| !r.provider.is_empty() && !r.model_id.is_empty());
    let Some(model_ref) = parsed else {
        return Err(NO_MODEL_SELECTED.to_string());
    };

    let provider = Provider::from_id(model_ref.provider);
    let base_url = provider.and_then(|p| {
        let credential = state.credential(p);
        p.chat_base_url(credential)
    });
    let (Some(provider), Some(base_url)) = (provider, base_url) else {
        return Err(format!(
            "Provider '{}' is not yet supported for chat.",
            model_ref.provider
        ));
    };

    let credential = state.credential(provider).to_string();
    if credential.is_empty() && provider.requires_chat_key() {
        return Err(format!("API key for {} not set.", model_ref.provider));
    }

    // Ollama's stored value is its base URL, not a bearer secret.
    let api_key = if provider == Provider::Ollama {
        String::new()
    } else {
        credential
    };

    Ok(StreamRoute {
        base_url,
        api_key,
        model: model_ref.model_id.to_string(),
    })
}

/// Handle to the shared session. Cloning is cheap and every clone observes
/// the same state.
#[derive(Clone)]
pub struct ChatSession {
    state: Arc<Mutex<SessionState>>,
    client: reqwest::Client,
    fetcher: Arc<dyn ModelFetcher>,
    cancel_token: CancellationToken,
}

/// Streaming responses run unbounded, but connection establishment does not.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl ChatSession {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        let fetcher = Arc::new(HttpModelFetcher::new(client.clone()));
        Self::build(client, fetcher)
    }

    /// Construct with a custom catalog fetcher. The production path uses
    /// [`HttpModelFetcher`]; tests inject deterministic fetchers here.
    pub fn with_fetcher(fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self::build(reqwest::Client::new(), fetcher)
    }

    fn build(client: reqwest::Client, fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            client,
            fetcher,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Cancel in-flight transport work. Called at process teardown.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    // --- thread operations -------------------------------------------------

    pub async fn create_thread(&self) -> String {
        self.state.lock().await.threads.create()
    }

    pub async fn select_thread(&self, key: &str) {
        let mut state = self.state.lock().await;
        if !state.threads.select(key) {
            tracing::warn!(key, "ignoring selection of unknown thread");
        }
    }

    pub async fn thread_titles(&self) -> Vec<String> {
        self.state.lock().await.threads.titles()
    }

    pub async fn active_thread_key(&self) -> String {
        self.state.lock().await.threads.active_key().to_string()
    }

    pub async fn current_messages(&self) -> Vec<Message> {
        self.state.lock().await.threads.current_messages().to_vec()
    }

    pub async fn thread_messages(&self, key: &str) -> Vec<Message> {
        self.state.lock().await.threads.messages(key).to_vec()
    }

    // --- selection ---------------------------------------------------------

    pub async fn select_model(&self, model_ref: &str) {
        self.state.lock().await.selected_model = model_ref.to_string();
    }

    pub async fn selected_model(&self) -> String {
        self.state.lock().await.selected_model.clone()
    }

    pub async fn selected_provider(&self) -> String {
        let state = self.state.lock().await;
        ModelRef::parse(&state.selected_model)
            .map(|r| r.provider.to_string())
            .unwrap_or_default()
    }

    pub async fn selected_model_id(&self) -> String {
        let state = self.state.lock().await;
        ModelRef::parse(&state.selected_model)
            .map(|r| r.model_id.to_string())
            .unwrap_or_default()
    }

    // --- credentials and catalog -------------------------------------------

    /// Store a credential. Clearing it forgets the provider's listing,
    /// collapses its panel, and drops the selection if it pointed at this
    /// provider; setting it kicks off a background catalog refresh. Either
    /// way the provider's epoch moves so an in-flight fetch against the old
    /// credential cannot commit.
    pub async fn set_credential(&self, provider: Provider, value: &str) {
        let refresh = {
            let mut state = self.state.lock().await;
            state.credentials.insert(provider, value.to_string());
            state.catalog.clear_error(provider);
            state.catalog.bump_epoch(provider);
            if value.is_empty() {
                state.catalog.collapse(provider);
                state.catalog.drop_models(provider);
                let selection_points_here = ModelRef::parse(&state.selected_model)
                    .map(|r| r.provider == provider.id())
                    .unwrap_or(false);
                if selection_points_here {
                    state.selected_model.clear();
                }
                false
            } else {
                true
            }
        };
        if refresh {
            self.spawn_refresh(provider);
        }
    }

    pub async fn credential(&self, provider: Provider) -> String {
        self.state.lock().await.credential(provider).to_string()
    }

    /// Expand or collapse a provider's model panel. Expanding a provider
    /// that has no cached listing triggers a refresh when a credential is
    /// present (Ollama needs none).
    pub async fn toggle_provider_expansion(&self, provider: Provider) {
        let refresh = {
            let mut state = self.state.lock().await;
            let expanded = state.catalog.toggle_expanded(provider);
            expanded
                && !state.catalog.has_models(provider)
                && (!state.credential(provider).is_empty() || provider == Provider::Ollama)
        };
        if refresh {
            self.spawn_refresh(provider);
        }
    }

    fn spawn_refresh(&self, provider: Provider) {
        let session = self.clone();
        tokio::spawn(async move { session.refresh_models(provider).await });
    }

    /// Fetch the provider's model listing into the catalog. A no-op while a
    /// refresh for the same provider is in flight. The loading flag clears on
    /// every path; results carrying a stale credential epoch are discarded.
    pub async fn refresh_models(&self, provider: Provider) {
        let (epoch, credential) = {
            let mut state = self.state.lock().await;
            match state.catalog.begin_refresh(provider) {
                Some(epoch) => (epoch, state.credential(provider).to_string()),
                None => return,
            }
        };

        let outcome = self.fetcher.fetch_models(provider, &credential).await;
        if let Err(error) = &outcome {
            tracing::debug!(provider = provider.id(), error = error.as_str(), "model listing failed");
        }

        let mut state = self.state.lock().await;
        state.catalog.finish_refresh(provider, epoch, outcome);
    }

    pub async fn set_search_term(&self, provider: Provider, term: &str) {
        self.state.lock().await.catalog.set_search_term(provider, term);
    }

    pub async fn filtered_models(&self) -> HashMap<Provider, Vec<String>> {
        self.state.lock().await.catalog.filtered_models()
    }

    pub async fn models_for(&self, provider: Provider) -> Option<Vec<String>> {
        self.state
            .lock()
            .await
            .catalog
            .models(provider)
            .map(<[String]>::to_vec)
    }

    pub async fn catalog_error(&self, provider: Provider) -> Option<String> {
        self.state
            .lock()
            .await
            .catalog
            .error(provider)
            .map(str::to_string)
    }

    pub async fn is_loading_models(&self, provider: Provider) -> bool {
        self.state.lock().await.catalog.is_loading(provider)
    }

    pub async fn is_provider_expanded(&self, provider: Provider) -> bool {
        self.state.lock().await.catalog.is_expanded(provider)
    }

    // --- capability servers ------------------------------------------------

    pub async fn capability_servers(&self) -> Vec<(String, CapabilityServer)> {
        let state = self.state.lock().await;
        state
            .capabilities
            .keys()
            .into_iter()
            .filter_map(|key| {
                state
                    .capabilities
                    .get(&key)
                    .cloned()
                    .map(|server| (key, server))
            })
            .collect()
    }

    pub async fn install_capability(&self, key: &str) {
        self.state.lock().await.capabilities.install(key);
    }

    pub async fn toggle_capability_running(&self, key: &str) {
        self.state.lock().await.capabilities.toggle_running(key);
    }

    pub async fn add_custom_capability(
        &self,
        name: &str,
        description: &str,
        repo: &str,
    ) -> Result<String, RegistryError> {
        self.state
            .lock()
            .await
            .capabilities
            .add_custom(name, description, repo)
    }

    // --- submission --------------------------------------------------------

    pub async fn is_streaming(&self) -> bool {
        self.state.lock().await.is_streaming
    }

    /// Submit a user message to the active thread and stream the assistant
    /// response into it. Empty input is ignored; a submission while another
    /// stream is active is rejected without touching state. The streaming
    /// flag clears on every exit path.
    pub async fn submit_message(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let Some((handle, route)) = self.begin_submission(text).await else {
            return;
        };

        match route {
            Err(reason) => self.write_to_handle(&handle, reason).await,
            Ok(route) => {
                let api_messages = self.history_for(&handle).await;
                let rx = chat_stream::spawn_stream(StreamParams {
                    client: self.client.clone(),
                    base_url: route.base_url,
                    api_key: route.api_key,
                    model: route.model,
                    api_messages,
                    cancel_token: self.cancel_token.child_token(),
                });
                self.consume_stream(&handle, rx).await;
            }
        }

        self.state.lock().await.is_streaming = false;
    }

    /// Phase one, under a single lock: append the user message, retitle a
    /// fresh default thread, raise the streaming flag, append the assistant
    /// placeholder, and resolve the route before any I/O happens.
    async fn begin_submission(
        &self,
        text: &str,
    ) -> Option<(WriteHandle, Result<StreamRoute, String>)> {
        let mut state = self.state.lock().await;
        if state.is_streaming {
            tracing::warn!("rejecting submission while a response stream is active");
            return None;
        }

        let active = state.threads.active_key().to_string();
        state.threads.push_message(&active, Message::user(text));
        let thread_key = state
            .threads
            .maybe_rename_after_first_message(text)
            .unwrap_or(active);

        state.is_streaming = true;
        let index = state
            .threads
            .push_message(&thread_key, Message::assistant(""));
        let route = resolve_route(&state);
        Some((WriteHandle { thread_key, index }, route))
    }

    /// Everything in the submission's thread up to, and not including, the
    /// assistant placeholder.
    async fn history_for(&self, handle: &WriteHandle) -> Vec<ChatMessage> {
        let state = self.state.lock().await;
        state
            .threads
            .messages(&handle.thread_key)
            .iter()
            .take(handle.index)
            .map(Message::to_api)
            .collect()
    }

    async fn write_to_handle(&self, handle: &WriteHandle, content: String) {
        let mut state = self.state.lock().await;
        if !state
            .threads
            .set_content(&handle.thread_key, handle.index, content)
        {
            tracing::warn!(
                thread = handle.thread_key.as_str(),
                "stream write handle no longer resolves"
            );
        }
    }

    /// Apply stream events to the placeholder. Chunks accumulate and each
    /// accumulated prefix is written back under the lock, so observers see
    /// the content grow; an error event replaces the content wholesale.
    async fn consume_stream(
        &self,
        handle: &WriteHandle,
        mut rx: mpsc::UnboundedReceiver<StreamMessage>,
    ) {
        let mut accumulated = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamMessage::Chunk(chunk) => {
                    accumulated.push_str(&chunk);
                    self.write_to_handle(handle, accumulated.clone()).await;
                }
                StreamMessage::Error(message) => {
                    self.write_to_handle(handle, message).await;
                }
                StreamMessage::End => break,
            }
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
