use std::collections::{HashMap, HashSet};

use crate::core::providers::Provider;

/// Bookkeeping for per-provider model listings.
///
/// Absence of a provider in `models` means "not yet fetched". Fetch tasks
/// snapshot the provider's credential epoch when they start; a result whose
/// epoch no longer matches is discarded, so a listing fetched against a
/// replaced credential can never overwrite newer state.
#[derive(Default)]
pub struct CatalogState {
    models: HashMap<Provider, Vec<String>>,
    loading: HashSet<Provider>,
    errors: HashMap<Provider, String>,
    search_terms: HashMap<Provider, String>,
    expanded: HashSet<Provider>,
    epochs: HashMap<Provider, u64>,
}

impl CatalogState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models(&self, provider: Provider) -> Option<&[String]> {
        self.models.get(&provider).map(Vec::as_slice)
    }

    pub fn has_models(&self, provider: Provider) -> bool {
        self.models.contains_key(&provider)
    }

    pub fn is_loading(&self, provider: Provider) -> bool {
        self.loading.contains(&provider)
    }

    pub fn error(&self, provider: Provider) -> Option<&str> {
        self.errors.get(&provider).map(String::as_str)
    }

    pub fn clear_error(&mut self, provider: Provider) {
        self.errors.remove(&provider);
    }

    pub fn is_expanded(&self, provider: Provider) -> bool {
        self.expanded.contains(&provider)
    }

    pub fn expand(&mut self, provider: Provider) {
        self.expanded.insert(provider);
    }

    pub fn collapse(&mut self, provider: Provider) {
        self.expanded.remove(&provider);
    }

    pub fn toggle_expanded(&mut self, provider: Provider) -> bool {
        if !self.expanded.remove(&provider) {
            self.expanded.insert(provider);
            true
        } else {
            false
        }
    }

    pub fn set_search_term(&mut self, provider: Provider, term: &str) {
        self.search_terms.insert(provider, term.to_string());
    }

    pub fn epoch(&self, provider: Provider) -> u64 {
        self.epochs.get(&provider).copied().unwrap_or(0)
    }

    /// Invalidate any in-flight fetch for the provider.
    pub fn bump_epoch(&mut self, provider: Provider) {
        *self.epochs.entry(provider).or_insert(0) += 1;
    }

    /// Forget a provider's cached listing (credential was cleared).
    pub fn drop_models(&mut self, provider: Provider) {
        self.models.remove(&provider);
    }

    /// Mark a refresh as started. Returns the epoch the fetch must present
    /// when committing, or None when a refresh is already in flight.
    pub fn begin_refresh(&mut self, provider: Provider) -> Option<u64> {
        if self.loading.contains(&provider) {
            return None;
        }
        self.loading.insert(provider);
        self.expanded.insert(provider);
        self.errors.remove(&provider);
        self.models.remove(&provider);
        Some(self.epoch(provider))
    }

    /// Commit a refresh outcome. The loading entry clears unconditionally;
    /// the result itself is discarded when the epoch has moved on. Empty
    /// listings are not stored, so the provider reads as unfetched.
    pub fn finish_refresh(
        &mut self,
        provider: Provider,
        epoch: u64,
        outcome: Result<Vec<String>, String>,
    ) {
        self.loading.remove(&provider);
        if self.epoch(provider) != epoch {
            return;
        }
        match outcome {
            Ok(models) => {
                if !models.is_empty() {
                    self.models.insert(provider, models);
                }
            }
            Err(error) => {
                self.errors.insert(provider, error);
            }
        }
    }

    /// Per-provider listings narrowed by that provider's search term:
    /// case-insensitive substring match, original order preserved.
    pub fn filtered_models(&self) -> HashMap<Provider, Vec<String>> {
        let mut filtered = HashMap::new();
        for (provider, models) in &self.models {
            let term = self
                .search_terms
                .get(provider)
                .map(|t| t.to_lowercase())
                .unwrap_or_default();
            let list = if term.is_empty() {
                models.clone()
            } else {
                models
                    .iter()
                    .filter(|m| m.to_lowercase().contains(&term))
                    .cloned()
                    .collect()
            };
            filtered.insert(*provider, list);
        }
        filtered
    }

    #[cfg(test)]
    pub fn set_models_for_test(&mut self, provider: Provider, models: Vec<String>) {
        self.models.insert(provider, models);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn begin_refresh_is_idempotent_while_loading() {
        let mut catalog = CatalogState::new();
        let epoch = catalog.begin_refresh(Provider::OpenAi);
        assert_eq!(epoch, Some(0));
        assert!(catalog.is_loading(Provider::OpenAi));
        assert!(catalog.is_expanded(Provider::OpenAi));

        assert_eq!(catalog.begin_refresh(Provider::OpenAi), None);
    }

    #[test]
    fn begin_refresh_drops_stale_state() {
        let mut catalog = CatalogState::new();
        catalog.set_models_for_test(Provider::OpenAi, strings(&["old-model"]));
        catalog.finish_refresh(
            Provider::OpenAi,
            0,
            Err("Invalid API Key.".to_string()),
        );
        assert!(catalog.error(Provider::OpenAi).is_some());

        catalog.begin_refresh(Provider::OpenAi);
        assert!(!catalog.has_models(Provider::OpenAi));
        assert!(catalog.error(Provider::OpenAi).is_none());
    }

    #[test]
    fn finish_refresh_discards_stale_epochs() {
        let mut catalog = CatalogState::new();
        let epoch = catalog.begin_refresh(Provider::Groq).unwrap();
        catalog.bump_epoch(Provider::Groq);

        catalog.finish_refresh(Provider::Groq, epoch, Ok(strings(&["llama3"])));
        assert!(!catalog.is_loading(Provider::Groq));
        assert!(!catalog.has_models(Provider::Groq));

        // A fetch started after the bump commits normally.
        let epoch = catalog.begin_refresh(Provider::Groq).unwrap();
        catalog.finish_refresh(Provider::Groq, epoch, Ok(strings(&["llama3"])));
        assert_eq!(catalog.models(Provider::Groq), Some(strings(&["llama3"]).as_slice()));
    }

    #[test]
    fn empty_listings_are_not_stored() {
        let mut catalog = CatalogState::new();
        let epoch = catalog.begin_refresh(Provider::Moonshot).unwrap();
        catalog.finish_refresh(Provider::Moonshot, epoch, Ok(Vec::new()));
        assert!(!catalog.has_models(Provider::Moonshot));
        assert!(catalog.error(Provider::Moonshot).is_none());
    }

    #[test]
    fn filtered_models_matches_substring_case_insensitively() {
        let mut catalog = CatalogState::new();
        catalog.set_models_for_test(
            Provider::OpenAi,
            strings(&["model-a", "model-b", "common-model"]),
        );
        catalog.set_models_for_test(
            Provider::Groq,
            strings(&["model-c", "model-d", "common-model"]),
        );

        // No search terms: the full catalog comes back.
        let filtered = catalog.filtered_models();
        assert_eq!(
            filtered[&Provider::OpenAi],
            strings(&["model-a", "model-b", "common-model"])
        );
        assert_eq!(
            filtered[&Provider::Groq],
            strings(&["model-c", "model-d", "common-model"])
        );

        catalog.set_search_term(Provider::OpenAi, "COMMON");
        let filtered = catalog.filtered_models();
        assert_eq!(filtered[&Provider::OpenAi], strings(&["common-model"]));
        assert_eq!(
            filtered[&Provider::Groq],
            strings(&["model-c", "model-d", "common-model"])
        );
    }
}
