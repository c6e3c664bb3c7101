use std::collections::HashMap;

use crate::core::message::Message;

pub const DEFAULT_THREAD_KEY: &str = "new chat";

/// How many characters of the first message become the thread title.
const TITLE_LEN: usize = 20;

/// Insertion-ordered collection of named threads plus the active-thread key.
///
/// A parallel order list and lookup map keep title iteration deterministic.
/// The active key always resolves to an existing thread; a default thread
/// exists from construction and threads are never removed.
pub struct ThreadStore {
    order: Vec<String>,
    threads: HashMap<String, Vec<Message>>,
    active: String,
}

impl ThreadStore {
    pub fn new() -> Self {
        let mut threads = HashMap::new();
        threads.insert(DEFAULT_THREAD_KEY.to_string(), Vec::new());
        Self {
            order: vec![DEFAULT_THREAD_KEY.to_string()],
            threads,
            active: DEFAULT_THREAD_KEY.to_string(),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn active_key(&self) -> &str {
        &self.active
    }

    /// Allocate a counter-named thread and make it active.
    pub fn create(&mut self) -> String {
        let key = format!("chat_{}", self.threads.len());
        self.insert_or_reset(key.clone());
        self.active = key.clone();
        key
    }

    /// Switch the active thread. Returns false (and leaves the active key
    /// untouched) when the key does not resolve.
    pub fn select(&mut self, key: &str) -> bool {
        if !self.threads.contains_key(key) {
            return false;
        }
        self.active = key.to_string();
        true
    }

    pub fn messages(&self, key: &str) -> &[Message] {
        self.threads.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn current_messages(&self) -> &[Message] {
        self.messages(&self.active)
    }

    /// Append a message to the named thread, creating the entry if it is
    /// somehow missing. Returns the message's index within the thread.
    pub fn push_message(&mut self, key: &str, message: Message) -> usize {
        if !self.threads.contains_key(key) {
            self.insert_or_reset(key.to_string());
        }
        let messages = self.threads.entry(key.to_string()).or_default();
        messages.push(message);
        messages.len() - 1
    }

    /// Overwrite the content of one message. Returns false when the handle
    /// no longer resolves.
    pub fn set_content(&mut self, key: &str, index: usize, content: String) -> bool {
        match self.threads.get_mut(key).and_then(|m| m.get_mut(index)) {
            Some(message) => {
                message.content = content;
                true
            }
            None => false,
        }
    }

    /// Retitle the active thread after its first message: if the thread holds
    /// exactly one message and still carries the initial default key, it is
    /// re-keyed to the first [`TITLE_LEN`] characters of the message text and
    /// moved to the end of the title order. Returns the new key if renamed.
    pub fn maybe_rename_after_first_message(&mut self, text: &str) -> Option<String> {
        if self.current_messages().len() != 1 || !self.active.starts_with(DEFAULT_THREAD_KEY) {
            return None;
        }
        let new_key: String = text.chars().take(TITLE_LEN).collect();
        if new_key == self.active {
            return None;
        }
        let messages = self.threads.remove(&self.active).unwrap_or_default();
        self.order.retain(|k| k != &self.active);
        if self.threads.insert(new_key.clone(), messages).is_none() {
            self.order.push(new_key.clone());
        }
        self.active = new_key.clone();
        Some(new_key)
    }

    fn insert_or_reset(&mut self, key: String) {
        if self.threads.insert(key.clone(), Vec::new()).is_none() {
            self.order.push(key);
        }
    }
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_empty_default_thread() {
        let store = ThreadStore::new();
        assert_eq!(store.titles(), vec![DEFAULT_THREAD_KEY.to_string()]);
        assert_eq!(store.active_key(), DEFAULT_THREAD_KEY);
        assert!(store.current_messages().is_empty());
    }

    #[test]
    fn create_names_threads_by_count_and_activates() {
        let mut store = ThreadStore::new();
        let key = store.create();
        assert_eq!(key, "chat_1");
        assert_eq!(store.active_key(), "chat_1");
        assert!(store.current_messages().is_empty());
        assert_eq!(
            store.titles(),
            vec![DEFAULT_THREAD_KEY.to_string(), "chat_1".to_string()]
        );

        assert_eq!(store.create(), "chat_2");
    }

    #[test]
    fn select_rejects_unknown_keys() {
        let mut store = ThreadStore::new();
        store.create();
        assert!(store.select(DEFAULT_THREAD_KEY));
        assert_eq!(store.active_key(), DEFAULT_THREAD_KEY);

        assert!(!store.select("missing"));
        assert_eq!(store.active_key(), DEFAULT_THREAD_KEY);
    }

    #[test]
    fn rename_truncates_and_moves_thread_to_end() {
        let mut store = ThreadStore::new();
        store.create();
        store.select(DEFAULT_THREAD_KEY);
        store.push_message(
            DEFAULT_THREAD_KEY,
            Message::user("What is the airspeed velocity of an unladen swallow?"),
        );
        let renamed = store
            .maybe_rename_after_first_message(
                "What is the airspeed velocity of an unladen swallow?",
            )
            .expect("first message should rename the default thread");
        assert_eq!(renamed, "What is the airspeed");
        assert_eq!(store.active_key(), "What is the airspeed");
        assert_eq!(
            store.titles(),
            vec!["chat_1".to_string(), "What is the airspeed".to_string()]
        );
        assert_eq!(store.current_messages().len(), 1);
    }

    #[test]
    fn rename_only_applies_to_first_message_in_default_thread() {
        let mut store = ThreadStore::new();
        store.push_message(DEFAULT_THREAD_KEY, Message::user("one"));
        assert_eq!(
            store.maybe_rename_after_first_message("one"),
            Some("one".to_string())
        );

        store.push_message("one", Message::user("two"));
        assert_eq!(store.maybe_rename_after_first_message("two"), None);

        // Counter-named threads keep their keys.
        let key = store.create();
        store.push_message(&key, Message::user("hello"));
        assert_eq!(store.maybe_rename_after_first_message("hello"), None);
        assert_eq!(store.active_key(), key);
    }

    #[test]
    fn set_content_targets_one_message() {
        let mut store = ThreadStore::new();
        let idx = store.push_message(DEFAULT_THREAD_KEY, Message::assistant(""));
        assert!(store.set_content(DEFAULT_THREAD_KEY, idx, "partial".to_string()));
        assert_eq!(store.current_messages()[idx].content, "partial");

        assert!(!store.set_content(DEFAULT_THREAD_KEY, 7, "nope".to_string()));
        assert!(!store.set_content("missing", 0, "nope".to_string()));
    }
}
