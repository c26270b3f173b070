//! Prompt registry (spec §3 "Prompt").

use std::sync::Arc;

use dashmap::DashMap;
use protomcp_protocol::Prompt;

use crate::handler::PromptHandler;

struct PromptEntry {
    prompt: Prompt,
    handler: Arc<dyn PromptHandler>,
}

/// Stores registered prompts, keyed by [`Prompt::key`] (URI if present,
/// else name).
#[derive(Default)]
pub struct PromptRegistry {
    entries: DashMap<String, PromptEntry>,
}

impl PromptRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a prompt. Returns `true` if this replaced an
    /// existing entry.
    pub fn register(&self, prompt: Prompt, handler: Arc<dyn PromptHandler>) -> bool {
        let key = prompt.key().to_string();
        self.entries.insert(key, PromptEntry { prompt, handler }).is_some()
    }

    /// Remove a prompt by key. Returns `true` if it existed.
    pub fn unregister(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Look up a prompt's handler by key.
    pub fn handler(&self, key: &str) -> Option<Arc<dyn PromptHandler>> {
        self.entries.get(key).map(|e| e.handler.clone())
    }

    /// One page of prompts, ordered by key (same cursor scheme as tools).
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> (Vec<Prompt>, Option<String>) {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        let start = match cursor {
            Some(after) => keys.partition_point(|k| k.as_str() <= after),
            None => 0,
        };
        let page: Vec<String> = keys.into_iter().skip(start).take(page_size).collect();
        let next_cursor = if page.len() == page_size { page.last().cloned() } else { None };
        let prompts = page
            .iter()
            .filter_map(|k| self.entries.get(k).map(|e| e.prompt.clone()))
            .collect();
        (prompts, next_cursor)
    }

    /// Total registered prompt count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no prompts are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
