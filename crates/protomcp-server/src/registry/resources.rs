//! Static resource registry (spec §3 "Resource", §4.5).

use std::sync::Arc;

use dashmap::DashMap;
use protomcp_protocol::{DuplicatePolicy, Resource};
use tracing::warn;

use crate::error::{ServerError, ServerResult};
use crate::handler::ResourceHandler;

struct ResourceEntry {
    resource: Resource,
    handler: Arc<dyn ResourceHandler>,
}

/// Whether a registration mutated the registry (used to decide whether to
/// emit a `notifications/resources/list_changed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A brand new URI was registered.
    Inserted,
    /// An existing URI's entry was replaced.
    Replaced,
    /// The registration was discarded; the existing entry is untouched.
    Ignored,
}

/// Stores registered static resources, keyed by primary URI (spec §3).
#[derive(Default)]
pub struct ResourceRegistry {
    entries: DashMap<String, ResourceEntry>,
}

impl ResourceRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource`, applying `policy` if the URI already has an
    /// entry (spec §3 "Duplicate registration policy").
    pub fn register(
        &self,
        resource: Resource,
        handler: Arc<dyn ResourceHandler>,
        policy: DuplicatePolicy,
    ) -> ServerResult<RegisterOutcome> {
        let uri = resource.uri.clone();
        if !self.entries.contains_key(&uri) {
            self.entries.insert(uri, ResourceEntry { resource, handler });
            return Ok(RegisterOutcome::Inserted);
        }

        match policy {
            DuplicatePolicy::Error => Err(ServerError::handler(format!(
                "resource already registered under uri '{uri}'"
            ))
            .with_context(uri)),
            DuplicatePolicy::Ignore => Ok(RegisterOutcome::Ignored),
            DuplicatePolicy::WarnReplace => {
                warn!(uri = %uri, "replacing existing resource registration");
                self.entries.insert(uri, ResourceEntry { resource, handler });
                Ok(RegisterOutcome::Replaced)
            }
            DuplicatePolicy::ReplaceSilent => {
                self.entries.insert(uri, ResourceEntry { resource, handler });
                Ok(RegisterOutcome::Replaced)
            }
        }
    }

    /// Remove a resource by URI. Returns `true` if it existed.
    pub fn unregister(&self, uri: &str) -> bool {
        self.entries.remove(uri).is_some()
    }

    /// Look up a resource's handler by URI.
    pub fn handler(&self, uri: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.entries.get(uri).map(|e| e.handler.clone())
    }

    /// One page of resources, ordered by URI (same cursor scheme as tools).
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> (Vec<Resource>, Option<String>) {
        let mut uris: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        uris.sort();
        let start = match cursor {
            Some(after) => uris.partition_point(|u| u.as_str() <= after),
            None => 0,
        };
        let page: Vec<String> = uris.into_iter().skip(start).take(page_size).collect();
        let next_cursor = if page.len() == page_size { page.last().cloned() } else { None };
        let resources = page
            .iter()
            .filter_map(|uri| self.entries.get(uri).map(|e| e.resource.clone()))
            .collect();
        (resources, next_cursor)
    }

    /// Total registered resource count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no resources are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
