//! Resource template registry: URI-template matching with wildcard and
//! default-value support (spec §3 "Resource Template", §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use protomcp_protocol::resources::DuplicatePolicy;
use protomcp_protocol::ResourceTemplate;
use tracing::warn;

use crate::error::{ServerError, ServerResult};
use crate::handler::ResourceTemplateHandler;
use crate::registry::resources::RegisterOutcome;
use crate::uri_template::{CompiledPattern, UriTemplateMatcher};

struct TemplateEntry {
    template: ResourceTemplate,
    handler: Arc<dyn ResourceTemplateHandler>,
}

/// Stores registered resource templates and matches incoming URIs against
/// them in registration order (spec §4.5: "first match wins. Tie-break:
/// registration order for identical-specificity patterns").
#[derive(Default)]
pub struct TemplateRegistry {
    entries: RwLock<HashMap<String, TemplateEntry>>,
    matcher: RwLock<UriTemplateMatcher<String>>,
}

impl TemplateRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under its declared name, applying `policy` on a
    /// name collision. Compiles every pattern (primary + aliases) up front
    /// so a malformed pattern fails at registration, not at match time.
    pub fn register(
        &self,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceTemplateHandler>,
    ) -> ServerResult<RegisterOutcome> {
        let name = template.name.clone();
        let policy = template.duplicate_policy;
        let already_exists = self.entries.read().contains_key(&name);

        if already_exists {
            match policy {
                DuplicatePolicy::Error => {
                    return Err(ServerError::handler(format!(
                        "resource template already registered under name '{name}'"
                    )))
                }
                DuplicatePolicy::Ignore => return Ok(RegisterOutcome::Ignored),
                DuplicatePolicy::WarnReplace => {
                    warn!(template = %name, "replacing existing resource template registration");
                }
                DuplicatePolicy::ReplaceSilent => {}
            }
            self.unregister(&name);
        }

        let compiled: Vec<CompiledPattern> = template
            .all_patterns()
            .map(CompiledPattern::compile)
            .collect::<ServerResult<Vec<_>>>()?;

        {
            let mut matcher = self.matcher.write();
            for pattern in compiled {
                matcher.register(name.clone(), pattern);
            }
        }
        self.entries.write().insert(name, TemplateEntry { template, handler });

        Ok(if already_exists {
            RegisterOutcome::Replaced
        } else {
            RegisterOutcome::Inserted
        })
    }

    /// Remove a template and every pattern it registered. Returns `true` if
    /// it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.matcher.write().remove(|id| id == name);
        self.entries.write().remove(name).is_some()
    }

    /// Match `uri` against every registered template in registration
    /// order, returning the first hit's handler and bound variables.
    pub fn match_uri(
        &self,
        uri: &str,
    ) -> Option<(Arc<dyn ResourceTemplateHandler>, HashMap<String, String>)> {
        let (name, bindings) = self.matcher.read().match_uri(uri)?;
        let handler = self.entries.read().get(&name).map(|e| e.handler.clone())?;
        Some((handler, bindings))
    }

    /// All registered templates, for `resources/templates/list`-style
    /// enumeration.
    pub fn list(&self) -> Vec<ResourceTemplate> {
        self.entries.read().values().map(|e| e.template.clone()).collect()
    }

    /// Total registered template count.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// `true` if no templates are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
