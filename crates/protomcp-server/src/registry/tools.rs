//! Tool registry (spec §3 "Tool", §4.5).

use std::sync::Arc;

use dashmap::DashMap;
use protomcp_protocol::Tool;

use crate::handler::ToolHandler;

#[derive(Clone)]
struct ToolEntry {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// Stores registered tools and their handlers.
///
/// Duplicate names overwrite and the caller is told so it can emit a
/// `notifications/tools/list_changed` (spec §4.5; §9 open question notes
/// this silent-overwrite behavior is ambiguous in the source this spec was
/// distilled from — this core keeps the permissive behavior rather than
/// erroring, consistent with `resources`' default `WarnReplace` policy).
#[derive(Default)]
pub struct ToolRegistry {
    entries: DashMap<String, ToolEntry>,
}

impl ToolRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a tool. Returns `true` if this replaced an
    /// existing entry.
    pub fn register(&self, mut tool: Tool, handler: Arc<dyn ToolHandler>) -> bool {
        if let Some(schema) = handler.input_schema() {
            tool.input_schema = Some(schema.clone());
        }
        self.entries.insert(tool.name.clone(), ToolEntry { tool, handler }).is_some()
    }

    /// Remove a tool by name. Returns `true` if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Look up a tool's handler by name.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.entries.get(name).map(|e| e.handler.clone())
    }

    /// One page of tools, ordered by name, starting after `cursor`
    /// (spec §4.6: "opaque cursor (the last returned name; page size 50)").
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> (Vec<Tool>, Option<String>) {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        let start = match cursor {
            Some(after) => names.partition_point(|n| n.as_str() <= after),
            None => 0,
        };
        let page: Vec<String> = names.into_iter().skip(start).take(page_size).collect();
        let next_cursor = if page.len() == page_size {
            page.last().cloned()
        } else {
            None
        };
        let tools = page
            .iter()
            .filter_map(|name| self.entries.get(name).map(|e| e.tool.clone()))
            .collect();
        (tools, next_cursor)
    }

    /// Total registered tool count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
