//! Registry layer: typed tool/resource/prompt/template registration,
//! enumeration, call resolution, and change notification (spec §4.5).

pub mod prompts;
pub mod resources;
pub mod templates;
pub mod tools;

use std::sync::Arc;

use protomcp_protocol::resources::DuplicatePolicy;
use protomcp_protocol::{Prompt, Resource, ResourceTemplate, Tool};

use crate::error::ServerResult;
use crate::handler::{PromptHandler, ResourceHandler, ResourceTemplateHandler, ToolHandler};

use prompts::PromptRegistry;
use resources::{RegisterOutcome, ResourceRegistry};
use templates::TemplateRegistry;
use tools::ToolRegistry;

/// A callback invoked after a registry mutation that changes what a
/// `*/list` call would return. Always invoked *after* the registry's
/// internal lock is released, to avoid deadlocking a callback that
/// re-enters the registry (spec §4.5: "the registry invokes the
/// appropriate `onChanged` callback after releasing its internal lock").
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// The combined tool/resource/template/prompt registry.
#[derive(Default)]
pub struct Registry {
    tools: ToolRegistry,
    resources: ResourceRegistry,
    templates: TemplateRegistry,
    prompts: PromptRegistry,
    on_tools_changed: Option<ChangeCallback>,
    on_resources_changed: Option<ChangeCallback>,
    on_prompts_changed: Option<ChangeCallback>,
}

impl Registry {
    /// Construct an empty registry with no change callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback fired on any tool-registry mutation.
    pub fn on_tools_changed(&mut self, cb: ChangeCallback) {
        self.on_tools_changed = Some(cb);
    }

    /// Set the callback fired on any resource- or template-registry mutation.
    pub fn on_resources_changed(&mut self, cb: ChangeCallback) {
        self.on_resources_changed = Some(cb);
    }

    /// Set the callback fired on any prompt-registry mutation.
    pub fn on_prompts_changed(&mut self, cb: ChangeCallback) {
        self.on_prompts_changed = Some(cb);
    }

    /// Register (or overwrite) a tool, then fire the tools-changed callback.
    pub fn register_tool(&self, tool: Tool, handler: Arc<dyn ToolHandler>) {
        self.tools.register(tool, handler);
        self.fire(&self.on_tools_changed);
    }

    /// Unregister a tool by name, firing the callback if it existed.
    pub fn unregister_tool(&self, name: &str) -> bool {
        let removed = self.tools.unregister(name);
        if removed {
            self.fire(&self.on_tools_changed);
        }
        removed
    }

    /// List tools (spec §4.6 `tools/list`).
    pub fn list_tools(&self, cursor: Option<&str>, page_size: usize) -> (Vec<Tool>, Option<String>) {
        self.tools.list(cursor, page_size)
    }

    /// Look up a tool's handler.
    pub fn tool_handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.handler(name)
    }

    /// Register (or replace, per `policy`) a static resource.
    pub fn register_resource(
        &self,
        resource: Resource,
        handler: Arc<dyn ResourceHandler>,
        policy: DuplicatePolicy,
    ) -> ServerResult<RegisterOutcome> {
        let outcome = self.resources.register(resource, handler, policy)?;
        if outcome != RegisterOutcome::Ignored {
            self.fire(&self.on_resources_changed);
        }
        Ok(outcome)
    }

    /// Unregister a static resource by URI.
    pub fn unregister_resource(&self, uri: &str) -> bool {
        let removed = self.resources.unregister(uri);
        if removed {
            self.fire(&self.on_resources_changed);
        }
        removed
    }

    /// List static resources (spec §4.6 `resources/list`).
    pub fn list_resources(&self, cursor: Option<&str>, page_size: usize) -> (Vec<Resource>, Option<String>) {
        self.resources.list(cursor, page_size)
    }

    /// Look up a static resource's handler by URI.
    pub fn resource_handler(&self, uri: &str) -> Option<Arc<dyn ResourceHandler>> {
        self.resources.handler(uri)
    }

    /// Register a resource template.
    pub fn register_template(
        &self,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceTemplateHandler>,
    ) -> ServerResult<RegisterOutcome> {
        let outcome = self.templates.register(template, handler)?;
        if outcome != RegisterOutcome::Ignored {
            self.fire(&self.on_resources_changed);
        }
        Ok(outcome)
    }

    /// Unregister a resource template by name.
    pub fn unregister_template(&self, name: &str) -> bool {
        let removed = self.templates.unregister(name);
        if removed {
            self.fire(&self.on_resources_changed);
        }
        removed
    }

    /// Resolve `resources/read`: try the static registry first, then
    /// templates (spec §4.6).
    pub fn resolve_resource(
        &self,
        uri: &str,
    ) -> Option<ResourceResolution> {
        if let Some(handler) = self.resources.handler(uri) {
            return Some(ResourceResolution::Static(handler));
        }
        self.templates
            .match_uri(uri)
            .map(|(handler, vars)| ResourceResolution::Template(handler, vars))
    }

    /// All registered resource templates.
    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.templates.list()
    }

    /// Register (or overwrite) a prompt.
    pub fn register_prompt(&self, prompt: Prompt, handler: Arc<dyn PromptHandler>) {
        self.prompts.register(prompt, handler);
        self.fire(&self.on_prompts_changed);
    }

    /// Unregister a prompt by key.
    pub fn unregister_prompt(&self, key: &str) -> bool {
        let removed = self.prompts.unregister(key);
        if removed {
            self.fire(&self.on_prompts_changed);
        }
        removed
    }

    /// List prompts (spec §4.6 `prompts/list`).
    pub fn list_prompts(&self, cursor: Option<&str>, page_size: usize) -> (Vec<Prompt>, Option<String>) {
        self.prompts.list(cursor, page_size)
    }

    /// Look up a prompt's handler by key.
    pub fn prompt_handler(&self, key: &str) -> Option<Arc<dyn PromptHandler>> {
        self.prompts.handler(key)
    }

    fn fire(&self, cb: &Option<ChangeCallback>) {
        // Clone the `Arc` out before calling so nothing upstream of this
        // function is holding a lock the callback could re-enter.
        if let Some(cb) = cb.clone() {
            cb();
        }
    }
}

/// Which half of `resources/read`'s two-stage lookup (spec §4.6) resolved
/// the request.
pub enum ResourceResolution {
    /// A static resource's handler.
    Static(Arc<dyn ResourceHandler>),
    /// A resource template's handler, plus the variables bound from the URI.
    Template(Arc<dyn ResourceTemplateHandler>, std::collections::HashMap<String, String>),
}
