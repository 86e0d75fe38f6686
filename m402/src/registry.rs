//! Tool registry.
//!
//! The registry is filled at startup and read-only afterwards. Swapping in a
//! new set of tools goes through [`Invoker::reload`](crate::Invoker::reload),
//! which replaces the whole registry; calls already in flight keep the
//! descriptor they looked up.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::tool::ToolDescriptor;

/// Registry failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
    /// No tool is registered under this name.
    #[error("tool `{0}` not found")]
    NotFound(String),
}

/// Maps tool names to descriptors.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<ToolDescriptor>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tools.keys()).finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, tool: ToolDescriptor) -> Result<(), RegistryError> {
        let name = tool.name().to_owned();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// Looks up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown names.
    pub fn lookup(&self, name: &str) -> Result<Arc<ToolDescriptor>, RegistryError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))
    }

    /// Iterates over the tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values().map(|tool| &**tool)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{HandlerError, ToolResult};
    use crate::value::Map;

    async fn noop(_: Map) -> Result<ToolResult, HandlerError> {
        Ok(ToolResult::default())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::free("a", noop)).unwrap();
        assert_eq!(
            registry.register(ToolDescriptor::free("a", noop)),
            Err(RegistryError::DuplicateTool("a".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_and_iteration() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::free("b", noop)).unwrap();
        registry.register(ToolDescriptor::free("a", noop)).unwrap();
        assert_eq!(registry.lookup("a").unwrap().name(), "a");
        assert!(matches!(
            registry.lookup("missing"),
            Err(RegistryError::NotFound(name)) if name == "missing"
        ));
        let names: Vec<_> = registry.iter().map(ToolDescriptor::name).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
