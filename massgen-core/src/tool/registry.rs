//! Registry of external tools available to agents.
//!
//! External tools are looked up by name at routing time, in contrast to the
//! closed [`super::CoordinationCall`] enumeration for the two built-in
//! coordination tools (see §9's "dynamic tool dispatch" redesign note).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

use super::{SideEffect, ToolDefinition};

/// Invocation endpoint for a single external tool.
///
/// `invoke` returns the tool's textual output on success; failures are
/// surfaced as [`crate::error::Error::Tool`] and converted to a
/// [`super::ToolResult`] by the router without terminating the agent's turn.
#[async_trait]
pub trait ExternalTool: Send + Sync {
    /// Execute the tool with the given JSON arguments.
    async fn invoke(&self, arguments: Value) -> Result<String>;
}

/// A tool registered with its descriptor, side-effect classification, and handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Descriptor handed to the backend for function calling.
    pub definition: ToolDefinition,
    /// Side-effect classification used by planning-mode policy.
    pub side_effect: SideEffect,
    handler: Arc<dyn ExternalTool>,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.definition.name)
            .field("side_effect", &self.side_effect)
            .finish_non_exhaustive()
    }
}

impl RegisteredTool {
    /// Invoke the underlying handler.
    ///
    /// # Errors
    ///
    /// Propagates whatever error the handler returns.
    pub async fn invoke(&self, arguments: Value) -> Result<String> {
        self.handler.invoke(arguments).await
    }
}

/// Name-indexed registry of external tools available for a session.
#[derive(Clone, Default)]
pub struct ExternalToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl fmt::Debug for ExternalToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalToolRegistry")
            .field("tool_count", &self.tools.len())
            .finish_non_exhaustive()
    }
}

impl ExternalToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition's name.
    pub fn register(
        &mut self,
        definition: ToolDefinition,
        side_effect: SideEffect,
        handler: Arc<dyn ExternalTool>,
    ) {
        let name = definition.name.clone();
        self.tools.insert(
            name,
            RegisteredTool {
                definition,
                side_effect,
                handler,
            },
        );
    }

    /// Look up a registered tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Returns `true` if `name` names a registered external tool.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors for every registered tool, in registration order is not
    /// guaranteed (backed by a hash map).
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
