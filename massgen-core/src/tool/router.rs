//! Splits incoming tool calls into coordination calls, executable external
//! calls, and calls deferred by planning-mode policy (§4.2).

use serde_json::Value;

use crate::error::Result;
use crate::message::ToolCall;

use super::{CoordinationCall, ExternalToolRegistry, SideEffect, ToolResult};

/// A side-effecting external tool call recorded during coordination so it
/// can be replayed as a hint to the winner during final presentation.
#[derive(Debug, Clone)]
pub struct DeferredCall {
    /// Agent that attempted the call.
    pub agent_id: String,
    /// Name of the tool that was deferred.
    pub tool_name: String,
    /// Raw JSON arguments of the deferred call.
    pub arguments: Value,
}

/// Outcome of routing a single tool call.
#[derive(Debug)]
pub enum RoutedCall {
    /// A coordination-tool call (`new_answer`/`vote`) to be applied to
    /// [`crate::state::CoordinationState`] by the Orchestrator.
    Coordination(CoordinationCall),
    /// An external tool call that the caller should execute against the
    /// registry and turn into a [`ToolResult`].
    Execute {
        /// Raw JSON arguments to pass to the tool.
        arguments: Value,
    },
    /// A side-effecting call deferred by planning-mode policy. Carries the
    /// synthetic result to return to the agent plus the record to replay later.
    Deferred(ToolResult, DeferredCall),
    /// `name` is neither a coordination tool nor a registered external tool.
    Unknown(ToolResult),
}

/// Routes tool calls between the closed coordination-tool enumeration and
/// the open external-tool registry, applying planning-mode deferral.
#[derive(Debug)]
pub struct ToolRouter {
    registry: ExternalToolRegistry,
    planning_mode: bool,
}

impl ToolRouter {
    /// Construct a router over a tool registry with planning-mode policy fixed for the session.
    #[must_use]
    pub const fn new(registry: ExternalToolRegistry, planning_mode: bool) -> Self {
        Self {
            registry,
            planning_mode,
        }
    }

    /// Access the underlying external-tool registry.
    #[must_use]
    pub const fn registry(&self) -> &ExternalToolRegistry {
        &self.registry
    }

    /// Route a single tool call.
    ///
    /// `final_presentation` lifts planning-mode restrictions, per §4.6 step 4.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::error::Error::InvalidCoordinationCall`] when a
    /// coordination tool is named but its arguments don't match its schema.
    pub fn route(
        &self,
        agent_id: &str,
        call: &ToolCall,
        final_presentation: bool,
    ) -> Result<RoutedCall> {
        let name = call.function.name.as_str();

        if CoordinationCall::is_coordination_tool(name) {
            let arguments = call.arguments_value().unwrap_or(Value::Null);
            return CoordinationCall::parse(name, &arguments).map(RoutedCall::Coordination);
        }

        let Some(registered) = self.registry.get(name) else {
            return Ok(RoutedCall::Unknown(ToolResult::error(
                call.id.clone(),
                "unknown_tool",
                format!("'{name}' is not a recognized tool"),
            )));
        };

        let arguments = call.arguments_value().unwrap_or(Value::Null);

        let deferred = !final_presentation
            && self.planning_mode
            && registered.side_effect == SideEffect::SideEffecting;

        if deferred {
            let result = ToolResult::deferred(call.id.clone(), name);
            let record = DeferredCall {
                agent_id: agent_id.to_owned(),
                tool_name: name.to_owned(),
                arguments,
            };
            return Ok(RoutedCall::Deferred(result, record));
        }

        Ok(RoutedCall::Execute { arguments })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    use crate::tool::{ExternalTool, ToolDefinition};

    struct Noop;

    #[async_trait]
    impl ExternalTool for Noop {
        async fn invoke(&self, _arguments: Value) -> Result<String> {
            Ok("done".to_owned())
        }
    }

    fn registry_with(name: &str, side_effect: SideEffect) -> ExternalToolRegistry {
        let mut registry = ExternalToolRegistry::new();
        registry.register(
            ToolDefinition::new(name, "test tool", serde_json::json!({"type": "object"})),
            side_effect,
            Arc::new(Noop),
        );
        registry
    }

    #[test]
    fn routes_new_answer_as_coordination() {
        let router = ToolRouter::new(ExternalToolRegistry::new(), false);
        let call = ToolCall::function("c1", "new_answer", r#"{"content":"42"}"#);
        let routed = router.route("agent1", &call, false).unwrap();
        assert!(matches!(routed, RoutedCall::Coordination(CoordinationCall::NewAnswer { .. })));
    }

    #[test]
    fn defers_side_effecting_tool_in_planning_mode() {
        let router = ToolRouter::new(registry_with("post_message", SideEffect::SideEffecting), true);
        let call = ToolCall::function("c1", "post_message", r"{}");
        let routed = router.route("agent1", &call, false).unwrap();
        assert!(matches!(routed, RoutedCall::Deferred(_, _)));
    }

    #[test]
    fn executes_pure_tool_even_in_planning_mode() {
        let router = ToolRouter::new(registry_with("search", SideEffect::Pure), true);
        let call = ToolCall::function("c1", "search", r"{}");
        let routed = router.route("agent1", &call, false).unwrap();
        assert!(matches!(routed, RoutedCall::Execute { .. }));
    }

    #[test]
    fn final_presentation_lifts_deferral() {
        let router = ToolRouter::new(registry_with("post_message", SideEffect::SideEffecting), true);
        let call = ToolCall::function("c1", "post_message", r"{}");
        let routed = router.route("agent1", &call, true).unwrap();
        assert!(matches!(routed, RoutedCall::Execute { .. }));
    }

    #[test]
    fn unknown_tool_name_is_rejected() {
        let router = ToolRouter::new(ExternalToolRegistry::new(), false);
        let call = ToolCall::function("c1", "frobnicate", r"{}");
        let routed = router.route("agent1", &call, false).unwrap();
        assert!(matches!(routed, RoutedCall::Unknown(_)));
    }

    #[test]
    fn invalid_vote_arguments_error() {
        let router = ToolRouter::new(ExternalToolRegistry::new(), false);
        let call = ToolCall::function("c1", "vote", r"{}");
        let err = router.route("agent1", &call, false).unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidCoordinationCall { .. }));
    }
}
