//! Tool definitions and the closed/registry split that the Tool Router
//! (C2) operates over: two built-in coordination tools and an open
//! registry of external tools.
//!
//! # `OpenAI` API Alignment
//!
//! [`ToolDefinition`] serializes to `{"type": "function", "function": {...}}`,
//! matching `OpenAI`'s function-calling format, so the same descriptor set
//! can be handed to any backend adapter without translation at this layer.

pub mod registry;
pub mod router;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use registry::{ExternalToolRegistry, RegisteredTool};
pub use router::{RoutedCall, ToolRouter};

/// Definition of a tool exposed to a backend for function calling.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    /// Name of the tool, e.g. `new_answer`.
    pub name: String,
    /// Description shown to the model to help it decide when to call this tool.
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: Value,
    /// Whether to request strict schema validation (`OpenAI` Structured Outputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ToolDefinition {
    /// Create a new tool definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: None,
        }
    }

    /// Enable strict schema validation for this definition.
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }
}

/// Custom serialization matching `OpenAI`'s function-calling wire format.
impl Serialize for ToolDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut function = serde_json::Map::new();
        function.insert("name".to_owned(), Value::String(self.name.clone()));
        function.insert(
            "description".to_owned(),
            Value::String(self.description.clone()),
        );
        function.insert("parameters".to_owned(), self.parameters.clone());
        if let Some(strict) = self.strict {
            function.insert("strict".to_owned(), Value::Bool(strict));
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &function)?;
        map.end()
    }
}

/// Side-effect classification of an external tool, used by the router to
/// apply planning-mode deferral (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Read-only; no observable effect outside the call itself.
    Pure,
    /// Repeated calls with the same arguments have the same effect as one call.
    Idempotent,
    /// Has an effect on the outside world that is not safe to defer or repeat.
    SideEffecting,
}

impl SideEffect {
    /// Whether a tool with this classification must be deferred during
    /// coordination when planning mode is enabled.
    #[must_use]
    pub const fn is_deferred_in_planning_mode(self) -> bool {
        matches!(self, Self::SideEffecting)
    }
}

/// Outcome of a tool invocation, returned to the calling agent as a tool
/// result message (never terminates the agent's turn).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the tool call this result answers.
    pub call_id: String,
    /// Whether the call succeeded.
    pub ok: bool,
    /// Human/model-readable content: the tool's output, or an explanation.
    pub content: String,
    /// Structured error detail, present only when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolResultError>,
}

/// Structured error payload attached to a failed [`ToolResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultError {
    /// Coarse error category (e.g. `"policy_violation"`, `"deferred"`, `"execution_failed"`).
    pub kind: String,
    /// Human-readable detail.
    pub message: String,
}

impl ToolResult {
    /// Build a successful result.
    #[must_use]
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ok: true,
            content: content.into(),
            error: None,
        }
    }

    /// Build a failed result.
    #[must_use]
    pub fn error(
        call_id: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            call_id: call_id.into(),
            ok: false,
            content: message.clone(),
            error: Some(ToolResultError {
                kind: kind.into(),
                message,
            }),
        }
    }

    /// Build a result describing a side-effecting call deferred by planning-mode policy.
    #[must_use]
    pub fn deferred(call_id: impl Into<String>, tool_name: &str) -> Self {
        Self::error(
            call_id,
            "deferred",
            format!(
                "'{tool_name}' has side effects and is deferred until the final presentation phase"
            ),
        )
    }
}

/// A coordination-tool call parsed from the model's tool-call arguments.
///
/// This is the closed enumeration called for in §9: coordination tools are
/// never looked up by name through the registry, they are matched directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationCall {
    /// `new_answer(content)` — publish an answer.
    NewAnswer {
        /// Answer body.
        content: String,
    },
    /// `vote(target, reason)` — cast or replace a vote.
    Vote {
        /// Label of the answer being voted for.
        target: String,
        /// Stated reason for the vote.
        reason: String,
    },
}

impl CoordinationCall {
    /// Name of the `new_answer` coordination tool.
    pub const NEW_ANSWER: &'static str = "new_answer";
    /// Name of the `vote` coordination tool.
    pub const VOTE: &'static str = "vote";

    /// Returns `true` if `name` names a coordination tool.
    #[must_use]
    pub fn is_coordination_tool(name: &str) -> bool {
        matches!(name, Self::NEW_ANSWER | Self::VOTE)
    }

    /// Parse a coordination tool call from its name and raw JSON arguments.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidCoordinationCall`] if `name`
    /// does not name a coordination tool, or the arguments do not match its
    /// expected shape.
    pub fn parse(name: &str, arguments: &Value) -> crate::error::Result<Self> {
        match name {
            Self::NEW_ANSWER => {
                let content = arguments
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        crate::error::Error::invalid_coordination_call(
                            name,
                            "missing required string field 'content'",
                        )
                    })?;
                Ok(Self::NewAnswer {
                    content: content.to_owned(),
                })
            }
            Self::VOTE => {
                let target = arguments
                    .get("target")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        crate::error::Error::invalid_coordination_call(
                            name,
                            "missing required string field 'target'",
                        )
                    })?;
                let reason = arguments
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(Self::Vote {
                    target: target.to_owned(),
                    reason: reason.to_owned(),
                })
            }
            other => Err(crate::error::Error::invalid_coordination_call(
                other,
                "not a coordination tool",
            )),
        }
    }

    /// Tool definitions for the two built-in coordination tools, to be
    /// appended to every agent's available-tools list.
    #[must_use]
    pub fn tool_definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                Self::NEW_ANSWER,
                "Publish an answer to the task. Becomes your latest answer and supersedes any previous one you published.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string", "description": "The full answer content."}
                    },
                    "required": ["content"],
                    "additionalProperties": false,
                }),
            ),
            ToolDefinition::new(
                Self::VOTE,
                "Cast or replace your vote for another agent's latest answer.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "target": {"type": "string", "description": "Label of the answer to vote for, e.g. 'agent2.1'."},
                        "reason": {"type": "string", "description": "Why this answer should win."}
                    },
                    "required": ["target", "reason"],
                    "additionalProperties": false,
                }),
            ),
        ]
    }
}
