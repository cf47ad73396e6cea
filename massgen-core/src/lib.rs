#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(tail_expr_drop_order)]
//! `massgen-core` drives concurrent multi-agent LLM coordination: N agents
//! propose answers, vote on each other's work, and converge on a winner that
//! produces the session's final presentation.
//!
//! # Layout
//!
//! - [`backend`]: uniform streaming chat across LLM providers (C1)
//! - [`tool`]: coordination-tool parsing and external-tool routing (C2)
//! - [`workspace`]: per-agent working directories and publish-time snapshots (C3)
//! - [`runner`] and [`hooks`]: the per-agent driving loop and its lifecycle events (C4)
//! - [`state`]: the single-writer coordination state and its immutable views (C5)
//! - [`orchestrator`]: the session driver tying C1-C5 together (C6)
//! - [`events`]: the typed event bus the presentation layer subscribes to (C7)
//! - [`config`]: the TOML session configuration surface

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod message;
pub mod orchestrator;
pub mod runner;
pub mod state;
pub mod stream;
pub mod tool;
pub mod usage;
pub mod workspace;

pub use config::{AgentDescriptor, BackendConfig, ProviderKind, SessionConfig};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SessionResult};
pub use runner::{AgentHandle, CoordinationOutcome, Runner};
pub use state::{AgentStatus, CoordinationState, ImmutableView};
