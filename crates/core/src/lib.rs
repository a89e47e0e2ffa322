//! # emissary core
//!
//! Domain types, traits, and error definitions for the emissary persona
//! chatbot. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The remote model backend and the notification sink are defined as traits
//! here; implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{FinishReason, Provider, ProviderRequest, ProviderResponse, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
