//! The fixed tool set the model may invoke mid-conversation.
//!
//! Two tools, both side-effecting through the notification sink and both
//! always succeeding from the model's perspective:
//! - `record_user_details` — a visitor wants to be contacted
//! - `record_unknown_question` — the persona couldn't answer something
//!
//! Arguments are decoded into typed structs with `deny_unknown_fields`;
//! a payload that doesn't match the published schema is a defined
//! `ToolError::InvalidArguments`, not a silent default.

pub mod record_unknown_question;
pub mod record_user_details;

use emissary_core::tool::ToolRegistry;
use emissary_notify::Notifier;
use std::sync::Arc;

pub use record_unknown_question::RecordUnknownQuestionTool;
pub use record_user_details::RecordUserDetailsTool;

/// Create the registry with both tools wired to the given sink.
pub fn registry(notifier: Arc<dyn Notifier>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(RecordUserDetailsTool::new(notifier.clone())));
    registry.register(Box::new(RecordUnknownQuestionTool::new(notifier)));
    registry
}
