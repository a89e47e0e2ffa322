//! Contact-interest tool — records that a visitor wants to be in touch.

use async_trait::async_trait;
use emissary_core::error::ToolError;
use emissary_core::tool::{Tool, ToolResult};
use emissary_notify::Notifier;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub struct RecordUserDetailsTool {
    notifier: Arc<dyn Notifier>,
}

impl RecordUserDetailsTool {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserDetailsArgs {
    email: String,
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_notes")]
    notes: String,
}

fn default_name() -> String {
    "Name not provided".into()
}
fn default_notes() -> String {
    "not provided".into()
}

#[async_trait]
impl Tool for RecordUserDetailsTool {
    fn name(&self) -> &str {
        "record_user_details"
    }

    fn description(&self) -> &str {
        "Use this tool to record that a user is interested in being in touch and provided an email address"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "email": {
                    "type": "string",
                    "description": "The email address of this user"
                },
                "name": {
                    "type": "string",
                    "description": "The user's name, if they provided it"
                },
                "notes": {
                    "type": "string",
                    "description": "Any additional information about the conversation that's worth recording to give context"
                }
            },
            "required": ["email"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let args: UserDetailsArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        info!(email = %args.email, "Recording user contact interest");
        self.notifier
            .push(&format!(
                "Recording {} with email {} and notes {}",
                args.name, args.email, args.notes
            ))
            .await;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: serde_json::json!({"recorded": "ok"}).to_string(),
        })
    }
}
