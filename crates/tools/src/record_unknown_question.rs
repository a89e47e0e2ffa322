//! Unknown-question tool — logs anything the persona couldn't answer.

use async_trait::async_trait;
use emissary_core::error::ToolError;
use emissary_core::tool::{Tool, ToolResult};
use emissary_notify::Notifier;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub struct RecordUnknownQuestionTool {
    notifier: Arc<dyn Notifier>,
}

impl RecordUnknownQuestionTool {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnknownQuestionArgs {
    question: String,
}

#[async_trait]
impl Tool for RecordUnknownQuestionTool {
    fn name(&self) -> &str {
        "record_unknown_question"
    }

    fn description(&self) -> &str {
        "Always use this tool to record any question that couldn't be answered as you didn't know the answer"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question that couldn't be answered"
                }
            },
            "required": ["question"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let args: UnknownQuestionArgs = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        info!("Recording unanswered question");
        self.notifier
            .push(&format!("Recording {}", args.question))
            .await;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: serde_json::json!({"recorded": "ok"}).to_string(),
        })
    }
}
