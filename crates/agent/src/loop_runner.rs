//! The conversation loop implementation.

use emissary_core::error::{Error, ToolError};
use emissary_core::event::{DomainEvent, EventBus};
use emissary_core::message::Message;
use emissary_core::provider::{FinishReason, Provider, ProviderRequest};
use emissary_core::tool::{ToolCall, ToolRegistry, ToolResult};
use emissary_persona::Persona;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The loop that orchestrates model calls and tool execution.
///
/// Holds no mutable state across turns; the only shared data is the
/// immutable persona built once at startup. Each `chat` call runs
/// synchronously end-to-end on its own copy of the conversation — the
/// caller's history is never touched, so a failed turn leaves it exactly
/// as it was.
pub struct AgentLoop {
    /// The remote model backend
    provider: Arc<dyn Provider>,

    /// The model (deployment) to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry, published with every request
    tools: Arc<ToolRegistry>,

    /// The persona being represented
    persona: Persona,

    /// Maximum tool-call rounds per turn
    max_tool_rounds: u32,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new conversation loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        persona: Persona,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            persona,
            max_tool_rounds: 10,
            event_bus,
        }
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of tool-call rounds per turn.
    pub fn with_max_tool_rounds(mut self, max: u32) -> Self {
        self.max_tool_rounds = max;
        self
    }

    /// The persona this loop represents.
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Run one turn: send the conversation, execute any requested tools,
    /// repeat until the model returns a plain answer.
    ///
    /// Transport failures and undecodable tool arguments propagate and
    /// abort the turn. A hallucinated tool name does not: it yields a
    /// neutral result and the turn continues.
    pub async fn chat(&self, user_message: &str, history: &[Message]) -> Result<String, Error> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.persona.system_prompt()));
        messages.extend_from_slice(history);
        messages.push(Message::user(user_message));

        info!(
            persona = %self.persona.name,
            history_len = history.len(),
            "Processing turn"
        );

        let tool_definitions = self.tools.definitions();
        let mut rounds: u32 = 0;
        let mut tokens_used: u32 = 0;

        loop {
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = self.provider.complete(request).await?;

            if let Some(usage) = &response.usage {
                tokens_used += usage.total_tokens;
            }

            // An empty request list under a tool_calls stop reason has
            // nothing to execute; looping on it could never terminate.
            let wants_tools = response.finish_reason == FinishReason::ToolCalls
                && !response.message.tool_calls.is_empty();

            if !wants_tools {
                let answer = response.message.content;
                self.event_bus.publish(DomainEvent::TurnCompleted {
                    model: response.model,
                    tool_rounds: rounds,
                    tokens_used,
                    timestamp: chrono::Utc::now(),
                });
                return Ok(answer);
            }

            rounds += 1;
            if rounds > self.max_tool_rounds {
                warn!(
                    limit = self.max_tool_rounds,
                    "Model kept requesting tools, aborting turn"
                );
                return Err(Error::ToolLoopExceeded {
                    limit: self.max_tool_rounds,
                });
            }

            debug!(
                round = rounds,
                tool_count = response.message.tool_calls.len(),
                "Executing tool calls"
            );

            // Append the assistant's tool-call message first, then exactly
            // one tool result per request id, in request order.
            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            for tc in &tool_calls {
                let arguments: serde_json::Value =
                    serde_json::from_str(&tc.arguments).map_err(|e| {
                        ToolError::InvalidArguments(format!("{}: {e}", tc.name))
                    })?;

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments,
                };

                let start = std::time::Instant::now();
                let result = match self.tools.execute(&call).await {
                    Ok(result) => result,
                    Err(ToolError::NotFound(name)) => {
                        warn!(tool = %name, "Model requested an unregistered tool");
                        ToolResult::neutral(&tc.id)
                    }
                    Err(e) => return Err(e.into()),
                };

                self.event_bus.publish(DomainEvent::ToolExecuted {
                    tool_name: tc.name.clone(),
                    success: result.success,
                    duration_ms: start.elapsed().as_millis() as u64,
                    timestamp: chrono::Utc::now(),
                });

                messages.push(Message::tool_result(&tc.id, &result.output));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use emissary_core::error::ProviderError;
    use emissary_core::message::{MessageToolCall, Role};
    use emissary_core::provider::{ProviderResponse, Usage};
    use emissary_notify::Notifier;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A provider that replays a script of responses and records every
    /// request it receives.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ProviderResponse>) -> Self {
            Self {
                responses: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted"))
        }
    }

    /// A provider that always fails at the transport level.
    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection reset".into()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn push(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    fn text_response(content: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant(content),
            finish_reason: FinishReason::Stop,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        }
    }

    fn tool_response(calls: &[(&str, &str, &str)]) -> ProviderResponse {
        let mut message = Message::assistant("");
        message.tool_calls = calls
            .iter()
            .map(|(id, name, arguments)| MessageToolCall {
                id: (*id).into(),
                name: (*name).into(),
                arguments: (*arguments).into(),
            })
            .collect();
        ProviderResponse {
            message,
            finish_reason: FinishReason::ToolCalls,
            usage: Some(Usage {
                prompt_tokens: 20,
                completion_tokens: 8,
                total_tokens: 28,
            }),
            model: "mock-model".into(),
        }
    }

    fn test_persona() -> Persona {
        Persona::new("Test Persona", "worked on things", "did more things")
    }

    fn agent_with(
        script: Vec<ProviderResponse>,
    ) -> (AgentLoop, Arc<ScriptedProvider>, Arc<RecordingNotifier>) {
        let provider = Arc::new(ScriptedProvider::new(script));
        let recorder = Arc::new(RecordingNotifier::default());
        let tools = Arc::new(emissary_tools::registry(recorder.clone()));
        let agent = AgentLoop::new(
            provider.clone(),
            "mock-model",
            0.7,
            tools,
            test_persona(),
            Arc::new(EventBus::default()),
        );
        (agent, provider, recorder)
    }

    #[tokio::test]
    async fn stop_response_returned_verbatim_without_dispatch() {
        let (agent, provider, recorder) = agent_with(vec![text_response("Hello! How can I help?")]);

        let reply = agent.chat("Hi there", &[]).await.unwrap();

        assert_eq!(reply, "Hello! How can I help?");
        assert!(recorder.messages.lock().unwrap().is_empty());
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        // System prompt first, user message last, both tools published.
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[0].content.contains("Test Persona"));
        assert_eq!(requests[0].messages.last().unwrap().content, "Hi there");
        assert_eq!(requests[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn end_to_end_contact_interest_scenario() {
        let (agent, provider, recorder) = agent_with(vec![
            tool_response(&[(
                "call_1",
                "record_user_details",
                r#"{"email": "a@b.com"}"#,
            )]),
            text_response("Thanks, I'll be in touch!"),
        ]);

        let reply = agent
            .chat("My email is a@b.com, please reach out", &[])
            .await
            .unwrap();

        assert_eq!(reply, "Thanks, I'll be in touch!");

        let messages = recorder.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("a@b.com"));

        // The second request must carry the assistant tool-call message
        // followed by its matching tool result.
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let sent = &requests[1].messages;
        let assistant = &sent[sent.len() - 2];
        let tool_msg = &sent[sent.len() - 1];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls[0].id, "call_1");
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.content, r#"{"recorded":"ok"}"#);
    }

    #[tokio::test]
    async fn n_tool_calls_yield_n_results_in_order() {
        let (agent, provider, recorder) = agent_with(vec![
            tool_response(&[
                (
                    "call_a",
                    "record_unknown_question",
                    r#"{"question": "first?"}"#,
                ),
                (
                    "call_b",
                    "record_unknown_question",
                    r#"{"question": "second?"}"#,
                ),
            ]),
            text_response("I noted both."),
        ]);

        let reply = agent.chat("two questions", &[]).await.unwrap();
        assert_eq!(reply, "I noted both.");

        let requests = provider.requests();
        let sent = &requests[1].messages;
        let tool_msgs: Vec<_> = sent.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_msgs.len(), 2);
        assert_eq!(tool_msgs[0].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(tool_msgs[1].tool_call_id.as_deref(), Some("call_b"));

        let notified = recorder.messages.lock().unwrap();
        assert_eq!(notified.len(), 2);
        assert!(notified[0].contains("first?"));
        assert!(notified[1].contains("second?"));
    }

    #[tokio::test]
    async fn unknown_tool_gets_neutral_result() {
        let (agent, provider, recorder) = agent_with(vec![
            tool_response(&[("call_x", "make_coffee", "{}")]),
            text_response("Done."),
        ]);

        let reply = agent.chat("coffee please", &[]).await.unwrap();
        assert_eq!(reply, "Done.");
        assert!(recorder.messages.lock().unwrap().is_empty());

        let requests = provider.requests();
        let tool_msg = requests[1].messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_x"));
        assert_eq!(tool_msg.content, "{}");
    }

    #[tokio::test]
    async fn undecodable_arguments_abort_the_turn() {
        let (agent, provider, recorder) = agent_with(vec![tool_response(&[(
            "call_1",
            "record_user_details",
            "{not json",
        )])]);

        let err = agent.chat("hello", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Tool(ToolError::InvalidArguments(_))
        ));
        assert!(recorder.messages.lock().unwrap().is_empty());
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn schema_mismatch_aborts_the_turn() {
        // Valid JSON, but missing the required email field.
        let (agent, _, recorder) = agent_with(vec![tool_response(&[(
            "call_1",
            "record_user_details",
            r#"{"name": "No Email"}"#,
        )])]);

        let err = agent.chat("hello", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::InvalidArguments(_))));
        assert!(recorder.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let recorder = Arc::new(RecordingNotifier::default());
        let tools = Arc::new(emissary_tools::registry(recorder.clone()));
        let agent = AgentLoop::new(
            Arc::new(FailingProvider),
            "mock-model",
            0.7,
            tools,
            test_persona(),
            Arc::new(EventBus::default()),
        );

        let err = agent.chat("hello", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn perpetual_tool_requests_hit_the_round_cap() {
        let call = (
            "call_1",
            "record_unknown_question",
            r#"{"question": "again?"}"#,
        );
        let (agent, _, recorder) = agent_with(vec![
            tool_response(&[call]),
            tool_response(&[call]),
            tool_response(&[call]),
        ]);
        let agent = agent.with_max_tool_rounds(2);

        let err = agent.chat("loop forever", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ToolLoopExceeded { limit: 2 }));
        // The two allowed rounds did execute before the cap fired.
        assert_eq!(recorder.messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_tool_call_list_is_a_final_answer() {
        let mut response = text_response("odd but final");
        response.finish_reason = FinishReason::ToolCalls;
        let (agent, provider, _) = agent_with(vec![response]);

        let reply = agent.chat("hello", &[]).await.unwrap();
        assert_eq!(reply, "odd but final");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn history_is_prepended_in_order() {
        let (agent, provider, _) = agent_with(vec![text_response("ack")]);

        let history = vec![
            Message::user("earlier question"),
            Message::assistant("earlier answer"),
        ];
        agent.chat("new question", &history).await.unwrap();

        let sent = &provider.requests()[0].messages;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[1].content, "earlier question");
        assert_eq!(sent[2].content, "earlier answer");
        assert_eq!(sent[3].content, "new question");
        // The caller's history is untouched.
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn events_published_for_tools_and_turn() {
        let event_bus = Arc::new(EventBus::default());
        let mut rx = event_bus.subscribe();

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(&[(
                "call_1",
                "record_unknown_question",
                r#"{"question": "?"}"#,
            )]),
            text_response("done"),
        ]));
        let recorder = Arc::new(RecordingNotifier::default());
        let tools = Arc::new(emissary_tools::registry(recorder));
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            0.7,
            tools,
            test_persona(),
            event_bus,
        );

        agent.chat("hello", &[]).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.as_ref(),
            DomainEvent::ToolExecuted { tool_name, success: true, .. }
                if tool_name == "record_unknown_question"
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second.as_ref(),
            DomainEvent::TurnCompleted { tool_rounds: 1, tokens_used: 43, .. }
        ));
    }
}
