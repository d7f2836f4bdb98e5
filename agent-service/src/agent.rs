//! Tool-calling agent.
//!
//! The agent sends the conversation to the chat model, runs any tool calls
//! the model asks for, feeds the results back, and stops at the first reply
//! that asks for no tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use common::config::AgentConfig;
use common::errors::{AppError, AppResult};
use common::models::{AgentAnswer, ToolInvocation};

use crate::llm::{ChatMessage, ChatModel, ToolSpec};
use crate::schema::SchemaCatalog;
use crate::tool::Tool;

const INSTRUCTIONS: [&str; 3] = [
    "Analyze the user's question and map it to an appropriate SQL query.",
    "Use the database schema to construct accurate queries.",
    "Execute the query and Respond with results fetched from the database in a user-friendly format.",
];

/// Progress notifications emitted while an agent run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The model is about to have a tool run.
    ToolCall { name: String, arguments: Value },
    /// A tool finished.
    ToolResult { name: String, result: Value },
    /// A fragment of the model's reply text.
    Token(String),
}

/// A language-model agent with a fixed set of tools.
pub struct Agent {
    name: String,
    model: Arc<dyn ChatModel>,
    tools: HashMap<String, Arc<dyn Tool>>,
    specs: Vec<ToolSpec>,
    system_prompt: String,
    max_steps: usize,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        model: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
        schema: &SchemaCatalog,
    ) -> Self {
        let specs = tools.iter().map(|t| t.spec()).collect();
        let tools = tools
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        Self {
            name: config.name.clone(),
            model,
            tools,
            specs,
            system_prompt: system_prompt(&config.name, schema, config.markdown),
            max_steps: config.max_steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Answers one question.
    ///
    /// Events are sent to `events` when given; a closed receiver is ignored.
    pub async fn run(
        &self,
        question: &str,
        events: Option<&UnboundedSender<AgentEvent>>,
    ) -> AppResult<AgentAnswer> {
        let emit = |event: AgentEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(question),
        ];
        let mut invocations = Vec::new();

        for step in 1..=self.max_steps {
            let mut on_delta = |delta: &str| emit(AgentEvent::Token(delta.to_string()));
            let reply = self.model.chat(&messages, &self.specs, &mut on_delta).await?;
            tracing::debug!(step, tool_calls = reply.tool_calls.len(), "Model replied");

            if reply.tool_calls.is_empty() {
                return Ok(AgentAnswer {
                    model: self.model.model_name().to_string(),
                    answer: reply.content,
                    tool_calls: invocations,
                });
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                let name = call.function.name;
                let arguments = call.function.arguments;
                emit(AgentEvent::ToolCall {
                    name: name.clone(),
                    arguments: arguments.clone(),
                });

                let result = match self.tools.get(&name) {
                    Some(tool) => tool.call(&arguments).await,
                    None => {
                        tracing::warn!(tool = %name, "Model requested an unknown tool");
                        json!({ "error": format!("unknown tool: {name}") })
                    }
                };
                tracing::info!(tool = %name, step, "Tool call finished");

                emit(AgentEvent::ToolResult {
                    name: name.clone(),
                    result: result.clone(),
                });
                messages.push(ChatMessage::tool(name.clone(), result.to_string()));
                invocations.push(ToolInvocation {
                    name,
                    arguments,
                    result,
                });
            }
        }

        Err(AppError::Agent(format!(
            "no final answer after {} steps",
            self.max_steps
        )))
    }
}

fn system_prompt(name: &str, schema: &SchemaCatalog, markdown: bool) -> String {
    let mut prompt = format!("You are {name}, an assistant for a MySQL database.\n");
    for line in INSTRUCTIONS {
        prompt.push_str("- ");
        prompt.push_str(line);
        prompt.push('\n');
    }
    if !schema.is_opaque() {
        prompt.push_str("\nDatabase schema:\n");
        prompt.push_str(&schema.summary());
        prompt.push('\n');
    }
    if markdown {
        prompt.push_str("\nFormat your answer in markdown.\n");
    }
    prompt
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::{FunctionCall, OnDelta, Role, ToolCall};
    use crate::tool::tests::{tool_with, FakeExecutor};

    /// Replays canned replies and records what it was sent.
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<ChatMessage>>,
        pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<ChatMessage>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
            on_delta: &mut OnDelta<'_>,
        ) -> AppResult<ChatMessage> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::Llm("script exhausted".into()))?;
            if !reply.content.is_empty() {
                on_delta(&reply.content);
            }
            Ok(reply)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    pub(crate) fn tool_call(name: &str, arguments: Value) -> ChatMessage {
        ChatMessage {
            tool_calls: vec![ToolCall {
                function: FunctionCall {
                    name: name.to_string(),
                    arguments,
                },
            }],
            ..ChatMessage::assistant("")
        }
    }

    fn agent(model: Arc<ScriptedModel>, schema: &SchemaCatalog) -> Agent {
        let tool: Arc<dyn Tool> = Arc::new(tool_with(Arc::new(FakeExecutor::default())));
        Agent::new(&AgentConfig::default(), model, vec![tool], schema)
    }

    #[tokio::test]
    async fn test_runs_tool_then_answers() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call("MySQLTool", json!({"prompt": "show details of lead_id 202010150001"})),
            ChatMessage::assistant("Lead 202010150001 uses connector **CX-7**."),
        ]));
        let agent = agent(model.clone(), &SchemaCatalog::default());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let answer = agent.run("What is the connector code?", Some(&tx)).await.unwrap();

        assert_eq!(answer.answer, "Lead 202010150001 uses connector **CX-7**.");
        assert_eq!(answer.model, "scripted");
        assert_eq!(answer.tool_calls.len(), 1);
        assert_eq!(answer.tool_calls[0].result[0]["connector_code"], "CX-7");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let tool_message = seen[1].last().unwrap();
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.tool_name.as_deref(), Some("MySQLTool"));
        assert!(tool_message.content.contains("CX-7"));

        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(&events[0], AgentEvent::ToolCall { name, .. } if name == "MySQLTool"));
        assert!(matches!(&events[1], AgentEvent::ToolResult { .. }));
        assert_eq!(
            events[2],
            AgentEvent::Token("Lead 202010150001 uses connector **CX-7**.".into())
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call("web_search", json!({"q": "leads"})),
            ChatMessage::assistant("I can only query the database."),
        ]));
        let agent = agent(model, &SchemaCatalog::default());
        let answer = agent.run("search the web", None).await.unwrap();
        assert_eq!(
            answer.tool_calls[0].result,
            json!({"error": "unknown tool: web_search"})
        );
        assert_eq!(answer.answer, "I can only query the database.");
    }

    #[tokio::test]
    async fn test_step_limit() {
        let replies = (0..10)
            .map(|_| tool_call("MySQLTool", json!({"prompt": "select all"})))
            .collect();
        let model = Arc::new(ScriptedModel::new(replies));
        let agent = agent(model, &SchemaCatalog::default());
        let err = agent.run("loop forever", None).await.unwrap_err();
        assert!(matches!(err, AppError::Agent(_)));
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let agent = agent(model, &SchemaCatalog::default());
        assert!(matches!(agent.run("hi", None).await, Err(AppError::Llm(_))));
    }

    #[test]
    fn test_system_prompt_includes_schema_and_instructions() {
        let schema = SchemaCatalog::from_value(json!({"leads_data": ["id", "connector_code"]}));
        let prompt = system_prompt("Database Agent", &schema, true);
        assert!(prompt.starts_with("You are Database Agent"));
        assert!(prompt.contains("Use the database schema to construct accurate queries."));
        assert!(prompt.contains("leads_data(id, connector_code)"));
        assert!(prompt.contains("markdown"));

        let prompt = system_prompt("Database Agent", &SchemaCatalog::default(), false);
        assert!(!prompt.contains("Database schema:"));
        assert!(!prompt.contains("markdown"));
    }
}
