//! Tools exposed to the agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use common::models::QueryOutcome;

use crate::executor::SqlExecutor;
use crate::llm::ToolSpec;
use crate::translator::QueryTranslator;

/// A callable the agent may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Runs the tool. Failures are reported inside the returned value.
    async fn call(&self, arguments: &Value) -> Value;

    fn spec(&self) -> ToolSpec {
        ToolSpec::function(self.name(), self.description(), self.parameters())
    }
}

#[derive(Debug, Deserialize)]
struct MySqlToolArgs {
    prompt: String,
}

/// Translates a prompt into SQL and runs it.
pub struct MySqlTool {
    translator: Arc<QueryTranslator>,
    executor: Arc<dyn SqlExecutor>,
}

impl MySqlTool {
    pub const NAME: &'static str = "MySQLTool";

    pub fn new(translator: Arc<QueryTranslator>, executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            translator,
            executor,
        }
    }

    /// Translates and executes; an unparseable prompt is never executed.
    pub async fn run(&self, prompt: &str) -> QueryOutcome {
        let translation = match self.translator.translate(prompt) {
            Ok(translation) => translation,
            Err(e) => {
                tracing::info!(prompt, error = %e, "Prompt not translated");
                return QueryOutcome::error(e);
            }
        };
        tracing::info!(
            intent = translation.intent.name(),
            sql = %translation.statement,
            "Generated SQL query"
        );
        self.executor.run(&translation.statement).await
    }
}

#[async_trait]
impl Tool for MySqlTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Interprets a natural-language request about the leads database, \
         generates the matching SQL query and executes it. Returns the rows for \
         SELECT queries, a confirmation for modifications, or an error."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The user's request, e.g. \"show details of lead_id 202010150001\"."
                }
            },
            "required": ["prompt"]
        })
    }

    async fn call(&self, arguments: &Value) -> Value {
        let outcome = match MySqlToolArgs::deserialize(arguments) {
            Ok(args) => self.run(&args.prompt).await,
            // Some models pass the prompt as a bare string.
            Err(_) => match arguments.as_str() {
                Some(prompt) => self.run(prompt).await,
                None => QueryOutcome::error(format!(
                    "invalid arguments for {}: expected {{\"prompt\": string}}",
                    Self::NAME
                )),
            },
        };
        serde_json::to_value(outcome)
            .unwrap_or_else(|e| json!({ "error": format!("failed to encode result: {e}") }))
    }
}
