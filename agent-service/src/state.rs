//! Application state for the agent service.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::AppResult;

use crate::agent::Agent;
use crate::executor::{MySqlExecutor, SqlExecutor};
use crate::llm::{ChatModel, OllamaClient};
use crate::schema::SchemaCatalog;
use crate::tool::{MySqlTool, Tool};
use crate::translator::QueryTranslator;

/// Process-wide objects, built once at startup and shared by reference.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub schema: Arc<SchemaCatalog>,
    pub translator: Arc<QueryTranslator>,
    pub executor: Arc<dyn SqlExecutor>,
    pub agent: Arc<Agent>,
}

impl AppState {
    /// Loads the schema, connects to MySQL and sets up the model client.
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let schema = SchemaCatalog::load(&config.schema_path).await?;
        let executor = MySqlExecutor::connect(&config.database).await?;
        let model = OllamaClient::new(&config.llm)?;
        tracing::info!(model = %config.llm.model, base_url = %config.llm.base_url, "Model client ready");
        Ok(Self::from_parts(
            config,
            schema,
            Arc::new(executor),
            Arc::new(model),
        ))
    }

    /// Wires already constructed collaborators together.
    pub fn from_parts(
        config: AppConfig,
        schema: SchemaCatalog,
        executor: Arc<dyn SqlExecutor>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let schema = Arc::new(schema);
        let translator = Arc::new(QueryTranslator::new(
            schema.clone(),
            config.agent.default_table.clone(),
        ));
        let tool: Arc<dyn Tool> = Arc::new(MySqlTool::new(translator.clone(), executor.clone()));
        let agent = Arc::new(Agent::new(&config.agent, model, vec![tool], &schema));
        Self {
            config,
            schema,
            translator,
            executor,
            agent,
        }
    }

    /// Releases the database connection.
    pub async fn shutdown(&self) {
        self.executor.close().await;
    }
}
