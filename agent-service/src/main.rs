//! 数据库智能体服务
//!
//! 提供自然语言查询 MySQL 的功能，包括：
//! - 自然语言到 SQL 的意图翻译
//! - 在 MySQL 上执行生成的语句
//! - 由本地大模型调用工具并讲解结果

mod agent;
mod executor;
mod handlers;
mod llm;
mod routes;
mod schema;
mod service;
mod state;
mod tool;
mod translator;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use clap::{Parser, Subcommand};
use common::config::{load_dotenv, AppConfig};
use common::middleware::request_id_middleware;
use common::models::TranslationResponse;
use state::AppState;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use agent::AgentEvent;
use schema::SchemaCatalog;
use translator::QueryTranslator;

pub const SERVICE_NAME: &str = "agent-service";

const DEFAULT_QUESTION: &str = "Show me the connector code of lead_id 202010150001 from leads_data";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "数据库智能体 API",
        version = "0.1.0",
        description = "自然语言查询 MySQL 的智能体服务"
    ),
    paths(
        handlers::ask,
        handlers::translate,
        handlers::execute_query,
        handlers::get_schema,
        handlers::health_check,
    ),
    components(schemas(
        common::models::AskRequest,
        common::models::AgentAnswer,
        common::models::ToolInvocation,
        common::models::TranslateRequest,
        common::models::TranslationResponse,
        common::models::QueryRequest,
        schema::SchemaCatalog,
        handlers::HealthResponse,
    )),
    tags(
        (name = "agent", description = "智能体问答端点"),
        (name = "query", description = "SQL 翻译与执行端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[derive(Parser)]
#[command(name = "agent-service", version, about = "Ask a MySQL database questions in plain language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask the agent one question and print its answer
    Ask {
        /// The question; defaults to a lead lookup
        question: Option<String>,
    },
    /// Print the SQL a prompt translates to without running it
    Translate {
        prompt: String,
    },
    /// Serve the HTTP API
    Serve {
        /// Overrides SERVER_PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // 初始化日志追踪，输出到 stderr，stdout 只留给回答
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME).context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Ask { question: None }) {
        Command::Ask { question } => {
            let question = question.unwrap_or_else(|| DEFAULT_QUESTION.to_string());
            ask(config, &question).await
        }
        Command::Translate { prompt } => translate(config, &prompt).await,
        Command::Serve { port } => serve(config, port).await,
    }
}

async fn ask(config: AppConfig, question: &str) -> anyhow::Result<()> {
    let show_tool_calls = config.agent.show_tool_calls;
    let state = AppState::new(config)
        .await
        .context("failed to initialize application state")?;
    info!(agent = state.agent.name(), model = state.agent.model_name(), "Running agent");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::Token(text) => {
                    let _ = write!(stdout, "{text}");
                    let _ = stdout.flush();
                }
                AgentEvent::ToolCall { name, arguments } if show_tool_calls => {
                    let _ = writeln!(stdout, " - Running: {name}({arguments})");
                }
                AgentEvent::ToolResult { name, result } => {
                    tracing::debug!(tool = %name, %result, "Tool result");
                }
                AgentEvent::ToolCall { .. } => {}
            }
        }
        let _ = writeln!(stdout);
    });

    let result = state.agent.run(question, Some(&tx)).await;
    drop(tx);
    let _ = printer.await;
    state.shutdown().await;

    result.context("agent run failed")?;
    Ok(())
}

async fn translate(config: AppConfig, prompt: &str) -> anyhow::Result<()> {
    let schema = SchemaCatalog::load(&config.schema_path)
        .await
        .context("failed to load schema")?;
    let translator = QueryTranslator::new(Arc::new(schema), config.agent.default_table);
    let translation: TranslationResponse = translator.translate(prompt)?.into();
    println!("{}", serde_json::to_string_pretty(&translation)?);
    Ok(())
}

async fn serve(mut config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    let addr = format!("{}:{}", config.host, config.port);

    // 创建应用状态
    let state = AppState::new(config)
        .await
        .context("failed to initialize application state (check DATABASE_URL)")?;

    let app = create_router(state.clone());

    info!(service = SERVICE_NAME, address = %addr, "启动服务");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.shutdown().await;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
