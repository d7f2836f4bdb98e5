//! Handler模块

use std::time::Instant;

use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::{
    AgentAnswer, AskRequest, QueryOutcome, QueryRequest, TranslateRequest, TranslationResponse,
};
use common::response::ApiResponse;

use crate::schema::SchemaCatalog;
use crate::service::AgentService;
use crate::state::AppState;
use crate::SERVICE_NAME;

/// 向数据库智能体提问
#[utoipa::path(
    post,
    path = "/api/agent/ask",
    tag = "agent",
    request_body = AskRequest,
    responses(
        (status = 200, description = "智能体回答", body = ApiResponse<AgentAnswer>),
        (status = 400, description = "参数校验失败"),
        (status = 502, description = "模型服务不可用")
    )
)]
pub async fn ask(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<AskRequest>,
) -> Result<Json<ApiResponse<AgentAnswer>>, AppError> {
    let start = Instant::now();
    let service = AgentService::new(&state);
    let answer = service.ask(req).await?;
    Ok(Json(
        ApiResponse::ok_with_service(answer, SERVICE_NAME)
            .with_request_id(request_id.as_str())
            .with_duration(start.elapsed().as_millis() as u64),
    ))
}

/// 将自然语言翻译为 SQL（不执行）
#[utoipa::path(
    post,
    path = "/api/translate",
    tag = "query",
    request_body = TranslateRequest,
    responses(
        (status = 200, description = "翻译结果", body = ApiResponse<TranslationResponse>),
        (status = 422, description = "无法识别的请求")
    )
)]
pub async fn translate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<TranslateRequest>,
) -> Result<Json<ApiResponse<TranslationResponse>>, AppError> {
    let service = AgentService::new(&state);
    let data = service.translate(req)?;
    Ok(Json(
        ApiResponse::ok_with_service(data, SERVICE_NAME).with_request_id(request_id.as_str()),
    ))
}

/// 执行 SQL 查询
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "行数据或执行确认"),
        (status = 400, description = "SQL 无效或包含禁止的操作"),
        (status = 500, description = "执行失败")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryOutcome>>, AppError> {
    let start = Instant::now();
    let service = AgentService::new(&state);
    let outcome = service.query(req).await?;
    Ok(Json(
        ApiResponse::ok_with_service(outcome, SERVICE_NAME)
            .with_request_id(request_id.as_str())
            .with_duration(start.elapsed().as_millis() as u64),
    ))
}

/// 查看已加载的数据库结构
#[utoipa::path(
    get,
    path = "/api/schema",
    tag = "query",
    responses(
        (status = 200, description = "数据库结构", body = ApiResponse<SchemaCatalog>)
    )
)]
pub async fn get_schema(State(state): State<AppState>) -> Json<ApiResponse<SchemaCatalog>> {
    Json(ApiResponse::ok_with_service(
        state.schema.as_ref().clone(),
        SERVICE_NAME,
    ))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务状态", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let service = AgentService::new(&state);
    let database = service.database_reachable().await;
    Json(HealthResponse {
        status: if database { "healthy" } else { "degraded" }.to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        model: state.agent.model_name().to_string(),
        database,
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 使用的模型
    pub model: String,
    /// 数据库是否可达
    pub database: bool,
}
