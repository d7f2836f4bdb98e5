//! 路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/agent/ask", post(handlers::ask))
        .route("/api/translate", post(handlers::translate))
        .route("/api/query", post(handlers::execute_query))
        .route("/api/schema", get(handlers::get_schema))
        .route("/api/health", get(handlers::health_check))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request, http::StatusCode, middleware};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use common::config::AppConfig;
    use common::middleware::request_id_middleware;

    use super::*;
    use crate::agent::tests::{tool_call, ScriptedModel};
    use crate::llm::ChatMessage;
    use crate::schema::SchemaCatalog;
    use crate::tool::tests::FakeExecutor;

    fn app(replies: Vec<ChatMessage>) -> Router {
        let schema = SchemaCatalog::from_value(json!({"leads_data": ["id", "connector_code"]}));
        let state = AppState::from_parts(
            AppConfig::default(),
            schema,
            Arc::new(FakeExecutor::default()),
            Arc::new(ScriptedModel::new(replies)),
        );
        router()
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(state)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_translate_lead_lookup() {
        let (status, body) = send(
            app(vec![]),
            "POST",
            "/api/translate",
            Some(json!({"prompt": "show details of lead_id 202010150001"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["intent"], "show_lead_details");
        assert_eq!(body["data"]["sql"], "SELECT * FROM leads_data WHERE id = ?");
        assert_eq!(body["data"]["params"], json!(["202010150001"]));
        assert!(body["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_translate_unparseable() {
        let (status, body) = send(
            app(vec![]),
            "POST",
            "/api/translate",
            Some(json!({"prompt": "what's the weather"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNPARSEABLE_PROMPT");
        assert_eq!(body["error"]["message"], "Unable to parse the query.");
    }

    #[tokio::test]
    async fn test_translate_rejects_empty_prompt() {
        let (status, body) =
            send(app(vec![]), "POST", "/api/translate", Some(json!({"prompt": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let (status, body) = send(
            app(vec![]),
            "POST",
            "/api/query",
            Some(json!({"sql": "SELECT * FROM leads_data"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["connector_code"], "CX-7");
        assert!(body["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_echoed_in_meta() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/translate")
            .header("content-type", "application/json")
            .header("x-request-id", "trace-7")
            .body(Body::from(json!({"prompt": "select all leads"}).to_string()))
            .unwrap();
        let response = app(vec![]).oneshot(request).await.unwrap();
        assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-7");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["meta"]["request_id"], "trace-7");
    }

    #[tokio::test]
    async fn test_query_refuses_drop() {
        let (status, body) = send(
            app(vec![]),
            "POST",
            "/api/query",
            Some(json!({"sql": "DROP TABLE leads_data"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UNSAFE_SQL");
    }

    #[tokio::test]
    async fn test_query_failure_is_error_envelope() {
        let (status, body) = send(
            app(vec![]),
            "POST",
            "/api/query",
            Some(json!({"sql": "SELECT * FORM leads_data"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "DATABASE_QUERY_ERROR");
    }

    #[tokio::test]
    async fn test_ask_runs_agent() {
        let replies = vec![
            tool_call("MySQLTool", json!({"prompt": "show details of lead_id 202010150001"})),
            ChatMessage::assistant("The connector code is CX-7."),
        ];
        let (status, body) = send(
            app(replies),
            "POST",
            "/api/agent/ask",
            Some(json!({"question": "Show me the connector code of lead_id 202010150001"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["answer"], "The connector code is CX-7.");
        assert_eq!(body["data"]["tool_calls"][0]["name"], "MySQLTool");
        assert!(body["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_ask_reports_model_failure() {
        let (status, body) = send(
            app(vec![]),
            "POST",
            "/api/agent/ask",
            Some(json!({"question": "anything"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "LLM_ERROR");
    }

    #[tokio::test]
    async fn test_schema_and_health() {
        let (status, body) = send(app(vec![]), "GET", "/api/schema", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tables"]["leads_data"], json!(["id", "connector_code"]));

        let (status, body) = send(app(vec![]), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "scripted");
        assert_eq!(body["database"], true);
    }
}
