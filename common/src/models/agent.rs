//! Agent and translation models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Request body for asking the agent a question.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct AskRequest {
    /// Natural-language question.
    #[validate(length(min = 1, max = 4000, message = "Question must be 1-4000 characters"))]
    pub question: String,
}

/// Request body for translating a prompt without executing it.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct TranslateRequest {
    /// Natural-language prompt.
    #[validate(length(min = 1, max = 4000, message = "Prompt must be 1-4000 characters"))]
    pub prompt: String,
}

/// Result of translating a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TranslationResponse {
    /// Name of the intent that matched.
    pub intent: String,
    /// Statement text with placeholders.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<String>,
}

/// One tool call made by the agent while answering.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolInvocation {
    /// Tool name as called by the model.
    pub name: String,
    /// Arguments the model supplied.
    pub arguments: serde_json::Value,
    /// JSON result handed back to the model.
    pub result: serde_json::Value,
}

/// Final answer of an agent run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentAnswer {
    /// Model that produced the answer.
    pub model: String,
    /// Final narrated answer.
    pub answer: String,
    /// Tool calls made along the way, in order.
    pub tool_calls: Vec<ToolInvocation>,
}
