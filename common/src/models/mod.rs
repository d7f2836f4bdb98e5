//! Shared data models.

pub mod agent;
pub mod query;

// Re-export commonly used types
pub use agent::{AgentAnswer, AskRequest, ToolInvocation, TranslateRequest, TranslationResponse};
pub use query::{QueryOutcome, QueryRequest, Row, SqlStatement};
