//! 智能体服务模块

use std::sync::Arc;

use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::{
    AgentAnswer, AskRequest, QueryOutcome, QueryRequest, SqlStatement, TranslateRequest,
    TranslationResponse,
};
use common::utils::SqlValidator;

use crate::agent::Agent;
use crate::executor::SqlExecutor;
use crate::state::AppState;
use crate::translator::QueryTranslator;

/// 问答、翻译与 SQL 执行服务
pub struct AgentService {
    agent: Arc<Agent>,
    translator: Arc<QueryTranslator>,
    executor: Arc<dyn SqlExecutor>,
}

impl AgentService {
    /// 从应用状态创建服务实例
    pub fn new(state: &AppState) -> Self {
        Self {
            agent: state.agent.clone(),
            translator: state.translator.clone(),
            executor: state.executor.clone(),
        }
    }

    /// 让智能体回答问题
    pub async fn ask(&self, req: AskRequest) -> AppResult<AgentAnswer> {
        req.validate()?;
        let answer = self.agent.run(&req.question, None).await?;
        tracing::info!(tool_calls = answer.tool_calls.len(), "智能体已回答");
        Ok(answer)
    }

    /// 仅翻译，不执行
    pub fn translate(&self, req: TranslateRequest) -> AppResult<TranslationResponse> {
        req.validate()?;
        Ok(self.translator.translate(&req.prompt)?.into())
    }

    /// 执行临时 SQL
    pub async fn query(&self, req: QueryRequest) -> AppResult<QueryOutcome> {
        req.validate()?;
        SqlValidator::validate(&req.sql)?;

        match self.executor.run(&SqlStatement::new(req.sql)).await {
            QueryOutcome::Error { error } => Err(AppError::DatabaseQuery(error)),
            outcome => Ok(outcome),
        }
    }

    /// 检查数据库是否可达
    pub async fn database_reachable(&self) -> bool {
        match self.executor.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "数据库不可达");
                false
            }
        }
    }
}
