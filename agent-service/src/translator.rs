//! Natural-language to SQL translation.
//!
//! A prompt is matched against a fixed, ordered table of intent rules. The
//! first rule whose detector fires decides the intent, and the intent builds a
//! parameterized statement against the configured table.

use std::sync::Arc;

use common::errors::{AppError, AppResult};
use common::models::{SqlStatement, TranslationResponse};

use crate::schema::SchemaCatalog;

/// A recognized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Delete the rows created today.
    DeleteCreatedToday,
    /// Look up one lead by identifier.
    ShowLeadDetails { lead_id: String },
    /// Return every row.
    SelectAll,
}

impl Intent {
    /// Stable intent name.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::DeleteCreatedToday => "delete_created_today",
            Intent::ShowLeadDetails { .. } => "show_lead_details",
            Intent::SelectAll => "select_all",
        }
    }

    /// Builds the statement for this intent against `table`.
    pub fn build(&self, table: &str) -> SqlStatement {
        match self {
            Intent::DeleteCreatedToday => {
                SqlStatement::new(format!("DELETE FROM {table} WHERE created_date = CURDATE()"))
            }
            Intent::ShowLeadDetails { lead_id } => {
                SqlStatement::new(format!("SELECT * FROM {table} WHERE id = ?")).bind(lead_id)
            }
            Intent::SelectAll => SqlStatement::new(format!("SELECT * FROM {table}")),
        }
    }
}

/// A prompt prepared for matching.
struct Prompt<'a> {
    text: &'a str,
    lower: String,
}

impl<'a> Prompt<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            lower: text.to_ascii_lowercase(),
        }
    }

    fn contains(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    /// Text after the first `marker`, up to the next occurrence if any, trimmed.
    ///
    /// The marker is matched case-sensitively against the original text.
    fn fragment_after(&self, marker: &str) -> Option<&'a str> {
        let mut parts = self.text.split(marker);
        parts.next();
        let fragment = parts.next()?.trim();
        (!fragment.is_empty()).then_some(fragment)
    }
}

struct IntentRule {
    name: &'static str,
    detect: fn(&Prompt<'_>) -> Option<Intent>,
}

/// Evaluated in order; the first match wins.
const RULES: &[IntentRule] = &[
    IntentRule {
        name: "delete_created_today",
        detect: detect_delete_today,
    },
    IntentRule {
        name: "show_lead_details",
        detect: detect_lead_details,
    },
    IntentRule {
        name: "select_all",
        detect: detect_select_all,
    },
];

fn detect_delete_today(prompt: &Prompt<'_>) -> Option<Intent> {
    (prompt.contains("delete") && prompt.contains("today")).then_some(Intent::DeleteCreatedToday)
}

/// An empty identifier fragment does not match.
fn detect_lead_details(prompt: &Prompt<'_>) -> Option<Intent> {
    if !prompt.contains("show details of") {
        return None;
    }
    prompt
        .fragment_after("lead_id")
        .map(|id| Intent::ShowLeadDetails {
            lead_id: id.to_string(),
        })
}

fn detect_select_all(prompt: &Prompt<'_>) -> Option<Intent> {
    prompt.contains("select").then_some(Intent::SelectAll)
}

/// Outcome of a successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub intent: Intent,
    pub statement: SqlStatement,
}

impl From<Translation> for TranslationResponse {
    fn from(t: Translation) -> Self {
        TranslationResponse {
            intent: t.intent.name().to_string(),
            sql: t.statement.sql,
            params: t.statement.params,
        }
    }
}

/// Maps prompts to statements.
pub struct QueryTranslator {
    schema: Arc<SchemaCatalog>,
    table: String,
}

impl QueryTranslator {
    pub fn new(schema: Arc<SchemaCatalog>, table: impl Into<String>) -> Self {
        Self {
            schema,
            table: table.into(),
        }
    }

    /// Finds the intent of a prompt without building SQL.
    pub fn detect(prompt: &str) -> Option<Intent> {
        let prompt = Prompt::new(prompt);
        RULES.iter().find_map(|rule| {
            let intent = (rule.detect)(&prompt)?;
            tracing::debug!(rule = rule.name, "Intent rule matched");
            Some(intent)
        })
    }

    /// Translates a prompt into a statement.
    ///
    /// # Errors
    /// `AppError::UnparseablePrompt` when no rule matches, and
    /// `AppError::UnknownTable` when the schema lists tables but not the target.
    pub fn translate(&self, prompt: &str) -> AppResult<Translation> {
        let intent = Self::detect(prompt).ok_or(AppError::UnparseablePrompt)?;
        if !self.schema.is_opaque() && !self.schema.has_table(&self.table) {
            return Err(AppError::UnknownTable(self.table.clone()));
        }
        let statement = intent.build(&self.table);
        Ok(Translation { intent, statement })
    }
}
