//! Database schema catalog.
//!
//! The schema file is free-form JSON. It is kept verbatim and, where its shape
//! allows, indexed into table → column lists.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use common::errors::{AppError, AppResult};

/// Loaded schema: the raw document plus a best-effort table index.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SchemaCatalog {
    /// The schema document as loaded.
    pub raw: Value,
    /// Table name → column names, empty when the shape is not recognized.
    pub tables: BTreeMap<String, Vec<String>>,
}

impl SchemaCatalog {
    /// Reads and parses the schema file.
    pub async fn load(path: &Path) -> AppResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::SchemaLoad(format!("{}: {}", path.display(), e)))?;
        let raw: Value = serde_json::from_str(&content)
            .map_err(|e| AppError::SchemaLoad(format!("{}: {}", path.display(), e)))?;
        let catalog = Self::from_value(raw);
        tracing::info!(
            path = %path.display(),
            tables = catalog.tables.len(),
            "Schema loaded"
        );
        Ok(catalog)
    }

    /// Builds a catalog from an already parsed document.
    pub fn from_value(raw: Value) -> Self {
        let mut tables = BTreeMap::new();
        collect_tables(&raw, &mut tables);
        Self { raw, tables }
    }

    /// Whether the index is empty (nothing to validate against).
    pub fn is_opaque(&self) -> bool {
        self.tables.is_empty()
    }

    /// Whether the named table is known, case-insensitively.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.keys().any(|t| t.eq_ignore_ascii_case(name))
    }

    /// One line per table, `name(col, col, ...)`, for model instructions.
    pub fn summary(&self) -> String {
        self.tables
            .iter()
            .map(|(table, columns)| format!("{}({})", table, columns.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn collect_tables(value: &Value, tables: &mut BTreeMap<String, Vec<String>>) {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get("tables") {
                collect_tables(inner, tables);
                return;
            }
            for (name, body) in map {
                if let Some(columns) = table_columns(body) {
                    tables.insert(name.clone(), columns);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let Some(obj) = item.as_object() else { continue };
                let name = obj
                    .get("name")
                    .or_else(|| obj.get("table_name"))
                    .and_then(Value::as_str);
                let columns = obj.get("columns").and_then(column_names);
                if let (Some(name), Some(columns)) = (name, columns) {
                    tables.insert(name.to_string(), columns);
                }
            }
        }
        _ => {}
    }
}

/// Columns of a table body: a column list, `{"columns": ...}`, or a column → type map.
fn table_columns(body: &Value) -> Option<Vec<String>> {
    match body {
        Value::Array(_) => column_names(body),
        Value::Object(map) => match map.get("columns") {
            Some(columns) => column_names(columns),
            None if !map.is_empty() && map.values().all(Value::is_string) => {
                Some(map.keys().cloned().collect())
            }
            None => None,
        },
        _ => None,
    }
}

fn column_names(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Some(name.clone()),
                Value::Object(obj) => obj
                    .get("name")
                    .or_else(|| obj.get("column_name"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::Object(map) => Some(map.keys().cloned().collect()),
        _ => None,
    }
}
