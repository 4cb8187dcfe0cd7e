//! Common types for the RestGate query engine

use serde::{Deserialize, Serialize};

// ============================================================================
// Catalog Types
// ============================================================================

/// Table metadata from schema introspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Primary-key column names; empty when the table has none
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl TableInfo {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: vec![],
            primary_key: vec![],
        }
    }

    /// Builder-style column append
    pub fn column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.push(ColumnInfo::new(name, data_type));
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }
}

/// Column metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    #[serde(default)]
    pub has_default: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            has_default: false,
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<&crate::error::Error> for ApiError {
    fn from(err: &crate::error::Error) -> Self {
        let api = Self::new(err.error_code(), err.to_string());
        match err {
            crate::error::Error::MissingConflictTarget(_) => {
                api.with_hint("Pass on_conflict=<columns> naming a unique constraint")
            }
            crate::error::Error::MissingFilter(_) => {
                api.with_hint("Add a filter such as id=eq.<value>")
            }
            crate::error::Error::UnknownColumn(column)
            | crate::error::Error::UnknownConflictColumn(column) => {
                api.with_details(serde_json::json!({ "column": column }))
            }
            _ => api,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_table_builder() {
        let table = TableInfo::new("public", "users")
            .column("id", "uuid")
            .column("email", "text")
            .with_primary_key(&["id"]);
        assert!(table.has_column("email"));
        assert!(!table.has_column("Email"));
        assert_eq!(table.primary_key, vec!["id".to_string()]);
    }

    #[test]
    fn test_api_error() {
        let error = ApiError::new("invalid_request", "Missing required field")
            .with_hint("Include 'email' field");
        assert_eq!(error.code, "invalid_request");
        assert!(error.hint.is_some());
    }

    #[test]
    fn test_api_error_from_error() {
        let api = ApiError::from(&Error::MissingFilter("Batch delete"));
        assert_eq!(api.code, "missing_filter");
        assert_eq!(api.message, "Batch delete requires at least one filter");
        assert!(api.hint.is_some());
        assert!(api.details.is_none());
    }

    #[test]
    fn test_api_error_names_unknown_column() {
        let api = ApiError::from(&Error::UnknownColumn("emial".into()));
        assert_eq!(api.code, "unknown_column");
        assert_eq!(api.details, Some(serde_json::json!({ "column": "emial" })));
    }
}
