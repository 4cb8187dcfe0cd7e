//! Schema catalog consulted for validation

use std::collections::HashMap;

use restgate_common::types::TableInfo;

/// Read-only view of the exposed tables
pub trait SchemaCatalog: Send + Sync {
    /// Look up a table by schema and name
    fn get_table(&self, schema: &str, name: &str) -> Option<TableInfo>;

    /// All tables in `schema`, sorted by name
    fn list_tables(&self, schema: &str) -> Vec<TableInfo>;
}

/// In-memory catalog loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    tables: HashMap<(String, String), TableInfo>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: impl IntoIterator<Item = TableInfo>) -> Self {
        let mut cache = Self::new();
        for table in tables {
            cache.insert(table);
        }
        cache
    }

    /// Add or replace a table. Only used while building the cache.
    pub fn insert(&mut self, table: TableInfo) {
        self.tables
            .insert((table.schema.clone(), table.name.clone()), table);
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl SchemaCatalog for SchemaCache {
    fn get_table(&self, schema: &str, name: &str) -> Option<TableInfo> {
        self.tables
            .get(&(schema.to_string(), name.to_string()))
            .cloned()
    }

    fn list_tables(&self, schema: &str) -> Vec<TableInfo> {
        let mut tables: Vec<TableInfo> = self
            .tables
            .values()
            .filter(|t| t.schema == schema)
            .cloned()
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }
}
