//! Query engine: catalog lookup, SQL generation, execution and decoding

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use restgate_common::config::RestConfig;
use restgate_common::error::{Error, Result};
use restgate_common::types::TableInfo;

use crate::backend::QueryBackend;
use crate::decode::JsonRow;
use crate::filter::Filter;
use crate::query::{CountType, QueryParams};
use crate::schema::SchemaCatalog;
use crate::sql::{BuiltQuery, SqlBuilder, UpsertOptions};

/// Rows of a collection read plus its count
#[derive(Debug, Clone, PartialEq)]
pub struct SelectResult {
    pub rows: Vec<JsonRow>,
    /// Present only when a count was requested
    pub total: Option<i64>,
    pub offset: i64,
}

/// Rows returned by a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    pub rows: Vec<JsonRow>,
    pub affected: u64,
}

impl MutationResult {
    fn from_rows(rows: Vec<JsonRow>) -> Self {
        Self {
            affected: rows.len() as u64,
            rows,
        }
    }
}

/// PostgREST-style query engine over one exposed schema
#[derive(Clone)]
pub struct RestEngine {
    catalog: Arc<dyn SchemaCatalog>,
    backend: Arc<dyn QueryBackend>,
    schema: String,
    max_rows: usize,
}

impl RestEngine {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        backend: Arc<dyn QueryBackend>,
        config: &RestConfig,
    ) -> Self {
        Self {
            catalog,
            backend,
            schema: config.schema.clone(),
            max_rows: config.max_rows,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn table(&self, name: &str) -> Result<TableInfo> {
        self.catalog
            .get_table(&self.schema, name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Tables of the exposed schema, sorted by name
    pub fn list_tables(&self) -> Vec<TableInfo> {
        self.catalog.list_tables(&self.schema)
    }

    /// Backend connectivity check
    pub async fn health(&self) -> Result<()> {
        self.backend.ping().await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Filtered, ordered, paginated read with an optional count
    pub async fn select(&self, table: &str, params: &QueryParams) -> Result<SelectResult> {
        let info = self.table(table)?;
        let builder = SqlBuilder::new(&info);
        let select = builder.build_select(params)?;
        let offset = params.offset.unwrap_or(0);

        let (rows, total) = match params.count {
            None => (self.run(table, &select).await?, None),
            Some(CountType::Exact) => {
                let count = builder.build_count(params)?;
                let (rows, counted) = self.run_pair(table, &select, &count).await?;
                (rows, Some(read_count(&counted)?))
            }
            Some(CountType::Planned) => {
                let explain = builder.build_explain(params)?;
                let (rows, plan) = self.run_pair(table, &select, &explain).await?;
                (rows, Some(read_plan_rows(&plan)?))
            }
            Some(CountType::Estimated) => {
                let explain = builder.build_explain(params)?;
                let (rows, plan) = self.run_pair(table, &select, &explain).await?;
                let estimate = read_plan_rows(&plan)?;

                let total = if usize::try_from(estimate).is_ok_and(|n| n < self.max_rows) {
                    let count = builder.build_count(params)?;
                    read_count(&self.run(table, &count).await?)?
                } else {
                    estimate
                };
                (rows, Some(total))
            }
        };

        Ok(SelectResult {
            rows,
            total,
            offset,
        })
    }

    /// Single row by primary key
    pub async fn select_one(&self, table: &str, id: &str, select: &[String]) -> Result<JsonRow> {
        let info = self.table(table)?;
        let query = SqlBuilder::new(&info).build_select_by_pk(id, select)?;
        first_row(self.run(table, &query).await?)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Batch insert, or upsert when `upsert` is given
    pub async fn insert(
        &self,
        table: &str,
        records: &[JsonValue],
        upsert: Option<&UpsertOptions>,
    ) -> Result<MutationResult> {
        let info = self.table(table)?;
        let query = SqlBuilder::new(&info).build_insert(records, upsert)?;
        Ok(MutationResult::from_rows(self.run(table, &query).await?))
    }

    /// Batch update by filters
    pub async fn update(
        &self,
        table: &str,
        patch: &JsonValue,
        filters: &[Filter],
    ) -> Result<MutationResult> {
        let info = self.table(table)?;
        let query = SqlBuilder::new(&info).build_update(patch, filters)?;
        Ok(MutationResult::from_rows(self.run(table, &query).await?))
    }

    pub async fn update_one(&self, table: &str, id: &str, patch: &JsonValue) -> Result<JsonRow> {
        let info = self.table(table)?;
        let query = SqlBuilder::new(&info).build_update_by_pk(id, patch)?;
        first_row(self.run(table, &query).await?)
    }

    /// Batch delete by filters
    pub async fn delete(&self, table: &str, filters: &[Filter]) -> Result<MutationResult> {
        let info = self.table(table)?;
        let query = SqlBuilder::new(&info).build_delete(filters)?;
        Ok(MutationResult::from_rows(self.run(table, &query).await?))
    }

    pub async fn delete_one(&self, table: &str, id: &str) -> Result<JsonRow> {
        let info = self.table(table)?;
        let query = SqlBuilder::new(&info).build_delete_by_pk(id)?;
        first_row(self.run(table, &query).await?)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    async fn run(&self, table: &str, query: &BuiltQuery) -> Result<Vec<JsonRow>> {
        debug!(table, sql = %query.sql, params = query.params.len(), "Executing");
        self.backend.fetch(query).await
    }

    /// Two statements on one connection checkout
    async fn run_pair(
        &self,
        table: &str,
        first: &BuiltQuery,
        second: &BuiltQuery,
    ) -> Result<(Vec<JsonRow>, Vec<JsonRow>)> {
        debug!(table, sql = %first.sql, params = first.params.len(), "Executing");
        debug!(table, sql = %second.sql, params = second.params.len(), "Executing");

        let mut results = self
            .backend
            .fetch_all(&[first.clone(), second.clone()])
            .await?
            .into_iter();

        match (results.next(), results.next()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(Error::InternalError(
                "backend returned fewer result sets than queries".to_string(),
            )),
        }
    }
}

fn first_row(rows: Vec<JsonRow>) -> Result<JsonRow> {
    rows.into_iter().next().ok_or(Error::ResourceNotFound)
}

/// `count` column of a `build_count` result
fn read_count(rows: &[JsonRow]) -> Result<i64> {
    rows.first()
        .and_then(|row| row.get("count"))
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| Error::DecodeError("count query returned no count".to_string()))
}

/// Top-level `Plan Rows` of an `EXPLAIN (FORMAT JSON)` result
fn read_plan_rows(rows: &[JsonRow]) -> Result<i64> {
    let plan = rows
        .first()
        .and_then(|row| row.values().next())
        .ok_or_else(|| Error::DecodeError("EXPLAIN returned no plan".to_string()))?;

    let plan_rows = &plan[0]["Plan"]["Plan Rows"];
    plan_rows
        .as_i64()
        .or_else(|| plan_rows.as_f64().map(|f| f.round() as i64))
        .ok_or_else(|| Error::DecodeError("EXPLAIN plan has no row estimate".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCache;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records executed SQL and replays canned result sets
    struct ScriptedBackend {
        executed: Mutex<Vec<BuiltQuery>>,
        responses: Mutex<Vec<Vec<JsonRow>>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<JsonValue>) -> Arc<Self> {
            let responses = responses
                .into_iter()
                .map(|set| {
                    set.as_array()
                        .unwrap()
                        .iter()
                        .map(|row| row.as_object().unwrap().clone())
                        .collect()
                })
                .collect();
            Arc::new(Self {
                executed: Mutex::new(vec![]),
                responses: Mutex::new(responses),
            })
        }

        fn executed_sql(&self) -> Vec<String> {
            self.executed
                .lock()
                .unwrap()
                .iter()
                .map(|q| q.sql.clone())
                .collect()
        }
    }

    #[async_trait]
    impl QueryBackend for ScriptedBackend {
        async fn fetch_all(&self, queries: &[BuiltQuery]) -> Result<Vec<Vec<JsonRow>>> {
            let mut out = Vec::new();
            for query in queries {
                self.executed.lock().unwrap().push(query.clone());
                let mut responses = self.responses.lock().unwrap();
                out.push(if responses.is_empty() {
                    vec![]
                } else {
                    responses.remove(0)
                });
            }
            Ok(out)
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn engine(backend: Arc<ScriptedBackend>) -> RestEngine {
        let catalog = SchemaCache::from_tables([TableInfo::new("public", "users")
            .column("id", "integer")
            .column("name", "text")
            .column("email", "text")
            .with_primary_key(&["id"])]);
        RestEngine::new(Arc::new(catalog), backend, &RestConfig::default())
    }

    #[tokio::test]
    async fn test_select_exact_count() {
        let backend = ScriptedBackend::new(vec![
            json!([{"id": 1}, {"id": 2}]),
            json!([{"count": 42}]),
        ]);
        let engine = engine(backend.clone());
        let params = QueryParams::from_query_string("select=id&count=exact&offset=5").unwrap();

        let result = engine.select("users", &params).await.unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.total, Some(42));
        assert_eq!(result.offset, 5);
        assert!(backend.executed_sql()[1].starts_with("SELECT COUNT(*)"));
    }

    #[tokio::test]
    async fn test_select_planned_count() {
        let backend = ScriptedBackend::new(vec![
            json!([]),
            json!([{"QUERY PLAN": [{"Plan": {"Node Type": "Seq Scan", "Plan Rows": 12000}}]}]),
        ]);
        let engine = engine(backend.clone());
        let params = QueryParams::from_query_string("count=planned").unwrap();

        let result = engine.select("users", &params).await.unwrap();
        assert_eq!(result.total, Some(12000));
        assert!(backend.executed_sql()[1].starts_with("EXPLAIN (FORMAT JSON)"));
    }

    #[tokio::test]
    async fn test_select_estimated_count_falls_back_to_exact() {
        let backend = ScriptedBackend::new(vec![
            json!([{"id": 1}]),
            json!([{"QUERY PLAN": [{"Plan": {"Plan Rows": 3}}]}]),
            json!([{"count": 1}]),
        ]);
        let engine = engine(backend.clone());
        let params = QueryParams::from_query_string("count=estimated").unwrap();

        let result = engine.select("users", &params).await.unwrap();
        assert_eq!(result.total, Some(1));
        assert_eq!(backend.executed_sql().len(), 3);
    }

    #[tokio::test]
    async fn test_select_estimated_count_keeps_large_estimate() {
        let backend = ScriptedBackend::new(vec![
            json!([]),
            json!([{"QUERY PLAN": [{"Plan": {"Plan Rows": 5000}}]}]),
        ]);
        let engine = engine(backend.clone());
        let params = QueryParams::from_query_string("count=estimated").unwrap();

        let result = engine.select("users", &params).await.unwrap();
        assert_eq!(result.total, Some(5000));
        assert_eq!(backend.executed_sql().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let engine = engine(ScriptedBackend::new(vec![]));
        let err = engine
            .select("missing", &QueryParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_validation_precedes_execution() {
        let backend = ScriptedBackend::new(vec![]);
        let engine = engine(backend.clone());

        let err = engine
            .insert("users", &[json!({"bogus": 1})], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(_)));

        let err = engine.delete("users", &[]).await.unwrap_err();
        assert!(matches!(err, Error::MissingFilter(_)));

        assert!(backend.executed_sql().is_empty());
    }

    #[tokio::test]
    async fn test_select_one_not_found() {
        let engine = engine(ScriptedBackend::new(vec![json!([])]));
        let err = engine.select_one("users", "9", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound));
    }

    #[tokio::test]
    async fn test_insert_reports_affected() {
        let backend = ScriptedBackend::new(vec![json!([{"id": 1}, {"id": 2}])]);
        let engine = engine(backend.clone());
        let result = engine
            .insert(
                "users",
                &[json!({"name": "a"}), json!({"name": "b"})],
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.affected, 2);
        assert!(backend.executed_sql()[0].starts_with("INSERT INTO \"public\".\"users\""));
    }

    #[test]
    fn test_read_plan_rows_rejects_garbage() {
        let mut row = JsonRow::new();
        row.insert("QUERY PLAN".into(), json!("not a plan"));
        assert!(read_plan_rows(&[row]).is_err());
        assert!(read_count(&[]).is_err());
    }
}
