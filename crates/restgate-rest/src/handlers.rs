//! HTTP handlers for REST API endpoints

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use restgate_common::config::PaginationConfig;
use restgate_common::error::{Error, Result};
use restgate_common::types::ApiError;

use crate::engine::RestEngine;
use crate::query::{query_param, PostQueryRequest, QueryParams};
use crate::response::{
    collection_response, content_range, mutation_response, single_response, Mutation,
    Preferences, Resolution, ResponsePlan, CONTENT_RANGE,
};
use crate::sql::{parse_on_conflict, UpsertOptions};

/// Shared REST API state
pub struct RestState {
    pub engine: RestEngine,
    pub pagination: PaginationConfig,
}

type State = web::Data<Arc<RestState>>;

// ============================================================================
// Response plumbing
// ============================================================================

/// Render an engine error as an `ApiError` body
pub fn error_response(err: &Error) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if err.is_client_error() {
        warn!(code = err.error_code(), error = %err, "Request rejected");
    } else {
        error!(code = err.error_code(), error = %err, "Request failed");
    }

    HttpResponse::build(status).json(ApiError::from(err))
}

fn plan_response(plan: ResponsePlan) -> HttpResponse {
    let status = StatusCode::from_u16(plan.status).unwrap_or(StatusCode::OK);
    let mut builder = HttpResponse::build(status);
    for header in plan.headers {
        builder.insert_header(header);
    }
    match plan.body {
        Some(body) => builder.json(body),
        None => builder.finish(),
    }
}

fn respond(result: Result<ResponsePlan>) -> HttpResponse {
    match result {
        Ok(plan) => plan_response(plan),
        Err(e) => error_response(&e),
    }
}

fn preferences(req: &HttpRequest) -> Preferences {
    req.headers()
        .get("Prefer")
        .and_then(|v| v.to_str().ok())
        .map(Preferences::parse)
        .unwrap_or_default()
}

/// Records of an insert body, and whether the body was a single object
fn records_from_body(body: JsonValue) -> Result<(Vec<JsonValue>, bool)> {
    match body {
        JsonValue::Array(records) => Ok((records, false)),
        object @ JsonValue::Object(_) => Ok((vec![object], true)),
        _ => Err(Error::InvalidBody(
            "expected a JSON object or array of objects".to_string(),
        )),
    }
}

fn upsert_options(req: &HttpRequest, prefs: &Preferences) -> Result<Option<UpsertOptions>> {
    let qs = req.query_string();
    let on_conflict = query_param(qs, "on_conflict")?.map(|raw| parse_on_conflict(&raw));

    if prefs.resolution.is_none() && on_conflict.is_none() {
        return Ok(None);
    }

    Ok(Some(UpsertOptions {
        on_conflict,
        ignore_duplicates: prefs.resolution == Some(Resolution::IgnoreDuplicates),
        default_to_null: query_param(qs, "default_to_null")?.as_deref() == Some("true"),
    }))
}

fn parse_i64_param(req: &HttpRequest, name: &str) -> Result<Option<i64>> {
    query_param(req.query_string(), name)?
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|_| Error::InvalidQueryParam(format!("{name}: expected an integer")))
        })
        .transpose()
}

// ============================================================================
// Table collection endpoints
// ============================================================================

/// GET /{table} - Read rows from table
pub async fn select_handler(state: State, path: web::Path<String>, req: HttpRequest) -> HttpResponse {
    respond(select(&state, &path.into_inner(), &req).await)
}

async fn select(state: &RestState, table: &str, req: &HttpRequest) -> Result<ResponsePlan> {
    let mut params = QueryParams::from_query_string(req.query_string())?;
    if params.count.is_none() {
        params.count = preferences(req).count;
    }
    params.limit = Some(state.pagination.listing.resolve(params.limit));

    let result = state.engine.select(table, &params).await?;
    Ok(collection_response(result.rows, result.offset, result.total))
}

/// POST /{table}/query - Read rows using a JSON query body
pub async fn query_handler(
    state: State,
    path: web::Path<String>,
    body: web::Json<PostQueryRequest>,
    req: HttpRequest,
) -> HttpResponse {
    respond(post_query(&state, &path.into_inner(), &body, &req).await)
}

async fn post_query(
    state: &RestState,
    table: &str,
    body: &PostQueryRequest,
    req: &HttpRequest,
) -> Result<ResponsePlan> {
    let mut params = body.compile()?;
    if params.count.is_none() {
        params.count = preferences(req).count;
    }
    params.limit = Some(state.pagination.listing.resolve(params.limit));

    let result = state.engine.select(table, &params).await?;
    Ok(collection_response(result.rows, result.offset, result.total))
}

/// POST /{table} - Insert (or upsert) rows into table
pub async fn insert_handler(
    state: State,
    path: web::Path<String>,
    body: web::Json<JsonValue>,
    req: HttpRequest,
) -> HttpResponse {
    respond(insert(&state, &path.into_inner(), body.into_inner(), &req).await)
}

async fn insert(
    state: &RestState,
    table: &str,
    body: JsonValue,
    req: &HttpRequest,
) -> Result<ResponsePlan> {
    let prefs = preferences(req);
    let (records, single) = records_from_body(body)?;
    let upsert = upsert_options(req, &prefs)?;

    let result = state
        .engine
        .insert(table, &records, upsert.as_ref())
        .await?;
    Ok(mutation_response(
        Mutation::Create,
        result.rows,
        result.affected,
        prefs.return_pref,
        single,
    ))
}

/// PATCH /{table} - Update rows matching the filters
pub async fn update_handler(
    state: State,
    path: web::Path<String>,
    body: web::Json<JsonValue>,
    req: HttpRequest,
) -> HttpResponse {
    respond(update(&state, &path.into_inner(), &body, &req).await)
}

async fn update(
    state: &RestState,
    table: &str,
    patch: &JsonValue,
    req: &HttpRequest,
) -> Result<ResponsePlan> {
    let filters = QueryParams::filters_from_query_string(req.query_string())?;
    let result = state.engine.update(table, patch, &filters).await?;
    Ok(mutation_response(
        Mutation::Update,
        result.rows,
        result.affected,
        preferences(req).return_pref,
        false,
    ))
}

/// DELETE /{table} - Delete rows matching the filters
pub async fn delete_handler(state: State, path: web::Path<String>, req: HttpRequest) -> HttpResponse {
    respond(delete(&state, &path.into_inner(), &req).await)
}

async fn delete(state: &RestState, table: &str, req: &HttpRequest) -> Result<ResponsePlan> {
    let filters = QueryParams::filters_from_query_string(req.query_string())?;
    let result = state.engine.delete(table, &filters).await?;
    Ok(mutation_response(
        Mutation::Delete,
        result.rows,
        result.affected,
        preferences(req).return_pref,
        false,
    ))
}

// ============================================================================
// Single-row endpoints
// ============================================================================

/// GET /{table}/{id}
pub async fn select_one_handler(
    state: State,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (table, id) = path.into_inner();
    respond(select_one(&state, &table, &id, &req).await)
}

async fn select_one(
    state: &RestState,
    table: &str,
    id: &str,
    req: &HttpRequest,
) -> Result<ResponsePlan> {
    let select = QueryParams::from_query_string(req.query_string())?.select;
    let row = state.engine.select_one(table, id, &select).await?;
    Ok(single_response(row))
}

/// PATCH /{table}/{id}
pub async fn update_one_handler(
    state: State,
    path: web::Path<(String, String)>,
    body: web::Json<JsonValue>,
    req: HttpRequest,
) -> HttpResponse {
    let (table, id) = path.into_inner();
    let result = state.engine.update_one(&table, &id, &body).await.map(|row| {
        mutation_response(
            Mutation::Update,
            vec![row],
            1,
            preferences(&req).return_pref,
            true,
        )
    });
    respond(result)
}

/// DELETE /{table}/{id}
pub async fn delete_one_handler(
    state: State,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (table, id) = path.into_inner();
    let result = state.engine.delete_one(&table, &id).await.map(|row| {
        mutation_response(
            Mutation::Delete,
            vec![row],
            1,
            preferences(&req).return_pref,
            true,
        )
    });
    respond(result)
}

// ============================================================================
// Catalog and health
// ============================================================================

/// GET / - List exposed tables
pub async fn tables_handler(state: State, req: HttpRequest) -> HttpResponse {
    respond(list_tables(&state, &req))
}

fn list_tables(state: &RestState, req: &HttpRequest) -> Result<ResponsePlan> {
    let limit = state.pagination.admin.resolve(parse_i64_param(req, "limit")?);
    let offset = parse_i64_param(req, "offset")?.unwrap_or(0).max(0);

    let tables = state.engine.list_tables();
    let total = tables.len();
    let page: Vec<_> = tables
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(0))
        .collect();

    Ok(ResponsePlan {
        status: 200,
        headers: vec![(
            CONTENT_RANGE,
            content_range(offset, page.len(), i64::try_from(total).ok()),
        )],
        body: Some(serde_json::to_value(page)?),
    })
}

/// Health check
pub async fn health_handler(state: State) -> HttpResponse {
    match state.engine.health().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "service": "rest",
            "version": env!("CARGO_PKG_VERSION"),
        })),
        Err(e) => {
            error!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": "rest",
                "error": e.to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use serde_json::json;

    #[test]
    fn test_records_from_body() {
        let (records, single) = records_from_body(json!({"a": 1})).unwrap();
        assert_eq!(records.len(), 1);
        assert!(single);

        let (records, single) = records_from_body(json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!single);

        assert!(matches!(
            records_from_body(json!("text")),
            Err(Error::InvalidBody(_))
        ));
    }

    #[actix_web::test]
    async fn test_error_response_body() {
        let resp = error_response(&Error::MissingFilter("Batch delete"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let body: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "missing_filter");
        assert_eq!(body["message"], "Batch delete requires at least one filter");
    }

    #[test]
    fn test_error_response_status() {
        assert_eq!(
            error_response(&Error::TableNotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(&Error::DatabaseError("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_plan_response_headers() {
        let resp = plan_response(ResponsePlan {
            status: 204,
            body: None,
            headers: vec![("X-Affected-Count", "3".to_string())],
        });
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers().get("X-Affected-Count").unwrap(), "3");
    }
}
