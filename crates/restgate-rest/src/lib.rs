//! RestGate REST Query Engine (PostgREST-compatible)
//!
//! Compiles PostgREST-style query strings and JSON query bodies into
//! parameterized SQL against a runtime-discovered schema, supporting:
//! - CRUD operations on tables, single-row by primary key or batched
//! - Filtering (eq, neq, gt, gte, lt, lte, like, ilike, in, is) with AND/OR groups
//! - BETWEEN ranges, ordering, grouping and pagination
//! - Upsert with explicit or primary-key conflict targets
//! - Exact, planned and estimated counts

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod decode;
pub mod engine;
pub mod filter;
pub mod handlers;
pub mod pg_backend;
pub mod query;
pub mod response;
pub mod schema;
pub mod server;
pub mod sql;

pub use backend::QueryBackend;
pub use engine::{MutationResult, RestEngine, SelectResult};
pub use pg_backend::{PgBackend, PgCatalogLoader};
pub use query::{PostQueryRequest, QueryParams};
pub use schema::{SchemaCache, SchemaCatalog};
pub use server::RestServer;
pub use sql::{BuiltQuery, SqlBuilder};
