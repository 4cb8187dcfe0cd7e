//! REST API server implementation

use actix_cors::Cors;
use actix_web::{error::JsonPayloadError, middleware, web, App, HttpRequest, HttpServer};
use std::sync::Arc;
use tracing::{info, warn};

use restgate_common::config::{PaginationConfig, RestConfig};
use restgate_common::error::{Error, Result};

use crate::engine::RestEngine;
use crate::handlers::{self, RestState};

/// PostgREST-compatible REST API server
pub struct RestServer {
    config: RestConfig,
    state: Arc<RestState>,
}

impl RestServer {
    pub fn new(config: &RestConfig, pagination: &PaginationConfig, engine: RestEngine) -> Self {
        let state = Arc::new(RestState {
            engine,
            pagination: pagination.clone(),
        });

        Self {
            config: config.clone(),
            state,
        }
    }

    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<RestState> {
        self.state.clone()
    }

    /// Build CORS configuration from allowed origins
    fn build_cors(origins: &[String]) -> Cors {
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            warn!("CORS is configured with wildcard origin - not recommended for production");
            return Cors::permissive();
        }

        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::HeaderName::from_static("prefer"),
            ])
            .expose_headers(vec!["Content-Range", "X-Affected-Count"])
            .max_age(3600);

        for origin in origins {
            cors = cors.allowed_origin(origin);
        }

        cors
    }

    /// Run the REST server
    pub async fn run(&self) -> Result<()> {
        let state = self.state.clone();
        let cors_origins = self.config.cors_origins.clone();
        let host = self.config.host.clone();
        let port = self.config.port;
        let base_path = self.config.base_path.trim_end_matches('/').to_string();

        info!("Starting REST API server on {}:{}", host, port);
        info!("  Exposed schema: {}", self.config.schema);
        if !self.config.base_path.is_empty() {
            info!("  Base path: {}", self.config.base_path);
        }

        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .app_data(json_config())
                .wrap(Self::build_cors(&cors_origins))
                .wrap(middleware::Compress::default())
                .wrap(middleware::Logger::default())
                .service(web::scope(&base_path).configure(configure))
        })
        .workers(self.config.workers)
        .bind(format!("{}:{}", host, port))?
        .run()
        .await?;

        Ok(())
    }
}

/// JSON extractor config: malformed bodies become `invalid_body` errors
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        let api_error = Error::InvalidBody(err.to_string());
        actix_web::error::InternalError::from_response(err, handlers::error_response(&api_error))
            .into()
    })
}

/// Register all routes; `/{table}/query` precedes `/{table}/{id}`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_handler))
        .route("/", web::get().to(handlers::tables_handler))
        .route("/{table}", web::get().to(handlers::select_handler))
        .route("/{table}", web::post().to(handlers::insert_handler))
        .route("/{table}", web::patch().to(handlers::update_handler))
        .route("/{table}", web::delete().to(handlers::delete_handler))
        .route("/{table}/query", web::post().to(handlers::query_handler))
        .route("/{table}/{id}", web::get().to(handlers::select_one_handler))
        .route("/{table}/{id}", web::patch().to(handlers::update_one_handler))
        .route("/{table}/{id}", web::delete().to(handlers::delete_one_handler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueryBackend;
    use crate::decode::JsonRow;
    use crate::schema::SchemaCache;
    use crate::sql::BuiltQuery;
    use actix_web::{http::StatusCode, test as actix_test};
    use async_trait::async_trait;
    use restgate_common::types::TableInfo;

    struct EmptyBackend;

    #[async_trait]
    impl QueryBackend for EmptyBackend {
        async fn fetch_all(&self, queries: &[BuiltQuery]) -> Result<Vec<Vec<JsonRow>>> {
            Ok(vec![vec![]; queries.len()])
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn server() -> RestServer {
        let config = RestConfig::default();
        let catalog = SchemaCache::from_tables([TableInfo::new("public", "users")
            .column("id", "integer")
            .with_primary_key(&["id"])]);
        let engine = RestEngine::new(Arc::new(catalog), Arc::new(EmptyBackend), &config);
        RestServer::new(&config, &PaginationConfig::default(), engine)
    }

    #[actix_web::test]
    async fn test_health_route() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(server().state()))
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_malformed_json_body() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(server().state()))
                .app_data(json_config())
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/users")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["code"], "invalid_body");
    }

    #[actix_web::test]
    async fn test_routes_under_base_path() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(server().state()))
                .service(web::scope("/rest/v1").configure(configure)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/rest/v1/health").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_cors_echoes_allowed_origin() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RestServer::build_cors(&["https://app.example.com".to_string()]))
                .app_data(web::Data::new(server().state()))
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/health")
            .insert_header(("Origin", "https://app.example.com"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "https://app.example.com"
        );
    }

    #[actix_web::test]
    async fn test_cors_wildcard_accepts_any_origin() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RestServer::build_cors(&["*".to_string()]))
                .app_data(web::Data::new(server().state()))
                .configure(configure),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/health")
            .insert_header(("Origin", "https://elsewhere.dev"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("access-control-allow-origin"));
    }
}
