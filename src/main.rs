use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod cache;
mod error;
mod github;
mod models;
mod openapi;
mod reconcile;
mod repo;
mod routes;
mod security;
mod summary;

use github::GithubClient;
use openapi::ApiDoc;
use routes::{config, AppState};
use security::SecurityHeaders;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment is expected to be set externally; .env is only read in
    // debug builds to reduce local setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping RepoCleanup server");
    info!(
        "GitHub OAuth configured: {}",
        std::env::var("GITHUB_CLIENT_ID").is_ok()
    );
    info!(
        "Frontend URL: {}",
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:4200".to_string())
    );

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = repo::inmem::InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory report store");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres report store");
        repo::pg::PgRepo::new(pool)
    };

    let github = GithubClient::from_env();
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // Angular dev server default port
                .allowed_origin("http://localhost:4200")
                .allowed_origin("http://127.0.0.1:4200")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                github: github.clone(),
            }))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080 (all interfaces)");

    server.run().await
}

/// Warn about missing configuration; OAuth login degrades gracefully so
/// nothing here is fatal, unlike the Postgres URL checked above.
fn validate_env_vars() {
    use std::env;

    if env::var("GITHUB_CLIENT_ID").is_err() || env::var("GITHUB_CLIENT_SECRET").is_err() {
        eprintln!("Warning: GitHub OAuth not configured (GITHUB_CLIENT_ID/GITHUB_CLIENT_SECRET missing)");
        eprintln!("Login and the unauthenticated app-credential fallback will not work");
    }
}
