use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use clap::Args;
use schoolwatch_core::ServiceError;
use schoolwatch_database::DbConnection;
use schoolwatch_surveys::{configure_routes, ApiDoc, SubmissionService, SurveyState};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use utoipa::OpenApi;

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0:3000", env = "SCHOOLWATCH_ADDRESS")]
    pub address: String,

    /// Database connection URL
    #[arg(long, env = "SCHOOLWATCH_DATABASE_URL")]
    pub database_url: String,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let address: SocketAddr =
            self.address
                .parse()
                .map_err(|_| ServiceError::Configuration {
                    message: format!("'{}' is not a valid bind address", self.address),
                })?;

        debug!("Initializing database connection...");
        let db = schoolwatch_database::establish_connection(&self.database_url).await?;
        info!("Database connected successfully");

        let state = Arc::new(SurveyState {
            submissions: Arc::new(SubmissionService::new(db.clone())),
        });

        // The survey field app posts from arbitrary origins
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/api-docs/openapi.json", get(openapi_handler))
            .merge(configure_routes().with_state(state))
            .layer(cors);

        let listener = TcpListener::bind(address).await?;
        info!("Server running on port {}", address.port());

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        close_pool(db).await;
        Ok(())
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c signal");
    info!("Received Ctrl+C, initiating graceful shutdown...");
}

/// Close the pool once the server has stopped accepting requests.
async fn close_pool(db: Arc<DbConnection>) {
    match Arc::try_unwrap(db) {
        Ok(db) => {
            if let Err(e) = db.close().await {
                warn!("Error closing database connection: {}", e);
            } else {
                debug!("Database connection closed successfully");
            }
        }
        Err(_) => {
            debug!("Database still has other references, skipping close");
        }
    }
}
