//! Coal Fire Risk - Backend Server
//!
//! Predicts spontaneous combustion of coal stockpiles from temperature acts,
//! stockpile age and weather, and trains the underlying model offline.

use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod classifier;
mod config;
mod error;
mod handlers;
mod routes;
mod services;

pub use config::Config;

use classifier::ModelManager;
use services::training::{TrainRequest, TrainingOverrides};
use services::TrainingService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub models: Arc<ModelManager>,
    /// Held for the duration of a training run
    pub training_lock: Arc<Mutex<()>>,
}

#[derive(Parser)]
#[command(name = "cfr-server", version, about = "Coal stockpile fire risk service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Assemble features from CSV exports and train a model
    Train {
        /// Directory with fires.csv, supplies.csv, temperature.csv and weather_data_*.csv
        #[arg(long, env = "CFR_TRAINING__DATA_DIR")]
        data_dir: Option<PathBuf>,
        #[arg(long, default_value = "coal_fire_model")]
        model_name: String,
        #[arg(long, default_value = "1.0.0")]
        model_version: String,
        /// Also write the assembled feature table to this CSV file
        #[arg(long)]
        emit_features: Option<PathBuf>,
        #[arg(long)]
        n_estimators: Option<u32>,
        #[arg(long)]
        max_depth: Option<u32>,
        #[arg(long)]
        learning_rate: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cfr_server=debug,shared=info,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Arc::new(config::Config::load()?);
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Train {
            data_dir,
            model_name,
            model_version,
            emit_features,
            n_estimators,
            max_depth,
            learning_rate,
            seed,
        } => {
            let request = TrainRequest {
                model_name,
                model_version,
                config: TrainingOverrides {
                    n_estimators,
                    max_depth,
                    learning_rate,
                    seed,
                    ..Default::default()
                },
            };
            train(config, data_dir, request, emit_features).await
        }
    }
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Starting Coal Fire Risk Server");
    tracing::info!("Environment: {}", config.environment);

    // The pool connects on first use so the API comes up without a database
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(&config.database.url)?;

    let models = Arc::new(ModelManager::new(&config.model.dir));
    if let Err(e) = models
        .load(&config.model.default_name, &config.model.default_version)
        .await
    {
        tracing::warn!(error = %e, "Starting without a model");
    }

    // Create application state
    let state = AppState {
        db: db_pool,
        config: config.clone(),
        models,
        training_lock: Arc::new(Mutex::new(())),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn train(
    config: Arc<Config>,
    data_dir: Option<PathBuf>,
    request: TrainRequest,
    emit_features: Option<PathBuf>,
) -> anyhow::Result<()> {
    let models = Arc::new(ModelManager::new(&config.model.dir));
    let service = TrainingService::new(config, models, Arc::new(Mutex::new(())));

    let run = service.train_from_dir(data_dir.as_deref(), request).await?;

    if let Some(path) = emit_features {
        let file = std::fs::File::create(&path)?;
        run.features.write_csv(file)?;
        tracing::info!(path = %path.display(), rows = run.features.len(), "Feature table written");
    }

    println!("{}", serde_json::to_string_pretty(&run.response)?);
    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.config.server.max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Coal Fire Risk Prediction API v1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "cfr-upload-boundary";

    fn test_state(max_upload_bytes: usize, model_dir: &std::path::Path) -> AppState {
        let mut config = Config::from_defaults("test").unwrap();
        config.server.max_upload_bytes = max_upload_bytes;
        let db = PgPoolOptions::new().connect_lazy(&config.database.url).unwrap();
        AppState {
            db,
            config: Arc::new(config),
            models: Arc::new(ModelManager::new(model_dir)),
            training_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Multipart body with a single file field of `size` bytes
    fn multipart_body(name: &str, size: usize) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.csv\"\r\nContent-Type: text/csv\r\n\r\n"
        )
        .into_bytes();
        body.extend(std::iter::repeat(b'x').take(size));
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_upload(app: Router, uri: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upload_above_axum_default_limit_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(64 * 1024 * 1024, dir.path());
        let app = create_app(state);

        // 3 MB is past axum's 2 MB default; the handler must get far enough
        // to report the missing exports
        let body = multipart_body("notes", 3 * 1024 * 1024);
        let (status, body) = post_upload(app, "/api/v1/validate/csv", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field"], "fires");
    }

    #[tokio::test]
    async fn test_upload_over_configured_limit_is_payload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(1024, dir.path()));

        let body = multipart_body("fires", 64 * 1024);
        let (status, body) = post_upload(app, "/api/v1/predict/csv", body).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_malformed_multipart_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(1024 * 1024, dir.path()));

        let body = b"not a multipart body".to_vec();
        let (status, body) = post_upload(app, "/api/v1/validate/csv", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "UPLOAD_ERROR");
    }
}
