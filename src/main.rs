//! Inspection Server
//!
//! Local HTTP service over the inspection core: form catalog, draft
//! records with debounced auto-save, photo processing and PDF export.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inspection_core::config::Config;
use inspection_core::db;
use inspection_core::form::FormCatalog;
use inspection_core::inspection::InspectionService;
use inspection_core::pdf::{
    LogShareTarget, MappingRegistry, OutboxShareTarget, PdfFillEngine, ShareTarget,
};
use inspection_core::photo::ImagePipeline;
use inspection_core::records::SqliteRecordStore;
use inspection_core::routes;
use inspection_core::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inspection_core=debug,inspection_server=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting Inspection Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.storage.data_dir.display());
    tracing::info!("Template directory: {}", config.storage.template_dir.display());

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let catalog = FormCatalog::builtin().context("Invalid built-in form")?;
    let mappings = MappingRegistry::builtin().context("Invalid built-in field mapping")?;

    for template_id in mappings.template_ids() {
        let path = config.storage.template_dir.join(format!("{}.pdf", template_id));
        if !path.exists() {
            tracing::warn!("Template {} missing at {}", template_id, path.display());
        }
    }

    let share: Arc<dyn ShareTarget> = match &config.export.share_outbox {
        Some(dir) => {
            tracing::info!("Sharing exported reports to {}", dir.display());
            Arc::new(OutboxShareTarget::new(dir.clone()))
        }
        None => Arc::new(LogShareTarget),
    };

    let fill = PdfFillEngine::new(
        config.storage.template_dir.clone(),
        config.storage.reports_dir(),
        Arc::new(mappings),
        share,
    );
    let images = ImagePipeline::new(config.storage.image_dir(), config.storage.temp_dir());

    let service = InspectionService::new(
        Arc::new(catalog),
        Arc::new(SqliteRecordStore::new(db_pool)),
        Arc::new(fill),
        images,
    );

    // Create application state
    let app_state = AppState::new(config.clone(), service);
    if config.autosave.enabled {
        tracing::info!("Auto-save after {}s of inactivity", config.autosave.window_secs);
    }

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state.clone());

    // Start server with graceful shutdown
    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST: {}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    tracing::info!("Inspection Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
