use api_rest::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the EMR application
///
/// Loads `.env`, resolves configuration, seeds the store when a dictionary is configured, and
/// serves the REST API (with Swagger UI at `/swagger-ui`).
///
/// # Environment Variables
/// - `EMR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `EMR_DATA_DIR`: Directory for the file store (default: "emr_data")
/// - `EMR_STORE`: `memory` or `file` (default: "memory")
/// - `EMR_PROPERTIES_FILE`: Well-known concepts and types (default: "config/emr-properties.yaml")
/// - `EMR_DICTIONARY_FILE`: Reference data seeded at startup (optional)
/// - `API_KEY`: API key required on mutating routes (optional)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("emr_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("EMR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let state = AppState::from_env()?;
    let app = router(state);

    tracing::info!("++ Starting EMR REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
