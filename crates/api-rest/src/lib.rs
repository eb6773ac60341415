//! # API REST
//!
//! REST API implementation for the EMR.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON bodies, CORS, API-key checks on writes)
//!
//! Uses `api-shared` for request/response schemas and `emr-core` for every clinical rule.

#![warn(rust_2018_idioms)]

pub mod convert;
pub mod error;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use emr_core::config::{data_dir_from_env_value, store_kind_from_env_value};
use emr_core::constants::DEFAULT_PROPERTIES_FILE;
use emr_core::{AnyStore, CoreConfig, Dictionary, EmrApiProperties, EmrStore};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;

/// Shared state handed to every request handler.
///
/// Services are cheap to build (two `Arc` clones), so handlers construct the one they need per
/// request over the shared store.
#[derive(Clone)]
pub struct AppState {
    pub(crate) cfg: Arc<CoreConfig>,
    pub(crate) store: Arc<AnyStore>,
    pub(crate) api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<AnyStore>, api_key: Option<String>) -> Self {
        Self {
            cfg,
            store,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }

    /// Resolves configuration from the environment, opens the store, seeds it and checks that
    /// every configured concept and type exists.
    ///
    /// # Environment Variables
    /// - `EMR_DATA_DIR`: file store directory (default `emr_data`)
    /// - `EMR_STORE`: `memory` or `file` (default `memory`)
    /// - `EMR_PROPERTIES_FILE`: properties YAML (default `config/emr-properties.yaml`)
    /// - `EMR_DICTIONARY_FILE`: optional dictionary YAML seeded at startup
    /// - `API_KEY`: optional key required on mutating routes
    ///
    /// # Errors
    /// Returns an error if:
    /// - a variable holds an invalid value,
    /// - the properties or dictionary file cannot be read or parsed,
    /// - the store cannot be opened or seeded, or
    /// - the properties refer to concepts or types the store does not hold.
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = data_dir_from_env_value(std::env::var("EMR_DATA_DIR").ok());
        let store_kind = store_kind_from_env_value(std::env::var("EMR_STORE").ok())?;
        let properties_file = std::env::var("EMR_PROPERTIES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROPERTIES_FILE));
        let properties = EmrApiProperties::load(&properties_file)?;

        let cfg = Arc::new(CoreConfig::new(data_dir, store_kind, properties));
        let store = cfg.open_store()?;

        if let Ok(dictionary_file) = std::env::var("EMR_DICTIONARY_FILE") {
            let report = Dictionary::load(&PathBuf::from(dictionary_file))?.seed(&store)?;
            tracing::info!(
                "-- Seeded {} reference rows, {} patients, {} beds",
                report.reference_rows,
                report.patients,
                report.beds
            );
        }
        store.read(|records| cfg.properties().verify(records))?;

        Ok(Self::new(cfg, Arc::new(store), std::env::var("API_KEY").ok()))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::save_encounter_transaction,
        handlers::get_encounter_transaction,
        handlers::find_encounter_transactions,
        handlers::save_condition,
        handlers::get_condition,
        handlers::condition_chain,
        handlers::void_condition,
        handlers::unvoid_condition,
        handlers::active_conditions,
        handlers::condition_history,
        handlers::condition_end_reasons,
        handlers::patient_diagnoses,
        handlers::encounter_diagnoses,
        handlers::migrate_diagnoses,
        handlers::admit,
        handlers::discharge,
        handlers::transfer,
        handlers::active_orders,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::ErrorRes,
        api_shared::ConditionReq,
        api_shared::ConditionRes,
        api_shared::ConditionHistoryRes,
        api_shared::VoidReq,
        api_shared::ConceptRes,
        api_shared::DiagnosisRes,
        api_shared::MigrationRes,
        api_shared::AdtReq,
        api_shared::AdtRes,
        api_shared::OrderRes,
    ))
)]
pub struct ApiDoc;

/// Builds the application router.
///
/// Mutating routes sit behind the API-key check; reads are open.
pub fn router(state: AppState) -> Router {
    let writes = Router::new()
        .route(
            "/encountertransaction",
            post(handlers::save_encounter_transaction),
        )
        .route("/conditions", post(handlers::save_condition))
        .route("/conditions/:uuid/void", post(handlers::void_condition))
        .route("/conditions/:uuid/unvoid", post(handlers::unvoid_condition))
        .route("/diagnoses/migrate", post(handlers::migrate_diagnoses))
        .route("/adt/admit", post(handlers::admit))
        .route("/adt/discharge", post(handlers::discharge))
        .route("/adt/transfer", post(handlers::transfer))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_api_key,
        ));

    let reads = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/encountertransaction/:uuid",
            get(handlers::get_encounter_transaction),
        )
        .route(
            "/patients/:uuid/encountertransactions",
            get(handlers::find_encounter_transactions),
        )
        .route("/conditions/:uuid", get(handlers::get_condition))
        .route("/conditions/:uuid/chain", get(handlers::condition_chain))
        .route("/patients/:uuid/conditions", get(handlers::active_conditions))
        .route(
            "/patients/:uuid/conditions/history",
            get(handlers::condition_history),
        )
        .route(
            "/concepts/condition-end-reasons",
            get(handlers::condition_end_reasons),
        )
        .route("/patients/:uuid/diagnoses", get(handlers::patient_diagnoses))
        .route(
            "/encounters/:uuid/diagnoses",
            get(handlers::encounter_diagnoses),
        )
        .route(
            "/patients/:uuid/orders/active",
            get(handlers::active_orders),
        );

    Router::new()
        .merge(reads)
        .merge(writes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
