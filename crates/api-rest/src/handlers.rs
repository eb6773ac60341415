//! Route handlers.
//!
//! Handlers are thin: parse the request, build the core service over the shared store, and
//! translate the result. Every rule lives in `emr-core`.

use crate::convert;
use crate::error::ApiError;
use crate::AppState;
use api_shared::{
    AdtReq, AdtRes, ConceptRes, ConditionHistoryRes, ConditionReq, ConditionRes, DiagnosisRes,
    ErrorRes, HealthRes, HealthService, MigrationRes, OrderRes, VoidReq,
};
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use emr_core::encounter_transaction::EncounterTransaction;
use emr_core::{
    AdtService, ConditionService, DiagnosisMigrator, DiagnosisService, EmrError,
    EncounterTransactionService, OrderService, OrderType,
};
use serde::Deserialize;
use utoipa::IntoParams;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Rejects mutating requests whose `x-api-key` does not match the configured key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    api_shared::validate_api_key(state.api_key.as_deref(), provided)?;
    Ok(next.run(request).await)
}

fn json_text(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

// ============================================================================
// Encounter transactions
// ============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EncounterQuery {
    /// Include voided observations, diagnoses and orders.
    #[serde(default)]
    pub include_voided: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EncounterSearch {
    pub visit_uuid: Option<String>,
    pub encounter_type_uuid: Option<String>,
}

#[utoipa::path(
    post,
    path = "/encountertransaction",
    request_body(
        content = String,
        description = "Encounter transaction JSON",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "The encounter transaction as stored, with assigned uuids"),
        (status = 400, description = "Malformed or unresolvable transaction", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "Unknown patient, encounter or visit", body = ErrorRes),
        (status = 409, description = "Encounter or observation is voided", body = ErrorRes)
    )
)]
/// Save an encounter transaction.
///
/// The body is parsed strictly: unknown fields and non-canonical uuids are rejected with the
/// failing field path. Everything in the transaction is written together or not at all.
#[axum::debug_handler]
pub async fn save_encounter_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let transaction = EncounterTransaction::parse(&body)?;
    let service = EncounterTransactionService::new(state.cfg.clone(), state.store.clone());
    let saved = service.save(&transaction, &auditor)?;
    Ok(json_text(saved.render()?))
}

#[utoipa::path(
    get,
    path = "/encountertransaction/{uuid}",
    params(("uuid" = String, Path, description = "Encounter uuid"), EncounterQuery),
    responses(
        (status = 200, description = "The encounter as a transaction"),
        (status = 404, description = "Unknown encounter", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_encounter_transaction(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(query): Query<EncounterQuery>,
) -> Result<Response, ApiError> {
    let encounter = convert::uuid("uuid", &uuid)?;
    let service = EncounterTransactionService::new(state.cfg.clone(), state.store.clone());
    let transaction = service.get(encounter, query.include_voided)?;
    Ok(json_text(transaction.render()?))
}

#[utoipa::path(
    get,
    path = "/patients/{uuid}/encountertransactions",
    params(("uuid" = String, Path, description = "Patient uuid"), EncounterSearch),
    responses(
        (status = 200, description = "Encounters of the patient, newest first"),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn find_encounter_transactions(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(search): Query<EncounterSearch>,
) -> Result<Json<Vec<EncounterTransaction>>, ApiError> {
    let patient = convert::uuid("uuid", &uuid)?;
    let visit = convert::optional_uuid("visitUuid", search.visit_uuid.as_deref())?;
    let encounter_type =
        convert::optional_uuid("encounterTypeUuid", search.encounter_type_uuid.as_deref())?;
    let service = EncounterTransactionService::new(state.cfg.clone(), state.store.clone());
    Ok(Json(service.find(patient, visit, encounter_type)?))
}

// ============================================================================
// Conditions
// ============================================================================

#[utoipa::path(
    post,
    path = "/conditions",
    request_body = ConditionReq,
    responses(
        (status = 200, description = "The condition as stored", body = ConditionRes),
        (status = 400, description = "Invalid condition", body = ErrorRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes),
        (status = 404, description = "Unknown patient, concept or condition", body = ErrorRes)
    )
)]
/// Record a new condition, or revise one when `uuid` is given.
///
/// A revision with a new status ends the stored row and starts a new one; a revision with the
/// same status voids the stored row.
#[axum::debug_handler]
pub async fn save_condition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ConditionReq>,
) -> Result<Json<ConditionRes>, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let input = convert::condition_input(req)?;
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let saved = service.save(input, &auditor)?;
    Ok(Json(convert::condition_res(&saved)))
}

#[utoipa::path(
    get,
    path = "/conditions/{uuid}",
    params(("uuid" = String, Path, description = "Condition uuid")),
    responses(
        (status = 200, description = "The condition", body = ConditionRes),
        (status = 404, description = "Unknown condition", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_condition(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<ConditionRes>, ApiError> {
    let uuid = convert::uuid("uuid", &uuid)?;
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let condition = service
        .get(uuid)?
        .ok_or_else(|| EmrError::not_found("condition", uuid))?;
    Ok(Json(convert::condition_res(&condition)))
}

#[utoipa::path(
    get,
    path = "/conditions/{uuid}/chain",
    params(("uuid" = String, Path, description = "Condition uuid")),
    responses(
        (status = 200, description = "The condition and every earlier version", body = [ConditionRes]),
        (status = 404, description = "Unknown condition", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn condition_chain(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<ConditionRes>>, ApiError> {
    let uuid = convert::uuid("uuid", &uuid)?;
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let chain = service.revision_chain(uuid)?;
    Ok(Json(chain.iter().map(convert::condition_res).collect()))
}

#[utoipa::path(
    post,
    path = "/conditions/{uuid}/void",
    params(("uuid" = String, Path, description = "Condition uuid")),
    request_body = VoidReq,
    responses(
        (status = 200, description = "The voided condition", body = ConditionRes),
        (status = 400, description = "Blank void reason", body = ErrorRes),
        (status = 404, description = "Unknown condition", body = ErrorRes),
        (status = 409, description = "Already voided", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn void_condition(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<VoidReq>,
) -> Result<Json<ConditionRes>, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let uuid = convert::uuid("uuid", &uuid)?;
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let voided = service.void(uuid, Some(&req.reason), &auditor)?;
    Ok(Json(convert::condition_res(&voided)))
}

#[utoipa::path(
    post,
    path = "/conditions/{uuid}/unvoid",
    params(("uuid" = String, Path, description = "Condition uuid")),
    responses(
        (status = 200, description = "The restored condition", body = ConditionRes),
        (status = 404, description = "Unknown condition", body = ErrorRes),
        (status = 409, description = "Not voided", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn unvoid_condition(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConditionRes>, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let uuid = convert::uuid("uuid", &uuid)?;
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let restored = service.unvoid(uuid, &auditor)?;
    Ok(Json(convert::condition_res(&restored)))
}

#[utoipa::path(
    get,
    path = "/patients/{uuid}/conditions",
    params(("uuid" = String, Path, description = "Patient uuid")),
    responses(
        (status = 200, description = "Active conditions, newest onset first", body = [ConditionRes]),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn active_conditions(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<ConditionRes>>, ApiError> {
    let patient = convert::uuid("uuid", &uuid)?;
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let active = service.active_conditions(patient)?;
    Ok(Json(active.iter().map(convert::condition_res).collect()))
}

#[utoipa::path(
    get,
    path = "/patients/{uuid}/conditions/history",
    params(("uuid" = String, Path, description = "Patient uuid")),
    responses(
        (status = 200, description = "Revisions grouped per condition", body = [ConditionHistoryRes]),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn condition_history(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<ConditionHistoryRes>>, ApiError> {
    let patient = convert::uuid("uuid", &uuid)?;
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let history = service.condition_history(patient)?;
    Ok(Json(history.iter().map(convert::condition_history_res).collect()))
}

#[utoipa::path(
    get,
    path = "/concepts/condition-end-reasons",
    responses(
        (status = 200, description = "Concepts a condition may end with", body = [ConceptRes])
    )
)]
#[axum::debug_handler]
pub async fn condition_end_reasons(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConceptRes>>, ApiError> {
    let service = ConditionService::new(state.cfg.clone(), state.store.clone());
    let reasons = service.end_reason_concepts()?;
    Ok(Json(reasons.iter().map(convert::concept_res).collect()))
}

// ============================================================================
// Diagnoses
// ============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DiagnosisSearch {
    /// RFC 3339 datetime or `YYYY-MM-DD`.
    pub since: Option<String>,
}

#[utoipa::path(
    get,
    path = "/patients/{uuid}/diagnoses",
    params(("uuid" = String, Path, description = "Patient uuid"), DiagnosisSearch),
    responses(
        (status = 200, description = "Diagnoses, newest first", body = [DiagnosisRes]),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn patient_diagnoses(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(search): Query<DiagnosisSearch>,
) -> Result<Json<Vec<DiagnosisRes>>, ApiError> {
    let patient = convert::uuid("uuid", &uuid)?;
    let since = convert::optional_datetime("since", search.since.as_deref())?;
    let service = DiagnosisService::new(state.cfg.clone(), state.store.clone());
    let found = service.diagnoses_for_patient(patient, since)?;
    Ok(Json(found.iter().map(convert::diagnosis_res).collect()))
}

#[utoipa::path(
    get,
    path = "/encounters/{uuid}/diagnoses",
    params(("uuid" = String, Path, description = "Encounter uuid")),
    responses(
        (status = 200, description = "First-class diagnoses of the encounter", body = [DiagnosisRes]),
        (status = 404, description = "Unknown encounter", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn encounter_diagnoses(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Vec<DiagnosisRes>>, ApiError> {
    let encounter = convert::uuid("uuid", &uuid)?;
    let service = DiagnosisService::new(state.cfg.clone(), state.store.clone());
    let found = service.diagnoses_for_encounter(encounter)?;
    Ok(Json(found.iter().map(convert::diagnosis_res).collect()))
}

#[utoipa::path(
    post,
    path = "/diagnoses/migrate",
    responses(
        (status = 200, description = "Counts of migrated and skipped obs groups", body = MigrationRes),
        (status = 401, description = "Missing or invalid API key", body = ErrorRes)
    )
)]
/// Convert every obs-encoded diagnosis into a first-class diagnosis record.
///
/// Safe to run repeatedly: groups already migrated are voided and are not picked up again.
#[axum::debug_handler]
pub async fn migrate_diagnoses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MigrationRes>, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let migrator = DiagnosisMigrator::new(state.cfg.clone(), state.store.clone());
    let report = migrator.migrate(&auditor)?;
    Ok(Json(MigrationRes {
        migrated: report.migrated,
        skipped: report.skipped,
    }))
}

// ============================================================================
// ADT
// ============================================================================

#[utoipa::path(
    post,
    path = "/adt/admit",
    request_body = AdtReq,
    responses(
        (status = 200, description = "The admission encounter", body = AdtRes),
        (status = 404, description = "Unknown patient, location or bed", body = ErrorRes),
        (status = 409, description = "Already admitted, or bed occupied", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn admit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdtReq>,
) -> Result<Json<AdtRes>, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let request = convert::adt_request(req)?;
    let service = AdtService::new(state.cfg.clone(), state.store.clone());
    let encounter = service.admit(&request, &auditor)?;
    Ok(Json(convert::adt_res(&encounter)))
}

#[utoipa::path(
    post,
    path = "/adt/discharge",
    request_body = AdtReq,
    responses(
        (status = 200, description = "The discharge encounter", body = AdtRes),
        (status = 404, description = "Unknown patient or location", body = ErrorRes),
        (status = 409, description = "Not admitted", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn discharge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdtReq>,
) -> Result<Json<AdtRes>, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let request = convert::adt_request(req)?;
    let service = AdtService::new(state.cfg.clone(), state.store.clone());
    let encounter = service.discharge(&request, &auditor)?;
    Ok(Json(convert::adt_res(&encounter)))
}

#[utoipa::path(
    post,
    path = "/adt/transfer",
    request_body = AdtReq,
    responses(
        (status = 200, description = "The transfer encounter", body = AdtRes),
        (status = 404, description = "Unknown patient, location or bed", body = ErrorRes),
        (status = 409, description = "Not admitted, or bed occupied", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdtReq>,
) -> Result<Json<AdtRes>, ApiError> {
    let auditor = convert::auditor(&headers)?;
    let request = convert::adt_request(req)?;
    let service = AdtService::new(state.cfg.clone(), state.store.clone());
    let encounter = service.transfer(&request, &auditor)?;
    Ok(Json(convert::adt_res(&encounter)))
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderSearch {
    /// `drug` or `test`; both when absent.
    #[serde(rename = "type")]
    #[param(value_type = Option<String>)]
    pub order_type: Option<OrderType>,
}

#[utoipa::path(
    get,
    path = "/patients/{uuid}/orders/active",
    params(("uuid" = String, Path, description = "Patient uuid"), OrderSearch),
    responses(
        (status = 200, description = "Active orders, oldest first", body = [OrderRes]),
        (status = 404, description = "Unknown patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn active_orders(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(search): Query<OrderSearch>,
) -> Result<Json<Vec<OrderRes>>, ApiError> {
    let patient = convert::uuid("uuid", &uuid)?;
    let service = OrderService::new(state.store.clone());
    let orders = service.active_orders(patient, search.order_type)?;
    Ok(Json(orders.iter().map(convert::order_res).collect()))
}
