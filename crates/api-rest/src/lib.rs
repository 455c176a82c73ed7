//! # API REST
//!
//! REST API for the CDR.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (bearer claims, JSON error bodies, CORS)
//!
//! Every handler builds a [`cdr_core::CdrContext`] for the caller's session and runs one core
//! command.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod error;
pub mod extract;

use auth::Authenticated;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use cdr_core::caches::RecordState;
use cdr_core::commands::{
    CheckRecordCommand, DeleteHeadingCommand, GetDemographicsCommand, GetHeadingDetailCommand,
    GetHeadingSummaryCommand, GetPatientSynopsisCommand, MergeDiscoveryDataCommand, MergeResult,
    PostHeadingCommand, PutHeadingCommand,
};
use cdr_core::services::{Demographics, WrittenRecord};
use cdr_core::CdrState;
use error::{ApiResult, ErrorRes};
use extract::{ApiJson, ApiPath};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared by the handlers.
#[derive(Clone)]
pub struct AppState {
    cdr: CdrState,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_demographics,
        check_record,
        get_synopsis,
        get_heading_summary,
        get_heading_detail,
        post_heading,
        put_heading,
        delete_heading,
        merge_discovery_data,
    ),
    components(schemas(HealthRes, ErrorRes))
)]
struct ApiDoc;

/// Router serving every endpoint plus Swagger UI.
pub fn router(cdr: CdrState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/demographics/:patient_id", get(get_demographics))
        .route(
            "/api/patients/:patient_id/demographics",
            get(get_demographics),
        )
        .route("/api/patients/:patient_id/record", get(check_record))
        .route("/api/patients/:patient_id/synopsis", get(get_synopsis))
        .route(
            "/api/patients/:patient_id/:heading",
            get(get_heading_summary).post(post_heading),
        )
        .route(
            "/api/patients/:patient_id/:heading/:source_id",
            get(get_heading_detail)
                .put(put_heading)
                .delete(delete_heading),
        )
        .route(
            "/api/discovery/merge/:patient_id/:heading",
            post(merge_discovery_data),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState { cdr })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "CDR REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/api/patients/{patient_id}/demographics",
    params(("patient_id" = String, Path, description = "NHS number")),
    responses(
        (status = 200, description = "Patient demographics"),
        (status = 400, description = "Invalid patient id", body = ErrorRes),
        (status = 403, description = "Patient not accessible to this session", body = ErrorRes),
        (status = 404, description = "Patient unknown to discovery", body = ErrorRes)
    )
)]
/// Demographics derived from the discovery service. Also served at
/// `/api/demographics/{patient_id}`.
async fn get_demographics(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath(patient_id): ApiPath<String>,
) -> ApiResult<Json<Demographics>> {
    let ctx = state.cdr.context(session);
    let demographics = GetDemographicsCommand::new(&ctx)
        .execute(Some(&patient_id))
        .await?;
    Ok(Json(demographics))
}

#[utoipa::path(
    get,
    path = "/api/patients/{patient_id}/record",
    params(("patient_id" = String, Path, description = "NHS number")),
    responses(
        (status = 200, description = "Record state for this session"),
        (status = 400, description = "Invalid patient id", body = ErrorRes)
    )
)]
/// Load the patient's record into the session on first call and report its state.
async fn check_record(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath(patient_id): ApiPath<String>,
) -> ApiResult<Json<RecordState>> {
    let ctx = state.cdr.context(session);
    let record = CheckRecordCommand::new(&ctx)
        .execute(Some(&patient_id))
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    get,
    path = "/api/patients/{patient_id}/synopsis",
    params(("patient_id" = String, Path, description = "NHS number")),
    responses(
        (status = 200, description = "Synopsis of every enabled heading"),
        (status = 400, description = "Invalid patient id", body = ErrorRes)
    )
)]
async fn get_synopsis(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath(patient_id): ApiPath<String>,
) -> ApiResult<Json<Value>> {
    let ctx = state.cdr.context(session);
    let synopsis = GetPatientSynopsisCommand::new(&ctx)
        .execute(Some(&patient_id))
        .await?;
    Ok(Json(synopsis))
}

#[utoipa::path(
    get,
    path = "/api/patients/{patient_id}/{heading}",
    params(
        ("patient_id" = String, Path, description = "NHS number"),
        ("heading" = String, Path, description = "Heading name")
    ),
    responses(
        (status = 200, description = "Summary of the heading's records, newest first"),
        (status = 400, description = "Invalid patient id or heading", body = ErrorRes)
    )
)]
async fn get_heading_summary(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath((patient_id, heading)): ApiPath<(String, String)>,
) -> ApiResult<Json<Vec<Value>>> {
    let ctx = state.cdr.context(session);
    let summary = GetHeadingSummaryCommand::new(&ctx)
        .execute(Some(&patient_id), Some(&heading))
        .await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/api/patients/{patient_id}/{heading}/{source_id}",
    params(
        ("patient_id" = String, Path, description = "NHS number"),
        ("heading" = String, Path, description = "Heading name"),
        ("source_id" = String, Path, description = "Record source id")
    ),
    responses(
        (status = 200, description = "Record detail"),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 404, description = "Record not found", body = ErrorRes)
    )
)]
async fn get_heading_detail(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath((patient_id, heading, source_id)): ApiPath<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let ctx = state.cdr.context(session);
    let detail = GetHeadingDetailCommand::new(&ctx)
        .execute(Some(&patient_id), Some(&heading), Some(&source_id))
        .await?;
    Ok(Json(detail))
}

#[utoipa::path(
    post,
    path = "/api/patients/{patient_id}/{heading}",
    params(
        ("patient_id" = String, Path, description = "NHS number"),
        ("heading" = String, Path, description = "Heading name")
    ),
    responses(
        (status = 200, description = "Record created on the default host"),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 422, description = "Heading not writable or empty payload", body = ErrorRes)
    )
)]
async fn post_heading(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath((patient_id, heading)): ApiPath<(String, String)>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Json<WrittenRecord>> {
    let ctx = state.cdr.context(session);
    let written = PostHeadingCommand::new(&ctx)
        .execute(Some(&patient_id), Some(&heading), &payload)
        .await?;
    Ok(Json(written))
}

#[utoipa::path(
    put,
    path = "/api/patients/{patient_id}/{heading}/{source_id}",
    params(
        ("patient_id" = String, Path, description = "NHS number"),
        ("heading" = String, Path, description = "Heading name"),
        ("source_id" = String, Path, description = "Record source id")
    ),
    responses(
        (status = 200, description = "Record replaced"),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 404, description = "Record not found", body = ErrorRes)
    )
)]
async fn put_heading(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath((patient_id, heading, source_id)): ApiPath<(String, String, String)>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Json<WrittenRecord>> {
    let ctx = state.cdr.context(session);
    let written = PutHeadingCommand::new(&ctx)
        .execute(
            Some(&patient_id),
            Some(&heading),
            Some(&source_id),
            &payload,
        )
        .await?;
    Ok(Json(written))
}

#[utoipa::path(
    delete,
    path = "/api/patients/{patient_id}/{heading}/{source_id}",
    params(
        ("patient_id" = String, Path, description = "NHS number"),
        ("heading" = String, Path, description = "Heading name"),
        ("source_id" = String, Path, description = "Record source id")
    ),
    responses(
        (status = 200, description = "Record deleted"),
        (status = 403, description = "Session may not delete records", body = ErrorRes),
        (status = 404, description = "Record not found", body = ErrorRes)
    )
)]
async fn delete_heading(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath((patient_id, heading, source_id)): ApiPath<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let ctx = state.cdr.context(session);
    let deleted = DeleteHeadingCommand::new(&ctx)
        .execute(Some(&patient_id), Some(&heading), Some(&source_id))
        .await?;
    Ok(Json(deleted))
}

#[utoipa::path(
    post,
    path = "/api/discovery/merge/{patient_id}/{heading}",
    params(
        ("patient_id" = String, Path, description = "NHS number"),
        ("heading" = String, Path, description = "Heading name")
    ),
    responses(
        (status = 200, description = "Whether the heading should be reloaded"),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 502, description = "Discovery or openEHR failure", body = ErrorRes)
    )
)]
/// Merge discovery data for one heading into the default host.
async fn merge_discovery_data(
    State(state): State<AppState>,
    Authenticated(session): Authenticated,
    ApiPath((patient_id, heading)): ApiPath<(String, String)>,
) -> ApiResult<Json<MergeResult>> {
    let ctx = state.cdr.context(session);
    let result = MergeDiscoveryDataCommand::new(&ctx)
        .execute(Some(&patient_id), Some(&heading))
        .await?;
    Ok(Json(result))
}
