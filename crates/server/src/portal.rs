//! JSON portal routes for provider-facing claims data.
//!
//! Endpoints:
//! - `GET  /api/v1/pws/{pwsid}`                                — provider overview (totals + sources)
//! - `GET  /api/v1/pws/{pwsid}/activity`                       — audit feed for one provider
//! - `GET  /api/v1/activity`                                   — recent audit feed across providers
//! - `POST /api/v1/pws/{pwsid}/recompute`                      — re-derive every source and totals
//! - `GET  /api/v1/pws/{pwsid}/source/{source_name}`           — reconciled source view
//! - `POST /api/v1/pws/{pwsid}/source/{source_name}/pfas-result`       — submit an analytical result
//! - `POST /api/v1/pws/{pwsid}/source/{source_name}/max-flow`          — submit a verified max flow
//! - `POST /api/v1/pws/{pwsid}/source/{source_name}/annual-production` — submit one production year
//! - `POST /api/v1/pws/{pwsid}/source/{source_name}/evidence/{filename}` — store a supporting document
//! - `POST /api/v1/pws/{pwsid}/contact`                         — relay a message to the claims team

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use aquaclaim_core::domain::observation::{PwsId, SourceName};
use aquaclaim_core::domain::source::{PwsTotals, SourceMetrics};
use aquaclaim_core::errors::ApplicationError;
use aquaclaim_core::flows::UpdateState;
use aquaclaim_core::validation::{
    AnnualProductionPayload, FieldErrors, MaxFlowPayload, PfasResultPayload,
};
use aquaclaim_core::AuditEvent;
use aquaclaim_db::UpdateService;

use crate::bootstrap::Repositories;
use crate::evidence::EvidenceClient;
use crate::mailer::Mailer;
use crate::presentation::{build_source_view, SourceView};

#[derive(Clone)]
pub struct PortalState {
    repositories: Repositories,
    service: Arc<UpdateService>,
    evidence: Arc<EvidenceClient>,
    mailer: Arc<Mailer>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct PortalError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub record_id: String,
    pub state: UpdateState,
    pub correlation_id: String,
    pub metrics: Option<SourceMetrics>,
}

#[derive(Debug, Serialize)]
pub struct PwsView {
    pub pwsid: String,
    pub pws_name: Option<String>,
    pub totals: Option<PwsTotals>,
    pub submit_date: Option<chrono::DateTime<chrono::Utc>>,
    pub sources: Vec<SourceSummary>,
}

#[derive(Debug, Serialize)]
pub struct SourceSummary {
    pub source_name: String,
    pub source_type: Option<String>,
    pub source_status: Option<String>,
    pub pfas_score: Option<f64>,
    pub all_nds: Option<bool>,
    pub gfe_total: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub pwsid: String,
    pub sources_recomputed: usize,
}

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub path: String,
    pub size_bytes: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct ContactPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub pwsid: String,
    pub delivered: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ActivityQuery {
    pub limit: Option<u32>,
}

const DEFAULT_ACTIVITY_LIMIT: u32 = 50;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(
    repositories: Repositories,
    service: Arc<UpdateService>,
    evidence: Arc<EvidenceClient>,
    mailer: Arc<Mailer>,
) -> Router {
    Router::new()
        .route("/api/v1/pws/{pwsid}", get(get_pws))
        .route("/api/v1/pws/{pwsid}/activity", get(get_pws_activity))
        .route("/api/v1/activity", get(get_activity))
        .route("/api/v1/pws/{pwsid}/recompute", post(recompute_pws))
        .route("/api/v1/pws/{pwsid}/source/{source_name}", get(get_source))
        .route(
            "/api/v1/pws/{pwsid}/source/{source_name}/pfas-result",
            post(submit_pfas_result),
        )
        .route("/api/v1/pws/{pwsid}/source/{source_name}/max-flow", post(submit_max_flow))
        .route(
            "/api/v1/pws/{pwsid}/source/{source_name}/annual-production",
            post(submit_annual_production),
        )
        .route(
            "/api/v1/pws/{pwsid}/source/{source_name}/evidence/{filename}",
            post(upload_evidence),
        )
        .route("/api/v1/pws/{pwsid}/contact", post(submit_contact))
        .with_state(PortalState { repositories, service, evidence, mailer })
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_response(error: ApplicationError) -> (StatusCode, Json<PortalError>) {
    let (status, field_errors) = match &error {
        ApplicationError::Validation(errors) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Some(errors.0.clone()))
        }
        ApplicationError::Domain(_) => (StatusCode::BAD_REQUEST, None),
        ApplicationError::Persistence(_)
        | ApplicationError::Integration(_)
        | ApplicationError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(event_name = "portal.request_failed", error = %error, "portal request failed");
    }

    (status, Json(PortalError { error: error.user_message(), field_errors }))
}

fn not_found(what: &str) -> (StatusCode, Json<PortalError>) {
    (
        StatusCode::NOT_FOUND,
        Json(PortalError { error: format!("{what} not found"), field_errors: None }),
    )
}

// ---------------------------------------------------------------------------
// View handlers
// ---------------------------------------------------------------------------

async fn get_pws(
    Path(pwsid): Path<String>,
    State(state): State<PortalState>,
) -> Result<Json<PwsView>, (StatusCode, Json<PortalError>)> {
    let pwsid = PwsId(pwsid);
    let pws = state
        .repositories
        .systems
        .find(&pwsid)
        .await
        .map_err(|e| error_response(ApplicationError::Persistence(e.to_string())))?
        .ok_or_else(|| not_found("water system"))?;

    let sources = state
        .repositories
        .sources
        .list_for_pws(&pwsid)
        .await
        .map_err(|e| error_response(ApplicationError::Persistence(e.to_string())))?;

    let sources = sources
        .into_iter()
        .map(|source| SourceSummary {
            source_name: source.source_name.0,
            source_type: source.source_type,
            source_status: source.source_status,
            pfas_score: source.metrics.as_ref().map(|m| m.pfas_score),
            all_nds: source.metrics.as_ref().map(|m| m.all_nds),
            gfe_total: source.metrics.as_ref().map(|m| m.gfe_total),
        })
        .collect();

    Ok(Json(PwsView {
        pwsid: pws.pwsid.0,
        pws_name: pws.pws_name,
        totals: pws.totals,
        submit_date: pws.submit_date,
        sources,
    }))
}

async fn get_source(
    Path((pwsid, source_name)): Path<(String, String)>,
    State(state): State<PortalState>,
) -> Result<Json<SourceView>, (StatusCode, Json<PortalError>)> {
    let pwsid = PwsId(pwsid);
    let source_name = SourceName(source_name);

    let source = state
        .repositories
        .sources
        .find(&pwsid, &source_name)
        .await
        .map_err(|e| error_response(ApplicationError::Persistence(e.to_string())))?
        .ok_or_else(|| not_found("water source"))?;

    let pfas = state
        .repositories
        .pfas_results
        .list_for_source(&pwsid, &source_name)
        .await
        .map_err(|e| error_response(ApplicationError::Persistence(e.to_string())))?;
    let flows = state
        .repositories
        .flow_rates
        .list_for_source(&pwsid, &source_name)
        .await
        .map_err(|e| error_response(ApplicationError::Persistence(e.to_string())))?;

    Ok(Json(build_source_view(&source, &pfas, &flows)))
}

async fn get_activity(
    Query(query): Query<ActivityQuery>,
    State(state): State<PortalState>,
) -> Result<Json<Vec<AuditEvent>>, (StatusCode, Json<PortalError>)> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    let events = state
        .repositories
        .audit
        .list_recent(limit)
        .await
        .map_err(|e| error_response(ApplicationError::Persistence(e.to_string())))?;
    Ok(Json(events))
}

async fn get_pws_activity(
    Path(pwsid): Path<String>,
    Query(query): Query<ActivityQuery>,
    State(state): State<PortalState>,
) -> Result<Json<Vec<AuditEvent>>, (StatusCode, Json<PortalError>)> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    let events = state
        .repositories
        .audit
        .list_for_pws(&PwsId(pwsid), limit)
        .await
        .map_err(|e| error_response(ApplicationError::Persistence(e.to_string())))?;
    Ok(Json(events))
}

// ---------------------------------------------------------------------------
// Submission handlers
// ---------------------------------------------------------------------------

async fn submit_pfas_result(
    Path((pwsid, source_name)): Path<(String, String)>,
    State(state): State<PortalState>,
    Json(payload): Json<PfasResultPayload>,
) -> Result<(StatusCode, Json<SubmissionResponse>), (StatusCode, Json<PortalError>)> {
    let pwsid = PwsId(pwsid);
    let source_name = SourceName(source_name);

    let receipt = state
        .service
        .submit_pfas_result(&pwsid, &source_name, payload)
        .await
        .map_err(error_response)?;

    notify_claims_team(&state, &pwsid, &source_name, "PFAS result");
    Ok((StatusCode::CREATED, Json(submission_response(receipt))))
}

async fn submit_max_flow(
    Path((pwsid, source_name)): Path<(String, String)>,
    State(state): State<PortalState>,
    Json(payload): Json<MaxFlowPayload>,
) -> Result<(StatusCode, Json<SubmissionResponse>), (StatusCode, Json<PortalError>)> {
    let pwsid = PwsId(pwsid);
    let source_name = SourceName(source_name);

    let receipt = state
        .service
        .submit_max_flow(&pwsid, &source_name, payload)
        .await
        .map_err(error_response)?;

    notify_claims_team(&state, &pwsid, &source_name, "verified max flow");
    Ok((StatusCode::CREATED, Json(submission_response(receipt))))
}

async fn submit_annual_production(
    Path((pwsid, source_name)): Path<(String, String)>,
    State(state): State<PortalState>,
    Json(payload): Json<AnnualProductionPayload>,
) -> Result<(StatusCode, Json<SubmissionResponse>), (StatusCode, Json<PortalError>)> {
    let pwsid = PwsId(pwsid);
    let source_name = SourceName(source_name);

    let receipt = state
        .service
        .submit_annual_production(&pwsid, &source_name, payload)
        .await
        .map_err(error_response)?;

    notify_claims_team(&state, &pwsid, &source_name, "annual production");
    Ok((StatusCode::CREATED, Json(submission_response(receipt))))
}

async fn recompute_pws(
    Path(pwsid): Path<String>,
    State(state): State<PortalState>,
) -> Result<Json<RecomputeResponse>, (StatusCode, Json<PortalError>)> {
    let pwsid = PwsId(pwsid);
    let sources_recomputed =
        state.service.recompute_pws(&pwsid).await.map_err(error_response)?;

    info!(
        event_name = "portal.recompute_complete",
        pwsid = %pwsid.0,
        sources_recomputed,
        "provider metrics recomputed"
    );
    Ok(Json(RecomputeResponse { pwsid: pwsid.0, sources_recomputed }))
}

async fn upload_evidence(
    Path((pwsid, source_name, filename)): Path<(String, String, String)>,
    State(state): State<PortalState>,
    body: Bytes,
) -> Result<(StatusCode, Json<EvidenceResponse>), (StatusCode, Json<PortalError>)> {
    let relative_path = format!("{pwsid}/{source_name}/{filename}");

    match state.evidence.upload(&relative_path, body.to_vec()).await {
        Ok(receipt) => Ok((
            StatusCode::CREATED,
            Json(EvidenceResponse { path: receipt.path, size_bytes: receipt.size_bytes }),
        )),
        Err(error) => {
            error!(
                event_name = "evidence.upload_failed",
                path = %relative_path,
                error = %error,
                "supporting document upload failed"
            );
            Err(error_response(ApplicationError::Integration(error.to_string())))
        }
    }
}

/// Contact messages never touch claim data, so relay failures surface to the
/// caller as an upstream error rather than a server fault.
async fn submit_contact(
    Path(pwsid): Path<String>,
    State(state): State<PortalState>,
    Json(payload): Json<ContactPayload>,
) -> Result<(StatusCode, Json<ContactResponse>), (StatusCode, Json<PortalError>)> {
    let pwsid = PwsId(pwsid);

    let mut errors = FieldErrors::default();
    if payload.name.trim().is_empty() {
        errors.push("name", "Please provide your name");
    }
    if payload.email.trim().is_empty() {
        errors.push("email", "Please provide a reply address");
    } else if !payload.email.contains('@') {
        errors.push("email", "Please provide a valid reply address");
    }
    if payload.message.trim().is_empty() {
        errors.push("message", "Please provide a message");
    }
    if !errors.is_empty() {
        return Err(error_response(ApplicationError::Validation(errors)));
    }

    state
        .mailer
        .send_contact_message(&pwsid, payload.name.trim(), payload.email.trim(), &payload.message)
        .await
        .map_err(|error| {
            error!(
                event_name = "mail.contact_failed",
                pwsid = %pwsid.0,
                error = %error,
                "contact message relay failed"
            );
            (
                StatusCode::BAD_GATEWAY,
                Json(PortalError {
                    error: "The message could not be delivered. Please try again later.".to_owned(),
                    field_errors: None,
                }),
            )
        })?;

    Ok((StatusCode::ACCEPTED, Json(ContactResponse { pwsid: pwsid.0, delivered: true })))
}

fn submission_response(receipt: aquaclaim_db::SubmissionReceipt) -> SubmissionResponse {
    SubmissionResponse {
        record_id: receipt.record_id.0,
        state: receipt.state,
        correlation_id: receipt.correlation_id,
        metrics: receipt.metrics,
    }
}

/// Fire-and-forget: the acknowledgment mail never holds up the response.
fn notify_claims_team(state: &PortalState, pwsid: &PwsId, source_name: &SourceName, kind: &str) {
    let mailer = state.mailer.clone();
    let pwsid = pwsid.clone();
    let source_name = source_name.clone();
    let kind = kind.to_owned();
    tokio::spawn(async move {
        if let Err(error) = mailer.send_submission_notice(&pwsid, &source_name, &kind).await {
            error!(
                event_name = "mail.notice_failed",
                pwsid = %pwsid.0,
                error = %error,
                "claims team notification failed"
            );
        }
    });
}
