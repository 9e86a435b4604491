//! Job routes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/jobs` | Submit a URL for ingestion |
//! | GET | `/api/jobs` | List job summaries, newest first |
//! | GET | `/api/jobs/{id}` | Get a job |
//! | GET | `/api/jobs/{id}/details` | Get a job with metadata and transcript |
//! | PUT | `/api/jobs/{id}/metadata` | Commit or correct metadata |
//! | PUT | `/api/jobs/{id}/transcript` | Replace the transcript |
//! | GET | `/api/jobs/{id}/log` | Get the execution log |
//! | POST | `/api/jobs/{id}/fail` | Force a job to fail |
//! | DELETE | `/api/jobs/{id}/content` | Delete a job's content |
//! | DELETE | `/api/jobs/archive` | Purge every archived job |
//! | GET | `/api/jobs/archive/{operation_id}` | Poll a purge |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiErrorResponse, ApiResult};
use crate::api::models::{
    ApiJson, ApiQuery, ArchiveDeletionResponse, ContentDeletionResponse, CreateJobRequest,
    DEFAULT_LIST_LIMIT, FailJobRequest, JobListParams, JobLogResponse,
};
use crate::api::server::AppState;
use crate::database::repositories::{JobFilter, MAX_LIST_LIMIT};
use crate::domain::{Job, JobDetails, JobSummary, Metadata, Segment};
use crate::pipeline::{LifecycleManager, PurgeProgress, WorkflowOrchestrator};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/archive", delete(delete_archive))
        .route("/archive/{operation_id}", get(get_archive_operation))
        .route("/{id}", get(get_job))
        .route("/{id}/details", get(get_job_details))
        .route("/{id}/metadata", put(update_metadata))
        .route("/{id}/transcript", put(update_transcript))
        .route("/{id}/log", get(get_job_log))
        .route("/{id}/fail", post(fail_job))
        .route("/{id}/content", delete(delete_content))
}

fn orchestrator(state: &AppState) -> ApiResult<&Arc<WorkflowOrchestrator>> {
    state
        .orchestrator
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Workflow service not available"))
}

fn lifecycle(state: &AppState) -> ApiResult<&Arc<LifecycleManager>> {
    state
        .lifecycle
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Lifecycle service not available"))
}

#[utoipa::path(
    post,
    path = "/api/jobs",
    tag = "jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created and queued", body = Job),
        (status = 422, description = "Invalid url or email", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_job(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let job = orchestrator(&state)?
        .submit(&request.url, &request.user_email)
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

#[utoipa::path(
    get,
    path = "/api/jobs",
    tag = "jobs",
    params(JobListParams),
    responses(
        (status = 200, description = "Job summaries, newest first", body = Vec<JobSummary>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<JobListParams>,
) -> ApiResult<Json<Vec<JobSummary>>> {
    let filter = JobFilter {
        user_email: params.user_email.filter(|e| !e.trim().is_empty()),
        limit: Some(
            params
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
        ),
    };
    let jobs = orchestrator(&state)?.list_jobs(&filter).await?;
    Ok(Json(jobs))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    tag = "jobs",
    params(("id" = i64, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job record", body = Job),
        (status = 404, description = "Job not found", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Job>> {
    Ok(Json(orchestrator(&state)?.get_job(id).await?))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}/details",
    tag = "jobs",
    params(("id" = i64, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job with metadata and transcript", body = JobDetails),
        (status = 404, description = "Job not found", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_job_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobDetails>> {
    Ok(Json(orchestrator(&state)?.job_details(id).await?))
}

/// Commit metadata at the review checkpoint, or correct it while the job is idle.
#[utoipa::path(
    put,
    path = "/api/jobs/{id}/metadata",
    tag = "jobs",
    params(("id" = i64, Path, description = "Job ID")),
    request_body = Metadata,
    responses(
        (status = 200, description = "Updated job", body = JobDetails),
        (status = 404, description = "Job not found", body = ApiErrorResponse),
        (status = 409, description = "Job is busy or no longer editable", body = ApiErrorResponse),
        (status = 422, description = "Invalid metadata", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_metadata(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(metadata): ApiJson<Metadata>,
) -> ApiResult<Json<JobDetails>> {
    Ok(Json(
        orchestrator(&state)?.update_metadata(id, metadata).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/jobs/{id}/transcript",
    tag = "jobs",
    params(("id" = i64, Path, description = "Job ID")),
    request_body = Vec<Segment>,
    responses(
        (status = 200, description = "Updated job", body = JobDetails),
        (status = 404, description = "Job not found", body = ApiErrorResponse),
        (status = 409, description = "Job is busy or deleted", body = ApiErrorResponse),
        (status = 422, description = "Invalid transcript", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_transcript(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(segments): ApiJson<Vec<Segment>>,
) -> ApiResult<Json<JobDetails>> {
    Ok(Json(
        orchestrator(&state)?.update_transcript(id, segments).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}/log",
    tag = "jobs",
    params(("id" = i64, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Execution log", body = JobLogResponse),
        (status = 404, description = "Job not found", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_job_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobLogResponse>> {
    let log = orchestrator(&state)?.job_log(id).await?;
    Ok(Json(JobLogResponse { log }))
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/fail",
    tag = "jobs",
    params(("id" = i64, Path, description = "Job ID")),
    request_body = FailJobRequest,
    responses(
        (status = 200, description = "Job failed", body = Job),
        (status = 404, description = "Job not found", body = ApiErrorResponse),
        (status = 409, description = "Job already terminal", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn fail_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<FailJobRequest>,
) -> ApiResult<Json<Job>> {
    Ok(Json(
        orchestrator(&state)?.force_fail(id, &request.reason).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/jobs/{id}/content",
    tag = "jobs",
    params(("id" = i64, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Content deleted, or already deleted", body = ContentDeletionResponse),
        (status = 404, description = "Job not found", body = ApiErrorResponse),
        (status = 409, description = "A stage is running", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_content(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ContentDeletionResponse>> {
    let outcome = lifecycle(&state)?.delete_content(id).await?;
    Ok(Json(ContentDeletionResponse { job_id: id, outcome }))
}

/// Start purging every completed, failed or deleted job.
#[utoipa::path(
    delete,
    path = "/api/jobs/archive",
    tag = "jobs",
    responses(
        (status = 202, description = "Purge started", body = ArchiveDeletionResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_archive(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<ArchiveDeletionResponse>)> {
    let started = lifecycle(&state)?.delete_archive().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ArchiveDeletionResponse {
            deleted_jobs: started.total,
            operation_id: started.operation_id,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/jobs/archive/{operation_id}",
    tag = "jobs",
    params(("operation_id" = Uuid, Path, description = "Purge operation ID")),
    responses(
        (status = 200, description = "Purge progress", body = PurgeProgress),
        (status = 404, description = "Unknown operation", body = ApiErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_archive_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<Uuid>,
) -> ApiResult<Json<PurgeProgress>> {
    Ok(Json(lifecycle(&state)?.purge_status(operation_id)?))
}
