//! OpenAPI document, served at `/api/docs/openapi.json`.

use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::models::{
    ArchiveDeletionResponse, ContentDeletionResponse, CreateJobRequest, FailJobRequest,
    HealthResponse, JobLogResponse,
};
use crate::domain::{
    Failure, Job, JobDetails, JobStatus, JobSummary, Metadata, Segment, Stage, WorkflowState,
};
use crate::pipeline::{ContentDeletion, PurgeProgress, PurgeState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "clipflow API",
        version = "0.1.0",
        description = "Submit video pages for ingestion, review their metadata and transcripts, and manage archived jobs.",
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:12580", description = "Local development server")
    ),
    tags(
        (name = "health", description = "Health check"),
        (name = "jobs", description = "Ingestion jobs and their lifecycle")
    ),
    paths(
        crate::api::routes::health::health_check,
        crate::api::routes::jobs::create_job,
        crate::api::routes::jobs::list_jobs,
        crate::api::routes::jobs::get_job,
        crate::api::routes::jobs::get_job_details,
        crate::api::routes::jobs::update_metadata,
        crate::api::routes::jobs::update_transcript,
        crate::api::routes::jobs::get_job_log,
        crate::api::routes::jobs::fail_job,
        crate::api::routes::jobs::delete_content,
        crate::api::routes::jobs::delete_archive,
        crate::api::routes::jobs::get_archive_operation,
    ),
    components(
        schemas(
            ApiErrorResponse,
            HealthResponse,
            CreateJobRequest,
            FailJobRequest,
            JobLogResponse,
            ContentDeletionResponse,
            ArchiveDeletionResponse,
            Job,
            JobSummary,
            JobDetails,
            Metadata,
            Segment,
            Failure,
            Stage,
            JobStatus,
            WorkflowState,
            ContentDeletion,
            PurgeProgress,
            PurgeState,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security scheme addon for Bearer JWT authentication.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_job_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in [
            "/api/jobs",
            "/api/jobs/{id}",
            "/api/jobs/{id}/metadata",
            "/api/jobs/archive",
            "/api/jobs/archive/{operation_id}",
            "/api/health",
        ] {
            assert!(paths.iter().any(|p| p == expected), "missing {expected}");
        }
        assert!(
            doc.components
                .as_ref()
                .is_some_and(|c| c.security_schemes.contains_key("bearer_auth"))
        );
    }
}
