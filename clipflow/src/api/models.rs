//! Request and response bodies of the REST API.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::pipeline::ContentDeletion;

/// Default page size of job listings.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    /// Page to ingest (http or https).
    pub url: String,
    /// Submitter, notified about review and completion.
    pub user_email: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobListParams {
    /// Only jobs submitted by this address.
    pub user_email: Option<String>,
    /// Maximum number of jobs (default 100, at most 1000).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FailJobRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobLogResponse {
    /// Log lines, oldest first, separated by newlines.
    pub log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentDeletionResponse {
    pub job_id: i64,
    pub outcome: ContentDeletion,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArchiveDeletionResponse {
    /// Archived jobs targeted by the purge.
    pub deleted_jobs: u64,
    /// Poll `GET /api/jobs/archive/{operation_id}` for progress.
    pub operation_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// JSON body extractor whose rejections use the API error format (422).
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::validation(rejection.body_text())
}

/// Query string extractor whose rejections use the API error format (422).
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::validation(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_response_shape() {
        let response = ArchiveDeletionResponse {
            deleted_jobs: 10,
            operation_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["deleted_jobs"], 10);
        assert!(json["operation_id"].is_string());
    }

    #[test]
    fn test_content_deletion_outcome_is_snake_case() {
        let response = ContentDeletionResponse {
            job_id: 7,
            outcome: ContentDeletion::AlreadyDeleted,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["outcome"], "already_deleted");
    }
}
