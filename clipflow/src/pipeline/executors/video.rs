//! Video fetch stage.

use std::sync::Arc;

use async_trait::async_trait;

use super::traits::{StageContext, StageExecutor, StageOutput};
use crate::database::models::JobLogEntry;
use crate::domain::Stage;
use crate::media::MediaBackend;
use crate::{Error, Result};

/// Acquires the source video named by the committed metadata.
pub struct VideoFetcher {
    media: Arc<dyn MediaBackend>,
}

impl VideoFetcher {
    pub fn new(media: Arc<dyn MediaBackend>) -> Self {
        Self { media }
    }
}

#[async_trait]
impl StageExecutor for VideoFetcher {
    fn stage(&self) -> Stage {
        Stage::VideoFetch
    }

    fn name(&self) -> &'static str {
        "video_fetcher"
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput> {
        let metadata = ctx
            .metadata
            .as_ref()
            .ok_or_else(|| Error::stage_failed(Stage::VideoFetch, "job has no metadata"))?;

        let location = self.media.fetch_video(&metadata.youtube_id).await?;
        Ok(StageOutput {
            video_location: Some(location.clone()),
            ..Default::default()
        }
        .log(JobLogEntry::info(format!(
            "Fetched video {} to {}",
            metadata.youtube_id, location
        ))))
    }
}
