//! Video storage and clip rendering backend.
//!
//! Download and transcoding happen outside this crate; the pipeline only
//! talks to a [`MediaBackend`]. [`LocalMediaBackend`] is a filesystem stand-in
//! that records placeholder files, enough to run the workflow end to end.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// One clip to cut out of a fetched video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipRequest<'a> {
    pub youtube_id: &'a str,
    pub segment_hash: &'a str,
    pub start_time: f64,
    pub end_time: f64,
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Acquire the source video; returns where it is stored.
    async fn fetch_video(&self, youtube_id: &str) -> Result<String>;

    /// Render one clip from a fetched video; returns the clip's storage key.
    async fn render_clip(&self, video_location: &str, clip: &ClipRequest<'_>) -> Result<String>;

    /// Remove every clip derived from a video; returns how many were removed.
    async fn delete_clips(&self, youtube_id: &str) -> Result<u64>;
}

/// Media directories for the local backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_video_dir")]
    pub video_dir: PathBuf,
    #[serde(default = "default_clip_dir")]
    pub clip_dir: PathBuf,
}

fn default_video_dir() -> PathBuf {
    PathBuf::from("media/videos")
}

fn default_clip_dir() -> PathBuf {
    PathBuf::from("media/clips")
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_dir: default_video_dir(),
            clip_dir: default_clip_dir(),
        }
    }
}

impl MediaConfig {
    /// Read `MEDIA_DIR` and `CLIP_DIR`, falling back to the defaults.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("MEDIA_DIR") {
            config.video_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CLIP_DIR") {
            config.clip_dir = PathBuf::from(dir);
        }
        config
    }
}

/// Filesystem-backed media store.
pub struct LocalMediaBackend {
    config: MediaConfig,
}

impl LocalMediaBackend {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub fn clip_path(&self, youtube_id: &str, segment_hash: &str) -> PathBuf {
        self.config
            .clip_dir
            .join(format!("{youtube_id}_{segment_hash}.mp4"))
    }

    fn video_path(&self, youtube_id: &str) -> PathBuf {
        self.config.video_dir.join(format!("{youtube_id}.mp4"))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl MediaBackend for LocalMediaBackend {
    async fn fetch_video(&self, youtube_id: &str) -> Result<String> {
        let path = self.video_path(youtube_id);
        if tokio::fs::try_exists(&path).await? {
            debug!(youtube_id, path = %path.display(), "Video already cached");
            return Ok(display(&path));
        }
        tokio::fs::create_dir_all(&self.config.video_dir).await?;
        tokio::fs::write(
            &path,
            format!("https://www.youtube.com/watch?v={youtube_id}\n"),
        )
        .await?;
        Ok(display(&path))
    }

    async fn render_clip(&self, video_location: &str, clip: &ClipRequest<'_>) -> Result<String> {
        tokio::fs::create_dir_all(&self.config.clip_dir).await?;
        let path = self.clip_path(clip.youtube_id, clip.segment_hash);
        let manifest = serde_json::json!({
            "source": video_location,
            "start_time": clip.start_time,
            "end_time": clip.end_time,
        });
        tokio::fs::write(&path, serde_json::to_vec(&manifest)?).await?;
        Ok(path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| display(&path)))
    }

    async fn delete_clips(&self, youtube_id: &str) -> Result<u64> {
        let mut entries = match tokio::fs::read_dir(&self.config.clip_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{youtube_id}_");
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        debug!(youtube_id, removed, "Deleted clips");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend(dir: &TempDir) -> LocalMediaBackend {
        LocalMediaBackend::new(MediaConfig {
            video_dir: dir.path().join("videos"),
            clip_dir: dir.path().join("clips"),
        })
    }

    #[tokio::test]
    async fn test_fetch_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let media = backend(&dir);
        let first = media.fetch_video("abc").await.unwrap();
        let second = media.fetch_video("abc").await.unwrap();
        assert_eq!(first, second);
        assert!(Path::new(&first).exists());
    }

    #[tokio::test]
    async fn test_delete_clips_by_prefix() {
        let dir = TempDir::new().unwrap();
        let media = backend(&dir);
        let video = media.fetch_video("abc").await.unwrap();

        for hash in ["h1", "h2"] {
            let key = media
                .render_clip(
                    &video,
                    &ClipRequest {
                        youtube_id: "abc",
                        segment_hash: hash,
                        start_time: 0.0,
                        end_time: 1.0,
                    },
                )
                .await
                .unwrap();
            assert_eq!(key, format!("abc_{hash}.mp4"));
        }
        media
            .render_clip(
                &video,
                &ClipRequest {
                    youtube_id: "other",
                    segment_hash: "h1",
                    start_time: 0.0,
                    end_time: 1.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(media.delete_clips("abc").await.unwrap(), 2);
        assert_eq!(media.delete_clips("abc").await.unwrap(), 0);
        assert!(media.clip_path("other", "h1").exists());
    }

    #[tokio::test]
    async fn test_delete_without_clip_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(backend(&dir).delete_clips("abc").await.unwrap(), 0);
    }
}
