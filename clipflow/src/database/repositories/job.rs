//! Job repository.
//!
//! Every state change is a conditional update guarded by the state the caller
//! last observed, executed inside an immediate transaction together with the
//! artifacts and log lines it carries. A caller whose view of the job is stale
//! gets `Ok(false)` and nothing is written.

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::database::models::{
    JobDbModel, JobLogDbModel, JobLogEntry, MetadataDbModel, SegmentDbModel,
};
use crate::database::retry::retry_on_busy;
use crate::database::time::now_ms;
use crate::database::{DbPool, WritePool, begin_immediate};
use crate::domain::{Failure, JobStatus, Metadata, Segment, WorkflowState};
use crate::{Error, Result};

/// Upper bound on a single job listing.
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub user_email: Option<String>,
    pub limit: Option<u32>,
}

/// One atomic workflow step: the state change and everything it writes.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub job_id: i64,
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub html_fetched: bool,
    pub video_fetched: bool,
    pub metadata_committed: bool,
    pub failure: Option<Failure>,
    pub metadata: Option<Metadata>,
    pub segments: Option<Vec<Segment>>,
    pub video_location: Option<String>,
    /// Remove metadata, transcript and log lines before writing `logs`.
    pub purge_content: bool,
    pub logs: Vec<JobLogEntry>,
}

impl StateTransition {
    pub fn new(job_id: i64, from: WorkflowState, to: WorkflowState) -> Self {
        Self {
            job_id,
            from,
            to,
            html_fetched: false,
            video_fetched: false,
            metadata_committed: false,
            failure: None,
            metadata: None,
            segments: None,
            video_location: None,
            purge_content: false,
            logs: Vec::new(),
        }
    }

    /// Move a non-terminal job to `failed`.
    pub fn fail(job_id: i64, from: WorkflowState, failure: Failure) -> Self {
        Self::new(job_id, from, WorkflowState::Failed).with_failure(failure)
    }

    pub fn with_html_fetched(mut self) -> Self {
        self.html_fetched = true;
        self
    }

    pub fn with_video_fetched(mut self, location: impl Into<String>) -> Self {
        self.video_fetched = true;
        self.video_location = Some(location.into());
        self
    }

    pub fn with_metadata_committed(mut self) -> Self {
        self.metadata_committed = true;
        self
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_segments(mut self, segments: Vec<Segment>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn with_purged_content(mut self) -> Self {
        self.purge_content = true;
        self
    }

    pub fn with_log(mut self, entry: JobLogEntry) -> Self {
        self.logs.push(entry);
        self
    }

    pub fn with_logs(mut self, entries: impl IntoIterator<Item = JobLogEntry>) -> Self {
        self.logs.extend(entries);
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.from.can_transition_to(self.to) {
            return Err(Error::invalid_transition(self.from, self.to));
        }
        if self.to == WorkflowState::Failed && self.failure.is_none() {
            return Err(Error::validation("a failed transition needs a failure reason"));
        }
        Ok(())
    }
}

/// Content change that leaves the workflow state where it is.
#[derive(Debug, Clone)]
pub struct ContentEdit {
    pub job_id: i64,
    /// The edit applies only while the job is still in this state.
    pub expected: WorkflowState,
    pub metadata: Option<Metadata>,
    pub segments: Option<Vec<Segment>>,
    pub logs: Vec<JobLogEntry>,
}

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_job(&self, url: &str, user_email: &str) -> Result<JobDbModel>;
    async fn get_job(&self, id: i64) -> Result<JobDbModel>;
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobDbModel>>;
    async fn list_jobs_in_states(&self, states: &[WorkflowState]) -> Result<Vec<JobDbModel>>;
    async fn list_archived_job_ids(&self) -> Result<Vec<i64>>;
    async fn count_archived_jobs(&self) -> Result<u64>;

    /// Apply one transition; `Ok(false)` when the job left `from` meanwhile.
    async fn apply_transition(&self, transition: &StateTransition) -> Result<bool>;
    /// Apply consecutive transitions of one job in a single transaction.
    async fn apply_transitions(&self, transitions: &[StateTransition]) -> Result<bool>;
    async fn apply_content_edit(&self, edit: &ContentEdit) -> Result<bool>;
    async fn delete_job(&self, id: i64) -> Result<bool>;

    async fn get_metadata(&self, job_id: i64) -> Result<Option<MetadataDbModel>>;
    async fn get_segments(&self, job_id: i64) -> Result<Vec<SegmentDbModel>>;

    async fn append_log(&self, job_id: i64, entry: &JobLogEntry) -> Result<()>;
    async fn get_logs(&self, job_id: i64) -> Result<Vec<JobLogDbModel>>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: DbPool,
    write_pool: WritePool,
}

impl SqlxJobRepository {
    pub fn new(pool: DbPool, write_pool: WritePool) -> Self {
        Self { pool, write_pool }
    }

    async fn apply_transitions_once(&self, transitions: &[StateTransition]) -> Result<bool> {
        let mut tx = begin_immediate(&self.write_pool).await?;
        for transition in transitions {
            if !write_transition(&mut tx, transition).await? {
                tx.rollback().await?;
                return Ok(false);
            }
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn apply_content_edit_once(&self, edit: &ContentEdit) -> Result<bool> {
        let mut tx = begin_immediate(&self.write_pool).await?;
        let now = now_ms();
        let guarded = sqlx::query(
            "UPDATE ingest_job SET updated_at = ? WHERE id = ? AND detailed_workflow_state = ?",
        )
        .bind(now)
        .bind(edit.job_id)
        .bind(edit.expected.as_str())
        .execute(&mut *tx)
        .await?;
        if guarded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(metadata) = &edit.metadata {
            upsert_metadata(&mut tx, edit.job_id, metadata, now).await?;
        }
        if let Some(segments) = &edit.segments {
            replace_segments(&mut tx, edit.job_id, segments).await?;
        }
        insert_logs(&mut tx, edit.job_id, &edit.logs).await?;
        tx.commit().await?;
        Ok(true)
    }
}

async fn write_transition(conn: &mut SqliteConnection, t: &StateTransition) -> Result<bool> {
    t.validate()?;
    let now = now_ms();
    let finished = matches!(t.to, WorkflowState::Completed | WorkflowState::Failed);
    let result = sqlx::query(
        r#"
        UPDATE ingest_job SET
            detailed_workflow_state = ?,
            html_fetch_success = html_fetch_success OR ?,
            video_fetch_success = video_fetch_success OR ?,
            metadata_edited_at = CASE WHEN ? THEN COALESCE(metadata_edited_at, ?) ELSE metadata_edited_at END,
            failed_stage = COALESCE(?, failed_stage),
            error_message = COALESCE(?, error_message),
            video_location = COALESCE(?, video_location),
            started_at = CASE WHEN ? THEN COALESCE(started_at, ?) ELSE started_at END,
            completed_at = CASE WHEN ? THEN COALESCE(completed_at, ?) ELSE completed_at END,
            content_deleted_at = CASE WHEN ? THEN COALESCE(content_deleted_at, ?) ELSE content_deleted_at END,
            updated_at = ?
        WHERE id = ? AND detailed_workflow_state = ?
        "#,
    )
    .bind(t.to.as_str())
    .bind(t.html_fetched)
    .bind(t.video_fetched)
    .bind(t.metadata_committed)
    .bind(now)
    .bind(t.failure.as_ref().map(|f| f.at_stage.as_str()))
    .bind(t.failure.as_ref().map(|f| f.reason.as_str()))
    .bind(t.video_location.as_deref())
    .bind(t.from == WorkflowState::Pending)
    .bind(now)
    .bind(finished)
    .bind(now)
    .bind(t.to == WorkflowState::Deleted)
    .bind(now)
    .bind(now)
    .bind(t.job_id)
    .bind(t.from.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    if t.purge_content {
        for table in ["job_metadata", "transcript_segment", "job_log"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE job_id = ?"))
                .bind(t.job_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    if let Some(metadata) = &t.metadata {
        upsert_metadata(conn, t.job_id, metadata, now).await?;
    }
    if let Some(segments) = &t.segments {
        replace_segments(conn, t.job_id, segments).await?;
    }
    insert_logs(conn, t.job_id, &t.logs).await?;
    Ok(true)
}

async fn upsert_metadata(
    conn: &mut SqliteConnection,
    job_id: i64,
    metadata: &Metadata,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO job_metadata (job_id, title, date, youtube_id, source, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            title = excluded.title,
            date = excluded.date,
            youtube_id = excluded.youtube_id,
            source = excluded.source,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(job_id)
    .bind(&metadata.title)
    .bind(&metadata.date)
    .bind(&metadata.youtube_id)
    .bind(&metadata.source)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn replace_segments(
    conn: &mut SqliteConnection,
    job_id: i64,
    segments: &[Segment],
) -> Result<()> {
    sqlx::query("DELETE FROM transcript_segment WHERE job_id = ?")
        .bind(job_id)
        .execute(&mut *conn)
        .await?;

    for (position, segment) in segments.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO transcript_segment
                (job_id, position, segment_hash, start_time, end_time, text, speaker, company, subjects, clip_key)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(position as i64)
        .bind(&segment.segment_hash)
        .bind(segment.start_time)
        .bind(segment.end_time)
        .bind(&segment.text)
        .bind(&segment.speaker)
        .bind(&segment.company)
        .bind(serde_json::to_string(&segment.subjects)?)
        .bind(segment.clip_key.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_logs(conn: &mut SqliteConnection, job_id: i64, logs: &[JobLogEntry]) -> Result<()> {
    for entry in logs {
        sqlx::query("INSERT INTO job_log (job_id, level, message, created_at) VALUES (?, ?, ?, ?)")
            .bind(job_id)
            .bind(entry.level.to_string())
            .bind(&entry.message)
            .bind(entry.timestamp_ms())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn state_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn create_job(&self, url: &str, user_email: &str) -> Result<JobDbModel> {
        let id = retry_on_busy("create_job", || async {
            let now = now_ms();
            let result = sqlx::query(
                r#"
                INSERT INTO ingest_job (url, user_email, detailed_workflow_state, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(url)
            .bind(user_email)
            .bind(WorkflowState::Pending.as_str())
            .bind(now)
            .bind(now)
            .execute(&self.write_pool)
            .await?;
            Ok(result.last_insert_rowid())
        })
        .await?;

        // Read back through the write pool so the new row is visible immediately.
        sqlx::query_as::<_, JobDbModel>("SELECT * FROM ingest_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.write_pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn get_job(&self, id: i64) -> Result<JobDbModel> {
        sqlx::query_as::<_, JobDbModel>("SELECT * FROM ingest_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<JobDbModel>> {
        let limit = filter.limit.unwrap_or(100).clamp(1, MAX_LIST_LIMIT) as i64;
        let jobs = match &filter.user_email {
            Some(email) => {
                sqlx::query_as::<_, JobDbModel>(
                    "SELECT * FROM ingest_job WHERE user_email = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(email)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, JobDbModel>(
                    "SELECT * FROM ingest_job ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(jobs)
    }

    async fn list_jobs_in_states(&self, states: &[WorkflowState]) -> Result<Vec<JobDbModel>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM ingest_job WHERE detailed_workflow_state IN ({}) ORDER BY id",
            state_placeholders(states.len())
        );
        let mut query = sqlx::query_as::<_, JobDbModel>(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn list_archived_job_ids(&self) -> Result<Vec<i64>> {
        let states = JobStatus::archived_states();
        let sql = format!(
            "SELECT id FROM ingest_job WHERE detailed_workflow_state IN ({}) ORDER BY id",
            state_placeholders(states.len())
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn count_archived_jobs(&self) -> Result<u64> {
        let states = JobStatus::archived_states();
        let sql = format!(
            "SELECT COUNT(*) FROM ingest_job WHERE detailed_workflow_state IN ({})",
            state_placeholders(states.len())
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }
        Ok(query.fetch_one(&self.pool).await?.max(0) as u64)
    }

    async fn apply_transition(&self, transition: &StateTransition) -> Result<bool> {
        self.apply_transitions(std::slice::from_ref(transition)).await
    }

    async fn apply_transitions(&self, transitions: &[StateTransition]) -> Result<bool> {
        retry_on_busy("apply_transitions", || self.apply_transitions_once(transitions)).await
    }

    async fn apply_content_edit(&self, edit: &ContentEdit) -> Result<bool> {
        retry_on_busy("apply_content_edit", || self.apply_content_edit_once(edit)).await
    }

    async fn delete_job(&self, id: i64) -> Result<bool> {
        let result = retry_on_busy("delete_job", || async {
            Ok(sqlx::query("DELETE FROM ingest_job WHERE id = ?")
                .bind(id)
                .execute(&self.write_pool)
                .await?)
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_metadata(&self, job_id: i64) -> Result<Option<MetadataDbModel>> {
        Ok(
            sqlx::query_as::<_, MetadataDbModel>("SELECT * FROM job_metadata WHERE job_id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_segments(&self, job_id: i64) -> Result<Vec<SegmentDbModel>> {
        Ok(sqlx::query_as::<_, SegmentDbModel>(
            "SELECT * FROM transcript_segment WHERE job_id = ? ORDER BY position",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn append_log(&self, job_id: i64, entry: &JobLogEntry) -> Result<()> {
        retry_on_busy("append_log", || async {
            sqlx::query(
                "INSERT INTO job_log (job_id, level, message, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(job_id)
            .bind(entry.level.to_string())
            .bind(&entry.message)
            .bind(entry.timestamp_ms())
            .execute(&self.write_pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_logs(&self, job_id: i64) -> Result<Vec<JobLogDbModel>> {
        Ok(
            sqlx::query_as::<_, JobLogDbModel>("SELECT * FROM job_log WHERE job_id = ? ORDER BY id")
                .bind(job_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, DatabaseConfig};
    use crate::domain::Stage;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlxJobRepository) {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new(format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("jobs.db").display()
        ));
        let db = Database::connect(&config).await.unwrap();
        (dir, SqlxJobRepository::new(db.read, db.write))
    }

    fn metadata() -> Metadata {
        Metadata {
            title: "Keynote".to_string(),
            date: "2024-05-01".to_string(),
            youtube_id: "abc123".to_string(),
            source: "https://x.test/a".to_string(),
        }
    }

    fn segment(hash: &str) -> Segment {
        Segment {
            segment_hash: hash.to_string(),
            text: "hello".to_string(),
            speaker: "Ada".to_string(),
            company: "Acme".to_string(),
            start_time: 0.0,
            end_time: 1.0,
            subjects: vec!["ai".to_string()],
            clip_key: None,
        }
    }

    #[tokio::test]
    async fn test_create_job_starts_pending() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();
        assert_eq!(job.detailed_workflow_state, "pending");
        assert!(!job.html_fetch_success);
        assert!(job.started_at.is_none());
    }

    #[tokio::test]
    async fn test_transition_writes_artifacts_atomically() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();

        let steps = [
            StateTransition::new(job.id, WorkflowState::Pending, WorkflowState::FetchingHtml),
            StateTransition::new(job.id, WorkflowState::FetchingHtml, WorkflowState::HtmlFetched)
                .with_html_fetched()
                .with_metadata(metadata())
                .with_segments(vec![segment("a"), segment("b")])
                .with_log(JobLogEntry::info("html fetched")),
        ];
        assert!(repo.apply_transitions(&steps).await.unwrap());

        let row = repo.get_job(job.id).await.unwrap();
        assert_eq!(row.detailed_workflow_state, "html_fetched");
        assert!(row.html_fetch_success);
        assert!(row.started_at.is_some());
        assert_eq!(repo.get_segments(job.id).await.unwrap().len(), 2);
        assert!(repo.get_metadata(job.id).await.unwrap().is_some());
        assert_eq!(repo.get_logs(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_transition_writes_nothing() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();

        let stale = StateTransition::new(job.id, WorkflowState::FetchingHtml, WorkflowState::HtmlFetched)
            .with_html_fetched()
            .with_log(JobLogEntry::info("late"));
        assert!(!repo.apply_transition(&stale).await.unwrap());

        let row = repo.get_job(job.id).await.unwrap();
        assert_eq!(row.detailed_workflow_state, "pending");
        assert!(!row.html_fetch_success);
        assert!(repo.get_logs(job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();
        let skip = StateTransition::new(job.id, WorkflowState::Pending, WorkflowState::Completed);
        assert!(matches!(
            repo.apply_transition(&skip).await,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_records_stage_and_finish_time() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();
        let fail = StateTransition::fail(
            job.id,
            WorkflowState::Pending,
            Failure::new(Stage::HtmlFetch, "dns"),
        );
        assert!(repo.apply_transition(&fail).await.unwrap());

        let row = repo.get_job(job.id).await.unwrap();
        assert_eq!(row.detailed_workflow_state, "failed");
        assert_eq!(row.failed_stage.as_deref(), Some("html_fetch"));
        assert_eq!(row.error_message.as_deref(), Some("dns"));
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_purge_keeps_record_and_drops_content() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();
        repo.append_log(job.id, &JobLogEntry::info("hello")).await.unwrap();
        let steps = [
            StateTransition::fail(job.id, WorkflowState::Pending, Failure::new(Stage::HtmlFetch, "x"))
                .with_metadata(metadata()),
            StateTransition::new(job.id, WorkflowState::Failed, WorkflowState::Deleted)
                .with_purged_content(),
        ];
        assert!(repo.apply_transitions(&steps).await.unwrap());

        let row = repo.get_job(job.id).await.unwrap();
        assert_eq!(row.detailed_workflow_state, "deleted");
        assert!(row.content_deleted_at.is_some());
        assert_eq!(row.failed_stage.as_deref(), Some("html_fetch"));
        assert!(repo.get_metadata(job.id).await.unwrap().is_none());
        assert!(repo.get_logs(job.id).await.unwrap().is_empty());
        assert_eq!(repo.count_archived_jobs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_content_edit_requires_expected_state() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();

        let edit = ContentEdit {
            job_id: job.id,
            expected: WorkflowState::EditingMetadata,
            metadata: Some(metadata()),
            segments: None,
            logs: vec![],
        };
        assert!(!repo.apply_content_edit(&edit).await.unwrap());

        let edit = ContentEdit {
            expected: WorkflowState::Pending,
            ..edit
        };
        assert!(repo.apply_content_edit(&edit).await.unwrap());
        assert!(repo.get_metadata(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let (_dir, repo) = setup().await;
        let first = repo.create_job("https://x.test/1", "a@b.com").await.unwrap();
        let second = repo.create_job("https://x.test/2", "c@d.com").await.unwrap();

        let all = repo.list_jobs(&JobFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let mine = repo
            .list_jobs(&JobFilter {
                user_email: Some("a@b.com".to_string()),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, first.id);
    }

    #[tokio::test]
    async fn test_delete_job_cascades() {
        let (_dir, repo) = setup().await;
        let job = repo.create_job("https://x.test/a", "a@b.com").await.unwrap();
        repo.append_log(job.id, &JobLogEntry::info("hello")).await.unwrap();

        assert!(repo.delete_job(job.id).await.unwrap());
        assert!(!repo.delete_job(job.id).await.unwrap());
        assert!(matches!(repo.get_job(job.id).await, Err(Error::NotFound { .. })));
        assert!(repo.get_logs(job.id).await.unwrap().is_empty());
    }
}
