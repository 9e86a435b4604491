//! Workflow state machine for ingestion jobs.
//!
//! A job moves forward through a fixed chain of states:
//!
//! ```text
//! pending -> fetching_html -> html_fetched -> editing_metadata
//!         -> fetching_video -> video_fetched -> generating_clips -> completed
//! ```
//!
//! `failed` is reachable from every non-terminal state. `deleted` is reachable
//! from `completed` or `failed` only. The coarse [`JobStatus`] is always a
//! projection of the detailed state and is never stored on its own.

use serde::{Deserialize, Serialize};

/// Fine-grained workflow state of a job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
    utoipa::ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    FetchingHtml,
    HtmlFetched,
    /// Blocking checkpoint: waits for a human metadata commit.
    EditingMetadata,
    FetchingVideo,
    VideoFetched,
    GeneratingClips,
    Completed,
    Failed,
    Deleted,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// Position along the forward chain. Terminal outcomes rank after every
    /// progress state.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::FetchingHtml => 1,
            Self::HtmlFetched => 2,
            Self::EditingMetadata => 3,
            Self::FetchingVideo => 4,
            Self::VideoFetched => 5,
            Self::GeneratingClips => 6,
            Self::Completed | Self::Failed => 7,
            Self::Deleted => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Deleted)
    }

    /// States in which a stage executor is (or may be) mutating the job.
    pub fn is_active_stage(&self) -> bool {
        matches!(
            self,
            Self::FetchingHtml | Self::FetchingVideo | Self::GeneratingClips
        )
    }

    /// States a worker advances without any external signal.
    pub fn is_automatic(&self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::FetchingHtml
                | Self::HtmlFetched
                | Self::FetchingVideo
                | Self::VideoFetched
                | Self::GeneratingClips
        )
    }

    /// Whether an operator may correct metadata in this state.
    pub fn accepts_metadata_correction(&self) -> bool {
        !self.is_terminal() && !self.is_active_stage()
    }

    /// Whether the transcript may be replaced in this state.
    pub fn accepts_transcript_edit(&self) -> bool {
        !self.is_active_stage() && *self != Self::Deleted
    }

    /// The only legal state after a successful step from `self`, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::FetchingHtml),
            Self::FetchingHtml => Some(Self::HtmlFetched),
            Self::HtmlFetched => Some(Self::EditingMetadata),
            Self::EditingMetadata => Some(Self::FetchingVideo),
            Self::FetchingVideo => Some(Self::VideoFetched),
            Self::VideoFetched => Some(Self::GeneratingClips),
            Self::GeneratingClips => Some(Self::Completed),
            Self::Completed | Self::Failed | Self::Deleted => None,
        }
    }

    /// Check a transition against the workflow graph.
    pub fn can_transition_to(&self, to: Self) -> bool {
        match to {
            Self::Failed => !self.is_terminal(),
            Self::Deleted => matches!(self, Self::Completed | Self::Failed),
            _ => self.next() == Some(to),
        }
    }

    /// Stage a failure in this state is attributed to.
    ///
    /// Idle states are charged to the stage the job is waiting to enter.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Pending | Self::FetchingHtml => Some(Stage::HtmlFetch),
            Self::HtmlFetched | Self::EditingMetadata => Some(Stage::MetadataEdit),
            Self::FetchingVideo => Some(Stage::VideoFetch),
            Self::VideoFetched | Self::GeneratingClips => Some(Stage::ClipGeneration),
            Self::Completed | Self::Failed | Self::Deleted => None,
        }
    }

    /// Whether `self` lies strictly after `other` along the workflow.
    pub fn is_forward_of(&self, other: Self) -> bool {
        self.rank() > other.rank()
    }
}

/// Coarse job status, a pure projection of [`WorkflowState`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    utoipa::ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Deleted,
}

impl JobStatus {
    pub fn project(state: WorkflowState) -> Self {
        match state {
            WorkflowState::Pending => Self::Pending,
            WorkflowState::FetchingHtml
            | WorkflowState::HtmlFetched
            | WorkflowState::EditingMetadata
            | WorkflowState::FetchingVideo
            | WorkflowState::VideoFetched
            | WorkflowState::GeneratingClips => Self::Running,
            WorkflowState::Completed => Self::Completed,
            WorkflowState::Failed => Self::Failed,
            WorkflowState::Deleted => Self::Deleted,
        }
    }

    /// Archived jobs are the targets of a bulk purge.
    pub fn is_archived(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Deleted)
    }

    /// Detailed states that project to an archived status.
    pub fn archived_states() -> [WorkflowState; 3] {
        [
            WorkflowState::Completed,
            WorkflowState::Failed,
            WorkflowState::Deleted,
        ]
    }
}

impl From<WorkflowState> for JobStatus {
    fn from(state: WorkflowState) -> Self {
        Self::project(state)
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    utoipa::ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    HtmlFetch,
    /// Failed before or during the human metadata edit.
    MetadataEdit,
    VideoFetch,
    ClipGeneration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Attribute a failure from the progress flags alone.
    ///
    /// Total over every flag combination; used for rows that carry no
    /// recorded stage.
    pub fn from_progress_flags(
        html_fetch_success: bool,
        metadata_edited: bool,
        video_fetch_success: bool,
    ) -> Self {
        match (html_fetch_success, metadata_edited, video_fetch_success) {
            (false, _, _) => Self::HtmlFetch,
            (true, false, _) => Self::MetadataEdit,
            (true, true, false) => Self::VideoFetch,
            (true, true, true) => Self::ClipGeneration,
        }
    }
}

/// Tagged failure payload carried by a job in the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Failure {
    pub at_stage: Stage,
    pub reason: String,
}

impl Failure {
    pub fn new(at_stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            at_stage,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.at_stage, self.reason)
    }
}
