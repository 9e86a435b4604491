//! Stage executors and the contract they implement.

pub mod clips;
pub mod html;
pub mod traits;
pub mod video;

pub use clips::ClipGenerator;
pub use html::{HtmlFetcher, HttpClientConfig, HttpPageSource, PageSource};
pub use traits::{StageContext, StageExecutor, StageExecutors, StageOutput};
pub use video::VideoFetcher;
