//! Watch-and-dispatch: new session folder -> validated view set -> render job.

pub mod dispatcher;
pub mod engine;
pub mod template;
pub mod view_set;
pub mod watcher;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use engine::{HttpRenderEngine, RenderEngine, SubmitReceipt};
pub use template::{JobTemplate, RenderJob};
pub use view_set::{IncompleteViewSet, ViewSet, ViewSetScan, canonical_input_name};
pub use watcher::{FolderWatcher, WatchSummary};
