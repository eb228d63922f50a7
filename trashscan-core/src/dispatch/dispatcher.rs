use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::engine::{RenderEngine, SubmitReceipt};
use super::template::JobTemplate;
use super::view_set::{IncompleteViewSet, ViewSet, ViewSetScan, canonical_input_name};
use crate::config::{DispatchConfig, EngineNodes};
use crate::error::{PipelineError, Result};
use crate::viewpoint::ViewpointSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Submitted {
        folder: String,
        receipt: SubmitReceipt,
    },
    /// Normal skip: the folder did not hold one file per viewpoint.
    Skipped {
        folder: String,
        reason: IncompleteViewSet,
    },
}

/// Turns a settled session folder into one render job.
///
/// The engine has a single input location, so the copy-and-submit step is
/// serialized: at most one job is being staged or submitted at a time.
pub struct Dispatcher {
    views: ViewpointSet,
    engine: Arc<dyn RenderEngine>,
    settle_delay: Duration,
    engine_input_dir: PathBuf,
    template_path: PathBuf,
    nodes: EngineNodes,
    output_folder: String,
    engine_slot: Mutex<()>,
}

impl Dispatcher {
    pub fn new(
        config: &DispatchConfig,
        views: ViewpointSet,
        engine: Arc<dyn RenderEngine>,
    ) -> Self {
        Self {
            views,
            engine,
            settle_delay: config.settle_delay(),
            engine_input_dir: config.engine_input_dir(),
            template_path: config.template_path.clone(),
            nodes: config.nodes.clone(),
            output_folder: config.output_folder.clone(),
            engine_slot: Mutex::new(()),
        }
    }

    pub fn views(&self) -> &ViewpointSet {
        &self.views
    }

    /// Settle, validate, and dispatch a newly created folder.
    pub async fn handle_new_folder(&self, folder: &Path) -> Result<DispatchOutcome> {
        tokio::time::sleep(self.settle_delay).await;

        let name = folder_name(folder);
        let scan = {
            let folder = folder.to_path_buf();
            let views = self.views.clone();
            tokio::task::spawn_blocking(move || ViewSet::scan(&folder, &views))
                .await
                .map_err(|err| PipelineError::Internal(format!("view-set scan panicked: {err}")))??
        };

        match scan {
            ViewSetScan::Incomplete(reason) => {
                warn!(folder = %name, %reason, "skipping folder: incomplete view set");
                Ok(DispatchOutcome::Skipped {
                    folder: name,
                    reason,
                })
            }
            ViewSetScan::Complete(set) => {
                info!(folder = %name, views = set.len(), "complete view set found");
                let receipt = self.dispatch(&set).await?;
                Ok(DispatchOutcome::Submitted {
                    folder: name,
                    receipt,
                })
            }
        }
    }

    /// Stage the images into the engine input location and submit the job.
    pub async fn dispatch(&self, set: &ViewSet) -> Result<SubmitReceipt> {
        let _slot = self.engine_slot.lock().await;

        // Validate the template before touching the shared input location.
        let template = JobTemplate::load(&self.template_path, &self.nodes, &self.views)?;

        tokio::fs::create_dir_all(&self.engine_input_dir)
            .await
            .map_err(|err| PipelineError::io_at(&self.engine_input_dir, err))?;

        let mut inputs = BTreeMap::new();
        for (view, source) in set.images() {
            let file_name = canonical_input_name(view, source);
            let target = self.engine_input_dir.join(&file_name);
            tokio::fs::copy(source, &target)
                .await
                .map_err(|err| PipelineError::io_at(source, err))?;
            inputs.insert(view.name.clone(), file_name);
        }

        let output_prefix = format!("{}/{}", self.output_folder, set.name());
        let job = template.render(set.name(), &inputs, &output_prefix)?;
        let receipt = self.engine.submit(&job).await?;

        info!(
            folder = %set.name(),
            output = %output_prefix,
            prompt_id = receipt.prompt_id.as_deref().unwrap_or("-"),
            "render job submitted"
        );
        Ok(receipt)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("views", &self.views)
            .field("settle_delay", &self.settle_delay)
            .field("engine_input_dir", &self.engine_input_dir)
            .field("template_path", &self.template_path)
            .field("output_folder", &self.output_folder)
            .finish_non_exhaustive()
    }
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    use super::*;
    use crate::dispatch::template::RenderJob;

    #[derive(Default)]
    struct RecordingEngine {
        jobs: SyncMutex<Vec<RenderJob>>,
        reject: bool,
    }

    #[async_trait]
    impl RenderEngine for RecordingEngine {
        async fn submit(&self, job: &RenderJob) -> Result<SubmitReceipt> {
            self.jobs.lock().push(job.clone());
            if self.reject {
                return Err(PipelineError::Dispatch {
                    status: 500,
                    body: "busy".into(),
                });
            }
            Ok(SubmitReceipt {
                status: 200,
                prompt_id: Some("p-1".into()),
            })
        }
    }

    const VIEWS: [&str; 4] = ["front", "left", "right", "back"];

    /// Reads the staged inputs at the start and end of a slow submission.
    struct SlowEngine {
        input_dir: PathBuf,
        in_flight: AtomicUsize,
        overlapped: AtomicBool,
        seen: SyncMutex<Vec<(String, Vec<Vec<u8>>, Vec<Vec<u8>>)>>,
    }

    impl SlowEngine {
        fn new(input_dir: PathBuf) -> Self {
            Self {
                input_dir,
                in_flight: AtomicUsize::new(0),
                overlapped: AtomicBool::new(false),
                seen: SyncMutex::new(Vec::new()),
            }
        }

        fn staged(&self) -> Vec<Vec<u8>> {
            VIEWS
                .iter()
                .map(|view| std::fs::read(self.input_dir.join(format!("{view}.png"))).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl RenderEngine for SlowEngine {
        async fn submit(&self, job: &RenderJob) -> Result<SubmitReceipt> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            let before = self.staged();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let after = self.staged();
            self.seen.lock().push((job.folder.clone(), before, after));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(SubmitReceipt {
                status: 200,
                prompt_id: Some(job.folder.clone()),
            })
        }
    }

    const TEMPLATE: &str = r#"{
        "56": {"inputs": {"image": ""}},
        "85": {"inputs": {"image": ""}},
        "87": {"inputs": {"image": ""}},
        "82": {"inputs": {"image": ""}},
        "67": {"inputs": {"filename_prefix": ""}}
    }"#;

    struct Fixture {
        _tmp: tempfile::TempDir,
        config: DispatchConfig,
        watch: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let watch = tmp.path().join("image_in");
        std::fs::create_dir_all(&watch).unwrap();
        let template_path = tmp.path().join("workflow.json");
        std::fs::write(&template_path, TEMPLATE).unwrap();

        let config = DispatchConfig {
            watch_dir: watch.clone(),
            engine_root: tmp.path().join("engine"),
            template_path,
            settle_delay_ms: 0,
            ..DispatchConfig::default()
        };
        Fixture {
            _tmp: tmp,
            config,
            watch,
        }
    }

    fn session(watch: &Path, name: &str, files: &[&str]) -> PathBuf {
        let dir = watch.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for file in files {
            std::fs::write(dir.join(file), file.as_bytes()).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn complete_folder_is_staged_and_submitted_once() {
        let fx = fixture();
        let engine = Arc::new(RecordingEngine::default());
        let dispatcher = Dispatcher::new(&fx.config, ViewpointSet::default(), engine.clone());
        let folder = session(
            &fx.watch,
            "object_20250101_120000",
            &["a_front.png", "b_left.png", "c_right.png", "d_back.png"],
        );

        let outcome = dispatcher.handle_new_folder(&folder).await.unwrap();
        let DispatchOutcome::Submitted { receipt, .. } = outcome else {
            panic!("expected a submission, got {outcome:?}");
        };
        assert_eq!(receipt.prompt_id.as_deref(), Some("p-1"));

        let jobs = engine.jobs.lock();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[0].workflow["67"]["inputs"]["filename_prefix"],
            "trashscans/object_20250101_120000"
        );
        assert_eq!(jobs[0].workflow["85"]["inputs"]["image"], "left.png");

        let staged = fx.config.engine_input_dir().join("left.png");
        assert_eq!(std::fs::read(staged).unwrap(), b"b_left.png");
    }

    #[tokio::test]
    async fn incomplete_folder_submits_nothing() {
        let fx = fixture();
        let engine = Arc::new(RecordingEngine::default());
        let dispatcher = Dispatcher::new(&fx.config, ViewpointSet::default(), engine.clone());
        let folder = session(&fx.watch, "object_x", &["a_front.png", "b_left.png", "c_right.png"]);

        let outcome = dispatcher.handle_new_folder(&folder).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
        assert!(engine.jobs.lock().is_empty());
        assert!(!fx.config.engine_input_dir().join("front.png").exists());
    }

    #[tokio::test]
    async fn engine_rejection_is_propagated() {
        let fx = fixture();
        let engine = Arc::new(RecordingEngine {
            reject: true,
            ..RecordingEngine::default()
        });
        let dispatcher = Dispatcher::new(&fx.config, ViewpointSet::default(), engine.clone());
        let folder = session(
            &fx.watch,
            "object_y",
            &["front.png", "left.png", "right.png", "back.png"],
        );

        let err = dispatcher.handle_new_folder(&folder).await.unwrap_err();
        assert!(matches!(err, PipelineError::Dispatch { status: 500, .. }));
        assert_eq!(engine.jobs.lock().len(), 1);
    }

    #[tokio::test]
    async fn malformed_template_blocks_submission() {
        let fx = fixture();
        std::fs::write(&fx.config.template_path, r#"{"56": {"inputs": {}}}"#).unwrap();
        let engine = Arc::new(RecordingEngine::default());
        let dispatcher = Dispatcher::new(&fx.config, ViewpointSet::default(), engine.clone());
        let folder = session(
            &fx.watch,
            "object_z",
            &["front.png", "left.png", "right.png", "back.png"],
        );

        let err = dispatcher.handle_new_folder(&folder).await.unwrap_err();
        assert!(matches!(err, PipelineError::Template(_)));
        assert!(engine.jobs.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn simultaneous_folders_take_turns_on_the_input_slot() {
        let fx = fixture();
        let engine = Arc::new(SlowEngine::new(fx.config.engine_input_dir()));
        let dispatcher = Dispatcher::new(&fx.config, ViewpointSet::default(), engine.clone());

        let mut folders = Vec::new();
        for name in ["object_1", "object_2"] {
            let dir = fx.watch.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for view in VIEWS {
                std::fs::write(dir.join(format!("{view}.png")), format!("{name}:{view}")).unwrap();
            }
            folders.push(dir);
        }

        let (first, second) = tokio::join!(
            dispatcher.handle_new_folder(&folders[0]),
            dispatcher.handle_new_folder(&folders[1]),
        );
        assert!(matches!(first.unwrap(), DispatchOutcome::Submitted { .. }));
        assert!(matches!(second.unwrap(), DispatchOutcome::Submitted { .. }));
        assert!(!engine.overlapped.load(Ordering::SeqCst));

        let seen = engine.seen.lock();
        assert_eq!(seen.len(), 2);
        for (folder, before, after) in seen.iter() {
            let expected: Vec<Vec<u8>> = VIEWS
                .iter()
                .map(|view| format!("{folder}:{view}").into_bytes())
                .collect();
            assert_eq!(before, &expected, "{folder} saw foreign inputs at submit");
            assert_eq!(after, &expected, "{folder} inputs changed during submit");
        }
    }
}
