//! Compiled-matcher engine
//!
//! Wraps a [`RuleMatcher`] loaded from a compiled rule file on a dedicated
//! worker thread. Until the load succeeds the engine answers
//! `EngineNotReady` without touching the matcher.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::ruleset::{RuleMatcher, RuleSet, RuleSetError};
use crate::types::{BlockDecision, BlockRequest};

/// Error type for compiled engine loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to spawn loader thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    RuleSet(#[from] RuleSetError),
    #[error("Loader thread panicked")]
    Panicked,
}

#[derive(Debug)]
struct Inner {
    name: String,
    path: PathBuf,
    ready: AtomicBool,
    matcher: RwLock<Option<RuleMatcher>>,
}

/// Handle to a compiled-matcher engine. Clones share the same matcher.
#[derive(Debug, Clone)]
pub struct CompiledEngine {
    inner: Arc<Inner>,
}

impl CompiledEngine {
    /// An engine that has not loaded anything yet.
    pub(crate) fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                path: path.into(),
                ready: AtomicBool::new(false),
                matcher: RwLock::new(None),
            }),
        }
    }

    /// Start loading `path` on a dedicated thread and return immediately.
    ///
    /// `on_complete` runs on the loader thread once the outcome is known, and
    /// before [`LoadTask::wait`] returns. If the thread cannot be spawned it
    /// runs on the calling thread with [`LoadError::Spawn`].
    pub fn spawn<F>(name: impl Into<String>, path: impl Into<PathBuf>, on_complete: F) -> LoadTask
    where
        F: FnOnce(Result<&CompiledEngine, &LoadError>) + Send + 'static,
    {
        let engine = Self::new(name, path);
        let callback = Arc::new(Mutex::new(Some(on_complete)));

        let worker = engine.clone();
        let worker_callback = Arc::clone(&callback);
        let spawned = std::thread::Builder::new()
            .name(format!("bg-loader:{}", engine.name()))
            .spawn(move || {
                let result = worker.load();
                if let Some(on_complete) = worker_callback.lock().take() {
                    on_complete(result.as_ref().map(|_| &worker));
                }
                result
            });

        let state = match spawned {
            Ok(handle) => TaskState::Running(handle),
            Err(source) => {
                let err = LoadError::Spawn(source);
                warn!("[{}] {}", engine.name(), err);
                if let Some(on_complete) = callback.lock().take() {
                    on_complete(Err(&err));
                }
                TaskState::Failed(err)
            }
        };

        LoadTask { engine, state }
    }

    /// Load the rule file on the current thread and publish the outcome.
    pub(crate) fn load(&self) -> Result<(), LoadError> {
        let start = Instant::now();
        debug!("[{}] Start loading rule file: {}", self.name(), self.path().display());

        match RuleSet::open(self.path()) {
            Ok(rule_set) => {
                *self.inner.matcher.write() = Some(RuleMatcher::new(rule_set));
                self.inner.ready.store(true, Ordering::Release);
                debug!(
                    "[{}] Finished loading after {:.3}s",
                    self.name(),
                    start.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(err) => {
                self.inner.ready.store(false, Ordering::Release);
                warn!(
                    "[{}] Could not load rule file after {:.3}s: {}",
                    self.name(),
                    start.elapsed().as_secs_f64(),
                    err
                );
                Err(err.into())
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub fn decide(&self, req: &BlockRequest<'_>) -> BlockDecision {
        if !self.is_ready() {
            return BlockDecision::EngineNotReady;
        }

        let start = Instant::now();
        let matcher = self.inner.matcher.read();
        let Some(matcher) = matcher.as_ref() else {
            return BlockDecision::EngineNotReady;
        };

        let result = matcher.check(req);
        log::trace!(
            "[{}] matched={} exception={} in {}us",
            self.name(),
            result.matched,
            result.exception,
            start.elapsed().as_micros()
        );

        if result.matched {
            BlockDecision::Block
        } else {
            BlockDecision::Allow
        }
    }
}

// =============================================================================
// Load Task
// =============================================================================

#[derive(Debug)]
enum TaskState {
    Running(JoinHandle<Result<(), LoadError>>),
    Failed(LoadError),
}

/// A background load started by [`CompiledEngine::spawn`].
#[derive(Debug)]
pub struct LoadTask {
    engine: CompiledEngine,
    state: TaskState,
}

impl LoadTask {
    /// The engine being loaded. Answers `EngineNotReady` until the load succeeds.
    pub fn engine(&self) -> &CompiledEngine {
        &self.engine
    }

    /// Block until the load finishes and its completion callback has run.
    pub fn wait(self) -> Result<CompiledEngine, LoadError> {
        match self.state {
            TaskState::Running(handle) => match handle.join() {
                Ok(Ok(())) => Ok(self.engine),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(LoadError::Panicked),
            },
            TaskState::Failed(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::mpsc;

    use super::*;
    use crate::ruleset::RuleSetBuilder;
    use crate::types::ContentType;

    fn rule_file(hosts: &[&str]) -> tempfile::NamedTempFile {
        let mut builder = RuleSetBuilder::new();
        for host in hosts {
            builder.block_host(host);
        }
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&builder.build()).expect("write rule file");
        file
    }

    fn ads_request() -> BlockRequest<'static> {
        BlockRequest::new(
            Some("https://shop.example.com/"),
            "http://ads.example.com/banner.js",
            ContentType::SCRIPT,
        )
    }

    #[test]
    fn test_not_ready_before_load() {
        let file = rule_file(&["ads.example.com"]);
        let engine = CompiledEngine::new("trackers", file.path());
        assert!(!engine.is_ready());
        assert_eq!(engine.decide(&ads_request()), BlockDecision::EngineNotReady);

        engine.load().expect("load should succeed");
        assert!(engine.is_ready());
        assert_eq!(engine.decide(&ads_request()), BlockDecision::Block);
    }

    #[test]
    fn test_spawn_reports_success() {
        let file = rule_file(&["ads.example.com"]);
        let (tx, rx) = mpsc::channel();
        let task = CompiledEngine::spawn("trackers", file.path(), move |outcome| {
            let name = outcome.map(|engine| engine.name().to_string()).map_err(|e| e.to_string());
            tx.send((std::thread::current().name().map(str::to_string), name)).unwrap();
        });

        let engine = task.wait().expect("load should succeed");
        assert!(engine.is_ready());
        assert_eq!(engine.decide(&ads_request()), BlockDecision::Block);

        let (thread_name, outcome) = rx.recv().unwrap();
        assert_eq!(thread_name.as_deref(), Some("bg-loader:trackers"));
        assert_eq!(outcome, Ok("trackers".to_string()));
    }

    #[test]
    fn test_spawn_reports_failure() {
        let (tx, rx) = mpsc::channel();
        let task = CompiledEngine::spawn("broken", "/no/such/rules.dat", move |outcome| {
            tx.send(outcome.is_err()).unwrap();
        });
        let engine = task.engine().clone();

        let err = task.wait().unwrap_err();
        assert!(matches!(err, LoadError::RuleSet(RuleSetError::Io { .. })));
        assert!(rx.recv().unwrap());
        assert!(!engine.is_ready());
        assert_eq!(engine.decide(&ads_request()), BlockDecision::EngineNotReady);
    }

    #[test]
    fn test_corrupt_file_fails() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"definitely not a rule file, just text").unwrap();
        let task = CompiledEngine::spawn("corrupt", file.path(), |_| {});
        assert!(matches!(task.wait(), Err(LoadError::RuleSet(RuleSetError::InvalidMagic))));
    }

    #[test]
    fn test_concurrent_decisions() {
        let file = rule_file(&["ads.example.com"]);
        let engine = CompiledEngine::spawn("trackers", file.path(), |_| {}).wait().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    (0..200).all(|_| engine.decide(&ads_request()) == BlockDecision::Block)
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
