//! Watch mode
//!
//! Re-runs a schema's tests whenever its document or one of its test
//! documents changes. The watched file set is fixed when the loop starts:
//! each schema's document plus the `.json` files then present in its `pass/`
//! and `fail/` directories. Files created later are not picked up.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::{Result, SchemaError, TestKind};
use crate::key::Key;
use crate::report::TestReport;
use crate::tester::Tester;

/// Default quiet period before a changed file is re-tested
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The cancel channel fired or was dropped
    Cancelled,
    /// The notification source went away
    Disconnected,
}

/// Debounced test loop over a fixed set of schemas
pub struct WatchLoop<'t, 'r> {
    tester: &'t Tester<'r>,
    debounce: Duration,
    ready: Option<Sender<()>>,
}

impl<'t, 'r> WatchLoop<'t, 'r> {
    pub fn new(tester: &'t Tester<'r>) -> Self {
        Self {
            tester,
            debounce: DEFAULT_DEBOUNCE,
            ready: None,
        }
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Signalled once, after every directory is being watched
    pub fn ready(mut self, ready: Sender<()>) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Watch `keys` until `cancel` fires
    ///
    /// `on_result` sees every re-run, failed or not. Failures while
    /// re-testing never end the loop; failing to set up the watches does.
    pub fn run<F>(self, keys: &[Key], cancel: &Receiver<()>, mut on_result: F) -> Result<WatchExit>
    where
        F: FnMut(&Key, Result<TestReport>),
    {
        let registry = self.tester.registry();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;

        let mut files: HashMap<PathBuf, Key> = HashMap::new();
        for key in keys {
            // directories are watched so editors that replace files are seen
            let version_dir = registry.root().join(key.version_dir());
            watcher.watch(&version_dir, RecursiveMode::NonRecursive)?;
            files.insert(registry.schema_path(key), key.clone());

            for kind in [TestKind::Pass, TestKind::Fail] {
                let dir = registry.test_dir(key, kind);
                if !dir.is_dir() {
                    continue;
                }
                watcher.watch(&dir, RecursiveMode::NonRecursive)?;
                for entry in fs::read_dir(&dir).map_err(SchemaError::io(&dir))? {
                    let path = entry.map_err(SchemaError::io(&dir))?.path();
                    if is_json(&path) {
                        files.insert(path, key.clone());
                    }
                }
            }
        }
        info!(schemas = keys.len(), files = files.len(), "watching for changes");

        if let Some(ready) = self.ready {
            let _ = ready.send(());
        }

        let mut pending: HashMap<PathBuf, (Key, Instant)> = HashMap::new();
        loop {
            let timeout = match pending.values().map(|(_, due)| *due).min() {
                Some(due) => crossbeam_channel::at(due),
                None => crossbeam_channel::never(),
            };

            crossbeam_channel::select! {
                recv(cancel) -> _ => {
                    info!("watch cancelled");
                    return Ok(WatchExit::Cancelled);
                }
                recv(rx) -> message => match message {
                    Ok(Ok(event)) => {
                        for (path, key) in changed_paths(&event, &files) {
                            debug!(%key, path = %path.display(), "change detected");
                            pending.insert(path, (key, Instant::now() + self.debounce));
                        }
                    }
                    Ok(Err(e)) => warn!(error = %e, "watch error"),
                    Err(_) => return Ok(WatchExit::Disconnected),
                },
                recv(timeout) -> _ => {
                    let now = Instant::now();
                    let mut due = BTreeSet::new();
                    pending.retain(|_, (key, at)| {
                        if *at <= now {
                            due.insert(key.clone());
                            false
                        } else {
                            true
                        }
                    });

                    for key in due {
                        registry.reset();
                        let result = self.tester.test_single_schema(&key);
                        match &result {
                            Ok(report) if report.is_success() => {
                                info!(%key, passed = report.passed, "tests passed")
                            }
                            Ok(report) => warn!(%key, failed = report.failed, "tests failed"),
                            Err(e) => warn!(%key, error = %e, "could not test schema"),
                        }
                        on_result(&key, result);
                    }
                }
            }
        }
    }
}

/// Watched files touched by `event`
fn changed_paths(event: &Event, files: &HashMap<PathBuf, Key>) -> Vec<(PathBuf, Key)> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| Some((path.clone(), files.get(path)?.clone())))
        .collect()
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}
