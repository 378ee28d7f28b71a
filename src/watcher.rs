use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

/// Fresh source for the watched script, read off disk by the watcher thread.
pub struct SourceChange {
    pub file: String,
    pub source: String,
}

/// Watches one script file and delivers changed source over a channel. The
/// host drains [`ScriptWatcher::poll`] once per frame and feeds the result
/// to `ScriptHost::set_source`, which is the external "source changed"
/// signal that dirties the lifecycle controller.
pub struct ScriptWatcher {
    rx: Receiver<SourceChange>,
    // Dropping the watcher stops its backing thread.
    _watcher: RecommendedWatcher,
}

impl ScriptWatcher {
    pub fn new(path: impl Into<PathBuf>) -> notify::Result<Self> {
        let path = path.into();
        let (tx, rx) = crossbeam_channel::unbounded::<SourceChange>();

        let target = path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
                if let Ok(event) = res {
                    handle_fs_event(event, &tx, &target);
                }
            })?;

        // notify needs a directory for single files
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!("[Stagehand watcher] watching {}", path.display());

        Ok(Self {
            rx,
            _watcher: watcher,
        })
    }

    /// Drains pending changes; when several landed since the last poll only
    /// the newest matters.
    pub fn poll(&self) -> Option<SourceChange> {
        self.rx.try_iter().last()
    }
}

fn handle_fs_event(
    event: NotifyEvent,
    tx: &crossbeam_channel::Sender<SourceChange>,
    target: &PathBuf,
) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        if !path_matches(path, target) {
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(source) => {
                let file = path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("script.lua")
                    .to_string();
                let _ = tx.send(SourceChange { file, source });
            }
            Err(e) => warn!("[Stagehand watcher] failed to read {}: {e}", path.display()),
        }
    }
}

fn path_matches(a: &Path, b: &PathBuf) -> bool {
    let ca = std::fs::canonicalize(a).unwrap_or_else(|_| a.to_path_buf());
    let cb = std::fs::canonicalize(b).unwrap_or_else(|_| b.to_path_buf());
    ca == cb
}
