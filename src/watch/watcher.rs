// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dag::WatchGlob;
use crate::watch::debouncer::RawChange;
use crate::watch::path_utils::relative_str;

/// Handle for the filesystem watcher.
///
/// Holding it means the watches are armed. Dropping it stops file
/// watching.
pub struct WatcherHandle {
    root: PathBuf,
    globs: Vec<String>,
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .field("globs", &self.globs)
            .finish_non_exhaustive()
    }
}

impl WatcherHandle {
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Patterns this watcher reports changes for.
    pub fn globs(&self) -> &[String] {
        &self.globs
    }
}

/// Watch `root` recursively and send one [`RawChange`] per watched glob
/// matching a changed path.
///
/// Paths handed to the globs are relative to `root` with forward slashes.
/// Metadata-only modifications (mtime, permissions) and access events are
/// ignored.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    globs: Vec<WatchGlob>,
    changes_tx: mpsc::UnboundedSender<RawChange>,
) -> Result<WatcherHandle> {
    let root = root.into();
    // Canonicalize once so we have a stable base path.
    let root = root.canonicalize().unwrap_or_else(|_| root.clone());
    let patterns: Vec<String> = globs.iter().map(|g| g.pattern().to_string()).collect();
    let globs = Arc::new(globs);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // Receiver gone means the forwarding task ended; nothing to do.
                let _ = event_tx.send(event);
            }
            Err(err) => {
                warn!(error = %err, "file watch error");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(root = ?root, globs = ?patterns, "file watcher armed");

    let async_root = root.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if !is_content_change(&event.kind) {
                continue;
            }
            debug!(?event, "received notify event");

            let at = Instant::now();
            for path in &event.paths {
                let Some(rel) = relative_str(&async_root, path) else {
                    debug!(path = ?path, "change outside project root");
                    continue;
                };
                for glob in globs.iter().filter(|g| g.matcher.is_match(&rel)) {
                    let change = RawChange {
                        glob: glob.pattern().to_string(),
                        path: PathBuf::from(&rel),
                        at,
                    };
                    if changes_tx.send(change).is_err() {
                        warn!("debouncer gone; stopping watcher forwarding");
                        return;
                    }
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle {
        root,
        globs: patterns,
        _inner: watcher,
    })
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

    #[test]
    fn only_content_changes_count() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::WriteTime
        ))));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Any)));
    }
}
