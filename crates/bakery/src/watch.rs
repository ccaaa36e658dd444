use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// "Something changed, recompile" signal. Carries no payload; bursts are
/// coalesced in the single-slot inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEvent;

/// Creates the single-slot inbox the watcher posts into.
pub fn inbox() -> (Sender<WatchEvent>, Receiver<WatchEvent>) {
    bounded(1)
}

/// Posts `WatchEvent` unless one is already waiting.
pub fn post(sender: &Sender<WatchEvent>) -> bool {
    match sender.try_send(WatchEvent) {
        Ok(()) | Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Whether a filesystem event should trigger a recompile.
pub fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to start watcher thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Recursive filesystem watcher feeding a [`WatchEvent`] inbox.
///
/// The watcher thread only forwards signals and never touches GPU state.
/// Dropping the watcher stops the thread.
pub struct ShaderWatcher {
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
    path: PathBuf,
}

impl ShaderWatcher {
    /// Watches `path` recursively. Events arriving within `debounce` of the
    /// first one are folded into a single signal.
    pub fn spawn(
        path: impl AsRef<Path>,
        debounce: Duration,
    ) -> Result<(Self, Receiver<WatchEvent>), WatchError> {
        let (sender, receiver) = inbox();
        let watcher = Self::spawn_into(path, debounce, sender)?;
        Ok((watcher, receiver))
    }

    /// Like [`ShaderWatcher::spawn`] but posts into an existing inbox.
    pub fn spawn_into(
        path: impl AsRef<Path>,
        debounce: Duration,
        inbox: Sender<WatchEvent>,
    ) -> Result<Self, WatchError> {
        let path = path.as_ref().to_path_buf();
        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(raw_tx, Config::default()).map_err(|source| {
            WatchError::Notify {
                path: path.clone(),
                source,
            }
        })?;
        watcher
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Notify {
                path: path.clone(),
                source,
            })?;

        let thread = thread::Builder::new()
            .name("shader-watch".into())
            .spawn(move || forward(raw_rx, inbox, debounce))?;

        debug!(path = %path.display(), ?debounce, "watching shader sources");
        Ok(Self {
            watcher: Some(watcher),
            thread: Some(thread),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ShaderWatcher {
    fn drop(&mut self) {
        // dropping the notify watcher closes the raw channel and ends the thread
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn forward(
    events: mpsc::Receiver<notify::Result<Event>>,
    inbox: Sender<WatchEvent>,
    debounce: Duration,
) {
    while let Ok(event) = events.recv() {
        match event {
            Ok(event) if is_relevant(&event.kind) => {
                let deadline = Instant::now() + debounce;
                while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                    match events.recv_timeout(remaining) {
                        Ok(_) => continue,
                        Err(mpsc::RecvTimeoutError::Timeout) => break,
                        Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    }
                }
                debug!(paths = ?event.paths, "shader source changed");
                if !post(&inbox) {
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "file watch error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use notify::event::{AccessKind, ModifyKind};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn inbox_coalesces_bursts() {
        let (sender, receiver) = inbox();
        for _ in 0..10 {
            assert!(post(&sender));
        }
        assert_eq!(receiver.try_iter().count(), 1);
    }

    #[test]
    fn post_reports_closed_inbox() {
        let (sender, receiver) = inbox();
        drop(receiver);
        assert!(!post(&sender));
    }

    #[test]
    fn access_events_are_ignored() {
        assert!(!is_relevant(&EventKind::Access(AccessKind::Any)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Any)));
    }

    #[test]
    fn reports_file_changes() {
        let dir = TempDir::new().unwrap();
        let (_watcher, receiver) =
            ShaderWatcher::spawn(dir.path(), Duration::from_millis(20)).expect("watch");
        fs::write(dir.path().join("scene.fs"), "void main() {}").unwrap();
        assert!(receiver.recv_timeout(Duration::from_secs(10)).is_ok());
    }
}
