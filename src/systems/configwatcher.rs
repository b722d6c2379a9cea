//! Hot reload: watch the config file and tell the main loop when it changed.
//!
//! The file's parent directory is watched (not the file itself) so editors
//! that save by writing a temp file and renaming it over the original keep
//! working. Bursts of events are debounced: after the last relevant event
//! the watcher waits for [`DEBOUNCE`] of quiet plus [`SETTLE`], then posts a
//! single [`OverlayEvent::ReloadConfig`].

use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{OverlayError, Result};
use crate::events::overlay::{OverlayEvent, OverlaySender};

pub const DEBOUNCE: Duration = Duration::from_millis(300);
pub const SETTLE: Duration = Duration::from_millis(100);
const IDLE_WAIT: Duration = Duration::from_secs(3600);

enum WatchMsg {
    Fs(Event),
    Shutdown,
}

/// True for content changes that touch `file_name`.
pub fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

pub struct ConfigWatcher {
    // Dropped before the thread is joined, which stops fs notifications.
    watcher: Option<RecommendedWatcher>,
    tx: Sender<WatchMsg>,
    handle: Option<std::thread::JoinHandle<()>>,
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn spawn(path: &Path, events: OverlaySender) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| OverlayError::config(format!("{} is not a file", path.display())))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = unbounded::<WatchMsg>();
        let fs_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = fs_tx.send(WatchMsg::Fs(event));
            }
            Err(e) => warn!("Config watch error: {e}"),
        })
        .map_err(|e| OverlayError::config(format!("failed to create watcher: {e}")))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| OverlayError::config(format!("failed to watch {}: {e}", dir.display())))?;

        let handle = std::thread::Builder::new()
            .name("config-watcher".to_string())
            .spawn(move || {
                let mut pending: Option<Instant> = None;
                loop {
                    let wait = pending
                        .map(|at| at.saturating_duration_since(Instant::now()))
                        .unwrap_or(IDLE_WAIT);
                    match rx.recv_timeout(wait) {
                        Ok(WatchMsg::Fs(event)) => {
                            if is_relevant(&event, &file_name) {
                                debug!("Config change event: {:?}", event.kind);
                                pending = Some(Instant::now() + DEBOUNCE);
                            }
                        }
                        Ok(WatchMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            if pending.take().is_some() {
                                std::thread::sleep(SETTLE);
                                if !events.send(OverlayEvent::ReloadConfig) {
                                    break;
                                }
                            }
                        }
                    }
                }
            })
            .map_err(|e| OverlayError::thread(format!("failed to spawn config watcher: {e}")))?;

        info!("Watching {} for changes", path.display());
        Ok(Self {
            watcher: Some(watcher),
            tx,
            handle: Some(handle),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.watcher.take();
        let _ = self.tx.send(WatchMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::overlay::overlay_channel;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_relevance_filter() {
        let name = OsString::from("bongocat.conf");
        let hit = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/cfg/bongocat.conf"));
        assert!(is_relevant(&hit, &name));
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/cfg/bongocat.conf"));
        assert!(is_relevant(&created, &name));
        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/cfg/other.conf"));
        assert!(!is_relevant(&other, &name));
        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/cfg/bongocat.conf"));
        assert!(!is_relevant(&access, &name));
    }

    #[test]
    fn test_write_triggers_single_reload() {
        let dir = std::env::temp_dir().join(format!(
            "bongocat-watch-{}-{}",
            std::process::id(),
            fastrand::u32(..)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bongocat.conf");
        std::fs::write(&path, "fps = 30\n").unwrap();

        let (tx, rx) = overlay_channel();
        let watcher = ConfigWatcher::spawn(&path, tx).unwrap();
        std::fs::write(&path, "fps = 20\n").unwrap();
        std::fs::write(&path, "fps = 10\n").unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            OverlayEvent::ReloadConfig
        );
        assert!(rx.recv_timeout(Duration::from_millis(600)).is_err());
        watcher.shutdown();
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
