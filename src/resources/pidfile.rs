//! Single-instance lock.
//!
//! The running overlay holds an exclusive `flock` on a PID file and writes
//! its pid into it. A second instance sees the lock taken and either gives
//! up or, with `--toggle`, sends the holder `SIGTERM`.
//!
//! The lock dies with the process, so a stale file left behind by a crash
//! never blocks the next start.

use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{OverlayError, Result};

pub const PID_FILE_NAME: &str = "bongocat.pid";

/// `$XDG_RUNTIME_DIR/bongocat.pid`, or `/tmp/bongocat.pid`.
pub fn default_pid_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(PID_FILE_NAME)
}

/// Outcome of [`PidFile::acquire`].
#[derive(Debug)]
pub enum PidLock {
    Acquired(PidFile),
    /// Another process holds the lock. Carries its pid when readable.
    Held(Option<i32>),
}

/// Held lock. Dropping it removes the file.
#[derive(Debug)]
pub struct PidFile {
    file: File,
    path: PathBuf,
}

impl PidFile {
    pub fn acquire(path: &Path) -> Result<PidLock> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(path)
            .map_err(|e| OverlayError::file_io_with(format!("opening {}", path.display()), e))?;

        // SAFETY: valid fd owned by `file`.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                let mut text = String::new();
                let holder = file
                    .read_to_string(&mut text)
                    .ok()
                    .and_then(|_| text.trim().parse::<i32>().ok());
                debug!("PID file {} held by {holder:?}", path.display());
                return Ok(PidLock::Held(holder));
            }
            return Err(OverlayError::file_io_with(
                format!("locking {}", path.display()),
                err,
            ));
        }

        let pid = std::process::id();
        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "{pid}"))
            .and_then(|_| file.flush())
            .map_err(|e| OverlayError::file_io_with(format!("writing {}", path.display()), e))?;
        info!("PID file {} locked by {pid}", path.display());
        Ok(PidLock::Acquired(PidFile {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {e}", self.path.display());
        }
        // The lock goes with the descriptor.
        let _ = self.file.flush();
    }
}

/// Ask the instance holding `path` to exit.
///
/// Returns `Ok(true)` when a signal was sent, `Ok(false)` when nobody holds
/// the lock (the caller should start normally).
pub fn toggle(path: &Path) -> Result<bool> {
    match PidFile::acquire(path)? {
        PidLock::Acquired(lock) => {
            drop(lock);
            Ok(false)
        }
        PidLock::Held(Some(pid)) if pid > 0 => {
            // SAFETY: plain syscall, pid validated as positive.
            if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
                return Err(OverlayError::thread(format!(
                    "failed to signal {pid}: {}",
                    std::io::Error::last_os_error()
                )));
            }
            info!("Sent SIGTERM to running instance {pid}");
            Ok(true)
        }
        PidLock::Held(_) => Err(OverlayError::config(format!(
            "{} is locked but holds no pid",
            path.display()
        ))),
    }
}
