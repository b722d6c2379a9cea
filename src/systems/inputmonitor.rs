//! Lifecycle of the input capture process.
//!
//! [`InputMonitor`] forks the capture child, remembers its pid and tears it
//! down again: `SIGTERM`, a bounded wait, then `SIGKILL`. The shared flag
//! page is created once by the caller and handed to every child, so a
//! restart (device list changed, child crashed) reuses it.
//!
//! ```text
//! NotStarted --start--> Running --stop--> Stopping --reaped--> Stopped
//!                          ^                                      |
//!                          +-------------- start/restart ---------+
//! ```
//!
//! The main loop calls [`InputMonitor::check_alive`] periodically; it reaps
//! a dead child without blocking so the caller can restart capture.
//!
//! Restarts fork a process that already runs several threads, so the child
//! may inherit locks held by threads that no longer exist. It switches to
//! [`crate::logging`]'s lock-free path before doing anything else.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{OverlayError, Result};
use crate::resources::inputflags::SharedInputFlags;
use crate::systems::inputcapture::{CaptureSettings, run_child};

/// How long a child gets to exit after `SIGTERM`.
pub const STOP_TIMEOUT: Duration = Duration::from_millis(500);
const REAP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    NotStarted,
    Running(libc::pid_t),
    Stopping(libc::pid_t),
    Stopped,
}

pub struct InputMonitor {
    flags: Arc<SharedInputFlags>,
    settings: CaptureSettings,
    state: MonitorState,
}

impl InputMonitor {
    pub fn new(flags: Arc<SharedInputFlags>, settings: CaptureSettings) -> Self {
        Self {
            flags,
            settings,
            state: MonitorState::NotStarted,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn pid(&self) -> Option<libc::pid_t> {
        match self.state {
            MonitorState::Running(pid) | MonitorState::Stopping(pid) => Some(pid),
            _ => None,
        }
    }

    /// Fork the capture process. No-op while one is running.
    pub fn start(&mut self) -> Result<()> {
        if matches!(self.state, MonitorState::Running(_)) {
            return Ok(());
        }
        // SAFETY: the child only runs the capture loop and leaves via _exit.
        let pid = unsafe { libc::fork() };
        match pid {
            -1 => Err(OverlayError::thread(format!(
                "failed to fork input capture: {}",
                std::io::Error::last_os_error()
            ))),
            0 => run_child(&self.settings, &self.flags),
            pid => {
                info!("Input capture started (pid {pid})");
                self.state = MonitorState::Running(pid);
                Ok(())
            }
        }
    }

    /// Terminate and reap the child. Safe to call in any state.
    pub fn stop(&mut self) {
        let Some(pid) = self.pid() else {
            return;
        };
        self.state = MonitorState::Stopping(pid);
        // SAFETY: plain syscalls on our own child.
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }

        let deadline = Instant::now() + STOP_TIMEOUT;
        let mut reaped = false;
        while Instant::now() < deadline {
            if try_reap(pid) {
                reaped = true;
                break;
            }
            std::thread::sleep(REAP_POLL);
        }
        if !reaped {
            warn!("Input capture {pid} ignored SIGTERM, killing");
            // SAFETY: as above; the blocking wait reaps the killed child.
            unsafe {
                libc::kill(pid, libc::SIGKILL);
                libc::waitpid(pid, std::ptr::null_mut(), 0);
            }
        }
        self.state = MonitorState::Stopped;
        info!("Input capture stopped");
    }

    /// Stop the current child and start one with `settings`. The shared
    /// flags are cleared in between.
    pub fn restart(&mut self, settings: CaptureSettings) -> Result<()> {
        self.stop();
        self.flags.clear();
        self.settings = settings;
        self.start()
    }

    /// Reap the child if it exited. Returns false when it is not running.
    pub fn check_alive(&mut self) -> bool {
        let MonitorState::Running(pid) = self.state else {
            return false;
        };
        if try_reap(pid) {
            error!("Input capture {pid} exited unexpectedly");
            self.state = MonitorState::Stopped;
            return false;
        }
        true
    }
}

impl Drop for InputMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Non-blocking `waitpid`. True when `pid` is gone.
fn try_reap(pid: libc::pid_t) -> bool {
    let mut status = 0;
    // SAFETY: plain syscall with a valid status pointer.
    let rc = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
    if rc == pid {
        debug!("Reaped input capture {pid}, status {status}");
        true
    } else {
        // -1 with ECHILD also means there is nothing left to wait for.
        rc == -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::overlayconfig::OverlayConfig;

    fn monitor() -> InputMonitor {
        InputMonitor::new(
            Arc::new(SharedInputFlags::new().unwrap()),
            CaptureSettings::from_config(&OverlayConfig::new()),
        )
    }

    #[test]
    fn test_new_monitor_is_not_started() {
        let mut m = monitor();
        assert_eq!(m.state(), MonitorState::NotStarted);
        assert_eq!(m.pid(), None);
        assert!(!m.check_alive());
    }

    #[test]
    fn test_stop_without_child_is_noop() {
        let mut m = monitor();
        m.stop();
        assert_eq!(m.state(), MonitorState::NotStarted);
    }

    /// Logs through the locked stderr handle, like `env_logger` does.
    struct LockingLogger;

    impl log::Log for LockingLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            use std::io::Write;
            let _ = writeln!(std::io::stderr().lock(), "{}", record.args());
        }

        fn flush(&self) {}
    }

    static LOCKING_LOGGER: LockingLogger = LockingLogger;

    #[test]
    fn test_child_forked_while_stderr_is_locked_still_captures() {
        use std::io::Write;

        let _ = log::set_logger(&LOCKING_LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        let dir = std::env::temp_dir().join(format!(
            "bongocat-monitor-{}-{}",
            std::process::id(),
            fastrand::u32(..)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let device = dir.join("event0");
        let mut record = vec![0u8; crate::systems::inputcapture::EVENT_SIZE];
        let time = std::mem::size_of::<libc::timeval>();
        record[time..time + 2].copy_from_slice(&crate::systems::inputcapture::EV_KEY.to_ne_bytes());
        record[time + 2..time + 4].copy_from_slice(&30u16.to_ne_bytes());
        record[time + 4..time + 8].copy_from_slice(&1i32.to_ne_bytes());
        std::fs::File::create(&device).unwrap().write_all(&record).unwrap();

        let flags = Arc::new(SharedInputFlags::new().unwrap());
        let settings = CaptureSettings {
            input_dir: dir.clone(),
            matcher: crate::systems::inputcapture::DeviceMatcher::new([device], Vec::new()),
            scan_interval: None,
            log_keys: true,
        };
        let mut m = InputMonitor::new(Arc::clone(&flags), settings);

        // Another thread owns stderr at the moment of the fork.
        let (locked_tx, locked_rx) = crossbeam_channel::bounded(0);
        let holder = std::thread::spawn(move || {
            let guard = std::io::stderr().lock();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(500));
            drop(guard);
        });
        locked_rx.recv().unwrap();
        m.start().unwrap();
        holder.join().unwrap();

        let deadline = Instant::now() + Duration::from_secs(3);
        let mut published = None;
        while published.is_none() && Instant::now() < deadline {
            published = flags.take_press();
            std::thread::sleep(Duration::from_millis(10));
        }
        let alive = m.check_alive();
        m.stop();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(published, Some(30), "child alive: {alive}");
        assert_eq!(m.state(), MonitorState::Stopped);
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = OverlayConfig::new();
        config.hotplug_scan_interval = 0;
        config.keyboard_names = vec!["Keychron".into()];
        let settings = CaptureSettings::from_config(&config);
        assert_eq!(settings.scan_interval, None);
        assert!(settings.matcher.matches_name("Keychron K8"));
    }
}
