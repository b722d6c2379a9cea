//! Process-wide logger that stays usable inside the forked capture child.
//!
//! The parent logs through `env_logger`, which takes the stderr lock for
//! every record. A child forked while another thread held that lock (or
//! any lock inside the logger) would block on its first record forever.
//! [`OverlayLogger`] wraps the `env_logger` logger; after
//! [`enter_forked_child`] it formats each record into a fixed stack buffer
//! and hands it to a single `write(2)` on fd 2, which takes no lock.
//!
//! When some other logger is installed (tests, embedding), the child turns
//! logging off instead.

use arrayvec::ArrayString;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Longest line the child writes; longer records are cut.
pub const CHILD_LINE: usize = 512;

static INSTALLED: AtomicBool = AtomicBool::new(false);
static RAW_STDERR: AtomicBool = AtomicBool::new(false);

pub struct OverlayLogger {
    inner: env_logger::Logger,
}

impl OverlayLogger {
    pub fn new(inner: env_logger::Logger) -> Self {
        Self { inner }
    }
}

impl Log for OverlayLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.inner.matches(record) {
            return;
        }
        if RAW_STDERR.load(Ordering::Relaxed) {
            write_raw(&format_child_line(record));
        } else {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        if !RAW_STDERR.load(Ordering::Relaxed) {
            self.inner.flush();
        }
    }
}

/// Install [`OverlayLogger`] with `default_filter` unless `RUST_LOG` says
/// otherwise.
pub fn init(default_filter: &str) -> Result<(), SetLoggerError> {
    let inner = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .build();
    let max_level = inner.filter();
    log::set_boxed_logger(Box::new(OverlayLogger::new(inner)))?;
    log::set_max_level(max_level);
    INSTALLED.store(true, Ordering::SeqCst);
    Ok(())
}

/// Switch this process to lock-free logging. Call first thing after `fork`
/// in the child.
pub fn enter_forked_child() {
    if INSTALLED.load(Ordering::SeqCst) {
        RAW_STDERR.store(true, Ordering::SeqCst);
    } else {
        log::set_max_level(LevelFilter::Off);
    }
}

/// `[input LEVEL target] message`, cut to [`CHILD_LINE`] bytes with a
/// trailing newline.
pub fn format_child_line(record: &Record) -> ArrayString<CHILD_LINE> {
    let mut line = ArrayString::<CHILD_LINE>::new();
    let mut out = Truncating {
        buf: &mut line,
        limit: CHILD_LINE - 1,
    };
    // Truncating never fails.
    let _ = write!(
        out,
        "[input {} {}] {}",
        record.level(),
        record.target(),
        record.args()
    );
    line.push('\n');
    line
}

/// Keeps whatever fits below `limit` and drops the rest.
struct Truncating<'a> {
    buf: &'a mut ArrayString<CHILD_LINE>,
    limit: usize,
}

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let room = self.limit.saturating_sub(self.buf.len());
        let mut end = s.len().min(room);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push_str(&s[..end]);
        Ok(())
    }
}

fn write_raw(line: &str) {
    // SAFETY: writes a valid buffer to fd 2; write(2) is async-signal-safe.
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            line.as_ptr() as *const libc::c_void,
            line.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn test_child_line_layout() {
        let line = format_child_line(
            &Record::builder()
                .args(format_args!("Key {} from {}", 30, "/dev/input/event3"))
                .level(Level::Debug)
                .target("bongocat::systems::inputcapture")
                .build(),
        );
        assert_eq!(
            line.as_str(),
            "[input DEBUG bongocat::systems::inputcapture] Key 30 from /dev/input/event3\n"
        );
    }

    #[test]
    fn test_long_child_line_is_cut_but_ends_in_newline() {
        let long = "x".repeat(CHILD_LINE * 2);
        let line = format_child_line(
            &Record::builder()
                .args(format_args!("{long}"))
                .level(Level::Warn)
                .target("t")
                .build(),
        );
        assert!(line.len() <= CHILD_LINE);
        assert!(line.ends_with('\n'));
        assert!(line.starts_with("[input WARN t] xxx"));
    }
}
