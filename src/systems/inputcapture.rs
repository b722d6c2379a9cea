//! Keyboard capture loop run inside the forked input process.
//!
//! The loop owns a small table of open evdev devices and repeats:
//!
//! 1. On the first pass, and then every `hotplug_scan_interval` seconds,
//!    scan the input directory for `event*` nodes. A node is attached when
//!    its path is listed in the config or its `EVIOCGNAME` contains one of
//!    the configured names. Anything else is closed right away.
//! 2. `poll` all attached devices with a one second timeout.
//! 3. Read ready devices. A key-down (`EV_KEY`, value 1) publishes its code
//!    through [`SharedInputFlags`]. A read of zero bytes or a hard error
//!    means the device went away and its slot is freed.
//!
//! Nothing here forks; [`crate::systems::inputmonitor`] does that and calls
//! [`run_child`] in the new process. The loop itself works on any readable
//! file, which is how the tests drive it.

use arrayvec::ArrayVec;
use log::{debug, error, trace, warn};
use rustc_hash::FxHashSet;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{OverlayError, Result};
use crate::resources::inputflags::SharedInputFlags;
use crate::resources::overlayconfig::OverlayConfig;

/// Most devices watched at once.
pub const MAX_DEVICES: usize = 32;
pub const INPUT_DIR: &str = "/dev/input";
pub const POLL_TIMEOUT_MS: i32 = 1000;

pub const EV_KEY: u16 = 0x01;
pub const KEY_DOWN: i32 = 1;

/// Size of one `struct input_event` on this target.
pub const EVENT_SIZE: usize = std::mem::size_of::<libc::input_event>();
const TIME_SIZE: usize = std::mem::size_of::<libc::timeval>();
const READ_BATCH: usize = 64;
const NAME_LEN: usize = 256;

/// `EVIOCGNAME(len)`: `_IOC(_IOC_READ, 'E', 0x06, len)`.
const fn eviocgname(len: usize) -> libc::c_ulong {
    const IOC_READ: libc::c_ulong = 2;
    (IOC_READ << 30) | ((len as libc::c_ulong) << 16) | ((b'E' as libc::c_ulong) << 8) | 0x06
}

/// Which devices to attach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMatcher {
    paths: FxHashSet<PathBuf>,
    names: Vec<String>,
}

impl DeviceMatcher {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>, names: Vec<String>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            names,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(
            config.keyboard_devices.iter().cloned(),
            config.keyboard_names.clone(),
        )
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    /// Substring match of a device name against the configured names.
    pub fn matches_name(&self, name: &str) -> bool {
        self.names.iter().any(|wanted| name.contains(wanted.as_str()))
    }

    pub fn wants_names(&self) -> bool {
        !self.names.is_empty()
    }
}

/// Everything the capture process needs, cloned into the child at fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub input_dir: PathBuf,
    pub matcher: DeviceMatcher,
    /// `None` scans only once at start.
    pub scan_interval: Option<Duration>,
    pub log_keys: bool,
}

impl CaptureSettings {
    pub fn from_config(config: &OverlayConfig) -> Self {
        Self {
            input_dir: PathBuf::from(INPUT_DIR),
            matcher: DeviceMatcher::from_config(config),
            scan_interval: (config.hotplug_scan_interval > 0)
                .then(|| Duration::from_secs(config.hotplug_scan_interval)),
            log_keys: config.enable_debug,
        }
    }
}

#[derive(Debug)]
struct OpenDevice {
    file: File,
    path: PathBuf,
}

/// Attached devices, at most [`MAX_DEVICES`].
#[derive(Debug, Default)]
pub struct DeviceTable {
    slots: ArrayVec<OpenDevice, MAX_DEVICES>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.slots.iter().any(|d| d.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.slots.iter().map(|d| d.path.as_path())
    }

    /// Add an open device. Returns false (and drops the file) when full.
    pub fn attach(&mut self, path: PathBuf, file: File) -> bool {
        match self.slots.try_push(OpenDevice { file, path }) {
            Ok(()) => true,
            Err(rejected) => {
                warn!(
                    "Too many input devices, ignoring {}",
                    rejected.element().path.display()
                );
                false
            }
        }
    }

    fn evict(&mut self, index: usize) {
        let device = self.slots.remove(index);
        debug!("Detached input device {}", device.path.display());
    }
}

/// Open `path` read-only and non-blocking.
pub fn open_device(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// The kernel's name for an evdev device, if it answers `EVIOCGNAME`.
pub fn device_name(file: &File) -> Option<String> {
    let mut buf = [0u8; NAME_LEN];
    // SAFETY: the kernel writes at most NAME_LEN - 1 bytes into `buf`.
    let rc = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            eviocgname(NAME_LEN - 1) as _,
            buf.as_mut_ptr(),
        )
    };
    if rc < 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(NAME_LEN - 1);
    Some(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Attach every matching `event*` node under `dir` that is not open yet.
/// Returns how many were attached.
pub fn scan_devices(dir: &Path, matcher: &DeviceMatcher, table: &mut DeviceTable) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot scan {}: {e}", dir.display());
            return 0;
        }
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("event"))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();

    let mut attached = 0;
    for path in candidates {
        if table.contains(&path) {
            continue;
        }
        let Ok(file) = open_device(&path) else {
            trace!("Cannot open {}", path.display());
            continue;
        };
        let matched = matcher.matches_path(&path)
            || (matcher.wants_names()
                && device_name(&file).is_some_and(|name| matcher.matches_name(&name)));
        if !matched {
            continue;
        }
        debug!("Attached input device {}", path.display());
        if table.attach(path, file) {
            attached += 1;
        }
    }
    attached
}

/// Code of the last key-down in a batch of raw `input_event` records.
pub fn last_key_down(bytes: &[u8]) -> Option<i32> {
    bytes
        .chunks_exact(EVENT_SIZE)
        .filter_map(|record| {
            let kind = u16::from_ne_bytes([record[TIME_SIZE], record[TIME_SIZE + 1]]);
            let code = u16::from_ne_bytes([record[TIME_SIZE + 2], record[TIME_SIZE + 3]]);
            let value = i32::from_ne_bytes([
                record[TIME_SIZE + 4],
                record[TIME_SIZE + 5],
                record[TIME_SIZE + 6],
                record[TIME_SIZE + 7],
            ]);
            (kind == EV_KEY && value == KEY_DOWN).then_some(code as i32)
        })
        .last()
}

/// Wait up to `timeout_ms` for input, drain ready devices and publish key
/// presses. Returns the last keycode seen, if any.
pub fn poll_once(
    table: &mut DeviceTable,
    flags: &SharedInputFlags,
    timeout_ms: i32,
    log_keys: bool,
) -> Result<Option<i32>> {
    let mut fds: Vec<libc::pollfd> = table
        .slots
        .iter()
        .map(|d| libc::pollfd {
            fd: d.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    // SAFETY: `fds` is a valid array of `fds.len()` pollfd structs.
    let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if ready < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(None);
        }
        return Err(OverlayError::input(format!("poll failed: {err}")));
    }
    if ready == 0 {
        return Ok(None);
    }

    let mut buf = [0u8; EVENT_SIZE * READ_BATCH];
    let mut evicted = Vec::new();
    let mut last = None;
    for (index, pfd) in fds.iter().enumerate() {
        if pfd.revents == 0 {
            continue;
        }
        let device = &mut table.slots[index];
        match device.file.read(&mut buf) {
            Ok(0) => {
                debug!("Input device {} disconnected", device.path.display());
                evicted.push(index);
            }
            Ok(n) => {
                if let Some(code) = last_key_down(&buf[..n]) {
                    if log_keys {
                        debug!("Key {code} from {}", device.path.display());
                    }
                    flags.record_key_down(code);
                    last = Some(code);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("Read error on {}, removing: {e}", device.path.display());
                evicted.push(index);
            }
        }
    }
    for index in evicted.into_iter().rev() {
        table.evict(index);
    }
    Ok(last)
}

/// Scan and poll until `keep_running` returns false.
pub fn capture_loop(
    settings: &CaptureSettings,
    flags: &SharedInputFlags,
    mut keep_running: impl FnMut() -> bool,
) {
    let mut table = DeviceTable::new();
    let mut last_scan: Option<Instant> = None;
    debug!(
        "Input capture running, scan interval {:?}",
        settings.scan_interval
    );

    while keep_running() {
        let due = match (last_scan, settings.scan_interval) {
            (None, _) => true,
            (Some(at), Some(interval)) => at.elapsed() >= interval,
            (Some(_), None) => false,
        };
        if due {
            scan_devices(&settings.input_dir, &settings.matcher, &mut table);
            last_scan = Some(Instant::now());
            if table.is_empty() {
                warn!("No matching input device attached");
            }
        }

        if let Err(e) = poll_once(&mut table, flags, POLL_TIMEOUT_MS, settings.log_keys) {
            error!("{e}");
            std::thread::sleep(Duration::from_secs(1));
        }
    }
}

extern "C" fn exit_quietly(_signal: libc::c_int) {
    // SAFETY: _exit is async-signal-safe.
    unsafe { libc::_exit(0) }
}

fn parent_gone() -> bool {
    // SAFETY: plain syscall.
    unsafe { libc::getppid() == 1 }
}

/// Body of the forked capture process. Never returns.
pub fn run_child(settings: &CaptureSettings, flags: &SharedInputFlags) -> ! {
    // Other threads of the parent may have held the logger's locks at fork.
    crate::logging::enter_forked_child();

    // SAFETY: plain syscalls on the calling process; the handler only calls
    // _exit.
    unsafe {
        libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM, 0, 0, 0);
        if parent_gone() {
            libc::_exit(0);
        }
        let handler = exit_quietly as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    }

    capture_loop(settings, flags, || !parent_gone());

    // SAFETY: skip the parent's atexit handlers and destructors.
    unsafe { libc::_exit(0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn event(kind: u16, code: u16, value: i32) -> Vec<u8> {
        let mut record = vec![0u8; EVENT_SIZE];
        record[TIME_SIZE..TIME_SIZE + 2].copy_from_slice(&kind.to_ne_bytes());
        record[TIME_SIZE + 2..TIME_SIZE + 4].copy_from_slice(&code.to_ne_bytes());
        record[TIME_SIZE + 4..TIME_SIZE + 8].copy_from_slice(&value.to_ne_bytes());
        record
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bongocat-input-{tag}-{}-{}",
            std::process::id(),
            fastrand::u32(..)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_events(path: &Path, events: &[Vec<u8>]) {
        let mut file = File::create(path).unwrap();
        for e in events {
            file.write_all(e).unwrap();
        }
    }

    #[test]
    fn test_last_key_down_filters_events() {
        let mut bytes = Vec::new();
        bytes.extend(event(0x04, 4, 30)); // EV_MSC scan code
        bytes.extend(event(EV_KEY, 30, 1));
        bytes.extend(event(EV_KEY, 30, 0)); // release
        bytes.extend(event(EV_KEY, 31, 2)); // autorepeat
        bytes.extend(event(0x00, 0, 0)); // EV_SYN
        assert_eq!(last_key_down(&bytes), Some(30));
        assert_eq!(last_key_down(&event(EV_KEY, 30, 0)), None);
        assert_eq!(last_key_down(&[]), None);
    }

    #[test]
    fn test_eviocgname_request_number() {
        // EVIOCGNAME(255) as computed by <linux/input.h>
        assert_eq!(eviocgname(255), 0x80FF_4506);
    }

    #[test]
    fn test_matcher_by_path_and_name() {
        let m = DeviceMatcher::new(
            [PathBuf::from("/dev/input/event4")],
            vec!["Keychron".to_string()],
        );
        assert!(m.matches_path(Path::new("/dev/input/event4")));
        assert!(!m.matches_path(Path::new("/dev/input/event5")));
        assert!(m.matches_name("Keychron K2 Keyboard"));
        assert!(!m.matches_name("Logitech Mouse"));
    }

    #[test]
    fn test_scan_attaches_listed_paths_once() {
        let dir = temp_dir("scan");
        write_events(&dir.join("event0"), &[]);
        write_events(&dir.join("event1"), &[]);
        write_events(&dir.join("mouse0"), &[]);
        let matcher = DeviceMatcher::new([dir.join("event1"), dir.join("mouse0")], Vec::new());

        let mut table = DeviceTable::new();
        assert_eq!(scan_devices(&dir, &matcher, &mut table), 1);
        assert!(table.contains(&dir.join("event1")));
        assert_eq!(scan_devices(&dir, &matcher, &mut table), 0);
        assert_eq!(table.len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_poll_publishes_key_and_evicts_at_eof() {
        let dir = temp_dir("poll");
        let path = dir.join("event3");
        write_events(
            &path,
            &[event(EV_KEY, 38, 1), event(0x00, 0, 0), event(EV_KEY, 38, 0)],
        );
        let mut table = DeviceTable::new();
        table.attach(path.clone(), open_device(&path).unwrap());
        let flags = SharedInputFlags::new().unwrap();

        assert_eq!(poll_once(&mut table, &flags, 0, true).unwrap(), Some(38));
        assert_eq!(flags.take_press(), Some(38));
        assert_eq!(table.len(), 1);

        // regular files report EOF on the next read, like an unplugged device
        assert_eq!(poll_once(&mut table, &flags, 0, false).unwrap(), None);
        assert!(table.is_empty());
        assert!(!flags.is_pressed());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_poll_with_no_devices_times_out() {
        let mut table = DeviceTable::new();
        let flags = SharedInputFlags::new().unwrap();
        assert_eq!(poll_once(&mut table, &flags, 0, false).unwrap(), None);
    }

    #[test]
    fn test_table_is_bounded() {
        let dir = temp_dir("bounded");
        let path = dir.join("event0");
        write_events(&path, &[]);
        let mut table = DeviceTable::new();
        for i in 0..MAX_DEVICES {
            assert!(table.attach(dir.join(format!("event{i}")), open_device(&path).unwrap()));
        }
        assert!(!table.attach(dir.join("event99"), open_device(&path).unwrap()));
        assert_eq!(table.len(), MAX_DEVICES);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_capture_loop_scans_then_stops() {
        let dir = temp_dir("loop");
        let path = dir.join("event7");
        write_events(&path, &[event(EV_KEY, 57, 1)]);
        let settings = CaptureSettings {
            input_dir: dir.clone(),
            matcher: DeviceMatcher::new([path], Vec::new()),
            scan_interval: None,
            log_keys: false,
        };
        let flags = SharedInputFlags::new().unwrap();
        let mut rounds = 0;
        capture_loop(&settings, &flags, || {
            rounds += 1;
            rounds <= 2
        });
        assert_eq!(flags.take_press(), Some(57));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
