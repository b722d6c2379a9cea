//! Fullscreen detection by asking the compositor's CLI.
//!
//! Every [`POLL_INTERVAL`] a background thread runs `hyprctl activewindow`
//! and, when that reports no window, `swaymsg -t get_tree`. Only a
//! fullscreen window on the bar's own output counts: Hyprland's active
//! window is matched to the output through `hyprctl monitors`, and the sway
//! tree is searched below the output node of that name. Without an output
//! name any fullscreen window counts. A change in the answer is posted to
//! the main loop as [`OverlayEvent::FullscreenChanged`]. Missing tools
//! simply read as "not fullscreen".
//!
//! The wlr foreign-toplevel protocol would avoid spawning processes, but
//! smithay-client-toolkit ships no binding for it.
//!
//! [`FullscreenPoller::shutdown`] stops the thread through a command
//! channel and joins it.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, info};
use serde_json::Value;
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::error::{OverlayError, Result};
use crate::events::overlay::{OverlayEvent, OverlaySender};
use crate::resources::overlayconfig::{Layer, OverlayConfig};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Whether `config` asks for fullscreen hiding at all. A bar on the overlay
/// layer already sits above fullscreen windows.
pub fn wants_fullscreen_detection(config: &OverlayConfig) -> bool {
    !config.disable_fullscreen_hide && config.layer != Layer::Overlay
}

/// Hyprland's active window as far as fullscreen hiding cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub monitor_id: Option<i64>,
    pub fullscreen: bool,
}

/// Parse `hyprctl activewindow`, `None` when it describes no window.
pub fn parse_hyprctl_active_window(output: &str) -> Option<ActiveWindow> {
    let mut has_window = false;
    let mut window = ActiveWindow {
        monitor_id: None,
        fullscreen: false,
    };
    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("monitor:") {
            has_window = true;
            window.monitor_id = value.trim().parse().ok();
        }
        if let Some(value) = line.strip_prefix("fullscreen:") {
            has_window = true;
            if let Ok(n) = value.trim().parse::<i64>() {
                window.fullscreen = n != 0;
            }
        }
    }
    has_window.then_some(window)
}

/// `(id, name)` pairs from `hyprctl monitors`. Accepts both
/// `Monitor DP-1 (ID 0):` and `Monitor 0 "DP-1"`.
pub fn parse_hyprctl_monitors(output: &str) -> Vec<(i64, String)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Monitor ")?;
            if let Some((name, tail)) = rest.split_once(" (ID ") {
                let id = tail.split(')').next()?.trim().parse().ok()?;
                return Some((id, name.trim().to_string()));
            }
            let (id, name) = rest.split_once(' ')?;
            let name = name.trim().trim_end_matches(':').trim_matches('"');
            Some((id.trim().parse().ok()?, name.to_string()))
        })
        .collect()
}

/// True when `window` is fullscreen on the output called `output`. An
/// output Hyprland does not list cannot be told apart, so the window's own
/// state decides.
pub fn hyprland_fullscreen_on(
    window: &ActiveWindow,
    monitors: &[(i64, String)],
    output: Option<&str>,
) -> bool {
    if !window.fullscreen {
        return false;
    }
    let Some(output) = output else {
        return true;
    };
    match monitors.iter().find(|(_, name)| name == output) {
        Some((id, _)) => window.monitor_id == Some(*id),
        None => true,
    }
}

/// True when a sway tree dump has a fullscreen container on `output` (any
/// output when `None`). Global fullscreen covers every output. Text that
/// is not JSON falls back to a plain search.
pub fn parse_sway_tree(output: &str, on: Option<&str>) -> bool {
    let Ok(tree) = serde_json::from_str::<Value>(output) else {
        return output.contains("\"fullscreen_mode\":1")
            || output.contains("\"fullscreen_mode\": 1");
    };
    if has_fullscreen(&tree, |mode| mode == 2) {
        return true;
    }
    let Some(name) = on else {
        return has_fullscreen(&tree, |mode| mode != 0);
    };
    let mut outputs = Vec::new();
    collect_outputs(&tree, name, &mut outputs);
    if outputs.is_empty() {
        return has_fullscreen(&tree, |mode| mode != 0);
    }
    outputs
        .into_iter()
        .any(|node| has_fullscreen(node, |mode| mode != 0))
}

fn children(node: &Value) -> impl Iterator<Item = &Value> {
    ["nodes", "floating_nodes"]
        .into_iter()
        .filter_map(move |key| node.get(key).and_then(Value::as_array))
        .flatten()
}

fn collect_outputs<'a>(node: &'a Value, name: &str, found: &mut Vec<&'a Value>) {
    let is_output = node.get("type").and_then(Value::as_str) == Some("output");
    if is_output && node.get("name").and_then(Value::as_str) == Some(name) {
        found.push(node);
        return;
    }
    for child in children(node) {
        collect_outputs(child, name, found);
    }
}

fn has_fullscreen(node: &Value, wanted: impl Fn(i64) -> bool + Copy) -> bool {
    node.get("fullscreen_mode")
        .and_then(Value::as_i64)
        .is_some_and(wanted)
        || children(node).any(|child| has_fullscreen(child, wanted))
}

fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One query round for the bar on `output`.
pub fn query_fullscreen(output: Option<&str>) -> bool {
    let window =
        run_tool("hyprctl", &["activewindow"]).and_then(|out| parse_hyprctl_active_window(&out));
    if let Some(window) = window {
        let monitors = match output {
            Some(_) if window.fullscreen => run_tool("hyprctl", &["monitors"])
                .map(|out| parse_hyprctl_monitors(&out))
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        return hyprland_fullscreen_on(&window, &monitors, output);
    }
    run_tool("swaymsg", &["-t", "get_tree"]).is_some_and(|out| parse_sway_tree(&out, output))
}

/// Commands sent to the poller thread.
#[derive(Debug)]
enum PollerCmd {
    Shutdown,
}

/// Handle to the polling thread.
pub struct FullscreenPoller {
    tx_cmd: Sender<PollerCmd>,
    handle: std::thread::JoinHandle<()>,
}

impl FullscreenPoller {
    /// Spawn the thread. `query` is called once per interval.
    pub fn spawn(
        events: OverlaySender,
        interval: Duration,
        query: impl Fn() -> bool + Send + 'static,
    ) -> Result<Self> {
        let (tx_cmd, rx_cmd) = unbounded::<PollerCmd>();
        let handle = std::thread::Builder::new()
            .name("fullscreen".to_string())
            .spawn(move || poll_thread(rx_cmd, events, interval, query))
            .map_err(|e| OverlayError::thread(format!("failed to spawn fullscreen poller: {e}")))?;
        info!("Fullscreen detection polling every {interval:?}");
        Ok(Self { tx_cmd, handle })
    }

    pub fn shutdown(self) {
        let _ = self.tx_cmd.send(PollerCmd::Shutdown);
        let _ = self.handle.join();
    }
}

fn poll_thread(
    rx_cmd: Receiver<PollerCmd>,
    events: OverlaySender,
    interval: Duration,
    query: impl Fn() -> bool,
) {
    let mut last = false;
    loop {
        let now = query();
        if now != last {
            debug!("Fullscreen state changed: {now}");
            last = now;
            if !events.send(OverlayEvent::FullscreenChanged(now)) {
                break;
            }
        }
        match rx_cmd.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(PollerCmd::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
