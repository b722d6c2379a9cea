//! Overlay configuration snapshot.
//!
//! Settings come from a flat `key = value` file with `#` comments. Every key
//! is optional; missing or malformed values keep their defaults, and numbers
//! outside their range are clamped with a warning rather than rejected. The
//! resulting [`OverlayConfig`] is treated as immutable: hot reload builds a
//! fresh snapshot and swaps it in whole.
//!
//! # Configuration File Format
//!
//! ```ini
//! # appearance
//! cat_height = 40
//! overlay_height = 50
//! overlay_position = top      # top | bottom
//! cat_align = center          # left | center | right
//! animation_name = bongocat   # or a creature, e.g. dm:agumon
//!
//! # timing
//! fps = 60
//! keypress_duration = 100     # ms
//! test_animation_interval = 0 # s, 0 disables
//!
//! # input
//! keyboard_device = /dev/input/event4, /dev/input/event7
//! keyboard_name = AT Translated Set 2 keyboard
//!
//! # quiet hours
//! enable_scheduled_sleep = 1
//! sleep_begin = 22:00
//! sleep_end = 06:00
//! ```
//!
//! List values (`keyboard_device`, `keyboard_name`) are comma separated.
//!
//! # Assets
//!
//! A relative `asset_dir` is resolved against the config file's directory.
//! Without the key the first of these holding `bongo-cat-both-up.png` wins:
//! `$XDG_DATA_HOME/bongocat/assets`, `~/.local/share/bongocat/assets`,
//! `/usr/local/share/bongocat/assets`, `/usr/share/bongocat/assets`,
//! `assets/` next to the executable, and finally `./assets`.
//!
//! # Related
//!
//! - [`crate::systems::configwatcher`] – reloads the file when it changes
//! - [`crate::resources::animationcontext::AnimationContext::update_config`]
//!   – swaps a new snapshot in under the animation lock

use configparser::ini::Ini;
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::components::animationset::CatRole;
use crate::components::sleepwindow::{ClockTime, SleepWindow};
use crate::error::{OverlayError, Result};
use crate::resources::framestore::{CAT_SET_NAME, is_known_creature};

/// Keys outside any `[section]` land here.
const SECTION: &str = "default";

pub const DEFAULT_CAT_X_OFFSET: i32 = 100;
pub const DEFAULT_CAT_Y_OFFSET: i32 = 10;
pub const DEFAULT_CAT_HEIGHT: i32 = 40;
pub const DEFAULT_OVERLAY_HEIGHT: i32 = 50;
pub const DEFAULT_IDLE_FRAME: usize = 0;
pub const DEFAULT_KEYPRESS_DURATION_MS: u64 = 100;
pub const DEFAULT_TEST_ANIMATION_DURATION_MS: u64 = 200;
pub const DEFAULT_TEST_ANIMATION_INTERVAL_SEC: u64 = 0;
pub const DEFAULT_FPS: u32 = 60;
pub const DEFAULT_OVERLAY_OPACITY: u8 = 150;
pub const DEFAULT_HOTPLUG_SCAN_INTERVAL_SEC: u64 = 300;
pub const DEFAULT_KEYBOARD_DEVICE: &str = "/dev/input/event4";
pub const DEFAULT_ASSET_DIR: &str = "./assets";
pub const CONFIG_FILE_NAME: &str = "bongocat.conf";

const CAT_HEIGHT_RANGE: (i64, i64) = (10, 200);
const OVERLAY_HEIGHT_RANGE: (i64, i64) = (20, 300);
const FPS_RANGE: (i64, i64) = (1, 120);
const DURATION_RANGE: (i64, i64) = (10, 5000);
const INTERVAL_RANGE: (i64, i64) = (0, 3600);
const OPACITY_RANGE: (i64, i64) = (0, 255);

const KNOWN_KEYS: &[&str] = &[
    "cat_x_offset",
    "cat_y_offset",
    "cat_height",
    "overlay_height",
    "idle_frame",
    "keypress_duration",
    "test_animation_duration",
    "test_animation_interval",
    "fps",
    "overlay_opacity",
    "mirror_x",
    "mirror_y",
    "enable_antialiasing",
    "enable_hand_mapping",
    "enable_debug",
    "enable_scheduled_sleep",
    "sleep_begin",
    "sleep_end",
    "idle_sleep_timeout",
    "hotplug_scan_interval",
    "disable_fullscreen_hide",
    "layer",
    "overlay_position",
    "cat_align",
    "animation_name",
    "invert_color",
    "crop_sprite",
    "padding_x",
    "padding_y",
    "keyboard_device",
    "keyboard_devices",
    "keyboard_name",
    "monitor",
    "asset_dir",
];

/// Compositor stacking layer of the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    #[default]
    Top,
    /// Above fullscreen windows; the bar is never hidden.
    Overlay,
}

/// Screen edge the bar is docked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPosition {
    #[default]
    Top,
    Bottom,
}

/// Horizontal placement of the sprite inside the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayConfig {
    pub cat_x_offset: i32,
    pub cat_y_offset: i32,
    /// Rendered sprite height in pixels.
    pub cat_height: i32,
    /// Bar height in pixels, also the exclusive zone.
    pub overlay_height: i32,
    pub idle_frame: usize,
    /// Milliseconds a key-press pose is held.
    pub keypress_duration: u64,
    /// Milliseconds a test-animation pose is held.
    pub test_animation_duration: u64,
    /// Seconds between test animations, `0` disables them.
    pub test_animation_interval: u64,
    pub fps: u32,
    pub overlay_opacity: u8,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub enable_antialiasing: bool,
    pub enable_hand_mapping: bool,
    pub enable_debug: bool,
    pub enable_scheduled_sleep: bool,
    pub sleep_begin: ClockTime,
    pub sleep_end: ClockTime,
    /// Seconds without input before the sprite falls asleep, `0` disables.
    pub idle_sleep_timeout: u64,
    /// Seconds between `/dev/input` rescans, `0` scans only at start.
    pub hotplug_scan_interval: u64,
    pub disable_fullscreen_hide: bool,
    pub layer: Layer,
    pub overlay_position: OverlayPosition,
    pub cat_align: CatAlign,
    pub animation_name: String,
    pub invert_color: bool,
    pub crop_sprite: bool,
    pub padding_x: u32,
    pub padding_y: u32,
    pub keyboard_devices: Vec<PathBuf>,
    pub keyboard_names: Vec<String>,
    pub monitor: Option<String>,
    pub asset_dir: PathBuf,
    /// File this snapshot was read from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp `value` into `range`, warning when it was outside.
fn clamp_logged(key: &str, value: i64, (min, max): (i64, i64)) -> i64 {
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        warn!("{key} {value} out of range [{min}-{max}], clamping to {clamped}");
        clamped
    } else {
        value
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl OverlayConfig {
    /// Configuration with the built-in defaults and no input devices.
    pub fn new() -> Self {
        Self {
            cat_x_offset: DEFAULT_CAT_X_OFFSET,
            cat_y_offset: DEFAULT_CAT_Y_OFFSET,
            cat_height: DEFAULT_CAT_HEIGHT,
            overlay_height: DEFAULT_OVERLAY_HEIGHT,
            idle_frame: DEFAULT_IDLE_FRAME,
            keypress_duration: DEFAULT_KEYPRESS_DURATION_MS,
            test_animation_duration: DEFAULT_TEST_ANIMATION_DURATION_MS,
            test_animation_interval: DEFAULT_TEST_ANIMATION_INTERVAL_SEC,
            fps: DEFAULT_FPS,
            overlay_opacity: DEFAULT_OVERLAY_OPACITY,
            mirror_x: false,
            mirror_y: false,
            enable_antialiasing: true,
            enable_hand_mapping: true,
            enable_debug: false,
            enable_scheduled_sleep: false,
            sleep_begin: ClockTime::default(),
            sleep_end: ClockTime::default(),
            idle_sleep_timeout: 0,
            hotplug_scan_interval: DEFAULT_HOTPLUG_SCAN_INTERVAL_SEC,
            disable_fullscreen_hide: false,
            layer: Layer::default(),
            overlay_position: OverlayPosition::default(),
            cat_align: CatAlign::default(),
            animation_name: CAT_SET_NAME.to_string(),
            invert_color: false,
            crop_sprite: true,
            padding_x: 0,
            padding_y: 0,
            keyboard_devices: Vec::new(),
            keyboard_names: Vec::new(),
            monitor: None,
            asset_dir: PathBuf::from(DEFAULT_ASSET_DIR),
            config_path: None,
        }
    }

    /// Load from `path`, or from the first config file found in the usual
    /// locations. With no file at all the validated defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => Self::from_file(&path),
            None => {
                info!("No config file found, using defaults");
                let mut config = Self::new();
                config.asset_dir = default_asset_dir();
                config.validate();
                Ok(config)
            }
        }
    }

    /// Read and validate a config file.
    ///
    /// A relative `asset_dir` is taken relative to the file's directory.
    /// Without `asset_dir` the standard asset locations are searched.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OverlayError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let base = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut config = Self::parse(&text, Some(base))?;
        config.config_path = Some(path.to_path_buf());
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate config text. Paths are kept as written.
    pub fn from_str_contents(text: &str) -> Result<Self> {
        Self::parse(text, None)
    }

    fn parse(text: &str, base: Option<&Path>) -> Result<Self> {
        let mut ini = Ini::new();
        ini.set_inline_comment_symbols(Some(&['#']));
        ini.read(text.to_string())
            .map_err(|e| OverlayError::config(format!("failed to parse config: {e}")))?;

        let mut config = Self::new();
        config.apply(&ini, base);
        config.validate();
        Ok(config)
    }

    fn apply(&mut self, ini: &Ini, base: Option<&Path>) {
        if let Some(section) = ini.get_map_ref().get(SECTION) {
            for key in section.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    warn!("Unknown configuration key '{key}'");
                }
            }
        }

        let int = |key: &str| -> Option<i64> {
            match ini.getint(SECTION, key) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring {key}: {e}");
                    None
                }
            }
        };
        let flag = |key: &str| -> Option<bool> {
            match ini.getboolcoerce(SECTION, key) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Ignoring {key}: {e}");
                    None
                }
            }
        };
        let text = |key: &str| -> Option<String> {
            ini.get(SECTION, key).filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = int("cat_x_offset") {
            self.cat_x_offset = v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        }
        if let Some(v) = int("cat_y_offset") {
            self.cat_y_offset = v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        }
        if let Some(v) = int("cat_height") {
            self.cat_height = clamp_logged("cat_height", v, CAT_HEIGHT_RANGE) as i32;
        }
        if let Some(v) = int("overlay_height") {
            self.overlay_height = clamp_logged("overlay_height", v, OVERLAY_HEIGHT_RANGE) as i32;
        }
        if let Some(v) = int("idle_frame") {
            self.idle_frame = clamp_logged("idle_frame", v, (0, 3)) as usize;
        }
        if let Some(v) = int("keypress_duration") {
            self.keypress_duration = clamp_logged("keypress_duration", v, DURATION_RANGE) as u64;
        }
        if let Some(v) = int("test_animation_duration") {
            self.test_animation_duration =
                clamp_logged("test_animation_duration", v, DURATION_RANGE) as u64;
        }
        if let Some(v) = int("test_animation_interval") {
            self.test_animation_interval =
                clamp_logged("test_animation_interval", v, INTERVAL_RANGE) as u64;
        }
        if let Some(v) = int("fps") {
            self.fps = clamp_logged("fps", v, FPS_RANGE) as u32;
        }
        if let Some(v) = int("overlay_opacity") {
            self.overlay_opacity = clamp_logged("overlay_opacity", v, OPACITY_RANGE) as u8;
        }
        if let Some(v) = int("idle_sleep_timeout") {
            self.idle_sleep_timeout = clamp_logged("idle_sleep_timeout", v, (0, i64::MAX)) as u64;
        }
        if let Some(v) = int("hotplug_scan_interval") {
            self.hotplug_scan_interval =
                clamp_logged("hotplug_scan_interval", v, INTERVAL_RANGE) as u64;
        }
        if let Some(v) = int("padding_x") {
            self.padding_x = clamp_logged("padding_x", v, (0, u16::MAX as i64)) as u32;
        }
        if let Some(v) = int("padding_y") {
            self.padding_y = clamp_logged("padding_y", v, (0, u16::MAX as i64)) as u32;
        }

        for (key, slot) in [
            ("mirror_x", &mut self.mirror_x),
            ("mirror_y", &mut self.mirror_y),
            ("enable_antialiasing", &mut self.enable_antialiasing),
            ("enable_hand_mapping", &mut self.enable_hand_mapping),
            ("enable_debug", &mut self.enable_debug),
            ("enable_scheduled_sleep", &mut self.enable_scheduled_sleep),
            ("disable_fullscreen_hide", &mut self.disable_fullscreen_hide),
            ("invert_color", &mut self.invert_color),
            ("crop_sprite", &mut self.crop_sprite),
        ] {
            if let Some(v) = flag(key) {
                *slot = v;
            }
        }

        for (key, slot) in [
            ("sleep_begin", &mut self.sleep_begin),
            ("sleep_end", &mut self.sleep_end),
        ] {
            if let Some(v) = text(key) {
                match v.parse::<ClockTime>() {
                    Ok(time) => *slot = time,
                    Err(_) => warn!("Invalid {key} '{v}', expected HH:MM"),
                }
            }
        }

        if let Some(v) = text("layer") {
            self.layer = match v.to_ascii_lowercase().as_str() {
                "top" => Layer::Top,
                "overlay" => Layer::Overlay,
                _ => {
                    warn!("Invalid layer '{v}', using 'top'");
                    Layer::Top
                }
            };
        }
        if let Some(v) = text("overlay_position") {
            self.overlay_position = match v.to_ascii_lowercase().as_str() {
                "top" => OverlayPosition::Top,
                "bottom" => OverlayPosition::Bottom,
                _ => {
                    warn!("Invalid overlay_position '{v}', using 'top'");
                    OverlayPosition::Top
                }
            };
        }
        if let Some(v) = text("cat_align") {
            self.cat_align = match v.to_ascii_lowercase().as_str() {
                "left" => CatAlign::Left,
                "center" => CatAlign::Center,
                "right" => CatAlign::Right,
                _ => {
                    warn!("Invalid cat_align '{v}', using 'center'");
                    CatAlign::Center
                }
            };
        }
        if let Some(v) = text("animation_name") {
            self.animation_name = normalize_animation_name(&v);
        }

        for key in ["keyboard_device", "keyboard_devices"] {
            if let Some(v) = text(key) {
                self.keyboard_devices.extend(split_list(&v).map(PathBuf::from));
            }
        }
        if let Some(v) = text("keyboard_name") {
            self.keyboard_names.extend(split_list(&v).map(str::to_string));
        }
        if let Some(v) = text("monitor") {
            self.monitor = Some(v.trim().to_string());
        }
        match (text("asset_dir"), base) {
            (Some(v), Some(base)) => self.asset_dir = base.join(v.trim()),
            (Some(v), None) => self.asset_dir = PathBuf::from(v.trim()),
            (None, Some(_)) => self.asset_dir = default_asset_dir(),
            (None, None) => {}
        }
    }

    /// Cross-field checks run after every load.
    pub fn validate(&mut self) {
        if !self.is_simple_cat() && self.idle_frame > 1 {
            warn!(
                "idle_frame {} out of range [0-1] for {}, resetting to 0",
                self.idle_frame, self.animation_name
            );
            self.idle_frame = 0;
        }

        if self.enable_scheduled_sleep && self.sleep_begin == self.sleep_end {
            info!(
                "sleep_begin equals sleep_end ({}), sleeping all day",
                self.sleep_begin
            );
        }

        dedup_keep_first(&mut self.keyboard_devices);
        dedup_keep_first(&mut self.keyboard_names);
        if self.keyboard_devices.is_empty() && self.keyboard_names.is_empty() {
            debug!("No keyboard configured, defaulting to {DEFAULT_KEYBOARD_DEVICE}");
            self.keyboard_devices.push(PathBuf::from(DEFAULT_KEYBOARD_DEVICE));
        }
    }

    pub fn is_simple_cat(&self) -> bool {
        self.animation_name == CAT_SET_NAME
    }

    pub fn sleep_window(&self) -> SleepWindow {
        SleepWindow::new(self.sleep_begin, self.sleep_end)
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    pub fn keypress_hold(&self) -> Duration {
        Duration::from_millis(self.keypress_duration)
    }

    pub fn test_animation_hold(&self) -> Duration {
        Duration::from_millis(self.test_animation_duration)
    }

    /// True when the input capture process must be restarted to apply `other`.
    pub fn input_settings_differ(&self, other: &OverlayConfig) -> bool {
        !same_members(&self.keyboard_devices, &other.keyboard_devices)
            || !same_members(&self.keyboard_names, &other.keyboard_names)
            || self.hotplug_scan_interval != other.hotplug_scan_interval
    }

    /// True when the frame store must be rebuilt to apply `other`.
    pub fn asset_settings_differ(&self, other: &OverlayConfig) -> bool {
        self.animation_name != other.animation_name
            || self.invert_color != other.invert_color
            || self.crop_sprite != other.crop_sprite
            || self.padding_x != other.padding_x
            || self.padding_y != other.padding_y
            || self.asset_dir != other.asset_dir
    }

    /// True when the layer surface must be recreated to apply `other`.
    pub fn surface_settings_differ(&self, other: &OverlayConfig) -> bool {
        self.overlay_height != other.overlay_height
            || self.overlay_position != other.overlay_position
            || self.layer != other.layer
            || self.monitor != other.monitor
    }
}

/// Drop repeated entries anywhere in `list`, keeping first occurrences in
/// order.
fn dedup_keep_first<T: Eq + Hash + Clone>(list: &mut Vec<T>) {
    let mut seen = FxHashSet::default();
    list.retain(|item| seen.insert(item.clone()));
}

/// Order-insensitive comparison of two deduplicated lists.
fn same_members<T: Eq + Hash>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().collect::<FxHashSet<_>>() == b.iter().collect::<FxHashSet<_>>()
}

/// Lower-case an animation name and strip the `dm:`/`dm20:` prefixes.
/// Unknown names fall back to the cat.
pub fn normalize_animation_name(value: &str) -> String {
    let lower = value.trim().to_ascii_lowercase();
    let name = lower
        .strip_prefix("dm20:")
        .or_else(|| lower.strip_prefix("dm:"))
        .unwrap_or(&lower);
    if name == CAT_SET_NAME || is_known_creature(name) {
        name.to_string()
    } else {
        warn!("Invalid animation_name '{value}', using '{CAT_SET_NAME}'");
        CAT_SET_NAME.to_string()
    }
}

/// Candidate config paths in lookup order.
pub fn config_search_paths(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
    cwd: &Path,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(xdg) = xdg_config_home.filter(|p| !p.as_os_str().is_empty()) {
        paths.push(xdg.join("bongocat").join(CONFIG_FILE_NAME));
    }
    if let Some(home) = home.filter(|p| !p.as_os_str().is_empty()) {
        paths.push(home.join(".config").join("bongocat").join(CONFIG_FILE_NAME));
    }
    paths.push(cwd.join(CONFIG_FILE_NAME));
    paths
}

/// First existing config file among the standard locations.
pub fn default_config_path() -> Option<PathBuf> {
    let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    config_search_paths(xdg.as_deref(), home.as_deref(), &cwd)
        .into_iter()
        .find(|p| p.is_file())
}

/// Candidate asset directories in lookup order.
pub fn asset_search_paths(
    xdg_data_home: Option<&Path>,
    home: Option<&Path>,
    exe_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(xdg) = xdg_data_home.filter(|p| !p.as_os_str().is_empty()) {
        paths.push(xdg.join("bongocat").join("assets"));
    }
    if let Some(home) = home.filter(|p| !p.as_os_str().is_empty()) {
        paths.push(home.join(".local/share/bongocat/assets"));
    }
    paths.push(PathBuf::from("/usr/local/share/bongocat/assets"));
    paths.push(PathBuf::from("/usr/share/bongocat/assets"));
    if let Some(dir) = exe_dir {
        paths.push(dir.join("assets"));
    }
    paths
}

/// First candidate holding the cat assets.
pub fn find_asset_dir(candidates: &[PathBuf]) -> Option<PathBuf> {
    let marker = format!("{}.png", CatRole::BothUp.asset_stem());
    candidates.iter().find(|dir| dir.join(&marker).is_file()).cloned()
}

/// Installed asset directory, or [`DEFAULT_ASSET_DIR`] when none is found.
pub fn default_asset_dir() -> PathBuf {
    let xdg = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from);
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let candidates = asset_search_paths(xdg.as_deref(), home.as_deref(), exe_dir.as_deref());
    find_asset_dir(&candidates).unwrap_or_else(|| {
        debug!("No installed assets found, using {DEFAULT_ASSET_DIR}");
        PathBuf::from(DEFAULT_ASSET_DIR)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = OverlayConfig::from_str_contents("").unwrap();
        assert_eq!(c.fps, 60);
        assert_eq!(c.cat_height, 40);
        assert_eq!(c.overlay_height, 50);
        assert_eq!(c.overlay_opacity, 150);
        assert_eq!(c.keypress_duration, 100);
        assert_eq!(c.test_animation_duration, 200);
        assert_eq!(c.hotplug_scan_interval, 300);
        assert!(c.enable_antialiasing);
        assert!(c.enable_hand_mapping);
        assert!(!c.mirror_x);
        assert_eq!(c.layer, Layer::Top);
        assert_eq!(c.cat_align, CatAlign::Center);
        assert_eq!(c.animation_name, "bongocat");
        assert_eq!(c.keyboard_devices, vec![PathBuf::from(DEFAULT_KEYBOARD_DEVICE)]);
    }

    #[test]
    fn test_parse_values_and_inline_comments() {
        let c = OverlayConfig::from_str_contents(
            "# comment\n\
             fps = 30 # half rate\n\
             cat_height=80\n\
             mirror_x = 1\n\
             enable_antialiasing = 0\n\
             layer = overlay\n\
             overlay_position = bottom\n\
             cat_align = right\n\
             sleep_begin = 22:30\n\
             sleep_end = 06:15\n\
             enable_scheduled_sleep = true\n",
        )
        .unwrap();
        assert_eq!(c.fps, 30);
        assert_eq!(c.cat_height, 80);
        assert!(c.mirror_x);
        assert!(!c.enable_antialiasing);
        assert_eq!(c.layer, Layer::Overlay);
        assert_eq!(c.overlay_position, OverlayPosition::Bottom);
        assert_eq!(c.cat_align, CatAlign::Right);
        assert!(c.enable_scheduled_sleep);
        assert_eq!(c.sleep_begin.to_string(), "22:30");
        assert_eq!(c.sleep_end.to_string(), "06:15");
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let c = OverlayConfig::from_str_contents(
            "fps = 0\ncat_height = 5000\noverlay_opacity = -3\nkeypress_duration = 1\n\
             test_animation_interval = 99999\nidle_frame = 7\npadding_x = -4\n",
        )
        .unwrap();
        assert_eq!(c.fps, 1);
        assert_eq!(c.cat_height, 200);
        assert_eq!(c.overlay_opacity, 0);
        assert_eq!(c.keypress_duration, 10);
        assert_eq!(c.test_animation_interval, 3600);
        assert_eq!(c.idle_frame, 3);
        assert_eq!(c.padding_x, 0);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let c = OverlayConfig::from_str_contents(
            "fps = fast\nsleep_begin = 25:00\nlayer = sideways\nmystery_key = 4\n",
        )
        .unwrap();
        assert_eq!(c.fps, DEFAULT_FPS);
        assert_eq!(c.sleep_begin, ClockTime::default());
        assert_eq!(c.layer, Layer::Top);
    }

    #[test]
    fn test_device_and_name_lists() {
        let c = OverlayConfig::from_str_contents(
            "keyboard_device = /dev/input/event3, /dev/input/event9\n\
             keyboard_name = Keychron, AT Translated Set 2 keyboard\n",
        )
        .unwrap();
        assert_eq!(
            c.keyboard_devices,
            vec![
                PathBuf::from("/dev/input/event3"),
                PathBuf::from("/dev/input/event9")
            ]
        );
        assert_eq!(c.keyboard_names, vec!["Keychron", "AT Translated Set 2 keyboard"]);
    }

    #[test]
    fn test_repeated_list_entries_are_dropped() {
        let c = OverlayConfig::from_str_contents(
            "keyboard_device = /dev/input/event3, /dev/input/event9, /dev/input/event3\n\
             keyboard_name = Keychron, Logitech, Keychron\n",
        )
        .unwrap();
        assert_eq!(
            c.keyboard_devices,
            vec![
                PathBuf::from("/dev/input/event3"),
                PathBuf::from("/dev/input/event9")
            ]
        );
        assert_eq!(c.keyboard_names, vec!["Keychron", "Logitech"]);
    }

    #[test]
    fn test_reordered_devices_need_no_restart() {
        let a = OverlayConfig::from_str_contents(
            "keyboard_device = /dev/input/event3, /dev/input/event9\n",
        )
        .unwrap();
        let b = OverlayConfig::from_str_contents(
            "keyboard_device = /dev/input/event9, /dev/input/event3, /dev/input/event9\n",
        )
        .unwrap();
        assert!(!a.input_settings_differ(&b));
        let c = OverlayConfig::from_str_contents("keyboard_device = /dev/input/event9\n").unwrap();
        assert!(a.input_settings_differ(&c));
    }

    #[test]
    fn test_names_only_skip_default_device() {
        let c = OverlayConfig::from_str_contents("keyboard_name = Keychron\n").unwrap();
        assert!(c.keyboard_devices.is_empty());
    }

    #[test]
    fn test_animation_name_prefixes() {
        assert_eq!(normalize_animation_name("dm:Agumon"), "agumon");
        assert_eq!(normalize_animation_name("dm20:greymon"), "greymon");
        assert_eq!(normalize_animation_name("bongocat"), "bongocat");
        assert_eq!(normalize_animation_name("pikachu"), "bongocat");
    }

    #[test]
    fn test_creature_idle_frame_limited() {
        let c = OverlayConfig::from_str_contents("animation_name = agumon\nidle_frame = 3\n")
            .unwrap();
        assert_eq!(c.idle_frame, 0);
        let c = OverlayConfig::from_str_contents("animation_name = agumon\nidle_frame = 1\n")
            .unwrap();
        assert_eq!(c.idle_frame, 1);
    }

    #[test]
    fn test_change_detection() {
        let a = OverlayConfig::from_str_contents("fps = 30\n").unwrap();
        let mut b = a.clone();
        b.fps = 60;
        assert!(!a.input_settings_differ(&b));
        assert!(!a.asset_settings_differ(&b));
        b.keyboard_names.push("Keychron".into());
        assert!(a.input_settings_differ(&b));
        b.invert_color = true;
        assert!(a.asset_settings_differ(&b));
    }

    #[test]
    fn test_search_path_order() {
        let paths = config_search_paths(
            Some(Path::new("/xdg")),
            Some(Path::new("/home/u")),
            Path::new("/work"),
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/xdg/bongocat/bongocat.conf"),
                PathBuf::from("/home/u/.config/bongocat/bongocat.conf"),
                PathBuf::from("/work/bongocat.conf"),
            ]
        );
        let paths = config_search_paths(None, None, Path::new("/work"));
        assert_eq!(paths, vec![PathBuf::from("/work/bongocat.conf")]);
    }

    #[test]
    fn test_asset_search_path_order() {
        let paths = asset_search_paths(
            Some(Path::new("/xdg")),
            Some(Path::new("/home/u")),
            Some(Path::new("/opt/bongocat/bin")),
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/xdg/bongocat/assets"),
                PathBuf::from("/home/u/.local/share/bongocat/assets"),
                PathBuf::from("/usr/local/share/bongocat/assets"),
                PathBuf::from("/usr/share/bongocat/assets"),
                PathBuf::from("/opt/bongocat/bin/assets"),
            ]
        );
    }

    #[test]
    fn test_find_asset_dir_needs_the_cat() {
        let root = std::env::temp_dir().join(format!(
            "bongocat-assets-{}-{}",
            std::process::id(),
            fastrand::u32(..)
        ));
        let empty = root.join("empty");
        let full = root.join("full");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::create_dir_all(&full).unwrap();
        std::fs::write(full.join("bongo-cat-both-up.png"), b"png").unwrap();

        let found = find_asset_dir(&[root.join("missing"), empty.clone(), full.clone()]);
        assert_eq!(found, Some(full));
        assert_eq!(find_asset_dir(&[empty]), None);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_relative_asset_dir_follows_config_file() {
        let c = OverlayConfig::parse("asset_dir = art\n", Some(Path::new("/etc/bongocat"))).unwrap();
        assert_eq!(c.asset_dir, PathBuf::from("/etc/bongocat/art"));
        let c = OverlayConfig::parse("asset_dir = /srv/art\n", Some(Path::new("/etc/bongocat")))
            .unwrap();
        assert_eq!(c.asset_dir, PathBuf::from("/srv/art"));
        let c = OverlayConfig::from_str_contents("asset_dir = art\n").unwrap();
        assert_eq!(c.asset_dir, PathBuf::from("art"));
    }

    #[test]
    fn test_serializes_to_json() {
        let c = OverlayConfig::new();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["fps"], 60);
        assert_eq!(json["layer"], "top");
        assert_eq!(json["sleep_begin"], "00:00");
        assert!(json.get("config_path").is_none());
    }
}
