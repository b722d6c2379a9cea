//! Overlay systems.
//!
//! This module groups everything that does work: decoding assets, stepping
//! the animation, compositing pixels, capturing keyboard input and talking
//! to the compositor.
//!
//! Submodules overview
//! - [`animation`] – the pose state machine and tick pacing
//! - [`blit`] – scaled alpha blits and rectangle fills into BGRA buffers
//! - [`configwatcher`] – debounced hot reload of the config file
//! - [`fullscreen`] – poll the compositor CLI for a fullscreen window
//! - [`handmapping`] – decide which paw a key code belongs to
//! - [`inputcapture`] – the evdev read loop run by the capture child
//! - [`inputmonitor`] – fork, supervise and stop the capture child
//! - [`reload`] – apply a reloaded config and report what must restart
//! - [`render`] – lay out and draw the bar onto a presentation surface
//! - [`spritesheet`] – decode PNG sheets into cropped RGBA frames
//! - `wayland` – layer-shell surface (behind the `wayland` feature)

pub mod animation;
pub mod blit;
pub mod configwatcher;
pub mod fullscreen;
pub mod handmapping;
pub mod inputcapture;
pub mod inputmonitor;
pub mod reload;
pub mod render;
pub mod spritesheet;
#[cfg(all(feature = "wayland", target_os = "linux"))]
pub mod wayland;
