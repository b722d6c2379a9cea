//! Long-lived state shared between the overlay's threads and processes.
//!
//! Overview
//! - `animationcontext` – the animation state, config snapshot and frames behind one lock, plus the tick thread
//! - `framestore` – every loaded animation set and the creature catalogue
//! - `inputflags` – key press flags in memory shared with the capture child
//! - `overlayconfig` – the validated config snapshot and its file format
//! - `pidfile` – single-instance lock and `--toggle`
//! - `worldtime` – wall and monotonic clocks, real and manual
pub mod animationcontext;
pub mod framestore;
pub mod inputflags;
pub mod overlayconfig;
pub mod pidfile;
pub mod worldtime;
