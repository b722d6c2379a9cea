//! Messages exchanged between the overlay's threads.
//!
//! Helper threads (animation, config watcher, fullscreen poller, signal
//! handler) never touch the presentation surface. They post an event on a
//! `crossbeam-channel` and the main loop acts on it.
//!
//! Submodules:
//! - [`overlay`] – events consumed by the main loop
pub mod overlay;
