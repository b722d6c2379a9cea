//! Bongo cat overlay library.
//!
//! This module exposes the overlay's frame types, shared resources, systems
//! and events for use by the binary and in integration tests.

pub mod components;
pub mod error;
pub mod events;
pub mod logging;
pub mod resources;
pub mod systems;
