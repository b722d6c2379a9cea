//! Plain data types shared across the overlay.
//!
//! Submodules:
//! - [`frame`] – decoded RGBA frames, the unit of everything drawn
//! - [`animationset`] – the frames of one creature addressed by role
//! - [`sleepwindow`] – clock times and the scheduled sleep window

pub mod animationset;
pub mod frame;
pub mod sleepwindow;
