//! Applying a reloaded config to the running animation.
//!
//! [`apply_reload`] rebuilds the frame store when asset settings changed,
//! swaps the config snapshot into the [`AnimationContext`] and reports what
//! else the caller has to restart. A store that fails to load, or that
//! lacks a newly selected creature, is discarded: the old frames stay and
//! so do the asset keys they were built from.

use log::{error, info, warn};
use std::sync::Arc;

use crate::resources::animationcontext::AnimationContext;
use crate::resources::framestore::{FrameStore, load_frame_store};
use crate::resources::overlayconfig::OverlayConfig;
use crate::systems::fullscreen::wants_fullscreen_detection;

/// What a reload changed beyond the animation context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// A new frame store is in use.
    pub frames_reloaded: bool,
    /// New asset settings were rejected and the previous ones kept.
    pub assets_kept: bool,
    pub restart_input: bool,
    pub recreate_surface: bool,
    /// Fullscreen polling must be started or stopped.
    pub fullscreen_detection_changed: bool,
}

/// Apply `new` on top of `current`. Returns the config actually in effect,
/// which differs from `new` when its assets were rejected.
pub fn apply_reload(
    ctx: &Arc<AnimationContext>,
    current: &OverlayConfig,
    mut new: OverlayConfig,
) -> (OverlayConfig, ReloadOutcome) {
    let mut outcome = ReloadOutcome::default();

    if new.asset_settings_differ(current) {
        match load_frame_store(&new) {
            Ok(frames) if selection_available(&frames, current, &new) => {
                if let Err(e) = ctx.reload_frames(frames) {
                    error!("Failed to restart animation after asset reload: {e}");
                }
                outcome.frames_reloaded = true;
            }
            Ok(_) => {
                warn!(
                    "Animation '{}' could not be loaded, keeping current frames",
                    new.animation_name
                );
                keep_assets(&mut new, current);
                outcome.assets_kept = true;
            }
            Err(e) => {
                error!("Asset reload failed, keeping current frames: {e}");
                keep_assets(&mut new, current);
                outcome.assets_kept = true;
            }
        }
    }

    outcome.restart_input = new.input_settings_differ(current);
    outcome.recreate_surface = new.surface_settings_differ(current);
    outcome.fullscreen_detection_changed =
        wants_fullscreen_detection(&new) != wants_fullscreen_detection(current);

    ctx.update_config(new.clone());
    info!("Config reloaded");
    (new, outcome)
}

/// A switch to another animation needs frames for it. Keeping the same
/// name is fine even when it already falls back to the cat.
fn selection_available(frames: &FrameStore, current: &OverlayConfig, new: &OverlayConfig) -> bool {
    new.animation_name == current.animation_name
        || frames.active(&new.animation_name).name() == new.animation_name
}

/// The frames in use were built from `current`'s asset keys.
fn keep_assets(new: &mut OverlayConfig, current: &OverlayConfig) {
    new.animation_name = current.animation_name.clone();
    new.invert_color = current.invert_color;
    new.crop_sprite = current.crop_sprite;
    new.padding_x = current.padding_x;
    new.padding_y = current.padding_y;
    new.asset_dir = current.asset_dir.clone();
}
