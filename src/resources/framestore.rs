//! Frame store resource.
//!
//! Owns the decoded frames of every creature the overlay can show: the
//! four-pose cat and the multi-frame virtual-pet sprites. Everything is
//! loaded once at startup (and again on an asset-affecting reload) and is
//! read-only afterwards.
//!
//! # Asset layout
//!
//! ```text
//! <asset_dir>/bongo-cat-both-up.png
//! <asset_dir>/bongo-cat-left-down.png
//! <asset_dir>/bongo-cat-right-down.png
//! <asset_dir>/bongo-cat-both-down.png
//! <asset_dir>/dm/<creature>.png        one horizontal sheet per creature
//! ```
//!
//! The cat is required; a creature that fails to load is logged and left
//! empty, and selecting it shows the cat instead.

use log::{error, info, warn};
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::components::animationset::{AnimationSet, CAT_FRAMES, CatRole};
use crate::components::frame::Frame;
use crate::error::{OverlayError, Result};
use crate::resources::overlayconfig::OverlayConfig;
use crate::systems::spritesheet::{SheetOptions, load_sprite_sheet_with};

/// Name of the four-pose cat set.
pub const CAT_SET_NAME: &str = "bongocat";

/// Grid of one creature sprite sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatureSheet {
    pub name: &'static str,
    pub columns: u32,
    pub rows: u32,
}

const fn sheet(name: &'static str, columns: u32) -> CreatureSheet {
    CreatureSheet {
        name,
        columns,
        rows: 1,
    }
}

/// Every creature the overlay knows how to slice.
pub const CREATURES: &[CreatureSheet] = &[
    sheet("botamon", 11),
    sheet("koromon", 9),
    sheet("agumon", 9),
    sheet("betamon", 10),
    sheet("greymon", 10),
    sheet("tyranomon", 9),
    sheet("devimon", 9),
    sheet("meramon", 9),
    sheet("airdramon", 9),
    sheet("seadramon", 8),
    sheet("numemon", 9),
    sheet("metal_greymon", 9),
];

pub fn creature_sheet(name: &str) -> Option<&'static CreatureSheet> {
    CREATURES.iter().find(|c| c.name == name)
}

pub fn is_known_creature(name: &str) -> bool {
    creature_sheet(name).is_some()
}

/// All loaded animation sets, keyed by name.
#[derive(Debug, Clone)]
pub struct FrameStore {
    cat: AnimationSet,
    creatures: FxHashMap<String, AnimationSet>,
}

impl FrameStore {
    /// Store holding only the cat.
    pub fn with_cat(frames: [Frame; CAT_FRAMES]) -> Self {
        Self {
            cat: AnimationSet::simple_cat(CAT_SET_NAME, frames),
            creatures: FxHashMap::default(),
        }
    }

    /// Add or replace a creature set.
    pub fn insert(&mut self, set: AnimationSet) {
        self.creatures.insert(set.name().to_string(), set);
    }

    pub fn cat(&self) -> &AnimationSet {
        &self.cat
    }

    pub fn get(&self, name: &str) -> Option<&AnimationSet> {
        if name == CAT_SET_NAME {
            Some(&self.cat)
        } else {
            self.creatures.get(name)
        }
    }

    /// The set to draw for `name`: the named set when it has frames,
    /// otherwise the cat.
    pub fn active(&self, name: &str) -> &AnimationSet {
        match self.get(name) {
            Some(set) if !set.is_empty() => set,
            _ => &self.cat,
        }
    }

    pub fn len(&self) -> usize {
        1 + self.creatures.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

fn read_asset(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| OverlayError::file_io_with(format!("reading {}", path.display()), e))
}

/// Load the four cat poses. Each is cropped on its own with the configured
/// padding.
pub fn load_cat_frames(config: &OverlayConfig) -> Result<[Frame; CAT_FRAMES]> {
    let options = SheetOptions::grid(1, 1)
        .with_padding(config.padding_x, config.padding_y)
        .with_invert(config.invert_color);

    let mut frames: [Frame; CAT_FRAMES] = Default::default();
    for role in CatRole::ALL {
        let path = config.asset_dir.join(format!("{}.png", role.asset_stem()));
        let bytes = read_asset(&path)?;
        let mut sliced = load_sprite_sheet_with(&bytes, &options)?;
        frames[role.slot()] = sliced
            .pop()
            .ok_or_else(|| OverlayError::file_io(format!("{} has no frame", path.display())))?;
    }
    Ok(frames)
}

/// Load one creature sheet from `<asset_dir>/dm/<name>.png`.
pub fn load_creature(config: &OverlayConfig, creature: &CreatureSheet) -> Result<AnimationSet> {
    let path = config
        .asset_dir
        .join("dm")
        .join(format!("{}.png", creature.name));
    let bytes = read_asset(&path)?;
    let options = SheetOptions::grid(creature.columns, creature.rows)
        .with_padding(config.padding_x, config.padding_y)
        .with_invert(config.invert_color)
        .with_crop(config.crop_sprite);
    let frames = load_sprite_sheet_with(&bytes, &options)?;
    Ok(AnimationSet::multiframe(creature.name, frames))
}

/// Build the complete store for `config`.
///
/// Fails only when the cat cannot be loaded.
pub fn load_frame_store(config: &OverlayConfig) -> Result<FrameStore> {
    let cat = load_cat_frames(config).inspect_err(|e| error!("Failed to load cat frames: {e}"))?;
    let mut store = FrameStore::with_cat(cat);

    for creature in CREATURES {
        match load_creature(config, creature) {
            Ok(set) => store.insert(set),
            Err(e) => {
                warn!("Creature '{}' unavailable: {e}", creature.name);
                store.insert(AnimationSet::empty_multiframe(creature.name));
            }
        }
    }

    if store.active(&config.animation_name).name() != config.animation_name {
        warn!(
            "Animation '{}' has no frames, showing '{}'",
            config.animation_name, CAT_SET_NAME
        );
    }
    info!(
        "Frame store ready: {} sets from {}",
        store.len(),
        config.asset_dir.display()
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_frames() -> [Frame; CAT_FRAMES] {
        [0u8, 1, 2, 3].map(|v| Frame::solid(1, 1, [v, 0, 0, 255]).unwrap())
    }

    #[test]
    fn test_catalogue_lookup() {
        assert_eq!(creature_sheet("agumon").unwrap().columns, 9);
        assert_eq!(creature_sheet("botamon").unwrap().columns, 11);
        assert!(is_known_creature("seadramon"));
        assert!(!is_known_creature("bongocat"));
    }

    #[test]
    fn test_active_falls_back_to_cat() {
        let mut store = FrameStore::with_cat(cat_frames());
        store.insert(AnimationSet::empty_multiframe("agumon"));
        assert_eq!(store.active("agumon").name(), CAT_SET_NAME);
        assert_eq!(store.active("missing").name(), CAT_SET_NAME);

        let frames = (0..9)
            .map(|v| Frame::solid(2, 2, [v, v, v, 255]).unwrap())
            .collect();
        store.insert(AnimationSet::multiframe("agumon", frames));
        assert_eq!(store.active("agumon").name(), "agumon");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_missing_cat_is_file_error() {
        let mut config = OverlayConfig::new();
        config.asset_dir = std::env::temp_dir().join("bongocat-no-such-assets");
        let err = load_frame_store(&config).unwrap_err();
        assert!(matches!(err, OverlayError::FileIo { .. }));
    }
}
