//! Animation sets: the frames of one creature addressed by role.
//!
//! Two layouts exist. The simple cat has exactly four poses addressed by
//! [`CatRole`]. Multi-frame creatures (the virtual-pet sprites) have up to
//! [`MAX_FRAMES`] slots addressed by [`CreatureRole`], where a sheet with
//! fewer frames leaves the trailing roles empty.
//!
//! The state machine never indexes slots directly by meaning. It asks the
//! set to [`resolve`](AnimationSet::resolve) a [`Pose`], and the set picks
//! the slot (with fallbacks for missing roles).

use arrayvec::ArrayVec;
use log::warn;

use crate::components::frame::Frame;

/// Largest slot count of any supported creature.
pub const MAX_FRAMES: usize = 15;
/// Slot count of the simple cat.
pub const CAT_FRAMES: usize = 4;

/// Fixed poses of the simple cat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatRole {
    BothUp = 0,
    LeftDown = 1,
    RightDown = 2,
    BothDown = 3,
}

impl CatRole {
    pub const ALL: [CatRole; CAT_FRAMES] = [
        CatRole::BothUp,
        CatRole::LeftDown,
        CatRole::RightDown,
        CatRole::BothDown,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }

    /// File stem of the PNG asset holding this pose.
    pub fn asset_stem(self) -> &'static str {
        match self {
            CatRole::BothUp => "bongo-cat-both-up",
            CatRole::LeftDown => "bongo-cat-left-down",
            CatRole::RightDown => "bongo-cat-right-down",
            CatRole::BothDown => "bongo-cat-both-down",
        }
    }
}

/// Named roles of a multi-frame creature, in sprite-sheet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreatureRole {
    Idle1 = 0,
    Idle2 = 1,
    Angry = 2,
    Down1 = 3,
    Happy = 4,
    Eat1 = 5,
    Sleep1 = 6,
    Refuse = 7,
    Sad = 8,
    Down2 = 9,
    Eat2 = 10,
    Sleep2 = 11,
    Attack = 12,
    Movement1 = 13,
    Movement2 = 14,
}

impl CreatureRole {
    pub const ALL: [CreatureRole; MAX_FRAMES] = [
        CreatureRole::Idle1,
        CreatureRole::Idle2,
        CreatureRole::Angry,
        CreatureRole::Down1,
        CreatureRole::Happy,
        CreatureRole::Eat1,
        CreatureRole::Sleep1,
        CreatureRole::Refuse,
        CreatureRole::Sad,
        CreatureRole::Down2,
        CreatureRole::Eat2,
        CreatureRole::Sleep2,
        CreatureRole::Attack,
        CreatureRole::Movement1,
        CreatureRole::Movement2,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }

    /// Roles a sheet of `frame_count` frames populates.
    ///
    /// Sheets come in tiers: up to 4 frames carry only the idle, angry and
    /// down poses; up to 9 add happy, eat, sleep, refuse and sad; up to 13
    /// add the second down/eat/sleep poses and attack; larger sheets add the
    /// movement frames.
    pub fn roles_for_sheet(frame_count: usize) -> &'static [CreatureRole] {
        let tier = match frame_count {
            0..=4 => 4,
            5..=9 => 9,
            10..=13 => 13,
            _ => MAX_FRAMES,
        };
        &Self::ALL[..tier]
    }
}

/// What the state machine wants to show, independent of creature layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pose {
    Idle,
    LeftHand,
    RightHand,
    Asleep,
}

/// Frame layout of a creature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatureKind {
    SimpleCat { frames: [Frame; CAT_FRAMES] },
    /// Always holds [`MAX_FRAMES`] slots; missing roles are empty frames.
    Multiframe { frames: ArrayVec<Frame, MAX_FRAMES> },
}

/// All frames of one creature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationSet {
    name: String,
    kind: CreatureKind,
}

fn empty_slots() -> ArrayVec<Frame, MAX_FRAMES> {
    (0..MAX_FRAMES).map(|_| Frame::empty()).collect()
}

impl AnimationSet {
    pub fn simple_cat(name: impl Into<String>, frames: [Frame; CAT_FRAMES]) -> Self {
        Self {
            name: name.into(),
            kind: CreatureKind::SimpleCat { frames },
        }
    }

    /// Build a multi-frame creature from sheet frames in sheet order.
    ///
    /// Frames are moved into their role slots. Frames past the last role of
    /// the sheet's tier are dropped with a warning.
    pub fn multiframe(name: impl Into<String>, sheet: Vec<Frame>) -> Self {
        let name = name.into();
        let mut slots = empty_slots();
        let roles = CreatureRole::roles_for_sheet(sheet.len());
        if sheet.len() > roles.len() {
            warn!(
                "{}: sheet has {} frames, only the first {} are used",
                name,
                sheet.len(),
                roles.len()
            );
        }
        for (role, frame) in roles.iter().zip(sheet) {
            slots[role.slot()] = frame;
        }
        Self {
            name,
            kind: CreatureKind::Multiframe { frames: slots },
        }
    }

    /// A multi-frame set with every slot empty (a creature that failed to load).
    pub fn empty_multiframe(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CreatureKind::Multiframe {
                frames: empty_slots(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &CreatureKind {
        &self.kind
    }

    pub fn is_simple_cat(&self) -> bool {
        matches!(self.kind, CreatureKind::SimpleCat { .. })
    }

    fn slots(&self) -> &[Frame] {
        match &self.kind {
            CreatureKind::SimpleCat { frames } => frames,
            CreatureKind::Multiframe { frames } => frames,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots().len()
    }

    /// True when no slot holds pixels.
    pub fn is_empty(&self) -> bool {
        self.slots().iter().all(Frame::is_empty)
    }

    /// Frame in `slot`, or `None` for an empty or out-of-range slot.
    pub fn frame(&self, slot: usize) -> Option<&Frame> {
        self.slots().get(slot).filter(|f| !f.is_empty())
    }

    fn has_role(&self, role: CreatureRole) -> bool {
        self.frame(role.slot()).is_some()
    }

    /// Slot index showing `pose` for this creature.
    ///
    /// `idle_frame` picks the resting pose: a cat slot for the simple cat,
    /// or `1` for the second idle frame of a multi-frame creature.
    pub fn resolve(&self, pose: Pose, idle_frame: usize) -> usize {
        match &self.kind {
            CreatureKind::SimpleCat { .. } => match pose {
                Pose::Idle => idle_frame.min(CAT_FRAMES - 1),
                Pose::LeftHand => CatRole::LeftDown.slot(),
                Pose::RightHand => CatRole::RightDown.slot(),
                Pose::Asleep => CatRole::BothDown.slot(),
            },
            CreatureKind::Multiframe { .. } => {
                let idle = if idle_frame == 1 && self.has_role(CreatureRole::Idle2) {
                    CreatureRole::Idle2
                } else {
                    CreatureRole::Idle1
                };
                let candidates: &[CreatureRole] = match pose {
                    Pose::Idle => &[],
                    Pose::LeftHand => &[CreatureRole::Angry],
                    Pose::RightHand => &[
                        CreatureRole::Attack,
                        CreatureRole::Happy,
                        CreatureRole::Angry,
                    ],
                    Pose::Asleep => &[CreatureRole::Sleep1, CreatureRole::Down1],
                };
                candidates
                    .iter()
                    .copied()
                    .find(|role| self.has_role(*role))
                    .unwrap_or(idle)
                    .slot()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(v: u8) -> Frame {
        Frame::solid(1, 1, [v, v, v, 255]).unwrap()
    }

    fn cat() -> AnimationSet {
        AnimationSet::simple_cat("bongocat", [px(0), px(1), px(2), px(3)])
    }

    #[test]
    fn test_roles_for_sheet_tiers() {
        assert_eq!(CreatureRole::roles_for_sheet(2).len(), 4);
        assert_eq!(CreatureRole::roles_for_sheet(4).len(), 4);
        assert_eq!(CreatureRole::roles_for_sheet(8).len(), 9);
        assert_eq!(CreatureRole::roles_for_sheet(11).len(), 13);
        assert_eq!(CreatureRole::roles_for_sheet(14).len(), 15);
        assert_eq!(CreatureRole::roles_for_sheet(40).len(), 15);
    }

    #[test]
    fn test_multiframe_partial_sheet_leaves_roles_empty() {
        let set = AnimationSet::multiframe("botamon", (0..4).map(px).collect());
        assert_eq!(set.slot_count(), MAX_FRAMES);
        assert!(set.frame(CreatureRole::Down1.slot()).is_some());
        assert!(set.frame(CreatureRole::Happy.slot()).is_none());
        assert!(set.frame(CreatureRole::Movement2.slot()).is_none());
    }

    #[test]
    fn test_multiframe_nine_frames_fill_sleep() {
        let set = AnimationSet::multiframe("agumon", (0..9).map(px).collect());
        let sleep = set.frame(CreatureRole::Sleep1.slot()).unwrap();
        assert_eq!(sleep.pixel(0, 0), Some([6, 6, 6, 255]));
        assert!(set.frame(CreatureRole::Down2.slot()).is_none());
    }

    #[test]
    fn test_multiframe_drops_extra_frames() {
        let set = AnimationSet::multiframe("big", (0..20).map(px).collect());
        assert_eq!(
            set.frame(CreatureRole::Movement2.slot()).unwrap().pixel(0, 0),
            Some([14, 14, 14, 255])
        );
        assert!(set.frame(15).is_none());
    }

    #[test]
    fn test_cat_resolve() {
        let set = cat();
        assert_eq!(set.resolve(Pose::Idle, 0), 0);
        assert_eq!(set.resolve(Pose::Idle, 3), 3);
        assert_eq!(set.resolve(Pose::Idle, 9), 3);
        assert_eq!(set.resolve(Pose::LeftHand, 0), 1);
        assert_eq!(set.resolve(Pose::RightHand, 0), 2);
        assert_eq!(set.resolve(Pose::Asleep, 0), 3);
    }

    #[test]
    fn test_multiframe_resolve_with_fallbacks() {
        let small = AnimationSet::multiframe("botamon", (0..4).map(px).collect());
        assert_eq!(small.resolve(Pose::Idle, 0), CreatureRole::Idle1.slot());
        assert_eq!(small.resolve(Pose::Idle, 1), CreatureRole::Idle2.slot());
        assert_eq!(small.resolve(Pose::LeftHand, 0), CreatureRole::Angry.slot());
        // no attack and no happy frame
        assert_eq!(small.resolve(Pose::RightHand, 0), CreatureRole::Angry.slot());
        // no sleep frame
        assert_eq!(small.resolve(Pose::Asleep, 0), CreatureRole::Down1.slot());

        let full = AnimationSet::multiframe("greymon", (0..13).map(px).collect());
        assert_eq!(full.resolve(Pose::RightHand, 0), CreatureRole::Attack.slot());
        assert_eq!(full.resolve(Pose::Asleep, 0), CreatureRole::Sleep1.slot());
    }

    #[test]
    fn test_empty_multiframe_is_empty() {
        let set = AnimationSet::empty_multiframe("numemon");
        assert!(set.is_empty());
        assert_eq!(set.resolve(Pose::Asleep, 0), CreatureRole::Idle1.slot());
        assert!(!cat().is_empty());
    }
}
