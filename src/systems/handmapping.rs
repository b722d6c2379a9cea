//! Keycode to hand mapping.
//!
//! Which paw goes down is decided by where the key sits on a physical QWERTY
//! board: the left halves of the number, top, home and bottom rows plus the
//! left-side modifiers belong to the left hand, everything else to the
//! right. Codes are Linux evdev `KEY_*` values.

use crate::components::animationset::Pose;

/// Evdev keycodes typed with the left hand.
const LEFT_HAND_KEYS: &[u16] = &[
    // 1 2 3 4 5 6
    2, 3, 4, 5, 6, 7,
    // Q W E R T
    16, 17, 18, 19, 20,
    // A S D F G
    30, 31, 32, 33, 34,
    // Z X C V B
    44, 45, 46, 47, 48,
    // Esc Tab CapsLock LShift LCtrl LAlt Grave LMeta
    1, 15, 58, 42, 29, 56, 41, 125,
];

/// Which hand presses `keycode`.
pub fn is_left_hand_key(keycode: i32) -> bool {
    u16::try_from(keycode).is_ok_and(|code| LEFT_HAND_KEYS.contains(&code))
}

/// Pose for a key press, swapping hands when the sprite is mirrored.
pub fn pose_for_key(keycode: i32, mirror_x: bool) -> Pose {
    match (is_left_hand_key(keycode), mirror_x) {
        (true, false) | (false, true) => Pose::LeftHand,
        (true, true) | (false, false) => Pose::RightHand,
    }
}

/// Pose for a press with no usable keycode.
pub fn random_pose(rng: &mut fastrand::Rng) -> Pose {
    if rng.bool() {
        Pose::LeftHand
    } else {
        Pose::RightHand
    }
}
