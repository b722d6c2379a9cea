//! Animation state machine.
//!
//! One call to [`animation_tick`] advances the overlay by one fixed-rate
//! tick. Three checks run in order, each able to overwrite the previous:
//!
//! 1. **Test trigger**: with `test_animation_interval > 0`, a counter runs
//!    every tick; once it exceeds `interval * fps` a random paw pose is held
//!    for `test_animation_duration`.
//! 2. **Key press**: a pending press from the shared flags shows the pose
//!    for the pressed key (or a random one without hand mapping) for
//!    `keypress_duration`, clears the flag, resets the test counter and
//!    restarts the idle timer. During scheduled sleep presses stay pending.
//! 3. **Idle / sleep**: inside the sleep window, or after
//!    `idle_sleep_timeout` without input, the asleep pose is forced at once.
//!    Otherwise the idle pose returns once the hold deadline has passed.
//!
//! A press arriving in the same tick as a test trigger wins because it is
//! checked later and rewrites the deadline.
//!
//! The tick has no I/O and cannot fail; the caller holds the animation lock.
//!
//! # Related
//!
//! - [`crate::resources::animationcontext::AnimationContext`] – owns the
//!   state, the lock and the tick thread
//! - [`crate::systems::handmapping`] – keycode to paw table

use log::debug;
use std::time::{Duration, Instant};

use crate::components::animationset::{AnimationSet, Pose};
use crate::components::sleepwindow::ClockTime;
use crate::resources::inputflags::SharedInputFlags;
use crate::resources::overlayconfig::OverlayConfig;
use crate::systems::handmapping::{pose_for_key, random_pose};

/// Longest pause between ticks.
const MAX_TICK_DELAY: Duration = Duration::from_nanos(999_999_999);

/// Mutable per-overlay animation state.
#[derive(Debug, Clone)]
pub struct AnimationState {
    /// Slot of the frame currently shown.
    pub current_frame: usize,
    /// The current non-idle pose stays up until this instant.
    pub hold_until: Instant,
    pub test_counter: u64,
    /// Last accepted key press; starts at creation time.
    pub last_key: Instant,
    rng: fastrand::Rng,
}

impl AnimationState {
    pub fn new(now: Instant, idle_slot: usize) -> Self {
        Self::with_rng(now, idle_slot, fastrand::Rng::new())
    }

    /// State with a fixed random source, for reproducible runs.
    pub fn with_rng(now: Instant, idle_slot: usize, rng: fastrand::Rng) -> Self {
        Self {
            current_frame: idle_slot,
            hold_until: now,
            test_counter: 0,
            last_key: now,
            rng,
        }
    }

    /// Forget holds and counters, e.g. after a config swap.
    pub fn reset(&mut self, now: Instant, idle_slot: usize) {
        self.current_frame = idle_slot;
        self.hold_until = now;
        self.test_counter = 0;
        self.last_key = now;
    }

    fn show(&mut self, slot: usize, hold: Duration, now: Instant) {
        self.current_frame = slot;
        self.hold_until = now + hold;
    }
}

/// Whether `local_time` falls inside the configured quiet hours.
pub fn in_scheduled_sleep(config: &OverlayConfig, local_time: ClockTime) -> bool {
    config.enable_scheduled_sleep && config.sleep_window().contains(local_time)
}

/// Ticks between test animations, `0` when disabled.
pub fn test_interval_ticks(config: &OverlayConfig) -> u64 {
    config.test_animation_interval * config.fps as u64
}

/// Advance `state` by one tick. Returns true when the shown frame changed.
pub fn animation_tick(
    state: &mut AnimationState,
    config: &OverlayConfig,
    set: &AnimationSet,
    flags: &SharedInputFlags,
    now: Instant,
    local_time: ClockTime,
) -> bool {
    let before = state.current_frame;
    let sleeping_hours = in_scheduled_sleep(config, local_time);

    if config.test_animation_interval > 0 {
        state.test_counter += 1;
        if state.test_counter > test_interval_ticks(config) {
            let pose = random_pose(&mut state.rng);
            let slot = set.resolve(pose, config.idle_frame);
            debug!("Test animation trigger: frame {slot}");
            state.show(slot, config.test_animation_hold(), now);
            state.test_counter = 0;
        }
    }

    if flags.is_pressed() && !sleeping_hours {
        if let Some(keycode) = flags.take_press() {
            let pose = if config.enable_hand_mapping {
                pose_for_key(keycode, config.mirror_x)
            } else {
                random_pose(&mut state.rng)
            };
            let slot = set.resolve(pose, config.idle_frame);
            debug!("Key press {keycode}: frame {slot}");
            state.show(slot, config.keypress_hold(), now);
            state.test_counter = 0;
            state.last_key = now;
        }
    }

    let idle_timed_out = config.idle_sleep_timeout > 0
        && now.saturating_duration_since(state.last_key)
            >= Duration::from_secs(config.idle_sleep_timeout);

    if sleeping_hours || idle_timed_out {
        let slot = set.resolve(Pose::Asleep, config.idle_frame);
        if state.current_frame != slot {
            debug!("Falling asleep: frame {slot}");
            state.current_frame = slot;
        }
    } else if now > state.hold_until {
        let slot = set.resolve(Pose::Idle, config.idle_frame);
        if state.current_frame != slot {
            debug!("Returning to idle frame {slot}");
            state.current_frame = slot;
        }
    }

    state.current_frame != before
}

/// Pause before the next tick: one frame time after a change, twice that
/// while nothing moves, never a full second.
pub fn next_tick_delay(frame_time: Duration, changed: bool) -> Duration {
    if changed {
        frame_time.min(MAX_TICK_DELAY)
    } else {
        (frame_time * 2).min(MAX_TICK_DELAY)
    }
}

/// Whether the draw callback should run after a tick.
pub fn should_redraw(last_drawn: Option<usize>, current: usize, forced: bool) -> bool {
    forced || last_drawn != Some(current)
}
