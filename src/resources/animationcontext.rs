//! Animation context: everything one overlay instance animates with.
//!
//! [`AnimationContext`] owns the frame store, the animation state and the
//! active config snapshot behind a single mutex, plus the handle of the
//! tick thread. Every read of the current frame (rendering) and every
//! mutation (tick, config swap, frame reload) goes through that lock, so a
//! draw never sees a half-swapped snapshot.
//!
//! # Threads
//!
//! - [`AnimationContext::start`] spawns the tick thread. It loops while the
//!   `running` flag is set, calls [`AnimationContext::tick`], then parks for
//!   the delay chosen by [`next_tick_delay`].
//! - [`AnimationContext::stop`] clears the flag, wakes the thread and joins
//!   it. The thread is never cancelled while holding the lock.
//! - The draw callback runs on the tick thread after the lock is released,
//!   whenever the shown frame changed or a redraw was requested.
//!
//! # Related
//!
//! - [`crate::systems::animation`] – the per-tick state machine
//! - [`crate::systems::render`] – draws the bar from a [`RenderView`]

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::components::animationset::{AnimationSet, Pose};
use crate::components::frame::Frame;
use crate::error::{OverlayError, Result};
use crate::resources::framestore::FrameStore;
use crate::resources::inputflags::SharedInputFlags;
use crate::resources::overlayconfig::OverlayConfig;
use crate::resources::worldtime::Clock;
use crate::systems::animation::{
    AnimationState, animation_tick, next_tick_delay, should_redraw,
};

/// Called after a tick that needs the bar redrawn.
pub type DrawCallback = Arc<dyn Fn() + Send + Sync>;

/// State guarded by the animation lock.
struct Animated {
    state: AnimationState,
    config: Arc<OverlayConfig>,
    frames: FrameStore,
    last_drawn: Option<usize>,
}

impl Animated {
    fn active_set(&self) -> &AnimationSet {
        self.frames.active(&self.config.animation_name)
    }

    fn idle_slot(&self) -> usize {
        self.active_set().resolve(Pose::Idle, self.config.idle_frame)
    }
}

/// What the renderer needs for one draw, borrowed under the lock.
pub struct RenderView<'a> {
    pub config: &'a OverlayConfig,
    /// `None` when the current slot is empty.
    pub frame: Option<&'a Frame>,
    pub fullscreen: bool,
}

pub struct AnimationContext {
    animated: Mutex<Animated>,
    flags: Arc<SharedInputFlags>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    redraw_requested: AtomicBool,
    fullscreen: AtomicBool,
    draw: Mutex<Option<DrawCallback>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AnimationContext {
    pub fn new(
        config: OverlayConfig,
        frames: FrameStore,
        flags: Arc<SharedInputFlags>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Self::with_rng(config, frames, flags, clock, fastrand::Rng::new())
    }

    /// Like [`new`](Self::new) with a fixed random source.
    pub fn with_rng(
        config: OverlayConfig,
        frames: FrameStore,
        flags: Arc<SharedInputFlags>,
        clock: Arc<dyn Clock>,
        rng: fastrand::Rng,
    ) -> Arc<Self> {
        let idle = frames
            .active(&config.animation_name)
            .resolve(Pose::Idle, config.idle_frame);
        let state = AnimationState::with_rng(clock.now(), idle, rng);
        Arc::new(Self {
            animated: Mutex::new(Animated {
                state,
                config: Arc::new(config),
                frames,
                last_drawn: None,
            }),
            flags,
            clock,
            running: AtomicBool::new(false),
            redraw_requested: AtomicBool::new(true),
            fullscreen: AtomicBool::new(false),
            draw: Mutex::new(None),
            thread: Mutex::new(None),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Animated> {
        self.animated.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn flags(&self) -> &Arc<SharedInputFlags> {
        &self.flags
    }

    pub fn config(&self) -> Arc<OverlayConfig> {
        Arc::clone(&self.lock().config)
    }

    pub fn current_frame(&self) -> usize {
        self.lock().state.current_frame
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register the per-tick draw callback.
    pub fn set_draw_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.draw.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(callback));
    }

    /// Mark "a key was pressed". Picked up on the next tick.
    pub fn animation_trigger(&self) {
        self.flags.trigger();
        self.wake();
    }

    /// Ask for a draw on the next tick even if the frame did not change.
    pub fn request_redraw(&self) {
        self.redraw_requested.store(true, Ordering::Release);
        self.wake();
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Acquire)
    }

    /// Record whether a fullscreen window covers the output.
    pub fn set_fullscreen(&self, fullscreen: bool) {
        if self.fullscreen.swap(fullscreen, Ordering::AcqRel) != fullscreen {
            debug!("Fullscreen {}", if fullscreen { "entered" } else { "left" });
            self.request_redraw();
        }
    }

    fn wake(&self) {
        if let Some(handle) = self.thread.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            handle.thread().unpark();
        }
    }

    /// Run one tick and the draw callback if needed. Returns true when the
    /// shown frame changed.
    pub fn tick(&self) -> bool {
        let now = self.clock.now();
        let local = self.clock.local_time();
        let forced = self.redraw_requested.swap(false, Ordering::AcqRel);

        let (changed, redraw) = {
            let mut guard = self.lock();
            let animated = &mut *guard;
            let set = animated.frames.active(&animated.config.animation_name);
            let changed = animation_tick(
                &mut animated.state,
                &animated.config,
                set,
                &self.flags,
                now,
                local,
            );
            let current = animated.state.current_frame;
            let redraw = should_redraw(animated.last_drawn, current, forced);
            if redraw {
                animated.last_drawn = Some(current);
            }
            (changed, redraw)
        };

        if redraw {
            let callback = self.draw.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(draw) = callback {
                draw();
            }
        }
        changed
    }

    /// Borrow the current frame and config for drawing.
    pub fn with_current_frame<R>(&self, f: impl FnOnce(RenderView<'_>) -> R) -> R {
        let guard = self.lock();
        let set = guard.active_set();
        let view = RenderView {
            config: &guard.config,
            frame: set.frame(guard.state.current_frame),
            fullscreen: self.is_fullscreen(),
        };
        f(view)
    }

    /// Swap in a new config snapshot and restart the animation from idle.
    pub fn update_config(&self, config: OverlayConfig) {
        let now = self.clock.now();
        {
            let mut guard = self.lock();
            guard.config = Arc::new(config);
            let idle = guard.idle_slot();
            guard.state.reset(now, idle);
            guard.last_drawn = None;
        }
        info!("Animation config updated");
        self.request_redraw();
    }

    /// Replace the frame store. A running tick thread is stopped first and
    /// restarted afterwards so no tick straddles the swap.
    pub fn reload_frames(self: &Arc<Self>, frames: FrameStore) -> Result<()> {
        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        let now = self.clock.now();
        {
            let mut guard = self.lock();
            guard.frames = frames;
            let idle = guard.idle_slot();
            guard.state.reset(now, idle);
            guard.last_drawn = None;
        }
        self.redraw_requested.store(true, Ordering::Release);
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// Spawn the tick thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::Release);
        let ctx = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("animation".to_string())
            .spawn(move || ctx.run())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                OverlayError::thread(format!("failed to spawn animation thread: {e}"))
            })?;
        *slot = Some(handle);
        info!("Animation thread started");
        Ok(())
    }

    fn run(&self) {
        debug!("Animation loop running");
        while self.running.load(Ordering::Acquire) {
            let changed = self.tick();
            let frame_time = self.lock().config.frame_duration();
            std::thread::park_timeout(next_tick_delay(frame_time, changed));
        }
        debug!("Animation loop exited");
    }

    /// Stop and join the tick thread. Safe to call when not running.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.thread.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Animation thread panicked");
            }
            info!("Animation thread stopped");
        }
    }
}
