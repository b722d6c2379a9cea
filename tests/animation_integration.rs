//! End-to-end: frame store, animation context, compositor and a memory
//! surface driven by a manual clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bongocat::components::frame::Frame;
use bongocat::components::sleepwindow::ClockTime;
use bongocat::resources::animationcontext::AnimationContext;
use bongocat::resources::framestore::FrameStore;
use bongocat::resources::inputflags::SharedInputFlags;
use bongocat::resources::overlayconfig::OverlayConfig;
use bongocat::resources::worldtime::ManualClock;
use bongocat::systems::render::{MemorySurface, draw_overlay};

const COLORS: [[u8; 4]; 4] = [
    [255, 0, 0, 255],
    [0, 255, 0, 255],
    [0, 0, 255, 255],
    [255, 255, 0, 255],
];

const BAR_W: usize = 100;
const BAR_H: usize = 50;

fn cat_store() -> FrameStore {
    FrameStore::with_cat(COLORS.map(|c| Frame::solid(1, 1, c).unwrap()))
}

fn config() -> OverlayConfig {
    let mut config = OverlayConfig::new();
    config.fps = 10;
    config.keypress_duration = 100;
    config.idle_frame = 0;
    config.cat_x_offset = 0;
    config.cat_y_offset = 0;
    config.cat_height = 40;
    config.overlay_height = BAR_H as i32;
    config
}

fn setup(config: OverlayConfig) -> (Arc<AnimationContext>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let flags = Arc::new(SharedInputFlags::new().unwrap());
    let ctx = AnimationContext::with_rng(
        config,
        cat_store(),
        flags,
        clock.clone(),
        fastrand::Rng::with_seed(3),
    );
    (ctx, clock)
}

/// The sprite's centre pixel as RGBA.
fn rendered(ctx: &AnimationContext) -> [u8; 4] {
    let mut surface = MemorySurface::new(BAR_W, BAR_H);
    draw_overlay(&mut surface, ctx).unwrap();
    let [b, g, r, a] = surface.pixel(BAR_W / 2, BAR_H / 2).unwrap();
    [r, g, b, a]
}

#[test]
fn test_trigger_then_return_to_idle() {
    let (ctx, clock) = setup(config());

    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[0]);

    ctx.animation_trigger();
    assert!(ctx.tick());
    let shown = rendered(&ctx);
    assert!(shown == COLORS[1] || shown == COLORS[2], "got {shown:?}");

    clock.advance(Duration::from_millis(50));
    ctx.tick();
    assert_eq!(rendered(&ctx), shown);

    clock.advance(Duration::from_millis(100));
    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[0]);
}

#[test]
fn test_hand_mapping_picks_the_paw() {
    let (ctx, clock) = setup(config());
    ctx.tick();

    // KEY_A sits on the left half of the keyboard.
    ctx.flags().record_key_down(30);
    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[1]);

    clock.advance(Duration::from_millis(200));
    ctx.tick();
    // KEY_L sits on the right half.
    ctx.flags().record_key_down(38);
    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[2]);
}

#[test]
fn test_scheduled_sleep_shows_asleep_frame() {
    let mut config = config();
    config.enable_scheduled_sleep = true;
    config.sleep_begin = ClockTime::new(22, 0).unwrap();
    config.sleep_end = ClockTime::new(6, 0).unwrap();
    let (ctx, clock) = setup(config);

    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[0]);

    clock.set_local_time(ClockTime::new(23, 30).unwrap());
    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[3]);

    // A press while asleep stays pending until the window ends.
    ctx.animation_trigger();
    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[3]);
    assert!(ctx.flags().is_pressed());

    clock.set_local_time(ClockTime::new(12, 0).unwrap());
    ctx.tick();
    let shown = rendered(&ctx);
    assert!(shown == COLORS[1] || shown == COLORS[2], "got {shown:?}");

    clock.advance(Duration::from_millis(150));
    ctx.tick();
    assert_eq!(rendered(&ctx), COLORS[0]);
}

#[test]
fn test_draw_callback_tracks_frame_changes() {
    let (ctx, clock) = setup(config());
    let draws = Arc::new(AtomicUsize::new(0));
    let counter = draws.clone();
    ctx.set_draw_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    ctx.tick();
    ctx.tick();
    assert_eq!(draws.load(Ordering::SeqCst), 1);

    ctx.animation_trigger();
    ctx.tick();
    assert_eq!(draws.load(Ordering::SeqCst), 2);

    clock.advance(Duration::from_millis(150));
    ctx.tick();
    assert_eq!(draws.load(Ordering::SeqCst), 3);
}

#[test]
fn test_fullscreen_clears_the_bar() {
    let (ctx, _clock) = setup(config());
    ctx.tick();
    ctx.set_fullscreen(true);

    let mut surface = MemorySurface::new(BAR_W, BAR_H);
    draw_overlay(&mut surface, &ctx).unwrap();
    assert!(surface.pixels().iter().all(|&b| b == 0));
    assert_eq!(surface.presented(), 1);
}
