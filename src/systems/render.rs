//! Bar drawing.
//!
//! [`draw_bar`] paints one complete bar into a BGRA buffer: a translucent
//! black background, then the current sprite frame scaled to `cat_height`
//! and placed by `cat_align` and the offsets. The frame is read through
//! [`AnimationContext::with_current_frame`], which holds the animation lock
//! for the whole draw.
//!
//! The bar disappears (fully transparent, no sprite) while a fullscreen
//! window is focused, unless the surface sits on the overlay layer or the
//! hide is disabled in the config.
//!
//! # Related
//!
//! - [`crate::systems::blit`] – resampling and pixel writes
//! - `crate::systems::wayland` – the real [`PresentationSurface`]

use log::trace;

use crate::error::Result;
use crate::resources::animationcontext::{AnimationContext, RenderView};
use crate::resources::overlayconfig::{CatAlign, Layer, OverlayConfig};
use crate::systems::blit::{BlitOptions, blit_scaled, draw_rect};

/// A writable pixel buffer that can be flipped to screen.
pub trait PresentationSurface {
    /// Buffer size in pixels.
    fn size(&self) -> (usize, usize);
    /// BGRA pixels, `width * height * 4` bytes.
    fn buffer_mut(&mut self) -> &mut [u8];
    fn present(&mut self) -> Result<()>;
}

/// Where the sprite lands inside the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Sprite placement for a `frame_w x frame_h` frame in a `bar_w x bar_h` bar.
pub fn sprite_rect(
    config: &OverlayConfig,
    frame_w: u32,
    frame_h: u32,
    bar_w: usize,
    bar_h: usize,
) -> Option<SpriteRect> {
    if frame_w == 0 || frame_h == 0 {
        return None;
    }
    let h = config.cat_height;
    let w = (h as i64 * frame_w as i64 / frame_h as i64) as i32;
    let bar_w = bar_w as i32;
    let bar_h = bar_h as i32;
    let x = match config.cat_align {
        CatAlign::Center => (bar_w - w) / 2 + config.cat_x_offset,
        CatAlign::Left => config.cat_x_offset,
        CatAlign::Right => bar_w - w - config.cat_x_offset,
    };
    let y = (bar_h - h) / 2 + config.cat_y_offset;
    Some(SpriteRect { x, y, w, h })
}

/// True when the bar should be drawn fully transparent.
pub fn bar_hidden(config: &OverlayConfig, fullscreen: bool) -> bool {
    fullscreen && config.layer != Layer::Overlay && !config.disable_fullscreen_hide
}

/// Paint the whole bar into `buffer`.
pub fn draw_bar(buffer: &mut [u8], width: usize, height: usize, view: &RenderView<'_>) {
    let config = view.config;
    let (w, h) = (width as i32, height as i32);

    if bar_hidden(config, view.fullscreen) {
        draw_rect(buffer, width, height, 0, 0, w, h, 0, 0, 0, 0);
        return;
    }
    draw_rect(
        buffer,
        width,
        height,
        0,
        0,
        w,
        h,
        0,
        0,
        0,
        config.overlay_opacity,
    );

    let Some(frame) = view.frame else {
        return;
    };
    let Some(rect) = sprite_rect(config, frame.width(), frame.height(), width, height) else {
        return;
    };
    trace!("Drawing sprite at {rect:?}");
    blit_scaled(
        buffer,
        width,
        height,
        frame,
        rect.x,
        rect.y,
        rect.w,
        rect.h,
        BlitOptions {
            antialias: config.enable_antialiasing,
            mirror_x: config.mirror_x,
            mirror_y: config.mirror_y,
        },
    );
}

/// Draw the current frame onto `surface` and present it.
pub fn draw_overlay(surface: &mut dyn PresentationSurface, ctx: &AnimationContext) -> Result<()> {
    let (width, height) = surface.size();
    ctx.with_current_frame(|view| draw_bar(surface.buffer_mut(), width, height, &view));
    surface.present()
}

/// Heap-backed surface, for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    presented: usize,
}

impl MemorySurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
            presented: 0,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// BGRA pixel at `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    /// Number of `present()` calls so far.
    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl PresentationSurface for MemorySurface {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    fn present(&mut self) -> Result<()> {
        self.presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::frame::Frame;

    fn config() -> OverlayConfig {
        let mut c = OverlayConfig::new();
        c.cat_height = 4;
        c.cat_x_offset = 0;
        c.cat_y_offset = 0;
        c.enable_antialiasing = false;
        c
    }

    #[test]
    fn test_sprite_rect_alignment() {
        let mut c = config();
        c.cat_height = 10;
        c.cat_x_offset = 5;
        c.cat_y_offset = 2;
        let r = sprite_rect(&c, 20, 10, 100, 20).unwrap();
        assert_eq!((r.w, r.h), (20, 10));
        assert_eq!(r.x, (100 - 20) / 2 + 5);
        assert_eq!(r.y, (20 - 10) / 2 + 2);

        c.cat_align = CatAlign::Left;
        assert_eq!(sprite_rect(&c, 20, 10, 100, 20).unwrap().x, 5);
        c.cat_align = CatAlign::Right;
        assert_eq!(sprite_rect(&c, 20, 10, 100, 20).unwrap().x, 100 - 20 - 5);
        assert!(sprite_rect(&c, 0, 10, 100, 20).is_none());
    }

    #[test]
    fn test_draw_bar_background_and_sprite() {
        let c = config();
        let frame = Frame::solid(1, 1, [255, 0, 0, 255]).unwrap();
        let mut surface = MemorySurface::new(8, 4);
        let view = RenderView {
            config: &c,
            frame: Some(&frame),
            fullscreen: false,
        };
        draw_bar(surface.buffer_mut(), 8, 4, &view);
        // centred 4x4 sprite occupies x 2..6
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, c.overlay_opacity]));
        assert_eq!(surface.pixel(2, 1), Some([0, 0, 255, 255]));
        assert_eq!(surface.pixel(5, 3), Some([0, 0, 255, 255]));
        assert_eq!(surface.pixel(6, 0), Some([0, 0, 0, c.overlay_opacity]));
    }

    #[test]
    fn test_fullscreen_hides_bar() {
        let mut c = config();
        let frame = Frame::solid(1, 1, [255, 255, 255, 255]).unwrap();
        let mut surface = MemorySurface::new(8, 4);
        let view = RenderView {
            config: &c,
            frame: Some(&frame),
            fullscreen: true,
        };
        draw_bar(surface.buffer_mut(), 8, 4, &view);
        assert!(surface.pixels().iter().all(|&b| b == 0));

        c.layer = Layer::Overlay;
        assert!(!bar_hidden(&c, true));
        c.layer = Layer::Top;
        c.disable_fullscreen_hide = true;
        assert!(!bar_hidden(&c, true));
    }

    #[test]
    fn test_missing_frame_draws_background_only() {
        let c = config();
        let mut surface = MemorySurface::new(3, 2);
        let view = RenderView {
            config: &c,
            frame: None,
            fullscreen: false,
        };
        draw_bar(surface.buffer_mut(), 3, 2, &view);
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(surface.pixel(x, y), Some([0, 0, 0, c.overlay_opacity]));
            }
        }
        surface.present().unwrap();
        assert_eq!(surface.presented(), 1);
    }
}
