//! Software compositor for the overlay bar.
//!
//! Frames are RGBA; the destination is a `wl_shm` `Argb8888` buffer, which
//! on little-endian machines stores each pixel as the bytes **B, G, R, A**.
//! Every write in this module uses that order.
//!
//! [`blit_scaled`] resamples a frame into an arbitrary destination rectangle:
//!
//! | antialias | scale            | sampling               | write            |
//! |-----------|------------------|------------------------|------------------|
//! | off       | any              | nearest neighbour      | copy if alpha > 127 |
//! | on        | shrink (either axis) | box filter         | "over" blend     |
//! | on        | grow or same size    | bilinear           | "over" blend     |
//!
//! Pixels falling outside the destination are skipped one by one, so
//! partially off-screen blits are fine.

use crate::components::frame::{CHANNELS, Frame};

/// Alpha a source pixel must exceed to be copied by the nearest-neighbour path.
pub const COPY_THRESHOLD: u8 = 127;

/// Sampling switches for [`blit_scaled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlitOptions {
    pub antialias: bool,
    pub mirror_x: bool,
    pub mirror_y: bool,
}

#[inline]
fn dest_index(dest_len: usize, dest_w: usize, dest_h: usize, x: i64, y: i64) -> Option<usize> {
    if x < 0 || y < 0 || x as usize >= dest_w || y as usize >= dest_h {
        return None;
    }
    let idx = (y as usize * dest_w + x as usize) * CHANNELS;
    (idx + CHANNELS <= dest_len).then_some(idx)
}

/// Composite `rgba` onto the BGRA pixel at `idx` with "over" blending.
#[inline]
pub fn blend_pixel(dest: &mut [u8], idx: usize, rgba: [u8; 4]) {
    let [r, g, b, a] = rgba;
    match a {
        0 => {}
        255 => {
            dest[idx] = b;
            dest[idx + 1] = g;
            dest[idx + 2] = r;
            dest[idx + 3] = 255;
        }
        _ => {
            let alpha = a as f32 / 255.0;
            let inv = 1.0 - alpha;
            let mix = |s: u8, d: u8| (s as f32 * alpha + d as f32 * inv + 0.5) as u8;
            dest[idx] = mix(b, dest[idx]);
            dest[idx + 1] = mix(g, dest[idx + 1]);
            dest[idx + 2] = mix(r, dest[idx + 2]);
            dest[idx + 3] = 255;
        }
    }
}

#[inline]
fn src_pixel(src: &Frame, x: usize, y: usize) -> [u8; 4] {
    let idx = (y * src.width() as usize + x) * CHANNELS;
    let p = &src.pixels()[idx..idx + CHANNELS];
    [p[0], p[1], p[2], p[3]]
}

/// Average of every source pixel mapping into destination cell `(x, y)`.
///
/// The covered source range is inclusive on both ends and all four channels
/// are averaged linearly.
fn box_filtered(
    src: &Frame,
    x: usize,
    y: usize,
    target_w: usize,
    target_h: usize,
    opts: BlitOptions,
) -> [u8; 4] {
    let src_w = src.width() as usize;
    let src_h = src.height() as usize;

    let x0 = (x * src_w / target_w).min(src_w - 1);
    let y0 = (y * src_h / target_h).min(src_h - 1);
    let x1 = ((x + 1) * src_w / target_w).min(src_w - 1).max(x0);
    let y1 = ((y + 1) * src_h / target_h).min(src_h - 1).max(y0);

    let mut sum = [0u32; 4];
    let mut count = 0u32;
    for sy in y0..=y1 {
        let my = if opts.mirror_y { src_h - 1 - sy } else { sy };
        for sx in x0..=x1 {
            let mx = if opts.mirror_x { src_w - 1 - sx } else { sx };
            let p = src_pixel(src, mx, my);
            for c in 0..4 {
                sum[c] += p[c] as u32;
            }
            count += 1;
        }
    }
    if count == 0 {
        return [0; 4];
    }
    let avg = |s: u32| ((s as f32 / count as f32) + 0.5) as u8;
    [avg(sum[0]), avg(sum[1]), avg(sum[2]), avg(sum[3])]
}

/// Bilinear sample at fractional source coordinate `(fx, fy)`, clamped to
/// the frame.
fn bilinear(src: &Frame, fx: f32, fy: f32) -> [u8; 4] {
    let max_x = (src.width() - 1) as f32;
    let max_y = (src.height() - 1) as f32;
    let fx = fx.clamp(0.0, max_x);
    let fy = fy.clamp(0.0, max_y);

    let x1 = fx as usize;
    let y1 = fy as usize;
    let x2 = (x1 + 1).min(src.width() as usize - 1);
    let y2 = (y1 + 1).min(src.height() as usize - 1);
    let dx = fx - x1 as f32;
    let dy = fy - y1 as f32;

    let tl = src_pixel(src, x1, y1);
    let tr = src_pixel(src, x2, y1);
    let bl = src_pixel(src, x1, y2);
    let br = src_pixel(src, x2, y2);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = tl[c] as f32 * (1.0 - dx) + tr[c] as f32 * dx;
        let bottom = bl[c] as f32 * (1.0 - dx) + br[c] as f32 * dx;
        out[c] = (top * (1.0 - dy) + bottom * dy + 0.5) as u8;
    }
    out
}

/// Scale `src` into the `target_w x target_h` rectangle at
/// `(offset_x, offset_y)` of a BGRA destination buffer.
///
/// Empty frames, non-positive targets and destination pixels outside
/// `dest_w x dest_h` (or past the end of `dest`) are ignored.
#[allow(clippy::too_many_arguments)]
pub fn blit_scaled(
    dest: &mut [u8],
    dest_w: usize,
    dest_h: usize,
    src: &Frame,
    offset_x: i32,
    offset_y: i32,
    target_w: i32,
    target_h: i32,
    opts: BlitOptions,
) {
    if src.is_empty() || target_w <= 0 || target_h <= 0 {
        return;
    }
    let src_w = src.width() as usize;
    let src_h = src.height() as usize;
    let tw = target_w as usize;
    let th = target_h as usize;
    let downscale = tw < src_w || th < src_h;
    let scale_x = src_w as f32 / tw as f32;
    let scale_y = src_h as f32 / th as f32;
    let dest_len = dest.len();

    for y in 0..th {
        let dy = offset_y as i64 + y as i64;
        if dy < 0 || dy as usize >= dest_h {
            continue;
        }
        for x in 0..tw {
            let dx = offset_x as i64 + x as i64;
            let Some(idx) = dest_index(dest_len, dest_w, dest_h, dx, dy) else {
                continue;
            };

            if opts.antialias {
                let rgba = if downscale {
                    box_filtered(src, x, y, tw, th, opts)
                } else {
                    let mut fx = x as f32 * scale_x;
                    let mut fy = y as f32 * scale_y;
                    if opts.mirror_x {
                        fx = (src_w - 1) as f32 - fx;
                    }
                    if opts.mirror_y {
                        fy = (src_h - 1) as f32 - fy;
                    }
                    bilinear(src, fx, fy)
                };
                blend_pixel(dest, idx, rgba);
            } else {
                let mut sx = x * src_w / tw;
                let mut sy = y * src_h / th;
                if opts.mirror_x {
                    sx = src_w - 1 - sx;
                }
                if opts.mirror_y {
                    sy = src_h - 1 - sy;
                }
                let [r, g, b, a] = src_pixel(src, sx, sy);
                if a > COPY_THRESHOLD {
                    dest[idx] = b;
                    dest[idx + 1] = g;
                    dest[idx + 2] = r;
                    dest[idx + 3] = a;
                }
            }
        }
    }
}

/// Fill a clipped rectangle with a solid colour, overwriting (not blending).
#[allow(clippy::too_many_arguments)]
pub fn draw_rect(
    dest: &mut [u8],
    dest_w: usize,
    dest_h: usize,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    r: u8,
    g: u8,
    b: u8,
    a: u8,
) {
    let dest_len = dest.len();
    for j in y as i64..y as i64 + h.max(0) as i64 {
        for i in x as i64..x as i64 + w.max(0) as i64 {
            if let Some(idx) = dest_index(dest_len, dest_w, dest_h, i, j) {
                dest[idx] = b;
                dest[idx + 1] = g;
                dest[idx + 2] = r;
                dest[idx + 3] = a;
            }
        }
    }
}
