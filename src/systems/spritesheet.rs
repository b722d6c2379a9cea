//! Sprite sheet loading.
//!
//! A sheet is one PNG laid out as an equal-size grid. [`load_sprite_sheet`]
//! decodes it, slices the grid, and crops every cell to the *union* of the
//! cells' opaque bounding boxes so all frames of a creature share one size
//! (flipping between frames of different tightness would otherwise make the
//! sprite jump). Each cropped frame is then centred on a transparent canvas
//! grown by the padding, optionally with its RGB channels inverted.
//!
//! # Contract
//!
//! - Decode failure is [`OverlayError::FileIo`].
//! - A grid that does not divide the sheet evenly is
//!   [`OverlayError::InvalidParam`]; nothing is rounded.
//! - Allocation failure is [`OverlayError::Memory`]. Frames built earlier
//!   in the same call are dropped before returning.
//!
//! # Related
//!
//! - [`crate::resources::framestore`] – calls the loader for every creature
//! - [`crate::components::animationset::AnimationSet::multiframe`] – assigns
//!   the returned frames to roles

use log::debug;

use crate::components::frame::{CHANNELS, Frame};
use crate::error::{OverlayError, Result};

/// Alpha a pixel must exceed to count as opaque when computing bounds.
pub const OPAQUE_THRESHOLD: u8 = 127;

/// Slicing and post-processing parameters for one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetOptions {
    pub columns: u32,
    pub rows: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    pub invert: bool,
    /// Crop to the union opaque bounds. When off the whole cell is kept.
    pub crop: bool,
}

impl SheetOptions {
    pub fn grid(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            padding_x: 0,
            padding_y: 0,
            invert: false,
            crop: true,
        }
    }

    pub fn with_padding(mut self, padding_x: u32, padding_y: u32) -> Self {
        self.padding_x = padding_x;
        self.padding_y = padding_y;
        self
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn with_crop(mut self, crop: bool) -> Self {
        self.crop = crop;
        self
    }
}

/// Inclusive pixel bounds inside one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

/// Decode encoded image bytes into a single RGBA frame.
pub fn decode_rgba(bytes: &[u8]) -> Result<Frame> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| OverlayError::file_io_with("decoding image", e))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Frame::new(width, height, img.into_raw())
}

/// Decode and slice a sheet with the cropping policy on.
pub fn load_sprite_sheet(
    bytes: &[u8],
    columns: u32,
    rows: u32,
    padding_x: u32,
    padding_y: u32,
    invert: bool,
) -> Result<Vec<Frame>> {
    let options = SheetOptions::grid(columns, rows)
        .with_padding(padding_x, padding_y)
        .with_invert(invert);
    load_sprite_sheet_with(bytes, &options)
}

pub fn load_sprite_sheet_with(bytes: &[u8], options: &SheetOptions) -> Result<Vec<Frame>> {
    let sheet = decode_rgba(bytes)?;
    slice_sheet(&sheet, options)
}

/// Opaque bounds of the `cell_w x cell_h` cell whose top-left is
/// `(origin_x, origin_y)` in `sheet`, relative to the cell.
///
/// A cell with no opaque pixel collapses to the single pixel at its origin.
pub fn opaque_bounds(
    sheet: &Frame,
    origin_x: u32,
    origin_y: u32,
    cell_w: u32,
    cell_h: u32,
) -> BoundingBox {
    let mut bounds: Option<BoundingBox> = None;
    for y in 0..cell_h {
        for x in 0..cell_w {
            if sheet.alpha_at(origin_x + x, origin_y + y) <= OPAQUE_THRESHOLD {
                continue;
            }
            let b = bounds.get_or_insert(BoundingBox {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            });
            b.min_x = b.min_x.min(x);
            b.min_y = b.min_y.min(y);
            b.max_x = b.max_x.max(x);
            b.max_y = b.max_y.max(y);
        }
    }
    bounds.unwrap_or(BoundingBox {
        min_x: 0,
        min_y: 0,
        max_x: 0,
        max_y: 0,
    })
}

/// Slice an already decoded sheet into frames.
pub fn slice_sheet(sheet: &Frame, options: &SheetOptions) -> Result<Vec<Frame>> {
    let SheetOptions {
        columns,
        rows,
        padding_x,
        padding_y,
        invert,
        crop,
    } = *options;

    if columns == 0 || rows == 0 {
        return Err(OverlayError::invalid_param(format!(
            "sprite sheet grid must be at least 1x1, got {columns}x{rows}"
        )));
    }
    if sheet.is_empty() {
        return Err(OverlayError::invalid_param("sprite sheet has no pixels"));
    }
    let (sheet_w, sheet_h) = (sheet.width(), sheet.height());
    if sheet_w % columns != 0 || sheet_h % rows != 0 {
        return Err(OverlayError::invalid_param(format!(
            "sprite sheet {sheet_w}x{sheet_h} does not divide into {columns}x{rows} cells"
        )));
    }
    let cell_w = sheet_w / columns;
    let cell_h = sheet_h / rows;

    let cells: Vec<(u32, u32)> = (0..rows)
        .flat_map(|row| (0..columns).map(move |col| (col * cell_w, row * cell_h)))
        .collect();

    let crop_box = if crop {
        cells
            .iter()
            .map(|&(ox, oy)| opaque_bounds(sheet, ox, oy, cell_w, cell_h))
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or(BoundingBox {
                min_x: 0,
                min_y: 0,
                max_x: cell_w - 1,
                max_y: cell_h - 1,
            })
    } else {
        BoundingBox {
            min_x: 0,
            min_y: 0,
            max_x: cell_w - 1,
            max_y: cell_h - 1,
        }
    };

    let out_w = crop_box.width() + 2 * padding_x;
    let out_h = crop_box.height() + 2 * padding_y;

    let mut frames = Vec::new();
    frames
        .try_reserve_exact(cells.len())
        .map_err(|e| OverlayError::memory(format!("frame table: {e}")))?;

    for &(ox, oy) in &cells {
        let mut frame = Frame::transparent(out_w, out_h)?;
        copy_region(
            sheet,
            ox + crop_box.min_x,
            oy + crop_box.min_y,
            crop_box.width(),
            crop_box.height(),
            &mut frame,
            padding_x,
            padding_y,
            invert,
        );
        frames.push(frame);
    }

    debug!(
        "Sliced {}x{} sheet into {} frames of {}x{} (cell {}x{}, padding {},{})",
        sheet_w,
        sheet_h,
        frames.len(),
        out_w,
        out_h,
        cell_w,
        cell_h,
        padding_x,
        padding_y
    );
    Ok(frames)
}

#[allow(clippy::too_many_arguments)]
fn copy_region(
    src: &Frame,
    src_x: u32,
    src_y: u32,
    width: u32,
    height: u32,
    dest: &mut Frame,
    dest_x: u32,
    dest_y: u32,
    invert: bool,
) {
    let src_stride = src.width() as usize * CHANNELS;
    let dest_stride = dest.width() as usize * CHANNELS;
    let row_len = width as usize * CHANNELS;
    let src_pixels = src.pixels();
    let dest_pixels = dest.pixels_mut();

    for row in 0..height as usize {
        let s = (src_y as usize + row) * src_stride + src_x as usize * CHANNELS;
        let d = (dest_y as usize + row) * dest_stride + dest_x as usize * CHANNELS;
        let src_row = &src_pixels[s..s + row_len];
        let dest_row = &mut dest_pixels[d..d + row_len];
        if invert {
            for (out, px) in dest_row
                .chunks_exact_mut(CHANNELS)
                .zip(src_row.chunks_exact(CHANNELS))
            {
                out[0] = 255 - px[0];
                out[1] = 255 - px[1];
                out[2] = 255 - px[2];
                out[3] = px[3];
            }
        } else {
            dest_row.copy_from_slice(src_row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transparent `w x h` sheet with opaque rectangles painted in.
    fn sheet_with(w: u32, h: u32, rects: &[(u32, u32, u32, u32, [u8; 4])]) -> Frame {
        let mut f = Frame::transparent(w, h).unwrap();
        let stride = w as usize * CHANNELS;
        for &(x, y, rw, rh, rgba) in rects {
            for yy in y..y + rh {
                for xx in x..x + rw {
                    let i = yy as usize * stride + xx as usize * CHANNELS;
                    f.pixels_mut()[i..i + CHANNELS].copy_from_slice(&rgba);
                }
            }
        }
        f
    }

    #[test]
    fn test_crop_and_pad_single_block() {
        let red = [200, 10, 20, 255];
        let sheet = sheet_with(16, 12, &[(5, 3, 4, 2, red)]);
        let opts = SheetOptions::grid(1, 1).with_padding(2, 3);
        let frames = slice_sheet(&sheet, &opts).unwrap();
        assert_eq!(frames.len(), 1);
        let f = &frames[0];
        assert_eq!((f.width(), f.height()), (4 + 4, 2 + 6));
        for y in 0..f.height() {
            for x in 0..f.width() {
                let inside = (2..6).contains(&x) && (3..5).contains(&y);
                let expected = if inside { red } else { [0, 0, 0, 0] };
                assert_eq!(f.pixel(x, y), Some(expected), "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn test_union_bounds_share_dimensions() {
        // two 10x10 cells with blocks of different extents
        let sheet = sheet_with(
            20,
            10,
            &[(1, 1, 2, 2, [255; 4]), (13, 4, 5, 5, [255; 4])],
        );
        let frames = slice_sheet(&sheet, &SheetOptions::grid(2, 1)).unwrap();
        assert_eq!(frames[0].width(), frames[1].width());
        assert_eq!(frames[0].height(), frames[1].height());
        // union spans x 1..=7 and y 1..=8 relative to the cell
        assert_eq!((frames[0].width(), frames[0].height()), (7, 8));
    }

    #[test]
    fn test_threshold_is_strict() {
        let sheet = sheet_with(4, 4, &[(0, 0, 4, 4, [9, 9, 9, 127]), (2, 1, 1, 1, [9, 9, 9, 128])]);
        let b = opaque_bounds(&sheet, 0, 0, 4, 4);
        assert_eq!(b, BoundingBox { min_x: 2, min_y: 1, max_x: 2, max_y: 1 });
    }

    #[test]
    fn test_fully_transparent_cell_collapses_to_origin() {
        let sheet = Frame::transparent(8, 8).unwrap();
        let b = opaque_bounds(&sheet, 0, 0, 8, 8);
        assert_eq!((b.width(), b.height()), (1, 1));
        let frames = slice_sheet(&sheet, &SheetOptions::grid(1, 1).with_padding(1, 1)).unwrap();
        assert_eq!((frames[0].width(), frames[0].height()), (3, 3));
    }

    #[test]
    fn test_invert_is_symmetric_and_keeps_alpha() {
        let px = [10, 100, 250, 200];
        let sheet = sheet_with(2, 2, &[(0, 0, 2, 2, px)]);
        let inverted = slice_sheet(&sheet, &SheetOptions::grid(1, 1).with_invert(true)).unwrap();
        let got = inverted[0].pixel(1, 1).unwrap();
        assert_eq!(got, [245, 155, 5, 200]);
        let back = [255 - got[0], 255 - got[1], 255 - got[2], got[3]];
        assert_eq!(back, px);
    }

    #[test]
    fn test_no_crop_keeps_cell() {
        let sheet = sheet_with(12, 6, &[(1, 1, 1, 1, [255; 4])]);
        let frames = slice_sheet(&sheet, &SheetOptions::grid(2, 1).with_crop(false)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[1].width(), frames[1].height()), (6, 6));
    }

    #[test]
    fn test_rejects_non_divisible_grid() {
        let sheet = Frame::transparent(10, 4).unwrap();
        let err = slice_sheet(&sheet, &SheetOptions::grid(3, 1)).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidParam(_)));
        let err = slice_sheet(&sheet, &SheetOptions::grid(0, 1)).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidParam(_)));
    }

    #[test]
    fn test_decode_garbage_is_file_error() {
        let err = load_sprite_sheet(b"not a png", 1, 1, 0, 0, false).unwrap_err();
        assert!(matches!(err, OverlayError::FileIo { .. }));
    }

    #[test]
    fn test_grid_order_is_row_major() {
        let sheet = sheet_with(
            4,
            4,
            &[
                (0, 0, 2, 2, [1, 0, 0, 255]),
                (2, 0, 2, 2, [2, 0, 0, 255]),
                (0, 2, 2, 2, [3, 0, 0, 255]),
                (2, 2, 2, 2, [4, 0, 0, 255]),
            ],
        );
        let frames = slice_sheet(&sheet, &SheetOptions::grid(2, 2)).unwrap();
        let firsts: Vec<u8> = frames.iter().map(|f| f.pixel(0, 0).unwrap()[0]).collect();
        assert_eq!(firsts, vec![1, 2, 3, 4]);
    }
}
