//! Image composition for round and winner announcements.
//!
//! Everything here is a pure function of its inputs: no I/O, no randomness.
//! Callers run these inside `spawn_blocking` since resizing is CPU bound.

mod bracket;

pub use bracket::build_bracket;

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::config::BracketLayout;
use crate::error::Result;

/// Offset of an idol image inside the shadow border
pub const BORDER_OFFSET: (u32, u32) = (15, 15);

/// Overlay images as fetched, before any resizing
pub struct RawOverlays {
    pub verses: RgbaImage,
    pub shadow_border: RgbaImage,
    pub bracket: RgbaImage,
    pub crown: RgbaImage,
}

/// Decorative images shared by every game. Loaded once, never mutated.
pub struct OverlayAssets {
    pub verses: RgbaImage,
    pub shadow_border: RgbaImage,
    pub crown: RgbaImage,
    /// Bracket template with the crown already drawn on
    pub bracket: RgbaImage,
    pub layout: BracketLayout,
}

impl OverlayAssets {
    /// Size the raw overlays to match idol images of `image_height`
    pub fn prepare(raw: RawOverlays, layout: BracketLayout, image_height: u32) -> Self {
        let verses = resize_to_height(&raw.verses, image_height + 30);
        let shadow_border = resize_to_height(&raw.shadow_border, image_height + 30);
        let crown = resize_to_width(&raw.crown, (image_height / 2).max(1));

        let mut bracket = raw.bracket;
        let (crown_x, crown_y) = layout.crown_offset;
        imageops::overlay(&mut bracket, &crown, crown_x as i64, crown_y as i64);

        Self {
            verses,
            shadow_border,
            crown,
            bracket,
            layout,
        }
    }
}

/// Scale an image to `height`, keeping its aspect ratio
pub fn resize_to_height(img: &RgbaImage, height: u32) -> RgbaImage {
    if img.height() == 0 || img.height() == height {
        return img.clone();
    }
    let width = ((img.width() as u64 * height as u64) / img.height() as u64).max(1) as u32;
    imageops::resize(img, width, height, FilterType::Lanczos3)
}

/// Scale an image to `width`, keeping its aspect ratio
pub fn resize_to_width(img: &RgbaImage, width: u32) -> RgbaImage {
    if img.width() == 0 || img.width() == width {
        return img.clone();
    }
    let height = ((img.height() as u64 * width as u64) / img.width() as u64).max(1) as u32;
    imageops::resize(img, width, height, FilterType::Lanczos3)
}

/// Place `left` at the origin and `right` directly after it.
///
/// The result is `left.width + right.width` wide and as tall as the taller
/// input; uncovered pixels stay transparent.
pub fn combine_side_by_side(left: &RgbaImage, right: &RgbaImage) -> RgbaImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());

    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(&mut canvas, left, 0, 0);
    imageops::replace(&mut canvas, right, left.width() as i64, 0);
    canvas
}

/// Draw `img` over a copy of the border template at the given offset
pub fn add_shadow_border(
    img: &RgbaImage,
    border: &RgbaImage,
    offset_x: u32,
    offset_y: u32,
) -> RgbaImage {
    let mut canvas = border.clone();
    imageops::overlay(&mut canvas, img, offset_x as i64, offset_y as i64);
    canvas
}

/// "left VS right" frame for a round
pub fn round_frame(left: &RgbaImage, right: &RgbaImage, overlays: &OverlayAssets) -> RgbaImage {
    let (x, y) = BORDER_OFFSET;
    let left = add_shadow_border(left, &overlays.shadow_border, x, y);
    let right = add_shadow_border(right, &overlays.shadow_border, x, y);

    let left_and_verses = combine_side_by_side(&left, &overlays.verses);
    combine_side_by_side(&left_and_verses, &right)
}

/// Winner frame for games too small for the top-eight bracket
pub fn champion_frame(champion: &RgbaImage, overlays: &OverlayAssets) -> RgbaImage {
    let (x, y) = BORDER_OFFSET;
    let framed = add_shadow_border(champion, &overlays.shadow_border, x, y);
    let crown = &overlays.crown;

    let width = framed.width().max(crown.width());
    let mut canvas = RgbaImage::new(width, framed.height() + crown.height());
    let crown_x = (width - crown.width()) / 2;
    let framed_x = (width - framed.width()) / 2;
    imageops::overlay(&mut canvas, crown, crown_x as i64, 0);
    imageops::overlay(&mut canvas, &framed, framed_x as i64, crown.height() as i64);
    canvas
}

/// Encode as PNG, favouring speed over size
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, PngFilter::Adaptive)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            ExtendedColorType::Rgba8,
        )?;
    Ok(buf)
}

/// Decode any supported format into RGBA
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}
