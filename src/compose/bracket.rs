use image::imageops;
use image::RgbaImage;
use std::sync::Arc;

use super::{resize_to_height, OverlayAssets};
use crate::config::BRACKET_SLOTS;
use crate::error::{BotError, Result};

/// Draw the top-eight bracket.
///
/// `entries` must hold exactly 15 images in slot order: the eight
/// quarterfinalists followed by the last seven round winners.
pub fn build_bracket(entries: &[Arc<RgbaImage>], overlays: &OverlayAssets) -> Result<RgbaImage> {
    if entries.len() != BRACKET_SLOTS {
        return Err(BotError::Internal {
            message: format!(
                "bracket needs {} entries, got {}",
                BRACKET_SLOTS,
                entries.len()
            ),
        });
    }

    let mut canvas = overlays.bracket.clone();
    for (img, slot) in entries.iter().zip(overlays.layout.slots.iter()) {
        let thumbnail = resize_to_height(img, slot.height);
        imageops::overlay(&mut canvas, &thumbnail, slot.x as i64, slot.y as i64);
    }

    Ok(canvas)
}
