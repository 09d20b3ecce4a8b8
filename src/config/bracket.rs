use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

/// Number of idols drawn on the top-eight bracket: 8 + 4 + 2 + 1
pub const BRACKET_SLOTS: usize = 15;

/// One thumbnail position on the bracket template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketSlot {
    pub x: u32,
    pub y: u32,
    /// Thumbnails are resized to this height, keeping aspect ratio
    pub height: u32,
}

/// Pixel layout of the top-eight bracket template.
///
/// The layout only makes sense together with the template image it was
/// measured on, so a new template must ship with a new version of this table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketLayout {
    pub version: u32,

    /// Slots ordered: quarterfinalists (0..8), semifinalists (8..12),
    /// finalists (12..14), champion (14)
    pub slots: Vec<BracketSlot>,

    /// Where the crown overlay is drawn on the template
    pub crown_offset: (u32, u32),
}

impl BracketLayout {
    /// Layout for `topEightBracket.png` (528x532)
    pub fn top_eight_v1() -> Self {
        let slot = |x, y, height| BracketSlot { x, y, height };
        Self {
            version: 1,
            slots: vec![
                slot(478, 472, 50),
                slot(419, 472, 50),
                slot(340, 472, 50),
                slot(281, 472, 50),
                slot(202, 472, 50),
                slot(143, 472, 50),
                slot(64, 472, 50),
                slot(5, 472, 50),
                slot(443, 364, 60),
                slot(305, 364, 60),
                slot(167, 364, 60),
                slot(29, 364, 60),
                slot(358, 226, 90),
                slot(81, 226, 90),
                slot(182, 8, 165),
            ],
            crown_offset: (230, 5),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slots.len() != BRACKET_SLOTS {
            return Err(BotError::ConfigValidation {
                message: format!(
                    "bracket layout v{} has {} slots, expected {}",
                    self.version,
                    self.slots.len(),
                    BRACKET_SLOTS
                ),
            });
        }
        if self.slots.iter().any(|s| s.height == 0) {
            return Err(BotError::ConfigValidation {
                message: format!("bracket layout v{} has a zero-height slot", self.version),
            });
        }
        Ok(())
    }
}

impl Default for BracketLayout {
    fn default() -> Self {
        Self::top_eight_v1()
    }
}
