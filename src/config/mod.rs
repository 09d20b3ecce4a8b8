pub mod bot;
pub mod bracket;

pub use bot::{BotConfig, DriveFolders};
pub use bracket::{BracketLayout, BracketSlot, BRACKET_SLOTS};
