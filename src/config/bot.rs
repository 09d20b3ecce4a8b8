use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::BracketLayout;
use crate::error::{BotError, Result};

/// Bot configuration loaded from `config.json`.
///
/// Secrets (Discord token, Drive access token) are read from the environment
/// and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Prefix for text commands (e.g. "!" for "!biasgame")
    pub prefix: String,

    /// Users allowed to run privileged commands (refresh-images, suggestion-note)
    pub owner_ids: Vec<u64>,

    /// Remote folder ids for idol and overlay images
    pub folders: DriveFolders,

    /// Channel where the moderation embed lives
    pub suggestion_channel_id: Option<u64>,

    /// Bracket sizes a user may request
    pub allowed_game_sizes: Vec<usize>,

    /// Bracket size when none is given
    pub default_game_size: usize,

    /// Target height of every idol image after resizing
    pub image_height: u32,

    /// Maximum number of image fetches in flight during a refresh
    pub fetch_concurrency: usize,

    /// Timeout applied to every remote fetch
    pub fetch_timeout_secs: u64,

    /// Pause between a reaction and the next round message
    pub round_delay_ms: u64,

    /// Suggested images must be square with a side in [min, max]
    pub suggestion_min_size: u32,
    pub suggestion_max_size: u32,

    /// Directory for persisted state
    pub state_path: String,

    /// Translation file
    pub i18n_path: String,

    /// Pixel layout paired with the bracket template image
    pub bracket_layout: BracketLayout,
}

/// Remote folders by purpose
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveFolders {
    pub girls: String,
    pub boys: String,
    pub misc: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            owner_ids: Vec::new(),
            folders: DriveFolders::default(),
            suggestion_channel_id: None,
            allowed_game_sizes: vec![2, 4, 8, 16, 32, 64, 128, 256],
            default_game_size: 32,
            image_height: 150,
            fetch_concurrency: 16,
            fetch_timeout_secs: 15,
            round_delay_ms: 200,
            suggestion_min_size: 150,
            suggestion_max_size: 2000,
            state_path: "state".to_string(),
            i18n_path: "assets/i18n/en.json".to_string(),
            bracket_layout: BracketLayout::top_eight_v1(),
        }
    }
}

impl BotConfig {
    /// Load and validate the config from a JSON file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BotError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;

        let config: BotConfig =
            serde_json::from_str(&content).map_err(|e| BotError::ConfigParse {
                path: path.to_string(),
                source: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the bot cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.allowed_game_sizes.is_empty() {
            return Err(BotError::ConfigValidation {
                message: "allowed_game_sizes must not be empty".to_string(),
            });
        }

        if let Some(size) = self
            .allowed_game_sizes
            .iter()
            .find(|s| **s < 2 || !s.is_power_of_two())
        {
            return Err(BotError::ConfigValidation {
                message: format!("game size {} is not a power of two >= 2", size),
            });
        }

        if !self.allowed_game_sizes.contains(&self.default_game_size) {
            return Err(BotError::ConfigValidation {
                message: format!(
                    "default_game_size {} is not in allowed_game_sizes",
                    self.default_game_size
                ),
            });
        }

        if self.fetch_concurrency == 0 {
            return Err(BotError::ConfigValidation {
                message: "fetch_concurrency must be at least 1".to_string(),
            });
        }

        if self.suggestion_min_size > self.suggestion_max_size {
            return Err(BotError::ConfigValidation {
                message: "suggestion_min_size is larger than suggestion_max_size".to_string(),
            });
        }

        if self.image_height == 0 {
            return Err(BotError::ConfigValidation {
                message: "image_height must be positive".to_string(),
            });
        }

        self.bracket_layout.validate()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn round_delay(&self) -> Duration {
        Duration::from_millis(self.round_delay_ms)
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }

    pub fn documents_path(&self) -> String {
        format!("{}/biasgame.json", self.state_path)
    }
}
