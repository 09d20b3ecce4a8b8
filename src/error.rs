use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Game errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not enough idols for a {requested} bracket: only {available} available")]
    InsufficientRoster { requested: usize, available: usize },

    // Asset errors
    #[error("Failed to fetch '{url}': {message}")]
    TransientFetch { url: String, message: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Required asset missing: {name}")]
    MissingAsset { name: String },

    #[error("Object store error: {message}")]
    ObjectStore { message: String },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Bad user input. Each variant has a translated guidance message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid command arguments")]
    InvalidArguments,

    #[error("Unterminated quote in arguments")]
    UnterminatedQuote,

    #[error("Game size {size} is not allowed")]
    InvalidGameSize { size: usize },

    #[error("Unknown gender '{value}'")]
    InvalidGender { value: String },

    #[error("Invalid suggestion arguments")]
    InvalidSuggestion,

    #[error("Unsupported image type: {content_type}")]
    UnsupportedImageFormat { content_type: String },

    #[error("Image is not square ({width}x{height})")]
    ImageNotSquare { width: u32, height: u32 },

    #[error("Image is too large ({size}px, max {max}px)")]
    ImageTooLarge { size: u32, max: u32 },

    #[error("Image is too small ({size}px, min {min}px)")]
    ImageTooSmall { size: u32, min: u32 },

    #[error("Group or idol name contains quotes or underscores")]
    ForbiddenCharacters,
}

impl ValidationError {
    /// Translation key of the message shown to the user
    pub fn message_key(&self) -> &'static str {
        match self {
            ValidationError::InvalidArguments | ValidationError::UnterminatedQuote => {
                "biasgame.game.invalid-arguments"
            }
            ValidationError::InvalidGameSize { .. } => "biasgame.game.invalid-game-size",
            ValidationError::InvalidGender { .. } => "biasgame.game.invalid-gender",
            ValidationError::InvalidSuggestion => "biasgame.suggestion.invalid-arguments",
            ValidationError::UnsupportedImageFormat { .. } => {
                "biasgame.suggestion.not-png-or-jpeg"
            }
            ValidationError::ImageNotSquare { .. } => "biasgame.suggestion.image-not-square",
            ValidationError::ImageTooLarge { .. } => "biasgame.suggestion.image-too-big",
            ValidationError::ImageTooSmall { .. } => "biasgame.suggestion.image-too-small",
            ValidationError::ForbiddenCharacters => "biasgame.suggestion.invalid-group-or-idol",
        }
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::TransientFetch {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for BotError {
    fn from(err: tokio::task::JoinError) -> Self {
        BotError::Internal {
            message: format!("background task failed: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use poise::serenity_prelude as serenity;
