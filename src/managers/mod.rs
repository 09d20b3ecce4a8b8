pub mod asset_manager;
pub mod game_manager;
pub mod stats_manager;
pub mod suggestion_manager;

pub use asset_manager::{create_shared_asset_manager, load_overlays, SharedAssetManager};
pub use game_manager::{create_shared_game_manager, ReactionOutcome, SharedGameManager};
pub use stats_manager::{create_shared_stats_manager, SharedStatsManager, StatsTarget};
pub use suggestion_manager::{
    create_shared_suggestion_manager, ModerationOutcome, SharedSuggestionManager,
};
