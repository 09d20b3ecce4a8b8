use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{BotError, Result};
use crate::models::{GameResult, SuggestionEntry, SuggestionStatus};

/// Selects game records for stats
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameFilter {
    pub user_id: Option<UserId>,
    pub guild_id: Option<GuildId>,
    /// Only records created at or after this instant
    pub since: Option<DateTime<Utc>>,
}

impl GameFilter {
    pub fn matches(&self, game: &GameResult) -> bool {
        self.user_id.map_or(true, |u| game.user_id == u)
            && self.guild_id.map_or(true, |g| game.guild_id == Some(g))
            && self.since.map_or(true, |t| game.created_at >= t)
    }
}

/// Persistence for finished games and suggestions
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_game(&self, game: GameResult) -> Result<()>;

    async fn find_games(&self, filter: &GameFilter) -> Result<Vec<GameResult>>;

    async fn insert_suggestion(&self, suggestion: SuggestionEntry) -> Result<()>;

    async fn update_suggestion(&self, suggestion: &SuggestionEntry) -> Result<()>;

    /// Unresolved suggestions, oldest first
    async fn pending_suggestions(&self) -> Result<Vec<SuggestionEntry>>;
}

/// Shared document store type
pub type SharedDocumentStore = Arc<dyn DocumentStore>;

/// Everything persisted by the bias game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Documents {
    /// Schema version for migrations
    pub version: u32,

    #[serde(default)]
    pub games: Vec<GameResult>,

    #[serde(default)]
    pub suggestions: Vec<SuggestionEntry>,
}

impl Default for Documents {
    fn default() -> Self {
        Self {
            version: 1,
            games: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

/// Document store kept in memory and mirrored to a JSON file
pub struct JsonDocumentStore {
    path: Option<String>,
    documents: RwLock<Documents>,
}

impl JsonDocumentStore {
    /// Load from a JSON file, or start empty if it does not exist
    pub async fn load(path: &str) -> Result<Self> {
        let documents = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| BotError::StateParse {
                path: path.to_string(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Documents::default(),
            Err(e) => {
                return Err(BotError::StateLoad {
                    path: path.to_string(),
                    source: e,
                })
            }
        };

        Ok(Self {
            path: Some(path.to_string()),
            documents: RwLock::new(documents),
        })
    }

    /// Store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            documents: RwLock::new(Documents::default()),
        }
    }

    /// Save to the JSON file atomically
    async fn save(&self, documents: &Documents) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_string_pretty(documents)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.clone(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.clone(),
                source: e,
            })?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn insert_game(&self, game: GameResult) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.games.push(game);
        self.save(&documents).await
    }

    async fn find_games(&self, filter: &GameFilter) -> Result<Vec<GameResult>> {
        let documents = self.documents.read().await;
        Ok(documents
            .games
            .iter()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect())
    }

    async fn insert_suggestion(&self, suggestion: SuggestionEntry) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.suggestions.push(suggestion);
        self.save(&documents).await
    }

    async fn update_suggestion(&self, suggestion: &SuggestionEntry) -> Result<()> {
        let mut documents = self.documents.write().await;
        let existing = documents
            .suggestions
            .iter_mut()
            .find(|s| s.id == suggestion.id)
            .ok_or_else(|| BotError::Internal {
                message: format!("suggestion {} not found", suggestion.id),
            })?;
        *existing = suggestion.clone();
        self.save(&documents).await
    }

    async fn pending_suggestions(&self) -> Result<Vec<SuggestionEntry>> {
        let documents = self.documents.read().await;
        let mut pending: Vec<SuggestionEntry> = documents
            .suggestions
            .iter()
            .filter(|s| s.status == SuggestionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.created_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{game_result, suggestion};

    #[tokio::test]
    async fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biasgame.json");
        let path = path.to_str().unwrap();

        {
            let store = JsonDocumentStore::load(path).await.unwrap();
            store
                .insert_game(game_result(1, Some(10), "PRISTIN", "Nayoung"))
                .await
                .unwrap();
            store.insert_suggestion(suggestion("a")).await.unwrap();
        }

        let reloaded = JsonDocumentStore::load(path).await.unwrap();
        let games = reloaded.find_games(&GameFilter::default()).await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].winner.name, "Nayoung");
        assert_eq!(reloaded.pending_suggestions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_file_is_a_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biasgame.json");
        std::fs::write(&path, "{ not json").unwrap();
        let path = path.to_str().unwrap();

        let err = JsonDocumentStore::load(path).await.err().unwrap();
        assert!(
            matches!(&err, BotError::StateParse { path: p, .. } if p == path),
            "unexpected error {:?}",
            err
        );
        assert!(err.to_string().starts_with("Failed to parse state file"));
    }

    #[tokio::test]
    async fn test_filter_by_user_and_guild() {
        let store = JsonDocumentStore::in_memory();
        store.insert_game(game_result(1, Some(10), "A", "X")).await.unwrap();
        store.insert_game(game_result(2, Some(10), "A", "Y")).await.unwrap();
        store.insert_game(game_result(1, Some(20), "B", "Z")).await.unwrap();

        let by_user = GameFilter {
            user_id: Some(UserId::new(1)),
            ..Default::default()
        };
        assert_eq!(store.find_games(&by_user).await.unwrap().len(), 2);

        let by_guild = GameFilter {
            guild_id: Some(GuildId::new(10)),
            ..Default::default()
        };
        assert_eq!(store.find_games(&by_guild).await.unwrap().len(), 2);

        let future = GameFilter {
            since: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(store.find_games(&future).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolved_suggestions_are_not_pending() {
        let store = JsonDocumentStore::in_memory();
        let mut entry = suggestion("a");
        store.insert_suggestion(entry.clone()).await.unwrap();
        store.insert_suggestion(suggestion("b")).await.unwrap();

        entry.status = SuggestionStatus::Denied;
        store.update_suggestion(&entry).await.unwrap();

        let pending = store.pending_suggestions().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "b");
    }

    #[tokio::test]
    async fn test_update_unknown_suggestion_fails() {
        let store = JsonDocumentStore::in_memory();
        assert!(store.update_suggestion(&suggestion("missing")).await.is_err());
    }
}
