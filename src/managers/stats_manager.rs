use chrono::Utc;
use poise::serenity_prelude::{GuildId, UserId};
use std::sync::Arc;

use crate::error::Result;
use crate::services::Embed;
use crate::state::{GameFilter, SharedDocumentStore};
use crate::stats::{bucket_by_count, bucket_fields, count_labels, StatsQuery, StatsScope};

/// Who the stats are about, for the embed header
#[derive(Debug, Clone)]
pub struct StatsTarget {
    pub name: String,
    pub icon_url: Option<String>,
}

/// Read-only stats over persisted games
pub struct StatsManager {
    documents: SharedDocumentStore,
}

impl StatsManager {
    pub fn new(documents: SharedDocumentStore) -> Self {
        Self { documents }
    }

    /// Filter for `query` as asked by `requester` in `guild`.
    ///
    /// Server stats outside a guild fall back to the requester's own games.
    pub fn filter_for(query: &StatsQuery, requester: UserId, guild: Option<GuildId>) -> GameFilter {
        let mut filter = GameFilter::default();
        match (query.scope, guild) {
            (StatsScope::Global, _) => {}
            (StatsScope::Server, Some(guild)) => filter.guild_id = Some(guild),
            (StatsScope::User(user), _) => filter.user_id = Some(user),
            (StatsScope::Own, _) | (StatsScope::Server, None) => filter.user_id = Some(requester),
        }

        if query.today {
            filter.since = Utc::now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc());
        }
        filter
    }

    /// Stats embed, or `None` when no game matches
    pub async fn stats_embed(
        &self,
        query: &StatsQuery,
        requester: UserId,
        guild: Option<GuildId>,
        target: &StatsTarget,
    ) -> Result<Option<Embed>> {
        let filter = Self::filter_for(query, requester, guild);
        let games = self.documents.find_games(&filter).await?;
        if games.is_empty() {
            return Ok(None);
        }

        let counts = count_labels(&games, query.dimension, query.grouping);
        let buckets = bucket_by_count(counts);

        let mut embed = Embed::new().author(format!("{} - {}", target.name, query.title()));
        if let Some(icon) = &target.icon_url {
            embed = embed.author_icon(icon);
        }
        for (name, value) in bucket_fields(query.count_label(), &buckets) {
            embed = embed.field(name, value, false);
        }

        Ok(Some(embed.truncated()))
    }
}

/// Shared stats manager type
pub type SharedStatsManager = Arc<StatsManager>;

pub fn create_shared_stats_manager(documents: SharedDocumentStore) -> SharedStatsManager {
    Arc::new(StatsManager::new(documents))
}
