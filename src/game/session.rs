use chrono::Utc;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::error::{BotError, Result};
use crate::models::{GameResult, GenderFilter, IdolChoice, IdolEntry};

pub const LEFT_ARROW: &str = "\u{2b05}";
pub const RIGHT_ARROW: &str = "\u{27a1}";

/// Number of contestants pictured in the first column of the bracket
pub const TOP_EIGHT: usize = 8;

/// Which of the two pictured idols a reaction promotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Map a reaction glyph to a side, ignoring the U+FE0F variation selector
    pub fn from_glyph(glyph: &str) -> Option<Self> {
        let glyph: String = glyph.chars().filter(|c| *c != '\u{fe0f}').collect();
        match glyph.as_str() {
            LEFT_ARROW => Some(Side::Left),
            RIGHT_ARROW => Some(Side::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RoundOutcome {
    /// More rounds to play
    Continue,
    Champion(Arc<IdolChoice>),
}

/// One user's tournament.
///
/// The queue holds the remaining contestants in play order: the front two
/// are the current round, and each round winner goes to the back.
#[derive(Debug)]
pub struct GameSession {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub filter: GenderFilter,
    pub size: usize,
    queue: VecDeque<Arc<IdolChoice>>,
    round_winners: Vec<Arc<IdolChoice>>,
    round_losers: Vec<Arc<IdolChoice>>,
    top_eight: Vec<Arc<IdolChoice>>,
    champion: Option<Arc<IdolChoice>>,
    pub last_round_message: Option<MessageId>,
    /// idol id -> chosen image variant, so an idol keeps the same picture all game
    pub chosen_variants: HashMap<String, usize>,
}

impl GameSession {
    pub fn new(
        user_id: UserId,
        channel_id: ChannelId,
        filter: GenderFilter,
        contestants: Vec<Arc<IdolChoice>>,
    ) -> Self {
        let size = contestants.len();
        let mut session = Self {
            user_id,
            channel_id,
            filter,
            size,
            queue: contestants.into(),
            round_winners: Vec::with_capacity(size.saturating_sub(1)),
            round_losers: Vec::with_capacity(size.saturating_sub(1)),
            top_eight: Vec::new(),
            champion: None,
            last_round_message: None,
            chosen_variants: HashMap::new(),
        };
        session.snapshot_top_eight();
        session
    }

    /// The two idols of the current round, left first
    pub fn current_pair(&self) -> Option<(Arc<IdolChoice>, Arc<IdolChoice>)> {
        if self.champion.is_some() {
            return None;
        }
        match (self.queue.front(), self.queue.get(1)) {
            (Some(left), Some(right)) => Some((left.clone(), right.clone())),
            _ => None,
        }
    }

    pub fn idols_remaining(&self) -> usize {
        self.queue.len()
    }

    /// 1-based number of the round being played
    pub fn round_number(&self) -> usize {
        self.round_winners.len() + 1
    }

    pub fn round_winners(&self) -> &[Arc<IdolChoice>] {
        &self.round_winners
    }

    pub fn round_losers(&self) -> &[Arc<IdolChoice>] {
        &self.round_losers
    }

    pub fn champion(&self) -> Option<&Arc<IdolChoice>> {
        self.champion.as_ref()
    }

    /// Resolve the current round in favour of `side`
    pub fn advance(&mut self, side: Side) -> Result<RoundOutcome> {
        let (left, right) = self.current_pair().ok_or_else(|| BotError::Internal {
            message: format!("game of user {} has no round to play", self.user_id),
        })?;

        let (winner, loser) = match side {
            Side::Left => (left, right),
            Side::Right => (right, left),
        };

        self.round_winners.push(winner.clone());
        self.round_losers.push(loser);
        self.queue.drain(..2);
        self.queue.push_back(winner);

        if self.queue.len() == 1 {
            let champion = self.queue[0].clone();
            self.champion = Some(champion.clone());
            return Ok(RoundOutcome::Champion(champion));
        }

        self.snapshot_top_eight();
        Ok(RoundOutcome::Continue)
    }

    fn snapshot_top_eight(&mut self) {
        if self.queue.len() == TOP_EIGHT {
            self.top_eight = self.queue.iter().cloned().collect();
        }
    }

    /// Idols for the bracket graphic in slot order: the top eight followed
    /// by the last seven round winners. `None` for games smaller than eight.
    pub fn bracket_contestants(&self) -> Option<Vec<Arc<IdolChoice>>> {
        if self.top_eight.len() != TOP_EIGHT || self.round_winners.len() < TOP_EIGHT - 1 {
            return None;
        }
        let last_winners = &self.round_winners[self.round_winners.len() - (TOP_EIGHT - 1)..];
        Some(
            self.top_eight
                .iter()
                .chain(last_winners.iter())
                .cloned()
                .collect(),
        )
    }

    /// Record of the finished game, `None` while it is still running
    pub fn to_result(&self, guild_id: Option<GuildId>) -> Option<GameResult> {
        let champion = self.champion.as_ref()?;
        Some(GameResult {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id,
            guild_id,
            gender: self.filter,
            winner: champion.to_entry(),
            round_winners: entries(&self.round_winners),
            round_losers: entries(&self.round_losers),
            created_at: Utc::now(),
        })
    }
}

fn entries(idols: &[Arc<IdolChoice>]) -> Vec<IdolEntry> {
    idols.iter().map(|i| i.to_entry()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;
    use crate::testing::solid;
    use image::Rgba;

    fn idols(count: usize) -> Vec<Arc<IdolChoice>> {
        (0..count)
            .map(|i| {
                let name = format!("Group{}_Idol{}.png", i, i);
                let img = solid(2, 2, Rgba([i as u8, 0, 0, 255]));
                Arc::new(IdolChoice::from_file(&name, &i.to_string(), Gender::Girl, img).unwrap())
            })
            .collect()
    }

    fn session(count: usize) -> GameSession {
        GameSession::new(
            UserId::new(1),
            ChannelId::new(2),
            GenderFilter::Girl,
            idols(count),
        )
    }

    #[test]
    fn test_side_from_glyph() {
        assert_eq!(Side::from_glyph("⬅"), Some(Side::Left));
        assert_eq!(Side::from_glyph("⬅\u{fe0f}"), Some(Side::Left));
        assert_eq!(Side::from_glyph("➡️"), Some(Side::Right));
        assert_eq!(Side::from_glyph("👍"), None);
    }

    #[test]
    fn test_every_size_plays_n_minus_one_rounds() {
        for size in [2usize, 4, 8, 16, 32] {
            let mut game = session(size);
            let mut rounds = 0;
            loop {
                let side = if rounds % 3 == 0 { Side::Right } else { Side::Left };
                rounds += 1;
                match game.advance(side).unwrap() {
                    RoundOutcome::Continue => {
                        assert_eq!(game.idols_remaining(), size - rounds);
                    }
                    RoundOutcome::Champion(_) => break,
                }
            }

            assert_eq!(rounds, size - 1, "size {}", size);
            assert_eq!(game.round_winners().len(), size - 1);
            assert_eq!(game.round_losers().len(), size - 1);
            assert!(game.champion().is_some());
            assert!(game.current_pair().is_none());
        }
    }

    #[test]
    fn test_two_contestant_game() {
        let mut game = session(2);
        let (left, right) = game.current_pair().unwrap();
        assert_eq!(left.idol_name, "Idol0");
        assert_eq!(right.idol_name, "Idol1");

        let outcome = game.advance(Side::Left).unwrap();
        let RoundOutcome::Champion(champion) = outcome else {
            panic!("expected a champion");
        };
        assert_eq!(champion.id, left.id);
        assert_eq!(game.round_winners()[0].id, left.id);
        assert_eq!(game.round_losers()[0].id, right.id);
        assert!(game.bracket_contestants().is_none());
    }

    #[test]
    fn test_right_arrow_promotes_second_position() {
        let mut game = session(4);
        game.advance(Side::Right).unwrap();
        // winner goes to the back of the queue
        let (left, _) = game.current_pair().unwrap();
        assert_eq!(left.idol_name, "Idol2");
        assert_eq!(game.round_winners()[0].idol_name, "Idol1");
    }

    #[test]
    fn test_advance_after_champion_fails() {
        let mut game = session(2);
        game.advance(Side::Left).unwrap();
        assert!(game.advance(Side::Left).is_err());
    }

    #[test]
    fn test_bracket_contestants_for_sixteen() {
        let mut game = session(16);
        while let RoundOutcome::Continue = game.advance(Side::Left).unwrap() {}

        let bracket = game.bracket_contestants().unwrap();
        assert_eq!(bracket.len(), 15);
        // quarterfinalists are the round-of-16 winners, the left idol of each pair
        let quarter: Vec<&str> = bracket[..8].iter().map(|i| i.idol_name.as_str()).collect();
        assert_eq!(
            quarter,
            ["Idol0", "Idol2", "Idol4", "Idol6", "Idol8", "Idol10", "Idol12", "Idol14"]
        );
        assert_eq!(bracket[14].id, game.champion().unwrap().id);
    }

    #[test]
    fn test_to_result() {
        let mut game = session(4);
        assert!(game.to_result(None).is_none());
        while let RoundOutcome::Continue = game.advance(Side::Left).unwrap() {}

        let result = game.to_result(Some(GuildId::new(5))).unwrap();
        assert_eq!(result.winner.name, "Idol0");
        assert_eq!(result.round_winners.len(), 3);
        assert_eq!(result.guild_id, Some(GuildId::new(5)));
        assert_eq!(result.gender, GenderFilter::Girl);
    }
}
