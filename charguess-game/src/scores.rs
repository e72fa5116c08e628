//! Score bookkeeping and the queries behind leaderboards and weekly reports.
//!
//! Counters live in the shared store's score table and are only ever
//! changed through [`KvStore::increment`], so concurrent rounds in the same
//! group never lose an update.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::SCORE_TABLE;
use crate::error::GameError;
use crate::numbers::ratio;
use crate::store::KvStore;

const SCORE_SUFFIX: &str = "_score";
const WEEKLY_SUFFIX: &str = "_weekly_score";
const WEEKLY_MARKER: &str = "_weekly";
const ATTEMPTS_SUFFIX: &str = "_games";
const USAGE_SUFFIX: &str = "_usage";

fn user_prefix(group: &str) -> String {
    format!("guild_{group}_user_")
}

fn user_key(group: &str, user: &str, suffix: &str) -> String {
    format!("{}{user}{suffix}", user_prefix(group))
}

fn channel_prefix(group: &str) -> String {
    format!("guild_{group}_channel_")
}

fn character_key(character_id: u64, counter: &str) -> String {
    format!("character_{character_id}_{counter}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub user: String,
    pub score: i64,
    pub weekly_score: i64,
    /// Guesses submitted, correct or not.
    pub attempts: i64,
}

impl UserStats {
    /// Share of attempts that solved a round.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(
            usize::try_from(self.score).unwrap_or(0),
            usize::try_from(self.attempts).unwrap_or(0),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStats {
    pub character_id: u64,
    /// Rounds in which the character was the target.
    pub appearances: i64,
    pub solved: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUsage {
    pub channel: String,
    pub usage: i64,
}

/// Data for one group's weekly summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub group: String,
    pub top_users: Vec<LeaderboardEntry>,
    pub busiest_channel: Option<ChannelUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Board {
    AllTime,
    Weekly,
}

/// Reads and writes score counters.
#[derive(Clone)]
pub struct ScoreBook {
    store: Arc<dyn KvStore>,
}

impl ScoreBook {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    async fn bump(&self, key: &str) -> Result<i64, GameError> {
        Ok(self.store.increment(SCORE_TABLE, key, 1).await?)
    }

    async fn read(&self, key: &str) -> Result<i64, GameError> {
        Ok(self
            .store
            .get(SCORE_TABLE, key)
            .await?
            .as_ref()
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Count a round that drew `character_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_appearance(&self, character_id: u64) -> Result<i64, GameError> {
        self.bump(&character_key(character_id, "appearances")).await
    }

    /// Count one submitted guess.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_attempt(&self, group: &str, user: &str) -> Result<i64, GameError> {
        self.bump(&user_key(group, user, ATTEMPTS_SUFFIX)).await
    }

    /// Credit `user` with solving a round. Returns the new all-time score.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_win(
        &self,
        group: &str,
        user: &str,
        character_id: u64,
    ) -> Result<i64, GameError> {
        self.bump(&character_key(character_id, "solved")).await?;
        // total first, so a weekly counter never exists without one
        let score = self.bump(&user_key(group, user, SCORE_SUFFIX)).await?;
        self.bump(&user_key(group, user, WEEKLY_SUFFIX)).await?;
        log::info!("group {group}: {user} solved character {character_id} (score {score})");
        Ok(score)
    }

    /// Count activity in a channel, used to pick where reports go.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_channel_activity(
        &self,
        group: &str,
        channel: &str,
    ) -> Result<i64, GameError> {
        self.bump(&format!("{}{channel}{USAGE_SUFFIX}", channel_prefix(group)))
            .await
    }

    /// Users of a group ranked on one board, highest first.
    ///
    /// Keys follow `guild_{g}_user_{u}_score` and `guild_{g}_user_{u}_weekly_score`.
    /// A key of the second shape is a weekly counter only when user `u` also
    /// holds a total, since every weekly point is paired with a total point;
    /// otherwise it is the total of a user whose name ends in `_weekly`.
    async fn ranked_users(
        &self,
        group: &str,
        board: Board,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, GameError> {
        let prefix = user_prefix(group);
        let scored: HashMap<String, i64> = self
            .store
            .entries(SCORE_TABLE)
            .await?
            .into_iter()
            .filter_map(|(key, value)| {
                let user = key.strip_prefix(&prefix)?.strip_suffix(SCORE_SUFFIX)?;
                Some((user.to_string(), value.as_i64()?))
            })
            .collect();

        let mut entries: Vec<LeaderboardEntry> = scored
            .iter()
            .filter_map(|(stem, &score)| {
                let weekly_owner = stem
                    .strip_suffix(WEEKLY_MARKER)
                    .filter(|owner| scored.contains_key(*owner));
                let user = match (board, weekly_owner) {
                    (Board::Weekly, Some(owner)) => owner,
                    (Board::AllTime, None) => stem.as_str(),
                    _ => return None,
                };
                Some(LeaderboardEntry {
                    user: user.to_string(),
                    score,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.user.cmp(&b.user)));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Top `limit` all-time scores in a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn leaderboard(
        &self,
        group: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, GameError> {
        self.ranked_users(group, Board::AllTime, limit).await
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn user_stats(&self, group: &str, user: &str) -> Result<UserStats, GameError> {
        Ok(UserStats {
            user: user.to_string(),
            score: self.read(&user_key(group, user, SCORE_SUFFIX)).await?,
            weekly_score: self.read(&user_key(group, user, WEEKLY_SUFFIX)).await?,
            attempts: self.read(&user_key(group, user, ATTEMPTS_SUFFIX)).await?,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn character_stats(&self, character_id: u64) -> Result<CharacterStats, GameError> {
        Ok(CharacterStats {
            character_id,
            appearances: self
                .read(&character_key(character_id, "appearances"))
                .await?,
            solved: self.read(&character_key(character_id, "solved")).await?,
        })
    }

    /// Weekly leaders and the most active channel of a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn weekly_report(&self, group: &str, limit: usize) -> Result<WeeklyReport, GameError> {
        let top_users = self.ranked_users(group, Board::Weekly, limit).await?;
        let prefix = channel_prefix(group);
        let busiest_channel = self
            .store
            .entries(SCORE_TABLE)
            .await?
            .into_iter()
            .filter_map(|(key, value)| {
                let channel = key.strip_prefix(&prefix)?.strip_suffix(USAGE_SUFFIX)?;
                Some(ChannelUsage {
                    channel: channel.to_string(),
                    usage: value.as_i64()?,
                })
            })
            .max_by(|a, b| a.usage.cmp(&b.usage).then_with(|| b.channel.cmp(&a.channel)));
        Ok(WeeklyReport {
            group: group.to_string(),
            top_users,
            busiest_channel,
        })
    }

    /// Clear every weekly score of a group. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reset_weekly(&self, group: &str) -> Result<usize, GameError> {
        let weekly = self.ranked_users(group, Board::Weekly, usize::MAX).await?;
        for entry in &weekly {
            self.store
                .delete(SCORE_TABLE, &user_key(group, &entry.user, WEEKLY_SUFFIX))
                .await?;
        }
        Ok(weekly.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn wins_feed_leaderboard_and_weekly_report() {
        let book = ScoreBook::new(Arc::new(MemoryStore::new()));
        book.record_win("g1", "alice", 7).await.unwrap();
        book.record_win("g1", "alice", 8).await.unwrap();
        book.record_win("g1", "bob", 7).await.unwrap();
        book.record_win("g2", "carol", 7).await.unwrap();
        book.record_channel_activity("g1", "general").await.unwrap();
        book.record_channel_activity("g1", "games").await.unwrap();
        book.record_channel_activity("g1", "games").await.unwrap();

        let board = book.leaderboard("g1", 10).await.unwrap();
        assert_eq!(
            board,
            vec![
                LeaderboardEntry { user: "alice".into(), score: 2 },
                LeaderboardEntry { user: "bob".into(), score: 1 },
            ]
        );

        let report = book.weekly_report("g1", 1).await.unwrap();
        assert_eq!(report.top_users.len(), 1);
        assert_eq!(report.top_users[0].user, "alice");
        assert_eq!(
            report.busiest_channel,
            Some(ChannelUsage { channel: "games".into(), usage: 2 })
        );

        let stats = book.character_stats(7).await.unwrap();
        assert_eq!(stats.solved, 3);
    }

    #[tokio::test]
    async fn weekly_reset_keeps_all_time_scores() {
        let book = ScoreBook::new(Arc::new(MemoryStore::new()));
        book.record_attempt("g1", "alice").await.unwrap();
        book.record_attempt("g1", "alice").await.unwrap();
        book.record_win("g1", "alice", 1).await.unwrap();
        assert_eq!(book.reset_weekly("g1").await.unwrap(), 1);

        let stats = book.user_stats("g1", "alice").await.unwrap();
        assert_eq!(stats.score, 1);
        assert_eq!(stats.weekly_score, 0);
        assert_eq!(stats.attempts, 2);
        assert!((stats.accuracy() - 0.5).abs() < f64::EPSILON);
        assert!(book.weekly_report("g1", 10).await.unwrap().top_users.is_empty());
    }

    #[tokio::test]
    async fn user_named_weekly_keeps_a_total() {
        let book = ScoreBook::new(Arc::new(MemoryStore::new()));
        book.record_win("g1", "x_weekly", 3).await.unwrap();
        book.record_win("g1", "dana", 3).await.unwrap();
        book.record_win("g1", "dana", 4).await.unwrap();

        let board = book.leaderboard("g1", 10).await.unwrap();
        assert_eq!(
            board,
            vec![
                LeaderboardEntry { user: "dana".into(), score: 2 },
                LeaderboardEntry { user: "x_weekly".into(), score: 1 },
            ]
        );
        let weekly = book.weekly_report("g1", 10).await.unwrap().top_users;
        assert_eq!(weekly, board);

        assert_eq!(book.reset_weekly("g1").await.unwrap(), 2);
        assert_eq!(book.leaderboard("g1", 10).await.unwrap(), board);
        assert_eq!(book.user_stats("g1", "x_weekly").await.unwrap().score, 1);
    }
}
