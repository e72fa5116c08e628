//! Per-group round state machine.
//!
//! A round moves `NoSession -> Pending -> AwaitingGuess -> (solved | skipped)
//! -> NoSession`. Each transition is written through to the [`KvStore`]:
//! the record is reserved with create-if-absent, and every later update is
//! a compare-and-swap against the exact value that was read, so two handlers
//! racing on the same group can never both win.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::aggregator::{AggregatorConfig, AttributeAggregator};
use crate::api::{MetadataClient, SubjectHit};
use crate::cache::RequestCache;
use crate::clock::Clock;
use crate::config::GameSettings;
use crate::constants::{CAS_RETRY_LIMIT, MAX_HINT_LEVEL, ROUND_ID_LEN, SESSION_TABLE};
use crate::error::GameError;
use crate::feedback::{Feedback, FeedbackConfig, compare};
use crate::fingerprint::{CharacterFingerprint, CharacterTagIndex};
use crate::hints::{Hint, clue_for};
use crate::http::HttpTransport;
use crate::matcher::is_correct_guess;
use crate::rng::{RngBundle, base36_id};
use crate::sampler::CandidateSampler;
use crate::scores::ScoreBook;
use crate::store::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Reserved; the target is still being drawn.
    Pending,
    AwaitingGuess,
}

/// Persisted state of one group's round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub group: String,
    pub round_id: String,
    pub phase: RoundPhase,
    pub hint_level: u8,
    pub character_id: Option<u64>,
    pub is_solved: bool,
    pub started_at: DateTime<Utc>,
    pub fingerprint: Option<CharacterFingerprint>,
}

impl SessionRecord {
    fn pending(group: &str, round_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            group: group.to_string(),
            round_id,
            phase: RoundPhase::Pending,
            hint_level: 0,
            character_id: None,
            is_solved: false,
            started_at,
            fingerprint: None,
        }
    }

    fn encode(&self) -> Result<Value, GameError> {
        serde_json::to_value(self).map_err(|source| GameError::Record {
            key: self.group.clone(),
            source,
        })
    }
}

/// A round that was won.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundWin {
    pub round_id: String,
    pub solver: String,
    /// Solver's all-time score after this win.
    pub score: i64,
    pub hints_used: u8,
    pub fingerprint: CharacterFingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuessOutcome {
    Correct(Box<RoundWin>),
    Incorrect,
}

impl GuessOutcome {
    #[must_use]
    pub const fn is_correct(&self) -> bool {
        matches!(self, Self::Correct(_))
    }
}

/// Result of naming a specific character in comparison mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterGuess {
    pub guessed: CharacterFingerprint,
    pub feedback: Feedback,
    pub outcome: GuessOutcome,
}

/// A live round as read from the store, with the value used for CAS.
struct ActiveRound {
    raw: Value,
    record: SessionRecord,
    target: CharacterFingerprint,
}

/// Coordinates sampling, aggregation, matching and persisted rounds.
pub struct GameEngine<T> {
    client: MetadataClient<T>,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    rngs: RngBundle,
    settings: GameSettings,
    tag_index: CharacterTagIndex,
    scores: ScoreBook,
}

impl<T: HttpTransport> GameEngine<T> {
    /// Build an engine whose metadata lookups go through a cache in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Config`] if `settings` fail validation.
    pub fn new(
        transport: T,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        settings: GameSettings,
        rngs: RngBundle,
    ) -> Result<Self, GameError> {
        settings.validate()?;
        let cache = RequestCache::new(transport, Arc::clone(&store), Arc::clone(&clock))
            .with_ttl(Duration::seconds(settings.cache_ttl_secs));
        let client = MetadataClient::with_base_url(cache, settings.api_base_url.clone());
        Ok(Self {
            client,
            scores: ScoreBook::new(Arc::clone(&store)),
            store,
            clock,
            rngs,
            settings,
            tag_index: CharacterTagIndex::default(),
        })
    }

    /// Attach curated per-character tags used in structured aggregation.
    #[must_use]
    pub fn with_tag_index(mut self, tag_index: CharacterTagIndex) -> Self {
        self.tag_index = tag_index;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &GameSettings {
        &self.settings
    }

    #[must_use]
    pub const fn client(&self) -> &MetadataClient<T> {
        &self.client
    }

    #[must_use]
    pub const fn scores(&self) -> &ScoreBook {
        &self.scores
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    #[must_use]
    pub const fn rngs(&self) -> &RngBundle {
        &self.rngs
    }

    fn aggregator(&self) -> AttributeAggregator<'_, T> {
        AttributeAggregator::new(
            &self.client,
            self.clock.as_ref(),
            &self.tag_index,
            AggregatorConfig::from(&self.settings),
        )
    }

    fn sampler(&self) -> CandidateSampler<'_, T> {
        CandidateSampler::new(&self.client, self.clock.as_ref(), &self.settings)
    }

    /// Build the fingerprint of any character, outside of a round.
    ///
    /// # Errors
    ///
    /// Propagates aggregation failures.
    pub async fn fingerprint(&self, character_id: u64) -> Result<CharacterFingerprint, GameError> {
        self.aggregator().aggregate(character_id).await
    }

    /// Subjects matching a keyword.
    ///
    /// # Errors
    ///
    /// Propagates fetch failures.
    pub async fn search(&self, keyword: &str) -> Result<Vec<SubjectHit>, GameError> {
        self.sampler().search(keyword).await
    }

    /// Read a group's record, deleting it if it outlived the session TTL.
    async fn load(&self, group: &str) -> Result<Option<(Value, SessionRecord)>, GameError> {
        let Some(raw) = self.store.get(SESSION_TABLE, group).await? else {
            return Ok(None);
        };
        let record: SessionRecord =
            serde_json::from_value(raw.clone()).map_err(|source| GameError::Record {
                key: group.to_string(),
                source,
            })?;
        let age = self.clock.now() - record.started_at;
        if age > Duration::seconds(self.settings.session_ttl_secs) {
            log::info!(
                "group {group}: round {} expired after {}s",
                record.round_id,
                age.num_seconds()
            );
            self.store.delete(SESSION_TABLE, group).await?;
            return Ok(None);
        }
        Ok(Some((raw, record)))
    }

    /// The group's round, if one exists and has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the record is corrupt.
    pub async fn current_session(&self, group: &str) -> Result<Option<SessionRecord>, GameError> {
        Ok(self.load(group).await?.map(|(_, record)| record))
    }

    async fn active(&self, group: &str) -> Result<ActiveRound, GameError> {
        let no_session = || GameError::NoSession {
            group: group.to_string(),
        };
        let (raw, record) = self.load(group).await?.ok_or_else(no_session)?;
        if record.is_solved {
            return Err(GameError::AlreadySolved {
                group: group.to_string(),
            });
        }
        let target = match (&record.phase, &record.fingerprint) {
            (RoundPhase::AwaitingGuess, Some(fingerprint)) => fingerprint.clone(),
            _ => return Err(no_session()),
        };
        Ok(ActiveRound {
            raw,
            record,
            target,
        })
    }

    async fn reserve(&self, group: &str) -> Result<SessionRecord, GameError> {
        // drops an expired record so the slot can be reused
        self.load(group).await?;
        let round_id = base36_id(&mut *self.rngs.ids(), ROUND_ID_LEN);
        let record = SessionRecord::pending(group, round_id, self.clock.now());
        let created = self
            .store
            .set_if_absent(SESSION_TABLE, group, record.encode()?)
            .await?;
        if !created {
            return Err(GameError::SessionConflict {
                group: group.to_string(),
            });
        }
        log::debug!("group {group}: reserved round {}", record.round_id);
        Ok(record)
    }

    /// Draw candidates until one yields a fingerprint with appearances.
    ///
    /// # Errors
    ///
    /// Returns the last [`GameError::DataUnavailable`] once `max_attempts`
    /// draws came up empty, and propagates fetch failures immediately.
    pub async fn draw_character(&self) -> Result<CharacterFingerprint, GameError> {
        let mut last = None;
        for attempt in 1..=self.settings.max_attempts {
            let outcome = match self.sampler().sample(&self.rngs).await {
                Ok(candidate) => self.aggregator().aggregate(candidate.character.id).await,
                Err(err) => Err(err),
            };
            match outcome.and_then(require_appearances) {
                Ok(fingerprint) => return Ok(fingerprint),
                Err(err) if err.is_data_unavailable() => {
                    log::debug!("draw attempt {attempt} unusable: {err}");
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last.unwrap_or_else(|| {
            GameError::DataUnavailable("no draw attempts were allowed".into())
        }))
    }

    /// Promote a reservation to a live round, or release it on failure.
    async fn attach(
        &self,
        reserved: SessionRecord,
        drawn: Result<CharacterFingerprint, GameError>,
    ) -> Result<SessionRecord, GameError> {
        let group = reserved.group.clone();
        let fingerprint = match drawn {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                if let Err(release) = self.store.delete(SESSION_TABLE, &group).await {
                    log::warn!("group {group}: failed to release reservation: {release}");
                }
                return Err(err);
            }
        };
        let live = SessionRecord {
            phase: RoundPhase::AwaitingGuess,
            character_id: Some(fingerprint.id),
            fingerprint: Some(fingerprint),
            ..reserved.clone()
        };
        let swapped = self
            .store
            .compare_and_swap(SESSION_TABLE, &group, &reserved.encode()?, live.encode()?)
            .await?;
        if !swapped {
            // skipped or expired while drawing
            return Err(GameError::NoSession { group });
        }
        if let Some(id) = live.character_id {
            self.scores.record_appearance(id).await?;
        }
        log::info!("group {group}: round {} started", live.round_id);
        Ok(live)
    }

    /// Start a round with a randomly drawn character.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::SessionConflict`] if the group already has a
    /// round, [`GameError::DataUnavailable`] if `max_attempts` draws all came
    /// up empty, and propagates fetch and store failures.
    pub async fn start_round(&self, group: &str) -> Result<SessionRecord, GameError> {
        let reserved = self.reserve(group).await?;
        let drawn = self.draw_character().await;
        self.attach(reserved, drawn).await
    }

    /// Start a round with a designated character.
    ///
    /// # Errors
    ///
    /// As [`Self::start_round`], without resampling.
    pub async fn start_round_with(
        &self,
        group: &str,
        character_id: u64,
    ) -> Result<SessionRecord, GameError> {
        let reserved = self.reserve(group).await?;
        let drawn = self
            .aggregator()
            .aggregate(character_id)
            .await
            .and_then(require_appearances);
        self.attach(reserved, drawn).await
    }

    /// Raise the hint level by one and reveal that level's clue.
    ///
    /// At the top level the ratchet stays put and the overflow clue is
    /// returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NoSession`] or [`GameError::AlreadySolved`] when
    /// there is no live round.
    pub async fn request_hint(&self, group: &str) -> Result<Hint, GameError> {
        for _ in 0..CAS_RETRY_LIMIT {
            let round = self.active(group).await?;
            let current = round.record.hint_level;
            if current >= MAX_HINT_LEVEL {
                let clue = clue_for(MAX_HINT_LEVEL, true, &round.target, &mut *self.rngs.hints());
                return Ok(Hint {
                    level: MAX_HINT_LEVEL,
                    overflow: true,
                    clue,
                });
            }
            let level = current + 1;
            let raised = SessionRecord {
                hint_level: level,
                ..round.record
            };
            if self
                .store
                .compare_and_swap(SESSION_TABLE, group, &round.raw, raised.encode()?)
                .await?
            {
                let clue = clue_for(level, false, &round.target, &mut *self.rngs.hints());
                return Ok(Hint {
                    level,
                    overflow: false,
                    clue,
                });
            }
        }
        Err(GameError::Contention {
            group: group.to_string(),
        })
    }

    /// Match free text against the target.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::AlreadySolved`] if another guess won first and
    /// [`GameError::NoSession`] if no round is live.
    pub async fn submit_guess(
        &self,
        group: &str,
        user: &str,
        text: &str,
    ) -> Result<GuessOutcome, GameError> {
        let round = self.active(group).await?;
        self.scores.record_attempt(group, user).await?;
        if !is_correct_guess(text, &round.target) {
            return Ok(GuessOutcome::Incorrect);
        }
        self.settle_win(group, user, round).await
    }

    /// Name a specific character and get field-by-field feedback.
    ///
    /// # Errors
    ///
    /// As [`Self::submit_guess`], plus aggregation failures for the guessed id.
    pub async fn submit_character_guess(
        &self,
        group: &str,
        user: &str,
        character_id: u64,
    ) -> Result<CharacterGuess, GameError> {
        let round = self.active(group).await?;
        self.scores.record_attempt(group, user).await?;
        let guessed = self.aggregator().aggregate(character_id).await?;
        let feedback = compare(&guessed, &round.target, &FeedbackConfig::from(&self.settings));
        let outcome = if guessed.id == round.target.id {
            self.settle_win(group, user, round).await?
        } else {
            GuessOutcome::Incorrect
        };
        Ok(CharacterGuess {
            guessed,
            feedback,
            outcome,
        })
    }

    /// Flip `is_solved`, credit the solver, then close the round.
    async fn settle_win(
        &self,
        group: &str,
        user: &str,
        mut round: ActiveRound,
    ) -> Result<GuessOutcome, GameError> {
        let round_id = round.record.round_id.clone();
        for _ in 0..CAS_RETRY_LIMIT {
            let solved = SessionRecord {
                is_solved: true,
                ..round.record.clone()
            };
            if self
                .store
                .compare_and_swap(SESSION_TABLE, group, &round.raw, solved.encode()?)
                .await?
            {
                let score = self
                    .scores
                    .record_win(group, user, round.target.id)
                    .await?;
                self.store.delete(SESSION_TABLE, group).await?;
                return Ok(GuessOutcome::Correct(Box::new(RoundWin {
                    round_id,
                    solver: user.to_string(),
                    score,
                    hints_used: solved.hint_level,
                    fingerprint: round.target,
                })));
            }
            // this guess already saw the round live, so a vanished record
            // means the winner closed it
            let Some((raw, record)) = self.load(group).await? else {
                log::debug!("group {group}: {user} lost the race for round {round_id}");
                return Err(GameError::AlreadySolved {
                    group: group.to_string(),
                });
            };
            if record.is_solved || record.round_id != round_id {
                log::debug!("group {group}: {user} lost the race for round {round_id}");
                return Err(GameError::AlreadySolved {
                    group: group.to_string(),
                });
            }
            // a hint landed in between; retry against the fresh value
            round.raw = raw;
            round.record = record;
        }
        Err(GameError::Contention {
            group: group.to_string(),
        })
    }

    /// End the round without a winner. Returns the removed record, whose
    /// fingerprint reveals the answer once the round was live.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NoSession`] if there is nothing to skip.
    pub async fn skip_round(&self, group: &str) -> Result<SessionRecord, GameError> {
        let (_, record) = self
            .load(group)
            .await?
            .ok_or_else(|| GameError::NoSession {
                group: group.to_string(),
            })?;
        self.store.delete(SESSION_TABLE, group).await?;
        log::info!("group {group}: round {} skipped", record.round_id);
        Ok(record)
    }
}

fn require_appearances(
    fingerprint: CharacterFingerprint,
) -> Result<CharacterFingerprint, GameError> {
    if fingerprint.appearances.is_empty() {
        return Err(GameError::DataUnavailable(format!(
            "character {} has no usable appearances",
            fingerprint.id
        )));
    }
    Ok(fingerprint)
}
