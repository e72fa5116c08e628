//! Role-play chat with the round's character.
//!
//! Histories are stored per group next to the round and expire lazily an
//! hour after their last update. Text generation itself sits behind
//! [`TextGenerator`]; this module only decides what to send and when.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::clock::Clock;
use crate::constants::{
    CONVERSATION_MAX_TURNS, CONVERSATION_TABLE, CONVERSATION_TTL_SECS, PERSONA_SUMMARY_CHARS,
    RESPONSE_COOLDOWN_MILLIS,
};
use crate::error::GameError;
use crate::fingerprint::CharacterFingerprint;
use crate::store::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    #[must_use]
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A group's chat history with the current character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    pub group: String,
    pub character_id: u64,
    /// Persona instructions; always sent first and never trimmed.
    pub persona: String,
    pub turns: Vec<ChatTurn>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationLog {
    /// Persona prompt followed by the retained turns.
    #[must_use]
    pub fn history(&self) -> Vec<ChatTurn> {
        std::iter::once(ChatTurn::new(ChatRole::System, self.persona.clone()))
            .chain(self.turns.iter().cloned())
            .collect()
    }

    fn push(&mut self, turn: ChatTurn, at: DateTime<Utc>) {
        self.turns.push(turn);
        let excess = self.turns.len().saturating_sub(CONVERSATION_MAX_TURNS);
        self.turns.drain(..excess);
        self.updated_at = at;
    }
}

#[derive(Debug, Error)]
#[error("text generation failed: {0}")]
pub struct GenerationError(pub String);

/// Produces the character's next line from a chat history.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backend cannot produce text.
    async fn generate(&self, history: &[ChatTurn]) -> Result<String, GenerationError>;
}

#[async_trait::async_trait]
impl<G: TextGenerator + ?Sized> TextGenerator for Arc<G> {
    async fn generate(&self, history: &[ChatTurn]) -> Result<String, GenerationError> {
        (**self).generate(history).await
    }
}

/// Instructions that make the generator speak as `fingerprint` without
/// giving away its name.
#[must_use]
pub fn persona_prompt(fingerprint: &CharacterFingerprint) -> String {
    let names: Vec<&str> = fingerprint.names().collect();
    let mut prompt = format!(
        "You are role-playing a fictional character known as {}.\n",
        names.join(" / ")
    );
    prompt.push_str(
        "Players are trying to guess who you are. Stay in character, answer questions \
         about yourself, and never say any of your names.\n",
    );
    if !fingerprint.appearances.is_empty() {
        prompt.push_str(&format!(
            "You appear in: {}.\n",
            fingerprint.appearances.join(", ")
        ));
    }
    if let (Some(first), Some(last)) = (fingerprint.earliest_year(), fingerprint.latest_year()) {
        prompt.push_str(&format!("Your appearances span {first} to {last}.\n"));
    }
    let tags: Vec<&str> = fingerprint.raw_tag_names().collect();
    if !tags.is_empty() {
        prompt.push_str(&format!("Associated tags: {}.\n", tags.join(", ")));
    }
    if !fingerprint.anime_vas.is_empty() {
        prompt.push_str(&format!(
            "Voiced by: {}.\n",
            fingerprint.anime_vas.join(", ")
        ));
    }
    let profile: String = fingerprint
        .summary
        .chars()
        .take(PERSONA_SUMMARY_CHARS)
        .collect();
    if !profile.trim().is_empty() {
        prompt.push_str(&format!("Profile: {}\n", profile.trim()));
    }
    prompt
}

/// Per-user rate limit for generated replies. Process-local.
#[derive(Debug)]
pub struct Cooldown {
    window: Duration,
    until: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::new(Duration::milliseconds(RESPONSE_COOLDOWN_MILLIS))
    }
}

impl Cooldown {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            until: Mutex::new(HashMap::new()),
        }
    }

    /// Start the user's cooldown, or return how long is left on it.
    ///
    /// # Errors
    ///
    /// Returns the remaining wait if the user is still cooling down.
    pub fn try_acquire(&self, user: &str, now: DateTime<Utc>) -> Result<(), Duration> {
        let mut until = self
            .until
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        until.retain(|_, end| *end > now);
        if let Some(end) = until.get(user) {
            return Err(*end - now);
        }
        until.insert(user.to_string(), now + self.window);
        Ok(())
    }
}

/// What came of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Spoken(String),
    CoolingDown(Duration),
}

/// Stored conversations plus the reply cooldown.
pub struct Conversations {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    cooldown: Cooldown,
}

impl Conversations {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cooldown: Cooldown::default(),
        }
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Cooldown) -> Self {
        self.cooldown = cooldown;
        self
    }

    async fn save(&self, log: &ConversationLog) -> Result<(), GameError> {
        let value = serde_json::to_value(log).map_err(|source| GameError::Record {
            key: log.group.clone(),
            source,
        })?;
        self.store.set(CONVERSATION_TABLE, &log.group, value).await?;
        Ok(())
    }

    /// Begin a fresh history for the group's character, replacing any old one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn open(
        &self,
        group: &str,
        fingerprint: &CharacterFingerprint,
    ) -> Result<ConversationLog, GameError> {
        let log = ConversationLog {
            group: group.to_string(),
            character_id: fingerprint.id,
            persona: persona_prompt(fingerprint),
            turns: Vec::new(),
            updated_at: self.clock.now(),
        };
        self.save(&log).await?;
        Ok(log)
    }

    /// The group's history, unless it went quiet for longer than an hour.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the record is corrupt.
    pub async fn load(&self, group: &str) -> Result<Option<ConversationLog>, GameError> {
        let Some(raw) = self.store.get(CONVERSATION_TABLE, group).await? else {
            return Ok(None);
        };
        let log: ConversationLog =
            serde_json::from_value(raw).map_err(|source| GameError::Record {
                key: group.to_string(),
                source,
            })?;
        if self.clock.now() - log.updated_at > Duration::seconds(CONVERSATION_TTL_SECS) {
            self.store.delete(CONVERSATION_TABLE, group).await?;
            return Ok(None);
        }
        Ok(Some(log))
    }

    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn close(&self, group: &str) -> Result<bool, GameError> {
        Ok(self.store.delete(CONVERSATION_TABLE, group).await?)
    }

    /// Answer `text` in character.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NoSession`] when the group has no live history,
    /// and [`GameError::Generation`] when the generator fails. The user's
    /// line is kept in the history either way.
    pub async fn respond<G: TextGenerator + ?Sized>(
        &self,
        group: &str,
        user: &str,
        text: &str,
        generator: &G,
    ) -> Result<Reply, GameError> {
        let now = self.clock.now();
        if let Err(remaining) = self.cooldown.try_acquire(user, now) {
            return Ok(Reply::CoolingDown(remaining));
        }
        let mut log = self
            .load(group)
            .await?
            .ok_or_else(|| GameError::NoSession {
                group: group.to_string(),
            })?;
        log.push(ChatTurn::new(ChatRole::User, text), now);
        let generated = generator.generate(&log.history()).await;
        if let Ok(reply) = &generated {
            log.push(ChatTurn::new(ChatRole::Model, reply.clone()), self.clock.now());
        }
        self.save(&log).await?;
        Ok(Reply::Spoken(generated?))
    }
}
