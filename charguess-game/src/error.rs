//! Error taxonomy shared by every engine component.
use thiserror::Error;

use crate::config::ConfigError;
use crate::conversation::GenerationError;
use crate::http::TransportError;
use crate::store::StoreError;

/// Errors surfaced by the game engine.
#[derive(Debug, Error)]
pub enum GameError {
    /// No usable candidate or appearance survived filtering. Callers may retry.
    #[error("no usable data: {0}")]
    DataUnavailable(String),
    /// The transport failed before a response was produced.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The metadata API answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Fetch { url: String, status: u16 },
    /// A response body did not match the expected shape.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    /// A round is already running for this group.
    #[error("a round is already active in group {group}")]
    SessionConflict { group: String },
    /// The round was won by an earlier guess.
    #[error("the round in group {group} has already been solved")]
    AlreadySolved { group: String },
    /// No round is running for this group.
    #[error("no active round in group {group}")]
    NoSession { group: String },
    /// Concurrent writers kept replacing the round record.
    #[error("round state in group {group} kept changing; try again")]
    Contention { group: String },
    /// A fingerprint could not be assembled because a required field was absent.
    #[error("character record is missing required field `{0}`")]
    MissingField(&'static str),
    /// The persistent store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Settings failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The text generator behind role-play replies failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// A persisted record could not be (de)serialized.
    #[error("corrupt record {key}: {source}")]
    Record {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl GameError {
    /// Whether the failure is a transient fetch problem (transport or status).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Fetch { .. })
    }

    /// Whether the caller should offer a fresh attempt with a different candidate.
    #[must_use]
    pub const fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable(_))
    }
}
