//! Charguess Game Engine
//!
//! Platform-agnostic core for a guess-the-character game: candidates are drawn
//! from a ranked media catalog, their attributes are merged into a fingerprint,
//! and player guesses are matched or compared against it. Transport, storage,
//! time and text generation are injected so any chat front end can drive it.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod conversation;
pub mod error;
pub mod feedback;
pub mod fingerprint;
pub mod hints;
pub mod http;
pub mod matcher;
pub mod numbers;
pub mod rng;
pub mod sampler;
pub mod scores;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use aggregator::{AggregatorConfig, AttributeAggregator};
pub use api::{MetadataClient, RankedFilter, SubjectHit, SubjectKind, SubjectRef};
pub use cache::{CacheStats, RequestCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AggregationMode, ConfigError, GameSettings, UniverseMode};
pub use conversation::{
    ChatRole, ChatTurn, ConversationLog, Conversations, Cooldown, GenerationError, Reply,
    TextGenerator, persona_prompt,
};
pub use error::GameError;
pub use feedback::{Feedback, FeedbackConfig, Verdict, compare};
pub use fingerprint::{CharacterFingerprint, CharacterTagIndex, FingerprintBuilder, Gender};
pub use hints::{Clue, Hint};
pub use http::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
pub use matcher::{is_correct_guess, normalize};
pub use rng::RngBundle;
pub use sampler::{Candidate, CandidateSampler};
pub use scores::{LeaderboardEntry, ScoreBook, UserStats, WeeklyReport};
pub use session::{CharacterGuess, GameEngine, GuessOutcome, RoundPhase, RoundWin, SessionRecord};
pub use store::{KvStore, MemoryStore, StoreError};
