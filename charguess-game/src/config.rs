//! Round settings: candidate universe, filters and tag budgets.
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::SubjectRef;
use crate::constants::{DEFAULT_API_BASE_URL, DEFAULT_CACHE_TTL_SECS, DEFAULT_SESSION_TTL_SECS};

/// How far back the per-year universe reaches when no start year is set.
const DEFAULT_YEARS_BACK: i32 = 20;

/// Errors raised when settings invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: i64,
        value: i64,
    },
    #[error("year window invalid (start {start} > end {end})")]
    YearRange { start: i32, end: i32 },
    #[error("api_base_url must be an http(s) url (got {0:?})")]
    BaseUrl(String),
    #[error("settings are not valid JSON: {0}")]
    Parse(String),
}

/// Where candidate subjects are drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UniverseMode {
    /// A curated index, plus the overflow list.
    Index { index_id: u64 },
    /// Top-N subjects of a uniformly drawn year, plus the overflow list.
    #[default]
    PerYear,
    /// Top-N subjects over the whole window, plus the overflow list.
    TopRanked,
}

/// How subject tags are folded into a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Weighted merge of raw user tags.
    Raw,
    /// Source / general / region / curated pools.
    #[default]
    Structured,
}

/// Tunables for one deployment of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(default = "GameSettings::default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub universe: UniverseMode,
    /// First year of the window; defaults to twenty years before today.
    #[serde(default)]
    pub start_year: Option<i32>,
    /// Last year of the window; never later than the current year.
    #[serde(default)]
    pub end_year: Option<i32>,
    #[serde(default = "GameSettings::default_top_n_subjects")]
    pub top_n_subjects: u64,
    /// Hand-picked subjects included in every draw.
    #[serde(default)]
    pub added_subjects: Vec<SubjectRef>,
    /// Meta tags every subject must carry; blank entries are ignored.
    #[serde(default)]
    pub meta_tags: Vec<String>,
    #[serde(default = "GameSettings::default_true")]
    pub main_character_only: bool,
    #[serde(default = "GameSettings::default_character_num")]
    pub character_num: usize,
    #[serde(default = "GameSettings::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub include_game: bool,
    #[serde(default)]
    pub aggregation: AggregationMode,
    #[serde(default = "GameSettings::default_tag_num")]
    pub subject_tag_num: usize,
    #[serde(default = "GameSettings::default_tag_num")]
    pub character_tag_num: usize,
    #[serde(default = "GameSettings::default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    #[serde(default = "GameSettings::default_session_ttl_secs")]
    pub session_ttl_secs: i64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            api_base_url: Self::default_api_base_url(),
            universe: UniverseMode::default(),
            start_year: None,
            end_year: None,
            top_n_subjects: Self::default_top_n_subjects(),
            added_subjects: Vec::new(),
            meta_tags: Vec::new(),
            main_character_only: Self::default_true(),
            character_num: Self::default_character_num(),
            max_attempts: Self::default_max_attempts(),
            include_game: false,
            aggregation: AggregationMode::default(),
            subject_tag_num: Self::default_tag_num(),
            character_tag_num: Self::default_tag_num(),
            cache_ttl_secs: Self::default_cache_ttl_secs(),
            session_ttl_secs: Self::default_session_ttl_secs(),
        }
    }
}

impl GameSettings {
    fn default_api_base_url() -> String {
        DEFAULT_API_BASE_URL.to_string()
    }

    const fn default_top_n_subjects() -> u64 {
        50
    }

    const fn default_true() -> bool {
        true
    }

    const fn default_character_num() -> usize {
        6
    }

    const fn default_max_attempts() -> u32 {
        10
    }

    const fn default_tag_num() -> usize {
        6
    }

    const fn default_cache_ttl_secs() -> i64 {
        DEFAULT_CACHE_TTL_SECS
    }

    const fn default_session_ttl_secs() -> i64 {
        DEFAULT_SESSION_TTL_SECS
    }

    /// Parse and validate settings from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://"))
        {
            return Err(ConfigError::BaseUrl(self.api_base_url.clone()));
        }
        let counts = [
            ("top_n_subjects", i64::try_from(self.top_n_subjects).unwrap_or(i64::MAX)),
            ("character_num", i64::try_from(self.character_num).unwrap_or(i64::MAX)),
            ("max_attempts", i64::from(self.max_attempts)),
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("session_ttl_secs", self.session_ttl_secs),
        ];
        for (field, value) in counts {
            if value < 1 {
                return Err(ConfigError::MinViolation {
                    field,
                    min: 1,
                    value,
                });
            }
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year)
            && start > end
        {
            return Err(ConfigError::YearRange { start, end });
        }
        Ok(())
    }

    /// Required meta tags with blank entries removed.
    #[must_use]
    pub fn required_meta_tags(&self) -> Vec<String> {
        self.meta_tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Effective inclusive year window as of `today`.
    ///
    /// The end is clamped to the current year and the start to the end.
    #[must_use]
    pub fn year_window(&self, today: NaiveDate) -> (i32, i32) {
        let current = today.year();
        let end = self.end_year.unwrap_or(current).min(current);
        let start = self
            .start_year
            .unwrap_or(current - DEFAULT_YEARS_BACK)
            .min(end);
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings = GameSettings::from_json(r#"{"universe": {"mode": "index", "index_id": 42}}"#)
            .unwrap();
        assert_eq!(settings.universe, UniverseMode::Index { index_id: 42 });
        assert_eq!(settings.top_n_subjects, 50);
        assert!(settings.main_character_only);
        assert_eq!(settings.aggregation, AggregationMode::Structured);
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let settings = GameSettings {
            max_attempts: 0,
            ..GameSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::MinViolation {
                field: "max_attempts",
                min: 1,
                value: 0
            })
        );
        let reversed = GameSettings {
            start_year: Some(2020),
            end_year: Some(2010),
            ..GameSettings::default()
        };
        assert!(matches!(reversed.validate(), Err(ConfigError::YearRange { .. })));
        assert!(matches!(
            GameSettings::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn year_window_clamps_to_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let settings = GameSettings {
            end_year: Some(2030),
            ..GameSettings::default()
        };
        assert_eq!(settings.year_window(today), (2004, 2024));
        let fixed = GameSettings {
            start_year: Some(2010),
            end_year: Some(2012),
            ..GameSettings::default()
        };
        assert_eq!(fixed.year_window(today), (2010, 2012));
    }

    #[test]
    fn blank_meta_tags_are_ignored() {
        let settings = GameSettings {
            meta_tags: vec![String::new(), " 日本 ".to_string(), " ".to_string()],
            ..GameSettings::default()
        };
        assert_eq!(settings.required_meta_tags(), vec!["日本".to_string()]);
    }
}
