//! Clue text for the hint ratchet.
//!
//! Each level reveals one kind of information and nothing else. Asking
//! again once the ratchet sits at the top level yields the overflow clue.
use rand::RngCore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    HINT_APPEARANCE_SAMPLE, HINT_SAMPLE_SIZE, HINT_SUMMARY_CHARS, MAX_HINT_LEVEL,
};
use crate::fingerprint::CharacterFingerprint;

/// One revealed clue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Clue {
    Years {
        earliest: Option<i32>,
        latest: Option<i32>,
    },
    VoiceActors {
        names: Vec<String>,
    },
    Appearances {
        titles: Vec<String>,
    },
    Tags {
        tags: Vec<String>,
    },
    Initial {
        initial: Option<char>,
    },
    InitialAndSummary {
        initial: Option<char>,
        excerpt: String,
    },
}

/// A clue together with the ratchet level that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub level: u8,
    /// Requested while the ratchet was already at the top level.
    pub overflow: bool,
    pub clue: Clue,
}

fn sample<R: RngCore + ?Sized>(items: &[String], amount: usize, rng: &mut R) -> Vec<String> {
    items.choose_multiple(rng, amount).cloned().collect()
}

fn initial(fingerprint: &CharacterFingerprint) -> Option<char> {
    fingerprint.display_name().chars().next()
}

/// Clue for `level` (1..=5), or the overflow clue.
pub fn clue_for<R: RngCore + ?Sized>(
    level: u8,
    overflow: bool,
    fingerprint: &CharacterFingerprint,
    rng: &mut R,
) -> Clue {
    if overflow {
        return Clue::InitialAndSummary {
            initial: initial(fingerprint),
            excerpt: fingerprint
                .summary
                .chars()
                .take(HINT_SUMMARY_CHARS)
                .collect(),
        };
    }
    match level.min(MAX_HINT_LEVEL) {
        0 | 1 => Clue::Years {
            earliest: fingerprint.earliest_year(),
            latest: fingerprint.latest_year(),
        },
        2 => Clue::VoiceActors {
            names: sample(&fingerprint.anime_vas, HINT_SAMPLE_SIZE, rng),
        },
        3 => Clue::Appearances {
            titles: sample(&fingerprint.appearances, HINT_APPEARANCE_SAMPLE, rng),
        },
        4 => {
            let pool: Vec<String> = if fingerprint.raw_tags.is_empty() {
                fingerprint.meta_tags.clone()
            } else {
                fingerprint.raw_tag_names().map(str::to_string).collect()
            };
            Clue::Tags {
                tags: sample(&pool, HINT_SAMPLE_SIZE, rng),
            }
        }
        _ => Clue::Initial {
            initial: initial(fingerprint),
        },
    }
}

fn year_text(year: Option<i32>) -> String {
    year.map_or_else(|| "?".to_string(), |y| y.to_string())
}

fn list_text(items: &[String]) -> String {
    if items.is_empty() {
        "(none known)".to_string()
    } else {
        items.join(", ")
    }
}

impl fmt::Display for Clue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Years { earliest, latest } => write!(
                f,
                "appeared between {} and {}",
                year_text(*earliest),
                year_text(*latest)
            ),
            Self::VoiceActors { names } => write!(f, "voiced by {}", list_text(names)),
            Self::Appearances { titles } => write!(f, "appears in {}", list_text(titles)),
            Self::Tags { tags } => write!(f, "related tags: {}", list_text(tags)),
            Self::Initial { initial } => {
                write!(f, "name starts with {}", initial.unwrap_or('?'))
            }
            Self::InitialAndSummary { initial, excerpt } => write!(
                f,
                "name starts with {}; profile opens with \"{excerpt}...\"",
                initial.unwrap_or('?')
            ),
        }
    }
}
