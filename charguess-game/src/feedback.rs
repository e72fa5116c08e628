//! Comparative feedback between a guessed character and the target.
//!
//! Everything here is pure: two fingerprints in, one [`Feedback`] out.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::{AggregationMode, GameSettings};
use crate::constants::{
    APPEARANCE_COUNT_NEAR, FLOAT_TOLERANCE, POPULARITY_CLOSE_PCT, POPULARITY_NEAR_PCT,
    RATING_CLOSE, RATING_NEAR, YEAR_NEAR,
};
use crate::fingerprint::{CharacterFingerprint, Gender, dedup};
use crate::numbers::len_to_i64;

/// Direction and magnitude of a guess relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "+")]
    Higher,
    #[serde(rename = "++")]
    MuchHigher,
    #[serde(rename = "-")]
    Lower,
    #[serde(rename = "--")]
    MuchLower,
    #[serde(rename = "?")]
    Unknown,
}

impl Verdict {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Higher => "+",
            Self::MuchHigher => "++",
            Self::Lower => "-",
            Self::MuchLower => "--",
            Self::Unknown => "?",
        }
    }

    /// Exact equality, then a symmetric "near" band.
    const fn from_step(diff: i64, near: i64) -> Self {
        if diff == 0 {
            Self::Equal
        } else if diff > 0 {
            if diff <= near { Self::Higher } else { Self::MuchHigher }
        } else if diff >= -near {
            Self::Lower
        } else {
            Self::MuchLower
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The guessed value next to its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compared<T> {
    pub guess: T,
    pub feedback: Verdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderFeedback {
    pub guess: Gender,
    pub matches: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SharedAppearances {
    pub first: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TagFeedback {
    pub guess: Vec<String>,
    pub shared: Vec<String>,
}

/// Field-by-field comparison of a guess against the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub gender: GenderFeedback,
    pub popularity: Compared<u64>,
    pub rating: Compared<Option<f64>>,
    pub shared_appearances: SharedAppearances,
    pub appearance_count: Compared<usize>,
    pub latest_appearance: Compared<Option<i32>>,
    pub earliest_appearance: Compared<Option<i32>>,
    pub meta_tags: TagFeedback,
}

/// Tag budgets and aggregation mode used when comparing tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackConfig {
    pub mode: AggregationMode,
    pub subject_tag_num: usize,
    pub character_tag_num: usize,
}

impl From<&GameSettings> for FeedbackConfig {
    fn from(settings: &GameSettings) -> Self {
        Self {
            mode: settings.aggregation,
            subject_tag_num: settings.subject_tag_num,
            character_tag_num: settings.character_tag_num,
        }
    }
}

/// Compare `guess` against `target`.
#[must_use]
pub fn compare(
    guess: &CharacterFingerprint,
    target: &CharacterFingerprint,
    config: &FeedbackConfig,
) -> Feedback {
    Feedback {
        gender: GenderFeedback {
            guess: guess.gender,
            matches: guess.gender == target.gender,
        },
        popularity: Compared {
            guess: guess.popularity,
            feedback: popularity_verdict(guess.popularity, target.popularity),
        },
        rating: Compared {
            guess: guess.rating(),
            feedback: rating_verdict(guess.rating(), target.rating()),
        },
        shared_appearances: shared_appearances(&guess.appearances, &target.appearances),
        appearance_count: Compared {
            guess: guess.appearances.len(),
            feedback: Verdict::from_step(
                len_to_i64(guess.appearances.len()) - len_to_i64(target.appearances.len()),
                APPEARANCE_COUNT_NEAR,
            ),
        },
        latest_appearance: Compared {
            guess: guess.latest_year(),
            feedback: year_verdict(guess.latest_year(), target.latest_year()),
        },
        earliest_appearance: Compared {
            guess: guess.earliest_year(),
            feedback: year_verdict(guess.earliest_year(), target.earliest_year()),
        },
        meta_tags: match config.mode {
            AggregationMode::Structured => structured_tags(guess, target, config),
            AggregationMode::Raw => raw_tags(guess, target),
        },
    }
}

/// Percentage bands relative to the target, computed in integers so the
/// band edges are inclusive and exact.
#[must_use]
pub fn popularity_verdict(guess: u64, target: u64) -> Verdict {
    let diff = i128::from(guess) - i128::from(target);
    let scaled = diff.abs() * 100;
    let target = i128::from(target);
    if scaled <= target * i128::from(POPULARITY_CLOSE_PCT) {
        Verdict::Equal
    } else if scaled <= target * i128::from(POPULARITY_NEAR_PCT) {
        if diff > 0 { Verdict::Higher } else { Verdict::Lower }
    } else if diff > 0 {
        Verdict::MuchHigher
    } else {
        Verdict::MuchLower
    }
}

#[must_use]
pub fn rating_verdict(guess: Option<f64>, target: Option<f64>) -> Verdict {
    let (Some(guess), Some(target)) = (guess, target) else {
        return Verdict::Unknown;
    };
    let diff = guess - target;
    if diff.abs() <= RATING_CLOSE + FLOAT_TOLERANCE {
        Verdict::Equal
    } else if diff > 0.0 {
        if diff <= RATING_NEAR + FLOAT_TOLERANCE {
            Verdict::Higher
        } else {
            Verdict::MuchHigher
        }
    } else if diff >= -(RATING_NEAR + FLOAT_TOLERANCE) {
        Verdict::Lower
    } else {
        Verdict::MuchLower
    }
}

#[must_use]
pub fn year_verdict(guess: Option<i32>, target: Option<i32>) -> Verdict {
    match (guess, target) {
        (Some(guess), Some(target)) => {
            Verdict::from_step(i64::from(guess - target), i64::from(YEAR_NEAR))
        }
        _ => Verdict::Unknown,
    }
}

fn shared_appearances(guess: &[String], target: &[String]) -> SharedAppearances {
    let target: HashSet<&String> = target.iter().collect();
    let shared: Vec<&String> = guess.iter().filter(|title| target.contains(title)).collect();
    SharedAppearances {
        first: shared.first().map(|title| (*title).clone()),
        count: shared.len(),
    }
}

/// Fill up to `cap` tags from `guess`, shared ones first.
fn capped_pool(guess: &[String], target: &HashSet<&String>, cap: usize) -> (Vec<String>, Vec<String>) {
    let shared: Vec<String> = guess
        .iter()
        .filter(|tag| target.contains(tag))
        .take(cap)
        .cloned()
        .collect();
    let mut pool = shared.clone();
    for tag in guess {
        if pool.len() >= cap {
            break;
        }
        if !target.contains(tag) {
            pool.push(tag.clone());
        }
    }
    (pool, shared)
}

fn structured_tags(
    guess: &CharacterFingerprint,
    target: &CharacterFingerprint,
    config: &FeedbackConfig,
) -> TagFeedback {
    let guess_subject: Vec<String> = dedup(guess.tag_pools.subject_tags().cloned().collect());
    let target_subject: HashSet<&String> = target.tag_pools.subject_tags().collect();
    let (subject_pool, shared_subject) =
        capped_pool(&guess_subject, &target_subject, config.subject_tag_num);

    let target_character: HashSet<&String> = target.tag_pools.character.iter().collect();
    let (character_pool, shared_character) = capped_pool(
        &guess.tag_pools.character,
        &target_character,
        config.character_tag_num,
    );

    let target_vas: HashSet<&String> = target.anime_vas.iter().collect();
    let shared_vas = guess
        .anime_vas
        .iter()
        .filter(|va| target_vas.contains(va))
        .cloned();

    TagFeedback {
        guess: dedup(
            subject_pool
                .into_iter()
                .chain(character_pool)
                .chain(guess.anime_vas.iter().cloned())
                .collect(),
        ),
        shared: dedup(
            shared_subject
                .into_iter()
                .chain(shared_character)
                .chain(shared_vas)
                .collect(),
        ),
    }
}

fn raw_tags(guess: &CharacterFingerprint, target: &CharacterFingerprint) -> TagFeedback {
    let target_names: HashSet<&str> = target.raw_tag_names().collect();
    let guess_names: Vec<String> = guess.raw_tag_names().map(str::to_string).collect();
    let shared = guess_names
        .iter()
        .filter(|name| target_names.contains(name.as_str()))
        .cloned()
        .collect();
    TagFeedback {
        guess: guess_names,
        shared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{TagPools, WeightedTag};

    fn fingerprint(id: u64) -> CharacterFingerprint {
        CharacterFingerprint {
            id,
            name: format!("character {id}"),
            name_cn: None,
            aliases: Vec::new(),
            summary: String::new(),
            image: None,
            gender: Gender::Female,
            popularity: 100,
            appearances: vec!["White Album 2".to_string()],
            appearance_ids: vec![1],
            earliest_appearance: 2013,
            latest_appearance: 2013,
            highest_rating: 8.0,
            raw_tags: Vec::new(),
            meta_tags: Vec::new(),
            tag_pools: TagPools::default(),
            anime_vas: Vec::new(),
        }
    }

    const STRUCTURED: FeedbackConfig = FeedbackConfig {
        mode: AggregationMode::Structured,
        subject_tag_num: 3,
        character_tag_num: 2,
    };

    #[test]
    fn popularity_bands_are_inclusive() {
        assert_eq!(popularity_verdict(120, 100), Verdict::Higher);
        assert_eq!(popularity_verdict(121, 100), Verdict::MuchHigher);
        assert_eq!(popularity_verdict(105, 100), Verdict::Equal);
        assert_eq!(popularity_verdict(80, 100), Verdict::Lower);
        assert_eq!(popularity_verdict(79, 100), Verdict::MuchLower);
        assert_eq!(popularity_verdict(0, 0), Verdict::Equal);
        assert_eq!(popularity_verdict(1, 0), Verdict::MuchHigher);
    }

    #[test]
    fn sentinel_rating_is_unknown() {
        let mut guess = fingerprint(1);
        let target = fingerprint(2);
        guess.highest_rating = -1.0;
        let feedback = compare(&guess, &target, &STRUCTURED);
        assert_eq!(feedback.rating.feedback, Verdict::Unknown);
        assert_eq!(feedback.rating.guess, None);
        assert_eq!(compare(&target, &guess, &STRUCTURED).rating.feedback, Verdict::Unknown);
        assert_eq!(rating_verdict(Some(8.3), Some(8.0)), Verdict::Equal);
        assert_eq!(rating_verdict(Some(9.0), Some(8.0)), Verdict::Higher);
        assert_eq!(rating_verdict(Some(6.5), Some(8.0)), Verdict::MuchLower);
    }

    #[test]
    fn years_and_counts_use_two_step_bands() {
        assert_eq!(year_verdict(Some(2015), Some(2013)), Verdict::Higher);
        assert_eq!(year_verdict(Some(2010), Some(2013)), Verdict::MuchLower);
        assert_eq!(year_verdict(None, None), Verdict::Unknown);
        assert_eq!(year_verdict(Some(2013), None), Verdict::Unknown);

        let mut guess = fingerprint(1);
        guess.appearances = vec!["A".into(), "White Album 2".into(), "B".into(), "C".into()];
        let feedback = compare(&guess, &fingerprint(2), &STRUCTURED);
        assert_eq!(feedback.appearance_count.feedback, Verdict::MuchHigher);
        assert_eq!(
            feedback.shared_appearances,
            SharedAppearances {
                first: Some("White Album 2".to_string()),
                count: 1
            }
        );
        assert!(feedback.gender.matches);
    }

    #[test]
    fn structured_tags_prefer_shared_entries() {
        let mut guess = fingerprint(1);
        guess.tag_pools = TagPools {
            source: vec!["原创".into()],
            general: vec!["科幻".into(), "恋爱".into(), "校园".into()],
            region: vec!["日本".into()],
            character: vec!["短发".into(), "眼镜".into(), "学生".into()],
        };
        guess.anime_vas = vec!["VA1".into(), "VA2".into()];
        let mut target = fingerprint(2);
        target.tag_pools = TagPools {
            source: vec!["游戏改".into()],
            general: vec!["恋爱".into()],
            region: vec!["日本".into()],
            character: vec!["学生".into()],
        };
        target.anime_vas = vec!["VA2".into()];

        let tags = compare(&guess, &target, &STRUCTURED).meta_tags;
        assert_eq!(
            tags.guess,
            vec!["恋爱", "日本", "原创", "学生", "短发", "VA1", "VA2"]
        );
        assert_eq!(tags.shared, vec!["恋爱", "日本", "学生", "VA2"]);
    }

    #[test]
    fn raw_tags_compare_by_membership() {
        let mut guess = fingerprint(1);
        guess.raw_tags = vec![
            WeightedTag { name: "恋爱".into(), score: 30 },
            WeightedTag { name: "百合".into(), score: 10 },
        ];
        let mut target = fingerprint(2);
        target.raw_tags = vec![WeightedTag { name: "恋爱".into(), score: 3 }];
        let config = FeedbackConfig {
            mode: AggregationMode::Raw,
            ..STRUCTURED
        };
        let tags = compare(&guess, &target, &config).meta_tags;
        assert_eq!(tags.guess, vec!["恋爱", "百合"]);
        assert_eq!(tags.shared, vec!["恋爱"]);
    }
}
