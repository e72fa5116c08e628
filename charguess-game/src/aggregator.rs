//! Builds a [`CharacterFingerprint`] from the catalog.
//!
//! The base record, appearance links and voice-actor links are required; a
//! failure on any of them aborts the build. Per-appearance subject details
//! are fetched concurrently and a failed one is logged and skipped, so a
//! single flaky subject never sinks a round.
use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::HashMap;

use crate::api::{CharacterSubjectLink, MetadataClient, SubjectDetail, SubjectKind};
use crate::clock::Clock;
use crate::config::{AggregationMode, GameSettings};
use crate::constants::{
    PROTAGONIST_WEIGHT, RAW_TAG_RELATIVE_FLOOR, REGION_TAGS, ROLE_PROTAGONIST, ROLE_SUPPORTING,
    SOURCE_TAGS, SOURCE_TAG_SYNONYMS, SUPPORTING_WEIGHT, YEAR_TAG_MARKER,
};
use crate::error::GameError;
use crate::fingerprint::{
    AppearanceSummary, CharacterFingerprint, CharacterProfile, CharacterTagIndex,
    FingerprintBuilder, TagPools, WeightedTag, dedup,
};
use crate::http::HttpTransport;
use crate::numbers::u64_to_f64;

/// Aggregation knobs derived from [`GameSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub mode: AggregationMode,
    pub include_game: bool,
    pub subject_tag_num: usize,
    pub character_tag_num: usize,
    pub required_meta_tags: Vec<String>,
}

impl From<&GameSettings> for AggregatorConfig {
    fn from(settings: &GameSettings) -> Self {
        Self {
            mode: settings.aggregation,
            include_game: settings.include_game,
            subject_tag_num: settings.subject_tag_num,
            character_tag_num: settings.character_tag_num,
            required_meta_tags: settings.required_meta_tags(),
        }
    }
}

/// A subject that survived filtering, with the character's role weight.
#[derive(Debug, Clone)]
struct KeptSubject {
    detail: SubjectDetail,
    year: i32,
    weight: u64,
}

/// Gathers and merges everything known about one character.
pub struct AttributeAggregator<'a, T> {
    client: &'a MetadataClient<T>,
    clock: &'a dyn Clock,
    tag_index: &'a CharacterTagIndex,
    config: AggregatorConfig,
}

impl<'a, T: HttpTransport> AttributeAggregator<'a, T> {
    pub fn new(
        client: &'a MetadataClient<T>,
        clock: &'a dyn Clock,
        tag_index: &'a CharacterTagIndex,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            client,
            clock,
            tag_index,
            config,
        }
    }

    /// Fetch and merge every attribute of `character_id`.
    ///
    /// A character with no usable appearance still yields a fingerprint,
    /// with sentinel years and rating; callers decide whether that is fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the base record or either link list cannot be
    /// fetched, or if the record lacks an id or name.
    pub async fn aggregate(&self, character_id: u64) -> Result<CharacterFingerprint, GameError> {
        let detail = self.client.character(character_id).await?;
        let (links, persons) = futures::try_join!(
            self.client.character_subjects(character_id),
            self.client.character_persons(character_id),
        )?;

        let kept = self.fetch_kept(&links).await;
        let summary = self.summarize(character_id, kept);
        let voice_actors: Vec<String> = persons
            .into_iter()
            .filter(|person| {
                matches!(
                    SubjectKind::from_code(person.subject_type),
                    Some(SubjectKind::Anime | SubjectKind::Game)
                )
            })
            .map(|person| person.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        log::debug!(
            "aggregated character {character_id}: {} appearances, {} voice actors",
            summary.titles.len(),
            voice_actors.len()
        );
        FingerprintBuilder::new()
            .profile(CharacterProfile::from_detail(&detail))
            .appearances(summary)
            .voice_actors(voice_actors)
            .build()
    }

    /// Links where the character has a major role, by media preference.
    fn select_links<'l>(&self, links: &'l [CharacterSubjectLink]) -> Vec<&'l CharacterSubjectLink> {
        let major = |link: &&CharacterSubjectLink| {
            link.staff == ROLE_PROTAGONIST || link.staff == ROLE_SUPPORTING
        };
        let of_kind = |kind: SubjectKind| {
            links
                .iter()
                .filter(major)
                .filter(move |link| SubjectKind::from_code(link.kind) == Some(kind))
        };
        if self.config.include_game {
            return links
                .iter()
                .filter(major)
                .filter(|link| {
                    matches!(
                        SubjectKind::from_code(link.kind),
                        Some(SubjectKind::Anime | SubjectKind::Game)
                    )
                })
                .collect();
        }
        let anime: Vec<_> = of_kind(SubjectKind::Anime).collect();
        if anime.is_empty() {
            of_kind(SubjectKind::Game).collect()
        } else {
            anime
        }
    }

    async fn fetch_kept(&self, links: &[CharacterSubjectLink]) -> Vec<KeptSubject> {
        let selected = self.select_links(links);
        let today = self.clock.today();
        let fetches = selected.iter().map(|link| async move {
            match self.client.subject(link.id).await {
                Ok(detail) => {
                    let weight = if link.staff == ROLE_PROTAGONIST {
                        PROTAGONIST_WEIGHT
                    } else {
                        SUPPORTING_WEIGHT
                    };
                    admit(detail, today, &self.config.required_meta_tags)
                        .map(|(detail, year)| KeptSubject {
                            detail,
                            year,
                            weight,
                        })
                }
                Err(err) => {
                    log::warn!("skipping subject {} for aggregation: {err}", link.id);
                    None
                }
            }
        });
        join_all(fetches).await.into_iter().flatten().collect()
    }

    fn summarize(&self, character_id: u64, mut kept: Vec<KeptSubject>) -> AppearanceSummary {
        let earliest_year = kept.iter().map(|subject| subject.year).min();
        let latest_year = kept.iter().map(|subject| subject.year).max();
        let highest_rating = kept
            .iter()
            .filter_map(|subject| subject.detail.rating_score())
            .fold(None, |best: Option<f64>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            });

        let (raw_tags, tag_pools) = match self.config.mode {
            AggregationMode::Raw => (
                merge_raw_tags(&kept, self.config.subject_tag_num),
                TagPools::default(),
            ),
            AggregationMode::Structured => {
                (Vec::new(), self.structured_pools(character_id, &kept))
            }
        };

        kept.sort_by(|a, b| b.detail.rating_count().cmp(&a.detail.rating_count()));
        AppearanceSummary {
            titles: kept
                .iter()
                .map(|subject| subject.detail.display_name().to_string())
                .collect(),
            subject_ids: kept.iter().map(|subject| subject.detail.id).collect(),
            earliest_year,
            latest_year,
            highest_rating,
            raw_tags,
            tag_pools,
        }
    }

    fn structured_pools(&self, character_id: u64, kept: &[KeptSubject]) -> TagPools {
        let mut source_counts: HashMap<String, u64> = HashMap::new();
        let mut meta_counts: HashMap<String, u64> = HashMap::new();
        let mut tag_counts: HashMap<String, u64> = HashMap::new();
        let mut region = Vec::new();

        for subject in kept {
            for tag in &subject.detail.meta_tags {
                if is_source_tag(tag) {
                    continue;
                }
                if is_region_tag(tag) {
                    region.push(tag.clone());
                } else {
                    *meta_counts.entry(tag.clone()).or_default() += subject.weight;
                }
            }
            for tag in &subject.detail.tags {
                if tag.name.contains(YEAR_TAG_MARKER) {
                    continue;
                }
                let score = tag.count.saturating_mul(subject.weight);
                if let Some(canonical) = canonical_source(&tag.name) {
                    *source_counts.entry(canonical.to_string()).or_default() += score;
                } else if is_region_tag(&tag.name) {
                    region.push(tag.name.clone());
                } else {
                    *tag_counts.entry(tag.name.clone()).or_default() += score;
                }
            }
        }

        let source: Vec<String> = ranked(source_counts)
            .into_iter()
            .take(1)
            .map(|tag| tag.name)
            .collect();
        let budget = self.config.subject_tag_num.saturating_sub(source.len());
        let general: Vec<String> = dedup(
            ranked(meta_counts)
                .into_iter()
                .chain(ranked(tag_counts))
                .map(|tag| tag.name)
                .filter(|name| !source.contains(name))
                .collect(),
        )
        .into_iter()
        .take(budget)
        .collect();
        let character = self
            .tag_index
            .tags_for(character_id)
            .iter()
            .take(self.config.character_tag_num)
            .cloned()
            .collect();

        TagPools {
            source,
            general,
            region: dedup(region),
            character,
        }
    }
}

/// Apply the date, lock, year and required-tag filters to one subject.
fn admit(
    detail: SubjectDetail,
    today: NaiveDate,
    required_meta_tags: &[String],
) -> Option<(SubjectDetail, i32)> {
    if detail.air_date().is_some_and(|aired| aired > today) {
        log::debug!("dropping subject {}: not yet aired", detail.id);
        return None;
    }
    if detail.locked {
        log::debug!("dropping subject {}: locked", detail.id);
        return None;
    }
    let year = detail.year()?;
    if !required_meta_tags
        .iter()
        .all(|tag| detail.meta_tags.contains(tag))
    {
        return None;
    }
    Some((detail, year))
}

fn is_source_tag(name: &str) -> bool {
    SOURCE_TAGS.contains(&name)
}

fn is_region_tag(name: &str) -> bool {
    REGION_TAGS.contains(&name)
}

/// Canonical source tag for `name`, following the synonym table.
fn canonical_source(name: &str) -> Option<&'static str> {
    SOURCE_TAGS
        .iter()
        .find(|tag| **tag == name)
        .copied()
        .or_else(|| {
            SOURCE_TAG_SYNONYMS
                .iter()
                .find(|(synonym, _)| *synonym == name)
                .map(|(_, canonical)| *canonical)
        })
}

/// Highest score first; ties broken by name so the order is reproducible.
fn ranked(counts: HashMap<String, u64>) -> Vec<WeightedTag> {
    let mut tags: Vec<WeightedTag> = counts
        .into_iter()
        .map(|(name, score)| WeightedTag { name, score })
        .collect();
    tags.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    tags
}

/// Weighted merge of raw subject tags across appearances.
///
/// Source tags are counted apart and only the strongest is folded back in.
/// Year tags are dropped. Every tag scoring at least a tenth of the top tag
/// is kept, and never fewer than `min_kept` when that many exist.
fn merge_raw_tags(kept: &[KeptSubject], min_kept: usize) -> Vec<WeightedTag> {
    let mut source_counts: HashMap<String, u64> = HashMap::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for subject in kept {
        for tag in &subject.detail.tags {
            let score = tag.count.saturating_mul(subject.weight);
            if let Some(canonical) = canonical_source(&tag.name) {
                *source_counts.entry(canonical.to_string()).or_default() += score;
            } else {
                *counts.entry(tag.name.clone()).or_default() += score;
            }
        }
    }
    if let Some(top_source) = ranked(source_counts).into_iter().next() {
        *counts.entry(top_source.name).or_default() += top_source.score;
    }
    counts.retain(|name, _| !name.contains(YEAR_TAG_MARKER));

    let tags = ranked(counts);
    let Some(top) = tags.first().map(|tag| tag.score) else {
        return tags;
    };
    let floor = u64_to_f64(top) * RAW_TAG_RELATIVE_FLOOR;
    let above_floor = tags
        .iter()
        .take_while(|tag| u64_to_f64(tag.score) >= floor)
        .count();
    tags.into_iter().take(above_floor.max(min_kept)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SubjectTag;
    use serde_json::json;

    fn subject(id: u64, tags: &[(&str, u64)]) -> SubjectDetail {
        let tags: Vec<SubjectTag> = tags
            .iter()
            .map(|(name, count)| SubjectTag {
                name: (*name).to_string(),
                count: *count,
            })
            .collect();
        serde_json::from_value(json!({
            "id": id,
            "name": format!("subject {id}"),
            "date": "2015-04-01",
            "type": 2,
            "tags": tags,
        }))
        .unwrap()
    }

    fn kept(detail: SubjectDetail, weight: u64) -> KeptSubject {
        KeptSubject {
            year: detail.year().unwrap(),
            detail,
            weight,
        }
    }

    #[test]
    fn raw_tags_merge_with_role_weights() {
        let merged = merge_raw_tags(
            &[
                kept(subject(1, &[("tagA", 5)]), PROTAGONIST_WEIGHT),
                kept(subject(2, &[("tagA", 2)]), SUPPORTING_WEIGHT),
            ],
            6,
        );
        assert_eq!(
            merged,
            vec![WeightedTag {
                name: "tagA".to_string(),
                score: 17
            }]
        );
    }

    #[test]
    fn raw_tags_fold_top_source_and_drop_years() {
        let merged = merge_raw_tags(
            &[kept(
                subject(1, &[("恋爱", 100), ("轻改", 40), ("漫改", 10), ("2015", 90), ("小说改", 5)]),
                1,
            )],
            1,
        );
        let names: Vec<&str> = merged.iter().map(|tag| tag.name.as_str()).collect();
        assert_eq!(names, vec!["恋爱", "小说改"]);
        assert_eq!(merged[1].score, 45);
    }

    #[test]
    fn raw_tag_floor_keeps_minimum_count() {
        let detail = subject(1, &[("a", 100), ("b", 50), ("c", 9), ("d", 1)]);
        let strict = merge_raw_tags(&[kept(detail.clone(), 1)], 1);
        assert_eq!(strict.len(), 2);
        let padded = merge_raw_tags(&[kept(detail, 1)], 3);
        assert_eq!(padded.len(), 3);
    }

    #[test]
    fn admit_filters_future_locked_and_missing_tags() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut future = subject(1, &[]);
        future.date = Some("2024-04-01".to_string());
        assert!(admit(future, today, &[]).is_none());

        let mut locked = subject(2, &[]);
        locked.locked = true;
        assert!(admit(locked, today, &[]).is_none());

        let mut adult = subject(6, &[]);
        adult.nsfw = true;
        assert!(admit(adult, today, &[]).is_some());

        let mut undated = subject(3, &[]);
        undated.date = None;
        assert!(admit(undated, today, &[]).is_none());

        let mut tagged = subject(4, &[]);
        tagged.meta_tags = vec!["日本".to_string()];
        let required = vec!["日本".to_string()];
        assert_eq!(admit(tagged, today, &required).map(|(_, year)| year), Some(2015));
        assert!(admit(subject(5, &[]), today, &required).is_none());
    }

    #[test]
    fn canonical_source_follows_synonyms() {
        assert_eq!(canonical_source("GAL改"), Some("游戏改"));
        assert_eq!(canonical_source("原创"), Some("原创"));
        assert_eq!(canonical_source("恋爱"), None);
    }
}
