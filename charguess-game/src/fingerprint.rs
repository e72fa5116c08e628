//! Canonical attribute record for one character.
//!
//! A [`CharacterFingerprint`] is assembled once per round by the aggregator
//! and then only read: the matcher checks names against it, the feedback
//! engine compares two of them and hints quote from it.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use zhconv::{Variant, zhconv};

use crate::api::CharacterDetail;
use crate::error::GameError;

const INFOBOX_LOCALIZED_NAME: &str = "简体中文名";
const INFOBOX_ALIASES: &str = "别名";
const UNKNOWN_YEAR: i32 = -1;
const UNKNOWN_RATING: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Gender {
    /// Only the literal `male` / `female` values are trusted.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("male") => Self::Male,
            Some("female") => Self::Female,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unknown => "?",
        }
    }
}

/// Tag with its accumulated weighted score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTag {
    pub name: String,
    pub score: u64,
}

/// Structured tag pools, each ordered by priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TagPools {
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub general: Vec<String>,
    #[serde(default)]
    pub region: Vec<String>,
    #[serde(default)]
    pub character: Vec<String>,
}

impl TagPools {
    /// Subject-derived tags in priority order: source, general, region.
    pub fn subject_tags(&self) -> impl Iterator<Item = &String> {
        self.source
            .iter()
            .chain(&self.general)
            .chain(&self.region)
    }
}

/// Identity fields taken from the character's base record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CharacterProfile {
    pub id: u64,
    pub name: String,
    pub name_cn: Option<String>,
    pub aliases: Vec<String>,
    pub gender: Gender,
    pub summary: String,
    pub image: Option<String>,
    pub popularity: u64,
}

impl CharacterProfile {
    /// Extract identity from a base record, reading the localized name and
    /// aliases out of the infobox. The traditional-script spelling of the
    /// localized name is kept as an extra alias.
    #[must_use]
    pub fn from_detail(detail: &CharacterDetail) -> Self {
        let name_cn = detail
            .infobox_values(INFOBOX_LOCALIZED_NAME)
            .into_iter()
            .next();
        let mut aliases = detail.infobox_values(INFOBOX_ALIASES);
        if let Some(simplified) = name_cn.as_deref() {
            let traditional = zhconv(simplified, Variant::ZhHant);
            if traditional != simplified && !aliases.contains(&traditional) {
                aliases.push(traditional);
            }
        }
        let image = detail
            .images
            .as_ref()
            .map(|images| images.medium.clone())
            .filter(|url| !url.is_empty());
        Self {
            id: detail.id,
            name: detail.name.trim().to_string(),
            name_cn,
            aliases,
            gender: Gender::parse(detail.gender.as_deref()),
            summary: detail.summary.clone(),
            image,
            popularity: detail.popularity(),
        }
    }
}

/// Aggregated appearance statistics and tags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppearanceSummary {
    pub titles: Vec<String>,
    pub subject_ids: Vec<u64>,
    pub earliest_year: Option<i32>,
    pub latest_year: Option<i32>,
    pub highest_rating: Option<f64>,
    pub raw_tags: Vec<WeightedTag>,
    pub tag_pools: TagPools,
}

/// Immutable fingerprint of one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterFingerprint {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub name_cn: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub popularity: u64,
    #[serde(default)]
    pub appearances: Vec<String>,
    #[serde(default)]
    pub appearance_ids: Vec<u64>,
    pub earliest_appearance: i32,
    pub latest_appearance: i32,
    pub highest_rating: f64,
    #[serde(default)]
    pub raw_tags: Vec<WeightedTag>,
    #[serde(default)]
    pub meta_tags: Vec<String>,
    #[serde(default)]
    pub tag_pools: TagPools,
    #[serde(default)]
    pub anime_vas: Vec<String>,
}

impl CharacterFingerprint {
    #[must_use]
    pub fn earliest_year(&self) -> Option<i32> {
        (self.earliest_appearance != UNKNOWN_YEAR).then_some(self.earliest_appearance)
    }

    #[must_use]
    pub fn latest_year(&self) -> Option<i32> {
        (self.latest_appearance != UNKNOWN_YEAR).then_some(self.latest_appearance)
    }

    /// Highest positive rating among kept appearances.
    #[must_use]
    pub fn rating(&self) -> Option<f64> {
        (self.highest_rating >= 0.0).then_some(self.highest_rating)
    }

    /// Localized name when known, otherwise the primary one.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name_cn
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// Primary, localized and alias names, in that order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.name_cn.as_deref())
            .chain(self.aliases.iter().map(String::as_str))
            .filter(|name| !name.trim().is_empty())
    }

    /// Names of the raw tags, highest score first.
    pub fn raw_tag_names(&self) -> impl Iterator<Item = &str> {
        self.raw_tags.iter().map(|tag| tag.name.as_str())
    }
}

/// Assembles a fingerprint from typed partial results.
#[derive(Debug, Default)]
pub struct FingerprintBuilder {
    profile: Option<CharacterProfile>,
    appearances: Option<AppearanceSummary>,
    voice_actors: Vec<String>,
}

impl FingerprintBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn profile(mut self, profile: CharacterProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    #[must_use]
    pub fn appearances(mut self, appearances: AppearanceSummary) -> Self {
        self.appearances = Some(appearances);
        self
    }

    #[must_use]
    pub fn voice_actors(mut self, voice_actors: Vec<String>) -> Self {
        self.voice_actors = voice_actors;
        self
    }

    /// Finish the fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::MissingField`] when the profile, its id or name,
    /// or the appearance summary is absent.
    pub fn build(self) -> Result<CharacterFingerprint, GameError> {
        let profile = self.profile.ok_or(GameError::MissingField("profile"))?;
        let summary = self
            .appearances
            .ok_or(GameError::MissingField("appearances"))?;
        if profile.id == 0 {
            return Err(GameError::MissingField("id"));
        }
        if profile.name.is_empty() {
            return Err(GameError::MissingField("name"));
        }

        let anime_vas = dedup(self.voice_actors);
        let mut meta_tags: Vec<String> = summary
            .tag_pools
            .source
            .iter()
            .chain(&summary.tag_pools.general)
            .chain(&summary.tag_pools.region)
            .chain(&summary.tag_pools.character)
            .cloned()
            .collect();
        meta_tags.extend(anime_vas.iter().cloned());

        Ok(CharacterFingerprint {
            id: profile.id,
            name_cn: profile.name_cn.filter(|name| name != &profile.name),
            aliases: dedup(profile.aliases),
            name: profile.name,
            summary: profile.summary,
            image: profile.image,
            gender: profile.gender,
            popularity: profile.popularity,
            appearances: summary.titles,
            appearance_ids: summary.subject_ids,
            earliest_appearance: summary.earliest_year.unwrap_or(UNKNOWN_YEAR),
            latest_appearance: summary.latest_year.unwrap_or(UNKNOWN_YEAR),
            highest_rating: summary.highest_rating.unwrap_or(UNKNOWN_RATING),
            raw_tags: summary.raw_tags,
            meta_tags: dedup(meta_tags),
            tag_pools: summary.tag_pools,
            anime_vas,
        })
    }
}

/// Remove repeats, keeping first occurrences in order.
pub(crate) fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Curated per-character tags maintained outside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct CharacterTagIndex {
    tags: HashMap<u64, Vec<String>>,
}

impl CharacterTagIndex {
    /// Parse a `{ "<character id>": ["tag", ...] }` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON of that shape.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn insert(&mut self, character_id: u64, tags: Vec<String>) {
        self.tags.insert(character_id, tags);
    }

    #[must_use]
    pub fn tags_for(&self, character_id: u64) -> &[String] {
        self.tags.get(&character_id).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> CharacterProfile {
        CharacterProfile {
            id: 12,
            name: "小木曾雪菜".to_string(),
            ..CharacterProfile::default()
        }
    }

    #[test]
    fn sentinels_surface_as_none() {
        let fingerprint = FingerprintBuilder::new()
            .profile(profile())
            .appearances(AppearanceSummary::default())
            .build()
            .unwrap();
        assert_eq!(fingerprint.earliest_appearance, -1);
        assert_eq!(fingerprint.earliest_year(), None);
        assert_eq!(fingerprint.latest_year(), None);
        assert_eq!(fingerprint.rating(), None);
    }

    #[test]
    fn builder_rejects_missing_fields() {
        let missing_name = FingerprintBuilder::new()
            .profile(CharacterProfile {
                name: String::new(),
                ..profile()
            })
            .appearances(AppearanceSummary::default())
            .build();
        assert!(matches!(missing_name, Err(GameError::MissingField("name"))));

        let missing_summary = FingerprintBuilder::new().profile(profile()).build();
        assert!(matches!(
            missing_summary,
            Err(GameError::MissingField("appearances"))
        ));
    }

    #[test]
    fn voice_actors_join_meta_tags_once() {
        let fingerprint = FingerprintBuilder::new()
            .profile(profile())
            .appearances(AppearanceSummary {
                tag_pools: TagPools {
                    source: vec!["游戏改".to_string()],
                    general: vec!["恋爱".to_string()],
                    region: vec!["日本".to_string()],
                    character: vec!["黑长直".to_string()],
                },
                earliest_year: Some(2013),
                highest_rating: Some(8.4),
                ..AppearanceSummary::default()
            })
            .voice_actors(vec!["米澤円".to_string(), "米澤円".to_string()])
            .build()
            .unwrap();
        assert_eq!(fingerprint.anime_vas, vec!["米澤円"]);
        assert_eq!(
            fingerprint.meta_tags,
            vec!["游戏改", "恋爱", "日本", "黑长直", "米澤円"]
        );
        assert_eq!(fingerprint.earliest_year(), Some(2013));
        assert_eq!(fingerprint.rating(), Some(8.4));
    }

    #[test]
    fn profile_reads_infobox() {
        let detail: CharacterDetail = serde_json::from_value(json!({
            "id": 12,
            "name": "小木曾雪菜",
            "gender": "female",
            "images": {"medium": "https://img/m.jpg", "grid": ""},
            "infobox": [
                {"key": "简体中文名", "value": "小木曾雪菜"},
                {"key": "别名", "value": [{"v": "Setsuna"}]}
            ]
        }))
        .unwrap();
        let profile = CharacterProfile::from_detail(&detail);
        assert_eq!(profile.gender, Gender::Female);
        assert_eq!(profile.aliases, vec!["Setsuna"]);
        assert_eq!(profile.image.as_deref(), Some("https://img/m.jpg"));

        let fingerprint = FingerprintBuilder::new()
            .profile(profile)
            .appearances(AppearanceSummary::default())
            .build()
            .unwrap();
        assert_eq!(fingerprint.name_cn, None);
        assert_eq!(fingerprint.display_name(), "小木曾雪菜");
    }

    #[test]
    fn traditional_localized_name_becomes_alias() {
        let detail: CharacterDetail = serde_json::from_value(json!({
            "id": 30,
            "name": "アスナ",
            "infobox": [
                {"key": "简体中文名", "value": "亚丝娜"},
                {"key": "别名", "value": [{"v": "闪光"}]}
            ]
        }))
        .unwrap();
        let profile = CharacterProfile::from_detail(&detail);
        assert_eq!(profile.name_cn.as_deref(), Some("亚丝娜"));
        assert_eq!(profile.aliases, vec!["闪光", "亞絲娜"]);
    }

    #[test]
    fn meta_tags_list_region_before_character() {
        let fingerprint = FingerprintBuilder::new()
            .profile(profile())
            .appearances(AppearanceSummary {
                tag_pools: TagPools {
                    character: vec!["双马尾".to_string()],
                    region: vec!["中国".to_string()],
                    ..TagPools::default()
                },
                ..AppearanceSummary::default()
            })
            .build()
            .unwrap();
        assert_eq!(fingerprint.meta_tags, vec!["中国", "双马尾"]);
    }

    #[test]
    fn tag_index_parses_string_keys() {
        let index = CharacterTagIndex::from_json(r#"{"12": ["黑长直", "学生"]}"#).unwrap();
        assert_eq!(index.tags_for(12), ["黑长直", "学生"]);
        assert!(index.tags_for(13).is_empty());
        assert_eq!(index.len(), 1);
    }
}
