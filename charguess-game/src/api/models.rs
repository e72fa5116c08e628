//! Wire shapes returned by the metadata API.
//!
//! Only the fields the engine reads are modelled; everything else in the
//! payloads is ignored by serde.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Treat an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Subject (work) categories used by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Book,
    Anime,
    Music,
    Game,
    Real,
}

impl SubjectKind {
    /// Numeric code used on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Book => 1,
            Self::Anime => 2,
            Self::Music => 3,
            Self::Game => 4,
            Self::Real => 6,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Book),
            2 => Some(Self::Anime),
            3 => Some(Self::Music),
            4 => Some(Self::Game),
            6 => Some(Self::Real),
            _ => None,
        }
    }
}

/// Weighted user tag on a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTag {
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Rating {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub total: u64,
}

/// Full subject record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDetail {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name_cn: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub tags: Vec<SubjectTag>,
    #[serde(default, deserialize_with = "nullable")]
    pub meta_tags: Vec<String>,
    #[serde(default)]
    pub rating: Option<Rating>,
}

impl SubjectDetail {
    /// Localized title when present, otherwise the original.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name_cn.trim().is_empty() {
            &self.name
        } else {
            &self.name_cn
        }
    }

    /// Parsed air date, if any.
    #[must_use]
    pub fn air_date(&self) -> Option<NaiveDate> {
        parse_air_date(self.date.as_deref()?)
    }

    /// Year of the air date, if the date carries one.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        let date = self.date.as_deref()?;
        date.split('-').next()?.trim().parse().ok()
    }

    /// Positive rating score, if rated.
    #[must_use]
    pub fn rating_score(&self) -> Option<f64> {
        self.rating
            .as_ref()
            .map(|r| r.score)
            .filter(|score| *score > 0.0)
    }

    /// Number of ratings, used as the popularity proxy for ordering.
    #[must_use]
    pub fn rating_count(&self) -> u64 {
        self.rating.as_ref().map_or(0, |r| r.total)
    }
}

/// Parse `YYYY-MM-DD`, tolerating `YYYY-MM` and `YYYY` forms.
#[must_use]
pub fn parse_air_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("{raw}-01-01"), "%Y-%m-%d").ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Images {
    #[serde(default)]
    pub medium: String,
    #[serde(default)]
    pub grid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CharacterStat {
    #[serde(default)]
    pub collects: u64,
    #[serde(default)]
    pub comments: u64,
}

/// Free-form key/value row in a character's infobox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoboxItem {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// Character base record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDetail {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub summary: String,
    #[serde(default)]
    pub images: Option<Images>,
    #[serde(default)]
    pub stat: Option<CharacterStat>,
    #[serde(default)]
    pub infobox: Vec<InfoboxItem>,
}

impl CharacterDetail {
    /// String values stored under an infobox key. Values may be a plain
    /// string or a list of `{ "v": ... }` objects.
    #[must_use]
    pub fn infobox_values(&self, key: &str) -> Vec<String> {
        let Some(item) = self.infobox.iter().find(|item| item.key == key) else {
            return Vec::new();
        };
        let values = match &item.value {
            Value::String(s) => vec![s.clone()],
            Value::Array(entries) => entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => map.get("v").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect(),
            Value::Object(map) => map
                .get("v")
                .and_then(Value::as_str)
                .map(str::to_string)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };
        values
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Engagement-derived popularity.
    #[must_use]
    pub fn popularity(&self) -> u64 {
        self.stat
            .as_ref()
            .map_or(0, |s| s.collects.saturating_add(s.comments))
    }
}

/// Link from a character to a subject it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSubjectLink {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name_cn: String,
    /// Role of the character in the subject (protagonist, supporting, cameo).
    #[serde(default)]
    pub staff: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

/// Voice actor (or other person) linked to a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterPerson {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject_id: u64,
    #[serde(default)]
    pub subject_type: u8,
}

/// Character listed in a subject's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCharacter {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub relation: String,
}

/// Minimal subject reference used by pages and overflow lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name_cn: String,
}

impl SubjectRef {
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            name_cn: String::new(),
        }
    }
}

/// Search hit shown to players looking up a work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectHit {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name_cn: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: u8,
}

/// Curated index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub total: u64,
}

/// Paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}
