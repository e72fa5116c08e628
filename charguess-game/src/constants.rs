//! Centralized tuning constants for charguess game logic.
//!
//! Thresholds, tag tables and keyword lists live here so matching and
//! feedback behavior can only change through reviewed code.

// Metadata API -------------------------------------------------------------
pub const DEFAULT_API_BASE_URL: &str = "https://api.bgm.tv";
pub const USER_AGENT: &str = "charguess/0.1 (https://github.com/charguess/charguess)";
pub(crate) const RANKED_PAGE_SIZE: u64 = 10;
pub(crate) const RANK_SORT_KEY: &str = "heat";

// Role labels used by the catalog for character/subject links.
pub(crate) const ROLE_PROTAGONIST: &str = "主角";
pub(crate) const ROLE_SUPPORTING: &str = "配角";
pub(crate) const PROTAGONIST_WEIGHT: u64 = 3;
pub(crate) const SUPPORTING_WEIGHT: u64 = 1;

// Cache -------------------------------------------------------------------
pub(crate) const CACHE_TABLE: &str = "request_cache";
pub(crate) const DEFAULT_CACHE_TTL_SECS: i64 = 24 * 60 * 60;

// Sessions and scores -----------------------------------------------------
pub(crate) const SESSION_TABLE: &str = "guild_game_states";
pub(crate) const SCORE_TABLE: &str = "scores";
pub(crate) const CONVERSATION_TABLE: &str = "conversations";
pub(crate) const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;
pub(crate) const MAX_HINT_LEVEL: u8 = 5;
pub(crate) const ROUND_ID_LEN: usize = 6;
pub(crate) const CAS_RETRY_LIMIT: usize = 8;

// Hints -------------------------------------------------------------------
pub(crate) const HINT_SAMPLE_SIZE: usize = 3;
pub(crate) const HINT_APPEARANCE_SAMPLE: usize = 2;
pub(crate) const HINT_SUMMARY_CHARS: usize = 100;

// Conversation ------------------------------------------------------------
pub(crate) const CONVERSATION_TTL_SECS: i64 = 60 * 60;
pub(crate) const CONVERSATION_MAX_TURNS: usize = 10;
pub(crate) const RESPONSE_COOLDOWN_MILLIS: i64 = 5_000;
pub(crate) const PERSONA_SUMMARY_CHARS: usize = 500;

// Aggregation -------------------------------------------------------------
pub(crate) const RAW_TAG_RELATIVE_FLOOR: f64 = 0.1;
pub(crate) const YEAR_TAG_MARKER: &str = "20";

/// Canonical source-type tags.
pub(crate) const SOURCE_TAGS: [&str; 4] = ["原创", "游戏改", "小说改", "漫画改"];

/// Synonyms collapsed onto a canonical source-type tag.
pub(crate) const SOURCE_TAG_SYNONYMS: [(&str, &str); 9] = [
    ("GAL改", "游戏改"),
    ("轻小说改", "小说改"),
    ("轻改", "小说改"),
    ("原创动画", "原创"),
    ("网文改", "小说改"),
    ("漫改", "漫画改"),
    ("漫画改编", "漫画改"),
    ("游戏改编", "游戏改"),
    ("小说改编", "小说改"),
];

/// Region tags, always kept in structured mode.
pub(crate) const REGION_TAGS: [&str; 13] = [
    "日本",
    "欧美",
    "美国",
    "中国",
    "法国",
    "韩国",
    "英国",
    "俄罗斯",
    "中国香港",
    "苏联",
    "捷克",
    "中国台湾",
    "马来西亚",
];

// Feedback ----------------------------------------------------------------
pub(crate) const POPULARITY_CLOSE_PCT: u64 = 5;
pub(crate) const POPULARITY_NEAR_PCT: u64 = 20;
pub(crate) const RATING_CLOSE: f64 = 0.3;
pub(crate) const RATING_NEAR: f64 = 1.0;
pub(crate) const APPEARANCE_COUNT_NEAR: i64 = 2;
pub(crate) const YEAR_NEAR: i32 = 2;
pub(crate) const FLOAT_TOLERANCE: f64 = 1e-9;

// Matching ----------------------------------------------------------------
pub(crate) const LEAD_IN_PREFIXES: [&str; 10] = [
    "你是",
    "你就是",
    "猜你是",
    "你應該是",
    "你应该是",
    "你可能是",
    "你会是",
    "你不是",
    "你會是",
    "是不是",
];

pub(crate) const GUESS_KEYWORDS: [&str; 15] = [
    "我猜",
    "猜你",
    "猜是",
    "guess",
    "你是",
    "应该是",
    "是不是",
    "是否",
    "应该",
    "可能",
    "難道",
    "难道",
    "大概",
    "估計",
    "估计",
];

pub(crate) const STRIPPED_PUNCTUATION: &str =
    "?？!！,，.。:：;；(（)）[]「」『』\"'“”‘’";
pub(crate) const STRIPPED_CONNECTIVES: [&str; 5] = ["の", "之", "的", "&", "＆"];
pub(crate) const CHAR_BAG_THRESHOLD: f64 = 0.5;
