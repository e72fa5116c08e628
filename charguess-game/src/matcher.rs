//! Decides whether a free-text chat message names the target character.
//!
//! Checks run from strictest to loosest and the first hit wins:
//! an explicit "you are X" lead-in, exact equality, prefix or suffix,
//! containment, and finally a character-overlap test that only applies
//! when the message reads like a guess.
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::constants::{
    CHAR_BAG_THRESHOLD, GUESS_KEYWORDS, LEAD_IN_PREFIXES, STRIPPED_CONNECTIVES,
    STRIPPED_PUNCTUATION,
};
use crate::fingerprint::CharacterFingerprint;
use crate::numbers::ratio;

struct Patterns {
    lead_in: Regex,
    cjk: Regex,
    name_separator: Regex,
    token_separator: Regex,
}

impl Patterns {
    fn compile() -> Option<Self> {
        let prefixes: Vec<String> = LEAD_IN_PREFIXES.iter().map(|p| regex::escape(p)).collect();
        Some(Self {
            lead_in: Regex::new(&format!(r"^(?:{})\s*", prefixes.join("|"))).ok()?,
            cjk: Regex::new(r"[\u{4e00}-\u{9fa5}\u{3040}-\u{30ff}\u{3400}-\u{4dbf}]").ok()?,
            name_separator: Regex::new(r"[·・.\s]").ok()?,
            token_separator: Regex::new(r"[\s·・\u{3000}.\-]+").ok()?,
        })
    }
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS.get_or_init(Patterns::compile).as_ref()
}

fn is_spacing(c: char) -> bool {
    c.is_whitespace() || matches!(c, '·' | '・' | '\u{3000}')
}

/// Canonical comparison form: lowercase, no spacing, punctuation or connectives.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !is_spacing(*c) && !STRIPPED_PUNCTUATION.contains(*c))
        .collect();
    for connective in STRIPPED_CONNECTIVES {
        out = out.replace(connective, "");
    }
    out.trim().to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn last_chars(s: &str, n: usize) -> String {
    let len = char_len(s);
    s.chars().skip(len.saturating_sub(n)).collect()
}

/// Every normalized form the target could plausibly be called by.
#[must_use]
pub fn name_variants(fingerprint: &CharacterFingerprint) -> Vec<String> {
    let patterns = patterns();
    let mut raw: Vec<String> = Vec::new();
    for name in fingerprint.names() {
        raw.push(name.to_string());
        raw.push(name.chars().filter(|c| !c.is_whitespace()).collect());
        raw.push(name.to_lowercase());

        if let Some(p) = patterns {
            if p.cjk.is_match(name) && char_len(name) >= 2 {
                raw.push(last_chars(name, 2));
                if char_len(name) >= 3 {
                    raw.push(last_chars(name, 3));
                }
                let parts: Vec<&str> = p.name_separator.split(name).collect();
                if parts.len() > 1 && char_len(parts[0]) > 1 {
                    raw.push(parts[0].to_string());
                }
            }
            for token in p.token_separator.split(name) {
                if char_len(token) > 1 {
                    raw.push(token.to_string());
                    raw.push(token.to_lowercase());
                }
            }
        }
    }

    let mut seen = HashSet::new();
    raw.iter()
        .map(|variant| normalize(variant))
        .filter(|variant| !variant.is_empty() && seen.insert(variant.clone()))
        .collect()
}

/// Text following a "you are ..." lead-in, if the message opens with one.
fn strip_lead_in(text: &str) -> Option<&str> {
    let found = patterns()?.lead_in.find(text)?;
    let rest = &text[found.end()..];
    (!rest.trim().is_empty()).then_some(rest)
}

fn looks_like_guess(input: &str) -> bool {
    GUESS_KEYWORDS
        .iter()
        .any(|keyword| input.contains(&normalize(keyword)))
}

/// Share of `variant`'s characters that also occur somewhere in `input`.
fn char_overlap(input: &str, variant: &str) -> f64 {
    let matched = variant.chars().filter(|c| input.contains(*c)).count();
    ratio(matched, char_len(variant))
}

/// Whether `text` is a correct guess of `fingerprint`.
#[must_use]
pub fn is_correct_guess(text: &str, fingerprint: &CharacterFingerprint) -> bool {
    let text = text.trim_start();
    let input = normalize(text);
    let variants: Vec<String> = name_variants(fingerprint)
        .into_iter()
        .filter(|variant| char_len(variant) > 1)
        .collect();
    if variants.is_empty() {
        return false;
    }

    if let Some(rest) = strip_lead_in(text) {
        let named = normalize(rest);
        if variants
            .iter()
            .any(|v| named == *v || named.contains(v.as_str()))
        {
            return true;
        }
    }
    if variants.iter().any(|v| input == *v) {
        return true;
    }
    if variants
        .iter()
        .any(|v| input.starts_with(v.as_str()) || input.ends_with(v.as_str()))
    {
        return true;
    }
    if variants.iter().any(|v| input.contains(v.as_str())) {
        return true;
    }
    looks_like_guess(&input)
        && variants
            .iter()
            .any(|v| char_overlap(&input, v) > CHAR_BAG_THRESHOLD)
}
