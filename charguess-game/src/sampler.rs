//! Random candidate selection over the configured subject universe.
//!
//! A draw picks one offset uniformly over the ranked pool plus the overflow
//! list, fetches the ten-item page that contains it, then picks a character
//! from that subject's roster. Random numbers are taken under a short lock
//! on the sampler stream and never across a fetch.
use chrono::NaiveDate;
use rand::Rng;

use crate::api::{
    MetadataClient, RankedFilter, SubjectCharacter, SubjectHit, SubjectKind, SubjectRef,
};
use crate::clock::Clock;
use crate::config::{GameSettings, UniverseMode};
use crate::constants::{RANKED_PAGE_SIZE, ROLE_PROTAGONIST, ROLE_SUPPORTING};
use crate::error::GameError;
use crate::http::HttpTransport;
use crate::numbers::{u64_to_usize, usize_to_u64};
use crate::rng::RngBundle;

/// A subject and one of its characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub subject: SubjectRef,
    pub character: SubjectCharacter,
}

/// Where a drawn offset lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    /// Index into the overflow list.
    Overflow(usize),
    /// Page-aligned offset into the ranked pool and the position inside that page.
    Ranked { page_offset: u64, index_in_page: usize },
}

/// Map a uniform offset over `primary_total + overflow_len` onto a draw.
#[must_use]
pub fn plan_draw(offset: u64, primary_total: u64, overflow_len: usize) -> Draw {
    if offset >= primary_total && overflow_len > 0 {
        let index = u64_to_usize(offset - primary_total).min(overflow_len - 1);
        return Draw::Overflow(index);
    }
    let page_offset = (offset / RANKED_PAGE_SIZE) * RANKED_PAGE_SIZE;
    Draw::Ranked {
        page_offset,
        index_in_page: u64_to_usize(offset % RANKED_PAGE_SIZE),
    }
}

/// Position to take from a fetched page; short pages clamp to their last item.
#[must_use]
pub const fn pick_in_page(index: usize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if index < len { Some(index) } else { Some(len - 1) }
}

/// Characters eligible to be drawn from a roster.
#[must_use]
pub fn eligible_characters(
    roster: Vec<SubjectCharacter>,
    main_character_only: bool,
    character_num: usize,
) -> Vec<SubjectCharacter> {
    if main_character_only {
        return roster
            .into_iter()
            .filter(|c| c.relation == ROLE_PROTAGONIST)
            .collect();
    }
    roster
        .into_iter()
        .filter(|c| c.relation == ROLE_PROTAGONIST || c.relation == ROLE_SUPPORTING)
        .take(character_num)
        .collect()
}

/// Draws candidates according to [`GameSettings`].
pub struct CandidateSampler<'a, T> {
    client: &'a MetadataClient<T>,
    clock: &'a dyn Clock,
    settings: &'a GameSettings,
}

impl<'a, T: HttpTransport> CandidateSampler<'a, T> {
    pub fn new(
        client: &'a MetadataClient<T>,
        clock: &'a dyn Clock,
        settings: &'a GameSettings,
    ) -> Self {
        Self {
            client,
            clock,
            settings,
        }
    }

    /// Draw one subject and one of its eligible characters.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataUnavailable`] when the drawn page or roster is
    /// empty, and propagates fetch failures. Never retries internally.
    pub async fn sample(&self, rngs: &RngBundle) -> Result<Candidate, GameError> {
        let subject = self.draw_subject(rngs).await?;
        let roster = self.client.subject_characters(subject.id).await?;
        let pool = eligible_characters(
            roster,
            self.settings.main_character_only,
            self.settings.character_num,
        );
        if pool.is_empty() {
            return Err(GameError::DataUnavailable(format!(
                "subject {} has no eligible characters",
                subject.id
            )));
        }
        let pick = rngs.sampler().gen_range(0..pool.len());
        let character = pool[pick].clone();
        log::debug!(
            "sampled character {} from subject {}",
            character.id,
            subject.id
        );
        Ok(Candidate { subject, character })
    }

    async fn draw_subject(&self, rngs: &RngBundle) -> Result<SubjectRef, GameError> {
        let overflow = &self.settings.added_subjects;
        let overflow_len = overflow.len();
        let total_overflow = usize_to_u64(overflow_len);
        let today = self.clock.today();

        match &self.settings.universe {
            UniverseMode::Index { index_id } => {
                let info = self.client.index_info(*index_id).await?;
                let offset = draw_offset(rngs, info.total + total_overflow)?;
                match plan_draw(offset, info.total, overflow_len) {
                    Draw::Overflow(index) => overflow_pick(overflow, index),
                    Draw::Ranked {
                        page_offset,
                        index_in_page,
                    } => {
                        let page = self
                            .client
                            .index_subjects(*index_id, RANKED_PAGE_SIZE, page_offset)
                            .await?;
                        take_from_page(page.data, index_in_page)
                    }
                }
            }
            UniverseMode::PerYear => {
                let (start, end) = self.settings.year_window(today);
                let years = u64::try_from(end - start + 1).unwrap_or(1);
                let top_n = self.settings.top_n_subjects;
                let primary = top_n.saturating_mul(years);
                let offset = draw_offset(rngs, primary + total_overflow)?;
                if offset >= primary {
                    return overflow_pick(overflow, u64_to_usize(offset - primary));
                }
                let (year, within) = {
                    let mut rng = rngs.sampler();
                    (rng.gen_range(start..=end), rng.gen_range(0..top_n))
                };
                let filter = self.ranked_filter(year, year, today)?;
                self.ranked_pick(&filter, within).await
            }
            UniverseMode::TopRanked => {
                let (start, end) = self.settings.year_window(today);
                let top_n = self.settings.top_n_subjects;
                let offset = draw_offset(rngs, top_n + total_overflow)?;
                match plan_draw(offset, top_n, overflow_len) {
                    Draw::Overflow(index) => overflow_pick(overflow, index),
                    Draw::Ranked { .. } => {
                        let filter = self.ranked_filter(start, end, today)?;
                        self.ranked_pick(&filter, offset).await
                    }
                }
            }
        }
    }

    async fn ranked_pick(
        &self,
        filter: &RankedFilter,
        offset: u64,
    ) -> Result<SubjectRef, GameError> {
        let Draw::Ranked {
            page_offset,
            index_in_page,
        } = plan_draw(offset, u64::MAX, 0)
        else {
            return Err(GameError::DataUnavailable("ranked offset out of range".into()));
        };
        let page = self
            .client
            .search_ranked(filter, RANKED_PAGE_SIZE, page_offset)
            .await?;
        take_from_page(page.data, index_in_page)
    }

    /// Ranked search window from January 1st of `from_year` up to the start
    /// of the year after `to_year`, but never past today.
    fn ranked_filter(
        &self,
        from_year: i32,
        to_year: i32,
        today: NaiveDate,
    ) -> Result<RankedFilter, GameError> {
        let aired_from = january_first(from_year)?;
        let next_year = january_first(to_year + 1)?;
        Ok(RankedFilter {
            kinds: vec![SubjectKind::Anime],
            aired_from,
            aired_before: next_year.min(today),
            meta_tags: self.settings.required_meta_tags(),
        })
    }

    /// Subjects matching a keyword, anime and games only.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn search(&self, keyword: &str) -> Result<Vec<SubjectHit>, GameError> {
        if keyword.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.client.search_subjects(keyword).await
    }
}

fn draw_offset(rngs: &RngBundle, total: u64) -> Result<u64, GameError> {
    if total == 0 {
        return Err(GameError::DataUnavailable(
            "candidate universe is empty".into(),
        ));
    }
    Ok(rngs.sampler().gen_range(0..total))
}

fn overflow_pick(overflow: &[SubjectRef], index: usize) -> Result<SubjectRef, GameError> {
    overflow
        .get(index)
        .cloned()
        .ok_or_else(|| GameError::DataUnavailable(format!("overflow index {index} out of range")))
}

fn take_from_page(
    mut data: Vec<SubjectRef>,
    index_in_page: usize,
) -> Result<SubjectRef, GameError> {
    let index = pick_in_page(index_in_page, data.len())
        .ok_or_else(|| GameError::DataUnavailable("ranked page is empty".into()))?;
    Ok(data.swap_remove(index))
}

fn january_first(year: i32) -> Result<NaiveDate, GameError> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| GameError::DataUnavailable(format!("year {year} out of range")))
}
