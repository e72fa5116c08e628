//! Typed client for the catalog's public metadata API.
//!
//! Every call goes through the [`RequestCache`], so repeated lookups of the
//! same subject or character within the TTL never reach the network.
pub mod models;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::cache::{CacheStats, RequestCache};
use crate::constants::{DEFAULT_API_BASE_URL, RANK_SORT_KEY};
use crate::error::GameError;
use crate::http::{HttpResponse, HttpTransport};

pub use models::{
    CharacterDetail, CharacterPerson, CharacterSubjectLink, IndexInfo, Page, SubjectCharacter,
    SubjectDetail, SubjectHit, SubjectKind, SubjectRef, SubjectTag,
};

/// Filter for the ranked subject search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedFilter {
    pub kinds: Vec<SubjectKind>,
    /// Inclusive lower bound of the air-date window.
    pub aired_from: NaiveDate,
    /// Exclusive upper bound of the air-date window.
    pub aired_before: NaiveDate,
    pub meta_tags: Vec<String>,
}

impl RankedFilter {
    fn to_body(&self) -> Value {
        let kinds: Vec<u8> = self.kinds.iter().map(|k| k.code()).collect();
        json!({
            "sort": RANK_SORT_KEY,
            "filter": {
                "type": kinds,
                "air_date": [
                    format!(">={}", self.aired_from.format("%Y-%m-%d")),
                    format!("<{}", self.aired_before.format("%Y-%m-%d")),
                ],
                "meta_tags": self.meta_tags,
            }
        })
    }
}

/// Cached, typed access to the metadata endpoints the engine uses.
pub struct MetadataClient<T> {
    cache: RequestCache<T>,
    base_url: String,
}

impl<T: HttpTransport> MetadataClient<T> {
    #[must_use]
    pub fn new(cache: RequestCache<T>) -> Self {
        Self::with_base_url(cache, DEFAULT_API_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(cache: RequestCache<T>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { cache, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn cache(&self) -> &RequestCache<T> {
        &self.cache
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn subject(&self, id: u64) -> Result<SubjectDetail, GameError> {
        self.get_json(&format!("/v0/subjects/{id}"), &[]).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn character(&self, id: u64) -> Result<CharacterDetail, GameError> {
        self.get_json(&format!("/v0/characters/{id}"), &[]).await
    }

    /// Subjects a character appears in, with the character's role in each.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn character_subjects(
        &self,
        id: u64,
    ) -> Result<Vec<CharacterSubjectLink>, GameError> {
        self.get_json(&format!("/v0/characters/{id}/subjects"), &[])
            .await
    }

    /// Voice actors (and other persons) credited for a character.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn character_persons(&self, id: u64) -> Result<Vec<CharacterPerson>, GameError> {
        self.get_json(&format!("/v0/characters/{id}/persons"), &[])
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn subject_characters(&self, id: u64) -> Result<Vec<SubjectCharacter>, GameError> {
        self.get_json(&format!("/v0/subjects/{id}/characters"), &[])
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn index_info(&self, id: u64) -> Result<IndexInfo, GameError> {
        self.get_json(&format!("/v0/indices/{id}"), &[]).await
    }

    /// One page of a curated index.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn index_subjects(
        &self,
        id: u64,
        limit: u64,
        offset: u64,
    ) -> Result<Page<SubjectRef>, GameError> {
        let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
        self.get_json(&format!("/v0/indices/{id}/subjects"), &query)
            .await
    }

    /// One page of the popularity-ranked subject search.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn search_ranked(
        &self,
        filter: &RankedFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Page<SubjectRef>, GameError> {
        let url = self.url("/v0/search/subjects");
        let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
        let response = self.cache.post(&url, &query, filter.to_body()).await?;
        decode(&url, response)
    }

    /// Keyword lookup across anime and games, used when players search for a work.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn search_subjects(&self, keyword: &str) -> Result<Vec<SubjectHit>, GameError> {
        let url = self.url("/v0/search/subjects");
        let body = json!({
            "keyword": keyword.trim(),
            "filter": {
                "type": [SubjectKind::Anime.code(), SubjectKind::Game.code()],
            }
        });
        let response = self.cache.post(&url, &[], body).await?;
        let page: Page<SubjectHit> = decode(&url, response)?;
        Ok(page.data)
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, GameError> {
        let url = self.url(path);
        let response = self.cache.get(&url, query).await?;
        decode(&url, response)
    }
}

fn decode<R: DeserializeOwned>(url: &str, response: HttpResponse) -> Result<R, GameError> {
    if !response.is_success() {
        return Err(GameError::Fetch {
            url: url.to_string(),
            status: response.status,
        });
    }
    serde_json::from_value(response.body).map_err(|source| GameError::Decode {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::http::{HttpRequest, TransportError};
    use crate::store::MemoryStore;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait::async_trait]
    impl HttpTransport for Recorder {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            if request.url.ends_with("/v0/subjects/404") {
                return Ok(HttpResponse {
                    status: 404,
                    headers: Vec::new(),
                    body: json!({"title": "Not Found"}),
                });
            }
            Ok(HttpResponse::ok(json!({
                "data": [{"id": 1, "name": "A"}],
                "total": 1,
                "limit": 10,
                "offset": 0
            })))
        }
    }

    fn client(recorder: &Arc<Recorder>) -> MetadataClient<Arc<Recorder>> {
        let cache = RequestCache::new(
            Arc::clone(recorder),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        );
        MetadataClient::with_base_url(cache, "https://api.test/")
    }

    #[tokio::test]
    async fn ranked_search_posts_filter_body() {
        let recorder = Arc::new(Recorder::default());
        let client = client(&recorder);
        let filter = RankedFilter {
            kinds: vec![SubjectKind::Anime],
            aired_from: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            aired_before: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
            meta_tags: vec!["日本".to_string()],
        };
        let page = client.search_ranked(&filter, 10, 20).await.unwrap();
        assert_eq!(page.data[0].id, 1);

        let seen = recorder.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.url, "https://api.test/v0/search/subjects");
        assert!(request.query.contains(&("offset".to_string(), "20".to_string())));
        let body = request.body.as_ref().unwrap();
        assert_eq!(body["sort"], "heat");
        assert_eq!(body["filter"]["type"], json!([2]));
        assert_eq!(
            body["filter"]["air_date"],
            json!([">=2015-01-01", "<2016-01-01"])
        );
    }

    #[tokio::test]
    async fn non_success_maps_to_fetch_error() {
        let recorder = Arc::new(Recorder::default());
        let client = client(&recorder);
        let err = client.subject(404).await.unwrap_err();
        assert!(matches!(err, GameError::Fetch { status: 404, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn shape_mismatch_maps_to_decode_error() {
        let recorder = Arc::new(Recorder::default());
        let client = client(&recorder);
        let err = client.character_subjects(3).await.unwrap_err();
        assert!(matches!(err, GameError::Decode { .. }));
    }
}
