//! Scripted catalog shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use charguess_game::{
    Clock, GameEngine, GameSettings, HttpRequest, HttpResponse, HttpTransport, KvStore,
    ManualClock, MemoryStore, RngBundle, StoreError, SubjectRef, TransportError, UniverseMode,
};
use tokio::sync::oneshot;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

pub const BASE_URL: &str = "https://api.test";
pub const INDEX_ID: u64 = 77;

/// Answers requests from a fixed route table and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<String>>,
}

fn route_key(request: &HttpRequest) -> String {
    let path = request.url.strip_prefix(BASE_URL).unwrap_or(&request.url);
    if request.query.is_empty() {
        return path.to_string();
    }
    let query: Vec<String> = request
        .query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    format!("{path}?{}", query.join("&"))
}

impl ScriptedTransport {
    pub fn route(&self, key: &str, body: Value) {
        self.routes.lock().unwrap().insert(key.to_string(), body);
    }

    pub fn calls_to(&self, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == key)
            .count()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let key = route_key(request);
        self.calls.lock().unwrap().push(key.clone());
        let body = self.routes.lock().unwrap().get(&key).cloned();
        Ok(body.map_or_else(
            || HttpResponse {
                status: 404,
                headers: Vec::new(),
                body: json!({"title": "Not Found", "path": key}),
            },
            HttpResponse::ok,
        ))
    }
}

pub struct Character<'a> {
    pub id: u64,
    pub name: &'a str,
    pub name_cn: &'a str,
    pub gender: &'a str,
    pub collects: u64,
    pub roles: &'a [(u64, &'a str)],
    pub voice_actors: &'a [&'a str],
}

impl ScriptedTransport {
    pub fn character(&self, c: &Character<'_>) {
        self.route(
            &format!("/v0/characters/{}", c.id),
            json!({
                "id": c.id,
                "name": c.name,
                "gender": c.gender,
                "summary": format!("{} is a character used in tests.", c.name),
                "stat": {"collects": c.collects, "comments": 0},
                "infobox": [{"key": "简体中文名", "value": c.name_cn}],
            }),
        );
        let links: Vec<Value> = c
            .roles
            .iter()
            .map(|(subject, staff)| json!({"id": subject, "name": "", "staff": staff, "type": 2}))
            .collect();
        self.route(&format!("/v0/characters/{}/subjects", c.id), Value::Array(links));
        let persons: Vec<Value> = c
            .voice_actors
            .iter()
            .enumerate()
            .map(|(i, name)| json!({"id": 900 + i, "name": name, "subject_id": 1, "subject_type": 2}))
            .collect();
        self.route(&format!("/v0/characters/{}/persons", c.id), Value::Array(persons));
    }

    pub fn subject(&self, id: u64, name_cn: &str, date: &str, score: f64, total: u64, tags: &[(&str, u64)]) {
        let tags: Vec<Value> = tags
            .iter()
            .map(|(name, count)| json!({"name": name, "count": count}))
            .collect();
        self.route(
            &format!("/v0/subjects/{id}"),
            json!({
                "id": id,
                "name": format!("subject-{id}"),
                "name_cn": name_cn,
                "date": date,
                "type": 2,
                "tags": tags,
                "meta_tags": ["日本", "TV"],
                "rating": {"score": score, "total": total},
            }),
        );
    }

    pub fn roster(&self, subject: u64, characters: &[(u64, &str)]) {
        let roster: Vec<Value> = characters
            .iter()
            .map(|(id, relation)| json!({"id": id, "name": format!("c{id}"), "relation": relation}))
            .collect();
        self.route(&format!("/v0/subjects/{subject}/characters"), Value::Array(roster));
    }

    pub fn index(&self, subjects: &[u64]) {
        self.route(
            &format!("/v0/indices/{INDEX_ID}"),
            json!({"id": INDEX_ID, "title": "test index", "total": subjects.len()}),
        );
        let data: Vec<SubjectRef> = subjects
            .iter()
            .map(|id| SubjectRef::new(*id, format!("subject-{id}")))
            .collect();
        self.route(
            &format!("/v0/indices/{INDEX_ID}/subjects?limit=10&offset=0"),
            json!({"data": data, "total": subjects.len(), "limit": 10, "offset": 0}),
        );
    }
}

pub const SETSUNA: u64 = 100;
pub const KAZUSA: u64 = 101;
pub const FUTURE_ONLY: u64 = 200;

/// Two usable heroines in one subject, plus a subject whose only lead
/// appears exclusively in an unaired work.
pub fn white_album() -> Arc<ScriptedTransport> {
    let transport = Arc::new(ScriptedTransport::default());
    transport.subject(
        10,
        "白色相簿2",
        "2013-10-06",
        8.1,
        5000,
        &[("恋爱", 900), ("GAL改", 400), ("2013年10月", 100), ("音乐", 300)],
    );
    transport.subject(11, "白色相簿2 剧场版", "2016-02-01", 7.2, 800, &[("恋爱", 200)]);
    transport.subject(21, "未来作品", "2099-01-01", 0.0, 0, &[]);
    transport.roster(10, &[(SETSUNA, "主角"), (KAZUSA, "主角"), (102, "客串")]);
    transport.roster(20, &[(FUTURE_ONLY, "主角")]);
    transport.index(&[10, 20]);
    transport.character(&Character {
        id: SETSUNA,
        name: "小木曽雪菜",
        name_cn: "小木曾雪菜",
        gender: "female",
        collects: 3000,
        roles: &[(10, "主角"), (11, "配角")],
        voice_actors: &["米泽圆"],
    });
    transport.character(&Character {
        id: KAZUSA,
        name: "冬馬かずさ",
        name_cn: "冬马和纱",
        gender: "female",
        collects: 3200,
        roles: &[(10, "主角")],
        voice_actors: &["生天目仁美"],
    });
    transport.character(&Character {
        id: FUTURE_ONLY,
        name: "Mirai",
        name_cn: "未来",
        gender: "male",
        collects: 10,
        roles: &[(21, "主角")],
        voice_actors: &[],
    });
    transport
}

pub fn settings() -> GameSettings {
    GameSettings {
        api_base_url: BASE_URL.to_string(),
        universe: UniverseMode::Index { index_id: INDEX_ID },
        max_attempts: 30,
        ..GameSettings::default()
    }
}

pub struct Harness {
    pub engine: GameEngine<Arc<ScriptedTransport>>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

pub fn engine_over(
    transport: &Arc<ScriptedTransport>,
    store: Arc<dyn KvStore>,
    clock: &Arc<ManualClock>,
    settings: GameSettings,
    seed: u64,
) -> GameEngine<Arc<ScriptedTransport>> {
    GameEngine::new(
        Arc::clone(transport),
        store,
        Arc::clone(clock) as Arc<dyn Clock>,
        settings,
        RngBundle::from_user_seed(seed),
    )
    .unwrap()
}

pub fn harness(transport: &Arc<ScriptedTransport>, settings: GameSettings, seed: u64) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = clock();
    let engine = engine_over(
        transport,
        Arc::clone(&store) as Arc<dyn KvStore>,
        &clock,
        settings,
        seed,
    );
    Harness {
        engine,
        store,
        clock,
    }
}

/// Holds the first swap that marks a round solved until a second one has
/// gone through and its round record has been deleted, so two winning
/// guesses interleave deterministically.
pub struct GatedStore {
    inner: MemoryStore,
    solves: Mutex<usize>,
    held: Mutex<Option<oneshot::Receiver<()>>>,
    release: Mutex<Option<oneshot::Sender<()>>>,
}

impl Default for GatedStore {
    fn default() -> Self {
        let (release, held) = oneshot::channel();
        Self {
            inner: MemoryStore::new(),
            solves: Mutex::new(0),
            held: Mutex::new(Some(held)),
            release: Mutex::new(Some(release)),
        }
    }
}

#[async_trait::async_trait]
impl KvStore for GatedStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(table, key).await
    }

    async fn set(&self, table: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(table, key, value).await
    }

    async fn set_if_absent(&self, table: &str, key: &str, value: Value) -> Result<bool, StoreError> {
        self.inner.set_if_absent(table, key, value).await
    }

    async fn compare_and_swap(
        &self,
        table: &str,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        if new.get("is_solved") != Some(&Value::Bool(true)) {
            return self.inner.compare_and_swap(table, key, expected, new).await;
        }
        let nth = {
            let mut solves = self.solves.lock().unwrap();
            *solves += 1;
            *solves
        };
        if nth == 1 {
            let held = self.held.lock().unwrap().take();
            if let Some(held) = held {
                let _ = held.await;
            }
            return self.inner.compare_and_swap(table, key, expected, new).await;
        }
        self.inner.compare_and_swap(table, key, expected, new).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError> {
        let deleted = self.inner.delete(table, key).await;
        if *self.solves.lock().unwrap() >= 2 {
            if let Some(release) = self.release.lock().unwrap().take() {
                let _ = release.send(());
            }
        }
        deleted
    }

    async fn delete_all(&self, table: &str) -> Result<(), StoreError> {
        self.inner.delete_all(table).await
    }

    async fn increment(&self, table: &str, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.inner.increment(table, key, delta).await
    }

    async fn entries(&self, table: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.inner.entries(table).await
    }
}
