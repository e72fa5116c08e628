mod common;

use charguess_game::{CandidateSampler, Clock, GameSettings, SubjectRef, UniverseMode};
use common::{INDEX_ID, KAZUSA, SETSUNA, harness, settings, white_album};
use serde_json::json;

fn ranked_settings(universe: UniverseMode) -> GameSettings {
    GameSettings {
        universe,
        start_year: Some(2013),
        end_year: Some(2013),
        top_n_subjects: 3,
        ..settings()
    }
}

#[tokio::test]
async fn top_ranked_draws_clamp_to_short_pages() {
    let transport = white_album();
    // the catalog promises three subjects but serves one
    transport.route(
        "/v0/search/subjects?limit=10&offset=0",
        json!({"data": [SubjectRef::new(10, "subject-10")], "total": 1, "limit": 10, "offset": 0}),
    );
    let h = harness(&transport, ranked_settings(UniverseMode::TopRanked), 11);
    let today = h.engine.clock().today();
    assert_eq!(h.engine.settings().year_window(today), (2013, 2013));

    let sampler = CandidateSampler::new(h.engine.client(), h.engine.clock(), h.engine.settings());
    for _ in 0..10 {
        let candidate = sampler.sample(h.engine.rngs()).await.unwrap();
        assert_eq!(candidate.subject.id, 10);
        assert!([SETSUNA, KAZUSA].contains(&candidate.character.id));
    }
}

#[tokio::test]
async fn overflow_subjects_join_the_draw() {
    let transport = white_album();
    transport.index(&[]);
    let mut settings = settings();
    settings.added_subjects = vec![SubjectRef::new(10, "white album 2")];
    let h = harness(&transport, settings, 5);

    let round = h.engine.start_round("guild").await.unwrap();
    let id = round.character_id.unwrap();
    assert!([SETSUNA, KAZUSA].contains(&id));
    let page = format!("/v0/indices/{INDEX_ID}/subjects?limit=10&offset=0");
    assert_eq!(transport.calls_to(&page), 0);
}

#[tokio::test]
async fn keyword_search_skips_blank_input() {
    let transport = white_album();
    transport.route(
        "/v0/search/subjects",
        json!({"data": [{"id": 10, "name": "White Album 2", "name_cn": "白色相簿2", "type": 2}], "total": 1}),
    );
    let h = harness(&transport, settings(), 5);
    assert!(h.engine.search("   ").await.unwrap().is_empty());
    let hits = h.engine.search("白色相簿").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name_cn, "白色相簿2");
}
