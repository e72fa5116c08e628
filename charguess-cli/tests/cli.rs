use rusqlite::{Connection, params};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Command;

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "charguess-cli-{label}-{}.db",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    tbl TEXT NOT NULL, key TEXT NOT NULL, value TEXT NOT NULL, PRIMARY KEY (tbl, key)
)";

fn seeded_store(label: &str) -> PathBuf {
    let path = temp_path(label);
    let conn = Connection::open(&path).expect("open store");
    conn.execute_batch(SCHEMA).expect("create schema");
    let scores = [
        ("guild_local_user_alice_score", 3),
        ("guild_local_user_alice_weekly_score", 1),
        ("guild_local_user_alice_games", 6),
        ("guild_local_user_bob_score", 5),
        ("guild_local_user_bob_weekly_score", 2),
        ("guild_local_channel_terminal_usage", 9),
        ("guild_other_user_carol_score", 40),
    ];
    for (key, value) in scores {
        conn.execute(
            "INSERT INTO kv (tbl, key, value) VALUES ('scores', ?1, ?2)",
            params![key, value.to_string()],
        )
        .expect("seed score");
    }
    path
}

fn stored_score(path: &Path, key: &str) -> Option<Value> {
    let conn = Connection::open(path).expect("open store");
    let mut stmt = conn
        .prepare("SELECT value FROM kv WHERE tbl = 'scores' AND key = ?1")
        .expect("prepare");
    let mut rows = stmt.query(params![key]).expect("query");
    rows.next()
        .expect("row")
        .map(|row| serde_json::from_str(&row.get::<_, String>(0).expect("text")).expect("json"))
}

fn charguess() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_charguess"));
    command.env("NO_COLOR", "1");
    command
}

#[test]
fn leaderboard_json_ranks_group_scores() {
    let store = seeded_store("leaderboard");
    let report = temp_path("leaderboard-report");
    let status = charguess()
        .args(["--mode", "leaderboard", "--report", "json", "--store"])
        .arg(&store)
        .arg("--output")
        .arg(&report)
        .status()
        .expect("run cli");
    assert!(status.success());

    let content = std::fs::read_to_string(report).expect("read report");
    let entries: Value = serde_json::from_str(&content).expect("json report");
    assert_eq!(
        entries,
        json!([{"user": "bob", "score": 5}, {"user": "alice", "score": 3}])
    );
}

#[test]
fn stats_console_reports_accuracy() {
    let store = seeded_store("stats");
    let output = charguess()
        .args(["--mode", "stats", "--user", "alice", "--store"])
        .arg(&store)
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("score:        3"));
    assert!(stdout.contains("accuracy:     50.0%"));
}

#[test]
fn weekly_reset_clears_only_weekly_scores() {
    let store = seeded_store("weekly");
    let output = charguess()
        .args(["--mode", "weekly", "--reset", "--store"])
        .arg(&store)
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("busiest channel: terminal (9)"));

    assert_eq!(stored_score(&store, "guild_local_user_bob_weekly_score"), None);
    assert_eq!(stored_score(&store, "guild_local_user_bob_score"), Some(json!(5)));
}

#[test]
fn compare_without_guess_fails() {
    let store = temp_path("compare");
    let output = charguess()
        .args(["--mode", "compare", "--character", "1", "--store"])
        .arg(&store)
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--guess"));
}
