mod chat;
mod play;
mod reports;
mod store;
mod transport;

use anyhow::{Context, Result, bail};
use charguess_game::{
    CharacterTagIndex, Clock, Conversations, FeedbackConfig, GameEngine, GameSettings, KvStore,
    RngBundle, SystemClock, TextGenerator, compare,
};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::io::{Write, stdin, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chat::HttpTextGenerator;
use play::{PlayOptions, PlayOutcome, Player};
use reports::{OutputTarget, ReportFormat};
use store::SqliteStore;
use transport::ReqwestTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Play rounds interactively in the terminal
    Play,
    /// Draw a random character and print its fingerprint
    Sample,
    /// Compare a guessed character against a target
    Compare,
    /// Show a group's all-time leaderboard
    Leaderboard,
    /// Show one player's statistics
    Stats,
    /// Show the weekly report, optionally resetting weekly scores
    Weekly,
    /// Search works by keyword
    Search,
}

#[derive(Debug, Parser)]
#[command(name = "charguess", version)]
#[command(about = "Guess the anime character - terminal front end for the charguess engine")]
struct Args {
    /// What to do
    #[arg(long, value_enum, default_value_t = Mode::Play)]
    mode: Mode,

    /// Game settings as JSON; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database holding rounds, scores and the request cache
    #[arg(long, default_value = "charguess.db")]
    store: PathBuf,

    /// Group (server) the rounds and scores belong to
    #[arg(long, default_value = "local")]
    group: String,

    /// Player name
    #[arg(long, default_value = "player")]
    user: String,

    /// Seed for reproducible draws
    #[arg(long)]
    seed: Option<u64>,

    /// Designated target character id (play, compare)
    #[arg(long)]
    character: Option<u64>,

    /// Guessed character id (compare)
    #[arg(long)]
    guess: Option<u64>,

    /// Search keyword (search)
    #[arg(long)]
    keyword: Option<String>,

    /// Rows shown by leaderboard and weekly
    #[arg(long, default_value_t = 10)]
    limit: usize,

    /// Clear weekly scores after printing the weekly report
    #[arg(long)]
    reset: bool,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the metadata API base URL
    #[arg(long)]
    api_base_url: Option<String>,

    /// OpenAI-compatible chat completion endpoint used by /ask
    #[arg(long)]
    chat_endpoint: Option<String>,

    /// Model name sent to the chat endpoint
    #[arg(long, default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Bearer key for the chat endpoint
    #[arg(long, env = "CHARGUESS_CHAT_KEY", hide_env_values = true)]
    chat_key: Option<String>,

    /// JSON map of character id to curated tags
    #[arg(long)]
    tag_index: Option<PathBuf>,
}

fn load_settings(args: &Args) -> Result<GameSettings> {
    let mut settings = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            GameSettings::from_json(&raw)
                .with_context(|| format!("invalid settings in {}", path.display()))?
        }
        None => GameSettings::default(),
    };
    if let Some(url) = &args.api_base_url {
        settings.api_base_url.clone_from(url);
    }
    Ok(settings)
}

fn load_tag_index(path: &Path) -> Result<CharacterTagIndex> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let index = CharacterTagIndex::from_json(&raw)
        .with_context(|| format!("invalid tag index in {}", path.display()))?;
    log::info!("loaded curated tags for {} characters", index.len());
    Ok(index)
}

fn build_engine(args: &Args, store: Arc<dyn KvStore>) -> Result<GameEngine<ReqwestTransport>> {
    let settings = load_settings(args)?;
    let rngs = args
        .seed
        .map_or_else(RngBundle::from_entropy, RngBundle::from_user_seed);
    log::debug!("rng seed {}", rngs.seed());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut engine = GameEngine::new(ReqwestTransport::new()?, store, clock, settings, rngs)?;
    if let Some(path) = &args.tag_index {
        engine = engine.with_tag_index(load_tag_index(path)?);
    }
    Ok(engine)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = SqliteStore::open(&args.store)
        .with_context(|| format!("failed to open store {}", args.store.display()))?;
    log::debug!("using store {}", store.path().display());
    let store: Arc<dyn KvStore> = Arc::new(store);
    let engine = build_engine(&args, Arc::clone(&store))?;

    if args.mode == Mode::Play {
        return run_play(&args, &engine, store).await;
    }

    let mut output = OutputTarget::new(args.output.clone())?;
    run_report(&args, &engine, &mut output).await?;
    output.flush()?;
    Ok(())
}

async fn run_play(
    args: &Args,
    engine: &GameEngine<ReqwestTransport>,
    store: Arc<dyn KvStore>,
) -> Result<()> {
    let generator = args
        .chat_endpoint
        .clone()
        .map(|endpoint| HttpTextGenerator::new(endpoint, args.chat_model.clone(), args.chat_key.clone()))
        .transpose()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let conversations = Conversations::new(store, clock);
    let player = Player::new(
        engine,
        &conversations,
        generator.as_ref().map(|g| g as &dyn TextGenerator),
        PlayOptions {
            group: args.group.clone(),
            user: args.user.clone(),
            character: args.character,
            format: args.report,
        },
    );

    let mut out = stdout();
    let outcome = player.run(stdin().lock(), &mut out).await?;
    if let PlayOutcome::Won(win) = &outcome {
        log::info!("round {} won by {}", win.round_id, win.solver);
    } else if outcome == PlayOutcome::Quit {
        writeln!(out, "{}", "Round left open; run again to resume.".dimmed())?;
    }
    Ok(())
}

async fn run_report(
    args: &Args,
    engine: &GameEngine<ReqwestTransport>,
    out: &mut OutputTarget,
) -> Result<()> {
    let format = args.report;
    match args.mode {
        Mode::Play => bail!("play mode is interactive"),
        Mode::Sample => {
            let fingerprint = engine.draw_character().await?;
            reports::write_fingerprint(out, &fingerprint, format)?;
        }
        Mode::Compare => {
            let (Some(target), Some(guess)) = (args.character, args.guess) else {
                bail!("compare mode needs both --character and --guess");
            };
            let target = engine.fingerprint(target).await?;
            let guessed = engine.fingerprint(guess).await?;
            let feedback = compare(&guessed, &target, &FeedbackConfig::from(engine.settings()));
            reports::write_feedback(out, &guessed, &feedback, format)?;
        }
        Mode::Leaderboard => {
            let entries = engine.scores().leaderboard(&args.group, args.limit).await?;
            reports::write_leaderboard(out, &args.group, &entries, format)?;
        }
        Mode::Stats => {
            let stats = engine.scores().user_stats(&args.group, &args.user).await?;
            reports::write_user_stats(out, &stats, format)?;
        }
        Mode::Weekly => {
            let report = engine.scores().weekly_report(&args.group, args.limit).await?;
            reports::write_weekly(out, &report, format)?;
            if args.reset {
                let cleared = engine.scores().reset_weekly(&args.group).await?;
                log::info!("cleared {cleared} weekly score(s) in group {}", args.group);
            }
        }
        Mode::Search => {
            let Some(keyword) = args.keyword.as_deref() else {
                bail!("search mode needs --keyword");
            };
            let hits = engine.search(keyword).await?;
            reports::write_hits(out, &hits, format)?;
        }
    }
    Ok(())
}
