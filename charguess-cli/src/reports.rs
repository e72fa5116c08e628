//! Console and JSON renderings of engine results.
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;

use anyhow::{Context, Result};
use charguess_game::feedback::Compared;
use charguess_game::{
    CharacterFingerprint, Clue, Feedback, Hint, LeaderboardEntry, RoundWin, SubjectHit, UserStats,
    Verdict, WeeklyReport,
};
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable, colored
    Console,
    /// Pretty-printed JSON
    Json,
}

pub enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn verdict_badge(verdict: Verdict) -> ColoredString {
    match verdict {
        Verdict::Equal => verdict.symbol().green().bold(),
        Verdict::Higher | Verdict::Lower => verdict.symbol().yellow(),
        Verdict::MuchHigher | Verdict::MuchLower => verdict.symbol().red(),
        Verdict::Unknown => verdict.symbol().dimmed(),
    }
}

fn or_unknown<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

pub fn write_fingerprint(
    out: &mut dyn Write,
    fingerprint: &CharacterFingerprint,
    format: ReportFormat,
) -> Result<()> {
    if format == ReportFormat::Json {
        return write_json(out, fingerprint);
    }
    writeln!(
        out,
        "{} {}",
        fingerprint.display_name().bright_cyan().bold(),
        format!("(#{}, {})", fingerprint.id, fingerprint.name).dimmed()
    )?;
    writeln!(out, "  gender:      {}", fingerprint.gender.label())?;
    writeln!(out, "  popularity:  {}", fingerprint.popularity)?;
    writeln!(out, "  rating:      {}", or_unknown(fingerprint.rating()))?;
    writeln!(
        out,
        "  years:       {} - {}",
        or_unknown(fingerprint.earliest_year()),
        or_unknown(fingerprint.latest_year())
    )?;
    writeln!(out, "  appearances: {}", fingerprint.appearances.join(", "))?;
    if !fingerprint.anime_vas.is_empty() {
        writeln!(out, "  voiced by:   {}", fingerprint.anime_vas.join(", "))?;
    }
    if !fingerprint.meta_tags.is_empty() {
        writeln!(out, "  tags:        {}", fingerprint.meta_tags.join(", "))?;
    }
    let raw: Vec<&str> = fingerprint.raw_tag_names().collect();
    if !raw.is_empty() {
        writeln!(out, "  raw tags:    {}", raw.join(", "))?;
    }
    Ok(())
}

fn feedback_row<T: ToString>(
    out: &mut dyn Write,
    label: &str,
    compared: &Compared<T>,
) -> std::io::Result<()> {
    writeln!(
        out,
        "  {label:<18} {:<8} {}",
        compared.guess.to_string(),
        verdict_badge(compared.feedback)
    )
}

pub fn write_feedback(
    out: &mut dyn Write,
    guessed: &CharacterFingerprint,
    feedback: &Feedback,
    format: ReportFormat,
) -> Result<()> {
    if format == ReportFormat::Json {
        return write_json(out, feedback);
    }
    writeln!(out, "{}", format!("Guess: {}", guessed.display_name()).bold())?;
    let gender = if feedback.gender.matches {
        "=".green().bold()
    } else {
        "x".red()
    };
    writeln!(out, "  {:<18} {:<8} {gender}", "gender", feedback.gender.guess.label())?;
    feedback_row(out, "popularity", &feedback.popularity)?;
    writeln!(
        out,
        "  {:<18} {:<8} {}",
        "rating",
        or_unknown(feedback.rating.guess),
        verdict_badge(feedback.rating.feedback)
    )?;
    feedback_row(out, "appearance count", &feedback.appearance_count)?;
    writeln!(
        out,
        "  {:<18} {:<8} {}",
        "earliest",
        or_unknown(feedback.earliest_appearance.guess),
        verdict_badge(feedback.earliest_appearance.feedback)
    )?;
    writeln!(
        out,
        "  {:<18} {:<8} {}",
        "latest",
        or_unknown(feedback.latest_appearance.guess),
        verdict_badge(feedback.latest_appearance.feedback)
    )?;
    let shared = &feedback.shared_appearances;
    writeln!(
        out,
        "  {:<18} {} {}",
        "shared works",
        shared.count,
        shared.first.as_deref().unwrap_or("")
    )?;
    let tags: Vec<String> = feedback
        .meta_tags
        .guess
        .iter()
        .map(|tag| {
            if feedback.meta_tags.shared.contains(tag) {
                tag.green().to_string()
            } else {
                tag.clone()
            }
        })
        .collect();
    writeln!(out, "  {:<18} {}", "tags", tags.join(", "))?;
    Ok(())
}

fn describe_clue(clue: &Clue) -> String {
    let initial = |c: &Option<char>| c.map_or_else(|| "?".to_string(), String::from);
    match clue {
        Clue::Years { earliest, latest } => format!(
            "appears between {} and {}",
            or_unknown(*earliest),
            or_unknown(*latest)
        ),
        Clue::VoiceActors { names } if names.is_empty() => "no known voice actors".to_string(),
        Clue::VoiceActors { names } => format!("voiced by {}", names.join(", ")),
        Clue::Appearances { titles } => format!("appears in {}", titles.join(", ")),
        Clue::Tags { tags } => format!("tagged {}", tags.join(", ")),
        Clue::Initial { initial: c } => format!("name starts with {}", initial(c)),
        Clue::InitialAndSummary { initial: c, excerpt } => {
            format!("name starts with {}; {excerpt}", initial(c))
        }
    }
}

pub fn write_hint(out: &mut dyn Write, hint: &Hint) -> Result<()> {
    let label = if hint.overflow {
        "Final hint".to_string()
    } else {
        format!("Hint {}", hint.level)
    };
    writeln!(out, "{}: {}", label.yellow().bold(), describe_clue(&hint.clue))?;
    Ok(())
}

pub fn write_win(out: &mut dyn Write, win: &RoundWin) -> Result<()> {
    writeln!(
        out,
        "{} {} guessed {} after {} hint(s). Score: {}",
        "✔".green().bold(),
        win.solver.bold(),
        win.fingerprint.display_name().bright_cyan(),
        win.hints_used,
        win.score
    )?;
    Ok(())
}

pub fn write_leaderboard(
    out: &mut dyn Write,
    group: &str,
    entries: &[LeaderboardEntry],
    format: ReportFormat,
) -> Result<()> {
    if format == ReportFormat::Json {
        return write_json(out, entries);
    }
    writeln!(out, "{}", format!("Leaderboard for {group}").bright_cyan().bold())?;
    if entries.is_empty() {
        writeln!(out, "  No scores yet.")?;
    }
    for (rank, entry) in entries.iter().enumerate() {
        writeln!(out, "  {:>2}. {:<24} {}", rank + 1, entry.user, entry.score)?;
    }
    Ok(())
}

pub fn write_user_stats(out: &mut dyn Write, stats: &UserStats, format: ReportFormat) -> Result<()> {
    if format == ReportFormat::Json {
        return write_json(out, stats);
    }
    writeln!(out, "{}", stats.user.bold())?;
    writeln!(out, "  score:        {}", stats.score)?;
    writeln!(out, "  this week:    {}", stats.weekly_score)?;
    writeln!(out, "  guesses:      {}", stats.attempts)?;
    writeln!(out, "  accuracy:     {:.1}%", stats.accuracy() * 100.0)?;
    Ok(())
}

pub fn write_weekly(out: &mut dyn Write, report: &WeeklyReport, format: ReportFormat) -> Result<()> {
    if format == ReportFormat::Json {
        return write_json(out, report);
    }
    writeln!(
        out,
        "{}",
        format!("Weekly report for {}", report.group).bright_cyan().bold()
    )?;
    if let Some(channel) = &report.busiest_channel {
        writeln!(out, "  busiest channel: {} ({})", channel.channel, channel.usage)?;
    }
    write_leaderboard(out, &report.group, &report.top_users, format)
}

pub fn write_hits(out: &mut dyn Write, hits: &[SubjectHit], format: ReportFormat) -> Result<()> {
    if format == ReportFormat::Json {
        return write_json(out, hits);
    }
    if hits.is_empty() {
        writeln!(out, "No matching works.")?;
    }
    for hit in hits {
        let title = if hit.name_cn.is_empty() {
            &hit.name
        } else {
            &hit.name_cn
        };
        writeln!(
            out,
            "  #{:<8} {} {}",
            hit.id,
            title,
            hit.date.as_deref().unwrap_or("").dimmed()
        )?;
    }
    Ok(())
}
