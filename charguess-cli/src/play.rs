//! Interactive terminal rounds.
use std::io::{BufRead, Write};

use anyhow::{Result, anyhow};
use charguess_game::{
    Conversations, GameEngine, GameError, GuessOutcome, HttpTransport, Reply, RoundPhase,
    RoundWin, SessionRecord, TextGenerator,
};
use colored::Colorize;

use crate::reports::{self, ReportFormat};

/// Channel name recorded for activity typed into the terminal.
const TERMINAL_CHANNEL: &str = "terminal";

const HELP: &str = "\
Type a name to guess, or one of:
  /hint         reveal the next clue
  /guess <id>   name a character by id and compare attributes
  /ask <text>   talk to the character (needs a chat model)
  /skip         give up and reveal the answer
  /quit         leave; the round stays open for later";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOptions {
    pub group: String,
    pub user: String,
    /// Designated target; ignored when resuming an open round.
    pub character: Option<u64>,
    pub format: ReportFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Won(Box<RoundWin>),
    Skipped,
    /// Someone else finished the round first.
    Ended,
    Quit,
}

enum Command<'a> {
    Help,
    Hint,
    Skip,
    Quit,
    Ask(&'a str),
    Compare(&'a str),
    Guess(&'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    Some(match head {
        "/help" => Command::Help,
        "/hint" => Command::Hint,
        "/skip" => Command::Skip,
        "/quit" | "/exit" => Command::Quit,
        "/ask" => Command::Ask(rest),
        "/guess" => Command::Compare(rest),
        _ => Command::Guess(line),
    })
}

pub struct Player<'a, T> {
    engine: &'a GameEngine<T>,
    conversations: &'a Conversations,
    generator: Option<&'a dyn TextGenerator>,
    options: PlayOptions,
}

impl<'a, T: HttpTransport> Player<'a, T> {
    pub fn new(
        engine: &'a GameEngine<T>,
        conversations: &'a Conversations,
        generator: Option<&'a dyn TextGenerator>,
        options: PlayOptions,
    ) -> Self {
        Self {
            engine,
            conversations,
            generator,
            options,
        }
    }

    /// Start a round, or pick up the one already open in the group.
    async fn begin(&self, out: &mut dyn Write) -> Result<SessionRecord> {
        let group = &self.options.group;
        let started = match self.options.character {
            Some(id) => self.engine.start_round_with(group, id).await,
            None => self.engine.start_round(group).await,
        };
        match started {
            Ok(record) => {
                writeln!(out, "Round {} started. /help lists commands.", record.round_id)?;
                Ok(record)
            }
            Err(GameError::SessionConflict { .. }) => {
                let record = self
                    .engine
                    .current_session(group)
                    .await?
                    .filter(|record| record.phase == RoundPhase::AwaitingGuess)
                    .ok_or_else(|| anyhow!("a round is still being drawn in group {group}"))?;
                writeln!(
                    out,
                    "Resuming round {} ({} hint(s) used).",
                    record.round_id, record.hint_level
                )?;
                Ok(record)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run one round until it is won, skipped, ended elsewhere or the input closes.
    pub async fn run<R: BufRead>(&self, input: R, out: &mut dyn Write) -> Result<PlayOutcome> {
        let record = self.begin(out).await?;
        let group = self.options.group.as_str();
        if self.generator.is_some()
            && let Some(target) = &record.fingerprint
            && self.conversations.load(group).await?.is_none()
        {
            self.conversations.open(group, target).await?;
        }
        out.flush()?;

        for line in input.lines() {
            let line = line?;
            let Some(command) = parse_command(&line) else {
                continue;
            };
            self.engine
                .scores()
                .record_channel_activity(group, TERMINAL_CHANNEL)
                .await?;
            let step = self.step(command, out).await;
            out.flush()?;
            match step {
                Ok(Some(outcome)) => return self.finish(outcome).await,
                Ok(None) => {}
                Err(GameError::AlreadySolved { .. } | GameError::NoSession { .. }) => {
                    writeln!(out, "This round is over.")?;
                    return self.finish(PlayOutcome::Ended).await;
                }
                Err(GameError::Generation(err)) => {
                    log::warn!("chat generation failed: {err}");
                    writeln!(out, "{}", "The character is lost for words.".dimmed())?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(PlayOutcome::Quit)
    }

    async fn finish(&self, outcome: PlayOutcome) -> Result<PlayOutcome> {
        if outcome != PlayOutcome::Quit {
            self.conversations.close(&self.options.group).await?;
        }
        Ok(outcome)
    }

    async fn step(
        &self,
        command: Command<'_>,
        out: &mut dyn Write,
    ) -> Result<Option<PlayOutcome>, GameError> {
        let group = self.options.group.as_str();
        let user = self.options.user.as_str();
        match command {
            Command::Help => {
                say(out, format_args!("{HELP}"));
            }
            Command::Quit => return Ok(Some(PlayOutcome::Quit)),
            Command::Hint => {
                let hint = self.engine.request_hint(group).await?;
                print_report(reports::write_hint(out, &hint));
            }
            Command::Skip => {
                let record = self.engine.skip_round(group).await?;
                let answer = record
                    .fingerprint
                    .as_ref()
                    .map_or("an undrawn character", |target| target.display_name());
                say(out, format_args!("The answer was {}.", answer.bright_cyan()));
                return Ok(Some(PlayOutcome::Skipped));
            }
            Command::Ask(text) => {
                let Some(generator) = self.generator else {
                    say(out, format_args!("No chat model configured."));
                    return Ok(None);
                };
                match self
                    .conversations
                    .respond(group, user, text, generator)
                    .await?
                {
                    Reply::Spoken(reply) => {
                        say(out, format_args!("{} {reply}", ">".magenta()));
                    }
                    Reply::CoolingDown(wait) => {
                        say(out, format_args!("Wait {}s before asking again.", wait.num_seconds().max(1)));
                    }
                }
            }
            Command::Compare(raw) => {
                let Ok(character_id) = raw.parse::<u64>() else {
                    say(out, format_args!("Usage: /guess <character id>"));
                    return Ok(None);
                };
                let guess = self
                    .engine
                    .submit_character_guess(group, user, character_id)
                    .await?;
                print_report(reports::write_feedback(
                    out,
                    &guess.guessed,
                    &guess.feedback,
                    self.options.format,
                ));
                return Ok(self.settle(guess.outcome, out));
            }
            Command::Guess(text) => {
                let outcome = self.engine.submit_guess(group, user, text).await?;
                return Ok(self.settle(outcome, out));
            }
        }
        Ok(None)
    }

    fn settle(&self, outcome: GuessOutcome, out: &mut dyn Write) -> Option<PlayOutcome> {
        match outcome {
            GuessOutcome::Correct(win) => {
                print_report(reports::write_win(out, &win));
                Some(PlayOutcome::Won(win))
            }
            GuessOutcome::Incorrect => {
                say(out, format_args!("Not quite."));
                None
            }
        }
    }
}

/// Terminal write failures are not round failures.
fn say(out: &mut dyn Write, line: std::fmt::Arguments<'_>) {
    if let Err(err) = writeln!(out, "{line}") {
        log::warn!("failed to write to terminal: {err}");
    }
}

fn print_report(result: Result<()>) {
    if let Err(err) = result {
        log::warn!("failed to write report: {err:#}");
    }
}
