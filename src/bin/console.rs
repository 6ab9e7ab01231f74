//! chatgames-console - play the mini-games from a terminal
//!
//! Reads `<user> <command>` lines from stdin, e.g. `alice !trivia` or
//! `bob !answer tokyo`, and prints replies and announcements to stdout.
//! Every line is handled on its own task so a slow command (a trivia start,
//! the 8-ball) never holds up the next one.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chatgames::{
    Announcement,
    config::Options,
    coordinator::Coordinator,
    participant::{Id, ScopeKey},
    persona::Persona,
    questions::Source,
    round_id::RoundId,
    session::{Announcer, CollaboratorError, IdentityResolver, KnowledgeEntry, KnowledgeStore},
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chatgames-console", about = "Play chat mini-games in a terminal")]
struct Args {
    /// JSON file with engine options (durations in milliseconds)
    #[arg(long, env = "CHATGAMES_OPTIONS")]
    options: Option<PathBuf>,

    /// Persona card whose activity_responses flavor the replies
    #[arg(long, env = "CHATGAMES_PERSONA")]
    persona: Option<PathBuf>,

    /// Channel the console plays in
    #[arg(long, default_value_t = 1)]
    scope: u64,
}

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Trivia(Option<Source>),
    Answer(String),
    NumberGuess(Option<i64>),
    Guess(String),
    Rps(String),
    RpsRound,
    Magic8Ball(String),
    Leaderboard,
    Score,
    Reset,
    Finish(RoundId),
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match name.to_lowercase().as_str() {
        "!trivia" => Command::Trivia(match rest.to_lowercase().as_str() {
            "generative" => Some(Source::Generative),
            "knowledge" => Some(Source::Knowledge),
            "static" => Some(Source::Static),
            _ => None,
        }),
        "!answer" => Command::Answer(rest.to_owned()),
        "!game" => {
            let mut words = rest.split_whitespace();
            if !words.next()?.eq_ignore_ascii_case("guess") {
                return None;
            }
            Command::NumberGuess(words.next().and_then(|max| max.parse().ok()))
        }
        "!guess" => Command::Guess(rest.to_owned()),
        "!rps" => Command::Rps(rest.to_owned()),
        "!rock" | "!paper" | "!scissors" => Command::Rps(name[1..].to_owned()),
        "!rps-round" => Command::RpsRound,
        "!8ball" => Command::Magic8Ball(rest.to_owned()),
        "!leaderboard" => Command::Leaderboard,
        "!score" => Command::Score,
        "!reset" => Command::Reset,
        "!finish" => Command::Finish(rest.parse().ok()?),
        _ => return None,
    };
    Some(command)
}

/// Console users, identified by the name they type
#[derive(Default)]
struct Directory {
    ids: Mutex<HashMap<String, Id>>,
}

impl Directory {
    fn id_of(&self, name: &str) -> Id {
        let mut ids = self.ids.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let next = Id::new(ids.len() as u64 + 1);
        *ids.entry(name.to_lowercase()).or_insert(next)
    }
}

#[async_trait]
impl IdentityResolver for Directory {
    async fn display_name(&self, participant: Id) -> Result<String, CollaboratorError> {
        let ids = self.ids.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        ids.iter()
            .find(|(_, id)| **id == participant)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| CollaboratorError::Failed(format!("unknown participant {participant}")))
    }
}

struct Stdout;

#[async_trait]
impl Announcer for Stdout {
    async fn announce(
        &self,
        scope: ScopeKey,
        announcement: &Announcement,
    ) -> Result<(), CollaboratorError> {
        println!("[{scope} #{}] {}", announcement.round_id(), announcement.text());
        Ok(())
    }
}

/// Knowledge kept for the lifetime of the process
#[derive(Default)]
struct MemoryKnowledge {
    categories: Mutex<HashMap<String, Vec<KnowledgeEntry>>>,
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledge {
    async fn random_entry(
        &self,
        category: &str,
    ) -> Result<Option<KnowledgeEntry>, CollaboratorError> {
        let categories = self
            .categories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(categories
            .get(category)
            .filter(|entries| !entries.is_empty())
            .map(|entries| entries[fastrand::usize(..entries.len())].clone()))
    }

    async fn add_entry(
        &self,
        category: &str,
        entry: KnowledgeEntry,
    ) -> Result<(), CollaboratorError> {
        let mut categories = self
            .categories
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries = categories.entry(category.to_owned()).or_default();
        if !entries
            .iter()
            .any(|known| known.key_term.eq_ignore_ascii_case(&entry.key_term))
        {
            entries.push(entry);
        }
        Ok(())
    }
}

async fn run_command(games: &Coordinator, user: Id, scope: ScopeKey, command: Command) -> String {
    let result = match command {
        Command::Trivia(source) => games.start_trivia(user, scope, source).await,
        Command::NumberGuess(max) => games.start_number_guess(user, scope, max).await,
        Command::RpsRound => games.start_rps_round(user, scope).await,
        Command::Answer(text) => Ok(games.answer(user, scope, &text).await),
        Command::Guess(text) => Ok(games.submit_guess(user, scope, &text).await),
        Command::Rps(choice) => Ok(games.play_rps(user, scope, &choice).await),
        Command::Magic8Ball(question) => Ok(games.magic_8ball(&question).await),
        Command::Leaderboard => Ok(games.standings(scope).await),
        Command::Score => Ok(games.score(user, scope).await),
        Command::Reset => Ok(games.reset(scope).await),
        Command::Finish(round_id) => Ok(match games.finish_round(round_id).await {
            Some(_) => format!("Round #{round_id} finished."),
            None => format!("Round #{round_id} is not running."),
        }),
    };

    result.unwrap_or_else(|error| {
        warn!(%error, "command failed");
        format!("Something went wrong: {error}")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let options = match &args.options {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading options from {}", path.display()))?;
            Options::from_json(&json).context("loading options")?
        }
        None => Options::default(),
    };
    let persona = match &args.persona {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading persona from {}", path.display()))?;
            Persona::from_json(&json).context("loading persona card")?
        }
        None => Persona::default(),
    };

    let directory = Arc::new(Directory::default());
    let games = Coordinator::builder(Arc::new(Stdout), directory.clone())
        .options(options)
        .persona(persona)
        .knowledge(Arc::new(MemoryKnowledge::default()))
        .build()?;
    let scope = ScopeKey::new(args.scope);

    info!(%scope, "console ready, type `<name> <command>`");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some((user, text)) = line.trim().split_once(' ') else {
            continue;
        };
        let Some(command) = parse_command(text) else {
            println!("Unknown command: {}", text.trim());
            continue;
        };

        let user = directory.id_of(user);
        let games = games.clone();
        tokio::spawn(async move {
            println!("{}", run_command(&games, user, scope, command).await);
        });
    }

    Ok(())
}
