//! Fusion CLI - binary entry point and line-driven front-end.
//!
//! # Architecture
//!
//! The CLI wires [`fusion_engine`] (sessions and commands) to a
//! [`fusion_store::SqliteStore`] and prints session cards to stdout.
//!
//! ```text
//! main() -> init_tracing() -> FusionConfig::load() -> SqliteStore::open()
//!        -> FusionCommands + TerminalChannel -> read stdin line -> Command
//! ```
//!
//! Logs go to a file so they never interleave with the cards.

mod terminal;

use std::{
    env,
    fs::{self, File, OpenOptions},
    io::{self, Write, stdout},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fusion_config::FusionConfig;
use fusion_engine::{
    AddOutcome, FusionCommands, FusionContext, FusionError, FusionOutcome, command_specs,
};
use fusion_store::{ExperienceLedger, ItemStore, LockRegistry, SqliteStore};
use fusion_types::{ItemId, NewItem, Participant, ScopeKey};

use terminal::{SharedInput, TerminalChannel, shared_stdin};

/// The terminal is a single conversation.
const LOCAL_SCOPE: ScopeKey = ScopeKey::new(0, 0);

/// Log to the first writable `logs/fusion.log` candidate. With none available
/// logging stays off, since stdout carries the cards.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut skipped = Vec::new();
    let opened = data_file_candidates(&["logs", "fusion.log"])
        .into_iter()
        .find_map(|path| match append_to(&path) {
            Ok(file) => Some((path, file)),
            Err(err) => {
                skipped.push(format!("{}: {err}", path.display()));
                None
            }
        });

    let Some((path, file)) = opened else {
        tracing_subscriber::registry().with(filter).init();
        return;
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter)
        .init();
    tracing::info!(path = %path.display(), "Fusion log opened");
    for location in skipped {
        tracing::warn!("Log location unusable, {location}");
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// `~/.fusion/<parts>` (next to the config file), then `./.fusion/<parts>`.
fn data_file_candidates(parts: &[&str]) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(config_path) = FusionConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(parts.iter().fold(config_dir.to_path_buf(), |p, s| p.join(s)));
    }
    candidates.push(
        parts
            .iter()
            .fold(PathBuf::from(".fusion"), |path, part| path.join(part)),
    );

    candidates
}

fn open_store() -> Result<SqliteStore> {
    let mut last_err = None;
    for candidate in data_file_candidates(&["fusion.db"]) {
        match SqliteStore::open(&candidate) {
            Ok(store) => {
                tracing::info!(path = %candidate.display(), "Item store opened");
                return Ok(store);
            }
            Err(err) => {
                tracing::warn!(path = %candidate.display(), "Failed to open item store: {err}");
                last_err = Some(err);
            }
        }
    }
    match last_err {
        Some(err) => Err(err).context("opening the item store"),
        None => anyhow::bail!("no location available for the item store"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Levels,
    Begin(i64),
    Add(ItemId),
    Remove(ItemId),
    Lock,
    Reset,
    Cancel,
    Confirm,
    Inventory,
    Grant { kind: String, count: usize },
    Quit,
}

/// Item ids are shown as `#2A`; accept them with or without the hash.
fn parse_item_id(raw: &str) -> Option<ItemId> {
    i64::from_str_radix(raw.trim_start_matches('#'), 16)
        .ok()
        .map(ItemId::new)
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err(String::new());
        };
        let arg = words.next();
        let command = match (name.to_ascii_lowercase().as_str(), arg) {
            ("help" | "?", _) => Command::Help,
            ("levels", _) => Command::Levels,
            ("begin", Some(level)) => Command::Begin(
                level
                    .parse()
                    .map_err(|_| format!("not a level: {level}"))?,
            ),
            ("add", Some(id)) => {
                Command::Add(parse_item_id(id).ok_or_else(|| format!("not an item id: {id}"))?)
            }
            ("remove", Some(id)) => {
                Command::Remove(parse_item_id(id).ok_or_else(|| format!("not an item id: {id}"))?)
            }
            ("lock", _) => Command::Lock,
            ("reset", _) => Command::Reset,
            ("cancel", _) => Command::Cancel,
            ("confirm", _) => Command::Confirm,
            ("inventory" | "inv", _) => Command::Inventory,
            ("grant", Some(kind)) => {
                let count = match words.next() {
                    Some(raw) => raw.parse().map_err(|_| format!("not a count: {raw}"))?,
                    None => 1,
                };
                Command::Grant {
                    kind: kind.to_string(),
                    count,
                }
            }
            ("q" | "quit" | "exit", _) => Command::Quit,
            (other, _) => return Err(format!("unknown command `{other}`, try `help`")),
        };
        Ok(command)
    }
}

struct Frontend {
    commands: FusionCommands,
    store: Arc<SqliteStore>,
    channel: Arc<TerminalChannel>,
    participant: Participant,
}

enum Flow {
    Continue,
    Quit,
}

impl Frontend {
    async fn execute(&self, command: Command) -> Result<Flow, FusionError> {
        let me = &self.participant;
        match command {
            Command::Help => {
                for spec in command_specs() {
                    println!("  {:<16} {}", spec.usage, spec.description);
                }
                println!("  {:<16} List the items you own", "inventory");
                println!("  {:<16} Create items of a kind for yourself", "grant <kind> [n]");
                println!("  {:<16} Leave", "quit");
            }
            Command::Levels => {
                for plan in self.commands.levels() {
                    match plan.input_tier {
                        Some(tier) => println!(
                            "  level {}: {} items of tier {tier} -> tier {}",
                            plan.level, plan.required, plan.result_tier
                        ),
                        None => println!(
                            "  level {}: {} items -> tier {}",
                            plan.level, plan.required, plan.result_tier
                        ),
                    }
                }
            }
            Command::Begin(level) => {
                self.commands
                    .begin(LOCAL_SCOPE, me.clone(), level, self.channel.clone())
                    .await?;
            }
            Command::Add(id) => match self.commands.add(LOCAL_SCOPE, me, id).await? {
                AddOutcome::Added(item) => println!("Added {}", item.description(false)),
                AddOutcome::Declined => println!("Left {id} out of the proposal"),
            },
            Command::Remove(id) => {
                let item = self.commands.remove(LOCAL_SCOPE, me, id).await?;
                println!("Removed {}", item.description(true));
            }
            Command::Lock => self.commands.lock(LOCAL_SCOPE, me).await?,
            Command::Reset => {
                let cleared = self.commands.reset(LOCAL_SCOPE, me).await?;
                println!("Removed {cleared} items from the proposal");
            }
            Command::Cancel => self.commands.cancel(LOCAL_SCOPE, me).await?,
            Command::Confirm => match self.commands.confirm(LOCAL_SCOPE, me).await? {
                FusionOutcome::Completed { item, experience } => {
                    println!("Fused into {} (+{experience} xp)", item.description(false));
                }
                FusionOutcome::Tampered { item } => {
                    println!("Fusion stopped: {item} changed owner");
                }
                FusionOutcome::Failed { reason } => println!("Fusion failed: {reason}"),
            },
            Command::Inventory => {
                let items = self.store.items_owned_by(me.id)?;
                if items.is_empty() {
                    println!("You own nothing yet, try `grant <kind> 10`");
                }
                for item in &items {
                    println!("  {}", item.description(false));
                }
                println!("Experience: {}", self.store.experience(me.id)?);
            }
            Command::Grant { kind, count } => {
                let kind = self.store.ensure_kind(&kind)?;
                for _ in 0..count {
                    self.store.create(&NewItem::plain(kind.id, me.id))?;
                }
                println!("Granted {count} {}", kind.name);
            }
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

async fn read_line(input: &SharedInput) -> Result<Option<String>> {
    print!("> ");
    stdout().flush().context("flushing prompt")?;
    input
        .lock()
        .await
        .next_line()
        .await
        .context("reading stdin")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Arc::new(FusionConfig::load().context("loading fusion config")?);
    let store = Arc::new(open_store()?);

    let name = env::var("USER")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "player".to_string());
    let participant = Participant::new(store.player_named(&name)?, name);

    let ctx = FusionContext::new(
        config,
        store.clone(),
        store.clone(),
        Arc::new(LockRegistry::new()),
    );
    let input = shared_stdin();
    let frontend = Frontend {
        commands: FusionCommands::new(ctx),
        store,
        channel: Arc::new(TerminalChannel::new(input.clone())),
        participant,
    };

    println!(
        "Hello {}, type `help` for commands.",
        frontend.participant.name
    );
    while let Some(line) = read_line(&input).await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match frontend.execute(command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) if err.is_validation() => println!("{err}"),
            Err(err) => {
                tracing::error!("Command failed: {err}");
                println!("Something went wrong: {err}");
            }
        }
    }

    if let Ok(session) = frontend
        .commands
        .session(LOCAL_SCOPE, &frontend.participant)
        .await
    {
        session.cancel("The fusion was abandoned").await;
    }
    Ok(())
}
