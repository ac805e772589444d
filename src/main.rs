//! Strictly Guess - terminal front end
//!
//! Plays a session on stdin/stdout and manages the local database.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use strictly_guess::{
    CatalogContentStore, Collaborators, EngineConfig, EngineError, EngineEvent, GameRepository,
    Guess, HttpLeaderboardClient, LeaderboardService, Phase, SessionHandle, SessionRunner,
    SessionState, SkipOutcome, SqliteBackend,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    initialize_tracing();

    let cli = Cli::parse();

    match cli.command {
        Command::Play {
            name,
            config,
            catalog,
            db_path,
            leaderboard_url,
        } => run_play(name, config, catalog, db_path, leaderboard_url).await,
        Command::Leaderboard { db_path, top, json } => run_leaderboard(db_path, top, json),
        Command::Migrate { db_path } => run_migrate(db_path),
    }
}

/// Logs go to stderr so they never interleave with the game on stdout.
fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,strictly_guess=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[instrument(skip_all, fields(config_path = %config_path.display()))]
fn load_config(config_path: &std::path::Path) -> Result<EngineConfig> {
    if config_path.exists() {
        Ok(EngineConfig::from_file(config_path)?)
    } else {
        info!("Config file not found, using defaults");
        Ok(EngineConfig::default())
    }
}

#[instrument(skip_all, fields(name = %name, db_path = %db_path))]
async fn run_play(
    name: String,
    config_path: std::path::PathBuf,
    catalog: std::path::PathBuf,
    db_path: String,
    leaderboard_url: Option<String>,
) -> Result<()> {
    let config = load_config(&config_path)?;
    let content = CatalogContentStore::from_file(&catalog)
        .with_context(|| format!("Loading catalog {}", catalog.display()))?;

    let repository = GameRepository::new(db_path)?;
    repository.run_migrations()?;
    let backend = Arc::new(SqliteBackend::new(repository));

    let leaderboard: Arc<dyn LeaderboardService> = match leaderboard_url {
        Some(url) => Arc::new(HttpLeaderboardClient::new(url)),
        None => backend.clone(),
    };

    let collaborators = Collaborators {
        content: Arc::new(content),
        backend: backend.clone(),
        identity: backend,
    };
    let (handle, task) = SessionRunner::spawn(config, collaborators, Some(leaderboard))?;

    let printer = tokio::spawn(print_events(handle.subscribe()));
    let watcher = tokio::spawn(print_state(handle.clone()));

    match handle.start_session(&name).await {
        Ok(()) => {
            println!("Welcome, {}! Type your guess, or /hint /skip /pause /resume /retry /quit.", name);
            input_loop(&handle).await?;
        }
        Err(e) => println!("Could not start: {}", e),
    }

    if let Err(e) = handle.quit().await {
        warn!(error = %e, "Runner already stopped");
    }
    let report = task.await.context("Session task panicked")?;
    printer.abort();
    watcher.abort();
    info!(delivered = report.delivered(), dropped = report.dropped(), "Session closed");
    if *report.dropped() > 0 {
        println!("Warning: {} records could not be saved.", report.dropped());
    }
    Ok(())
}

async fn input_loop(handle: &SessionHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = handle.watch();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = state.wait_for(SessionState::is_over) => break,
        };
        let outcome = match line.trim() {
            "/quit" => break,
            "/hint" => handle.request_hint().await.map(|hint| println!("Hint: {}", hint)),
            "/skip" => handle.skip_item().await.map(|outcome| {
                if let SkipOutcome::SessionEnded(reason) = outcome {
                    println!("Nothing left to skip to ({}).", reason);
                }
            }),
            "/pause" => handle.pause().await.map(|()| println!("Paused.")),
            "/resume" => handle.resume().await.map(|()| println!("Resumed.")),
            "/retry" => handle.retry_content().await,
            raw => match Guess::parse(raw) {
                Ok(guess) => handle.submit_guess(guess).await.map(|result| {
                    println!("{}", result.verdict());
                }),
                Err(e) => {
                    println!("{}", e);
                    Ok(())
                }
            },
        };
        match outcome {
            Ok(()) => {}
            Err(EngineError::SessionOver | EngineError::RunnerStopped) => break,
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::StageCompleted { reward, stage }) => {
                println!("Stage {} complete! You earned a {}.", stage, reward);
            }
            Ok(EngineEvent::SessionEnded { final_score, reason }) => {
                println!("Game over ({}). Final score: {}", reason, final_score);
            }
            Ok(EngineEvent::RankChanged { rank, score }) => {
                println!("You're #{} on the leaderboard with {} points.", rank, score);
            }
            Ok(EngineEvent::RankUp { current, delta, .. }) => {
                println!("Up {} place(s) to #{}!", delta, current);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn print_state(handle: SessionHandle) {
    let mut state = handle.watch();
    let mut shown: Option<(Phase, Option<String>, Option<String>)> = None;
    while state.changed().await.is_ok() {
        let snapshot: SessionState = state.borrow_and_update().clone();
        let key = (
            *snapshot.phase(),
            snapshot.current_item().as_ref().map(|item| item.id().clone()),
            snapshot.message().clone(),
        );
        if shown.as_ref() == Some(&key) {
            continue;
        }
        shown = Some(key);

        match snapshot.phase() {
            Phase::Active => {
                if let Some(message) = snapshot.message() {
                    println!("{} (playing on with what is left; type /retry)", message);
                }
                if let Some(item) = snapshot.current_item() {
                    println!(
                        "[stage {} | score {} | streak {} | tries {} | {}s] {} {}",
                        snapshot.stage(),
                        snapshot.score(),
                        snapshot.streak(),
                        snapshot.tries_remaining(),
                        snapshot.seconds_remaining(),
                        item.display_glyph(),
                        item.prompt(),
                    );
                }
            }
            Phase::RoundTransition => {
                println!("Loading stage {}...", snapshot.stage());
                if let Some(message) = snapshot.message() {
                    println!("{} (type /retry)", message);
                }
            }
            Phase::Intro | Phase::GameOver => {}
        }
    }
}

#[instrument]
fn run_leaderboard(db_path: String, top: usize, json: bool) -> Result<()> {
    let repository = GameRepository::new(db_path)?;
    repository.run_migrations()?;
    let entries = repository.leaderboard(top)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No scores yet.");
    }
    for (index, entry) in entries.iter().enumerate() {
        println!("{:>3}. {:<20} {:>6}", index + 1, entry.player_name(), entry.total_score());
    }
    Ok(())
}

#[instrument]
fn run_migrate(db_path: String) -> Result<()> {
    let repository = GameRepository::new(db_path)?;
    let applied = repository.run_migrations()?;
    println!("Applied {} migration(s).", applied);
    Ok(())
}
