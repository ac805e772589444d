//! Single-task session driver and the handle the presentation layer holds.
//!
//! The runner owns the [`SessionController`] and serializes presentation
//! commands and countdown ticks through one `select!` loop, so every
//! operation completes before the next input is looked at.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::OutboxReport;
use crate::config::{ConfigError, EngineConfig};
use crate::content::ItemId;
use crate::engine::controller::{Collaborators, GuessResult, SessionController, SkipOutcome};
use crate::engine::timer::RoundToken;
use crate::engine::{EngineEvent, Guess, SessionState};
use crate::error::EngineError;
use crate::leaderboard::{LeaderboardMonitor, LeaderboardService, MonitorSettings};

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// A request from the presentation layer.
#[derive(Debug)]
enum SessionCommand {
    Start {
        player_name: String,
        reply: Reply<()>,
    },
    Guess {
        guess: Guess,
        item_id: Option<ItemId>,
        reply: Reply<GuessResult>,
    },
    Hint {
        reply: Reply<String>,
    },
    Skip {
        reply: Reply<SkipOutcome>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    RetryContent {
        reply: Reply<()>,
    },
    Quit {
        reply: Reply<()>,
    },
}

/// Cloneable handle for driving a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<EngineEvent>,
}

impl SessionHandle {
    /// Starts the session for `player_name`.
    ///
    /// # Errors
    ///
    /// See [`SessionController::start_session`]; also
    /// [`EngineError::RunnerStopped`] if the session task has exited.
    #[instrument(skip(self))]
    pub async fn start_session(&self, player_name: &str) -> Result<(), EngineError> {
        let player_name = player_name.to_string();
        self.request(|reply| SessionCommand::Start { player_name, reply })
            .await
    }

    /// Submits a guess for whatever item is current when it is processed.
    ///
    /// # Errors
    ///
    /// See [`SessionController::submit_guess`].
    #[instrument(skip(self))]
    pub async fn submit_guess(&self, guess: Guess) -> Result<GuessResult, EngineError> {
        self.request(|reply| SessionCommand::Guess {
            guess,
            item_id: None,
            reply,
        })
        .await
    }

    /// Submits a guess that only applies if `item_id` is still current.
    ///
    /// # Errors
    ///
    /// See [`SessionController::submit_guess_for`].
    #[instrument(skip(self))]
    pub async fn submit_guess_for(
        &self,
        item_id: ItemId,
        guess: Guess,
    ) -> Result<GuessResult, EngineError> {
        self.request(|reply| SessionCommand::Guess {
            guess,
            item_id: Some(item_id),
            reply,
        })
        .await
    }

    /// Requests a hint for the current item.
    ///
    /// # Errors
    ///
    /// See [`SessionController::request_hint`].
    pub async fn request_hint(&self) -> Result<String, EngineError> {
        self.request(|reply| SessionCommand::Hint { reply }).await
    }

    /// Skips the current item.
    ///
    /// # Errors
    ///
    /// See [`SessionController::skip_item`].
    pub async fn skip_item(&self) -> Result<SkipOutcome, EngineError> {
        self.request(|reply| SessionCommand::Skip { reply }).await
    }

    /// Pauses the countdown.
    ///
    /// # Errors
    ///
    /// See [`SessionController::pause`].
    pub async fn pause(&self) -> Result<(), EngineError> {
        self.request(|reply| SessionCommand::Pause { reply }).await
    }

    /// Resumes the countdown.
    ///
    /// # Errors
    ///
    /// See [`SessionController::resume`].
    pub async fn resume(&self) -> Result<(), EngineError> {
        self.request(|reply| SessionCommand::Resume { reply }).await
    }

    /// Retries a failed stage content load.
    ///
    /// # Errors
    ///
    /// See [`SessionController::retry_content`].
    pub async fn retry_content(&self) -> Result<(), EngineError> {
        self.request(|reply| SessionCommand::RetryContent { reply })
            .await
    }

    /// Ends the session and stops the runner.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RunnerStopped`] if the runner already exited.
    pub async fn quit(&self) -> Result<(), EngineError> {
        self.request(|reply| SessionCommand::Quit { reply }).await
    }

    /// Latest state snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Subscribes to engine events, including leaderboard rank events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| EngineError::RunnerStopped)?;
        response.await.map_err(|_| EngineError::RunnerStopped)?
    }
}

/// Owns a controller and processes its inputs one at a time.
#[derive(Debug)]
pub struct SessionRunner {
    controller: SessionController,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    ticks: mpsc::UnboundedReceiver<RoundToken>,
    leaderboard: Option<Arc<dyn LeaderboardService>>,
    monitor_settings: MonitorSettings,
    monitor: Option<LeaderboardMonitor>,
}

impl SessionRunner {
    /// Builds a controller, spawns the runner task, and returns its handle.
    ///
    /// The task resolves to the persistence totals once the session is quit
    /// or every handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation; nothing is spawned.
    #[instrument(skip_all)]
    pub fn spawn(
        config: EngineConfig,
        collaborators: Collaborators,
        leaderboard: Option<Arc<dyn LeaderboardService>>,
    ) -> Result<(SessionHandle, JoinHandle<OutboxReport>), ConfigError> {
        let (tick_tx, ticks) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::unbounded_channel();
        let monitor_settings = MonitorSettings::new(
            Duration::from_secs(*config.leaderboard_poll_seconds()),
            *config.leaderboard_size(),
            *config.top_tier(),
        );
        let controller = SessionController::new(config, collaborators, tick_tx)?;

        let handle = SessionHandle {
            commands: command_tx,
            state: controller.watch(),
            events: controller.event_sender(),
        };
        let runner = Self {
            controller,
            commands,
            ticks,
            leaderboard,
            monitor_settings,
            monitor: None,
        };
        info!(session_id = %runner.controller.session_id(), "Spawning session runner");
        Ok((handle, tokio::spawn(runner.run())))
    }

    async fn run(mut self) -> OutboxReport {
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await == Flow::Stop {
                            break;
                        }
                    }
                    None => {
                        debug!("All session handles dropped");
                        self.controller.quit();
                        break;
                    }
                },
                Some(token) = self.ticks.recv() => {
                    self.controller.on_tick(token);
                }
            }
        }

        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.controller.shutdown().await
    }

    async fn handle(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Start { player_name, reply } => {
                let result = self.controller.start_session(&player_name).await;
                if result.is_ok() {
                    self.start_monitor();
                }
                respond(reply, result);
            }
            SessionCommand::Guess {
                guess,
                item_id,
                reply,
            } => {
                let result = match item_id {
                    Some(id) => self.controller.submit_guess_for(&id, guess).await,
                    None => self.controller.submit_guess(guess).await,
                };
                respond(reply, result);
            }
            SessionCommand::Hint { reply } => respond(reply, self.controller.request_hint()),
            SessionCommand::Skip { reply } => respond(reply, self.controller.skip_item()),
            SessionCommand::Pause { reply } => respond(reply, self.controller.pause()),
            SessionCommand::Resume { reply } => respond(reply, self.controller.resume()),
            SessionCommand::RetryContent { reply } => {
                respond(reply, self.controller.retry_content().await)
            }
            SessionCommand::Quit { reply } => {
                self.controller.quit();
                respond(reply, Ok(()));
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn start_monitor(&mut self) {
        if self.monitor.is_some() {
            return;
        }
        let (Some(service), Some(player)) = (&self.leaderboard, self.controller.state().player())
        else {
            return;
        };
        self.monitor = Some(LeaderboardMonitor::spawn(
            Arc::clone(service),
            player.player_id().clone(),
            self.monitor_settings,
            self.controller.event_sender(),
        ));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

fn respond<T>(reply: Reply<T>, result: Result<T, EngineError>) {
    if reply.send(result).is_err() {
        warn!("Caller stopped waiting for a reply");
    }
}
