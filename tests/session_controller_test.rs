//! Session lifecycle tests driving the controller directly.

mod common;

use std::sync::Arc;

use common::{RecordingBackend, ScriptedContentStore, answer, collaborators, items, small_config, wrong};
use strictly_guess::{
    Collaborators, Difficulty, EndReason, EngineConfig, EngineError, EngineEvent, Feedback,
    FinalStagePolicy, Guess, Phase, RewardKind, RoundToken, SessionController, SessionRunner,
    SkipOutcome, Verdict,
};
use tokio::sync::{broadcast, mpsc};

fn controller(
    config: EngineConfig,
    collaborators: Collaborators,
) -> (SessionController, mpsc::UnboundedReceiver<RoundToken>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SessionController::new(config, collaborators, tx).expect("valid config"),
        rx,
    )
}

fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn session_ends(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::SessionEnded { .. }))
        .count()
}

#[tokio::test]
async fn test_start_session_presents_item() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );

    session.start_session("Alice").await.expect("start");

    let state = session.state();
    assert_eq!(*state.phase(), Phase::Active);
    assert_eq!(*state.stage(), 1);
    assert_eq!(*state.score(), 0);
    assert_eq!(*state.tries_remaining(), 3);
    assert_eq!(*state.seconds_remaining(), 30);
    assert!(state.current_item().is_some());
    assert_eq!(
        state.player().as_ref().map(|p| p.player_id().as_str()),
        Some("id-alice")
    );
}

#[tokio::test]
async fn test_three_correct_guesses_complete_stage_one() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    let mut events = session.subscribe();
    session.start_session("Alice").await.expect("start");

    for _ in 0..2 {
        let guess = answer(session.state());
        let result = session.submit_guess(guess).await.expect("guess");
        assert_eq!(*result.verdict(), Verdict::Correct);
        assert!(result.completed().is_none());
    }
    assert!(drain(&mut events).is_empty());

    let guess = answer(session.state());
    let result = session.submit_guess(guess).await.expect("guess");
    let completed = result.completed().expect("stage completed");
    assert_eq!(*completed.stage(), 1);
    assert_eq!(*completed.reward(), RewardKind::Sticker);

    let fired = drain(&mut events);
    assert_eq!(
        fired,
        vec![EngineEvent::StageCompleted {
            reward: RewardKind::Sticker,
            stage: 1
        }]
    );

    let state = session.state();
    assert_eq!(*state.stage(), 2);
    assert_eq!(*state.score(), 3);
    assert_eq!(*state.streak(), 3);
    assert_eq!(*state.phase(), Phase::Active);
    // The two unplayed items carry over into the stage 2 band.
    assert_eq!(session.pool_len(), 2);
}

#[tokio::test]
async fn test_guess_matching_ignores_case_and_whitespace() {
    let store = Arc::new(ScriptedContentStore::new(vec![
        common::item("cat", 1),
        common::item("dog", 1),
    ]));
    let (mut session, _ticks) = controller(
        small_config(5, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    session.start_session("Alice").await.expect("start");

    let current = session
        .state()
        .current_item()
        .as_ref()
        .map(|i| i.answer_text().clone())
        .expect("item");
    let shouted = Guess::parse(&format!("  {}  ", current.to_uppercase())).expect("guess");
    let result = session.submit_guess(shouted).await.expect("guess");
    assert_eq!(*result.verdict(), Verdict::Correct);
}

#[tokio::test]
async fn test_three_incorrect_guesses_end_session_once() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    let mut events = session.subscribe();
    session.start_session("Alice").await.expect("start");
    let first_item = session.state().current_item().clone();

    let result = session.submit_guess(wrong()).await.expect("guess");
    assert_eq!(*result.verdict(), Verdict::Incorrect);
    assert_eq!(*session.state().feedback(), Some(Feedback::Incorrect));
    // A miss keeps the same item in play.
    assert_eq!(session.state().current_item(), &first_item);
    assert_eq!(*session.state().tries_remaining(), 2);

    session.submit_guess(wrong()).await.expect("guess");
    let result = session.submit_guess(wrong()).await.expect("guess");
    assert_eq!(*result.ended(), Some(EndReason::TriesExhausted));

    let state = session.state();
    assert_eq!(*state.phase(), Phase::GameOver);
    assert_eq!(*state.tries_remaining(), 0);
    assert_eq!(*state.streak(), 0);
    assert!(state.current_item().is_none());

    assert_eq!(
        session.submit_guess(wrong()).await.err(),
        Some(EngineError::SessionOver)
    );
    session.quit();

    let fired = drain(&mut events);
    assert_eq!(session_ends(&fired), 1);
    assert!(fired.contains(&EngineEvent::SessionEnded {
        final_score: 0,
        reason: EndReason::TriesExhausted
    }));
}

#[tokio::test]
async fn test_skip_on_last_item_exhausts_pool() {
    let store = Arc::new(ScriptedContentStore::new(items("only", 1, 1)));
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    let mut events = session.subscribe();
    session.start_session("Alice").await.expect("start");

    let outcome = session.skip_item().expect("skip");
    assert_eq!(outcome, SkipOutcome::SessionEnded(EndReason::PoolExhausted));
    assert_eq!(*session.state().phase(), Phase::GameOver);
    assert_eq!(session_ends(&drain(&mut events)), 1);
}

#[tokio::test]
async fn test_skip_keeps_tries_and_streak() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let (mut session, _ticks) = controller(
        small_config(5, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    session.start_session("Alice").await.expect("start");
    let guess = answer(session.state());
    session.submit_guess(guess).await.expect("guess");

    let skipped = session.state().current_item().clone();
    assert_eq!(session.skip_item().expect("skip"), SkipOutcome::NextItem);
    assert_ne!(session.state().current_item(), &skipped);
    assert_eq!(*session.state().streak(), 1);
    assert_eq!(*session.state().tries_remaining(), 3);
    assert_eq!(session.pool_len(), 3);
}

#[tokio::test]
async fn test_start_failure_stays_in_intro() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    store.set_failing(true);
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store.clone(), Arc::new(RecordingBackend::new())),
    );

    let err = session.start_session("Alice").await.expect_err("content down");
    assert!(matches!(err, EngineError::ContentUnavailable(_)));
    assert_eq!(*session.state().phase(), Phase::Intro);
    assert!(session.state().message().is_some());

    store.set_failing(false);
    session.start_session("Alice").await.expect("retry start");
    assert_eq!(*session.state().phase(), Phase::Active);
    assert!(session.state().message().is_none());
}

#[tokio::test]
async fn test_blank_name_rejected() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    let err = session.start_session("   ").await.expect_err("blank");
    assert!(matches!(err, EngineError::InvalidIdentity(_)));
    assert_eq!(*session.state().phase(), Phase::Intro);
}

#[tokio::test]
async fn test_empty_stage_pool_is_content_unavailable() {
    // Only difficulty 5 items: nothing in the stage 1 band.
    let store = Arc::new(ScriptedContentStore::new(items("hard", 5, 3)));
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    let err = session.start_session("Alice").await.expect_err("empty band");
    assert!(matches!(err, EngineError::ContentUnavailable(_)));
}

#[tokio::test]
async fn test_stage_load_failure_waits_for_retry() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 2)));
    let (mut session, _ticks) = controller(
        small_config(2, 6),
        collaborators(store.clone(), Arc::new(RecordingBackend::new())),
    );
    session.start_session("Alice").await.expect("start");
    store.set_failing(true);

    let mut last_answered = None;
    for _ in 0..2 {
        last_answered = session.state().current_item().clone();
        let guess = answer(session.state());
        session.submit_guess(guess).await.expect("guess");
    }

    // Both items used, stage 2 cannot load: wait in transition with a message.
    let state = session.state();
    assert_eq!(*state.stage(), 2);
    assert_eq!(*state.phase(), Phase::RoundTransition);
    assert!(state.message().is_some());
    // The last item stays on screen but cannot be played.
    assert_eq!(state.current_item(), &last_answered);
    assert!(matches!(
        session.submit_guess(wrong()).await,
        Err(EngineError::WrongPhase { .. })
    ));
    assert!(matches!(session.skip_item(), Err(EngineError::WrongPhase { .. })));
    assert!(matches!(session.request_hint(), Err(EngineError::WrongPhase { .. })));
    assert!(matches!(session.pause(), Err(EngineError::WrongPhase { .. })));
    assert_eq!(*session.state().tries_remaining(), 3);

    let err = session.retry_content().await.expect_err("still down");
    assert!(matches!(err, EngineError::ContentUnavailable(_)));
    assert_eq!(*session.state().phase(), Phase::RoundTransition);
}

#[tokio::test]
async fn test_stage_load_failure_plays_on_leftovers_with_message() {
    let mut pool = items("a", 1, 4);
    pool.extend(items("b", 3, 3));
    let store = Arc::new(ScriptedContentStore::new(pool));
    let (mut session, _ticks) = controller(
        small_config(2, 6),
        collaborators(store.clone(), Arc::new(RecordingBackend::new())),
    );
    store.fail_above(2);
    session.start_session("Alice").await.expect("start");
    for _ in 0..2 {
        let guess = answer(session.state());
        session.submit_guess(guess).await.expect("guess");
    }

    // Stage 2 is reached but its pool failed: stage 1 leftovers stay playable.
    let state = session.state();
    assert_eq!(*state.stage(), 2);
    assert_eq!(*state.phase(), Phase::Active);
    let leftover = state.current_item().clone().expect("leftover item");
    assert!(leftover.id().starts_with('a'));
    let message = state.message().clone().expect("content failure message");
    assert!(message.contains("stage 2"));

    store.fail_above(0);
    session.retry_content().await.expect("retry");
    let state = session.state();
    assert!(state.message().is_none());
    assert_eq!(*state.phase(), Phase::Active);
    assert_eq!(state.current_item().as_ref(), Some(&leftover));
}

#[tokio::test]
async fn test_retry_content_resumes_play() {
    let mut pool = items("a", 1, 2);
    pool.extend(items("b", 3, 3));
    let store = Arc::new(ScriptedContentStore::new(pool));
    let config = small_config(2, 6).with_batch_size(2);
    let (mut session, _ticks) = controller(
        config,
        collaborators(store.clone(), Arc::new(RecordingBackend::new())),
    );
    // Stage 1 loads; anything reaching difficulty 3 (stage 2 onwards) fails,
    // including the background prefetch.
    store.fail_above(2);
    session.start_session("Alice").await.expect("start");
    for _ in 0..2 {
        let guess = answer(session.state());
        session.submit_guess(guess).await.expect("guess");
    }

    assert_eq!(*session.state().phase(), Phase::RoundTransition);
    assert_eq!(*session.state().stage(), 2);
    assert!(session.state().message().is_some());

    store.fail_above(0);
    session.retry_content().await.expect("retry");

    let state = session.state();
    assert_eq!(*state.phase(), Phase::Active);
    assert_eq!(*state.stage(), 2);
    assert!(state.message().is_none());
    let item = state.current_item().as_ref().expect("item");
    assert!(item.id().starts_with('b'));
    assert_eq!(*item.difficulty(), Difficulty::try_from(3).expect("valid difficulty"));

    // Nothing left to retry once play resumed.
    session.retry_content().await.expect("no-op retry");
    assert_eq!(*session.state().phase(), Phase::Active);
}

#[tokio::test]
async fn test_loop_policy_wraps_to_stage_one_and_pays_again() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 12)));
    let backend = Arc::new(RecordingBackend::new());
    let config = small_config(1, 2)
        .with_final_stage_policy(FinalStagePolicy::Loop)
        .with_batch_size(3);
    let (mut session, _ticks) = controller(config, collaborators(store, backend.clone()));
    let mut events = session.subscribe();
    session.start_session("Alice").await.expect("start");

    // Score 1 clears stage 1, score 2 clears stage 2 and wraps.
    for _ in 0..2 {
        let guess = answer(session.state());
        session.submit_guess(guess).await.expect("guess");
    }
    let state = session.state();
    assert_eq!(*state.stage(), 1);
    assert_eq!(*state.lap(), 1);
    assert_eq!(*state.phase(), Phase::Active);
    assert!(state.current_item().is_some());

    // Thresholds count from the lap's starting score: one more clears stage 1 again.
    let guess = answer(session.state());
    let result = session.submit_guess(guess).await.expect("guess");
    let completed = result.completed().expect("stage 1 on lap 1");
    assert_eq!(*completed.stage(), 1);
    assert_eq!(*completed.reward(), RewardKind::Sticker);
    assert_eq!(*session.state().stage(), 2);
    assert_eq!(*session.state().lap(), 1);

    let stages: Vec<u32> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::StageCompleted { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages, vec![1, 2, 1]);

    session.quit();
    session.shutdown().await;
    let rewarded: Vec<u32> = backend.rewards().iter().map(|r| *r.stage()).collect();
    assert_eq!(rewarded, vec![1, 2, 1]);
}

#[tokio::test]
async fn test_invalid_config_rejected_before_spawning() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let backend = Arc::new(RecordingBackend::new());

    let (tx, _rx) = mpsc::unbounded_channel();
    let err = SessionController::new(
        small_config(3, 6).with_persistence_retry_seconds(0),
        collaborators(store.clone(), backend.clone()),
        tx,
    )
    .expect_err("zero retry interval");
    assert!(err.message.contains("Intervals must be positive"));

    let spawned = SessionRunner::spawn(
        small_config(3, 6).with_leaderboard_poll_seconds(0),
        collaborators(store.clone(), backend.clone()),
        None,
    );
    assert!(spawned.is_err());

    // A valid config still persists through the outbox.
    let (mut session, _ticks) = controller(small_config(1, 6), collaborators(store, backend.clone()));
    session.start_session("Alice").await.expect("start");
    let guess = answer(session.state());
    session.submit_guess(guess).await.expect("guess");
    session.quit();
    assert_eq!(*session.shutdown().await.delivered(), 3);
    assert_eq!(backend.scores().len(), 2);
}

#[tokio::test]
async fn test_hints_reveal_prefix_until_budget_spent() {
    let store = Arc::new(ScriptedContentStore::new(vec![common::item("owl", 1)]));
    let config = small_config(3, 6).with_hint_budget(2);
    let (mut session, _ticks) = controller(
        config,
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    session.start_session("Alice").await.expect("start");

    assert_eq!(session.request_hint().expect("hint"), "o__");
    assert_eq!(session.request_hint().expect("hint"), "ow_");
    assert_eq!(session.request_hint(), Err(EngineError::HintsExhausted));
    assert_eq!(*session.state().hint_budget(), 0);
    assert_eq!(session.state().active_hint().as_deref(), Some("ow_"));
}

#[tokio::test]
async fn test_paused_session_rejects_input() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 3)));
    let (mut session, _ticks) = controller(
        small_config(3, 6),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    session.start_session("Alice").await.expect("start");
    let token = session.round_token();

    session.pause().expect("pause");
    assert!(*session.state().paused());
    assert_eq!(session.submit_guess(wrong()).await.err(), Some(EngineError::Paused));
    assert_eq!(session.skip_item().err(), Some(EngineError::Paused));
    assert_eq!(session.request_hint().err(), Some(EngineError::Paused));
    // Ticks from before the pause no longer count.
    assert_eq!(session.on_tick(token), strictly_guess::TickOutcome::Stale);

    session.resume().expect("resume");
    assert!(!*session.state().paused());
    assert_eq!(*session.state().seconds_remaining(), 30);
    assert_eq!(*session.state().tries_remaining(), 3);
}

#[tokio::test]
async fn test_end_policy_finishes_after_last_stage() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 6)));
    let config = small_config(1, 2).with_final_stage_policy(FinalStagePolicy::End);
    let (mut session, _ticks) = controller(
        config,
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    let mut events = session.subscribe();
    session.start_session("Alice").await.expect("start");

    let guess = answer(session.state());
    session.submit_guess(guess).await.expect("guess");
    assert_eq!(*session.state().stage(), 2);

    let guess = answer(session.state());
    let result = session.submit_guess(guess).await.expect("guess");
    assert_eq!(*result.ended(), Some(EndReason::FinalStageCleared));

    let fired = drain(&mut events);
    let completed: Vec<_> = fired
        .iter()
        .filter(|e| matches!(e, EngineEvent::StageCompleted { .. }))
        .collect();
    assert_eq!(completed.len(), 2);
    assert_eq!(session_ends(&fired), 1);
}

#[tokio::test]
async fn test_stay_policy_grants_final_reward_once() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 6)));
    let (mut session, _ticks) = controller(
        small_config(1, 2),
        collaborators(store, Arc::new(RecordingBackend::new())),
    );
    let mut events = session.subscribe();
    session.start_session("Alice").await.expect("start");

    for _ in 0..4 {
        let guess = answer(session.state());
        session.submit_guess(guess).await.expect("guess");
    }

    let fired = drain(&mut events);
    let badges = fired
        .iter()
        .filter(|e| {
            matches!(
                e,
                EngineEvent::StageCompleted {
                    reward: RewardKind::Badge,
                    ..
                }
            )
        })
        .count();
    assert_eq!(badges, 1);
    assert_eq!(*session.state().stage(), 2);
    assert_eq!(*session.state().phase(), Phase::Active);
}

#[tokio::test]
async fn test_persistence_failure_does_not_block_play() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let backend = Arc::new(RecordingBackend::always_failing());
    let config = small_config(1, 6).with_persistence_max_attempts(1);
    let (mut session, _ticks) = controller(config, collaborators(store, backend.clone()));
    session.start_session("Alice").await.expect("start");

    let guess = answer(session.state());
    let result = session.submit_guess(guess).await.expect("guess");
    assert!(result.completed().is_some());
    assert_eq!(*session.state().phase(), Phase::Active);
    assert!(session.state().message().is_none());

    session.quit();
    let report = session.shutdown().await;
    assert_eq!(*report.delivered(), 0);
    // Reward and score at stage completion, score at session end.
    assert_eq!(*report.dropped(), 3);
    assert!(backend.scores().is_empty());
}

#[tokio::test]
async fn test_records_reach_backend() {
    let store = Arc::new(ScriptedContentStore::new(items("a", 1, 5)));
    let backend = Arc::new(RecordingBackend::new());
    let (mut session, _ticks) = controller(small_config(2, 6), collaborators(store, backend.clone()));
    let session_id = session.session_id().clone();
    session.start_session("Alice").await.expect("start");

    for _ in 0..2 {
        let guess = answer(session.state());
        session.submit_guess(guess).await.expect("guess");
    }
    session.quit();
    let report = session.shutdown().await;
    assert_eq!(*report.delivered(), 3);

    let rewards = backend.rewards();
    assert_eq!(rewards.len(), 1);
    assert_eq!(*rewards[0].reward_kind(), RewardKind::Sticker);
    assert_eq!(*rewards[0].stage(), 1);
    assert_eq!(rewards[0].session_id(), &session_id);

    let scores = backend.scores();
    assert_eq!(scores.len(), 2);
    assert!(scores.iter().all(|s| *s.score() == 2));
    assert_eq!(scores[0].player_name(), "Alice");
}
