//! End-to-end interaction flow tests using the scripted mock backend.

use npc_core::{
    EngineError, FailingBackend, InteractionEngine, MockBackend, Mood, SessionStore, StoryMode,
    MAX_MEMORY_TURNS,
};
use std::sync::Arc;
use tempfile::TempDir;

fn engine_with(
    backend: Arc<MockBackend>,
) -> (TempDir, InteractionEngine<Arc<MockBackend>>) {
    let dir = TempDir::new().expect("create temp dir");
    let store = SessionStore::new(dir.path());
    (dir, InteractionEngine::new(store, backend))
}

#[tokio::test]
async fn first_interaction_creates_default_state() {
    let backend = Arc::new(MockBackend::new(vec![MockBackend::reply(
        "Hi", "calm", 0, 5, None,
    )]));
    let (_dir, engine) = engine_with(backend);

    let result = engine
        .interact("fresh", "Greta", "a gruff blacksmith", "Hello there")
        .await
        .expect("interact");

    assert_eq!(result.dialogue, "Hi");
    assert_eq!(result.npc_mood, "calm");
    // Default mood {trust: 50, annoyance: 0} plus the +5 trust delta.
    assert_eq!(
        result.internal_stats,
        Mood {
            trust: 55,
            annoyance: 0
        }
    );
    assert_eq!(result.repeat_count, 1);
    // world_log_update was null, so the story log is untouched.
    assert!(result.global_story_log_tail.is_empty());
}

#[tokio::test]
async fn repeated_messages_escalate_annoyance() {
    let backend = Arc::new(MockBackend::neutral());
    let (_dir, engine) = engine_with(backend);

    let mut counts = Vec::new();
    let mut annoyance = Vec::new();
    for text in ["Where is the key?", "where IS the key!!", "Where is the key"] {
        let result = engine
            .interact("s1", "Greta", "a gruff blacksmith", text)
            .await
            .expect("interact");
        counts.push(result.repeat_count);
        annoyance.push(result.internal_stats.annoyance);
    }

    assert_eq!(counts, vec![1, 2, 3]);
    // Pre-adjustment contributions of +0, +5, +10 on top of the default 0.
    assert_eq!(annoyance, vec![0, 5, 15]);
}

#[tokio::test]
async fn repeat_signal_reaches_the_backend() {
    let backend = Arc::new(MockBackend::neutral());
    let (_dir, engine) = engine_with(backend.clone());

    engine
        .interact("s1", "Greta", "a gruff blacksmith", "open up")
        .await
        .expect("first");
    engine
        .interact("s1", "Greta", "a gruff blacksmith", "Open up!")
        .await
        .expect("second");

    let prompts = backend.seen_prompts().await;
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("has been asked 1 times"));
    assert!(prompts[1].contains("has been asked 2 times"));
    // The second prompt carries the pre-adjusted annoyance.
    assert!(prompts[1].contains("- Annoyance: 5/100"));
}

#[tokio::test]
async fn world_log_update_is_attributed_and_shared() {
    let backend = Arc::new(MockBackend::new(vec![MockBackend::reply(
        "The gate is breached!",
        "alarmed",
        5,
        0,
        Some("the north gate fell"),
    )]));
    let (_dir, engine) = engine_with(backend);

    let result = engine
        .interact("s1", "Greta", "a gruff blacksmith", "What was that noise?")
        .await
        .expect("interact");

    assert_eq!(
        result.global_story_log_tail,
        vec!["Greta: the north gate fell"]
    );

    // Another NPC in the same session sees the shared entry in context.
    let boris = Arc::new(MockBackend::neutral());
    let engine2 = InteractionEngine::new(engine.store().clone(), boris.clone());
    engine2
        .interact("s1", "Boris", "a nervous guard", "Anything to report?")
        .await
        .expect("interact");
    let prompts = boris.seen_prompts().await;
    assert!(prompts[0].contains("Greta: the north gate fell"));
}

#[tokio::test]
async fn story_modes_append_and_replace() {
    let backend = Arc::new(MockBackend::neutral());
    let (_dir, engine) = engine_with(backend);

    assert_eq!(
        engine
            .story_event("s1", "a", StoryMode::Append)
            .await
            .expect("append"),
        1
    );
    assert_eq!(
        engine
            .story_event("s1", "b", StoryMode::Append)
            .await
            .expect("append"),
        2
    );

    let story = engine.store().load_story("s1").await.expect("load");
    assert_eq!(story.log, vec!["a", "b"]);

    assert_eq!(
        engine
            .story_event("s1", "c", StoryMode::Replace)
            .await
            .expect("replace"),
        1
    );
    let story = engine.store().load_story("s1").await.expect("load");
    assert_eq!(story.log, vec!["c"]);
}

#[tokio::test]
async fn memory_is_capped_at_200_turns() {
    let backend = Arc::new(MockBackend::neutral());
    let (_dir, engine) = engine_with(backend);

    for i in 0..101 {
        engine
            .interact("s1", "Greta", "a gruff blacksmith", &format!("question {i}"))
            .await
            .expect("interact");
    }

    let state = engine
        .store()
        .load_npc("s1", "Greta")
        .await
        .expect("load npc");
    assert_eq!(state.memory.len(), MAX_MEMORY_TURNS);
    // 202 turns were appended; the very first exchange fell off.
    assert_eq!(state.memory[0].text(), "question 1");
}

#[tokio::test]
async fn reset_is_idempotent_and_clears_state() {
    let backend = Arc::new(MockBackend::neutral());
    let (_dir, engine) = engine_with(backend);

    engine
        .interact("s1", "Greta", "a gruff blacksmith", "hello")
        .await
        .expect("interact");
    engine
        .story_event("s1", "an event", StoryMode::Append)
        .await
        .expect("story");

    engine.reset_session("s1").await.expect("first reset");
    engine.reset_session("s1").await.expect("second reset");
    engine
        .reset_session("never-existed")
        .await
        .expect("absent session reset");

    // Repeat counters start over after a reset.
    let result = engine
        .interact("s1", "Greta", "a gruff blacksmith", "hello")
        .await
        .expect("interact");
    assert_eq!(result.repeat_count, 1);
    assert!(result.global_story_log_tail.is_empty());
}

#[tokio::test]
async fn malformed_reply_persists_repeat_but_not_mood_or_memory() {
    let backend = Arc::new(MockBackend::new(vec![
        "this is not json".to_string(),
        MockBackend::reply("Fine.", "wary", 0, 0, None),
    ]));
    let (_dir, engine) = engine_with(backend);

    let err = engine
        .interact("s1", "Greta", "a gruff blacksmith", "hello")
        .await
        .expect_err("must fail");
    match err {
        EngineError::BackendFormat { raw, .. } => assert_eq!(raw, "this is not json"),
        other => panic!("expected BackendFormat, got {other:?}"),
    }

    // The player did send the message: the repeat count survives. Nothing
    // from the (invalid) reply does.
    let state = engine
        .store()
        .load_npc("s1", "Greta")
        .await
        .expect("load npc");
    assert_eq!(state.repeat.get("hello"), Some(&1));
    assert!(state.memory.is_empty());
    assert_eq!(state.mood, Mood::default());

    // The next send of the same message counts as the second occurrence.
    let result = engine
        .interact("s1", "Greta", "a gruff blacksmith", "hello")
        .await
        .expect("interact");
    assert_eq!(result.repeat_count, 2);
    assert_eq!(result.internal_stats.annoyance, 5);
}

#[tokio::test]
async fn backend_call_failure_surfaces_message() {
    let dir = TempDir::new().expect("create temp dir");
    let store = SessionStore::new(dir.path());
    let engine = InteractionEngine::new(store, FailingBackend::new("quota exceeded"));

    let err = engine
        .interact("s1", "Greta", "a gruff blacksmith", "hello")
        .await
        .expect_err("must fail");
    assert!(matches!(err, EngineError::Backend(_)));
    assert!(err.to_string().contains("quota exceeded"));

    // The repeat count still persisted.
    let state = engine
        .store()
        .load_npc("s1", "Greta")
        .await
        .expect("load npc");
    assert_eq!(state.repeat.get("hello"), Some(&1));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_interactions_do_not_drop_updates() {
    let backend = Arc::new(MockBackend::neutral());
    let (_dir, engine) = engine_with(backend);
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .interact("s1", "Greta", "a gruff blacksmith", "are we safe?")
                .await
                .expect("interact")
        }));
    }

    let mut counts: Vec<u32> = Vec::new();
    for handle in handles {
        counts.push(handle.await.expect("join").repeat_count);
    }
    counts.sort_unstable();

    // Every increment survived: the eight requests observed eight distinct
    // post-increment counts.
    assert_eq!(counts, vec![1, 2, 3, 4, 5, 6, 7, 8]);

    let state = engine
        .store()
        .load_npc("s1", "Greta")
        .await
        .expect("load npc");
    assert_eq!(state.repeat.get("are we safe"), Some(&8));
    assert_eq!(state.memory.len(), 16);
}

#[tokio::test]
async fn round_trip_preserves_all_fields() {
    let backend = Arc::new(MockBackend::new(vec![MockBackend::reply(
        "Stay close.",
        "protective",
        -2,
        8,
        Some("Greta took the player in"),
    )]));
    let (_dir, engine) = engine_with(backend);

    engine
        .interact("s1", "Greta", "a gruff blacksmith", "Can I trust you?")
        .await
        .expect("interact");

    let first = engine
        .store()
        .load_npc("s1", "Greta")
        .await
        .expect("first load");
    let second = engine
        .store()
        .load_npc("s1", "Greta")
        .await
        .expect("second load");
    assert_eq!(first, second);
    assert_eq!(first.mood.trust, 58);
    assert_eq!(first.mood.annoyance, 0);
    assert_eq!(first.memory.len(), 2);
    assert_eq!(first.memory[1].text(), "Stay close.");
}
