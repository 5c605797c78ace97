//! Quick live check against the real Gemini API.
//!
//! Requires GEMINI_API_KEY (a .env file works).

use npc_core::{GeminiBackend, InteractionEngine, SessionStore, StoryMode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let store = SessionStore::new("data/sessions");
    let backend = GeminiBackend::from_env()?;
    let engine = InteractionEngine::new(store, backend);

    println!("=== NPC Social Engine live check ===\n");

    println!("1. Seeding story log...");
    let count = engine
        .story_event(
            "live-demo",
            "The north gate fell during the night. The town is on edge.",
            StoryMode::Replace,
        )
        .await?;
    println!("   Story log entries: {count}");

    println!("\n2. First interaction (this calls the Gemini API)...");
    let result = engine
        .interact(
            "live-demo",
            "Greta",
            "a gruff blacksmith who distrusts strangers",
            "Good morning! What happened to the gate?",
        )
        .await?;
    println!("   Greta: {}", result.dialogue);
    println!("   Mood: {}", result.npc_mood);
    println!(
        "   Stats: trust {}, annoyance {}",
        result.internal_stats.trust, result.internal_stats.annoyance
    );

    println!("\n3. Repeating the same question...");
    let result = engine
        .interact(
            "live-demo",
            "Greta",
            "a gruff blacksmith who distrusts strangers",
            "good morning!! what happened to the GATE?",
        )
        .await?;
    println!("   Greta: {}", result.dialogue);
    println!(
        "   Repeat count: {} (annoyance now {})",
        result.repeat_count, result.internal_stats.annoyance
    );

    println!("\n4. Resetting session...");
    engine.reset_session("live-demo").await?;
    println!("   Done.");

    Ok(())
}
