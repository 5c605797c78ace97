//! Per-session NPC relationship-state engine.
//!
//! This crate provides:
//! - Durable, file-backed state per (session, NPC): mood, bounded
//!   conversation memory, and repeat counts
//! - A shared per-session story log
//! - The interaction engine that mediates between player input and a
//!   generative dialogue backend
//!
//! # Quick Start
//!
//! ```ignore
//! use npc_core::{GeminiBackend, InteractionEngine, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SessionStore::new("data/sessions");
//!     let backend = GeminiBackend::from_env()?;
//!     let engine = InteractionEngine::new(store, backend);
//!
//!     let result = engine
//!         .interact("demo", "Greta", "a gruff blacksmith", "Where is the key?")
//!         .await?;
//!     println!("{}", result.dialogue);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod engine;
pub mod normalize;
pub mod state;
pub mod store;
pub mod testing;

// Primary public API
pub use backend::{BackendError, DialogueBackend, GeminiBackend};
pub use engine::{EngineError, Interaction, InteractionEngine, NpcReply};
pub use normalize::normalize;
pub use state::{Mood, NpcState, Part, Role, StoryLog, StoryMode, Turn, MAX_MEMORY_TURNS};
pub use store::{SessionStore, StorageError};
pub use testing::{FailingBackend, MockBackend};
