//! The interaction engine.
//!
//! Orchestrates one player/NPC interaction end to end: load state, count the
//! repeat, pre-adjust annoyance, build the backend context, invoke the
//! backend, validate its structured reply, apply mood deltas, update the
//! story log and conversation memory, and atomically persist the record.
//!
//! Interactions to the same (session, NPC) pair are serialized by an
//! in-process lock table held across the whole load-mutate-persist sequence,
//! so overlapping requests cannot silently drop each other's updates.

use crate::backend::{BackendError, DialogueBackend};
use crate::normalize::normalize;
use crate::state::{Mood, StoryMode};
use crate::store::{sanitize, SessionStore, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Story-log entries supplied to the backend as context.
const STORY_CONTEXT_WINDOW: usize = 20;

/// Conversation turns supplied to the backend as history.
const HISTORY_WINDOW: usize = 12;

/// Story-log entries returned to the caller after an interaction.
const STORY_TAIL: usize = 10;

/// Errors from engine operations. All are terminal for the single request;
/// none are retried.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The backend replied, but not with the expected structured shape. The
    /// raw text is attached for diagnosis.
    #[error("Backend did not return a valid structured reply ({reason}). Raw: {raw}")]
    BackendFormat { reason: String, raw: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The backend's structured reply. `dialogue` is required; everything else
/// falls back to a neutral default when absent. A missing or wrong-typed
/// field is a [`EngineError::BackendFormat`] error, never a panic.
#[derive(Debug, Clone, Deserialize)]
pub struct NpcReply {
    pub dialogue: String,

    #[serde(default)]
    pub mood_summary: String,

    #[serde(default)]
    pub annoyance_delta: i32,

    #[serde(default)]
    pub trust_delta: i32,

    #[serde(default)]
    pub world_log_update: Option<String>,
}

impl NpcReply {
    /// Validate raw backend text against the expected reply shape.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        serde_json::from_str(raw).map_err(|e| EngineError::BackendFormat {
            reason: e.to_string(),
            raw: raw.to_string(),
        })
    }
}

/// The result of one interaction, shaped for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    /// The NPC's in-character reply.
    pub dialogue: String,

    /// The backend's one-line description of the NPC's mood.
    pub npc_mood: String,

    /// The mood snapshot as persisted after this interaction.
    pub internal_stats: Mood,

    /// How many times this (normalized) message has been sent, including now.
    pub repeat_count: u32,

    /// The most recent story-log entries, oldest first.
    pub global_story_log_tail: Vec<String>,
}

/// The session/NPC state engine.
///
/// Cheap to share behind an `Arc`; all operations take `&self` and may run
/// concurrently, with per-entity serialization handled internally.
pub struct InteractionEngine<B> {
    store: SessionStore,
    backend: B,
    locks: LockTable,
}

impl<B: DialogueBackend> InteractionEngine<B> {
    pub fn new(store: SessionStore, backend: B) -> Self {
        Self {
            store,
            backend,
            locks: LockTable::default(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Process one player message to one NPC.
    ///
    /// The repeat counter and its annoyance penalty are persisted even when
    /// the backend call or its reply validation fails: the player did send
    /// the message. Mood deltas, memory turns, and story-log updates from the
    /// backend reply are persisted only on success.
    pub async fn interact(
        &self,
        session_id: &str,
        npc_name: &str,
        npc_persona: &str,
        player_text: &str,
    ) -> Result<Interaction, EngineError> {
        let _npc_guard = self.locks.acquire(npc_lock_key(session_id, npc_name)).await;

        let mut state = self.store.load_npc(session_id, npc_name).await?;

        let repeat_key = normalize(player_text);
        let repeat_count = state.record_repeat(&repeat_key);
        state.mood.apply_repeat_penalty(repeat_count);

        debug!(
            session = session_id,
            npc = npc_name,
            repeat_count,
            "processing interaction"
        );

        let story_context = self
            .store
            .load_story(session_id)
            .await?
            .recent_context(STORY_CONTEXT_WINDOW);

        let system_instruction = build_system_instruction(
            npc_name,
            npc_persona,
            &story_context,
            &state.mood,
            repeat_count,
        );
        let history = state.recent_history(HISTORY_WINDOW).to_vec();

        let raw = match self
            .backend
            .generate(&system_instruction, &history, player_text)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                self.store.save_npc(session_id, npc_name, &state).await?;
                return Err(e.into());
            }
        };

        let reply = match NpcReply::parse(&raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    session = session_id,
                    npc = npc_name,
                    "backend reply failed validation"
                );
                self.store.save_npc(session_id, npc_name, &state).await?;
                return Err(e);
            }
        };

        state.mood.apply_deltas(reply.trust_delta, reply.annoyance_delta);

        if let Some(update) = reply
            .world_log_update
            .as_deref()
            .filter(|u| !u.trim().is_empty())
        {
            // NPC lock is always taken before the story lock, never after.
            let _story_guard = self.locks.acquire(story_lock_key(session_id)).await;
            let mut story = self.store.load_story(session_id).await?;
            story.append(&format!("{npc_name}: {update}"));
            self.store.save_story(session_id, &story).await?;
        }

        state.push_exchange(player_text, &reply.dialogue);
        self.store.save_npc(session_id, npc_name, &state).await?;

        let story_tail = self
            .store
            .load_story(session_id)
            .await?
            .tail(STORY_TAIL)
            .to_vec();

        Ok(Interaction {
            dialogue: reply.dialogue,
            npc_mood: reply.mood_summary,
            internal_stats: state.mood,
            repeat_count,
            global_story_log_tail: story_tail,
        })
    }

    /// Record a narrative event in the session's story log and return the
    /// post-operation log length.
    pub async fn story_event(
        &self,
        session_id: &str,
        story_text: &str,
        mode: StoryMode,
    ) -> Result<usize, EngineError> {
        let _guard = self.locks.acquire(story_lock_key(session_id)).await;

        let mut story = self.store.load_story(session_id).await?;
        match mode {
            StoryMode::Append => story.append(story_text),
            StoryMode::Replace => story.replace(story_text),
        }
        self.store.save_story(session_id, &story).await?;

        debug!(
            session = session_id,
            entries = story.len(),
            "recorded story event"
        );
        Ok(story.len())
    }

    /// Delete the session's story log and every NPC record. Idempotent:
    /// resetting an absent or already-reset session succeeds silently.
    pub async fn reset_session(&self, session_id: &str) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(story_lock_key(session_id)).await;
        self.store.delete_session(session_id).await?;
        Ok(())
    }
}

fn npc_lock_key(session_id: &str, npc_name: &str) -> String {
    format!("{}/npcs/{}", sanitize(session_id), sanitize(npc_name))
}

fn story_lock_key(session_id: &str) -> String {
    format!("{}/story", sanitize(session_id))
}

/// Per-entity async locks, keyed by the entity's storage path. Entries are
/// created on first use and kept for the engine's lifetime.
#[derive(Default)]
struct LockTable {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// Build the system instruction for one interaction, mirroring what the
/// backend needs to stay in character: identity, recent story context, the
/// current relationship, the repeat signal, and the required output shape.
fn build_system_instruction(
    npc_name: &str,
    npc_persona: &str,
    story_context: &str,
    mood: &Mood,
    repeat_count: u32,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("IDENTITY:\n");
    prompt.push_str(&format!(
        "You are {npc_name}. Personality: {npc_persona}.\n\n"
    ));

    prompt.push_str("GLOBAL STORY CONTEXT (recent):\n");
    prompt.push_str(story_context);
    prompt.push_str("\n\n");

    prompt.push_str("CURRENT RELATIONSHIP WITH PLAYER:\n");
    prompt.push_str(&format!("- Trust: {}/100\n", mood.trust));
    prompt.push_str(&format!("- Annoyance: {}/100\n\n", mood.annoyance));

    prompt.push_str("REPEAT SIGNAL:\n");
    prompt.push_str(&format!(
        "This message (normalized) has been asked {repeat_count} times.\n"
    ));
    prompt.push_str(
        "If repeat_count >= 2, you MUST respond with increasing irritation (stay in character).\n\n",
    );

    prompt.push_str("SOCIAL RULES:\n");
    prompt.push_str("1) Be concise and game-dialogue-like.\n");
    prompt.push_str("2) Kind player -> increase trust. Rude player -> decrease trust.\n");
    prompt.push_str("3) If something important happens, set world_log_update; otherwise null.\n\n");

    prompt.push_str("OUTPUT:\n");
    prompt.push_str("Return ONLY valid JSON with keys:\n");
    prompt.push_str("dialogue (string),\n");
    prompt.push_str("mood_summary (string),\n");
    prompt.push_str("annoyance_delta (int),\n");
    prompt.push_str("trust_delta (int),\n");
    prompt.push_str("world_log_update (string or null)\n");

    prompt
}
