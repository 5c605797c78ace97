//! Session state records: NPC mood/memory/repeat and the shared story log.
//!
//! These types are the persisted JSON shapes. Field names are part of the
//! on-disk contract and must not change without a migration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum conversation turns kept per NPC; oldest evicted first.
pub const MAX_MEMORY_TURNS: usize = 200;

/// Annoyance added per repetition beyond the first.
const REPEAT_PENALTY_STEP: i32 = 5;

/// NPC disposition toward the player. Both axes are clamped to `[0, 100]`
/// after every update; persisted values never leave that range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mood {
    pub trust: i32,
    pub annoyance: i32,
}

impl Default for Mood {
    fn default() -> Self {
        Self {
            trust: 50,
            annoyance: 0,
        }
    }
}

impl Mood {
    /// Bump annoyance for a repeated message: `5 × (count − 1)` for the
    /// second and later occurrences. Applied before the backend is invoked.
    pub fn apply_repeat_penalty(&mut self, repeat_count: u32) {
        if repeat_count >= 2 {
            self.annoyance =
                clamp(self.annoyance + REPEAT_PENALTY_STEP * (repeat_count as i32 - 1));
        }
    }

    /// Apply the backend's trust/annoyance deltas, clamping each axis.
    pub fn apply_deltas(&mut self, trust_delta: i32, annoyance_delta: i32) {
        self.trust = clamp(self.trust.saturating_add(trust_delta));
        self.annoyance = clamp(self.annoyance.saturating_add(annoyance_delta));
    }
}

fn clamp(value: i32) -> i32 {
    value.clamp(0, 100)
}

/// The role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One text part of a turn. Persisted as `{"text": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// A single conversation turn: `{"role": ..., "parts": [{"text": ...}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    /// Create a player turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// Create an NPC turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// All text parts concatenated.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Per-(session, NPC) state record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    #[serde(default)]
    pub mood: Mood,

    /// Conversation turns in chronological order, capped at
    /// [`MAX_MEMORY_TURNS`].
    #[serde(default)]
    pub memory: Vec<Turn>,

    /// Normalized utterance → occurrence count. Never reset except by
    /// deleting the whole session.
    #[serde(default)]
    pub repeat: BTreeMap<String, u32>,
}

impl NpcState {
    /// Record one occurrence of a normalized utterance and return the
    /// post-increment count.
    pub fn record_repeat(&mut self, key: &str) -> u32 {
        let count = self.repeat.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// The most recent `n` turns, oldest first.
    pub fn recent_history(&self, n: usize) -> &[Turn] {
        let start = self.memory.len().saturating_sub(n);
        &self.memory[start..]
    }

    /// Append a player/NPC exchange, then evict the oldest turns past the cap.
    pub fn push_exchange(&mut self, player_text: &str, dialogue: &str) {
        self.memory.push(Turn::user(player_text));
        self.memory.push(Turn::model(dialogue));

        if self.memory.len() > MAX_MEMORY_TURNS {
            let excess = self.memory.len() - MAX_MEMORY_TURNS;
            self.memory.drain(..excess);
        }
    }
}

/// How a story event is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryMode {
    Append,
    Replace,
}

/// Shown to the backend when a session has no story entries yet.
pub const EMPTY_STORY_PLACEHOLDER: &str = "No story context yet.";

/// The session-wide narrative log, shared across NPCs.
///
/// Entries are never reordered; append order is chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryLog {
    #[serde(default)]
    pub log: Vec<String>,
}

impl StoryLog {
    /// Add one entry to the end of the log.
    pub fn append(&mut self, text: &str) {
        self.log.push(text.trim().to_string());
    }

    /// Discard all entries and reseed with exactly one.
    pub fn replace(&mut self, text: &str) {
        self.log = vec![text.trim().to_string()];
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> &[String] {
        let start = self.log.len().saturating_sub(n);
        &self.log[start..]
    }

    /// The last `n` entries joined into a single context string, or a fixed
    /// placeholder when the log is empty.
    pub fn recent_context(&self, n: usize) -> String {
        if self.log.is_empty() {
            EMPTY_STORY_PLACEHOLDER.to_string()
        } else {
            self.tail(n).join(" | ")
        }
    }
}
