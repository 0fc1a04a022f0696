//! Chat history with turn markers and a sliding prompt window
//!
//! History is recorded one exchange at a time (a user turn plus the
//! assistant turn that answered it), so a user turn is never left without a
//! paired assistant turn. Assistant turns carry a [`TurnStatus`] so an
//! interrupted or failed reply is always visibly marked instead of looking
//! like a finished answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// Fully produced
    #[default]
    Complete,
    /// Generation was interrupted (cancelled or the stream ended early)
    Incomplete,
    /// Inference failed; content holds whatever arrived before the failure
    Failed,
}

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub status: TurnStatus,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// A complete user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            status: TurnStatus::Complete,
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn with the given status
    pub fn assistant(content: impl Into<String>, status: TurnStatus) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            status,
            timestamp: Utc::now(),
        }
    }

    /// Render the turn as a prompt line, e.g. `User: hello`
    ///
    /// Interrupted and failed replies keep an explicit marker.
    pub fn render(&self) -> String {
        match self.status {
            TurnStatus::Complete => format!("{}: {}", self.role, self.content),
            TurnStatus::Incomplete if self.content.is_empty() => {
                format!("{}: [interrupted]", self.role)
            }
            TurnStatus::Incomplete => format!("{}: {} [interrupted]", self.role, self.content),
            TurnStatus::Failed if self.content.is_empty() => {
                format!("{}: [no response: generation failed]", self.role)
            }
            TurnStatus::Failed => {
                format!("{}: {} [generation failed]", self.role, self.content)
            }
        }
    }

    /// Estimated token cost of the rendered turn
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.render())
    }
}

/// Ordered chat history of one session
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    /// Creates an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a previously saved history
    ///
    /// A trailing user turn without an answer is closed with a failed
    /// assistant marker so the pairing guarantee holds for loaded data too.
    pub fn from_turns(mut turns: Vec<Turn>) -> Self {
        if matches!(turns.last(), Some(t) if t.role == Role::User) {
            turns.push(Turn::assistant("", TurnStatus::Failed));
        }
        Self { turns }
    }

    /// Appends a user turn and the assistant turn that answered it
    ///
    /// # Examples
    ///
    /// ```
    /// use ragpersona::conversation::{ChatHistory, TurnStatus};
    ///
    /// let mut history = ChatHistory::new();
    /// history.record_exchange("hi", "Wubba lubba dub dub", TurnStatus::Complete);
    /// assert_eq!(history.len(), 2);
    /// ```
    pub fn record_exchange(
        &mut self,
        user_message: impl Into<String>,
        assistant_message: impl Into<String>,
        status: TurnStatus,
    ) {
        self.turns.push(Turn::user(user_message));
        self.turns.push(Turn::assistant(assistant_message, status));
    }

    /// All turns, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if nothing has been said yet
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Clears all turns
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Most recent turns that fit both budgets
    ///
    /// Keeps at most `max_turns` turns and drops the oldest ones until the
    /// estimated token total fits `max_tokens`. Turns are never cut in the
    /// middle, so a single turn larger than the token budget is dropped whole.
    pub fn window(&self, max_turns: usize, max_tokens: usize) -> &[Turn] {
        let mut start = self.turns.len().saturating_sub(max_turns);
        let mut total: usize = self.turns[start..]
            .iter()
            .map(Turn::estimated_tokens)
            .sum();

        while total > max_tokens && start < self.turns.len() {
            total -= self.turns[start].estimated_tokens();
            start += 1;
        }

        &self.turns[start..]
    }
}

/// Estimates token count for a string using a simple heuristic
///
/// Uses characters / 4, which approximates tokenization for English text.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}
