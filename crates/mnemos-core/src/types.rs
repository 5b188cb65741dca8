// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types used across the memory subsystem.

use serde::{Deserialize, Serialize};

/// Sensitivity level gating which fact categories may be surfaced
/// for a person. Derived from the relationship score unless a manual
/// override is set on the person record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustTier {
    /// Just met; only low-sensitivity categories surface.
    NewContact,
    /// Some history; plans and professional facts surface.
    GettingToKnow,
    /// Long history; all categories surface.
    CloseFriend,
}

impl TrustTier {
    /// Convert to string for SQLite storage and rendering.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::NewContact => "new_contact",
            TrustTier::GettingToKnow => "getting_to_know",
            TrustTier::CloseFriend => "close_friend",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "new_contact" => Some(TrustTier::NewContact),
            "getting_to_know" => Some(TrustTier::GettingToKnow),
            "close_friend" => Some(TrustTier::CloseFriend),
            _ => None,
        }
    }

    /// Derive a tier from the relationship score.
    pub fn from_score(score: f64) -> Self {
        if score < 3.0 {
            TrustTier::NewContact
        } else if score < 7.0 {
            TrustTier::GettingToKnow
        } else {
            TrustTier::CloseFriend
        }
    }

    /// Whether facts of `category` may be surfaced at this tier.
    ///
    /// The allow-lists nest: new_contact ⊂ getting_to_know ⊂ close_friend.
    pub fn allows(&self, category: FactCategory) -> bool {
        use FactCategory::*;
        match self {
            TrustTier::NewContact => matches!(category, Preference | Misc),
            TrustTier::GettingToKnow => {
                matches!(category, Preference | Misc | Plan | Professional)
            }
            TrustTier::CloseFriend => true,
        }
    }
}

/// Category of an atomic fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Preference,
    Personal,
    Plan,
    Professional,
    Relationship,
    Misc,
}

impl FactCategory {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::Preference => "preference",
            FactCategory::Personal => "personal",
            FactCategory::Plan => "plan",
            FactCategory::Professional => "professional",
            FactCategory::Relationship => "relationship",
            FactCategory::Misc => "misc",
        }
    }

    /// Parse from SQLite string. Unknown values fold into Misc.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "preference" => FactCategory::Preference,
            "personal" => FactCategory::Personal,
            "plan" => FactCategory::Plan,
            "professional" => FactCategory::Professional,
            "relationship" => FactCategory::Relationship,
            _ => FactCategory::Misc,
        }
    }

    /// Minimum relevance score a fact of this category must clear to be
    /// eligible for context. Sensitive categories require more signal.
    pub fn relevance_floor(&self) -> f32 {
        match self {
            FactCategory::Personal | FactCategory::Relationship => 0.4,
            FactCategory::Plan | FactCategory::Professional => 0.25,
            FactCategory::Preference | FactCategory::Misc => 0.15,
        }
    }
}

/// Whether a turn is a direct message or a group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    Dm,
    Group,
}

/// Token usage reported by a model call, for cost tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A request to the external language model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// The user-role prompt text.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A response from the external language model.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// The generated text.
    pub content: String,
    /// Token usage for cost tracking.
    pub usage: TokenUsage,
}

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

/// A dated event discovered during extraction, handed to the proactive
/// subsystem's scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Short human-readable description.
    pub title: String,
    /// When the event occurs, unix milliseconds.
    pub at_ms: i64,
    /// Event category (reminder, anticipated, ...).
    pub category: String,
    /// Person the event concerns, if any.
    pub person_id: Option<String>,
    /// Optional automatic follow-up time, unix milliseconds.
    pub follow_up_at_ms: Option<i64>,
}
