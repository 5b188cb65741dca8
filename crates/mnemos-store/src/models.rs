// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity models persisted by the store.

use mnemos_core::types::{FactCategory, TrustTier};
use serde::{Deserialize, Serialize};

/// One tracked human per (channel, channel-user-id) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub channel: String,
    pub channel_user_id: String,
    pub display_name: String,
    /// Monotonically non-decreasing familiarity signal.
    pub relationship_score: f64,
    /// Manual trust-tier override; wins over the derived tier.
    pub trust_override: Option<TrustTier>,
    /// Durable free-text summary, regenerated by consolidation.
    pub capsule: Option<String>,
    pub capsule_updated_at_ms: Option<i64>,
    /// Group-safe style summary; never contains DM-private content.
    pub public_style: Option<String>,
    /// Structured fields, replaced whole-record.
    pub fields: PersonFields,
    pub created_at_ms: i64,
}

impl Person {
    /// The effective trust tier: manual override, else derived from
    /// the relationship score.
    pub fn trust_tier(&self) -> TrustTier {
        self.trust_override
            .unwrap_or_else(|| TrustTier::from_score(self.relationship_score))
    }
}

/// Structured per-person fields. Reads and writes are whole-record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonFields {
    /// What is on their mind right now (≤5 items).
    pub concerns: Vec<String>,
    /// What they are working toward.
    pub goals: Vec<String>,
    /// Standing preferences.
    pub preferences: Vec<String>,
    /// Most recent mood signal.
    pub last_mood: Option<String>,
    /// Open questions worth asking them later.
    pub curiosity: Vec<String>,
}

/// Maximum stored concerns; older ones roll off.
pub const MAX_CONCERNS: usize = 5;

/// One atomic claim about a person (or person-independent when
/// `person_id` is absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub person_id: Option<String>,
    /// Display-name snapshot at creation time.
    pub subject: String,
    pub content: String,
    pub category: FactCategory,
    /// Verbatim substring of the source user message.
    pub evidence_quote: String,
    /// False once superseded or contradicted.
    pub is_current: bool,
    pub last_accessed_at_ms: i64,
    pub created_at_ms: i64,
}

/// One logged turn or summarized window of conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub chat_id: String,
    pub person_id: Option<String>,
    pub content: String,
    pub created_at_ms: i64,
    /// None until extraction has run on this episode.
    pub last_extracted_at_ms: Option<i64>,
}

impl Episode {
    /// Whether catch-up extraction still owes this episode a pass.
    pub fn needs_extraction(&self) -> bool {
        match self.last_extracted_at_ms {
            None => true,
            Some(at) => at < self.created_at_ms,
        }
    }
}

/// A durable behavioral rule derived from feedback or self-observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub person_id: Option<String>,
    pub category: String,
    pub rule: String,
    pub confidence: f64,
    pub validation_count: i64,
    pub violation_count: i64,
    pub promoted: bool,
    pub created_at_ms: i64,
}

/// One durable summary per group chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCapsule {
    pub chat_id: String,
    pub capsule: String,
    pub updated_at_ms: i64,
}

/// A pending-recompute marker for derived content, claimed by
/// background workers via a lease.
#[derive(Debug, Clone)]
pub struct DirtyMarker {
    /// person_id or chat_id depending on the table.
    pub key: String,
    pub dirty_first_at_ms: i64,
    pub dirty_last_at_ms: i64,
    pub claimed_at_ms: Option<i64>,
}

/// Bulk export of all entities, for operational tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    /// Bundle format version for forward-compatible import.
    pub version: u32,
    pub persons: Vec<Person>,
    pub facts: Vec<Fact>,
    pub episodes: Vec<Episode>,
    pub lessons: Vec<Lesson>,
    pub group_capsules: Vec<GroupCapsule>,
}

/// Current export bundle format version.
pub const EXPORT_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_tier_override_wins() {
        let mut person = Person {
            id: "p1".into(),
            channel: "signal".into(),
            channel_user_id: "u1".into(),
            display_name: "Ada".into(),
            relationship_score: 0.5,
            trust_override: None,
            capsule: None,
            capsule_updated_at_ms: None,
            public_style: None,
            fields: PersonFields::default(),
            created_at_ms: 0,
        };
        assert_eq!(person.trust_tier(), TrustTier::NewContact);

        person.trust_override = Some(TrustTier::CloseFriend);
        assert_eq!(person.trust_tier(), TrustTier::CloseFriend);
    }

    #[test]
    fn episode_needs_extraction() {
        let mut episode = Episode {
            id: "e1".into(),
            chat_id: "c1".into(),
            person_id: None,
            content: "hello".into(),
            created_at_ms: 100,
            last_extracted_at_ms: None,
        };
        assert!(episode.needs_extraction());

        episode.last_extracted_at_ms = Some(50);
        assert!(episode.needs_extraction(), "stale stamp still needs a pass");

        episode.last_extracted_at_ms = Some(100);
        assert!(!episode.needs_extraction());
    }
}
