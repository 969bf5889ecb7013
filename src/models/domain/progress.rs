use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::domain::exam::ProgressScopeRef;

pub const MAX_LEVEL: u32 = 40;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ProgressScope {
    Level(u32),
    Category(String),
}

impl ProgressScope {
    /// Storage key, unique per user.
    pub fn key(&self) -> String {
        match self {
            ProgressScope::Level(n) => format!("level:{}", n),
            ProgressScope::Category(id) => format!("category:{}", id),
        }
    }

    /// The level a pass in this scope unlocks, if any.
    pub fn next_level(&self) -> Option<u32> {
        match self {
            ProgressScope::Level(n) if *n < MAX_LEVEL => Some(n + 1),
            _ => None,
        }
    }
}

impl From<ProgressScopeRef<'_>> for ProgressScope {
    fn from(scope: ProgressScopeRef<'_>) -> Self {
        match scope {
            ProgressScopeRef::Level(n) => ProgressScope::Level(n),
            ProgressScopeRef::Category(id) => ProgressScope::Category(id.to_string()),
        }
    }
}

/// Per (user, level|category) progress. `best_score` only grows and
/// `passed_at` is written once.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub scope_key: String,
    pub scope: ProgressScope,
    pub best_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_at: Option<DateTime<Utc>>,
    pub attempts_count: u32,
    pub unlocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    pub fn new(user_id: impl Into<String>, scope: ProgressScope) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            scope_key: scope.key(),
            scope,
            best_score: 0.0,
            passed_at: None,
            attempts_count: 0,
            unlocked: false,
            last_attempt_at: None,
            created_at: Some(now),
            modified_at: Some(now),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.passed_at.is_some()
    }

    /// Folds one evaluation into the record with the same arithmetic the
    /// storage layer applies: max for the best score, set-if-null for the
    /// pass timestamp.
    pub fn apply_evaluation(&mut self, score: f64, passed: bool, at: DateTime<Utc>) {
        self.best_score = self.best_score.max(score);
        self.attempts_count += 1;
        self.unlocked = true;
        self.last_attempt_at = Some(at);
        if passed && self.passed_at.is_none() {
            self.passed_at = Some(at);
        }
        self.modified_at = Some(at);
    }
}

pub const WEAK_AREA_MIN_SEEN: u32 = 3;
pub const WEAK_AREA_MASTERY_THRESHOLD: f64 = 0.6;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ConceptProgress {
    pub user_id: String,
    pub concept_id: String,
    pub times_seen: u32,
    pub times_correct: u32,
    pub mastery_score: f64,
    pub is_weak_area: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl ConceptProgress {
    pub fn new(user_id: impl Into<String>, concept_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            concept_id: concept_id.into(),
            times_seen: 0,
            times_correct: 0,
            mastery_score: 0.0,
            is_weak_area: false,
            last_seen_at: None,
        }
    }

    pub fn record(&mut self, correct: bool, at: DateTime<Utc>) {
        self.times_seen += 1;
        if correct {
            self.times_correct += 1;
        }
        self.mastery_score = self.times_correct as f64 / self.times_seen as f64;
        self.is_weak_area = is_weak_area(self.times_seen, self.mastery_score);
        self.last_seen_at = Some(at);
    }
}

pub fn is_weak_area(times_seen: u32, mastery_score: f64) -> bool {
    times_seen >= WEAK_AREA_MIN_SEEN && mastery_score < WEAK_AREA_MASTERY_THRESHOLD
}

/// Concept as the content catalog describes it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConceptRef {
    pub id: String,
    pub name: String,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_number: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemediationRequest {
    pub id: String,
    pub user_id: String,
    pub exam_id: String,
    pub attempt_id: String,
    pub failed_concept_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}
