use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// questionId -> (shuffled option id -> canonical option id)
pub type OptionMapping = HashMap<String, HashMap<String, String>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    InProgress,
    /// Grading is synchronous on submit, so attempts pass straight through
    /// this state into `Evaluated`.
    Submitted,
    Evaluated,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "IN_PROGRESS",
            AttemptStatus::Submitted => "SUBMITTED",
            AttemptStatus::Evaluated => "EVALUATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Attempt {
    pub id: String,
    pub user_id: String,
    pub exam_id: String,
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Answers as the client sent them, in shuffled option ids.
    #[serde(default)]
    pub answers: HashMap<String, RecordedAnswer>,
    #[serde(default)]
    pub option_mapping: OptionMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_sec: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining_sec: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AttemptResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordedAnswer {
    pub selected_option_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_sec: Option<u32>,
    #[serde(default)]
    pub is_flagged: bool,
}

/// Frozen outcome of an evaluated attempt.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AttemptResult {
    /// Percentage of all questions in the exam, 0..=100, unrounded.
    pub score: f64,
    /// Number of correct answers.
    pub raw_score: u32,
    pub total_questions: u32,
    pub answered_count: u32,
    pub pass: bool,
    pub pass_mark: f64,
    pub breakdowns: Breakdowns,
    pub answer_feedback: Vec<AnswerFeedback>,
    #[serde(default)]
    pub weak_concept_ids: Vec<String>,
    #[serde(default)]
    pub failed_concept_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Breakdowns {
    pub domain: Vec<DimensionStat>,
    pub difficulty: Vec<DimensionStat>,
    pub jurisdiction: Vec<DimensionStat>,
    pub topic: Vec<DimensionStat>,
    pub concept: Vec<DimensionStat>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DimensionStat {
    pub key: String,
    pub correct: u32,
    pub total: u32,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AnswerFeedback {
    pub question_id: String,
    /// Canonical option id the user chose, empty when unanswered.
    pub selected_option_id: String,
    pub correct_option_id: String,
    pub is_correct: bool,
    pub rationale: String,
}

/// Per-concept outcome of one evaluated attempt.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConceptPerformance {
    pub concept_id: String,
    pub correct: bool,
}

/// Read model the progression gate works from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptSummary {
    pub attempt_number: u32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub pass: Option<bool>,
}

impl Attempt {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        exam_id: impl Into<String>,
        attempt_number: u32,
        option_mapping: OptionMapping,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            exam_id: exam_id.into(),
            attempt_number,
            status: AttemptStatus::InProgress,
            started_at: now,
            submitted_at: None,
            evaluated_at: None,
            answers: HashMap::new(),
            option_mapping,
            time_spent_sec: None,
            time_remaining_sec: None,
            paused_at: None,
            result: None,
            created_at: Some(now),
            modified_at: Some(now),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            attempt_number: self.attempt_number,
            submitted_at: self.submitted_at,
            pass: self.result.as_ref().map(|r| r.pass),
        }
    }
}
