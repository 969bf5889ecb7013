use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    models::domain::{
        attempt::{AnswerFeedback, Attempt, AttemptResult, Breakdowns},
        question::QuestionOption,
    },
    services::progression_gate::GateRejection,
};

/// Question as shown during an attempt: no answer key, no rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuestion {
    pub id: String,
    pub stem: String,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartAttemptResponse {
    pub attempt_id: String,
    pub attempt_number: u32,
    pub resumed: bool,
    pub questions: Vec<ClientQuestion>,
    pub time_limit_minutes: u32,
    pub passing_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_sec: Option<u32>,
    /// questionId -> shuffled option id already recorded.
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordAnswerResponse {
    pub attempt_id: String,
    pub question_id: String,
    pub answered_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PauseAttemptResponse {
    pub attempt_id: String,
    pub time_remaining_sec: u32,
    pub paused_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub attempt_id: String,
    pub score: f64,
    pub raw_score: u32,
    pub total_questions: u32,
    pub answered_count: u32,
    pub pass: bool,
    pub pass_mark: f64,
    pub breakdowns: Breakdowns,
    pub answer_feedback: Vec<AnswerFeedback>,
    pub weak_concept_ids: Vec<String>,
    #[serde(default)]
    pub next_unlocks: Vec<u32>,
}

impl SubmitResponse {
    pub fn from_result(attempt_id: &str, result: &AttemptResult, next_unlocks: Vec<u32>) -> Self {
        Self {
            attempt_id: attempt_id.to_string(),
            score: result.score,
            raw_score: result.raw_score,
            total_questions: result.total_questions,
            answered_count: result.answered_count,
            pass: result.pass,
            pass_mark: result.pass_mark,
            breakdowns: result.breakdowns.clone(),
            answer_feedback: result.answer_feedback.clone(),
            weak_concept_ids: result.weak_concept_ids.clone(),
            next_unlocks,
        }
    }

    /// Response rebuilt from a stored, already evaluated attempt.
    pub fn from_attempt(attempt: &Attempt) -> Option<Self> {
        attempt
            .result
            .as_ref()
            .map(|result| Self::from_result(&attempt.id, result, vec![]))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityResponse {
    pub exam_id: String,
    pub can_start: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<GateRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress_attempt_id: Option<String>,
}
