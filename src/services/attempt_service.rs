use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::{AppError, AppResult},
    models::{
        domain::{
            attempt::{Attempt, AttemptResult, AttemptSummary, RecordedAnswer},
            exam::{ExamSpec, ExamType},
            progress::{ProgressScope, RemediationRequest},
            question::Question,
        },
        dto::{
            request::{PauseAttemptRequest, RecordAnswerRequest, SubmitAttemptRequest},
            response::{
                EligibilityResponse, PauseAttemptResponse, RecordAnswerResponse,
                StartAttemptResponse, SubmitResponse,
            },
        },
    },
    repositories::{
        AttemptRepository, ConceptProgressRepository, EvaluationWrite, ExamRepository,
        ProgressRepository, RemediationNotifier,
    },
    services::{
        assessment_service::{AssessmentService, GradingConfig},
        generation_orchestrator::GenerationOrchestrator,
        option_shuffler::{restore_view, shuffle_questions, unshuffle_answers},
        progression_gate::ProgressionGate,
    },
};

/// Who is asking. Built from the bearer token by the handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamUser {
    pub id: String,
    pub is_premium: bool,
}

pub struct AttemptService {
    exam_repository: Arc<dyn ExamRepository>,
    attempt_repository: Arc<dyn AttemptRepository>,
    progress_repository: Arc<dyn ProgressRepository>,
    concept_progress_repository: Arc<dyn ConceptProgressRepository>,
    remediation: Arc<dyn RemediationNotifier>,
    orchestrator: Arc<GenerationOrchestrator>,
    gate: ProgressionGate,
}

impl AttemptService {
    pub fn new(
        exam_repository: Arc<dyn ExamRepository>,
        attempt_repository: Arc<dyn AttemptRepository>,
        progress_repository: Arc<dyn ProgressRepository>,
        concept_progress_repository: Arc<dyn ConceptProgressRepository>,
        remediation: Arc<dyn RemediationNotifier>,
        orchestrator: Arc<GenerationOrchestrator>,
        gate: ProgressionGate,
    ) -> Self {
        Self {
            exam_repository,
            attempt_repository,
            progress_repository,
            concept_progress_repository,
            remediation,
            orchestrator,
            gate,
        }
    }

    pub async fn start_attempt(&self, user: &ExamUser, exam_id: &str) -> AppResult<StartAttemptResponse> {
        let exam = self.load_exam(exam_id).await?;

        let progress = self.progress_repository.find_for_user(&user.id).await?;
        self.gate.check_access(&exam, user.is_premium, &progress)?;

        if let Some(attempt) = self
            .attempt_repository
            .find_in_progress(&user.id, exam_id)
            .await?
        {
            log::info!(
                "Resuming attempt {} for user {} on exam {}",
                attempt.id,
                user.id,
                exam_id
            );
            let questions = exam.question_set.clone().unwrap_or_default();
            return Ok(resumed_response(&exam, &questions, &attempt));
        }

        let history = self
            .attempt_repository
            .find_by_user_and_exam(&user.id, exam_id)
            .await?;
        let summaries: Vec<AttemptSummary> = history.iter().map(Attempt::summary).collect();
        self.gate
            .check_cooldown(exam.exam_type, &summaries, Utc::now())?;

        let questions = match &exam.question_set {
            Some(questions) if !questions.is_empty() => questions.clone(),
            _ => {
                log::info!("Exam {} has no question set, generating", exam_id);
                self.orchestrator.generate_detached(exam.clone()).await?
            }
        };

        let shuffled = {
            let mut rng = rand::thread_rng();
            shuffle_questions(&questions, &mut rng)
        };

        let attempt_number =
            AssessmentService::next_attempt_number(history.iter().map(|a| a.attempt_number));
        let attempt = Attempt::new(
            Uuid::new_v4().to_string(),
            user.id.clone(),
            exam_id,
            attempt_number,
            shuffled.mapping,
        );

        let attempt = match self.attempt_repository.create(attempt).await {
            Ok(attempt) => attempt,
            Err(AppError::Conflict { message, .. }) => {
                // A concurrent start won the attempt number; hand back its attempt.
                match self
                    .attempt_repository
                    .find_in_progress(&user.id, exam_id)
                    .await?
                {
                    Some(existing) => return Ok(resumed_response(&exam, &questions, &existing)),
                    None => return Err(AppError::conflict(message)),
                }
            }
            Err(e) => return Err(e),
        };

        log::info!(
            "Started attempt {} (#{}) for user {} on exam {}",
            attempt.id,
            attempt.attempt_number,
            user.id,
            exam_id
        );

        Ok(StartAttemptResponse {
            attempt_id: attempt.id,
            attempt_number: attempt.attempt_number,
            resumed: false,
            questions: shuffled.questions,
            time_limit_minutes: exam.effective_time_limit_minutes(),
            passing_score: exam.effective_pass_mark(),
            time_remaining_sec: None,
            answers: HashMap::new(),
        })
    }

    pub async fn record_answer(
        &self,
        user: &ExamUser,
        exam_id: &str,
        attempt_id: &str,
        request: RecordAnswerRequest,
    ) -> AppResult<RecordAnswerResponse> {
        request.validate()?;

        let attempt = self.load_owned_attempt(user, exam_id, attempt_id).await?;
        if !attempt.is_in_progress() {
            return Err(not_in_progress(&attempt));
        }

        if attempt.option_mapping.is_empty() {
            let exam = self.load_exam(exam_id).await?;
            let known = exam
                .question_set
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|q| q.id == request.question_id && q.has_option(&request.selected_option_id));
            if !known {
                return Err(unknown_answer(&request));
            }
        } else {
            let known = attempt
                .option_mapping
                .get(&request.question_id)
                .map(|reverse| reverse.contains_key(&request.selected_option_id))
                .unwrap_or(false);
            if !known {
                return Err(unknown_answer(&request));
            }
        }

        let answer = RecordedAnswer {
            selected_option_id: request.selected_option_id.clone(),
            time_spent_sec: request.time_spent_sec,
            is_flagged: request.is_flagged,
        };
        let updated = self
            .attempt_repository
            .record_answer(attempt_id, &request.question_id, answer)
            .await?;
        if !updated {
            return Err(AppError::conflict(format!(
                "Attempt {} is no longer in progress",
                attempt_id
            )));
        }

        let mut answered: Vec<&String> = attempt.answers.keys().collect();
        if !attempt.answers.contains_key(&request.question_id) {
            answered.push(&request.question_id);
        }

        Ok(RecordAnswerResponse {
            attempt_id: attempt_id.to_string(),
            question_id: request.question_id.clone(),
            answered_count: answered.len(),
        })
    }

    pub async fn pause_attempt(
        &self,
        user: &ExamUser,
        exam_id: &str,
        attempt_id: &str,
        request: PauseAttemptRequest,
    ) -> AppResult<PauseAttemptResponse> {
        request.validate()?;

        let attempt = self.load_owned_attempt(user, exam_id, attempt_id).await?;
        if !attempt.is_in_progress() {
            return Err(not_in_progress(&attempt));
        }

        let paused_at = Utc::now();
        let updated = self
            .attempt_repository
            .pause(attempt_id, request.time_remaining_sec, paused_at)
            .await?;
        if !updated {
            return Err(AppError::conflict(format!(
                "Attempt {} is no longer in progress",
                attempt_id
            )));
        }

        Ok(PauseAttemptResponse {
            attempt_id: attempt_id.to_string(),
            time_remaining_sec: request.time_remaining_sec,
            paused_at,
        })
    }

    /// Grades and closes an attempt. A repeated submit returns a conflict
    /// carrying the stored result instead of grading again.
    pub async fn submit(
        &self,
        user: &ExamUser,
        exam_id: &str,
        request: SubmitAttemptRequest,
    ) -> AppResult<SubmitResponse> {
        request.validate()?;

        let attempt = self
            .load_owned_attempt(user, exam_id, &request.attempt_id)
            .await?;
        if !attempt.is_in_progress() {
            return Err(not_in_progress(&attempt));
        }

        let exam = self.load_exam(exam_id).await?;
        let questions = exam
            .question_set
            .clone()
            .filter(|qs| !qs.is_empty())
            .ok_or_else(|| {
                AppError::InternalError(format!("Exam {} has no question set to grade", exam_id))
            })?;

        let mut answers = attempt.answers.clone();
        for submitted in &request.answers {
            let recorded = answers.get(&submitted.question_id);
            let time_spent_sec = recorded.and_then(|a| a.time_spent_sec);
            let is_flagged = recorded.map(|a| a.is_flagged).unwrap_or(false);
            answers.insert(
                submitted.question_id.clone(),
                RecordedAnswer {
                    selected_option_id: submitted.selected_option_id.clone(),
                    time_spent_sec,
                    is_flagged,
                },
            );
        }

        let shuffled: HashMap<String, String> = answers
            .iter()
            .map(|(question_id, answer)| (question_id.clone(), answer.selected_option_id.clone()))
            .collect();
        let canonical = unshuffle_answers(&attempt.option_mapping, &shuffled);

        let result = AssessmentService::grade(
            &questions,
            &canonical,
            GradingConfig {
                pass_mark: exam.effective_pass_mark(),
            },
        );

        let now = Utc::now();
        let won = self
            .attempt_repository
            .mark_evaluated(
                &attempt.id,
                EvaluationWrite {
                    answers,
                    submitted_at: now,
                    evaluated_at: now,
                    time_spent_sec: request.time_spent_sec,
                    result: result.clone(),
                },
            )
            .await?;

        if !won {
            log::warn!(
                "Attempt {} was evaluated concurrently, returning stored result",
                attempt.id
            );
            let stored = self
                .attempt_repository
                .find_by_id(&attempt.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt.id)))?;
            return Err(not_in_progress(&stored));
        }

        log::info!(
            "Evaluated attempt {} for user {}: {:.1}% ({})",
            attempt.id,
            user.id,
            result.score,
            if result.pass { "pass" } else { "fail" }
        );

        self.apply_side_effects(&exam, &attempt, &questions, &canonical, &result, now)
            .await;

        Ok(SubmitResponse::from_result(
            &attempt.id,
            &result,
            next_unlocks(&exam, result.pass),
        ))
    }

    pub async fn get_result(
        &self,
        user: &ExamUser,
        exam_id: &str,
        attempt_id: &str,
    ) -> AppResult<SubmitResponse> {
        let attempt = self.load_owned_attempt(user, exam_id, attempt_id).await?;
        let result = attempt.result.as_ref().ok_or_else(|| {
            AppError::conflict(format!("Attempt {} has not been submitted", attempt_id))
        })?;

        let exam = self.load_exam(exam_id).await?;
        Ok(SubmitResponse::from_result(
            &attempt.id,
            result,
            next_unlocks(&exam, result.pass),
        ))
    }

    /// Dry run of the start checks. Never generates or writes.
    pub async fn eligibility(&self, user: &ExamUser, exam_id: &str) -> AppResult<EligibilityResponse> {
        let exam = self.load_exam(exam_id).await?;
        let progress = self.progress_repository.find_for_user(&user.id).await?;

        let mut response = EligibilityResponse {
            exam_id: exam_id.to_string(),
            can_start: true,
            reason: None,
            in_progress_attempt_id: None,
        };

        if let Err(reason) = self.gate.check_access(&exam, user.is_premium, &progress) {
            response.can_start = false;
            response.reason = Some(reason);
            return Ok(response);
        }

        if let Some(attempt) = self
            .attempt_repository
            .find_in_progress(&user.id, exam_id)
            .await?
        {
            response.in_progress_attempt_id = Some(attempt.id);
            return Ok(response);
        }

        let history = self
            .attempt_repository
            .find_by_user_and_exam(&user.id, exam_id)
            .await?;
        let summaries: Vec<AttemptSummary> = history.iter().map(Attempt::summary).collect();
        if let Err(reason) = self
            .gate
            .check_cooldown(exam.exam_type, &summaries, Utc::now())
        {
            response.can_start = false;
            response.reason = Some(reason);
        }

        Ok(response)
    }

    async fn load_exam(&self, exam_id: &str) -> AppResult<ExamSpec> {
        self.exam_repository
            .find_by_id(exam_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", exam_id)))
    }

    async fn load_owned_attempt(
        &self,
        user: &ExamUser,
        exam_id: &str,
        attempt_id: &str,
    ) -> AppResult<Attempt> {
        let attempt = self
            .attempt_repository
            .find_by_id(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?;

        if attempt.user_id != user.id {
            return Err(AppError::Forbidden(format!(
                "Attempt {} belongs to another user",
                attempt_id
            )));
        }
        if attempt.exam_id != exam_id {
            return Err(AppError::ValidationError(format!(
                "Attempt {} does not belong to exam {}",
                attempt_id, exam_id
            )));
        }
        Ok(attempt)
    }

    /// Progress, concept tracking and remediation. Failures are logged and
    /// never undo the evaluation.
    async fn apply_side_effects(
        &self,
        exam: &ExamSpec,
        attempt: &Attempt,
        questions: &[Question],
        canonical_answers: &HashMap<String, String>,
        result: &AttemptResult,
        at: DateTime<Utc>,
    ) {
        let user_id = attempt.user_id.as_str();

        if let Some(scope) = exam.progress_scope().map(ProgressScope::from) {
            if let Err(e) = self
                .progress_repository
                .record_evaluation(user_id, &scope, result.score, result.pass, at)
                .await
            {
                log::error!(
                    "Failed to update {} progress for user {}: {}",
                    scope.key(),
                    user_id,
                    e
                );
            }

            if result.pass {
                if let Some(next) = scope.next_level() {
                    if let Err(e) = self
                        .progress_repository
                        .unlock(user_id, &ProgressScope::Level(next), at)
                        .await
                    {
                        log::error!("Failed to unlock level {} for user {}: {}", next, user_id, e);
                    }
                }
            }
        }

        let performance = AssessmentService::concept_performance(questions, canonical_answers);
        if !performance.is_empty() {
            if let Err(e) = self
                .concept_progress_repository
                .record_performance(user_id, &performance, at)
                .await
            {
                log::error!("Failed to record concept progress for user {}: {}", user_id, e);
            }
        }

        if !result.pass && !result.failed_concept_ids.is_empty() {
            let request = RemediationRequest {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                exam_id: exam.id.clone(),
                attempt_id: attempt.id.clone(),
                failed_concept_ids: result.failed_concept_ids.clone(),
                created_at: at,
            };
            if let Err(e) = self.remediation.notify(request).await {
                log::error!("Failed to queue remediation for attempt {}: {}", attempt.id, e);
            }
        }
    }
}

fn resumed_response(exam: &ExamSpec, questions: &[Question], attempt: &Attempt) -> StartAttemptResponse {
    StartAttemptResponse {
        attempt_id: attempt.id.clone(),
        attempt_number: attempt.attempt_number,
        resumed: true,
        questions: restore_view(questions, &attempt.option_mapping),
        time_limit_minutes: exam.effective_time_limit_minutes(),
        passing_score: exam.effective_pass_mark(),
        time_remaining_sec: attempt.time_remaining_sec,
        answers: attempt
            .answers
            .iter()
            .map(|(question_id, answer)| (question_id.clone(), answer.selected_option_id.clone()))
            .collect(),
    }
}

fn not_in_progress(attempt: &Attempt) -> AppError {
    AppError::Conflict {
        message: format!(
            "Attempt {} is {}",
            attempt.id,
            attempt.status.as_str()
        ),
        evaluated: SubmitResponse::from_attempt(attempt).map(Box::new),
    }
}

fn unknown_answer(request: &RecordAnswerRequest) -> AppError {
    AppError::ValidationError(format!(
        "Option {} is not an option of question {}",
        request.selected_option_id, request.question_id
    ))
}

/// Level a pass opens up. Category exams unlock nothing.
pub fn next_unlocks(exam: &ExamSpec, passed: bool) -> Vec<u32> {
    if !passed || exam.exam_type == ExamType::Category {
        return vec![];
    }
    exam.progress_scope()
        .map(ProgressScope::from)
        .and_then(|scope| scope.next_level())
        .into_iter()
        .collect()
}
