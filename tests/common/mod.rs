#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use mastery_exam_server::{
    errors::{AppError, AppResult},
    models::domain::{
        attempt::{Attempt, AttemptStatus, ConceptPerformance, RecordedAnswer},
        exam::{ExamSpec, ExamType, GenerationConfig},
        progress::{ConceptProgress, ConceptRef, ProgressRecord, ProgressScope, RemediationRequest},
        question::{Question, QuestionOption, QuestionTags},
    },
    repositories::{
        AttemptRepository, ConceptCatalog, ConceptProgressRepository, ConceptScope,
        EvaluationWrite, ExamRepository, ProgressRepository, RemediationNotifier,
    },
    services::{
        generation_orchestrator::GenerationSettings,
        progression_gate::CooldownPolicy,
        question_generator::{GeneratedQuestionSet, GenerationRequest},
        AttemptService, ExamUser, GenerationOrchestrator, ProgressionGate, QuestionGenerator,
    },
};

#[derive(Default)]
pub struct InMemoryExamRepository {
    pub exams: Arc<RwLock<HashMap<String, ExamSpec>>>,
}

#[async_trait]
impl ExamRepository for InMemoryExamRepository {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<ExamSpec>> {
        let exams = self.exams.read().await;
        Ok(exams.get(id).cloned())
    }

    async fn create(&self, exam: ExamSpec) -> AppResult<ExamSpec> {
        let mut exams = self.exams.write().await;
        if exams.contains_key(&exam.id) {
            return Err(AppError::conflict(format!("Exam {} already exists", exam.id)));
        }
        exams.insert(exam.id.clone(), exam.clone());
        Ok(exam)
    }

    async fn save_question_set(
        &self,
        exam_id: &str,
        questions: &[Question],
        system_instructions: &str,
        generation_config: &GenerationConfig,
    ) -> AppResult<bool> {
        let mut exams = self.exams.write().await;
        let exam = exams
            .get_mut(exam_id)
            .ok_or_else(|| AppError::NotFound(format!("Exam {} not found", exam_id)))?;
        if exam.has_question_set() {
            return Ok(false);
        }
        exam.question_set = Some(questions.to_vec());
        exam.system_instructions = Some(system_instructions.to_string());
        exam.generation_config = Some(generation_config.clone());
        exam.modified_at = Some(Utc::now());
        Ok(true)
    }
}

/// Mirrors the unique (user, exam, attempt number) index and the
/// status-guarded updates of the Mongo implementation.
#[derive(Default)]
pub struct InMemoryAttemptRepository {
    pub attempts: Arc<RwLock<HashMap<String, Attempt>>>,
}

impl InMemoryAttemptRepository {
    /// Rewinds submission times so cooldown windows can be crossed.
    pub async fn shift_submissions(&self, by: chrono::Duration) {
        let mut attempts = self.attempts.write().await;
        for attempt in attempts.values_mut() {
            attempt.submitted_at = attempt.submitted_at.map(|at| at - by);
        }
    }
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn create(&self, attempt: Attempt) -> AppResult<Attempt> {
        let mut attempts = self.attempts.write().await;
        let taken = attempts.values().any(|a| {
            a.user_id == attempt.user_id
                && a.exam_id == attempt.exam_id
                && a.attempt_number == attempt.attempt_number
        });
        if taken || attempts.contains_key(&attempt.id) {
            return Err(AppError::conflict(format!(
                "Attempt {} for exam {} already exists",
                attempt.attempt_number, attempt.exam_id
            )));
        }
        attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(attempt)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(id).cloned())
    }

    async fn find_by_user_and_exam(&self, user_id: &str, exam_id: &str) -> AppResult<Vec<Attempt>> {
        let attempts = self.attempts.read().await;
        let mut items: Vec<Attempt> = attempts
            .values()
            .filter(|a| a.user_id == user_id && a.exam_id == exam_id)
            .cloned()
            .collect();
        items.sort_by_key(|a| a.attempt_number);
        Ok(items)
    }

    async fn find_in_progress(&self, user_id: &str, exam_id: &str) -> AppResult<Option<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .filter(|a| a.user_id == user_id && a.exam_id == exam_id && a.is_in_progress())
            .max_by_key(|a| a.attempt_number)
            .cloned())
    }

    async fn record_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: RecordedAnswer,
    ) -> AppResult<bool> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.is_in_progress() => {
                attempt.answers.insert(question_id.to_string(), answer);
                attempt.modified_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pause(
        &self,
        attempt_id: &str,
        time_remaining_sec: u32,
        paused_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.is_in_progress() => {
                attempt.time_remaining_sec = Some(time_remaining_sec);
                attempt.paused_at = Some(paused_at);
                attempt.modified_at = Some(paused_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_evaluated(&self, attempt_id: &str, write: EvaluationWrite) -> AppResult<bool> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.is_in_progress() => {
                attempt.status = AttemptStatus::Evaluated;
                attempt.answers = write.answers;
                attempt.submitted_at = Some(write.submitted_at);
                attempt.evaluated_at = Some(write.evaluated_at);
                attempt.time_spent_sec = write.time_spent_sec;
                attempt.result = Some(write.result);
                attempt.modified_at = Some(write.evaluated_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryProgressRepository {
    pub records: Arc<RwLock<HashMap<(String, String), ProgressRecord>>>,
}

impl InMemoryProgressRepository {
    pub async fn mark_passed(&self, user_id: &str, level: u32) {
        let scope = ProgressScope::Level(level);
        let mut records = self.records.write().await;
        records
            .entry((user_id.to_string(), scope.key()))
            .or_insert_with(|| ProgressRecord::new(user_id, scope))
            .apply_evaluation(100.0, true, Utc::now());
    }
}

#[async_trait]
impl ProgressRepository for InMemoryProgressRepository {
    async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<ProgressRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_one(&self, user_id: &str, scope: &ProgressScope) -> AppResult<Option<ProgressRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(user_id.to_string(), scope.key())).cloned())
    }

    async fn record_evaluation(
        &self,
        user_id: &str,
        scope: &ProgressScope,
        score: f64,
        passed: bool,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        records
            .entry((user_id.to_string(), scope.key()))
            .or_insert_with(|| ProgressRecord::new(user_id, scope.clone()))
            .apply_evaluation(score, passed, at);
        Ok(())
    }

    async fn unlock(&self, user_id: &str, scope: &ProgressScope, at: DateTime<Utc>) -> AppResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry((user_id.to_string(), scope.key()))
            .or_insert_with(|| ProgressRecord::new(user_id, scope.clone()));
        record.unlocked = true;
        record.modified_at = Some(at);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConceptProgressRepository {
    pub records: Arc<RwLock<HashMap<(String, String), ConceptProgress>>>,
}

#[async_trait]
impl ConceptProgressRepository for InMemoryConceptProgressRepository {
    async fn record_performance(
        &self,
        user_id: &str,
        performance: &[ConceptPerformance],
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        for entry in performance {
            records
                .entry((user_id.to_string(), entry.concept_id.clone()))
                .or_insert_with(|| ConceptProgress::new(user_id, entry.concept_id.clone()))
                .record(entry.correct, at);
        }
        Ok(())
    }

    async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<ConceptProgress>> {
        let records = self.records.read().await;
        let mut items: Vec<ConceptProgress> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.concept_id.cmp(&b.concept_id));
        Ok(items)
    }
}

/// Catalog with `per_scope` concepts for every level and category.
pub struct InMemoryConceptCatalog {
    pub per_scope: usize,
}

#[async_trait]
impl ConceptCatalog for InMemoryConceptCatalog {
    async fn concepts_for_scope(&self, scope: &ConceptScope) -> AppResult<Vec<ConceptRef>> {
        let concepts = match scope {
            ConceptScope::Levels(levels) => levels
                .iter()
                .flat_map(|level| {
                    (1..=self.per_scope).map(move |i| ConceptRef {
                        id: format!("l{}-c{}", level, i),
                        name: format!("Level {} concept {}", level, i),
                        category_id: format!("cat-{}", i % 3 + 1),
                        level_number: Some(*level),
                    })
                })
                .collect(),
            ConceptScope::Category(category_id) => (1..=self.per_scope)
                .map(|i| ConceptRef {
                    id: format!("{}-c{}", category_id, i),
                    name: format!("{} concept {}", category_id, i),
                    category_id: category_id.clone(),
                    level_number: None,
                })
                .collect(),
        };
        Ok(concepts)
    }
}

#[derive(Default)]
pub struct RecordingRemediationNotifier {
    pub requests: Arc<RwLock<Vec<RemediationRequest>>>,
}

#[async_trait]
impl RemediationNotifier for RecordingRemediationNotifier {
    async fn notify(&self, request: RemediationRequest) -> AppResult<()> {
        self.requests.write().await.push(request);
        Ok(())
    }
}

/// Builds one single-concept question per requested slot, cycling through
/// the concepts in scope. Correct answers are `{id}-a`, except for a
/// diverging generator whose later calls key `{id}-b`.
#[derive(Default)]
pub struct CannedQuestionGenerator {
    pub calls: AtomicUsize,
    first_call_delay: Option<std::time::Duration>,
}

impl CannedQuestionGenerator {
    /// First call is slow, later calls are fast and use a different answer key.
    pub fn diverging(first_call_delay: std::time::Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            first_call_delay: Some(first_call_delay),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionGenerator for CannedQuestionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<GeneratedQuestionSet> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let key = match self.first_call_delay {
            Some(delay) if call == 0 => {
                tokio::time::sleep(delay).await;
                "a"
            }
            Some(_) => "b",
            None => "a",
        };
        let questions = (0..request.question_count as usize)
            .map(|i| {
                let concept = &request.concepts[i % request.concepts.len()];
                let mut q = question(
                    &format!("{}-q{}", request.exam_id, i + 1),
                    &[concept.id.as_str()],
                    &[concept.category_id.as_str()],
                );
                q.correct_option_id = format!("{}-{}", q.id, key);
                q
            })
            .collect();
        Ok(GeneratedQuestionSet { questions })
    }
}

/// Reads work, writes fail. Stands in for an unavailable progress store.
#[derive(Default)]
pub struct FailingProgressRepository;

#[async_trait]
impl ProgressRepository for FailingProgressRepository {
    async fn find_for_user(&self, _user_id: &str) -> AppResult<Vec<ProgressRecord>> {
        Ok(vec![])
    }

    async fn find_one(&self, _user_id: &str, _scope: &ProgressScope) -> AppResult<Option<ProgressRecord>> {
        Ok(None)
    }

    async fn record_evaluation(
        &self,
        _user_id: &str,
        _scope: &ProgressScope,
        _score: f64,
        _passed: bool,
        _at: DateTime<Utc>,
    ) -> AppResult<()> {
        Err(AppError::DatabaseError("progress store unavailable".to_string()))
    }

    async fn unlock(&self, _user_id: &str, _scope: &ProgressScope, _at: DateTime<Utc>) -> AppResult<()> {
        Err(AppError::DatabaseError("progress store unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct FailingConceptProgressRepository;

#[async_trait]
impl ConceptProgressRepository for FailingConceptProgressRepository {
    async fn record_performance(
        &self,
        _user_id: &str,
        _performance: &[ConceptPerformance],
        _at: DateTime<Utc>,
    ) -> AppResult<()> {
        Err(AppError::DatabaseError("concept store unavailable".to_string()))
    }

    async fn find_for_user(&self, _user_id: &str) -> AppResult<Vec<ConceptProgress>> {
        Err(AppError::DatabaseError("concept store unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct FailingRemediationNotifier;

#[async_trait]
impl RemediationNotifier for FailingRemediationNotifier {
    async fn notify(&self, _request: RemediationRequest) -> AppResult<()> {
        Err(AppError::InternalError("remediation queue unavailable".to_string()))
    }
}

/// Yields after every attempt read so two requests on one attempt both see
/// it before either writes.
pub struct InterleavingAttemptRepository {
    pub inner: Arc<InMemoryAttemptRepository>,
}

#[async_trait]
impl AttemptRepository for InterleavingAttemptRepository {
    async fn create(&self, attempt: Attempt) -> AppResult<Attempt> {
        self.inner.create(attempt).await
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Attempt>> {
        let found = self.inner.find_by_id(id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn find_by_user_and_exam(&self, user_id: &str, exam_id: &str) -> AppResult<Vec<Attempt>> {
        self.inner.find_by_user_and_exam(user_id, exam_id).await
    }

    async fn find_in_progress(&self, user_id: &str, exam_id: &str) -> AppResult<Option<Attempt>> {
        self.inner.find_in_progress(user_id, exam_id).await
    }

    async fn record_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: RecordedAnswer,
    ) -> AppResult<bool> {
        self.inner.record_answer(attempt_id, question_id, answer).await
    }

    async fn pause(
        &self,
        attempt_id: &str,
        time_remaining_sec: u32,
        paused_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner.pause(attempt_id, time_remaining_sec, paused_at).await
    }

    async fn mark_evaluated(&self, attempt_id: &str, write: EvaluationWrite) -> AppResult<bool> {
        self.inner.mark_evaluated(attempt_id, write).await
    }
}

/// Four-option question whose correct answer is `{id}-a`.
pub fn question(id: &str, concept_ids: &[&str], category_ids: &[&str]) -> Question {
    Question {
        id: id.to_string(),
        stem: format!("Stem for {}", id),
        options: ["a", "b", "c", "d"]
            .iter()
            .map(|suffix| QuestionOption {
                id: format!("{}-{}", id, suffix),
                text: format!("Option {} of {}", suffix, id),
            })
            .collect(),
        correct_option_id: format!("{}-a", id),
        rationale: format!("Rationale for {}", id),
        option_rationales: vec![],
        tags: QuestionTags {
            concept_ids: concept_ids.iter().map(|c| c.to_string()).collect(),
            category_ids: category_ids.iter().map(|c| c.to_string()).collect(),
            ..QuestionTags::default()
        },
    }
}

/// `count` questions q1..qN over concepts c1..cN.
pub fn question_set(count: usize) -> Vec<Question> {
    (1..=count)
        .map(|i| question(&format!("q{}", i), &[&format!("c{}", i)], &["cat-1"]))
        .collect()
}

pub fn exam(id: &str, exam_type: ExamType, level: Option<u32>, category: Option<&str>) -> ExamSpec {
    let now = Utc::now();
    ExamSpec {
        id: id.to_string(),
        exam_type,
        level_number: level,
        category_id: category.map(str::to_string),
        title: format!("Exam {}", id),
        question_count: 10,
        time_limit_minutes: 20,
        pass_mark: 70.0,
        difficulty: "intermediate".to_string(),
        blueprint: None,
        question_set: None,
        system_instructions: None,
        generation_config: None,
        created_at: Some(now),
        modified_at: Some(now),
    }
}

pub fn level_exam(id: &str, level: u32) -> ExamSpec {
    exam(id, ExamType::Level, Some(level), None)
}

pub fn category_exam(id: &str, category_id: &str) -> ExamSpec {
    exam(id, ExamType::Category, None, Some(category_id))
}

pub fn free_user(id: &str) -> ExamUser {
    ExamUser {
        id: id.to_string(),
        is_premium: false,
    }
}

pub fn premium_user(id: &str) -> ExamUser {
    ExamUser {
        id: id.to_string(),
        is_premium: true,
    }
}

/// Service wired to in-memory collaborators, with handles kept for
/// assertions.
pub struct Harness {
    pub service: AttemptService,
    pub exams: Arc<InMemoryExamRepository>,
    pub attempts: Arc<InMemoryAttemptRepository>,
    pub progress: Arc<InMemoryProgressRepository>,
    pub concept_progress: Arc<InMemoryConceptProgressRepository>,
    pub remediation: Arc<RecordingRemediationNotifier>,
    pub generator: Arc<CannedQuestionGenerator>,
}

/// Attempt service over the given collaborators, with a five-concept catalog
/// and a premium threshold of 10.
pub fn attempt_service(
    exams: Arc<dyn ExamRepository>,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
    concept_progress: Arc<dyn ConceptProgressRepository>,
    remediation: Arc<dyn RemediationNotifier>,
    generator: Arc<dyn QuestionGenerator>,
) -> AttemptService {
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        generator,
        Arc::new(InMemoryConceptCatalog { per_scope: 5 }),
        exams.clone(),
        GenerationSettings::default(),
    ));

    AttemptService::new(
        exams,
        attempts,
        progress,
        concept_progress,
        remediation,
        orchestrator,
        ProgressionGate::new(CooldownPolicy::default(), 10),
    )
}

impl Harness {
    pub fn new() -> Self {
        Self::with_generator(CannedQuestionGenerator::default())
    }

    pub fn with_generator(generator: CannedQuestionGenerator) -> Self {
        let exams = Arc::new(InMemoryExamRepository::default());
        let attempts = Arc::new(InMemoryAttemptRepository::default());
        let progress = Arc::new(InMemoryProgressRepository::default());
        let concept_progress = Arc::new(InMemoryConceptProgressRepository::default());
        let remediation = Arc::new(RecordingRemediationNotifier::default());
        let generator = Arc::new(generator);

        let service = attempt_service(
            exams.clone(),
            attempts.clone(),
            progress.clone(),
            concept_progress.clone(),
            remediation.clone(),
            generator.clone(),
        );

        Self {
            service,
            exams,
            attempts,
            progress,
            concept_progress,
            remediation,
            generator,
        }
    }

    pub async fn add_exam(&self, exam: ExamSpec) {
        self.exams
            .create(exam)
            .await
            .expect("exam fixture should be new");
    }
}
