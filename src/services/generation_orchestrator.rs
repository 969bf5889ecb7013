use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::domain::{
        blueprint::{AcceptancePolicy, Blueprint},
        exam::{ExamSpec, ExamType, GenerationConfig},
        question::Question,
    },
    repositories::{ConceptCatalog, ConceptScope, ExamRepository},
    services::{
        composition_validator,
        option_shuffler::analyze_answer_distribution,
        question_generator::{build_system_instructions, GenerationRequest, QuestionGenerator},
    },
};

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Budget for one generator call on non-boss exams. Boss tiers carry
    /// their own.
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            max_retries: 2,
        }
    }
}

pub struct GenerationOrchestrator {
    generator: Arc<dyn QuestionGenerator>,
    catalog: Arc<dyn ConceptCatalog>,
    exam_repository: Arc<dyn ExamRepository>,
    settings: GenerationSettings,
}

impl GenerationOrchestrator {
    pub fn new(
        generator: Arc<dyn QuestionGenerator>,
        catalog: Arc<dyn ConceptCatalog>,
        exam_repository: Arc<dyn ExamRepository>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            generator,
            catalog,
            exam_repository,
            settings,
        }
    }

    /// Runs generation on its own task so an abandoned request does not
    /// cancel it. The set is persisted either way.
    pub async fn generate_detached(self: &Arc<Self>, exam: ExamSpec) -> AppResult<Vec<Question>> {
        let orchestrator = Arc::clone(self);
        let exam_id = exam.id.clone();
        let handle = tokio::spawn(async move {
            let blueprint = exam.effective_blueprint();
            orchestrator.generate_and_validate(&exam, blueprint).await
        });

        handle.await.map_err(|e| {
            AppError::InternalError(format!("Generation task for exam {} failed: {}", exam_id, e))
        })?
    }

    pub async fn generate_and_validate(
        &self,
        exam: &ExamSpec,
        blueprint: Option<Blueprint>,
    ) -> AppResult<Vec<Question>> {
        let scope = concept_scope(exam)?;
        let concepts = self.catalog.concepts_for_scope(&scope).await?;
        if concepts.is_empty() {
            return Err(AppError::GenerationFailed(format!(
                "No concepts found for exam {} ({:?})",
                exam.id, scope
            )));
        }

        let concept_ids: Vec<String> = concepts.iter().map(|c| c.id.clone()).collect();
        let mut category_ids: Vec<String> = concepts.iter().map(|c| c.category_id.clone()).collect();
        category_ids.sort();
        category_ids.dedup();

        let blueprint = blueprint.map(|b| b.with_scope(concept_ids, category_ids));
        let tier = exam.boss_tier();
        let policy = tier.map(|t| t.policy).unwrap_or(AcceptancePolicy::Strict);
        let timeout = tier
            .map(|t| t.generation_timeout)
            .unwrap_or(self.settings.timeout);

        let mut request = GenerationRequest {
            exam_id: exam.id.clone(),
            exam_type: exam.exam_type,
            title: exam.title.clone(),
            level_number: exam.level_number,
            category_id: exam.category_id.clone(),
            question_count: exam.effective_question_count(),
            difficulty: tier
                .map(|t| t.difficulty.to_string())
                .unwrap_or_else(|| exam.difficulty.clone()),
            concepts,
            required_category_ids: vec![],
            level_clusters: vec![],
            difficulty_mix: vec![],
            max_frequency_per_concept: None,
            system_instructions: String::new(),
            feedback: vec![],
        };
        if exam.exam_type == ExamType::Boss {
            if let Some(bp) = &blueprint {
                request.required_category_ids = bp.required_category_ids.clone();
                request.level_clusters = bp.level_clusters.clone();
                request.difficulty_mix = bp.difficulty_mix.clone();
                request.max_frequency_per_concept = bp.max_frequency_per_concept;
            }
        }
        request.system_instructions = build_system_instructions(&request);

        let total_attempts = self.settings.max_retries + 1;
        let mut last_failure = String::new();

        for attempt in 1..=total_attempts {
            log::info!(
                "Generating question set for exam {} (attempt {}/{})",
                exam.id,
                attempt,
                total_attempts
            );

            let generated = match tokio::time::timeout(timeout, self.generator.generate(&request)).await {
                Err(_) => {
                    last_failure = format!("generation timed out after {}s", timeout.as_secs());
                    log::warn!("Exam {} attempt {}: {}", exam.id, attempt, last_failure);
                    continue;
                }
                Ok(Err(e)) => {
                    last_failure = e.to_string();
                    log::warn!("Exam {} attempt {}: {}", exam.id, attempt, last_failure);
                    continue;
                }
                Ok(Ok(set)) => set,
            };

            let questions = assign_missing_ids(generated.questions);
            if let Err(problem) = check_shape(&questions) {
                last_failure = problem;
                log::warn!("Exam {} attempt {}: {}", exam.id, attempt, last_failure);
                request.feedback = vec![last_failure.clone()];
                continue;
            }

            let warnings = match &blueprint {
                Some(bp) => {
                    let report = composition_validator::validate(&questions, bp);
                    if report.requires_retry(policy) {
                        last_failure = report.errors.join("; ");
                        log::warn!(
                            "Exam {} attempt {} failed composition: {}",
                            exam.id,
                            attempt,
                            last_failure
                        );
                        request.feedback = report.errors;
                        continue;
                    }
                    report.accepted_warnings()
                }
                None => vec![],
            };

            for warning in &warnings {
                log::warn!("Exam {} accepted with warning: {}", exam.id, warning);
            }

            let distribution = analyze_answer_distribution(&questions);
            if distribution.is_balanced {
                log::info!("Exam {} answer keys: {:?}", exam.id, distribution.distribution);
            } else {
                log::warn!("Exam {}: {}", exam.id, distribution.recommendation);
            }

            let generation_config = GenerationConfig {
                pass_mark: exam.effective_pass_mark(),
                is_boss: exam.is_boss(),
                generated_at: Utc::now(),
                attempts_used: attempt,
                warnings,
            };
            let stored = self
                .exam_repository
                .save_question_set(
                    &exam.id,
                    &questions,
                    &request.system_instructions,
                    &generation_config,
                )
                .await?;
            if !stored {
                return self.stored_question_set(&exam.id).await;
            }

            log::info!(
                "Stored {} questions for exam {} after {} attempt(s)",
                questions.len(),
                exam.id,
                attempt
            );
            return Ok(questions);
        }

        Err(AppError::GenerationFailed(format!(
            "Question generation for exam {} failed after {} attempts: {}",
            exam.id, total_attempts, last_failure
        )))
    }

    /// The set a concurrent generation stored first. Attempts must be built
    /// from it so grading uses the same answer key.
    async fn stored_question_set(&self, exam_id: &str) -> AppResult<Vec<Question>> {
        log::info!(
            "Exam {} was filled by a concurrent generation, using the stored set",
            exam_id
        );
        self.exam_repository
            .find_by_id(exam_id)
            .await?
            .and_then(|exam| exam.question_set)
            .filter(|questions| !questions.is_empty())
            .ok_or_else(|| {
                AppError::InternalError(format!("Exam {} lost its question set", exam_id))
            })
    }
}

fn concept_scope(exam: &ExamSpec) -> AppResult<ConceptScope> {
    if let Some(tier) = exam.boss_tier() {
        return Ok(ConceptScope::Levels(tier.concept_levels()));
    }
    match (exam.exam_type, exam.level_number, exam.category_id.as_deref()) {
        (ExamType::Category, _, Some(category_id)) => {
            Ok(ConceptScope::Category(category_id.to_string()))
        }
        (ExamType::Level | ExamType::Boss, Some(level), _) => Ok(ConceptScope::Levels(vec![level])),
        _ => Err(AppError::ValidationError(format!(
            "Exam {} has no level or category to generate for",
            exam.id
        ))),
    }
}

fn assign_missing_ids(questions: Vec<Question>) -> Vec<Question> {
    let mut seen = HashSet::new();
    questions
        .into_iter()
        .map(|mut question| {
            if question.id.trim().is_empty() || !seen.insert(question.id.clone()) {
                question.id = Uuid::new_v4().to_string();
                seen.insert(question.id.clone());
            }
            question
        })
        .collect()
}

fn check_shape(questions: &[Question]) -> Result<(), String> {
    if questions.is_empty() {
        return Err("generator returned no questions".to_string());
    }
    for question in questions {
        if question.stem.trim().is_empty() {
            return Err(format!("question {} has an empty stem", question.id));
        }
        if question.options.len() < 2 {
            return Err(format!("question {} has fewer than two options", question.id));
        }
        let distinct: HashSet<&str> = question.options.iter().map(|o| o.id.as_str()).collect();
        if distinct.len() != question.options.len() {
            return Err(format!("question {} repeats an option id", question.id));
        }
        if !question.has_option(&question.correct_option_id) {
            return Err(format!(
                "question {} marks {} correct but has no such option",
                question.id, question.correct_option_id
            ));
        }
    }
    Ok(())
}
