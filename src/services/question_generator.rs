use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    constants::exam_prompts::{
        BOSS_EXAM_PROMPT, EXAM_BASE_PROMPT, FINAL_BOSS_PROMPT, RETRY_FEEDBACK_PROMPT,
    },
    errors::{AppError, AppResult},
    models::domain::{
        blueprint::{DifficultyTarget, LevelCluster},
        exam::ExamType,
        progress::{ConceptRef, MAX_LEVEL},
        question::Question,
    },
};

/// Everything the external generator needs to author one question set.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub exam_id: String,
    pub exam_type: ExamType,
    pub title: String,
    pub level_number: Option<u32>,
    pub category_id: Option<String>,
    pub question_count: u32,
    pub difficulty: String,
    pub concepts: Vec<ConceptRef>,
    pub required_category_ids: Vec<String>,
    pub level_clusters: Vec<LevelCluster>,
    pub difficulty_mix: Vec<DifficultyTarget>,
    pub max_frequency_per_concept: Option<u32>,
    pub system_instructions: String,
    /// Validation errors from the previous attempt.
    pub feedback: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct GeneratedQuestionSet {
    pub questions: Vec<Question>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<GeneratedQuestionSet>;
}

/// Base prompt plus the exam-specific sections.
pub fn build_system_instructions(request: &GenerationRequest) -> String {
    let mut sections = vec![EXAM_BASE_PROMPT.to_string()];

    if request.exam_type == ExamType::Boss {
        sections.push(BOSS_EXAM_PROMPT.to_string());
        if request.level_number == Some(MAX_LEVEL) {
            sections.push(FINAL_BOSS_PROMPT.to_string());
        }
    }

    let concepts = request
        .concepts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {} (ID: {}, category: {})", i + 1, c.name, c.id, c.category_id))
        .collect::<Vec<_>>()
        .join("\n");
    sections.push(format!(
        "## CONCEPTS IN SCOPE\n\nYou may ONLY test these concepts:\n\n{}",
        concepts
    ));

    if !request.required_category_ids.is_empty() {
        let categories = request
            .required_category_ids
            .iter()
            .map(|id| format!("- {}", id))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "## REQUIRED CATEGORIES\n\nEach of these categories must appear in at least one question:\n\n{}",
            categories
        ));
    }

    if !request.level_clusters.is_empty() {
        let clusters = request
            .level_clusters
            .iter()
            .map(|cluster| {
                let levels = cluster
                    .levels
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- Levels {}: {}", levels, cluster.theme)
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("## LEVEL CLUSTERS\n\n{}", clusters));
    }

    if !request.difficulty_mix.is_empty() {
        let mix = request
            .difficulty_mix
            .iter()
            .map(|target| {
                let count = (target.share * request.question_count as f64).round() as u32;
                format!("- {}: about {} questions", target.skill.as_str(), count)
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("## COGNITIVE SKILL MIX\n\n{}", mix));
    }

    let mut parameters = format!(
        "## EXAM PARAMETERS\n\n* Title: {}\n* Difficulty: {}\n* Number of questions: {}",
        request.title, request.difficulty, request.question_count
    );
    if let Some(max) = request.max_frequency_per_concept {
        parameters.push_str(&format!("\n* Maximum questions per concept: {}", max));
    }
    sections.push(parameters);

    sections.join("\n\n---\n\n")
}

fn user_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Generate exactly {} questions for \"{}\" following every rule above.",
        request.question_count, request.title
    );
    if !request.feedback.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(RETRY_FEEDBACK_PROMPT);
        for issue in &request.feedback {
            prompt.push_str(&format!("\n- {}", issue));
        }
    }
    prompt
}

/// Parses model output, tolerating a markdown code fence around the JSON.
pub fn parse_question_set(content: &str) -> AppResult<GeneratedQuestionSet> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|e| {
        AppError::GenerationFailed(format!("Generator returned malformed question set: {}", e))
    })
}

pub struct OpenAiQuestionGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQuestionGenerator {
    pub fn new(api_key: &SecretString, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.expose_secret());
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let schema = schemars::schema_for!(GeneratedQuestionSet);
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_instructions },
                { "role": "user", "content": user_prompt(request) },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "generated_question_set",
                    "schema": schema,
                },
            },
        })
    }
}

#[async_trait]
impl QuestionGenerator for OpenAiQuestionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<GeneratedQuestionSet> {
        log::info!(
            "Requesting {} questions for exam {} from model {}",
            request.question_count,
            request.exam_id,
            self.model
        );

        let response: Value = self
            .client
            .chat()
            .create_byot(self.request_body(request))
            .await
            .map_err(|e| AppError::GenerationFailed(format!("Model call failed: {}", e)))?;

        let content = response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::GenerationFailed("Model returned no content".to_string()))?;

        parse_question_set(content)
    }
}
