use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::domain::{
    blueprint::{boss_tier, Blueprint, BossTier},
    question::Question,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamType {
    Category,
    Level,
    Boss,
}

impl std::fmt::Display for ExamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExamType::Category => write!(f, "CATEGORY"),
            ExamType::Level => write!(f, "LEVEL"),
            ExamType::Boss => write!(f, "BOSS"),
        }
    }
}

/// Exam template. Content configuration owns everything except the cached
/// question set and the generation metadata written next to it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExamSpec {
    pub id: String,
    pub exam_type: ExamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub title: String,
    pub question_count: u32,
    pub time_limit_minutes: u32,
    pub pass_mark: f64,
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<Blueprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_set: Option<Vec<Question>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Metadata persisted with a generated question set.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GenerationConfig {
    pub pass_mark: f64,
    pub is_boss: bool,
    pub generated_at: DateTime<Utc>,
    pub attempts_used: u32,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ExamSpec {
    pub fn is_boss(&self) -> bool {
        self.exam_type == ExamType::Boss
    }

    pub fn boss_tier(&self) -> Option<&'static BossTier> {
        if !self.is_boss() {
            return None;
        }
        self.level_number.and_then(boss_tier)
    }

    /// Pass mark used for grading. Boss tiers carry their own, higher mark.
    pub fn effective_pass_mark(&self) -> f64 {
        self.boss_tier()
            .map(|tier| tier.pass_mark)
            .unwrap_or(self.pass_mark)
    }

    pub fn effective_question_count(&self) -> u32 {
        self.boss_tier()
            .map(|tier| tier.question_count)
            .unwrap_or(self.question_count)
    }

    pub fn effective_time_limit_minutes(&self) -> u32 {
        self.boss_tier()
            .map(|tier| tier.time_limit_minutes)
            .unwrap_or(self.time_limit_minutes)
    }

    /// Stored blueprint, else the boss tier default.
    pub fn effective_blueprint(&self) -> Option<Blueprint> {
        self.blueprint
            .clone()
            .or_else(|| self.boss_tier().map(|tier| tier.blueprint.clone()))
    }

    pub fn has_question_set(&self) -> bool {
        self.question_set
            .as_ref()
            .map(|qs| !qs.is_empty())
            .unwrap_or(false)
    }

    /// Key of the progress record this exam feeds.
    pub fn progress_scope(&self) -> Option<ProgressScopeRef<'_>> {
        match self.exam_type {
            ExamType::Category => self.category_id.as_deref().map(ProgressScopeRef::Category),
            ExamType::Level | ExamType::Boss => self.level_number.map(ProgressScopeRef::Level),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressScopeRef<'a> {
    Level(u32),
    Category(&'a str),
}
