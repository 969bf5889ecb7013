use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::domain::{
    blueprint::{AcceptancePolicy, Blueprint},
    question::{CognitiveSkill, Question},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingCategory,
    MultiConceptShortfall,
    CrossCategoryShortfall,
    ScenarioShortfall,
    ConceptOutOfScope,
    NonCanonicalCategory,
    ConceptOverused,
    MissingConcept,
    TooManyConcepts,
    QuestionCountMismatch,
    DifficultyDrift,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Coverage the exam cannot ship without. Always retried.
    Critical,
    /// Shape problems. Retried only under the strict policy.
    Structural,
    /// Drift from targets. Never retried.
    Soft,
}

impl IssueKind {
    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::MissingCategory
            | IssueKind::MultiConceptShortfall
            | IssueKind::CrossCategoryShortfall
            | IssueKind::ScenarioShortfall => Severity::Critical,
            IssueKind::DifficultyDrift => Severity::Soft,
            _ => Severity::Structural,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompositionIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl CompositionIssue {
    fn new(kind: IssueKind, message: String) -> Self {
        Self { kind, message }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CompositionStats {
    pub total: usize,
    pub multi_concept_count: usize,
    pub cross_category_count: usize,
    pub scenario_count: usize,
    pub concept_frequency: BTreeMap<String, usize>,
    pub category_coverage: BTreeMap<String, usize>,
    pub skill_distribution: BTreeMap<CognitiveSkill, usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompositionReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub issues: Vec<CompositionIssue>,
    pub stats: CompositionStats,
}

impl CompositionReport {
    pub fn has_critical(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity() == Severity::Critical)
    }

    /// Whether the tier policy demands another generation attempt.
    pub fn requires_retry(&self, policy: AcceptancePolicy) -> bool {
        match policy {
            AcceptancePolicy::Strict => !self.is_valid,
            AcceptancePolicy::CriticalOnly => self.has_critical(),
        }
    }

    /// Everything a caller accepting this set should record as a warning.
    pub fn accepted_warnings(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|i| i.severity() != Severity::Critical)
            .map(|i| i.message.clone())
            .collect()
    }
}

fn collect_stats(questions: &[Question]) -> CompositionStats {
    let mut stats = CompositionStats {
        total: questions.len(),
        ..CompositionStats::default()
    };

    for question in questions {
        if question.is_multi_concept() {
            stats.multi_concept_count += 1;
        }
        if question.is_cross_category() {
            stats.cross_category_count += 1;
        }
        if question.is_scenario() {
            stats.scenario_count += 1;
        }
        for concept in question.distinct_concepts() {
            *stats.concept_frequency.entry(concept.to_string()).or_default() += 1;
        }
        for category in question.distinct_categories() {
            *stats.category_coverage.entry(category.to_string()).or_default() += 1;
        }
        if let Some(skill) = question.tags.cognitive_skill {
            *stats.skill_distribution.entry(skill).or_default() += 1;
        }
    }

    stats
}

/// Checks a question set against a blueprint. Pure: the same inputs always
/// produce the same report, issues in the same order.
pub fn validate(questions: &[Question], blueprint: &Blueprint) -> CompositionReport {
    let stats = collect_stats(questions);
    let mut issues = Vec::new();

    if let Some(expected) = blueprint.expected_question_count {
        if stats.total != expected as usize {
            issues.push(CompositionIssue::new(
                IssueKind::QuestionCountMismatch,
                format!("Question count: {} (expected: {})", stats.total, expected),
            ));
        }
    }

    let allowed: Option<BTreeSet<&str>> = blueprint
        .allowed_concept_ids
        .as_ref()
        .map(|ids| ids.iter().map(String::as_str).collect());
    let canonical: Option<BTreeSet<&str>> = blueprint
        .canonical_category_ids
        .as_ref()
        .map(|ids| ids.iter().map(String::as_str).collect());

    for question in questions {
        if let Some(allowed) = &allowed {
            for concept in question.distinct_concepts() {
                if !allowed.contains(concept) {
                    issues.push(CompositionIssue::new(
                        IssueKind::ConceptOutOfScope,
                        format!(
                            "Question {} references concept {} outside the allowed scope",
                            question.id, concept
                        ),
                    ));
                }
            }
        }
        if let Some(canonical) = &canonical {
            for category in question.distinct_categories() {
                if !canonical.contains(category) {
                    issues.push(CompositionIssue::new(
                        IssueKind::NonCanonicalCategory,
                        format!(
                            "Question {} references non-canonical category {}",
                            question.id, category
                        ),
                    ));
                }
            }
        }
        if let Some(max) = blueprint.max_concepts_per_question {
            let count = question.distinct_concepts().len();
            if count > max as usize {
                issues.push(CompositionIssue::new(
                    IssueKind::TooManyConcepts,
                    format!(
                        "Question {} references {} concepts (max: {})",
                        question.id, count, max
                    ),
                ));
            }
        }
    }

    for category in &blueprint.required_category_ids {
        if !stats.category_coverage.contains_key(category) {
            issues.push(CompositionIssue::new(
                IssueKind::MissingCategory,
                format!("Required category {} is not covered by any question", category),
            ));
        }
    }

    for concept in &blueprint.required_concept_ids {
        if !stats.concept_frequency.contains_key(concept) {
            issues.push(CompositionIssue::new(
                IssueKind::MissingConcept,
                format!("Required concept {} is not assessed", concept),
            ));
        }
    }

    if let Some(max) = blueprint.max_frequency_per_concept {
        for (concept, count) in &stats.concept_frequency {
            if *count > max as usize {
                issues.push(CompositionIssue::new(
                    IssueKind::ConceptOverused,
                    format!("Concept {} appears in {} questions (max: {})", concept, count, max),
                ));
            }
        }
    }

    let minimums = [
        (
            IssueKind::MultiConceptShortfall,
            "Multi-concept questions",
            stats.multi_concept_count,
            Blueprint::required_count(
                blueprint.min_multi_concept_ratio,
                blueprint.min_multi_concept_count,
                stats.total,
            ),
        ),
        (
            IssueKind::CrossCategoryShortfall,
            "Cross-category questions",
            stats.cross_category_count,
            Blueprint::required_count(
                blueprint.min_cross_category_ratio,
                blueprint.min_cross_category_count,
                stats.total,
            ),
        ),
        (
            IssueKind::ScenarioShortfall,
            "Scenario-based questions",
            stats.scenario_count,
            Blueprint::required_count(
                blueprint.min_scenario_ratio,
                blueprint.min_scenario_count,
                stats.total,
            ),
        ),
    ];
    for (kind, label, actual, required) in minimums {
        if let Some(required) = required {
            if actual < required {
                issues.push(CompositionIssue::new(
                    kind,
                    format!("{}: {} (required: {})", label, actual, required),
                ));
            }
        }
    }

    if stats.total > 0 {
        let tolerance = blueprint.difficulty_tolerance();
        for target in &blueprint.difficulty_mix {
            let count = stats
                .skill_distribution
                .get(&target.skill)
                .copied()
                .unwrap_or(0);
            let realised = count as f64 / stats.total as f64;
            if (realised - target.share).abs() > tolerance {
                issues.push(CompositionIssue::new(
                    IssueKind::DifficultyDrift,
                    format!(
                        "Difficulty mix for {}: {:.0}% (target: {:.0}% +/- {:.0}%)",
                        target.skill.as_str(),
                        realised * 100.0,
                        target.share * 100.0,
                        tolerance * 100.0
                    ),
                ));
            }
        }
    }

    let (warnings, errors): (Vec<&CompositionIssue>, Vec<&CompositionIssue>) = issues
        .iter()
        .partition(|i| i.severity() == Severity::Soft);
    let errors: Vec<String> = errors.into_iter().map(|i| i.message.clone()).collect();
    let warnings: Vec<String> = warnings.into_iter().map(|i| i.message.clone()).collect();

    CompositionReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        issues,
        stats,
    }
}
