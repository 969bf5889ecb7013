use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::models::domain::question::CognitiveSkill;

/// Coverage and structure rules a generated question set must satisfy.
/// Every rule is optional; an empty blueprint accepts anything.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Blueprint {
    #[serde(default)]
    pub required_category_ids: Vec<String>,
    #[serde(default)]
    pub required_concept_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_concept_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_category_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_question_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_multi_concept_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_multi_concept_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cross_category_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cross_category_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_scenario_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_scenario_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frequency_per_concept: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concepts_per_question: Option<u32>,
    #[serde(default)]
    pub difficulty_mix: Vec<DifficultyTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_tolerance: Option<f64>,
    #[serde(default)]
    pub level_clusters: Vec<LevelCluster>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DifficultyTarget {
    pub skill: CognitiveSkill,
    pub share: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LevelCluster {
    pub levels: Vec<u32>,
    pub theme: String,
}

pub const DEFAULT_DIFFICULTY_TOLERANCE: f64 = 0.10;

impl Blueprint {
    /// Minimum count implied by a ratio and/or an absolute count. When both
    /// are present the larger requirement wins.
    pub fn required_count(ratio: Option<f64>, count: Option<u32>, total: usize) -> Option<usize> {
        let from_ratio = ratio.map(|r| (r * total as f64).ceil() as usize);
        let from_count = count.map(|c| c as usize);
        match (from_ratio, from_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn difficulty_tolerance(&self) -> f64 {
        self.difficulty_tolerance
            .unwrap_or(DEFAULT_DIFFICULTY_TOLERANCE)
    }

    /// Fills scope fields the stored blueprint leaves open.
    pub fn with_scope(mut self, concept_ids: Vec<String>, category_ids: Vec<String>) -> Self {
        if self.allowed_concept_ids.is_none() && !concept_ids.is_empty() {
            self.allowed_concept_ids = Some(concept_ids);
        }
        if self.required_category_ids.is_empty() {
            self.required_category_ids = category_ids.clone();
        }
        if self.canonical_category_ids.is_none() && !category_ids.is_empty() {
            self.canonical_category_ids = Some(category_ids);
        }
        self
    }
}

/// How the orchestrator treats validation errors for a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptancePolicy {
    /// Any error triggers a retry.
    Strict,
    /// Only critical errors trigger a retry; structural errors become warnings.
    CriticalOnly,
}

#[derive(Clone, Debug)]
pub struct BossTier {
    pub level: u32,
    pub question_count: u32,
    pub time_limit_minutes: u32,
    pub pass_mark: f64,
    pub difficulty: &'static str,
    pub generation_timeout: Duration,
    pub policy: AcceptancePolicy,
    pub blueprint: Blueprint,
}

fn mix(apply: f64, analyse: f64, judgement: f64) -> Vec<DifficultyTarget> {
    vec![
        DifficultyTarget {
            skill: CognitiveSkill::Apply,
            share: apply,
        },
        DifficultyTarget {
            skill: CognitiveSkill::Analyse,
            share: analyse,
        },
        DifficultyTarget {
            skill: CognitiveSkill::Judgement,
            share: judgement,
        },
    ]
}

fn single_level_clusters(themes: &[(u32, &str)]) -> Vec<LevelCluster> {
    themes
        .iter()
        .map(|(level, theme)| LevelCluster {
            levels: vec![*level],
            theme: theme.to_string(),
        })
        .collect()
}

static BOSS_TIERS: Lazy<Vec<BossTier>> = Lazy::new(|| {
    vec![
        BossTier {
            level: 10,
            question_count: 20,
            time_limit_minutes: 40,
            pass_mark: 75.0,
            difficulty: "intermediate-advanced",
            generation_timeout: Duration::from_secs(60),
            policy: AcceptancePolicy::Strict,
            blueprint: Blueprint {
                expected_question_count: Some(20),
                min_multi_concept_ratio: Some(0.4),
                min_multi_concept_count: Some(8),
                min_cross_category_ratio: Some(0.2),
                min_cross_category_count: Some(4),
                min_scenario_ratio: Some(0.7),
                min_scenario_count: Some(14),
                max_frequency_per_concept: Some(3),
                difficulty_mix: mix(0.4, 0.4, 0.2),
                level_clusters: single_level_clusters(&[
                    (1, "AI fundamentals"),
                    (2, "Governance principles"),
                    (3, "Governance structures"),
                    (4, "Policies and standards"),
                    (5, "AI lifecycle"),
                    (6, "Decision-making"),
                    (7, "Risk identification"),
                    (8, "Data governance"),
                    (9, "Operational controls"),
                ]),
                ..Blueprint::default()
            },
        },
        BossTier {
            level: 20,
            question_count: 20,
            time_limit_minutes: 45,
            pass_mark: 75.0,
            difficulty: "advanced",
            generation_timeout: Duration::from_secs(60),
            policy: AcceptancePolicy::Strict,
            blueprint: Blueprint {
                expected_question_count: Some(20),
                min_multi_concept_ratio: Some(0.7),
                min_multi_concept_count: Some(14),
                min_cross_category_ratio: Some(0.7),
                min_cross_category_count: Some(14),
                min_scenario_ratio: Some(0.7),
                min_scenario_count: Some(14),
                max_frequency_per_concept: Some(4),
                difficulty_mix: mix(0.3, 0.4, 0.3),
                level_clusters: single_level_clusters(&[
                    (11, "Use case design"),
                    (12, "Cross-border context"),
                    (13, "AI Act obligations"),
                    (14, "Impact assessments"),
                    (15, "High-risk AI"),
                    (16, "Assurance"),
                    (17, "Bias and fairness"),
                    (18, "Enforcement and remedies"),
                    (19, "Compliance frameworks"),
                ]),
                ..Blueprint::default()
            },
        },
        BossTier {
            level: 30,
            question_count: 20,
            time_limit_minutes: 50,
            pass_mark: 80.0,
            difficulty: "expert",
            generation_timeout: Duration::from_secs(90),
            policy: AcceptancePolicy::CriticalOnly,
            blueprint: Blueprint {
                expected_question_count: Some(20),
                min_multi_concept_ratio: Some(0.75),
                min_multi_concept_count: Some(15),
                min_cross_category_ratio: Some(0.75),
                min_cross_category_count: Some(15),
                min_scenario_ratio: Some(0.8),
                min_scenario_count: Some(16),
                max_frequency_per_concept: Some(4),
                difficulty_mix: mix(0.1, 0.4, 0.5),
                level_clusters: single_level_clusters(&[
                    (21, "Advanced governance scenarios"),
                    (22, "Multi-jurisdictional governance"),
                    (23, "Ethical frameworks"),
                    (24, "Regulatory sandboxes"),
                    (25, "Case law and precedent"),
                    (26, "Governance models"),
                    (27, "Advanced risk management"),
                    (28, "Strategic compliance"),
                    (29, "Emerging regulations"),
                ]),
                ..Blueprint::default()
            },
        },
        BossTier {
            level: 40,
            question_count: 25,
            time_limit_minutes: 60,
            pass_mark: 85.0,
            difficulty: "expert",
            generation_timeout: Duration::from_secs(90),
            policy: AcceptancePolicy::CriticalOnly,
            blueprint: Blueprint {
                expected_question_count: Some(25),
                min_multi_concept_ratio: Some(1.0),
                min_cross_category_ratio: Some(0.6),
                min_scenario_ratio: Some(1.0),
                max_frequency_per_concept: Some(5),
                max_concepts_per_question: Some(5),
                difficulty_mix: mix(0.05, 0.35, 0.6),
                level_clusters: vec![
                    LevelCluster {
                        levels: (1..=9).collect(),
                        theme: "Foundation".to_string(),
                    },
                    LevelCluster {
                        levels: vec![10],
                        theme: "Foundation mastery".to_string(),
                    },
                    LevelCluster {
                        levels: (11..=19).collect(),
                        theme: "Intermediate".to_string(),
                    },
                    LevelCluster {
                        levels: vec![20],
                        theme: "Intermediate mastery".to_string(),
                    },
                    LevelCluster {
                        levels: (21..=29).collect(),
                        theme: "Advanced".to_string(),
                    },
                    LevelCluster {
                        levels: vec![30],
                        theme: "Advanced mastery".to_string(),
                    },
                    LevelCluster {
                        levels: (31..=39).collect(),
                        theme: "Mastery".to_string(),
                    },
                ],
                ..Blueprint::default()
            },
        },
    ]
});

pub fn boss_tier(level: u32) -> Option<&'static BossTier> {
    BOSS_TIERS.iter().find(|t| t.level == level)
}

pub fn is_boss_level(level: u32) -> bool {
    boss_tier(level).is_some()
}

impl BossTier {
    /// Levels whose concepts the boss exam draws on.
    pub fn concept_levels(&self) -> Vec<u32> {
        let mut levels: Vec<u32> = self
            .blueprint
            .level_clusters
            .iter()
            .flat_map(|c| c.levels.iter().copied())
            .collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }
}
