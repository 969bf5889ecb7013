use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Question {
    #[serde(default)]
    pub id: String,
    pub stem: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: String,
    pub rationale: String,
    /// Why each distractor is wrong, keyed by option id.
    #[serde(default)]
    pub option_rationales: Vec<OptionRationale>,
    #[serde(default)]
    pub tags: QuestionTags,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct OptionRationale {
    pub option_id: String,
    pub rationale: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct QuestionTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub concept_ids: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub is_case_study: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognitive_skill: Option<CognitiveSkill>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveSkill {
    Recall,
    Understand,
    Apply,
    Analyse,
    Judgement,
}

impl CognitiveSkill {
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveSkill::Recall => "recall",
            CognitiveSkill::Understand => "understand",
            CognitiveSkill::Apply => "apply",
            CognitiveSkill::Analyse => "analyse",
            CognitiveSkill::Judgement => "judgement",
        }
    }
}

impl Question {
    pub fn distinct_concepts(&self) -> BTreeSet<&str> {
        self.tags.concept_ids.iter().map(String::as_str).collect()
    }

    pub fn distinct_categories(&self) -> BTreeSet<&str> {
        self.tags.category_ids.iter().map(String::as_str).collect()
    }

    pub fn is_multi_concept(&self) -> bool {
        self.distinct_concepts().len() >= 2
    }

    pub fn is_cross_category(&self) -> bool {
        self.distinct_categories().len() >= 2
    }

    /// Case studies and apply/judgement items count as scenario questions.
    pub fn is_scenario(&self) -> bool {
        self.tags.is_case_study
            || matches!(
                self.tags.cognitive_skill,
                Some(CognitiveSkill::Apply) | Some(CognitiveSkill::Judgement)
            )
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }

    pub fn rationale_for(&self, selected_option_id: &str) -> &str {
        if selected_option_id != self.correct_option_id {
            if let Some(r) = self
                .option_rationales
                .iter()
                .find(|r| r.option_id == selected_option_id)
            {
                return &r.rationale;
            }
        }
        &self.rationale
    }
}
