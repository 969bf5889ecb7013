#[cfg(test)]
pub mod fixtures {
    use chrono::Utc;

    use crate::models::domain::{
        exam::{ExamSpec, ExamType},
        question::{Question, QuestionOption, QuestionTags},
    };

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

    /// `count` single-concept questions, q1..qN over concepts c1..cN.
    pub fn question_set(count: usize) -> Vec<Question> {
        (1..=count)
            .map(|i| question(&format!("q{}", i), &[&format!("c{}", i)], &["cat-1"]))
            .collect()
    }

    fn exam(id: &str, exam_type: ExamType) -> ExamSpec {
        let now = Utc::now();
        ExamSpec {
            id: id.to_string(),
            exam_type,
            level_number: None,
            category_id: None,
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
        ExamSpec {
            level_number: Some(level),
            ..exam(id, ExamType::Level)
        }
    }

    pub fn category_exam(id: &str, category_id: &str) -> ExamSpec {
        ExamSpec {
            category_id: Some(category_id.to_string()),
            ..exam(id, ExamType::Category)
        }
    }

    pub fn boss_exam(id: &str, level: u32) -> ExamSpec {
        ExamSpec {
            level_number: Some(level),
            pass_mark: 75.0,
            ..exam(id, ExamType::Boss)
        }
    }
}

#[cfg(test)]
pub mod test_helpers {
    use actix_web::http::StatusCode;

    /// Asserts that a status code represents success (2xx)
    pub fn assert_success_status(status: StatusCode) {
        assert!(
            status.is_success(),
            "Expected success status, got: {}",
            status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;

    #[test]
    fn test_fixture_question_has_four_options() {
        let q = question("q1", &["c1"], &["cat-1"]);
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.correct_option_id, "q1-a");
        assert!(q.has_option("q1-d"));
    }

    #[test]
    fn test_fixture_question_set_uses_distinct_concepts() {
        let set = question_set(3);
        assert_eq!(set.len(), 3);
        assert_eq!(set[2].tags.concept_ids, vec!["c3".to_string()]);
    }
}
