use std::collections::{BTreeMap, HashMap};

use crate::models::domain::{
    attempt::{AnswerFeedback, AttemptResult, Breakdowns, ConceptPerformance, DimensionStat},
    question::Question,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingConfig {
    pub pass_mark: f64,
}

#[derive(Default)]
struct Bucket {
    correct: u32,
    total: u32,
}

#[derive(Default)]
struct DimensionBuckets(BTreeMap<String, Bucket>);

impl DimensionBuckets {
    fn record(&mut self, key: Option<&str>, correct: bool) {
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            return;
        };
        let bucket = self.0.entry(key.to_string()).or_default();
        bucket.total += 1;
        if correct {
            bucket.correct += 1;
        }
    }

    fn into_stats(self) -> Vec<DimensionStat> {
        self.0
            .into_iter()
            .map(|(key, bucket)| DimensionStat {
                key,
                correct: bucket.correct,
                total: bucket.total,
                score: percentage(bucket.correct, bucket.total),
            })
            .collect()
    }
}

fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

fn selected<'a>(answers: &'a HashMap<String, String>, question: &Question) -> Option<&'a str> {
    answers
        .get(&question.id)
        .map(String::as_str)
        .filter(|s| !s.is_empty())
}

pub struct AssessmentService;

impl AssessmentService {
    /// Grades canonical answers (questionId -> option id) against the answer
    /// key. Unanswered questions are wrong and stay in the denominator.
    pub fn grade(
        questions: &[Question],
        answers: &HashMap<String, String>,
        config: GradingConfig,
    ) -> AttemptResult {
        let mut correct_count = 0u32;
        let mut answered_count = 0u32;
        let mut feedback = Vec::with_capacity(questions.len());
        let mut weak_concept_ids: Vec<String> = Vec::new();

        let mut domain = DimensionBuckets::default();
        let mut difficulty = DimensionBuckets::default();
        let mut jurisdiction = DimensionBuckets::default();
        let mut topic = DimensionBuckets::default();
        let mut concept = DimensionBuckets::default();

        for question in questions {
            let choice = selected(answers, question);
            let is_correct = choice == Some(question.correct_option_id.as_str());

            if let Some(choice) = choice {
                answered_count += 1;
                let tags = &question.tags;
                domain.record(tags.domain.as_deref(), is_correct);
                difficulty.record(tags.difficulty.as_deref(), is_correct);
                jurisdiction.record(tags.jurisdiction.as_deref(), is_correct);
                topic.record(tags.topic.as_deref(), is_correct);
                for concept_id in question.distinct_concepts() {
                    concept.record(Some(concept_id), is_correct);
                }
                log::debug!(
                    "Question {} answered {} (correct: {})",
                    question.id,
                    choice,
                    is_correct
                );
            }

            if is_correct {
                correct_count += 1;
            } else {
                for concept_id in question.distinct_concepts() {
                    if !weak_concept_ids.iter().any(|c| c == concept_id) {
                        weak_concept_ids.push(concept_id.to_string());
                    }
                }
            }

            let selected_option_id = choice.unwrap_or_default().to_string();
            feedback.push(AnswerFeedback {
                question_id: question.id.clone(),
                rationale: question.rationale_for(&selected_option_id).to_string(),
                selected_option_id,
                correct_option_id: question.correct_option_id.clone(),
                is_correct,
            });
        }

        let total_questions = questions.len() as u32;
        let score = percentage(correct_count, total_questions);
        let pass = score >= config.pass_mark;
        let failed_concept_ids = if pass {
            vec![]
        } else {
            weak_concept_ids.clone()
        };

        AttemptResult {
            score,
            raw_score: correct_count,
            total_questions,
            answered_count,
            pass,
            pass_mark: config.pass_mark,
            breakdowns: Breakdowns {
                domain: domain.into_stats(),
                difficulty: difficulty.into_stats(),
                jurisdiction: jurisdiction.into_stats(),
                topic: topic.into_stats(),
                concept: concept.into_stats(),
            },
            answer_feedback: feedback,
            weak_concept_ids,
            failed_concept_ids,
        }
    }

    /// Per concept touched by an answered question: correct only when every
    /// answered question on that concept was correct.
    pub fn concept_performance(
        questions: &[Question],
        answers: &HashMap<String, String>,
    ) -> Vec<ConceptPerformance> {
        let mut outcome: BTreeMap<&str, bool> = BTreeMap::new();
        for question in questions {
            let Some(choice) = selected(answers, question) else {
                continue;
            };
            let is_correct = choice == question.correct_option_id;
            for concept_id in question.distinct_concepts() {
                let entry = outcome.entry(concept_id).or_insert(true);
                *entry = *entry && is_correct;
            }
        }

        outcome
            .into_iter()
            .map(|(concept_id, correct)| ConceptPerformance {
                concept_id: concept_id.to_string(),
                correct,
            })
            .collect()
    }

    pub fn next_attempt_number(existing: impl IntoIterator<Item = u32>) -> u32 {
        existing.into_iter().max().map(|n| n + 1).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::question::OptionRationale;
    use crate::test_utils::fixtures::{question, question_set};

    fn answers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(q, a)| (q.to_string(), a.to_string()))
            .collect()
    }

    #[test]
    fn skipped_questions_stay_in_the_denominator() {
        let questions = question_set(10);
        // Six answered, five of them correct.
        let given = answers(&[
            ("q1", "q1-a"),
            ("q2", "q2-a"),
            ("q3", "q3-a"),
            ("q4", "q4-a"),
            ("q5", "q5-a"),
            ("q6", "q6-b"),
        ]);

        let result = AssessmentService::grade(&questions, &given, GradingConfig { pass_mark: 70.0 });

        assert_eq!(result.score, 50.0);
        assert_eq!(result.raw_score, 5);
        assert_eq!(result.answered_count, 6);
        assert_eq!(result.total_questions, 10);
        assert!(!result.pass);
    }

    #[test]
    fn pass_is_inclusive_of_the_pass_mark() {
        let questions = question_set(4);
        let given = answers(&[("q1", "q1-a"), ("q2", "q2-a"), ("q3", "q3-a")]);

        let result = AssessmentService::grade(&questions, &given, GradingConfig { pass_mark: 75.0 });

        assert_eq!(result.score, 75.0);
        assert!(result.pass);
        assert!(result.failed_concept_ids.is_empty());
        assert_eq!(result.weak_concept_ids, vec!["c4".to_string()]);
    }

    #[test]
    fn scores_are_not_rounded() {
        let questions = question_set(3);
        let given = answers(&[("q1", "q1-a")]);

        let result = AssessmentService::grade(&questions, &given, GradingConfig { pass_mark: 70.0 });

        assert!((result.score - 100.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn unanswered_feedback_has_empty_selection_and_question_rationale() {
        let questions = question_set(2);
        let given = answers(&[("q1", "q1-a"), ("q2", "")]);

        let result = AssessmentService::grade(&questions, &given, GradingConfig { pass_mark: 50.0 });

        let skipped = &result.answer_feedback[1];
        assert_eq!(skipped.selected_option_id, "");
        assert!(!skipped.is_correct);
        assert_eq!(skipped.rationale, "Rationale for q2");
        assert_eq!(result.answered_count, 1);
    }

    #[test]
    fn wrong_choice_feedback_uses_distractor_rationale() {
        let mut q = question("q1", &["c1"], &["cat-1"]);
        q.option_rationales = vec![OptionRationale {
            option_id: "q1-c".into(),
            rationale: "C describes a processor duty".into(),
        }];

        let result = AssessmentService::grade(
            &[q],
            &answers(&[("q1", "q1-c")]),
            GradingConfig { pass_mark: 70.0 },
        );

        assert_eq!(result.answer_feedback[0].rationale, "C describes a processor duty");
        assert_eq!(result.failed_concept_ids, vec!["c1".to_string()]);
    }

    #[test]
    fn breakdowns_cover_answered_questions_only() {
        let mut questions = question_set(3);
        questions[0].tags.domain = Some("Law".into());
        questions[1].tags.domain = Some("Law".into());
        questions[2].tags.domain = Some("Risk".into());
        questions[0].tags.jurisdiction = Some("EU".into());

        let given = answers(&[("q1", "q1-a"), ("q2", "q2-b")]);
        let result = AssessmentService::grade(&questions, &given, GradingConfig { pass_mark: 70.0 });

        assert_eq!(
            result.breakdowns.domain,
            vec![DimensionStat {
                key: "Law".into(),
                correct: 1,
                total: 2,
                score: 50.0,
            }]
        );
        assert_eq!(result.breakdowns.jurisdiction[0].score, 100.0);
        assert!(result.breakdowns.topic.is_empty());
    }

    #[test]
    fn concept_performance_requires_every_answer_on_a_concept_to_be_right() {
        let questions = vec![
            question("q1", &["c1", "c2"], &["cat-1"]),
            question("q2", &["c2"], &["cat-1"]),
            question("q3", &["c3"], &["cat-1"]),
        ];
        let given = answers(&[("q1", "q1-a"), ("q2", "q2-d")]);

        let performance = AssessmentService::concept_performance(&questions, &given);

        assert_eq!(
            performance,
            vec![
                ConceptPerformance {
                    concept_id: "c1".into(),
                    correct: true,
                },
                ConceptPerformance {
                    concept_id: "c2".into(),
                    correct: false,
                },
            ]
        );
    }

    #[test]
    fn next_attempt_number_follows_the_highest_existing() {
        assert_eq!(AssessmentService::next_attempt_number(vec![]), 1);
        assert_eq!(AssessmentService::next_attempt_number(vec![1, 3, 2]), 4);
    }
}
