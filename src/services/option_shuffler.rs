use std::collections::{BTreeMap, HashMap};

use rand::{seq::SliceRandom, Rng};

use crate::models::{
    domain::{
        attempt::OptionMapping,
        question::{Question, QuestionOption},
    },
    dto::response::ClientQuestion,
};

/// Client-safe view of a question set plus the table that undoes the shuffle.
#[derive(Debug, Clone)]
pub struct ShuffledExam {
    pub questions: Vec<ClientQuestion>,
    pub mapping: OptionMapping,
}

/// Label for the option displayed at `index`: A, B, C, ... then O27, O28, ...
pub fn position_label(index: usize) -> String {
    const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    match LETTERS.get(index) {
        Some(letter) => (*letter as char).to_string(),
        None => format!("O{}", index + 1),
    }
}

/// Shuffles the options of every question independently and relabels them
/// by display position. The caller owns the random source so one attempt
/// draws from one request-scoped generator.
pub fn shuffle_questions<R: Rng + ?Sized>(questions: &[Question], rng: &mut R) -> ShuffledExam {
    let mut mapping = OptionMapping::with_capacity(questions.len());
    let client_questions = questions
        .iter()
        .map(|question| {
            let (options, reverse) = shuffle_options(&question.options, rng);
            mapping.insert(question.id.clone(), reverse);
            ClientQuestion {
                id: question.id.clone(),
                stem: question.stem.clone(),
                options,
            }
        })
        .collect();

    ShuffledExam {
        questions: client_questions,
        mapping,
    }
}

fn shuffle_options<R: Rng + ?Sized>(
    options: &[QuestionOption],
    rng: &mut R,
) -> (Vec<QuestionOption>, HashMap<String, String>) {
    // Nothing to permute; keep canonical ids so the mapping is the identity.
    if options.len() < 2 {
        let reverse = options
            .iter()
            .map(|o| (o.id.clone(), o.id.clone()))
            .collect();
        return (options.to_vec(), reverse);
    }

    let mut order: Vec<usize> = (0..options.len()).collect();
    order.shuffle(rng);

    let mut reverse = HashMap::with_capacity(options.len());
    let shuffled = order
        .into_iter()
        .enumerate()
        .map(|(position, original)| {
            let label = position_label(position);
            let option = &options[original];
            reverse.insert(label.clone(), option.id.clone());
            QuestionOption {
                id: label,
                text: option.text.clone(),
            }
        })
        .collect();

    (shuffled, reverse)
}

/// Canonical option id for a shuffled selection. Questions without a mapping
/// entry, and ids the mapping does not know, are taken as already canonical.
pub fn map_answer_to_canonical(
    mapping: &OptionMapping,
    question_id: &str,
    selected_option_id: &str,
) -> String {
    mapping
        .get(question_id)
        .and_then(|reverse| reverse.get(selected_option_id))
        .cloned()
        .unwrap_or_else(|| selected_option_id.to_string())
}

/// questionId -> shuffled id in, questionId -> canonical id out.
pub fn unshuffle_answers(
    mapping: &OptionMapping,
    answers: &HashMap<String, String>,
) -> HashMap<String, String> {
    answers
        .iter()
        .map(|(question_id, selected)| {
            (
                question_id.clone(),
                map_answer_to_canonical(mapping, question_id, selected),
            )
        })
        .collect()
}

/// Rebuilds the client view an attempt was started with, so a resumed
/// attempt shows the same option order.
pub fn restore_view(questions: &[Question], mapping: &OptionMapping) -> Vec<ClientQuestion> {
    questions
        .iter()
        .map(|question| {
            let options = match mapping.get(&question.id) {
                Some(reverse) if reverse.len() == question.options.len() => (0..reverse.len())
                    .filter_map(|position| {
                        let label = position_label(position);
                        let canonical = reverse.get(&label)?;
                        let option = question.options.iter().find(|o| &o.id == canonical)?;
                        Some(QuestionOption {
                            id: label,
                            text: option.text.clone(),
                        })
                    })
                    .collect(),
                _ => question.options.clone(),
            };
            ClientQuestion {
                id: question.id.clone(),
                stem: question.stem.clone(),
                options,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerDistribution {
    pub distribution: BTreeMap<String, usize>,
    pub total: usize,
    pub is_balanced: bool,
    pub recommendation: String,
}

/// How often each canonical position (A-D) holds the correct answer before
/// shuffling. Diagnostic only.
pub fn analyze_answer_distribution(questions: &[Question]) -> AnswerDistribution {
    let mut distribution: BTreeMap<String, usize> =
        (0..4).map(|i| (position_label(i), 0)).collect();

    for question in questions {
        let position = question
            .options
            .iter()
            .position(|o| o.id == question.correct_option_id);
        if let Some(count) = position.and_then(|p| distribution.get_mut(&position_label(p))) {
            *count += 1;
        }
    }

    let total = questions.len();
    let expected = total as f64 / 4.0;
    let deviation: f64 = distribution
        .values()
        .map(|&count| (count as f64 - expected).abs())
        .sum();
    let is_balanced = deviation < total as f64 * 0.2;

    let recommendation = if is_balanced {
        "Answer distribution is balanced.".to_string()
    } else {
        let (label, count) = distribution
            .iter()
            .fold(None::<(&String, usize)>, |best, (label, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((label, count)),
            })
            .map(|(label, count)| (label.clone(), count))
            .unwrap_or_else(|| (position_label(0), 0));
        let share = if total == 0 {
            0.0
        } else {
            count as f64 / total as f64 * 100.0
        };
        format!(
            "Warning: {:.1}% of answers are option {}. Consider regenerating with more balanced distribution.",
            share, label
        )
    };

    AnswerDistribution {
        distribution,
        total,
        is_balanced,
        recommendation,
    }
}
