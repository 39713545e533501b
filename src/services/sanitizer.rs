//! Test-taker views of exam questions.
//!
//! The per-attempt presentation order is decided once by [`build_layout`] and
//! persisted on the attempt. Every later view is a pure projection of that
//! layout, so re-fetching an attempt never reshuffles it.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::db::models::{AttemptLayout, Exam, ExamQuestionDetail, LayoutEntry, Question};
use crate::db::types::QuestionType;
use crate::schemas::attempt::{ReviewQuestion, SanitizedOption, SanitizedQuestion};

pub(crate) fn build_layout(exam: &Exam, questions: &[ExamQuestionDetail], seed: i64) -> AttemptLayout {
    let mut active: Vec<&ExamQuestionDetail> =
        questions.iter().filter(|detail| detail.question.is_active).collect();
    active.sort_by(|a, b| {
        a.binding.position.cmp(&b.binding.position).then_with(|| a.binding.id.cmp(&b.binding.id))
    });

    let mut rng = StdRng::seed_from_u64(u64::from_ne_bytes(seed.to_ne_bytes()));
    if exam.shuffle_questions {
        active.shuffle(&mut rng);
    }

    let entries = active
        .into_iter()
        .map(|detail| {
            let option_order = if detail.question.question_type == QuestionType::MultipleChoice {
                let mut order: Vec<usize> = (0..detail.question.options.0.len()).collect();
                if exam.shuffle_options {
                    order.shuffle(&mut rng);
                }
                order
            } else {
                Vec::new()
            };

            LayoutEntry { exam_question_id: detail.binding.id.clone(), option_order }
        })
        .collect();

    AttemptLayout { questions: entries }
}

/// Maps a displayed option index back to the authoring order.
///
/// Falls back to the identity mapping when the stored permutation no longer
/// matches the question's option count.
pub(crate) fn displayed_to_original(
    entry: &LayoutEntry,
    displayed: usize,
    option_count: usize,
) -> Option<usize> {
    if entry.option_order.len() == option_count {
        return entry.option_order.get(displayed).copied();
    }

    (displayed < option_count).then_some(displayed)
}

/// Displayed position of the correct option, if the question has one.
pub(crate) fn correct_displayed_index(entry: &LayoutEntry, question: &Question) -> Option<usize> {
    let correct = question.correct_option_index()?;
    let count = question.options.0.len();
    (0..count).find(|displayed| displayed_to_original(entry, *displayed, count) == Some(correct))
}

pub(crate) fn project(
    layout: &AttemptLayout,
    questions: &[ExamQuestionDetail],
) -> Vec<SanitizedQuestion> {
    resolve(layout, questions)
        .into_iter()
        .enumerate()
        .map(|(idx, (entry, detail))| sanitize(idx + 1, entry, detail))
        .collect()
}

pub(crate) fn review(layout: &AttemptLayout, questions: &[ExamQuestionDetail]) -> Vec<ReviewQuestion> {
    resolve(layout, questions)
        .into_iter()
        .enumerate()
        .map(|(idx, (entry, detail))| {
            let question = &detail.question;
            let correct_option = match question.question_type {
                QuestionType::MultipleChoice => correct_displayed_index(entry, question),
                _ => None,
            };

            ReviewQuestion {
                question: sanitize(idx + 1, entry, detail),
                correct_option,
                correct_answer: question.correct_answer.clone(),
                explanation: question.explanation.clone(),
            }
        })
        .collect()
}

fn resolve<'a>(
    layout: &'a AttemptLayout,
    questions: &'a [ExamQuestionDetail],
) -> Vec<(&'a LayoutEntry, &'a ExamQuestionDetail)> {
    let by_id: HashMap<&str, &ExamQuestionDetail> =
        questions.iter().map(|detail| (detail.binding.id.as_str(), detail)).collect();

    layout
        .questions
        .iter()
        .filter_map(|entry| by_id.get(entry.exam_question_id.as_str()).map(|detail| (entry, *detail)))
        .collect()
}

fn sanitize(order: usize, entry: &LayoutEntry, detail: &ExamQuestionDetail) -> SanitizedQuestion {
    let question = &detail.question;
    let options = (question.question_type == QuestionType::MultipleChoice).then(|| {
        let count = question.options.0.len();
        (0..count)
            .filter_map(|displayed| {
                let original = displayed_to_original(entry, displayed, count)?;
                let option = question.options.0.get(original)?;
                Some(SanitizedOption { text: option.text.clone(), index: displayed })
            })
            .collect()
    });

    SanitizedQuestion {
        id: detail.binding.id.clone(),
        order,
        points: detail.binding.points,
        text: question.text.clone(),
        question_type: question.question_type,
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures;

    fn sample_questions() -> Vec<ExamQuestionDetail> {
        vec![
            fixtures::multiple_choice("eq-1", 1, 10, &["A", "B", "C", "D"], 0),
            fixtures::short_answer("eq-2", 2, 5, "Paris"),
            fixtures::true_false("eq-3", 3, 5, "True"),
            fixtures::multiple_choice("eq-4", 4, 10, &["W", "X", "Y", "Z"], 3),
            fixtures::essay("eq-5", 5, 20),
        ]
    }

    #[test]
    fn unshuffled_layout_follows_position() {
        let exam = fixtures::exam(false, false);
        let layout = build_layout(&exam, &sample_questions(), 42);

        let ids: Vec<&str> =
            layout.questions.iter().map(|entry| entry.exam_question_id.as_str()).collect();
        assert_eq!(ids, vec!["eq-1", "eq-2", "eq-3", "eq-4", "eq-5"]);
        assert_eq!(layout.questions[0].option_order, vec![0, 1, 2, 3]);
        assert!(layout.questions[1].option_order.is_empty());
    }

    #[test]
    fn layout_skips_inactive_questions() {
        let exam = fixtures::exam(false, false);
        let mut questions = sample_questions();
        questions[1].question.is_active = false;

        let layout = build_layout(&exam, &questions, 1);
        assert!(!layout.contains("eq-2"));
        assert_eq!(layout.questions.len(), 4);
    }

    #[test]
    fn same_seed_yields_same_layout() {
        let exam = fixtures::exam(true, true);
        let questions = sample_questions();

        assert_eq!(build_layout(&exam, &questions, 7), build_layout(&exam, &questions, 7));
    }

    #[test]
    fn different_seeds_eventually_differ() {
        let exam = fixtures::exam(true, true);
        let questions = sample_questions();
        let first = build_layout(&exam, &questions, 0);

        assert!((1..64).any(|seed| build_layout(&exam, &questions, seed) != first));
    }

    #[test]
    fn projection_never_exposes_answer_keys() {
        let exam = fixtures::exam(true, true);
        let questions = sample_questions();
        let layout = build_layout(&exam, &questions, 99);

        let json = serde_json::to_string(&project(&layout, &questions)).expect("json");
        assert!(!json.contains("isCorrect"));
        assert!(!json.contains("is_correct"));
        assert!(!json.contains("correct_answer"));
        assert!(!json.contains("explanation"));
        assert!(!json.contains("Paris"));
    }

    #[test]
    fn projected_indices_are_displayed_positions() {
        let exam = fixtures::exam(false, true);
        let questions = sample_questions();
        let layout = build_layout(&exam, &questions, 5);
        let projected = project(&layout, &questions);

        let entry = layout.entry("eq-1").expect("entry");
        let options = projected[0].options.as_ref().expect("options");
        for option in options {
            let original = entry.option_order[option.index];
            assert_eq!(option.text, questions[0].question.options.0[original].text);
        }
        let indices: Vec<usize> = options.iter().map(|option| option.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn review_reports_correct_option_at_displayed_index() {
        let questions = sample_questions();
        let layout = AttemptLayout {
            questions: vec![LayoutEntry {
                exam_question_id: "eq-1".to_string(),
                option_order: vec![2, 3, 0, 1],
            }],
        };

        let reviewed = review(&layout, &questions);
        assert_eq!(reviewed.len(), 1);
        assert_eq!(reviewed[0].correct_option, Some(2));
        assert_eq!(reviewed[0].question.options.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn displayed_to_original_falls_back_to_identity() {
        let entry = LayoutEntry { exam_question_id: "eq".to_string(), option_order: vec![1, 0] };
        assert_eq!(displayed_to_original(&entry, 0, 2), Some(1));
        assert_eq!(displayed_to_original(&entry, 2, 3), Some(2));
        assert_eq!(displayed_to_original(&entry, 3, 3), None);
    }
}
