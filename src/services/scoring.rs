use std::collections::HashMap;

use crate::db::models::{AttemptLayout, Exam, ExamAnswer, ExamQuestionDetail, LayoutEntry};
use crate::db::types::QuestionType;
use crate::services::sanitizer::displayed_to_original;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnswerGrade {
    pub(crate) exam_question_id: String,
    /// `None` while the answer awaits manual grading.
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: i32,
    /// `false` for a layout question with no recorded answer; such grades are never persisted.
    pub(crate) answered: bool,
}

impl AnswerGrade {
    fn unanswered(exam_question_id: &str) -> Self {
        Self {
            exam_question_id: exam_question_id.to_string(),
            is_correct: Some(false),
            points_earned: 0,
            answered: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttemptGrade {
    /// One grade per layout question, in layout order. Unanswered questions
    /// are graded incorrect with 0 points.
    pub(crate) answers: Vec<AnswerGrade>,
    pub(crate) total_score: i32,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) pending_manual: bool,
}

/// Grades every answer of an attempt. Pure and deterministic.
pub(crate) fn grade_attempt(
    exam: &Exam,
    questions: &[ExamQuestionDetail],
    layout: &AttemptLayout,
    answers: &[ExamAnswer],
) -> AttemptGrade {
    let by_id: HashMap<&str, &ExamQuestionDetail> =
        questions.iter().map(|detail| (detail.binding.id.as_str(), detail)).collect();
    let answers_by_question: HashMap<&str, &ExamAnswer> =
        answers.iter().map(|answer| (answer.exam_question_id.as_str(), answer)).collect();

    let mut grades = Vec::new();
    let mut total_score = 0i32;
    let mut pending_manual = false;

    for entry in &layout.questions {
        let Some(detail) = by_id.get(entry.exam_question_id.as_str()) else {
            continue;
        };
        let Some(answer) = answers_by_question.get(entry.exam_question_id.as_str()) else {
            grades.push(AnswerGrade::unanswered(&entry.exam_question_id));
            continue;
        };

        let grade = grade_answer(entry, detail, answer);
        if grade.is_correct.is_none() {
            pending_manual = true;
        }
        total_score += grade.points_earned;
        grades.push(grade);
    }

    let percentage = percentage_of(total_score, exam.total_points);

    AttemptGrade {
        answers: grades,
        total_score,
        percentage,
        passed: percentage >= exam.passing_score,
        pending_manual,
    }
}

fn grade_answer(entry: &LayoutEntry, detail: &ExamQuestionDetail, answer: &ExamAnswer) -> AnswerGrade {
    let points = detail.binding.points;
    let exam_question_id = answer.exam_question_id.clone();

    if answer.graded_by.is_some() {
        return AnswerGrade {
            exam_question_id,
            is_correct: answer.is_correct.or(Some(answer.points_earned.unwrap_or(0) > 0)),
            points_earned: answer.points_earned.unwrap_or(0).clamp(0, points.max(0)),
            answered: true,
        };
    }

    let question = &detail.question;
    let is_correct = match question.question_type {
        QuestionType::MultipleChoice => Some(multiple_choice_correct(entry, detail, answer)),
        QuestionType::TrueFalse => Some(true_false_correct(question.correct_answer.as_deref(), answer)),
        QuestionType::ShortAnswer => {
            Some(short_answer_correct(question.correct_answer.as_deref(), answer))
        }
        QuestionType::Essay => None,
    };

    AnswerGrade {
        exam_question_id,
        is_correct,
        points_earned: if is_correct == Some(true) { points } else { 0 },
        answered: true,
    }
}

fn multiple_choice_correct(
    entry: &LayoutEntry,
    detail: &ExamQuestionDetail,
    answer: &ExamAnswer,
) -> bool {
    let Some(selected) = answer.selected_option.and_then(|value| usize::try_from(value).ok())
    else {
        return false;
    };
    let options = &detail.question.options.0;

    match (displayed_to_original(entry, selected, options.len()), detail.question.correct_option_index()) {
        (Some(original), Some(correct)) => original == correct,
        _ => false,
    }
}

fn true_false_correct(canonical: Option<&str>, answer: &ExamAnswer) -> bool {
    match (canonical, answer.answer_text.as_deref()) {
        (Some(expected), Some(given)) => given.trim() == expected.trim(),
        _ => false,
    }
}

fn short_answer_correct(canonical: Option<&str>, answer: &ExamAnswer) -> bool {
    match (canonical, answer.answer_text.as_deref()) {
        (Some(expected), Some(given)) => normalize(given) == normalize(expected),
        _ => false,
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn percentage_of(total_score: i32, total_points: i32) -> f64 {
    if total_points <= 0 {
        return 0.0;
    }

    let raw = 100.0 * f64::from(total_score) / f64::from(total_points);
    (raw * 100.0).round() / 100.0
}
