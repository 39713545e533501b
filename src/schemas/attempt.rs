use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{Exam, ExamAnswer, ExamAttempt};
use crate::db::types::{AttemptStatus, QuestionType};

/// Answer payload, tagged by the question type the client believes it is answering.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnswerPayload {
    MultipleChoice {
        #[serde(alias = "selectedOption")]
        selected_option: u32,
    },
    TrueFalse {
        value: bool,
    },
    ShortAnswer {
        text: String,
    },
    Essay {
        text: String,
    },
}

impl AnswerPayload {
    /// Splits the payload into the `(answer_text, selected_option)` columns.
    pub(crate) fn into_columns(self) -> (Option<String>, Option<u32>) {
        match self {
            Self::MultipleChoice { selected_option } => (None, Some(selected_option)),
            Self::TrueFalse { value } => {
                (Some(if value { "True" } else { "False" }.to_string()), None)
            }
            Self::ShortAnswer { text } | Self::Essay { text } => (Some(text), None),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RecordAnswerRequest {
    #[serde(alias = "examQuestionId")]
    #[validate(length(min = 1, message = "exam_question_id must not be empty"))]
    pub(crate) exam_question_id: String,
    pub(crate) answer: AnswerPayload,
    #[serde(default, alias = "timeSpentSeconds")]
    #[validate(range(min = 0, message = "time_spent_seconds must be non-negative"))]
    pub(crate) time_spent_seconds: i64,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct SubmitAttemptRequest {
    #[serde(default, alias = "timeSpentSeconds")]
    #[validate(range(min = 0, message = "time_spent_seconds must be non-negative"))]
    pub(crate) time_spent_seconds: Option<i64>,
    #[serde(default, alias = "includeReview")]
    pub(crate) include_review: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    #[serde(alias = "pointsEarned")]
    #[validate(range(min = 0, message = "points_earned must be non-negative"))]
    pub(crate) points_earned: i32,
    #[serde(default, alias = "isCorrect")]
    pub(crate) is_correct: Option<bool>,
    #[serde(default)]
    #[validate(length(max = 4000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
}

/// Option as shown to a test-taker; `index` is the displayed position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SanitizedOption {
    pub(crate) text: String,
    pub(crate) index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SanitizedQuestion {
    pub(crate) id: String,
    pub(crate) order: usize,
    pub(crate) points: i32,
    pub(crate) text: String,
    pub(crate) question_type: QuestionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) options: Option<Vec<SanitizedOption>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ReviewQuestion {
    #[serde(flatten)]
    pub(crate) question: SanitizedQuestion,
    pub(crate) correct_option: Option<usize>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub(crate) enum QuestionSet {
    Sanitized(Vec<SanitizedQuestion>),
    Review(Vec<ReviewQuestion>),
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExamSummary {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) total_points: i32,
}

impl From<&Exam> for ExamSummary {
    fn from(exam: &Exam) -> Self {
        Self {
            id: exam.id.clone(),
            title: exam.title.clone(),
            description: exam.description.clone(),
            duration_minutes: exam.duration_minutes,
            total_points: exam.total_points,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) expires_at: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) total_score: Option<i32>,
    pub(crate) percentage: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) graded_at: Option<String>,
    pub(crate) results_pending: bool,
}

impl AttemptResponse {
    /// `show_scores = false` withholds every grading field from the caller.
    pub(crate) fn from_attempt(attempt: &ExamAttempt, show_scores: bool) -> Self {
        let scored = show_scores && attempt.status.is_finished();
        Self {
            id: attempt.id.clone(),
            exam_id: attempt.exam_id.clone(),
            student_id: attempt.student_id.clone(),
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            expires_at: format_primitive(attempt.expires_at),
            submitted_at: attempt.submitted_at.map(format_primitive),
            time_spent_seconds: attempt.time_spent_seconds,
            total_score: attempt.total_score.filter(|_| scored),
            percentage: attempt.percentage.filter(|_| scored),
            passed: attempt.passed.filter(|_| scored),
            graded_at: attempt.graded_at.filter(|_| scored).map(format_primitive),
            results_pending: attempt.status.is_finished() && !show_scores,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) exam_question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option: Option<i32>,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: String,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: Option<i32>,
    pub(crate) feedback: Option<String>,
}

impl AnswerResponse {
    pub(crate) fn from_answer(answer: &ExamAnswer, show_scores: bool) -> Self {
        Self {
            exam_question_id: answer.exam_question_id.clone(),
            answer_text: answer.answer_text.clone(),
            selected_option: answer.selected_option,
            time_spent_seconds: answer.time_spent_seconds,
            answered_at: format_primitive(answer.answered_at),
            is_correct: answer.is_correct.filter(|_| show_scores),
            points_earned: answer.points_earned.filter(|_| show_scores),
            feedback: answer.feedback.clone().filter(|_| show_scores),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StartAttemptResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) exam: ExamSummary,
    pub(crate) questions: Vec<SanitizedQuestion>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitAttemptResponse {
    pub(crate) attempt: AttemptResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) answers: Option<Vec<AnswerResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) review: Option<Vec<ReviewQuestion>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) exam: ExamSummary,
    pub(crate) questions: QuestionSet,
    pub(crate) answers: Vec<AnswerResponse>,
}
