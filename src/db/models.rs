use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, DifficultyLevel, ExamStatus, QuestionType};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject_id: Option<String>,
    pub(crate) class_id: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) total_points: i32,
    pub(crate) passing_score: f64,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) show_results_immediately: bool,
    pub(crate) allow_review: bool,
    pub(crate) max_attempts: i32,
    pub(crate) status: ExamStatus,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) published_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QuestionOption {
    pub(crate) text: String,
    #[serde(rename = "isCorrect", alias = "is_correct")]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) bank_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) text: String,
    pub(crate) options: Json<Vec<QuestionOption>>,
    /// Canonical answer: "True"/"False" for true_false, the expected string for short_answer.
    pub(crate) correct_answer: Option<String>,
    pub(crate) points: i32,
    pub(crate) explanation: Option<String>,
    pub(crate) difficulty: Option<DifficultyLevel>,
    pub(crate) is_active: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Question {
    pub(crate) fn correct_option_index(&self) -> Option<usize> {
        self.options.0.iter().position(|option| option.is_correct)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamQuestion {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) points: i32,
}

/// An exam binding joined with the question it points at.
#[derive(Debug, Clone)]
pub(crate) struct ExamQuestionDetail {
    pub(crate) binding: ExamQuestion,
    pub(crate) question: Question,
}

/// Per-attempt presentation order, fixed when the attempt is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AttemptLayout {
    pub(crate) questions: Vec<LayoutEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LayoutEntry {
    pub(crate) exam_question_id: String,
    /// `option_order[displayed] = original`; empty for questions without options.
    #[serde(default)]
    pub(crate) option_order: Vec<usize>,
}

impl AttemptLayout {
    pub(crate) fn entry(&self, exam_question_id: &str) -> Option<&LayoutEntry> {
        self.questions.iter().find(|entry| entry.exam_question_id == exam_question_id)
    }

    pub(crate) fn contains(&self, exam_question_id: &str) -> bool {
        self.entry(exam_question_id).is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamAttempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) shuffle_seed: i64,
    pub(crate) layout: Json<AttemptLayout>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) total_score: Option<i32>,
    pub(crate) percentage: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamAnswer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) exam_question_id: String,
    pub(crate) answer_text: Option<String>,
    /// Displayed (post-shuffle) option index.
    pub(crate) selected_option: Option<i32>,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: PrimitiveDateTime,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: Option<i32>,
    pub(crate) graded_by: Option<String>,
    pub(crate) feedback: Option<String>,
}
