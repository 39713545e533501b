use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{Question, QuestionOption};
use crate::db::types::{DifficultyLevel, QuestionType};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[serde(alias = "bankId")]
    #[validate(length(min = 1, message = "bank_id must not be empty"))]
    pub(crate) bank_id: String,
    #[serde(alias = "questionType", alias = "type")]
    pub(crate) question_type: QuestionType,
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) options: Vec<QuestionOption>,
    #[serde(default, alias = "correctAnswer")]
    pub(crate) correct_answer: Option<String>,
    #[serde(default = "default_points")]
    #[validate(range(min = 1, message = "points must be positive"))]
    pub(crate) points: i32,
    #[serde(default)]
    pub(crate) explanation: Option<String>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QuestionListQuery {
    #[serde(default, alias = "bankId")]
    pub(crate) bank_id: Option<String>,
    #[serde(default, alias = "includeInactive")]
    pub(crate) include_inactive: bool,
}

/// Authoring view, answer key included; only served to teachers.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) bank_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) text: String,
    pub(crate) options: Vec<QuestionOption>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) points: i32,
    pub(crate) explanation: Option<String>,
    pub(crate) difficulty: Option<DifficultyLevel>,
    pub(crate) is_active: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl From<Question> for QuestionResponse {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            bank_id: question.bank_id,
            question_type: question.question_type,
            text: question.text,
            options: question.options.0,
            correct_answer: question.correct_answer,
            points: question.points,
            explanation: question.explanation,
            difficulty: question.difficulty,
            is_active: question.is_active,
            created_by: question.created_by,
            created_at: format_primitive(question.created_at),
            updated_at: format_primitive(question.updated_at),
        }
    }
}

fn default_points() -> i32 {
    1
}
