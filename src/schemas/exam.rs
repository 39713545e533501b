use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{Exam, ExamQuestion};
use crate::db::types::ExamStatus;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamQuestionCreate {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) position: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 1, message = "points must be positive"))]
    pub(crate) points: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "subjectId")]
    pub(crate) subject_id: Option<String>,
    #[serde(default, alias = "classId")]
    pub(crate) class_id: Option<String>,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default, alias = "totalPoints")]
    #[validate(range(min = 0, message = "total_points must be non-negative"))]
    pub(crate) total_points: Option<i32>,
    #[serde(default = "default_passing_score", alias = "passingScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "passing_score must be between 0 and 100"))]
    pub(crate) passing_score: f64,
    #[serde(
        default,
        alias = "startTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "endTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) end_time: Option<OffsetDateTime>,
    #[serde(default, alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: bool,
    #[serde(default, alias = "shuffleOptions")]
    pub(crate) shuffle_options: bool,
    #[serde(default = "default_enabled_true", alias = "showResultsImmediately")]
    pub(crate) show_results_immediately: bool,
    #[serde(default, alias = "allowReview")]
    pub(crate) allow_review: bool,
    #[serde(default = "default_max_attempts", alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: i32,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<ExamQuestionCreate>,
}

/// Partial update; an explicit `null` clears a window bound, an absent field keeps it.
#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "totalPoints")]
    #[validate(range(min = 0, message = "total_points must be non-negative"))]
    pub(crate) total_points: Option<i32>,
    #[serde(default, alias = "passingScore")]
    #[validate(range(min = 0.0, max = 100.0, message = "passing_score must be between 0 and 100"))]
    pub(crate) passing_score: Option<f64>,
    #[serde(default, alias = "startTime", deserialize_with = "deserialize_patch_datetime")]
    pub(crate) start_time: Option<Option<OffsetDateTime>>,
    #[serde(default, alias = "endTime", deserialize_with = "deserialize_patch_datetime")]
    pub(crate) end_time: Option<Option<OffsetDateTime>>,
    #[serde(default, alias = "shuffleQuestions")]
    pub(crate) shuffle_questions: Option<bool>,
    #[serde(default, alias = "shuffleOptions")]
    pub(crate) shuffle_options: Option<bool>,
    #[serde(default, alias = "showResultsImmediately")]
    pub(crate) show_results_immediately: Option<bool>,
    #[serde(default, alias = "allowReview")]
    pub(crate) allow_review: Option<bool>,
    #[serde(default, alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamQuestionResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) points: i32,
}

impl From<&ExamQuestion> for ExamQuestionResponse {
    fn from(binding: &ExamQuestion) -> Self {
        Self {
            id: binding.id.clone(),
            question_id: binding.question_id.clone(),
            position: binding.position,
            points: binding.points,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject_id: Option<String>,
    pub(crate) class_id: Option<String>,
    pub(crate) duration_minutes: i32,
    pub(crate) total_points: i32,
    pub(crate) passing_score: f64,
    pub(crate) start_time: Option<String>,
    pub(crate) end_time: Option<String>,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_options: bool,
    pub(crate) show_results_immediately: bool,
    pub(crate) allow_review: bool,
    pub(crate) max_attempts: i32,
    pub(crate) status: ExamStatus,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
    /// Only present for the owning teacher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<Vec<ExamQuestionResponse>>,
}

impl ExamResponse {
    pub(crate) fn from_exam(exam: &Exam, bindings: Option<&[ExamQuestion]>) -> Self {
        Self {
            id: exam.id.clone(),
            title: exam.title.clone(),
            description: exam.description.clone(),
            subject_id: exam.subject_id.clone(),
            class_id: exam.class_id.clone(),
            duration_minutes: exam.duration_minutes,
            total_points: exam.total_points,
            passing_score: exam.passing_score,
            start_time: exam.start_time.map(format_primitive),
            end_time: exam.end_time.map(format_primitive),
            shuffle_questions: exam.shuffle_questions,
            shuffle_options: exam.shuffle_options,
            show_results_immediately: exam.show_results_immediately,
            allow_review: exam.allow_review,
            max_attempts: exam.max_attempts,
            status: exam.status,
            created_by: exam.created_by.clone(),
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            published_at: exam.published_at.map(format_primitive),
            questions: bindings
                .map(|items| items.iter().map(ExamQuestionResponse::from).collect()),
        }
    }
}

fn default_passing_score() -> f64 {
    50.0
}

fn default_max_attempts() -> i32 {
    1
}

fn default_enabled_true() -> bool {
    true
}

pub(crate) fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // datetime-local inputs arrive without an offset; treat them as UTC.
    if raw.len() == 16 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}:00Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if raw.len() == 19 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

fn deserialize_patch_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_option_offset_datetime_flexible(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_datetime_variants() {
        let expected = time::macros::datetime!(2025-05-01 09:30:00 UTC);
        assert_eq!(parse_offset_datetime_flexible("2025-05-01T09:30:00Z"), Some(expected));
        assert_eq!(parse_offset_datetime_flexible("2025-05-01T09:30"), Some(expected));
        assert_eq!(parse_offset_datetime_flexible("2025-05-01T09:30:00"), Some(expected));
        assert_eq!(parse_offset_datetime_flexible("2025-05-01 09:30:00"), Some(expected));
        assert_eq!(parse_offset_datetime_flexible("yesterday"), None);
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let update: ExamUpdate = serde_json::from_str(r#"{"end_time": null}"#).expect("update");
        assert_eq!(update.end_time, Some(None));
        assert_eq!(update.start_time, None);

        let update: ExamUpdate =
            serde_json::from_str(r#"{"startTime": "2025-05-01T09:30:00Z", "maxAttempts": 3}"#)
                .expect("update");
        assert!(matches!(update.start_time, Some(Some(_))));
        assert_eq!(update.max_attempts, Some(3));
    }

    #[test]
    fn create_applies_defaults() {
        let create: ExamCreate =
            serde_json::from_str(r#"{"title": "Algebra", "duration_minutes": 45}"#).expect("create");
        assert_eq!(create.max_attempts, 1);
        assert_eq!(create.passing_score, 50.0);
        assert!(create.show_results_immediately);
        assert!(create.questions.is_empty());
        assert!(create.validate().is_ok());
    }
}
