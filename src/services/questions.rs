use sqlx::types::Json;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::security::Caller;
use crate::db::models::{Question, QuestionOption};
use crate::db::types::QuestionType;
use crate::schemas::question::QuestionCreate;
use crate::services::ServiceError;
use crate::store::{AttemptStore, QuestionFilter};

const AUTHORS_ONLY: &str = "Only teachers can manage questions";

pub(crate) async fn create_question(
    store: &dyn AttemptStore,
    caller: &Caller,
    payload: QuestionCreate,
    now: PrimitiveDateTime,
) -> Result<Question, ServiceError> {
    if !caller.role.can_author() {
        return Err(ServiceError::Forbidden(AUTHORS_ONLY));
    }

    let (options, correct_answer) = normalize_answer_key(
        payload.question_type,
        payload.options,
        payload.correct_answer,
    )?;

    let question = Question {
        id: Uuid::new_v4().to_string(),
        bank_id: payload.bank_id,
        question_type: payload.question_type,
        text: payload.text,
        options: Json(options),
        correct_answer,
        points: payload.points,
        explanation: payload.explanation,
        difficulty: payload.difficulty,
        is_active: true,
        created_by: caller.user_id.clone(),
        created_at: now,
        updated_at: now,
    };

    let created = store.create_question(question).await?;
    tracing::info!(
        question_id = %created.id,
        bank_id = %created.bank_id,
        question_type = ?created.question_type,
        "Question created"
    );
    Ok(created)
}

pub(crate) async fn list_questions(
    store: &dyn AttemptStore,
    caller: &Caller,
    bank_id: Option<String>,
    include_inactive: bool,
) -> Result<Vec<Question>, ServiceError> {
    if !caller.role.can_author() {
        return Err(ServiceError::Forbidden(AUTHORS_ONLY));
    }

    let filter = QuestionFilter {
        bank_id,
        created_by: (!caller.is_admin()).then(|| caller.user_id.clone()),
        include_inactive,
    };
    Ok(store.list_questions(&filter).await?)
}

/// Soft delete: bound exams keep their history, new layouts skip the question.
pub(crate) async fn delete_question(
    store: &dyn AttemptStore,
    caller: &Caller,
    question_id: &str,
    now: PrimitiveDateTime,
) -> Result<(), ServiceError> {
    let question = store
        .find_question(question_id)
        .await?
        .ok_or(ServiceError::NotFound("Question"))?;
    if question.created_by != caller.user_id && !caller.is_admin() {
        return Err(ServiceError::Forbidden("Only the author can delete this question"));
    }

    if !store.deactivate_question(question_id, now).await? {
        return Err(ServiceError::NotFound("Question"));
    }
    tracing::info!(question_id = %question_id, "Question deactivated");
    Ok(())
}

fn normalize_answer_key(
    question_type: QuestionType,
    options: Vec<QuestionOption>,
    correct_answer: Option<String>,
) -> Result<(Vec<QuestionOption>, Option<String>), ServiceError> {
    match question_type {
        QuestionType::MultipleChoice => {
            if options.len() < 2 {
                return Err(ServiceError::Validation(
                    "multiple_choice questions need at least two options".to_string(),
                ));
            }
            if options.iter().any(|option| option.text.trim().is_empty()) {
                return Err(ServiceError::Validation("option text must not be empty".to_string()));
            }
            let correct = options.iter().filter(|option| option.is_correct).count();
            if correct != 1 {
                return Err(ServiceError::Validation(format!(
                    "multiple_choice questions need exactly one correct option, got {correct}"
                )));
            }
            Ok((options, None))
        }
        QuestionType::TrueFalse => {
            let canonical = match correct_answer.as_deref().map(str::trim) {
                Some(value) if value.eq_ignore_ascii_case("true") => "True",
                Some(value) if value.eq_ignore_ascii_case("false") => "False",
                _ => {
                    return Err(ServiceError::Validation(
                        "true_false correct_answer must be True or False".to_string(),
                    ))
                }
            };
            Ok((Vec::new(), Some(canonical.to_string())))
        }
        QuestionType::ShortAnswer => {
            let answer = correct_answer
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    ServiceError::Validation(
                        "short_answer questions need a correct_answer".to_string(),
                    )
                })?;
            Ok((Vec::new(), Some(answer)))
        }
        QuestionType::Essay => Ok((Vec::new(), None)),
    }
}
