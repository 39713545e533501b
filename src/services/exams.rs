use std::collections::HashSet;

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::security::Caller;
use crate::core::time::to_primitive_utc;
use crate::db::models::{Exam, ExamAnswer, ExamAttempt, ExamQuestion};
use crate::db::types::ExamStatus;
use crate::schemas::exam::{ExamCreate, ExamUpdate};
use crate::services::{scoring, ServiceError};
use crate::store::{AttemptStore, ManualGrade, ManualGradeOutcome};

const OWNER_ONLY: &str = "Only the exam owner can do this";

/// What a caller may see of an exam.
#[derive(Debug)]
pub(crate) enum ExamView {
    Full { exam: Exam, bindings: Vec<ExamQuestion> },
    Summary(Exam),
}

pub(crate) fn is_exam_staff(exam: &Exam, caller: &Caller) -> bool {
    exam.created_by == caller.user_id || caller.is_admin()
}

async fn load_owned_exam(
    store: &dyn AttemptStore,
    caller: &Caller,
    exam_id: &str,
) -> Result<Exam, ServiceError> {
    let exam = store.find_exam(exam_id).await?.ok_or(ServiceError::NotFound("Exam"))?;
    if !is_exam_staff(&exam, caller) {
        return Err(ServiceError::Forbidden(OWNER_ONLY));
    }
    Ok(exam)
}

pub(crate) async fn create_exam(
    store: &dyn AttemptStore,
    caller: &Caller,
    payload: ExamCreate,
    now: PrimitiveDateTime,
) -> Result<(Exam, Vec<ExamQuestion>), ServiceError> {
    if !caller.role.can_author() {
        return Err(ServiceError::Forbidden("Only teachers can create exams"));
    }

    let start_time = payload.start_time.map(to_primitive_utc);
    let end_time = payload.end_time.map(to_primitive_utc);
    validate_window(start_time, end_time)?;

    let exam_id = Uuid::new_v4().to_string();
    let mut seen = HashSet::new();
    let mut bindings = Vec::with_capacity(payload.questions.len());
    for (idx, item) in payload.questions.iter().enumerate() {
        if !seen.insert(item.question_id.as_str()) {
            return Err(ServiceError::Validation(format!(
                "question {} is bound more than once",
                item.question_id
            )));
        }
        let question = store
            .find_question(&item.question_id)
            .await?
            .filter(|question| question.is_active)
            .ok_or(ServiceError::NotFound("Question"))?;

        bindings.push(ExamQuestion {
            id: Uuid::new_v4().to_string(),
            exam_id: exam_id.clone(),
            question_id: question.id,
            position: item.position.unwrap_or(idx as i32 + 1),
            points: item.points.unwrap_or(question.points),
        });
    }

    let binding_total: i32 = bindings.iter().map(|binding| binding.points).sum();
    let exam = Exam {
        id: exam_id,
        title: payload.title,
        description: payload.description,
        subject_id: payload.subject_id,
        class_id: payload.class_id,
        duration_minutes: payload.duration_minutes,
        total_points: payload.total_points.unwrap_or(binding_total),
        passing_score: payload.passing_score,
        start_time,
        end_time,
        shuffle_questions: payload.shuffle_questions,
        shuffle_options: payload.shuffle_options,
        show_results_immediately: payload.show_results_immediately,
        allow_review: payload.allow_review,
        max_attempts: payload.max_attempts,
        status: ExamStatus::Draft,
        created_by: caller.user_id.clone(),
        created_at: now,
        updated_at: now,
        published_at: None,
    };

    let created = store.create_exam(exam, bindings.clone()).await?;
    tracing::info!(
        exam_id = %created.id,
        created_by = %created.created_by,
        questions = bindings.len(),
        "Exam created"
    );
    Ok((created, bindings))
}

pub(crate) async fn get_exam(
    store: &dyn AttemptStore,
    caller: &Caller,
    exam_id: &str,
) -> Result<ExamView, ServiceError> {
    let exam = store.find_exam(exam_id).await?.ok_or(ServiceError::NotFound("Exam"))?;
    if is_exam_staff(&exam, caller) {
        let bindings =
            store.list_exam_questions(exam_id).await?.into_iter().map(|detail| detail.binding).collect();
        return Ok(ExamView::Full { exam, bindings });
    }

    // Drafts and archived exams are invisible to everyone but staff.
    if exam.status != ExamStatus::Published {
        return Err(ServiceError::NotFound("Exam"));
    }
    Ok(ExamView::Summary(exam))
}

pub(crate) async fn update_exam(
    store: &dyn AttemptStore,
    caller: &Caller,
    exam_id: &str,
    patch: ExamUpdate,
    now: PrimitiveDateTime,
) -> Result<Exam, ServiceError> {
    let mut exam = load_owned_exam(store, caller, exam_id).await?;
    if exam.status == ExamStatus::Archived {
        return Err(ServiceError::InvalidState("Archived exams cannot be edited"));
    }

    if let Some(title) = patch.title {
        exam.title = title;
    }
    if let Some(description) = patch.description {
        exam.description = Some(description);
    }
    if let Some(duration_minutes) = patch.duration_minutes {
        exam.duration_minutes = duration_minutes;
    }
    if let Some(total_points) = patch.total_points {
        exam.total_points = total_points;
    }
    if let Some(passing_score) = patch.passing_score {
        exam.passing_score = passing_score;
    }
    if let Some(start_time) = patch.start_time {
        exam.start_time = start_time.map(to_primitive_utc);
    }
    if let Some(end_time) = patch.end_time {
        exam.end_time = end_time.map(to_primitive_utc);
    }
    if let Some(shuffle_questions) = patch.shuffle_questions {
        exam.shuffle_questions = shuffle_questions;
    }
    if let Some(shuffle_options) = patch.shuffle_options {
        exam.shuffle_options = shuffle_options;
    }
    if let Some(show_results_immediately) = patch.show_results_immediately {
        exam.show_results_immediately = show_results_immediately;
    }
    if let Some(allow_review) = patch.allow_review {
        exam.allow_review = allow_review;
    }
    if let Some(max_attempts) = patch.max_attempts {
        exam.max_attempts = max_attempts;
    }
    validate_window(exam.start_time, exam.end_time)?;
    exam.updated_at = now;

    let updated = store.update_exam(&exam).await?;
    tracing::info!(exam_id = %updated.id, max_attempts = updated.max_attempts, "Exam updated");
    Ok(updated)
}

pub(crate) async fn publish_exam(
    store: &dyn AttemptStore,
    caller: &Caller,
    exam_id: &str,
    now: PrimitiveDateTime,
) -> Result<Exam, ServiceError> {
    let mut exam = load_owned_exam(store, caller, exam_id).await?;
    match exam.status {
        ExamStatus::Published => return Ok(exam),
        ExamStatus::Archived => {
            return Err(ServiceError::InvalidState("Archived exams cannot be published"))
        }
        ExamStatus::Draft => {}
    }

    let questions = store.list_exam_questions(exam_id).await?;
    if !questions.iter().any(|detail| detail.question.is_active) {
        return Err(ServiceError::Validation(
            "Exam needs at least one active question before publishing".to_string(),
        ));
    }

    exam.status = ExamStatus::Published;
    exam.published_at = Some(now);
    exam.updated_at = now;
    let updated = store.update_exam(&exam).await?;
    tracing::info!(exam_id = %updated.id, "Exam published");
    Ok(updated)
}

pub(crate) async fn archive_exam(
    store: &dyn AttemptStore,
    caller: &Caller,
    exam_id: &str,
    now: PrimitiveDateTime,
) -> Result<Exam, ServiceError> {
    let mut exam = load_owned_exam(store, caller, exam_id).await?;
    if exam.status == ExamStatus::Archived {
        return Ok(exam);
    }

    exam.status = ExamStatus::Archived;
    exam.updated_at = now;
    let updated = store.update_exam(&exam).await?;
    tracing::info!(exam_id = %updated.id, "Exam archived");
    Ok(updated)
}

pub(crate) async fn list_exam_attempts(
    store: &dyn AttemptStore,
    caller: &Caller,
    exam_id: &str,
    skip: i64,
    limit: i64,
) -> Result<(Vec<ExamAttempt>, i64), ServiceError> {
    load_owned_exam(store, caller, exam_id).await?;
    Ok(store.list_attempts_by_exam(exam_id, skip, limit).await?)
}

#[derive(Debug)]
pub(crate) struct ManualGradeInput {
    pub(crate) points_earned: i32,
    pub(crate) is_correct: Option<bool>,
    pub(crate) feedback: Option<String>,
}

/// Records a teacher's grade for one answer and rescores the attempt.
pub(crate) async fn grade_answer(
    store: &dyn AttemptStore,
    caller: &Caller,
    attempt_id: &str,
    exam_question_id: &str,
    input: ManualGradeInput,
    now: PrimitiveDateTime,
) -> Result<(ExamAttempt, ExamAnswer), ServiceError> {
    let attempt = store.find_attempt(attempt_id).await?.ok_or(ServiceError::NotFound("Attempt"))?;
    let exam = load_owned_exam(store, caller, &attempt.exam_id).await?;
    let questions = store.list_exam_questions(&exam.id).await?;

    let binding = questions
        .iter()
        .find(|detail| detail.binding.id == exam_question_id)
        .filter(|_| attempt.layout.contains(exam_question_id))
        .ok_or(ServiceError::NotFound("Exam question"))?;
    let max_points = binding.binding.points;
    if input.points_earned < 0 || input.points_earned > max_points {
        return Err(ServiceError::Validation(format!(
            "points_earned must be between 0 and {max_points}"
        )));
    }

    let grader = |attempt: &ExamAttempt, answers: &[ExamAnswer]| {
        scoring::grade_attempt(&exam, &questions, &attempt.layout, answers)
    };
    let outcome = store
        .apply_manual_grade(
            ManualGrade {
                attempt_id: attempt_id.to_string(),
                exam_question_id: exam_question_id.to_string(),
                is_correct: Some(input.is_correct.unwrap_or(input.points_earned > 0)),
                points_earned: input.points_earned,
                feedback: input.feedback,
                graded_by: caller.user_id.clone(),
                graded_at: now,
            },
            &grader,
        )
        .await?;

    match outcome {
        ManualGradeOutcome::Graded { attempt, answer } => {
            tracing::info!(
                attempt_id = %attempt.id,
                exam_question_id = %exam_question_id,
                points_earned = input.points_earned,
                total_score = ?attempt.total_score,
                status = ?attempt.status,
                "Answer graded manually"
            );
            Ok((attempt, answer))
        }
        ManualGradeOutcome::AttemptMissing => Err(ServiceError::NotFound("Attempt")),
        ManualGradeOutcome::AttemptInProgress => {
            Err(ServiceError::InvalidState("Attempt has not been submitted yet"))
        }
        ManualGradeOutcome::AnswerMissing => Err(ServiceError::NotFound("Answer")),
    }
}

fn validate_window(
    start_time: Option<PrimitiveDateTime>,
    end_time: Option<PrimitiveDateTime>,
) -> Result<(), ServiceError> {
    match (start_time, end_time) {
        (Some(start), Some(end)) if end <= start => Err(ServiceError::Validation(
            "end_time must be after start_time".to_string(),
        )),
        _ => Ok(()),
    }
}
