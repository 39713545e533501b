use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{AttemptLayout, ExamAttempt};
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, status, shuffle_seed, layout, \
    started_at, expires_at, submitted_at, time_spent_seconds, total_score, \
    percentage, passed, graded_at, created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) shuffle_seed: i64,
    pub(crate) layout: &'a AttemptLayout,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
}

pub(crate) struct GradeUpdate<'a> {
    pub(crate) id: &'a str,
    pub(crate) status: AttemptStatus,
    pub(crate) total_score: i32,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Serializes attempt creation per (exam, student) until the transaction ends.
pub(crate) async fn acquire_exam_student_lock(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("exam_attempt:{exam_id}:{student_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!("SELECT {COLUMNS} FROM exam_attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn lock_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<AttemptStatus>, sqlx::Error> {
    sqlx::query_scalar("SELECT status FROM exam_attempts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn count_and_max_number(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<(i64, Option<i32>), sqlx::Error> {
    sqlx::query_as(
        "SELECT COUNT(*), MAX(attempt_number) FROM exam_attempts
         WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt<'_>,
) -> Result<ExamAttempt, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "INSERT INTO exam_attempts (
            id, exam_id, student_id, attempt_number, status, shuffle_seed, layout,
            started_at, expires_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$8,$8)
        RETURNING {COLUMNS}"
    ))
    .bind(attempt.id)
    .bind(attempt.exam_id)
    .bind(attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.shuffle_seed)
    .bind(Json(attempt.layout))
    .bind(attempt.started_at)
    .bind(attempt.expires_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE exam_id = $1
         ORDER BY started_at DESC, student_id, attempt_number DESC
         OFFSET $2 LIMIT $3"
    ))
    .bind(exam_id)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_attempts WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE student_id = $1
         ORDER BY started_at DESC, exam_id, attempt_number DESC"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn record_submission(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    submitted_at: PrimitiveDateTime,
    time_spent_seconds: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_attempts SET submitted_at = $1, time_spent_seconds = $2, updated_at = $1
         WHERE id = $3",
    )
    .bind(submitted_at)
    .bind(time_spent_seconds)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn apply_grade(
    executor: impl sqlx::PgExecutor<'_>,
    update: GradeUpdate<'_>,
) -> Result<ExamAttempt, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "UPDATE exam_attempts
         SET status = $1, total_score = $2, percentage = $3, passed = $4,
             graded_at = $5, updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(update.status)
    .bind(update.total_score)
    .bind(update.percentage)
    .bind(update.passed)
    .bind(update.graded_at)
    .bind(update.updated_at)
    .bind(update.id)
    .fetch_one(executor)
    .await
}
