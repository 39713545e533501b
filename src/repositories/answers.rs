use crate::db::models::ExamAnswer;
use crate::store::{AnswerDraft, ManualGrade};

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, exam_question_id, answer_text, selected_option, time_spent_seconds, \
    answered_at, is_correct, points_earned, graded_by, feedback";

pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    answer: &AnswerDraft,
) -> Result<ExamAnswer, sqlx::Error> {
    sqlx::query_as::<_, ExamAnswer>(&format!(
        "INSERT INTO exam_answers (
            id, attempt_id, exam_question_id, answer_text, selected_option,
            time_spent_seconds, answered_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7)
        ON CONFLICT (attempt_id, exam_question_id) DO UPDATE SET
            answer_text = EXCLUDED.answer_text,
            selected_option = EXCLUDED.selected_option,
            time_spent_seconds = EXCLUDED.time_spent_seconds,
            answered_at = EXCLUDED.answered_at
        RETURNING {COLUMNS}"
    ))
    .bind(&answer.id)
    .bind(&answer.attempt_id)
    .bind(&answer.exam_question_id)
    .bind(&answer.answer_text)
    .bind(answer.selected_option)
    .bind(answer.time_spent_seconds)
    .bind(answer.answered_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<ExamAnswer>, sqlx::Error> {
    sqlx::query_as::<_, ExamAnswer>(&format!(
        "SELECT {COLUMNS} FROM exam_answers WHERE attempt_id = $1
         ORDER BY answered_at, exam_question_id"
    ))
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn set_grade(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    exam_question_id: &str,
    is_correct: Option<bool>,
    points_earned: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_answers SET is_correct = $1, points_earned = $2
         WHERE attempt_id = $3 AND exam_question_id = $4",
    )
    .bind(is_correct)
    .bind(points_earned)
    .bind(attempt_id)
    .bind(exam_question_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn set_manual_grade(
    executor: impl sqlx::PgExecutor<'_>,
    grade: &ManualGrade,
) -> Result<Option<ExamAnswer>, sqlx::Error> {
    sqlx::query_as::<_, ExamAnswer>(&format!(
        "UPDATE exam_answers
         SET is_correct = $1, points_earned = $2, feedback = $3, graded_by = $4
         WHERE attempt_id = $5 AND exam_question_id = $6
         RETURNING {COLUMNS}"
    ))
    .bind(grade.is_correct)
    .bind(grade.points_earned)
    .bind(&grade.feedback)
    .bind(&grade.graded_by)
    .bind(&grade.attempt_id)
    .bind(&grade.exam_question_id)
    .fetch_optional(executor)
    .await
}
