use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::{Exam, ExamQuestion};

pub(crate) const COLUMNS: &str = "\
    id, title, description, subject_id, class_id, duration_minutes, total_points, \
    passing_score, start_time, end_time, shuffle_questions, shuffle_options, \
    show_results_immediately, allow_review, max_attempts, status, created_by, \
    created_at, updated_at, published_at";

pub(crate) const BINDING_COLUMNS: &str = "id, exam_id, question_id, position, points";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    exam: &Exam,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exams (
            id, title, description, subject_id, class_id, duration_minutes, total_points,
            passing_score, start_time, end_time, shuffle_questions, shuffle_options,
            show_results_immediately, allow_review, max_attempts, status, created_by,
            created_at, updated_at, published_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)",
    )
    .bind(&exam.id)
    .bind(&exam.title)
    .bind(&exam.description)
    .bind(&exam.subject_id)
    .bind(&exam.class_id)
    .bind(exam.duration_minutes)
    .bind(exam.total_points)
    .bind(exam.passing_score)
    .bind(exam.start_time)
    .bind(exam.end_time)
    .bind(exam.shuffle_questions)
    .bind(exam.shuffle_options)
    .bind(exam.show_results_immediately)
    .bind(exam.allow_review)
    .bind(exam.max_attempts)
    .bind(exam.status)
    .bind(&exam.created_by)
    .bind(exam.created_at)
    .bind(exam.updated_at)
    .bind(exam.published_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn update(pool: &PgPool, exam: &Exam) -> Result<Exam, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE exams SET title = ");
    builder.push_bind(&exam.title);
    builder.push(", description = ");
    builder.push_bind(&exam.description);
    builder.push(", subject_id = ");
    builder.push_bind(&exam.subject_id);
    builder.push(", class_id = ");
    builder.push_bind(&exam.class_id);
    builder.push(", duration_minutes = ");
    builder.push_bind(exam.duration_minutes);
    builder.push(", total_points = ");
    builder.push_bind(exam.total_points);
    builder.push(", passing_score = ");
    builder.push_bind(exam.passing_score);
    builder.push(", start_time = ");
    builder.push_bind(exam.start_time);
    builder.push(", end_time = ");
    builder.push_bind(exam.end_time);
    builder.push(", shuffle_questions = ");
    builder.push_bind(exam.shuffle_questions);
    builder.push(", shuffle_options = ");
    builder.push_bind(exam.shuffle_options);
    builder.push(", show_results_immediately = ");
    builder.push_bind(exam.show_results_immediately);
    builder.push(", allow_review = ");
    builder.push_bind(exam.allow_review);
    builder.push(", max_attempts = ");
    builder.push_bind(exam.max_attempts);
    builder.push(", status = ");
    builder.push_bind(exam.status);
    builder.push(", updated_at = ");
    builder.push_bind(exam.updated_at);
    builder.push(", published_at = ");
    builder.push_bind(exam.published_at);
    builder.push(" WHERE id = ");
    builder.push_bind(&exam.id);
    builder.push(format!(" RETURNING {COLUMNS}"));

    builder.build_query_as::<Exam>().fetch_one(pool).await
}

pub(crate) async fn create_binding(
    executor: impl sqlx::PgExecutor<'_>,
    binding: &ExamQuestion,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exam_questions (id, exam_id, question_id, position, points)
         VALUES ($1,$2,$3,$4,$5)",
    )
    .bind(&binding.id)
    .bind(&binding.exam_id)
    .bind(&binding.question_id)
    .bind(binding.position)
    .bind(binding.points)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_bindings(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<ExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, ExamQuestion>(&format!(
        "SELECT {BINDING_COLUMNS} FROM exam_questions WHERE exam_id = $1 ORDER BY position, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}
