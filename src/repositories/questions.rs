use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Question;
use crate::store::QuestionFilter;

pub(crate) const COLUMNS: &str = "\
    id, bank_id, question_type, text, options, correct_answer, points, explanation, \
    difficulty, is_active, created_by, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_ids(pool: &PgPool, ids: &[String]) -> Result<Vec<Question>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

pub(crate) async fn list(pool: &PgPool, filter: &QuestionFilter) -> Result<Vec<Question>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM questions WHERE 1 = 1"));

    if !filter.include_inactive {
        builder.push(" AND is_active = TRUE");
    }
    if let Some(bank_id) = &filter.bank_id {
        builder.push(" AND bank_id = ");
        builder.push_bind(bank_id);
    }
    if let Some(created_by) = &filter.created_by {
        builder.push(" AND created_by = ");
        builder.push_bind(created_by);
    }

    builder.push(" ORDER BY created_at, id");
    builder.build_query_as::<Question>().fetch_all(pool).await
}

pub(crate) async fn create(pool: &PgPool, question: &Question) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, bank_id, question_type, text, options, correct_answer, points, explanation,
            difficulty, is_active, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
        RETURNING {COLUMNS}"
    ))
    .bind(&question.id)
    .bind(&question.bank_id)
    .bind(question.question_type)
    .bind(&question.text)
    .bind(&question.options)
    .bind(&question.correct_answer)
    .bind(question.points)
    .bind(&question.explanation)
    .bind(question.difficulty)
    .bind(question.is_active)
    .bind(&question.created_by)
    .bind(question.created_at)
    .bind(question.updated_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn deactivate(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE questions SET is_active = FALSE, updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
