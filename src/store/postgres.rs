use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use super::{
    graded_status, AnswerDraft, AttemptStore, FinalizeOutcome, Grader, InsertAttemptOutcome,
    ManualGrade, ManualGradeOutcome, NewAttempt, QuestionFilter, StoreError, Submission,
    UpsertAnswerOutcome,
};
use crate::db::models::{Exam, ExamAnswer, ExamAttempt, ExamQuestion, ExamQuestionDetail, Question};
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::services::scoring::AttemptGrade;

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn write_grade(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    attempt_id: &str,
    grade: &AttemptGrade,
    now: PrimitiveDateTime,
) -> Result<ExamAttempt, sqlx::Error> {
    for answer in grade.answers.iter().filter(|answer| answer.answered) {
        repositories::answers::set_grade(
            &mut **tx,
            attempt_id,
            &answer.exam_question_id,
            answer.is_correct,
            answer.points_earned,
        )
        .await?;
    }

    let status = graded_status(grade);
    repositories::attempts::apply_grade(
        &mut **tx,
        repositories::attempts::GradeUpdate {
            id: attempt_id,
            status,
            total_score: grade.total_score,
            percentage: grade.percentage,
            passed: grade.passed,
            graded_at: (status == AttemptStatus::Graded).then_some(now),
            updated_at: now,
        },
    )
    .await
}

#[async_trait]
impl AttemptStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        repositories::health::ping(&self.pool).await?;
        Ok(())
    }

    async fn create_question(&self, question: Question) -> Result<Question, StoreError> {
        Ok(repositories::questions::create(&self.pool, &question).await?)
    }

    async fn find_question(&self, id: &str) -> Result<Option<Question>, StoreError> {
        Ok(repositories::questions::find_by_id(&self.pool, id).await?)
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StoreError> {
        Ok(repositories::questions::list(&self.pool, filter).await?)
    }

    async fn deactivate_question(
        &self,
        id: &str,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(repositories::questions::deactivate(&self.pool, id, now).await?)
    }

    async fn create_exam(
        &self,
        exam: Exam,
        bindings: Vec<ExamQuestion>,
    ) -> Result<Exam, StoreError> {
        let mut tx = self.pool.begin().await?;
        repositories::exams::create(&mut *tx, &exam).await?;
        for binding in &bindings {
            repositories::exams::create_binding(&mut *tx, binding).await?;
        }
        let created = repositories::exams::fetch_one_by_id(&mut *tx, &exam.id).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(repositories::exams::find_by_id(&self.pool, id).await?)
    }

    async fn update_exam(&self, exam: &Exam) -> Result<Exam, StoreError> {
        Ok(repositories::exams::update(&self.pool, exam).await?)
    }

    async fn list_exam_questions(
        &self,
        exam_id: &str,
    ) -> Result<Vec<ExamQuestionDetail>, StoreError> {
        let bindings = repositories::exams::list_bindings(&self.pool, exam_id).await?;
        let ids: Vec<String> = bindings.iter().map(|binding| binding.question_id.clone()).collect();
        let questions: HashMap<String, Question> =
            repositories::questions::list_by_ids(&self.pool, &ids)
                .await?
                .into_iter()
                .map(|question| (question.id.clone(), question))
                .collect();

        bindings
            .into_iter()
            .map(|binding| {
                let question = questions
                    .get(&binding.question_id)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::Inconsistent(format!("question {} missing", binding.question_id))
                    })?;
                Ok(ExamQuestionDetail { binding, question })
            })
            .collect()
    }

    async fn insert_attempt(
        &self,
        attempt: NewAttempt,
        max_attempts: i32,
    ) -> Result<InsertAttemptOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        repositories::attempts::acquire_exam_student_lock(
            &mut *tx,
            &attempt.exam_id,
            &attempt.student_id,
        )
        .await?;

        let (used, max_number) = repositories::attempts::count_and_max_number(
            &mut *tx,
            &attempt.exam_id,
            &attempt.student_id,
        )
        .await?;
        if used >= i64::from(max_attempts) {
            tx.rollback().await?;
            return Ok(InsertAttemptOutcome::LimitReached { used });
        }

        let created = repositories::attempts::create(
            &mut *tx,
            repositories::attempts::CreateAttempt {
                id: &attempt.id,
                exam_id: &attempt.exam_id,
                student_id: &attempt.student_id,
                attempt_number: max_number.unwrap_or(0) + 1,
                shuffle_seed: attempt.shuffle_seed,
                layout: &attempt.layout,
                started_at: attempt.started_at,
                expires_at: attempt.expires_at,
            },
        )
        .await?;
        tx.commit().await?;

        Ok(InsertAttemptOutcome::Inserted(created))
    }

    async fn find_attempt(&self, id: &str) -> Result<Option<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::find_by_id(&self.pool, id).await?)
    }

    async fn list_attempts_by_exam(
        &self,
        exam_id: &str,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<ExamAttempt>, i64), StoreError> {
        let attempts = repositories::attempts::list_by_exam(&self.pool, exam_id, skip, limit).await?;
        let total = repositories::attempts::count_by_exam(&self.pool, exam_id).await?;
        Ok((attempts, total))
    }

    async fn list_attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::list_by_student(&self.pool, student_id).await?)
    }

    async fn upsert_answer(&self, answer: AnswerDraft) -> Result<UpsertAnswerOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let status = repositories::attempts::lock_status(&mut *tx, &answer.attempt_id).await?;
        match status {
            None => {
                tx.rollback().await?;
                return Ok(UpsertAnswerOutcome::AttemptMissing);
            }
            Some(status) if status != AttemptStatus::InProgress => {
                tx.rollback().await?;
                return Ok(UpsertAnswerOutcome::NotInProgress(status));
            }
            Some(_) => {}
        }

        let saved = repositories::answers::upsert(&mut *tx, &answer).await?;
        tx.commit().await?;
        Ok(UpsertAnswerOutcome::Saved(saved))
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<ExamAnswer>, StoreError> {
        Ok(repositories::answers::list_by_attempt(&self.pool, attempt_id).await?)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        submission: Submission,
        grader: Grader<'_>,
    ) -> Result<FinalizeOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(attempt) = repositories::attempts::find_for_update(&mut *tx, attempt_id).await?
        else {
            tx.rollback().await?;
            return Ok(FinalizeOutcome::AttemptMissing);
        };
        if attempt.status != AttemptStatus::InProgress {
            tx.rollback().await?;
            return Ok(FinalizeOutcome::AlreadyFinished(attempt.status));
        }

        let answers = repositories::answers::list_by_attempt(&mut *tx, attempt_id).await?;
        let grade = grader(&attempt, &answers);

        repositories::attempts::record_submission(
            &mut *tx,
            attempt_id,
            submission.submitted_at,
            submission.time_spent_seconds,
        )
        .await?;
        let finalized = write_grade(&mut tx, attempt_id, &grade, submission.submitted_at).await?;
        let answers = repositories::answers::list_by_attempt(&mut *tx, attempt_id).await?;
        tx.commit().await?;

        Ok(FinalizeOutcome::Finalized { attempt: finalized, answers })
    }

    async fn apply_manual_grade(
        &self,
        grade: ManualGrade,
        grader: Grader<'_>,
    ) -> Result<ManualGradeOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(attempt) =
            repositories::attempts::find_for_update(&mut *tx, &grade.attempt_id).await?
        else {
            tx.rollback().await?;
            return Ok(ManualGradeOutcome::AttemptMissing);
        };
        if attempt.status == AttemptStatus::InProgress {
            tx.rollback().await?;
            return Ok(ManualGradeOutcome::AttemptInProgress);
        }

        let Some(answer) = repositories::answers::set_manual_grade(&mut *tx, &grade).await? else {
            tx.rollback().await?;
            return Ok(ManualGradeOutcome::AnswerMissing);
        };

        let answers = repositories::answers::list_by_attempt(&mut *tx, &grade.attempt_id).await?;
        let attempt_grade = grader(&attempt, &answers);
        let updated = write_grade(&mut tx, &grade.attempt_id, &attempt_grade, grade.graded_at).await?;
        tx.commit().await?;

        Ok(ManualGradeOutcome::Graded { attempt: updated, answer })
    }
}
