//! Persistence capability consumed by the services.
//!
//! Every method that enforces an attempt invariant (numbering, status checks,
//! submit-then-score) runs as a single atomic unit inside the backend.

pub(crate) mod memory;
pub(crate) mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{
    AttemptLayout, Exam, ExamAnswer, ExamAttempt, ExamQuestion, ExamQuestionDetail, Question,
};
use crate::db::types::AttemptStatus;
use crate::services::scoring::AttemptGrade;

pub(crate) use memory::MemoryStore;
pub(crate) use postgres::PgStore;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("inconsistent record: {0}")]
    Inconsistent(String),
}

/// Scores an attempt against its recorded answers while the store holds the attempt lock.
pub(crate) type Grader<'a> = &'a (dyn Fn(&ExamAttempt, &[ExamAnswer]) -> AttemptGrade + Send + Sync);

#[derive(Debug, Clone)]
pub(crate) struct NewAttempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) shuffle_seed: i64,
    pub(crate) layout: AttemptLayout,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
}

#[derive(Debug)]
pub(crate) enum InsertAttemptOutcome {
    Inserted(ExamAttempt),
    LimitReached { used: i64 },
}

#[derive(Debug, Clone)]
pub(crate) struct AnswerDraft {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) exam_question_id: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) selected_option: Option<i32>,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: PrimitiveDateTime,
}

#[derive(Debug)]
pub(crate) enum UpsertAnswerOutcome {
    Saved(ExamAnswer),
    AttemptMissing,
    NotInProgress(AttemptStatus),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Submission {
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) time_spent_seconds: i32,
}

#[derive(Debug)]
pub(crate) enum FinalizeOutcome {
    Finalized { attempt: ExamAttempt, answers: Vec<ExamAnswer> },
    AttemptMissing,
    AlreadyFinished(AttemptStatus),
}

#[derive(Debug, Clone)]
pub(crate) struct ManualGrade {
    pub(crate) attempt_id: String,
    pub(crate) exam_question_id: String,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: i32,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by: String,
    pub(crate) graded_at: PrimitiveDateTime,
}

#[derive(Debug)]
pub(crate) enum ManualGradeOutcome {
    Graded { attempt: ExamAttempt, answer: ExamAnswer },
    AttemptMissing,
    AttemptInProgress,
    AnswerMissing,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct QuestionFilter {
    pub(crate) bank_id: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) include_inactive: bool,
}

#[async_trait]
pub(crate) trait AttemptStore: Send + Sync + 'static {
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn create_question(&self, question: Question) -> Result<Question, StoreError>;

    async fn find_question(&self, id: &str) -> Result<Option<Question>, StoreError>;

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StoreError>;

    /// Soft delete; returns `false` when the question does not exist.
    async fn deactivate_question(
        &self,
        id: &str,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;

    async fn create_exam(
        &self,
        exam: Exam,
        bindings: Vec<ExamQuestion>,
    ) -> Result<Exam, StoreError>;

    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, StoreError>;

    async fn update_exam(&self, exam: &Exam) -> Result<Exam, StoreError>;

    /// Bindings of an exam joined with their questions, ordered by position.
    async fn list_exam_questions(&self, exam_id: &str)
        -> Result<Vec<ExamQuestionDetail>, StoreError>;

    /// Counts prior attempts and inserts the next one atomically.
    async fn insert_attempt(
        &self,
        attempt: NewAttempt,
        max_attempts: i32,
    ) -> Result<InsertAttemptOutcome, StoreError>;

    async fn find_attempt(&self, id: &str) -> Result<Option<ExamAttempt>, StoreError>;

    async fn list_attempts_by_exam(
        &self,
        exam_id: &str,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<ExamAttempt>, i64), StoreError>;

    async fn list_attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<ExamAttempt>, StoreError>;

    /// Inserts or overwrites the answer for `(attempt, exam_question)` while the attempt is in progress.
    async fn upsert_answer(&self, answer: AnswerDraft) -> Result<UpsertAnswerOutcome, StoreError>;

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<ExamAnswer>, StoreError>;

    /// Leaves `in_progress` exactly once, writing grades and aggregates with the status change.
    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        submission: Submission,
        grader: Grader<'_>,
    ) -> Result<FinalizeOutcome, StoreError>;

    async fn apply_manual_grade(
        &self,
        grade: ManualGrade,
        grader: Grader<'_>,
    ) -> Result<ManualGradeOutcome, StoreError>;
}

/// Status an attempt settles in once graded.
pub(crate) fn graded_status(grade: &AttemptGrade) -> AttemptStatus {
    if grade.pending_manual {
        AttemptStatus::Submitted
    } else {
        AttemptStatus::Graded
    }
}
