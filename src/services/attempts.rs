//! Attempt lifecycle: start, record answers, submit and read back.

use std::sync::Arc;

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::metrics::{ANSWERS_RECORDED, ATTEMPTS_STARTED, ATTEMPTS_SUBMITTED};
use crate::core::security::Caller;
use crate::db::models::{Exam, ExamAnswer, ExamAttempt, ExamQuestionDetail};
use crate::db::types::{AttemptStatus, ExamStatus};
use crate::schemas::attempt::{AnswerPayload, ReviewQuestion, SanitizedQuestion};
use crate::services::exams::is_exam_staff;
use crate::services::{attempt_timing, sanitizer, scoring, ServiceError, ALREADY_SUBMITTED};
use crate::store::{
    AnswerDraft, AttemptStore, FinalizeOutcome, InsertAttemptOutcome, NewAttempt, Submission,
    UpsertAnswerOutcome,
};

#[derive(Debug)]
pub(crate) struct StartedAttempt {
    pub(crate) attempt: ExamAttempt,
    pub(crate) exam: Exam,
    pub(crate) questions: Vec<SanitizedQuestion>,
}

#[derive(Debug)]
pub(crate) struct SubmittedAttempt {
    pub(crate) attempt: ExamAttempt,
    pub(crate) answers: Vec<ExamAnswer>,
    pub(crate) show_scores: bool,
    pub(crate) review: Option<Vec<ReviewQuestion>>,
}

#[derive(Debug)]
pub(crate) enum AttemptQuestions {
    Sanitized(Vec<SanitizedQuestion>),
    Review(Vec<ReviewQuestion>),
}

#[derive(Debug)]
pub(crate) struct AttemptView {
    pub(crate) attempt: ExamAttempt,
    pub(crate) exam: Exam,
    pub(crate) questions: AttemptQuestions,
    pub(crate) answers: Vec<ExamAnswer>,
    pub(crate) show_scores: bool,
}

#[derive(Debug)]
pub(crate) struct AttemptSummary {
    pub(crate) attempt: ExamAttempt,
    pub(crate) show_scores: bool,
}

/// Whether the caller may see scores of a finished attempt.
fn scores_visible(exam: &Exam, caller: &Caller) -> bool {
    is_exam_staff(exam, caller) || exam.show_results_immediately
}

fn review_visible(exam: &Exam, attempt: &ExamAttempt, caller: &Caller) -> bool {
    attempt.status.is_finished()
        && (is_exam_staff(exam, caller) || (exam.allow_review && exam.show_results_immediately))
}

#[derive(Clone)]
pub(crate) struct AttemptService {
    store: Arc<dyn AttemptStore>,
    submit_grace_seconds: i64,
}

impl AttemptService {
    pub(crate) fn new(store: Arc<dyn AttemptStore>, submit_grace_seconds: i64) -> Self {
        Self { store, submit_grace_seconds }
    }

    async fn load_exam(&self, exam_id: &str) -> Result<Exam, ServiceError> {
        self.store.find_exam(exam_id).await?.ok_or(ServiceError::NotFound("Exam"))
    }

    async fn load_attempt(&self, attempt_id: &str) -> Result<ExamAttempt, ServiceError> {
        self.store.find_attempt(attempt_id).await?.ok_or(ServiceError::NotFound("Attempt"))
    }

    async fn load_questions(&self, exam_id: &str) -> Result<Vec<ExamQuestionDetail>, ServiceError> {
        Ok(self.store.list_exam_questions(exam_id).await?)
    }

    pub(crate) async fn start_attempt(
        &self,
        caller: &Caller,
        exam_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<StartedAttempt, ServiceError> {
        let exam = self.load_exam(exam_id).await?;
        if exam.status != ExamStatus::Published {
            return Err(ServiceError::NotAvailable("Exam is not available"));
        }
        attempt_timing::check_exam_window(&exam, now)?;

        let questions = self.load_questions(exam_id).await?;
        let shuffle_seed = rand::random::<i64>();
        let layout = sanitizer::build_layout(&exam, &questions, shuffle_seed);
        if layout.questions.is_empty() {
            return Err(ServiceError::NotAvailable("Exam has no questions"));
        }

        let new_attempt = NewAttempt {
            id: Uuid::new_v4().to_string(),
            exam_id: exam.id.clone(),
            student_id: caller.user_id.clone(),
            shuffle_seed,
            layout,
            started_at: now,
            expires_at: attempt_timing::compute_expiration(now, exam.duration_minutes, exam.end_time),
        };

        let attempt = match self.store.insert_attempt(new_attempt, exam.max_attempts).await? {
            InsertAttemptOutcome::Inserted(attempt) => attempt,
            InsertAttemptOutcome::LimitReached { used } => {
                tracing::info!(
                    exam_id = %exam.id,
                    student_id = %caller.user_id,
                    used,
                    allowed = exam.max_attempts,
                    "Attempt limit reached"
                );
                return Err(ServiceError::AttemptLimitExceeded { used, allowed: exam.max_attempts });
            }
        };

        metrics::counter!(ATTEMPTS_STARTED).increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %exam.id,
            student_id = %attempt.student_id,
            attempt_number = attempt.attempt_number,
            expires_at = %attempt.expires_at,
            "Attempt started"
        );

        let questions = sanitizer::project(&attempt.layout, &questions);
        Ok(StartedAttempt { attempt, exam, questions })
    }

    pub(crate) async fn record_answer(
        &self,
        caller: &Caller,
        attempt_id: &str,
        exam_question_id: &str,
        payload: AnswerPayload,
        time_spent_seconds: i64,
        now: PrimitiveDateTime,
    ) -> Result<ExamAnswer, ServiceError> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.student_id != caller.user_id {
            return Err(ServiceError::Forbidden("Not your attempt"));
        }
        if !attempt.layout.contains(exam_question_id) {
            return Err(ServiceError::NotFound("Exam question"));
        }
        if attempt.status != AttemptStatus::InProgress {
            return Err(ServiceError::InvalidState(ALREADY_SUBMITTED));
        }
        let exam = self.load_exam(&attempt.exam_id).await?;
        if let Err(closed) =
            attempt_timing::ensure_within_submit_window(&attempt, &exam, now, self.submit_grace_seconds)
        {
            self.close_expired(&attempt, &exam).await?;
            return Err(closed);
        }

        let (answer_text, selected_option) = payload.into_columns();
        let selected_option = selected_option
            .map(i32::try_from)
            .transpose()
            .map_err(|_| ServiceError::Validation("selected_option is out of range".to_string()))?;

        let draft = AnswerDraft {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt.id.clone(),
            exam_question_id: exam_question_id.to_string(),
            answer_text,
            selected_option,
            time_spent_seconds: i32::try_from(time_spent_seconds.max(0)).unwrap_or(i32::MAX),
            answered_at: now,
        };

        match self.store.upsert_answer(draft).await? {
            UpsertAnswerOutcome::Saved(answer) => {
                metrics::counter!(ANSWERS_RECORDED).increment(1);
                tracing::debug!(
                    attempt_id = %attempt.id,
                    exam_question_id = %exam_question_id,
                    "Answer recorded"
                );
                Ok(answer)
            }
            UpsertAnswerOutcome::AttemptMissing => Err(ServiceError::NotFound("Attempt")),
            UpsertAnswerOutcome::NotInProgress(_) => {
                Err(ServiceError::InvalidState(ALREADY_SUBMITTED))
            }
        }
    }

    pub(crate) async fn submit_attempt(
        &self,
        caller: &Caller,
        attempt_id: &str,
        time_spent_seconds: Option<i64>,
        include_review: bool,
        now: PrimitiveDateTime,
    ) -> Result<SubmittedAttempt, ServiceError> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.student_id != caller.user_id {
            return Err(ServiceError::Forbidden("Not your attempt"));
        }
        if attempt.status != AttemptStatus::InProgress {
            return Err(ServiceError::InvalidState(ALREADY_SUBMITTED));
        }
        let exam = self.load_exam(&attempt.exam_id).await?;
        if let Err(closed) =
            attempt_timing::ensure_within_submit_window(&attempt, &exam, now, self.submit_grace_seconds)
        {
            self.close_expired(&attempt, &exam).await?;
            return Err(closed);
        }
        let questions = self.load_questions(&exam.id).await?;

        let submission = Submission {
            submitted_at: now,
            time_spent_seconds: attempt_timing::clamp_time_spent(
                time_spent_seconds,
                attempt.started_at,
                now,
            ),
        };
        let grader = |attempt: &ExamAttempt, answers: &[ExamAnswer]| {
            scoring::grade_attempt(&exam, &questions, &attempt.layout, answers)
        };

        let (attempt, answers) = match self.store.finalize_attempt(attempt_id, submission, &grader).await? {
            FinalizeOutcome::Finalized { attempt, answers } => (attempt, answers),
            FinalizeOutcome::AttemptMissing => return Err(ServiceError::NotFound("Attempt")),
            FinalizeOutcome::AlreadyFinished(status) => {
                tracing::info!(attempt_id = %attempt_id, status = ?status, "Duplicate submit rejected");
                return Err(ServiceError::InvalidState(ALREADY_SUBMITTED));
            }
        };

        let status_label = match attempt.status {
            AttemptStatus::Graded => "graded",
            _ => "submitted",
        };
        metrics::counter!(ATTEMPTS_SUBMITTED, "status" => status_label).increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %attempt.exam_id,
            student_id = %attempt.student_id,
            attempt_number = attempt.attempt_number,
            total_score = ?attempt.total_score,
            status = ?attempt.status,
            "Attempt submitted"
        );

        let show_scores = scores_visible(&exam, caller);
        let review = (include_review && review_visible(&exam, &attempt, caller))
            .then(|| sanitizer::review(&attempt.layout, &questions));

        Ok(SubmittedAttempt { attempt, answers, show_scores, review })
    }

    pub(crate) async fn get_attempt(
        &self,
        caller: &Caller,
        attempt_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<AttemptView, ServiceError> {
        let mut attempt = self.load_attempt(attempt_id).await?;
        let exam = self.load_exam(&attempt.exam_id).await?;
        if attempt.student_id != caller.user_id && !is_exam_staff(&exam, caller) {
            return Err(ServiceError::Forbidden("Not your attempt"));
        }
        if attempt.status == AttemptStatus::InProgress
            && attempt_timing::ensure_within_submit_window(&attempt, &exam, now, self.submit_grace_seconds)
                .is_err()
        {
            if let Some(closed) = self.close_expired(&attempt, &exam).await? {
                attempt = closed;
            } else {
                attempt = self.load_attempt(attempt_id).await?;
            }
        }

        let questions = self.load_questions(&exam.id).await?;
        let answers = self.store.list_answers(&attempt.id).await?;
        let questions = if review_visible(&exam, &attempt, caller) {
            AttemptQuestions::Review(sanitizer::review(&attempt.layout, &questions))
        } else {
            AttemptQuestions::Sanitized(sanitizer::project(&attempt.layout, &questions))
        };

        let show_scores = scores_visible(&exam, caller);
        Ok(AttemptView { attempt, exam, questions, answers, show_scores })
    }

    /// Finalizes an attempt whose submit window has passed, stamped at its
    /// hard deadline with whatever answers were recorded. Returns `None` when
    /// a concurrent request finished it first.
    async fn close_expired(
        &self,
        attempt: &ExamAttempt,
        exam: &Exam,
    ) -> Result<Option<ExamAttempt>, ServiceError> {
        let questions = self.load_questions(&exam.id).await?;
        let deadline = attempt_timing::hard_deadline(attempt, exam);
        let submission = Submission {
            submitted_at: deadline,
            time_spent_seconds: attempt_timing::clamp_time_spent(None, attempt.started_at, deadline),
        };
        let grader = |attempt: &ExamAttempt, answers: &[ExamAnswer]| {
            scoring::grade_attempt(exam, &questions, &attempt.layout, answers)
        };

        match self.store.finalize_attempt(&attempt.id, submission, &grader).await? {
            FinalizeOutcome::Finalized { attempt, .. } => {
                metrics::counter!(ATTEMPTS_SUBMITTED, "status" => "expired").increment(1);
                tracing::info!(
                    attempt_id = %attempt.id,
                    exam_id = %attempt.exam_id,
                    student_id = %attempt.student_id,
                    total_score = ?attempt.total_score,
                    status = ?attempt.status,
                    "Expired attempt closed at deadline"
                );
                Ok(Some(attempt))
            }
            FinalizeOutcome::AttemptMissing => Err(ServiceError::NotFound("Attempt")),
            FinalizeOutcome::AlreadyFinished(_) => Ok(None),
        }
    }

    pub(crate) async fn list_my_attempts(
        &self,
        caller: &Caller,
    ) -> Result<Vec<AttemptSummary>, ServiceError> {
        let attempts = self.store.list_attempts_by_student(&caller.user_id).await?;
        let mut summaries = Vec::with_capacity(attempts.len());
        let mut visibility: Vec<(String, bool)> = Vec::new();

        for attempt in attempts {
            let show_scores = match visibility.iter().find(|(exam_id, _)| exam_id == &attempt.exam_id) {
                Some((_, visible)) => *visible,
                None => {
                    let visible = match self.store.find_exam(&attempt.exam_id).await? {
                        Some(exam) => scores_visible(&exam, caller),
                        None => false,
                    };
                    visibility.push((attempt.exam_id.clone(), visible));
                    visible
                }
            };
            summaries.push(AttemptSummary { attempt, show_scores });
        }

        Ok(summaries)
    }
}
