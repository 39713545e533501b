use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;
use tokio::sync::Mutex;

use super::{
    graded_status, AnswerDraft, AttemptStore, FinalizeOutcome, Grader, InsertAttemptOutcome,
    ManualGrade, ManualGradeOutcome, NewAttempt, QuestionFilter, StoreError, Submission,
    UpsertAnswerOutcome,
};
use crate::db::models::{Exam, ExamAnswer, ExamAttempt, ExamQuestion, ExamQuestionDetail, Question};
use crate::db::types::AttemptStatus;
use crate::services::scoring::AttemptGrade;

/// Process-local store. One mutex serializes every operation, which gives the
/// same atomicity the PostgreSQL backend gets from transactions and locks.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    questions: HashMap<String, Question>,
    exams: HashMap<String, Exam>,
    bindings: Vec<ExamQuestion>,
    attempts: HashMap<String, ExamAttempt>,
    answers: HashMap<(String, String), ExamAnswer>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn answers_for(&self, attempt_id: &str) -> Vec<ExamAnswer> {
        let mut answers: Vec<ExamAnswer> = self
            .answers
            .values()
            .filter(|answer| answer.attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by(|a, b| {
            a.answered_at.cmp(&b.answered_at).then_with(|| a.exam_question_id.cmp(&b.exam_question_id))
        });
        answers
    }

    fn apply_grade(&mut self, attempt_id: &str, grade: &AttemptGrade) {
        for answer_grade in grade.answers.iter().filter(|answer| answer.answered) {
            let key = (attempt_id.to_string(), answer_grade.exam_question_id.clone());
            if let Some(answer) = self.answers.get_mut(&key) {
                answer.is_correct = answer_grade.is_correct;
                answer.points_earned = Some(answer_grade.points_earned);
            }
        }
    }
}

fn apply_aggregates(attempt: &mut ExamAttempt, grade: &AttemptGrade, now: PrimitiveDateTime) {
    attempt.status = graded_status(grade);
    attempt.total_score = Some(grade.total_score);
    attempt.percentage = Some(grade.percentage);
    attempt.passed = Some(grade.passed);
    attempt.graded_at = (attempt.status == AttemptStatus::Graded).then_some(now);
    attempt.updated_at = now;
}

#[async_trait]
impl AttemptStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _state = self.state.lock().await;
        Ok(())
    }

    async fn create_question(&self, question: Question) -> Result<Question, StoreError> {
        let mut state = self.state.lock().await;
        state.questions.insert(question.id.clone(), question.clone());
        Ok(question)
    }

    async fn find_question(&self, id: &str) -> Result<Option<Question>, StoreError> {
        Ok(self.state.lock().await.questions.get(id).cloned())
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StoreError> {
        let state = self.state.lock().await;
        let mut questions: Vec<Question> = state
            .questions
            .values()
            .filter(|question| filter.include_inactive || question.is_active)
            .filter(|question| filter.bank_id.as_ref().map_or(true, |bank| &question.bank_id == bank))
            .filter(|question| {
                filter.created_by.as_ref().map_or(true, |owner| &question.created_by == owner)
            })
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(questions)
    }

    async fn deactivate_question(
        &self,
        id: &str,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.questions.get_mut(id) {
            Some(question) => {
                question.is_active = false;
                question.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_exam(
        &self,
        exam: Exam,
        bindings: Vec<ExamQuestion>,
    ) -> Result<Exam, StoreError> {
        let mut state = self.state.lock().await;
        state.exams.insert(exam.id.clone(), exam.clone());
        state.bindings.extend(bindings);
        Ok(exam)
    }

    async fn find_exam(&self, id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(self.state.lock().await.exams.get(id).cloned())
    }

    async fn update_exam(&self, exam: &Exam) -> Result<Exam, StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .exams
            .get_mut(&exam.id)
            .ok_or_else(|| StoreError::Inconsistent(format!("exam {} vanished", exam.id)))?;
        *stored = exam.clone();
        Ok(stored.clone())
    }

    async fn list_exam_questions(
        &self,
        exam_id: &str,
    ) -> Result<Vec<ExamQuestionDetail>, StoreError> {
        let state = self.state.lock().await;
        let mut details = Vec::new();
        for binding in state.bindings.iter().filter(|binding| binding.exam_id == exam_id) {
            let question = state.questions.get(&binding.question_id).ok_or_else(|| {
                StoreError::Inconsistent(format!("question {} missing", binding.question_id))
            })?;
            details.push(ExamQuestionDetail { binding: binding.clone(), question: question.clone() });
        }
        details.sort_by(|a, b| {
            a.binding.position.cmp(&b.binding.position).then_with(|| a.binding.id.cmp(&b.binding.id))
        });
        Ok(details)
    }

    async fn insert_attempt(
        &self,
        attempt: NewAttempt,
        max_attempts: i32,
    ) -> Result<InsertAttemptOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let prior: Vec<i32> = state
            .attempts
            .values()
            .filter(|row| row.exam_id == attempt.exam_id && row.student_id == attempt.student_id)
            .map(|row| row.attempt_number)
            .collect();

        let used = prior.len() as i64;
        if used >= i64::from(max_attempts) {
            return Ok(InsertAttemptOutcome::LimitReached { used });
        }

        let attempt_number = prior.iter().copied().max().unwrap_or(0) + 1;
        let row = ExamAttempt {
            id: attempt.id,
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            attempt_number,
            status: AttemptStatus::InProgress,
            shuffle_seed: attempt.shuffle_seed,
            layout: Json(attempt.layout),
            started_at: attempt.started_at,
            expires_at: attempt.expires_at,
            submitted_at: None,
            time_spent_seconds: None,
            total_score: None,
            percentage: None,
            passed: None,
            graded_at: None,
            created_at: attempt.started_at,
            updated_at: attempt.started_at,
        };
        state.attempts.insert(row.id.clone(), row.clone());
        Ok(InsertAttemptOutcome::Inserted(row))
    }

    async fn find_attempt(&self, id: &str) -> Result<Option<ExamAttempt>, StoreError> {
        Ok(self.state.lock().await.attempts.get(id).cloned())
    }

    async fn list_attempts_by_exam(
        &self,
        exam_id: &str,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<ExamAttempt>, i64), StoreError> {
        let state = self.state.lock().await;
        let mut attempts: Vec<ExamAttempt> =
            state.attempts.values().filter(|row| row.exam_id == exam_id).cloned().collect();
        attempts.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.student_id.cmp(&b.student_id))
                .then_with(|| b.attempt_number.cmp(&a.attempt_number))
        });

        let total = attempts.len() as i64;
        let page = attempts
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.clamp(1, 1000) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<ExamAttempt>, StoreError> {
        let state = self.state.lock().await;
        let mut attempts: Vec<ExamAttempt> =
            state.attempts.values().filter(|row| row.student_id == student_id).cloned().collect();
        attempts.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.exam_id.cmp(&b.exam_id))
                .then_with(|| b.attempt_number.cmp(&a.attempt_number))
        });
        Ok(attempts)
    }

    async fn upsert_answer(&self, answer: AnswerDraft) -> Result<UpsertAnswerOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(attempt) = state.attempts.get(&answer.attempt_id) else {
            return Ok(UpsertAnswerOutcome::AttemptMissing);
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(UpsertAnswerOutcome::NotInProgress(attempt.status));
        }

        let key = (answer.attempt_id.clone(), answer.exam_question_id.clone());
        let row = match state.answers.get_mut(&key) {
            Some(existing) => {
                existing.answer_text = answer.answer_text;
                existing.selected_option = answer.selected_option;
                existing.time_spent_seconds = answer.time_spent_seconds;
                existing.answered_at = answer.answered_at;
                existing.clone()
            }
            None => {
                let row = ExamAnswer {
                    id: answer.id,
                    attempt_id: answer.attempt_id,
                    exam_question_id: answer.exam_question_id,
                    answer_text: answer.answer_text,
                    selected_option: answer.selected_option,
                    time_spent_seconds: answer.time_spent_seconds,
                    answered_at: answer.answered_at,
                    is_correct: None,
                    points_earned: None,
                    graded_by: None,
                    feedback: None,
                };
                state.answers.insert(key, row.clone());
                row
            }
        };

        Ok(UpsertAnswerOutcome::Saved(row))
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<ExamAnswer>, StoreError> {
        Ok(self.state.lock().await.answers_for(attempt_id))
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        submission: Submission,
        grader: Grader<'_>,
    ) -> Result<FinalizeOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(attempt) = state.attempts.get(attempt_id).cloned() else {
            return Ok(FinalizeOutcome::AttemptMissing);
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(FinalizeOutcome::AlreadyFinished(attempt.status));
        }

        let answers = state.answers_for(attempt_id);
        let grade = grader(&attempt, &answers);
        state.apply_grade(attempt_id, &grade);

        let mut finalized = attempt;
        finalized.submitted_at = Some(submission.submitted_at);
        finalized.time_spent_seconds = Some(submission.time_spent_seconds);
        apply_aggregates(&mut finalized, &grade, submission.submitted_at);
        state.attempts.insert(finalized.id.clone(), finalized.clone());

        let answers = state.answers_for(attempt_id);
        Ok(FinalizeOutcome::Finalized { attempt: finalized, answers })
    }

    async fn apply_manual_grade(
        &self,
        grade: ManualGrade,
        grader: Grader<'_>,
    ) -> Result<ManualGradeOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(attempt) = state.attempts.get(&grade.attempt_id).cloned() else {
            return Ok(ManualGradeOutcome::AttemptMissing);
        };
        if attempt.status == AttemptStatus::InProgress {
            return Ok(ManualGradeOutcome::AttemptInProgress);
        }

        let key = (grade.attempt_id.clone(), grade.exam_question_id.clone());
        let Some(answer) = state.answers.get_mut(&key) else {
            return Ok(ManualGradeOutcome::AnswerMissing);
        };
        answer.is_correct = grade.is_correct;
        answer.points_earned = Some(grade.points_earned);
        answer.feedback = grade.feedback;
        answer.graded_by = Some(grade.graded_by);

        let answers = state.answers_for(&grade.attempt_id);
        let attempt_grade = grader(&attempt, &answers);
        state.apply_grade(&grade.attempt_id, &attempt_grade);

        let mut updated = attempt;
        apply_aggregates(&mut updated, &attempt_grade, grade.graded_at);
        state.attempts.insert(updated.id.clone(), updated.clone());

        let answer = state
            .answers
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::Inconsistent(format!("answer {} vanished", key.1)))?;
        Ok(ManualGradeOutcome::Graded { attempt: updated, answer })
    }
}
