use time::{Duration, PrimitiveDateTime};

use crate::core::time::seconds_between;
use crate::db::models::{Exam, ExamAttempt};
use crate::services::{ServiceError, EXAM_ENDED, SUBMIT_WINDOW_CLOSED};

/// Rejects starts outside `[start_time, end_time]`; an absent bound is open.
pub(crate) fn check_exam_window(exam: &Exam, now: PrimitiveDateTime) -> Result<(), ServiceError> {
    if let Some(start_time) = exam.start_time {
        if now < start_time {
            return Err(ServiceError::NotYetOpen);
        }
    }
    if let Some(end_time) = exam.end_time {
        if now > end_time {
            return Err(ServiceError::Closed(EXAM_ENDED));
        }
    }

    Ok(())
}

pub(crate) fn compute_expiration(
    started_at: PrimitiveDateTime,
    duration_minutes: i32,
    end_time: Option<PrimitiveDateTime>,
) -> PrimitiveDateTime {
    let duration_deadline = started_at + Duration::minutes(duration_minutes.max(0) as i64);
    match end_time {
        Some(end_time) if end_time < duration_deadline => end_time,
        _ => duration_deadline,
    }
}

/// The earlier of the stored deadline and one recomputed from the exam's
/// current settings, so shortening an exam also tightens running attempts.
pub(crate) fn hard_deadline(attempt: &ExamAttempt, exam: &Exam) -> PrimitiveDateTime {
    let expected = compute_expiration(attempt.started_at, exam.duration_minutes, exam.end_time);
    if expected < attempt.expires_at {
        expected
    } else {
        attempt.expires_at
    }
}

pub(crate) fn ensure_within_submit_window(
    attempt: &ExamAttempt,
    exam: &Exam,
    now: PrimitiveDateTime,
    grace_seconds: i64,
) -> Result<(), ServiceError> {
    let cutoff = hard_deadline(attempt, exam) + Duration::seconds(grace_seconds.max(0));
    if now > cutoff {
        return Err(ServiceError::Closed(SUBMIT_WINDOW_CLOSED));
    }

    Ok(())
}

/// Client timers are advisory: reported time is bounded by server-side elapsed time.
pub(crate) fn clamp_time_spent(
    reported: Option<i64>,
    started_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> i32 {
    let elapsed = seconds_between(started_at, now);
    let value = reported.map(|seconds| seconds.clamp(0, elapsed)).unwrap_or(elapsed);
    i32::try_from(value).unwrap_or(i32::MAX)
}
