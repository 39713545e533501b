pub(crate) mod attempt_timing;
pub(crate) mod attempts;
pub(crate) mod exams;
pub(crate) mod questions;
pub(crate) mod sanitizer;
pub(crate) mod scoring;

use thiserror::Error;

use crate::store::StoreError;

/// Domain failures shared by the exam and attempt services.
#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    NotAvailable(&'static str),
    #[error("Exam has not opened yet")]
    NotYetOpen,
    #[error("{0}")]
    Closed(&'static str),
    #[error("Maximum attempts reached ({used}/{allowed} attempts used)")]
    AttemptLimitExceeded { used: i64, allowed: i32 },
    #[error("{0}")]
    InvalidState(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) const ALREADY_SUBMITTED: &str = "This exam was already submitted";
pub(crate) const EXAM_ENDED: &str = "Exam has ended";
pub(crate) const SUBMIT_WINDOW_CLOSED: &str = "Submission window has closed";
