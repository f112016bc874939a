//! Span constructors for the optional `tracing` feature

use crate::model::StudentId;
use tracing::{info_span, Span};

pub fn reconciliation_span(dry_run: bool) -> Span {
    info_span!("feeguard.reconcile", dry_run)
}

pub fn student_span(name: &str) -> Span {
    info_span!("feeguard.student", student = name)
}

pub fn transition_span(student_id: StudentId) -> Span {
    info_span!("feeguard.transition", student_id = %student_id)
}

pub fn enrollment_span(name: &str) -> Span {
    info_span!("feeguard.enroll", student = name)
}

pub fn credit_span(student_id: StudentId) -> Span {
    info_span!("feeguard.credit.apply", student_id = %student_id)
}

pub fn transaction_span() -> Span {
    info_span!("feeguard.transaction")
}
