use std::fmt;

use shared::domain::Scope;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    ProposedPrice,
    LocationLabel,
    District,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    NotANumber,
    NotPositive,
    UnknownDistrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: FormField,
    pub problem: FieldProblem,
}

/// Every field that kept a correction form from being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationFailure {
    pub issues: Vec<FieldIssue>,
}

impl ValidationFailure {
    pub fn push(&mut self, field: FormField, problem: FieldProblem) {
        self.issues.push(FieldIssue { field, problem });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, field: FormField) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:?} {:?}", issue.field, issue.problem)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("cannot {operation} for scope {scope} while {state}")]
    InvalidStateTransition {
        scope: Scope,
        operation: &'static str,
        state: &'static str,
    },
    #[error("correction rejected: {0}")]
    Validation(ValidationFailure),
    #[error("submission sink failed: {0}")]
    Sink(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlertError {
    #[error("alerts are disabled")]
    Disabled,
    #[error("alert threshold must be a positive price, got {0}")]
    InvalidThreshold(f64),
}
