use crate::CoreError;
use std::fmt;
use tracing::{debug, warn};

/// Phases of one add operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPhase {
    Validating,
    CatalogResolving,
    Merging,
    PreparingCandidate,
    Applying,
    Done,
    Failed,
}

impl fmt::Display for AddPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddPhase::Validating => write!(f, "validating"),
            AddPhase::CatalogResolving => write!(f, "catalog-resolving"),
            AddPhase::Merging => write!(f, "merging"),
            AddPhase::PreparingCandidate => write!(f, "preparing-candidate"),
            AddPhase::Applying => write!(f, "applying"),
            AddPhase::Done => write!(f, "done"),
            AddPhase::Failed => write!(f, "failed"),
        }
    }
}

pub fn validate_transition(from: AddPhase, to: AddPhase) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (AddPhase::Validating, AddPhase::CatalogResolving)
            | (AddPhase::CatalogResolving, AddPhase::Merging)
            | (AddPhase::Merging, AddPhase::PreparingCandidate)
            | (AddPhase::PreparingCandidate, AddPhase::Applying)
            | (AddPhase::Applying, AddPhase::Done)
            | (
                AddPhase::Validating
                    | AddPhase::CatalogResolving
                    | AddPhase::Merging
                    | AddPhase::PreparingCandidate
                    | AddPhase::Applying,
                AddPhase::Failed
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Tracks the phase of one add operation. A failed operation is never
/// resumed; the caller starts over from `Validating`.
#[derive(Debug)]
pub struct AddOperation {
    subject: String,
    phase: AddPhase,
}

impl AddOperation {
    pub fn start(subject: impl Into<String>) -> Self {
        let subject = subject.into();
        debug!("{subject}: {}", AddPhase::Validating);
        Self {
            subject,
            phase: AddPhase::Validating,
        }
    }

    /// Pick up a candidate that was prepared by an earlier invocation.
    pub fn resume_prepared(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            phase: AddPhase::PreparingCandidate,
        }
    }

    pub fn phase(&self) -> AddPhase {
        self.phase
    }

    pub fn advance(&mut self, to: AddPhase) -> Result<(), CoreError> {
        validate_transition(self.phase, to)?;
        debug!("{}: {} -> {to}", self.subject, self.phase);
        self.phase = to;
        Ok(())
    }

    /// Move to `Failed` and hand the error back for propagation.
    pub fn fail(&mut self, error: CoreError) -> CoreError {
        if validate_transition(self.phase, AddPhase::Failed).is_ok() {
            warn!("{}: failed while {}: {error}", self.subject, self.phase);
            self.phase = AddPhase::Failed;
        }
        error
    }
}
