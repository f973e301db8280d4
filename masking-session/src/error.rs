use crate::config::FieldError;
use masking_core::{DomainKind, PermutationError, SessionStage, TestKind};
use masking_signals::SignalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("`{action}` is not possible during {stage}")]
    WrongStage {
        action: &'static str,
        stage: SessionStage,
    },
    #[error("settings are frozen once the trials have started")]
    SettingsFrozen,
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("{test} is not offered in the {domain} domain")]
    TestNotInDomain { test: TestKind, domain: DomainKind },
    #[error("select a domain first")]
    NoDomain,
    #[error("signal service: {0}")]
    Signal(#[from] SignalError),
    #[error("expected {expected} maskees, got {actual}")]
    MaskeeCount { expected: usize, actual: usize },
    #[error("{what} must be a finite number of dB, got {value}")]
    NonFinite { what: &'static str, value: f64 },
    #[error("the stimulus grid has no positions")]
    EmptyGrid,
    #[error("{responses} responses for a grid of {grid} positions")]
    ResponseLength { grid: usize, responses: usize },
    #[error("all trials are already finalized")]
    TrialsFinished,
    #[error(transparent)]
    Permutation(#[from] PermutationError),
}
