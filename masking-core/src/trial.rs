use serde::{Deserialize, Serialize};

/// Lifecycle of the live trial's combined-audio preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    /// A preview request is outstanding.
    AwaitingPreview,
    /// The latest committed gain has a matching preview.
    Ready,
    /// The latest preview request failed; the subject may retry.
    PreviewFailed,
    Finalized,
}

/// Audio a subject can replay during a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Playback {
    Masker,
    Maskee,
    Combined,
}
