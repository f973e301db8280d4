use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a masking session, in the order a subject walks through them.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStage {
    #[default]
    Identification,
    Calibration,
    Configuration,
    TrialLoop,
    Completion,
}

impl SessionStage {
    pub fn next(&self) -> Option<Self> {
        use SessionStage::*;
        Some(match self {
            Identification => Calibration,
            Calibration => Configuration,
            Configuration => TrialLoop,
            TrialLoop => Completion,
            Completion => return None,
        })
    }

    /// Test settings are editable until the trial loop starts.
    pub fn allows_settings_edit(&self) -> bool {
        matches!(
            self,
            Self::Identification | Self::Calibration | Self::Configuration
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Identification => "identification",
            Self::Calibration => "calibration",
            Self::Configuration => "configuration",
            Self::TrialLoop => "trial loop",
            Self::Completion => "completion",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
