pub mod calibration;
pub mod config;
pub mod error;
pub mod result;
pub mod sequence;
pub mod state;
pub mod trial;

pub use calibration::{CalibrationController, CalibrationResult, ToneRequest};
pub use config::{
    ConfigError, FieldError, InvalidSelection, Selection, SettingsField, TestConfiguration,
    MAX_GRID_SIZE, apply_setting, load_settings, validate,
};
pub use error::SessionError;
pub use result::ResultAssembler;
pub use sequence::{PreviewOutcome, RequestSequencer, Ticket};
pub use state::{
    AdvanceOutcome, PersistenceStatus, SessionEvent, SessionState, SessionStateMachine,
};
pub use trial::{PresentationOrder, PreviewRequest, Trial, TrialAdvance, TrialController};
