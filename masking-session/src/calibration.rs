use crate::error::SessionError;
use crate::sequence::{PreviewOutcome, RequestSequencer, Ticket};
use masking_signals::{AudioPayload, SignalError, SignalService};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const MIN_VOLUME_DB: f64 = -80.0;
pub const MAX_VOLUME_DB: f64 = 0.0;

/// Quietest level the subject could still hear, in dB re. full scale.
/// All trial gains are measured from here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    gain_db: f64,
}

impl CalibrationResult {
    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    /// Upper bound of the exploration range: the distance from the
    /// calibration level up to full scale.
    pub fn headroom_db(&self) -> f64 {
        -self.gain_db
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneRequest {
    pub ticket: Ticket,
    pub volume_db: f64,
}

#[derive(Debug, Clone)]
pub struct CalibrationController {
    volume_db: f64,
    sequencer: RequestSequencer,
    pending: Option<ToneRequest>,
    tone: Option<AudioPayload>,
    last_error: Option<SignalError>,
}

impl Default for CalibrationController {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationController {
    /// Starts at the quietest volume with the initial tone request pending.
    pub fn new() -> Self {
        let mut controller = Self {
            volume_db: MIN_VOLUME_DB,
            sequencer: RequestSequencer::new(),
            pending: None,
            tone: None,
            last_error: None,
        };
        controller.request_tone();
        controller
    }

    pub fn volume_db(&self) -> f64 {
        self.volume_db
    }

    /// Moves the volume without requesting a tone. Clamped to the slider range
    /// and rounded to whole decibels; a non-finite value leaves it unchanged.
    pub fn adjust(&mut self, volume_db: f64) -> Result<f64, SessionError> {
        if !volume_db.is_finite() {
            return Err(SessionError::NonFinite {
                what: "calibration volume",
                value: volume_db,
            });
        }
        self.volume_db = volume_db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB).round();
        Ok(self.volume_db)
    }

    /// Settles on `volume_db` and asks for a tone at that level.
    pub fn commit(&mut self, volume_db: f64) -> Result<ToneRequest, SessionError> {
        self.adjust(volume_db)?;
        Ok(self.request_tone())
    }

    fn request_tone(&mut self) -> ToneRequest {
        let request = ToneRequest {
            ticket: self.sequencer.issue(),
            volume_db: self.volume_db,
        };
        debug!(ticket = %request.ticket, volume_db = request.volume_db, "calibration tone requested");
        self.pending = Some(request);
        request
    }

    pub fn pending_request(&self) -> Option<ToneRequest> {
        self.pending
    }

    pub fn resolve(
        &mut self,
        ticket: Ticket,
        result: Result<AudioPayload, SignalError>,
    ) -> PreviewOutcome {
        if !self.sequencer.is_latest(ticket) {
            debug!(%ticket, "dropping stale calibration tone");
            return PreviewOutcome::Stale;
        }
        self.pending = None;
        match result {
            Ok(tone) => {
                self.tone = Some(tone);
                self.last_error = None;
                PreviewOutcome::Applied
            }
            Err(err) => {
                warn!(%ticket, error = %err, "calibration tone failed");
                self.last_error = Some(err.clone());
                PreviewOutcome::Failed(err)
            }
        }
    }

    /// Runs the pending request, if any, against `service`.
    pub fn fetch_tone<S: SignalService>(&mut self, service: &S) -> Option<PreviewOutcome> {
        let request = self.pending?;
        let result = service.calibration_tone(request.volume_db);
        Some(self.resolve(request.ticket, result))
    }

    pub fn tone(&self) -> Option<&AudioPayload> {
        self.tone.as_ref()
    }

    pub fn last_error(&self) -> Option<&SignalError> {
        self.last_error.as_ref()
    }

    pub fn confirm(&self) -> CalibrationResult {
        info!(gain_db = self.volume_db, "calibration confirmed");
        CalibrationResult {
            gain_db: self.volume_db,
        }
    }
}
