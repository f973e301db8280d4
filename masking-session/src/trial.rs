use crate::calibration::CalibrationResult;
use crate::error::SessionError;
use crate::sequence::{PreviewOutcome, RequestSequencer, Ticket};
use masking_core::{Playback, StimulusGrid, TrialState, shuffle, unshuffle};
use masking_signals::{AudioPayload, GeneratedSignals, SignalError, SignalService};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Order in which grid positions are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PresentationOrder {
    #[default]
    GridOrder,
    Shuffled { seed: u64 },
}

impl PresentationOrder {
    /// Grid indices in presentation order.
    pub fn sequence(&self, len: usize) -> Vec<usize> {
        let indices: Vec<usize> = (0..len).collect();
        match *self {
            Self::GridOrder => indices,
            Self::Shuffled { seed } => shuffle(&indices, seed).items,
        }
    }
}

/// The live trial.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    /// 0-based position in presentation order.
    pub number: usize,
    pub grid_index: usize,
    pub position: f64,
    /// Exploration gain in dB above the calibration level.
    pub gain_db: f64,
    pub state: TrialState,
}

/// A combine request the controller wants executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewRequest {
    pub ticket: Ticket,
    pub grid_index: usize,
    /// Mixing gain sent to the service: exploration gain plus calibration gain.
    pub gain_db: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialAdvance {
    /// The next trial started; its initial preview is pending.
    Next(PreviewRequest),
    /// Every position is finalized. Responses are in grid order.
    Completed(Vec<f64>),
}

/// Runs one adaptive trial per grid position, strictly one after another.
#[derive(Debug, Clone)]
pub struct TrialController {
    masker: AudioPayload,
    maskees: Vec<AudioPayload>,
    positions: Vec<f64>,
    calibration: CalibrationResult,
    order: Vec<usize>,
    finalized: Vec<f64>,
    current: Option<Trial>,
    sequencer: RequestSequencer,
    pending: Option<PreviewRequest>,
    combined: Option<AudioPayload>,
}

fn round_centi(db: f64) -> f64 {
    (db * 100.0).round() / 100.0
}

impl TrialController {
    /// Starts the first trial with its initial preview pending.
    pub fn new(
        signals: GeneratedSignals,
        grid: &StimulusGrid,
        calibration: CalibrationResult,
        order: PresentationOrder,
    ) -> Result<Self, SessionError> {
        if signals.maskees.len() != grid.len() {
            return Err(SessionError::MaskeeCount {
                expected: grid.len(),
                actual: signals.maskees.len(),
            });
        }
        if grid.is_empty() {
            return Err(SessionError::EmptyGrid);
        }

        let mut controller = Self {
            masker: signals.masker,
            maskees: signals.maskees,
            positions: grid.positions().to_vec(),
            calibration,
            order: order.sequence(grid.len()),
            finalized: Vec::with_capacity(grid.len()),
            current: None,
            sequencer: RequestSequencer::new(),
            pending: None,
            combined: None,
        };
        controller.begin(0)?;
        Ok(controller)
    }

    fn begin(&mut self, number: usize) -> Result<PreviewRequest, SessionError> {
        let grid_index = self.order[number];
        self.current = Some(Trial {
            number,
            grid_index,
            position: self.positions[grid_index],
            gain_db: self.default_gain(),
            state: TrialState::AwaitingPreview,
        });
        self.combined = None;
        debug!(number, grid_index, "trial started");
        self.request_preview()
    }

    fn request_preview(&mut self) -> Result<PreviewRequest, SessionError> {
        let trial = self.current.as_mut().ok_or(SessionError::TrialsFinished)?;
        trial.state = TrialState::AwaitingPreview;
        let request = PreviewRequest {
            ticket: self.sequencer.issue(),
            grid_index: trial.grid_index,
            gain_db: trial.gain_db + self.calibration.gain_db(),
        };
        self.pending = Some(request);
        Ok(request)
    }

    /// Gain a new trial starts at: the top of the exploration range.
    pub fn default_gain(&self) -> f64 {
        self.calibration.headroom_db()
    }

    pub fn calibration(&self) -> CalibrationResult {
        self.calibration
    }

    pub fn current(&self) -> Option<&Trial> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.current.is_none()
    }

    /// `(finalized, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.finalized.len(), self.positions.len())
    }

    /// Moves the exploration gain without contacting the service. Clamped to
    /// `[0, -calibration]`; a non-finite gain is rejected and the old one kept.
    pub fn adjust_gain(&mut self, gain_db: f64) -> Result<f64, SessionError> {
        if !gain_db.is_finite() {
            return Err(SessionError::NonFinite {
                what: "exploration gain",
                value: gain_db,
            });
        }
        let max = self.default_gain();
        let trial = self.current.as_mut().ok_or(SessionError::TrialsFinished)?;
        trial.gain_db = round_centi(gain_db.clamp(0.0, max));
        Ok(trial.gain_db)
    }

    /// Settles on `gain_db` and issues a preview request for it.
    pub fn commit_gain(&mut self, gain_db: f64) -> Result<PreviewRequest, SessionError> {
        self.adjust_gain(gain_db)?;
        self.request_preview()
    }

    /// Re-requests the preview for the current gain, e.g. after a failure.
    pub fn retry_preview(&mut self) -> Result<PreviewRequest, SessionError> {
        self.request_preview()
    }

    pub fn pending_preview(&self) -> Option<PreviewRequest> {
        self.pending
    }

    pub fn resolve_preview(
        &mut self,
        ticket: Ticket,
        result: Result<AudioPayload, SignalError>,
    ) -> PreviewOutcome {
        if !self.sequencer.is_latest(ticket) {
            debug!(%ticket, "dropping stale preview");
            return PreviewOutcome::Stale;
        }
        self.pending = None;
        let Some(trial) = self.current.as_mut() else {
            return PreviewOutcome::Stale;
        };
        match result {
            Ok(audio) => {
                trial.state = TrialState::Ready;
                self.combined = Some(audio);
                PreviewOutcome::Applied
            }
            Err(err) => {
                warn!(%ticket, trial = trial.number, error = %err, "preview failed");
                trial.state = TrialState::PreviewFailed;
                self.combined = None;
                PreviewOutcome::Failed(err)
            }
        }
    }

    /// Executes the pending request, if any, against `service`.
    pub fn fetch_preview<S: SignalService>(&mut self, service: &S) -> Option<PreviewOutcome> {
        let request = self.pending?;
        let maskee = self.maskees.get(request.grid_index)?;
        let result = service.combine(&self.masker, maskee, request.gain_db);
        Some(self.resolve_preview(request.ticket, result))
    }

    /// Finalizes the current gain and moves on.
    pub fn advance(&mut self) -> Result<TrialAdvance, SessionError> {
        let mut trial = self.current.take().ok_or(SessionError::TrialsFinished)?;
        trial.state = TrialState::Finalized;
        self.finalized.push(trial.gain_db);
        info!(
            trial = trial.number,
            position = trial.position,
            gain_db = trial.gain_db,
            "trial finalized"
        );

        let next = trial.number + 1;
        if next < self.order.len() {
            return self.begin(next).map(TrialAdvance::Next);
        }

        self.pending = None;
        self.combined = None;
        let responses = unshuffle(&self.finalized, &self.order)?;
        Ok(TrialAdvance::Completed(responses))
    }

    /// Audio for replay. `Combined` is only available once the latest preview
    /// has arrived.
    pub fn playback(&self, which: Playback) -> Option<&AudioPayload> {
        match which {
            Playback::Masker => Some(&self.masker),
            Playback::Maskee => {
                let trial = self.current.as_ref()?;
                self.maskees.get(trial.grid_index)
            }
            Playback::Combined => self.combined.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationController;
    use masking_core::DomainKind;

    fn audio(s: &str) -> AudioPayload {
        AudioPayload::from_base64(s)
    }

    fn controller(order: PresentationOrder, n: usize) -> TrialController {
        let grid = StimulusGrid::build(DomainKind::Time, n, 0.02, 0.5);
        let signals = GeneratedSignals {
            masker: audio("M"),
            maskees: (0..n).map(|i| audio(&format!("m{i}"))).collect(),
        };
        TrialController::new(signals, &grid, calibrated(-40.0), order).unwrap()
    }

    fn calibrated(db: f64) -> CalibrationResult {
        let mut calibration = CalibrationController::new();
        calibration.adjust(db).unwrap();
        calibration.confirm()
    }

    #[test]
    fn first_trial_starts_at_default_gain_with_preview_pending() {
        let c = controller(PresentationOrder::GridOrder, 3);
        let trial = c.current().unwrap();
        assert_eq!(trial.gain_db, 40.0);
        assert_eq!(trial.state, TrialState::AwaitingPreview);
        // 40 above a -40 calibration mixes at 0 dB.
        assert_eq!(c.pending_preview().unwrap().gain_db, 0.0);
    }

    #[test]
    fn gain_is_clamped_to_exploration_range() {
        let mut c = controller(PresentationOrder::GridOrder, 3);
        assert_eq!(c.adjust_gain(55.0).unwrap(), 40.0);
        assert_eq!(c.adjust_gain(-3.0).unwrap(), 0.0);
        assert_eq!(c.adjust_gain(12.345).unwrap(), 12.35);
    }

    #[test]
    fn non_finite_gain_is_rejected_and_previous_kept() {
        let mut c = controller(PresentationOrder::GridOrder, 2);
        c.adjust_gain(12.0).unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(c.adjust_gain(bad), Err(SessionError::NonFinite { .. })));
            assert!(c.commit_gain(bad).is_err());
        }
        assert_eq!(c.current().unwrap().gain_db, 12.0);

        c.advance().unwrap();
        c.adjust_gain(5.0).unwrap();
        assert_eq!(c.advance().unwrap(), TrialAdvance::Completed(vec![12.0, 5.0]));
    }

    #[test]
    fn rejects_empty_grid() {
        let grid = StimulusGrid::build(DomainKind::Time, 0, 0.02, 0.5);
        let signals = GeneratedSignals {
            masker: audio("M"),
            maskees: Vec::new(),
        };
        let err = TrialController::new(signals, &grid, calibrated(-40.0), PresentationOrder::GridOrder)
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptyGrid));
    }

    #[test]
    fn commit_sends_calibration_relative_mixing_gain() {
        let mut c = controller(PresentationOrder::GridOrder, 3);
        let req = c.commit_gain(10.0).unwrap();
        assert_eq!(req.gain_db, -30.0);
        assert_eq!(req.grid_index, 0);
    }

    #[test]
    fn stale_preview_is_discarded() {
        let mut c = controller(PresentationOrder::GridOrder, 3);
        let older = c.commit_gain(10.0).unwrap();
        let newer = c.commit_gain(20.0).unwrap();

        assert_eq!(c.resolve_preview(older.ticket, Ok(audio("old"))), PreviewOutcome::Stale);
        assert_eq!(c.current().unwrap().state, TrialState::AwaitingPreview);
        assert!(c.playback(Playback::Combined).is_none());

        assert!(c.resolve_preview(newer.ticket, Ok(audio("new"))).is_applied());
        assert_eq!(c.current().unwrap().state, TrialState::Ready);
        assert_eq!(c.playback(Playback::Combined), Some(&audio("new")));
    }

    #[test]
    fn failed_preview_can_be_retried_without_losing_responses() {
        let mut c = controller(PresentationOrder::GridOrder, 3);
        c.adjust_gain(7.0).unwrap();
        c.advance().unwrap();

        let req = c.commit_gain(9.0).unwrap();
        let outcome = c.resolve_preview(req.ticket, Err(SignalError::Timeout { elapsed_ms: 10 }));
        assert!(matches!(outcome, PreviewOutcome::Failed(_)));
        assert_eq!(c.current().unwrap().state, TrialState::PreviewFailed);

        let retry = c.retry_preview().unwrap();
        assert_eq!(retry.gain_db, -31.0);
        assert!(c.resolve_preview(retry.ticket, Ok(audio("ok"))).is_applied());
        assert_eq!(c.progress(), (1, 3));
    }

    #[test]
    fn completes_after_exactly_grid_len_advances() {
        let mut c = controller(PresentationOrder::GridOrder, 3);
        for (i, gain) in [5.0, 15.0].into_iter().enumerate() {
            c.adjust_gain(gain).unwrap();
            match c.advance().unwrap() {
                TrialAdvance::Next(req) => assert_eq!(req.grid_index, i + 1),
                other => panic!("unexpected {other:?}"),
            }
            // Each new trial resets to the default gain.
            assert_eq!(c.current().unwrap().gain_db, 40.0);
        }
        c.adjust_gain(25.0).unwrap();
        assert_eq!(c.advance().unwrap(), TrialAdvance::Completed(vec![5.0, 15.0, 25.0]));
        assert!(c.is_complete());
        assert!(matches!(c.advance(), Err(SessionError::TrialsFinished)));
    }

    #[test]
    fn shuffled_presentation_reports_grid_order() {
        let order = PresentationOrder::Shuffled { seed: 51 };
        let presented = order.sequence(4);
        let mut c = controller(order, 4);

        let mut outcome = None;
        for expected_index in &presented {
            let trial = c.current().unwrap().clone();
            assert_eq!(trial.grid_index, *expected_index);
            assert_eq!(c.playback(Playback::Maskee), Some(&audio(&format!("m{expected_index}"))));
            // Gain encodes the grid index so order is checkable.
            c.adjust_gain(trial.grid_index as f64).unwrap();
            outcome = Some(c.advance().unwrap());
        }
        assert_eq!(outcome, Some(TrialAdvance::Completed(vec![0.0, 1.0, 2.0, 3.0])));
    }

    #[test]
    fn rejects_maskee_count_mismatch() {
        let grid = StimulusGrid::build(DomainKind::Time, 3, 0.02, 0.5);
        let signals = GeneratedSignals {
            masker: audio("M"),
            maskees: vec![audio("a")],
        };
        let err = TrialController::new(
            signals,
            &grid,
            calibrated(-80.0),
            PresentationOrder::GridOrder,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::MaskeeCount { expected: 3, actual: 1 }));
    }
}
