use crate::calibration::{CalibrationController, CalibrationResult};
use crate::config::{self, InvalidSelection, Selection, SettingsField, TestConfiguration};
use crate::error::SessionError;
use crate::result::ResultAssembler;
use crate::sequence::{PreviewOutcome, Ticket};
use crate::trial::{PresentationOrder, PreviewRequest, TrialAdvance, TrialController};
use masking_core::{
    DomainKind, Playback, ResultRecord, SessionStage, StimulusGrid, TestKind, TestSettings,
};
use masking_signals::{AudioPayload, SignalError, SignalService};
use masking_store::ResultRepository;
use masking_timing::Timer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Subject actions, for drivers that prefer dispatching events over calling
/// methods.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SetSubject(String),
    EditSetting { field: SettingsField, value: String },
    AdjustVolume(f64),
    CommitVolume(f64),
    SelectDomain(DomainKind),
    ClearDomain,
    SelectTest(TestKind),
    ClearTest,
    AdjustGain(f64),
    CommitGain(f64),
    RetryPreview,
    Advance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceStatus {
    Saved { id: u64 },
    /// The record is still held in memory.
    Failed { reason: String },
}

impl PersistenceStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// Entered the given stage.
    Stage(SessionStage),
    /// Configuration is incomplete; nothing changed except the flags.
    SelectionRejected(InvalidSelection),
    /// A trial was finalized and the next one started.
    NextTrial { finalized: usize, total: usize },
    /// The last trial was finalized and the record assembled.
    Completed(PersistenceStatus),
}

/// Stage together with the data that only exists in that stage.
#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Identification,
    Calibration(CalibrationController),
    Configuration {
        calibration: CalibrationResult,
        selection: Selection,
        invalid: InvalidSelection,
    },
    TrialLoop {
        calibration: CalibrationResult,
        configuration: TestConfiguration,
        grid: StimulusGrid,
        trials: TrialController,
    },
    Completion {
        record: ResultRecord,
        persistence: PersistenceStatus,
    },
}

impl SessionState {
    pub fn stage(&self) -> SessionStage {
        match self {
            Self::Identification => SessionStage::Identification,
            Self::Calibration(_) => SessionStage::Calibration,
            Self::Configuration { .. } => SessionStage::Configuration,
            Self::TrialLoop { .. } => SessionStage::TrialLoop,
            Self::Completion { .. } => SessionStage::Completion,
        }
    }
}

/// Walks one subject through identification, calibration, configuration,
/// the trial loop and completion. There is no way back.
pub struct SessionStateMachine<S, R, T>
where
    S: SignalService,
    R: ResultRepository,
    T: Timer,
{
    service: S,
    repository: R,
    timer: T,
    subject: String,
    settings: TestSettings,
    order: PresentationOrder,
    state: SessionState,
    trial_started: Option<T::Timestamp>,
}

impl<S, R, T> SessionStateMachine<S, R, T>
where
    S: SignalService,
    R: ResultRepository,
    T: Timer,
{
    pub fn new(service: S, repository: R, timer: T) -> Self {
        Self {
            service,
            repository,
            timer,
            subject: String::new(),
            settings: TestSettings::default(),
            order: PresentationOrder::default(),
            state: SessionState::default(),
            trial_started: None,
        }
    }

    pub fn with_settings(mut self, settings: TestSettings) -> Result<Self, SessionError> {
        config::validate(&settings)?;
        self.settings = settings;
        Ok(self)
    }

    pub fn with_order(mut self, order: PresentationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn stage(&self) -> SessionStage {
        self.state.stage()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn settings(&self) -> &TestSettings {
        &self.settings
    }

    pub fn order(&self) -> PresentationOrder {
        self.order
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    fn wrong_stage(&self, action: &'static str) -> SessionError {
        SessionError::WrongStage {
            action,
            stage: self.stage(),
        }
    }

    pub fn set_subject(&mut self, name: &str) -> Result<(), SessionError> {
        if self.stage() != SessionStage::Identification {
            return Err(self.wrong_stage("set subject"));
        }
        self.subject = name.trim().to_string();
        Ok(())
    }

    pub fn apply_setting(&mut self, field: SettingsField, raw: &str) -> Result<(), SessionError> {
        if !self.stage().allows_settings_edit() {
            return Err(SessionError::SettingsFrozen);
        }
        config::apply_setting(&mut self.settings, field, raw)?;
        info!(%field, value = raw, "setting changed");
        Ok(())
    }

    // Calibration

    pub fn calibration(&self) -> Option<&CalibrationController> {
        match &self.state {
            SessionState::Calibration(c) => Some(c),
            _ => None,
        }
    }

    fn calibration_mut(&mut self, action: &'static str) -> Result<&mut CalibrationController, SessionError> {
        let stage = self.stage();
        match &mut self.state {
            SessionState::Calibration(c) => Ok(c),
            _ => Err(SessionError::WrongStage { action, stage }),
        }
    }

    pub fn adjust_volume(&mut self, volume_db: f64) -> Result<f64, SessionError> {
        self.calibration_mut("adjust volume")?.adjust(volume_db)
    }

    /// Settles the volume and fetches a tone at that level.
    pub fn commit_volume(&mut self, volume_db: f64) -> Result<PreviewOutcome, SessionError> {
        let stage = self.stage();
        let Self { service, state, .. } = self;
        let SessionState::Calibration(controller) = state else {
            return Err(SessionError::WrongStage {
                action: "commit volume",
                stage,
            });
        };
        controller.commit(volume_db)?;
        Ok(controller
            .fetch_tone(&*service)
            .unwrap_or(PreviewOutcome::Stale))
    }

    pub fn calibration_tone(&self) -> Option<&AudioPayload> {
        self.calibration().and_then(CalibrationController::tone)
    }

    // Configuration

    pub fn selection(&self) -> Option<(Selection, InvalidSelection)> {
        match &self.state {
            SessionState::Configuration {
                selection, invalid, ..
            } => Some((*selection, *invalid)),
            _ => None,
        }
    }

    fn selection_mut(
        &mut self,
        action: &'static str,
    ) -> Result<(&mut Selection, &mut InvalidSelection), SessionError> {
        let stage = self.stage();
        match &mut self.state {
            SessionState::Configuration {
                selection, invalid, ..
            } => Ok((selection, invalid)),
            _ => Err(SessionError::WrongStage { action, stage }),
        }
    }

    pub fn select_domain(&mut self, domain: DomainKind) -> Result<(), SessionError> {
        let (selection, invalid) = self.selection_mut("select domain")?;
        selection.select_domain(domain);
        invalid.domain = false;
        Ok(())
    }

    pub fn clear_domain(&mut self) -> Result<(), SessionError> {
        self.selection_mut("clear domain")?.0.clear_domain();
        Ok(())
    }

    pub fn select_test(&mut self, test: TestKind) -> Result<(), SessionError> {
        let (selection, invalid) = self.selection_mut("select test")?;
        selection.select_test(test)?;
        invalid.test = false;
        Ok(())
    }

    pub fn clear_test(&mut self) -> Result<(), SessionError> {
        self.selection_mut("clear test")?.0.clear_test();
        Ok(())
    }

    // Trial loop

    pub fn trials(&self) -> Option<&TrialController> {
        match &self.state {
            SessionState::TrialLoop { trials, .. } => Some(trials),
            _ => None,
        }
    }

    pub fn grid(&self) -> Option<&StimulusGrid> {
        match &self.state {
            SessionState::TrialLoop { grid, .. } => Some(grid),
            _ => None,
        }
    }

    pub fn configuration(&self) -> Option<&TestConfiguration> {
        match &self.state {
            SessionState::TrialLoop { configuration, .. } => Some(configuration),
            _ => None,
        }
    }

    /// `(finalized, total)` while trials run.
    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        self.trials().map(TrialController::progress)
    }

    fn trials_mut(&mut self, action: &'static str) -> Result<&mut TrialController, SessionError> {
        let stage = self.stage();
        match &mut self.state {
            SessionState::TrialLoop { trials, .. } => Ok(trials),
            _ => Err(SessionError::WrongStage { action, stage }),
        }
    }

    pub fn adjust_gain(&mut self, gain_db: f64) -> Result<f64, SessionError> {
        self.trials_mut("adjust gain")?.adjust_gain(gain_db)
    }

    fn fetch_preview(&mut self) -> PreviewOutcome {
        let Self { service, state, .. } = self;
        match state {
            SessionState::TrialLoop { trials, .. } => {
                trials.fetch_preview(&*service).unwrap_or(PreviewOutcome::Stale)
            }
            _ => PreviewOutcome::Stale,
        }
    }

    /// Settles the exploration gain and fetches the combined preview for it.
    pub fn commit_gain(&mut self, gain_db: f64) -> Result<PreviewOutcome, SessionError> {
        self.trials_mut("commit gain")?.commit_gain(gain_db)?;
        Ok(self.fetch_preview())
    }

    /// Settles the exploration gain and returns the preview request without
    /// running it; the caller fetches it and hands it to `resolve_preview`.
    pub fn request_gain(&mut self, gain_db: f64) -> Result<PreviewRequest, SessionError> {
        self.trials_mut("request gain")?.commit_gain(gain_db)
    }

    pub fn retry_preview(&mut self) -> Result<PreviewOutcome, SessionError> {
        self.trials_mut("retry preview")?.retry_preview()?;
        Ok(self.fetch_preview())
    }

    /// Hands back a preview fetched outside the machine.
    pub fn resolve_preview(
        &mut self,
        ticket: Ticket,
        result: Result<AudioPayload, SignalError>,
    ) -> Result<PreviewOutcome, SessionError> {
        Ok(self
            .trials_mut("resolve preview")?
            .resolve_preview(ticket, result))
    }

    pub fn playback(&self, which: Playback) -> Option<&AudioPayload> {
        self.trials().and_then(|t| t.playback(which))
    }

    // Completion

    pub fn record(&self) -> Option<&ResultRecord> {
        match &self.state {
            SessionState::Completion { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn persistence(&self) -> Option<&PersistenceStatus> {
        match &self.state {
            SessionState::Completion { persistence, .. } => Some(persistence),
            _ => None,
        }
    }

    fn persist(repository: &mut R, record: &ResultRecord) -> PersistenceStatus {
        match repository.save(record) {
            Ok(id) => {
                info!(id, subject = %record.name, "result saved");
                PersistenceStatus::Saved { id }
            }
            Err(err) => {
                warn!(error = %err, subject = %record.name, "could not save result; keeping it in memory");
                PersistenceStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Tries to save a record whose first save failed.
    pub fn retry_save(&mut self) -> Result<PersistenceStatus, SessionError> {
        let stage = self.stage();
        let Self {
            repository, state, ..
        } = self;
        match state {
            SessionState::Completion {
                record,
                persistence,
            } => {
                if !persistence.is_saved() {
                    *persistence = Self::persist(repository, record);
                }
                Ok(persistence.clone())
            }
            _ => Err(SessionError::WrongStage {
                action: "retry save",
                stage,
            }),
        }
    }

    // Transitions

    /// Validates the current stage's exit conditions and moves on.
    pub fn advance(&mut self) -> Result<AdvanceOutcome, SessionError> {
        match &mut self.state {
            SessionState::Identification => {
                let mut controller = CalibrationController::new();
                controller.fetch_tone(&self.service);
                self.state = SessionState::Calibration(controller);
                info!(subject = %self.subject, "calibration started");
                Ok(AdvanceOutcome::Stage(SessionStage::Calibration))
            }
            SessionState::Calibration(controller) => {
                let calibration = controller.confirm();
                self.state = SessionState::Configuration {
                    calibration,
                    selection: Selection::default(),
                    invalid: InvalidSelection::default(),
                };
                info!("configuration started");
                Ok(AdvanceOutcome::Stage(SessionStage::Configuration))
            }
            SessionState::Configuration {
                calibration,
                selection,
                invalid,
            } => {
                let test = match selection.check() {
                    Ok(test) => test,
                    Err(flags) => {
                        *invalid = flags;
                        info!(domain = flags.domain, test = flags.test, "selection incomplete");
                        return Ok(AdvanceOutcome::SelectionRejected(flags));
                    }
                };
                let calibration = *calibration;

                let configuration = TestConfiguration::new(test, self.settings.clone());
                let grid = configuration.build_grid();
                let request = configuration.generation_request(&grid);
                let signals = self.service.generate(&request).inspect_err(|err| {
                    warn!(error = %err, %test, "signal generation failed; staying in configuration");
                })?;
                let mut trials = TrialController::new(signals, &grid, calibration, self.order)?;
                trials.fetch_preview(&self.service);

                info!(
                    %test,
                    positions = grid.len(),
                    order = ?self.order,
                    "trial loop started"
                );
                self.trial_started = Some(self.timer.now());
                self.state = SessionState::TrialLoop {
                    calibration,
                    configuration,
                    grid,
                    trials,
                };
                Ok(AdvanceOutcome::Stage(SessionStage::TrialLoop))
            }
            SessionState::TrialLoop {
                calibration,
                configuration,
                grid,
                trials,
            } => {
                if let Some(started) = self.trial_started.take() {
                    debug!(elapsed_ms = self.timer.elapsed(started).as_millis() as u64, "trial duration");
                }
                match trials.advance()? {
                    TrialAdvance::Next(_) => {
                        trials.fetch_preview(&self.service);
                        self.trial_started = Some(self.timer.now());
                        let (finalized, total) = trials.progress();
                        Ok(AdvanceOutcome::NextTrial { finalized, total })
                    }
                    TrialAdvance::Completed(responses) => {
                        let record = ResultAssembler {
                            subject: &self.subject,
                            calibration: *calibration,
                            configuration,
                            grid,
                        }
                        .assemble(responses)?;
                        info!(subject = %record.name, test = %record.test, "session complete");
                        let persistence = Self::persist(&mut self.repository, &record);
                        self.state = SessionState::Completion {
                            record,
                            persistence: persistence.clone(),
                        };
                        Ok(AdvanceOutcome::Completed(persistence))
                    }
                }
            }
            SessionState::Completion { .. } => Err(SessionError::WrongStage {
                action: "advance",
                stage: SessionStage::Completion,
            }),
        }
    }

    /// Applies `event`. Returns whether the stage changed.
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<bool, SessionError> {
        let before = self.stage();
        match event {
            SessionEvent::SetSubject(name) => self.set_subject(&name)?,
            SessionEvent::EditSetting { field, value } => self.apply_setting(field, &value)?,
            SessionEvent::AdjustVolume(db) => {
                self.adjust_volume(db)?;
            }
            SessionEvent::CommitVolume(db) => {
                self.commit_volume(db)?;
            }
            SessionEvent::SelectDomain(domain) => self.select_domain(domain)?,
            SessionEvent::ClearDomain => self.clear_domain()?,
            SessionEvent::SelectTest(test) => self.select_test(test)?,
            SessionEvent::ClearTest => self.clear_test()?,
            SessionEvent::AdjustGain(db) => {
                self.adjust_gain(db)?;
            }
            SessionEvent::CommitGain(db) => {
                self.commit_gain(db)?;
            }
            SessionEvent::RetryPreview => {
                self.retry_preview()?;
            }
            SessionEvent::Advance => {
                self.advance()?;
            }
        }
        Ok(self.stage() != before)
    }
}
