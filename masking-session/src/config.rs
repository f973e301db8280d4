//! Editable test settings, the test selection, and the frozen configuration
//! the trial loop runs against.

use crate::error::SessionError;
use masking_core::{
    DomainKind, NoiseColor, RaiseShape, StimulusGrid, TestKind, TestSettings, extent,
};
use masking_signals::GenerationRequest;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MAX_GRID_SIZE: usize = 100;

/// Slack for positions that land on a bound up to rounding.
const EXTENT_TOLERANCE: f64 = 1e-9;

/// One editable entry of [`TestSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    MaskerLevel,
    GridSize,
    TimeStep,
    FrequencyStep,
    SampleRate,
    TotalDuration,
    MaskerLocation,
    MaskerFrequency,
    WidebandNoiseType,
    WidebandNoiseDuration,
    NoiseBandwidth,
    PulseDuration,
    ToneDuration,
    RaiseDuration,
    RaiseType,
}

impl SettingsField {
    pub const ALL: [SettingsField; 15] = [
        Self::MaskerLevel,
        Self::GridSize,
        Self::TimeStep,
        Self::FrequencyStep,
        Self::SampleRate,
        Self::TotalDuration,
        Self::MaskerLocation,
        Self::MaskerFrequency,
        Self::WidebandNoiseType,
        Self::WidebandNoiseDuration,
        Self::NoiseBandwidth,
        Self::PulseDuration,
        Self::ToneDuration,
        Self::RaiseDuration,
        Self::RaiseType,
    ];

    /// Name used in settings files and stored rows.
    pub fn key(&self) -> &'static str {
        match self {
            Self::MaskerLevel => "maskerLevel",
            Self::GridSize => "gridSize",
            Self::TimeStep => "timeStep",
            Self::FrequencyStep => "frequencyStep",
            Self::SampleRate => "sampleRate",
            Self::TotalDuration => "totalDuration",
            Self::MaskerLocation => "maskerLocation",
            Self::MaskerFrequency => "maskerFrequency",
            Self::WidebandNoiseType => "WBNoiseType",
            Self::WidebandNoiseDuration => "WBNoiseDuration",
            Self::NoiseBandwidth => "noiseBW",
            Self::PulseDuration => "pulseDuration",
            Self::ToneDuration => "toneDuration",
            Self::RaiseDuration => "raiseDuration",
            Self::RaiseType => "raiseType",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MaskerLevel => "masker_level",
            Self::GridSize => "grid_size",
            Self::TimeStep => "time_step",
            Self::FrequencyStep => "frequency_step",
            Self::SampleRate => "sample_rate",
            Self::TotalDuration => "total_duration",
            Self::MaskerLocation => "masker_location",
            Self::MaskerFrequency => "masker_frequency",
            Self::WidebandNoiseType => "wideband_noise_type",
            Self::WidebandNoiseDuration => "wideband_noise_duration",
            Self::NoiseBandwidth => "noise_bandwidth",
            Self::PulseDuration => "pulse_duration",
            Self::ToneDuration => "tone_duration",
            Self::RaiseDuration => "raise_duration",
            Self::RaiseType => "raise_type",
        }
    }

    /// Current value of this field, formatted for display.
    pub fn display_value(&self, settings: &TestSettings) -> String {
        match self {
            Self::MaskerLevel => settings.masker_level.to_string(),
            Self::GridSize => settings.grid_size.to_string(),
            Self::TimeStep => settings.time_step.to_string(),
            Self::FrequencyStep => settings.frequency_step.to_string(),
            Self::SampleRate => settings.sample_rate.to_string(),
            Self::TotalDuration => settings.total_duration.to_string(),
            Self::MaskerLocation => settings.masker_location.to_string(),
            Self::MaskerFrequency => settings.masker_frequency.to_string(),
            Self::WidebandNoiseType => settings.wideband_noise_type.as_str().to_string(),
            Self::WidebandNoiseDuration => settings.wideband_noise_duration.to_string(),
            Self::NoiseBandwidth => settings.noise_bandwidth.to_string(),
            Self::PulseDuration => settings.pulse_duration.to_string(),
            Self::ToneDuration => settings.tone_duration.to_string(),
            Self::RaiseDuration => settings.raise_duration.to_string(),
            Self::RaiseType => settings.raise_type.as_str().to_string(),
        }
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl FromStr for SettingsField {
    type Err = FieldError;

    /// Accepts the file key or the snake_case name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s.trim());
        Self::ALL
            .into_iter()
            .find(|f| normalize(f.key()) == wanted || normalize(f.name()) == wanted)
            .ok_or_else(|| FieldError::Unknown(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("unknown setting `{0}`")]
    Unknown(String),
    #[error("{field}: cannot read `{value}`")]
    Parse { field: SettingsField, value: String },
    #[error("{field}: {reason}")]
    Constraint {
        field: SettingsField,
        reason: &'static str,
    },
}

impl FieldError {
    pub fn field(&self) -> Option<SettingsField> {
        match self {
            Self::Unknown(_) => None,
            Self::Parse { field, .. } | Self::Constraint { field, .. } => Some(*field),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Field(#[from] FieldError),
}

fn parse_number<T: FromStr>(field: SettingsField, raw: &str) -> Result<T, FieldError> {
    raw.trim().parse().map_err(|_| FieldError::Parse {
        field,
        value: raw.to_string(),
    })
}

fn parse_real(field: SettingsField, raw: &str) -> Result<f64, FieldError> {
    let value: f64 = parse_number(field, raw)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FieldError::Parse {
            field,
            value: raw.to_string(),
        })
    }
}

fn parse_kind<T: FromStr>(field: SettingsField, raw: &str) -> Result<T, FieldError> {
    raw.parse().map_err(|_| FieldError::Parse {
        field,
        value: raw.to_string(),
    })
}

/// Parses `raw` into `field` and validates the result. On any error the
/// settings are left exactly as they were.
pub fn apply_setting(
    settings: &mut TestSettings,
    field: SettingsField,
    raw: &str,
) -> Result<(), FieldError> {
    use SettingsField as F;

    let mut next = settings.clone();
    match field {
        F::MaskerLevel => next.masker_level = parse_real(field, raw)?,
        F::GridSize => next.grid_size = parse_number(field, raw)?,
        F::TimeStep => next.time_step = parse_real(field, raw)?,
        F::FrequencyStep => next.frequency_step = parse_real(field, raw)?,
        F::SampleRate => next.sample_rate = parse_number(field, raw)?,
        F::TotalDuration => next.total_duration = parse_real(field, raw)?,
        F::MaskerLocation => next.masker_location = parse_real(field, raw)?,
        F::MaskerFrequency => next.masker_frequency = parse_real(field, raw)?,
        F::WidebandNoiseType => next.wideband_noise_type = parse_kind::<NoiseColor>(field, raw)?,
        F::WidebandNoiseDuration => next.wideband_noise_duration = parse_real(field, raw)?,
        F::NoiseBandwidth => next.noise_bandwidth = parse_real(field, raw)?,
        F::PulseDuration => next.pulse_duration = parse_real(field, raw)?,
        F::ToneDuration => next.tone_duration = parse_real(field, raw)?,
        F::RaiseDuration => next.raise_duration = parse_real(field, raw)?,
        F::RaiseType => next.raise_type = parse_kind::<RaiseShape>(field, raw)?,
    }
    validate(&next)?;
    *settings = next;
    Ok(())
}

fn require(ok: bool, field: SettingsField, reason: &'static str) -> Result<(), FieldError> {
    if ok {
        Ok(())
    } else {
        Err(FieldError::Constraint { field, reason })
    }
}

/// Checks every range constraint; reports the first violation.
pub fn validate(s: &TestSettings) -> Result<(), FieldError> {
    use SettingsField as F;

    let positive = |v: f64| v.is_finite() && v > 0.0;
    require(
        (-80.0..=0.0).contains(&s.masker_level),
        F::MaskerLevel,
        "must be between -80 and 0 dB",
    )?;
    require(s.grid_size >= 1, F::GridSize, "must be at least 1")?;
    require(
        s.grid_size <= MAX_GRID_SIZE,
        F::GridSize,
        "must be at most 100",
    )?;
    require(positive(s.time_step), F::TimeStep, "must be positive")?;
    require(positive(s.frequency_step), F::FrequencyStep, "must be positive")?;
    require(s.sample_rate > 0, F::SampleRate, "must be positive")?;
    require(positive(s.total_duration), F::TotalDuration, "must be positive")?;
    require(
        (0.0..=s.total_duration).contains(&s.masker_location),
        F::MaskerLocation,
        "must lie within the total duration",
    )?;
    require(positive(s.masker_frequency), F::MaskerFrequency, "must be positive")?;
    require(
        positive(s.wideband_noise_duration),
        F::WidebandNoiseDuration,
        "must be positive",
    )?;
    require(
        positive(s.noise_bandwidth) && s.noise_bandwidth <= 200.0,
        F::NoiseBandwidth,
        "must be in (0, 200] percent",
    )?;
    require(positive(s.pulse_duration), F::PulseDuration, "must be positive")?;
    require(positive(s.tone_duration), F::ToneDuration, "must be positive")?;
    require(
        s.raise_duration.is_finite() && s.raise_duration >= 0.0,
        F::RaiseDuration,
        "must not be negative",
    )?;
    validate_grid_extent(s)
}

/// The grid around the masker must stay inside the stimulus: time positions
/// within `[0, totalDuration]`, frequency positions above 0 Hz.
fn validate_grid_extent(s: &TestSettings) -> Result<(), FieldError> {
    let time = extent(s.grid_size, s.time_step, s.masker_location);
    require(
        time.is_some_and(|(first, last)| {
            first >= -EXTENT_TOLERANCE && last <= s.total_duration + EXTENT_TOLERANCE
        }),
        SettingsField::GridSize,
        "time grid must stay within the total duration",
    )?;
    let frequency = extent(s.grid_size, s.frequency_step, s.masker_frequency);
    require(
        frequency.is_some_and(|(first, _)| first > EXTENT_TOLERANCE),
        SettingsField::GridSize,
        "frequency grid must stay above 0 Hz",
    )
}

/// Reads a full settings document; missing keys take their defaults.
pub fn load_settings(json: &str) -> Result<TestSettings, ConfigError> {
    let settings: TestSettings = serde_json::from_str(json)?;
    validate(&settings)?;
    Ok(settings)
}

/// Which parts of the selection were missing on the last advance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvalidSelection {
    pub domain: bool,
    pub test: bool,
}

impl InvalidSelection {
    pub fn any(&self) -> bool {
        self.domain || self.test
    }
}

/// Domain and test picked in the configuration stage. A test is only ever
/// held together with its own domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    domain: Option<DomainKind>,
    test: Option<TestKind>,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            domain: Some(DomainKind::Time),
            test: None,
        }
    }
}

impl Selection {
    pub fn domain(&self) -> Option<DomainKind> {
        self.domain
    }

    pub fn test(&self) -> Option<TestKind> {
        self.test
    }

    /// Switches domain, dropping a test that does not belong to it.
    pub fn select_domain(&mut self, domain: DomainKind) {
        if self.test.is_some_and(|t| t.domain() != domain) {
            self.test = None;
        }
        self.domain = Some(domain);
    }

    pub fn clear_domain(&mut self) {
        self.domain = None;
        self.test = None;
    }

    pub fn select_test(&mut self, test: TestKind) -> Result<(), SessionError> {
        let domain = self.domain.ok_or(SessionError::NoDomain)?;
        if test.domain() != domain {
            return Err(SessionError::TestNotInDomain { test, domain });
        }
        self.test = Some(test);
        Ok(())
    }

    pub fn clear_test(&mut self) {
        self.test = None;
    }

    pub fn check(&self) -> Result<TestKind, InvalidSelection> {
        match (self.domain, self.test) {
            (Some(_), Some(test)) => Ok(test),
            (domain, test) => Err(InvalidSelection {
                domain: domain.is_none(),
                test: test.is_none(),
            }),
        }
    }
}

/// The selected test with a settings snapshot taken when the trials start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestConfiguration {
    test: TestKind,
    settings: TestSettings,
}

impl TestConfiguration {
    pub fn new(test: TestKind, settings: TestSettings) -> Self {
        Self { test, settings }
    }

    pub fn test(&self) -> TestKind {
        self.test
    }

    pub fn domain(&self) -> DomainKind {
        self.test.domain()
    }

    pub fn settings(&self) -> &TestSettings {
        &self.settings
    }

    pub fn grid_step(&self) -> f64 {
        self.settings.grid_step(self.domain())
    }

    pub fn grid_center(&self) -> f64 {
        self.masker_placement()
    }

    pub fn masker_placement(&self) -> f64 {
        self.settings.masker_placement(self.domain())
    }

    pub fn masker_level(&self) -> f64 {
        self.settings.masker_level
    }

    pub fn build_grid(&self) -> StimulusGrid {
        StimulusGrid::build(
            self.domain(),
            self.settings.grid_size,
            self.grid_step(),
            self.grid_center(),
        )
    }

    pub fn generation_request(&self, grid: &StimulusGrid) -> GenerationRequest {
        GenerationRequest::new(self.test, &self.settings, grid.positions())
    }
}
