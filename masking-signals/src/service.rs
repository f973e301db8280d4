use crate::error::SignalError;
use masking_core::{DomainKind, NoiseColor, RaiseShape, SignalKind, TestKind, TestSettings};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Self-contained audio clip as returned by the service: a base64-encoded WAV.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioPayload(String);

impl AudioPayload {
    pub fn from_base64(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn data_uri(&self) -> String {
        format!("data:audio/wav;base64,{}", self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AudioPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AudioPayload({} b64 chars)", self.0.len())
    }
}

/// One masker plus one maskee per grid position, in grid order.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSignals {
    pub masker: AudioPayload,
    pub maskees: Vec<AudioPayload>,
}

/// Body of a generation request. Field names follow the service's JSON API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub masker_type: SignalKind,
    pub maskee_type: SignalKind,
    pub masking_type: DomainKind,
    pub timepulse_amplitude: f64,
    pub masker_gain: f64,
    pub grid_size: usize,
    pub grid_step: f64,
    pub sample_rate: u32,
    pub total_duration: f64,
    pub time_location: f64,
    pub masker_frequency: f64,
    pub pulse_duration: f64,
    pub wideband_noise_type: NoiseColor,
    pub wideband_noise_duration: f64,
    pub noise_bandwidth: f64,
    pub tone_duration: f64,
    pub raise_duration: f64,
    pub raise_type: RaiseShape,
    /// Positions the maskees must be placed at, so the service does not
    /// recompute the grid with its own rounding.
    pub grid_locations: Vec<f64>,
}

impl GenerationRequest {
    pub fn new(test: TestKind, settings: &TestSettings, grid_locations: &[f64]) -> Self {
        let domain = test.domain();
        Self {
            masker_type: test.masker(),
            maskee_type: test.maskee(),
            masking_type: domain,
            timepulse_amplitude: settings.masker_level,
            masker_gain: settings.masker_level,
            grid_size: grid_locations.len(),
            grid_step: settings.grid_step(domain),
            sample_rate: settings.sample_rate,
            total_duration: settings.total_duration,
            time_location: settings.masker_location,
            masker_frequency: settings.masker_frequency,
            pulse_duration: settings.pulse_duration,
            wideband_noise_type: settings.wideband_noise_type,
            wideband_noise_duration: settings.wideband_noise_duration,
            noise_bandwidth: settings.noise_bandwidth,
            tone_duration: settings.tone_duration,
            raise_duration: settings.raise_duration,
            raise_type: settings.raise_type,
            grid_locations: grid_locations.to_vec(),
        }
    }
}

/// Request/response operations the session needs from signal synthesis.
pub trait SignalService {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSignals, SignalError>;

    /// Mixes masker and maskee, attenuating the maskee by `gain_db`
    /// (0 = masker reference level, negative = quieter).
    fn combine(
        &self,
        masker: &AudioPayload,
        maskee: &AudioPayload,
        gain_db: f64,
    ) -> Result<AudioPayload, SignalError>;

    fn calibration_tone(&self, volume_db: f64) -> Result<AudioPayload, SignalError>;
}

impl<S: SignalService + ?Sized> SignalService for &S {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSignals, SignalError> {
        (**self).generate(request)
    }

    fn combine(
        &self,
        masker: &AudioPayload,
        maskee: &AudioPayload,
        gain_db: f64,
    ) -> Result<AudioPayload, SignalError> {
        (**self).combine(masker, maskee, gain_db)
    }

    fn calibration_tone(&self, volume_db: f64) -> Result<AudioPayload, SignalError> {
        (**self).calibration_tone(volume_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_domain_step_and_wire_names() {
        let settings = TestSettings::default();
        let req = GenerationRequest::new(TestKind::ToneMaskedByNoise, &settings, &[900.0, 1000.0]);
        assert_eq!(req.grid_step, 100.0);
        assert_eq!(req.grid_size, 2);

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["masker_type"], "tone");
        assert_eq!(json["maskee_type"], "narrowband-noise");
        assert_eq!(json["masking_type"], "frequency");
        assert_eq!(json["wideband_noise_type"], "white");
        assert_eq!(json["raise_type"], "exponential");
        assert_eq!(json["masker_gain"], -3.0);
    }

    #[test]
    fn payload_debug_hides_data() {
        let p = AudioPayload::from_base64("UklGRg==");
        assert_eq!(format!("{p:?}"), "AudioPayload(8 b64 chars)");
        assert_eq!(p.data_uri(), "data:audio/wav;base64,UklGRg==");
    }
}
