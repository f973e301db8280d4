use crate::stimulus::{DomainKind, NoiseColor, RaiseShape};
use serde::{Deserialize, Serialize};

/// Grid and synthesis parameters for one test. Serialized with the field
/// names the result store uses for its `advancedSettings` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestSettings {
    /// dB relative to the maximum wav amplitude.
    pub masker_level: f64,
    pub grid_size: usize,
    /// Seconds between time-domain grid positions.
    pub time_step: f64,
    /// Hz between frequency-domain grid positions.
    pub frequency_step: f64,
    pub sample_rate: u32,
    pub total_duration: f64,
    pub masker_frequency: f64,
    /// Masker center in time, seconds.
    pub masker_location: f64,
    #[serde(rename = "WBNoiseType")]
    pub wideband_noise_type: NoiseColor,
    #[serde(rename = "WBNoiseDuration")]
    pub wideband_noise_duration: f64,
    /// Percent of the center frequency.
    #[serde(rename = "noiseBW")]
    pub noise_bandwidth: f64,
    pub pulse_duration: f64,
    pub tone_duration: f64,
    pub raise_duration: f64,
    pub raise_type: RaiseShape,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            masker_level: -3.0,
            grid_size: 10,
            time_step: 0.02,
            frequency_step: 100.0,
            sample_rate: 44_100,
            total_duration: 1.0,
            masker_frequency: 1000.0,
            masker_location: 0.5,
            wideband_noise_type: NoiseColor::White,
            wideband_noise_duration: 0.01,
            noise_bandwidth: 10.0,
            pulse_duration: 0.005,
            tone_duration: 0.8,
            raise_duration: 0.01,
            raise_type: RaiseShape::Exponential,
        }
    }
}

impl TestSettings {
    pub fn grid_step(&self, domain: DomainKind) -> f64 {
        match domain {
            DomainKind::Time => self.time_step,
            DomainKind::Frequency => self.frequency_step,
        }
    }

    /// Where the masker sits on the grid axis: its time for time tests, its
    /// frequency for frequency tests. Also the grid center.
    pub fn masker_placement(&self, domain: DomainKind) -> f64 {
        match domain {
            DomainKind::Time => self.masker_location,
            DomainKind::Frequency => self.masker_frequency,
        }
    }
}
