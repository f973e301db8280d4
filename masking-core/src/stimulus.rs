use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
}

/// Whether stimulus positions are laid out in time or in frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    Time,
    Frequency,
}

impl DomainKind {
    pub const ALL: [DomainKind; 2] = [DomainKind::Time, DomainKind::Frequency];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Frequency => "frequency",
        }
    }

    /// Capitalized name used in tables and exports.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Time => "Time",
            Self::Frequency => "Frequency",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Time => "s",
            Self::Frequency => "Hz",
        }
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" => Ok(Self::Time),
            "frequency" | "freq" => Ok(Self::Frequency),
            _ => Err(ParseKindError {
                kind: "domain",
                value: s.to_string(),
            }),
        }
    }
}

/// Kind of sound the external generator synthesizes for a masker or maskee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Pulse,
    Tone,
    WidebandNoise,
    NarrowbandNoise,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pulse => "pulse",
            Self::Tone => "tone",
            Self::WidebandNoise => "wideband-noise",
            Self::NarrowbandNoise => "narrowband-noise",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed catalog of masking tests. Each test belongs to one domain and
/// fixes the masker and maskee kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestKind {
    PulseMaskedByPulse,
    PulseMaskedByNoise,
    ToneMaskedByTone,
    ToneMaskedByNoise,
    NoiseMaskedByNoise,
}

const TIME_TESTS: [TestKind; 2] = [TestKind::PulseMaskedByPulse, TestKind::PulseMaskedByNoise];
const FREQUENCY_TESTS: [TestKind; 3] = [
    TestKind::ToneMaskedByTone,
    TestKind::ToneMaskedByNoise,
    TestKind::NoiseMaskedByNoise,
];

impl TestKind {
    /// Tests offered under `domain`, in catalog order.
    pub fn available(domain: DomainKind) -> &'static [TestKind] {
        match domain {
            DomainKind::Time => &TIME_TESTS,
            DomainKind::Frequency => &FREQUENCY_TESTS,
        }
    }

    pub fn domain(&self) -> DomainKind {
        match self {
            Self::PulseMaskedByPulse | Self::PulseMaskedByNoise => DomainKind::Time,
            Self::ToneMaskedByTone | Self::ToneMaskedByNoise | Self::NoiseMaskedByNoise => {
                DomainKind::Frequency
            }
        }
    }

    pub fn masker(&self) -> SignalKind {
        match self {
            Self::PulseMaskedByPulse | Self::PulseMaskedByNoise => SignalKind::Pulse,
            Self::ToneMaskedByTone | Self::ToneMaskedByNoise => SignalKind::Tone,
            Self::NoiseMaskedByNoise => SignalKind::NarrowbandNoise,
        }
    }

    pub fn maskee(&self) -> SignalKind {
        match self {
            Self::PulseMaskedByPulse => SignalKind::Pulse,
            Self::PulseMaskedByNoise => SignalKind::WidebandNoise,
            Self::ToneMaskedByTone => SignalKind::Tone,
            Self::ToneMaskedByNoise | Self::NoiseMaskedByNoise => SignalKind::NarrowbandNoise,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::PulseMaskedByPulse => "pulseMaskedByPulse",
            Self::PulseMaskedByNoise => "pulseMaskedByNoise",
            Self::ToneMaskedByTone => "toneMaskedByTone",
            Self::ToneMaskedByNoise => "toneMaskedByNoise",
            Self::NoiseMaskedByNoise => "noiseMaskedByNoise",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::PulseMaskedByPulse => "Pulse masked by pulse",
            Self::PulseMaskedByNoise => "Pulse masked by wideband noise",
            Self::ToneMaskedByTone => "Tone masked by tone",
            Self::ToneMaskedByNoise => "Tone masked by narrowband noise",
            Self::NoiseMaskedByNoise => "Narrowband noise masked by narrowband noise",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for TestKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TIME_TESTS
            .iter()
            .chain(FREQUENCY_TESTS.iter())
            .copied()
            .find(|t| t.key().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseKindError {
                kind: "test",
                value: s.to_string(),
            })
    }
}

/// Spectral color of the wideband noise maskee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    #[default]
    White,
    Pink,
    Brown,
    Blue,
    Violet,
}

impl NoiseColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Pink => "pink",
            Self::Brown => "brown",
            Self::Blue => "blue",
            Self::Violet => "violet",
        }
    }
}

impl FromStr for NoiseColor {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(Self::White),
            "pink" => Ok(Self::Pink),
            "brown" => Ok(Self::Brown),
            "blue" => Ok(Self::Blue),
            "violet" => Ok(Self::Violet),
            _ => Err(ParseKindError {
                kind: "noise type",
                value: s.to_string(),
            }),
        }
    }
}

/// Onset/offset envelope shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaiseShape {
    #[default]
    Exponential,
    Linear,
}

impl RaiseShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exponential => "exponential",
            Self::Linear => "linear",
        }
    }
}

impl FromStr for RaiseShape {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            _ => Err(ParseKindError {
                kind: "raise type",
                value: s.to_string(),
            }),
        }
    }
}
