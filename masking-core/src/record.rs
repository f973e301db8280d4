use crate::settings::TestSettings;
use crate::stimulus::{DomainKind, TestKind};
use serde::{Deserialize, Serialize};

/// Masker placement on the grid axis and its configured level (dB).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskerInfo {
    pub placement: f64,
    pub gain: f64,
}

/// Outcome of one completed session. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub name: String,
    #[serde(rename = "gridType")]
    pub domain: DomainKind,
    #[serde(rename = "testType")]
    pub test: TestKind,
    pub grid: Vec<f64>,
    /// One finalized gain per grid position, in grid order.
    pub responses: Vec<f64>,
    pub calibration_gain: f64,
    #[serde(rename = "maskerInfo")]
    pub masker: MaskerInfo,
    #[serde(rename = "advancedSettings")]
    pub settings: TestSettings,
}

impl ResultRecord {
    /// Masker level expressed on the same calibration-relative scale as the
    /// responses.
    pub fn masker_display_gain(&self) -> f64 {
        self.masker.gain - self.calibration_gain
    }

    /// `(position, gain)` pairs in grid order.
    pub fn curve(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.grid.iter().copied().zip(self.responses.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ResultRecord {
        ResultRecord {
            name: "ana".into(),
            domain: DomainKind::Time,
            test: TestKind::PulseMaskedByPulse,
            grid: vec![0.48, 0.5, 0.52],
            responses: vec![12.0, 30.0, 14.0],
            calibration_gain: -40.0,
            masker: MaskerInfo {
                placement: 0.5,
                gain: -3.0,
            },
            settings: TestSettings::default(),
        }
    }

    #[test]
    fn display_gain_is_relative_to_calibration() {
        assert_eq!(record().masker_display_gain(), 37.0);
    }

    #[test]
    fn serializes_with_store_column_names() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["testType"], "pulseMaskedByPulse");
        assert_eq!(json["gridType"], "time");
        assert_eq!(json["calibrationGain"], -40.0);
        assert_eq!(json["maskerInfo"]["placement"], 0.5);
        assert!(json["advancedSettings"].is_object());
    }

    #[test]
    fn curve_pairs_grid_with_responses() {
        let pairs: Vec<_> = record().curve().collect();
        assert_eq!(pairs[1], (0.5, 30.0));
    }
}
