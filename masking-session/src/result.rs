use crate::calibration::CalibrationResult;
use crate::config::TestConfiguration;
use crate::error::SessionError;
use masking_core::{MaskerInfo, ResultRecord, StimulusGrid};

/// Everything a finished session contributes to its record, minus the
/// responses.
#[derive(Debug, Clone, Copy)]
pub struct ResultAssembler<'a> {
    pub subject: &'a str,
    pub calibration: CalibrationResult,
    pub configuration: &'a TestConfiguration,
    pub grid: &'a StimulusGrid,
}

impl ResultAssembler<'_> {
    /// Builds the record. `responses` are stored exactly as given and must
    /// have one entry per grid position.
    pub fn assemble(&self, responses: Vec<f64>) -> Result<ResultRecord, SessionError> {
        if responses.len() != self.grid.len() {
            return Err(SessionError::ResponseLength {
                grid: self.grid.len(),
                responses: responses.len(),
            });
        }
        Ok(ResultRecord {
            name: self.subject.to_string(),
            domain: self.configuration.domain(),
            test: self.configuration.test(),
            grid: self.grid.positions().to_vec(),
            responses,
            calibration_gain: self.calibration.gain_db(),
            masker: MaskerInfo {
                placement: self.configuration.masker_placement(),
                gain: self.configuration.masker_level(),
            },
            settings: self.configuration.settings().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationController;
    use masking_core::{TestKind, TestSettings};

    fn calibration(db: f64) -> CalibrationResult {
        let mut c = CalibrationController::new();
        c.adjust(db).unwrap();
        c.confirm()
    }

    #[test]
    fn responses_are_stored_untouched() {
        let configuration = TestConfiguration::new(TestKind::PulseMaskedByPulse, TestSettings::default());
        let grid = StimulusGrid::build(configuration.domain(), 1, 0.02, 0.5);
        let assembler = ResultAssembler {
            subject: "ana",
            calibration: calibration(-40.0),
            configuration: &configuration,
            grid: &grid,
        };

        let record = assembler.assemble(vec![-10.0]).unwrap();
        assert_eq!(record.responses, vec![-10.0]);
        assert_eq!(record.calibration_gain, -40.0);
        assert_eq!(record.masker.gain, -3.0);
        assert_eq!(record.masker_display_gain(), 37.0);
        assert_eq!(record.masker.placement, 0.5);
    }

    #[test]
    fn rejects_wrong_response_count() {
        let configuration = TestConfiguration::new(TestKind::ToneMaskedByTone, TestSettings::default());
        let grid = configuration.build_grid();
        let assembler = ResultAssembler {
            subject: "bo",
            calibration: calibration(-20.0),
            configuration: &configuration,
            grid: &grid,
        };
        assert!(matches!(
            assembler.assemble(vec![1.0, 2.0]),
            Err(SessionError::ResponseLength { grid: 10, responses: 2 })
        ));
    }
}
