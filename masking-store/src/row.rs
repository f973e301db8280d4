use crate::repository::StoredRecord;
use masking_core::ResultRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat, row-oriented form of a result: scalar columns stay scalar, nested
/// values are stored as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub id: u64,
    pub name: String,
    pub test_type: String,
    pub grid_type: String,
    pub calibration_gain: f64,
    pub grid: String,
    pub advanced_settings: String,
    pub responses: String,
    pub masker_info: String,
}

impl ResultRow {
    pub fn encode(id: u64, record: &ResultRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            name: record.name.clone(),
            test_type: record.test.key().to_string(),
            grid_type: record.domain.as_str().to_string(),
            calibration_gain: record.calibration_gain,
            grid: serde_json::to_string(&record.grid)?,
            advanced_settings: serde_json::to_string(&record.settings)?,
            responses: serde_json::to_string(&record.responses)?,
            masker_info: serde_json::to_string(&record.masker)?,
        })
    }

    pub fn decode(&self) -> Result<StoredRecord, serde_json::Error> {
        let record = ResultRecord {
            name: self.name.clone(),
            domain: serde_json::from_value(Value::String(self.grid_type.clone()))?,
            test: serde_json::from_value(Value::String(self.test_type.clone()))?,
            grid: serde_json::from_str(&self.grid)?,
            responses: serde_json::from_str(&self.responses)?,
            calibration_gain: self.calibration_gain,
            masker: serde_json::from_str(&self.masker_info)?,
            settings: serde_json::from_str(&self.advanced_settings)?,
        };
        Ok(StoredRecord { id: self.id, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use masking_core::{DomainKind, MaskerInfo, TestKind, TestSettings};

    #[test]
    fn nested_values_are_json_text() {
        let record = ResultRecord {
            name: "bo".into(),
            domain: DomainKind::Frequency,
            test: TestKind::ToneMaskedByTone,
            grid: vec![900.0, 1000.0, 1100.0],
            responses: vec![1.5, 20.0, 3.0],
            calibration_gain: -55.0,
            masker: MaskerInfo {
                placement: 1000.0,
                gain: -3.0,
            },
            settings: TestSettings::default(),
        };
        let row = ResultRow::encode(4, &record).unwrap();
        assert_eq!(row.test_type, "toneMaskedByTone");
        assert_eq!(row.grid_type, "frequency");
        assert_eq!(row.grid, "[900.0,1000.0,1100.0]");
        assert_eq!(row.masker_info, r#"{"placement":1000.0,"gain":-3.0}"#);

        let stored = row.decode().unwrap();
        assert_eq!(stored.id, 4);
        assert_eq!(stored.record, record);
    }
}
