use crate::error::StoreError;
use crate::repository::StoredRecord;
use std::io::Write;

pub const CSV_HEADER: &str =
    "id|name|testType|gridType|responses|grid|calibrationGain|maskerPlacement|maskerGain|advancedSettings";

/// Writes `records` pipe-separated, header first. Nested values are inlined as
/// JSON, so the pipe is the only safe separator.
pub fn export_csv<W: Write>(mut out: W, records: &[StoredRecord]) -> Result<(), StoreError> {
    writeln!(out, "{CSV_HEADER}")?;
    for stored in records {
        let r = &stored.record;
        writeln!(
            out,
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            stored.id,
            r.name,
            r.test.title(),
            r.domain.title(),
            serde_json::to_string(&r.responses)?,
            serde_json::to_string(&r.grid)?,
            r.calibration_gain,
            r.masker.placement,
            r.masker.gain,
            serde_json::to_string(&r.settings)?,
        )?;
    }
    out.flush()?;
    Ok(())
}
