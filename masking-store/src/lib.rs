//! Persistence of completed session results and CSV export.

pub mod csv;
pub mod error;
pub mod repository;
pub mod row;

pub use csv::{CSV_HEADER, export_csv};
pub use error::StoreError;
pub use repository::{JsonFileRepository, MemoryRepository, ResultRepository, StoredRecord};
pub use row::ResultRow;
