use crate::error::StoreError;
use crate::row::ResultRow;
use masking_core::ResultRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A result together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: u64,
    pub record: ResultRecord,
}

/// Where finished sessions go. Ids are assigned by the store, starting at 1.
pub trait ResultRepository {
    fn save(&mut self, record: &ResultRecord) -> Result<u64, StoreError>;
    fn list(&self) -> Result<Vec<StoredRecord>, StoreError>;
}

impl<R: ResultRepository + ?Sized> ResultRepository for &mut R {
    fn save(&mut self, record: &ResultRecord) -> Result<u64, StoreError> {
        (**self).save(record)
    }

    fn list(&self) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).list()
    }
}

impl<R: ResultRepository + ?Sized> ResultRepository for Box<R> {
    fn save(&mut self, record: &ResultRecord) -> Result<u64, StoreError> {
        (**self).save(record)
    }

    fn list(&self) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).list()
    }
}

/// Keeps rows in memory. Rows go through the same encoding as the file store.
#[derive(Debug, Default, Clone)]
pub struct MemoryRepository {
    rows: Vec<ResultRow>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ResultRepository for MemoryRepository {
    fn save(&mut self, record: &ResultRecord) -> Result<u64, StoreError> {
        let id = self.rows.len() as u64 + 1;
        self.rows.push(ResultRow::encode(id, record)?);
        debug!(id, "stored result in memory");
        Ok(id)
    }

    fn list(&self) -> Result<Vec<StoredRecord>, StoreError> {
        self.rows
            .iter()
            .map(|row| row.decode().map_err(StoreError::from))
            .collect()
    }
}

/// Append-only JSON lines file, one [`ResultRow`] per line.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<ResultRow>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|source| StoreError::Corrupt {
                line: index + 1,
                source,
            })?;
            rows.push(row);
        }
        Ok(rows)
    }
}

impl ResultRepository for JsonFileRepository {
    fn save(&mut self, record: &ResultRecord) -> Result<u64, StoreError> {
        let rows = self.read_rows()?;
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let mut line = serde_json::to_string(&ResultRow::encode(id, record)?)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        info!(id, path = %self.path.display(), subject = %record.name, "saved result");
        Ok(id)
    }

    fn list(&self) -> Result<Vec<StoredRecord>, StoreError> {
        self.read_rows()?
            .iter()
            .map(|row| row.decode().map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use masking_core::{DomainKind, MaskerInfo, TestKind, TestSettings};

    fn record(name: &str) -> ResultRecord {
        ResultRecord {
            name: name.into(),
            domain: DomainKind::Time,
            test: TestKind::PulseMaskedByNoise,
            grid: vec![0.48, 0.5],
            responses: vec![10.0, 22.0],
            calibration_gain: -30.0,
            masker: MaskerInfo {
                placement: 0.5,
                gain: -3.0,
            },
            settings: TestSettings::default(),
        }
    }

    #[test]
    fn memory_repository_assigns_sequential_ids() {
        let mut repo = MemoryRepository::new();
        assert_eq!(repo.save(&record("a")).unwrap(), 1);
        assert_eq!(repo.save(&record("b")).unwrap(), 2);

        let listed = repo.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].record.name, "b");
    }

    #[test]
    fn file_repository_round_trips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonFileRepository::new(dir.path().join("results.jsonl"));
        assert!(repo.list().unwrap().is_empty());

        repo.save(&record("ana")).unwrap();
        let id = repo.save(&record("bo")).unwrap();
        assert_eq!(id, 2);

        let reopened = JsonFileRepository::new(repo.path());
        let listed = reopened.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], StoredRecord { id: 1, record: record("ana") });
    }

    #[test]
    fn file_repository_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonFileRepository::new(dir.path().join("nested/out/results.jsonl"));
        assert_eq!(repo.save(&record("ana")).unwrap(), 1);
    }

    #[test]
    fn corrupt_line_is_reported_with_its_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let mut repo = JsonFileRepository::new(&path);
        repo.save(&record("ana")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        match repo.list() {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt row, got {other:?}"),
        }
    }
}
