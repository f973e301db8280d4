//! Environment configuration for the tester binary.
//!
//! Reads `MASKING_API_URL`, `MASKING_TIMEOUT_MS`, `MASKING_RESULTS_PATH`,
//! `MASKING_SETTINGS`, `MASKING_SHUFFLE_SEED` and `MASKING_OUTPUT_DIR`.

use anyhow::{Context, Result, bail};
use masking_core::TestSettings;
use masking_session::{PresentationOrder, load_settings};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RESULTS_PATH: &str = "test_results.jsonl";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub timeout: Duration,
    pub results_path: PathBuf,
    pub settings: TestSettings,
    pub order: PresentationOrder,
    pub output_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or blank keys take
    /// their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let timeout_ms = match get("MASKING_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("MASKING_TIMEOUT_MS={raw} is not a whole number"))?,
            None => DEFAULT_TIMEOUT_MS,
        };
        if timeout_ms == 0 {
            bail!("MASKING_TIMEOUT_MS must be positive");
        }

        let settings = match get("MASKING_SETTINGS") {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading settings file {path}"))?;
                load_settings(&text).with_context(|| format!("loading settings from {path}"))?
            }
            None => TestSettings::default(),
        };

        Ok(Self {
            api_url: get("MASKING_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            timeout: Duration::from_millis(timeout_ms),
            results_path: get("MASKING_RESULTS_PATH")
                .unwrap_or_else(|| DEFAULT_RESULTS_PATH.to_string())
                .into(),
            settings,
            order: parse_order(get("MASKING_SHUFFLE_SEED").as_deref())?,
            output_dir: get("MASKING_OUTPUT_DIR")
                .unwrap_or_else(|| ".".to_string())
                .into(),
        })
    }
}

/// Unset keeps grid order; a number is used as the seed; `random` draws one.
fn parse_order(raw: Option<&str>) -> Result<PresentationOrder> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(PresentationOrder::GridOrder);
    };
    let seed = if raw.eq_ignore_ascii_case("random") {
        rand::random::<u64>()
    } else {
        raw.parse()
            .with_context(|| format!("MASKING_SHUFFLE_SEED={raw} is neither a number nor `random`"))?
    };
    Ok(PresentationOrder::Shuffled { seed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let c = config(&[]).unwrap();
        assert_eq!(c.api_url, DEFAULT_API_URL);
        assert_eq!(c.timeout, Duration::from_secs(10));
        assert_eq!(c.results_path, PathBuf::from("test_results.jsonl"));
        assert_eq!(c.order, PresentationOrder::GridOrder);
        assert_eq!(c.settings, TestSettings::default());
    }

    #[test]
    fn numeric_seed_shuffles() {
        let c = config(&[("MASKING_SHUFFLE_SEED", "51")]).unwrap();
        assert_eq!(c.order, PresentationOrder::Shuffled { seed: 51 });
        let c = config(&[("MASKING_SHUFFLE_SEED", "Random")]).unwrap();
        assert!(matches!(c.order, PresentationOrder::Shuffled { .. }));
        assert!(config(&[("MASKING_SHUFFLE_SEED", "abc")]).is_err());
    }

    #[test]
    fn malformed_timeout_is_an_error() {
        assert!(config(&[("MASKING_TIMEOUT_MS", "soon")]).is_err());
        assert!(config(&[("MASKING_TIMEOUT_MS", "0")]).is_err());
        let c = config(&[("MASKING_TIMEOUT_MS", " 2500 ")]).unwrap();
        assert_eq!(c.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn settings_file_is_loaded_and_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gridSize": 4, "maskerLevel": -10}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();
        let c = config(&[("MASKING_SETTINGS", path.as_str())]).unwrap();
        assert_eq!(c.settings.grid_size, 4);
        assert_eq!(c.settings.masker_level, -10.0);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"maskerLevel": 5}}"#).unwrap();
        let path = bad.path().to_string_lossy().to_string();
        assert!(config(&[("MASKING_SETTINGS", path.as_str())]).is_err());
    }
}
