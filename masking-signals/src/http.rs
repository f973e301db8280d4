use crate::error::SignalError;
use crate::service::{AudioPayload, GeneratedSignals, GenerationRequest, SignalService};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::error::Error as _;
use std::io;
use std::time::Duration;
use tracing::debug;

const GENERATE_PATH: &str = "/api/py/gen_signals";
const COMBINE_PATH: &str = "/api/py/combine_signals";
const CALIBRATION_PATH: &str = "/api/py/generate_calibration_signal";

#[derive(Deserialize)]
struct GenerateResponse {
    masker: AudioPayload,
    maskee_signals: Vec<AudioPayload>,
}

#[derive(Deserialize)]
struct CombineResponse {
    combined_signal: AudioPayload,
}

#[derive(Deserialize)]
struct CalibrationResponse {
    calibration_signal: AudioPayload,
}

/// Blocking JSON client for the signal service. Every request carries a hard
/// timeout.
#[derive(Debug, Clone)]
pub struct HttpSignalService {
    base_url: String,
    timeout: Duration,
}

impl HttpSignalService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, SignalError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "signal service request");

        let response = ureq::post(&url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|e| self.classify(e))?;

        response
            .into_json::<T>()
            .map_err(|e| SignalError::InvalidResponse(e.to_string()))
    }

    fn classify(&self, err: ureq::Error) -> SignalError {
        match err {
            ureq::Error::Status(status, resp) => SignalError::Status {
                status,
                body: resp.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(t) if is_timeout(&t) => SignalError::Timeout {
                elapsed_ms: self.timeout.as_millis() as u64,
            },
            ureq::Error::Transport(t) => SignalError::Unavailable(t.to_string()),
        }
    }
}

/// A read or connect deadline surfaces as an I/O error somewhere in the
/// transport's source chain.
fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = transport.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}

impl SignalService for HttpSignalService {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSignals, SignalError> {
        let body = serde_json::to_value(request)
            .map_err(|e| SignalError::InvalidResponse(e.to_string()))?;
        let resp: GenerateResponse = self.post(GENERATE_PATH, &body)?;

        if resp.maskee_signals.len() != request.grid_size {
            return Err(SignalError::InvalidResponse(format!(
                "expected {} maskees, got {}",
                request.grid_size,
                resp.maskee_signals.len()
            )));
        }

        Ok(GeneratedSignals {
            masker: resp.masker,
            maskees: resp.maskee_signals,
        })
    }

    fn combine(
        &self,
        masker: &AudioPayload,
        maskee: &AudioPayload,
        gain_db: f64,
    ) -> Result<AudioPayload, SignalError> {
        let body = serde_json::json!({
            "masker": masker,
            "maskee_signal": maskee,
            "gain": gain_db,
        });
        let resp: CombineResponse = self.post(COMBINE_PATH, &body)?;
        Ok(resp.combined_signal)
    }

    fn calibration_tone(&self, volume_db: f64) -> Result<AudioPayload, SignalError> {
        let body = serde_json::json!({ "volume": volume_db });
        let resp: CalibrationResponse = self.post(CALIBRATION_PATH, &body)?;
        Ok(resp.calibration_signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let s = HttpSignalService::new("http://localhost:8000/");
        assert_eq!(s.base_url(), "http://localhost:8000");
    }

    #[test]
    fn io_timeouts_are_classified_by_kind() {
        let s = HttpSignalService::new("http://localhost:8000").with_timeout(Duration::from_millis(250));
        let timed_out = ureq::Error::from(io::Error::new(io::ErrorKind::TimedOut, "read"));
        assert_eq!(s.classify(timed_out), SignalError::Timeout { elapsed_ms: 250 });

        let refused = ureq::Error::from(io::Error::new(io::ErrorKind::ConnectionRefused, "timed out"));
        assert!(matches!(s.classify(refused), SignalError::Unavailable(_)));
    }

    #[test]
    fn silent_server_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let s = HttpSignalService::new(format!("http://{addr}"))
            .with_timeout(Duration::from_millis(100));

        // The connection is accepted by the backlog but never answered.
        let err = s.calibration_tone(-40.0).unwrap_err();
        assert_eq!(err, SignalError::Timeout { elapsed_ms: 100 });
        drop(listener);
    }

    #[test]
    fn response_shapes_deserialize() {
        let g: GenerateResponse =
            serde_json::from_str(r#"{"masker":"AAA=","maskee_signals":["BBB=","CCC="]}"#).unwrap();
        assert_eq!(g.maskee_signals.len(), 2);
        assert_eq!(g.masker.as_base64(), "AAA=");

        let c: CombineResponse = serde_json::from_str(r#"{"combined_signal":"DDD="}"#).unwrap();
        assert_eq!(c.combined_signal.as_base64(), "DDD=");
    }
}
