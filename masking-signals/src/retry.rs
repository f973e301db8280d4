use crate::error::SignalError;
use crate::service::{AudioPayload, GeneratedSignals, GenerationRequest, SignalService};
use masking_timing::Timer;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff schedule for retryable service failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_backoff
            .mul_f64(factor)
            .min(self.max_backoff)
    }
}

/// Wraps a service and retries retryable errors, sleeping on `timer` between
/// attempts. Non-retryable errors are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryingSignalService<S, T> {
    inner: S,
    timer: T,
    policy: RetryPolicy,
}

impl<S: SignalService, T: Timer> RetryingSignalService<S, T> {
    pub fn new(inner: S, timer: T, policy: RetryPolicy) -> Self {
        Self {
            inner,
            timer,
            policy,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<R>(
        &self,
        operation: &'static str,
        mut call: impl FnMut(&S) -> Result<R, SignalError>,
    ) -> Result<R, SignalError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call(&self.inner) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "signal request failed, retrying"
                    );
                    self.timer.sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<S: SignalService, T: Timer> SignalService for RetryingSignalService<S, T> {
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSignals, SignalError> {
        self.run("generate", |s| s.generate(request))
    }

    fn combine(
        &self,
        masker: &AudioPayload,
        maskee: &AudioPayload,
        gain_db: f64,
    ) -> Result<AudioPayload, SignalError> {
        self.run("combine", |s| s.combine(masker, maskee, gain_db))
    }

    fn calibration_tone(&self, volume_db: f64) -> Result<AudioPayload, SignalError> {
        self.run("calibration_tone", |s| s.calibration_tone(volume_db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use masking_timing::ManualTimer;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Serves scripted tone results in order.
    struct Scripted {
        tones: RefCell<VecDeque<Result<AudioPayload, SignalError>>>,
        calls: RefCell<u32>,
    }

    impl Scripted {
        fn new(script: Vec<Result<AudioPayload, SignalError>>) -> Self {
            Self {
                tones: RefCell::new(script.into()),
                calls: RefCell::new(0),
            }
        }
    }

    impl SignalService for Scripted {
        fn generate(&self, _: &GenerationRequest) -> Result<GeneratedSignals, SignalError> {
            Err(SignalError::InvalidResponse("not scripted".into()))
        }

        fn combine(
            &self,
            _: &AudioPayload,
            _: &AudioPayload,
            _: f64,
        ) -> Result<AudioPayload, SignalError> {
            Err(SignalError::InvalidResponse("not scripted".into()))
        }

        fn calibration_tone(&self, _: f64) -> Result<AudioPayload, SignalError> {
            *self.calls.borrow_mut() += 1;
            self.tones
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(SignalError::Unavailable("script exhausted".into())))
        }
    }

    fn unavailable() -> Result<AudioPayload, SignalError> {
        Err(SignalError::Unavailable("connection refused".into()))
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(10), Duration::from_secs(2));
    }

    #[test]
    fn retries_until_success() {
        let timer = ManualTimer::new();
        let inner = Scripted::new(vec![
            unavailable(),
            unavailable(),
            Ok(AudioPayload::from_base64("tone")),
        ]);
        let svc = RetryingSignalService::new(inner, timer.clone(), RetryPolicy::default());

        let tone = svc.calibration_tone(-40.0).unwrap();
        assert_eq!(tone.as_base64(), "tone");
        assert_eq!(*svc.inner().calls.borrow(), 3);
        assert_eq!(
            timer.sleeps(),
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let timer = ManualTimer::new();
        let inner = Scripted::new(vec![unavailable(), unavailable(), unavailable(), unavailable()]);
        let svc = RetryingSignalService::new(inner, timer.clone(), RetryPolicy::default());

        assert!(matches!(
            svc.calibration_tone(0.0),
            Err(SignalError::Unavailable(_))
        ));
        assert_eq!(*svc.inner().calls.borrow(), 3);
        assert_eq!(timer.sleeps().len(), 2);
    }

    #[test]
    fn non_retryable_errors_return_immediately() {
        let timer = ManualTimer::new();
        let inner = Scripted::new(vec![Err(SignalError::Status {
            status: 400,
            body: "bad volume".into(),
        })]);
        let svc = RetryingSignalService::new(inner, timer.clone(), RetryPolicy::default());

        assert!(matches!(
            svc.calibration_tone(0.0),
            Err(SignalError::Status { status: 400, .. })
        ));
        assert_eq!(*svc.inner().calls.borrow(), 1);
        assert!(timer.sleeps().is_empty());
    }
}
