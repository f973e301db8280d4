use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock and sleep source for backoff delays and trial timing.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync + std::fmt::Debug;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
}

/// Monotonic wall-clock timer; timestamps are nanoseconds since creation.
#[derive(Debug, Clone)]
pub struct SystemTimer {
    start: Instant,
}

impl Timer for SystemTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

impl SystemTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer whose clock only moves when told to. Sleeping advances the clock
/// instantly and is recorded, so backoff schedules can be asserted on.
/// Clones share the same clock.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl Timer for ManualTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        self.sleeps.lock().push(d);
        self.advance(d);
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Every sleep requested so far, oldest first.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_only_moves_when_advanced() {
        let t = ManualTimer::new();
        let start = t.now();
        assert_eq!(t.elapsed(start), Duration::ZERO);
        t.advance(Duration::from_millis(5));
        assert_eq!(t.elapsed(start), Duration::from_millis(5));
    }

    #[test]
    fn manual_sleep_is_recorded_and_shared_between_clones() {
        let t = ManualTimer::new();
        let clone = t.clone();
        clone.sleep(Duration::from_millis(200));
        clone.sleep(Duration::from_millis(400));
        assert_eq!(
            t.sleeps(),
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
        assert_eq!(t.now(), 600_000_000);
    }

    #[test]
    fn system_timer_is_monotonic() {
        let t = SystemTimer::new();
        let a = t.now();
        t.sleep(Duration::from_millis(1));
        assert!(t.now() >= a + 1_000_000);
        assert!(t.elapsed(a) >= Duration::from_millis(1));
    }
}
