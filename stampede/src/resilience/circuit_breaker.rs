use stampede_core::BreakerConfig;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;
// Transitional states held only while the winner of a transition publishes its timestamps.
const ARMING: u8 = 3;
const TRIPPING: u8 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            OPEN | TRIPPING => CircuitState::Open,
            HALF_OPEN | ARMING => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// How a call got through the breaker. The outcome has to be reported back with the same value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Normal,
    Trial,
}

/// The call was short-circuited; nothing was sent to the store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CircuitOpen;

/// Failure-rate circuit breaker shared by every write task.
///
/// State changes are compare-and-swap transitions on an atomic, so exactly one caller wins each
/// transition and half-open trial slots are handed out at most `half_open_max_calls` times.
/// The sliding window of recent outcomes sits behind a mutex held only to push and count.
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: AtomicU8,
    epoch: Instant,
    /// Nanoseconds after `epoch` at which the circuit last opened.
    opened_at: AtomicU64,
    trial_slots: AtomicU32,
    window: Mutex<Window>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            window: Mutex::new(Window::new(config.window_size)),
            config,
            state: AtomicU8::new(CLOSED),
            epoch: Instant::now(),
            opened_at: AtomicU64::new(0),
            trial_slots: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Ask to send a call through. Moves an expired open circuit to half-open on the way.
    pub fn try_acquire(&self) -> Result<Admission, CircuitOpen> {
        loop {
            match self.state.load(Ordering::Acquire) {
                CLOSED => return Ok(Admission::Normal),
                TRIPPING => return Err(CircuitOpen),
                ARMING => std::hint::spin_loop(),
                OPEN => {
                    if !self.cooldown_elapsed() {
                        return Err(CircuitOpen);
                    }
                    if self
                        .state
                        .compare_exchange(OPEN, ARMING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.trial_slots
                            .store(self.config.half_open_max_calls, Ordering::Release);
                        self.state.store(HALF_OPEN, Ordering::Release);
                        info!("Circuit breaker half-open");
                    }
                }
                _ => {
                    return self
                        .trial_slots
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |slots| {
                            slots.checked_sub(1)
                        })
                        .map(|_| Admission::Trial)
                        .map_err(|_| CircuitOpen);
                }
            }
        }
    }

    pub fn on_success(&self, admission: Admission) {
        match admission {
            Admission::Trial => {
                if self
                    .state
                    .compare_exchange(HALF_OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.lock_window().clear();
                    info!("Circuit breaker closed");
                }
            }
            Admission::Normal => {
                self.lock_window().push(false);
            }
        }
    }

    pub fn on_failure(&self, admission: Admission) {
        match admission {
            Admission::Trial => {
                if self.open_from(HALF_OPEN) {
                    warn!("Circuit breaker trial call failed; reopening");
                }
            }
            Admission::Normal => {
                let tripped = {
                    let mut window = self.lock_window();
                    window.push(true);
                    window.len() >= self.config.minimum_calls
                        && window.failure_rate() >= self.config.failure_rate_threshold
                };

                if tripped {
                    self.trip();
                }
            }
        }
    }

    fn trip(&self) {
        if self.open_from(CLOSED) {
            let rate = {
                let mut window = self.lock_window();
                let rate = window.failure_rate();
                window.clear();
                rate
            };
            warn!(
                "Circuit breaker opened at {rate:.1}% failures; cooling down for {}",
                humantime::format_duration(self.config.cooldown)
            );
        }
    }

    /// Move `from` to open and restart the cooldown. Only the caller that wins the transition
    /// touches the open timestamp.
    fn open_from(&self, from: u8) -> bool {
        if self
            .state
            .compare_exchange(from, TRIPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let nanos = self.epoch.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.opened_at.store(nanos, Ordering::Release);
        self.state.store(OPEN, Ordering::Release);
        true
    }

    fn cooldown_elapsed(&self) -> bool {
        let opened_at = Duration::from_nanos(self.opened_at.load(Ordering::Acquire));
        self.epoch.elapsed() >= opened_at + self.config.cooldown
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, Window> {
        // The window is only counters; a panic mid-push leaves it usable.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Window {
    outcomes: VecDeque<bool>,
    failures: usize,
    size: usize,
}

impl Window {
    fn new(size: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(size),
            failures: 0,
            size: size.max(1),
        }
    }

    fn push(&mut self, failed: bool) {
        if self.outcomes.len() == self.size {
            if let Some(true) = self.outcomes.pop_front() {
                self.failures -= 1;
            }
        }
        self.outcomes.push_back(failed);
        if failed {
            self.failures += 1;
        }
    }

    fn len(&self) -> usize {
        self.outcomes.len()
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.
        } else {
            self.failures as f64 * 100. / self.outcomes.len() as f64
        }
    }

    fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            window_size: 10,
            minimum_calls: 4,
            failure_rate_threshold: 50.,
            cooldown: Duration::from_secs(1),
            half_open_max_calls: 2,
        })
    }

    fn fail(breaker: &CircuitBreaker, n: usize) {
        for _ in 0..n {
            let admission = breaker.try_acquire().unwrap();
            breaker.on_failure(admission);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold() {
        let breaker = breaker();
        fail(&breaker, 3);
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire(), Err(CircuitOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn successes_keep_rate_below_threshold() {
        let breaker = breaker();
        for _ in 0..10 {
            let ok = breaker.try_acquire().unwrap();
            breaker.on_success(ok);
            let ok = breaker.try_acquire().unwrap();
            breaker.on_success(ok);
            fail(&breaker, 1);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_after_cooldown() {
        let breaker = breaker();
        fail(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(breaker.try_acquire(), Err(CircuitOpen));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_limits_trials() {
        let breaker = breaker();
        fail(&breaker, 4);
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
        assert_eq!(breaker.try_acquire(), Err(CircuitOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn trial_success_closes() {
        let breaker = breaker();
        fail(&breaker, 4);
        tokio::time::advance(Duration::from_secs(1)).await;

        let trial = breaker.try_acquire().unwrap();
        breaker.on_success(trial);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.try_acquire(), Ok(Admission::Normal));
    }

    #[tokio::test(start_paused = true)]
    async fn trial_failure_reopens_and_restarts_cooldown() {
        let breaker = breaker();
        fail(&breaker, 4);
        tokio::time::advance(Duration::from_secs(1)).await;

        let trial = breaker.try_acquire().unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        breaker.on_failure(trial);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(breaker.try_acquire(), Err(CircuitOpen));

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(breaker.try_acquire(), Ok(Admission::Trial));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_half_open_admits_exact_trials() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            window_size: 4,
            minimum_calls: 1,
            failure_rate_threshold: 100.,
            cooldown: Duration::ZERO,
            half_open_max_calls: 3,
        }));
        fail(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);

        let mut handles = vec![];
        for _ in 0..32 {
            let breaker = breaker.clone();
            handles.push(tokio::spawn(async move { breaker.try_acquire() }));
        }

        let mut trials = 0;
        for handle in handles {
            if let Ok(Admission::Trial) = handle.await.unwrap() {
                trials += 1;
            }
        }
        assert_eq!(trials, 3);
    }

    #[test]
    fn window_slides() {
        let mut window = Window::new(3);
        window.push(true);
        window.push(true);
        window.push(false);
        assert_eq!(window.failures, 2);
        window.push(false);
        window.push(false);
        assert_eq!(window.failures, 0);
        assert_eq!(window.len(), 3);
    }
}
