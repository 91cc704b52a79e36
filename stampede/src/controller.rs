//! Admission control for in-flight writes.
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ControllerError {
    #[error("Admission cancelled")]
    Cancelled,
}

/// Bounded permit pool gating every write.
///
/// The pool's capacity is the configured concurrency limit. Only `level` permits are handed out;
/// raising the level releases more of the capacity. Levels only ever go up, matching the ramp.
pub struct ConcurrencyController {
    semaphore: Arc<Semaphore>,
    limit: usize,
    level: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyController {
    pub fn new(limit: usize, initial_level: usize) -> Self {
        let limit = limit.max(1);
        let level = initial_level.clamp(1, limit);
        Self {
            semaphore: Arc::new(Semaphore::new(level)),
            limit,
            level: AtomicUsize::new(level),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Raise the active level, clamped to the limit. Lower values are ignored. Returns the level
    /// now in effect.
    pub fn raise_to(&self, level: usize) -> usize {
        let target = level.min(self.limit);
        let mut current = self.level.load(Ordering::Acquire);
        while target > current {
            match self.level.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.semaphore.add_permits(target - current);
                    trace!("Concurrency level raised {current} -> {target}");
                    return target;
                }
                Err(actual) => current = actual,
            }
        }
        current
    }

    /// Wait for a permit. Fails only once the controller has been cancelled.
    pub async fn acquire(&self) -> Result<Permit, ControllerError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ControllerError::Cancelled)?;

        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);

        Ok(Permit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Wake every waiting `acquire` with [`ControllerError::Cancelled`] and refuse new ones.
    /// Permits already handed out stay valid until released.
    pub fn cancel(&self) {
        self.semaphore.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn level(&self) -> usize {
        self.level.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of permits held at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// A held admission slot. Returned to the pool on [`Permit::release`] or drop.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Permit {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
