//! Process-wide admission control for QA tasks.
//!
//! The counter caps how many tasks this process works on at once. A slot is
//! held by an [`AdmissionPermit`] and returned when the permit is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::metrics;

/// Atomic in-flight counter with a fixed ceiling.
#[derive(Debug)]
pub struct AdmissionCounter {
    in_flight: AtomicUsize,
    max: usize,
}

impl AdmissionCounter {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            max,
        })
    }

    /// Takes one slot, or returns `None` when the ceiling is reached.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let max = self.max;
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()?;

        metrics::set_tasks_in_flight(previous + 1);
        Some(AdmissionPermit {
            counter: Arc::clone(self),
        })
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// One held admission slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    counter: Arc<AdmissionCounter>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let previous = self.counter.in_flight.fetch_sub(1, Ordering::AcqRel);
        metrics::set_tasks_in_flight(previous.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_up_to_max() {
        let counter = AdmissionCounter::new(2);
        let a = counter.try_acquire();
        let b = counter.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(counter.try_acquire().is_none());
        assert_eq!(counter.in_flight(), 2);

        drop(a);
        assert_eq!(counter.in_flight(), 1);
        assert!(counter.try_acquire().is_some());
    }

    #[test]
    fn test_zero_max_never_admits() {
        let counter = AdmissionCounter::new(0);
        assert!(counter.try_acquire().is_none());
        assert_eq!(counter.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cap_holds_under_contention() {
        let counter = AdmissionCounter::new(3);
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let counter = Arc::clone(&counter);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    if let Some(permit) = counter.try_acquire() {
                        peak.fetch_max(counter.in_flight(), Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        drop(permit);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(counter.in_flight(), 0);
    }

    #[test]
    fn test_permit_released_on_panic() {
        let counter = AdmissionCounter::new(1);
        let cloned = Arc::clone(&counter);
        let result = std::panic::catch_unwind(move || {
            let _permit = cloned.try_acquire().unwrap();
            panic!("task blew up");
        });
        assert!(result.is_err());
        assert_eq!(counter.in_flight(), 0);
    }
}
