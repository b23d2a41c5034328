//! Background instance accounting
//!
//! A slot is taken before a background environment is built and travels with
//! it; dropping the environment (or a failed build) returns the slot.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-size pool of background slots
#[derive(Debug)]
pub struct InstanceLimiter {
    cap: usize,
    outstanding: Arc<AtomicUsize>,
}

impl InstanceLimiter {
    /// Limiter allowing `cap` outstanding slots
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Maximum outstanding slots
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Slots currently taken
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Takes a slot, or `None` when all are taken
    pub fn try_acquire(&self) -> Option<InstanceSlot> {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < self.cap).then_some(taken + 1)
            })
            .ok()
            .map(|_| InstanceSlot {
                outstanding: Arc::clone(&self.outstanding),
            })
    }
}

/// One taken slot; released on drop
pub struct InstanceSlot {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for InstanceSlot {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for InstanceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstanceSlot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cap_is_enforced() {
        let limiter = InstanceLimiter::new(2);
        let a = limiter.try_acquire();
        let b = limiter.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(limiter.try_acquire().is_none());

        drop(a);
        assert_eq!(limiter.outstanding(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn test_racing_acquires_never_exceed_cap() {
        let limiter = Arc::new(InstanceLimiter::new(3));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || limiter.try_acquire())
            })
            .collect();

        let slots: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(slots.len(), 3);
        assert_eq!(limiter.outstanding(), 3);
    }
}
