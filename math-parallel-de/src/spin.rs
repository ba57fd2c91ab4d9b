use crossbeam_utils::Backoff;

/// Busy-waits until `cond` returns true.
///
/// Spins with exponential backoff, then keeps yielding the time slice so an
/// oversubscribed host still schedules the thread being waited on. Never
/// sleeps or parks.
pub(crate) fn spin_until(mut cond: impl FnMut() -> bool) {
    let backoff = Backoff::new();
    while !cond() {
        backoff.snooze();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_returns_immediately_when_ready() {
        let mut polls = 0;
        spin_until(|| {
            polls += 1;
            true
        });
        assert_eq!(polls, 1);
    }

    #[test]
    fn test_keeps_polling_past_spin_budget() {
        let mut polls = 0;
        spin_until(|| {
            polls += 1;
            polls == 200
        });
        assert_eq!(polls, 200);
    }

    #[test]
    fn test_observes_flag_from_other_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || flag.store(true, Ordering::Release))
        };
        spin_until(|| flag.load(Ordering::Acquire));
        setter.join().expect("setter thread panicked");
        assert!(flag.load(Ordering::Acquire));
    }
}
