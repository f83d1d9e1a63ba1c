use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied,
    TimedOut,
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        *self == PollOutcome::Satisfied
    }
}

/// Bounded wait shared by every waiting point (banner, options, results).
///
/// The predicate runs at least once, even with a zero timeout, and never
/// again after the deadline has passed.
pub fn poll_until<P>(timeout: Duration, interval: Duration, mut predicate: P) -> PollOutcome
where
    P: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return PollOutcome::Satisfied;
        }
        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut;
        }
        std::thread::sleep(interval.min(deadline - now));
    }
}

pub fn poll_for<T, P>(timeout: Duration, interval: Duration, mut probe: P) -> Option<T>
where
    P: FnMut() -> Option<T>,
{
    let mut found = None;
    poll_until(timeout, interval, || {
        found = probe();
        found.is_some()
    });
    found
}
