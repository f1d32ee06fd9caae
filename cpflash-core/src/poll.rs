//! Bounded, cancellable polling.
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep, so cancellation is noticed quickly.
const SLICE: Duration = Duration::from_millis(50);

/// Repeatedly sleeps `interval` and then calls `check`, until `check` yields
/// a value or more than `timeout` has elapsed.
///
/// Clearing `running` ends the loop with `None` at the next sleep slice;
/// cancellation is not an error. With no value ever produced the loop returns
/// within `timeout + interval`.
pub fn poll<T>(
    mut check: impl FnMut() -> Option<T>,
    interval: Duration,
    timeout: Duration,
    running: &AtomicBool,
) -> Option<T> {
    let start = Instant::now();
    loop {
        if !sleep_while_running(interval, running) {
            log::debug!("poll cancelled after {:?}", start.elapsed());
            return None;
        }
        if let Some(found) = check() {
            return Some(found);
        }
        if start.elapsed() >= timeout {
            log::debug!("poll timed out after {:?}", start.elapsed());
            return None;
        }
    }
}

/// Sleeps for `duration` in slices; returns `false` as soon as `running` is cleared.
fn sleep_while_running(duration: Duration, running: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(20);
    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn stops_at_the_first_hit() {
        let running = AtomicBool::new(true);
        let mut calls = 0;
        let found = poll(
            || {
                calls += 1;
                (calls == 2).then_some("BOOT")
            },
            INTERVAL,
            TIMEOUT,
            &running,
        );
        assert_eq!(found, Some("BOOT"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn gives_up_within_timeout_plus_one_interval() {
        let running = AtomicBool::new(true);
        let start = Instant::now();
        let mut calls = 0;
        let found: Option<()> = poll(
            || {
                calls += 1;
                None
            },
            INTERVAL,
            TIMEOUT,
            &running,
        );
        let elapsed = start.elapsed();

        assert_eq!(found, None);
        assert!(elapsed >= TIMEOUT);
        // Scheduling slack on top of the documented bound.
        assert!(elapsed < TIMEOUT + INTERVAL + Duration::from_millis(100), "{elapsed:?}");
        assert!(calls >= 2);
    }

    #[test]
    fn cancellation_ends_the_loop_within_one_interval() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let interval = Duration::from_millis(200);

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            flag.store(false, Ordering::SeqCst);
        });

        let start = Instant::now();
        let found: Option<()> = poll(|| None, interval, Duration::from_secs(10), &running);
        canceller.join().unwrap();

        assert_eq!(found, None);
        assert!(start.elapsed() < interval, "{:?}", start.elapsed());
    }

    #[test]
    fn cancelled_before_start_never_checks() {
        let running = AtomicBool::new(false);
        let mut calls = 0;
        let found: Option<()> = poll(
            || {
                calls += 1;
                None
            },
            INTERVAL,
            TIMEOUT,
            &running,
        );
        assert_eq!(found, None);
        assert_eq!(calls, 0);
    }
}
