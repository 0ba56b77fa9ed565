use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Joins `handle` if it finishes within `timeout`. A thread that is still
/// running afterwards is left detached. Returns whether the thread finished.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let name = handle
        .thread()
        .name()
        .unwrap_or("unnamed")
        .to_string();
    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("Thread {name} did not stop within {timeout:?}; detaching");
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }

    if let Err(join_err) = handle.join() {
        error!("Thread {name} panicked: {join_err:?}");
    }
    true
}

/// Sleeps up to `total`, waking early when `stop` returns true.
pub fn sleep_unless(total: Duration, stop: impl Fn() -> bool) {
    let deadline = Instant::now() + total;
    while !stop() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL * 5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn finished_threads_are_joined() {
        let handle = thread::spawn(|| {});
        assert!(join_with_timeout(handle, Duration::from_secs(1)));
    }

    #[test]
    fn stuck_threads_are_detached_after_timeout() {
        let release = Arc::new(AtomicBool::new(false));
        let handle = {
            let release = Arc::clone(&release);
            thread::spawn(move || {
                while !release.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };
        assert!(!join_with_timeout(handle, Duration::from_millis(30)));
        release.store(true, Ordering::Relaxed);
    }

    #[test]
    fn sleep_unless_wakes_on_stop() {
        let started = Instant::now();
        sleep_unless(Duration::from_secs(10), || true);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
