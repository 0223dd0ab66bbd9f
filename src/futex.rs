use std::sync::atomic::AtomicU32;
use std::time::Duration;

// atomic-wait only knows how to wait forever. The controller must never
// block past its join timeout, so the waiting side talks to the futex
// syscall directly and passes a timeout. Waking stays with atomic-wait
// (it uses the same private futex on Linux).

/// Blocks while `*a == expected`, for at most `timeout`.
///
/// May return early: on a wake, if the value already differs, or
/// spuriously. Callers re-check the value in a loop.
#[cfg(target_os = "linux")]
pub fn wait_timeout(a: &AtomicU32, expected: u32, timeout: Duration) {
    let ts = libc::timespec {
        tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    };
    // Refer to the futex (2) man page for the syscall signature.
    unsafe {
        libc::syscall(
            libc::SYS_futex, // The futex syscall.
            a as *const AtomicU32, // The atomic to operate on.
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG, // Same flavour atomic-wait wakes.
            expected, // The expected value.
            &ts as *const libc::timespec, // Relative timeout.
        );
    }
}

// No timed futex here. Sleep in short slices and let the caller re-check.
#[cfg(not(target_os = "linux"))]
pub fn wait_timeout(a: &AtomicU32, expected: u32, timeout: Duration) {
    use std::sync::atomic::Ordering::Relaxed;

    const SLICE: Duration = Duration::from_millis(1);

    if a.load(Relaxed) == expected {
        std::thread::sleep(timeout.min(SLICE));
    }
}

pub use atomic_wait::wake_all;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering::Relaxed;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn gives_up_after_timeout() {
        let a = AtomicU32::new(0);
        let start = Instant::now();
        // Nobody wakes us, so this ends on the timeout (or spuriously).
        wait_timeout(&a, 0, Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn returns_at_once_on_mismatch() {
        let a = AtomicU32::new(1);
        let start = Instant::now();
        wait_timeout(&a, 0, Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn woken_by_store_and_wake() {
        let a = AtomicU32::new(0);
        let start = Instant::now();
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                a.store(1, Relaxed);
                wake_all(&a);
            });

            while a.load(Relaxed) == 0 {
                wait_timeout(&a, 0, Duration::from_secs(10));
            }
        });
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
