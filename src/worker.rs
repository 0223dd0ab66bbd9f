use log::{debug, warn};
use std::io;
use std::panic;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicU32, AtomicU64};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::flag::{Flag, FlagReader};
use crate::futex::{wait_timeout, wake_all};

/// NotStarted -> Spinning -> (Spinning)* -> Observed -> Exited.
///
/// With the plain flag the worker may sit in Spinning forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WorkerState {
    NotStarted = 0,
    Spinning = 1,
    Observed = 2,
    Exited = 3,
}

impl WorkerState {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => WorkerState::NotStarted,
            1 => WorkerState::Spinning,
            2 => WorkerState::Observed,
            _ => WorkerState::Exited,
        }
    }
}

// Shared between the worker thread and its handle. The state word doubles
// as the futex the handle sleeps on while joining.
struct Status {
    state: AtomicU32,
    spins: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The worker saw the flag and returned. `spins` is how many times it
    /// read `false` before that.
    Exited { spins: u64 },
    /// The worker was still running when the timeout ran out.
    TimedOut { waited: Duration },
}

/// The only thing the controller gets back from spawning a worker.
///
/// Note there is no way to stop the worker from here. It leaves its loop
/// when it reads `true` from the flag and not otherwise.
pub struct WorkerHandle {
    status: Arc<Status>,
    thread: JoinHandle<()>,
}

pub fn spawn_worker<F: Flag>(reader: FlagReader<F>, echo: bool) -> io::Result<WorkerHandle> {
    let status = Arc::new(Status {
        state: AtomicU32::new(WorkerState::NotStarted as u32),
        spins: AtomicU64::new(0),
    });

    let thread = thread::Builder::new()
        .name("spin-worker".into())
        .spawn({
            let status = status.clone();
            move || run(reader, &status, echo)
        })?;

    debug!("worker spawned");
    Ok(WorkerHandle { status, thread })
}

fn run<F: Flag>(reader: FlagReader<F>, status: &Status, echo: bool) {
    status.state.store(WorkerState::Spinning as u32, Release);
    if echo {
        println!("run() entry");
    }

    // No sleep, no yield, no syscall. Whether this ever ends is up to
    // the flag type alone.
    let mut spins: u64 = 0;
    while !reader.is_set() {
        spins = spins.wrapping_add(1);
    }

    status.state.store(WorkerState::Observed as u32, Release);
    if echo {
        println!("run() exit");
    }

    // Relaxed is enough, the Release store of Exited below publishes it.
    status.spins.store(spins, Relaxed);
    status.state.store(WorkerState::Exited as u32, Release);
    wake_all(&status.state);
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u32(self.status.state.load(Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.state() == WorkerState::Exited
    }

    /// Waits until the worker exits, but never longer than `timeout`.
    ///
    /// Timing out is not an error. The handle is dropped and the thread
    /// detached, it keeps spinning until it sees the flag or the process
    /// ends.
    pub fn join_timeout(self, timeout: Duration) -> JoinOutcome {
        let start = Instant::now();

        loop {
            let state = self.status.state.load(Acquire);

            if state == WorkerState::Exited as u32 {
                let spins = self.status.spins.load(Relaxed);
                // Exited is the last thing the thread stores, this join
                // is only waiting for the closure to return.
                if let Err(payload) = self.thread.join() {
                    panic::resume_unwind(payload);
                }
                debug!("worker exited after {} spins", spins);
                return JoinOutcome::Exited { spins };
            }

            let waited = start.elapsed();
            if waited >= timeout {
                warn!(
                    "worker still {:?} after {:?}, leaving it behind",
                    WorkerState::from_u32(state),
                    waited
                );
                return JoinOutcome::TimedOut { waited };
            }

            // Spinning -> Observed doesn't wake us, but the value check in
            // the futex does, and Exited always comes with a wake.
            wait_timeout(&self.status.state, state, timeout - waited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::{shared_flag, AtomicFlag, PlainFlag};

    fn wait_for_spinning(handle: &WorkerHandle) {
        let start = Instant::now();
        while handle.state() == WorkerState::NotStarted {
            assert!(start.elapsed() < Duration::from_secs(5), "worker never started");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn exits_after_raise() {
        let (writer, reader) = shared_flag::<AtomicFlag>();
        let handle = spawn_worker(reader, false).unwrap();

        wait_for_spinning(&handle);
        writer.raise();

        match handle.join_timeout(Duration::from_secs(5)) {
            JoinOutcome::Exited { .. } => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keeps_spinning_until_raised() {
        let (writer, reader) = shared_flag::<AtomicFlag>();
        let handle = spawn_worker(reader, false).unwrap();

        wait_for_spinning(&handle);
        thread::sleep(Duration::from_millis(50));

        // Nothing but the flag can get it out of the loop.
        assert_eq!(handle.state(), WorkerState::Spinning);
        assert!(!handle.is_finished());

        writer.raise();
        assert!(matches!(
            handle.join_timeout(Duration::from_secs(5)),
            JoinOutcome::Exited { .. }
        ));
    }

    #[test]
    fn timed_out_join_is_bounded() {
        let (writer, reader) = shared_flag::<AtomicFlag>();
        let handle = spawn_worker(reader, false).unwrap();
        let timeout = Duration::from_millis(100);

        let start = Instant::now();
        let outcome = handle.join_timeout(timeout);
        let elapsed = start.elapsed();

        match outcome {
            JoinOutcome::TimedOut { waited } => assert!(waited >= timeout),
            other => panic!("unexpected {:?}", other),
        }
        // Allow for scheduling slack, but it must not hang.
        assert!(elapsed < timeout + Duration::from_secs(2));

        // Let the detached thread go.
        writer.raise();
    }

    // Raising before the worker starts spinning is fine too,
    // it simply never reads `false`.
    #[test]
    fn raised_before_spawn() {
        let (writer, reader) = shared_flag::<AtomicFlag>();
        writer.raise();
        let handle = spawn_worker(reader, false).unwrap();

        assert_eq!(
            handle.join_timeout(Duration::from_secs(5)),
            JoinOutcome::Exited { spins: 0 }
        );
    }

    // Whatever the plain flag does, the join comes back in time.
    #[test]
    fn plain_join_is_bounded() {
        let (writer, reader) = shared_flag::<PlainFlag>();
        let handle = spawn_worker(reader, false).unwrap();
        wait_for_spinning(&handle);
        writer.raise();

        let timeout = Duration::from_millis(200);
        let start = Instant::now();
        let _ = handle.join_timeout(timeout);
        assert!(start.elapsed() < timeout + Duration::from_secs(2));
    }
}
