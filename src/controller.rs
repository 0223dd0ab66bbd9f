use log::{debug, info, warn};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crate::flag::{shared_flag, AtomicFlag, Flag, PlainFlag, Variant};
use crate::worker::{spawn_worker, JoinOutcome};

#[derive(Debug, Clone)]
pub struct Config {
    /// How long to sleep before raising the flag. Only a hint that makes it
    /// likely the worker is already spinning, it guarantees nothing.
    pub delay: Duration,
    /// Upper bound on how long to wait for the worker afterwards.
    pub join_timeout: Duration,
    /// Print the `run() entry` / `finished = true` / `run() exit` lines.
    pub echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            join_timeout: Duration::from_millis(5000),
            echo: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Did the worker see the flag before the join timeout?
    pub observed: bool,
    /// Reads of `false` before the worker saw `true`, if it did.
    pub spins: Option<u64>,
    /// Time spent in the join.
    pub waited: Duration,
}

/// Runs the protocol once: spawn, sleep, raise, join with a timeout.
///
/// A join that times out is an `Ok` outcome with `observed == false`.
/// The only error is failing to spawn the worker.
pub fn run<F: Flag>(config: &Config) -> io::Result<Outcome> {
    let (writer, reader) = shared_flag::<F>();
    let worker = spawn_worker(reader, config.echo)?;

    thread::sleep(config.delay);

    writer.raise();
    if config.echo {
        println!("finished = true");
    }
    debug!("flag raised, worker is {:?}", worker.state());

    let start = Instant::now();
    let outcome = match worker.join_timeout(config.join_timeout) {
        JoinOutcome::Exited { spins } => Outcome {
            observed: true,
            spins: Some(spins),
            waited: start.elapsed(),
        },
        JoinOutcome::TimedOut { waited } => Outcome {
            observed: false,
            spins: None,
            waited,
        },
    };
    Ok(outcome)
}

pub fn run_variant(variant: Variant, config: &Config) -> io::Result<Outcome> {
    match variant {
        Variant::Atomic => run::<AtomicFlag>(config),
        Variant::Plain => run::<PlainFlag>(config),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialSummary {
    pub trials: usize,
    pub exited: usize,
    pub timed_out: usize,
    pub longest_wait: Duration,
}

/// Repeats `run_variant` and counts how often the worker got stuck.
///
/// Each stuck worker keeps burning a core until the process exits, so
/// `stop_on_hang` ends the series at the first one.
pub fn run_trials(
    variant: Variant,
    config: &Config,
    trials: usize,
    stop_on_hang: bool,
) -> io::Result<TrialSummary> {
    let mut summary = TrialSummary::default();

    for i in 0..trials {
        let outcome = run_variant(variant, config)?;

        summary.trials += 1;
        summary.longest_wait = summary.longest_wait.max(outcome.waited);
        if outcome.observed {
            summary.exited += 1;
        } else {
            summary.timed_out += 1;
            warn!("{} trial {} hung", variant, i);
            if stop_on_hang {
                break;
            }
        }
    }

    info!(
        "{}: {} trials, {} exited, {} timed out, longest join {:?}",
        variant, summary.trials, summary.exited, summary.timed_out, summary.longest_wait
    );
    Ok(summary)
}
