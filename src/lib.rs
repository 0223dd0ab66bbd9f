//! A worker thread busy-waits on a flag that another thread sets once.
//!
//! With [`AtomicFlag`] the worker is guaranteed to see the write and stop.
//! With [`PlainFlag`] there is no such guarantee and it may spin forever.

pub mod controller;
pub mod flag;
mod futex;
pub mod worker;

pub use controller::{run, run_trials, run_variant, Config, Outcome, TrialSummary};
pub use flag::{shared_flag, AtomicFlag, Flag, FlagReader, FlagWriter, PlainFlag, Variant};
pub use worker::{spawn_worker, JoinOutcome, WorkerHandle, WorkerState};
