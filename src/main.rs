use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::info;

use spin_visibility::{run_trials, run_variant, Config, Variant};

// cargo run --release -- --variant plain
//
// Release matters. In debug builds the plain flag gets re-read every
// iteration and the bug rarely shows up.
#[derive(Parser, Debug)]
#[command(name = "spin-visibility", version, about, long_about = None)]
struct Opt {
    #[arg(long, value_enum, default_value_t = FlagKind::Plain, help = "Shared flag implementation")]
    variant: FlagKind,
    #[arg(long, value_name = "MS", default_value_t = 100, help = "Sleep before raising the flag")]
    delay_ms: u64,
    #[arg(long, value_name = "MS", default_value_t = 5000, help = "How long to wait for the worker")]
    timeout_ms: u64,
    #[arg(long, value_name = "N", help = "Repeat quietly N times and print a summary")]
    trials: Option<usize>,
    #[arg(long, help = "End the trials at the first hung worker")]
    stop_on_hang: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum FlagKind {
    Atomic,
    Plain,
}

impl From<FlagKind> for Variant {
    fn from(kind: FlagKind) -> Self {
        match kind {
            FlagKind::Atomic => Variant::Atomic,
            FlagKind::Plain => Variant::Plain,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::parse();
    let variant = Variant::from(opt.variant);
    let mut config = Config {
        delay: Duration::from_millis(opt.delay_ms),
        join_timeout: Duration::from_millis(opt.timeout_ms),
        ..Config::default()
    };

    match opt.trials {
        Some(trials) => {
            config.echo = false;
            let summary = run_trials(variant, &config, trials, opt.stop_on_hang)?;
            println!(
                "{}: {} trials, {} exited, {} timed out",
                variant, summary.trials, summary.exited, summary.timed_out
            );
        }
        None => {
            let outcome = run_variant(variant, &config)?;
            info!("{} flag: {:?}", variant, outcome);
        }
    }

    // A worker that never saw the flag is still spinning. Returning from
    // main takes it down with the process; the exit status stays 0.
    Ok(())
}
