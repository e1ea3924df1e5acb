//! Parallel repetition runner
//!
//! Every repetition gets its own generator from `RepetitionSeeds` and runs on
//! the rayon pool. Results land in a fixed-length vector indexed by
//! repetition, so the output does not depend on scheduling.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Result, SimError};
use crate::rng::{RepetitionSeeds, SimRng};

/// What happened to one repetition
#[derive(Debug, Clone)]
pub enum RepetitionOutcome<T> {
    Completed(T),
    Failed { repetition: usize, reason: String },
}

/// A repetition that was skipped, as recorded in reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepetitionFailure {
    pub repetition: usize,
    pub reason: String,
}

/// Records of the repetitions that completed, plus the failures
#[derive(Debug, Clone)]
pub struct Survivors<T> {
    pub records: Vec<T>,
    pub failures: Vec<RepetitionFailure>,
}

impl<T> Survivors<T> {
    pub fn n_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn n_completed(&self) -> usize {
        self.records.len()
    }
}

/// Run `reps` repetitions of `body` in parallel
///
/// A repetition that returns an error is logged and recorded as failed. The
/// run itself fails only if `reps` is zero or every repetition failed.
pub fn run_repetitions<T, F>(name: &str, reps: usize, seed: u64, body: F) -> Result<Survivors<T>>
where
    T: Send,
    F: Fn(usize, &mut SimRng) -> Result<T> + Sync,
{
    if reps == 0 {
        return Err(SimError::invalid("the number of repetitions must be positive"));
    }
    let seeds = RepetitionSeeds::new(seed, reps);
    log::info!("{}: running {} repetitions (seed {})", name, reps, seed);

    let outcomes: Vec<RepetitionOutcome<T>> = (0..reps)
        .into_par_iter()
        .map(|repetition| {
            let result = match seeds.rng(repetition) {
                Some(mut rng) => body(repetition, &mut rng),
                None => Err(SimError::invalid(format!("no seed for repetition {}", repetition))),
            };
            match result {
                Ok(record) => RepetitionOutcome::Completed(record),
                Err(e) => {
                    log::warn!("{}: repetition {} failed: {}", name, repetition, e);
                    RepetitionOutcome::Failed {
                        repetition,
                        reason: e.to_string(),
                    }
                }
            }
        })
        .collect();

    let mut survivors = Survivors {
        records: Vec::with_capacity(reps),
        failures: Vec::new(),
    };
    for outcome in outcomes {
        match outcome {
            RepetitionOutcome::Completed(record) => survivors.records.push(record),
            RepetitionOutcome::Failed { repetition, reason } => {
                survivors.failures.push(RepetitionFailure { repetition, reason })
            }
        }
    }

    if survivors.records.is_empty() {
        return Err(SimError::degenerate(format!(
            "{}: all {} repetitions failed",
            name, reps
        )));
    }
    log::info!(
        "{}: {} of {} repetitions completed",
        name,
        survivors.n_completed(),
        reps
    );
    Ok(survivors)
}
