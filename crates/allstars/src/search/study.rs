use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tqdm::tqdm;

use crate::error::{AllstarsError, Result};
use crate::search::trial::{ParameterValue, SampledTrial, Trial};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Maximize,
    Minimize,
}

/// Anything the study can evaluate. Returning an error aborts `optimize`.
pub trait ObjectiveFunction {
    fn evaluate(&mut self, trial: &mut dyn Trial) -> Result<f64>;
}

/// Record of one completed trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenTrial {
    pub number: usize,
    pub params: BTreeMap<String, ParameterValue>,
    pub value: f64,
    pub duration: Duration,
}

/// Random-search study with a FIFO queue of pinned trials.
pub struct Study {
    direction: Direction,
    rng: StdRng,
    queue: VecDeque<BTreeMap<String, ParameterValue>>,
    trials: Vec<FrozenTrial>,
}

impl Study {
    pub fn create(direction: Direction, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            direction,
            rng,
            queue: VecDeque::new(),
            trials: Vec::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Pin parameters for a future trial. Queued entries survive across
    /// `optimize` calls until consumed.
    pub fn enqueue_trial(&mut self, params: BTreeMap<String, ParameterValue>) {
        self.queue.push_back(params);
    }

    pub fn n_queued(&self) -> usize {
        self.queue.len()
    }

    /// Run trials until `n_trials` have completed or `timeout` has elapsed,
    /// whichever comes first. At least one of the two budgets is required.
    pub fn optimize(
        &mut self,
        objective: &mut dyn ObjectiveFunction,
        timeout: Option<Duration>,
        n_trials: Option<usize>,
        show_progress: bool,
    ) -> Result<()> {
        if timeout.is_none() && n_trials.is_none() {
            return Err(AllstarsError::invalid("optimize", "either a timeout or a trial count is required"));
        }

        let started = Instant::now();
        let mut progress = show_progress.then(|| tqdm(0..n_trials.unwrap_or(0)).desc(Some("trials")));
        let mut completed = 0usize;

        while n_trials.map_or(true, |n| completed < n) && timeout.map_or(true, |t| started.elapsed() < t) {
            let number = self.trials.len();
            let pinned = self.queue.pop_front().unwrap_or_default();
            let mut trial = SampledTrial::new(number, self.rng.gen(), pinned);

            let trial_start = Instant::now();
            let value = objective.evaluate(&mut trial)?;
            let duration = trial_start.elapsed();

            log::debug!("Trial {} finished with value {:.6} in {:.2?}", number, value, duration);
            self.trials.push(FrozenTrial {
                number,
                params: trial.params().clone(),
                value,
                duration,
            });
            completed += 1;
            if let Some(bar) = progress.as_mut() {
                let _ = bar.pbar.update(1);
            }
        }
        Ok(())
    }

    pub fn trials(&self) -> &[FrozenTrial] {
        &self.trials
    }

    pub fn best_trial(&self) -> Option<&FrozenTrial> {
        let finite = self.trials.iter().filter(|t| !t.value.is_nan());
        match self.direction {
            Direction::Maximize => finite.max_by(|a, b| a.value.total_cmp(&b.value)),
            Direction::Minimize => finite.min_by(|a, b| a.value.total_cmp(&b.value)),
        }
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().map(|t| t.value)
    }
}
