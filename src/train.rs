//! Baum-Welch training driver.
//!
//! A [`TrainingRun`] threads an immutable [`Hmm`] through a fixed number of
//! forward-backward / E-step / M-step iterations, recording the likelihood
//! and the (α, β, γ) tables of every completed iteration.

use log::{debug, info, warn};
use rand::prelude::*;
use thiserror::Error;

use crate::error::{HmmError, Result};
use crate::expectation::expectation;
use crate::forward_backward::Scaling;
use crate::hmm::{Hmm, Model};
use crate::maximization::{ZeroDenominatorPolicy, maximize};
use crate::stochastic::StochasticMatrix;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub iterations: usize,
    pub scaling: Scaling,
    pub zero_denominator: ZeroDenominatorPolicy,
    /// Likelihood drops larger than this between iterations are logged.
    pub monotonic_tolerance: f64,
    /// Seed for the parameter initialization; thread RNG when unset.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: 15,
            scaling: Scaling::Unscaled,
            zero_denominator: ZeroDenominatorPolicy::Fail,
            monotonic_tolerance: 1e-12,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn new(iterations: usize) -> Self {
        Self { iterations, ..Self::default() }
    }

    pub fn with_scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_zero_denominator(mut self, policy: ZeroDenominatorPolicy) -> Self {
        self.zero_denominator = policy;
        self
    }

    pub fn with_monotonic_tolerance(mut self, tol: f64) -> Self {
        self.monotonic_tolerance = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(HmmError::InvalidInput("iteration count must be positive".into()));
        }
        if self.monotonic_tolerance.is_nan() || self.monotonic_tolerance < 0.0 {
            return Err(HmmError::InvalidInput(format!(
                "monotonic tolerance must be non-negative, got {}",
                self.monotonic_tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Idle,
    Running,
    Done,
    Failed,
}

impl TrainingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TrainingState::Done | TrainingState::Failed)
    }
}

/// Tables of one iteration, computed from the parameters that entered it.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationSnapshot {
    /// 1-based iteration number.
    pub iteration: usize,
    pub likelihood: f64,
    pub log_likelihood: f64,
    pub alpha: Vec<Vec<f64>>,
    pub beta: Vec<Vec<f64>>,
    pub gamma: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingResult {
    /// Parameters after the last completed iteration, with their labels.
    pub model: Model,
    /// P(O|λ) per iteration, evaluated before that iteration's re-estimation.
    pub likelihood_trace: Vec<f64>,
    pub log_likelihood_trace: Vec<f64>,
    pub snapshots: Vec<IterationSnapshot>,
}

impl TrainingResult {
    pub fn initial(&self) -> &[f64] {
        self.model.hmm.initial()
    }

    pub fn transition(&self) -> &StochasticMatrix {
        self.model.hmm.transition()
    }

    pub fn emission(&self) -> &StochasticMatrix {
        self.model.hmm.emission()
    }

    pub fn iterations(&self) -> usize {
        self.likelihood_trace.len()
    }

    pub fn final_likelihood(&self) -> Option<f64> {
        self.likelihood_trace.last().copied()
    }

    /// Last minus first likelihood of the trace.
    pub fn likelihood_delta(&self) -> Option<f64> {
        match (self.likelihood_trace.first(), self.likelihood_trace.last()) {
            (Some(first), Some(last)) => Some(last - first),
            _ => None,
        }
    }
}

/// A failed run: the error plus everything collected before it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", failure_message(.iteration, .error))]
pub struct TrainingFailure {
    #[source]
    pub error: HmmError,
    /// 1-based iteration that failed; 0 when the run never started.
    pub iteration: usize,
    pub partial: Option<TrainingResult>,
}

fn failure_message(iteration: &usize, error: &HmmError) -> String {
    if *iteration == 0 {
        format!("training could not start: {error}")
    } else {
        format!("training failed at iteration {iteration}: {error}")
    }
}

impl From<HmmError> for TrainingFailure {
    fn from(error: HmmError) -> Self {
        Self { error, iteration: 0, partial: None }
    }
}

/// A single training run over one encoded observation sequence.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    model: Model,
    obs: Vec<usize>,
    config: TrainingConfig,
    state: TrainingState,
    likelihood_trace: Vec<f64>,
    log_likelihood_trace: Vec<f64>,
    snapshots: Vec<IterationSnapshot>,
    error: Option<(usize, HmmError)>,
}

impl TrainingRun {
    pub fn new(model: Model, obs: Vec<usize>, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        model.hmm.validate_observations(&obs)?;

        Ok(Self {
            model,
            obs,
            config,
            state: TrainingState::Idle,
            likelihood_trace: Vec::new(),
            log_likelihood_trace: Vec::new(),
            snapshots: Vec::new(),
            error: None,
        })
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn completed(&self) -> usize {
        self.likelihood_trace.len()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn error(&self) -> Option<&HmmError> {
        self.error.as_ref().map(|(_, e)| e)
    }

    /// Runs one iteration. A Done or Failed run is left as is.
    pub fn step(&mut self) -> TrainingState {
        if self.state.is_terminal() {
            return self.state;
        }

        if self.state == TrainingState::Idle {
            info!(
                "Training HMM with N={}, M={}, T={} for {} iterations ({:?} scaling)",
                self.model.hmm.n_states(),
                self.model.hmm.n_symbols(),
                self.obs.len(),
                self.config.iterations,
                self.config.scaling
            );
            self.state = TrainingState::Running;
        }

        let iteration = self.completed() + 1;

        match iterate(&self.model.hmm, &self.obs, &self.config, iteration) {
            Ok((next, snapshot)) => {
                debug!(
                    "Baum-Welch iteration {iteration}: P(O|λ)={:.8e}, log P(O|λ)={:.6}",
                    snapshot.likelihood, snapshot.log_likelihood
                );

                if let Some(&prev) = self.log_likelihood_trace.last() {
                    let drop = prev - snapshot.log_likelihood;
                    if drop > self.config.monotonic_tolerance {
                        warn!("log-likelihood decreased by {drop:.3e} at iteration {iteration}");
                    }
                }

                self.likelihood_trace.push(snapshot.likelihood);
                self.log_likelihood_trace.push(snapshot.log_likelihood);
                self.snapshots.push(snapshot);
                self.model.hmm = next;

                if self.completed() == self.config.iterations {
                    self.state = TrainingState::Done;
                    info!(
                        "Training done after {iteration} iterations: P(O|λ)={:.8e}",
                        self.likelihood_trace[iteration - 1]
                    );
                }
            }
            Err(err) => {
                warn!("Baum-Welch iteration {iteration} failed: {err}");
                self.error = Some((iteration, err));
                self.state = TrainingState::Failed;
            }
        }

        self.state
    }

    /// Steps until Done or Failed.
    pub fn run(mut self) -> std::result::Result<TrainingResult, TrainingFailure> {
        while !self.step().is_terminal() {}
        self.finish()
    }

    /// Consumes the run, returning the result of a Done run and the partial
    /// history of any other.
    pub fn finish(self) -> std::result::Result<TrainingResult, TrainingFailure> {
        let state = self.state;
        let completed = self.completed();
        let planned = self.config.iterations;
        let error = self.error;
        let result = TrainingResult {
            model: self.model,
            likelihood_trace: self.likelihood_trace,
            log_likelihood_trace: self.log_likelihood_trace,
            snapshots: self.snapshots,
        };

        match (state, error) {
            (TrainingState::Done, _) => Ok(result),
            (_, Some((iteration, error))) => {
                Err(TrainingFailure { error, iteration, partial: Some(result) })
            }
            _ => Err(TrainingFailure {
                error: HmmError::InvalidInput(format!(
                    "run stopped after {completed} of {planned} iterations"
                )),
                iteration: completed,
                partial: Some(result),
            }),
        }
    }
}

/// One Baum-Welch iteration: λ_k → (λ_{k+1}, tables computed under λ_k).
pub fn iterate(
    hmm: &Hmm,
    obs: &[usize],
    config: &TrainingConfig,
    iteration: usize,
) -> Result<(Hmm, IterationSnapshot)> {
    let fb = hmm.forward_backward(obs, config.scaling)?;
    let resp = expectation(hmm, obs, &fb)?;
    let next = maximize(hmm, &resp, obs, config.zero_denominator)?;

    let snapshot = IterationSnapshot {
        iteration,
        likelihood: fb.likelihood,
        log_likelihood: fb.log_likelihood,
        alpha: fb.alpha,
        beta: fb.beta,
        gamma: resp.gamma,
    };
    Ok((next, snapshot))
}

/// Starts fresh runs from newly initialized parameters.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    pub config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Seeded from `config.seed` when set, otherwise from the thread RNG.
    pub fn train<S: AsRef<str>>(
        &self,
        states: &[S],
        symbols: &[S],
        observations: &[S],
    ) -> std::result::Result<TrainingResult, TrainingFailure> {
        match self.config.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                self.train_with_rng(states, symbols, observations, &mut rng)
            }
            None => self.train_with_rng(states, symbols, observations, &mut rand::rng()),
        }
    }

    pub fn train_with_rng<S: AsRef<str>, R: Rng + ?Sized>(
        &self,
        states: &[S],
        symbols: &[S],
        observations: &[S],
        rng: &mut R,
    ) -> std::result::Result<TrainingResult, TrainingFailure> {
        self.config.validate()?;

        let model = Model::init(states, symbols, rng)?;
        let obs = model.encode(observations)?;

        TrainingRun::new(model, obs, self.config.clone())?.run()
    }
}

/// Trains with default settings and `iterations` Baum-Welch iterations.
pub fn train<S: AsRef<str>>(
    states: &[S],
    symbols: &[S],
    observations: &[S],
    iterations: usize,
) -> std::result::Result<TrainingResult, TrainingFailure> {
    Trainer::new(TrainingConfig::new(iterations)).train(states, symbols, observations)
}
