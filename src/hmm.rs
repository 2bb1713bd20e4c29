use rand::prelude::*;

use crate::alphabet::Alphabet;
use crate::error::{HmmError, Result};
use crate::stochastic::StochasticMatrix;

/// Parameters λ = (π, A, B) of a discrete-output HMM.
///
/// A value of this type is never mutated by training; each re-estimation
/// produces a new `Hmm`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hmm {
    n_states: usize,
    n_symbols: usize,
    initial: StochasticMatrix,
    transition: StochasticMatrix,
    emission: StochasticMatrix,
}

impl Hmm {
    /// Builds from explicit tables: `initial` is 1xN, `transition` NxN, `emission` NxM.
    pub fn new(
        initial: StochasticMatrix,
        transition: StochasticMatrix,
        emission: StochasticMatrix,
    ) -> Result<Self> {
        let n_states = initial.n_cols();
        let n_symbols = emission.n_cols();

        if initial.n_rows() != 1 {
            return Err(HmmError::InvalidInput(format!(
                "initial distribution must be a single row, got {} rows",
                initial.n_rows()
            )));
        }
        if transition.n_rows() != n_states || transition.n_cols() != n_states {
            return Err(HmmError::InvalidInput(format!(
                "transition is {}x{}, expected {n_states}x{n_states}",
                transition.n_rows(),
                transition.n_cols()
            )));
        }
        if emission.n_rows() != n_states {
            return Err(HmmError::InvalidInput(format!(
                "emission has {} rows, expected {n_states}",
                emission.n_rows()
            )));
        }

        Ok(Self { n_states, n_symbols, initial, transition, emission })
    }

    /// Convenience constructor from nested rows.
    pub fn from_tables(prior: Vec<f64>, trans: &[Vec<f64>], emit: &[Vec<f64>]) -> Result<Self> {
        Self::new(
            StochasticMatrix::from_vector(prior)?,
            StochasticMatrix::from_rows(trans)?,
            StochasticMatrix::from_rows(emit)?,
        )
    }

    /// π, every row of A and every row of B drawn from a symmetric Dirichlet(1, ..., 1).
    pub fn random<R: Rng + ?Sized>(rng: &mut R, n_states: usize, n_symbols: usize) -> Result<Self> {
        if n_states == 0 {
            return Err(HmmError::InvalidInput("n_states must be > 0".into()));
        }
        if n_symbols == 0 {
            return Err(HmmError::InvalidInput("n_symbols must be > 0".into()));
        }

        let initial = StochasticMatrix::random_dirichlet(rng, 1, n_states)?;
        let transition = StochasticMatrix::random_dirichlet(rng, n_states, n_states)?;
        let emission = StochasticMatrix::random_dirichlet(rng, n_states, n_symbols)?;

        Ok(Self { n_states, n_symbols, initial, transition, emission })
    }

    /// Re-estimated parameters; shapes are guaranteed by the caller.
    pub(crate) fn from_estimate(
        initial: StochasticMatrix,
        transition: StochasticMatrix,
        emission: StochasticMatrix,
    ) -> Self {
        Self {
            n_states: initial.n_cols(),
            n_symbols: emission.n_cols(),
            initial,
            transition,
            emission,
        }
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_symbols(&self) -> usize {
        self.n_symbols
    }

    /// π as a length-N slice.
    pub fn initial(&self) -> &[f64] {
        self.initial.row(0)
    }

    pub fn transition(&self) -> &StochasticMatrix {
        &self.transition
    }

    pub fn emission(&self) -> &StochasticMatrix {
        &self.emission
    }

    #[inline]
    pub(crate) fn prior(&self, i: usize) -> f64 {
        self.initial.get(0, i)
    }

    #[inline]
    pub(crate) fn trans(&self, i: usize, j: usize) -> f64 {
        self.transition.get(i, j)
    }

    #[inline]
    pub(crate) fn emit(&self, i: usize, symbol: usize) -> f64 {
        self.emission.get(i, symbol)
    }

    pub fn is_stochastic(&self, tol: f64) -> bool {
        self.initial.is_stochastic(tol)
            && self.transition.is_stochastic(tol)
            && self.emission.is_stochastic(tol)
    }

    /// Rejects empty sequences and symbols outside [0, M).
    pub fn validate_observations(&self, obs: &[usize]) -> Result<()> {
        if obs.is_empty() {
            return Err(HmmError::InvalidInput("observation sequence is empty".into()));
        }
        if let Some((t, &o)) = obs.iter().enumerate().find(|(_, o)| **o >= self.n_symbols) {
            return Err(HmmError::InvalidInput(format!(
                "observation[{t}] = {o} out of range (n_symbols = {})",
                self.n_symbols
            )));
        }
        Ok(())
    }
}

/// An `Hmm` together with the labels of its states and symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub states: Alphabet,
    pub symbols: Alphabet,
    pub hmm: Hmm,
}

impl Model {
    /// Random stochastic initialization over the given state and symbol labels.
    pub fn init<S: AsRef<str>, R: Rng + ?Sized>(
        states: &[S],
        symbols: &[S],
        rng: &mut R,
    ) -> Result<Self> {
        let states = Alphabet::new(states)?;
        let symbols = Alphabet::new(symbols)?;
        let hmm = Hmm::random(rng, states.len(), symbols.len())?;

        Ok(Self { states, symbols, hmm })
    }

    /// Attaches labels to existing parameters; label counts must match N and M.
    pub fn with_labels(states: Alphabet, symbols: Alphabet, hmm: Hmm) -> Result<Self> {
        if states.len() != hmm.n_states() {
            return Err(HmmError::InvalidInput(format!(
                "{} state labels for {} states",
                states.len(),
                hmm.n_states()
            )));
        }
        if symbols.len() != hmm.n_symbols() {
            return Err(HmmError::InvalidInput(format!(
                "{} symbol labels for {} symbols",
                symbols.len(),
                hmm.n_symbols()
            )));
        }
        Ok(Self { states, symbols, hmm })
    }

    /// Numbered labels ("S0", ... and "O0", ...) around bare parameters.
    pub fn unlabelled(hmm: Hmm) -> Result<Self> {
        let states = Alphabet::numbered("S", hmm.n_states())?;
        let symbols = Alphabet::numbered("O", hmm.n_symbols())?;
        Ok(Self { states, symbols, hmm })
    }

    pub fn encode<S: AsRef<str>>(&self, observations: &[S]) -> Result<Vec<usize>> {
        self.symbols.encode(observations)
    }
}
