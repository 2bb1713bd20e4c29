use log::warn;
use rayon::prelude::*;

use crate::error::{HmmError, Result};
use crate::expectation::Responsibilities;
use crate::hmm::Hmm;
use crate::stochastic::StochasticMatrix;

/// What re-estimation does when a state carries no posterior mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroDenominatorPolicy {
    /// Fail with `DegenerateSequence`.
    #[default]
    Fail,
    /// Keep the previous row of A or B for that state.
    KeepRow,
}

/// M-step: re-estimates (π, A, B) from the responsibilities of one sequence.
///
/// - π[i] = γ[0][i]
/// - A[i][j] = Σ_{t=0}^{T-2} ξ[t][i][j] / Σ_{t=0}^{T-2} γ[t][i]
/// - B[i][l] = Σ_{t: o_t = l} γ[t][i] / Σ_{t=0}^{T-1} γ[t][i]
///
/// Returns a new `Hmm`; `hmm` is only read, for its shape and for rows kept
/// under [`ZeroDenominatorPolicy::KeepRow`].
pub fn maximize(
    hmm: &Hmm,
    resp: &Responsibilities,
    obs: &[usize],
    policy: ZeroDenominatorPolicy,
) -> Result<Hmm> {
    hmm.validate_observations(obs)?;

    let n_states = hmm.n_states();
    let n_symbols = hmm.n_symbols();
    let chain_len = obs.len();

    if resp.n_states() != n_states
        || resp.gamma.len() != chain_len
        || resp.xi.len() != chain_len - 1
    {
        return Err(HmmError::InvalidInput(format!(
            "responsibilities for {} states over {} steps do not match {n_states} states over {chain_len} steps",
            resp.n_states(),
            resp.gamma.len()
        )));
    }

    let gamma = &resp.gamma;
    let initial = gamma[0].clone();

    let transition_rows: Vec<Vec<f64>> = (0..n_states)
        .into_par_iter()
        .map(|i| {
            let denom: f64 = (0..chain_len - 1).map(|t| gamma[t][i]).sum();

            if denom == 0.0 {
                return zero_denominator(policy, "transition", i, hmm.transition().row(i));
            }

            Ok((0..n_states)
                .map(|j| (0..chain_len - 1).map(|t| resp.xi(t, i, j)).sum::<f64>() / denom)
                .collect())
        })
        .collect::<Result<_>>()?;

    let emission_rows: Vec<Vec<f64>> = (0..n_states)
        .into_par_iter()
        .map(|i| {
            let denom: f64 = (0..chain_len).map(|t| gamma[t][i]).sum();

            if denom == 0.0 {
                return zero_denominator(policy, "emission", i, hmm.emission().row(i));
            }

            let mut row = vec![0.0; n_symbols];
            for (t, &o) in obs.iter().enumerate() {
                row[o] += gamma[t][i];
            }
            for v in &mut row {
                *v /= denom;
            }
            Ok(row)
        })
        .collect::<Result<_>>()?;

    Ok(Hmm::from_estimate(
        StochasticMatrix::from_estimate(1, n_states, initial),
        StochasticMatrix::from_estimate(n_states, n_states, transition_rows.concat()),
        StochasticMatrix::from_estimate(n_states, n_symbols, emission_rows.concat()),
    ))
}

fn zero_denominator(
    policy: ZeroDenominatorPolicy,
    table: &str,
    state: usize,
    previous: &[f64],
) -> Result<Vec<f64>> {
    match policy {
        ZeroDenominatorPolicy::Fail => Err(HmmError::DegenerateSequence(format!(
            "state {state} has no posterior mass; {table} row cannot be re-estimated"
        ))),
        ZeroDenominatorPolicy::KeepRow => {
            warn!("state {state} has no posterior mass; keeping previous {table} row");
            Ok(previous.to_vec())
        }
    }
}
