use rayon::prelude::*;

use crate::error::{HmmError, Result};
use crate::forward_backward::{ForwardBackward, Scaling};
use crate::hmm::Hmm;

/// Posterior state and transition responsibilities for one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Responsibilities {
    /// γ[t][i] = P(q_t = i | O, λ), T rows of length N.
    pub gamma: Vec<Vec<f64>>,
    /// ξ[t][i * N + j] = P(q_t = i, q_{t+1} = j | O, λ), T-1 rows of length N*N.
    pub xi: Vec<Vec<f64>>,
    n_states: usize,
}

impl Responsibilities {
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn chain_len(&self) -> usize {
        self.gamma.len()
    }

    pub fn xi(&self, t: usize, i: usize, j: usize) -> f64 {
        self.xi[t][i * self.n_states + j]
    }
}

/// E-step: derives γ and ξ from a forward-backward pass.
///
/// γ[t][i] = α[t][i]·β[t][i] / P(O|λ) for t in 0..T, and
/// ξ[t][i][j] = α[t][i]·A[i][j]·B[j][o_{t+1}]·β[t+1][j] / P(O|λ) for t in 0..T-1.
/// In scaled mode the divisors are 1 and c_{t+1} respectively.
///
/// # Errors
///
/// - `NumericInstability` if the likelihood underflowed or any entry is not finite.
/// - `DegenerateSequence` if the sequence has zero probability.
pub fn expectation(hmm: &Hmm, obs: &[usize], fb: &ForwardBackward) -> Result<Responsibilities> {
    hmm.validate_observations(obs)?;

    let n_states = hmm.n_states();
    let chain_len = obs.len();

    if fb.chain_len() != chain_len || fb.beta.len() != chain_len {
        return Err(HmmError::InvalidInput(format!(
            "forward-backward tables cover {} steps, sequence has {chain_len}",
            fb.chain_len()
        )));
    }
    if fb.alpha.iter().chain(&fb.beta).any(|row| row.len() != n_states) {
        return Err(HmmError::InvalidInput(format!(
            "forward-backward rows do not match {n_states} states"
        )));
    }

    if fb.underflow {
        return Err(HmmError::NumericInstability(format!(
            "P(O|λ) = {:e} underflowed over {chain_len} steps (log-likelihood {:.6}); use scaled forward-backward",
            fb.likelihood, fb.log_likelihood
        )));
    }
    if fb.is_degenerate() || fb.gamma_norm() == 0.0 {
        return Err(HmmError::DegenerateSequence(
            "observation sequence has zero probability under the current parameters".into(),
        ));
    }

    let gamma_norm = fb.gamma_norm();
    let gamma: Vec<Vec<f64>> = (0..chain_len)
        .into_par_iter()
        .map(|t| {
            (0..n_states)
                .map(|i| fb.alpha[t][i] * fb.beta[t][i] / gamma_norm)
                .collect::<Vec<f64>>()
        })
        .collect();

    // NB empty for T = 1.
    let xi: Vec<Vec<f64>> = (0..chain_len - 1)
        .into_par_iter()
        .map(|t| {
            let norm = fb.xi_norm(t);
            let o_next = obs[t + 1];
            let mut slice = vec![0.0; n_states * n_states];

            for i in 0..n_states {
                for j in 0..n_states {
                    slice[i * n_states + j] = fb.alpha[t][i]
                        * hmm.trans(i, j)
                        * hmm.emit(j, o_next)
                        * fb.beta[t + 1][j]
                        / norm;
                }
            }
            slice
        })
        .collect();

    if let Some(t) = gamma.iter().position(|row| row.iter().any(|g| !g.is_finite())) {
        return Err(HmmError::NumericInstability(format!("non-finite γ at t={t}")));
    }
    if let Some(t) = xi.iter().position(|row| row.iter().any(|x| !x.is_finite())) {
        return Err(HmmError::NumericInstability(format!("non-finite ξ at t={t}")));
    }

    Ok(Responsibilities { gamma, xi, n_states })
}

impl Hmm {
    /// Posterior state marginals γ, computed with per-step scaling.
    pub fn marginals(&self, obs: &[usize]) -> Result<Vec<Vec<f64>>> {
        let fb = self.forward_backward(obs, Scaling::PerStep)?;
        let resp = expectation(self, obs, &fb)?;
        Ok(resp.gamma)
    }
}
