//! Forward and backward recursions over a single observation sequence.
//!
//! By default the tables are the plain, unnormalized α and β, so that
//! α[t][j] is the joint probability of `obs[0..=t]` and state `j` at `t`.
//! Long sequences underflow in this mode; [`Scaling::PerStep`] renormalizes
//! every time slice and carries the likelihood in log space instead.

use log::warn;

use crate::error::Result;
use crate::hmm::Hmm;

/// How the forward and backward tables are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scaling {
    /// Unnormalized α and β; P(O|λ) = Σ_j α[T-1][j].
    #[default]
    Unscaled,
    /// Each α slice divided by c_t = Σ_j α̂[t][j] and each β slice by c_{t+1};
    /// log P(O|λ) = Σ_t ln c_t.
    PerStep,
}

/// Output of one forward-backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardBackward {
    pub alpha: Vec<Vec<f64>>,
    pub beta: Vec<Vec<f64>>,
    /// P(O|λ). In scaled mode this is `exp(log_likelihood)` and may round to zero.
    pub likelihood: f64,
    pub log_likelihood: f64,
    /// Per-step normalizers c_t, present only in scaled mode.
    pub scales: Option<Vec<f64>>,
    /// Set when the unscaled likelihood lost all precision although the
    /// sequence has nonzero probability.
    pub underflow: bool,
}

impl ForwardBackward {
    pub fn chain_len(&self) -> usize {
        self.alpha.len()
    }

    pub fn scaling(&self) -> Scaling {
        match self.scales {
            Some(_) => Scaling::PerStep,
            None => Scaling::Unscaled,
        }
    }

    /// True when the observation sequence is impossible under the parameters.
    pub fn is_degenerate(&self) -> bool {
        self.log_likelihood == f64::NEG_INFINITY
    }

    /// Σ_i α[t][i]·β[t][i] for every t.
    ///
    /// Every entry equals P(O|λ) in unscaled mode and 1 in scaled mode.
    pub fn consistency(&self) -> Vec<f64> {
        self.alpha
            .iter()
            .zip(&self.beta)
            .map(|(a, b)| a.iter().zip(b).map(|(x, y)| x * y).sum())
            .collect()
    }

    /// Divisor turning α[t][i]·β[t][i] into γ[t][i].
    pub(crate) fn gamma_norm(&self) -> f64 {
        match self.scales {
            Some(_) => 1.0,
            None => self.likelihood,
        }
    }

    /// Divisor turning α[t][i]·A[i][j]·B[j][o_{t+1}]·β[t+1][j] into ξ[t][i][j].
    pub(crate) fn xi_norm(&self, t: usize) -> f64 {
        match &self.scales {
            Some(c) => c[t + 1],
            None => self.likelihood,
        }
    }
}

impl Hmm {
    /// Unscaled forward pass, returning `(alpha, likelihood)`.
    pub fn forward(&self, obs: &[usize]) -> Result<(Vec<Vec<f64>>, f64)> {
        self.validate_observations(obs)?;

        let alpha = self.forward_unscaled(obs);
        let likelihood = alpha[obs.len() - 1].iter().sum();

        Ok((alpha, likelihood))
    }

    /// Unscaled backward pass.
    pub fn backward(&self, obs: &[usize]) -> Result<Vec<Vec<f64>>> {
        self.validate_observations(obs)?;
        Ok(self.backward_unscaled(obs))
    }

    /// P(O|λ) from the unscaled forward pass.
    pub fn likelihood(&self, obs: &[usize]) -> Result<f64> {
        let (_, likelihood) = self.forward(obs)?;
        Ok(likelihood)
    }

    /// log P(O|λ) from the scaled forward pass; finite wherever the sequence is possible.
    pub fn log_likelihood(&self, obs: &[usize]) -> Result<f64> {
        self.validate_observations(obs)?;

        let (_, scales) = self.forward_scaled(obs);
        Ok(log_likelihood_from_scales(&scales))
    }

    /// Full forward-backward pass: α, β and the likelihood.
    pub fn forward_backward(&self, obs: &[usize], scaling: Scaling) -> Result<ForwardBackward> {
        self.validate_observations(obs)?;

        match scaling {
            Scaling::Unscaled => {
                let alpha = self.forward_unscaled(obs);
                let beta = self.backward_unscaled(obs);
                let likelihood: f64 = alpha[obs.len() - 1].iter().sum();

                let mut underflow = false;
                let log_likelihood = if likelihood.is_normal() {
                    likelihood.ln()
                } else {
                    // NB zero or subnormal: re-derive in scaled form to tell underflow from impossibility.
                    let (_, scales) = self.forward_scaled(obs);
                    let ll = log_likelihood_from_scales(&scales);

                    if ll.is_finite() {
                        underflow = true;
                        warn!(
                            "unscaled likelihood {likelihood:e} underflowed (log-likelihood {ll:.6}, T={})",
                            obs.len()
                        );
                    }
                    ll
                };

                Ok(ForwardBackward {
                    alpha,
                    beta,
                    likelihood,
                    log_likelihood,
                    scales: None,
                    underflow,
                })
            }
            Scaling::PerStep => {
                let (alpha, scales) = self.forward_scaled(obs);
                let beta = self.backward_scaled(obs, &scales);
                let log_likelihood = log_likelihood_from_scales(&scales);

                Ok(ForwardBackward {
                    alpha,
                    beta,
                    likelihood: log_likelihood.exp(),
                    log_likelihood,
                    scales: Some(scales),
                    underflow: false,
                })
            }
        }
    }

    fn forward_unscaled(&self, obs: &[usize]) -> Vec<Vec<f64>> {
        let n_states = self.n_states();
        let chain_len = obs.len();
        let mut alpha = vec![vec![0.0; n_states]; chain_len];

        // Init alpha
        for j in 0..n_states {
            alpha[0][j] = self.prior(j) * self.emit(j, obs[0]);
        }

        // Recursion
        for t in 1..chain_len {
            for j in 0..n_states {
                let mut p = 0.0;
                for i in 0..n_states {
                    p += alpha[t - 1][i] * self.trans(i, j);
                }
                alpha[t][j] = p * self.emit(j, obs[t]);
            }
        }
        alpha
    }

    fn backward_unscaled(&self, obs: &[usize]) -> Vec<Vec<f64>> {
        let n_states = self.n_states();
        let chain_len = obs.len();
        let mut beta = vec![vec![0.0; n_states]; chain_len];

        // Init beta
        beta[chain_len - 1].fill(1.0);

        // Recursion
        for t in (0..chain_len - 1).rev() {
            for i in 0..n_states {
                let mut sum = 0.0;
                for j in 0..n_states {
                    sum += self.trans(i, j) * self.emit(j, obs[t + 1]) * beta[t + 1][j];
                }
                beta[t][i] = sum;
            }
        }
        beta
    }

    /// Normalized α̂ and the normalizers c_t. A zero slice (impossible
    /// prefix) is left at zero with c_t = 0.
    fn forward_scaled(&self, obs: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let n_states = self.n_states();
        let chain_len = obs.len();
        let mut alpha = vec![vec![0.0; n_states]; chain_len];
        let mut scales = vec![0.0; chain_len];

        for j in 0..n_states {
            alpha[0][j] = self.prior(j) * self.emit(j, obs[0]);
        }
        scales[0] = normalize(&mut alpha[0]);

        for t in 1..chain_len {
            for j in 0..n_states {
                let mut p = 0.0;
                for i in 0..n_states {
                    p += alpha[t - 1][i] * self.trans(i, j);
                }
                alpha[t][j] = p * self.emit(j, obs[t]);
            }
            scales[t] = normalize(&mut alpha[t]);
        }
        (alpha, scales)
    }

    /// β̂ sharing the forward normalizers, so that α̂[t]·β̂[t] = γ[t].
    fn backward_scaled(&self, obs: &[usize], scales: &[f64]) -> Vec<Vec<f64>> {
        let n_states = self.n_states();
        let chain_len = obs.len();
        let mut beta = vec![vec![0.0; n_states]; chain_len];

        beta[chain_len - 1].fill(1.0);

        for t in (0..chain_len - 1).rev() {
            let c = scales[t + 1];
            if c == 0.0 {
                continue;
            }
            for i in 0..n_states {
                let mut sum = 0.0;
                for j in 0..n_states {
                    sum += self.trans(i, j) * self.emit(j, obs[t + 1]) * beta[t + 1][j];
                }
                beta[t][i] = sum / c;
            }
        }
        beta
    }
}

/// Divides `slice` by its sum in place and returns the sum; a zero slice is left untouched.
fn normalize(slice: &mut [f64]) -> f64 {
    let sum: f64 = slice.iter().sum();
    if sum > 0.0 {
        for v in slice.iter_mut() {
            *v /= sum;
        }
    }
    sum
}

fn log_likelihood_from_scales(scales: &[f64]) -> f64 {
    scales.iter().map(|c| c.ln()).sum()
}
