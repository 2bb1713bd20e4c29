//! Baum-Welch (expectation-maximization) estimation of discrete-output hidden
//! Markov models from a single observation sequence.
//!
//! ```
//! use baumwelch::train::{Trainer, TrainingConfig};
//!
//! let trainer = Trainer::new(TrainingConfig::new(15).with_seed(7));
//! let result = trainer
//!     .train(&["Bull", "Bear"], &["Up", "Down"], &["Up", "Up", "Down", "Up", "Down"])
//!     .unwrap();
//!
//! assert_eq!(result.likelihood_trace.len(), 15);
//! assert!(result.model.hmm.is_stochastic(1e-9));
//! ```

// NB declare the public modules.
pub mod alphabet;
pub mod error;
pub mod expectation;
pub mod forward_backward;
pub mod hmm;
pub mod maximization;
pub mod stochastic;
pub mod train;

pub use alphabet::Alphabet;
pub use error::{HmmError, Result};
pub use expectation::{Responsibilities, expectation};
pub use forward_backward::{ForwardBackward, Scaling};
pub use hmm::{Hmm, Model};
pub use maximization::{ZeroDenominatorPolicy, maximize};
pub use stochastic::StochasticMatrix;
pub use train::{
    IterationSnapshot, Trainer, TrainingConfig, TrainingFailure, TrainingResult, TrainingRun,
    TrainingState, train,
};
