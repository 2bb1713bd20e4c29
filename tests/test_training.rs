use baumwelch::{
    Alphabet, HmmError, Hmm, Model, Scaling, Trainer, TrainingConfig, TrainingRun, TrainingState,
    ZeroDenominatorPolicy, expectation, maximize, train,
};
use rand::prelude::*;
use rand::rngs::StdRng;

fn scenario_b_hmm() -> Hmm {
    Hmm::from_tables(
        vec![0.6, 0.4],
        &[vec![0.7, 0.3], vec![0.4, 0.6]],
        &[vec![0.9, 0.1], vec![0.2, 0.8]],
    )
    .unwrap()
}

#[test]
fn test_scenario_a_single_observation() {
    let mut rng = StdRng::seed_from_u64(1);
    let model = Model::init(&["S0", "S1"], &["a", "b"], &mut rng).unwrap();
    let obs = model.encode(&["a"]).unwrap();
    let hmm = &model.hmm;

    let fb = hmm.forward_backward(&obs, Scaling::Unscaled).unwrap();
    let pi = hmm.initial();

    for j in 0..2 {
        assert_eq!(fb.alpha[0][j], pi[j] * hmm.emission().get(j, 0));
    }
    assert_eq!(fb.beta[0], vec![1.0, 1.0]);

    let resp = expectation(hmm, &obs, &fb).unwrap();
    let norm: f64 = fb.alpha[0].iter().sum();
    for j in 0..2 {
        assert!((resp.gamma[0][j] - fb.alpha[0][j] / norm).abs() < 1e-12);
    }
    assert!(resp.xi.is_empty());
}

#[test]
fn test_scenario_b_brute_force_likelihood() {
    let hmm = scenario_b_hmm();
    let obs = [0, 1, 0];
    let pi = [0.6, 0.4];
    let a = [[0.7, 0.3], [0.4, 0.6]];
    let b = [[0.9, 0.1], [0.2, 0.8]];

    // NB 2^3 = 8 paths.
    let mut exact = 0.0;
    for s0 in 0..2 {
        for s1 in 0..2 {
            for s2 in 0..2 {
                exact += pi[s0] * b[s0][obs[0]] * a[s0][s1] * b[s1][obs[1]] * a[s1][s2] * b[s2][obs[2]];
            }
        }
    }

    let (_, likelihood) = hmm.forward(&obs).unwrap();
    assert!((likelihood - exact).abs() < 1e-9);

    let fb = hmm.forward_backward(&obs, Scaling::Unscaled).unwrap();
    for p in fb.consistency() {
        assert!((p - exact).abs() < 1e-9);
    }
}

#[test]
fn test_scenario_c_zero_emission_is_degenerate() {
    // NB only state 1 emits symbol 1, and state 1 has zero mass at t = 0.
    let hmm = Hmm::from_tables(
        vec![1.0, 0.0],
        &[vec![0.5, 0.5], vec![0.5, 0.5]],
        &[vec![1.0, 0.0], vec![0.0, 1.0]],
    )
    .unwrap();
    let obs = [1, 0];

    let fb = hmm.forward_backward(&obs, Scaling::Unscaled).unwrap();
    assert_eq!(fb.likelihood, 0.0);
    assert!(matches!(
        expectation(&hmm, &obs, &fb),
        Err(HmmError::DegenerateSequence(_))
    ));

    let model = Model::unlabelled(hmm).unwrap();
    let failure = TrainingRun::new(model, obs.to_vec(), TrainingConfig::new(3))
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(failure.error, HmmError::DegenerateSequence(_)));
    assert_eq!(failure.iteration, 1);
}

#[test]
fn test_scenario_d_unknown_symbol() {
    let failure = train(&["Bull", "Bear"], &["Up", "Down"], &["Up", "Sideways", "Down"], 5)
        .unwrap_err();

    assert_eq!(failure.error, HmmError::UnknownSymbol("Sideways".into()));
    assert_eq!(failure.iteration, 0);
    assert!(failure.partial.is_none());
}

#[test]
fn test_invalid_dimensions() {
    let empty: [&str; 0] = [];

    let failure = train(&empty, &["Up"], &["Up"], 3).unwrap_err();
    assert!(matches!(failure.error, HmmError::InvalidInput(_)));

    let failure = train(&["Bull"], &empty, &empty, 3).unwrap_err();
    assert!(matches!(failure.error, HmmError::InvalidInput(_)));

    let failure = train(&["Bull"], &["Up"], &empty, 3).unwrap_err();
    assert!(matches!(failure.error, HmmError::InvalidInput(_)));

    let failure = train(&["Bull"], &["Up"], &["Up"], 0).unwrap_err();
    assert!(matches!(failure.error, HmmError::InvalidInput(_)));
}

#[test]
fn test_single_state_collapses() {
    let result = Trainer::new(TrainingConfig::new(4).with_seed(3))
        .train(&["Only"], &["x", "y", "z"], &["x", "y", "y", "z", "x", "x"])
        .unwrap();

    assert_eq!(result.transition().n_rows(), 1);
    assert!((result.transition().get(0, 0) - 1.0).abs() < 1e-12);
    assert!((result.initial()[0] - 1.0).abs() < 1e-12);

    for snapshot in &result.snapshots {
        for row in &snapshot.gamma {
            assert!((row[0] - 1.0).abs() < 1e-12);
        }
    }

    // NB a single state reproduces the empirical symbol frequencies.
    let b = result.emission().row(0);
    assert!((b[0] - 0.5).abs() < 1e-12);
    assert!((b[1] - 2.0 / 6.0).abs() < 1e-12);
    assert!((b[2] - 1.0 / 6.0).abs() < 1e-12);
}

#[test]
fn test_default_run_matches_shapes() {
    let states = ["Bull", "Bear"];
    let symbols = ["Up", "Down"];
    let obs = ["Up", "Up", "Down", "Up", "Down"];

    let result = train(&states, &symbols, &obs, 15).unwrap();

    assert_eq!(result.iterations(), 15);
    assert_eq!(result.log_likelihood_trace.len(), 15);
    assert_eq!(result.snapshots.len(), 15);
    assert_eq!(result.model.states.labels(), &states);

    for (k, snapshot) in result.snapshots.iter().enumerate() {
        assert_eq!(snapshot.iteration, k + 1);
        assert_eq!(snapshot.alpha.len(), obs.len());
        assert_eq!(snapshot.beta.len(), obs.len());
        assert_eq!(snapshot.gamma.len(), obs.len());
        assert_eq!(snapshot.likelihood, result.likelihood_trace[k]);
    }

    assert!(result.model.hmm.is_stochastic(1e-9));
    for w in result.likelihood_trace.windows(2) {
        assert!(w[1] >= w[0] - 1e-12);
    }
    assert!(result.final_likelihood().unwrap() <= 1.0);
}

#[test]
fn test_unscaled_underflow_then_scaled_training() {
    let states = ["S0", "S1", "S2"];
    let symbols = ["a", "b", "c"];
    let obs: Vec<&str> = (0..2_000).map(|t| symbols[(t * 7 / 5) % 3]).collect();

    let failure = Trainer::new(TrainingConfig::new(3).with_seed(11))
        .train(&states, &symbols, &obs)
        .unwrap_err();
    assert!(matches!(failure.error, HmmError::NumericInstability(_)));
    assert_eq!(failure.iteration, 1);

    let result = Trainer::new(TrainingConfig::new(3).with_seed(11).with_scaling(Scaling::PerStep))
        .train(&states, &symbols, &obs)
        .unwrap();
    assert!(result.model.hmm.is_stochastic(1e-9));
    assert!(result.log_likelihood_trace.iter().all(|ll| ll.is_finite()));
    for w in result.log_likelihood_trace.windows(2) {
        assert!(w[1] >= w[0] - 1e-9);
    }
}

#[test]
fn test_scaled_and_unscaled_training_agree() {
    let states = ["Bull", "Bear"];
    let symbols = ["Up", "Down"];
    let obs = ["Up", "Up", "Down", "Up", "Down", "Down", "Down", "Up"];

    let plain = Trainer::new(TrainingConfig::new(8).with_seed(5))
        .train(&states, &symbols, &obs)
        .unwrap();
    let scaled = Trainer::new(TrainingConfig::new(8).with_seed(5).with_scaling(Scaling::PerStep))
        .train(&states, &symbols, &obs)
        .unwrap();

    for (a, b) in plain.log_likelihood_trace.iter().zip(&scaled.log_likelihood_trace) {
        assert!((a - b).abs() < 1e-9);
    }
    for (a, b) in plain
        .transition()
        .as_slice()
        .iter()
        .zip(scaled.transition().as_slice())
    {
        assert!((a - b).abs() < 1e-9);
    }
    for (a, b) in plain.emission().as_slice().iter().zip(scaled.emission().as_slice()) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_step_by_step_run() {
    let states = Alphabet::new(&["Bull", "Bear"]).unwrap();
    let symbols = Alphabet::new(&["Up", "Down"]).unwrap();
    let model = Model::with_labels(states, symbols, scenario_b_hmm()).unwrap();
    let obs = model.encode(&["Up", "Down", "Up", "Up"]).unwrap();

    let mut run = TrainingRun::new(model, obs.clone(), TrainingConfig::new(2)).unwrap();
    let before = run.model().hmm.clone();

    assert_eq!(run.step(), TrainingState::Running);

    // NB one step of the driver equals one explicit E/M cycle.
    let fb = before.forward_backward(&obs, Scaling::Unscaled).unwrap();
    let resp = expectation(&before, &obs, &fb).unwrap();
    let expected = maximize(&before, &resp, &obs, ZeroDenominatorPolicy::Fail).unwrap();
    assert_eq!(run.model().hmm, expected);

    assert_eq!(run.step(), TrainingState::Done);
    let result = run.finish().unwrap();
    assert_eq!(result.likelihood_trace[0], fb.likelihood);
}
