use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use baumwelch::{
    Scaling, StochasticMatrix, Trainer, TrainingConfig, TrainingResult, ZeroDenominatorPolicy,
};

/// Fit a discrete HMM to one observation sequence with Baum-Welch.
#[derive(Debug, Parser)]
#[command(name = "baumwelch", version)]
struct Args {
    /// Hidden state labels, whitespace separated.
    #[arg(long, default_value = "Bull Bear")]
    states: String,

    /// Observable symbol labels, whitespace separated.
    #[arg(long, default_value = "Up Down")]
    symbols: String,

    /// Observation sequence, whitespace separated symbol labels.
    #[arg(long, default_value = "Up Up Down Up Down")]
    sequence: String,

    /// Number of Baum-Welch iterations.
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u32).range(1..))]
    iterations: u32,

    /// Seed for the random initial parameters.
    #[arg(long)]
    seed: Option<u64>,

    /// Normalize forward/backward tables per step (log-space likelihood).
    #[arg(long)]
    scaled: bool,

    /// Keep the previous row when a state receives no posterior mass.
    #[arg(long)]
    keep_degenerate_rows: bool,

    /// Print the alpha, beta and gamma tables of every iteration.
    #[arg(long)]
    show_iterations: bool,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    let states: Vec<&str> = args.states.split_whitespace().collect();
    let symbols: Vec<&str> = args.symbols.split_whitespace().collect();
    let sequence: Vec<&str> = args.sequence.split_whitespace().collect();

    let mut config = TrainingConfig::new(args.iterations as usize);
    if args.scaled {
        config = config.with_scaling(Scaling::PerStep);
    }
    if args.keep_degenerate_rows {
        config = config.with_zero_denominator(ZeroDenominatorPolicy::KeepRow);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    info!("Welcome to baumwelch.");

    match Trainer::new(config).train(&states, &symbols, &sequence) {
        Ok(result) => {
            report(&result, args.show_iterations);
            info!("Done.");
            ExitCode::SUCCESS
        }
        Err(failure) => {
            error!("{failure}");
            if let Some(partial) = &failure.partial {
                if !partial.likelihood_trace.is_empty() {
                    println!("Partial history before failure:\n");
                    report(partial, args.show_iterations);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn report(result: &TrainingResult, show_iterations: bool) {
    let states = result.model.states.labels();
    let symbols = result.model.symbols.labels();

    if show_iterations {
        for snapshot in &result.snapshots {
            println!("Iteration {}", snapshot.iteration);
            print_table("Forward variable (alpha)", &[], states, &snapshot.alpha);
            print_table("Backward variable (beta)", &[], states, &snapshot.beta);
            print_table("State responsibility (gamma)", &[], states, &snapshot.gamma);
        }
    }

    println!("Final parameters");
    print_table("Initial probabilities (pi)", &[], states, &[result.initial().to_vec()]);
    print_matrix("Transition matrix (A)", states, states, result.transition());
    print_matrix("Emission matrix (B)", states, symbols, result.emission());

    println!("Likelihood trace");
    println!("{:>9} {:>16} {:>16}", "iteration", "P(O|λ)", "1 - P(O|λ)");
    for (k, p) in result.likelihood_trace.iter().enumerate() {
        println!("{:>9} {:>16.8} {:>16.8}", k + 1, p, 1.0 - p);
    }

    if let (Some(last), Some(delta)) = (result.final_likelihood(), result.likelihood_delta()) {
        println!("\nFinal P(O|λ) = {last:.8} (delta {delta:+.8})");
    }
}

fn print_matrix(title: &str, rows: &[String], cols: &[String], matrix: &StochasticMatrix) {
    print_table(title, rows, cols, &matrix.as_rows());
}

fn print_table(title: &str, rows: &[String], cols: &[String], data: &[Vec<f64>]) {
    println!("{title}");

    let width = cols.iter().map(String::len).max().unwrap_or(0).max(12);
    let label_width = rows.iter().map(String::len).max().unwrap_or(0).max(3);

    print!("{:label_width$}", "");
    for c in cols {
        print!(" {c:>width$}");
    }
    println!();

    for (t, row) in data.iter().enumerate() {
        let label = rows.get(t).cloned().unwrap_or_else(|| t.to_string());
        print!("{label:label_width$}");
        for v in row {
            print!(" {v:>width$.8}");
        }
        println!();
    }
    println!();
}
