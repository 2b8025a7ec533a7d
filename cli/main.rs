#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use ndarray::Array1;
use std::path::PathBuf;
use std::process;

use biascan::clusters::{bias_variance, min_cluster_size, most_biased_cluster, next_cluster};
use biascan::config::ScanConfig;
use biascan::data::load_records;
use biascan::scan::{best_cluster, scan_clusters};
use biascan::{Bernoulli, Direction, ScoringFunction};

#[derive(Clone, Copy, ValueEnum)]
pub enum DirectionCli {
    Positive,
    Negative,
    Both,
}

impl From<DirectionCli> for Direction {
    fn from(direction: DirectionCli) -> Self {
        match direction {
            DirectionCli::Positive => Direction::Positive,
            DirectionCli::Negative => Direction::Negative,
            DirectionCli::Both => Direction::Both,
        }
    }
}

#[derive(Args)]
pub struct ScanArgs {
    /// Path to records TSV with outcome,probability,cluster[,error] columns
    pub records: String,

    /// Scan configuration TOML (see `init-config`)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Overrides the configured direction
    #[arg(long, value_enum)]
    pub direction: Option<DirectionCli>,

    /// Overrides the configured penalty
    #[arg(long)]
    pub penalty: Option<f64>,
}

#[derive(Args)]
pub struct QsArgs {
    /// Sum of observed binary outcomes over the subset
    #[arg(long)]
    pub observed_sum: f64,

    /// Comma-separated predicted probabilities, one per record
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub expectations: Vec<f64>,

    #[arg(long, default_value = "0.0")]
    pub penalty: f64,

    #[arg(long, value_enum, default_value_t = DirectionCli::Both)]
    pub direction: DirectionCli,
}

#[derive(Parser)]
#[clap(
    name = "biascan",
    version,
    about = "Subset-scan bias scoring for binary classifiers."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every cluster of a record file and rank them
    #[command(about = "Score and rank clusters (outputs: TSV on stdout)")]
    Scan(ScanArgs),

    /// Compute the anomalous q range for a single subset
    #[command(about = "Compute q_mle, q_min and q_max for one subset")]
    Qs(QsArgs),

    /// Write a default scan configuration
    #[command(about = "Write a default scan configuration (outputs: TOML file)")]
    InitConfig {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Scan(args)) => run_scan(args),
        Some(Commands::Qs(args)) => run_qs(args),
        Some(Commands::InitConfig { path }) => init_config(path),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_scan(args: ScanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    if let Some(direction) = args.direction {
        config.direction = direction.into();
    }
    if let Some(penalty) = args.penalty {
        config.penalty = penalty;
    }
    config.validate()?;

    let records = load_records(&args.records, config.classification_threshold)?;
    let scores = scan_clusters(&records, &config)?;

    println!("cluster\tsize\tobserved\texpected\texists\tq_mle\tq_min\tq_max\tscore");
    for s in &scores {
        println!(
            "{}\t{}\t{}\t{:.4}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
            s.cluster,
            s.size,
            s.observed_sum,
            s.expected_sum,
            s.range.exists,
            s.range.q_mle,
            s.range.q_min,
            s.range.q_max,
            s.score
        );
    }

    match best_cluster(&scores) {
        Some(best) => eprintln!(
            "Most anomalous cluster: {} (score {:.4}, q in [{:.4}, {:.4}])",
            best.cluster, best.score, best.range.q_min, best.range.q_max
        ),
        None => eprintln!(
            "No cluster has a positive-score region in the {} direction.",
            config.direction
        ),
    }

    let errors = records.errors.view();
    let clusters = records.clusters.view();
    if let Some((cluster, bias)) = most_biased_cluster(errors, clusters, config.outliers)? {
        eprintln!("Largest accuracy deficit: cluster {cluster} ({bias:+.4})");
    }
    if let Some(cluster) = next_cluster(errors, clusters, config.outliers)? {
        eprintln!("Highest error variance: cluster {cluster}");
    }
    eprintln!(
        "Accuracy bias variance: {:.6}",
        bias_variance(errors, clusters, config.outliers)?
    );
    if let Some(size) = min_cluster_size(clusters, config.outliers) {
        eprintln!("Smallest cluster size: {size}");
    }

    Ok(())
}

fn run_qs(args: QsArgs) -> Result<(), Box<dyn std::error::Error>> {
    check_qs_args(&args)?;

    let scorer = Bernoulli::new(args.direction.into());
    let expectations = Array1::from_vec(args.expectations);
    let range = scorer.compute_qs(args.observed_sum, expectations.view(), args.penalty)?;

    println!("exists\tq_mle\tq_min\tq_max");
    println!(
        "{}\t{:.6}\t{:.6}\t{:.6}",
        range.exists, range.q_mle, range.q_min, range.q_max
    );
    log::debug!("cache activity: {:?}", scorer.cache_hits());
    Ok(())
}

fn check_qs_args(args: &QsArgs) -> Result<(), String> {
    if args.expectations.iter().any(|p| !(0.0..=1.0).contains(p)) {
        return Err("every expectation must lie in [0, 1]".to_string());
    }
    let records = args.expectations.len() as f64;
    if !(args.observed_sum.is_finite() && (0.0..=records).contains(&args.observed_sum)) {
        return Err(format!(
            "observed sum must be a finite number in [0, {records}], got {}",
            args.observed_sum
        ));
    }
    if !args.penalty.is_finite() || args.penalty < 0.0 {
        return Err(format!("penalty must be non-negative, got {}", args.penalty));
    }
    Ok(())
}

fn init_config(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!("refusing to overwrite existing file '{}'", path.display()).into());
    }
    ScanConfig::default().save(&path)?;
    println!("Wrote default scan configuration to '{}'", path.display());
    Ok(())
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let release_tag = option_env!("BIASCAN_RELEASE_TAG");

    println!("biascan {}", version);

    match release_tag {
        Some(tag) => println!("Release: {}", tag),
        None => println!("Release: development build"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qs_args(observed_sum: f64, penalty: f64) -> QsArgs {
        QsArgs {
            observed_sum,
            expectations: vec![0.5; 4],
            penalty,
            direction: DirectionCli::Both,
        }
    }

    #[test]
    fn qs_arguments_are_checked_before_scoring() {
        assert!(check_qs_args(&qs_args(2.0, 1.0)).is_ok());
        assert!(check_qs_args(&qs_args(4.0, 0.0)).is_ok());

        for observed_sum in [f64::NAN, f64::INFINITY, -1.0, 4.5] {
            let err = check_qs_args(&qs_args(observed_sum, 1.0)).unwrap_err();
            assert!(err.contains("observed sum"), "{observed_sum}: {err}");
        }
        assert!(check_qs_args(&qs_args(2.0, f64::NAN)).is_err());

        let mut out_of_range = qs_args(1.0, 0.0);
        out_of_range.expectations[2] = 1.2;
        assert!(check_qs_args(&out_of_range).is_err());
    }
}
