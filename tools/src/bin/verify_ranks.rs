//! Cross-rank evaluation consistency check.
//!
//! Reads `<input-dir>/rank_<id>/eval_results_<pass>.txt` from every rank of a
//! finished run and reports, per pass and metric, whether the ranks agree.
//!
//! ```bash
//! verify_ranks --input-dir ./output
//! verify_ranks --input-dir ./output --tolerance 1e-4 --strict
//! ```
//!
//! Exits 0 after printing the report unless `--strict` is given and some
//! metric is INCONSISTENT.

use anyhow::{Context, Result, bail};
use clap::Parser;
use ddp_rs::eval::{ConsistencyVerifier, DEFAULT_TOLERANCE};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "verify_ranks")]
#[command(about = "Compare per-rank evaluation results of a data-parallel run")]
#[command(version)]
struct Args {
    /// Directory holding the rank_<id> result directories
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Largest spread (exclusive) still treated as agreement
    #[arg(short, long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Exit non-zero when any metric is inconsistent
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    if !(args.tolerance.is_finite() && args.tolerance > 0.0) {
        bail!("--tolerance must be a positive number, got {}", args.tolerance);
    }

    let report = ConsistencyVerifier::new(&args.input_dir)
        .with_tolerance(args.tolerance)
        .run()
        .with_context(|| format!("verifying {}", args.input_dir.display()))?;
    print!("{report}");

    let inconsistent = report.inconsistent_count();
    if args.strict && inconsistent > 0 {
        bail!("{inconsistent} metric(s) differ across ranks");
    }
    Ok(())
}
