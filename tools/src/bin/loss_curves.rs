//! Exports the per-rank loss logs of a run as CSV series for plotting.
//!
//! ```bash
//! loss_curves --input-dir out --output-dir out/curves
//! ```
//!
//! Writes `total_loss.csv`, `avg_loss.csv` and `avg_loss_zoomed.csv`, one
//! column per rank, and prints the y-range that fits every average curve.

use anyhow::{Context, Result, bail};
use clap::Parser;
use ddp_rs::telemetry::{DEFAULT_ZOOM_SKIP, LossCurve, avg_loss_range, discover_loss_logs};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "loss_curves")]
#[command(about = "Export per-rank loss curves of a training run as CSV")]
#[command(version)]
struct Args {
    /// Directory containing loss_log_rank_<id>.json or loss_log.json
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Where the CSV files go (defaults to the input directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Leading points left out of the zoomed series
    #[arg(long, default_value_t = DEFAULT_ZOOM_SKIP)]
    zoom_skip: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let logs = discover_loss_logs(&args.input_dir)?;
    if logs.is_empty() {
        bail!("no loss logs found in {}", args.input_dir.display());
    }

    let curves = logs
        .iter()
        .map(|path| LossCurve::load(path).with_context(|| format!("loading {}", path.display())))
        .collect::<Result<Vec<_>>>()?;
    for curve in &curves {
        info!(rank = ?curve.rank, points = curve.len(), "loaded loss curve");
    }

    let out = args.output_dir.unwrap_or_else(|| args.input_dir.clone());
    std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;

    let zoomed: Vec<LossCurve> = curves.iter().map(|c| c.zoomed(args.zoom_skip)).collect();
    write_series(&out.join("total_loss.csv"), &curves, |c| &c.total_losses)?;
    write_series(&out.join("avg_loss.csv"), &curves, |c| &c.avg_losses)?;
    write_series(&out.join("avg_loss_zoomed.csv"), &zoomed, |c| &c.avg_losses)?;

    match avg_loss_range(&curves) {
        Some((lo, hi)) => println!("avg_loss range: [{lo:.6}, {hi:.6}]"),
        None => println!("avg_loss range: (no data)"),
    }
    if let Some((lo, hi)) = avg_loss_range(&zoomed) {
        println!("avg_loss range after skipping {}: [{lo:.6}, {hi:.6}]", args.zoom_skip);
    }
    println!("wrote CSV files to {}", out.display());
    Ok(())
}

fn column_name(curve: &LossCurve) -> String {
    match curve.rank {
        Some(rank) => format!("rank_{rank}"),
        None => "loss".to_string(),
    }
}

/// One row per index: `index,step,<curve 0>,<curve 1>,...`. The step column
/// comes from the first curve; shorter curves leave their cells empty.
fn write_series<F>(path: &Path, curves: &[LossCurve], series: F) -> Result<()>
where
    F: Fn(&LossCurve) -> &Vec<f64>,
{
    let mut csv = String::from("index,step");
    for curve in curves {
        csv.push(',');
        csv.push_str(&column_name(curve));
    }
    csv.push('\n');

    let rows = curves.iter().map(LossCurve::len).max().unwrap_or(0);
    for i in 0..rows {
        let step = curves
            .iter()
            .find_map(|c| c.steps.get(i))
            .map_or_else(String::new, |s| s.to_string());
        write!(csv, "{i},{step}")?;
        for curve in curves {
            match series(curve).get(i) {
                Some(v) => write!(csv, ",{v}")?,
                None => csv.push(','),
            }
        }
        csv.push('\n');
    }

    std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), rows, "wrote series");
    Ok(())
}
