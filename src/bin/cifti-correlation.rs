//! Command-line front end.
//!
//! Long options may be given with one dash (`-fisher-z`) or two (`--fisher-z`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use cifti_correlation::io::{read_float_list, read_surface_roi, read_volume_roi, DenseFile, DenseFileWriter};
use cifti_correlation::{CiftiError, CorrelationOptions, RoiMasks, RowMatrix, VertexAreas};

#[derive(Parser, Debug)]
#[command(name = "cifti-correlation", version, about = "Correlation of brainordinate-mapped matrix rows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Correlate each row (or each row inside an roi) to all rows
    ///
    /// Restricting memory makes the output computed in chunks. If the input
    /// takes more than 70% of the limit, rows are also read as needed, once
    /// per chunk. A limit of 0 computes a single output row at a time.
    Correlation(CorrelationArgs),

    /// Correlate every row with the average row of each ROI map, Fisher-z
    /// transform, and average across inputs
    AverageRoiCorrelation(AverageArgs),
}

#[derive(Args, Debug, Default)]
struct RoiArgs {
    /// Left hemisphere surface roi (one value per vertex and map)
    #[arg(long = "left-roi", value_name = "ROI")]
    left: Option<PathBuf>,

    /// Right hemisphere surface roi
    #[arg(long = "right-roi", value_name = "ROI")]
    right: Option<PathBuf>,

    /// Cerebellum surface roi
    #[arg(long = "cerebellum-roi", alias = "cereb-roi", value_name = "ROI")]
    cerebellum: Option<PathBuf>,

    /// Volume roi (NIfTI)
    #[arg(long = "vol-roi", value_name = "ROI")]
    volume: Option<PathBuf>,

    /// Dense matrix file holding combined rois; excludes the other roi options
    #[arg(long = "cifti-roi", value_name = "ROI")]
    cifti: Option<PathBuf>,
}

impl RoiArgs {
    fn any_per_structure(&self) -> bool {
        self.left.is_some() || self.right.is_some() || self.cerebellum.is_some() || self.volume.is_some()
    }

    fn any(&self) -> bool {
        self.any_per_structure() || self.cifti.is_some()
    }
}

#[derive(Args, Debug)]
struct CorrelationArgs {
    /// Input dense matrix file
    input: PathBuf,

    /// Output dense matrix file
    output: PathBuf,

    /// Correlate only the rows inside the given rois to all rows
    #[arg(long)]
    roi_override: bool,

    #[command(flatten)]
    rois: RoiArgs,

    /// Text file containing one weight per column
    #[arg(long, value_name = "FILE")]
    weights: Option<PathBuf>,

    /// Apply the Fisher small z transform (artanh) to correlations
    #[arg(long)]
    fisher_z: bool,

    /// Dot product of rows normalized by the diagonal instead of correlation
    #[arg(long)]
    no_demean: bool,

    /// Compute covariance instead of correlation
    #[arg(long)]
    covariance: bool,

    /// Memory limit in gigabytes
    #[arg(long, value_name = "GB", allow_negative_numbers = true)]
    mem_limit: Option<f64>,
}

#[derive(Args, Debug)]
struct AverageArgs {
    /// Output dense matrix file
    output: PathBuf,

    /// Input dense matrix file (repeatable)
    #[arg(long = "cifti", value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    rois: RoiArgs,

    /// Per-vertex areas for the left roi
    #[arg(long, value_name = "FILE")]
    left_areas: Option<PathBuf>,

    /// Per-vertex areas for the right roi
    #[arg(long, value_name = "FILE")]
    right_areas: Option<PathBuf>,

    /// Per-vertex areas for the cerebellum roi
    #[arg(long, alias = "cereb-areas", value_name = "FILE")]
    cerebellum_areas: Option<PathBuf>,
}

/// Rewrite single-dash long options (`-fisher-z`) to clap's `--fisher-z`.
/// Negative numbers and short flags pass through unchanged.
fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            let bytes = arg.as_bytes();
            if bytes.len() > 2 && bytes[0] == b'-' && bytes[1].is_ascii_alphabetic() {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

fn load_rois(args: &RoiArgs) -> Result<RoiMasks> {
    if let Some(path) = &args.cifti {
        if args.any_per_structure() {
            return Err(CiftiError::ConflictingRoiOptions(
                "-cifti-roi cannot be specified with any other -*-roi option".to_string(),
            )
            .into());
        }
        let dense = DenseFile::open(path).with_context(|| format!("reading roi {}", path.display()))?;
        return Ok(RoiMasks::from_dense(&dense)?);
    }

    let surface = |path: &Option<PathBuf>| -> Result<_> {
        path.as_ref()
            .map(|p| read_surface_roi(p).with_context(|| format!("reading roi {}", p.display())))
            .transpose()
    };
    Ok(RoiMasks {
        left: surface(&args.left)?,
        right: surface(&args.right)?,
        cerebellum: surface(&args.cerebellum)?,
        volume: args
            .volume
            .as_ref()
            .map(|p| read_volume_roi(p).with_context(|| format!("reading roi {}", p.display())))
            .transpose()?,
    })
}

fn read_areas(path: &Option<PathBuf>) -> Result<Option<Vec<f32>>> {
    path.as_ref()
        .map(|p| read_float_list(p).with_context(|| format!("reading areas {}", p.display())))
        .transpose()
}

fn run_correlation(args: &CorrelationArgs) -> Result<()> {
    let mut options = CorrelationOptions::new()
        .with_fisher_z(args.fisher_z)
        .with_demean(!args.no_demean)
        .with_covariance(args.covariance);
    if let Some(limit) = args.mem_limit {
        options = options.with_mem_limit_gb(limit);
    }
    options.validate()?;
    if let Some(path) = &args.weights {
        let weights = read_float_list(path).with_context(|| format!("reading weights {}", path.display()))?;
        options = options.with_weights(weights);
    }

    let rois = if args.roi_override {
        if !args.rois.any() {
            return Err(CiftiError::ConflictingRoiOptions("-roi-override requires a -*-roi suboption".to_string()).into());
        }
        Some(load_rois(&args.rois)?)
    } else {
        if args.rois.any() {
            return Err(CiftiError::ConflictingRoiOptions("-*-roi options require -roi-override".to_string()).into());
        }
        None
    };

    let input = DenseFile::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?;
    let mut writer = DenseFileWriter::create(&args.output)?;
    match &rois {
        Some(rois) => cifti_correlation::correlate_roi(&input, rois, &mut writer, &options)?,
        None => cifti_correlation::correlate_all(&input, &mut writer, &options)?,
    };
    writer.finish().with_context(|| format!("writing {}", args.output.display()))?;
    info!("wrote {}", args.output.display());
    Ok(())
}

fn run_average(args: &AverageArgs) -> Result<()> {
    let rois = load_rois(&args.rois)?;
    let areas = VertexAreas {
        left: read_areas(&args.left_areas)?,
        right: read_areas(&args.right_areas)?,
        cerebellum: read_areas(&args.cerebellum_areas)?,
    };
    let files = args
        .inputs
        .iter()
        .map(|p| DenseFile::open(p).with_context(|| format!("opening {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let inputs: Vec<&dyn RowMatrix> = files.iter().map(|f| f as &dyn RowMatrix).collect();

    let mut writer = DenseFileWriter::create(&args.output)?;
    cifti_correlation::average_roi_correlation(&inputs, &rois, &areas, &mut writer)?;
    writer.finish().with_context(|| format!("writing {}", args.output.display()))?;
    info!("wrote {}", args.output.display());
    Ok(())
}

fn output_path(command: &Command) -> &Path {
    match command {
        Command::Correlation(args) => &args.output,
        Command::AverageRoiCorrelation(args) => &args.output,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args()));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_writer(std::io::stderr).with_env_filter(filter).with_target(false).init();

    let result = match &cli.command {
        Command::Correlation(args) => run_correlation(args),
        Command::AverageRoiCorrelation(args) => run_average(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            error!("no output written to {}", output_path(&cli.command).display());
            ExitCode::FAILURE
        }
    }
}
