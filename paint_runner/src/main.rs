// Command line runner for the square engine. Every subcommand is a thin layer
// over the library: load files, apply the config (plus any flag overrides), call
// the pipeline, write files.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info};
use paint_squares::batch_pipeline::{BatchPipeline, discover_jobs};
use paint_squares::core_modules::cell_marking::{
    mark_selected_squares, squares_in_rectangle, visible_squares_in_rectangle,
};
use paint_squares::core_modules::grid_partition::GridPartition;
use paint_squares::core_modules::recording_summary::save_summaries;
use paint_squares::core_modules::utils::image_helper::image_helper;
use paint_squares::core_modules::utils::square_table::{load_squares, save_squares};
use paint_squares::core_modules::utils::track_table::load_tracks;
use paint_squares::{NeighbourMode, PaintConfig, SquarePipeline, select_squares};
use std::io::Write;
use std::path::{Path, PathBuf};

const DEFAULT_MAP_PX: u32 = 800;

#[derive(Parser)]
#[command(name = "paint")]
#[command(
    about = "Square selection and neighbour visibility for PAINT recordings",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file; defaults are used when it does not exist
    #[arg(short, long, global = true, default_value = "paint.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the squares table of one recording from its tracks
    Generate {
        tracks: PathBuf,
        squares: PathBuf,

        /// Concentration of this recording
        #[arg(long)]
        concentration: Option<f64>,
    },

    /// Re-run the selection pass on an existing squares table
    Select {
        squares: PathBuf,

        /// Write here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Free, Strict or Relaxed
        #[arg(short, long)]
        mode: Option<String>,

        #[arg(long)]
        min_density_ratio: Option<f64>,

        #[arg(long)]
        max_variability: Option<f64>,

        /// Only squares whose longest track lies in [MIN, MAX]
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
        duration_window: Option<Vec<f64>>,

        /// Keep squares without a fitted tau
        #[arg(long)]
        allow_invalid_tau: bool,
    },

    /// Assign a cell id to the squares under a rectangle
    Mark {
        squares: PathBuf,

        #[arg(long)]
        cell_id: u8,

        /// Rectangle corners in micrometres
        #[arg(
            long,
            num_args = 4,
            value_names = ["X0", "Y0", "X1", "Y1"],
            allow_negative_numbers = true
        )]
        rect: Vec<f64>,

        /// Only mark squares that are currently visible
        #[arg(long)]
        visible_only: bool,
    },

    /// Render a squares table as a PNG map
    Render {
        squares: PathBuf,
        output: PathBuf,

        #[arg(long, default_value_t = DEFAULT_MAP_PX)]
        size: u32,
    },

    /// Process every *tracks*.csv file in a directory
    Batch {
        dir: PathBuf,

        /// Recordings processed at once (defaults to the number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Experiment summary file (defaults to <dir>/summary.csv)
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Also write a PNG map next to each squares file
        #[arg(long)]
        maps: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let config = PaintConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    match cli.command {
        Commands::Generate {
            tracks,
            squares,
            concentration,
        } => run_generate(config, &tracks, &squares, concentration),
        Commands::Select {
            squares,
            output,
            mode,
            min_density_ratio,
            max_variability,
            duration_window,
            allow_invalid_tau,
        } => {
            let mut config = config;
            let selection = &mut config.selection;
            if let Some(mode) = mode {
                selection.neighbour_mode = mode.parse::<NeighbourMode>()?;
            }
            if let Some(value) = min_density_ratio {
                selection.min_density_ratio = value;
            }
            if let Some(value) = max_variability {
                selection.max_variability = value;
            }
            if let Some(window) = duration_window {
                selection.use_duration_window = true;
                selection.min_track_duration = window[0];
                selection.max_track_duration = window[1];
            }
            if allow_invalid_tau {
                selection.only_valid_tau = false;
            }
            run_select(&config, &squares, output.as_deref().unwrap_or(squares.as_path()))
        }
        Commands::Mark {
            squares,
            cell_id,
            rect,
            visible_only,
        } => run_mark(&squares, cell_id, &rect, visible_only),
        Commands::Render { squares, output, size } => {
            let table = load_squares(&squares)
                .with_context(|| format!("reading {}", squares.display()))?;
            image_helper::save_square_map(&output, &table, size)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("wrote {}", output.display());
            Ok(())
        }
        Commands::Batch {
            dir,
            jobs,
            summary,
            maps,
        } => run_batch(config, &dir, jobs, summary, maps),
    }
}

fn run_generate(
    config: PaintConfig,
    tracks_path: &Path,
    squares_path: &Path,
    concentration: Option<f64>,
) -> Result<()> {
    let tracks = load_tracks(tracks_path)
        .with_context(|| format!("reading {}", tracks_path.display()))?;
    let name = tracks_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let pipeline = SquarePipeline::new(config)?;
    let processed = pipeline.process(&name, &tracks, concentration)?;
    save_squares(squares_path, &processed.table)
        .with_context(|| format!("writing {}", squares_path.display()))?;

    let summary = &processed.summary;
    println!(
        "{}: {} squares, {} valid tau, {} visible, background {:.1}",
        summary.recording_name,
        summary.nr_squares,
        summary.nr_valid_tau,
        summary.nr_visible,
        summary.background
    );
    Ok(())
}

fn run_select(config: &PaintConfig, input: &Path, output: &Path) -> Result<()> {
    config.validate()?;
    let mut table = load_squares(input).with_context(|| format!("reading {}", input.display()))?;
    let outcome = select_squares(&mut table, &config.selection)?;
    save_squares(output, &table).with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{} mode: {} selected, {} visible",
        config.selection.neighbour_mode, outcome.nr_selected, outcome.nr_visible
    );
    Ok(())
}

fn run_mark(path: &Path, cell_id: u8, rect: &[f64], visible_only: bool) -> Result<()> {
    let [x0, y0, x1, y1] = rect else {
        bail!("--rect takes exactly four values");
    };
    let mut table = load_squares(path).with_context(|| format!("reading {}", path.display()))?;
    let partition = GridPartition::new(table.nr_of_squares_in_row)?;
    let square_nrs = if visible_only {
        visible_squares_in_rectangle(&table, &partition, *x0, *y0, *x1, *y1)
    } else {
        squares_in_rectangle(&partition, *x0, *y0, *x1, *y1)
    };
    let changed = mark_selected_squares(&mut table, &square_nrs, cell_id)?;
    save_squares(path, &table).with_context(|| format!("writing {}", path.display()))?;
    println!("cell {cell_id}: {} squares in rectangle, {changed} changed", square_nrs.len());
    Ok(())
}

fn run_batch(
    config: PaintConfig,
    dir: &Path,
    jobs: Option<usize>,
    summary: Option<PathBuf>,
    maps: bool,
) -> Result<()> {
    let recording_jobs = discover_jobs(dir).with_context(|| format!("scanning {}", dir.display()))?;
    if recording_jobs.is_empty() {
        bail!("no *tracks*.csv files in {}", dir.display());
    }

    let mut batch = BatchPipeline::new(SquarePipeline::new(config)?);
    if let Some(jobs) = jobs {
        batch = batch.with_jobs(jobs);
    }
    if maps {
        batch = batch.with_square_maps(DEFAULT_MAP_PX);
    }

    let runtime = tokio::runtime::Runtime::new().context("starting the worker runtime")?;
    let results = runtime.block_on(batch.run(recording_jobs));

    let total = results.len();
    let summaries: Vec<_> = results.into_iter().filter_map(|r| r.ok()).collect();
    let summary_path = summary.unwrap_or_else(|| dir.join("summary.csv"));
    save_summaries(&summary_path, &summaries)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    println!(
        "{} of {total} recordings processed, summary in {}",
        summaries.len(),
        summary_path.display()
    );
    if summaries.len() < total {
        bail!("{} recordings failed", total - summaries.len());
    }
    Ok(())
}
