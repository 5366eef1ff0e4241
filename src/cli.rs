use clap::Parser;
use chrono::Datelike;
use lazy_static::lazy_static;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use crate::phaser::PhaseConfig;

lazy_static! {
    /// Stores the full version string we plan to use.
    /// # Examples
    /// * `0.3.0-6bb9635-dirty` - while on a dirty branch
    /// * `0.3.0-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));
}

#[derive(Clone, Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about,
    after_help = format!("Copyright (C) 2021-{}     The direct-phase authors
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year()))]
pub struct Settings {
    /// Input candidate support table (csv/tsv, optionally gzipped)
    #[clap(required = true)]
    #[clap(short = 'c')]
    #[clap(long = "candidates")]
    #[clap(value_name = "TABLE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub candidates_filename: PathBuf,

    /// Input read table listing every read per region (csv/tsv, optionally gzipped)
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(value_name = "TABLE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reads_filename: PathBuf,

    /// Output per-region read phase labels (csv/tsv)
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_filename: PathBuf,

    /// Output algorithmic statistics file (optional, csv/tsv)
    #[clap(long = "stats-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub stats_filename: Option<PathBuf>,

    /// Output one merged phase per read across all regions (optional, csv/tsv)
    #[clap(long = "merged-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub merged_filename: Option<PathBuf>,

    /// Output directory for pruned allele graphs in DOT format (debug only)
    #[clap(long = "graph-dir")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(hide = true)]
    pub graph_directory: Option<PathBuf>,

    /// Number of threads to use for phasing
    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Sets a minimum number of shared reads for an edge to survive pruning
    #[clap(long = "min-edge-support")]
    #[clap(value_name = "READS")]
    #[clap(default_value = "1")]
    #[clap(help_heading = Some("Phasing"))]
    pub min_edge_support: u64,

    /// Writes all reads in a failed region as unphased instead of exiting
    #[clap(long = "skip-failed-regions")]
    #[clap(help_heading = Some("Phasing"))]
    pub skip_failed_regions: bool
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
fn check_required_filename(filename: &Path, label: &str) {
    if !filename.exists() {
        error!("{} does not exist: \"{}\"", label, filename.display());
        std::process::exit(exitcode::NOINPUT);
    } else {
        info!("{}: \"{}\"", label, filename.display());
    }
}

impl Settings {
    /// Wrapper function to build the engine configuration from our CLI settings
    pub fn phase_config(&self) -> PhaseConfig {
        PhaseConfig {
            min_edge_support: self.min_edge_support
        }
    }
}

pub fn get_raw_settings() -> Settings {
    Settings::parse()
}

/// Do some additional checks here, we may increase these as we go.
/// Also can modify settings if needed since we're passing it around.
/// # Arguments
/// * `settings` - the raw settings, nothing has been checked other than what clap does for us.
pub fn check_settings(mut settings: Settings) -> Settings {
    //check for any of our required files
    check_required_filename(&settings.candidates_filename, "Candidate file");
    check_required_filename(&settings.reads_filename, "Read file");

    // the same file for two outputs would silently clobber one of them
    let mut output_filenames: Vec<&PathBuf> = vec![&settings.output_filename];
    output_filenames.extend(settings.stats_filename.iter());
    output_filenames.extend(settings.merged_filename.iter());
    for (i, filename) in output_filenames.iter().enumerate() {
        if output_filenames[..i].contains(filename) {
            error!("Output file was specified more than once: \"{}\"", filename.display());
            std::process::exit(exitcode::USAGE);
        }
    }

    if let Some(graph_dir) = settings.graph_directory.as_ref() {
        if graph_dir.exists() && !graph_dir.is_dir() {
            error!("Graph output path exists and is not a directory: \"{}\"", graph_dir.display());
            std::process::exit(exitcode::USAGE);
        }
    }

    // 0 doesn't make sense, so lets just error proof it up to 1
    if settings.threads == 0 {
        settings.threads = 1;
    }
    if settings.min_edge_support == 0 {
        settings.min_edge_support = 1;
    }

    // dump stuff to the logger
    info!("Outputs:");
    info!("\tRead labels: \"{}\"", settings.output_filename.display());
    if let Some(filename) = settings.stats_filename.as_ref() {
        info!("\tStatistics: \"{}\"", filename.display());
    }
    if let Some(filename) = settings.merged_filename.as_ref() {
        info!("\tMerged labels: \"{}\"", filename.display());
    }
    if let Some(graph_dir) = settings.graph_directory.as_ref() {
        info!("\tGraph directory: \"{}\"", graph_dir.display());
    }

    info!("Phasing:");
    info!("\tMinimum edge support: {}", settings.min_edge_support);
    if settings.min_edge_support > 3 {
        warn!("\tA high minimum edge support may collapse most positions in low coverage regions.");
    }
    info!("\tFailed regions: {}", if settings.skip_failed_regions { "SKIPPED" } else { "FATAL" });

    info!("Processing threads: {}", settings.threads);

    // send the settings back
    settings
}
