use direct_phase::cli::{Settings, check_settings, get_raw_settings};
use direct_phase::data_types::candidates::Region;
use direct_phase::phase_merger::{PhaseMerger, write_merged_reads};
use direct_phase::phaser::{PhaseConfig, RegionResult, create_unphased_result, solve_region};
use direct_phase::region_parsing::load_regions;
use direct_phase::writers::phase_label_writer::PhaseLabelWriter;
use direct_phase::writers::phase_stats::{CandidateStats, StatsWriter};

use log::{LevelFilter, debug, error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Instant;
use threadpool::ThreadPool;

/// Running totals that get reported at the end
#[derive(Default)]
struct RunTotals {
    candidate_stats: CandidateStats,
    num_reads: u64,
    phased_reads: u64,
    failed_regions: u64
}

fn main() {
    // get the settings
    let settings: Settings = get_raw_settings();
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // immediately setup logging first
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    // okay, now we can check all the other settings
    let cli_settings: Settings = check_settings(settings);
    let phase_config: PhaseConfig = cli_settings.phase_config();

    // load everything up front, regions are small relative to the inputs
    let regions: Vec<Region> = match load_regions(&cli_settings.candidates_filename, &cli_settings.reads_filename) {
        Ok(r) => r,
        Err(e) => {
            error!("Error while loading input tables: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    // this writer will write "in-order" provided we correctly pass the ordering of data to it
    let mut label_writer: PhaseLabelWriter = match PhaseLabelWriter::new(&cli_settings.output_filename) {
        Ok(lw) => lw,
        Err(e) => {
            error!("Error during label writer creation: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    // create our stats file also
    let mut stats_writer: Option<StatsWriter> = match cli_settings.stats_filename {
        Some(ref filename) => {
            match StatsWriter::new(filename) {
                Ok(sw) => Some(sw),
                Err(e) => {
                    error!("Error during statistics writer creation: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            }
        },
        None => None
    };

    let mut phase_merger: Option<PhaseMerger> = cli_settings.merged_filename.as_ref().map(|_| PhaseMerger::new());

    if let Some(graph_dir) = cli_settings.graph_directory.as_ref() {
        if let Err(e) = std::fs::create_dir_all(graph_dir) {
            error!("Error while creating graph directory {:?}: {}", graph_dir, e);
            std::process::exit(exitcode::CANTCREAT);
        }
    }
    let dump_graph: bool = cli_settings.graph_directory.is_some();

    let start_time: Instant = Instant::now();
    let mut totals: RunTotals = Default::default();
    let mut results_received: u64 = 0;
    let num_regions: u64 = regions.len() as u64;

    // values related to printing
    const UPDATE_SPEED: u64 = 100;
    info!("Phasing {} regions...", num_regions);

    if cli_settings.threads <= 1 {
        for region in regions.iter() {
            let region_result = run_region(region, &phase_config, dump_graph, cli_settings.skip_failed_regions);
            results_received += 1;

            process_results(
                region_result, &mut totals,
                &mut stats_writer, &mut phase_merger,
                &cli_settings.graph_directory, &mut label_writer
            );

            if results_received % UPDATE_SPEED == 0 {
                let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                let regions_per_sec: f64 = results_received as f64 / time_so_far;
                info!("Received results for {} / {} regions: {:.4} regions/sec, writer waiting on region {}", results_received, num_regions, regions_per_sec, label_writer.get_wait_region());
            }
        }
    } else {
        //set up job configuration
        info!("Starting job pool with {} threads...", cli_settings.threads);
        let job_slots: u64 = 40 * cli_settings.threads as u64;
        let mut jobs_queued: u64 = 0;

        //we need to set up the multiprocessing components now
        let pool = ThreadPool::new(cli_settings.threads);
        let (tx, rx) = mpsc::channel();
        let arc_phase_config: Arc<PhaseConfig> = Arc::new(phase_config);
        let skip_failed_regions: bool = cli_settings.skip_failed_regions;

        for region in regions.into_iter() {
            // make sure no panics encountered so far
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }

            if jobs_queued - results_received >= job_slots {
                let region_result: (RegionResult, bool) = receive_result(&rx);
                results_received += 1;

                process_results(
                    region_result, &mut totals,
                    &mut stats_writer, &mut phase_merger,
                    &cli_settings.graph_directory, &mut label_writer
                );

                if results_received % UPDATE_SPEED == 0 {
                    let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                    let regions_per_sec: f64 = results_received as f64 / time_so_far;
                    info!("Received results for {} / {} regions: {:.4} regions/sec, writer waiting on region {}", results_received, jobs_queued, regions_per_sec, label_writer.get_wait_region());
                }
            }

            jobs_queued += 1;
            let tx = tx.clone();
            let arc_phase_config = arc_phase_config.clone();
            pool.execute(move|| {
                // errors are resolved inside the job, so only finished results go over the channel
                let region_result = run_region(&region, &arc_phase_config, dump_graph, skip_failed_regions);
                tx.send(region_result).expect("channel will be there waiting for the pool");
            });
        }

        while results_received < jobs_queued {
            // make sure no panics encountered so far
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }

            let region_result: (RegionResult, bool) = receive_result(&rx);
            results_received += 1;

            process_results(
                region_result, &mut totals,
                &mut stats_writer, &mut phase_merger,
                &cli_settings.graph_directory, &mut label_writer
            );

            // do an update if we're on the mod of our speed OR it's the last one for a thread
            if results_received % UPDATE_SPEED == 0 || (jobs_queued - results_received) < cli_settings.threads as u64 {
                let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                let regions_per_sec: f64 = results_received as f64 / time_so_far;
                info!("Received results for {} / {} regions: {:.4} regions/sec, writer waiting on region {}", results_received, jobs_queued, regions_per_sec, label_writer.get_wait_region());
            }
        }
    }

    info!("All regions analyzed, finalizing output files...");
    match label_writer.finalize() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while finalizing label file: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    if let Some(stats_writer) = stats_writer.as_mut() {
        match stats_writer.finalize() {
            Ok(()) => {},
            Err(e) => {
                error!("Error while finalizing statistics file: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    if let (Some(merger), Some(filename)) = (phase_merger, cli_settings.merged_filename.as_ref()) {
        info!("Saving merged read labels to {:?}...", filename);
        let merged_reads = merger.merge();
        match write_merged_reads(filename, &merged_reads) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while writing merged label file: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    info!("Candidate summary:");
    info!("\tCandidate sites: {}", totals.candidate_stats.num_candidates());
    info!("\tSubstitution alleles: {}", totals.candidate_stats.num_substitution_alleles());
    info!("\tIndel alleles: {}", totals.candidate_stats.num_indel_alleles());
    info!("\tSubstitution allele depth: {}", totals.candidate_stats.substitution_depth());
    info!("Phased {} / {} read labels.", totals.phased_reads, totals.num_reads);
    if totals.failed_regions > 0 {
        warn!("{} regions failed and were written as unphased.", totals.failed_regions);
    }

    info!("All regions finished successfully after {} seconds.", start_time.elapsed().as_secs_f64());
}

/// Solves one region, resolving any engine error into either an unphased result or an exit.
/// # Arguments
/// * `region` - the region to solve
/// * `phase_config` - engine parameters
/// * `dump_graph` - if true, the pruned graph is rendered into the result
/// * `skip_failed_regions` - if true, failures become all-unphased results instead of exiting
fn run_region(region: &Region, phase_config: &PhaseConfig, dump_graph: bool, skip_failed_regions: bool) -> (RegionResult, bool) {
    match solve_region(region, phase_config, dump_graph) {
        Ok(r) => (r, false),
        Err(e) => {
            if skip_failed_regions {
                warn!("Error while processing region #{} {:?}, writing reads as unphased: {}", region.region_index(), region.name(), e);
                (create_unphased_result(region), true)
            } else {
                error!("Error while processing region #{} {:?}:", region.region_index(), region.name());
                error!("  {}", e);
                std::process::exit(exitcode::DATAERR);
            }
        }
    }
}

/// Pulls the next finished region off the channel, exiting if every sender is gone.
fn receive_result(rx: &mpsc::Receiver<(RegionResult, bool)>) -> (RegionResult, bool) {
    match rx.recv() {
        Ok(r) => r,
        Err(e) => {
            error!("Error while receiving region results: {}", e);
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

/// Sub-routine to make sure we are always consistently processing results in an identical manner
/// # Arguments
/// * `region_result` - the result from the engine and a flag for whether the region failed
/// * `totals` - mutable reference to the running totals
/// * `opt_stats_writer` - mutable, optional reference to our algorithm stats writer
/// * `opt_phase_merger` - mutable, optional reference to the cross-region merger
/// * `opt_graph_dir` - optional directory for DOT graph dumps
/// * `label_writer` - mutable reference to our label writer
fn process_results(
    region_result: (RegionResult, bool), totals: &mut RunTotals,
    opt_stats_writer: &mut Option<StatsWriter>, opt_phase_merger: &mut Option<PhaseMerger>,
    opt_graph_dir: &Option<PathBuf>, label_writer: &mut PhaseLabelWriter
) {
    let (region_result, failed) = region_result;
    debug!("region {} labels: {:?}", region_result.region_index, region_result.labels);

    totals.candidate_stats += region_result.candidate_stats.clone();
    totals.num_reads += region_result.labels.len() as u64;
    totals.phased_reads += region_result.labels.iter().filter(|&&l| l != 0).count() as u64;
    if failed {
        totals.failed_regions += 1;
    }

    // write the stats if we have a writer
    if let Some(stats_writer) = opt_stats_writer.as_mut() {
        match stats_writer.write_stats(&region_result) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while writing statistics file: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        }
    };

    if let Some(phase_merger) = opt_phase_merger.as_mut() {
        phase_merger.add_region(region_result.region_index + 1, &region_result.read_names, &region_result.labels);
    }

    if let (Some(graph_dir), Some(graphviz)) = (opt_graph_dir.as_ref(), region_result.graphviz.as_ref()) {
        let graph_fn: PathBuf = graph_dir.join(format!("region_{}.dot", region_result.region_index));
        match std::fs::write(&graph_fn, graphviz) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while writing graph file {:?}: {}", graph_fn, e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    match label_writer.write_region(region_result) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while saving region labels: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
}
