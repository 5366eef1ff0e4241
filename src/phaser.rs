use crate::data_types::allele_graph::AlleleGraph;
use crate::data_types::candidates::{Candidate, ReadRecord, Region};
use crate::data_types::read_index::{ReadIndex, ReadIndexer};
use crate::dp_phaser::{PhasedPath, ScoreTable};
use crate::writers::phase_stats::{CandidateStats, PhaseStats};

use log::{debug, trace};

/// Errors that stop a region from being phased.
#[derive(thiserror::Error, Clone, Debug, Eq, PartialEq)]
pub enum PhaseError {
    #[error("read {read_name:?} supports an allele at {position} but is not in the read list")]
    UnresolvedRead { read_name: String, position: i64 },
    #[error("allele {bases:?} at {position} cannot be classified: {reason}")]
    UnclassifiableAllele { position: i64, bases: String, reason: String }
}

/// Tunable parameters for the phasing engine
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PhaseConfig {
    /// inter-position edges with fewer high-quality reads than this are pruned
    pub min_edge_support: u64
}

impl Default for PhaseConfig {
    fn default() -> Self {
        PhaseConfig {
            min_edge_support: 1
        }
    }
}

/// The labels for one call along with the engine statistics
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseOutcome {
    /// one label per input read: 0 unphased, 1 or 2 for the phase
    pub labels: Vec<u8>,
    /// graph and scoring statistics
    pub statistics: PhaseStats
}

/// All state for phasing one region.
/// A session owns its graph and is consumed by `solve`, so it cannot be reused for another region.
pub struct PhasingSession<'a> {
    /// the input reads, labels follow this order
    reads: &'a [ReadRecord],
    /// read identifiers for this region
    indexer: ReadIndexer,
    /// the pruned allele graph
    graph: AlleleGraph,
    /// graph statistics collected before and during pruning
    statistics: PhaseStats
}

impl<'a> PhasingSession<'a> {
    /// Indexes the reads, builds the allele graph, and prunes it.
    /// # Arguments
    /// * `candidates` - the candidate sites for the region
    /// * `reads` - the reads for the region
    /// * `config` - engine parameters
    /// # Errors
    /// * if a candidate references a read that is not in `reads`
    /// * if an allele cannot be classified
    pub fn new(candidates: &[Candidate], reads: &'a [ReadRecord], config: &PhaseConfig) -> Result<PhasingSession<'a>, PhaseError> {
        let indexer = ReadIndexer::from_reads(reads);
        let graph = AlleleGraph::from_candidates(candidates, &indexer)?;
        Ok(Self::from_parts(reads, indexer, graph, config))
    }

    /// Creates a session from an already built indexer and graph, then prunes the graph.
    /// # Arguments
    /// * `reads` - the reads for the region, every name should be known to `indexer`
    /// * `indexer` - the read identifiers used to build `graph`
    /// * `graph` - an unpruned allele graph
    /// * `config` - engine parameters
    pub fn from_parts(reads: &'a [ReadRecord], indexer: ReadIndexer, mut graph: AlleleGraph, config: &PhaseConfig) -> PhasingSession<'a> {
        let num_positions = graph.num_layers();
        let vertices_before = graph.num_allele_vertices();
        let edges_before = graph.num_inter_position_edges();
        graph.prune(config.min_edge_support);

        let statistics = PhaseStats::from_graph_pruning(
            num_positions as u64,
            graph.hom_positions().len() as u64,
            graph.collapsed_positions().len() as u64,
            vertices_before as u64,
            graph.num_allele_vertices() as u64,
            edges_before as u64,
            graph.num_inter_position_edges() as u64
        );
        PhasingSession {
            reads,
            indexer,
            graph,
            statistics
        }
    }

    pub fn graph(&self) -> &AlleleGraph {
        &self.graph
    }

    /// The current graph in DOT format
    pub fn graphviz(&self) -> String {
        self.graph.graphviz()
    }

    /// Scores the graph, resolves the best path, and labels every read.
    pub fn solve(self) -> PhaseOutcome {
        let mut statistics = self.statistics;
        if self.graph.num_layers() < 2 {
            debug!("Fewer than two phasable positions remain, all reads are unphased");
            let labels = vec![0; self.reads.len()];
            statistics.set_labels(&labels);
            return PhaseOutcome {
                labels,
                statistics
            };
        }

        let table = ScoreTable::from_graph(&self.graph);
        let path = PhasedPath::resolve(&self.graph, &table);
        statistics.set_scoring(table.len() as u64, table.best_score());
        let labels = match path {
            Some(p) => assign_labels(self.reads, &self.indexer, &self.graph, &p),
            None => vec![0; self.reads.len()]
        };
        statistics.set_labels(&labels);
        PhaseOutcome {
            labels,
            statistics
        }
    }
}

/// Phases the reads of a region directly from their allele support.
/// Returns one label per read in input order: 0 for unphased, 1 or 2 for the assigned phase.
/// # Arguments
/// * `candidates` - the candidate sites for the region
/// * `reads` - the reads for the region
/// * `config` - engine parameters
/// # Errors
/// * if a candidate references a read that is not in `reads`
/// * if an allele cannot be classified
pub fn phase_reads(candidates: &[Candidate], reads: &[ReadRecord], config: &PhaseConfig) -> Result<Vec<u8>, PhaseError> {
    let session = PhasingSession::new(candidates, reads, config)?;
    Ok(session.solve().labels)
}

/// Maps each read to a phase label using its alleles on the best path.
/// A read gets a phase only if it was credited to that phase wherever it touches the path,
/// and was never dropped from a path vertex it supports.
fn assign_labels(reads: &[ReadRecord], indexer: &ReadIndexer, graph: &AlleleGraph, path: &PhasedPath) -> Vec<u8> {
    let mut read_labels: Vec<u8> = vec![0; indexer.num_reads()];
    for (read_index, label) in read_labels.iter_mut().enumerate() {
        let read_index = read_index as ReadIndex;
        let mut votes: [bool; 2] = [false; 2];
        let mut dropped: bool = false;
        for support in graph.read_alleles(read_index).iter() {
            let layer = &path.layers()[support.layer()];
            for (phase, &vertex) in layer.vertices().iter().enumerate() {
                if support.vertex() == vertex {
                    if layer.reads(phase).contains(&read_index) {
                        votes[phase] = true;
                    } else {
                        dropped = true;
                    }
                }
            }
        }

        *label = match (votes, dropped) {
            ([true, false], false) => 1,
            ([false, true], false) => 2,
            _ => 0
        };
        trace!("Read {:?} votes {:?} dropped {} => {}", indexer.read_name(read_index), votes, dropped, label);
    }

    reads.iter()
        .map(|r| indexer.resolve(r.read_name()).map(|ri| read_labels[ri as usize]).unwrap_or(0))
        .collect()
}

/// The phasing result for one region, carrying what the writers need
#[derive(Clone, Debug, PartialEq)]
pub struct RegionResult {
    /// the load order of the region
    pub region_index: usize,
    /// the region label
    pub region_name: String,
    /// read names in input order
    pub read_names: Vec<String>,
    /// labels parallel to `read_names`
    pub labels: Vec<u8>,
    /// summary of the candidates in the region
    pub candidate_stats: CandidateStats,
    /// statistics from the engine, None if the region was not solved
    pub statistics: Option<PhaseStats>,
    /// the pruned graph in DOT format, if requested
    pub graphviz: Option<String>
}

/// Phases a single region.
/// # Arguments
/// * `region` - the region to phase
/// * `config` - engine parameters
/// * `dump_graph` - if true, the pruned graph is rendered into the result
/// # Errors
/// * if the engine fails for this region
pub fn solve_region(region: &Region, config: &PhaseConfig, dump_graph: bool) -> Result<RegionResult, PhaseError> {
    debug!("Solving region #{} {:?}", region.region_index(), region.name());
    let session = PhasingSession::new(region.candidates(), region.reads(), config)?;
    let graphviz = if dump_graph {
        Some(session.graphviz())
    } else {
        None
    };
    let outcome = session.solve();

    Ok(RegionResult {
        region_index: region.region_index(),
        region_name: region.name().to_string(),
        read_names: region.reads().iter().map(|r| r.read_name().to_string()).collect(),
        labels: outcome.labels,
        candidate_stats: CandidateStats::from_candidates(region.candidates()),
        statistics: Some(outcome.statistics),
        graphviz
    })
}

/// Generates a placeholder result with every read unphased, used when a region fails and failures are tolerated.
/// # Arguments
/// * `region` - the region that could not be phased
pub fn create_unphased_result(region: &Region) -> RegionResult {
    debug!("Generating unphased result for region #{} {:?}", region.region_index(), region.name());
    RegionResult {
        region_index: region.region_index(),
        region_name: region.name().to_string(),
        read_names: region.reads().iter().map(|r| r.read_name().to_string()).collect(),
        labels: vec![0; region.reads().len()],
        candidate_stats: CandidateStats::from_candidates(region.candidates()),
        statistics: None,
        graphviz: None
    }
}
