use crate::data_types::candidates::{num_indel_alleles, num_substitution_alleles, substitution_alleles_depth, Candidate};
use crate::phaser::RegionResult;

use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use simple_error::bail;
use std::fs::File;
use std::ops::AddAssign;
use std::path::Path;

/// Summary of the candidate sites handed to the engine for a region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateStats {
    /// The number of candidate sites
    num_candidates: u64,
    /// The number of alternate alleles classified as substitutions
    num_substitution_alleles: u64,
    /// The number of alternate alleles classified as insertions or deletions
    num_indel_alleles: u64,
    /// The total read support across substitution alleles
    substitution_depth: u64
}

impl CandidateStats {
    /// Tallies the candidate summary helpers over a set of candidates
    /// # Arguments
    /// * `candidates` - the candidates for one region
    pub fn from_candidates(candidates: &[Candidate]) -> CandidateStats {
        let mut stats = CandidateStats {
            num_candidates: candidates.len() as u64,
            ..Default::default()
        };
        for candidate in candidates.iter() {
            stats.num_substitution_alleles += num_substitution_alleles(candidate) as u64;
            stats.num_indel_alleles += num_indel_alleles(candidate) as u64;
            stats.substitution_depth += substitution_alleles_depth(candidate) as u64;
        }
        stats
    }

    pub fn num_candidates(&self) -> u64 {
        self.num_candidates
    }

    pub fn num_substitution_alleles(&self) -> u64 {
        self.num_substitution_alleles
    }

    pub fn num_indel_alleles(&self) -> u64 {
        self.num_indel_alleles
    }

    pub fn substitution_depth(&self) -> u64 {
        self.substitution_depth
    }
}

impl AddAssign for CandidateStats {
    fn add_assign(&mut self, rhs: Self) {
        self.num_candidates += rhs.num_candidates;
        self.num_substitution_alleles += rhs.num_substitution_alleles;
        self.num_indel_alleles += rhs.num_indel_alleles;
        self.substitution_depth += rhs.substitution_depth;
    }
}

/// Contains any statistics from the graph and scoring steps that may be relevant
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhaseStats {
    /// The number of positions with two or more alleles before pruning
    num_positions: u64,
    /// The number of positions with a single observed allele
    hom_positions: u64,
    /// The number of positions removed by pruning
    collapsed_positions: u64,
    /// Allele vertices before pruning
    vertices_before: u64,
    /// Allele vertices after pruning
    vertices_after: u64,
    /// Inter-position edges before pruning
    edges_before: u64,
    /// Inter-position edges after pruning
    edges_after: u64,
    /// The number of score table entries, None if nothing was scored
    score_entries: Option<u64>,
    /// The score of the best partition, None if nothing was scored
    best_score: Option<u64>,
    /// Reads labeled phase 1 and phase 2
    phased_reads: [u64; 2],
    /// Reads labeled 0
    unphased_reads: u64
}

impl PhaseStats {
    /// Creates phase stats from the graph shape before and after pruning
    /// # Arguments
    /// * `num_positions` - the number of eligible positions before pruning
    /// * `hom_positions` - the number of homozygous positions
    /// * `collapsed_positions` - the number of positions pruning removed
    /// * `vertices_before` - allele vertices before pruning
    /// * `vertices_after` - allele vertices after pruning
    /// * `edges_before` - inter-position edges before pruning
    /// * `edges_after` - inter-position edges after pruning
    /// # Panics
    /// * if pruning grew the graph, because pruning only ever removes things
    pub fn from_graph_pruning(
        num_positions: u64, hom_positions: u64, collapsed_positions: u64,
        vertices_before: u64, vertices_after: u64, edges_before: u64, edges_after: u64
    ) -> PhaseStats {
        assert!(vertices_after <= vertices_before);
        assert!(edges_after <= edges_before);
        assert!(collapsed_positions <= num_positions);
        PhaseStats {
            num_positions,
            hom_positions,
            collapsed_positions,
            vertices_before,
            vertices_after,
            edges_before,
            edges_after,
            ..Default::default()
        }
    }

    /// Records the scoring summary
    pub fn set_scoring(&mut self, score_entries: u64, best_score: Option<u64>) {
        self.score_entries = Some(score_entries);
        self.best_score = best_score;
    }

    /// Records the label counts
    pub fn set_labels(&mut self, labels: &[u8]) {
        self.phased_reads = [0; 2];
        self.unphased_reads = 0;
        for &label in labels.iter() {
            match label {
                1 | 2 => self.phased_reads[label as usize - 1] += 1,
                _ => self.unphased_reads += 1
            };
        }
    }

    pub fn hom_positions(&self) -> u64 {
        self.hom_positions
    }

    pub fn collapsed_positions(&self) -> u64 {
        self.collapsed_positions
    }

    pub fn best_score(&self) -> Option<u64> {
        self.best_score
    }

    pub fn phased_reads(&self) -> [u64; 2] {
        self.phased_reads
    }

    pub fn unphased_reads(&self) -> u64 {
        self.unphased_reads
    }
}

/// This is a wrapper for writing out any stats to a file.
/// Rows are buffered until every earlier region has been written, so the file follows region order.
pub struct StatsWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>,
    /// the rows that are cached because we are waiting on earlier regions
    map_store: HashMap<usize, CsvRow>,
    /// the index of the region we are waiting for
    current_index: usize
}

/// Contains all the data written to each row of our stats file
#[derive(Serialize)]
struct CsvRow {
    /// The index of the region
    region_index: usize,
    /// The region label
    region: String,
    /// The number of reads in the region
    num_reads: u64,
    /// The number of candidate sites
    num_candidates: u64,
    /// The number of substitution alleles
    num_substitution_alleles: u64,
    /// The number of insertion and deletion alleles
    num_indel_alleles: u64,
    /// The total support for substitution alleles
    substitution_depth: u64,
    /// The number of positions with two or more alleles
    num_positions: Option<u64>,
    /// The number of homozygous positions
    hom_positions: Option<u64>,
    /// The number of positions removed by pruning
    collapsed_positions: Option<u64>,
    /// Allele vertices before pruning
    vertices_before: Option<u64>,
    /// Allele vertices after pruning
    vertices_after: Option<u64>,
    /// Inter-position edges before pruning
    edges_before: Option<u64>,
    /// Inter-position edges after pruning
    edges_after: Option<u64>,
    /// The number of score table entries
    score_entries: Option<u64>,
    /// The score of the best partition
    best_score: Option<u64>,
    /// Reads labeled 1
    phase1_reads: Option<u64>,
    /// Reads labeled 2
    phase2_reads: Option<u64>,
    /// Reads labeled 0
    unphased_reads: u64
}

impl StatsWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write all stats to
    pub fn new(filename: &Path) -> csv::Result<StatsWriter> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(StatsWriter {
            csv_writer,
            map_store: Default::default(),
            current_index: 0
        })
    }

    /// Queues the stats for one region and writes every row that is now in order
    /// # Arguments
    /// * `region_result` - the region result, which wraps region metadata, the candidate summary, and the phasing statistics
    /// # Errors
    /// * if the region was already written or is already queued
    /// * if the csv_writer has any errors
    pub fn write_stats(&mut self, region_result: &RegionResult) -> Result<(), Box<dyn std::error::Error>> {
        let region_index: usize = region_result.region_index;
        if region_index < self.current_index || self.map_store.contains_key(&region_index) {
            bail!("Statistics for region {} were already received", region_index);
        }
        let cs = &region_result.candidate_stats;
        let ps = region_result.statistics.as_ref();
        let unphased_reads = region_result.labels.iter().filter(|&&l| l == 0).count() as u64;

        let row: CsvRow = CsvRow {
            region_index: region_result.region_index,
            region: region_result.region_name.clone(),
            num_reads: region_result.read_names.len() as u64,
            num_candidates: cs.num_candidates,
            num_substitution_alleles: cs.num_substitution_alleles,
            num_indel_alleles: cs.num_indel_alleles,
            substitution_depth: cs.substitution_depth,
            num_positions: ps.map(|s| s.num_positions),
            hom_positions: ps.map(|s| s.hom_positions),
            collapsed_positions: ps.map(|s| s.collapsed_positions),
            vertices_before: ps.map(|s| s.vertices_before),
            vertices_after: ps.map(|s| s.vertices_after),
            edges_before: ps.map(|s| s.edges_before),
            edges_after: ps.map(|s| s.edges_after),
            score_entries: ps.and_then(|s| s.score_entries),
            best_score: ps.and_then(|s| s.best_score),
            phase1_reads: ps.map(|s| s.phased_reads[0]),
            phase2_reads: ps.map(|s| s.phased_reads[1]),
            unphased_reads
        };
        self.map_store.insert(region_index, row);

        while let Some(row) = self.map_store.remove(&self.current_index) {
            self.csv_writer.serialize(&row)?;
            self.current_index += 1;
        }
        self.csv_writer.flush()?;
        Ok(())
    }

    /// Verifies that every received region was written.
    /// # Errors
    /// * if any region is still waiting on an earlier one
    pub fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.map_store.is_empty() {
            bail!("{} statistics rows were never written, still waiting on region {}", self.map_store.len(), self.current_index);
        }
        self.csv_writer.flush()?;
        Ok(())
    }
}
