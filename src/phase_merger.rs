use log::{debug, info};
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The merged phase for one read across every region it appeared in
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MergedRead {
    /// the read name
    read_name: String,
    /// the first non-zero phase the read received after orientation, 0 if none
    phase: u8,
    /// the number of regions that labeled the read 0, 1, and 2
    phase_dist: [u64; 3]
}

impl MergedRead {
    pub fn read_name(&self) -> &str {
        &self.read_name
    }

    pub fn phase(&self) -> u8 {
        self.phase
    }

    pub fn phase_dist(&self) -> [u64; 3] {
        self.phase_dist
    }
}

/// Row written to the merged output
#[derive(Serialize)]
struct MergedRow<'a> {
    read_name: &'a str,
    phase: u8,
    unphased_count: u64,
    phase1_count: u64,
    phase2_count: u64
}

/// Reconciles per-region labels into one label per read.
/// Each region's labels are oriented against the region merged just before it:
/// if the reads shared by both disagree more often than they agree, the later region is flipped.
/// Regions can be added in any order; merging always walks them by region order.
#[derive(Debug, Default)]
pub struct PhaseMerger {
    /// region order to the (read name, phase) rows of that region
    groups: BTreeMap<usize, Vec<(String, u8)>>
}

impl PhaseMerger {
    pub fn new() -> PhaseMerger {
        Default::default()
    }

    /// Adds the labels of one region.
    /// # Arguments
    /// * `region_order` - the order the region is merged in
    /// * `read_names` - read names in the region
    /// * `labels` - labels parallel to `read_names`
    /// # Panics
    /// * if `read_names` and `labels` differ in length
    /// * if a region order is added twice
    pub fn add_region(&mut self, region_order: usize, read_names: &[String], labels: &[u8]) {
        assert_eq!(read_names.len(), labels.len());
        assert!(!self.groups.contains_key(&region_order), "region {} was added twice", region_order);

        let rows: Vec<(String, u8)> = read_names.iter().cloned()
            .zip(labels.iter().cloned())
            .collect();
        self.groups.insert(region_order, rows);
    }

    /// Returns true if the phased reads shared by both groups disagree more than they agree.
    fn should_flip(previous: &HashMap<usize, u8>, current: &HashMap<usize, u8>) -> bool {
        let mut matching: u64 = 0;
        let mut mismatching: u64 = 0;
        for (merged_index, &phase) in current.iter() {
            let previous_phase = match previous.get(merged_index) {
                Some(&p) => p,
                None => continue
            };
            if phase == 0 || previous_phase == 0 {
                continue;
            }
            if phase == previous_phase {
                matching += 1;
            } else {
                mismatching += 1;
            }
        }
        mismatching > matching
    }

    /// Merges all regions in region order.
    /// Returns one entry per read, ordered by the first region containing it and then by its row in that region.
    pub fn merge(self) -> Vec<MergedRead> {
        let mut merged_reads: Vec<MergedRead> = vec![];
        let mut merged_lookup: HashMap<String, usize> = Default::default();
        let mut previous: Option<HashMap<usize, u8>> = None;
        let num_regions: usize = self.groups.len();
        let mut num_flipped: usize = 0;

        for (region_order, rows) in self.groups.into_iter() {
            let mut group: HashMap<usize, u8> = Default::default();
            for (read_name, phase) in rows.into_iter() {
                let merged_index: usize = match merged_lookup.get(&read_name) {
                    Some(&index) => index,
                    None => {
                        let index = merged_reads.len();
                        merged_reads.push(MergedRead {
                            read_name: read_name.clone(),
                            ..Default::default()
                        });
                        merged_lookup.insert(read_name, index);
                        index
                    }
                };
                group.insert(merged_index, phase);
            }

            let flip = match previous.as_ref() {
                Some(previous_group) => Self::should_flip(previous_group, &group),
                None => false
            };
            if flip {
                debug!("Flipping labels for region {}", region_order);
                num_flipped += 1;
                for phase in group.values_mut() {
                    if *phase > 0 {
                        *phase = 3 - *phase;
                    }
                }
            }

            for (&merged_index, &phase) in group.iter() {
                let merged_read = &mut merged_reads[merged_index];
                if merged_read.phase == 0 {
                    merged_read.phase = phase;
                }
                merged_read.phase_dist[phase.min(2) as usize] += 1;
            }
            previous = Some(group);
        }

        info!("Merged {} regions into {} reads, {} regions flipped.", num_regions, merged_reads.len(), num_flipped);
        merged_reads
    }
}

/// Writes merged reads to a delimited file; "," if the extension is ".csv", tab otherwise.
/// # Arguments
/// * `filename` - the output path
/// * `merged_reads` - the merged results
/// # Errors
/// * if the file cannot be created or written
pub fn write_merged_reads(filename: &Path, merged_reads: &[MergedRead]) -> csv::Result<()> {
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(filename)?;

    for merged_read in merged_reads.iter() {
        csv_writer.serialize(MergedRow {
            read_name: &merged_read.read_name,
            phase: merged_read.phase,
            unphased_count: merged_read.phase_dist[0],
            phase1_count: merged_read.phase_dist[1],
            phase2_count: merged_read.phase_dist[2]
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
