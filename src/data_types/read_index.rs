use log::warn;
use rustc_hash::FxHashMap as HashMap;

use crate::data_types::candidates::ReadRecord;

/// Dense read identifier, assigned in first-seen order within a region
pub type ReadIndex = u32;

/// Maps read names to dense identifiers for one region.
/// Duplicate names share an identifier, so they always receive the same label.
#[derive(Clone, Debug, Default)]
pub struct ReadIndexer {
    /// name to identifier lookup
    read_to_index: HashMap<String, ReadIndex>,
    /// identifier to name lookup, `read_names[i]` is the name for identifier `i`
    read_names: Vec<String>
}

impl ReadIndexer {
    /// Assigns identifiers to each distinct read name, in order of first appearance.
    /// # Arguments
    /// * `reads` - the reads for a region, in upstream order
    pub fn from_reads(reads: &[ReadRecord]) -> ReadIndexer {
        let mut read_to_index: HashMap<String, ReadIndex> = Default::default();
        let mut read_names: Vec<String> = Vec::with_capacity(reads.len());
        for read in reads.iter() {
            if read_to_index.contains_key(read.read_name()) {
                warn!("Duplicate read name {:?} in region, sharing one identifier", read.read_name());
                continue;
            }
            read_to_index.insert(read.read_name().to_string(), read_names.len() as ReadIndex);
            read_names.push(read.read_name().to_string());
        }

        ReadIndexer {
            read_to_index,
            read_names
        }
    }

    /// Builds an indexer from a pre-populated name to identifier map.
    /// # Arguments
    /// * `read_to_index` - the lookup; identifiers must be exactly `0..read_to_index.len()`
    /// # Panics
    /// * if the identifiers are not dense and unique
    pub fn from_index_map(read_to_index: HashMap<String, ReadIndex>) -> ReadIndexer {
        let mut entries: Vec<(&String, &ReadIndex)> = read_to_index.iter().collect();
        entries.sort_by_key(|&(_name, &index)| index);
        let read_names: Vec<String> = entries.iter().enumerate()
            .map(|(expected, &(name, &index))| {
                assert_eq!(expected as ReadIndex, index, "read identifiers must be dense and unique");
                name.clone()
            })
            .collect();

        ReadIndexer {
            read_to_index,
            read_names
        }
    }

    /// Returns the identifier for a read name, if the read is known
    pub fn resolve(&self, read_name: &str) -> Option<ReadIndex> {
        self.read_to_index.get(read_name).copied()
    }

    /// Returns the name for an identifier
    pub fn read_name(&self, read_index: ReadIndex) -> Option<&str> {
        self.read_names.get(read_index as usize).map(|s| s.as_str())
    }

    /// The number of distinct read identifiers
    pub fn num_reads(&self) -> usize {
        self.read_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_names.is_empty()
    }
}
