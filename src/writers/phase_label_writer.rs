use crate::phaser::RegionResult;

use log::trace;
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;
use simple_error::bail;
use std::fs::File;
use std::io;
use std::path::Path;

/// Contains all the data written to each row of our label file
#[derive(Serialize)]
struct LabelRow<'a> {
    /// the region label
    region: &'a str,
    /// 1-based order of the region, used when merging across regions
    region_order: usize,
    /// the read name
    read_name: &'a str,
    /// 0 for unphased, otherwise 1 or 2
    phase: u8
}

/// Structure that maintains region order while writing read labels.
/// Results can arrive in any order, they are buffered until every earlier region has been written.
pub struct PhaseLabelWriter {
    /// Handle for the CSV writer
    csv_writer: csv::Writer<File>,
    /// the results that are cached because we are waiting on earlier regions
    map_store: HashMap<usize, RegionResult>,
    /// the index of the region we are waiting for
    current_index: usize
}

impl PhaseLabelWriter {
    /// Creates a new writer for a given filename
    /// # Arguments
    /// * `filename` - the path to write all labels to; "," delimited if it ends with .csv, tab otherwise
    pub fn new(filename: &Path) -> csv::Result<PhaseLabelWriter> {
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(filename)?;
        Ok(PhaseLabelWriter {
            csv_writer,
            map_store: Default::default(),
            current_index: 0
        })
    }

    /// Returns the region index that the writer is currently waiting to receive.
    pub fn get_wait_region(&self) -> usize {
        self.current_index
    }

    /// Adds a region result to our queue for writing.
    /// # Arguments
    /// * `region_result` - a result that will be written in the correct order with other regions
    /// # Errors
    /// * if the region was already written or is already queued
    /// * if the csv_writer has any errors
    pub fn write_region(&mut self, region_result: RegionResult) -> Result<(), Box<dyn std::error::Error>> {
        let region_index: usize = region_result.region_index;
        if region_index < self.current_index {
            return Err(Box::new(io::Error::new(io::ErrorKind::Other, "Region index is smaller than next expected index")));
        }
        match self.map_store.insert(region_index, region_result) {
            None => {},
            Some(_) => {
                return Err(Box::new(io::Error::new(io::ErrorKind::Other, "Region index was already present in the map_store")));
            }
        };
        self.drain_map_store()
    }

    /// Writes buffered regions in order until the next expected region is missing.
    fn drain_map_store(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(region_result) = self.map_store.remove(&self.current_index) {
            trace!("Draining {}", self.current_index);
            for (read_name, &phase) in region_result.read_names.iter().zip(region_result.labels.iter()) {
                let row: LabelRow = LabelRow {
                    region: &region_result.region_name,
                    region_order: region_result.region_index + 1,
                    read_name,
                    phase
                };
                self.csv_writer.serialize(&row)?;
            }
            self.csv_writer.flush()?;
            self.current_index += 1;
        }
        Ok(())
    }

    /// Verifies that every received region was written.
    /// # Errors
    /// * if any region is still waiting on an earlier one
    pub fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.map_store.is_empty() {
            bail!("{} regions were never written, still waiting on region {}", self.map_store.len(), self.current_index);
        }
        self.csv_writer.flush()?;
        Ok(())
    }
}
