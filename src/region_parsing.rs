use crate::data_types::candidates::{Candidate, ReadRecord, Region, SupportingRead};

use flate2::bufread::MultiGzDecoder;
use log::{debug, info};
use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;
use simple_error::bail;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One row of the reads table
#[derive(Debug, Deserialize)]
struct ReadRow {
    /// the region the read belongs to
    region: String,
    /// the read name
    read_name: String
}

/// One row of the candidates table, a single read supporting a single allele
#[derive(Debug, Deserialize)]
struct CandidateRow {
    /// the region the candidate belongs to
    region: String,
    /// 0-based start of the reference interval
    start: i64,
    /// 0-based exclusive end of the reference interval
    end: i64,
    /// the reference bases
    ref_bases: String,
    /// the supported allele; equal to `ref_bases` for reference support
    allele: String,
    /// the supporting read
    read_name: String,
    /// "1"/"true" if the support is low quality, "0"/"false" otherwise
    is_low_quality: String
}

/// Returns true if the table should be parsed with commas, based on the extension ignoring any ".gz".
fn is_comma_delimited(filename: &Path) -> bool {
    let extension = filename.extension().unwrap_or_default();
    if extension == "gz" {
        let stem = filename.file_stem().unwrap_or_default();
        Path::new(stem).extension().unwrap_or_default() == "csv"
    } else {
        extension == "csv"
    }
}

/// Opens a delimited table with headers, decompressing if the extension is ".gz".
/// # Arguments
/// * `filename` - the table to open
/// # Errors
/// * if the file cannot be opened
fn open_table(filename: &Path) -> Result<csv::Reader<Box<dyn Read>>, Box<dyn std::error::Error>> {
    let file: File = File::open(filename)?;
    let file_reader = BufReader::new(file);
    let reader: Box<dyn Read> = if filename.extension().unwrap_or_default() == "gz" {
        debug!("Detected gzip extension, loading {:?} with MultiGzDecoder...", filename);
        Box::new(MultiGzDecoder::new(file_reader))
    } else {
        Box::new(file_reader)
    };

    let delimiter: u8 = if is_comma_delimited(filename) { b',' } else { b'\t' };
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader))
}

/// Parses a low quality flag column.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" => Some(true),
        "0" | "false" | "f" | "no" | "" => Some(false),
        _ => None
    }
}

/// Loads all regions from a candidates table and a reads table.
/// Regions are ordered by first appearance in the reads table, and reads keep their table order within a region.
/// Candidate rows are grouped into candidates by (region, start, end, ref_bases).
/// # Arguments
/// * `candidates_fn` - the candidates table, columns: region, start, end, ref_bases, allele, read_name, is_low_quality
/// * `reads_fn` - the reads table, columns: region, read_name
/// # Errors
/// * if either file cannot be read or parsed
/// * if a candidate row references a region with no reads
/// * if a low quality flag is not recognized
pub fn load_regions(candidates_fn: &Path, reads_fn: &Path) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
    info!("Loading reads from {:?}...", reads_fn);
    let mut regions: Vec<Region> = vec![];
    let mut region_lookup: HashMap<String, usize> = Default::default();

    let mut read_reader = open_table(reads_fn)?;
    let mut num_reads: u64 = 0;
    for row in read_reader.deserialize() {
        let row: ReadRow = row?;
        let region_index: usize = match region_lookup.get(&row.region) {
            Some(&index) => index,
            None => {
                let index = regions.len();
                regions.push(Region::new(index, row.region.clone(), vec![], vec![]));
                region_lookup.insert(row.region, index);
                index
            }
        };
        regions[region_index].reads_mut().push(ReadRecord::new(row.read_name));
        num_reads += 1;
    }
    info!("Loaded {} reads across {} regions.", num_reads, regions.len());

    info!("Loading candidates from {:?}...", candidates_fn);
    // (start, end, ref_bases) to the index in the region's candidate list
    let mut candidate_lookup: Vec<HashMap<(i64, i64, String), usize>> = vec![Default::default(); regions.len()];
    let mut candidate_reader = open_table(candidates_fn)?;
    let mut num_rows: u64 = 0;
    for row in candidate_reader.deserialize() {
        let row: CandidateRow = row?;
        let region_index: usize = match region_lookup.get(&row.region) {
            Some(&index) => index,
            None => bail!("Candidate at {} in region {:?} has no reads in {:?}", row.start, row.region, reads_fn)
        };
        let is_low_quality: bool = match parse_flag(&row.is_low_quality) {
            Some(flag) => flag,
            None => bail!("Unrecognized is_low_quality value {:?} for read {:?}", row.is_low_quality, row.read_name)
        };

        let lookup = &mut candidate_lookup[region_index];
        let candidates = regions[region_index].candidates_mut();
        let key = (row.start, row.end, row.ref_bases.clone());
        let candidate_index: usize = match lookup.get(&key) {
            Some(&index) => index,
            None => {
                let index = candidates.len();
                candidates.push(Candidate::new(row.start, row.end, row.ref_bases.as_bytes().to_vec()));
                lookup.insert(key, index);
                index
            }
        };

        let supporting_read = SupportingRead::new(row.read_name, is_low_quality);
        let candidate = &mut candidates[candidate_index];
        if row.allele == row.ref_bases {
            candidate.add_reference_support(supporting_read);
        } else {
            candidate.add_alternate_support(row.allele.as_bytes(), supporting_read);
        }
        num_rows += 1;
    }

    let mut num_candidates: usize = 0;
    for region in regions.iter_mut() {
        region.candidates_mut().sort_by_key(|c| (c.start(), c.end()));
        num_candidates += region.candidates().len();
    }
    info!("Loaded {} candidates from {} support rows.", num_candidates, num_rows);

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const READS_TSV: &str = "region\tread_name\n\
        chr1:1-500\tr1\n\
        chr1:1-500\tr2\n\
        chr2:1-500\tr3\n\
        chr1:1-500\tr3\n";

    const CANDIDATES_TSV: &str = "region\tstart\tend\tref_bases\tallele\tread_name\tis_low_quality\n\
        chr1:1-500\t200\t201\tA\tA\tr1\t0\n\
        chr1:1-500\t100\t101\tG\tT\tr2\t1\n\
        chr1:1-500\t200\t201\tA\tC\tr2\t0\n\
        chr1:1-500\t100\t101\tG\tG\tr1\tfalse\n\
        chr1:1-500\t200\t201\tA\tC\tr3\ttrue\n\
        chr2:1-500\t50\t52\tAT\tA\tr3\t0\n";

    #[test]
    fn test_is_comma_delimited() {
        assert!(is_comma_delimited(Path::new("a.csv")));
        assert!(is_comma_delimited(Path::new("a.csv.gz")));
        assert!(!is_comma_delimited(Path::new("a.tsv")));
        assert!(!is_comma_delimited(Path::new("a.tsv.gz")));
        assert!(!is_comma_delimited(Path::new("a")));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_load_regions() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let reads_fn = tmp_dir.path().join("reads.tsv");
        let candidates_fn = tmp_dir.path().join("candidates.tsv");
        std::fs::write(&reads_fn, READS_TSV).unwrap();
        std::fs::write(&candidates_fn, CANDIDATES_TSV).unwrap();

        let regions = load_regions(&candidates_fn, &reads_fn).unwrap();
        assert_eq!(regions.len(), 2);

        let chr1 = &regions[0];
        assert_eq!(chr1.region_index(), 0);
        assert_eq!(chr1.name(), "chr1:1-500");
        let read_names: Vec<&str> = chr1.reads().iter().map(|r| r.read_name()).collect();
        assert_eq!(read_names, vec!["r1", "r2", "r3"]);

        // sorted by position, grouped by reference interval
        assert_eq!(chr1.candidates().len(), 2);
        let first = &chr1.candidates()[0];
        assert_eq!(first.start(), 100);
        assert_eq!(first.reference_support(), &[SupportingRead::new("r1".to_string(), false)]);
        assert_eq!(first.alternate_alleles()[0].bases(), b"T");
        assert!(first.alternate_alleles()[0].supporting_reads()[0].is_low_quality());

        let second = &chr1.candidates()[1];
        assert_eq!(second.start(), 200);
        assert_eq!(second.alternate_alleles().len(), 1);
        assert_eq!(second.alternate_alleles()[0].supporting_reads().len(), 2);

        let chr2 = &regions[1];
        assert_eq!(chr2.region_index(), 1);
        assert_eq!(chr2.candidates()[0].end(), 52);
        assert!(chr2.candidates()[0].reference_support().is_empty());
    }

    #[test]
    fn test_load_gzip_csv() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let reads_fn = tmp_dir.path().join("reads.csv.gz");
        let candidates_fn = tmp_dir.path().join("candidates.csv");

        let mut encoder = GzEncoder::new(File::create(&reads_fn).unwrap(), Compression::default());
        encoder.write_all(READS_TSV.replace('\t', ",").as_bytes()).unwrap();
        encoder.finish().unwrap();
        std::fs::write(&candidates_fn, CANDIDATES_TSV.replace('\t', ",")).unwrap();

        let regions = load_regions(&candidates_fn, &reads_fn).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].reads().len(), 3);
        assert_eq!(regions[0].candidates().len(), 2);
    }

    #[test]
    fn test_missing_region() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let reads_fn = tmp_dir.path().join("reads.tsv");
        let candidates_fn = tmp_dir.path().join("candidates.tsv");
        std::fs::write(&reads_fn, "region\tread_name\nchr1:1-500\tr1\n").unwrap();
        std::fs::write(
            &candidates_fn,
            "region\tstart\tend\tref_bases\tallele\tread_name\tis_low_quality\nchr9:1-10\t5\t6\tA\tC\tr1\t0\n"
        ).unwrap();
        assert!(load_regions(&candidates_fn, &reads_fn).is_err());
    }

    #[test]
    fn test_bad_flag() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let reads_fn = tmp_dir.path().join("reads.tsv");
        let candidates_fn = tmp_dir.path().join("candidates.tsv");
        std::fs::write(&reads_fn, "region\tread_name\nchr1:1-500\tr1\n").unwrap();
        std::fs::write(
            &candidates_fn,
            "region\tstart\tend\tref_bases\tallele\tread_name\tis_low_quality\nchr1:1-500\t5\t6\tA\tC\tr1\tmaybe\n"
        ).unwrap();
        assert!(load_regions(&candidates_fn, &reads_fn).is_err());
    }
}
