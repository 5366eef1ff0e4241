use crate::phaser::PhaseError;

/// All the allele types a graph vertex can carry
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum_macros::Display)]
pub enum AlleleType {
    /// ALT and reference interval are both length = 1
    #[strum(serialize = "SUB")]
    Substitution=0,
    /// ALT is longer than the reference interval
    #[strum(serialize = "INS")]
    Insertion,
    /// ALT is shorter than the reference interval
    #[strum(serialize = "DEL")]
    Deletion,
    /// The reference allele of a candidate
    #[strum(serialize = "REF")]
    Reference,
    /// ALT and reference interval have the same length > 1, e.g. a multi-nucleotide change
    #[strum(serialize = "OTHER")]
    Other
}

/// A read name that supports one allele of a candidate, as reported by the candidate generator
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SupportingRead {
    /// the name of the supporting read, must match a `ReadRecord` in the same region
    read_name: String,
    /// if true, the read supports the allele with low quality
    is_low_quality: bool
}

impl SupportingRead {
    pub fn new(read_name: String, is_low_quality: bool) -> SupportingRead {
        SupportingRead {
            read_name,
            is_low_quality
        }
    }

    pub fn read_name(&self) -> &str {
        &self.read_name
    }

    pub fn is_low_quality(&self) -> bool {
        self.is_low_quality
    }
}

/// One alternate allele of a candidate along with the reads that support it
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CandidateAllele {
    /// the alternate bases
    bases: Vec<u8>,
    /// the reads supporting these bases
    supporting_reads: Vec<SupportingRead>
}

impl CandidateAllele {
    pub fn new(bases: Vec<u8>, supporting_reads: Vec<SupportingRead>) -> CandidateAllele {
        CandidateAllele {
            bases,
            supporting_reads
        }
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn supporting_reads(&self) -> &[SupportingRead] {
        &self.supporting_reads
    }

    pub fn add_supporting_read(&mut self, supporting_read: SupportingRead) {
        self.supporting_reads.push(supporting_read);
    }
}

/// A candidate variant site: a reference interval, the reads supporting the reference, and all alternate alleles.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candidate {
    /// 0-based start of the reference interval, this is the position used for phasing
    start: i64,
    /// 0-based exclusive end of the reference interval
    end: i64,
    /// the reference bases covered by the interval
    reference_bases: Vec<u8>,
    /// reads supporting the reference allele
    reference_support: Vec<SupportingRead>,
    /// the alternate alleles, in the order provided upstream
    alternate_alleles: Vec<CandidateAllele>
}

impl Candidate {
    /// Creates a new candidate site with no supporting reads yet attached.
    /// # Arguments
    /// * `start` - the 0-based start of the reference interval
    /// * `end` - the 0-based exclusive end of the reference interval
    /// * `reference_bases` - the bases of the reference allele
    pub fn new(start: i64, end: i64, reference_bases: Vec<u8>) -> Candidate {
        Candidate {
            start,
            end,
            reference_bases,
            reference_support: vec![],
            alternate_alleles: vec![]
        }
    }

    /// Builder-style helper that sets the reference support
    pub fn with_reference_support(mut self, reference_support: Vec<SupportingRead>) -> Candidate {
        self.reference_support = reference_support;
        self
    }

    /// Builder-style helper that appends an alternate allele
    pub fn with_alternate_allele(mut self, allele: CandidateAllele) -> Candidate {
        self.alternate_alleles.push(allele);
        self
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn reference_bases(&self) -> &[u8] {
        &self.reference_bases
    }

    pub fn reference_support(&self) -> &[SupportingRead] {
        &self.reference_support
    }

    pub fn alternate_alleles(&self) -> &[CandidateAllele] {
        &self.alternate_alleles
    }

    /// Adds a read to the reference allele support
    pub fn add_reference_support(&mut self, supporting_read: SupportingRead) {
        self.reference_support.push(supporting_read);
    }

    /// Adds a read to the alternate allele matching `bases`, creating the allele if it is new.
    /// # Arguments
    /// * `bases` - the alternate allele sequence
    /// * `supporting_read` - the read supporting that sequence
    pub fn add_alternate_support(&mut self, bases: &[u8], supporting_read: SupportingRead) {
        match self.alternate_alleles.iter_mut().find(|a| a.bases() == bases) {
            Some(allele) => allele.add_supporting_read(supporting_read),
            None => self.alternate_alleles.push(CandidateAllele::new(bases.to_vec(), vec![supporting_read]))
        };
    }

    /// Length of the reference interval
    pub fn ref_len(&self) -> i64 {
        self.end - self.start
    }
}

/// A read overlapping a region; only the name is needed for phasing
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ReadRecord {
    read_name: String
}

impl ReadRecord {
    pub fn new(read_name: String) -> ReadRecord {
        ReadRecord {
            read_name
        }
    }

    pub fn read_name(&self) -> &str {
        &self.read_name
    }
}

/// Everything needed to phase one region: the candidates and the reads, both in upstream order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    /// the order this region was loaded in, used for writing outputs in order
    region_index: usize,
    /// a label for the region, e.g. "chr1:1000-2000"
    name: String,
    /// candidate sites for the region
    candidates: Vec<Candidate>,
    /// reads overlapping the region, output labels follow this order
    reads: Vec<ReadRecord>
}

impl Region {
    pub fn new(region_index: usize, name: String, candidates: Vec<Candidate>, reads: Vec<ReadRecord>) -> Region {
        Region {
            region_index,
            name,
            candidates,
            reads
        }
    }

    pub fn region_index(&self) -> usize {
        self.region_index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidates_mut(&mut self) -> &mut Vec<Candidate> {
        &mut self.candidates
    }

    pub fn reads(&self) -> &[ReadRecord] {
        &self.reads
    }

    pub fn reads_mut(&mut self) -> &mut Vec<ReadRecord> {
        &mut self.reads
    }
}

/// Calculates the allele type by comparing the allele length against the candidate reference interval.
/// # Arguments
/// * `bases` - the alternate allele sequence
/// * `candidate` - the candidate the allele belongs to
/// # Errors
/// * if the reference interval is empty or inverted
/// * if `bases` is empty or contains anything other than A, C, G, T, or N
pub fn allele_type_from_candidate(bases: &[u8], candidate: &Candidate) -> Result<AlleleType, PhaseError> {
    let ref_len = candidate.ref_len();
    if ref_len <= 0 {
        return Err(PhaseError::UnclassifiableAllele {
            position: candidate.start(),
            bases: String::from_utf8_lossy(bases).to_string(),
            reason: format!("reference interval {}..{} is empty", candidate.start(), candidate.end())
        });
    }
    if bases.is_empty() {
        return Err(PhaseError::UnclassifiableAllele {
            position: candidate.start(),
            bases: String::new(),
            reason: "allele has no bases".to_string()
        });
    }
    if let Some(&b) = bases.iter().find(|b| !matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'N')) {
        return Err(PhaseError::UnclassifiableAllele {
            position: candidate.start(),
            bases: String::from_utf8_lossy(bases).to_string(),
            reason: format!("unexpected base {:?}", b as char)
        });
    }

    let allele_len = bases.len() as i64;
    let allele_type = match allele_len.cmp(&ref_len) {
        std::cmp::Ordering::Equal => {
            if ref_len == 1 {
                AlleleType::Substitution
            } else {
                AlleleType::Other
            }
        },
        std::cmp::Ordering::Greater => AlleleType::Insertion,
        std::cmp::Ordering::Less => AlleleType::Deletion
    };
    Ok(allele_type)
}

/// Returns the number of alternate alleles that classify as substitutions; unclassifiable alleles are not counted.
pub fn num_substitution_alleles(candidate: &Candidate) -> usize {
    candidate.alternate_alleles().iter()
        .filter(|a| matches!(allele_type_from_candidate(a.bases(), candidate), Ok(AlleleType::Substitution)))
        .count()
}

/// Returns the number of alternate alleles that classify as insertions or deletions.
pub fn num_indel_alleles(candidate: &Candidate) -> usize {
    candidate.alternate_alleles().iter()
        .filter(|a| matches!(
            allele_type_from_candidate(a.bases(), candidate),
            Ok(AlleleType::Insertion) | Ok(AlleleType::Deletion)
        ))
        .count()
}

/// Returns the depth of all substitution alleles, i.e. the number of supporting read entries summed across them.
pub fn substitution_alleles_depth(candidate: &Candidate) -> usize {
    candidate.alternate_alleles().iter()
        .filter(|a| matches!(allele_type_from_candidate(a.bases(), candidate), Ok(AlleleType::Substitution)))
        .map(|a| a.supporting_reads().len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reads(names: &[&str]) -> Vec<SupportingRead> {
        names.iter().map(|n| SupportingRead::new(n.to_string(), false)).collect()
    }

    #[test]
    fn test_allele_type_labels() {
        assert_eq!(AlleleType::Substitution.to_string(), "SUB");
        assert_eq!(AlleleType::Insertion.to_string(), "INS");
        assert_eq!(AlleleType::Deletion.to_string(), "DEL");
        assert_eq!(AlleleType::Reference.to_string(), "REF");
        assert_eq!(AlleleType::Other.to_string(), "OTHER");
    }

    #[test]
    fn test_allele_type_from_candidate() {
        let snv = Candidate::new(10, 11, b"A".to_vec());
        assert_eq!(allele_type_from_candidate(b"C", &snv).unwrap(), AlleleType::Substitution);
        assert_eq!(allele_type_from_candidate(b"ACGT", &snv).unwrap(), AlleleType::Insertion);

        let deletion = Candidate::new(10, 13, b"AGT".to_vec());
        assert_eq!(allele_type_from_candidate(b"A", &deletion).unwrap(), AlleleType::Deletion);
        assert_eq!(allele_type_from_candidate(b"TTT", &deletion).unwrap(), AlleleType::Other);
        assert_eq!(allele_type_from_candidate(b"acgt", &deletion).unwrap(), AlleleType::Insertion);
    }

    #[test]
    fn test_unclassifiable_alleles() {
        let snv = Candidate::new(10, 11, b"A".to_vec());
        assert!(matches!(
            allele_type_from_candidate(b"", &snv),
            Err(PhaseError::UnclassifiableAllele { position: 10, .. })
        ));
        assert!(matches!(
            allele_type_from_candidate(b"<DEL>", &snv),
            Err(PhaseError::UnclassifiableAllele { .. })
        ));

        let inverted = Candidate::new(10, 10, b"".to_vec());
        assert!(matches!(
            allele_type_from_candidate(b"A", &inverted),
            Err(PhaseError::UnclassifiableAllele { .. })
        ));
    }

    #[test]
    fn test_add_support() {
        let mut candidate = Candidate::new(5, 6, b"G".to_vec());
        candidate.add_reference_support(SupportingRead::new("r1".to_string(), false));
        candidate.add_alternate_support(b"T", SupportingRead::new("r2".to_string(), false));
        candidate.add_alternate_support(b"T", SupportingRead::new("r3".to_string(), true));
        candidate.add_alternate_support(b"GAA", SupportingRead::new("r4".to_string(), false));

        assert_eq!(candidate.reference_support(), &reads(&["r1"])[..]);
        assert_eq!(candidate.alternate_alleles().len(), 2);
        assert_eq!(candidate.alternate_alleles()[0].bases(), b"T");
        assert_eq!(candidate.alternate_alleles()[0].supporting_reads().len(), 2);
        assert!(candidate.alternate_alleles()[0].supporting_reads()[1].is_low_quality());
        assert_eq!(candidate.alternate_alleles()[1].bases(), b"GAA");
    }

    #[test]
    fn test_candidate_summaries() {
        let candidate = Candidate::new(20, 21, b"A".to_vec())
            .with_reference_support(reads(&["r1", "r2"]))
            .with_alternate_allele(CandidateAllele::new(b"C".to_vec(), reads(&["r3", "r4"])))
            .with_alternate_allele(CandidateAllele::new(b"G".to_vec(), reads(&["r5"])))
            .with_alternate_allele(CandidateAllele::new(b"ATT".to_vec(), reads(&["r6"])));

        assert_eq!(num_substitution_alleles(&candidate), 2);
        assert_eq!(num_indel_alleles(&candidate), 1);
        assert_eq!(substitution_alleles_depth(&candidate), 3);
    }
}
