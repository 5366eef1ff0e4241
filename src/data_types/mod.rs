
/// Layered allele graph built from candidates, including pruning and DOT rendering
pub mod allele_graph;
/// Contains Candidate and Region types as well as allele classification
pub mod candidates;
/// Dense read ids for a region
pub mod read_index;
