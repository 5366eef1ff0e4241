/// CLI functionality and checks
pub mod cli;
/// Contains the candidate, read, and allele graph data types used by the engine
pub mod data_types;
/// Pairwise dynamic programming over the allele graph that finds the best two-path partition
pub mod dp_phaser;
/// Reconciles per-region read labels into one label per read
pub mod phase_merger;
/// Organizes primary workflow for a region including graph construction, pruning, scoring, and labeling
pub mod phaser;
/// Loads regions from the candidate and read tables
pub mod region_parsing;
/// Contains all the various output writer functionality
pub mod writers;
