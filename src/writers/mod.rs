
/// Contains the ordered writer for per-region read labels
pub mod phase_label_writer;
/// Contains writer for phasing statistics for underlying algorithms
pub mod phase_stats;
