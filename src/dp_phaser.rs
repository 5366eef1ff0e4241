use crate::data_types::allele_graph::{Allele, AlleleGraph};
use crate::data_types::read_index::ReadIndex;

use log::{debug, trace};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// An unordered pair of vertices at the same layer, stored with `first` <= `second`.
/// In a score entry, phase 1 belongs to `first` and phase 2 to `second`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VertexPair {
    first: usize,
    second: usize
}

impl VertexPair {
    /// Creates the canonical pair for two vertices, in either order
    pub fn new(a: usize, b: usize) -> VertexPair {
        if a <= b {
            VertexPair { first: a, second: b }
        } else {
            VertexPair { first: b, second: a }
        }
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn second(&self) -> usize {
        self.second
    }
}

/// The best way found so far to reach a vertex pair
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Score {
    /// cumulative high-quality reads credited along the best path
    score: u64,
    /// the predecessor vertices feeding phase 1 and phase 2 of this entry, None for seeds
    from: Option<(usize, usize)>,
    /// reads credited to phase 1 and phase 2 at this pair, low-quality reads included
    read_support: [HashSet<ReadIndex>; 2]
}

impl Score {
    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn from(&self) -> Option<(usize, usize)> {
        self.from
    }

    /// The reads credited to a phase at this entry.
    /// # Arguments
    /// * `phase` - 0 for phase 1, 1 for phase 2
    pub fn phase_reads(&self, phase: usize) -> &HashSet<ReadIndex> {
        &self.read_support[phase]
    }
}

/// Score table over every reachable vertex pair, filled layer by layer in position order.
#[derive(Debug, Default)]
pub struct ScoreTable {
    /// all entries, keyed by canonical pair
    scores: HashMap<VertexPair, Score>,
    /// the sorted keys at each layer
    layer_keys: Vec<Vec<VertexPair>>,
    /// the (sink, sink) key once the table is complete, None if there are no layers
    terminal: Option<VertexPair>
}

impl ScoreTable {
    /// Scores every reachable pair in the graph.
    /// Candidates are visited in a fixed order (predecessor pair ascending, then phase 1 head, then phase 2 head)
    /// and an entry is only replaced by a strictly better score, so the first candidate wins ties.
    /// # Arguments
    /// * `graph` - the pruned allele graph
    pub fn from_graph(graph: &AlleleGraph) -> ScoreTable {
        let mut table: ScoreTable = Default::default();
        if graph.num_layers() == 0 {
            return table;
        }

        // seed every distinct pair at the first position
        let first_layer = graph.layer(0);
        let mut seeds: HashMap<VertexPair, Score> = Default::default();
        for (i, &a) in first_layer.iter().enumerate() {
            for &b in first_layer[(i+1)..].iter() {
                let (key, score) = seed_score(graph, a, b);
                insert_if_better(&mut seeds, key, score);
            }
        }
        table.push_layer(seeds);

        for layer_index in 1..graph.num_layers() {
            let mut layer_scores: HashMap<VertexPair, Score> = Default::default();
            for prev_key in table.layer_keys[layer_index - 1].iter() {
                let prev = &table.scores[prev_key];
                let heads1 = sorted_targets(graph, prev_key.first);
                let heads2 = sorted_targets(graph, prev_key.second);
                for &h1 in heads1.iter() {
                    for &h2 in heads2.iter() {
                        if h1 == h2 {
                            continue;
                        }
                        let (key, score) = extend_score(graph, *prev_key, prev, h1, h2);
                        insert_if_better(&mut layer_scores, key, score);
                    }
                }
            }

            if layer_scores.is_empty() {
                // nothing reaches this layer, so bridge every pair from the best entry so far
                if let Some((best_key, best)) = table.best_in_layer(layer_index - 1) {
                    debug!(
                        "Chain break before position {}, bridging from score {}",
                        graph.positions()[layer_index], best.score
                    );
                    let layer = graph.layer(layer_index);
                    for (i, &a) in layer.iter().enumerate() {
                        for &b in layer[(i+1)..].iter() {
                            for (h1, h2) in [(a, b), (b, a)] {
                                let (key, score) = extend_score(graph, best_key, best, h1, h2);
                                insert_if_better(&mut layer_scores, key, score);
                            }
                        }
                    }
                }
            }
            table.push_layer(layer_scores);
        }

        // close every last-layer pair into the sink
        let sink = graph.sink();
        let mut terminal: Option<Score> = None;
        if let Some(last_keys) = table.layer_keys.last() {
            for prev_key in last_keys.iter() {
                let reaches_sink = graph.out_edges(prev_key.first).any(|e| e.to() == sink)
                    && graph.out_edges(prev_key.second).any(|e| e.to() == sink);
                if !reaches_sink {
                    continue;
                }
                let prev = &table.scores[prev_key];
                if terminal.as_ref().map_or(true, |t| prev.score > t.score) {
                    terminal = Some(Score {
                        score: prev.score,
                        from: Some((prev_key.first, prev_key.second)),
                        read_support: Default::default()
                    });
                }
            }
        }

        if let Some(score) = terminal {
            let key = VertexPair::new(sink, sink);
            table.scores.insert(key, score);
            table.terminal = Some(key);
        }
        table
    }

    /// Appends a completed layer to the table.
    fn push_layer(&mut self, layer_scores: HashMap<VertexPair, Score>) {
        let mut keys: Vec<VertexPair> = layer_scores.keys().cloned().collect();
        keys.sort();
        self.scores.extend(layer_scores);
        self.layer_keys.push(keys);
    }

    /// Returns the highest scoring entry at a layer, preferring the lowest key on ties.
    fn best_in_layer(&self, layer_index: usize) -> Option<(VertexPair, &Score)> {
        let mut best: Option<(VertexPair, &Score)> = None;
        for key in self.layer_keys.get(layer_index)?.iter() {
            let score = &self.scores[key];
            if best.map_or(true, |(_k, s)| score.score > s.score) {
                best = Some((*key, score));
            }
        }
        best
    }

    pub fn get(&self, key: &VertexPair) -> Option<&Score> {
        self.scores.get(key)
    }

    /// Number of entries in the table, including the terminal one
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn layer_keys(&self, layer_index: usize) -> &[VertexPair] {
        &self.layer_keys[layer_index]
    }

    /// The (sink, sink) entry, if the table has one
    pub fn terminal(&self) -> Option<&Score> {
        self.terminal.and_then(|key| self.scores.get(&key))
    }

    /// The best total score, if any pair was scored
    pub fn best_score(&self) -> Option<u64> {
        self.terminal().map(|t| t.score)
    }
}

/// The two phased vertices at one layer of the best path, with the reads credited to each.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PhasedLayer {
    /// the candidate position of this layer
    position: i64,
    /// the phase 1 and phase 2 vertices
    vertices: [usize; 2],
    /// the reads credited to phase 1 and phase 2
    reads: [HashSet<ReadIndex>; 2]
}

impl PhasedLayer {
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn vertices(&self) -> [usize; 2] {
        self.vertices
    }

    /// # Arguments
    /// * `phase` - 0 for phase 1, 1 for phase 2
    pub fn reads(&self, phase: usize) -> &HashSet<ReadIndex> {
        &self.reads[phase]
    }
}

/// The resolved best path, one entry per layer in position order
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PhasedPath {
    layers: Vec<PhasedLayer>,
    score: u64
}

impl PhasedPath {
    /// Walks the predecessor links back from the terminal entry.
    /// Entries are stored canonically, so the walk tracks which stored side belongs to each path phase.
    /// Returns None if the table has no terminal entry.
    /// # Arguments
    /// * `graph` - the graph that was scored
    /// * `table` - the completed score table
    /// # Panics
    /// * if a predecessor link points at a missing entry
    /// * if the path does not visit every layer exactly once
    pub fn resolve(graph: &AlleleGraph, table: &ScoreTable) -> Option<PhasedPath> {
        let terminal = table.terminal()?;
        let mut reversed: Vec<([usize; 2], [HashSet<ReadIndex>; 2])> = Vec::with_capacity(graph.num_layers());
        let mut next: Option<(usize, usize)> = terminal.from;
        while let Some((p1, p2)) = next {
            let key = VertexPair::new(p1, p2);
            let entry = match table.get(&key) {
                Some(e) => e,
                None => panic!("missing score entry for {:?}", key)
            };

            if p1 > p2 {
                // path phase 1 is stored on the second side of this entry
                reversed.push(([p1, p2], [entry.read_support[1].clone(), entry.read_support[0].clone()]));
                next = entry.from.map(|(f1, f2)| (f2, f1));
            } else {
                reversed.push(([p1, p2], entry.read_support.clone()));
                next = entry.from;
            }
        }

        assert_eq!(reversed.len(), graph.num_layers(), "best path must cover every layer");
        let layers: Vec<PhasedLayer> = reversed.into_iter().rev()
            .zip(graph.positions().iter())
            .map(|((vertices, reads), &position)| PhasedLayer {
                position,
                vertices,
                reads
            })
            .collect();

        Some(PhasedPath {
            layers,
            score: terminal.score
        })
    }

    pub fn layers(&self) -> &[PhasedLayer] {
        &self.layers
    }

    pub fn score(&self) -> u64 {
        self.score
    }
}

/// Returns the out-neighbors of `v` in ascending index order.
fn sorted_targets(graph: &AlleleGraph, v: usize) -> Vec<usize> {
    let mut targets: Vec<usize> = graph.out_edges(v).map(|e| e.to()).collect();
    targets.sort_unstable();
    targets
}

/// Keeps `score` at `key` unless an existing entry is at least as good.
fn insert_if_better(scores: &mut HashMap<VertexPair, Score>, key: VertexPair, score: Score) {
    match scores.get(&key) {
        Some(existing) if existing.score >= score.score => {},
        _ => {
            scores.insert(key, score);
        }
    };
}

/// Counts the high-quality supports of `allele` from reads in `credited`.
fn credited_score(allele: &Allele, credited: &HashSet<ReadIndex>) -> u64 {
    allele.read_support().iter()
        .filter(|rs| !rs.is_low_quality() && credited.contains(&rs.read_index()))
        .count() as u64
}

/// Removes any read present in both sets from both.
fn remove_shared(n1: &mut HashSet<ReadIndex>, n2: &mut HashSet<ReadIndex>) {
    let shared: Vec<ReadIndex> = n1.intersection(n2).cloned().collect();
    for read_index in shared.iter() {
        n1.remove(read_index);
        n2.remove(read_index);
    }
}

/// Finds the reads supporting `allele` that may be credited to `phase` after `prev`.
/// A read qualifies if it was credited to the same phase at `prev`,
/// or if this is its first allele and it was not credited to the other phase.
fn find_supporting_reads(allele: &Allele, prev: &Score, phase: usize) -> HashSet<ReadIndex> {
    let same = &prev.read_support[phase];
    let other = &prev.read_support[1 - phase];
    allele.read_support().iter()
        .filter(|rs| same.contains(&rs.read_index()) || (rs.is_first_allele() && !other.contains(&rs.read_index())))
        .map(|rs| rs.read_index())
        .collect()
}

/// Builds the seed entry for two vertices at the first layer.
fn seed_score(graph: &AlleleGraph, a: usize, b: usize) -> (VertexPair, Score) {
    let allele_a = graph.vertex_allele(a);
    let allele_b = graph.vertex_allele(b);
    let mut n1: HashSet<ReadIndex> = allele_a.read_support().iter().map(|rs| rs.read_index()).collect();
    let mut n2: HashSet<ReadIndex> = allele_b.read_support().iter().map(|rs| rs.read_index()).collect();
    remove_shared(&mut n1, &mut n2);

    let score = credited_score(allele_a, &n1) + credited_score(allele_b, &n2);
    let (key, read_support) = if a <= b {
        (VertexPair::new(a, b), [n1, n2])
    } else {
        (VertexPair::new(a, b), [n2, n1])
    };
    (key, Score { score, from: None, read_support })
}

/// Extends the entry at `prev_key` with phase 1 moving to `h1` and phase 2 moving to `h2`.
/// The result is keyed canonically, so a reversed head pair is stored with its sides swapped.
fn extend_score(graph: &AlleleGraph, prev_key: VertexPair, prev: &Score, h1: usize, h2: usize) -> (VertexPair, Score) {
    let allele1 = graph.vertex_allele(h1);
    let allele2 = graph.vertex_allele(h2);
    let mut n1 = find_supporting_reads(allele1, prev, 0);
    let mut n2 = find_supporting_reads(allele2, prev, 1);
    remove_shared(&mut n1, &mut n2);

    let score = prev.score + credited_score(allele1, &n1) + credited_score(allele2, &n2);
    trace!("Pair ({}, {}) from {:?} scores {}", h1, h2, prev_key, score);
    if h1 <= h2 {
        (VertexPair::new(h1, h2), Score {
            score,
            from: Some((prev_key.first, prev_key.second)),
            read_support: [n1, n2]
        })
    } else {
        (VertexPair::new(h1, h2), Score {
            score,
            from: Some((prev_key.second, prev_key.first)),
            read_support: [n2, n1]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::allele_graph::ReadSupport;
    use crate::data_types::candidates::AlleleType;

    fn hq(reads: &[ReadIndex]) -> Vec<ReadSupport> {
        reads.iter().map(|&r| ReadSupport::new(r, false)).collect()
    }

    /// a reference and alternate allele at one position
    fn het(position: i64, ref_reads: Vec<ReadSupport>, alt_reads: Vec<ReadSupport>) -> Vec<Allele> {
        vec![
            Allele::new(AlleleType::Reference, position, b"A".to_vec(), ref_reads),
            Allele::new(AlleleType::Substitution, position, b"C".to_vec(), alt_reads)
        ]
    }

    fn set(reads: &[ReadIndex]) -> HashSet<ReadIndex> {
        reads.iter().cloned().collect()
    }

    #[test]
    fn test_vertex_pair() {
        let pair = VertexPair::new(5, 2);
        assert_eq!(pair.first(), 2);
        assert_eq!(pair.second(), 5);
        assert_eq!(pair, VertexPair::new(2, 5));
        assert!(VertexPair::new(1, 9) < VertexPair::new(2, 3));
    }

    #[test]
    fn test_two_position_table() {
        let mut alleles = het(100, hq(&[0, 1]), hq(&[2, 3]));
        alleles.extend(het(200, hq(&[0, 1]), hq(&[2, 3])));
        let graph = AlleleGraph::from_alleles(alleles, 4);
        let table = ScoreTable::from_graph(&graph);

        let seed = table.get(&VertexPair::new(1, 2)).unwrap();
        assert_eq!(seed.score(), 4);
        assert_eq!(seed.from(), None);
        assert_eq!(seed.phase_reads(0), &set(&[0, 1]));

        let second = table.get(&VertexPair::new(3, 4)).unwrap();
        assert_eq!(second.score(), 8);
        assert_eq!(second.from(), Some((1, 2)));
        assert_eq!(second.phase_reads(1), &set(&[2, 3]));

        // seed + one pair + terminal
        assert_eq!(table.len(), 3);
        assert_eq!(table.best_score(), Some(8));
        assert_eq!(table.terminal().unwrap().from(), Some((3, 4)));
    }

    #[test]
    fn test_crossed_heads() {
        // phase 1 reads move from the alt at 100 to the reference at 200
        let mut alleles = het(100, hq(&[0, 1]), hq(&[2, 3]));
        alleles.extend(het(200, hq(&[2, 3]), hq(&[0, 1])));
        let graph = AlleleGraph::from_alleles(alleles, 4);
        let table = ScoreTable::from_graph(&graph);

        let entry = table.get(&VertexPair::new(3, 4)).unwrap();
        assert_eq!(entry.score(), 8);
        // stored canonically: vertex 3 continues from vertex 2
        assert_eq!(entry.from(), Some((2, 1)));
        assert_eq!(entry.phase_reads(0), &set(&[2, 3]));

        let path = PhasedPath::resolve(&graph, &table).unwrap();
        assert_eq!(path.score(), 8);
        assert_eq!(path.layers().len(), 2);
        // the path keeps one orientation throughout: reads 2 and 3 stay on phase 1
        assert_eq!(path.layers()[0].vertices(), [2, 1]);
        assert_eq!(path.layers()[0].reads(0), &set(&[2, 3]));
        assert_eq!(path.layers()[1].vertices(), [3, 4]);
        assert_eq!(path.layers()[1].reads(0), &set(&[2, 3]));
        assert_eq!(path.layers()[1].position(), 200);
    }

    #[test]
    fn test_low_quality_no_score() {
        let mut alleles = het(100, hq(&[0]), vec![ReadSupport::new(1, true)]);
        alleles.extend(het(200, hq(&[0]), vec![ReadSupport::new(1, true)]));
        let graph = AlleleGraph::from_alleles(alleles, 2);
        let table = ScoreTable::from_graph(&graph);
        assert_eq!(table.best_score(), Some(2));

        // low-quality reads are still carried forward for continuity
        let path = PhasedPath::resolve(&graph, &table).unwrap();
        assert_eq!(path.layers()[1].reads(1), &set(&[1]));
    }

    #[test]
    fn test_three_allele_seeds() {
        let alleles = vec![
            Allele::new(AlleleType::Reference, 100, b"A".to_vec(), hq(&[0])),
            Allele::new(AlleleType::Substitution, 100, b"C".to_vec(), hq(&[1])),
            Allele::new(AlleleType::Substitution, 100, b"G".to_vec(), hq(&[2, 3])),
            Allele::new(AlleleType::Reference, 200, b"T".to_vec(), hq(&[1])),
            Allele::new(AlleleType::Substitution, 200, b"G".to_vec(), hq(&[2, 3]))
        ];
        let graph = AlleleGraph::from_alleles(alleles, 4);
        let table = ScoreTable::from_graph(&graph);
        assert_eq!(table.layer_keys(0), &[VertexPair::new(1, 2), VertexPair::new(1, 3), VertexPair::new(2, 3)]);

        let path = PhasedPath::resolve(&graph, &table).unwrap();
        assert_eq!(path.score(), 6);
        assert_eq!(path.layers()[0].vertices(), [2, 3]);
        assert_eq!(path.layers()[1].vertices(), [4, 5]);
    }

    #[test]
    fn test_chain_break_bridge() {
        // positions 100/200 and 400/500 are linked, 300 is only seen by two reads and collapses
        let mut alleles = het(100, hq(&[0, 1]), hq(&[2, 3]));
        alleles.extend(het(200, hq(&[0, 1]), hq(&[2, 3])));
        alleles.extend(het(300, hq(&[8]), hq(&[9])));
        alleles.extend(het(400, hq(&[4, 5]), hq(&[6, 7])));
        alleles.extend(het(500, hq(&[4, 5]), hq(&[6, 7])));
        let mut graph = AlleleGraph::from_alleles(alleles, 10);
        graph.prune(1);
        assert_eq!(graph.positions(), &[100, 200, 400, 500]);

        let table = ScoreTable::from_graph(&graph);
        let bridged = table.get(&VertexPair::new(5, 6)).unwrap();
        assert_eq!(bridged.from(), Some((3, 4)));
        assert_eq!(bridged.score(), 12);
        assert_eq!(table.best_score(), Some(16));

        let path = PhasedPath::resolve(&graph, &table).unwrap();
        assert_eq!(path.layers().len(), 4);
        assert_eq!(path.layers()[2].vertices(), [5, 6]);
        assert_eq!(path.layers()[3].reads(1), &set(&[6, 7]));
    }

    /// three alleles at 100 and three at 200, every allele with its own reads so many pairs tie
    fn tie_graph(extra_c_reads: &[ReadIndex]) -> AlleleGraph {
        let mut c_reads = vec![2];
        c_reads.extend_from_slice(extra_c_reads);
        let alleles = vec![
            Allele::new(AlleleType::Reference, 100, b"A".to_vec(), hq(&[0])),
            Allele::new(AlleleType::Substitution, 100, b"C".to_vec(), hq(&[1])),
            Allele::new(AlleleType::Substitution, 100, b"G".to_vec(), hq(&c_reads)),
            Allele::new(AlleleType::Reference, 200, b"A".to_vec(), hq(&[3])),
            Allele::new(AlleleType::Substitution, 200, b"C".to_vec(), hq(&[4])),
            Allele::new(AlleleType::Substitution, 200, b"G".to_vec(), hq(&[5]))
        ];
        AlleleGraph::from_alleles(alleles, 8)
    }

    #[test]
    fn test_tie_keeps_lowest_predecessor() {
        let graph = tie_graph(&[]);
        let table = ScoreTable::from_graph(&graph);
        for key in table.layer_keys(0).iter() {
            assert_eq!(table.get(key).unwrap().score(), 2);
        }

        // (1, 2), (1, 3), and (2, 3) all reach (4, 5) with 4 in both orientations
        let entry = table.get(&VertexPair::new(4, 5)).unwrap();
        assert_eq!(entry.score(), 4);
        assert_eq!(entry.from(), Some((1, 2)));
        assert_eq!(entry.phase_reads(0), &set(&[3]));
        assert_eq!(entry.phase_reads(1), &set(&[4]));
    }

    #[test]
    fn test_strictly_better_predecessor_replaces() {
        // the extra read on vertex 3 makes (1, 3) and (2, 3) better than (1, 2), and they tie with each other
        let graph = tie_graph(&[6]);
        let table = ScoreTable::from_graph(&graph);
        assert_eq!(table.get(&VertexPair::new(1, 2)).unwrap().score(), 2);
        assert_eq!(table.get(&VertexPair::new(1, 3)).unwrap().score(), 3);
        assert_eq!(table.get(&VertexPair::new(2, 3)).unwrap().score(), 3);

        let entry = table.get(&VertexPair::new(4, 5)).unwrap();
        assert_eq!(entry.score(), 5);
        assert_eq!(entry.from(), Some((1, 3)));
    }

    #[test]
    fn test_terminal_tie_keeps_lowest_pair() {
        let graph = tie_graph(&[]);
        let table = ScoreTable::from_graph(&graph);
        assert_eq!(table.layer_keys(1), &[VertexPair::new(4, 5), VertexPair::new(4, 6), VertexPair::new(5, 6)]);
        for key in table.layer_keys(1).iter() {
            assert_eq!(table.get(key).unwrap().score(), 4);
        }
        assert_eq!(table.terminal().unwrap().from(), Some((4, 5)));

        let path = PhasedPath::resolve(&graph, &table).unwrap();
        assert_eq!(path.layers()[0].vertices(), [1, 2]);
        assert_eq!(path.layers()[1].vertices(), [4, 5]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = AlleleGraph::from_alleles(vec![], 0);
        let table = ScoreTable::from_graph(&graph);
        assert!(table.is_empty());
        assert_eq!(table.best_score(), None);
        assert_eq!(PhasedPath::resolve(&graph, &table), None);
    }
}
