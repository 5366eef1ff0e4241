use crate::data_types::candidates::{allele_type_from_candidate, AlleleType, Candidate, SupportingRead};
use crate::data_types::read_index::{ReadIndex, ReadIndexer};
use crate::phaser::PhaseError;

use log::{debug, trace};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::collections::BTreeSet;
use std::fmt::Write;

/// One read's support for one allele vertex
#[derive(Clone, Copy, Debug, Eq)]
pub struct ReadSupport {
    /// the identifier of the supporting read
    read_index: ReadIndex,
    /// if true, the support does not contribute to scores or edge weights
    is_low_quality: bool,
    /// if true, this allele is at the first eligible position the read touches
    is_first_allele: bool
}

impl PartialEq for ReadSupport {
    // the first-allele flag is derived from graph shape, so it is not part of identity
    fn eq(&self, other: &Self) -> bool {
        self.read_index == other.read_index && self.is_low_quality == other.is_low_quality
    }
}

impl ReadSupport {
    pub fn new(read_index: ReadIndex, is_low_quality: bool) -> ReadSupport {
        ReadSupport {
            read_index,
            is_low_quality,
            is_first_allele: false
        }
    }

    pub fn read_index(&self) -> ReadIndex {
        self.read_index
    }

    pub fn is_low_quality(&self) -> bool {
        self.is_low_quality
    }

    pub fn is_first_allele(&self) -> bool {
        self.is_first_allele
    }
}

/// Contains the core data for an allele vertex.
/// Vertices are keyed by (position, type, bases) within a graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Allele {
    /// the type of the allele
    allele_type: AlleleType,
    /// the candidate start position
    position: i64,
    /// the allele sequence
    bases: Vec<u8>,
    /// all reads supporting this allele, in the order they were attached
    read_support: Vec<ReadSupport>
}

impl Allele {
    pub fn new(allele_type: AlleleType, position: i64, bases: Vec<u8>, read_support: Vec<ReadSupport>) -> Allele {
        Allele {
            allele_type,
            position,
            bases,
            read_support
        }
    }

    pub fn allele_type(&self) -> AlleleType {
        self.allele_type
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn read_support(&self) -> &[ReadSupport] {
        &self.read_support
    }

    /// Returns the support entry for a read if this allele is supported by it
    pub fn support_for(&self, read_index: ReadIndex) -> Option<&ReadSupport> {
        self.read_support.iter().find(|rs| rs.read_index == read_index)
    }

    /// Number of reads supporting this allele with high quality
    pub fn high_quality_count(&self) -> u64 {
        self.read_support.iter().filter(|rs| !rs.is_low_quality).count() as u64
    }

    fn same_key(&self, other: &Allele) -> bool {
        self.position == other.position && self.allele_type == other.allele_type && self.bases == other.bases
    }

    fn high_quality_reads(&self) -> HashSet<ReadIndex> {
        self.read_support.iter()
            .filter(|rs| !rs.is_low_quality)
            .map(|rs| rs.read_index)
            .collect()
    }
}

/// An arena record; source and sink bracket the allele layers
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GraphVertex {
    Source,
    Sink,
    Allele(Allele)
}

impl GraphVertex {
    pub fn allele(&self) -> Option<&Allele> {
        match self {
            GraphVertex::Allele(allele) => Some(allele),
            _ => None
        }
    }

    fn label(&self) -> String {
        match self {
            GraphVertex::Source => "source".to_string(),
            GraphVertex::Sink => "sink".to_string(),
            GraphVertex::Allele(allele) => format!(
                "{} {} {}", allele.allele_type, allele.position, String::from_utf8_lossy(&allele.bases)
            )
        }
    }
}

/// A weighted directed edge between two arena indices
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GraphEdge {
    from: usize,
    to: usize,
    /// for inter-position edges, the number of reads with high-quality support at both ends;
    /// for boundary edges, the high-quality support of the allele end
    weight: u64
}

impl GraphEdge {
    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

/// One entry in the read-to-alleles map
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlleleSupport {
    /// arena index of the supported allele vertex
    vertex: usize,
    /// the layer (eligible position index) of that vertex
    layer: usize,
    /// the support entry as stored on the vertex
    read_support: ReadSupport
}

impl AlleleSupport {
    pub fn vertex(&self) -> usize {
        self.vertex
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn read_support(&self) -> &ReadSupport {
        &self.read_support
    }
}

/// A layered DAG of alleles for one region.
/// Index 0 is the source, the last index is the sink, and allele vertices are in between grouped by position.
/// Edges only connect consecutive layers, plus source-to-first-layer and last-layer-to-sink.
#[derive(Clone, Debug, Default)]
pub struct AlleleGraph {
    /// the vertex arena
    vertices: Vec<GraphVertex>,
    /// all edges in the graph
    edges: Vec<GraphEdge>,
    /// for each vertex, indices into `edges` leaving it, sorted by target
    out_edges: Vec<Vec<usize>>,
    /// for each vertex, indices into `edges` entering it, sorted by origin
    in_edges: Vec<Vec<usize>>,
    /// the eligible positions, increasing
    positions: Vec<i64>,
    /// the vertex indices at each eligible position
    layers: Vec<Vec<usize>>,
    /// the layer of each vertex, None for source and sink
    vertex_layers: Vec<Option<usize>>,
    /// for each read identifier, the alleles it supports in layer order
    read_to_alleles: Vec<Vec<AlleleSupport>>,
    /// positions with a single observed allele, excluded from the layers
    hom_positions: BTreeSet<i64>,
    /// the alleles at homozygous positions
    hom_alleles: Vec<Allele>,
    /// positions removed by pruning
    collapsed_positions: BTreeSet<i64>
}

impl AlleleGraph {
    /// Builds the graph for a region from its candidates.
    /// Alleles with no supporting reads are not observed and do not get a vertex.
    /// # Arguments
    /// * `candidates` - the candidate sites for the region
    /// * `indexer` - resolves supporting read names to identifiers
    /// # Errors
    /// * if a supporting read name is not known to `indexer`
    /// * if any allele cannot be classified
    pub fn from_candidates(candidates: &[Candidate], indexer: &ReadIndexer) -> Result<AlleleGraph, PhaseError> {
        let mut sorted_candidates: Vec<&Candidate> = candidates.iter().collect();
        sorted_candidates.sort_by_key(|c| c.start());

        let mut alleles: Vec<Allele> = vec![];
        // key to index in `alleles`, cleared each time the position changes
        let mut position_lookup: HashMap<(AlleleType, Vec<u8>), usize> = Default::default();
        let mut current_position: Option<i64> = None;

        for candidate in sorted_candidates.into_iter() {
            if current_position != Some(candidate.start()) {
                position_lookup.clear();
                current_position = Some(candidate.start());
            }

            // this validates the reference interval even for reference-only candidates
            allele_type_from_candidate(candidate.reference_bases(), candidate)?;
            add_candidate_allele(
                &mut alleles, &mut position_lookup, indexer,
                AlleleType::Reference, candidate.start(), candidate.reference_bases(), candidate.reference_support()
            )?;

            for alt in candidate.alternate_alleles().iter() {
                let classified = allele_type_from_candidate(alt.bases(), candidate)?;
                let allele_type = if alt.bases() == candidate.reference_bases() {
                    AlleleType::Reference
                } else {
                    classified
                };
                add_candidate_allele(
                    &mut alleles, &mut position_lookup, indexer,
                    allele_type, candidate.start(), alt.bases(), alt.supporting_reads()
                )?;
            }
        }

        Ok(Self::from_alleles(alleles, indexer.num_reads()))
    }

    /// Builds the graph from pre-built allele vertices.
    /// Vertex order within a position follows the order of `alleles`.
    /// # Arguments
    /// * `alleles` - every observed allele, grouped by position in any order
    /// * `num_reads` - the number of read identifiers; all supports must be below this
    /// # Panics
    /// * if two alleles share a key
    /// * if any support references a read identifier >= `num_reads`
    pub fn from_alleles(mut alleles: Vec<Allele>, num_reads: usize) -> AlleleGraph {
        alleles.sort_by_key(|a| a.position);

        let mut layers: Vec<Vec<Allele>> = vec![];
        for allele in alleles.into_iter() {
            assert!(
                allele.read_support.iter().all(|rs| (rs.read_index as usize) < num_reads),
                "read identifier out of range at {}", allele.position
            );
            match layers.last_mut() {
                Some(layer) if layer[0].position == allele.position => {
                    assert!(!layer.iter().any(|a| a.same_key(&allele)), "duplicate allele key at {}", allele.position);
                    layer.push(allele);
                },
                _ => layers.push(vec![allele])
            };
        }

        let mut hom_positions: BTreeSet<i64> = Default::default();
        let mut hom_alleles: Vec<Allele> = vec![];
        let mut eligible: Vec<Vec<Allele>> = Vec::with_capacity(layers.len());
        for mut layer in layers.into_iter() {
            if layer.len() == 1 {
                trace!("Position {} is homozygous", layer[0].position);
                hom_positions.insert(layer[0].position);
                hom_alleles.append(&mut layer);
            } else {
                eligible.push(layer);
            }
        }

        let mut graph = Self::assemble(eligible, num_reads, None);
        graph.hom_positions = hom_positions;
        graph.hom_alleles = hom_alleles;
        graph
    }

    /// Lays out the arena from grouped layers and connects it.
    /// # Arguments
    /// * `layers` - allele groups in increasing position order
    /// * `num_reads` - the number of read identifiers
    /// * `inter_edges` - if provided, the (from, to, weight) edges between layers in the new numbering;
    ///   otherwise every pair of alleles in consecutive layers is connected
    fn assemble(layers: Vec<Vec<Allele>>, num_reads: usize, inter_edges: Option<Vec<(usize, usize, u64)>>) -> AlleleGraph {
        let mut graph = AlleleGraph {
            read_to_alleles: vec![vec![]; num_reads],
            ..Default::default()
        };

        let source = graph.add_vertex(GraphVertex::Source, None);
        for (layer_index, layer) in layers.into_iter().enumerate() {
            graph.positions.push(layer[0].position);
            let mut layer_vertices: Vec<usize> = Vec::with_capacity(layer.len());
            for allele in layer.into_iter() {
                layer_vertices.push(graph.add_vertex(GraphVertex::Allele(allele), Some(layer_index)));
            }
            graph.layers.push(layer_vertices);
        }
        let sink = graph.add_vertex(GraphVertex::Sink, None);

        if let Some(first_layer) = graph.layers.first().cloned() {
            for v in first_layer.into_iter() {
                let weight = graph.high_quality_count(v);
                graph.add_edge(source, v, weight);
            }
        }

        let mut inter_edges: Vec<(usize, usize, u64)> = match inter_edges {
            Some(edges) => edges,
            None => {
                let mut edges = vec![];
                for window in graph.layers.windows(2) {
                    for &u in window[0].iter() {
                        let u_reads = graph.vertex_allele(u).high_quality_reads();
                        for &v in window[1].iter() {
                            let weight = graph.vertex_allele(v).read_support.iter()
                                .filter(|rs| !rs.is_low_quality && u_reads.contains(&rs.read_index))
                                .count() as u64;
                            edges.push((u, v, weight));
                        }
                    }
                }
                edges
            }
        };
        inter_edges.sort();
        for (from, to, weight) in inter_edges.into_iter() {
            graph.add_edge(from, to, weight);
        }

        if let Some(last_layer) = graph.layers.last().cloned() {
            for v in last_layer.into_iter() {
                let weight = graph.high_quality_count(v);
                graph.add_edge(v, sink, weight);
            }
        }

        graph.index_read_support();
        graph
    }

    fn add_vertex(&mut self, vertex: GraphVertex, layer: Option<usize>) -> usize {
        let new_index = self.vertices.len();
        self.vertices.push(vertex);
        self.vertex_layers.push(layer);
        self.out_edges.push(vec![]);
        self.in_edges.push(vec![]);
        new_index
    }

    fn add_edge(&mut self, from: usize, to: usize, weight: u64) {
        let edge_index = self.edges.len();
        self.edges.push(GraphEdge { from, to, weight });
        self.out_edges[from].push(edge_index);
        self.in_edges[to].push(edge_index);
    }

    /// Rebuilds the read-to-alleles map and recomputes the first-allele flags.
    fn index_read_support(&mut self) {
        let num_reads = self.read_to_alleles.len();
        let mut first_layer: Vec<Option<usize>> = vec![None; num_reads];
        for (v, vertex) in self.vertices.iter().enumerate() {
            if let (GraphVertex::Allele(allele), Some(layer)) = (vertex, self.vertex_layers[v]) {
                for rs in allele.read_support.iter() {
                    let entry = &mut first_layer[rs.read_index as usize];
                    if entry.is_none() {
                        *entry = Some(layer);
                    }
                }
            }
        }

        let mut read_to_alleles: Vec<Vec<AlleleSupport>> = vec![vec![]; num_reads];
        for (v, vertex) in self.vertices.iter_mut().enumerate() {
            if let (GraphVertex::Allele(allele), Some(layer)) = (vertex, self.vertex_layers[v]) {
                for rs in allele.read_support.iter_mut() {
                    rs.is_first_allele = first_layer[rs.read_index as usize] == Some(layer);
                    read_to_alleles[rs.read_index as usize].push(AlleleSupport {
                        vertex: v,
                        layer,
                        read_support: *rs
                    });
                }
            }
        }
        self.read_to_alleles = read_to_alleles;
    }

    /// Removes weak edges and then any allele or position left without connections.
    /// Inter-position edges with weight below `min_edge_support` are dropped first.
    /// Then, until nothing changes, allele vertices without a surviving inter-position edge are removed,
    /// and positions left with fewer than two alleles are collapsed.
    /// The arena is rebuilt afterwards with the surviving vertices in their original order.
    /// # Arguments
    /// * `min_edge_support` - the minimum weight for an inter-position edge to survive
    pub fn prune(&mut self, min_edge_support: u64) {
        let num_vertices = self.vertices.len();
        let mut alive: Vec<bool> = vec![true; num_vertices];
        let kept: Vec<bool> = self.edges.iter()
            .map(|e| !self.is_boundary_edge(e) && e.weight >= min_edge_support)
            .collect();

        loop {
            let mut changed = false;
            for v in 0..num_vertices {
                if !alive[v] || self.vertex_layers[v].is_none() {
                    continue;
                }
                let connected = self.out_edges[v].iter().chain(self.in_edges[v].iter())
                    .any(|&ei| {
                        let edge = &self.edges[ei];
                        kept[ei] && alive[edge.from] && alive[edge.to]
                    });
                if !connected {
                    trace!("Pruning isolated vertex {}", self.vertices[v].label());
                    alive[v] = false;
                    changed = true;
                }
            }

            for layer in self.layers.iter() {
                let survivors: Vec<usize> = layer.iter().cloned().filter(|&v| alive[v]).collect();
                if survivors.len() == 1 {
                    trace!("Collapsing position with lone vertex {}", self.vertices[survivors[0]].label());
                    alive[survivors[0]] = false;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        for (layer_index, layer) in self.layers.iter().enumerate() {
            if layer.iter().all(|&v| !alive[v]) {
                self.collapsed_positions.insert(self.positions[layer_index]);
            }
        }

        // re-index the survivors in their old order
        let mut new_index: Vec<Option<usize>> = vec![None; num_vertices];
        let mut next_index: usize = 1;
        for layer in self.layers.iter() {
            for &v in layer.iter() {
                if alive[v] {
                    new_index[v] = Some(next_index);
                    next_index += 1;
                }
            }
        }

        let inter_edges: Vec<(usize, usize, u64)> = self.edges.iter().enumerate()
            .filter(|&(ei, _e)| kept[ei])
            .filter_map(|(_ei, e)| match (new_index[e.from], new_index[e.to]) {
                (Some(from), Some(to)) => Some((from, to, e.weight)),
                _ => None
            })
            .collect();

        let old_vertices = std::mem::take(&mut self.vertices);
        let mut new_layers: Vec<Vec<Allele>> = vec![];
        let mut last_layer: Option<usize> = None;
        for (v, vertex) in old_vertices.into_iter().enumerate() {
            if let (GraphVertex::Allele(allele), Some(layer)) = (vertex, self.vertex_layers[v]) {
                if !alive[v] {
                    continue;
                }
                if last_layer != Some(layer) {
                    new_layers.push(vec![]);
                    last_layer = Some(layer);
                }
                if let Some(group) = new_layers.last_mut() {
                    group.push(allele);
                }
            }
        }

        let mut rebuilt = Self::assemble(new_layers, self.read_to_alleles.len(), Some(inter_edges));
        rebuilt.hom_positions = std::mem::take(&mut self.hom_positions);
        rebuilt.hom_alleles = std::mem::take(&mut self.hom_alleles);
        rebuilt.collapsed_positions = std::mem::take(&mut self.collapsed_positions);
        debug!(
            "Pruned graph from {} to {} vertices, {} positions collapsed",
            num_vertices, rebuilt.num_vertices(), rebuilt.collapsed_positions.len()
        );
        *self = rebuilt;
    }

    /// Renders the graph in DOT format, one line per vertex and per edge.
    pub fn graphviz(&self) -> String {
        let mut dot = String::new();
        // writing to a String is infallible
        let _ = writeln!(dot, "digraph G {{");
        let _ = writeln!(dot, "  rankdir=LR;");
        for (v, vertex) in self.vertices.iter().enumerate() {
            let _ = writeln!(dot, "  {} [label=\"{}\"];", v, vertex.label());
        }
        for edge in self.edges.iter() {
            let _ = writeln!(dot, "  {} -> {} [label=\"{}\"];", edge.from, edge.to, edge.weight);
        }
        let _ = writeln!(dot, "}}");
        dot
    }

    fn is_boundary_edge(&self, edge: &GraphEdge) -> bool {
        edge.from == self.source() || edge.to == self.sink()
    }

    /// Returns the allele at a vertex index.
    /// # Panics
    /// * if `v` is the source or sink
    pub(crate) fn vertex_allele(&self, v: usize) -> &Allele {
        match &self.vertices[v] {
            GraphVertex::Allele(allele) => allele,
            other => panic!("vertex {} is not an allele: {:?}", v, other)
        }
    }

    fn high_quality_count(&self, v: usize) -> u64 {
        self.vertex_allele(v).high_quality_count()
    }

    pub fn source(&self) -> usize {
        0
    }

    pub fn sink(&self) -> usize {
        self.vertices.len() - 1
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_allele_vertices(&self) -> usize {
        self.vertex_layers.iter().filter(|l| l.is_some()).count()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_inter_position_edges(&self) -> usize {
        self.edges.iter().filter(|e| !self.is_boundary_edge(e)).count()
    }

    pub fn vertex(&self, v: usize) -> &GraphVertex {
        &self.vertices[v]
    }

    pub fn allele(&self, v: usize) -> Option<&Allele> {
        self.vertices.get(v).and_then(|vertex| vertex.allele())
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Iterates the edges leaving `v`, ordered by target index
    pub fn out_edges(&self, v: usize) -> impl Iterator<Item = &GraphEdge> + '_ {
        self.out_edges[v].iter().map(|&ei| &self.edges[ei])
    }

    /// Iterates the edges entering `v`, ordered by origin index
    pub fn in_edges(&self, v: usize) -> impl Iterator<Item = &GraphEdge> + '_ {
        self.in_edges[v].iter().map(|&ei| &self.edges[ei])
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, layer_index: usize) -> &[usize] {
        &self.layers[layer_index]
    }

    pub fn positions(&self) -> &[i64] {
        &self.positions
    }

    pub fn vertex_layer(&self, v: usize) -> Option<usize> {
        self.vertex_layers.get(v).copied().flatten()
    }

    /// The alleles supported by a read in layer order; empty for unknown identifiers
    pub fn read_alleles(&self, read_index: ReadIndex) -> &[AlleleSupport] {
        self.read_to_alleles.get(read_index as usize).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn num_reads(&self) -> usize {
        self.read_to_alleles.len()
    }

    pub fn hom_positions(&self) -> &BTreeSet<i64> {
        &self.hom_positions
    }

    pub fn hom_alleles(&self) -> &[Allele] {
        &self.hom_alleles
    }

    pub fn collapsed_positions(&self) -> &BTreeSet<i64> {
        &self.collapsed_positions
    }
}

/// Resolves and attaches the supports of one candidate allele, reusing an existing vertex with the same key.
fn add_candidate_allele(
    alleles: &mut Vec<Allele>, position_lookup: &mut HashMap<(AlleleType, Vec<u8>), usize>, indexer: &ReadIndexer,
    allele_type: AlleleType, position: i64, bases: &[u8], supporting_reads: &[SupportingRead]
) -> Result<(), PhaseError> {
    if supporting_reads.is_empty() {
        return Ok(());
    }

    let mut read_support: Vec<ReadSupport> = Vec::with_capacity(supporting_reads.len());
    for supporting_read in supporting_reads.iter() {
        let read_index = indexer.resolve(supporting_read.read_name())
            .ok_or_else(|| PhaseError::UnresolvedRead {
                read_name: supporting_read.read_name().to_string(),
                position
            })?;
        read_support.push(ReadSupport::new(read_index, supporting_read.is_low_quality()));
    }

    let key = (allele_type, bases.to_vec());
    let allele_index = match position_lookup.get(&key) {
        Some(&index) => index,
        None => {
            let index = alleles.len();
            alleles.push(Allele::new(allele_type, position, bases.to_vec(), vec![]));
            position_lookup.insert(key, index);
            index
        }
    };

    let allele = &mut alleles[allele_index];
    for rs in read_support.into_iter() {
        if allele.support_for(rs.read_index).is_some() {
            trace!("Read {} already supports {} at {}", rs.read_index, allele.allele_type, position);
            continue;
        }
        allele.read_support.push(rs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::candidates::{CandidateAllele, ReadRecord};

    fn support(names: &[&str]) -> Vec<SupportingRead> {
        names.iter().map(|n| SupportingRead::new(n.to_string(), false)).collect()
    }

    fn indexer(names: &[&str]) -> ReadIndexer {
        let records: Vec<ReadRecord> = names.iter().map(|n| ReadRecord::new(n.to_string())).collect();
        ReadIndexer::from_reads(&records)
    }

    fn snv(position: i64, reference: &[u8], ref_reads: &[&str], alt: &[u8], alt_reads: &[&str]) -> Candidate {
        Candidate::new(position, position + 1, reference.to_vec())
            .with_reference_support(support(ref_reads))
            .with_alternate_allele(CandidateAllele::new(alt.to_vec(), support(alt_reads)))
    }

    /// two heterozygous SNVs with a homozygous site between them
    fn simple_graph() -> AlleleGraph {
        let candidates = vec![
            snv(100, b"A", &["r1", "r2"], b"C", &["r3", "r4"]),
            snv(150, b"G", &[], b"T", &["r1", "r2", "r3", "r4"]),
            snv(200, b"T", &["r1", "r2"], b"G", &["r3", "r4"])
        ];
        AlleleGraph::from_candidates(&candidates, &indexer(&["r1", "r2", "r3", "r4"])).unwrap()
    }

    fn edge_weight(graph: &AlleleGraph, from: usize, to: usize) -> Option<u64> {
        graph.out_edges(from).find(|e| e.to() == to).map(|e| e.weight())
    }

    #[test]
    fn test_build_layout() {
        let graph = simple_graph();
        // source, 2 alleles at 100, 2 alleles at 200, sink
        assert_eq!(graph.num_vertices(), 6);
        assert_eq!(graph.source(), 0);
        assert_eq!(graph.sink(), 5);
        assert_eq!(graph.positions(), &[100, 200]);
        assert_eq!(graph.layer(0), &[1, 2]);
        assert_eq!(graph.layer(1), &[3, 4]);
        assert_eq!(graph.allele(1).unwrap().allele_type(), AlleleType::Reference);
        assert_eq!(graph.allele(2).unwrap().bases(), b"C");
        assert!(graph.allele(0).is_none());
        assert_eq!(graph.hom_positions().iter().cloned().collect::<Vec<i64>>(), vec![150]);
        assert_eq!(graph.hom_alleles().len(), 1);
    }

    #[test]
    fn test_build_edges() {
        let graph = simple_graph();
        assert_eq!(graph.num_edges(), 8);
        assert_eq!(graph.num_inter_position_edges(), 4);

        // boundary edges carry high-quality support
        assert_eq!(edge_weight(&graph, 0, 1), Some(2));
        assert_eq!(edge_weight(&graph, 0, 2), Some(2));
        assert_eq!(edge_weight(&graph, 3, 5), Some(2));

        // the homozygous site is bridged over
        assert_eq!(edge_weight(&graph, 1, 3), Some(2));
        assert_eq!(edge_weight(&graph, 1, 4), Some(0));
        assert_eq!(edge_weight(&graph, 2, 3), Some(0));
        assert_eq!(edge_weight(&graph, 2, 4), Some(2));

        let targets: Vec<usize> = graph.out_edges(1).map(|e| e.to()).collect();
        assert_eq!(targets, vec![3, 4]);
        let origins: Vec<usize> = graph.in_edges(4).map(|e| e.from()).collect();
        assert_eq!(origins, vec![1, 2]);
    }

    #[test]
    fn test_first_allele_flags() {
        let graph = simple_graph();
        assert!(graph.allele(1).unwrap().read_support().iter().all(|rs| rs.is_first_allele()));
        assert!(graph.allele(3).unwrap().read_support().iter().all(|rs| !rs.is_first_allele()));

        let r3 = graph.read_alleles(2);
        assert_eq!(r3.len(), 2);
        assert_eq!(r3[0].vertex(), 2);
        assert_eq!(r3[0].layer(), 0);
        assert!(r3[0].read_support().is_first_allele());
        assert_eq!(r3[1].vertex(), 4);
        assert!(!r3[1].read_support().is_first_allele());
    }

    #[test]
    fn test_low_quality_weight() {
        let mut candidates = vec![
            snv(100, b"A", &["r1"], b"C", &["r2"]),
            snv(200, b"T", &["r1"], b"G", &[])
        ];
        candidates[1].add_alternate_support(b"G", SupportingRead::new("r2".to_string(), true));
        let graph = AlleleGraph::from_candidates(&candidates, &indexer(&["r1", "r2"])).unwrap();
        assert_eq!(edge_weight(&graph, 1, 3), Some(1));
        assert_eq!(edge_weight(&graph, 2, 4), Some(0));
        assert_eq!(edge_weight(&graph, 4, graph.sink()), Some(0));
    }

    #[test]
    fn test_duplicate_key_reuse() {
        let candidates = vec![
            snv(100, b"A", &["r1"], b"C", &["r2"]),
            snv(100, b"A", &["r3", "r1"], b"C", &["r4"])
        ];
        let graph = AlleleGraph::from_candidates(&candidates, &indexer(&["r1", "r2", "r3", "r4"])).unwrap();
        assert_eq!(graph.num_allele_vertices(), 2);
        let reference = graph.allele(1).unwrap();
        let reads: Vec<ReadIndex> = reference.read_support().iter().map(|rs| rs.read_index()).collect();
        assert_eq!(reads, vec![0, 2]);
        assert_eq!(graph.allele(2).unwrap().read_support().len(), 2);
    }

    #[test]
    fn test_unresolved_read() {
        let candidates = vec![snv(100, b"A", &["r1"], b"C", &["ghost"])];
        let result = AlleleGraph::from_candidates(&candidates, &indexer(&["r1"]));
        match result {
            Err(PhaseError::UnresolvedRead { read_name, position }) => {
                assert_eq!(read_name, "ghost");
                assert_eq!(position, 100);
            },
            other => panic!("unexpected result: {:?}", other)
        };
    }

    #[test]
    fn test_unclassifiable() {
        let candidates = vec![snv(100, b"A", &["r1"], b"X", &["r2"])];
        let result = AlleleGraph::from_candidates(&candidates, &indexer(&["r1", "r2"]));
        assert!(matches!(result, Err(PhaseError::UnclassifiableAllele { .. })));
    }

    #[test]
    fn test_empty_graph() {
        let graph = AlleleGraph::from_candidates(&[], &indexer(&["r1"])).unwrap();
        assert_eq!(graph.num_vertices(), 2);
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.num_layers(), 0);
        assert!(graph.read_alleles(0).is_empty());
    }

    #[test]
    fn test_prune_weak_edges() {
        let mut graph = simple_graph();
        graph.prune(1);
        assert_eq!(graph.num_vertices(), 6);
        assert_eq!(graph.num_inter_position_edges(), 2);
        assert_eq!(edge_weight(&graph, 1, 4), None);
        assert_eq!(edge_weight(&graph, 2, 4), Some(2));
        assert!(graph.collapsed_positions().is_empty());
    }

    #[test]
    fn test_prune_everything() {
        let mut graph = simple_graph();
        graph.prune(3);
        assert_eq!(graph.num_vertices(), 2);
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.num_layers(), 0);
        assert_eq!(graph.collapsed_positions().iter().cloned().collect::<Vec<i64>>(), vec![100, 200]);
        assert!(graph.read_alleles(0).is_empty());
    }

    #[test]
    fn test_prune_collapses_position() {
        let candidates = vec![
            snv(100, b"A", &["r1", "r2"], b"C", &["r3", "r4"]),
            snv(200, b"T", &["r1", "r2"], b"G", &["r3", "r4"]),
            snv(300, b"C", &["r1"], b"A", &["r5"])
        ];
        let mut graph = AlleleGraph::from_candidates(&candidates, &indexer(&["r1", "r2", "r3", "r4", "r5"])).unwrap();
        let vertices_before = graph.num_vertices();
        let edges_before = graph.num_inter_position_edges();
        graph.prune(2);

        assert!(graph.num_vertices() <= vertices_before);
        assert!(graph.num_inter_position_edges() <= edges_before);
        assert_eq!(graph.positions(), &[100, 200]);
        assert_eq!(graph.collapsed_positions().iter().cloned().collect::<Vec<i64>>(), vec![300]);
        // the last surviving layer connects to the sink
        assert_eq!(edge_weight(&graph, 3, graph.sink()), Some(2));
        assert_eq!(edge_weight(&graph, 4, graph.sink()), Some(2));
        assert!(graph.read_alleles(4).is_empty());
    }

    #[test]
    fn test_prune_recomputes_first_allele() {
        // r5 only touches 100 through low-quality support and then 200 and 300
        let mut candidates = vec![
            snv(100, b"A", &["r1", "r2"], b"C", &["r3", "r4"]),
            snv(200, b"T", &["r1", "r2"], b"G", &["r3", "r4"]),
            snv(300, b"C", &["r1", "r2", "r5"], b"A", &["r3", "r4"])
        ];
        candidates[0].add_alternate_support(b"C", SupportingRead::new("r5".to_string(), true));
        candidates[1].add_alternate_support(b"G", SupportingRead::new("r5".to_string(), false));
        let mut graph = AlleleGraph::from_candidates(&candidates, &indexer(&["r1", "r2", "r3", "r4", "r5"])).unwrap();
        assert!(graph.read_alleles(4)[0].read_support().is_first_allele());
        assert_eq!(graph.read_alleles(4)[0].layer(), 0);

        graph.prune(1);
        // nothing collapses, so the flags are unchanged
        assert_eq!(graph.read_alleles(4)[0].layer(), 0);
        assert!(!graph.read_alleles(4)[1].read_support().is_first_allele());
    }

    #[test]
    fn test_from_alleles() {
        let alleles = vec![
            Allele::new(AlleleType::Substitution, 20, b"G".to_vec(), vec![ReadSupport::new(1, false)]),
            Allele::new(AlleleType::Reference, 10, b"A".to_vec(), vec![ReadSupport::new(0, false)]),
            Allele::new(AlleleType::Substitution, 10, b"C".to_vec(), vec![ReadSupport::new(1, false)]),
            Allele::new(AlleleType::Reference, 20, b"T".to_vec(), vec![ReadSupport::new(0, false)])
        ];
        let graph = AlleleGraph::from_alleles(alleles, 2);
        assert_eq!(graph.positions(), &[10, 20]);
        assert_eq!(graph.allele(1).unwrap().bases(), b"A");
        assert_eq!(graph.allele(3).unwrap().bases(), b"G");
        assert_eq!(edge_weight(&graph, 2, 3), Some(1));
        assert_eq!(edge_weight(&graph, 1, 4), Some(1));
    }

    #[test]
    #[should_panic]
    fn test_from_alleles_duplicate_key() {
        let alleles = vec![
            Allele::new(AlleleType::Reference, 10, b"A".to_vec(), vec![ReadSupport::new(0, false)]),
            Allele::new(AlleleType::Reference, 10, b"A".to_vec(), vec![ReadSupport::new(1, false)])
        ];
        AlleleGraph::from_alleles(alleles, 2);
    }

    #[test]
    fn test_read_support_equality() {
        let mut a = ReadSupport::new(3, false);
        let b = ReadSupport::new(3, false);
        a.is_first_allele = true;
        assert_eq!(a, b);
        assert_ne!(a, ReadSupport::new(3, true));
    }

    #[test]
    fn test_graphviz() {
        let graph = simple_graph();
        let dot = graph.graphviz();
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("0 [label=\"source\"];"));
        assert!(dot.contains("2 [label=\"SUB 100 C\"];"));
        assert!(dot.contains("1 [label=\"REF 100 A\"];"));
        assert!(dot.contains("2 -> 4 [label=\"2\"];"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
