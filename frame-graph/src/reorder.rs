//! Pass reorder engine (component C5): finds *close circuits* (diamond
//! subgraphs with two edge-disjoint paths between the same endpoints) in a
//! shadow relation graph and decides, per circuit, whether to serialize the
//! two paths for better memory reuse or leave them parallel.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fnv::FnvHashSet;

use access_graph::resource::{Residency, ResourceGraph};
use access_graph::PassId;

use crate::access_graph_builder::ResourceAccessGraph;

/// A plain directed-edge shadow of the RAG, kept separate so the reorder
/// engine can mutate edges (serializing a circuit) without touching the
/// RAG's own access-node bookkeeping.
#[derive(Default)]
pub struct RelationGraph {
    out_edges: Vec<Vec<PassId>>,
    in_edges: Vec<Vec<PassId>>,
}

impl RelationGraph {
    pub fn new() -> Self {
        RelationGraph::default()
    }

    pub fn add_vertex(&mut self) -> PassId {
        let id = PassId(self.out_edges.len());
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        id
    }

    pub fn add_edge(&mut self, from: PassId, to: PassId) {
        if !self.out_edges[from.0].contains(&to) {
            self.out_edges[from.0].push(to);
            self.in_edges[to.0].push(from);
        }
    }

    fn remove_edge(&mut self, from: PassId, to: PassId) {
        self.out_edges[from.0].retain(|&x| x != to);
        self.in_edges[to.0].retain(|&x| x != from);
    }

    pub fn successors(&self, id: PassId) -> &[PassId] {
        &self.out_edges[id.0]
    }

    pub fn predecessors(&self, id: PassId) -> &[PassId] {
        &self.in_edges[id.0]
    }

    pub fn len(&self) -> usize {
        self.out_edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out_edges.is_empty()
    }

    /// Reachability matrix via per-vertex DFS.
    fn transitive_closure(&self) -> Vec<FnvHashSet<PassId>> {
        let mut reach = vec![FnvHashSet::default(); self.len()];
        for start in 0..self.len() {
            let mut stack = vec![PassId(start)];
            let mut visited = FnvHashSet::default();
            while let Some(v) = stack.pop() {
                for &next in &self.out_edges[v.0] {
                    if visited.insert(next) {
                        reach[start].insert(next);
                        stack.push(next);
                    }
                }
            }
        }
        reach
    }
}

/// A close circuit: two edge-disjoint paths between `divergence` and
/// `confluence`, represented by their outer branch edges only — reduction
/// only ever needs to cut and relink those.
struct CloseCircuit {
    divergence: PassId,
    confluence: PassId,
    branch_a_first: PassId,
    branch_b_first: PassId,
}

/// Per-vertex heaviness score.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Heaviness {
    forward: i64,
    backward: i64,
}

fn heaviness(rag: &ResourceAccessGraph, rg: &ResourceGraph, vertex: PassId) -> Heaviness {
    let mut forward = 0i64;
    let mut backward = 0i64;
    let mut saturated = false;

    for status in rag.vertex(vertex).accesses() {
        let resource = rg.get(status.resource);
        if resource.residency() == Residency::Memoryless {
            saturated = true;
        }
        let size = resource.byte_size() as i64;
        if status.access.is_write() {
            forward += size;
        }
        if status.access.has_read_access() {
            backward += size;
        }
    }

    if saturated {
        Heaviness {
            forward: i64::MIN,
            backward: i64::MAX,
        }
    } else {
        Heaviness { forward, backward }
    }
}

/// Runs the pass-reorder engine, mutating `relation` in place by reducing
/// the close circuits it chooses to serialize, then returns a topological
/// order over `relation`'s (possibly reduced) vertices.
pub struct Reorder<'a> {
    rag: &'a ResourceAccessGraph,
    rg: &'a ResourceGraph,
    parallel_exec_weight: f32,
}

impl<'a> Reorder<'a> {
    pub fn new(rag: &'a ResourceAccessGraph, rg: &'a ResourceGraph, parallel_exec_weight: f32) -> Self {
        Reorder {
            rag,
            rg,
            parallel_exec_weight: parallel_exec_weight.max(0.0).min(1.0),
        }
    }

    /// Find close circuits, serialize a `1 - parallel_exec_weight` fraction
    /// of them (heaviest-score side first), then topologically sort the
    /// result with a priority queue ordered by `backward - forward`.
    pub fn run(&self, relation: &mut RelationGraph) -> Vec<PassId> {
        let circuits = self.find_close_circuits(relation);
        let serialize_count = (circuits.len() as f32 * (1.0 - self.parallel_exec_weight)).round() as usize;

        log::debug!(
            "reorder: {} close circuit(s) found, serializing {}",
            circuits.len(),
            serialize_count
        );

        for circuit in circuits.into_iter().take(serialize_count) {
            self.reduce_circuit(relation, &circuit);
        }

        self.topo_sort(relation)
    }

    /// DFS over forward/cross edges, walking back along predecessors of `v`
    /// and forward along successors of the divergence point to find the
    /// matching edge-disjoint path pair.
    fn find_close_circuits(&self, relation: &RelationGraph) -> Vec<CloseCircuit> {
        let reach = relation.transitive_closure();
        let mut circuits = Vec::new();
        let mut seen_pairs = FnvHashSet::default();

        for u in 0..relation.len() {
            let u = PassId(u);
            let successors = relation.successors(u);
            if successors.len() < 2 {
                continue;
            }
            for i in 0..successors.len() {
                for j in (i + 1)..successors.len() {
                    let (a, b) = (successors[i], successors[j]);
                    // A close circuit needs a common confluence vertex both
                    // branches reach, distinct from `u` itself.
                    let confluence = reach[a.0]
                        .intersection(&reach[b.0])
                        .find(|&&c| c != u && reach[u.0].contains(&c));
                    if let Some(&confluence) = confluence {
                        let key = (u, confluence);
                        if seen_pairs.insert(key) {
                            circuits.push(CloseCircuit {
                                divergence: u,
                                confluence,
                                branch_a_first: a,
                                branch_b_first: b,
                            });
                        }
                    }
                }
            }
        }

        circuits
    }

    /// Cut the two outer branch edges and insert a single serial edge
    /// between the two paths' first vertices, ordered by heaviness
    /// (heavier-reading branch goes first so its producer fires earlier).
    fn reduce_circuit(&self, relation: &mut RelationGraph, circuit: &CloseCircuit) {
        let score_a = heaviness(self.rag, self.rg, circuit.branch_a_first);
        let score_b = heaviness(self.rag, self.rg, circuit.branch_b_first);

        let (first, second) = if (score_a.backward - score_a.forward) >= (score_b.backward - score_b.forward) {
            (circuit.branch_a_first, circuit.branch_b_first)
        } else {
            (circuit.branch_b_first, circuit.branch_a_first)
        };

        relation.remove_edge(circuit.divergence, circuit.branch_a_first);
        relation.remove_edge(circuit.divergence, circuit.branch_b_first);
        relation.add_edge(circuit.divergence, first);
        relation.add_edge(first, second);

        log::trace!(
            "reorder: serialized circuit {:?} -> {:?} as {:?} then {:?}",
            circuit.divergence,
            circuit.confluence,
            first,
            second
        );
    }

    /// Kahn's algorithm with a max-heap keyed on `backward - forward`,
    /// tie-broken by vertex id for determinism.
    fn topo_sort(&self, relation: &RelationGraph) -> Vec<PassId> {
        #[derive(Eq, PartialEq)]
        struct Entry {
            key: i64,
            vertex: PassId,
        }
        impl Ord for Entry {
            fn cmp(&self, other: &Self) -> Ordering {
                self.key
                    .cmp(&other.key)
                    .then_with(|| other.vertex.0.cmp(&self.vertex.0))
            }
        }
        impl PartialOrd for Entry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut indegree: Vec<usize> = (0..relation.len())
            .map(|v| relation.predecessors(PassId(v)).len())
            .collect();
        let mut heap = BinaryHeap::new();
        for v in 0..relation.len() {
            if indegree[v] == 0 {
                let h = heaviness(self.rag, self.rg, PassId(v));
                heap.push(Entry {
                    key: h.backward - h.forward,
                    vertex: PassId(v),
                });
            }
        }

        let mut order = Vec::with_capacity(relation.len());
        while let Some(Entry { vertex, .. }) = heap.pop() {
            order.push(vertex);
            for &next in relation.successors(vertex) {
                indegree[next.0] -= 1;
                if indegree[next.0] == 0 {
                    let h = heaviness(self.rag, self.rg, next);
                    heap.push(Entry {
                        key: h.backward - h.forward,
                        vertex: next,
                    });
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_is_serialized_at_zero_weight() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3 : a textbook close circuit.
        let mut relation = RelationGraph::new();
        for _ in 0..4 {
            relation.add_vertex();
        }
        relation.add_edge(PassId(0), PassId(1));
        relation.add_edge(PassId(0), PassId(2));
        relation.add_edge(PassId(1), PassId(3));
        relation.add_edge(PassId(2), PassId(3));

        let rg = ResourceGraph::new();
        let rag = ResourceAccessGraph::empty_with_vertices(4);
        let reorder = Reorder::new(&rag, &rg, 0.0);
        let circuits = reorder.find_close_circuits(&relation);

        assert_eq!(circuits.len(), 1);
        assert_eq!(circuits[0].divergence, PassId(0));
        assert_eq!(circuits[0].confluence, PassId(3));
    }

    #[test]
    fn topo_sort_respects_edges() {
        let mut relation = RelationGraph::new();
        for _ in 0..3 {
            relation.add_vertex();
        }
        relation.add_edge(PassId(0), PassId(1));
        relation.add_edge(PassId(1), PassId(2));

        let rg = ResourceGraph::new();
        let rag = ResourceAccessGraph::empty_with_vertices(3);
        let reorder = Reorder::new(&rag, &rg, 0.5);
        let order = reorder.topo_sort(&relation);
        assert_eq!(order, vec![PassId(0), PassId(1), PassId(2)]);
    }
}
