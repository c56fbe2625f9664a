//! The Resource Access Graph builder (component C4): walks the render graph
//! in declaration order, records per-pass access, and adds dependency edges
//! — both into the RAG itself and into a parallel relation graph the pass
//! reorder engine consumes.

use fnv::FnvHashMap;

use access_graph::access::AccessFlags;
use access_graph::node::{AccessStatus, ResourceAccessNode};
use access_graph::range::ResourceRange;
use access_graph::resource::{Dimension, Resource, ResourceGraph};
use access_graph::transition::{AccessRecord, TransitionSide};
use access_graph::{PassId, ResourceId};

use crate::layout_graph::LayoutGraph;
use crate::render_graph::{self, MemoryAccess, PassDecl, PassKind, RenderGraph, ViewDecl};
use crate::reorder::RelationGraph;

/// The Resource Access Graph: one vertex per declared pass (subpasses fold
/// into their parent's vertex instead of getting their own), plus the
/// dependency edges the builder discovered.
pub struct ResourceAccessGraph {
    vertices: Vec<ResourceAccessNode>,
    pass_names: Vec<String>,
    edges_out: Vec<Vec<PassId>>,
    edges_in: Vec<Vec<PassId>>,
    start: PassId,
    sink: Option<PassId>,
    /// Declared-pass index (from [`RenderGraph::iter`]) to RAG vertex id,
    /// for passes that got their own vertex (i.e. everything except
    /// subpasses).
    declared_to_vertex: FnvHashMap<usize, PassId>,
    /// Resources a successful move renamed away: `dst -> src`, so later
    /// declarations that reference `dst` resolve through to `src`'s
    /// tracked transition.
    moved: FnvHashMap<ResourceId, ResourceId>,
}

impl ResourceAccessGraph {
    pub fn vertex(&self, id: PassId) -> &ResourceAccessNode {
        &self.vertices[id.0]
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn pass_name(&self, id: PassId) -> &str {
        &self.pass_names[id.0]
    }

    pub fn successors(&self, id: PassId) -> &[PassId] {
        &self.edges_out[id.0]
    }

    pub fn predecessors(&self, id: PassId) -> &[PassId] {
        &self.edges_in[id.0]
    }

    pub fn start(&self) -> PassId {
        self.start
    }

    pub fn sink(&self) -> Option<PassId> {
        self.sink
    }

    /// All vertex ids in topological (declaration) order. Since the builder
    /// only ever adds edges from earlier vertices to later ones, the RAG's
    /// natural vertex order is already a valid topological order.
    pub fn topo_order(&self) -> impl Iterator<Item = PassId> {
        (0..self.vertices.len()).map(PassId)
    }

    /// A RAG with `n` empty vertices and no edges, for reorder-engine tests
    /// that only need vertex count to line up with a hand-built
    /// [`RelationGraph`].
    #[cfg(test)]
    pub(crate) fn empty_with_vertices(n: usize) -> Self {
        ResourceAccessGraph {
            vertices: (0..n).map(|_| ResourceAccessNode::new()).collect(),
            pass_names: (0..n).map(|i| format!("v{}", i)).collect(),
            edges_out: vec![Vec::new(); n],
            edges_in: vec![Vec::new(); n],
            start: PassId(0),
            sink: None,
            declared_to_vertex: FnvHashMap::default(),
            moved: FnvHashMap::default(),
        }
    }

    fn add_edge(&mut self, from: PassId, to: PassId) {
        if !self.edges_out[from.0].contains(&to) {
            self.edges_out[from.0].push(to);
            self.edges_in[to.0].push(from);
        }
    }

    fn resolve_moved(&self, resource: ResourceId) -> ResourceId {
        self.moved.get(&resource).copied().unwrap_or(resource)
    }

    /// True iff `resource` was renamed away by a successful move pass. The
    /// barrier builder's Pass B ignores resources for which this is true.
    pub fn is_moved(&self, resource: ResourceId) -> bool {
        self.moved.contains_key(&resource)
    }

    /// The RAG vertex a declared pass (by its [`RenderGraph`] index) ended
    /// up at. `None` for a successfully-moved `Move` pass, which creates no
    /// vertex of its own.
    pub fn vertex_for_declared(&self, declared_index: usize) -> Option<PassId> {
        self.declared_to_vertex.get(&declared_index).copied()
    }
}

/// Builds a [`ResourceAccessGraph`] (and, alongside it, a [`RelationGraph`]
/// shadow DAG for the reorder engine) from a declared render graph.
pub struct AccessGraphBuilder<'a> {
    rgd: &'a RenderGraph,
    rg: &'a ResourceGraph,
    lg: &'a LayoutGraph,
    branch_culling: bool,
}

/// Output of [`AccessGraphBuilder::build`]: the RAG plus the relation graph
/// the reorder engine consumes, built in lockstep — every RAG vertex gets a
/// parallel relation-graph vertex at the same index.
pub struct BuiltGraphs {
    pub rag: ResourceAccessGraph,
    pub relation: RelationGraph,
}

impl<'a> AccessGraphBuilder<'a> {
    pub fn new(rgd: &'a RenderGraph, rg: &'a ResourceGraph, lg: &'a LayoutGraph) -> Self {
        AccessGraphBuilder {
            rgd,
            rg,
            lg,
            branch_culling: true,
        }
    }

    pub fn with_branch_culling(mut self, enabled: bool) -> Self {
        self.branch_culling = enabled;
        self
    }

    pub fn build(self) -> BuiltGraphs {
        let mut rag = ResourceAccessGraph {
            vertices: Vec::new(),
            pass_names: Vec::new(),
            edges_out: Vec::new(),
            edges_in: Vec::new(),
            start: PassId(0),
            sink: None,
            declared_to_vertex: FnvHashMap::default(),
            moved: FnvHashMap::default(),
        };
        let mut relation = RelationGraph::new();

        // Synthetic start vertex: every pristine external read and every
        // vertex with no real dependency connects to it.
        let start = push_vertex(&mut rag, &mut relation, "<start>");
        rag.start = start;

        let mut records = AccessRecord::new();
        let mut external_leaf_candidates: Vec<(PassId, ResourceId)> = Vec::new();
        let mut needs_culling: FnvHashMap<PassId, bool> = FnvHashMap::default();

        for (declared_id, pass) in self.rgd.iter() {
            if pass.kind.is_subpass() {
                self.fold_subpass(&mut rag, &mut relation, &mut records, declared_id.0, pass);
                continue;
            }

            if let PassKind::Move { src, dst } = pass.kind {
                self.process_move(&mut rag, &mut relation, &mut records, declared_id.0, pass, src, dst);
                continue;
            }

            let vertex = push_vertex(&mut rag, &mut relation, &pass.name);
            rag.declared_to_vertex.insert(declared_id.0, vertex);

            // Route the root pass's own views through `push_subpass` instead
            // of `add_access` directly, so they show up as subpass index 0
            // in `subpasses()` — the barrier builder's intra-pass dependency
            // detection needs each subpass's raw, un-unioned status, not
            // just the head's accumulated union.
            let mut root_node = ResourceAccessNode::new();
            let mut any_dependency = false;
            for view in &pass.views {
                let status = self.status_for_view(&pass.name, &pass.kind, view);
                let resource = rag.resolve_moved(status.resource);
                let status = AccessStatus { resource, ..status };
                root_node.add_access(status);

                let dep = self.dependency_check(&mut records, resource, vertex, status.access);
                if let Some(producer) = dep {
                    rag.add_edge(producer, vertex);
                    relation.add_edge(producer, vertex);
                    any_dependency = true;
                }

                if self.rg.get(resource).has_side_effects() {
                    let need_cull = status.access.is_read_only();
                    external_leaf_candidates.push((vertex, resource));
                    needs_culling.insert(vertex, need_cull);
                }
            }
            rag.vertices[vertex.0].push_subpass(root_node);

            if !any_dependency {
                rag.add_edge(start, vertex);
                relation.add_edge(start, vertex);
            }
        }

        if self.branch_culling {
            cull_dead_leaves(&mut rag, &needs_culling);
        }

        let sink = self.attach_sink(&mut rag, &mut relation);
        rag.sink = Some(sink);

        BuiltGraphs { rag, relation }
    }

    /// Fold a raster/compute subpass into its parent's vertex instead of
    /// giving it a RAG vertex of its own.
    fn fold_subpass(
        &self,
        rag: &mut ResourceAccessGraph,
        relation: &mut RelationGraph,
        records: &mut AccessRecord,
        declared_index: usize,
        pass: &PassDecl,
    ) {
        let parent_declared = match pass.kind.parent() {
            Some(p) => p.0,
            None => unreachable!("fold_subpass called on a non-subpass"),
        };
        let parent_vertex = *rag
            .declared_to_vertex
            .get(&parent_declared)
            .expect("subpass parent was not built before the subpass");

        let mut sub_node = ResourceAccessNode::new();
        for view in &pass.views {
            let status = self.status_for_view(&pass.name, &pass.kind, view);
            let resource = rag.resolve_moved(status.resource);
            let status = AccessStatus { resource, ..status };
            sub_node.add_access(status);

            // Subpass accesses still participate in dependency tracking —
            // a later pass reading this subpass's output depends on the
            // parent vertex, which is why we advance the access record to
            // point at `parent_vertex` rather than a phantom subpass id.
            // A producer outside this pass still needs a real RAG edge.
            let dep = self.dependency_check(records, resource, parent_vertex, status.access);
            if let Some(producer) = dep {
                if producer != parent_vertex {
                    rag.add_edge(producer, parent_vertex);
                    relation.add_edge(producer, parent_vertex);
                }
            }
        }

        rag.vertices[parent_vertex.0].push_subpass(sub_node);
        rag.declared_to_vertex.insert(declared_index, parent_vertex);
    }

    /// Validate and process a `Move` pass. On failure, downgrade to the
    /// `Copy` behavior (TRANSFER_READ on `src`, TRANSFER_WRITE on `dst`).
    fn process_move(
        &self,
        rag: &mut ResourceAccessGraph,
        relation: &mut RelationGraph,
        records: &mut AccessRecord,
        declared_index: usize,
        pass: &PassDecl,
        src: ResourceId,
        dst: ResourceId,
    ) {
        let src_no_side_effects = !self.rg.get(src).has_side_effects();
        let src_not_moved = !rag.moved.contains_key(&src);
        let dst_not_moved = !rag.moved.contains_key(&dst);
        let shape_matches = {
            let a = self.rg.get(src);
            let b = self.rg.get(dst);
            a.dimension() == b.dimension() && whole_range(a).overlaps(&whole_range(b))
        };
        let conditions = [src_no_side_effects, src_not_moved, dst_not_moved, shape_matches];

        if conditions.iter().all(|&c| c) {
            log::debug!("move pass `{}`: renaming `{}` onto `{}`", pass.name, src.0, dst.0);
            rag.moved.insert(dst, rag.resolve_moved(src));
            // No new vertex, no new access status: later declarations that
            // reference `dst` resolve through `resolve_moved` instead.
            return;
        }

        log::warn!(
            "move pass `{}` failed validation (no_side_effects={}, src_not_moved={}, dst_not_moved={}, shape_matches={}); downgrading to copy",
            pass.name,
            src_no_side_effects,
            src_not_moved,
            dst_not_moved,
            shape_matches,
        );

        let vertex = push_vertex(rag, relation, &pass.name);
        rag.declared_to_vertex.insert(declared_index, vertex);

        let read_status = AccessStatus {
            resource: src,
            range: Default::default(),
            access: AccessFlags::TRANSFER_READ,
        };
        let write_status = AccessStatus {
            resource: dst,
            range: Default::default(),
            access: AccessFlags::TRANSFER_WRITE,
        };
        rag.vertices[vertex.0].add_access(read_status);
        rag.vertices[vertex.0].add_access(write_status);

        if let Some(producer) = self.dependency_check(records, src, vertex, read_status.access) {
            rag.add_edge(producer, vertex);
            relation.add_edge(producer, vertex);
        }
        if let Some(producer) = self.dependency_check(records, dst, vertex, write_status.access) {
            rag.add_edge(producer, vertex);
            relation.add_edge(producer, vertex);
        }
    }

    fn status_for_view(&self, pass_name: &str, kind: &PassKind, view: &ViewDecl) -> AccessStatus {
        let resource = self.rg.get(view.resource);
        let visibility = self.lg.visibility(pass_name, &view.binding);
        let access = render_graph::derive_access_flags(
            kind,
            view.memory_access,
            visibility,
            resource.usage(),
        );
        AccessStatus {
            resource: view.resource,
            range: view.range,
            access,
        }
    }

    /// Check the declared view against the running access record. Returns
    /// the RAG vertex this view should depend on, if any.
    fn dependency_check(
        &self,
        records: &mut AccessRecord,
        resource: ResourceId,
        vertex: PassId,
        access: AccessFlags,
    ) -> Option<PassId> {
        match records.get(resource).copied() {
            None => {
                records.insert_first(
                    resource,
                    TransitionSide {
                        vertex,
                        range: Default::default(),
                        access,
                    },
                );
                None
            }
            Some(transition) if transition.curr.access.is_read_only() && access.is_read_only() => {
                // Read-after-read: link to the existing producer but leave
                // `curr` untouched.
                Some(transition.curr.vertex)
            }
            Some(transition) => {
                let producer = transition.curr.vertex;
                records.advance(
                    resource,
                    TransitionSide {
                        vertex,
                        range: Default::default(),
                        access,
                    },
                );
                Some(producer)
            }
        }
    }

    /// Attach the synthetic present pass (if none was declared) and the
    /// single sink vertex every remaining external leaf connects to.
    fn attach_sink(&self, rag: &mut ResourceAccessGraph, relation: &mut RelationGraph) -> PassId {
        if !self.rgd.has_present_pass() {
            log::warn!("render graph declared no present pass; synthesizing one");
        }
        let sink = push_vertex(rag, relation, "<sink>");
        for vertex in 0..sink.0 {
            let v = PassId(vertex);
            if v != sink && rag.edges_out[v.0].is_empty() {
                rag.add_edge(v, sink);
                relation.add_edge(v, sink);
            }
        }
        sink
    }
}

/// The full sub-region a resource's own declared extent covers, for the
/// move-pass shape check: two resources have matching shape iff their whole
/// ranges overlap under [`ResourceRange::overlaps`].
fn whole_range(resource: &Resource) -> ResourceRange {
    let extent = resource.extent();
    if resource.dimension() == Dimension::Buffer {
        ResourceRange::whole_buffer(extent.width)
    } else {
        ResourceRange::whole_texture(extent.width, extent.height, extent.depth_or_array_size, extent.mip_levels)
    }
}

fn push_vertex(rag: &mut ResourceAccessGraph, relation: &mut RelationGraph, name: &str) -> PassId {
    let id = PassId(rag.vertices.len());
    rag.vertices.push(ResourceAccessNode::new());
    rag.pass_names.push(name.to_owned());
    rag.edges_out.push(Vec::new());
    rag.edges_in.push(Vec::new());
    relation.add_vertex();
    id
}

/// Recursively remove vertices with out-degree 0 that carry no side-effect
/// resources: dropping one vertex may expose a new leaf among its former
/// predecessors, so this repeats to a fixed point.
fn cull_dead_leaves(rag: &mut ResourceAccessGraph, needs_culling: &FnvHashMap<PassId, bool>) {
    loop {
        let mut removed_any = false;
        for i in 0..rag.vertices.len() {
            let v = PassId(i);
            if v == rag.start {
                continue;
            }
            let is_leaf = rag.edges_out[v.0].is_empty();
            let culled = needs_culling.get(&v).copied().unwrap_or(true);
            if is_leaf && culled && !rag.edges_in[v.0].is_empty() {
                let preds = std::mem::take(&mut rag.edges_in[v.0]);
                for p in &preds {
                    rag.edges_out[p.0].retain(|&x| x != v);
                }
                rag.vertices[v.0] = ResourceAccessNode::new();
                removed_any = true;
            }
        }
        if !removed_any {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_graph::resource::{Dimension, Extent, Format, Residency, UsageFlags};
    use crate::render_graph::{MemoryAccess, PassKind, ViewDecl};

    fn simple_graph() -> (RenderGraph, ResourceGraph, LayoutGraph) {
        let mut rg = ResourceGraph::new();
        let a = rg.declare(access_graph::resource::Resource::new(
            "A",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent {
                width: 64,
                height: 64,
                ..Default::default()
            },
            UsageFlags::COLOR_ATTACHMENT | UsageFlags::SAMPLED,
            Residency::Managed,
        ));

        let mut rgd = RenderGraph::new();
        rgd.add_pass(
            "P0",
            PassKind::Raster,
            vec![ViewDecl::new("out", a, MemoryAccess::Write)],
        );
        rgd.add_pass(
            "P1",
            PassKind::Raster,
            vec![ViewDecl::new("in", a, MemoryAccess::Read)],
        );
        (rgd, rg, LayoutGraph::new())
    }

    #[test]
    fn straight_line_pipeline_has_one_edge() {
        let (rgd, rg, lg) = simple_graph();
        let built = AccessGraphBuilder::new(&rgd, &rg, &lg).build();
        let p0 = *built.rag.declared_to_vertex.get(&0).unwrap();
        let p1 = *built.rag.declared_to_vertex.get(&1).unwrap();
        assert_eq!(built.rag.successors(p0), &[p1]);
    }

    #[test]
    fn move_pass_fallback_produces_transfer_statuses() {
        let mut rg = ResourceGraph::new();
        let a = rg.declare(access_graph::resource::Resource::new(
            "A",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent {
                width: 64,
                height: 64,
                ..Default::default()
            },
            UsageFlags::empty(),
            Residency::Managed,
        ));
        let b = rg.declare(access_graph::resource::Resource::new(
            "B",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent {
                width: 32,
                height: 32,
                ..Default::default()
            },
            UsageFlags::empty(),
            Residency::Managed,
        ));

        let mut rgd = RenderGraph::new();
        rgd.add_pass("M0", PassKind::Move { src: a, dst: b }, Vec::new());

        let lg = LayoutGraph::new();
        let built = AccessGraphBuilder::new(&rgd, &rg, &lg).build();
        let m0 = *built.rag.declared_to_vertex.get(&0).unwrap();
        let accesses = built.rag.vertex(m0).accesses();
        assert_eq!(accesses.len(), 2);
        assert!(accesses.iter().any(|s| s.resource == a && s.access == AccessFlags::TRANSFER_READ));
        assert!(accesses.iter().any(|s| s.resource == b && s.access == AccessFlags::TRANSFER_WRITE));
    }
}
