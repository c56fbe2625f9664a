//! Barrier builder (component C6): three passes over the RAG producing
//! front/rear barrier lists, subpass dependencies, and the final write-back
//! of cross-frame resource state.

use std::collections::VecDeque;

use fnv::{FnvHashMap, FnvHashSet};

use access_graph::access::AccessFlags;
use access_graph::barrier::{Barrier, BarrierKind};
use access_graph::range::ResourceRange;
use access_graph::resource::{Residency, ResourceGraph};
use access_graph::{PassId, ResourceId};

use crate::access_graph_builder::ResourceAccessGraph;

/// A dependency between two subpasses of the same physical pass, emitted in
/// place of a pipeline barrier.
#[derive(Copy, Clone, Debug)]
pub struct SubpassDependency {
    pub pass: PassId,
    pub src_subpass: usize,
    pub dst_subpass: usize,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    /// A `dst -> dst` self-dependency, emitted when a subpass both writes
    /// and reads the same attachment (a feedback loop).
    pub is_self_dependency: bool,
}

/// The output of [`BarrierBuilder::build`]: per-vertex front/rear barrier
/// lists plus the subpass dependencies folded out of pipeline barriers.
pub struct BarrierPlan {
    pub front: Vec<Vec<Barrier>>,
    pub rear: Vec<Vec<Barrier>>,
    pub subpass_dependencies: Vec<SubpassDependency>,
}

impl BarrierPlan {
    fn new(vertex_count: usize) -> Self {
        BarrierPlan {
            front: vec![Vec::new(); vertex_count],
            rear: vec![Vec::new(); vertex_count],
            subpass_dependencies: Vec::new(),
        }
    }
}

/// Tracks, per `(resource, producer)` epoch, the consumer currently holding
/// that epoch's split pair, so a later BFS iteration that finds a tighter
/// consumer for the *same* producer can erase and replace it with a closer
/// one. Keying on the producer as well as the resource keeps two write
/// epochs of the same resource from being compared against each other.
struct SplitBarrierSlot {
    consumer: PassId,
}

pub struct BarrierBuilder<'a> {
    rag: &'a ResourceAccessGraph,
    rg: &'a ResourceGraph,
}

impl<'a> BarrierBuilder<'a> {
    pub fn new(rag: &'a ResourceAccessGraph, rg: &'a ResourceGraph) -> Self {
        BarrierBuilder { rag, rg }
    }

    pub fn build(&self) -> BarrierPlan {
        let mut plan = BarrierPlan::new(self.rag.vertex_count());
        let mut seen_this_frame: FnvHashSet<ResourceId> = FnvHashSet::default();

        self.pass_a_first_meet(&mut plan, &mut seen_this_frame);
        self.pass_b_inter_pass(&mut plan);
        self.pass_b_subpass_dependencies(&mut plan);
        self.pass_c_present_and_persistence(&mut plan);

        plan
    }

    /// Pass A: for each vertex in topological order, for each declared
    /// status, emit a first-meet barrier the first time a resource is seen
    /// this frame.
    fn pass_a_first_meet(&self, plan: &mut BarrierPlan, seen: &mut FnvHashSet<ResourceId>) {
        for vertex in self.rag.topo_order() {
            for status in self.rag.vertex(vertex).accesses() {
                if !seen.insert(status.resource) {
                    continue;
                }

                let resource = self.rg.get(status.resource);
                let prior = if resource.has_side_effects() {
                    resource.last_frame_access()
                } else {
                    AccessFlags::empty()
                };

                if prior.is_read_only() && status.access.is_read_only() {
                    continue;
                }

                let kind = if !resource.has_side_effects() {
                    BarrierKind::Full
                } else if resource.residency() == Residency::Backbuffer {
                    BarrierKind::Full
                } else {
                    BarrierKind::SplitEnd
                };

                log::trace!(
                    "barrier pass A: vertex {:?} resource {:?} {:?} {:?} -> {:?}",
                    vertex,
                    status.resource,
                    kind,
                    prior,
                    status.access
                );

                plan.front[vertex.0].push(Barrier::new(
                    status.resource,
                    kind,
                    status.range,
                    prior,
                    status.access,
                ));
            }
        }
    }

    /// Pass B: BFS from the start vertex, emitting barriers (or split pairs)
    /// on every edge whose endpoints share a dependent resource access.
    fn pass_b_inter_pass(&self, plan: &mut BarrierPlan) {
        let mut visited_edges: FnvHashSet<(PassId, PassId)> = FnvHashSet::default();
        let mut queue = VecDeque::new();
        let mut queued = FnvHashSet::default();
        queue.push_back(self.rag.start());
        queued.insert(self.rag.start());

        let mut split_slots: FnvHashMap<(ResourceId, PassId), SplitBarrierSlot> = FnvHashMap::default();

        while let Some(from) = queue.pop_front() {
            for &to in self.rag.successors(from) {
                if visited_edges.insert((from, to)) {
                    self.process_edge(plan, &mut split_slots, from, to);
                }
                if queued.insert(to) {
                    queue.push_back(to);
                }
            }
        }
    }

    fn process_edge(
        &self,
        plan: &mut BarrierPlan,
        split_slots: &mut FnvHashMap<(ResourceId, PassId), SplitBarrierSlot>,
        from: PassId,
        to: PassId,
    ) {
        let shared = self.rag.vertex(from).intersect(self.rag.vertex(to));

        for (from_status, to_status) in shared {
            if self.rag.is_moved(from_status.resource) {
                continue;
            }
            if from_status.access.is_read_only() && to_status.access.is_read_only() {
                continue;
            }

            let adjacent = from.0.abs_diff(to.0) <= 1;

            if adjacent {
                log::trace!(
                    "barrier pass B: full barrier {:?} -> {:?} on resource {:?}",
                    from,
                    to,
                    from_status.resource
                );
                plan.rear[from.0].push(Barrier::new(
                    from_status.resource,
                    BarrierKind::Full,
                    from_status.range,
                    from_status.access,
                    to_status.access,
                ));
                continue;
            }

            let slot_key = (from_status.resource, from);
            if let Some(old) = split_slots.get(&slot_key) {
                let old_span = old.consumer.0 - from.0;
                let new_span = to.0 - from.0;
                if new_span >= old_span {
                    // The previously recorded bracketing pair is already
                    // tighter (or equal); keep it.
                    continue;
                }
                // Locate the live entries by scanning rather than trusting a
                // stored index: an unrelated resource's removal earlier in
                // this same rear/front list would have shifted any index
                // recorded when this pair was inserted.
                if let Some(pos) = plan.rear[from.0]
                    .iter()
                    .position(|b| b.resource == from_status.resource && b.kind == BarrierKind::SplitBegin)
                {
                    plan.rear[from.0].remove(pos);
                }
                if let Some(pos) = plan.front[old.consumer.0]
                    .iter()
                    .position(|b| b.resource == from_status.resource && b.kind == BarrierKind::SplitEnd)
                {
                    plan.front[old.consumer.0].remove(pos);
                }
            }

            log::trace!(
                "barrier pass B: split barrier {:?} -> {:?} on resource {:?}",
                from,
                to,
                from_status.resource
            );
            plan.rear[from.0].push(Barrier::new(
                from_status.resource,
                BarrierKind::SplitBegin,
                from_status.range,
                from_status.access,
                to_status.access,
            ));
            plan.front[to.0].push(Barrier::new(
                from_status.resource,
                BarrierKind::SplitEnd,
                from_status.range,
                from_status.access,
                to_status.access,
            ));

            split_slots.insert(slot_key, SplitBarrierSlot { consumer: to });
        }
    }

    /// Subpass dependencies, generated from pairs of subpasses chained onto
    /// the same vertex rather than from cross-vertex edges.
    fn pass_b_subpass_dependencies(&self, plan: &mut BarrierPlan) {
        for vertex in self.rag.topo_order() {
            let node = self.rag.vertex(vertex);
            if !node.is_multi_subpass() {
                continue;
            }
            let subpasses = node.subpasses();
            for i in 0..subpasses.len() {
                for j in (i + 1)..subpasses.len() {
                    for (src_status, dst_status) in subpasses[i].intersect(&subpasses[j]) {
                        if src_status.access.is_read_only() && dst_status.access.is_read_only() {
                            continue;
                        }

                        plan.subpass_dependencies.push(SubpassDependency {
                            pass: vertex,
                            src_subpass: i,
                            dst_subpass: j,
                            src_access: src_status.access,
                            dst_access: dst_status.access,
                            is_self_dependency: false,
                        });

                        if dst_status.access.is_write() && dst_status.access.has_read_access() {
                            plan.subpass_dependencies.push(SubpassDependency {
                                pass: vertex,
                                src_subpass: j,
                                dst_subpass: j,
                                src_access: dst_status.access,
                                dst_access: dst_status.access,
                                is_self_dependency: true,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Pass C: write every side-effect resource's final access back into
    /// `RG.states`, and append the backbuffer's present barrier.
    fn pass_c_present_and_persistence(&self, plan: &mut BarrierPlan) {
        let mut last_touch: FnvHashMap<ResourceId, (PassId, AccessFlags, ResourceRange)> = FnvHashMap::default();

        for vertex in self.rag.topo_order() {
            for status in self.rag.vertex(vertex).accesses() {
                if self.rg.get(status.resource).has_side_effects() {
                    last_touch.insert(status.resource, (vertex, status.access, status.range));
                }
            }
        }

        for (resource, (vertex, access, range)) in &last_touch {
            self.rg.get(*resource).set_last_frame_access(*access);

            if self.rg.get(*resource).residency() == Residency::Backbuffer {
                log::debug!("barrier pass C: present barrier for {:?} at vertex {:?}", resource, vertex);
                plan.rear[vertex.0].push(Barrier::new(
                    *resource,
                    BarrierKind::Full,
                    *range,
                    *access,
                    AccessFlags::PRESENT,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_graph::resource::{Dimension, Extent, Format, Resource, UsageFlags};
    use crate::access_graph_builder::AccessGraphBuilder;
    use crate::layout_graph::LayoutGraph;
    use crate::render_graph::{MemoryAccess, PassKind, RenderGraph, ViewDecl};

    #[test]
    fn straight_line_pipeline_emits_full_barrier_between_adjacent_passes() {
        let mut rg = ResourceGraph::new();
        let a = rg.declare(Resource::new(
            "a",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent { width: 64, height: 64, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT | UsageFlags::SAMPLED,
            Residency::Managed,
        ));

        let mut rgd = RenderGraph::new();
        rgd.add_pass("write", PassKind::Raster, vec![ViewDecl::new("out", a, MemoryAccess::Write)]);
        rgd.add_pass("read", PassKind::Raster, vec![ViewDecl::new("in", a, MemoryAccess::Read)]);

        let lg = LayoutGraph::new();
        let built = AccessGraphBuilder::new(&rgd, &rg, &lg).build();
        let plan = BarrierBuilder::new(&built.rag, &rg).build();

        let producer = *built.rag.successors(built.rag.start()).first().unwrap();
        let full_barrier_emitted = plan.rear[producer.0]
            .iter()
            .any(|b| b.resource == a && b.kind == BarrierKind::Full);
        assert!(full_barrier_emitted);
    }

    #[test]
    fn backbuffer_gets_present_barrier() {
        let mut rg = ResourceGraph::new();
        let bb = rg.declare(Resource::new(
            "swapchain",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent { width: 1920, height: 1080, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT,
            Residency::Backbuffer,
        ));

        let mut rgd = RenderGraph::new();
        rgd.add_pass("final", PassKind::Raster, vec![ViewDecl::new("out", bb, MemoryAccess::Write)]);
        rgd.add_pass("present", PassKind::Present { resource: bb }, vec![ViewDecl::new("out", bb, MemoryAccess::Read)]);

        let lg = LayoutGraph::new();
        let built = AccessGraphBuilder::new(&rgd, &rg, &lg).build();
        let plan = BarrierBuilder::new(&built.rag, &rg).build();

        let has_present = plan.rear.iter().flatten().any(|b| b.resource == bb && b.end_access == AccessFlags::PRESENT);
        assert!(has_present);
    }
}
