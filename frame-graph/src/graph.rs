//! Top-level orchestration: `GraphBuilder::compile` runs the five-stage
//! pipeline described in the crate-level docs and produces a [`Graph`] ready
//! for command recording.

use access_graph::resource::{Dimension, Extent, Residency, ResourceGraph};

use crate::access_graph_builder::{AccessGraphBuilder, BuiltGraphs};
use crate::barrier_builder::{BarrierBuilder, BarrierPlan};
use crate::config::GraphConfig;
use crate::device::{BarrierCache, BufferBarrierInfo, TextureBarrierInfo};
use crate::device_pass::{DevicePass, DevicePassAssembler};
use crate::error::DispatchError;
use crate::layout_graph::LayoutGraph;
use crate::render_graph::{PassKind, RenderGraph};
use crate::reorder::Reorder;
use access_graph::PassId;

/// A compiled frame: pass order, resolved barriers, and assembled device
/// passes, ready for a [`crate::device::CommandBuffer`] to execute.
pub struct Graph {
    pub order: Vec<PassId>,
    pub barriers: BarrierPlan,
    pub device_passes: Vec<DevicePass>,
}

/// Compiles a declared [`RenderGraph`] into a [`Graph`], gated by
/// [`GraphConfig`].
#[derive(Default)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config.clamped();
        self
    }

    /// Run the compile pipeline. `barrier_cache` is the only device
    /// dependency compilation needs; its absence is the one propagated
    /// error, the rest are fatal assertions.
    pub fn compile(
        &self,
        render: &RenderGraph,
        resources: &ResourceGraph,
        layout: &LayoutGraph,
        barrier_cache: Option<&dyn BarrierCache>,
    ) -> Result<Graph, DispatchError> {
        let barrier_cache = barrier_cache.ok_or(DispatchError::NoDevice)?;

        self.check_backbuffers_referenced(render, resources)?;

        let BuiltGraphs { rag, mut relation } = AccessGraphBuilder::new(render, resources, layout)
            .with_branch_culling(self.config.branch_culling)
            .build();

        let order = if self.config.enable_pass_reorder {
            Reorder::new(&rag, resources, self.config.parallel_exec_weight).run(&mut relation)
        } else {
            rag.topo_order().collect()
        };

        if self.config.enable_memory_aliasing {
            log::debug!("memory aliasing enabled but not implemented; running as a no-op");
        }

        let mut barriers = BarrierBuilder::new(&rag, resources).build();
        resolve_barrier_handles(&mut barriers, resources, barrier_cache);

        let assembler = DevicePassAssembler::new(resources);
        let mut device_passes = Vec::new();
        for (declared_id, pass) in render.iter() {
            if !matches!(pass.kind, PassKind::Raster) {
                continue;
            }
            let vertex = match rag.vertex_for_declared(declared_id.0) {
                Some(vertex) => vertex,
                None => continue,
            };
            let extent = pass
                .views
                .first()
                .map(|v| resources.get(v.resource).extent())
                .unwrap_or_else(Extent::default);
            let explicit_viewports: Vec<_> = std::iter::once(pass)
                .chain(render.iter().filter_map(|(_, p)| {
                    matches!(p.kind, PassKind::RasterSubpass { parent } if parent == declared_id)
                        .then_some(p)
                }))
                .filter_map(|p| p.explicit_viewport)
                .collect();
            device_passes.push(assembler.assemble(rag.vertex(vertex), extent, &explicit_viewports));
        }

        log::info!(
            "compiled frame graph: {} passes, {} device passes, reorder={}",
            order.len(),
            device_passes.len(),
            self.config.enable_pass_reorder
        );

        Ok(Graph { order, barriers, device_passes })
    }

    fn check_backbuffers_referenced(&self, render: &RenderGraph, resources: &ResourceGraph) -> Result<(), DispatchError> {
        for (id, resource) in resources.iter() {
            if resource.residency() != Residency::Backbuffer {
                continue;
            }
            let referenced = render
                .iter()
                .any(|(_, pass)| pass.views.iter().any(|v| v.resource == id));
            if !referenced {
                return Err(DispatchError::MissingBackbuffer {
                    name: resource.name().to_owned(),
                });
            }
        }
        Ok(())
    }
}

fn resolve_barrier_handles(plan: &mut BarrierPlan, resources: &ResourceGraph, cache: &dyn BarrierCache) {
    for bucket in plan.front.iter_mut().chain(plan.rear.iter_mut()) {
        for barrier in bucket.iter_mut() {
            let resource = resources.get(barrier.resource);
            let handle = match resource.dimension() {
                Dimension::Buffer => cache.buffer_barrier(BufferBarrierInfo {
                    resource: barrier.resource,
                    range: barrier.range,
                    prev: barrier.begin_access,
                    next: barrier.end_access,
                }),
                _ => cache.texture_barrier(TextureBarrierInfo {
                    resource: barrier.resource,
                    range: barrier.range,
                    prev: barrier.begin_access,
                    next: barrier.end_access,
                }),
            };
            barrier.gfx_handle = Some(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_graph::access::AccessFlags;
    use access_graph::barrier::BarrierHandle;
    use access_graph::resource::{Dimension as Dim, Format, Resource, UsageFlags};
    use crate::device::{TextureBarrierInfo as TexInfo, BufferBarrierInfo as BufInfo};
    use crate::render_graph::{MemoryAccess, ViewDecl};

    struct StubCache;
    impl BarrierCache for StubCache {
        fn general_barrier(&self, _prev: AccessFlags, _next: AccessFlags) -> BarrierHandle {
            BarrierHandle(1)
        }
        fn buffer_barrier(&self, _info: BufInfo) -> BarrierHandle {
            BarrierHandle(2)
        }
        fn texture_barrier(&self, _info: TexInfo) -> BarrierHandle {
            BarrierHandle(3)
        }
    }

    #[test]
    fn missing_backbuffer_is_an_error() {
        let mut resources = ResourceGraph::new();
        resources.declare(Resource::new(
            "swapchain",
            Dim::Tex2D,
            Format::RGBA8,
            Extent { width: 1920, height: 1080, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT,
            Residency::Backbuffer,
        ));
        let render = RenderGraph::new();
        let layout = LayoutGraph::new();
        let cache = StubCache;

        let result = GraphBuilder::new().compile(&render, &resources, &layout, Some(&cache));
        assert!(matches!(result, Err(DispatchError::MissingBackbuffer { .. })));
    }

    #[test]
    fn no_device_is_an_error() {
        let resources = ResourceGraph::new();
        let render = RenderGraph::new();
        let layout = LayoutGraph::new();
        let result = GraphBuilder::new().compile(&render, &resources, &layout, None);
        assert!(matches!(result, Err(DispatchError::NoDevice)));
    }

    #[test]
    fn straight_line_pipeline_compiles_with_resolved_handles() {
        let mut resources = ResourceGraph::new();
        let a = resources.declare(Resource::new(
            "a",
            Dim::Tex2D,
            Format::RGBA8,
            Extent { width: 64, height: 64, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT | UsageFlags::SAMPLED,
            Residency::Managed,
        ));
        let mut render = RenderGraph::new();
        render.add_pass("write", PassKind::Raster, vec![ViewDecl::new("out", a, MemoryAccess::Write)]);
        render.add_pass("read", PassKind::Raster, vec![ViewDecl::new("in", a, MemoryAccess::Read)]);

        let layout = LayoutGraph::new();
        let cache = StubCache;
        let compiled = GraphBuilder::new()
            .compile(&render, &resources, &layout, Some(&cache))
            .expect("compile should succeed");

        assert_eq!(compiled.device_passes.len(), 2);
        for bucket in compiled.barriers.front.iter().chain(compiled.barriers.rear.iter()) {
            for barrier in bucket {
                assert!(barrier.gfx_handle.is_some());
            }
        }
    }

    #[test]
    fn explicit_viewport_overrides_attachment_shrink() {
        use crate::device::RenderArea;

        let mut resources = ResourceGraph::new();
        let a = resources.declare(Resource::new(
            "a",
            Dim::Tex2D,
            Format::RGBA8,
            Extent { width: 1024, height: 1024, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT,
            Residency::Managed,
        ));
        let mut render = RenderGraph::new();
        let write = render.add_pass("write", PassKind::Raster, vec![ViewDecl::new("out", a, MemoryAccess::Write)]);
        render.set_explicit_viewport(write, RenderArea { x: 0, y: 0, width: 256, height: 128 });

        let layout = LayoutGraph::new();
        let cache = StubCache;
        let compiled = GraphBuilder::new()
            .compile(&render, &resources, &layout, Some(&cache))
            .expect("compile should succeed");

        assert_eq!(compiled.device_passes.len(), 1);
        assert_eq!(compiled.device_passes[0].render_area, RenderArea { x: 0, y: 0, width: 256, height: 128 });
    }
}
