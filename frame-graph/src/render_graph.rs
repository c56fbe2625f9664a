//! The Render Graph (RGD, component C3): the user-declared DAG of passes,
//! each with named resource views. Declaration order is also topological
//! order — the RAG builder never reorders passes, it only appends edges.

use access_graph::access::AccessFlags;
use access_graph::range::ResourceRange;
use access_graph::resource::UsageFlags;
use access_graph::{PassId, ResourceId};

use crate::device::RenderArea;
use crate::layout_graph::ShaderStages;

/// How a declared view uses its resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryAccess {
    Read,
    Write,
    ReadWrite,
}

/// One resource view a pass declares.
#[derive(Clone, Debug)]
pub struct ViewDecl {
    /// Binding name, looked up in the [`crate::layout_graph::LayoutGraph`].
    pub binding: String,
    pub resource: ResourceId,
    pub range: ResourceRange,
    pub memory_access: MemoryAccess,
}

impl ViewDecl {
    pub fn new(binding: impl Into<String>, resource: ResourceId, memory_access: MemoryAccess) -> Self {
        ViewDecl {
            binding: binding.into(),
            resource,
            range: ResourceRange::default(),
            memory_access,
        }
    }

    pub fn with_range(mut self, range: ResourceRange) -> Self {
        self.range = range;
        self
    }
}

/// The seven-plus-one pass variants the dispatcher understands.
///
/// Closed set, modeled as a tagged union rather than a trait-object
/// hierarchy: there's no reason to pay for dynamic dispatch over a fixed,
/// never-extended list of variants.
#[derive(Clone, Debug)]
pub enum PassKind {
    Raster,
    /// A subpass chained onto an earlier `Raster` pass. `parent` must name a
    /// pass of kind `Raster` declared earlier in the graph.
    RasterSubpass { parent: PassId },
    Compute,
    /// A subpass chained onto an earlier `Compute` pass.
    ComputeSubpass { parent: PassId },
    Copy { src: ResourceId, dst: ResourceId },
    /// A rename: `src`'s contents become `dst`'s without a copy, valid only
    /// when shape and residency permit (Glossary "Move pass"; validation
    /// rules in `access_graph_builder`). Downgrades to `Copy` automatically
    /// on validation failure.
    Move { src: ResourceId, dst: ResourceId },
    Raytrace,
    /// The frame's present pass. Synthesized automatically if the user
    /// never declares one.
    Present { resource: ResourceId },
}

impl PassKind {
    /// True for `Raster`/`Compute` kinds that may themselves be the parent
    /// of a later subpass.
    pub fn is_subpass_root(&self) -> bool {
        matches!(self, PassKind::Raster | PassKind::Compute)
    }

    /// True for the two subpass kinds, which don't get their own RAG
    /// vertex — they fold into their parent's.
    pub fn is_subpass(&self) -> bool {
        matches!(self, PassKind::RasterSubpass { .. } | PassKind::ComputeSubpass { .. })
    }

    pub fn parent(&self) -> Option<PassId> {
        match self {
            PassKind::RasterSubpass { parent } | PassKind::ComputeSubpass { parent } => {
                Some(*parent)
            }
            _ => None,
        }
    }

    /// True for raster-family kinds, used by access-flag derivation:
    /// `isRasterized` is one of the inputs to the access-flag table.
    pub fn is_rasterized(&self) -> bool {
        matches!(
            self,
            PassKind::Raster | PassKind::RasterSubpass { .. } | PassKind::Present { .. }
        )
    }
}

/// One declared pass.
#[derive(Clone, Debug)]
pub struct PassDecl {
    pub name: String,
    pub kind: PassKind,
    pub views: Vec<ViewDecl>,
    /// Explicit render area for a raster pass's subpasses, overriding the
    /// default shrink-to-smallest-attachment-extent computation. Several
    /// explicit viewports across a pass's subpasses union together.
    pub explicit_viewport: Option<RenderArea>,
}

/// The user-declared DAG of passes, in declaration order.
#[derive(Default)]
pub struct RenderGraph {
    passes: Vec<PassDecl>,
}

impl RenderGraph {
    pub fn new() -> Self {
        RenderGraph::default()
    }

    /// Declare a pass, returning its stable id (its index in declaration
    /// order, which doubles as topological order until the reorder engine
    /// runs).
    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        kind: PassKind,
        views: Vec<ViewDecl>,
    ) -> PassId {
        if let Some(parent) = kind.parent() {
            assert!(
                parent.0 < self.passes.len(),
                "subpass parent must be declared before the subpass"
            );
            assert!(
                self.passes[parent.0].kind.is_subpass_root(),
                "subpass parent `{}` is not a raster/compute pass",
                self.passes[parent.0].name
            );
        }
        let id = PassId(self.passes.len());
        self.passes.push(PassDecl { name: name.into(), kind, views, explicit_viewport: None });
        id
    }

    /// Override a raster pass's render area with an explicit viewport
    /// instead of the default shrink-to-smallest-attachment-extent
    /// computation. Multiple subpasses of the same parent pass may each set
    /// their own; the device pass assembler unions them.
    pub fn set_explicit_viewport(&mut self, id: PassId, area: RenderArea) {
        self.passes[id.0].explicit_viewport = Some(area);
    }

    pub fn get(&self, id: PassId) -> &PassDecl {
        &self.passes[id.0]
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Iterate passes in declaration order, paired with their id.
    pub fn iter(&self) -> impl Iterator<Item = (PassId, &PassDecl)> {
        self.passes.iter().enumerate().map(|(i, p)| (PassId(i), p))
    }

    /// True iff the user declared a `Present` pass anywhere in the graph.
    pub fn has_present_pass(&self) -> bool {
        self.passes.iter().any(|p| matches!(p.kind, PassKind::Present { .. }))
    }
}

/// Derive a view's [`AccessFlags`] from pass kind, declared memory access,
/// shader-stage visibility, the resource's usage flags, and whether the
/// pass is rasterized.
///
/// Table-driven rather than a long `if`/`else` chain: usage bits gate which
/// access bit is legal, and rasterization plus read/write select among the
/// attachment-shaped bits.
pub fn derive_access_flags(
    kind: &PassKind,
    memory_access: MemoryAccess,
    visibility: ShaderStages,
    usage: UsageFlags,
) -> AccessFlags {
    let mut flags = AccessFlags::empty();

    match kind {
        PassKind::Copy { .. } => {
            flags |= match memory_access {
                MemoryAccess::Read => AccessFlags::TRANSFER_READ,
                MemoryAccess::Write => AccessFlags::TRANSFER_WRITE,
                MemoryAccess::ReadWrite => AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
            };
            return flags;
        }
        PassKind::Move { .. } => {
            // Move-pass validation failure falls back to a copy pass; the
            // fallback path uses the same flags as `Copy`, so share them
            // here.
            flags |= match memory_access {
                MemoryAccess::Read => AccessFlags::TRANSFER_READ,
                MemoryAccess::Write => AccessFlags::TRANSFER_WRITE,
                MemoryAccess::ReadWrite => AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
            };
            return flags;
        }
        PassKind::Present { .. } => {
            return AccessFlags::PRESENT;
        }
        _ => {}
    }

    if kind.is_rasterized() {
        if usage.contains(UsageFlags::COLOR_ATTACHMENT) {
            flags |= match memory_access {
                MemoryAccess::Read => AccessFlags::COLOR_ATTACHMENT_READ,
                MemoryAccess::Write => AccessFlags::COLOR_ATTACHMENT_WRITE,
                MemoryAccess::ReadWrite => {
                    AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE
                }
            };
        }
        if usage.contains(UsageFlags::DEPTH_STENCIL_ATTACHMENT) {
            flags |= match memory_access {
                MemoryAccess::Read => AccessFlags::DEPTH_STENCIL_READ,
                MemoryAccess::Write => AccessFlags::DEPTH_STENCIL_WRITE,
                MemoryAccess::ReadWrite => {
                    AccessFlags::DEPTH_STENCIL_READ | AccessFlags::DEPTH_STENCIL_WRITE
                }
            };
        }
        if usage.contains(UsageFlags::INPUT_ATTACHMENT) && memory_access == MemoryAccess::Read {
            flags |= AccessFlags::INPUT_ATTACHMENT_READ;
        }
        if usage.contains(UsageFlags::SHADING_RATE) {
            flags |= AccessFlags::SHADING_RATE;
        }
    }

    if usage.contains(UsageFlags::SAMPLED) && memory_access == MemoryAccess::Read {
        if visibility.contains(ShaderStages::FRAGMENT) {
            flags |= AccessFlags::FRAGMENT_SAMPLED_READ;
        }
        if visibility.intersects(ShaderStages::VERTEX | ShaderStages::COMPUTE | ShaderStages::GEOMETRY) {
            flags |= AccessFlags::SHADER_READ;
        }
    }

    if usage.contains(UsageFlags::STORAGE) {
        flags |= match memory_access {
            MemoryAccess::Read => AccessFlags::SHADER_READ,
            MemoryAccess::Write => AccessFlags::SHADER_WRITE,
            MemoryAccess::ReadWrite => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
        };
    }

    if usage.contains(UsageFlags::UNIFORM) && memory_access == MemoryAccess::Read {
        flags |= AccessFlags::UNIFORM_READ;
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_write_then_fragment_read_derive_expected_flags() {
        let write = derive_access_flags(
            &PassKind::Raster,
            MemoryAccess::Write,
            ShaderStages::empty(),
            UsageFlags::COLOR_ATTACHMENT,
        );
        assert_eq!(write, AccessFlags::COLOR_ATTACHMENT_WRITE);

        let read = derive_access_flags(
            &PassKind::Raster,
            MemoryAccess::Read,
            ShaderStages::FRAGMENT,
            UsageFlags::SAMPLED,
        );
        assert_eq!(read, AccessFlags::FRAGMENT_SAMPLED_READ);
    }

    #[test]
    fn present_pass_always_yields_present_flag() {
        let resource = ResourceId(0);
        let flags = derive_access_flags(
            &PassKind::Present { resource },
            MemoryAccess::Read,
            ShaderStages::empty(),
            UsageFlags::empty(),
        );
        assert_eq!(flags, AccessFlags::PRESENT);
    }

    #[test]
    #[should_panic(expected = "must be declared before")]
    fn subpass_before_parent_panics() {
        let mut rgd = RenderGraph::new();
        rgd.add_pass(
            "sub",
            PassKind::RasterSubpass { parent: PassId(5) },
            Vec::new(),
        );
    }
}
