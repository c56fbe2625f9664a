//! The Resource Graph (RG, component C1): the registry of every logical
//! resource the render graph can name, with its descriptor, residency trait
//! and last-known cross-frame access state.

use std::cell::Cell;

use fnv::FnvHashMap;

use crate::access::AccessFlags;
use crate::ResourceId;

bitflags! {
    /// How a resource may be used by a pass, independent of any particular
    /// access. Distinct from [`AccessFlags`]: usage is a declared capability
    /// of the resource, access is what one pass does with it on one frame.
    #[repr(transparent)]
    pub struct UsageFlags: u32 {
        /// May be bound as a sampled/storage resource in a shader.
        const SAMPLED              = 0x0001;
        /// May be bound as a read-write storage resource in a shader.
        const STORAGE               = 0x0002;
        /// May be bound as a color attachment.
        const COLOR_ATTACHMENT       = 0x0004;
        /// May be bound as a depth-stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT = 0x0008;
        /// May be bound as a subpass input attachment.
        const INPUT_ATTACHMENT       = 0x0010;
        /// May be bound as a variable-rate-shading attachment.
        const SHADING_RATE           = 0x0020;
        /// May be bound as a uniform buffer.
        const UNIFORM               = 0x0040;
        /// May be the source of a transfer operation.
        const TRANSFER_SRC           = 0x0080;
        /// May be the destination of a transfer operation.
        const TRANSFER_DST           = 0x0100;
    }
}

/// Dimensionality tag of a declared resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// A linear byte buffer.
    Buffer,
    /// A 1-D texture (or 1-D texture array).
    Tex1D,
    /// A 2-D texture (or 2-D texture array).
    Tex2D,
    /// A 3-D (volume) texture.
    Tex3D,
}

/// A pixel/texel format. Only what the dispatcher needs — enough to compute
/// a byte size for the reorder engine's heaviness score — is modeled; the
/// actual enumeration of hardware formats belongs to the graphics-device
/// backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Format {
    /// Bytes occupied by one texel of this format.
    pub bytes_per_texel: u32,
}

impl Format {
    /// Opaque byte format, one byte per texel. Suitable for raw buffers.
    pub const R8: Format = Format { bytes_per_texel: 1 };
    /// 32-bit single channel (e.g. depth-only).
    pub const R32: Format = Format {
        bytes_per_texel: 4,
    };
    /// 32-bit four channel (e.g. RGBA8 or similar).
    pub const RGBA8: Format = Format {
        bytes_per_texel: 4,
    };
    /// 64-bit four channel half-float.
    pub const RGBA16F: Format = Format {
        bytes_per_texel: 8,
    };
    /// 128-bit four channel float.
    pub const RGBA32F: Format = Format {
        bytes_per_texel: 16,
    };

    /// Byte size of a `width x height x depth_or_array` extent of this
    /// format, matching the source engine's `formatSize(fmt, w, h, d)`. Used
    /// by the reorder engine to weigh a vertex's writes/reads.
    pub fn byte_size(self, width: u32, height: u32, depth_or_array: u32) -> u64 {
        u64::from(width) * u64::from(height.max(1)) * u64::from(depth_or_array.max(1))
            * u64::from(self.bytes_per_texel)
    }
}

/// How a resource's backing memory persists across frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Backing memory may be reused by the allocator across frames; no
    /// cross-frame state is tracked.
    Managed,
    /// Backing memory survives frame-to-frame with meaningful content
    /// (e.g. history buffers, persistently-mapped readback targets).
    Persistent,
    /// Tile/on-chip storage with no backing memory at all; never read back
    /// and never survives past the render pass that produced it.
    Memoryless,
    /// The swapchain image.
    Backbuffer,
}

impl Residency {
    /// True iff this residency requires the RAG builder to track a
    /// persistent `states` field and the barrier builder to emit rear
    /// barriers transitioning back to a stable cross-frame state.
    pub fn has_side_effects(self) -> bool {
        matches!(self, Residency::Persistent | Residency::Backbuffer)
    }
}

/// Extent of a declared resource. For buffers only `width` (byte length) is
/// meaningful.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Extent {
    /// Width in texels (or byte length, for buffers).
    pub width: u32,
    /// Height in texels. 1 for buffers and 1-D textures.
    pub height: u32,
    /// Depth (3-D textures) or array-layer count (1-D/2-D textures).
    pub depth_or_array_size: u32,
    /// Mip level count.
    pub mip_levels: u32,
    /// Sample count (MSAA). 1 for non-multisampled resources.
    pub samples: u32,
}

impl Default for Extent {
    fn default() -> Self {
        Extent {
            width: 0,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            samples: 1,
        }
    }
}

/// A vertex of the Resource Graph: one logical, named resource.
#[derive(Debug)]
pub struct Resource {
    name: String,
    dimension: Dimension,
    format: Format,
    extent: Extent,
    usage: UsageFlags,
    residency: Residency,
    /// Last access flags observed for this resource across frames. Only
    /// meaningful (and only written) for resources with `has_side_effects`;
    /// read once at barrier-build time and written once at finalization.
    /// The sole piece of cross-frame mutable state in this crate.
    states: Cell<AccessFlags>,
}

impl Resource {
    /// Declare a new resource. `states` starts empty; the first frame that
    /// touches a side-effect resource finds no prior access and emits a
    /// first-meet barrier transitioning from `NONE`.
    pub fn new(
        name: impl Into<String>,
        dimension: Dimension,
        format: Format,
        extent: Extent,
        usage: UsageFlags,
        residency: Residency,
    ) -> Self {
        Resource {
            name: name.into(),
            dimension,
            format,
            extent,
            usage,
            residency,
            states: Cell::new(AccessFlags::empty()),
        }
    }

    /// Stable, unique resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimension tag.
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Declared pixel/texel format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Declared extent.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Declared usage flags.
    pub fn usage(&self) -> UsageFlags {
        self.usage
    }

    /// Residency trait.
    pub fn residency(&self) -> Residency {
        self.residency
    }

    /// Derived predicate: true iff residency is `Persistent` or `Backbuffer`.
    pub fn has_side_effects(&self) -> bool {
        self.residency.has_side_effects()
    }

    /// Byte size of the whole resource, for the reorder engine's heaviness
    /// score.
    pub fn byte_size(&self) -> u64 {
        match self.dimension {
            Dimension::Buffer => u64::from(self.extent.width),
            _ => self.format.byte_size(
                self.extent.width,
                self.extent.height,
                self.extent.depth_or_array_size,
            ),
        }
    }

    /// Last access flags observed across frames. Meaningless for resources
    /// without side effects (always empty).
    pub fn last_frame_access(&self) -> AccessFlags {
        self.states.get()
    }

    /// Record the access flags the last RAG node to touch this resource
    /// ended with. Called once per side-effect resource at the end of
    /// barrier-builder Pass C.
    pub fn set_last_frame_access(&self, access: AccessFlags) {
        self.states.set(access);
    }
}

/// Registry of every declared resource, keyed by [`ResourceId`] and by name.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
    by_name: FnvHashMap<String, ResourceId>,
}

impl ResourceGraph {
    /// An empty resource graph.
    pub fn new() -> Self {
        ResourceGraph::default()
    }

    /// Declare a resource, returning its stable id. Panics if a resource
    /// with the same name was already declared — names must be unique.
    pub fn declare(&mut self, resource: Resource) -> ResourceId {
        let name = resource.name().to_owned();
        assert!(
            !self.by_name.contains_key(&name),
            "resource `{}` already declared",
            name
        );
        let id = ResourceId(self.resources.len());
        self.by_name.insert(name, id);
        self.resources.push(resource);
        id
    }

    /// Look up a resource id by name.
    pub fn find(&self, name: &str) -> Option<ResourceId> {
        self.by_name.get(name).copied()
    }

    /// Look up a resource by id.
    pub fn get(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0]
    }

    /// Iterate all declared resources with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(i, r)| (ResourceId(i), r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backbuffer_and_persistent_have_side_effects() {
        assert!(Residency::Backbuffer.has_side_effects());
        assert!(Residency::Persistent.has_side_effects());
        assert!(!Residency::Managed.has_side_effects());
        assert!(!Residency::Memoryless.has_side_effects());
    }

    #[test]
    fn duplicate_name_panics() {
        let mut rg = ResourceGraph::new();
        rg.declare(Resource::new(
            "a",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent::default(),
            UsageFlags::COLOR_ATTACHMENT,
            Residency::Managed,
        ));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut rg = rg;
            rg.declare(Resource::new(
                "a",
                Dimension::Tex2D,
                Format::RGBA8,
                Extent::default(),
                UsageFlags::COLOR_ATTACHMENT,
                Residency::Managed,
            ));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn buffer_byte_size_is_width() {
        let r = Resource::new(
            "buf",
            Dimension::Buffer,
            Format::R8,
            Extent {
                width: 256,
                ..Default::default()
            },
            UsageFlags::UNIFORM,
            Residency::Managed,
        );
        assert_eq!(r.byte_size(), 256);
    }
}
