//! External interfaces: the dispatcher never touches a graphics API
//! directly. Everything it needs from the backend, the asset system, and
//! the acceleration-structure manager is expressed as a trait here, and
//! supplied by the embedding application.

use access_graph::access::AccessFlags;
use access_graph::barrier::BarrierHandle;
use access_graph::range::ResourceRange;
use access_graph::ResourceId;

use crate::device_pass::DevicePass;

/// Resolves `(prev, next)` access transitions into backend-specific barrier
/// handles, with caching left to the implementation.
pub trait BarrierCache {
    fn general_barrier(&self, prev: AccessFlags, next: AccessFlags) -> BarrierHandle;
    fn buffer_barrier(&self, info: BufferBarrierInfo) -> BarrierHandle;
    fn texture_barrier(&self, info: TextureBarrierInfo) -> BarrierHandle;
}

/// Parameters for a buffer barrier lookup.
#[derive(Copy, Clone, Debug)]
pub struct BufferBarrierInfo {
    pub resource: ResourceId,
    pub range: ResourceRange,
    pub prev: AccessFlags,
    pub next: AccessFlags,
}

/// Parameters for a texture barrier lookup, additionally carrying the
/// layout transition a real backend needs.
#[derive(Copy, Clone, Debug)]
pub struct TextureBarrierInfo {
    pub resource: ResourceId,
    pub range: ResourceRange,
    pub prev: AccessFlags,
    pub next: AccessFlags,
}

/// A barrier whose `gfx_handle` has been resolved, ready to submit.
#[derive(Copy, Clone, Debug)]
pub struct ResolvedBarrier {
    pub resource: ResourceId,
    pub handle: BarrierHandle,
}

/// Backend framebuffer handle, opaque to the dispatcher.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FboHandle(pub u64);

/// The render area a device pass executes over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RenderArea {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Opaque clear-value payload, interpreted by the backend per-attachment.
#[derive(Clone, Debug, Default)]
pub struct ClearValues {
    pub color: Vec<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// The command-recording surface the device-pass executor drives.
pub trait CommandBuffer {
    fn pipeline_barrier(&mut self, barriers: &[ResolvedBarrier]);
    fn begin_render_pass(&mut self, rp: &DevicePass, fbo: FboHandle, area: RenderArea, clear: &ClearValues);
    fn next_subpass(&mut self);
    fn end_render_pass(&mut self);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, scissor: Rect);
}

/// Opaque per-model tag supplied by the asset/scene system, identifying an
/// instance within a top-level acceleration structure. A real implementation
/// must receive this via a proper asset tag rather than deriving it from a
/// name string.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceTag(pub u32);

#[derive(Clone, Debug)]
pub struct AccelBuildInfo {
    pub instances: Vec<InstanceTag>,
    pub allow_update: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct AccelStructureInfo {
    pub instance_count: u32,
    pub compacted_size: u64,
}

/// Acceleration-structure management, carried as an interface only: out of
/// scope for this crate, consumed through interfaces.
pub trait TopLevelAccelerationStructure {
    fn build(&mut self, info: &AccelBuildInfo);
    fn update(&mut self, info: &AccelBuildInfo);
    fn compact(&mut self);
    fn destroy(&mut self);
    fn set_info(&mut self, info: AccelStructureInfo);
}
