//! Low-level primitives shared by the frame-graph dispatcher: GPU access-flag
//! bitmasks, resource sub-region ranges, the resource-graph vertex type, and
//! the barrier value type. Higher-level graph building, reordering and
//! barrier synthesis live in the `frame-graph` crate.

#[macro_use]
extern crate bitflags;

pub mod access;
pub mod barrier;
pub mod node;
pub mod range;
pub mod resource;
pub mod transition;

/// Stable identifier for a resource declared into a [`resource::ResourceGraph`].
///
/// Resources are interned by name at declaration time; the `Id` is the
/// index into the graph's backing arena and is stable for the lifetime of
/// the graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub usize);

/// Stable identifier for a vertex in the Resource Access Graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassId(pub usize);
