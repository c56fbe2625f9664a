//! Frame-graph dispatcher: the compile-time planner that turns a declarative
//! render graph into an ordered, barrier-correct execution plan.
//!
//! Compilation runs in five stages: render graph (declared by the user) +
//! resource graph + layout graph → [`access_graph`] RAG builder → optional
//! [`reorder`] → optional memory aliasing (a documented no-op) →
//! [`barrier_builder`] →
//! [`device_pass`] assembly. [`culling`] runs independently, once per frame,
//! and feeds draw items that device passes consume through their draw
//! callback.

#[macro_use]
extern crate bitflags;

pub use access_graph;

pub mod access_graph_builder;
pub mod barrier_builder;
pub mod config;
pub mod culling;
pub mod device;
pub mod device_pass;
pub mod error;
pub mod layout_graph;
pub mod render_graph;
pub mod reorder;

mod graph;

pub use graph::{Graph, GraphBuilder};
