//! The conditions the dispatcher propagates to its caller rather than
//! asserting or downgrading inline: a null device or a missing backbuffer
//! view.

use failure::Fail;

/// Errors the dispatcher propagates to its caller. Every other invalid
/// condition (invariant violations, move-pass downgrade, unknown binding
/// visibility, missing present pass) is either a fatal assertion or handled
/// inline instead.
#[derive(Debug, Fail)]
pub enum DispatchError {
    /// `build`/`compile` was called with no device attached. The dispatcher
    /// produces no commands in this case.
    #[fail(display = "no graphics device attached to the graph builder")]
    NoDevice,

    /// A `Backbuffer`-residency resource was declared but never bound to an
    /// actual swapchain image before compilation.
    #[fail(display = "backbuffer resource `{}` has no bound swapchain image", name)]
    MissingBackbuffer {
        /// Name of the resource that was never bound.
        name: String,
    },
}
