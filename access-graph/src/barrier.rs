//! The `Barrier` value type and its opaque, device-cached handle.

use crate::access::AccessFlags;
use crate::range::ResourceRange;
use crate::ResourceId;

/// Which shape of barrier this is.
///
/// A `Full` barrier executes entirely at one point in the command stream. A
/// `SplitBegin`/`SplitEnd` pair lets the GPU overlap unrelated work between
/// the two halves — `SplitBegin` goes in the producer's rear barriers,
/// `SplitEnd` in the consumer's front barriers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BarrierKind {
    Full,
    SplitBegin,
    SplitEnd,
}

/// An opaque handle the graphics device hands back for a cached
/// `(prev, next)` barrier pair. The dispatcher never inspects it — it is
/// stored and replayed verbatim at command-recording time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BarrierHandle(pub u64);

/// A synchronization point for one resource between two accesses.
#[derive(Clone, Debug)]
pub struct Barrier {
    pub resource: ResourceId,
    pub kind: BarrierKind,
    pub range: ResourceRange,
    pub begin_access: AccessFlags,
    pub end_access: AccessFlags,
    /// Resolved last, by asking the device's barrier cache for the
    /// `(begin_access, end_access)` pair. `None` until that resolution
    /// step runs.
    pub gfx_handle: Option<BarrierHandle>,
}

impl Barrier {
    pub fn new(
        resource: ResourceId,
        kind: BarrierKind,
        range: ResourceRange,
        begin_access: AccessFlags,
        end_access: AccessFlags,
    ) -> Self {
        Barrier {
            resource,
            kind,
            range,
            begin_access,
            end_access,
            gfx_handle: None,
        }
    }

    /// A subpass may never contain a barrier. Call this wherever a barrier
    /// is about to be attached to a subpass sub-node's own barrier list, as
    /// a hard assertion.
    pub fn assert_not_in_subpass(in_subpass: bool) {
        assert!(
            !in_subpass,
            "attempted to emit a pipeline barrier inside a subpass; cross-subpass \
             hazards must be expressed as subpass dependencies"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "inside a subpass")]
    fn barrier_inside_subpass_is_fatal() {
        Barrier::assert_not_in_subpass(true);
    }

    #[test]
    fn barrier_outside_subpass_is_fine() {
        Barrier::assert_not_in_subpass(false);
    }
}
