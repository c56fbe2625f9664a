//! Per-resource transition bookkeeping maintained by the RAG builder as it
//! walks the render graph in declaration order.

use fnv::FnvHashMap;

use crate::access::AccessFlags;
use crate::range::ResourceRange;
use crate::{PassId, ResourceId};

/// One side of a [`ResourceTransition`]: which RAG vertex produced this
/// status, over what range, with what access.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionSide {
    pub vertex: PassId,
    pub range: ResourceRange,
    pub access: AccessFlags,
}

/// The last and current access recorded for one resource as the RAG builder
/// walks the render graph. `curr` is the source side of any future edge
/// into this resource; `last` is retained only so read-after-read chains
/// can link to the original producer instead of re-deriving it.
#[derive(Copy, Clone, Debug)]
pub struct ResourceTransition {
    pub last: Option<TransitionSide>,
    pub curr: TransitionSide,
}

/// The RAG builder's working map from resource to its current transition
/// state, built fresh at the start of each frame's graph build and dropped
/// at the end of it.
#[derive(Default)]
pub struct AccessRecord {
    transitions: FnvHashMap<ResourceId, ResourceTransition>,
}

impl AccessRecord {
    pub fn new() -> Self {
        AccessRecord::default()
    }

    pub fn get(&self, resource: ResourceId) -> Option<&ResourceTransition> {
        self.transitions.get(&resource)
    }

    pub fn insert_first(&mut self, resource: ResourceId, curr: TransitionSide) {
        self.transitions.insert(
            resource,
            ResourceTransition { last: None, curr },
        );
    }

    /// Shift `curr` into `last` and install a new `curr`, as happens when a
    /// real dependency edge is added.
    pub fn advance(&mut self, resource: ResourceId, curr: TransitionSide) {
        let entry = self
            .transitions
            .get_mut(&resource)
            .expect("advance called on an untracked resource");
        entry.last = Some(entry.curr);
        entry.curr = curr;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &ResourceTransition)> {
        self.transitions.iter().map(|(&id, t)| (id, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(vertex: usize, access: AccessFlags) -> TransitionSide {
        TransitionSide {
            vertex: PassId(vertex),
            range: ResourceRange::default(),
            access,
        }
    }

    #[test]
    fn advance_shifts_curr_into_last() {
        let mut rec = AccessRecord::new();
        let r = ResourceId(0);
        rec.insert_first(r, side(0, AccessFlags::COLOR_ATTACHMENT_WRITE));
        rec.advance(r, side(1, AccessFlags::FRAGMENT_SAMPLED_READ));

        let t = rec.get(r).unwrap();
        assert_eq!(t.last.unwrap().vertex, PassId(0));
        assert_eq!(t.curr.vertex, PassId(1));
    }
}
