//! The Resource Access Graph vertex (component of C4): one per declared
//! pass, carrying the sorted set of resource views the pass declared and
//! (for multi-subpass raster passes) a chain of subpass sub-nodes.

use smallvec::SmallVec;

use crate::access::AccessFlags;
use crate::range::ResourceRange;
use crate::ResourceId;

/// One declared view: a pass reads or writes `range` of `resource` with
/// `access`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AccessStatus {
    pub resource: ResourceId,
    pub range: ResourceRange,
    pub access: AccessFlags,
}

/// A Resource Access Graph vertex: the per-pass access record.
///
/// `attachment_status` is kept sorted by [`ResourceId`] so two nodes'
/// resource sets can be intersected in one linear merge, deterministically.
#[derive(Clone, Debug, Default)]
pub struct ResourceAccessNode {
    attachment_status: SmallVec<[AccessStatus; 4]>,
    /// Present only on the head node of a multi-subpass raster pass; one
    /// entry per subpass after the head, in declaration order. The head
    /// node's own `attachment_status` is the union of every subpass's
    /// status.
    ///
    /// Modeled as a `Vec` of sub-nodes rather than an intrusive linked
    /// list: no manual teardown, and subpass `i`'s status is a plain index
    /// instead of a pointer walk.
    subpasses: Vec<ResourceAccessNode>,
}

impl ResourceAccessNode {
    /// A vertex with no declared views yet.
    pub fn new() -> Self {
        ResourceAccessNode::default()
    }

    /// Declare a view on this vertex, keeping `attachment_status` sorted by
    /// resource id.
    pub fn add_access(&mut self, status: AccessStatus) {
        let pos = self
            .attachment_status
            .binary_search_by_key(&status.resource, |s| s.resource)
            .unwrap_or_else(|pos| pos);
        self.attachment_status.insert(pos, status);
    }

    /// All declared views, sorted by resource id.
    pub fn accesses(&self) -> &[AccessStatus] {
        &self.attachment_status
    }

    /// The declared access for `resource`, if this vertex touches it.
    pub fn access_for(&self, resource: ResourceId) -> Option<AccessFlags> {
        self.attachment_status
            .binary_search_by_key(&resource, |s| s.resource)
            .ok()
            .map(|i| self.attachment_status[i].access)
    }

    /// Append a subpass sub-node, folding its accesses into this vertex's
    /// own union.
    pub fn push_subpass(&mut self, subpass: ResourceAccessNode) {
        for status in subpass.accesses() {
            match self
                .attachment_status
                .iter_mut()
                .find(|s| s.resource == status.resource)
            {
                Some(existing) => existing.access |= status.access,
                None => self.add_access(*status),
            }
        }
        self.subpasses.push(subpass);
    }

    /// True iff this vertex chains one or more subpasses (i.e. it is the
    /// head of a multi-subpass raster pass).
    pub fn is_multi_subpass(&self) -> bool {
        !self.subpasses.is_empty()
    }

    /// The subpass sub-nodes, in declaration order. Empty for any pass that
    /// isn't a multi-subpass raster pass.
    pub fn subpasses(&self) -> &[ResourceAccessNode] {
        &self.subpasses
    }

    /// Resources touched by both `self` and `other`, in ascending id order.
    /// Used by the barrier builder to find the hazard set on an edge.
    pub fn intersect<'a>(&'a self, other: &'a ResourceAccessNode) -> Vec<(AccessStatus, AccessStatus)> {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        let a = &self.attachment_status;
        let b = &other.attachment_status;
        while i < a.len() && j < b.len() {
            match a[i].resource.0.cmp(&b[j].resource.0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push((a[i], b[j]));
                    i += 1;
                    j += 1;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::ResourceRange;

    fn status(id: usize, access: AccessFlags) -> AccessStatus {
        AccessStatus {
            resource: ResourceId(id),
            range: ResourceRange::default(),
            access,
        }
    }

    #[test]
    fn accesses_stay_sorted() {
        let mut node = ResourceAccessNode::new();
        node.add_access(status(2, AccessFlags::COLOR_ATTACHMENT_WRITE));
        node.add_access(status(0, AccessFlags::TRANSFER_READ));
        node.add_access(status(1, AccessFlags::SHADER_READ));
        let ids: Vec<_> = node.accesses().iter().map(|s| s.resource.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn intersection_finds_shared_resources_only() {
        let mut a = ResourceAccessNode::new();
        a.add_access(status(0, AccessFlags::COLOR_ATTACHMENT_WRITE));
        a.add_access(status(1, AccessFlags::TRANSFER_WRITE));

        let mut b = ResourceAccessNode::new();
        b.add_access(status(1, AccessFlags::TRANSFER_READ));
        b.add_access(status(2, AccessFlags::SHADER_READ));

        let shared = a.intersect(&b);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].0.resource, ResourceId(1));
    }

    #[test]
    fn subpass_chain_unions_into_head() {
        let mut head = ResourceAccessNode::new();
        head.add_access(status(0, AccessFlags::COLOR_ATTACHMENT_WRITE));

        let mut sub = ResourceAccessNode::new();
        sub.add_access(status(0, AccessFlags::INPUT_ATTACHMENT_READ));
        sub.add_access(status(1, AccessFlags::DEPTH_STENCIL_WRITE));

        head.push_subpass(sub);

        assert!(head.is_multi_subpass());
        assert_eq!(head.subpasses().len(), 1);
        let unioned = head.access_for(ResourceId(0)).unwrap();
        assert!(unioned.contains(AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert!(unioned.contains(AccessFlags::INPUT_ATTACHMENT_READ));
    }
}
