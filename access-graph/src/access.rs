//! GPU access-kind bitmask and the read-only predicate the barrier builder
//! and pass reorder engine both depend on.

bitflags! {
    /// Bitmask of GPU access kinds a pass performs on a resource view.
    ///
    /// Bit order matters: [`AccessFlags::is_read_only`] relies on every
    /// "ordinary" read bit sitting at or below [`AccessFlags::PRESENT`], with
    /// [`AccessFlags::SHADING_RATE`] carved out as the one write-adjacent bit
    /// above it that is still read-only. This mirrors the original engine's
    /// `isReadOnlyAccess`, which compares the enum's integer value against
    /// `PRESENT` rather than matching on named variants.
    #[repr(transparent)]
    pub struct AccessFlags: u32 {
        /// Indirect-draw/dispatch argument buffer read.
        const INDIRECT_READ              = 0x0000_0001;
        /// Index buffer read.
        const INDEX_READ                 = 0x0000_0002;
        /// Vertex attribute read.
        const VERTEX_ATTRIBUTE_READ      = 0x0000_0004;
        /// Uniform buffer read.
        const UNIFORM_READ               = 0x0000_0008;
        /// Input-attachment read (subpass read of a prior subpass's output).
        const INPUT_ATTACHMENT_READ      = 0x0000_0010;
        /// Sampled-image / storage read from a shader stage.
        const FRAGMENT_SAMPLED_READ      = 0x0000_0020;
        /// Storage-image / storage-buffer read from a shader stage.
        const SHADER_READ                = 0x0000_0040;
        /// Depth-stencil attachment read (early/late fragment tests).
        const DEPTH_STENCIL_READ         = 0x0000_0080;
        /// Color-attachment read (blend/logic-op source).
        const COLOR_ATTACHMENT_READ      = 0x0000_0100;
        /// Transfer-source read.
        const TRANSFER_READ              = 0x0000_0200;
        /// Host read.
        const HOST_READ                  = 0x0000_0400;

        /// Shader storage write.
        const SHADER_WRITE               = 0x0000_1000;
        /// Color-attachment write.
        const COLOR_ATTACHMENT_WRITE     = 0x0000_2000;
        /// Depth-stencil attachment write.
        const DEPTH_STENCIL_WRITE        = 0x0000_4000;
        /// Transfer-destination write.
        const TRANSFER_WRITE             = 0x0000_8000;
        /// Host write.
        const HOST_WRITE                 = 0x0001_0000;

        /// Swapchain present. The highest "ordinary" bit: every read bit
        /// above sorts below it, every write bit sorts below it too, and
        /// `is_read_only` treats it as a boundary, not a read.
        const PRESENT                    = 0x0002_0000;

        /// Variable-rate-shading attachment read. Sits above `PRESENT` but
        /// is still read-only — the one exception `is_read_only` special-cases.
        const SHADING_RATE               = 0x0004_0000;
    }
}

/// Every bit at or below [`AccessFlags::PRESENT`] that denotes a read.
fn read_mask() -> AccessFlags {
    AccessFlags::INDIRECT_READ
        | AccessFlags::INDEX_READ
        | AccessFlags::VERTEX_ATTRIBUTE_READ
        | AccessFlags::UNIFORM_READ
        | AccessFlags::INPUT_ATTACHMENT_READ
        | AccessFlags::FRAGMENT_SAMPLED_READ
        | AccessFlags::SHADER_READ
        | AccessFlags::DEPTH_STENCIL_READ
        | AccessFlags::COLOR_ATTACHMENT_READ
        | AccessFlags::TRANSFER_READ
        | AccessFlags::HOST_READ
        | AccessFlags::SHADING_RATE
}

/// Every bit strictly above `PRESENT` other than `SHADING_RATE`, plus every
/// write bit: anything set here makes the access not read-only.
fn write_mask() -> AccessFlags {
    AccessFlags::SHADER_WRITE
        | AccessFlags::COLOR_ATTACHMENT_WRITE
        | AccessFlags::DEPTH_STENCIL_WRITE
        | AccessFlags::TRANSFER_WRITE
        | AccessFlags::HOST_WRITE
        | AccessFlags::PRESENT
}

impl AccessFlags {
    /// True iff every set bit denotes a read (or is `SHADING_RATE`, which is
    /// read-only despite sitting above `PRESENT`).
    ///
    /// Matches the original engine's `isReadOnlyAccess`: `flag < PRESENT ||
    /// flag == SHADING_RATE`. Here that's "no write bits are set", expressed
    /// as a mask test rather than an integer comparison, since our bitmask
    /// (unlike the single-variant source enum) can have several bits set at
    /// once — one per view the pass declares on this resource.
    pub fn is_read_only(self) -> bool {
        !self.intersects(write_mask())
    }

    /// True iff any bit denotes a read. Used by the barrier builder to
    /// decide whether a subpass write also needs a self-dependency (the
    /// write feeds back into a read in the same subpass).
    pub fn has_read_access(self) -> bool {
        self.intersects(read_mask())
    }

    /// True iff any bit denotes a write (the complement of read-only, except
    /// the empty set, which is neither).
    pub fn is_write(self) -> bool {
        self.intersects(write_mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_pairs_never_need_a_barrier() {
        let a = AccessFlags::FRAGMENT_SAMPLED_READ | AccessFlags::INPUT_ATTACHMENT_READ;
        let b = AccessFlags::SHADING_RATE;
        assert!(a.is_read_only());
        assert!(b.is_read_only());
    }

    #[test]
    fn present_and_writes_are_not_read_only() {
        assert!(!AccessFlags::PRESENT.is_read_only());
        assert!(!AccessFlags::COLOR_ATTACHMENT_WRITE.is_read_only());
    }

    #[test]
    fn write_that_also_reads_back_has_read_access() {
        let feedback = AccessFlags::COLOR_ATTACHMENT_WRITE | AccessFlags::INPUT_ATTACHMENT_READ;
        assert!(!feedback.is_read_only());
        assert!(feedback.has_read_access());
    }
}
