//! Sub-region descriptor shared by buffers and textures.

/// A sub-region of a resource.
///
/// The same shape is used for buffers and textures: for a buffer, `width`
/// carries the byte length of the range and `first_slice` carries the byte
/// offset; the mip/plane/array fields are left at their default. This
/// mirrors the source engine's reuse of one range struct for both resource
/// kinds rather than a `Range` enum — callers that only ever see one
/// resource kind don't pay for a tag they never match on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct ResourceRange {
    /// Texture width in texels, or buffer length in bytes.
    pub width: u32,
    /// Texture height in texels. Unused for buffers.
    pub height: u32,
    /// First array slice (textures), or byte offset (buffers).
    pub first_slice: u32,
    /// Number of array slices this range covers.
    pub num_slices: u32,
    /// First mip level this range covers.
    pub mip_level: u32,
    /// Number of mip levels this range covers.
    pub level_count: u32,
    /// Plane index, for planar formats (e.g. a depth/stencil combined image).
    pub plane_slice: u32,
}

impl ResourceRange {
    /// A range covering an entire buffer of `byte_length` bytes.
    pub fn whole_buffer(byte_length: u32) -> Self {
        ResourceRange {
            width: byte_length,
            num_slices: 1,
            level_count: 1,
            ..Default::default()
        }
    }

    /// A range covering an entire texture.
    pub fn whole_texture(width: u32, height: u32, num_slices: u32, level_count: u32) -> Self {
        ResourceRange {
            width,
            height,
            num_slices,
            level_count,
            ..Default::default()
        }
    }

    /// True iff `self` and `other` describe overlapping mip levels and array
    /// slices (and, for buffers, overlapping byte ranges). Two ranges that
    /// don't overlap can never hazard against each other even if they name
    /// the same resource.
    ///
    /// The mip-level containment check compares the mip cursor against
    /// `first_mip + mip_levels` for both sides, rather than comparing the
    /// array-slice cursor against that bound as a naive port would.
    pub fn overlaps(&self, other: &ResourceRange) -> bool {
        let slices_overlap = self.first_slice < other.first_slice + other.num_slices
            && other.first_slice < self.first_slice + self.num_slices;
        let mips_overlap = self.mip_level < other.mip_level + other.level_count
            && other.mip_level < self.mip_level + self.level_count;
        let planes_overlap = self.plane_slice == other.plane_slice;
        slices_overlap && mips_overlap && planes_overlap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_mip_ranges_do_not_overlap() {
        let a = ResourceRange {
            mip_level: 0,
            level_count: 2,
            num_slices: 1,
            ..Default::default()
        };
        let b = ResourceRange {
            mip_level: 2,
            level_count: 2,
            num_slices: 1,
            ..Default::default()
        };
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn overlapping_mip_ranges_overlap() {
        let a = ResourceRange {
            mip_level: 0,
            level_count: 3,
            num_slices: 1,
            ..Default::default()
        };
        let b = ResourceRange {
            mip_level: 2,
            level_count: 2,
            num_slices: 1,
            ..Default::default()
        };
        assert!(a.overlaps(&b));
    }
}
