//! Device-pass assembler (component C7): flattens the subpasses chained onto
//! one physical raster pass into a single attachment list, remaps subpass
//! attachment indices accordingly, and computes the render area.

use access_graph::access::AccessFlags;
use access_graph::node::ResourceAccessNode;
use access_graph::resource::{Extent, ResourceGraph};
use access_graph::ResourceId;

use crate::device::{ClearValues, CommandBuffer, FboHandle, RenderArea, ResolvedBarrier, Rect, Viewport};

/// One flattened attachment slot shared by every subpass that touches it.
#[derive(Clone, Debug)]
pub struct AttachmentSlot {
    pub resource: ResourceId,
    pub is_color: bool,
    pub is_depth_stencil: bool,
    /// Bit index within the 32-bit color-slot mask. Meaningless for
    /// depth-stencil attachments, which are always claimed directly.
    pub slot: u32,
    /// True if some subpass reads this attachment after an earlier subpass
    /// wrote it — forces `general`/`inout` layout.
    pub general_layout: bool,
    ever_written: bool,
}

/// One subpass's attachment references, indexed into
/// [`DevicePass::attachments`] after remapping.
#[derive(Clone, Debug, Default)]
pub struct SubpassDesc {
    pub color_attachments: Vec<usize>,
    pub depth_stencil: Option<usize>,
    pub input_attachments: Vec<usize>,
}

/// A fully assembled physical render pass, ready for a [`CommandBuffer`] to
/// execute.
#[derive(Clone, Debug)]
pub struct DevicePass {
    pub attachments: Vec<AttachmentSlot>,
    pub subpasses: Vec<SubpassDesc>,
    pub render_area: RenderArea,
}

/// Assembles a [`DevicePass`] from the logical subpass chain of one RAG
/// vertex (its head node plus any `push_subpass` chain).
pub struct DevicePassAssembler<'a> {
    rg: &'a ResourceGraph,
}

impl<'a> DevicePassAssembler<'a> {
    pub fn new(rg: &'a ResourceGraph) -> Self {
        DevicePassAssembler { rg }
    }

    /// `full_extent` is the default render-target extent, used when no
    /// subpass supplies an explicit viewport; `explicit_viewports` is the
    /// set of viewports subpasses declared directly, if any.
    pub fn assemble(&self, head: &ResourceAccessNode, full_extent: Extent, explicit_viewports: &[RenderArea]) -> DevicePass {
        let nodes: Vec<&ResourceAccessNode> = if head.is_multi_subpass() {
            head.subpasses().iter().collect()
        } else {
            vec![head]
        };

        let mut attachments: Vec<AttachmentSlot> = Vec::new();
        let mut color_mask: u32 = 0;
        let mut subpasses = Vec::with_capacity(nodes.len());

        for node in &nodes {
            let mut desc = SubpassDesc::default();

            for status in node.accesses() {
                let resource = status.resource;
                let access = status.access;

                if access.contains(AccessFlags::INPUT_ATTACHMENT_READ) {
                    if let Some(idx) = attachments.iter().position(|a| a.resource == resource) {
                        desc.input_attachments.push(idx);
                        if attachments[idx].ever_written {
                            attachments[idx].general_layout = true;
                        }
                        continue;
                    }
                }

                if access.intersects(AccessFlags::DEPTH_STENCIL_READ | AccessFlags::DEPTH_STENCIL_WRITE) {
                    let idx = self.find_or_append(&mut attachments, &mut color_mask, resource, false);
                    if desc.depth_stencil.is_none() {
                        desc.depth_stencil = Some(idx);
                    }
                    if access.contains(AccessFlags::DEPTH_STENCIL_READ) && attachments[idx].ever_written {
                        attachments[idx].general_layout = true;
                    }
                    if access.contains(AccessFlags::DEPTH_STENCIL_WRITE) {
                        attachments[idx].ever_written = true;
                    }
                    continue;
                }

                if access.intersects(AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE) {
                    let idx = self.find_or_append(&mut attachments, &mut color_mask, resource, true);
                    desc.color_attachments.push(idx);
                    if access.contains(AccessFlags::COLOR_ATTACHMENT_READ) && attachments[idx].ever_written {
                        attachments[idx].general_layout = true;
                    }
                    if access.contains(AccessFlags::COLOR_ATTACHMENT_WRITE) {
                        attachments[idx].ever_written = true;
                    }
                }
            }

            subpasses.push(desc);
        }

        let (attachments, remap) = stable_sort_depth_stencil_last(attachments);
        for desc in &mut subpasses {
            desc.color_attachments = desc.color_attachments.iter().map(|&i| remap[i]).collect();
            desc.input_attachments = desc.input_attachments.iter().map(|&i| remap[i]).collect();
            desc.depth_stencil = desc.depth_stencil.map(|i| remap[i]);
        }

        let render_area = compute_render_area(&attachments, self.rg, full_extent, explicit_viewports);

        DevicePass {
            attachments,
            subpasses,
            render_area,
        }
    }

    fn find_or_append(
        &self,
        attachments: &mut Vec<AttachmentSlot>,
        color_mask: &mut u32,
        resource: ResourceId,
        is_color: bool,
    ) -> usize {
        if let Some(idx) = attachments.iter().position(|a| a.resource == resource) {
            return idx;
        }
        let slot = if is_color {
            let bit = (!*color_mask).trailing_zeros();
            *color_mask |= 1 << bit;
            bit
        } else {
            0
        };
        attachments.push(AttachmentSlot {
            resource,
            is_color,
            is_depth_stencil: !is_color,
            slot,
            general_layout: false,
            ever_written: false,
        });
        attachments.len() - 1
    }
}

/// Stable-sort so depth-stencil is last, returning the sorted attachments
/// and an old-index -> new-index permutation.
fn stable_sort_depth_stencil_last(attachments: Vec<AttachmentSlot>) -> (Vec<AttachmentSlot>, Vec<usize>) {
    let mut indexed: Vec<(usize, AttachmentSlot)> = attachments.into_iter().enumerate().collect();
    indexed.sort_by_key(|(_, a)| if a.is_depth_stencil { 1 } else { 0 });

    let mut remap = vec![0usize; indexed.len()];
    for (new_idx, (old_idx, _)) in indexed.iter().enumerate() {
        remap[*old_idx] = new_idx;
    }
    let sorted = indexed.into_iter().map(|(_, a)| a).collect();
    (sorted, remap)
}

fn compute_render_area(
    attachments: &[AttachmentSlot],
    rg: &ResourceGraph,
    full_extent: Extent,
    explicit_viewports: &[RenderArea],
) -> RenderArea {
    if !explicit_viewports.is_empty() {
        let x0 = explicit_viewports.iter().map(|v| v.x).min().unwrap();
        let y0 = explicit_viewports.iter().map(|v| v.y).min().unwrap();
        let x1 = explicit_viewports.iter().map(|v| v.x + v.width as i32).max().unwrap();
        let y1 = explicit_viewports.iter().map(|v| v.y + v.height as i32).max().unwrap();
        return RenderArea {
            x: x0,
            y: y0,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        };
    }

    let mut width = full_extent.width;
    let mut height = full_extent.height;
    for attachment in attachments {
        let extent = rg.get(attachment.resource).extent();
        width = width.min(extent.width);
        height = height.min(extent.height);
    }
    RenderArea { x: 0, y: 0, width, height }
}

fn viewport_for(area: RenderArea) -> Viewport {
    Viewport {
        x: area.x as f32,
        y: area.y as f32,
        width: area.width as f32,
        height: area.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn scissor_for(area: RenderArea) -> Rect {
    Rect {
        x: area.x,
        y: area.y,
        width: area.width,
        height: area.height,
    }
}

/// Record `pass`'s command sequence: front barriers, begin render pass, one
/// `draw` callback per subpass with viewport/scissor set only when it
/// changes, next-subpass between each, end render pass, rear barriers.
pub fn execute<C: CommandBuffer>(
    cmd: &mut C,
    pass: &DevicePass,
    fbo: FboHandle,
    clear: &ClearValues,
    front_barriers: &[ResolvedBarrier],
    rear_barriers: &[ResolvedBarrier],
    mut draw: impl FnMut(&mut C, usize),
) {
    cmd.pipeline_barrier(front_barriers);
    cmd.begin_render_pass(pass, fbo, pass.render_area, clear);

    let viewport = viewport_for(pass.render_area);
    let scissor = scissor_for(pass.render_area);
    let mut viewport_set = false;

    for (i, _) in pass.subpasses.iter().enumerate() {
        if i > 0 {
            cmd.next_subpass();
        }
        if !viewport_set {
            cmd.set_viewport(viewport);
            cmd.set_scissor(scissor);
            viewport_set = true;
        }
        draw(cmd, i);
    }

    cmd.end_render_pass();
    cmd.pipeline_barrier(rear_barriers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use access_graph::node::AccessStatus;
    use access_graph::range::ResourceRange;
    use access_graph::resource::{Dimension, Format, Residency, UsageFlags};

    fn status(resource: ResourceId, access: AccessFlags) -> AccessStatus {
        AccessStatus {
            resource,
            range: ResourceRange::default(),
            access,
        }
    }

    fn make_rg() -> (ResourceGraph, ResourceId, ResourceId, ResourceId) {
        let mut rg = ResourceGraph::new();
        let color = rg.declare(access_graph::resource::Resource::new(
            "color",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent { width: 1920, height: 1080, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT,
            Residency::Managed,
        ));
        let depth = rg.declare(access_graph::resource::Resource::new(
            "depth",
            Dimension::Tex2D,
            Format::R32,
            Extent { width: 1920, height: 1080, ..Default::default() },
            UsageFlags::DEPTH_STENCIL_ATTACHMENT,
            Residency::Managed,
        ));
        let input = rg.declare(access_graph::resource::Resource::new(
            "gbuffer",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent { width: 1920, height: 1080, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT | UsageFlags::INPUT_ATTACHMENT,
            Residency::Managed,
        ));
        (rg, color, depth, input)
    }

    #[test]
    fn depth_stencil_ends_up_last_after_flattening() {
        let (rg, color, depth, _) = make_rg();

        let mut sub0 = ResourceAccessNode::new();
        sub0.add_access(status(depth, AccessFlags::DEPTH_STENCIL_WRITE));
        sub0.add_access(status(color, AccessFlags::COLOR_ATTACHMENT_WRITE));

        let mut head = ResourceAccessNode::new();
        head.push_subpass(sub0);

        let assembler = DevicePassAssembler::new(&rg);
        let pass = assembler.assemble(&head, Extent { width: 1920, height: 1080, ..Default::default() }, &[]);

        assert!(pass.attachments.last().unwrap().is_depth_stencil);
        assert_eq!(pass.subpasses[0].depth_stencil, Some(pass.attachments.len() - 1));
    }

    #[test]
    fn reread_after_write_marks_general_layout() {
        let (rg, _, _, input) = make_rg();

        let mut sub0 = ResourceAccessNode::new();
        sub0.add_access(status(input, AccessFlags::COLOR_ATTACHMENT_WRITE));

        let mut sub1 = ResourceAccessNode::new();
        sub1.add_access(status(input, AccessFlags::INPUT_ATTACHMENT_READ));

        let mut head = ResourceAccessNode::new();
        head.push_subpass(sub0);
        head.push_subpass(sub1);

        let assembler = DevicePassAssembler::new(&rg);
        let pass = assembler.assemble(&head, Extent { width: 1920, height: 1080, ..Default::default() }, &[]);

        let attachment = pass
            .attachments
            .iter()
            .find(|a| a.resource == input)
            .unwrap();
        assert!(attachment.general_layout);
    }

    #[test]
    fn render_area_shrinks_to_smallest_attachment() {
        let mut rg = ResourceGraph::new();
        let big = rg.declare(access_graph::resource::Resource::new(
            "big",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent { width: 1920, height: 1080, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT,
            Residency::Managed,
        ));
        let small = rg.declare(access_graph::resource::Resource::new(
            "small",
            Dimension::Tex2D,
            Format::RGBA8,
            Extent { width: 512, height: 512, ..Default::default() },
            UsageFlags::COLOR_ATTACHMENT,
            Residency::Managed,
        ));

        let mut head = ResourceAccessNode::new();
        head.add_access(status(big, AccessFlags::COLOR_ATTACHMENT_WRITE));
        head.add_access(status(small, AccessFlags::COLOR_ATTACHMENT_WRITE));

        let assembler = DevicePassAssembler::new(&rg);
        let pass = assembler.assemble(&head, Extent { width: 1920, height: 1080, ..Default::default() }, &[]);

        assert_eq!(pass.render_area.width, 512);
        assert_eq!(pass.render_area.height, 512);
    }
}
