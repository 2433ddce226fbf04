use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

/// One framebuffer per swapchain image view, index-aligned with the view
/// list. A single failure destroys whatever was already built and aborts
/// the whole batch; a partial set is never returned.
pub fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for view in image_views {
        let attachments = [*view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device.create_framebuffer(&framebuffer_info, None)
        };
        match framebuffer {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(result) => {
                for framebuffer in framebuffers {
                    unsafe {
                        device.destroy_framebuffer(framebuffer, None);
                    }
                }
                return Err(result).wrap_err("Failed to create framebuffers");
            }
        }
    }

    Ok(framebuffers)
}
