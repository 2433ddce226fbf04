mod device;
mod framebuffer;
mod instance;
mod pipeline;
mod shader;
mod swapchain;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use std::sync::Arc;
use ash::vk;
use winit::window::Window;

use device::RenderDevice;
use framebuffer::create_framebuffers;
use instance::RenderInstance;
use pipeline::{create_render_pass, GraphicsPipeline};
use swapchain::Swapchain;

/// Owns every Vulkan object of the rendering context, built once by a
/// strictly linear sequence: instance and surface, device selection,
/// logical device and queues, swapchain and image views, render pass,
/// pipeline, framebuffers. Each stage's output feeds the next; there is no
/// retry or re-selection.
///
/// Teardown happens in `Drop`, in exact reverse creation order.
pub struct Renderer {
    // Keeps the surface's backing window alive for as long as the context
    _window: Arc<Window>,

    instance: RenderInstance,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    device: RenderDevice,
    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    pipeline: GraphicsPipeline,
    framebuffers: Vec<vk::Framebuffer>,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let instance = RenderInstance::new(&window)
            .wrap_err("Failed to create Vulkan instance")?;

        let (surface, surface_loader) = instance.create_surface(&window)
            .wrap_err("Failed to create window surface")?;

        let device = RenderDevice::new(&instance.instance, surface, &surface_loader)
            .wrap_err("Failed to create rendering device")?;
        log::debug!(
            "Graphics queue {:?} (family {}), present queue {:?} (family {})",
            device.graphics_queue,
            device.graphics_queue_family,
            device.present_queue,
            device.present_queue_family,
        );

        let swapchain = Swapchain::new(&instance, &device, surface, &surface_loader, &window)
            .wrap_err("Failed to create swap chain")?;

        let render_pass = create_render_pass(
            &device.logical,
            swapchain.config.surface_format.format,
        )
            .wrap_err("Failed to create render pass")?;

        let pipeline = GraphicsPipeline::new(
            device.logical.clone(),
            render_pass,
            swapchain.config.extent,
        )
            .wrap_err("Failed to create graphics pipeline")?;

        let framebuffers = create_framebuffers(
            &device.logical,
            render_pass,
            &swapchain.image_views,
            swapchain.config.extent,
        )
            .wrap_err("Failed to create framebuffers")?;

        log::info!(
            "Rendering context initialized with {} swapchain images",
            swapchain.images.len(),
        );

        Ok(Self {
            _window: window,
            instance,
            surface,
            surface_loader,
            device,
            swapchain,
            render_pass,
            pipeline,
            framebuffers,
        })
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Reverse creation order: first created is last destroyed
        unsafe {
            let device = &self.device.logical;
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_pipeline(self.pipeline.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline.layout, None);
            device.destroy_render_pass(self.render_pass, None);
            for image_view in self.swapchain.image_views.drain(..) {
                device.destroy_image_view(image_view, None);
            }
            self.swapchain.swapchain_loader
                .destroy_swapchain(self.swapchain.swapchain, None);
            device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy();
        }
    }
}
