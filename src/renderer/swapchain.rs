use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use winit::window::Window;

use crate::renderer::device::{unique_queue_families, RenderDevice};
use crate::renderer::instance::RenderInstance;

/// The concrete presentation parameters chosen from the winning device's
/// surface capabilities. Retained for the lifetime of the context: the
/// render pass needs the format, the pipeline and framebuffers the extent.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    pub fn choose(
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        drawable_size: vk::Extent2D,
    ) -> Self {
        Self {
            surface_format: choose_surface_format(formats),
            present_mode: choose_present_mode(present_modes),
            extent: choose_extent(capabilities, drawable_size),
            image_count: choose_image_count(capabilities),
        }
    }
}

/// Prefers the 8-bit BGR format (no alpha channel) with the standard
/// non-linear color space, wherever it sits in the list; otherwise the
/// first supported format. The alpha-less preference is deliberate.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .unwrap_or_default()
}

/// Prefers low-latency triple buffering. The FIFO fallback is returned
/// without checking the list; it is the one mode the spec guarantees.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .find(|mode| **mode == vk::PresentModeKHR::MAILBOX)
        .copied()
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A concrete `current_extent` is used verbatim. Only the `u32::MAX`
/// sentinel falls back to the window's drawable size, bounded per axis.
///
/// The bounding keeps the historical two-step form: the max comparison
/// tests the original size and overwrites the min clamp, so a size below
/// the minimum survives unclamped. Pinned by tests; do not "fix" without
/// revisiting them.
#[allow(unused_assignments)]
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_size: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let vk::Extent2D { width, height } = drawable_size;

    let mut actual_width = if width < capabilities.min_image_extent.width {
        capabilities.min_image_extent.width
    } else {
        width
    };
    actual_width = if width > capabilities.max_image_extent.width {
        capabilities.max_image_extent.width
    } else {
        width
    };

    let mut actual_height = if height < capabilities.min_image_extent.height {
        capabilities.min_image_extent.height
    } else {
        height
    };
    actual_height = if height > capabilities.max_image_extent.height {
        capabilities.max_image_extent.height
    } else {
        height
    };

    vk::Extent2D {
        width: actual_width,
        height: actual_height,
    }
}

/// One more image than the minimum, so acquisition does not have to wait on
/// the driver; capped at the maximum when the surface reports one
/// (`max_image_count == 0` means unbounded).
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    let max_image_count = capabilities.max_image_count;
    if max_image_count > 0 && image_count > max_image_count {
        max_image_count
    } else {
        image_count
    }
}

/// The presentable image chain plus its chosen configuration
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub config: SwapchainConfig,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    pub fn new(
        instance: &RenderInstance,
        device: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        window: &Window,
    ) -> Result<Self> {
        let surface_capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device.physical, surface)?
        };
        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device.physical, surface)?
        };
        let surface_present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device.physical, surface)?
        };

        let window_size = window.inner_size();
        let config = SwapchainConfig::choose(
            &surface_capabilities,
            &surface_formats,
            &surface_present_modes,
            vk::Extent2D {
                width: window_size.width,
                height: window_size.height,
            },
        );
        log::info!(
            "Swapchain configuration: {:?} {:?}, {:?}, {}x{}, {} images",
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            config.image_count,
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(
            &instance.instance,
            &device.logical,
        );
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .image_array_layers(1);

        // Images are shared across the two queue families only when they
        // actually differ; the index array is attached in that case alone
        let queue_family_indices = unique_queue_families(
            device.graphics_queue_family,
            device.present_queue_family,
        );
        let swapchain_info = if queue_family_indices.len() > 1 {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        let (images, image_views) = Self::create_swapchain_images(
            swapchain,
            &swapchain_loader,
            config.surface_format.format,
            device,
        )?;

        Ok(Self {
            swapchain,
            swapchain_loader,
            config,
            images,
            image_views,
        })
    }

    fn create_swapchain_images(
        swapchain: vk::SwapchainKHR,
        swapchain_loader: &ash::khr::swapchain::Device,
        format: vk::Format,
        device: &RenderDevice,
    ) -> Result<(Vec<vk::Image>, Vec<vk::ImageView>)> {
        let images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)?
        };
        let image_views = images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image(*image);
                unsafe {
                    device.logical.create_image_view(&view_info, None)
                }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        Ok((images, image_views))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn preferred() -> vk::SurfaceFormatKHR {
        format(vk::Format::B8G8R8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)
    }

    fn assert_format_eq(actual: vk::SurfaceFormatKHR, expected: vk::SurfaceFormatKHR) {
        assert_eq!(actual.format, expected.format);
        assert_eq!(actual.color_space, expected.color_space);
    }

    fn assert_extent_eq(actual: vk::Extent2D, width: u32, height: u32) {
        assert_eq!(actual.width, width);
        assert_eq!(actual.height, height);
    }

    fn capabilities_with_extents(
        min: (u32, u32),
        max: (u32, u32),
        current: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            ..Default::default()
        }
    }

    #[test]
    fn format_selection_prefers_bgr_nonlinear_anywhere_in_list() {
        let others = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let first = [preferred(), others[0], others[1]];
        let middle = [others[0], preferred(), others[1]];
        let last = [others[0], others[1], preferred()];
        assert_format_eq(choose_surface_format(&first), preferred());
        assert_format_eq(choose_surface_format(&middle), preferred());
        assert_format_eq(choose_surface_format(&last), preferred());
    }

    #[test]
    fn format_selection_requires_both_format_and_color_space() {
        // Right format, wrong color space: not the preferred entry
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_format_eq(choose_surface_format(&formats), formats[0]);
    }

    #[test]
    fn format_selection_falls_back_to_first_entry() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_format_eq(choose_surface_format(&formats), formats[0]);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo_unconditionally() {
        // FIFO is returned even when the list does not contain it; the
        // fallback is not validated against the list
        let modes = [vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn concrete_current_extent_is_used_verbatim() {
        let caps = capabilities_with_extents((1, 1), (1920, 1080), (1024, 768));
        let window = vk::Extent2D { width: 333, height: 444 };
        assert_extent_eq(choose_extent(&caps, window), 1024, 768);
    }

    #[test]
    fn sentinel_extent_within_bounds_uses_window_size() {
        let caps = capabilities_with_extents((100, 100), (2000, 2000), (u32::MAX, u32::MAX));
        let window = vk::Extent2D { width: 800, height: 600 };
        let extent = choose_extent(&caps, window);
        assert_extent_eq(extent, 800, 600);
        assert!(extent.width >= 100 && extent.width <= 2000);
        assert!(extent.height >= 100 && extent.height <= 2000);
    }

    #[test]
    fn sentinel_extent_clamps_oversized_axes_independently() {
        let caps = capabilities_with_extents((100, 100), (2000, 1000), (u32::MAX, u32::MAX));

        let wide = choose_extent(&caps, vk::Extent2D { width: 4000, height: 600 });
        assert_extent_eq(wide, 2000, 600);

        let tall = choose_extent(&caps, vk::Extent2D { width: 800, height: 5000 });
        assert_extent_eq(tall, 800, 1000);
    }

    #[test]
    fn sentinel_extent_below_minimum_documents_last_write_wins() {
        // Current behavior, not a target invariant: the max comparison runs
        // against the original size and overwrites the min clamp, so an
        // undersized window survives below the minimum bound.
        let caps = capabilities_with_extents((100, 100), (2000, 2000), (u32::MAX, u32::MAX));

        let narrow = choose_extent(&caps, vk::Extent2D { width: 50, height: 600 });
        assert_extent_eq(narrow, 50, 600);

        let short = choose_extent(&caps, vk::Extent2D { width: 800, height: 20 });
        assert_extent_eq(short, 800, 20);
    }

    #[test]
    fn image_count_is_min_plus_one_when_unbounded() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_is_capped_at_maximum() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn config_combines_all_policies() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            ..Default::default()
        };
        let formats = [preferred()];
        let modes = [vk::PresentModeKHR::FIFO];

        let config = SwapchainConfig::choose(
            &caps,
            &formats,
            &modes,
            vk::Extent2D { width: 800, height: 600 },
        );
        assert_format_eq(config.surface_format, preferred());
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_extent_eq(config.extent, 800, 600);
        assert_eq!(config.image_count, 3);
    }
}
