use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Queue family indices resolved for one candidate device. Either field
/// stays `None` when no family on the device offers that capability; the
/// same index may satisfy both.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scans the family list once per capability: the first family flagged
    /// for graphics, and independently the first family that can present to
    /// the bound surface.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        present_support: &[bool],
    ) -> Self {
        let graphics = families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);
        let present = present_support
            .iter()
            .position(|supported| *supported)
            .map(|i| i as u32);

        Self { graphics, present }
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

/// Snapshot of everything the selector needs to know about one candidate
/// device against the bound surface. Queried fresh per candidate and
/// discarded after the verdict.
pub struct DeviceCapabilities {
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub present_support: Vec<bool>,
    pub extensions: Vec<CString>,
    pub surface_capabilities: vk::SurfaceCapabilitiesKHR,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl DeviceCapabilities {
    /// Read-only capability probe. A failed query shows up as an empty list,
    /// which the suitability predicate reads as "unsupported".
    pub fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Self {
        let queue_families = unsafe {
            instance.get_physical_device_queue_family_properties(physical_device)
        };

        let present_support = (0..queue_families.len() as u32)
            .map(|index| unsafe {
                surface_loader
                    .get_physical_device_surface_support(physical_device, index, surface)
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();

        let extension_props = unsafe {
            instance
                .enumerate_device_extension_properties(physical_device)
                .unwrap_or_default()
        };
        let extensions = extension_props
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect::<Vec<_>>();

        let surface_capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .unwrap_or_default()
        };
        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .unwrap_or_default()
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .unwrap_or_default()
        };

        Self {
            queue_families,
            present_support,
            extensions,
            surface_capabilities,
            surface_formats,
            present_modes,
        }
    }

    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        QueueFamilyIndices::find(&self.queue_families, &self.present_support)
    }

    /// Exact name equality only; a required extension missing from the
    /// device's list excludes the candidate without raising.
    pub fn supports_extensions(&self, required: &[&CStr]) -> bool {
        required.iter().all(|req| {
            self.extensions
                .iter()
                .any(|available| available.as_c_str() == *req)
        })
    }

    pub fn is_suitable(&self, required_extensions: &[&CStr]) -> bool {
        self.queue_family_indices().is_complete()
            && self.supports_extensions(required_extensions)
            && !self.surface_formats.is_empty()
            && !self.present_modes.is_empty()
    }
}

/// The selected physical device and the logical device built on it
pub struct RenderDevice {
    pub physical: vk::PhysicalDevice,
    pub logical: Arc<ash::Device>,

    pub graphics_queue_family: u32,
    pub present_queue_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl RenderDevice {
    pub fn new(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self> {
        let (physical_device, indices) = Self::select_physical_device(
            instance,
            surface,
            surface_loader,
        )?;

        let (graphics_queue_family, present_queue_family) = (
            indices.graphics.ok_or_else(|| eyre!("Selected device has no graphics queue family"))?,
            indices.present.ok_or_else(|| eyre!("Selected device has no present queue family"))?,
        );

        let (logical_device, graphics_queue, present_queue) = Self::create_logical_device(
            instance,
            physical_device,
            graphics_queue_family,
            present_queue_family,
        )?;

        Ok(Self {
            physical: physical_device,
            logical: Arc::new(logical_device),
            graphics_queue_family,
            present_queue_family,
            graphics_queue,
            present_queue,
        })
    }

    /// First device in enumeration order that satisfies every suitability
    /// predicate wins; there is no scoring among suitable devices.
    fn select_physical_device(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let physical_devices = unsafe {
            instance.enumerate_physical_devices()?
        };
        if physical_devices.is_empty() {
            return Err(eyre!("Failed to detect physical devices"));
        }

        let required_extensions = Self::get_required_device_extensions();
        physical_devices
            .into_iter()
            .find_map(|physical_device| {
                let capabilities = DeviceCapabilities::query(
                    instance,
                    physical_device,
                    surface,
                    surface_loader,
                );
                if capabilities.is_suitable(&required_extensions) {
                    let properties = unsafe {
                        instance.get_physical_device_properties(physical_device)
                    };
                    log::info!(
                        "Selected physical device: {:?}",
                        properties.device_name_as_c_str().unwrap_or(c"<unknown>"),
                    );
                    Some((physical_device, capabilities.queue_family_indices()))
                } else {
                    None
                }
            })
            .ok_or_else(|| eyre!("Failed to find a suitable rendering device"))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        present_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        // One create entry per distinct family index; graphics == present
        // collapses to a single entry
        let queue_create_infos = unique_queue_families(graphics_queue_family, present_queue_family)
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        };

        let graphics_queue = unsafe {
            device.get_device_queue(graphics_queue_family, 0)
        };
        let present_queue = unsafe {
            device.get_device_queue(present_queue_family, 0)
        };

        Ok((device, graphics_queue, present_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

pub fn unique_queue_families(graphics: u32, present: u32) -> Vec<u32> {
    if graphics == present {
        vec![graphics]
    } else {
        vec![graphics, present]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn capabilities(
        families: Vec<vk::QueueFamilyProperties>,
        present_support: Vec<bool>,
        extensions: &[&str],
        format_count: usize,
        present_mode_count: usize,
    ) -> DeviceCapabilities {
        DeviceCapabilities {
            queue_families: families,
            present_support,
            extensions: extensions
                .iter()
                .map(|name| CString::new(*name).unwrap())
                .collect(),
            surface_capabilities: vk::SurfaceCapabilitiesKHR::default(),
            surface_formats: vec![vk::SurfaceFormatKHR::default(); format_count],
            present_modes: vec![vk::PresentModeKHR::FIFO; present_mode_count],
        }
    }

    #[test]
    fn resolver_finds_both_indices_on_one_family() {
        let families = vec![family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, &[true]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert!(indices.is_complete());
    }

    #[test]
    fn resolver_finds_split_indices() {
        let families = vec![
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::find(&families, &[false, true]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn resolver_takes_first_qualifying_family() {
        let families = vec![
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = QueueFamilyIndices::find(&families, &[false, true, true]);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn resolver_leaves_missing_capabilities_unset() {
        let families = vec![family(vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, &[false]);
        assert_eq!(indices.graphics, None);
        assert_eq!(indices.present, None);
        assert!(!indices.is_complete());

        let families = vec![family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, &[false]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(!indices.is_complete());
    }

    #[test]
    fn extension_check_is_a_subset_test() {
        let caps = capabilities(
            vec![family(vk::QueueFlags::GRAPHICS)],
            vec![true],
            &["VK_KHR_swapchain", "VK_KHR_maintenance1"],
            1,
            1,
        );

        assert!(caps.supports_extensions(&[c"VK_KHR_swapchain"]));
        assert!(caps.supports_extensions(&[c"VK_KHR_swapchain", c"VK_KHR_maintenance1"]));
        assert!(caps.supports_extensions(&[]));
        assert!(!caps.supports_extensions(&[c"VK_KHR_swapchain", c"VK_EXT_mesh_shader"]));
        // Exact equality only, no prefix matching
        assert!(!caps.supports_extensions(&[c"VK_KHR_swap"]));
    }

    #[test]
    fn selector_accepts_first_suitable_device_only() {
        // Device A: one family doing both graphics and present, both
        // required extensions, a format and a present mode available
        let device_a = capabilities(
            vec![family(vk::QueueFlags::GRAPHICS)],
            vec![true],
            &["VK_KHR_swapchain", "VK_KHR_maintenance1"],
            1,
            1,
        );
        // Device B: no present-capable family
        let device_b = capabilities(
            vec![family(vk::QueueFlags::GRAPHICS)],
            vec![false],
            &["VK_KHR_swapchain", "VK_KHR_maintenance1"],
            1,
            1,
        );

        let required = [c"VK_KHR_swapchain", c"VK_KHR_maintenance1"];
        assert!(device_a.is_suitable(&required));
        assert!(!device_b.is_suitable(&required));

        let candidates = [device_b, device_a];
        let winner = candidates.iter().position(|c| c.is_suitable(&required));
        assert_eq!(winner, Some(1));

        let indices = candidates[1].queue_family_indices();
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
    }

    #[test]
    fn selector_rejects_empty_format_or_present_mode_lists() {
        let required = [c"VK_KHR_swapchain"];

        let no_formats = capabilities(
            vec![family(vk::QueueFlags::GRAPHICS)],
            vec![true],
            &["VK_KHR_swapchain"],
            0,
            1,
        );
        assert!(!no_formats.is_suitable(&required));

        let no_present_modes = capabilities(
            vec![family(vk::QueueFlags::GRAPHICS)],
            vec![true],
            &["VK_KHR_swapchain"],
            1,
            0,
        );
        assert!(!no_present_modes.is_suitable(&required));
    }

    #[test]
    fn shared_queue_family_collapses_to_one_create_entry() {
        assert_eq!(unique_queue_families(0, 0), vec![0]);
        assert_eq!(unique_queue_families(0, 2), vec![0, 2]);
    }
}
