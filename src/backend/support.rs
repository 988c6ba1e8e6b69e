// Capability probes over a physical device and surface
//
// The selection rules are pure functions over enumerated data so they can
// be exercised without a GPU: queue family discovery, layer/extension
// coverage, surface format, present mode and swap extent.

use std::ffi::{CStr, CString};

use anyhow::Result;
use ash::vk;

/// Queue family roles needed for rendering and presentation.
///
/// The two roles may land on the same family; `unique` collapses them
/// for logical device creation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan for the first graphics-capable family and the first family
    /// that can present to the surface. Two independent scans.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let graphics = families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);
        let present = (0..families.len() as u32).find(|&i| supports_present(i));

        Self { graphics, present }
    }

    /// Both roles must be filled before a logical device can be created.
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Deduplicated family indices, one `DeviceQueueCreateInfo` each.
    pub fn unique(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .graphics
            .iter()
            .chain(self.present.iter())
            .copied()
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Query the queue families of a physical device against the surface.
pub fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilyIndices> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut present = vec![false; families.len()];
    for (i, slot) in present.iter_mut().enumerate() {
        *slot = unsafe {
            surface_loader.get_physical_device_surface_support(physical_device, i as u32, surface)?
        };
    }

    Ok(QueueFamilyIndices::find(&families, |i| present[i as usize]))
}

/// Swapchain-related capabilities of a device/surface pair.
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    /// A device is usable only if it reports at least one format and one
    /// present mode for this surface.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// True when every requested name appears in the available set.
/// Exact string match, order independent.
pub fn names_supported(available: &[CString], required: &[&CStr]) -> bool {
    required
        .iter()
        .all(|req| available.iter().any(|avail| avail.as_c_str() == *req))
}

/// Names of all instance layers the loader knows about.
pub fn instance_layer_names(entry: &ash::Entry) -> Result<Vec<CString>> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }.to_owned())
        .collect())
}

/// Names of all extensions the instance supports.
pub fn instance_extension_names(entry: &ash::Entry) -> Result<Vec<CString>> {
    let extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };
    Ok(extensions
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
        .collect())
}

/// Names of all extensions a physical device supports.
pub fn device_extension_names(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<Vec<CString>> {
    let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device)? };
    Ok(extensions
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
        .collect())
}

/// Prefer the 8-bit SRGB format with a non-linear SRGB color space,
/// else settle for whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Prefer mailbox, fall back to FIFO which every device must support.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&m| m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface dictates the extent unless it reports the undefined
/// sentinel, in which case the framebuffer size is clamped into the
/// supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
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

    #[test]
    fn combined_family_serves_both_roles() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert!(indices.is_complete());
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn disjoint_families_yield_distinct_indices() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| i == 1);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn missing_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| false);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(!indices.is_complete());
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn first_matching_family_wins_each_scan() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(0));
    }

    #[test]
    fn names_supported_is_order_independent() {
        let available = vec![
            CString::new("VK_KHR_surface").unwrap(),
            CString::new("VK_KHR_swapchain").unwrap(),
            CString::new("VK_EXT_debug_utils").unwrap(),
        ];
        assert!(names_supported(
            &available,
            &[c"VK_KHR_swapchain", c"VK_KHR_surface"]
        ));
        assert!(names_supported(&available, &[]));
        assert!(!names_supported(&available, &[c"VK_KHR_deferred_host_operations"]));
        assert!(!names_supported(&[], &[c"VK_KHR_swapchain"]));
    }

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn srgb_pair_wins_regardless_of_position() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);

        // Same set reordered: same choice.
        let reordered = [formats[1], formats[0]];
        assert_eq!(choose_surface_format(&reordered), Some(chosen));
    }

    #[test]
    fn format_falls_back_to_first_entry() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_preferred_else_fifo() {
        let with_mailbox = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&with_mailbox),
            vk::PresentModeKHR::MAILBOX
        );

        let without = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&without), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_follows_surface_when_defined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 1024, 768);
        assert_eq!(
            extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn sentinel_extent_clamps_framebuffer_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 200,
                height: 200,
            },
            max_image_extent: vk::Extent2D {
                width: 1600,
                height: 900,
            },
            ..Default::default()
        };

        // In range: the framebuffer size is used as-is.
        assert_eq!(
            choose_extent(&capabilities, 800, 600),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        // Out of range: clamped per component.
        assert_eq!(
            choose_extent(&capabilities, 4000, 100),
            vk::Extent2D {
                width: 1600,
                height: 200
            }
        );
    }
}
