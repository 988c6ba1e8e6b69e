// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Debug messenger wiring into the log facade
// - Surface creation from the window handles
// - Physical device selection (scored, surface-aware)
// - Logical device + queue creation

use std::ffi::{CStr, CString};
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use super::support::{
    self, device_extension_names, instance_extension_names, instance_layer_names,
    names_supported, QueueFamilyIndices, SwapchainSupport,
};

/// Layers requested whenever validation is enabled.
pub const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

/// Device extensions every eligible GPU must expose.
pub const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (order matters for drop!)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles (the two roles may alias the same queue)
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_family: u32,

    // Debug utils (if validation enabled)
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Bring up everything from the loader to the logical device.
    ///
    /// # Arguments
    /// * `window` - window to create the presentation surface for
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Vulkan validation layers
    pub fn new<W>(window: &W, app_name: &str, enable_validation: bool) -> Result<Arc<Self>>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Verify validation layers before any instance work, so a
        // missing layer aborts bring-up without touching the device.
        if enable_validation {
            let available = instance_layer_names(&entry)?;
            if !names_supported(&available, &VALIDATION_LAYERS) {
                anyhow::bail!("validation layers requested, but not available");
            }
            log::info!("Validation layers available");
        }

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        // Step 3: Create instance
        let instance =
            Self::create_instance(&entry, app_name, display_handle, enable_validation)?;

        // Step 4: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 5: Create the presentation surface
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        }
        .context("Failed to create window surface")?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        log::info!("Window surface created");

        // Step 6: Pick physical device (GPU)
        let (physical_device, indices) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        // Step 7: Create logical device
        let (device, graphics_queue, present_queue, graphics_family, present_family) =
            Self::create_logical_device(&instance, physical_device, indices, enable_validation)?;

        // Step 8: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            surface_loader,
            instance,
            _entry: entry,
            graphics_queue,
            present_queue,
            graphics_family,
            present_family,
            debug_utils,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display_handle: raw_window_handle::RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Platform surface extensions come from the windowing library
        let mut extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("Failed to query required surface extensions")?
            .to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers: Vec<*const std::ffi::c_char> = if enable_validation {
            VALIDATION_LAYERS.iter().map(|l| l.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        // Chain a messenger create info so instance creation and destruction
        // themselves show up in validation output.
        let mut debug_info = debug_messenger_info();
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;
        log::info!("Vulkan instance created");

        if let Ok(names) = instance_extension_names(entry) {
            log::debug!(
                "Available instance extensions: {}",
                names
                    .iter()
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = debug_messenger_info();
        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;
        log::info!("Debug messenger created");

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best: Option<(vk::PhysicalDevice, QueueFamilyIndices)> = None;
        let mut best_score = 0;

        for (i, &device) in devices.iter().enumerate() {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let features = unsafe { instance.get_physical_device_features(device) };

            log::info!(
                "GPU{}: {}",
                i,
                unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy()
            );

            // Eligibility: both queue roles, required extensions, and a
            // usable swapchain for this surface.
            let indices = support::find_queue_families(instance, surface_loader, device, surface)?;
            if !indices.is_complete() {
                continue;
            }

            let available = device_extension_names(instance, device)?;
            if !names_supported(&available, &DEVICE_EXTENSIONS) {
                continue;
            }

            if !SwapchainSupport::query(surface_loader, device, surface)?.is_adequate() {
                continue;
            }

            // Strict `>`: the first eligible device wins ties, including
            // the all-zero-score case.
            let score = score_device(&props, &features);
            if best.is_none() || score > best_score {
                best_score = score;
                best = Some((device, indices));
            }
        }

        best.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        indices: QueueFamilyIndices,
        enable_validation: bool,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue, u32, u32)> {
        let (graphics_family, present_family) = match (indices.graphics, indices.present) {
            (Some(g), Some(p)) => (g, p),
            _ => anyhow::bail!("Queue families incomplete for the selected device"),
        };

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = indices
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();

        // Device-level layers are ignored by current drivers but are still
        // listed for older implementations.
        let layers: Vec<*const std::ffi::c_char> = if enable_validation {
            VALIDATION_LAYERS.iter().map(|l| l.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;
        log::info!("Logical device created");

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok((
            device,
            graphics_queue,
            present_queue,
            graphics_family,
            present_family,
        ))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Rank a physical device.
///
/// Devices without geometry-shader support score 0 (they stay eligible and
/// may still be selected if nothing scores higher). Otherwise a discrete
/// GPU is worth 1000 plus the largest supported 2D image dimension.
fn score_device(
    properties: &vk::PhysicalDeviceProperties,
    features: &vk::PhysicalDeviceFeatures,
) -> u32 {
    if features.geometry_shader != vk::TRUE {
        return 0;
    }

    let mut score = 0;
    if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score + properties.limits.max_image_dimension2_d
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(device_type: vk::PhysicalDeviceType, max_dim: u32) -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            device_type,
            limits: vk::PhysicalDeviceLimits {
                max_image_dimension2_d: max_dim,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn features(geometry_shader: bool) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures {
            geometry_shader: if geometry_shader { vk::TRUE } else { vk::FALSE },
            ..Default::default()
        }
    }

    #[test]
    fn discrete_gpu_with_geometry_shader_outranks_integrated() {
        let discrete = score_device(
            &props(vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
            &features(true),
        );
        let integrated = score_device(
            &props(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384),
            &features(true),
        );
        assert_eq!(discrete, 1000 + 16384);
        assert_eq!(integrated, 16384);
        assert!(discrete > integrated);
    }

    #[test]
    fn no_geometry_shader_scores_zero() {
        let score = score_device(
            &props(vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
            &features(false),
        );
        assert_eq!(score, 0);
    }
}
