// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash: device bring-up, capability probes,
// swapchain, pipeline, shaders and frame synchronization.

pub mod device;
pub mod pipeline;
pub mod shader;
pub mod support;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
