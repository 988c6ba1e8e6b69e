// Shader module loading and management
//
// Vulkan consumes SPIR-V bytecode. Shaders are read from disk at startup;
// a missing or unreadable file is a fatal bring-up error.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use ash::util::read_spv;
use ash::vk;

use super::VulkanDevice;

/// Read a compiled SPIR-V file into 4-byte words.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open shader file {}", path.display()))?;
    read_spv(&mut file).with_context(|| format!("Invalid SPIR-V in {}", path.display()))
}

/// Load a SPIR-V file and wrap it in a shader module.
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let code = read_spirv(path)?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_spirv(Path::new("data/shaders/does-not-exist.spv")).is_err());
    }

    #[test]
    fn truncated_bytecode_is_rejected() {
        // SPIR-V is a stream of 32-bit words; three bytes cannot be one.
        let path = std::env::temp_dir().join("truncated-shader.spv");
        std::fs::write(&path, [0x03, 0x02, 0x23]).unwrap();
        assert!(read_spirv(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
