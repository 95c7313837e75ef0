// Shader module loading
//
// Vulkan consumes SPIR-V. The triangle's two stages are read from disk at
// pipeline-build time and their modules live only until the pipeline exists.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// Read a SPIR-V binary as 4-byte words
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read shader {:?}", path))?;
    parse_spirv(&bytes).with_context(|| format!("Shader {:?} is not valid SPIR-V", path))
}

/// `read_spv` copies into a `u32` buffer, so unaligned input is fine, and it
/// byte-swaps big-endian modules.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    Ok(ash::util::read_spv(&mut Cursor::new(bytes))?)
}

pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

/// Load a shader from disk straight into a module
pub fn load_shader_module(device: &ash::Device, path: &Path) -> Result<vk::ShaderModule> {
    let code = read_spirv(path)?;
    log::debug!("Loaded {:?} ({} words)", path, code.len());
    create_shader_module(device, &code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn parses_little_endian_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());

        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_truncated_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.push(0);
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_spirv(Path::new("shaders/missing.spv")).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.spv"));
    }
}
