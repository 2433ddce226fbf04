use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

const SHADERS_DIR: &str = "shaders-built";

/// The vertex and fragment modules for one graphics pipeline. Modules are
/// only needed while the pipeline is being created; dropping this destroys
/// them, whether or not that creation succeeded.
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(shader_name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let vert_mod = create_shader_module(
            (&format!("{}/{}.vert.spv", SHADERS_DIR, shader_name)).as_ref(),
            &device,
        )?;
        let frag_mod = create_shader_module(
            (&format!("{}/{}.frag.spv", SHADERS_DIR, shader_name)).as_ref(),
            &device,
        )?;
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

/// Reads a whole pre-compiled SPIR-V binary and wraps it in a shader
/// module. The byte length of the file carries through unchanged; the
/// blob's structure is not interpreted here.
fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let code = std::fs::read(filepath)
        .wrap_err_with(|| format!("Failed to read shader binary {:?}", filepath))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(bytemuck::cast_slice(&code));

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}
