//! Graphics device capability and introspection interface
//!
//! The shared-buffer lighting tier must match the driver's actual uniform
//! block memory layout. Since the std140 layout specifier is not reliably
//! available on the GLSL versions we target, a small probe shader declaring
//! the block is compiled once and its real field offsets and stride are
//! queried back from the driver.

/// Handle to a compiled probe program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHandle(pub u32);

/// Uniform block memory layout reported by the driver
///
/// All offsets and sizes are in bytes, relative to the start of the block.
#[derive(Debug, Clone, Copy)]
pub struct UniformBlockLayout {
    /// Offset of the packed color words of record 0
    pub offset_colors: usize,
    /// Offset of the position vector of record 0
    pub offset_position: usize,
    /// Offset of the attenuation/radius vector of record 0
    pub offset_attenuation_radius: usize,
    /// Total data size of the block
    pub total_size: usize,
    /// Array stride padding between consecutive records
    pub array_stride: usize,
}

/// Narrow interface onto the graphics driver
///
/// Implementations are expected to be cheap to query; the lighting manager
/// probes capabilities once at construction and polls the probe program
/// until the driver reports an active uniform block.
pub trait GraphicsDevice {
    /// Whether uniform buffer objects are available
    fn supports_uniform_buffer_objects(&self) -> bool;

    /// Whether the extended shader feature set (integer/bitwise ops in
    /// shaders) is available
    fn supports_gpu_shader4(&self) -> bool;

    /// Submit a shader program for compilation
    fn compile_program(&self, source: &str) -> ProgramHandle;

    /// Number of active uniform blocks the compiled program reports
    ///
    /// Zero until the driver has finished compiling and linking.
    fn active_uniform_blocks(&self, program: ProgramHandle) -> usize;

    /// Introspect the light uniform block's field offsets and stride
    ///
    /// Only meaningful once [`Self::active_uniform_blocks`] is non-zero.
    fn light_block_layout(&self, program: ProgramHandle) -> UniformBlockLayout;
}

/// Generate the probe shader declaring the light uniform block
///
/// The block declaration must match the real lighting shaders exactly, so
/// the offsets queried from this program apply to them as well.
pub fn probe_shader_source(max_lights_in_scene: usize) -> String {
    const TEMPLATE: &str = r"#version 120
#extension GL_ARB_uniform_buffer_object : require
struct LightData {
   ivec4 packedColors;
   vec4 position;
   vec4 attenuation;
};
uniform LightBufferBinding {
   LightData LightBuffer[@maxLightsInScene];
};
void main()
{
    gl_Position = vec4(0.0);
}
";

    TEMPLATE.replace("@maxLightsInScene", &max_lights_in_scene.to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Headless mock device for tests

    use std::cell::Cell;

    use super::{GraphicsDevice, ProgramHandle, UniformBlockLayout};

    /// Mock driver with scriptable capabilities and block layout
    pub struct MockDevice {
        ubo: bool,
        gpu_shader4: bool,
        linked: Cell<bool>,
        programs: Cell<usize>,
        layout: UniformBlockLayout,
    }

    impl MockDevice {
        /// Device supporting every feature, probe not yet linked
        pub fn with_full_support(record_count: usize) -> Self {
            Self {
                ubo: true,
                gpu_shader4: true,
                linked: Cell::new(false),
                programs: Cell::new(0),
                // A padded layout: 16-float stride instead of the default 12.
                layout: UniformBlockLayout {
                    offset_colors: 0,
                    offset_position: 16,
                    offset_attenuation_radius: 32,
                    total_size: 64 * record_count,
                    array_stride: 16,
                },
            }
        }

        /// Device without uniform buffer object support
        pub fn without_ubo() -> Self {
            let mut device = Self::with_full_support(0);
            device.ubo = false;
            device
        }

        /// Pretend the driver finished compiling the probe program
        pub fn finish_link(&self) {
            self.linked.set(true);
        }

        /// Number of programs submitted for compilation
        pub fn compiled_programs(&self) -> usize {
            self.programs.get()
        }
    }

    impl GraphicsDevice for MockDevice {
        fn supports_uniform_buffer_objects(&self) -> bool {
            self.ubo
        }

        fn supports_gpu_shader4(&self) -> bool {
            self.gpu_shader4
        }

        fn compile_program(&self, source: &str) -> ProgramHandle {
            assert!(source.contains("LightBufferBinding"));
            self.programs.set(self.programs.get() + 1);
            ProgramHandle(1)
        }

        fn active_uniform_blocks(&self, _program: ProgramHandle) -> usize {
            usize::from(self.linked.get())
        }

        fn light_block_layout(&self, _program: ProgramHandle) -> UniformBlockLayout {
            self.layout
        }
    }
}
