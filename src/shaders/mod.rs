// SPDX-License-Identifier: GPL-3.0-only

//! Shader sources for GPU-path filters
//!
//! Every filter draws the shared full-screen quad with its own fragment
//! shader. Fragment shaders bind the input texture at 0, a sampler at 1 and
//! a [`FilterUniform`] at 2.

/// Vertex stage shared by all filters
pub const QUAD_VERTEX: &str = include_str!("quad.wgsl");

/// A fragment stage with a stable label used as its program cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentShader {
    pub label: &'static str,
    pub source: &'static str,
}

pub const BRIGHTNESS: FragmentShader = FragmentShader {
    label: "brightness",
    source: include_str!("brightness.wgsl"),
};

pub const CONTRAST: FragmentShader = FragmentShader {
    label: "contrast",
    source: include_str!("contrast.wgsl"),
};

/// Filter parameters uniform (must match shader struct)
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FilterUniform {
    pub intensity: f32,
    pub _padding: [f32; 3],
}

impl FilterUniform {
    pub fn new(intensity: f32) -> Self {
        Self {
            intensity,
            _padding: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) -> naga::Module {
        let module = match naga::front::wgsl::parse_str(source) {
            Ok(module) => module,
            Err(e) => panic!("Shader '{}' parse failed: {:?}", name, e),
        };
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module);
        if let Err(e) = info {
            panic!("Shader '{}' validation failed: {:?}", name, e);
        }
        module
    }

    fn entry_point_names(module: &naga::Module) -> Vec<String> {
        module.entry_points.iter().map(|ep| ep.name.clone()).collect()
    }

    #[test]
    fn test_quad_shader_validates() {
        let module = validate_shader("quad", QUAD_VERTEX);
        assert_eq!(entry_point_names(&module), vec!["vs_main".to_string()]);
    }

    #[test]
    fn test_fragment_shaders_validate() {
        for shader in [BRIGHTNESS, CONTRAST] {
            let module = validate_shader(shader.label, shader.source);
            assert_eq!(entry_point_names(&module), vec!["fs_main".to_string()]);
        }
    }

    #[test]
    fn test_uniform_is_16_bytes() {
        assert_eq!(std::mem::size_of::<FilterUniform>(), 16);
        assert_eq!(bytemuck::bytes_of(&FilterUniform::new(0.5)).len(), 16);
    }
}
