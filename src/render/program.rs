// SPDX-License-Identifier: GPL-3.0-only

//! Compiled vertex/fragment pair rendering into one texture format

use super::mesh::RenderMesh;
use crate::errors::EffectResult;
use crate::gpu;
use crate::shaders::{FragmentShader, QUAD_VERTEX};
use tracing::debug;

#[derive(Debug)]
pub struct RenderProgram {
    pub label: &'static str,
    pub target_format: wgpu::TextureFormat,
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl RenderProgram {
    /// Compile `shader` against the shared quad vertex stage. Creation
    /// errors are captured and returned; nothing is kept on failure.
    pub fn new(
        device: &wgpu::Device,
        shader: FragmentShader,
        target_format: wgpu::TextureFormat,
    ) -> EffectResult<Self> {
        let (pipeline, bind_group_layout) = gpu::checked(device, shader.label, || {
            let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("quad_vertex_shader"),
                source: wgpu::ShaderSource::Wgsl(QUAD_VERTEX.into()),
            });
            let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(shader.label),
                source: wgpu::ShaderSource::Wgsl(shader.source.into()),
            });

            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("filter_bind_group_layout"),
                    entries: &[
                        // Input texture
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        // Sampler
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                        // Filter parameters
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("filter_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let vertex_layouts = RenderMesh::vertex_layouts();
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(shader.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex,
                    entry_point: Some("vs_main"),
                    buffers: &vertex_layouts,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

            (pipeline, bind_group_layout)
        })?;

        debug!(label = shader.label, format = ?target_format, "Render program linked");

        Ok(Self {
            label: shader.label,
            target_format,
            pipeline,
            bind_group_layout,
        })
    }
}
