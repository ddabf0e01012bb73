// SPDX-License-Identifier: GPL-3.0-only

//! Full-screen quad with separate position and texture coordinate buffers

use crate::errors::EffectResult;
use crate::gpu;
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

/// Triangle strip covering clip space
const POSITIONS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];
/// Texture row 0 is the top of the image
const TEX_COORDS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]];

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const TEX_COORD_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
    wgpu::vertex_attr_array![1 => Float32x2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshState {
    Uninitialized,
    Bound,
    /// Terminal for the current buffers; binding again rebuilds them
    Released,
}

#[derive(Debug)]
struct MeshBuffers {
    position: wgpu::Buffer,
    tex_coord: wgpu::Buffer,
}

#[derive(Debug)]
pub struct RenderMesh {
    state: MeshState,
    buffers: Option<MeshBuffers>,
}

impl Default for RenderMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderMesh {
    pub fn new() -> Self {
        Self {
            state: MeshState::Uninitialized,
            buffers: None,
        }
    }

    pub fn state(&self) -> MeshState {
        self.state
    }

    /// Layouts matching `vs_main` in the quad shader
    pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
        [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION_ATTRIBUTES,
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &TEX_COORD_ATTRIBUTES,
            },
        ]
    }

    /// Create the vertex buffers on first use
    pub fn bind(&mut self, device: &wgpu::Device) -> EffectResult<()> {
        match self.state {
            MeshState::Bound => return Ok(()),
            MeshState::Released => {
                warn!("Render mesh bound after release, rebuilding");
            }
            MeshState::Uninitialized => {}
        }

        let buffers = gpu::checked(device, "mesh buffers", || MeshBuffers {
            position: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_position_buffer"),
                contents: bytemuck::cast_slice(&POSITIONS),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            tex_coord: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_tex_coord_buffer"),
                contents: bytemuck::cast_slice(&TEX_COORDS),
                usage: wgpu::BufferUsages::VERTEX,
            }),
        })?;

        debug!("Render mesh initialized");
        self.buffers = Some(buffers);
        self.state = MeshState::Bound;
        Ok(())
    }

    /// Record the quad into `pass`; the mesh must be bound
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) -> bool {
        let Some(buffers) = &self.buffers else {
            return false;
        };
        pass.set_vertex_buffer(0, buffers.position.slice(..));
        pass.set_vertex_buffer(1, buffers.tex_coord.slice(..));
        pass.draw(0..POSITIONS.len() as u32, 0..1);
        true
    }

    pub fn release(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            buffers.position.destroy();
            buffers.tex_coord.destroy();
        }
        if self.state != MeshState::Uninitialized {
            self.state = MeshState::Released;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_match_shader_locations() {
        let layouts = RenderMesh::vertex_layouts();
        assert_eq!(layouts[0].attributes[0].shader_location, 0);
        assert_eq!(layouts[1].attributes[0].shader_location, 1);
        assert_eq!(layouts[0].array_stride, 8);
    }

    #[test]
    fn test_release_before_bind_stays_uninitialized() {
        let mut mesh = RenderMesh::new();
        mesh.release();
        assert_eq!(mesh.state(), MeshState::Uninitialized);
    }
}
