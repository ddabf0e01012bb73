// SPDX-License-Identifier: GPL-3.0-only

//! Off-screen rendering for GPU-path filters

pub mod environment;
pub mod mesh;
pub mod program;

pub use environment::{RenderEnvironment, RenderTexture, texture_format};
pub use mesh::{MeshState, RenderMesh};
pub use program::RenderProgram;
