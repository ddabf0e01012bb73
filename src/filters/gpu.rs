// SPDX-License-Identifier: GPL-3.0-only

//! GPU algorithm helper: one fragment shader pass from `src` to `dst`

use crate::buffer::{EffectBuffer, TextureId};
use crate::errors::{EffectError, EffectResult};
use crate::memory;
use crate::pipeline::EffectContext;
use crate::render::RenderEnvironment;
use crate::shaders::{FilterUniform, FragmentShader};
use tracing::debug;

/// Draw `shader` over `src` into `dst`.
///
/// A texture input is sampled directly; a memory input is uploaded into a
/// temporary texture. A memory-backed destination receives the rendered
/// pixels through readback. Temporary textures are released on every path.
pub fn render_shader(
    src: &EffectBuffer,
    dst: &mut EffectBuffer,
    ctx: &mut EffectContext,
    shader: FragmentShader,
    uniform: FilterUniform,
) -> EffectResult<()> {
    if !src.descriptor.same_shape(&dst.descriptor) {
        return Err(EffectError::InvalidParameter(format!(
            "{}x{} {} rendered into {}x{} {}",
            src.descriptor.width,
            src.descriptor.height,
            src.descriptor.format,
            dst.descriptor.width,
            dst.descriptor.height,
            dst.descriptor.format
        )));
    }
    let env = &mut ctx.render_environment;

    let (input, uploaded) = match src.texture_id() {
        Some(id) => (id, false),
        None => (env.upload(src)?, true),
    };
    let result = draw_into(env, shader, input, dst, uniform);
    if uploaded {
        env.release_texture(input);
    }
    result
}

fn draw_into(
    env: &mut RenderEnvironment,
    shader: FragmentShader,
    input: TextureId,
    dst: &mut EffectBuffer,
    uniform: FilterUniform,
) -> EffectResult<()> {
    if let Some(output) = dst.texture_id() {
        return env.draw(shader, input, output, uniform);
    }

    let desc = dst.descriptor.clone();
    let output = env.create_texture(desc.width, desc.height, desc.format)?;
    let result = env.draw(shader, input, output, uniform).and_then(|()| {
        let mut guard = memory::write_shared(dst.data()?)?;
        env.read_pixels(output, guard.bytes_mut(), desc.row_stride)
    });
    env.release_texture(output);
    if result.is_ok() {
        debug!(shader = shader.label, "Read back rendered pixels");
    }
    result
}
