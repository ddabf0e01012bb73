// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for buffer locking, write-back, color negotiation and
//! pipeline rendering

use image_effect::buffer::{
    AllocatorKind, BufferDescriptor, EffectBuffer, StorageKind, lock, unlock,
};
use image_effect::color::ColorSpaceStrategy;
use image_effect::constants::KEY_INTENSITY;
use image_effect::memory::MemoryManager;
use image_effect::{
    ColorSpace, EffectError, EngineConfig, FilterHandle, NativePixelFormat, ParamValue,
    PathPreference, Pipeline, PixelBuffer, PixelFormat,
};
use std::collections::HashSet;

fn cpu_config() -> EngineConfig {
    EngineConfig {
        processing_path: PathPreference::Cpu,
        ..EngineConfig::default()
    }
}

#[test]
fn test_lock_unlock_repeatedly() {
    let pixels = PixelBuffer::from_rgba(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    for _ in 0..16 {
        let locked = lock(&pixels).unwrap();
        assert_eq!(pixels.lock_count(), 1);
        assert_eq!(locked.buffer().descriptor.format, PixelFormat::Rgba8888);
        unlock(locked);
        assert_eq!(pixels.lock_count(), 0);
    }
}

#[test]
fn test_write_back_round_trip() {
    // 2x2 NV21 with two bytes of row padding: two luma rows, one chroma row
    let bytes: Vec<u8> = (0..12).collect();
    let source = PixelBuffer::from_bytes(2, 2, NativePixelFormat::Nv21, 4, bytes.clone()).unwrap();
    let target = PixelBuffer::from_rgba(1, 1, vec![0; 4]).unwrap();

    let mut manager = MemoryManager::default();
    {
        let locked = lock(&source).unwrap();
        let copy = manager
            .duplicate(locked.buffer().data().unwrap(), StorageKind::Heap)
            .unwrap();
        manager.write_back(&copy, &target).unwrap();
    }

    let info = target.info().unwrap();
    assert_eq!((info.width, info.height, info.row_stride), (2, 2, 4));
    assert_eq!(info.format, NativePixelFormat::Nv21);
    assert_eq!(target.to_bytes().unwrap(), bytes);
    assert_eq!(source.lock_count(), 0);
}

#[test]
fn test_write_back_into_shared_memory() {
    let source = PixelBuffer::from_rgba(1, 2, vec![9, 8, 7, 6, 5, 4, 3, 2]).unwrap();
    let target =
        PixelBuffer::new(1, 2, NativePixelFormat::Rgba8888, AllocatorKind::SharedMemory).unwrap();

    let mut pipeline = Pipeline::new(cpu_config());
    pipeline.add_filter_by_name("Contrast").unwrap();
    pipeline.render(&source, Some(&target)).unwrap();

    assert_eq!(target.allocator().unwrap(), AllocatorKind::SharedMemory);
    assert_eq!(target.to_bytes().unwrap(), vec![9, 8, 7, 6, 5, 4, 3, 2]);
}

#[test]
fn test_color_space_choice_ignores_filter_order() {
    let sets: Vec<HashSet<ColorSpace>> = vec![
        HashSet::from([ColorSpace::Srgb, ColorSpace::SrgbLimit, ColorSpace::DisplayP3]),
        HashSet::from([ColorSpace::Srgb, ColorSpace::DisplayP3]),
        HashSet::from([
            ColorSpace::Srgb,
            ColorSpace::DisplayP3,
            ColorSpace::DisplayP3Limit,
        ]),
    ];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let strategy = ColorSpaceStrategy::default();

    for src in [
        ColorSpace::Srgb,
        ColorSpace::SrgbLimit,
        ColorSpace::DisplayP3Limit,
        ColorSpace::Bt2020Pq,
    ] {
        let expected = strategy.choose_color_space(&sets, src);
        for order in orders {
            let permuted: Vec<_> = order.iter().map(|&i| sets[i].clone()).collect();
            assert_eq!(strategy.choose_color_space(&permuted, src), expected);
        }
    }
    assert_eq!(
        strategy.choose_color_space(&sets, ColorSpace::SrgbLimit),
        Ok(ColorSpace::Srgb)
    );
}

#[test]
fn test_limited_range_input_is_expanded_before_filtering() {
    let pixels = PixelBuffer::from_rgba(1, 1, vec![16, 235, 126, 255])
        .unwrap()
        .with_color_space(ColorSpace::SrgbLimit);

    // Contrast only accepts full-range spaces
    let mut handle = FilterHandle::create_with_config("Contrast", cpu_config()).unwrap();
    handle.render(&pixels, None).unwrap();

    assert_eq!(pixels.color_space().unwrap(), ColorSpace::Srgb);
    assert_eq!(pixels.to_bytes().unwrap(), vec![0, 255, 128, 255]);
}

#[test]
fn test_texture_ids_checked_before_gpu() {
    let mut handle = FilterHandle::create("Brightness").unwrap();
    assert_eq!(
        handle.render_with_texture_ids(0, 1, ColorSpace::Srgb),
        Err(EffectError::InputNull("input texture id"))
    );
    assert!(matches!(
        handle.render_with_texture_ids(1, 2, ColorSpace::Default),
        Err(EffectError::InvalidParameter(_))
    ));
    assert!(!handle.render_environment_mut().is_initialized());
}

#[test]
fn test_render_path_round_trip() {
    let dir = std::env::temp_dir().join(format!("image-effect-pipeline-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("input.png");
    let output = dir.join("output.png");
    image::RgbaImage::from_raw(2, 1, vec![0, 50, 200, 255, 255, 255, 255, 128])
        .unwrap()
        .save(&input)
        .unwrap();

    let mut pipeline = Pipeline::new(cpu_config());
    pipeline.add_filter_by_name("Contrast").unwrap();
    pipeline
        .with_filter(0, |f| f.set_value(KEY_INTENSITY, ParamValue::Float(-100.0)))
        .unwrap()
        .unwrap();
    pipeline.render_path(&input, &output).unwrap();

    let result = image::open(&output).unwrap().to_rgba8();
    assert_eq!(result.into_raw(), vec![128, 128, 128, 255, 128, 128, 128, 128]);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_unknown_filter_name_in_pipeline() {
    let mut pipeline = Pipeline::default();
    assert_eq!(
        pipeline.add_filter_by_name("NoSuchFilter"),
        Err(EffectError::FilterNotFound("NoSuchFilter".into()))
    );
    assert!(pipeline.is_empty());
}

fn close(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.abs_diff(*y) <= 1)
}

#[test]
fn test_gpu_matches_cpu() {
    let original = vec![0, 40, 80, 255, 120, 160, 200, 255, 240, 250, 10, 64];
    let cpu = PixelBuffer::from_rgba(3, 1, original.clone()).unwrap();
    let gpu = PixelBuffer::from_rgba(3, 1, original).unwrap();

    let mut cpu_handle = FilterHandle::create_with_config("Brightness", cpu_config()).unwrap();
    let gpu_config = EngineConfig {
        processing_path: PathPreference::Gpu,
        ..EngineConfig::default()
    };
    let mut gpu_handle = FilterHandle::create_with_config("Brightness", gpu_config).unwrap();
    if gpu_handle.render_environment_mut().init().is_err() {
        eprintln!("No GPU adapter available, skipping");
        return;
    }

    for handle in [&mut cpu_handle, &mut gpu_handle] {
        handle.set_value(KEY_INTENSITY, 30.0f32).unwrap();
    }
    cpu_handle.render(&cpu, None).unwrap();
    gpu_handle.render(&gpu, None).unwrap();

    let (cpu_bytes, gpu_bytes) = (cpu.to_bytes().unwrap(), gpu.to_bytes().unwrap());
    assert!(close(&cpu_bytes, &gpu_bytes), "{cpu_bytes:?} vs {gpu_bytes:?}");
    assert_eq!(gpu_handle.render_environment_mut().texture_count(), 0);
}

#[test]
fn test_render_with_texture_ids() {
    let mut handle = FilterHandle::create("Contrast").unwrap();
    let env = handle.render_environment_mut();
    if env.init().is_err() {
        eprintln!("No GPU adapter available, skipping");
        return;
    }

    let desc = BufferDescriptor::linear(2, 1, PixelFormat::Rgba8888, ColorSpace::Srgb);
    let source = EffectBuffer::from_bytes(desc, vec![10, 60, 200, 255, 255, 0, 128, 255]).unwrap();
    let input = env.upload(&source).unwrap();
    let output = env.create_texture(2, 1, PixelFormat::Rgba8888).unwrap();

    handle.set_value(KEY_INTENSITY, -100.0f32).unwrap();
    handle
        .render_with_texture_ids(input.get(), output.get(), ColorSpace::Srgb)
        .unwrap();

    let mut pixels = vec![0u8; 8];
    handle
        .render_environment_mut()
        .read_pixels(output, &mut pixels, 8)
        .unwrap();
    assert!(close(&pixels, &[128, 128, 128, 255, 128, 128, 128, 255]), "{pixels:?}");
    // Only the two caller textures remain
    assert_eq!(handle.render_environment_mut().texture_count(), 2);
}
