// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the effect engine
//!
//! This module provides command-line functionality for:
//! - Listing registered filters
//! - Showing a filter's capabilities
//! - Applying a filter chain to an image file

use image_effect::config::PathPreference;
use image_effect::constants::LOOKUP_DEFAULT;
use image_effect::filters::registry;
use image_effect::{EngineConfig, ParamValue, Pipeline};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// List filter names matching `key` (all filters when absent)
pub fn list_filters(key: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let names = registry::lookup(key.unwrap_or(LOOKUP_DEFAULT));

    if names.is_empty() {
        println!("No filters found.");
        return Ok(());
    }

    println!("Available filters:");
    for name in names {
        let category = registry::effect_info(&name)
            .map(|info| info.category.name())
            .unwrap_or("Unknown");
        println!("  {name} ({category})");
    }

    Ok(())
}

/// Print the capabilities of one filter
pub fn show_filter(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let info = registry::effect_info(name).ok_or_else(|| format!("Unknown filter: {name}"))?;

    println!("{name}");
    println!("  Category: {}", info.category.name());
    println!("  Formats:");
    for (format, paths) in &info.formats {
        let paths: Vec<String> = paths.iter().map(ToString::to_string).collect();
        println!("    {format}: {}", paths.join(", "));
    }

    let mut color_spaces: Vec<String> = info.color_spaces.iter().map(ToString::to_string).collect();
    color_spaces.sort();
    println!("  Color spaces: {}", color_spaces.join(", "));

    Ok(())
}

/// Decode `input`, run the filter chain and write the result
pub fn apply(
    mut config: EngineConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    filters: &[String],
    path: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = path {
        config.processing_path = path.parse::<PathPreference>()?;
    }
    let output = output.unwrap_or_else(|| default_output_path(&input));

    let mut pipeline = Pipeline::new(config);
    for spec in filters {
        let (name, values) = parse_filter_spec(spec)?;
        pipeline.add_filter_by_name(name)?;
        let index = pipeline.len() - 1;
        for (key, value) in values {
            pipeline.with_filter(index, |filter| filter.set_value(key, value))??;
        }
        println!("Filter: {name}");
    }

    let start = Instant::now();
    pipeline.render_path(&input, &output)?;

    println!(
        "Saved to: {} ({:.1} ms)",
        output.display(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

/// Split `Name:Key=Value,Key=Value` into the filter name and its values.
/// Numbers become floats, everything else text.
fn parse_filter_spec(spec: &str) -> Result<(&str, Vec<(&str, ParamValue)>), String> {
    let (name, rest) = spec.split_once(':').unwrap_or((spec, ""));
    if name.is_empty() {
        return Err(format!("Missing filter name in '{spec}'"));
    }

    let mut values = Vec::new();
    for pair in rest.split(',').filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected Key=Value, got '{pair}'"))?;
        let value = match value.parse::<f32>() {
            Ok(number) => ParamValue::Float(number),
            Err(_) => ParamValue::Text(value.to_string()),
        };
        values.push((key, value));
    }

    Ok((name, values))
}

/// `photo.png` becomes `photo_effect.png` next to it
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy())
        .unwrap_or_else(|| "png".into());
    input.with_file_name(format!("{stem}_effect.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_spec() {
        let (name, values) = parse_filter_spec("Brightness:FilterIntensity=40,Mode=soft").unwrap();
        assert_eq!(name, "Brightness");
        assert_eq!(
            values,
            vec![
                ("FilterIntensity", ParamValue::Float(40.0)),
                ("Mode", ParamValue::Text("soft".into())),
            ]
        );

        let (name, values) = parse_filter_spec("Contrast").unwrap();
        assert_eq!(name, "Contrast");
        assert!(values.is_empty());

        assert!(parse_filter_spec(":FilterIntensity=1").is_err());
        assert!(parse_filter_spec("Brightness:FilterIntensity").is_err());
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/photo.jpg")),
            PathBuf::from("/tmp/photo_effect.jpg")
        );
    }
}
