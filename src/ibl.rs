//! Image-based lighting. Prefiltering is the backend's concern; the core keeps
//! the source description and a representative ambient colour.

use crate::registry::Registry;
use anyhow::{bail, Context, Result};
use bevy_ecs::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum IblSource {
    Image(PathBuf),
    Solid,
}

#[derive(Component, Debug, Clone, PartialEq)]
pub struct Ibl {
    pub source: IblSource,
    pub resolution: u32,
    pub blur: f32,
    /// Mean radiance of the environment, linear RGB.
    pub ambient: [f32; 3],
    pub show_background: bool,
}

/// Loads an environment map and derives its mean colour.
pub fn generate_ibl(path: impl AsRef<Path>, resolution: u32) -> Result<Ibl> {
    let path = path.as_ref();
    if resolution == 0 || !resolution.is_power_of_two() {
        bail!("IBL resolution must be a non-zero power of two, got {resolution}");
    }
    let image = image::open(path).with_context(|| format!("Failed to load IBL image {}", path.display()))?;
    let pixels = image.into_rgb32f();
    let count = (pixels.width() as f64) * (pixels.height() as f64);
    if count == 0.0 {
        bail!("IBL image {} is empty", path.display());
    }
    let mut sum = [0.0f64; 3];
    for pixel in pixels.pixels() {
        for (acc, channel) in sum.iter_mut().zip(pixel.0) {
            *acc += channel as f64;
        }
    }
    let ambient = sum.map(|total| (total / count) as f32);
    Ok(Ibl { source: IblSource::Image(path.to_path_buf()), resolution, blur: 0.0, ambient, show_background: true })
}

pub fn solid_ibl(color: [f32; 3], resolution: u32) -> Ibl {
    Ibl { source: IblSource::Solid, resolution: resolution.max(1), blur: 0.0, ambient: color, show_background: false }
}

pub fn add_ibl(registry: &mut Registry, ibl: Ibl) -> Entity {
    registry.world.spawn(ibl).id()
}

/// Removes every IBL; returns how many were removed.
pub fn clear_ibl(registry: &mut Registry) -> usize {
    let world = &mut registry.world;
    let ibls: Vec<Entity> = world.query_filtered::<Entity, With<Ibl>>().iter(world).collect();
    let count = ibls.len();
    for entity in ibls {
        registry.destroy_entity(entity);
    }
    count
}

pub fn get_ibl(registry: &mut Registry) -> Option<Ibl> {
    let world = &mut registry.world;
    world.query::<&Ibl>().iter(world).next().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_ibl_round_trips_through_registry() {
        let mut registry = Registry::headless();
        assert!(get_ibl(&mut registry).is_none());
        add_ibl(&mut registry, solid_ibl([0.2, 0.3, 0.4], 64));
        assert_eq!(get_ibl(&mut registry).unwrap().ambient, [0.2, 0.3, 0.4]);
        assert_eq!(clear_ibl(&mut registry), 1);
        assert!(get_ibl(&mut registry).is_none());
    }

    #[test]
    fn generate_ibl_averages_image_colour() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.png");
        let mut img = image::RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.put_pixel(1, 0, image::Rgb([0, 0, 255]));
        img.save(&path).unwrap();

        let ibl = generate_ibl(&path, 256).unwrap();
        assert!((ibl.ambient[0] - ibl.ambient[2]).abs() < 1e-4);
        assert!(ibl.ambient[1].abs() < 1e-4);
        assert_eq!(ibl.source, IblSource::Image(path));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = generate_ibl("does/not/exist.hdr", 256).unwrap_err();
        assert!(err.to_string().contains("Failed to load IBL image"));
    }

    #[test]
    fn resolution_must_be_power_of_two() {
        assert!(generate_ibl("whatever.png", 300).is_err());
    }
}
