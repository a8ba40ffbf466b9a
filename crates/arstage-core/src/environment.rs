//! Equirectangular HDR environment used for image-based lighting

use glam::Vec3;
use image::ImageFormat;
use std::f32::consts::PI;
use tracing::{debug, info};

use crate::error::EnvironmentError;
use crate::loader::AssetSource;

/// Linear RGB radiance map
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    width: u32,
    height: u32,
    texels: Vec<[f32; 3]>,
}

impl EnvironmentMap {
    pub fn new(width: u32, height: u32, texels: Vec<[f32; 3]>) -> Self {
        Self {
            width,
            height,
            texels,
        }
    }

    /// Decode Radiance `.hdr` bytes
    pub fn decode_hdr(bytes: &[u8]) -> Result<Self, EnvironmentError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Hdr)?;
        let rgb = image.to_rgb32f();
        let (width, height) = rgb.dimensions();
        let texels = rgb.pixels().map(|p| p.0).collect();
        debug!(width, height, "Decoded environment map");
        Ok(Self::new(width, height, texels))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[[f32; 3]] {
        &self.texels
    }

    /// Mean radiance over the sphere.
    ///
    /// Rows near the poles cover less solid angle in an equirectangular
    /// layout, so each row is weighted by the cosine of its latitude.
    pub fn average_radiance(&self) -> Vec3 {
        if self.width == 0 || self.height == 0 {
            return Vec3::ZERO;
        }
        let mut sum = Vec3::ZERO;
        let mut weight_sum = 0.0;
        for (row, texels) in self.texels.chunks(self.width as usize).enumerate() {
            let latitude = ((row as f32 + 0.5) / self.height as f32 - 0.5) * PI;
            let weight = latitude.cos();
            for texel in texels {
                sum += Vec3::from(*texel) * weight;
                weight_sum += weight;
            }
        }
        if weight_sum > 0.0 {
            sum / weight_sum
        } else {
            Vec3::ZERO
        }
    }
}

/// Fetch and decode the environment map at `url`
pub async fn load_environment<S: AssetSource>(
    source: &S,
    url: &str,
) -> Result<EnvironmentMap, EnvironmentError> {
    let bytes = source
        .fetch(url)
        .await
        .map_err(|e| EnvironmentError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    let map = EnvironmentMap::decode_hdr(&bytes)?;
    info!(url, width = map.width, height = map.height, "Loaded environment");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockAssets};

    #[test]
    fn test_decode_hdr() {
        let map = EnvironmentMap::decode_hdr(&fixtures::flat_hdr(4, 2)).unwrap();
        assert_eq!(map.width(), 4);
        assert_eq!(map.height(), 2);
        let radiance = map.average_radiance();
        assert!(radiance.x > radiance.y && radiance.y > radiance.z);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            EnvironmentMap::decode_hdr(b"nope"),
            Err(EnvironmentError::Decode(_))
        ));
    }

    #[test]
    fn test_average_of_uniform_map() {
        let map = EnvironmentMap::new(2, 2, vec![[0.5, 0.25, 1.0]; 4]);
        let radiance = map.average_radiance();
        assert!((radiance - Vec3::new(0.5, 0.25, 1.0)).length() < 1e-5);
        assert_eq!(EnvironmentMap::new(0, 0, vec![]).average_radiance(), Vec3::ZERO);
    }

    #[test]
    fn test_load_missing_environment() {
        let result = pollster::block_on(load_environment(&MockAssets::default(), "/studio.hdr"));
        assert!(matches!(result, Err(EnvironmentError::Fetch { .. })));
    }
}
