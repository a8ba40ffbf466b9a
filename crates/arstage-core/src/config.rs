//! Stage configuration

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// Top-level configuration for an AR stage
///
/// Every field has a default so the host page can pass a partial JSON
/// object, or nothing at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// URL of the built-in test asset
    #[serde(default = "default_test_model_url")]
    pub test_model_url: String,
    /// URL of the equirectangular HDR environment
    #[serde(default = "default_hdri_url")]
    pub hdri_url: String,
    /// Element id used as DOM overlay root, if present in the page
    #[serde(default = "default_dom_overlay_root")]
    pub dom_overlay_root: Option<String>,
    /// Element id the WebGL canvas is appended to
    #[serde(default = "default_canvas_container")]
    pub canvas_container: String,
    /// Bounding-sphere radius every loaded model is scaled to (meters)
    #[serde(default = "default_target_radius")]
    pub target_radius: f32,
    /// Delay between re-anchoring and placing the model (milliseconds)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: f64,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub zoom: ZoomConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    /// Maximum log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Inspection camera used in film mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

/// Field-of-view bounds for the zoom control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomConfig {
    #[serde(default = "default_zoom_min")]
    pub min: f32,
    #[serde(default = "default_zoom_max")]
    pub max: f32,
}

/// Conversion from horizontal drag distance to session yaw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Drags at or below this many pixels are ignored
    #[serde(default = "default_threshold_px")]
    pub threshold_px: f64,
    #[serde(default = "default_px_per_radian")]
    pub px_per_radian: f64,
}

fn default_test_model_url() -> String {
    "/models/cube.glb".to_string()
}

fn default_hdri_url() -> String {
    "/models/studio.hdr".to_string()
}

fn default_dom_overlay_root() -> Option<String> {
    Some("react-ui".to_string())
}

fn default_canvas_container() -> String {
    "webgl-container".to_string()
}

fn default_target_radius() -> f32 {
    0.2
}

fn default_settle_delay_ms() -> f64 {
    100.0
}

fn default_fov() -> f32 {
    70.0
}

fn default_near() -> f32 {
    0.01
}

fn default_far() -> f32 {
    1000.0
}

fn default_zoom_min() -> f32 {
    30.0
}

fn default_zoom_max() -> f32 {
    100.0
}

fn default_threshold_px() -> f64 {
    2.0
}

fn default_px_per_radian() -> f64 {
    50.0
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            test_model_url: default_test_model_url(),
            hdri_url: default_hdri_url(),
            dom_overlay_root: default_dom_overlay_root(),
            canvas_container: default_canvas_container(),
            target_radius: default_target_radius(),
            settle_delay_ms: default_settle_delay_ms(),
            camera: CameraConfig::default(),
            zoom: ZoomConfig::default(),
            rotation: RotationConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
        }
    }
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            min: default_zoom_min(),
            max: default_zoom_max(),
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            threshold_px: default_threshold_px(),
            px_per_radian: default_px_per_radian(),
        }
    }
}

impl StageConfig {
    /// Parse and validate a JSON configuration object
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StageConfig = serde_json::from_str(json)?;
        config.validate()?;
        info!(
            test_model = %config.test_model_url,
            hdri = %config.hdri_url,
            "Loaded stage configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "target_radius must be positive, got {}",
                self.target_radius
            )));
        }
        if self.settle_delay_ms < 0.0 {
            return Err(ConfigError::Invalid(
                "settle_delay_ms must not be negative".to_string(),
            ));
        }
        if self.zoom.min <= 0.0 || self.zoom.min > self.zoom.max || self.zoom.max >= 180.0 {
            return Err(ConfigError::Invalid(format!(
                "zoom bounds must satisfy 0 < min <= max < 180, got [{}, {}]",
                self.zoom.min, self.zoom.max
            )));
        }
        if self.camera.near <= 0.0 || self.camera.near >= self.camera.far {
            return Err(ConfigError::Invalid(
                "camera planes must satisfy 0 < near < far".to_string(),
            ));
        }
        if self.rotation.px_per_radian <= 0.0 {
            return Err(ConfigError::Invalid(
                "px_per_radian must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = StageConfig::from_json("{}").unwrap();
        assert_eq!(config, StageConfig::default());
        assert_eq!(config.target_radius, 0.2);
        assert_eq!(config.dom_overlay_root.as_deref(), Some("react-ui"));
        assert_eq!(config.zoom.min, 30.0);
        assert_eq!(config.zoom.max, 100.0);
    }

    #[test]
    fn test_partial_override() {
        let config =
            StageConfig::from_json(r#"{"settle_delay_ms": 250, "zoom": {"max": 90}}"#).unwrap();
        assert_eq!(config.settle_delay_ms, 250.0);
        assert_eq!(config.zoom.max, 90.0);
        assert_eq!(config.zoom.min, 30.0);
        assert_eq!(config.camera.fov, 70.0);
    }

    #[test]
    fn test_overlay_can_be_disabled() {
        let config = StageConfig::from_json(r#"{"dom_overlay_root": null}"#).unwrap();
        assert!(config.dom_overlay_root.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            StageConfig::from_json(r#"{"target_radius": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            StageConfig::from_json(r#"{"zoom": {"min": 120, "max": 100}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            StageConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
