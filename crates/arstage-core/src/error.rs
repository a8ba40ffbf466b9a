//! Error types shared across the AR core

use thiserror::Error;

/// Failures while negotiating an AR session with the platform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XrError {
    #[error("Immersive AR is not supported on this platform")]
    Unsupported,
    #[error("Hit testing is not supported by this session")]
    HitTestUnsupported,
    #[error("Session request failed: {0}")]
    SessionRequest(String),
    #[error("Reference space request failed: {0}")]
    ReferenceSpace(String),
    #[error("Hit test source request failed: {0}")]
    HitTestSource(String),
}

/// Transport-level failure reported by an `AssetSource`
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct FetchError(pub String);

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("Failed to decode glTF: {0}")]
    Decode(#[from] gltf::Error),
    #[error("Asset contains no scene")]
    EmptyScene,
}

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("Failed to decode HDR image: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
