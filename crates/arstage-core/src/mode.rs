//! Render and playback modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} mode: {value}")]
pub struct ModeParseError {
    kind: &'static str,
    value: String,
}

/// Interaction mode of the render loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Guide follows the latest hit result, model not placed
    #[default]
    Hit,
    /// World origin fixed to a surface point, model placed there
    Anchor,
    /// Camera-only inspection with zoom control
    Film,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Anchor => "anchor",
            Self::Film => "film",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hit" => Ok(Self::Hit),
            "anchor" => Ok(Self::Anchor),
            "film" => Ok(Self::Film),
            other => Err(ModeParseError {
                kind: "render",
                value: other.to_string(),
            }),
        }
    }
}

/// Animation playback mode of the current model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelMode {
    #[default]
    Stop,
    Play,
    Pause,
}

impl ModelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Play => "play",
            Self::Pause => "pause",
        }
    }
}

impl fmt::Display for ModelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            other => Err(ModeParseError {
                kind: "model",
                value: other.to_string(),
            }),
        }
    }
}
