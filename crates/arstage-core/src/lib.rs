//! arstage Core - AR session handling, render-mode state machine and model pipeline
//!
//! This crate holds everything the AR viewer does that does not depend on a
//! particular browser or graphics API:
//! - Session lifecycle and hit-test source acquisition behind the `XrBackend` port
//! - GLB decoding, scale normalization and animation mixers
//! - The owned scene graph with explicit resource disposal
//! - The per-frame render engine with one state type per render mode
//! - The `ActionManager` facade that UI code drives

pub mod actions;
pub mod animation;
pub mod animator;
pub mod axes;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod guide;
pub mod loader;
pub mod mode;
pub mod perf;
pub mod scene;
pub mod scene_manager;
pub mod session;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use actions::{ActionManager, SelectionTicket};
pub use animation::{AnimationAction, AnimationClip, AnimationMixer};
pub use animator::{ModelAnimator, Placement};
pub use config::StageConfig;
pub use engine::{FrameInfo, RenderCallback, RenderEngine, SceneRenderer};
pub use environment::EnvironmentMap;
pub use error::{ConfigError, EnvironmentError, FetchError, LoadError, XrError};
pub use guide::GuideCircle;
pub use loader::{AssetSource, LoadedModel, ModelLoader, ModelSource, ModelSummary};
pub use mode::{ModelMode, RenderMode};
pub use perf::FrameStats;
pub use scene::{Node, NodeKind, ResourceId, ResourceSink};
pub use scene_manager::{Camera, ModelSlot, SceneManager};
pub use session::{ReferenceSpaceKind, SessionInit, SessionProvider, XrBackend};
pub use transform::RigidTransform;
