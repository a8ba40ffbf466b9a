//! Placement and playback control for the current model

use tracing::{debug, info};

use crate::loader::LoadedModel;
use crate::mode::ModelMode;
use crate::scene_manager::{ModelSlot, SceneManager};
use crate::transform::RigidTransform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Visible at a world position
    Located,
    /// Hidden, waiting to be placed
    #[default]
    Dislocated,
}

/// Tracks which model is current, where it is and how its animations play
///
/// The model itself lives in the `SceneManager`; every operation takes the
/// scene and does nothing when the tracked slot holds no model.
#[derive(Debug, Default)]
pub struct ModelAnimator {
    slot: Option<ModelSlot>,
    placement: Placement,
    mode: ModelMode,
}

impl ModelAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the model in `slot` current. The previous model is hidden, the
    /// new one starts dislocated with playback stopped.
    pub fn init(&mut self, slot: ModelSlot, scene: &mut SceneManager) {
        if let Some(previous) = self.slot.filter(|s| *s != slot) {
            if let Some(model) = scene.model_mut(previous) {
                model.root.visible = false;
            }
        }
        self.slot = Some(slot);
        self.placement = Placement::Dislocated;
        self.mode = ModelMode::Stop;
        if let Some(LoadedModel { root, mixer }) = scene.model_mut(slot) {
            root.visible = false;
            if let Some(mixer) = mixer {
                mixer.stop_all(root);
            }
        }
        info!(model = slot.node_name(), "Initialized model animator");
    }

    pub fn slot(&self) -> Option<ModelSlot> {
        self.slot
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn model_mode(&self) -> ModelMode {
        self.mode
    }

    pub fn is_model_located(&self) -> bool {
        self.placement == Placement::Located
    }

    fn current<'s>(&self, scene: &'s mut SceneManager) -> Option<&'s mut LoadedModel> {
        self.slot.and_then(|slot| scene.model_mut(slot))
    }

    /// Move the model to `pose` and show it
    pub fn locate_model(&mut self, scene: &mut SceneManager, pose: &RigidTransform) {
        let Some(model) = self.current(scene) else {
            debug!("No model to locate");
            return;
        };
        model.root.translation = pose.position;
        model.root.visible = true;
        self.placement = Placement::Located;
        debug!(position = ?pose.position, "Located model");
    }

    /// Hide the model until it is placed again
    pub fn dislocate_model(&mut self, scene: &mut SceneManager) {
        let Some(model) = self.current(scene) else {
            return;
        };
        model.root.visible = false;
        self.placement = Placement::Dislocated;
        debug!("Dislocated model");
    }

    pub fn switch_model_mode(&mut self, mode: ModelMode, scene: &mut SceneManager) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        debug!(mode = %mode, "Model mode changed");

        let Some(LoadedModel { root, mixer: Some(mixer) }) = self.current(scene) else {
            return;
        };
        match mode {
            ModelMode::Play => mixer.play_all(),
            ModelMode::Pause => mixer.pause_all(),
            ModelMode::Stop => mixer.stop_all(root),
        }
    }

    /// Advance animation playback by `delta` seconds
    pub fn update(&mut self, scene: &mut SceneManager, delta: f32) {
        if let Some(LoadedModel { root, mixer: Some(mixer) }) = self.current(scene) {
            mixer.update(delta, root);
        }
    }
}
