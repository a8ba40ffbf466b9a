//! Owner of the scene graph: guide, models, camera and environment

use glam::Mat4;
use tracing::{debug, info};

use crate::axes::axes_helper;
use crate::config::StageConfig;
use crate::environment::EnvironmentMap;
use crate::guide::GuideCircle;
use crate::loader::LoadedModel;
use crate::scene::{Node, ResourceSink};

pub const TEST_MODEL_NAME: &str = "ar-staging/testcube";
pub const USER_MODEL_NAME: &str = "ar-staging/scene";
/// Meters
const AXES_LENGTH: f32 = 1.0;

/// Where a model lives in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelSlot {
    /// The bundled test asset, loaded once at startup
    TestAsset,
    /// At most one user-selected model
    User,
}

impl ModelSlot {
    pub fn node_name(&self) -> &'static str {
        match self {
            Self::TestAsset => TEST_MODEL_NAME,
            Self::User => USER_MODEL_NAME,
        }
    }
}

/// Perspective camera for film mode
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    fov: f32,
    aspect: f32,
    near: f32,
    far: f32,
    projection: Mat4,
}

impl Camera {
    /// `fov` is the vertical field of view in degrees
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            projection: Mat4::IDENTITY,
        };
        camera.update_projection_matrix();
        camera
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
        self.update_projection_matrix();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect > 0.0 && aspect != self.aspect {
            self.aspect = aspect;
            self.update_projection_matrix();
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Projection with this camera's lens for a viewport of another shape
    pub fn projection_for_aspect(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov.to_radians(), aspect, self.near, self.far)
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection = self.projection_for_aspect(self.aspect);
    }
}

/// The scene graph and everything attached to it
#[derive(Debug)]
pub struct SceneManager {
    camera: Camera,
    guide: GuideCircle,
    axes: Node,
    test_model: Option<LoadedModel>,
    user_model: Option<LoadedModel>,
    environment: Option<EnvironmentMap>,
}

impl SceneManager {
    pub fn new(config: &StageConfig) -> Self {
        Self {
            camera: Camera::new(config.camera.fov, 1.0, config.camera.near, config.camera.far),
            guide: GuideCircle::new(),
            axes: axes_helper(AXES_LENGTH),
            test_model: None,
            user_model: None,
            environment: None,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn guide(&self) -> &GuideCircle {
        &self.guide
    }

    pub fn guide_mut(&mut self) -> &mut GuideCircle {
        &mut self.guide
    }

    pub fn model(&self, slot: ModelSlot) -> Option<&LoadedModel> {
        match slot {
            ModelSlot::TestAsset => self.test_model.as_ref(),
            ModelSlot::User => self.user_model.as_ref(),
        }
    }

    pub fn model_mut(&mut self, slot: ModelSlot) -> Option<&mut LoadedModel> {
        match slot {
            ModelSlot::TestAsset => self.test_model.as_mut(),
            ModelSlot::User => self.user_model.as_mut(),
        }
    }

    /// Top-level objects in draw order
    pub fn objects(&self) -> impl Iterator<Item = &Node> {
        [self.test_model.as_ref(), self.user_model.as_ref()]
            .into_iter()
            .flatten()
            .map(|m| &m.root)
            .chain([&self.axes, self.guide.node()])
    }

    /// Look up a top-level object by its well-known name
    pub fn find_object(&self, name: &str) -> Option<&Node> {
        self.objects().find(|n| n.name == name)
    }

    pub fn user_model(&self) -> Option<&Node> {
        self.find_object(USER_MODEL_NAME)
    }

    pub fn test_model(&self) -> Option<&Node> {
        self.find_object(TEST_MODEL_NAME)
    }

    /// Attach the test asset, releasing any previous one
    pub fn install_test_model(&mut self, model: LoadedModel, sink: &mut dyn ResourceSink) {
        if let Some(previous) = self.test_model.replace(model) {
            previous.root.dispose(sink);
        }
        debug!("Installed test model");
    }

    /// Swap in a new user model. The previous one is detached and its
    /// resources released in the same step, so there is never more than one.
    pub fn replace_user_model(&mut self, model: LoadedModel, sink: &mut dyn ResourceSink) {
        self.remove_user_model(sink);
        self.user_model = Some(model);
        info!("Added user model");
    }

    /// Detach the user model and release its resources. Returns whether
    /// there was one.
    pub fn remove_user_model(&mut self, sink: &mut dyn ResourceSink) -> bool {
        let Some(previous) = self.user_model.take() else {
            return false;
        };
        previous.root.dispose(sink);
        info!("Removed user model");
        true
    }

    /// Set the film camera's vertical field of view, in degrees
    pub fn set_zoom(&mut self, fov: f32) {
        self.camera.set_fov(fov);
    }

    pub fn zoom(&self) -> f32 {
        self.camera.fov()
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.camera.set_aspect(aspect);
    }

    pub fn environment(&self) -> Option<&EnvironmentMap> {
        self.environment.as_ref()
    }

    pub fn apply_environment(&mut self, environment: EnvironmentMap) {
        debug!(
            width = environment.width(),
            height = environment.height(),
            "Applied scene environment"
        );
        self.environment = Some(environment);
    }

    /// Release everything the scene still holds
    pub fn dispose(&mut self, sink: &mut dyn ResourceSink) {
        self.remove_user_model(sink);
        if let Some(model) = self.test_model.take() {
            model.root.dispose(sink);
        }
        self.guide.dispose(sink);
        self.axes.dispose(sink);
    }
}
