//! Facade that UI code drives: sessions, modes, model selection, gestures

use tracing::{debug, info};

use crate::animator::ModelAnimator;
use crate::config::StageConfig;
use crate::engine::{RenderCallback, RenderEngine, SceneRenderer};
use crate::environment::EnvironmentMap;
use crate::error::{LoadError, XrError};
use crate::loader::{AssetSource, LoadedModel, ModelLoader, ModelSource};
use crate::mode::{ModelMode, RenderMode};
use crate::scene::ResourceSink;
use crate::scene_manager::{ModelSlot, SceneManager};
use crate::session::{ActiveSession, SessionInit, SessionProvider, XrBackend};

/// Handle for one model selection. A later selection supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionTicket(u64);

/// Owns the session, render engine, scene and animator, and exposes the
/// operations a UI needs
pub struct ActionManager<B: XrBackend, S: AssetSource> {
    config: StageConfig,
    session: SessionProvider<B>,
    engine: RenderEngine<B>,
    scene: SceneManager,
    animator: ModelAnimator,
    loader: ModelLoader<S>,
    selection: u64,
    loading: bool,
}

impl<B: XrBackend, S: AssetSource> ActionManager<B, S> {
    pub fn new(backend: B, source: S, config: StageConfig) -> Self {
        let init = SessionInit::immersive_ar(config.dom_overlay_root.clone());
        Self {
            session: SessionProvider::new(backend, init),
            engine: RenderEngine::new(&config),
            scene: SceneManager::new(&config),
            animator: ModelAnimator::new(),
            loader: ModelLoader::new(source, &config),
            config,
            selection: 0,
            loading: false,
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        self.session.backend()
    }

    pub fn loader(&self) -> &ModelLoader<S> {
        &self.loader
    }

    pub fn scene(&self) -> &SceneManager {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneManager {
        &mut self.scene
    }

    pub fn animator(&self) -> &ModelAnimator {
        &self.animator
    }

    pub fn engine(&self) -> &RenderEngine<B> {
        &self.engine
    }

    pub fn session(&self) -> Option<&B::Session> {
        self.session.session()
    }

    pub async fn is_available(&self) -> bool {
        self.session.is_session_available().await
    }

    /// Request a session and start rendering into it
    pub async fn start_session(&mut self) -> bool {
        if !self.session.request_session().await {
            return false;
        }
        self.connect_session()
    }

    /// See `SessionProvider::begin_request`
    pub fn begin_session_request(&mut self) -> SessionInit {
        self.engine.disconnect();
        self.session.begin_request()
    }

    /// Install a negotiated session and start rendering into it
    pub fn finish_session_request(&mut self, result: Result<ActiveSession<B>, XrError>) -> bool {
        self.session.finish_request(result) && self.connect_session()
    }

    fn connect_session(&mut self) -> bool {
        let Some(space) = self.session.tracking_space().cloned() else {
            return false;
        };
        self.engine.connect_session(space);
        self.engine.start_rendering();
        true
    }

    pub fn end_session(&mut self) {
        self.session.end_session();
        self.engine.disconnect();
    }

    pub fn render_mode(&self) -> RenderMode {
        self.engine.render_mode()
    }

    pub fn model_mode(&self) -> ModelMode {
        self.animator.model_mode()
    }

    /// Change render mode. Entering hit or anchor also stops playback.
    pub fn switch_render_mode(&mut self, mode: RenderMode) {
        if self.engine.render_mode() == mode {
            return;
        }
        self.engine
            .switch_render_mode(mode, &mut self.scene, &mut self.animator);
        if matches!(mode, RenderMode::Hit | RenderMode::Anchor) {
            self.animator
                .switch_model_mode(ModelMode::Stop, &mut self.scene);
        }
        info!("Render mode has changed to {mode}");
    }

    pub fn switch_model_mode(&mut self, mode: ModelMode) {
        self.animator.switch_model_mode(mode, &mut self.scene);
    }

    /// Fetch, decode and install a model, making it current
    pub async fn load_model(
        &mut self,
        source: &ModelSource,
        sink: &mut dyn ResourceSink,
    ) -> Result<(), LoadError> {
        if *source == ModelSource::TestAsset && self.use_test_model() {
            return Ok(());
        }
        let ticket = self.begin_selection();
        let result = self.loader.load_model(source).await;
        self.finish_selection(ticket, source.slot(), result, sink)
            .map(|_| ())
    }

    /// Start a model selection whose load runs elsewhere. Any selection
    /// still loading becomes stale.
    pub fn begin_selection(&mut self) -> SelectionTicket {
        self.selection += 1;
        self.loading = true;
        SelectionTicket(self.selection)
    }

    /// Apply the outcome of the load started with `ticket`. Stale outcomes
    /// are dropped and yield `Ok(false)`.
    pub fn finish_selection(
        &mut self,
        ticket: SelectionTicket,
        slot: ModelSlot,
        result: Result<LoadedModel, LoadError>,
        sink: &mut dyn ResourceSink,
    ) -> Result<bool, LoadError> {
        if ticket.0 != self.selection {
            debug!(ticket = ticket.0, current = self.selection, "Discarding superseded model load");
            return Ok(false);
        }
        self.loading = false;
        self.install_model(slot, result?, sink);
        Ok(true)
    }

    /// Whether the latest selection is still loading
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Attach a decoded model to its slot and make it current
    pub fn install_model(&mut self, slot: ModelSlot, model: LoadedModel, sink: &mut dyn ResourceSink) {
        match slot {
            ModelSlot::TestAsset => self.scene.install_test_model(model, sink),
            ModelSlot::User => self.scene.replace_user_model(model, sink),
        }
        self.animator.init(slot, &mut self.scene);
    }

    /// Attach the startup test asset. It only becomes current when the user
    /// has not selected anything yet. A copy installed by an earlier
    /// selection wins and `model` is dropped.
    pub fn preload_test_model(&mut self, model: LoadedModel, sink: &mut dyn ResourceSink) {
        if self.scene.model(ModelSlot::TestAsset).is_some() {
            debug!("Test model already installed, dropping preloaded copy");
            return;
        }
        self.scene.install_test_model(model, sink);
        if matches!(self.animator.slot(), None | Some(ModelSlot::TestAsset)) {
            self.animator.init(ModelSlot::TestAsset, &mut self.scene);
        }
    }

    /// Switch back to the already-loaded test asset. Returns false when it
    /// has not finished loading.
    pub fn use_test_model(&mut self) -> bool {
        if self.scene.model(ModelSlot::TestAsset).is_none() {
            return false;
        }
        self.selection += 1;
        self.loading = false;
        self.animator.init(ModelSlot::TestAsset, &mut self.scene);
        true
    }

    pub fn apply_environment(&mut self, environment: EnvironmentMap) {
        self.scene.apply_environment(environment);
    }

    /// Turn the world by a horizontal drag distance in pixels. Small and
    /// non-finite drags are ignored. Returns whether a rotation was applied.
    pub fn rotate_world(&mut self, delta_px: f64) -> bool {
        let rotation = &self.config.rotation;
        if !delta_px.is_finite() || delta_px.abs() <= rotation.threshold_px {
            return false;
        }
        let radians = (delta_px / rotation.px_per_radian) as f32;
        self.engine.rotate_session(radians, self.session.backend());
        true
    }

    /// Set the film camera field of view, clamped to the configured range.
    /// A non-finite value leaves the zoom unchanged.
    pub fn set_zoom(&mut self, fov: f32) -> f32 {
        if !fov.is_finite() {
            debug!(fov, "Ignored non-finite zoom");
            return self.scene.zoom();
        }
        let zoom = &self.config.zoom;
        let fov = fov.clamp(zoom.min, zoom.max);
        self.scene.set_zoom(fov);
        debug!(fov, "Zoom changed");
        fov
    }

    pub fn zoom(&self) -> f32 {
        self.scene.zoom()
    }

    pub fn add_render_callback(&mut self, callback: RenderCallback) {
        self.engine.add_render_callback(callback);
    }

    /// Forward a platform frame to the render engine
    pub fn on_frame<R: SceneRenderer<B>>(&mut self, time_ms: f64, frame: Option<&B::Frame>, renderer: &mut R) {
        self.engine.on_frame(
            time_ms,
            frame,
            &self.session,
            &mut self.scene,
            &mut self.animator,
            renderer,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_manager::USER_MODEL_NAME;
    use crate::testing::{fixtures, MockAssets, MockBackend, MockFrame, MockRenderer, RecordingSink};
    use crate::transform::RigidTransform;
    use glam::{Quat, Vec3};
    use pollster::block_on;

    const USER_URL: &str = "/uploads/robot.glb";

    fn manager(backend: MockBackend) -> ActionManager<MockBackend, MockAssets> {
        let config = StageConfig::default();
        let assets = MockAssets::default()
            .with(&config.test_model_url, fixtures::cube_glb(1.0, false))
            .with(USER_URL, fixtures::cube_glb(2.0, true));
        ActionManager::new(backend, assets, config)
    }

    fn frame(actions: &mut ActionManager<MockBackend, MockAssets>, time_ms: f64, hit: Option<Vec3>) {
        let frame = MockFrame {
            hit: hit.map(|p| RigidTransform::new(p, Quat::IDENTITY)),
        };
        actions.on_frame(time_ms, Some(&frame), &mut MockRenderer::default());
    }

    #[test]
    fn test_unsupported_platform_stays_idle() {
        let backend = MockBackend::unsupported();
        let mut actions = manager(backend.clone());
        assert!(!block_on(actions.is_available()));
        assert!(!block_on(actions.start_session()));
        assert!(!actions.engine().is_rendering());
        assert_eq!(backend.sessions_requested(), 0);
    }

    #[test]
    fn test_load_test_asset_on_startup() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        block_on(actions.load_model(&ModelSource::TestAsset, &mut sink)).unwrap();

        let cube = actions.scene().test_model().unwrap();
        assert!(!cube.visible);
        let radius = actions
            .scene()
            .model(ModelSlot::TestAsset)
            .and_then(LoadedModel::bounding_radius)
            .unwrap();
        assert!((radius - 0.2).abs() < 1e-4);
        assert_eq!(actions.animator().slot(), Some(ModelSlot::TestAsset));
    }

    #[test]
    fn test_anchor_flow_places_model() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        block_on(actions.load_model(&ModelSource::TestAsset, &mut sink)).unwrap();
        assert!(block_on(actions.start_session()));

        frame(&mut actions, 0.0, Some(Vec3::new(0.2, 0.0, -1.0)));
        assert!(actions.scene().guide().is_visible());

        actions.switch_render_mode(RenderMode::Anchor);
        assert!(!actions.scene().guide().is_visible());
        assert_eq!(actions.model_mode(), ModelMode::Stop);

        frame(&mut actions, 16.0, Some(Vec3::new(0.2, 0.0, -1.0)));
        assert!(!actions.animator().is_model_located());
        frame(&mut actions, 116.0, None);
        assert!(actions.animator().is_model_located());
        assert!(actions.scene().test_model().unwrap().visible);
    }

    #[test]
    fn test_replacing_user_model_releases_old_resources() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        let source = ModelSource::parse(USER_URL);

        block_on(actions.load_model(&source, &mut sink)).unwrap();
        assert!(sink.geometries.is_empty());
        block_on(actions.load_model(&source, &mut sink)).unwrap();

        assert_eq!(sink.geometries.len(), 1);
        let users = actions
            .scene()
            .objects()
            .filter(|n| n.name == USER_MODEL_NAME)
            .count();
        assert_eq!(users, 1);
        assert_eq!(actions.animator().slot(), Some(ModelSlot::User));
    }

    #[test]
    fn test_failed_load_keeps_current_model() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        block_on(actions.load_model(&ModelSource::parse(USER_URL), &mut sink)).unwrap();

        let result = block_on(actions.load_model(&ModelSource::parse("/missing.glb"), &mut sink));
        assert!(matches!(result, Err(LoadError::Fetch { .. })));
        assert!(actions.scene().user_model().is_some());
        assert!(sink.geometries.is_empty());
    }

    #[test]
    fn test_selecting_test_asset_reuses_loaded_copy() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        block_on(actions.load_model(&ModelSource::TestAsset, &mut sink)).unwrap();
        block_on(actions.load_model(&ModelSource::parse(USER_URL), &mut sink)).unwrap();

        block_on(actions.load_model(&ModelSource::parse("testcube"), &mut sink)).unwrap();
        assert_eq!(actions.animator().slot(), Some(ModelSlot::TestAsset));
        assert!(sink.geometries.is_empty());
    }

    #[test]
    fn test_superseded_selection_is_discarded() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        let first = actions.begin_selection();
        let second = actions.begin_selection();

        let older = block_on(actions.loader().load_model(&ModelSource::parse(USER_URL))).unwrap();
        let installed = actions.finish_selection(first, ModelSlot::User, Ok(older), &mut sink);
        assert!(matches!(installed, Ok(false)));
        assert!(actions.scene().user_model().is_none());
        assert!(actions.is_loading());

        let newer = block_on(actions.loader().load_model(&ModelSource::parse(USER_URL))).unwrap();
        let installed = actions.finish_selection(second, ModelSlot::User, Ok(newer), &mut sink);
        assert!(matches!(installed, Ok(true)));
        assert!(!actions.is_loading());
        assert_eq!(actions.animator().slot(), Some(ModelSlot::User));
    }

    #[test]
    fn test_test_asset_supersedes_pending_load() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        block_on(actions.load_model(&ModelSource::TestAsset, &mut sink)).unwrap();

        let pending = actions.begin_selection();
        assert!(actions.use_test_model());
        assert!(!actions.is_loading());

        let late = block_on(actions.loader().load_model(&ModelSource::parse(USER_URL)));
        let installed = actions.finish_selection(pending, ModelSlot::User, late, &mut sink);
        assert!(matches!(installed, Ok(false)));
        assert_eq!(actions.animator().slot(), Some(ModelSlot::TestAsset));

        let failed = actions.finish_selection(pending, ModelSlot::User, Err(LoadError::EmptyScene), &mut sink);
        assert!(matches!(failed, Ok(false)));
    }

    #[test]
    fn test_preload_does_not_steal_selection() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        block_on(actions.load_model(&ModelSource::parse(USER_URL), &mut sink)).unwrap();

        let cube = block_on(actions.loader().load_model(&ModelSource::TestAsset)).unwrap();
        actions.preload_test_model(cube, &mut sink);
        assert_eq!(actions.animator().slot(), Some(ModelSlot::User));
    }

    #[test]
    fn test_late_preload_keeps_selected_test_model() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        assert!(block_on(actions.start_session()));
        block_on(actions.load_model(&ModelSource::TestAsset, &mut sink)).unwrap();

        actions.switch_render_mode(RenderMode::Anchor);
        frame(&mut actions, 0.0, Some(Vec3::new(0.0, 0.0, -1.0)));
        frame(&mut actions, 200.0, None);
        assert!(actions.animator().is_model_located());

        let cube = block_on(actions.loader().load_model(&ModelSource::TestAsset)).unwrap();
        actions.preload_test_model(cube, &mut sink);
        assert!(actions.animator().is_model_located());
        assert!(actions.scene().test_model().unwrap().visible);
        assert!(sink.geometries.is_empty());
    }

    #[test]
    fn test_mode_switch_stops_playback() {
        let mut actions = manager(MockBackend::new());
        let mut sink = RecordingSink::default();
        block_on(actions.load_model(&ModelSource::parse(USER_URL), &mut sink)).unwrap();

        actions.switch_render_mode(RenderMode::Film);
        actions.switch_model_mode(ModelMode::Play);
        assert_eq!(actions.model_mode(), ModelMode::Play);

        actions.switch_render_mode(RenderMode::Anchor);
        assert_eq!(actions.model_mode(), ModelMode::Stop);
        let mixer = actions
            .scene()
            .model(ModelSlot::User)
            .and_then(|m| m.mixer.as_ref())
            .unwrap();
        assert!(mixer.actions().iter().all(|a| !a.is_running()));
    }

    #[test]
    fn test_rotate_world_threshold() {
        let backend = MockBackend::new();
        let mut actions = manager(backend.clone());
        assert!(block_on(actions.start_session()));

        assert!(!actions.rotate_world(2.0));
        assert!(!actions.rotate_world(-1.5));
        assert_eq!(backend.offsets_created(), 0);

        assert!(actions.rotate_world(25.0));
        let space = actions.engine().reference_space().unwrap();
        let expected = Quat::from_rotation_y(0.5);
        assert!(space.origin.orientation.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut actions = manager(MockBackend::new());
        assert_eq!(actions.set_zoom(10.0), 30.0);
        assert_eq!(actions.zoom(), 30.0);
        assert_eq!(actions.set_zoom(150.0), 100.0);
        assert_eq!(actions.set_zoom(55.0), 55.0);
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let backend = MockBackend::new();
        let mut actions = manager(backend.clone());
        assert!(block_on(actions.start_session()));

        actions.set_zoom(55.0);
        assert_eq!(actions.set_zoom(f32::NAN), 55.0);
        assert_eq!(actions.set_zoom(f32::INFINITY), 55.0);
        assert_eq!(actions.zoom(), 55.0);

        assert!(!actions.rotate_world(f64::NAN));
        assert!(!actions.rotate_world(f64::NEG_INFINITY));
        assert_eq!(backend.offsets_created(), 0);
    }

    #[test]
    fn test_end_session_stops_rendering() {
        let backend = MockBackend::new();
        let mut actions = manager(backend.clone());
        assert!(block_on(actions.start_session()));
        assert!(actions.engine().is_rendering());

        actions.end_session();
        assert!(!actions.engine().is_rendering());
        assert!(actions.session().is_none());
        assert_eq!(backend.live_sessions(), 0);
    }
}
