//! Per-frame render loop with one state type per render mode

use tracing::{debug, info, warn};

use crate::animator::ModelAnimator;
use crate::config::StageConfig;
use crate::mode::RenderMode;
use crate::scene_manager::SceneManager;
use crate::session::{SessionProvider, XrBackend};
use crate::transform::RigidTransform;

/// Timing of a delivered frame, passed to render callbacks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub time_ms: f64,
    pub delta_ms: f64,
    pub mode: RenderMode,
}

pub type RenderCallback = Box<dyn FnMut(&FrameInfo)>;

/// Draws the scene for one XR frame
pub trait SceneRenderer<B: XrBackend> {
    /// Width over height of the surface `frame` draws into, if known
    fn viewport_aspect(&self, _frame: &B::Frame) -> Option<f32> {
        None
    }

    /// `space` is `None` until a session is connected. In film mode the
    /// renderer projects with the scene camera instead of the view's.
    fn render(
        &mut self,
        frame: &B::Frame,
        space: Option<&B::Space>,
        scene: &SceneManager,
        mode: RenderMode,
    );
}

/// What a mode state may touch while handling a frame
struct FrameContext<'a, B: XrBackend> {
    backend: &'a B,
    hit_test_source: Option<&'a B::HitTestSource>,
    reference_space: &'a mut Option<B::Space>,
    scene: &'a mut SceneManager,
    animator: &'a mut ModelAnimator,
}

impl<B: XrBackend> FrameContext<'_, B> {
    fn hit_pose(&self, frame: &B::Frame) -> Option<RigidTransform> {
        let source = self.hit_test_source?;
        let space = self.reference_space.as_ref()?;
        self.backend.hit_test(frame, source, space)
    }
}

/// Guide follows the latest hit
#[derive(Debug, Default)]
pub struct HitState;

impl HitState {
    fn on_frame<B: XrBackend>(&mut self, cx: &mut FrameContext<'_, B>, frame: &B::Frame) {
        match cx.hit_pose(frame) {
            Some(pose) => {
                let guide = cx.scene.guide_mut();
                guide.update_pose(&pose);
                guide.show();
            }
            None => cx.scene.guide_mut().hide(),
        }
    }
}

/// Placement scheduled on the frame clock after re-anchoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingPlacement {
    pub due_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AnchorPhase {
    /// Waiting for a hit result
    Searching,
    /// Reference space moved to the hit, model placed once due
    Settling(PendingPlacement),
    /// Origin fixed for the rest of this anchor session
    Anchored,
}

/// Re-anchors the world origin on a surface, then places the model there
#[derive(Debug)]
pub struct AnchorState {
    settle_delay_ms: f64,
    phase: AnchorPhase,
}

impl AnchorState {
    fn new(settle_delay_ms: f64) -> Self {
        Self {
            settle_delay_ms,
            phase: AnchorPhase::Searching,
        }
    }

    pub fn pending(&self) -> Option<PendingPlacement> {
        match self.phase {
            AnchorPhase::Settling(pending) => Some(pending),
            _ => None,
        }
    }

    fn on_frame<B: XrBackend>(
        &mut self,
        cx: &mut FrameContext<'_, B>,
        frame: &B::Frame,
        time_ms: f64,
        delta: f32,
    ) {
        match self.phase {
            AnchorPhase::Searching => {
                if cx.animator.is_model_located() {
                    // placed during an earlier anchor visit
                    self.phase = AnchorPhase::Anchored;
                    cx.animator.update(cx.scene, delta);
                    return;
                }
                let Some(pose) = cx.hit_pose(frame) else {
                    return;
                };
                let Some(space) = cx.reference_space.as_ref() else {
                    return;
                };
                let Some(anchored) = cx.backend.offset_space(space, &pose) else {
                    warn!("Could not re-anchor reference space, retrying on next hit");
                    return;
                };
                *cx.reference_space = Some(anchored);
                self.phase = AnchorPhase::Settling(PendingPlacement {
                    due_ms: time_ms + self.settle_delay_ms,
                });
                debug!(position = ?pose.position, "Re-anchored reference space at hit");
            }
            AnchorPhase::Settling(pending) => {
                if time_ms >= pending.due_ms {
                    self.phase = AnchorPhase::Anchored;
                    // the anchored space's origin is the hit point
                    cx.animator.locate_model(cx.scene, &RigidTransform::IDENTITY);
                    info!("Placed model at anchor");
                }
            }
            AnchorPhase::Anchored => {
                if cx.animator.is_model_located() {
                    cx.animator.update(cx.scene, delta);
                } else {
                    // a model selected after anchoring lands on the same origin
                    cx.animator.locate_model(cx.scene, &RigidTransform::IDENTITY);
                }
            }
        }
    }
}

/// Camera-only inspection; animation keeps running
#[derive(Debug, Default)]
pub struct FilmState;

impl FilmState {
    fn on_frame<B: XrBackend>(&mut self, cx: &mut FrameContext<'_, B>, delta: f32) {
        cx.animator.update(cx.scene, delta);
    }
}

/// State of the active render mode
#[derive(Debug)]
pub enum ModeState {
    Hit(HitState),
    Anchor(AnchorState),
    Film(FilmState),
}

impl ModeState {
    fn enter(mode: RenderMode, settle_delay_ms: f64) -> Self {
        match mode {
            RenderMode::Hit => Self::Hit(HitState),
            RenderMode::Anchor => Self::Anchor(AnchorState::new(settle_delay_ms)),
            RenderMode::Film => Self::Film(FilmState),
        }
    }

    pub fn mode(&self) -> RenderMode {
        match self {
            Self::Hit(_) => RenderMode::Hit,
            Self::Anchor(_) => RenderMode::Anchor,
            Self::Film(_) => RenderMode::Film,
        }
    }

    fn on_frame<B: XrBackend>(
        &mut self,
        cx: &mut FrameContext<'_, B>,
        frame: &B::Frame,
        time_ms: f64,
        delta: f32,
    ) {
        match self {
            Self::Hit(state) => state.on_frame(cx, frame),
            Self::Anchor(state) => state.on_frame(cx, frame, time_ms, delta),
            Self::Film(state) => state.on_frame(cx, delta),
        }
    }
}

/// Drives one render mode per frame and owns the active reference space
pub struct RenderEngine<B: XrBackend> {
    state: ModeState,
    settle_delay_ms: f64,
    reference_space: Option<B::Space>,
    prev_time_ms: Option<f64>,
    rendering: bool,
    callbacks: Vec<RenderCallback>,
}

impl<B: XrBackend> RenderEngine<B> {
    pub fn new(config: &StageConfig) -> Self {
        Self {
            state: ModeState::enter(RenderMode::default(), config.settle_delay_ms),
            settle_delay_ms: config.settle_delay_ms,
            reference_space: None,
            prev_time_ms: None,
            rendering: false,
            callbacks: Vec::new(),
        }
    }

    pub fn render_mode(&self) -> RenderMode {
        self.state.mode()
    }

    pub fn state(&self) -> &ModeState {
        &self.state
    }

    pub fn reference_space(&self) -> Option<&B::Space> {
        self.reference_space.as_ref()
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Adopt the tracking space of a freshly started session. Any anchor
    /// progress belongs to the old space and is dropped.
    pub fn connect_session(&mut self, tracking_space: B::Space) {
        self.reference_space = Some(tracking_space);
        self.prev_time_ms = None;
        self.state = ModeState::enter(self.state.mode(), self.settle_delay_ms);
        debug!("Connected session to render engine");
    }

    pub fn disconnect(&mut self) {
        self.reference_space = None;
        self.prev_time_ms = None;
        self.rendering = false;
        debug!("Disconnected render engine");
    }

    pub fn start_rendering(&mut self) {
        self.rendering = true;
        info!("Started rendering loop");
    }

    pub fn add_render_callback(&mut self, callback: RenderCallback) {
        self.callbacks.push(callback);
    }

    /// Enter `mode` with a fresh state. Entering hit hides the model,
    /// entering anchor hides the guide.
    pub fn switch_render_mode(
        &mut self,
        mode: RenderMode,
        scene: &mut SceneManager,
        animator: &mut ModelAnimator,
    ) {
        if self.state.mode() == mode {
            return;
        }
        self.state = ModeState::enter(mode, self.settle_delay_ms);
        match mode {
            RenderMode::Hit => animator.dislocate_model(scene),
            RenderMode::Anchor => scene.guide_mut().hide(),
            RenderMode::Film => {}
        }
        info!(mode = %mode, "Render mode changed");
    }

    /// Turn the world about the vertical axis of the reference space
    pub fn rotate_session(&mut self, radians: f32, backend: &B) {
        let Some(space) = self.reference_space.as_ref() else {
            return;
        };
        match backend.offset_space(space, &RigidTransform::yaw(radians)) {
            Some(rotated) => {
                self.reference_space = Some(rotated);
                debug!(radians, "Rotated session");
            }
            None => warn!(radians, "Could not rotate reference space"),
        }
    }

    /// Handle one platform frame: update the active mode, draw, then notify
    /// callbacks. Does nothing before `start_rendering` or without a frame.
    pub fn on_frame<R: SceneRenderer<B>>(
        &mut self,
        time_ms: f64,
        frame: Option<&B::Frame>,
        session: &SessionProvider<B>,
        scene: &mut SceneManager,
        animator: &mut ModelAnimator,
        renderer: &mut R,
    ) {
        if !self.rendering {
            return;
        }
        let Some(frame) = frame else {
            return;
        };
        let delta_ms = self
            .prev_time_ms
            .map_or(0.0, |prev| (time_ms - prev).max(0.0));
        self.prev_time_ms = Some(time_ms);

        let mut cx = FrameContext {
            backend: session.backend(),
            hit_test_source: session.hit_test_source(),
            reference_space: &mut self.reference_space,
            scene: &mut *scene,
            animator,
        };
        self.state
            .on_frame(&mut cx, frame, time_ms, (delta_ms / 1000.0) as f32);

        if let Some(aspect) = renderer.viewport_aspect(frame) {
            scene.set_aspect(aspect);
        }
        let mode = self.state.mode();
        renderer.render(frame, self.reference_space.as_ref(), scene, mode);

        let info = FrameInfo {
            time_ms,
            delta_ms,
            mode,
        };
        for callback in &mut self.callbacks {
            callback(&info);
        }
    }
}
